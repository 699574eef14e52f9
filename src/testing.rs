//! Scripted in-memory backend for session and REPL tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::client::{BackendError, ChatBackend, ReportOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start,
    Send(String),
    Report,
    Clear,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    report: Option<ReportOutcome>,
    fail_start: bool,
    fail_sends: bool,
}

pub struct FakeBackend {
    greeting: String,
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new(greeting: &str) -> Self {
        Self {
            greeting: greeting.to_string(),
            script: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next `/send_message` reply.
    pub fn reply(self, text: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(text.to_string());
        self
    }

    pub fn report(self, outcome: ReportOutcome) -> Self {
        self.script.lock().unwrap().report = Some(outcome);
        self
    }

    pub fn fail_start(self) -> Self {
        self.script.lock().unwrap().fail_start = true;
        self
    }

    pub fn fail_sends(self) -> Self {
        self.script.lock().unwrap().fail_sends = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unavailable(endpoint: &'static str) -> BackendError {
    BackendError::Status {
        endpoint,
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

impl ChatBackend for FakeBackend {
    async fn start_conversation(&self) -> Result<String, BackendError> {
        self.record(Call::Start);
        if self.script.lock().unwrap().fail_start {
            return Err(unavailable("/start_conversation"));
        }
        Ok(self.greeting.clone())
    }

    async fn send_message(&self, text: &str) -> Result<String, BackendError> {
        self.record(Call::Send(text.to_string()));
        let mut script = self.script.lock().unwrap();
        if script.fail_sends {
            return Err(unavailable("/send_message"));
        }
        Ok(script
            .replies
            .pop_front()
            .unwrap_or_else(|| "Entendi!".to_string()))
    }

    async fn generate_report(&self) -> Result<ReportOutcome, BackendError> {
        self.record(Call::Report);
        Ok(self
            .script
            .lock()
            .unwrap()
            .report
            .clone()
            .unwrap_or_else(|| ReportOutcome::Failed {
                reason: "no report scripted".to_string(),
                fallback_url: None,
            }))
    }

    async fn clear_conversation(&self) -> Result<(), BackendError> {
        self.record(Call::Clear);
        Ok(())
    }
}
