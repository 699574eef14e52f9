//! Chat session controller.
//!
//! Owns the conversation history and the "started" state for one chat, and
//! routes each submitted line to exactly one backend path: report generation
//! when the reply confirms a live offer, `/send_message` otherwise.

use tracing::{debug, info, warn};

use crate::client::{ChatBackend, GeneratedReport, ReportOutcome};
use crate::conversation::Conversation;
use crate::intent::{OFFER_WINDOW, prompts_report_button, should_generate_report};

pub const CONNECT_FAILED: &str =
    "Não foi possível conectar ao servidor. Verifique se ele está rodando.";
pub const SEND_FAILED: &str = "Ocorreu um erro ao enviar a mensagem.";
pub const GENERATING: &str = "Gerando seu relatório, um momento...";
pub const REPORT_FAILED: &str = "Erro ao gerar relatório.";

/// What happened on one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Blank input; nothing was recorded or sent.
    Ignored,
    /// Normal bot reply. `offers_report` is set when the reply asks the
    /// explicit "gerar seu relatório?" question.
    Reply { text: String, offers_report: bool },
    /// The report was generated.
    ReportReady(GeneratedReport),
    /// The backend refused to build the report.
    ReportFailed {
        message: String,
        fallback_url: Option<String>,
    },
    /// Network or protocol failure; `message` was recorded as a bot line.
    Fallback { message: String },
}

pub struct ChatSession<B> {
    backend: B,
    conversation: Conversation,
    started: bool,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            conversation: Conversation::new(),
            started: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetch the greeting and record it.
    pub async fn start(&mut self) -> TurnOutcome {
        match self.backend.start_conversation().await {
            Ok(greeting) => {
                self.conversation.push_bot(greeting.clone());
                self.started = true;
                info!("conversation started");
                TurnOutcome::Reply {
                    offers_report: prompts_report_button(&greeting),
                    text: greeting,
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to start conversation");
                self.fallback(CONNECT_FAILED)
            }
        }
    }

    /// Handle one line of user input.
    pub async fn submit(&mut self, raw: &str) -> TurnOutcome {
        let text = raw.trim();
        if text.is_empty() {
            return TurnOutcome::Ignored;
        }
        if !self.started
            && let TurnOutcome::Fallback { message } = self.start().await
        {
            return TurnOutcome::Fallback { message };
        }

        let wants_report = {
            let recent = self.conversation.recent_bot_messages(OFFER_WINDOW);
            should_generate_report(text, &recent)
        };
        self.conversation.push_user(text);
        debug!(wants_report, "classified user reply");

        if wants_report {
            return self.request_report().await;
        }

        match self.backend.send_message(text).await {
            Ok(reply) => {
                self.conversation.push_bot(reply.clone());
                TurnOutcome::Reply {
                    offers_report: prompts_report_button(&reply),
                    text: reply,
                }
            }
            Err(e) => {
                warn!(error = %e, "send_message failed");
                self.fallback(SEND_FAILED)
            }
        }
    }

    /// Generate the report without classifying a reply (explicit action).
    pub async fn request_report(&mut self) -> TurnOutcome {
        self.conversation.push_bot(GENERATING);
        match self.backend.generate_report().await {
            Ok(ReportOutcome::Ready(report)) => {
                info!(redirect = ?report.redirect_url, "report generated");
                TurnOutcome::ReportReady(report)
            }
            Ok(ReportOutcome::Failed {
                reason,
                fallback_url,
            }) => {
                warn!(%reason, "backend declined report generation");
                self.conversation.push_bot(REPORT_FAILED);
                TurnOutcome::ReportFailed {
                    message: reason,
                    fallback_url,
                }
            }
            Err(e) => {
                warn!(error = %e, "generate_report failed");
                self.fallback(REPORT_FAILED)
            }
        }
    }

    /// Clear server and local state, then start over.
    pub async fn reset(&mut self) -> TurnOutcome {
        if let Err(e) = self.backend.clear_conversation().await {
            warn!(error = %e, "failed to clear server conversation");
        }
        self.conversation.clear();
        self.started = false;
        self.start().await
    }

    fn fallback(&mut self, message: &str) -> TurnOutcome {
        self.conversation.push_bot(message);
        TurnOutcome::Fallback {
            message: message.to_string(),
        }
    }
}
