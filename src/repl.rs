//! Line-oriented terminal front-end for a [`ChatSession`].
//!
//! Every input line is a chat message except these commands:
//! - `/relatorio` generates the report right away
//! - `/novo` starts a fresh conversation
//! - `/sair` quits

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::client::{ChatBackend, GeneratedReport};
use crate::conversation::Origin;
use crate::session::{ChatSession, TurnOutcome};

pub const CMD_REPORT: &str = "/relatorio";
pub const CMD_NEW: &str = "/novo";
pub const CMD_QUIT: &str = "/sair";

const REPORT_HINT: &str = "(digite /relatorio para gerar seu relatório)";

/// Drive `session` from `input` until EOF, `/sair`, or a generated report.
pub async fn run_repl<B, R, W>(session: &mut ChatSession<B>, input: R, out: &mut W) -> Result<()>
where
    B: ChatBackend,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let seen = session.conversation().len();
    let outcome = session.start().await;
    if report_turn(session, seen, &outcome, out)? {
        return Ok(());
    }

    let mut lines = input.lines();
    loop {
        write!(out, "{} ", ">".bold())?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            debug!("input closed");
            writeln!(out)?;
            return Ok(());
        };

        let seen = session.conversation().len();
        let outcome = match line.trim() {
            CMD_QUIT => return Ok(()),
            CMD_NEW => session.reset().await,
            CMD_REPORT => session.request_report().await,
            _ => session.submit(&line).await,
        };
        // A reset rewinds the history, so print it whole.
        let seen = if line.trim() == CMD_NEW { 0 } else { seen };

        if report_turn(session, seen, &outcome, out)? {
            return Ok(());
        }
    }
}

/// Print bot lines recorded since `seen` plus outcome details.
/// Returns true once the report is ready.
fn report_turn<B: ChatBackend, W: Write>(
    session: &ChatSession<B>,
    seen: usize,
    outcome: &TurnOutcome,
    out: &mut W,
) -> Result<bool> {
    let fresh = session.conversation().utterances().iter().skip(seen);
    for utterance in fresh.filter(|u| u.origin == Origin::Bot) {
        writeln!(out, "{} {}", "bot:".green().bold(), utterance.text)?;
    }

    match outcome {
        TurnOutcome::Reply {
            offers_report: true,
            ..
        } => writeln!(out, "{}", REPORT_HINT.dimmed())?,
        TurnOutcome::ReportReady(report) => {
            write!(out, "{}", format_report(report))?;
            return Ok(true);
        }
        TurnOutcome::ReportFailed {
            message,
            fallback_url,
        } => {
            writeln!(out, "{} {message}", "erro:".red().bold())?;
            if let Some(url) = fallback_url {
                writeln!(out, "Use a calculadora manual: {url}")?;
            }
        }
        _ => {}
    }
    Ok(false)
}

/// Human-readable report summary, one item per line.
pub fn format_report(report: &GeneratedReport) -> String {
    let mut s = String::new();
    match &report.redirect_url {
        Some(url) => {
            let _ = writeln!(s, "Relatório pronto: {url}");
        }
        None => {
            let _ = writeln!(s, "Relatório pronto.");
        }
    }
    if let Some(summary) = &report.summary {
        let _ = writeln!(s, "Total: {:.2} kg CO2e/mês", summary.total_kg_co2e);
        for (category, kg) in &summary.details_kg_co2e {
            let _ = writeln!(s, "  {category}: {kg:.2} kg CO2e");
        }
    }
    if let Some(narrative) = &report.narrative {
        let _ = writeln!(s);
        let _ = writeln!(s, "{narrative}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FootprintSummary, ReportOutcome};
    use crate::testing::{Call, FakeBackend};
    use std::collections::BTreeMap;

    const GREETING: &str = "Oi! Você tem carro?";

    async fn run(backend: FakeBackend, script: &str) -> (String, ChatSession<FakeBackend>) {
        let mut session = ChatSession::new(backend);
        let mut out = Vec::new();
        run_repl(&mut session, script.as_bytes(), &mut out)
            .await
            .unwrap();
        (String::from_utf8(out).unwrap(), session)
    }

    fn ready() -> ReportOutcome {
        ReportOutcome::Ready(GeneratedReport {
            redirect_url: Some("http://127.0.0.1:5000/report".into()),
            ..GeneratedReport::default()
        })
    }

    #[tokio::test]
    async fn prints_greeting_and_replies() {
        let backend = FakeBackend::new(GREETING).reply("Quantos km por mês?");
        let (out, session) = run(backend, "tenho\n").await;
        assert!(out.contains(GREETING));
        assert!(out.contains("Quantos km por mês?"));
        assert_eq!(
            session.backend().calls(),
            vec![Call::Start, Call::Send("tenho".into())]
        );
    }

    #[tokio::test]
    async fn offer_shows_hint_and_affirmation_finishes() {
        let backend = FakeBackend::new(GREETING)
            .reply("Perfeito! Podemos gerar seu relatório?")
            .report(ready());
        let (out, session) = run(backend, "150 kWh\nsim\nnunca lido\n").await;
        assert!(out.contains(REPORT_HINT));
        assert!(out.contains("Gerando seu relatório"));
        assert!(out.contains("Relatório pronto: http://127.0.0.1:5000/report"));
        assert!(!session.backend().calls().contains(&Call::Send("nunca lido".into())));
    }

    #[tokio::test]
    async fn report_command_skips_classifier() {
        let backend = FakeBackend::new(GREETING).report(ready());
        let (_, session) = run(backend, "/relatorio\n").await;
        assert_eq!(session.backend().calls(), vec![Call::Start, Call::Report]);
    }

    #[tokio::test]
    async fn new_command_resets() {
        let backend = FakeBackend::new(GREETING);
        let (out, session) = run(backend, "/novo\n/sair\n").await;
        assert_eq!(out.matches(GREETING).count(), 2);
        assert_eq!(
            session.backend().calls(),
            vec![Call::Start, Call::Clear, Call::Start]
        );
    }

    #[tokio::test]
    async fn declined_report_prints_fallback() {
        let backend = FakeBackend::new(GREETING).report(ReportOutcome::Failed {
            reason: "Não consegui processar os dados.".into(),
            fallback_url: Some("http://127.0.0.1:5000/calculator".into()),
        });
        let (out, _) = run(backend, "/relatorio\n").await;
        assert!(out.contains("Não consegui processar os dados."));
        assert!(out.contains("http://127.0.0.1:5000/calculator"));
    }

    #[test]
    fn formats_footprint_summary() {
        let mut details = BTreeMap::new();
        details.insert("energia_eletrica".to_string(), 40.5);
        details.insert("transporte".to_string(), 120.0);
        let report = GeneratedReport {
            redirect_url: None,
            narrative: Some("Bom trabalho!".into()),
            summary: Some(FootprintSummary {
                total_kg_co2e: 160.5,
                details_kg_co2e: details,
            }),
        };
        let text = format_report(&report);
        assert_eq!(
            text,
            "Relatório pronto.\nTotal: 160.50 kg CO2e/mês\n  energia_eletrica: 40.50 kg CO2e\n  transporte: 120.00 kg CO2e\n\nBom trabalho!\n"
        );
    }
}
