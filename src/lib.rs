pub mod client;
pub mod config;
pub mod conversation;
pub mod intent;
pub mod logging;
pub mod repl;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use client::{ChatBackend, HttpBackend, ReportOutcome};
use config::ClientConfig;
use serde_json::json;
use session::ChatSession;
use std::path::PathBuf;
use tracing::debug;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "pegada",
    version,
    about = "Terminal client for the carbon-footprint chatbot"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend root URL, overrides config and PEGADA_BASE_URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat session
    Chat,
    /// Decide offline whether a reply confirms a report offer
    Classify {
        /// The user's reply
        message: String,

        /// Recent bot message, oldest first (repeatable)
        #[arg(long = "bot")]
        bot: Vec<String>,

        /// Emit JSON instead of true/false
        #[arg(long)]
        json: bool,
    },
    /// Generate the report from the current server-side conversation
    Report {
        #[arg(long)]
        json: bool,
    },
    /// List past reports
    History {
        /// Max entries (defaults to config history_limit)
        #[arg(short = 'n', long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },
    /// Delete a report by id
    DeleteReport { id: i64 },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Classify { message, bot, json } => {
            run_classify(&message, &bot, json);
            Ok(())
        }
        Commands::Chat => {
            let backend = backend(cli.config, cli.base_url)?;
            let mut session = ChatSession::new(backend);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            repl::run_repl(&mut session, stdin, &mut stdout).await
        }
        Commands::Report { json } => {
            let backend = backend(cli.config, cli.base_url)?;
            run_report(&backend, json).await
        }
        Commands::History { limit, json } => {
            let cfg = load_config(cli.config, cli.base_url)?;
            let backend = HttpBackend::new(&cfg).context("building backend client")?;
            let rows = backend
                .list_history(limit.unwrap_or(cfg.history_limit))
                .await
                .context("fetching report history")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                eprintln!("Nenhuma conversa ainda");
            } else {
                for row in rows {
                    println!(
                        "#{:<6} {}  {}",
                        row.id,
                        row.created_at,
                        backend.report_page_url(row.id)
                    );
                }
            }
            Ok(())
        }
        Commands::DeleteReport { id } => {
            let backend = backend(cli.config, cli.base_url)?;
            let message = backend
                .delete_report(id)
                .await
                .with_context(|| format!("deleting report {id}"))?;
            println!("{message}");
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pegada", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn run_classify(message: &str, bot: &[String], json: bool) {
    let decision = intent::should_generate_report(message, bot);
    if json {
        let out = json!({
            "generate_report": decision,
            "offer_live": intent::offer_is_live(bot),
            "affirmation": intent::is_affirmation(message),
        });
        println!("{out}");
    } else {
        println!("{decision}");
    }
}

async fn run_report(backend: &HttpBackend, json: bool) -> Result<()> {
    match backend
        .generate_report()
        .await
        .context("requesting report generation")?
    {
        ReportOutcome::Ready(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", repl::format_report(&report));
            }
            Ok(())
        }
        ReportOutcome::Failed {
            reason,
            fallback_url,
        } => match fallback_url {
            Some(url) => anyhow::bail!("report generation failed: {reason} (manual calculator: {url})"),
            None => anyhow::bail!("report generation failed: {reason}"),
        },
    }
}

fn load_config(path: Option<PathBuf>, base_url: Option<String>) -> Result<ClientConfig> {
    let mut cfg = ClientConfig::load(path.as_deref()).context("loading configuration")?;
    if let Some(url) = base_url {
        cfg.set_base_url(&url).context("parsing --base-url")?;
    }
    debug!(base_url = %cfg.base_url, "configuration loaded");
    Ok(cfg)
}

fn backend(path: Option<PathBuf>, base_url: Option<String>) -> Result<HttpBackend> {
    let cfg = load_config(path, base_url)?;
    HttpBackend::new(&cfg).context("building backend client")
}
