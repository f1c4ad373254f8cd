//! Summarize long documents with a sliding context window.
//!
//! Reads the API key from `LONGREAD_API_KEY` (or `OPENROUTER_KEY`); a `.env`
//! file in the working directory is loaded first.
//!
//! # Examples
//!
//! ```sh
//! # Summary of a local file to stdout
//! longread report.txt
//!
//! # A web page, tersely, into a file
//! longread https://example.com/article --summary-level terse -o summary.txt
//!
//! # Custom instructions appended to the level template
//! longread notes.md --prompt "Focus on action items." --prompt-mode append
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use longread::prelude::*;
use longread_cli::config::{EnvConfig, FileConfig, Overrides, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Summarize a document larger than the model's context window.
#[derive(Parser)]
#[command(name = "longread", version)]
struct Cli {
    /// File path or http(s) URL of the document.
    input: String,

    /// Write the summary here instead of stdout. Replaced only on success.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Summary level: verbose, concise, terse, barney, transcribe, or one
    /// defined in the config file.
    #[arg(short = 'l', long, default_value = "verbose")]
    summary_level: String,

    /// Custom instructions for the model.
    #[arg(long)]
    prompt: Option<String>,

    /// How --prompt combines with the level template: replace or append.
    #[arg(long, default_value = "replace")]
    prompt_mode: PromptMode,

    /// Model identifier. Overrides LONGREAD_MODEL and the config file.
    #[arg(long)]
    model: Option<String>,

    /// Chat-completions URL. Overrides LONGREAD_ENDPOINT and the config file.
    #[arg(long)]
    endpoint: Option<String>,

    /// Config file. Defaults to ./longread.toml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Attempt ceiling for rate-limit and timeout retries.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Input format (text, html, pdf, docx). Detected when omitted.
    #[arg(long)]
    format: Option<SourceFormat>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            level: self.summary_level.clone(),
            prompt: self.prompt.clone(),
            prompt_mode: self.prompt_mode,
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // Before tracing, so RUST_LOG may come from .env.
    let dotenv = dotenvy::dotenv();
    init_tracing(cli.verbose);
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("longread={level},longread_cli={level}")));

    // Logs go to stderr; stdout carries only the summary.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file = FileConfig::discover(cli.config.as_deref(), Path::new("."))?;
    let settings = Settings::resolve(file, EnvConfig::from_env(), cli.overrides())?;
    let client = OpenRouterClient::new(settings.service)?;
    info!(
        "Level '{}' via {} ({})",
        settings.engine.level.name,
        client.endpoint(),
        settings.engine.model.as_deref().unwrap_or("endpoint default model"),
    );

    let source = Source::parse(&cli.input);
    let text = extract_text(&source, cli.format)
        .await
        .with_context(|| format!("could not read input {}", source.locator()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the run");
            on_interrupt.cancel();
        }
    });

    let output = Engine::new(&client, settings.engine)
        .with_event_handler(&LoggingHandler)
        .with_cancellation(cancel)
        .run(&text)
        .await
        .context("summarization failed; no output written")?;

    info!(
        "{} chunks, {} requests ({} retries), {} prompt + {} completion tokens",
        output.chunks,
        output.completion_calls,
        output.retries,
        output.prompt_tokens,
        output.completion_tokens,
    );
    if output.text.is_empty() {
        warn!("The model returned no usable text; the summary is empty");
    }

    match cli.output {
        Some(path) => {
            write_summary(&path, &output.text).await?;
            info!("Summary written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(output.text.as_bytes())
                .context("failed to write summary to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
