//! Minimal summarization: one file in, summary out.
//!
//! Prints a progress line per chunk on stderr and the summary on stdout,
//! followed by request and token counts.
//!
//! # Usage
//!
//! ```bash
//! LONGREAD_API_KEY=sk-... cargo run --example summarize_file -- report.txt concise
//! ```

use longread::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: summarize_file <path> [level]")?;
    let level = args.next().unwrap_or_else(|| SummaryLevel::default().name().to_string());

    // 1. Create the client.
    let api_key = std::env::var("LONGREAD_API_KEY")
        .or_else(|_| std::env::var("OPENROUTER_KEY"))
        .map_err(|_| "Set LONGREAD_API_KEY to your API key")?;
    let client = OpenRouterClient::new(ServiceConfig::new(api_key))?;

    // 2. Pick a level.
    let config = EngineConfig::for_level(&level)?;

    // 3. Get the text.
    let text = extract_text(&Source::parse(&path), None).await?;

    // 4. Run, reporting progress as chunks complete.
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(EventObserver::new(|event| {
            if let Some(pct) = event.progress_percent() {
                eprintln!("{pct:.0}% done");
            }
        }));
    let output = Engine::new(&client, config)
        .with_event_handler(&handler)
        .run(&text)
        .await?;

    // 5. Print results.
    print!("{}", output.text);
    eprintln!(
        "--- {} chunks | {} requests | {} tokens ---",
        output.chunks,
        output.completion_calls,
        output.total_tokens()
    );
    Ok(())
}
