//! Chat command

use crate::app::{ChatArgs, OutputFormat};
use anyhow::{anyhow, Result};
use futures::StreamExt;
use ragline_core::{AppContext, Config, TurnEvent};
use std::io::{self, Write};

pub async fn run(args: ChatArgs, config: Config, format: OutputFormat) -> Result<()> {
    let prompt = args.prompt.join(" ");
    let context = AppContext::bootstrap(config)?;

    if args.stream && format == OutputFormat::Cli {
        return stream_answer(&context, &args.thread, &prompt).await;
    }

    let answer = context.orchestrator.run_turn(&args.thread, &prompt).await?;
    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "thread_id": args.thread,
                "response": answer.text(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Cli => println!("{}", answer.text()),
    }
    Ok(())
}

async fn stream_answer(context: &AppContext, thread: &str, prompt: &str) -> Result<()> {
    let mut events = context.orchestrator.clone().stream_turn(thread, prompt);
    let mut finished = false;

    while let Some(event) = events.next().await {
        match event? {
            TurnEvent::Fragment(content) => {
                print!("{}", content.text());
                io::stdout().flush().ok();
            }
            TurnEvent::Finished(_) => finished = true,
        }
    }
    println!();

    if !finished {
        return Err(anyhow!("Turn ended without an answer"));
    }
    Ok(())
}
