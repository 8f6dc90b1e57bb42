//! `stylesmith chat`: Interactive or single-message chat mode.

use std::io::Write;
use stylesmith_agent::{LoopOutcome, LoopState, strip_tool_artifacts};
use stylesmith_config::AppConfig;
use stylesmith_core::event::LoopEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::session::{Session, build_session};

pub async fn run(site: &str, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for an API key early and give a clear error
    let provider = match stylesmith_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    STYLESMITH_API_KEY   (generic)");
            eprintln!("    OPENAI_API_KEY       (for OpenAI direct)");
            eprintln!("    OPENROUTER_API_KEY   (for OpenRouter)");
            eprintln!();
            eprintln!("  Or add `api_key` to {}", AppConfig::config_path().display());
            eprintln!();
            return Err("No usable model endpoint. See above for setup instructions.".into());
        }
    };

    let mut session = build_session(&config, site, provider);
    let progress = spawn_progress_printer(&session);

    if let Some(msg) = message {
        // Single message mode
        let outcome = run_turn(&mut session, &msg).await;
        print_outcome(&outcome);
        progress.abort();
        return if outcome.is_failure() {
            Err(outcome.error.unwrap_or_else(|| "run failed".into()).into())
        } else {
            Ok(())
        };
    }

    println!();
    println!("  stylesmith interactive mode");
    println!();
    println!("  Site:      {}", session.target.site);
    println!("  Provider:  {}", session.provider_name);
    println!("  Model:     {}", config.provider.model);
    println!("  Tools:     {}", session.controller.tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops a running turn. '/reset' starts over, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                session.state.reset();
                println!("  Started a new conversation.");
                println!();
                continue;
            }
            _ => {}
        }

        let outcome = run_turn(&mut session, input).await;
        print_outcome(&outcome);
    }

    progress.abort();
    println!();
    Ok(())
}

/// Run one turn; Ctrl+C trips the abort flag while it is in flight.
async fn run_turn(session: &mut Session, input: &str) -> LoopOutcome {
    session.state.resume();
    let handle = session.state.abort_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    let outcome = session.controller.run(&mut session.state, input).await;
    watcher.abort();
    outcome
}

fn spawn_progress_printer(session: &Session) -> JoinHandle<()> {
    let mut rx = session.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = progress_line(&event) {
                        eprintln!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// One status line per tool step.
fn progress_line(event: &LoopEvent) -> Option<String> {
    match event {
        LoopEvent::ToolStarted { tool_name, .. } => Some(format!("  ⚙ {tool_name} ...")),
        LoopEvent::ToolFinished {
            tool_name,
            success: false,
            error,
            ..
        } => Some(format!(
            "  ✗ {tool_name}: {}",
            error.as_deref().unwrap_or("failed")
        )),
        LoopEvent::WritesWithheld { withheld, .. } => {
            Some(format!("  ⏸ withheld: {}", withheld.join(", ")))
        }
        _ => None,
    }
}

fn print_outcome(outcome: &LoopOutcome) {
    for notice in &outcome.notices {
        eprintln!("  note: {notice}");
    }
    println!();
    for line in render_outcome(outcome).lines() {
        println!("  Assistant > {line}");
    }
    println!();
}

/// Text shown to the user for a finished run.
fn render_outcome(outcome: &LoopOutcome) -> String {
    match outcome.state {
        LoopState::Failed => {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            format!("[Error] {error}")
        }
        _ => {
            let text = strip_tool_artifacts(&outcome.response);
            if text.is_empty() {
                "(no reply)".to_string()
            } else {
                text
            }
        }
    }
}
