//! `chatrelay chat`: interactive REPL command.
//!
//! Each line is an inbound text for one console session and goes through
//! the same relay as HTTP traffic: slash commands, debouncing, dispatch,
//! rendering. Replies are printed by the console transport, so they show up
//! after the quiet interval rather than in lockstep with the prompt.

use std::sync::Arc;

use cr_domain::config::Config;
use cr_domain::envelope::Envelope;

use crate::bootstrap;
use crate::handlers::HandlerRegistry;
use crate::transport::ConsoleTransport;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL until `/exit`, Ctrl+D or a readline error.
pub async fn chat(
    config: Arc<Config>,
    session: String,
    lang: Option<String>,
) -> anyhow::Result<()> {
    // 1. Boot the runtime on the console transport.
    let state = bootstrap::build_app_state(
        config,
        Arc::new(ConsoleTransport::new()),
        HandlerRegistry::with_builtin(),
        None,
    )?;
    let workers = bootstrap::spawn_background_tasks(&state);

    // 2. Initialize rustyline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".chatrelay")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 3. Print banner to stderr (keep stdout for replies).
    eprintln!("chatrelay interactive chat");
    eprintln!("Session: {session}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    let mut envelope = Envelope::new(session.clone(), session);
    envelope.language_hint = lang;

    // 4. REPL loop.
    loop {
        let readline = rl.readline("you> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                match local_command(trimmed) {
                    Some(Local::Exit) => break,
                    Some(Local::Help) => print_help(),
                    Some(Local::Flush) => {
                        let outcome = state
                            .relay
                            .debouncer()
                            .flush(&envelope.session_id)
                            .await;
                        eprintln!("\x1B[2m[flush: {outcome:?}]\x1B[0m");
                    }
                    None => {
                        if let Err(e) = state.relay.on_text(envelope.clone(), trimmed).await {
                            eprintln!("\x1B[31merror: {e}\x1B[0m");
                        }
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                break;
            }
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 5. Save history, then let in-flight jobs finish.
    rl.save_history(&history_path).ok();
    state.queue.close();
    for handle in workers {
        handle.await.ok();
    }

    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REPL-local commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, PartialEq, Eq)]
enum Local {
    Exit,
    Help,
    Flush,
}

/// Commands handled by the REPL itself. Everything else, including
/// `/start`, `/mode` and `/lang`, goes to the relay.
fn local_command(input: &str) -> Option<Local> {
    match input.split_whitespace().next()? {
        "/exit" | "/quit" => Some(Local::Exit),
        "/help" => Some(Local::Help),
        "/flush" => Some(Local::Flush),
        _ => None,
    }
}

fn print_help() {
    eprintln!("Commands:");
    eprintln!("  /start           Welcome message, or the mode menu");
    eprintln!("  /mode [name]     Show the mode keyboard, or switch mode");
    eprintln!("  /lang [code]     Show the language keyboard, or switch language");
    eprintln!("  /flush           Send buffered input now instead of waiting");
    eprintln!("  /exit, /quit     Exit the chat");
    eprintln!("  /help            Show this help");
}
