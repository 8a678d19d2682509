//! Operator console on stdin.

use rapid_framework::{CommandRegistry, CommandSender};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// The operator at the terminal. Holds every permission.
pub struct ConsoleSender;

impl CommandSender for ConsoleSender {
    fn display_name(&self) -> String {
        "CONSOLE".to_string()
    }

    fn send_message(&self, message: &str) {
        println!("{}", message);
    }

    fn has_permission(&self, _permissions: &[&str]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Stop,
}

/// Handles one console line.
pub fn handle_line(registry: &CommandRegistry, sender: &dyn CommandSender, line: &str) -> LineOutcome {
    let line = line.trim();
    match line {
        "" => {}
        "stop" | "quit" | "exit" => {
            info!("🛑 Stop requested from console");
            return LineOutcome::Stop;
        }
        "help" | "?" => {
            registry.help(sender);
            sender.send_message("stop - shut the host down");
        }
        _ => {
            if let Err(e) = registry.dispatch(sender, line) {
                debug!("Console command failed: {}", e);
            }
        }
    }
    LineOutcome::Continue
}

/// Reads commands until `stop` or end of input.
pub async fn run(registry: Arc<CommandRegistry>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let sender = ConsoleSender;

    info!("⌨️ Console ready, type 'help' for commands");
    while let Some(line) = lines.next_line().await? {
        if handle_line(&registry, &sender, &line) == LineOutcome::Stop {
            break;
        }
    }
    Ok(())
}
