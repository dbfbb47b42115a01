pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Customer-service concierge operator CLI",
    long_about = "Inspect effective configuration and send one-off questions through the agent orchestration.",
    after_help = "Examples:\n  concierge config\n  concierge ask \"What's the status of order 12345?\"\n  concierge ask \"order id 19328\" --history \"user:I want to cancel my order\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Send a single message through orchestration and print the reply as JSON")]
    Ask {
        message: String,
        #[arg(long = "history", value_name = "ROLE:CONTENT", help = "Prior turn, repeatable")]
        history: Vec<String>,
        #[arg(long, help = "Report exhausted orchestration as an error instead of the fallback")]
        strict: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Ask { message, history, strict } => {
            commands::ask::run(&message, &history, strict)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
