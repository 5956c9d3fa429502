pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "carseek",
    about = "CarSeek vehicle search assistant CLI",
    long_about = "Chat with the CarSeek vehicle search assistant and operate its \
                  database: migrations, inventory seeding, config inspection, and \
                  readiness checks.",
    after_help = "Examples:\n  carseek chat\n  carseek seed --count 200\n  carseek doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive vehicle search conversation")]
    Chat,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Generate and load a synthetic vehicle inventory")]
    Seed {
        #[arg(long, help = "Number of vehicles to generate (defaults to seed.vehicle_count)")]
        count: Option<u32>,
    },
    #[command(about = "List available brands with their lowest listed price")]
    Brands,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM readiness, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat => commands::chat::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed { count } => commands::seed::run(count),
        Command::Brands => commands::brands::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
