pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "welcomebot",
    about = "WelcomeBot operator CLI",
    long_about = "Inspect configuration, validate welcome message settings, and manage the KV store schema.",
    after_help = "Examples:\n  welcomebot config\n  welcomebot check-messages plugin-settings.json\n  welcomebot migrate"
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
    #[command(about = "Parse a plugin settings JSON file and report the configured teams")]
    CheckMessages {
        #[arg(help = "Path to the plugin settings JSON document")]
        file: PathBuf,
    },
    #[command(about = "Apply pending KV store migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::CheckMessages { file } => commands::check_messages::run(&file),
        Command::Migrate => commands::migrate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
