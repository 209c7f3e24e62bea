use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use exam_shell::app::{App, AppError};
use exam_shell::config::AppConfig;
use exam_shell::console::{self, Command, Reply};

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("configuration error: {0}")]
    Config(#[from] exam_shell::config::ConfigError),
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "exam-shell", about = "Browse exam and student records from the terminal")]
struct Cli {
    /// API base URL; overrides EXAM_SHELL_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Starting hash, e.g. `#/students`; overrides EXAM_SHELL_INITIAL_HASH.
    #[arg(long)]
    hash: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("exam_shell=info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, ".env could not be loaded");
        }
    }

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config = config.with_api_base_url(&url)?;
    }
    if let Some(hash) = cli.hash {
        config.initial_hash = hash;
    }

    let app = App::from_config(config)?;
    app.start().await?;
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(console::CommandError::Empty) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match console::execute(&app, command) {
            Reply::Silent => {}
            Reply::Print(text) => println!("{text}"),
            Reply::Quit => break,
        }
    }

    app.stop();
    Ok(())
}
