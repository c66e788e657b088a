//! Stevedore CLI -- container lifecycle for multi-service projects
//!
//! ```text
//! stevedore up [-d] [SERVICE...]      create + start (follow logs unless -d)
//! stevedore down|rm|restart [SERVICE...]
//! stevedore pull [SERVICE...]
//! stevedore ps [SERVICE...]
//! stevedore logs [--tail N] [SERVICE...]
//! stevedore config validate|show [--section NAME]
//! ```

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use stevedore_core::config::{GeneralConfig, StevedoreConfig};

use crate::cli::{Cli, Commands};
use crate::commands::lifecycle::Action;
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 설정 파일이 깨져 있어도 `config validate`가 보고할 수 있도록 기본값으로 로깅을 시작
    let mut general = match StevedoreConfig::load(&cli.config).await {
        Ok(config) => config.general,
        Err(_) => GeneralConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general)?;

    if let Err(e) = run(cli).await {
        use colored::Colorize;
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let config_path = cli.config.as_path();

    match cli.command {
        Commands::Up(args) => commands::lifecycle::execute_up(args, config_path, &writer).await,
        Commands::Down(args) => {
            commands::lifecycle::execute(Action::Down, args, config_path, &writer).await
        }
        Commands::Rm(args) => {
            commands::lifecycle::execute(Action::Rm, args, config_path, &writer).await
        }
        Commands::Restart(args) => {
            commands::lifecycle::execute(Action::Restart, args, config_path, &writer).await
        }
        Commands::Pull(args) => {
            commands::lifecycle::execute(Action::Pull, args, config_path, &writer).await
        }
        Commands::Ps(args) => commands::ps::execute(args, config_path, &writer).await,
        Commands::Logs(args) => commands::logs::execute(args, config_path).await,
        Commands::Config(args) => commands::config::execute(args, config_path, &writer).await,
    }
}
