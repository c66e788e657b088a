//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Stevedore -- container lifecycle for multi-service projects.
///
/// Use `stevedore <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "stevedore", version, about, long_about = None)]
pub struct Cli {
    /// Path to the stevedore.toml configuration file.
    #[arg(short, long, default_value = "stevedore.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create and start service containers.
    Up(UpArgs),

    /// Stop service containers.
    Down(TargetArgs),

    /// Stop and remove service containers (volumes are kept).
    Rm(TargetArgs),

    /// Restart service containers.
    Restart(TargetArgs),

    /// List the containers of each service.
    Ps(PsArgs),

    /// Pull service images.
    Pull(TargetArgs),

    /// Follow container output.
    Logs(LogsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- shared ----

/// Which services and which instance to act on.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Services to act on (default: every declared service).
    pub services: Vec<String>,

    /// Instance number used in the container name (`<project>_<service>_<n>`).
    #[arg(long, default_value_t = 1)]
    pub index: u32,
}

// ---- up ----

#[derive(Args, Debug)]
pub struct UpArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Return once containers are started instead of following their logs.
    #[arg(short = 'd', long)]
    pub detach: bool,
}

// ---- ps ----

#[derive(Args, Debug)]
pub struct PsArgs {
    /// Services to list (default: every declared service).
    pub services: Vec<String>,
}

// ---- logs ----

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of backlog lines per container (default: project.log_tail_lines).
    #[arg(long)]
    pub tail: Option<usize>,
}

// ---- config ----

/// Manage stevedore configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, docker, project, services).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_up_defaults() {
        let cli = Cli::try_parse_from(["stevedore", "up"]).expect("should parse 'up'");
        match cli.command {
            Commands::Up(args) => {
                assert!(!args.detach, "detach should default to false");
                assert!(args.target.services.is_empty(), "no services selected");
                assert_eq!(args.target.index, 1, "index should default to 1");
            }
            _ => panic!("expected Up command"),
        }
    }

    #[test]
    fn test_cli_parse_up_detached_with_services() {
        let cli = Cli::try_parse_from(["stevedore", "up", "-d", "web", "db"])
            .expect("should parse 'up -d web db'");
        match cli.command {
            Commands::Up(args) => {
                assert!(args.detach);
                assert_eq!(args.target.services, vec!["web", "db"]);
            }
            _ => panic!("expected Up command"),
        }
    }

    #[test]
    fn test_cli_parse_rm_with_index() {
        let cli = Cli::try_parse_from(["stevedore", "rm", "--index", "3", "worker"])
            .expect("should parse rm");
        match cli.command {
            Commands::Rm(args) => {
                assert_eq!(args.index, 3);
                assert_eq!(args.services, vec!["worker"]);
            }
            _ => panic!("expected Rm command"),
        }
    }

    #[test]
    fn test_cli_parse_logs_tail() {
        let cli = Cli::try_parse_from(["stevedore", "logs", "--tail", "50", "web"])
            .expect("should parse logs");
        match cli.command {
            Commands::Logs(args) => {
                assert_eq!(args.tail, Some(50));
                assert_eq!(args.target.services, vec!["web"]);
            }
            _ => panic!("expected Logs command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["stevedore", "config", "show", "--section", "project"])
            .expect("should parse config show");
        match cli.command {
            Commands::Config(args) => match args.action {
                ConfigAction::Show { section } => assert_eq!(section.as_deref(), Some("project")),
                ConfigAction::Validate => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "ps",
            "--output",
            "json",
            "--config",
            "/etc/stevedore.toml",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after subcommand");
        assert!(matches!(cli.output, OutputFormat::Json));
        assert_eq!(cli.config, PathBuf::from("/etc/stevedore.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_rejects_unknown_output_format() {
        let result = Cli::try_parse_from(["stevedore", "ps", "--output", "yaml"]);
        assert!(result.is_err(), "yaml output should be rejected");
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Cli::try_parse_from(["stevedore"]);
        assert!(result.is_err(), "subcommand is required");
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
