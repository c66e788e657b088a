//! `stevedore config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use stevedore_core::config::StevedoreConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// 환경변수 키에 이 단어가 들어 있으면 값을 가린다
const SECRET_MARKERS: &[&str] = &["PASSWORD", "SECRET", "TOKEN", "KEY", "CREDENTIAL"];

const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// Loads the file (including env overrides) and reports the first error, if any.
///
/// # Errors
///
/// Returns `CliError::Config` when the configuration is invalid, after the
/// report has been rendered.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match StevedoreConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            services: config.services.len(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            services: 0,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults)
/// with secret-looking service environment values redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = StevedoreConfig::load(config_path).await?;
    redact_environment(&mut config);

    let report = ConfigReport {
        source: config_path.display().to_string(),
        config_toml: section_toml(&config, section.as_deref())?,
        section,
    };

    writer.render(&report)?;

    Ok(())
}

/// Serialise the whole configuration or a single section as TOML.
fn section_toml(config: &StevedoreConfig, section: Option<&str>) -> Result<String, CliError> {
    let rendered = match section {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("docker") => toml::to_string_pretty(&config.docker),
        Some("project") => toml::to_string_pretty(&config.project),
        Some("services") => toml::to_string_pretty(&config.services),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, docker, project, services)"
            )));
        }
    };
    Ok(rendered.unwrap_or_else(|e| format!("(serialization error: {e})")))
}

/// Replace the value of `KEY=VALUE` entries whose key looks like a secret.
fn redact_environment(config: &mut StevedoreConfig) {
    for service in config.services.values_mut() {
        for entry in &mut service.environment {
            *entry = redact_entry(entry);
        }
    }
}

fn redact_entry(entry: &str) -> String {
    let Some((key, value)) = entry.split_once('=') else {
        return entry.to_owned();
    };
    if value.is_empty() {
        return entry.to_owned();
    }
    let upper = key.to_ascii_uppercase();
    if SECRET_MARKERS.iter().any(|marker| upper.contains(marker)) {
        format!("{key}={REDACTED}")
    } else {
        entry.to_owned()
    }
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{section}]");
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Number of declared services (0 when invalid)
    pub services: usize,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  Services: {}", self.services)?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
