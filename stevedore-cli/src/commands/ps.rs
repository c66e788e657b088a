//! `stevedore ps` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use stevedore_compose::{ContainerState, Project, RuntimeClient};

use crate::cli::PsArgs;
use crate::commands::{open_project, selection};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, Table};

/// Length of the short container id shown in text output.
const SHORT_ID_LEN: usize = 12;

/// Execute the `ps` command.
pub async fn execute(args: PsArgs, config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let project = open_project(config_path, |_| {}).await?;
    let report = collect(&project, &args.services).await?;
    writer.render(&report)?;
    Ok(())
}

/// List every container labelled with the project and a selected service.
pub(crate) async fn collect<C: RuntimeClient>(
    project: &Project<C>,
    requested: &[String],
) -> Result<PsReport, CliError> {
    let client = project.context().client();
    let mut rows = Vec::new();

    for name in selection(project, requested)? {
        let service = project.create_service(&name)?;
        for summary in service.containers().await? {
            let info = client.inspect(&summary.id).await?;
            rows.push(ContainerRow {
                service: name.clone(),
                name: summary.name,
                id: summary.id,
                image: info.image,
                state: if info.running {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                },
            });
        }
    }

    info!(project = project.name(), containers = rows.len(), "containers listed");
    Ok(PsReport {
        project: project.name().to_owned(),
        containers: rows,
    })
}

#[derive(Debug, Serialize)]
pub struct PsReport {
    pub project: String,
    pub containers: Vec<ContainerRow>,
}

#[derive(Debug, Serialize)]
pub struct ContainerRow {
    pub service: String,
    pub name: String,
    pub id: String,
    pub image: String,
    pub state: ContainerState,
}

impl Render for PsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.containers.is_empty() {
            writeln!(w, "No containers in project {}", self.project.bold())?;
            return Ok(());
        }

        let mut table = Table::new(&["SERVICE", "NAME", "ID", "IMAGE", "STATE"]);
        for c in &self.containers {
            let id: String = c.id.chars().take(SHORT_ID_LEN).collect();
            table.row(vec![
                c.service.clone(),
                c.name.clone(),
                id,
                c.image.clone(),
                c.state.as_str().to_owned(),
            ]);
        }
        table.write(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(service: &str, state: ContainerState) -> ContainerRow {
        ContainerRow {
            service: service.to_owned(),
            name: format!("shop_{service}_1"),
            id: "4f2a9c1b7d3e8f0a1b2c3d4e5f6a7b8c".to_owned(),
            image: "nginx:latest".to_owned(),
            state,
        }
    }

    #[test]
    fn test_ps_report_shortens_ids() {
        let report = PsReport {
            project: "shop".to_owned(),
            containers: vec![row("web", ContainerState::Running)],
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("utf8");

        assert!(output.contains("4f2a9c1b7d3e "));
        assert!(!output.contains("4f2a9c1b7d3e8"));
        assert!(output.contains("running"));
    }

    #[test]
    fn test_ps_report_empty() {
        let report = PsReport {
            project: "shop".to_owned(),
            containers: Vec::new(),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        assert!(String::from_utf8(buffer).expect("utf8").contains("No containers"));
    }

    #[test]
    fn test_ps_report_json_keeps_full_id() {
        let report = PsReport {
            project: "shop".to_owned(),
            containers: vec![row("db", ContainerState::Stopped)],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["containers"][0]["id"], "4f2a9c1b7d3e8f0a1b2c3d4e5f6a7b8c");
        assert_eq!(json["containers"][0]["state"], "stopped");
    }
}
