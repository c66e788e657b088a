//! `stevedore up|down|rm|restart|pull` command handlers

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use stevedore_compose::{ContainerState, LogTask, Project, RuntimeClient};

use crate::cli::{TargetArgs, UpArgs};
use crate::commands::{logs, open_project, selection, start_order};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, Table};

/// Lifecycle operation applied to each selected service container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Up,
    Down,
    Rm,
    Restart,
    Pull,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Rm => "rm",
            Self::Restart => "restart",
            Self::Pull => "pull",
        }
    }

    /// Stopping and removing walk the dependency order backwards.
    fn reversed(&self) -> bool {
        matches!(self, Self::Down | Self::Rm)
    }
}

/// Execute the `up` command.
///
/// Without `--detach` the command keeps forwarding container output until
/// every stream ends or Ctrl-C is pressed.
pub async fn execute_up(
    args: UpArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let project = open_project(config_path, |_| {}).await?;
    let (report, tasks) = apply(&project, &args.target, Action::Up).await?;
    writer.render(&report)?;

    if args.detach {
        for task in &tasks {
            task.cancel();
        }
        return Ok(());
    }
    logs::follow(tasks).await;
    Ok(())
}

/// Execute `down`, `rm`, `restart` or `pull`.
pub async fn execute(
    action: Action,
    args: TargetArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let project = open_project(config_path, |_| {}).await?;
    let (report, _) = apply(&project, &args, action).await?;
    writer.render(&report)?;
    Ok(())
}

/// Apply `action` to instance `args.index` of every selected service.
///
/// Stops at the first failing service; containers handled before it keep
/// their new state.
pub(crate) async fn apply<C: RuntimeClient>(
    project: &Project<C>,
    args: &TargetArgs,
    action: Action,
) -> Result<(LifecycleReport, Vec<LogTask>), CliError> {
    let mut names = if action == Action::Pull {
        selection(project, &args.services)?
    } else {
        start_order(project.context().services(), &args.services)?
    };
    if action.reversed() {
        names.reverse();
    }

    let mut report = LifecycleReport {
        project: project.name().to_owned(),
        action,
        containers: Vec::with_capacity(names.len()),
    };
    let mut tasks = Vec::new();

    for name in &names {
        let service = project.create_service(name)?;
        let handle = service.container(args.index);
        info!(service = %name, container = handle.name(), action = action.as_str(), "applying");

        match action {
            Action::Up => tasks.extend(handle.up().await?),
            Action::Down => handle.down().await?,
            Action::Rm => handle.delete().await?,
            Action::Restart => handle.restart().await?,
            Action::Pull => handle.pull().await?,
        }

        report.containers.push(ContainerOutcome {
            service: name.clone(),
            container: handle.name().to_owned(),
            state: handle.state().await?,
        });
    }

    Ok((report, tasks))
}

/// Result of one lifecycle command.
#[derive(Debug, Serialize)]
pub struct LifecycleReport {
    pub project: String,
    pub action: Action,
    pub containers: Vec<ContainerOutcome>,
}

#[derive(Debug, Serialize)]
pub struct ContainerOutcome {
    pub service: String,
    pub container: String,
    pub state: ContainerState,
}

impl Render for LifecycleReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.containers.is_empty() {
            writeln!(w, "No services selected in project {}", self.project.bold())?;
            return Ok(());
        }

        writeln!(
            w,
            "{} {} ({} containers)",
            self.action.as_str().bold(),
            self.project,
            self.containers.len()
        )?;

        let mut table = Table::new(&["SERVICE", "CONTAINER", "STATE"]);
        for c in &self.containers {
            table.row(vec![
                c.service.clone(),
                c.container.clone(),
                c.state.as_str().to_owned(),
            ]);
        }
        table.write(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(action: Action, rows: &[(&str, ContainerState)]) -> LifecycleReport {
        LifecycleReport {
            project: "shop".to_owned(),
            action,
            containers: rows
                .iter()
                .map(|(service, state)| ContainerOutcome {
                    service: (*service).to_owned(),
                    container: format!("shop_{service}_1"),
                    state: *state,
                })
                .collect(),
        }
    }

    #[test]
    fn test_action_order_direction() {
        assert!(Action::Down.reversed());
        assert!(Action::Rm.reversed());
        assert!(!Action::Up.reversed());
        assert!(!Action::Restart.reversed());
    }

    #[test]
    fn test_lifecycle_report_text() {
        let report = report(
            Action::Up,
            &[("db", ContainerState::Running), ("web", ContainerState::Running)],
        );

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("utf8");

        assert!(output.contains("2 containers"));
        assert!(output.contains("shop_web_1"));
        assert!(output.contains("running"));
    }

    #[test]
    fn test_lifecycle_report_empty() {
        let report = report(Action::Down, &[]);
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        assert!(String::from_utf8(buffer).expect("utf8").contains("No services selected"));
    }

    #[test]
    fn test_lifecycle_report_json() {
        let report = report(Action::Rm, &[("worker", ContainerState::Absent)]);
        let json = serde_json::to_value(&report).expect("serialize");

        assert_eq!(json["action"], "rm");
        assert_eq!(json["containers"][0]["container"], "shop_worker_1");
        assert_eq!(json["containers"][0]["state"], "absent");
    }
}
