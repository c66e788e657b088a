//! `stevedore logs` command handler

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stevedore_compose::LogTask;

use crate::cli::LogsArgs;
use crate::commands::{open_project, selection};
use crate::error::CliError;

/// Execute the `logs` command.
///
/// Output lines go straight to stdout as `container | line`, so the
/// `--output` format does not apply here.
pub async fn execute(args: LogsArgs, config_path: &Path) -> Result<(), CliError> {
    let tail = args.tail;
    let project = open_project(config_path, |compose| {
        if let Some(lines) = tail {
            compose.log_tail_lines = lines;
        }
    })
    .await?;

    let mut tasks = Vec::new();
    for name in selection(&project, &args.target.services)? {
        let service = project.create_service(&name)?;
        tasks.push(service.container(args.target.index).log()?);
    }

    follow(tasks).await;
    Ok(())
}

/// Wait for every log task, cancelling all of them on Ctrl-C.
pub(crate) async fn follow(tasks: Vec<LogTask>) {
    if tasks.is_empty() {
        return;
    }
    info!(streams = tasks.len(), "following container output, press Ctrl-C to stop");

    let tokens: Vec<CancellationToken> = tasks.iter().map(LogTask::cancellation_token).collect();
    let joined = futures::future::join_all(tasks.into_iter().map(|task| async move {
        let container = task.container().to_owned();
        (container, task.join().await)
    }));
    tokio::pin!(joined);

    let results = tokio::select! {
        results = &mut joined => results,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping log streams");
            for token in &tokens {
                token.cancel();
            }
            joined.await
        }
    };

    for (container, result) in results {
        if let Err(e) = result {
            warn!(container = %container, error = %e, "log stream failed");
        }
    }
}
