//! Container runtime abstraction for testability.
//!
//! The [`RuntimeClient`] trait is everything the lifecycle code needs from a
//! container backend. Production code uses [`BollardRuntimeClient`], which
//! talks to the Docker Engine API; tests use `MockRuntimeClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌────────────────────┐
//! │ ContainerHandle │   │ DependencyResolver │
//! └────────┬────────┘   └─────────┬──────────┘
//!          │                      │
//!          ▼                      ▼
//!        ┌──────────────────────────┐
//!        │   RuntimeClient (trait)  │
//!        └──────────────────────────┘
//!             │               │
//!             ▼               ▼
//!        ┌─────────┐     ┌──────┐
//!        │ Bollard │     │ Mock │
//!        └────┬────┘     └──────┘
//!             │
//!             ▼
//!       Docker Daemon
//! ```
//!
//! # Log Streams
//!
//! [`RuntimeClient::stream_logs`] yields raw bytes in the Docker wire format:
//! plain text for TTY containers, 8-byte framed stdout/stderr records
//! otherwise. Splitting them is the job of [`crate::logs`].

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use stevedore_core::types::{HostConfigPatch, NamespaceMode};

use crate::auth::RegistryCredential;
use crate::error::ComposeError;
use crate::image::ImageReference;
use crate::logs::{StdStream, encode_frame};

/// Byte stream returned by [`RuntimeClient::stream_logs`].
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, ComposeError>> + Send>>;

/// Container as returned by a by-name or by-label lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Name without the leading `/` the Docker API adds.
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Read-only view of an inspected container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    /// Whether a pseudo-terminal was allocated; decides the log stream format.
    pub tty: bool,
    pub labels: BTreeMap<String, String>,
    pub host_config: HostConfigPatch,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub tty: bool,
    pub host_config: HostConfigPatch,
}

/// Options for [`RuntimeClient::stream_logs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    /// Number of backlog lines before live output.
    pub tail: usize,
}

/// Validates a container ID before it is put into an API path.
///
/// Docker container IDs are 64-character hex strings (or shorter prefix forms).
fn validate_container_id(id: &str) -> Result<(), ComposeError> {
    if id.is_empty() || id.len() > 64 {
        return Err(ComposeError::Backend(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ComposeError::Backend(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting container runtime operations.
///
/// The trait is `Send + Sync + 'static` so a client can be shared through an
/// `Arc` with the detached log task.
///
/// # Error Handling
///
/// - **404 responses**: `ComposeError::NotFound` (missing image on create, vanished container)
/// - **Connection errors**: `ComposeError::Connection`
/// - **Everything else**: `ComposeError::Backend`
pub trait RuntimeClient: Send + Sync + 'static {
    /// Finds a container (running or not) whose name is exactly `name`.
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ContainerSummary>, ComposeError>> + Send;

    /// Lists all containers (running or not) carrying every given label.
    fn list_by_labels(
        &self,
        labels: &[(String, String)],
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, ComposeError>> + Send;

    /// Creates a container and returns its ID.
    ///
    /// # Errors
    ///
    /// `ComposeError::NotFound` when the image is not present locally.
    fn create(
        &self,
        request: &CreateRequest,
    ) -> impl Future<Output = Result<String, ComposeError>> + Send;

    /// Inspects a container.
    fn inspect(&self, id: &str)
    -> impl Future<Output = Result<RuntimeContainer, ComposeError>> + Send;

    /// Starts a container.
    ///
    /// `host_config` is the patch computed right before the start. Backends
    /// that only accept host configuration at create time may ignore it.
    /// [`BollardRuntimeClient`] does: links resolved after create are not
    /// applied, and the caller logs a warning when they differ.
    fn start(
        &self,
        id: &str,
        host_config: &HostConfigPatch,
    ) -> impl Future<Output = Result<(), ComposeError>> + Send;

    /// Stops a container, killing it after `timeout`.
    fn stop(
        &self,
        id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ComposeError>> + Send;

    /// Restarts a container, killing it after `timeout`.
    fn restart(
        &self,
        id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ComposeError>> + Send;

    /// Removes a container.
    fn remove(
        &self,
        id: &str,
        force: bool,
        remove_volumes: bool,
    ) -> impl Future<Output = Result<(), ComposeError>> + Send;

    /// Pulls an image, optionally authenticated.
    fn pull_image(
        &self,
        image: &ImageReference,
        credential: Option<&RegistryCredential>,
    ) -> impl Future<Output = Result<(), ComposeError>> + Send;

    /// Opens the log stream of a container.
    fn stream_logs(
        &self,
        id: &str,
        options: &LogOptions,
    ) -> impl Future<Output = Result<LogStream, ComposeError>> + Send;

    /// Checks daemon connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), ComposeError>> + Send;
}

/// Production runtime client using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` for sharing across async tasks.
///
/// # Examples
///
/// ```ignore
/// use stevedore_compose::BollardRuntimeClient;
///
/// let client = BollardRuntimeClient::connect_local()?;
/// let client = BollardRuntimeClient::connect_with_socket("/run/docker.sock", 120)?;
/// # Ok::<(), stevedore_compose::ComposeError>(())
/// ```
pub struct BollardRuntimeClient {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntimeClient {
    /// Connects to Docker using the platform's default local socket.
    ///
    /// # Errors
    ///
    /// Returns `ComposeError::Connection` if the connection cannot be set up.
    pub fn connect_local() -> Result<Self, ComposeError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ComposeError::Connection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path and request timeout.
    pub fn connect_with_socket(socket_path: &str, timeout_secs: u64) -> Result<Self, ComposeError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, timeout_secs, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ComposeError::Connection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects using the socket from configuration, or the local default when it is empty.
    pub fn from_config(config: &crate::config::ComposeConfig) -> Result<Self, ComposeError> {
        if config.docker_socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(&config.docker_socket, config.docker_timeout_secs)
        }
    }

    async fn list(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>, ComposeError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| api_error("list containers", e))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default(),
                labels: c.labels.unwrap_or_default().into_iter().collect(),
            })
            .collect())
    }
}

/// Maps a bollard error, keeping 404 responses distinguishable.
fn api_error(operation: &str, err: bollard::errors::Error) -> ComposeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => ComposeError::NotFound(message),
        other => ComposeError::Backend(format!("{operation} failed: {other}")),
    }
}

fn host_config_to_api(patch: &HostConfigPatch) -> bollard::models::HostConfig {
    bollard::models::HostConfig {
        links: (!patch.links.is_empty()).then(|| patch.links.clone()),
        ipc_mode: patch.ipc_mode.as_ref().map(ToString::to_string),
        network_mode: patch.net_mode.as_ref().map(ToString::to_string),
        ..Default::default()
    }
}

fn host_config_from_api(host: Option<bollard::models::HostConfig>) -> HostConfigPatch {
    let host = host.unwrap_or_default();
    HostConfigPatch {
        links: host.links.unwrap_or_default(),
        ipc_mode: host
            .ipc_mode
            .filter(|m| !m.is_empty())
            .map(|m| NamespaceMode::parse(&m)),
        net_mode: host
            .network_mode
            .filter(|m| !m.is_empty())
            .map(|m| NamespaceMode::parse(&m)),
    }
}

impl RuntimeClient for BollardRuntimeClient {
    async fn find_by_name(&self, name: &str) -> Result<Option<ContainerSummary>, ComposeError> {
        // The name filter is a substring match, so confirm the exact name afterwards.
        let mut filters = HashMap::new();
        filters.insert("name".to_owned(), vec![name.to_owned()]);
        let containers = self.list(filters).await?;
        Ok(containers.into_iter().find(|c| c.name == name))
    }

    async fn list_by_labels(
        &self,
        labels: &[(String, String)],
    ) -> Result<Vec<ContainerSummary>, ComposeError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_owned(),
            labels.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        );
        self.list(filters).await
    }

    async fn create(&self, request: &CreateRequest) -> Result<String, ComposeError> {
        use bollard::container::{Config, CreateContainerOptions};

        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(request.image.clone()),
            cmd: (!request.command.is_empty()).then(|| request.command.clone()),
            env: (!request.environment.is_empty()).then(|| request.environment.clone()),
            labels: Some(
                request
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            tty: Some(request.tty),
            host_config: Some(host_config_to_api(&request.host_config)),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| api_error("create container", e))?;

        for warning in &response.warnings {
            debug!(container = %request.name, warning = %warning, "create warning");
        }

        Ok(response.id)
    }

    async fn inspect(&self, id: &str) -> Result<RuntimeContainer, ComposeError> {
        use bollard::container::InspectContainerOptions;

        validate_container_id(id)?;

        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| api_error("inspect container", e))?;

        let config = details.config.unwrap_or_default();
        Ok(RuntimeContainer {
            id: details.id.unwrap_or_else(|| id.to_owned()),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            image: config.image.unwrap_or_default(),
            running: details.state.and_then(|s| s.running).unwrap_or(false),
            tty: config.tty.unwrap_or(false),
            labels: config.labels.unwrap_or_default().into_iter().collect(),
            host_config: host_config_from_api(details.host_config),
        })
    }

    async fn start(&self, id: &str, host_config: &HostConfigPatch) -> Result<(), ComposeError> {
        use bollard::container::StartContainerOptions;

        validate_container_id(id)?;

        // The Engine API only honours host configuration at create time.
        debug!(container_id = id, links = host_config.links.len(), "starting container");

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| api_error("start container", e))
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), ComposeError> {
        use bollard::container::StopContainerOptions;

        validate_container_id(id)?;

        let t = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        self.docker
            .stop_container(id, Some(StopContainerOptions { t }))
            .await
            .map_err(|e| api_error("stop container", e))
    }

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), ComposeError> {
        use bollard::container::RestartContainerOptions;

        validate_container_id(id)?;

        let t = isize::try_from(timeout.as_secs()).unwrap_or(isize::MAX);
        self.docker
            .restart_container(id, Some(RestartContainerOptions { t }))
            .await
            .map_err(|e| api_error("restart container", e))
    }

    async fn remove(&self, id: &str, force: bool, remove_volumes: bool) -> Result<(), ComposeError> {
        use bollard::container::RemoveContainerOptions;

        validate_container_id(id)?;

        let options = RemoveContainerOptions {
            force,
            v: remove_volumes,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| api_error("remove container", e))
    }

    async fn pull_image(
        &self,
        image: &ImageReference,
        credential: Option<&RegistryCredential>,
    ) -> Result<(), ComposeError> {
        use bollard::auth::DockerCredentials;
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: image.name(),
            tag: image
                .tag()
                .or(image.digest())
                .unwrap_or_default()
                .to_owned(),
            ..Default::default()
        };
        let credentials = credential.map(|c| DockerCredentials {
            username: Some(c.username.clone()),
            password: Some(c.password.clone()),
            email: c.email.clone(),
            serveraddress: Some(image.index_server()),
            ..Default::default()
        });

        let mut progress = self.docker.create_image(Some(options), None, credentials);
        while let Some(update) = progress.next().await {
            let info = update.map_err(|e| api_error("pull image", e))?;
            if let Some(status) = info.status {
                debug!(image = %image, status = %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn stream_logs(&self, id: &str, options: &LogOptions) -> Result<LogStream, ComposeError> {
        use bollard::container::{LogOutput, LogsOptions};

        validate_container_id(id)?;

        let options = LogsOptions::<String> {
            follow: options.follow,
            stdout: options.stdout,
            stderr: options.stderr,
            tail: options.tail.to_string(),
            ..Default::default()
        };

        // bollard splits the multiplexed stream already; put the framing back so
        // every client hands the same wire format to the log streamer.
        let stream = self.docker.logs(id, Some(options)).map(|item| {
            item.map(|output| match output {
                LogOutput::Console { message } => message,
                LogOutput::StdIn { message } => encode_frame(StdStream::Stdin, &message),
                LogOutput::StdOut { message } => encode_frame(StdStream::Stdout, &message),
                LogOutput::StdErr { message } => encode_frame(StdStream::Stderr, &message),
            })
            .map_err(|e| api_error("read logs", e))
        });

        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> Result<(), ComposeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ComposeError::Connection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 런타임 클라이언트
///
/// 생성/시작/정지 호출에 따라 내부 상태가 바뀌며, 모든 호출을 순서대로 기록합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntimeClient {
    state: std::sync::Mutex<MockState>,
    fail_pulls: bool,
    endless_logs: bool,
}

#[cfg(test)]
#[derive(Default)]
struct MockState {
    containers: Vec<MockContainer>,
    missing_images: std::collections::HashSet<String>,
    calls: Vec<String>,
    pulls: Vec<(String, Option<String>)>,
    created: Vec<CreateRequest>,
    starts: Vec<(String, HostConfigPatch)>,
    timeouts: Vec<(String, Duration)>,
    log_chunks: Vec<Bytes>,
    next_id: u64,
}

/// Mock 클라이언트가 보관하는 컨테이너
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    pub running: bool,
    pub tty: bool,
    pub host_config: HostConfigPatch,
}

#[cfg(test)]
impl MockContainer {
    /// 레이블이 붙은 테스트 컨테이너를 생성합니다.
    pub fn new(id: &str, name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            image: "busybox".to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn running(mut self) -> Self {
        self.running = true;
        self
    }

    pub fn with_tty(mut self) -> Self {
        self.tty = true;
        self
    }

    fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

#[cfg(test)]
impl MockRuntimeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 컨테이너를 추가합니다.
    pub fn with_container(self, container: MockContainer) -> Self {
        self.lock().containers.push(container);
        self
    }

    /// pull 전까지 `create`가 404를 반환할 이미지를 지정합니다.
    pub fn with_missing_image(self, image: &str) -> Self {
        self.lock().missing_images.insert(image.to_owned());
        self
    }

    /// 모든 pull 호출이 실패하도록 설정합니다.
    pub fn with_failing_pulls(mut self) -> Self {
        self.fail_pulls = true;
        self
    }

    /// 로그 스트림이 돌려줄 청크를 설정합니다.
    pub fn with_log_chunks(self, chunks: Vec<Bytes>) -> Self {
        self.lock().log_chunks = chunks;
        self
    }

    /// 청크를 모두 보낸 뒤에도 스트림이 끝나지 않도록 설정합니다.
    pub fn with_endless_logs(mut self) -> Self {
        self.endless_logs = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn pulls(&self) -> Vec<(String, Option<String>)> {
        self.lock().pulls.clone()
    }

    pub fn created(&self) -> Vec<CreateRequest> {
        self.lock().created.clone()
    }

    pub fn starts(&self) -> Vec<(String, HostConfigPatch)> {
        self.lock().starts.clone()
    }

    /// stop/restart 호출에 전달된 유예 시간
    pub fn timeouts(&self) -> Vec<(String, Duration)> {
        self.lock().timeouts.clone()
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.lock().containers.iter().find(|c| c.name == name).cloned()
    }

    /// 외부에서 컨테이너가 삭제된 상황을 흉내 냅니다.
    pub fn forget(&self, name: &str) {
        self.lock().containers.retain(|c| c.name != name);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    fn missing(id: &str) -> ComposeError {
        ComposeError::NotFound(format!("no such container: {id}"))
    }
}

#[cfg(test)]
impl RuntimeClient for MockRuntimeClient {
    async fn find_by_name(&self, name: &str) -> Result<Option<ContainerSummary>, ComposeError> {
        let state = self.record(format!("find:{name}"));
        Ok(state
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(MockContainer::summary))
    }

    async fn list_by_labels(
        &self,
        labels: &[(String, String)],
    ) -> Result<Vec<ContainerSummary>, ComposeError> {
        let state = self.record("list".to_owned());
        Ok(state
            .containers
            .iter()
            .filter(|c| labels.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
            .map(MockContainer::summary)
            .collect())
    }

    async fn create(&self, request: &CreateRequest) -> Result<String, ComposeError> {
        let mut state = self.record(format!("create:{}", request.name));
        if state.missing_images.contains(&request.image) {
            return Err(ComposeError::NotFound(format!(
                "No such image: {}",
                request.image
            )));
        }
        if state.containers.iter().any(|c| c.name == request.name) {
            return Err(ComposeError::Backend(format!(
                "create container failed: name '{}' is already in use",
                request.name
            )));
        }
        state.next_id += 1;
        let id = format!("{:012x}", 0xc0_0000_0000_u64 + state.next_id);
        state.created.push(request.clone());
        state.containers.push(MockContainer {
            id: id.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            labels: request.labels.clone(),
            running: false,
            tty: request.tty,
            host_config: request.host_config.clone(),
        });
        Ok(id)
    }

    async fn inspect(&self, id: &str) -> Result<RuntimeContainer, ComposeError> {
        let state = self.record(format!("inspect:{id}"));
        state
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| RuntimeContainer {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                running: c.running,
                tty: c.tty,
                labels: c.labels.clone(),
                host_config: c.host_config.clone(),
            })
            .ok_or_else(|| Self::missing(id))
    }

    async fn start(&self, id: &str, host_config: &HostConfigPatch) -> Result<(), ComposeError> {
        let mut state = self.record(format!("start:{id}"));
        state.starts.push((id.to_owned(), host_config.clone()));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::missing(id))?;
        container.running = true;
        Ok(())
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), ComposeError> {
        let mut state = self.record(format!("stop:{id}"));
        state.timeouts.push((format!("stop:{id}"), timeout));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::missing(id))?;
        container.running = false;
        Ok(())
    }

    async fn restart(&self, id: &str, timeout: Duration) -> Result<(), ComposeError> {
        let mut state = self.record(format!("restart:{id}"));
        state.timeouts.push((format!("restart:{id}"), timeout));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Self::missing(id))?;
        container.running = true;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool, _remove_volumes: bool) -> Result<(), ComposeError> {
        let mut state = self.record(format!("remove:{id}"));
        let Some(pos) = state.containers.iter().position(|c| c.id == id) else {
            return Err(Self::missing(id));
        };
        if state.containers[pos].running && !force {
            return Err(ComposeError::Backend("container is running".to_owned()));
        }
        state.containers.remove(pos);
        Ok(())
    }

    async fn pull_image(
        &self,
        image: &ImageReference,
        credential: Option<&RegistryCredential>,
    ) -> Result<(), ComposeError> {
        let mut state = self.record(format!("pull:{image}"));
        state
            .pulls
            .push((image.to_string(), credential.map(|c| c.username.clone())));
        if self.fail_pulls {
            return Err(ComposeError::Backend("pull access denied".to_owned()));
        }
        let name = image.name();
        state.missing_images.retain(|m| {
            m != &name && ImageReference::parse(m).map(|r| r.with_default_tag()).ok().as_ref() != Some(image)
        });
        Ok(())
    }

    async fn stream_logs(&self, id: &str, _options: &LogOptions) -> Result<LogStream, ComposeError> {
        let state = self.record(format!("logs:{id}"));
        let chunks: Vec<Result<Bytes, ComposeError>> =
            state.log_chunks.iter().cloned().map(Ok).collect();
        let stream = futures::stream::iter(chunks);
        if self.endless_logs {
            Ok(Box::pin(stream.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(stream))
        }
    }

    async fn ping(&self) -> Result<(), ComposeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(id: &str, name: &str, service: &str) -> MockContainer {
        MockContainer::new(id, name, &[("io.stevedore.service", service)])
    }

    #[test]
    fn validate_container_id_rules() {
        assert!(validate_container_id("abc123def456").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("not-hex!").is_err());
        assert!(validate_container_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn api_error_keeps_404_distinguishable() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such image: redis:latest".to_owned(),
        };
        assert!(matches!(api_error("create", err), ComposeError::NotFound(_)));

        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_owned(),
        };
        assert!(matches!(api_error("create", err), ComposeError::Backend(_)));
    }

    #[test]
    fn host_config_round_trips_through_api_model() {
        let patch = HostConfigPatch {
            links: vec!["shop_db_1:db".to_owned()],
            ipc_mode: Some(NamespaceMode::Container("abc".to_owned())),
            net_mode: Some(NamespaceMode::Literal("host".to_owned())),
        };
        let api = host_config_to_api(&patch);
        assert_eq!(api.ipc_mode.as_deref(), Some("container:abc"));
        assert_eq!(api.network_mode.as_deref(), Some("host"));
        assert_eq!(host_config_from_api(Some(api)), patch);
    }

    #[test]
    fn empty_api_modes_become_none() {
        let api = bollard::models::HostConfig {
            ipc_mode: Some(String::new()),
            ..Default::default()
        };
        let patch = host_config_from_api(Some(api));
        assert!(patch.ipc_mode.is_none());
        assert!(patch.links.is_empty());
    }

    #[tokio::test]
    async fn mock_find_by_name_is_exact() {
        let client = MockRuntimeClient::new().with_container(labelled("a1", "shop_db_1", "db"));
        assert!(client.find_by_name("shop_db_1").await.unwrap().is_some());
        assert!(client.find_by_name("shop_db").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mock_list_by_labels_filters() {
        let client = MockRuntimeClient::new()
            .with_container(labelled("a1", "shop_db_1", "db"))
            .with_container(labelled("b2", "shop_web_1", "web"));
        let found = client
            .list_by_labels(&[("io.stevedore.service".to_owned(), "db".to_owned())])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "shop_db_1");
    }

    #[tokio::test]
    async fn mock_create_rejects_duplicate_names() {
        let client = MockRuntimeClient::new();
        let request = CreateRequest {
            name: "shop_web_1".to_owned(),
            image: "nginx".to_owned(),
            ..Default::default()
        };
        client.create(&request).await.unwrap();
        assert!(matches!(
            client.create(&request).await,
            Err(ComposeError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn mock_missing_image_until_pulled() {
        let client = MockRuntimeClient::new().with_missing_image("nginx");
        let request = CreateRequest {
            name: "shop_web_1".to_owned(),
            image: "nginx".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            client.create(&request).await,
            Err(ComposeError::NotFound(_))
        ));

        let reference = ImageReference::parse("nginx").unwrap().with_default_tag();
        client.pull_image(&reference, None).await.unwrap();
        client.create(&request).await.unwrap();
    }

    #[tokio::test]
    async fn mock_start_stop_toggle_running() {
        let client = MockRuntimeClient::new().with_container(labelled("a1", "shop_db_1", "db"));
        client.start("a1", &HostConfigPatch::default()).await.unwrap();
        assert!(client.inspect("a1").await.unwrap().running);
        client.stop("a1", Duration::from_secs(1)).await.unwrap();
        assert!(!client.inspect("a1").await.unwrap().running);
    }

    #[tokio::test]
    async fn mock_inspect_unknown_id_is_not_found() {
        let client = MockRuntimeClient::new();
        assert!(matches!(
            client.inspect("ffff").await,
            Err(ComposeError::NotFound(_))
        ));
    }

    #[test]
    fn runtime_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockRuntimeClient>();
        assert_send_sync::<BollardRuntimeClient>();
    }
}
