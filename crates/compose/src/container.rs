//! 컨테이너 생명주기
//!
//! [`ContainerHandle`]은 이름 하나로 식별되는 서비스 인스턴스의 상태 기계입니다.
//! 백엔드 ID를 캐시하지 않고 모든 연산에서 이름으로 컨테이너를 다시 찾습니다.
//!
//! ```text
//! Absent ──create──▶ Created ──start──▶ Running
//!                                ◀──stop───
//! ```
//!
//! 같은 이름에 대한 동시 `create`는 잠그지 않습니다. 백엔드가 중복 이름을
//! 거부하고, 진 쪽은 에러를 받습니다.

use std::fmt;
use std::sync::{Arc, Weak};

use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use stevedore_core::metrics as m;
use stevedore_core::types::{HostConfigPatch, NamespaceMode};

use crate::docker::{ContainerSummary, CreateRequest, RuntimeClient};
use crate::error::ComposeError;
use crate::image;
use crate::logs::{LogStreamer, LogTask};
use crate::project::Service;
use crate::resolver::DependencyResolver;

/// 조회 시점의 컨테이너 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// 백엔드에 컨테이너가 없음
    Absent,
    /// 생성되었지만 실행 중이 아님
    Stopped,
    Running,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 서비스 인스턴스 하나의 핸들
///
/// 소유 서비스는 약한 참조로만 가리킵니다. 서비스가 해제되면 모든 연산이
/// `ComposeError::ServiceDropped`로 실패합니다.
pub struct ContainerHandle<C: RuntimeClient> {
    name: String,
    service: Weak<Service<C>>,
}

impl<C: RuntimeClient> ContainerHandle<C> {
    pub(crate) fn new(name: String, service: &Arc<Service<C>>) -> Self {
        Self {
            name,
            service: Arc::downgrade(service),
        }
    }

    /// 결정적 컨테이너 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    fn service(&self) -> Result<Arc<Service<C>>, ComposeError> {
        self.service
            .upgrade()
            .ok_or_else(|| ComposeError::ServiceDropped(self.name.clone()))
    }

    async fn find_existing(
        &self,
        service: &Service<C>,
    ) -> Result<Option<ContainerSummary>, ComposeError> {
        service.context().client().find_by_name(&self.name).await
    }

    /// 컨테이너 ID. 컨테이너가 없으면 `None`.
    pub async fn id(&self) -> Result<Option<String>, ComposeError> {
        let service = self.service()?;
        Ok(self.find_existing(&service).await?.map(|c| c.id))
    }

    /// 컨테이너가 없으면 생성합니다. 이미 있으면 기존 컨테이너를 반환합니다.
    ///
    /// 이미지가 없어 생성이 실패하면 이미지를 pull한 뒤 한 번만 다시 생성합니다.
    ///
    /// # Errors
    ///
    /// - 의존성 해석 실패 (`DependencyNotFound`, `DependencyCycle`)
    /// - pull 실패 (`ImagePull`)
    /// - 백엔드 에러는 그대로 전파
    pub async fn create(&self) -> Result<ContainerSummary, ComposeError> {
        let service = self.service()?;
        if let Some(existing) = self.find_existing(&service).await? {
            debug!(container = %self.name, id = %existing.id, "container already exists");
            return Ok(existing);
        }

        let request = self.create_request(&service).await?;
        let context = service.context();
        let client = context.client();

        debug!(container = %self.name, image = %request.image, "creating container");

        match client.create(&request).await {
            Ok(id) => debug!(container = %self.name, id = %id, "container created"),
            Err(ComposeError::NotFound(reason)) => {
                info!(
                    container = %self.name,
                    image = %request.image,
                    reason = %reason,
                    "image missing, pulling before retry"
                );
                image::pull(client.as_ref(), context.credentials(), &request.image).await?;
                client.create(&request).await.inspect_err(|e| {
                    error!(container = %self.name, error = %e, "create failed after pull");
                })?;
            }
            Err(e) => {
                debug!(container = %self.name, error = %e, "failed to create container");
                return Err(e);
            }
        }

        counter!(m::CONTAINERS_CREATED_TOTAL, m::LABEL_SERVICE => service.name().to_owned())
            .increment(1);

        self.find_existing(&service).await?.ok_or_else(|| {
            ComposeError::NotFound(format!("container {} missing after create", self.name))
        })
    }

    async fn create_request(&self, service: &Service<C>) -> Result<CreateRequest, ComposeError> {
        let config = service.config();
        let literal = |mode: &Option<String>| {
            mode.as_deref()
                .map(NamespaceMode::parse)
                .filter(|m| matches!(m, NamespaceMode::Literal(_)))
        };

        let mut host_config = HostConfigPatch {
            links: Vec::new(),
            ipc_mode: literal(&config.ipc),
            net_mode: literal(&config.net),
        };
        DependencyResolver::new(service)
            .populate(&mut host_config)
            .await?;

        Ok(CreateRequest {
            name: self.name.clone(),
            image: config.image.clone(),
            command: config.command.clone(),
            environment: config.environment.clone(),
            labels: service.labels_for(&self.name),
            tty: config.tty,
            host_config,
        })
    }

    /// 컨테이너를 생성하고 실행 중이 아니면 시작합니다.
    ///
    /// 시작 직전에 의존성을 다시 해석합니다. 로그 전달이 켜져 있으면 로그 작업을
    /// 띄우고 그 핸들을 반환합니다. 로그 작업의 결과는 `up`의 결과에 영향을 주지 않습니다.
    pub async fn up(&self) -> Result<Option<LogTask>, ComposeError> {
        let service = self.service()?;
        let summary = self.create().await?;
        let client = service.context().client();

        let info = client.inspect(&summary.id).await?;
        if info.running {
            debug!(container = %self.name, "container already running");
        } else {
            let created_links = info.host_config.links.clone();
            let mut host_config = info.host_config;
            DependencyResolver::new(&service)
                .populate(&mut host_config)
                .await?;

            let added = links_added_since_create(&created_links, &host_config.links);
            if !added.is_empty() {
                warn!(
                    container = %self.name,
                    links = ?added,
                    "links resolved after create are not applied by backends that fix host config at create time"
                );
            }

            debug!(container = %self.name, id = %summary.id, "starting container");
            client.start(&summary.id, &host_config).await.inspect_err(|e| {
                error!(container = %self.name, error = %e, "failed to start container");
            })?;

            counter!(m::CONTAINERS_STARTED_TOTAL, m::LABEL_SERVICE => service.name().to_owned())
                .increment(1);
            info!(container = %self.name, id = %summary.id, "container started");
        }

        if service.context().config().log_enabled {
            Ok(Some(self.spawn_logs(&service)))
        } else {
            Ok(None)
        }
    }

    /// 컨테이너를 정지합니다. 없으면 아무것도 하지 않습니다.
    pub async fn down(&self) -> Result<(), ComposeError> {
        let service = self.service()?;
        let Some(existing) = self.find_existing(&service).await? else {
            return Ok(());
        };

        let context = service.context();
        context
            .client()
            .stop(&existing.id, context.config().stop_timeout())
            .await?;

        counter!(m::CONTAINERS_STOPPED_TOTAL, m::LABEL_SERVICE => service.name().to_owned())
            .increment(1);
        info!(container = %self.name, "container stopped");
        Ok(())
    }

    /// 컨테이너를 삭제합니다. 실행 중이면 먼저 정지합니다.
    ///
    /// 볼륨은 남겨 둡니다. 컨테이너가 없으면 조회 외의 호출은 하지 않습니다.
    pub async fn delete(&self) -> Result<(), ComposeError> {
        let service = self.service()?;
        let Some(existing) = self.find_existing(&service).await? else {
            return Ok(());
        };

        let context = service.context();
        let client = context.client();
        let info = client.inspect(&existing.id).await?;
        if info.running {
            client
                .stop(&existing.id, context.config().stop_timeout())
                .await?;
        }
        client.remove(&existing.id, true, false).await?;

        counter!(m::CONTAINERS_REMOVED_TOTAL, m::LABEL_SERVICE => service.name().to_owned())
            .increment(1);
        info!(container = %self.name, "container removed");
        Ok(())
    }

    /// 컨테이너를 재시작합니다. 없으면 아무것도 하지 않습니다.
    pub async fn restart(&self) -> Result<(), ComposeError> {
        let service = self.service()?;
        let Some(existing) = self.find_existing(&service).await? else {
            return Ok(());
        };

        let context = service.context();
        context
            .client()
            .restart(&existing.id, context.config().stop_timeout())
            .await?;

        counter!(m::CONTAINERS_RESTARTED_TOTAL, m::LABEL_SERVICE => service.name().to_owned())
            .increment(1);
        info!(container = %self.name, "container restarted");
        Ok(())
    }

    /// 서비스 이미지를 명시적으로 pull합니다.
    pub async fn pull(&self) -> Result<(), ComposeError> {
        let service = self.service()?;
        let context = service.context();
        image::pull(
            context.client().as_ref(),
            context.credentials(),
            &service.config().image,
        )
        .await
    }

    /// 로그 작업을 띄웁니다.
    pub fn log(&self) -> Result<LogTask, ComposeError> {
        let service = self.service()?;
        Ok(self.spawn_logs(&service))
    }

    /// 현재 상태를 조회합니다.
    pub async fn state(&self) -> Result<ContainerState, ComposeError> {
        let service = self.service()?;
        let Some(existing) = self.find_existing(&service).await? else {
            return Ok(ContainerState::Absent);
        };
        let info = service.context().client().inspect(&existing.id).await?;
        Ok(if info.running {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        })
    }

    fn spawn_logs(&self, service: &Service<C>) -> LogTask {
        let context = service.context();
        let sink = context.sinks().create(&self.name);
        LogStreamer::new(
            Arc::clone(context.client()),
            self.name.clone(),
            context.config().log_tail_lines,
            sink,
        )
        .spawn()
    }
}

impl<C: RuntimeClient> Clone for ContainerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            service: Weak::clone(&self.service),
        }
    }
}

impl<C: RuntimeClient> fmt::Debug for ContainerHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("name", &self.name)
            .field("service_alive", &(self.service.strong_count() > 0))
            .finish()
    }
}

/// 생성 시점에 없던 링크만 골라냅니다.
fn links_added_since_create<'a>(created: &[String], resolved: &'a [String]) -> Vec<&'a str> {
    resolved
        .iter()
        .filter(|link| !created.contains(link))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use stevedore_core::config::ServiceConfig;

    use crate::config::ComposeConfigBuilder;
    use crate::docker::{MockContainer, MockRuntimeClient};
    use crate::project::Project;

    fn project(client: Arc<MockRuntimeClient>, web: ServiceConfig) -> Project<MockRuntimeClient> {
        project_with_stop_timeout(client, web, 10)
    }

    fn project_with_stop_timeout(
        client: Arc<MockRuntimeClient>,
        web: ServiceConfig,
        stop_timeout_secs: u64,
    ) -> Project<MockRuntimeClient> {
        let config = ComposeConfigBuilder::new()
            .project_name("shop")
            .log_enabled(false)
            .stop_timeout_secs(stop_timeout_secs)
            .build()
            .unwrap();
        Project::builder(client)
            .config(config)
            .service("web", web)
            .build()
            .unwrap()
    }

    fn web_config() -> ServiceConfig {
        ServiceConfig {
            image: "nginx".to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client.clone(), web_config());
        let web = project.create_service("web").unwrap();
        let handle = web.container(1);

        let first = handle.create().await.unwrap();
        let second = handle.create().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(client.created().len(), 1);
    }

    #[tokio::test]
    async fn literal_modes_are_applied_at_create() {
        let client = Arc::new(MockRuntimeClient::new());
        let config = ServiceConfig {
            net: Some("host".to_owned()),
            ipc: Some("container:undeclared".to_owned()),
            ..web_config()
        };
        let project = project(client.clone(), config);
        let web = project.create_service("web").unwrap();
        web.container(1).create().await.unwrap();

        let created = &client.created()[0];
        assert_eq!(
            created.host_config.net_mode,
            Some(NamespaceMode::Literal("host".to_owned()))
        );
        assert_eq!(created.host_config.ipc_mode, None);
    }

    #[tokio::test]
    async fn state_follows_lifecycle() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client, web_config());
        let web = project.create_service("web").unwrap();
        let handle = web.container(1);

        assert_eq!(handle.state().await.unwrap(), ContainerState::Absent);
        handle.create().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), ContainerState::Stopped);
        assert!(handle.up().await.unwrap().is_none());
        assert_eq!(handle.state().await.unwrap(), ContainerState::Running);
        handle.down().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), ContainerState::Stopped);
    }

    #[tokio::test]
    async fn id_is_none_when_absent() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client, web_config());
        let web = project.create_service("web").unwrap();
        assert_eq!(web.container(1).id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn restart_on_existing_container() {
        let client = Arc::new(
            MockRuntimeClient::new().with_container(MockContainer::new("a1", "shop_web_1", &[])),
        );
        let project = project_with_stop_timeout(client.clone(), web_config(), 25);
        let web = project.create_service("web").unwrap();

        web.container(1).restart().await.unwrap();
        assert_eq!(client.calls(), vec!["find:shop_web_1", "restart:a1"]);
        assert_eq!(
            client.timeouts(),
            vec![("restart:a1".to_owned(), Duration::from_secs(25))]
        );
    }

    #[tokio::test]
    async fn down_passes_configured_stop_timeout() {
        let client = Arc::new(
            MockRuntimeClient::new()
                .with_container(MockContainer::new("a1", "shop_web_1", &[]).running()),
        );
        let project = project_with_stop_timeout(client.clone(), web_config(), 3);
        let web = project.create_service("web").unwrap();

        web.container(1).down().await.unwrap();
        assert_eq!(
            client.timeouts(),
            vec![("stop:a1".to_owned(), Duration::from_secs(3))]
        );
        assert!(!client.container("shop_web_1").unwrap().running);
    }

    #[tokio::test]
    async fn restart_on_absent_container_is_noop() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client.clone(), web_config());
        let web = project.create_service("web").unwrap();

        web.container(1).restart().await.unwrap();
        assert_eq!(client.calls(), vec!["find:shop_web_1"]);
    }

    #[tokio::test]
    async fn dropped_service_is_reported() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client, web_config());
        let handle = project.create_service("web").unwrap().container(1);

        let err = handle.create().await.unwrap_err();
        assert!(matches!(err, ComposeError::ServiceDropped(name) if name == "shop_web_1"));
    }

    #[tokio::test]
    async fn explicit_pull_uses_service_image() {
        let client = Arc::new(MockRuntimeClient::new());
        let project = project(client.clone(), web_config());
        let web = project.create_service("web").unwrap();

        web.container(1).pull().await.unwrap();
        assert_eq!(client.pulls()[0].0, "nginx:latest");
    }

    #[test]
    fn links_added_after_create_are_detected() {
        let created = vec!["shop_db_1:db".to_owned()];
        let resolved = vec!["shop_db_1:db".to_owned(), "shop_cache_1:cache".to_owned()];
        assert_eq!(
            links_added_since_create(&created, &resolved),
            vec!["shop_cache_1:cache"]
        );
        assert!(links_added_since_create(&resolved, &created).is_empty());
    }

    #[test]
    fn state_display() {
        assert_eq!(ContainerState::Running.to_string(), "running");
        assert_eq!(ContainerState::Absent.as_str(), "absent");
    }
}
