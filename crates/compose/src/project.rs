//! 프로젝트와 서비스
//!
//! [`Project`]는 선언된 서비스 설정과 공유 [`Context`]를 묶습니다.
//! [`Service`]는 서비스 하나의 설정과 관계 목록을 가지며, 컨테이너 핸들은
//! 서비스를 약한 참조로만 가리킵니다.
//!
//! # 사용 예시
//! ```ignore
//! let project = Project::builder(Arc::new(client))
//!     .config(config)
//!     .service("db", db_config)
//!     .service("web", web_config)
//!     .build()?;
//!
//! let web = project.create_service("web")?;
//! let container = web.container(1);
//! container.up().await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use stevedore_core::config::ServiceConfig;
use stevedore_core::types::ServiceRelationship;

use crate::auth::CredentialStore;
use crate::config::ComposeConfig;
use crate::container::ContainerHandle;
use crate::docker::{ContainerSummary, RuntimeClient};
use crate::error::ComposeError;
use crate::logs::{LogSinkFactory, PrefixedSinkFactory};

/// 프로젝트의 모든 서비스가 공유하는 실행 환경
pub struct Context<C: RuntimeClient> {
    client: Arc<C>,
    config: ComposeConfig,
    credentials: CredentialStore,
    sinks: Arc<dyn LogSinkFactory>,
    services: BTreeMap<String, ServiceConfig>,
}

impl<C: RuntimeClient> Context<C> {
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn sinks(&self) -> &Arc<dyn LogSinkFactory> {
        &self.sinks
    }

    /// 선언된 서비스 설정 전체
    pub fn services(&self) -> &BTreeMap<String, ServiceConfig> {
        &self.services
    }

    pub fn is_declared(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }
}

/// 서비스 집합
pub struct Project<C: RuntimeClient> {
    context: Arc<Context<C>>,
}

impl<C: RuntimeClient> Project<C> {
    pub fn builder(client: Arc<C>) -> ProjectBuilder<C> {
        ProjectBuilder::new(client)
    }

    /// 프로젝트 이름
    pub fn name(&self) -> &str {
        &self.context.config.project_name
    }

    pub fn context(&self) -> &Arc<Context<C>> {
        &self.context
    }

    pub fn is_declared(&self, service: &str) -> bool {
        self.context.is_declared(service)
    }

    /// 선언된 서비스 이름 (사전순)
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.context.services.keys().map(String::as_str)
    }

    /// 선언된 서비스의 [`Service`] 객체를 만듭니다.
    ///
    /// 컨테이너는 만들지 않습니다.
    pub fn create_service(&self, name: &str) -> Result<Arc<Service<C>>, ComposeError> {
        Service::from_context(&self.context, name).map(Arc::new)
    }
}

/// 프로젝트 빌더
pub struct ProjectBuilder<C: RuntimeClient> {
    client: Arc<C>,
    config: ComposeConfig,
    credentials: CredentialStore,
    sinks: Arc<dyn LogSinkFactory>,
    services: BTreeMap<String, ServiceConfig>,
}

impl<C: RuntimeClient> ProjectBuilder<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            config: ComposeConfig::default(),
            credentials: CredentialStore::default(),
            sinks: Arc::new(PrefixedSinkFactory),
            services: BTreeMap::new(),
        }
    }

    pub fn config(mut self, config: ComposeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    /// 로그 sink 팩토리를 설정합니다. 기본값은 [`PrefixedSinkFactory`]입니다.
    pub fn sink_factory(mut self, sinks: Arc<dyn LogSinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    /// 서비스 하나를 선언합니다.
    pub fn service(mut self, name: impl Into<String>, config: ServiceConfig) -> Self {
        self.services.insert(name.into(), config);
        self
    }

    /// 서비스 선언 전체를 교체합니다.
    pub fn services(mut self, services: BTreeMap<String, ServiceConfig>) -> Self {
        self.services = services;
        self
    }

    /// 설정을 검증하고 프로젝트를 생성합니다.
    pub fn build(self) -> Result<Project<C>, ComposeError> {
        self.config.validate()?;

        if let Some((name, _)) = self.services.iter().find(|(_, s)| s.image.trim().is_empty()) {
            return Err(ComposeError::Config {
                field: format!("services.{name}.image"),
                reason: "must not be empty".to_owned(),
            });
        }

        Ok(Project {
            context: Arc::new(Context {
                client: self.client,
                config: self.config,
                credentials: self.credentials,
                sinks: self.sinks,
                services: self.services,
            }),
        })
    }
}

/// 서비스 하나의 원하는 상태
pub struct Service<C: RuntimeClient> {
    name: String,
    config: ServiceConfig,
    relationships: Vec<ServiceRelationship>,
    context: Arc<Context<C>>,
}

impl<C: RuntimeClient> Service<C> {
    /// 컨텍스트에 선언된 설정으로 서비스를 만듭니다.
    pub fn from_context(context: &Arc<Context<C>>, name: &str) -> Result<Self, ComposeError> {
        let config = context
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| ComposeError::UnknownService(name.to_owned()))?;
        let relationships = config.relationships();
        Ok(Self {
            name: name.to_owned(),
            config,
            relationships,
            context: Arc::clone(context),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// 선언 순서의 관계 목록
    pub fn relationships(&self) -> &[ServiceRelationship] {
        &self.relationships
    }

    pub fn context(&self) -> &Arc<Context<C>> {
        &self.context
    }

    /// `n`번째 인스턴스의 결정적 컨테이너 이름 (`<project>_<service>_<n>`)
    pub fn container_name(&self, n: u32) -> String {
        format!("{}_{}_{}", self.context.config.project_name, self.name, n)
    }

    /// `n`번째 인스턴스의 컨테이너 핸들을 반환합니다.
    pub fn container(self: &Arc<Self>, n: u32) -> ContainerHandle<C> {
        ContainerHandle::new(self.container_name(n), self)
    }

    /// 생성 시 컨테이너에 기록할 레이블
    ///
    /// 서비스 설정의 레이블 위에 예약 레이블을 덮어씁니다.
    pub fn labels_for(&self, container: &str) -> BTreeMap<String, String> {
        let keys = &self.context.config.labels;
        let mut labels = self.config.labels.clone();
        labels.insert(keys.container.clone(), container.to_owned());
        labels.insert(keys.service.clone(), self.name.clone());
        labels.insert(keys.project.clone(), self.context.config.project_name.clone());
        labels
    }

    /// 이 서비스에 속한 기존 컨테이너 목록 (이름순)
    pub async fn containers(&self) -> Result<Vec<ContainerSummary>, ComposeError> {
        let keys = &self.context.config.labels;
        let filter = [
            (keys.project.clone(), self.context.config.project_name.clone()),
            (keys.service.clone(), self.name.clone()),
        ];
        let mut containers = self.context.client.list_by_labels(&filter).await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }
}

impl<C: RuntimeClient> std::fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("image", &self.config.image)
            .field("relationships", &self.relationships)
            .finish()
    }
}
