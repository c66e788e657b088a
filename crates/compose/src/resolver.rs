//! 서비스 간 의존성 해석
//!
//! [`DependencyResolver`]는 서비스가 선언한 관계(링크, IPC 공유, 네트워크 공유)를
//! 대상 서비스의 현재 컨테이너에 대응시켜 하나의 [`HostConfigPatch`]로 변환합니다.
//!
//! # 해석 규칙
//!
//! - **Link**: 대상 서비스의 모든 컨테이너에 대해 `alias → name`(처음 쓴 쪽이 우선)과
//!   `name → name`(항상)을 하나의 링크 테이블에 기록합니다.
//! - **IpcNamespace / NetNamespace**: 대상 서비스의 첫 컨테이너 ID로
//!   `container:<id>` 모드를 설정합니다. 컨테이너가 없으면 실패합니다.
//! - 프로젝트에 선언되지 않은 대상은 경고와 함께 건너뜁니다.
//!
//! 대상 컨테이너는 절대 생성하지 않으며, 해석 전에 관계 그래프의 순환을 검사합니다.

use std::collections::{BTreeMap, BTreeSet};

use metrics::counter;
use tracing::{debug, warn};

use stevedore_core::config::ServiceConfig;
use stevedore_core::metrics as m;
use stevedore_core::types::{HostConfigPatch, NamespaceMode, RelationshipKind, ServiceRelationship};

use crate::docker::{ContainerSummary, RuntimeClient};
use crate::error::ComposeError;
use crate::project::Service;

/// 별칭(또는 컨테이너 이름)에서 컨테이너 이름으로의 링크 테이블
///
/// 키는 유일하며 같은 별칭에 대해서는 처음 기록된 값이 유지됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    entries: BTreeMap<String, String>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `alias → name`을 (비어 있을 때만) 기록하고 `name → name`을 항상 기록합니다.
    ///
    /// 별칭을 이번 호출이 차지했으면 `true`를 반환합니다.
    pub fn add(&mut self, alias: &str, name: &str) -> bool {
        let claimed = !self.entries.contains_key(alias);
        if claimed {
            self.entries.insert(alias.to_owned(), name.to_owned());
        }
        self.entries.insert(name.to_owned(), name.to_owned());
        claimed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 키 순서로 정렬된 `"<컨테이너 이름>:<키>"` 목록
    pub fn to_links(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, name)| format!("{name}:{key}"))
            .collect()
    }
}

/// [`DependencyResolver::populate`] 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// 프로젝트에 선언되지 않아 건너뛴 대상 서비스
    pub skipped: Vec<String>,
    /// 적용된 관계 수
    pub applied: usize,
}

/// 한 서비스의 관계를 호스트 설정 패치로 해석합니다.
pub struct DependencyResolver<'a, C: RuntimeClient> {
    service: &'a Service<C>,
}

impl<'a, C: RuntimeClient> DependencyResolver<'a, C> {
    pub fn new(service: &'a Service<C>) -> Self {
        Self { service }
    }

    /// 관계를 해석해 `host`의 `links`, `ipc_mode`, `net_mode`를 채웁니다.
    ///
    /// `links`는 링크 테이블로 통째로 교체됩니다. IPC/네트워크 관계가 없으면
    /// 기존 모드는 그대로 둡니다.
    ///
    /// # Errors
    ///
    /// - 관계 그래프에 순환이 있으면 `ComposeError::DependencyCycle`
    /// - IPC/네트워크 대상 컨테이너가 없으면 `ComposeError::DependencyNotFound`
    /// - 컨테이너 목록 조회 실패는 그대로 전파
    pub async fn populate(&self, host: &mut HostConfigPatch) -> Result<Resolution, ComposeError> {
        let context = self.service.context();
        detect_cycle(context.services(), self.service.name())?;

        let mut table = LinkTable::new();
        let mut resolution = Resolution::default();

        for rel in self.service.relationships() {
            if !context.is_declared(&rel.target) {
                warn!(
                    service = self.service.name(),
                    target = %rel.target,
                    kind = %rel.kind,
                    "relationship target is not declared in the project, skipping"
                );
                resolution.skipped.push(rel.target.clone());
                continue;
            }

            let target = Service::from_context(context, &rel.target)?;
            let containers = target.containers().await?;

            match rel.kind {
                RelationshipKind::Link => add_links(&mut table, rel, &containers),
                RelationshipKind::IpcNamespace => {
                    host.ipc_mode = Some(self.shared_mode(rel, &containers)?);
                }
                RelationshipKind::NetNamespace => {
                    host.net_mode = Some(self.shared_mode(rel, &containers)?);
                }
            }
            resolution.applied += 1;
        }

        host.links = table.to_links();

        debug!(
            service = self.service.name(),
            links = host.links.len(),
            ipc = ?host.ipc_mode,
            net = ?host.net_mode,
            skipped = resolution.skipped.len(),
            "dependencies resolved"
        );

        Ok(resolution)
    }

    fn shared_mode(
        &self,
        rel: &ServiceRelationship,
        containers: &[ContainerSummary],
    ) -> Result<NamespaceMode, ComposeError> {
        match containers.first() {
            Some(container) => Ok(NamespaceMode::Container(container.id.clone())),
            None => {
                counter!(m::DEPENDENCY_FAILURES_TOTAL, m::LABEL_KIND => rel.kind.as_str())
                    .increment(1);
                Err(ComposeError::DependencyNotFound {
                    service: self.service.name().to_owned(),
                    target: rel.target.clone(),
                    kind: rel.kind,
                })
            }
        }
    }
}

fn add_links(table: &mut LinkTable, rel: &ServiceRelationship, containers: &[ContainerSummary]) {
    for container in containers {
        if !table.add(&rel.alias, &container.name) {
            debug!(alias = %rel.alias, container = %container.name, "alias already claimed");
        }
    }
}

/// `start`에서 도달 가능한 관계 그래프에 순환이 있는지 검사합니다.
///
/// 선언되지 않은 대상은 해석 단계에서 건너뛰므로 여기서도 무시합니다.
///
/// # Errors
///
/// 순환이 있으면 `start`부터의 경로를 담은 `ComposeError::DependencyCycle`
pub fn detect_cycle(
    services: &BTreeMap<String, ServiceConfig>,
    start: &str,
) -> Result<(), ComposeError> {
    let mut stack = Vec::new();
    let mut done = BTreeSet::new();
    visit(services, start, &mut stack, &mut done)
}

fn visit(
    services: &BTreeMap<String, ServiceConfig>,
    name: &str,
    stack: &mut Vec<String>,
    done: &mut BTreeSet<String>,
) -> Result<(), ComposeError> {
    if done.contains(name) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|s| s == name) {
        let mut chain = stack[pos..].to_vec();
        chain.push(name.to_owned());
        return Err(ComposeError::DependencyCycle { chain });
    }
    let Some(config) = services.get(name) else {
        return Ok(());
    };

    stack.push(name.to_owned());
    for rel in config.relationships() {
        visit(services, &rel.target, stack, done)?;
    }
    stack.pop();
    done.insert(name.to_owned());
    Ok(())
}
