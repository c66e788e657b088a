//! 도메인 타입: 서비스 관계, 호스트 설정 패치, 부기(bookkeeping) 레이블
//!
//! 컨테이너 런타임과 무관한 순수 데이터 구조만 정의합니다.
//! 런타임 호출은 `stevedore-compose` 크레이트가 담당합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix used by the runtime to express namespace sharing (`container:<id>`).
pub const CONTAINER_MODE_PREFIX: &str = "container:";

/// 서비스 간 공유 방식
///
/// 세 종류는 서로 배타적인 저수준 공유 기능입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// 링크 별칭 공유
    Link,
    /// IPC 네임스페이스 공유
    IpcNamespace,
    /// 네트워크 네임스페이스 공유
    NetNamespace,
}

impl RelationshipKind {
    /// 메트릭 레이블용 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::IpcNamespace => "ipc",
            Self::NetNamespace => "net",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 한 서비스가 다른 서비스에 대해 선언한 의존 관계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRelationship {
    /// 대상 서비스 이름
    pub target: String,
    /// 공유 방식
    pub kind: RelationshipKind,
    /// 링크 별칭 (IPC/NET 관계에서는 대상 서비스 이름)
    pub alias: String,
}

impl ServiceRelationship {
    /// 링크 관계를 생성합니다.
    pub fn link(target: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RelationshipKind::Link,
            alias: alias.into(),
        }
    }

    /// IPC 네임스페이스 공유 관계를 생성합니다.
    pub fn ipc(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            alias: target.clone(),
            target,
            kind: RelationshipKind::IpcNamespace,
        }
    }

    /// 네트워크 네임스페이스 공유 관계를 생성합니다.
    pub fn net(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            alias: target.clone(),
            target,
            kind: RelationshipKind::NetNamespace,
        }
    }
}

/// IPC / 네트워크 모드 값
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceMode {
    /// 다른 컨테이너의 네임스페이스에 합류 (`container:<id>`)
    Container(String),
    /// 런타임이 해석하는 그대로의 값 (`host`, `private`, `bridge` 등)
    Literal(String),
}

impl NamespaceMode {
    /// 런타임 문자열 표현을 해석합니다.
    ///
    /// `container:` 접두사가 있으면 [`NamespaceMode::Container`]로,
    /// 그 외에는 [`NamespaceMode::Literal`]로 취급합니다.
    pub fn parse(value: &str) -> Self {
        match value.strip_prefix(CONTAINER_MODE_PREFIX) {
            Some(rest) => Self::Container(rest.to_owned()),
            None => Self::Literal(value.to_owned()),
        }
    }
}

impl fmt::Display for NamespaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(id) => write!(f, "{CONTAINER_MODE_PREFIX}{id}"),
            Self::Literal(mode) => f.write_str(mode),
        }
    }
}

/// 링크 별칭, IPC 모드, 네트워크 모드로 구성된 호스트 설정 부분집합
///
/// `links`는 누적되지만 `ipc_mode`/`net_mode`는 마지막 관계가 필드 전체를 차지합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfigPatch {
    /// `"<컨테이너 이름>:<별칭>"` 형식의 링크 목록
    pub links: Vec<String>,
    /// IPC 네임스페이스 모드
    pub ipc_mode: Option<NamespaceMode>,
    /// 네트워크 모드
    pub net_mode: Option<NamespaceMode>,
}

/// 생성 시점에 컨테이너에 기록하는 예약 레이블 키
///
/// 이름 기반 재탐색과 소유 관계 추적에 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelKeys {
    /// 컨테이너 이름 레이블 키
    pub container: String,
    /// 서비스 이름 레이블 키
    pub service: String,
    /// 프로젝트 이름 레이블 키
    pub project: String,
}

impl Default for LabelKeys {
    fn default() -> Self {
        Self {
            container: "io.stevedore.container.name".to_owned(),
            service: "io.stevedore.service".to_owned(),
            project: "io.stevedore.project".to_owned(),
        }
    }
}

impl LabelKeys {
    /// 예약 키가 모두 비어 있지 않고 서로 다른지 확인합니다.
    pub fn is_well_formed(&self) -> bool {
        let keys = [&self.container, &self.service, &self.project];
        keys.iter().all(|k| !k.is_empty())
            && self.container != self.service
            && self.service != self.project
            && self.container != self.project
    }
}
