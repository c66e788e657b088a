//! 메트릭 이름 상수
//!
//! 생명주기 코드가 `metrics::counter!()` 매크로를 호출할 때 사용하는
//! 이름과 레이블 키를 한곳에서 정의합니다. 익스포터 설치는 바이너리의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `stevedore_`
//! - 접미어: `_total` (counter)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(stevedore_core::metrics::CONTAINERS_CREATED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 서비스 이름 레이블 키
pub const LABEL_SERVICE: &str = "service";

/// 관계 종류 레이블 키 (link, ipc, net)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── 생명주기 메트릭 ───────────────────────────────────────────────

/// 생성된 컨테이너 수 (counter, label: service)
pub const CONTAINERS_CREATED_TOTAL: &str = "stevedore_containers_created_total";

/// 시작된 컨테이너 수 (counter, label: service)
pub const CONTAINERS_STARTED_TOTAL: &str = "stevedore_containers_started_total";

/// 정지된 컨테이너 수 (counter, label: service)
pub const CONTAINERS_STOPPED_TOTAL: &str = "stevedore_containers_stopped_total";

/// 재시작된 컨테이너 수 (counter, label: service)
pub const CONTAINERS_RESTARTED_TOTAL: &str = "stevedore_containers_restarted_total";

/// 삭제된 컨테이너 수 (counter, label: service)
pub const CONTAINERS_REMOVED_TOTAL: &str = "stevedore_containers_removed_total";

/// 이미지 pull 시도 수 (counter, label: result)
pub const IMAGE_PULLS_TOTAL: &str = "stevedore_image_pulls_total";

/// 의존성 해석 실패 수 (counter, label: kind)
pub const DEPENDENCY_FAILURES_TOTAL: &str = "stevedore_dependency_failures_total";

/// 종료된 로그 스트림 수 (counter, label: result)
pub const LOG_STREAMS_FINISHED_TOTAL: &str = "stevedore_log_streams_finished_total";
