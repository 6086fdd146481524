//! 로깅 초기화
//!
//! `[general]` 섹션을 기반으로 `tracing-subscriber`를 설정합니다.
//! JSON 구조화 로그와 사람이 읽기 쉬운 pretty 형식을 지원합니다.
//! `RUST_LOG`가 설정되어 있으면 `log_level`보다 우선합니다.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::GeneralConfig;
use crate::error::FloodgateError;

/// 전역 tracing subscriber를 설치합니다.
///
/// 프로세스당 한 번, tracing 매크로 사용 전에 호출해야 합니다.
///
/// # 형식
///
/// * `"json"` - 기계가 파싱하기 쉬운 JSON 라인 (운영 기본값)
/// * `"pretty"` - 개발용 컬러 출력
pub fn init_tracing(config: &GeneralConfig) -> Result<(), FloodgateError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| {
                FloodgateError::Logging(format!("failed to initialize JSON subscriber: {e}"))
            }),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| {
                FloodgateError::Logging(format!("failed to initialize pretty subscriber: {e}"))
            }),
        other => Err(FloodgateError::Logging(format!(
            "unknown log format '{other}', expected 'json' or 'pretty'"
        ))),
    }
}
