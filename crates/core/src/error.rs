//! 에러 타입 — 도메인별 에러 정의
//!
//! 패킷 경로는 에러를 반환하지 않습니다. 여기의 타입은 설정 로딩, 로깅 초기화,
//! 컨트롤 플레인 호출에서만 사용됩니다.

/// Floodgate 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FloodgateError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 가드 엔진 에러
    #[error("guard error: {0}")]
    Guard(#[from] EngineError),

    /// 로깅 초기화 에러
    #[error("logging init failed: {0}")]
    Logging(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 가드 엔진 에러
///
/// `floodgate-guard`의 크레이트 로컬 에러는 이 타입으로 변환되어 전파됩니다.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 엔진 구성 실패
    #[error("build failed: {0}")]
    Build(String),

    /// 컨트롤 플레인 작업 실패
    #[error("control operation failed: {0}")]
    Control(String),
}
