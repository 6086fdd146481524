//! 가드 에러 타입
//!
//! 패킷 경로는 에러를 반환하지 않습니다. [`ControlError`]는 컨트롤 플레인 호출의
//! 결과이고, [`GuardError`]는 엔진 구성 단계의 실패입니다.
//! 두 타입 모두 `From` 구현으로 [`FloodgateError`]로 변환됩니다.

use floodgate_core::error::{EngineError, FloodgateError};

/// 컨트롤 플레인 작업 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// 대상 엔트리가 존재하지 않음
    #[error("not found: {0}")]
    NotFound(String),

    /// 유효하지 않은 인자
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 테이블 용량 초과
    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),
}

/// 가드 엔진 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// 설정 값이 엔진 구성에 사용할 수 없음
    #[error("invalid config: {0}")]
    Config(String),

    /// 초기 상태 적재 실패
    #[error("control error: {0}")]
    Control(#[from] ControlError),
}

impl From<GuardError> for FloodgateError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Config(reason) => FloodgateError::Guard(EngineError::Build(reason)),
            GuardError::Control(inner) => {
                FloodgateError::Guard(EngineError::Control(inner.to_string()))
            }
        }
    }
}

impl From<ControlError> for FloodgateError {
    fn from(err: ControlError) -> Self {
        FloodgateError::Guard(EngineError::Control(err.to_string()))
    }
}
