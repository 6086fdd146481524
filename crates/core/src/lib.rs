#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineError, FloodgateError};

// 설정
pub use config::{FloodgateConfig, GeneralConfig, GuardConfig};

// 상태
pub use health::HealthStatus;

// 도메인 타입
pub use types::{Action, Ipv4Cidr, ProtectionMode};
