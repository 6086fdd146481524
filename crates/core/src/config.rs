//! 설정 관리 — floodgate.toml 파싱 및 런타임 설정
//!
//! [`FloodgateConfig`]는 로깅과 가드 엔진 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`FLOODGATE_GUARD_MODE=protect` 형식)
//! 2. 설정 파일 (`floodgate.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! 임계값과 샘플링 간격의 `0`은 "기본값 사용"을 의미합니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), floodgate_core::error::FloodgateError> {
//! use floodgate_core::config::FloodgateConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FloodgateConfig::load("floodgate.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FloodgateConfig::parse("[guard]\nmode = \"protect\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use floodgate_common::DetectionEventData;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FloodgateError};
use crate::types::{Action, Ipv4Cidr, ProtectionMode};

/// Floodgate 통합 설정
///
/// `floodgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 가드 엔진 설정
    #[serde(default)]
    pub guard: GuardConfig,
}

impl FloodgateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FloodgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FloodgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FloodgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FloodgateError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FloodgateError> {
        toml::from_str(toml_str).map_err(|e| {
            FloodgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FLOODGATE_{SECTION}_{FIELD}`
    /// 예: `FLOODGATE_GUARD_THRESHOLD_SYN=800`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FLOODGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FLOODGATE_GENERAL_LOG_FORMAT");

        // Guard: 테이블 용량
        override_usize(
            &mut self.guard.source_capacity,
            "FLOODGATE_GUARD_SOURCE_CAPACITY",
        );
        override_usize(&mut self.guard.syn_capacity, "FLOODGATE_GUARD_SYN_CAPACITY");
        override_usize(&mut self.guard.udp_capacity, "FLOODGATE_GUARD_UDP_CAPACITY");
        override_usize(
            &mut self.guard.blocklist_capacity,
            "FLOODGATE_GUARD_BLOCKLIST_CAPACITY",
        );
        override_usize(
            &mut self.guard.ring_buffer_size,
            "FLOODGATE_GUARD_RING_BUFFER_SIZE",
        );
        override_string(&mut self.guard.mode, "FLOODGATE_GUARD_MODE");

        // Guard: 임계값
        let thresholds = &mut self.guard.thresholds;
        override_u32(&mut thresholds.icmp, "FLOODGATE_GUARD_THRESHOLD_ICMP");
        override_u32(&mut thresholds.syn, "FLOODGATE_GUARD_THRESHOLD_SYN");
        override_u32(&mut thresholds.udp, "FLOODGATE_GUARD_THRESHOLD_UDP");
        override_u32(&mut thresholds.anomaly, "FLOODGATE_GUARD_THRESHOLD_ANOMALY");

        // Guard: 샘플링 간격
        let sampling = &mut self.guard.sampling;
        override_u32(&mut sampling.icmp, "FLOODGATE_GUARD_INTERVAL_ICMP");
        override_u32(&mut sampling.syn, "FLOODGATE_GUARD_INTERVAL_SYN");
        override_u32(&mut sampling.udp, "FLOODGATE_GUARD_INTERVAL_UDP");
        override_u32(&mut sampling.anomaly, "FLOODGATE_GUARD_INTERVAL_ANOMALY");

        override_ports(
            &mut self.guard.watched_ports,
            "FLOODGATE_GUARD_WATCHED_PORTS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FloodgateError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.guard.validate()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 가드 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// 출발지별 전체 트래픽 테이블 용량
    pub source_capacity: usize,
    /// 출발지별 SYN 테이블 용량
    pub syn_capacity: usize,
    /// 출발지별 UDP 테이블 용량
    pub udp_capacity: usize,
    /// 차단 목록 최대 엔트리 수
    pub blocklist_capacity: usize,
    /// 이벤트 버퍼 크기 (바이트, 레코드 20바이트 단위)
    pub ring_buffer_size: usize,
    /// 보호 모드 (normal, protect)
    pub mode: String,
    /// 클래스별 임계값
    pub thresholds: ThresholdSettings,
    /// 클래스별 샘플링 간격
    pub sampling: SamplingSettings,
    /// 이상 징후를 감시할 목적지 포트 (게임 서버 등)
    pub watched_ports: Vec<u16>,
    /// 시작 시 적재할 차단 목록
    pub blocklist: Vec<BlocklistRule>,
}

impl GuardConfig {
    /// 이벤트 채널 용량 (레코드 수)
    pub fn event_capacity(&self) -> usize {
        self.ring_buffer_size / DetectionEventData::SIZE
    }

    /// 보호 모드를 파싱합니다.
    pub fn protection_mode(&self) -> Result<ProtectionMode, FloodgateError> {
        self.mode
            .parse::<ProtectionMode>()
            .map_err(|reason| invalid("guard.mode", reason))
    }

    /// 가드 섹션의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FloodgateError> {
        for (field, value) in [
            ("guard.source_capacity", self.source_capacity),
            ("guard.syn_capacity", self.syn_capacity),
            ("guard.udp_capacity", self.udp_capacity),
            ("guard.blocklist_capacity", self.blocklist_capacity),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0".to_owned()));
            }
        }

        if self.event_capacity() == 0 {
            return Err(invalid(
                "guard.ring_buffer_size",
                format!(
                    "must hold at least one {}-byte event record",
                    DetectionEventData::SIZE
                ),
            ));
        }

        self.protection_mode()?;

        if self.blocklist.len() > self.blocklist_capacity {
            return Err(invalid(
                "guard.blocklist",
                format!(
                    "{} static entries exceed blocklist_capacity {}",
                    self.blocklist.len(),
                    self.blocklist_capacity
                ),
            ));
        }

        for (idx, rule) in self.blocklist.iter().enumerate() {
            rule.cidr()
                .map_err(|reason| invalid(&format!("guard.blocklist[{idx}].cidr"), reason))?;
            rule.action()
                .map_err(|reason| invalid(&format!("guard.blocklist[{idx}].action"), reason))?;
            if rule.ttl_secs == Some(0) {
                return Err(invalid(
                    &format!("guard.blocklist[{idx}].ttl_secs"),
                    "must be greater than 0 when set".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            source_capacity: 10_000,
            syn_capacity: 10_000,
            udp_capacity: 10_000,
            blocklist_capacity: 16_384,
            ring_buffer_size: 256 * 1024, // 256KB
            mode: "normal".to_owned(),
            thresholds: ThresholdSettings::default(),
            sampling: SamplingSettings::default(),
            watched_ports: Vec::new(),
            blocklist: Vec::new(),
        }
    }
}

/// 클래스별 임계값 (0이면 기본값)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    /// 출발지별 ICMP 패킷 수 임계값
    pub icmp: u32,
    /// 출발지별 SYN 패킷 수 임계값
    pub syn: u32,
    /// 출발지별 UDP 패킷 수 임계값
    pub udp: u32,
    /// 감시 포트 트래픽 임계값
    pub anomaly: u32,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            icmp: floodgate_common::DEFAULT_ICMP_THRESHOLD,
            syn: floodgate_common::DEFAULT_SYN_THRESHOLD,
            udp: floodgate_common::DEFAULT_UDP_THRESHOLD,
            anomaly: floodgate_common::DEFAULT_ANOMALY_THRESHOLD,
        }
    }
}

/// 클래스별 샘플링 간격 (0이면 기본값)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// ICMP 이벤트 간격
    pub icmp: u32,
    /// SYN 이벤트 간격
    pub syn: u32,
    /// UDP 이벤트 간격
    pub udp: u32,
    /// 감시 포트 이벤트 간격
    pub anomaly: u32,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            icmp: floodgate_common::DEFAULT_ICMP_INTERVAL,
            syn: floodgate_common::DEFAULT_SYN_INTERVAL,
            udp: floodgate_common::DEFAULT_UDP_INTERVAL,
            anomaly: floodgate_common::DEFAULT_ANOMALY_INTERVAL,
        }
    }
}

/// 정적 차단 목록 엔트리
///
/// ```toml
/// [[guard.blocklist]]
/// cidr = "10.0.0.0/8"
/// action = "drop"
/// ttl_secs = 3600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistRule {
    /// 대상 주소 또는 CIDR (`10.0.0.5`, `10.0.0.0/8`)
    pub cidr: String,
    /// 적용할 액션 (drop, pass)
    #[serde(default = "default_rule_action")]
    pub action: String,
    /// 만료까지의 시간 (초, 없으면 영구)
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl BlocklistRule {
    /// CIDR을 파싱합니다.
    pub fn cidr(&self) -> Result<Ipv4Cidr, String> {
        self.cidr.parse()
    }

    /// 액션을 파싱합니다.
    pub fn action(&self) -> Result<Action, String> {
        self.action.parse()
    }
}

fn default_rule_action() -> String {
    "drop".to_owned()
}

fn invalid(field: &str, reason: String) -> FloodgateError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_ports(target: &mut Vec<u16>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let parsed: Result<Vec<u16>, _> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<u16>)
            .collect();
        match parsed {
            Ok(ports) => *target = ports,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse port list from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = FloodgateConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.guard.mode, "normal");
        assert_eq!(config.guard.thresholds.syn, 500);
        assert_eq!(config.guard.sampling.syn, 50);
        assert!(config.guard.blocklist.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        let config = FloodgateConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn default_event_capacity_matches_ring_buffer() {
        let config = GuardConfig::default();
        assert_eq!(config.event_capacity(), 256 * 1024 / 20);
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = FloodgateConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.guard.source_capacity, 10_000);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[guard.thresholds]
syn = 800
"#;
        let config = FloodgateConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.guard.thresholds.syn, 800);
        assert_eq!(config.guard.thresholds.udp, 2000);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"

[guard]
source_capacity = 4096
syn_capacity = 2048
udp_capacity = 2048
blocklist_capacity = 1024
ring_buffer_size = 2000
mode = "protect"
watched_ports = [27015, 25565]

[guard.thresholds]
icmp = 300
syn = 600
udp = 5000
anomaly = 200

[guard.sampling]
icmp = 10
syn = 20
udp = 30
anomaly = 40

[[guard.blocklist]]
cidr = "10.0.0.0/8"

[[guard.blocklist]]
cidr = "10.1.0.0/16"
action = "pass"

[[guard.blocklist]]
cidr = "203.0.113.7"
ttl_secs = 600
"#;
        let config = FloodgateConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.guard.event_capacity(), 100);
        assert_eq!(
            config.guard.protection_mode().unwrap(),
            ProtectionMode::Protect
        );
        assert_eq!(config.guard.watched_ports, vec![27015, 25565]);
        assert_eq!(config.guard.sampling.anomaly, 40);
        assert_eq!(config.guard.blocklist.len(), 3);
        assert_eq!(config.guard.blocklist[0].action().unwrap(), Action::Drop);
        assert_eq!(config.guard.blocklist[1].action().unwrap(), Action::Pass);
        assert_eq!(config.guard.blocklist[2].ttl_secs, Some(600));
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = FloodgateConfig::parse("invalid = [[[toml");
        assert!(matches!(
            result,
            Err(FloodgateError::Config(ConfigError::ParseFailed { .. }))
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = FloodgateConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = FloodgateConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = FloodgateConfig::default();
        config.guard.syn_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("syn_capacity"));
    }

    #[test]
    fn validate_rejects_ring_buffer_smaller_than_one_record() {
        let mut config = FloodgateConfig::default();
        config.guard.ring_buffer_size = 19;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ring_buffer_size"));
    }

    #[test]
    fn validate_rejects_unknown_mode() {
        let mut config = FloodgateConfig::default();
        config.guard.mode = "paranoid".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("guard.mode"));
    }

    #[test]
    fn validate_rejects_malformed_cidr() {
        let mut config = FloodgateConfig::default();
        config.guard.blocklist.push(BlocklistRule {
            cidr: "10.0.0.0/40".to_owned(),
            action: "drop".to_owned(),
            ttl_secs: None,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("guard.blocklist[0].cidr"));
    }

    #[test]
    fn validate_rejects_unknown_rule_action() {
        let mut config = FloodgateConfig::default();
        config.guard.blocklist.push(BlocklistRule {
            cidr: "10.0.0.1".to_owned(),
            action: "monitor".to_owned(),
            ttl_secs: None,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("action"));
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let mut config = FloodgateConfig::default();
        config.guard.blocklist.push(BlocklistRule {
            cidr: "10.0.0.1".to_owned(),
            action: "drop".to_owned(),
            ttl_secs: Some(0),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_thresholds_are_accepted() {
        let mut config = FloodgateConfig::default();
        config.guard.thresholds.icmp = 0;
        config.guard.sampling.udp = 0;
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_FLOODGATE_STR", "overridden") };
        override_string(&mut val, "TEST_FLOODGATE_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_FLOODGATE_STR") };
    }

    #[test]
    #[serial]
    fn env_override_u32_invalid_keeps_original() {
        let mut val = 500u32;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_FLOODGATE_U32_BAD", "lots") };
        override_u32(&mut val, "TEST_FLOODGATE_U32_BAD");
        assert_eq!(val, 500); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_FLOODGATE_U32_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_ports() {
        let mut val = vec![80];
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_FLOODGATE_PORTS", "27015, 25565,") };
        override_ports(&mut val, "TEST_FLOODGATE_PORTS");
        assert_eq!(val, vec![27015, 25565]);
        unsafe { std::env::remove_var("TEST_FLOODGATE_PORTS") };
    }

    #[test]
    #[serial]
    fn env_override_ports_invalid_keeps_original() {
        let mut val = vec![80];
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_FLOODGATE_PORTS_BAD", "80,70000") };
        override_ports(&mut val, "TEST_FLOODGATE_PORTS_BAD");
        assert_eq!(val, vec![80]);
        unsafe { std::env::remove_var("TEST_FLOODGATE_PORTS_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 42usize;
        override_usize(&mut val, "TEST_FLOODGATE_NONEXISTENT_12345");
        assert_eq!(val, 42);
    }

    #[test]
    #[serial]
    fn apply_env_overrides_updates_guard_section() {
        let mut config = FloodgateConfig::default();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe {
            std::env::set_var("FLOODGATE_GUARD_MODE", "protect");
            std::env::set_var("FLOODGATE_GUARD_THRESHOLD_UDP", "7000");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("FLOODGATE_GUARD_MODE");
            std::env::remove_var("FLOODGATE_GUARD_THRESHOLD_UDP");
        }
        assert_eq!(config.guard.mode, "protect");
        assert_eq!(config.guard.thresholds.udp, 7000);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = FloodgateConfig::default();
        config.guard.blocklist.push(BlocklistRule {
            cidr: "192.0.2.0/24".to_owned(),
            action: "drop".to_owned(),
            ttl_secs: Some(60),
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = FloodgateConfig::parse(&toml_str).unwrap();
        assert_eq!(config.guard.mode, parsed.guard.mode);
        assert_eq!(parsed.guard.blocklist[0].cidr, "192.0.2.0/24");
        assert_eq!(parsed.guard.blocklist[0].ttl_secs, Some(60));
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = FloodgateConfig::from_file("/nonexistent/path/floodgate.toml").await;
        assert!(matches!(
            result,
            Err(FloodgateError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
