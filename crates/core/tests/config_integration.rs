//! floodgate.toml 통합 설정 테스트
//!
//! - floodgate.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use std::io::Write;

use floodgate_core::config::{FloodgateConfig, GuardConfig};
use floodgate_core::error::{ConfigError, FloodgateError};
use floodgate_core::types::ProtectionMode;

const EXAMPLE: &str = include_str!("../../../floodgate.toml.example");

// =============================================================================
// floodgate.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = FloodgateConfig::parse(EXAMPLE).expect("example config should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn example_config_passes_validation() {
    let config = FloodgateConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let config = FloodgateConfig::parse(EXAMPLE).expect("should parse");
    let defaults = GuardConfig::default();

    assert_eq!(config.guard.source_capacity, defaults.source_capacity);
    assert_eq!(config.guard.syn_capacity, defaults.syn_capacity);
    assert_eq!(config.guard.udp_capacity, defaults.udp_capacity);
    assert_eq!(config.guard.blocklist_capacity, defaults.blocklist_capacity);
    assert_eq!(config.guard.ring_buffer_size, defaults.ring_buffer_size);
    assert_eq!(config.guard.mode, defaults.mode);
    assert_eq!(config.guard.thresholds.icmp, defaults.thresholds.icmp);
    assert_eq!(config.guard.thresholds.syn, defaults.thresholds.syn);
    assert_eq!(config.guard.thresholds.udp, defaults.thresholds.udp);
    assert_eq!(config.guard.thresholds.anomaly, defaults.thresholds.anomaly);
    assert_eq!(config.guard.sampling.icmp, defaults.sampling.icmp);
    assert_eq!(config.guard.sampling.syn, defaults.sampling.syn);
    assert_eq!(config.guard.sampling.udp, defaults.sampling.udp);
    assert_eq!(config.guard.sampling.anomaly, defaults.sampling.anomaly);
    assert!(config.guard.watched_ports.is_empty());
    assert!(config.guard.blocklist.is_empty());
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_format = "pretty"
"#;
    let config = FloodgateConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.guard.source_capacity, 10_000);
}

#[test]
fn partial_config_blocklist_only() {
    let toml = r#"
[[guard.blocklist]]
cidr = "10.0.0.5/32"
"#;
    let config = FloodgateConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");
    assert_eq!(config.guard.blocklist.len(), 1);
    assert_eq!(config.guard.blocklist[0].action, "drop");
    assert_eq!(config.guard.blocklist[0].ttl_secs, None);
}

#[test]
fn blocklist_exceeding_capacity_is_rejected() {
    let toml = r#"
[guard]
blocklist_capacity = 1

[[guard.blocklist]]
cidr = "10.0.0.1"

[[guard.blocklist]]
cidr = "10.0.0.2"
"#;
    let config = FloodgateConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("guard.blocklist"));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[guard]
mode = "normal"
"#;
    let original = std::env::var("FLOODGATE_GUARD_MODE").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("FLOODGATE_GUARD_MODE", "protect");
    }

    let mut config = FloodgateConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.guard.protection_mode();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("FLOODGATE_GUARD_MODE", val),
            None => std::env::remove_var("FLOODGATE_GUARD_MODE"),
        }
    }

    assert_eq!(result.expect("mode should parse"), ProtectionMode::Protect);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("FLOODGATE_GUARD_INTERVAL_SYN").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("FLOODGATE_GUARD_INTERVAL_SYN", "25");
    }

    let mut config = FloodgateConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.guard.sampling.syn;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("FLOODGATE_GUARD_INTERVAL_SYN", val),
            None => std::env::remove_var("FLOODGATE_GUARD_INTERVAL_SYN"),
        }
    }

    assert_eq!(result, 25);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[guard.thresholds]
icmp = 4000
"#;

    // SAFETY: 존재하지 않는 변수를 명시적으로 제거
    unsafe {
        std::env::remove_var("FLOODGATE_GUARD_THRESHOLD_ICMP");
    }

    let mut config = FloodgateConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.guard.thresholds.icmp, 4000);
}

// =============================================================================
// 에러 테스트
// =============================================================================

#[test]
fn whitespace_only_parses_with_defaults() {
    let config = FloodgateConfig::parse("   \n\t\n").expect("should parse");
    assert_eq!(config.guard.mode, "normal");
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[guard]
source_capacity = "lots"
"#;
    let result = FloodgateConfig::parse(toml);
    assert!(matches!(
        result,
        Err(FloodgateError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[test]
fn out_of_range_port_is_parse_error() {
    let toml = r#"
[guard]
watched_ports = [70000]
"#;
    assert!(FloodgateConfig::parse(toml).is_err());
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[dashboard]
listen = "0.0.0.0:8080"
"#;
    let config = FloodgateConfig::parse(toml).expect("unknown sections should be ignored");
    assert_eq!(config.general.log_level, "info");
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = FloodgateConfig::from_file("/nonexistent/floodgate.toml").await;
    assert!(matches!(
        result,
        Err(FloodgateError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_example_config_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(EXAMPLE.as_bytes())
        .expect("should write config");

    let config = FloodgateConfig::load(file.path())
        .await
        .expect("example config should load");
    assert_eq!(config.guard.event_capacity(), 262_144 / 20);
}

#[tokio::test]
async fn from_file_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(b"[guard]\nmode = \"lockdown\"\n")
        .expect("should write config");

    let err = FloodgateConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        FloodgateError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn example_config_serialize_roundtrip() {
    let config = FloodgateConfig::parse(EXAMPLE).expect("should parse");
    let serialized = toml::to_string_pretty(&config).expect("should serialize");
    let reparsed = FloodgateConfig::parse(&serialized).expect("should reparse");
    assert_eq!(config.guard.thresholds.syn, reparsed.guard.thresholds.syn);
    assert_eq!(config.guard.mode, reparsed.guard.mode);
}
