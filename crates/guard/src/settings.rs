//! 설정 저장소 — 런타임 조정 가능한 스칼라 테이블
//!
//! [`ConfigStore`]는 `AtomicU32` 슬롯 배열입니다. 값 하나가 원자적으로 읽히는
//! 스칼라이므로 패킷 경로는 여러 필드의 일관성을 가정하지 않습니다.
//! 슬롯 값 `0`(미설정)은 클래스별 기본값으로 대체됩니다.
//!
//! 쓰기 메서드는 컨트롤 플레인용입니다. 임계값은 클래스별 안전 범위로
//! 보정(clamp)되어 저장됩니다.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, Ordering};

use floodgate_common::{
    CONFIG_IDX_ANOMALY_INTERVAL, CONFIG_IDX_ANOMALY_THRESHOLD, CONFIG_IDX_ICMP_INTERVAL,
    CONFIG_IDX_ICMP_THRESHOLD, CONFIG_IDX_MODE, CONFIG_IDX_SYN_INTERVAL, CONFIG_IDX_SYN_THRESHOLD,
    CONFIG_IDX_UDP_INTERVAL, CONFIG_IDX_UDP_THRESHOLD, CONFIG_MAX_ENTRIES,
    DEFAULT_ANOMALY_INTERVAL, DEFAULT_ANOMALY_THRESHOLD, DEFAULT_ICMP_INTERVAL,
    DEFAULT_ICMP_THRESHOLD, DEFAULT_SYN_INTERVAL, DEFAULT_SYN_THRESHOLD, DEFAULT_UDP_INTERVAL,
    DEFAULT_UDP_THRESHOLD,
};
use floodgate_core::types::ProtectionMode;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ControlError;

/// 임계값 클래스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdClass {
    /// 출발지별 ICMP (전체 카운트 기준)
    Icmp,
    /// 출발지별 SYN-only 세그먼트
    Syn,
    /// 출발지별 UDP 데이터그램
    Udp,
    /// 감시 포트로 향하는 트래픽
    Anomaly,
}

impl ThresholdClass {
    /// 모든 클래스
    pub const ALL: [Self; 4] = [Self::Icmp, Self::Syn, Self::Udp, Self::Anomaly];

    /// 표시 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Syn => "syn",
            Self::Udp => "udp",
            Self::Anomaly => "anomaly",
        }
    }

    /// 임계값 슬롯 인덱스
    pub const fn threshold_index(self) -> usize {
        match self {
            Self::Icmp => CONFIG_IDX_ICMP_THRESHOLD,
            Self::Syn => CONFIG_IDX_SYN_THRESHOLD,
            Self::Udp => CONFIG_IDX_UDP_THRESHOLD,
            Self::Anomaly => CONFIG_IDX_ANOMALY_THRESHOLD,
        }
    }

    /// 샘플링 간격 슬롯 인덱스
    pub const fn interval_index(self) -> usize {
        match self {
            Self::Icmp => CONFIG_IDX_ICMP_INTERVAL,
            Self::Syn => CONFIG_IDX_SYN_INTERVAL,
            Self::Udp => CONFIG_IDX_UDP_INTERVAL,
            Self::Anomaly => CONFIG_IDX_ANOMALY_INTERVAL,
        }
    }

    /// 기본 임계값
    pub const fn default_threshold(self) -> u32 {
        match self {
            Self::Icmp => DEFAULT_ICMP_THRESHOLD,
            Self::Syn => DEFAULT_SYN_THRESHOLD,
            Self::Udp => DEFAULT_UDP_THRESHOLD,
            Self::Anomaly => DEFAULT_ANOMALY_THRESHOLD,
        }
    }

    /// 기본 샘플링 간격
    pub const fn default_interval(self) -> u32 {
        match self {
            Self::Icmp => DEFAULT_ICMP_INTERVAL,
            Self::Syn => DEFAULT_SYN_INTERVAL,
            Self::Udp => DEFAULT_UDP_INTERVAL,
            Self::Anomaly => DEFAULT_ANOMALY_INTERVAL,
        }
    }

    /// 컨트롤 플레인이 설정할 수 있는 임계값 범위
    pub const fn threshold_bounds(self) -> RangeInclusive<u32> {
        match self {
            Self::Icmp => 100..=10_000,
            Self::Syn => 100..=50_000,
            Self::Udp => 500..=100_000,
            Self::Anomaly => 50..=5_000,
        }
    }
}

/// 공유 설정 저장소
pub struct ConfigStore {
    slots: [AtomicU32; CONFIG_MAX_ENTRIES],
}

impl ConfigStore {
    /// 모든 슬롯이 0(기본값 사용)인 저장소를 생성합니다.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    /// 원시 슬롯 값 (범위 밖 인덱스는 0)
    pub fn raw(&self, index: usize) -> u32 {
        self.slots
            .get(index)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    /// 클래스의 유효 임계값 (0이면 기본값)
    pub fn threshold(&self, class: ThresholdClass) -> u32 {
        match self.slots[class.threshold_index()].load(Ordering::Relaxed) {
            0 => class.default_threshold(),
            value => value,
        }
    }

    /// 클래스의 유효 샘플링 간격 (0이면 기본값)
    pub fn interval(&self, class: ThresholdClass) -> u32 {
        match self.slots[class.interval_index()].load(Ordering::Relaxed) {
            0 => class.default_interval(),
            value => value,
        }
    }

    /// 현재 보호 모드
    pub fn mode(&self) -> ProtectionMode {
        ProtectionMode::from_u32(self.slots[CONFIG_IDX_MODE].load(Ordering::Relaxed))
    }

    /// 임계값을 설정하고 실제 적용된 값을 반환합니다.
    ///
    /// 0은 거부되며(기본값 복원은 [`Self::reset_threshold`]), 안전 범위 밖의
    /// 값은 경계로 보정됩니다.
    pub fn set_threshold(&self, class: ThresholdClass, value: u32) -> Result<u32, ControlError> {
        if value == 0 {
            return Err(ControlError::InvalidArgument(format!(
                "{} threshold must be greater than 0",
                class.name()
            )));
        }
        let bounds = class.threshold_bounds();
        let applied = value.clamp(*bounds.start(), *bounds.end());
        if applied != value {
            warn!(
                class = class.name(),
                requested = value,
                applied,
                "threshold outside safety bounds, clamped"
            );
        }
        self.slots[class.threshold_index()].store(applied, Ordering::Relaxed);
        info!(class = class.name(), threshold = applied, "threshold updated");
        Ok(applied)
    }

    /// 임계값을 기본값으로 되돌립니다.
    pub fn reset_threshold(&self, class: ThresholdClass) {
        self.slots[class.threshold_index()].store(0, Ordering::Relaxed);
    }

    /// 샘플링 간격을 설정합니다 (1 이상).
    pub fn set_interval(&self, class: ThresholdClass, value: u32) -> Result<(), ControlError> {
        if value == 0 {
            return Err(ControlError::InvalidArgument(format!(
                "{} sample interval must be at least 1",
                class.name()
            )));
        }
        self.slots[class.interval_index()].store(value, Ordering::Relaxed);
        info!(class = class.name(), interval = value, "sample interval updated");
        Ok(())
    }

    /// 샘플링 간격을 기본값으로 되돌립니다.
    pub fn reset_interval(&self, class: ThresholdClass) {
        self.slots[class.interval_index()].store(0, Ordering::Relaxed);
    }

    /// 보호 모드를 설정합니다.
    pub fn set_mode(&self, mode: ProtectionMode) {
        self.slots[CONFIG_IDX_MODE].store(mode.as_u32(), Ordering::Relaxed);
        info!(%mode, "protection mode updated");
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
