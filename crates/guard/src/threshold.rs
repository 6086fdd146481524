//! 임계값 평가 — 샘플링된 임계값 초과 판정
//!
//! 출발지가 임계값을 넘은 뒤에는 매 패킷이 아니라 `interval`번째 패킷마다
//! 신호를 냅니다. 지속 공격 중에도 이벤트 양이 카운트에 비례해 제한됩니다.
//!
//! ```text
//! count:  ... T  T+1 ... k*S ... (k+1)*S ...
//! signal:     .   .       ✓         ✓
//! ```

use std::sync::Arc;

use floodgate_common::{
    CONFIDENCE_ANOMALY, CONFIDENCE_ICMP_FLOOD, CONFIDENCE_SYN_FLOOD, CONFIDENCE_UDP_FLOOD,
};

use crate::emitter::DetectionKind;
use crate::settings::{ConfigStore, ThresholdClass};

/// 샘플링 규칙: `count > threshold && count % interval == 0`
///
/// `interval`이 0이면 항상 `false`입니다.
pub const fn sampled_crossing(count: u64, threshold: u32, interval: u32) -> bool {
    interval != 0 && count > threshold as u64 && count % interval as u64 == 0
}

impl ThresholdClass {
    /// 이 클래스가 내보내는 이벤트 종류
    pub const fn event_kind(self) -> DetectionKind {
        match self {
            Self::Icmp => DetectionKind::IcmpFlood,
            Self::Syn => DetectionKind::SynFlood,
            Self::Udp => DetectionKind::UdpFlood,
            Self::Anomaly => DetectionKind::Anomaly,
        }
    }

    /// 이 클래스 이벤트의 신뢰도 (0..=100)
    pub const fn confidence(self) -> u8 {
        let value = match self {
            Self::Icmp => CONFIDENCE_ICMP_FLOOD,
            Self::Syn => CONFIDENCE_SYN_FLOOD,
            Self::Udp => CONFIDENCE_UDP_FLOOD,
            Self::Anomaly => CONFIDENCE_ANOMALY,
        };
        value as u8
    }
}

/// 설정 저장소의 현재 값으로 샘플링 규칙을 적용하는 평가기
#[derive(Clone)]
pub struct ThresholdEvaluator {
    settings: Arc<ConfigStore>,
}

impl ThresholdEvaluator {
    /// 설정 저장소를 공유하는 평가기를 생성합니다.
    pub fn new(settings: Arc<ConfigStore>) -> Self {
        Self { settings }
    }

    /// 현재 카운트가 이 클래스에서 신호를 내야 하는지 판정합니다.
    pub fn should_signal(&self, count: u64, class: ThresholdClass) -> bool {
        sampled_crossing(
            count,
            self.settings.threshold(class),
            self.settings.interval(class),
        )
    }
}
