//! 컨트롤 플레인 — 패킷 경로 밖의 유일한 변경 진입점
//!
//! [`Control`]은 [`Guard`](crate::Guard)와 같은 공유 상태를 가리키는 핸들입니다.
//! 차단 목록, 임계값/샘플링 간격, 보호 모드, 감시 포트, 카운터 조회/초기화를
//! 담당합니다. 보호 모드는 여기서만 읽습니다 ([`Control::enforce`]).
//!
//! 쓰기는 패킷 처리와 동시에 일어날 수 있으며, 처리 중인 패킷은 이전 값이나
//! 새 값 중 하나를 봅니다.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use floodgate_core::config::GuardConfig;
use floodgate_core::types::{Action, Ipv4Cidr, ProtectionMode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blocklist::{BlockListEntry, unix_now};
use crate::counter::{CounterEntry, FlowKey, FlowTable};
use crate::emitter::DetectionEvent;
use crate::error::{ControlError, GuardError};
use crate::pipeline::Shared;
use crate::settings::ThresholdClass;
use crate::stats::RawTrafficSnapshot;

/// 카운터 차원
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// 출발지별 전체 패킷
    Source,
    /// 출발지별 SYN-only 세그먼트
    Syn,
    /// 출발지별 UDP 데이터그램
    Udp,
}

impl Dimension {
    /// 모든 차원
    pub const ALL: [Self; 3] = [Self::Source, Self::Syn, Self::Udp];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Syn => write!(f, "syn"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// 컨트롤 플레인 핸들
#[derive(Clone)]
pub struct Control {
    shared: Arc<Shared>,
}

impl Control {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    // =========================================================================
    // 차단 목록
    // =========================================================================

    /// CIDR 엔트리를 추가합니다. 같은 프리픽스가 있으면 액션과 만료를 교체합니다.
    pub fn block(
        &self,
        cidr: Ipv4Cidr,
        action: Action,
        ttl: Option<Duration>,
    ) -> Result<(), ControlError> {
        let mut entry = BlockListEntry::new(cidr, action);
        if let Some(ttl) = ttl {
            entry = entry.with_expiry(entry.inserted_at.saturating_add(ttl.as_secs().max(1)));
        }
        self.shared.blocklist.insert(entry)?;
        info!(%cidr, %action, ttl_secs = ttl.map(|t| t.as_secs()), "blocklist entry set");
        Ok(())
    }

    /// CIDR 엔트리를 제거합니다.
    pub fn unblock(&self, cidr: Ipv4Cidr) -> Result<BlockListEntry, ControlError> {
        let removed = self
            .shared
            .blocklist
            .remove(cidr.network(), cidr.prefix_len())?;
        info!(%cidr, "blocklist entry removed");
        Ok(removed)
    }

    /// CIDR 엔트리를 조회합니다.
    pub fn blocklist_get(&self, cidr: Ipv4Cidr) -> Option<BlockListEntry> {
        self.shared.blocklist.get(cidr.network(), cidr.prefix_len())
    }

    /// 차단 목록 스냅샷
    pub fn blocklist_entries(&self) -> Vec<BlockListEntry> {
        self.shared.blocklist.entries()
    }

    /// 주소에 적용될 액션 (패킷 경로와 같은 조회)
    pub fn blocklist_lookup(&self, addr: Ipv4Addr) -> Action {
        self.shared.blocklist.lookup(addr)
    }

    /// 현재 시각 기준으로 만료된 엔트리를 제거합니다.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(unix_now())
    }

    /// `now`(Unix 초) 기준으로 만료된 엔트리를 제거합니다.
    pub fn purge_expired_at(&self, now: u64) -> usize {
        self.shared.blocklist.purge_expired(now)
    }

    /// 차단 목록을 비웁니다.
    pub fn clear_blocklist(&self) {
        self.shared.blocklist.clear();
        info!("blocklist cleared");
    }

    // =========================================================================
    // 임계값 / 샘플링 / 모드
    // =========================================================================

    /// 임계값을 설정하고 실제 적용된 값을 반환합니다 (안전 범위로 보정).
    pub fn set_threshold(&self, class: ThresholdClass, value: u32) -> Result<u32, ControlError> {
        self.shared.settings.set_threshold(class, value)
    }

    /// 유효 임계값
    pub fn threshold(&self, class: ThresholdClass) -> u32 {
        self.shared.settings.threshold(class)
    }

    /// 임계값을 기본값으로 되돌립니다.
    pub fn reset_threshold(&self, class: ThresholdClass) {
        self.shared.settings.reset_threshold(class);
        debug!(class = class.name(), "threshold reset to default");
    }

    /// 샘플링 간격을 설정합니다.
    pub fn set_interval(&self, class: ThresholdClass, value: u32) -> Result<(), ControlError> {
        self.shared.settings.set_interval(class, value)
    }

    /// 유효 샘플링 간격
    pub fn interval(&self, class: ThresholdClass) -> u32 {
        self.shared.settings.interval(class)
    }

    /// 샘플링 간격을 기본값으로 되돌립니다.
    pub fn reset_interval(&self, class: ThresholdClass) {
        self.shared.settings.reset_interval(class);
        debug!(class = class.name(), "sample interval reset to default");
    }

    /// 보호 모드를 설정합니다.
    pub fn set_mode(&self, mode: ProtectionMode) {
        self.shared.settings.set_mode(mode);
    }

    /// 현재 보호 모드
    pub fn mode(&self) -> ProtectionMode {
        self.shared.settings.mode()
    }

    // =========================================================================
    // 감시 포트
    // =========================================================================

    /// 감시 포트를 추가합니다. 새로 추가되었으면 `true`.
    pub fn watch_port(&self, port: u16) -> bool {
        let added = self.shared.ports.insert(port);
        if added {
            info!(port, "watched port added");
        }
        added
    }

    /// 감시 포트를 제거합니다.
    pub fn unwatch_port(&self, port: u16) -> Result<(), ControlError> {
        if self.shared.ports.remove(port) {
            info!(port, "watched port removed");
            Ok(())
        } else {
            Err(ControlError::NotFound(format!("watched port {port}")))
        }
    }

    /// 감시 포트 목록 (오름차순)
    pub fn watched_ports(&self) -> Vec<u16> {
        self.shared.ports.ports()
    }

    // =========================================================================
    // 카운터
    // =========================================================================

    fn table(&self, dimension: Dimension) -> &dyn FlowTable {
        match dimension {
            Dimension::Source => &*self.shared.source,
            Dimension::Syn => &*self.shared.syn,
            Dimension::Udp => &*self.shared.udp,
        }
    }

    /// 출발지의 카운터를 조회합니다.
    pub fn counter_get(&self, dimension: Dimension, key: FlowKey) -> Option<CounterEntry> {
        self.table(dimension).get(key)
    }

    /// 패킷 수 상위 `n`개 출발지
    pub fn counter_top(&self, dimension: Dimension, n: usize) -> Vec<CounterEntry> {
        self.table(dimension).top(n)
    }

    /// 차원의 현재 엔트리 수
    pub fn counter_len(&self, dimension: Dimension) -> usize {
        self.table(dimension).len()
    }

    /// 출발지 하나의 카운터를 제거합니다.
    pub fn counter_remove(
        &self,
        dimension: Dimension,
        key: FlowKey,
    ) -> Result<CounterEntry, ControlError> {
        self.table(dimension)
            .remove(key)
            .ok_or_else(|| ControlError::NotFound(format!("{dimension} counter for {key}")))
    }

    /// 차원의 모든 카운터를 초기화합니다.
    pub fn reset_counters(&self, dimension: Dimension) {
        self.table(dimension).clear();
        info!(%dimension, "counters reset");
    }

    /// 프로토콜/판정 집계와 건너뛴 카운트 수를 초기화합니다.
    pub fn reset_stats(&self) {
        self.shared.protocols.reset();
        self.shared.verdicts.reset();
        self.shared.skipped.store(0, Ordering::Relaxed);
        info!("traffic statistics reset");
    }

    /// 현재 누적 통계 스냅샷
    pub fn snapshot(&self) -> RawTrafficSnapshot {
        self.shared.snapshot()
    }

    // =========================================================================
    // 보호 모드 적용 / 설정 적재
    // =========================================================================

    /// 보호 모드에서 이벤트의 출발지를 `/32 DROP`으로 차단합니다.
    ///
    /// 차단했으면 `true`를 반환합니다. `Normal` 모드이거나 출발지에 가장 길게
    /// 매칭되는 엔트리가 `PASS`(예: `10.0.0.0/8 DROP` 안의 `10.1.0.0/16 PASS`)이면
    /// 아무것도 하지 않고 `false`입니다.
    pub fn enforce(
        &self,
        event: &DetectionEvent,
        ttl: Option<Duration>,
    ) -> Result<bool, ControlError> {
        if self.mode() != ProtectionMode::Protect {
            return Ok(false);
        }

        let host = Ipv4Cidr::host(event.source_ip);
        if self.shared.blocklist.matching_action(event.source_ip) == Some(Action::Pass) {
            debug!(
                source = %event.source_ip,
                kind = %event.kind,
                "source allowlisted, not enforced"
            );
            return Ok(false);
        }

        self.block(host, Action::Drop, ttl)?;
        warn!(
            source = %event.source_ip,
            kind = %event.kind,
            rate = event.rate_estimate,
            confidence = event.confidence,
            "source blocked in protect mode"
        );
        Ok(true)
    }

    /// 가드 설정 섹션 전체를 적용합니다.
    ///
    /// 모드, 임계값/샘플링 간격(0은 기본값), 감시 포트(교체), 정적 차단 목록
    /// (추가 또는 교체)을 반영합니다. 동적으로 추가된 차단 엔트리는 유지됩니다.
    pub fn apply(&self, config: &GuardConfig) -> Result<(), GuardError> {
        let mode = config
            .protection_mode()
            .map_err(|e| GuardError::Config(e.to_string()))?;
        self.set_mode(mode);

        for class in ThresholdClass::ALL {
            let (threshold, interval) = match class {
                ThresholdClass::Icmp => (config.thresholds.icmp, config.sampling.icmp),
                ThresholdClass::Syn => (config.thresholds.syn, config.sampling.syn),
                ThresholdClass::Udp => (config.thresholds.udp, config.sampling.udp),
                ThresholdClass::Anomaly => (config.thresholds.anomaly, config.sampling.anomaly),
            };
            match threshold {
                0 => self.reset_threshold(class),
                value => {
                    self.set_threshold(class, value)?;
                }
            }
            match interval {
                0 => self.reset_interval(class),
                value => self.set_interval(class, value)?,
            }
        }

        self.shared.ports.clear();
        for port in &config.watched_ports {
            self.shared.ports.insert(*port);
        }

        for (idx, rule) in config.blocklist.iter().enumerate() {
            let invalid =
                |reason: String| GuardError::Config(format!("guard.blocklist[{idx}]: {reason}"));
            let cidr = rule.cidr().map_err(invalid)?;
            let action = rule.action().map_err(invalid)?;
            self.block(cidr, action, rule.ttl_secs.map(Duration::from_secs))?;
        }

        info!(
            %mode,
            watched_ports = config.watched_ports.len(),
            static_entries = config.blocklist.len(),
            "guard config applied"
        );
        Ok(())
    }
}
