//! 가드 파이프라인 — 패킷 단위 분류/집계/판정/발행
//!
//! [`Guard`]는 공유 상태(차단 목록, 카운터 테이블, 설정 저장소, 이벤트 싱크)를
//! 조합한 패킷 처리기입니다. 빌더 패턴([`GuardBuilder`])으로 생성하며
//! `&self`로 여러 스레드에서 동시에 호출됩니다.
//!
//! # 처리 순서
//! ```text
//! PARSE ──Unclassified──▶ PASS (상태 변경 없음)
//!   │
//!   ▼
//! BLOCKLIST ──DROP 매칭──▶ DROP (카운터/이벤트 없음)
//!   │
//!   ▼
//! COUNT (protocol tally, source total, SYN, UDP)
//!   │
//!   ▼
//! THRESHOLD ──신호──▶ EMIT (패킷당 최대 1개)
//!   │
//!   ▼
//! PASS
//! ```
//!
//! 패킷 경로는 블로킹, 대기, 힙 할당, 로깅을 하지 않습니다.
//! 모든 변경은 미리 할당된 슬롯에 대한 원자적 연산입니다.
//!
//! # 사용 예시
//! ```ignore
//! let (guard, mut events) = Guard::builder()
//!     .config(config.guard.clone())
//!     .build()?;
//!
//! let verdict = guard.process(&frame, frame.len());
//! for event in events.drain(256) {
//!     guard.control().enforce(&event, Some(Duration::from_secs(300)))?;
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use floodgate_common::stats_index;
use floodgate_core::config::GuardConfig;
use floodgate_core::health::HealthStatus;
use floodgate_core::types::Action;
use tracing::info;

use crate::blocklist::BlockList;
use crate::control::Control;
use crate::counter::{FlowCounterStore, FlowKey, FlowTable};
use crate::emitter::{self, DetectionEvent, EventReceiver, EventSink};
use crate::error::GuardError;
use crate::parser::{self, Classified, Ipv4Packet, Transport};
use crate::ports::WatchedPorts;
use crate::settings::{ConfigStore, ThresholdClass};
use crate::stats::{ProtocolTally, RawTableStats, RawTrafficSnapshot, VerdictTally};
use crate::threshold::ThresholdEvaluator;

/// 패킷 판정
pub type Verdict = Action;

/// 이벤트 채널 사용률이 이 값을 넘으면 `Degraded`
const CHANNEL_DEGRADED_RATIO: f64 = 0.9;

/// 파이프라인과 컨트롤 플레인이 공유하는 상태
pub(crate) struct Shared {
    pub(crate) blocklist: BlockList,
    pub(crate) settings: Arc<ConfigStore>,
    pub(crate) ports: WatchedPorts,
    pub(crate) source: Arc<dyn FlowTable>,
    pub(crate) syn: Arc<dyn FlowTable>,
    pub(crate) udp: Arc<dyn FlowTable>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) protocols: ProtocolTally,
    pub(crate) verdicts: VerdictTally,
    /// 슬롯 확보 실패로 건너뛴 카운트 수
    pub(crate) skipped: AtomicU64,
}

impl Shared {
    pub(crate) fn snapshot(&self) -> RawTrafficSnapshot {
        let (passed, dropped) = self.verdicts.totals();
        let events = self.sink.counts();
        RawTrafficSnapshot {
            passed,
            dropped,
            events_sent: events.sent,
            events_dropped: events.dropped,
            counts_skipped: self.skipped.load(Ordering::Relaxed),
            source_table: table_stats(&*self.source),
            syn_table: table_stats(&*self.syn),
            udp_table: table_stats(&*self.udp),
            blocklist_entries: self.blocklist.len(),
            ..RawTrafficSnapshot::default()
        }
        .with_protocols(&self.protocols)
    }
}

fn table_stats(table: &dyn FlowTable) -> RawTableStats {
    RawTableStats {
        entries: table.len(),
        capacity: table.capacity(),
        evictions: table.evictions(),
    }
}

/// 패킷 처리 엔진
///
/// 복제 비용은 `Arc` 복제 몇 번이며, 복제본은 같은 상태를 공유합니다.
#[derive(Clone)]
pub struct Guard {
    shared: Arc<Shared>,
    evaluator: ThresholdEvaluator,
}

impl Guard {
    /// 빌더를 반환합니다.
    pub fn builder() -> GuardBuilder {
        GuardBuilder::new()
    }

    /// 원시 프레임을 처리하고 판정을 반환합니다.
    ///
    /// `declared_len`과 버퍼 길이 중 작은 쪽까지만 읽습니다.
    #[inline]
    pub fn process(&self, buf: &[u8], declared_len: usize) -> Verdict {
        self.process_classified(&parser::parse(buf, declared_len))
    }

    /// 이미 분류된 패킷을 처리합니다.
    pub fn process_classified(&self, classified: &Classified) -> Verdict {
        match classified {
            Classified::Unclassified => Action::Pass,
            Classified::Ipv4(packet) => self.process_ipv4(packet),
        }
    }

    fn process_ipv4(&self, packet: &Ipv4Packet) -> Verdict {
        let shared = &*self.shared;

        if shared.blocklist.lookup(packet.source) == Action::Drop {
            shared.verdicts.record(Action::Drop);
            return Action::Drop;
        }

        let src = packet.source;
        let bytes = packet.wire_len as u64;
        let protocol = packet.transport.protocol();

        shared.protocols.record(stats_index(protocol), bytes);
        let total = self.count(&*shared.source, src, bytes);

        let primary = match packet.transport {
            Transport::Tcp(seg) if seg.syn_only() => Some((
                ThresholdClass::Syn,
                self.count(&*shared.syn, src, bytes),
                seg.dst_port,
            )),
            Transport::Udp { dst_port, .. } => Some((
                ThresholdClass::Udp,
                self.count(&*shared.udp, src, bytes),
                dst_port,
            )),
            Transport::Icmp { .. } => Some((ThresholdClass::Icmp, total, 0)),
            Transport::Tcp(_) | Transport::Other(_) => None,
        };

        let event = primary
            .and_then(|(class, count, port)| self.signal(packet, class, count, port))
            .or_else(|| {
                let port = packet
                    .transport
                    .dst_port()
                    .filter(|port| shared.ports.contains(*port))?;
                self.signal(packet, ThresholdClass::Anomaly, total, port)
            });

        if let Some(event) = event {
            shared.sink.emit(event);
        }

        shared.verdicts.record(Action::Pass);
        Action::Pass
    }

    #[inline]
    fn count(&self, table: &dyn FlowTable, key: FlowKey, bytes: u64) -> Option<u64> {
        let count = table.increment(key, bytes);
        if count.is_none() {
            self.shared.skipped.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    #[inline]
    fn signal(
        &self,
        packet: &Ipv4Packet,
        class: ThresholdClass,
        count: Option<u64>,
        dest_port: u16,
    ) -> Option<DetectionEvent> {
        let count = count?;
        self.evaluator
            .should_signal(count, class)
            .then(|| DetectionEvent {
                source_ip: packet.source,
                protocol: packet.transport.protocol(),
                rate_estimate: count,
                kind: class.event_kind(),
                confidence: class.confidence(),
                dest_port,
            })
    }

    /// 컨트롤 플레인 핸들을 반환합니다.
    pub fn control(&self) -> Control {
        Control::new(Arc::clone(&self.shared))
    }

    /// 현재 누적 통계 스냅샷
    pub fn snapshot(&self) -> RawTrafficSnapshot {
        self.shared.snapshot()
    }

    /// 엔진의 현재 상태를 확인합니다.
    ///
    /// - 이벤트 소비자가 사라졌으면 `Unhealthy`
    /// - 이벤트 채널 사용률이 90%를 넘으면 `Degraded`
    pub fn health_check(&self) -> HealthStatus {
        let sink = &self.shared.sink;
        if sink.is_closed() {
            return HealthStatus::Unhealthy("event receiver closed".to_owned());
        }

        let capacity = sink.capacity();
        if capacity > 0 {
            #[allow(clippy::cast_precision_loss)]
            let utilization = sink.pending() as f64 / capacity as f64;
            if utilization > CHANNEL_DEGRADED_RATIO {
                return HealthStatus::Degraded(format!(
                    "event channel {:.0}% full",
                    utilization * 100.0
                ));
            }
        }

        HealthStatus::Healthy
    }
}

/// 가드 빌더
///
/// 카운터 테이블을 주입하지 않으면 설정의 용량으로 [`FlowCounterStore`]를
/// 생성합니다. `build()`는 내부 이벤트 채널을 만들고 수신자를 함께 반환합니다.
pub struct GuardBuilder {
    config: GuardConfig,
    source_table: Option<Arc<dyn FlowTable>>,
    syn_table: Option<Arc<dyn FlowTable>>,
    udp_table: Option<Arc<dyn FlowTable>>,
    settings: Option<Arc<ConfigStore>>,
}

impl GuardBuilder {
    fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            source_table: None,
            syn_table: None,
            udp_table: None,
            settings: None,
        }
    }

    /// 가드 설정을 지정합니다 (기본: `GuardConfig::default()`).
    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// 출발지별 전체 카운터 테이블을 지정합니다.
    pub fn source_table(mut self, table: Arc<dyn FlowTable>) -> Self {
        self.source_table = Some(table);
        self
    }

    /// 출발지별 SYN 카운터 테이블을 지정합니다.
    pub fn syn_table(mut self, table: Arc<dyn FlowTable>) -> Self {
        self.syn_table = Some(table);
        self
    }

    /// 출발지별 UDP 카운터 테이블을 지정합니다.
    pub fn udp_table(mut self, table: Arc<dyn FlowTable>) -> Self {
        self.udp_table = Some(table);
        self
    }

    /// 설정 저장소를 공유합니다 (여러 가드가 같은 임계값을 보게 할 때).
    pub fn settings(mut self, settings: Arc<ConfigStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 가드와 이벤트 수신 채널을 생성합니다.
    ///
    /// 채널 용량은 `ring_buffer_size / 20` 레코드입니다.
    ///
    /// # 에러
    /// - `GuardError::Config`: 설정 검증 실패
    /// - `GuardError::Control`: 정적 차단 목록 적재 실패
    pub fn build(self) -> Result<(Guard, EventReceiver), GuardError> {
        self.validate()?;
        let (emitter, receiver) = emitter::channel(self.config.event_capacity());
        let guard = self.assemble(Arc::new(emitter))?;
        Ok((guard, receiver))
    }

    /// 외부 이벤트 싱크로 가드를 생성합니다.
    pub fn build_with_sink(self, sink: Arc<dyn EventSink>) -> Result<Guard, GuardError> {
        self.validate()?;
        self.assemble(sink)
    }

    fn validate(&self) -> Result<(), GuardError> {
        self.config
            .validate()
            .map_err(|e| GuardError::Config(e.to_string()))
    }

    fn assemble(self, sink: Arc<dyn EventSink>) -> Result<Guard, GuardError> {
        let config = self.config;
        let table = |injected: Option<Arc<dyn FlowTable>>, capacity: usize| {
            injected.unwrap_or_else(|| Arc::new(FlowCounterStore::new(capacity)))
        };

        let settings = self.settings.unwrap_or_default();
        let shared = Arc::new(Shared {
            blocklist: BlockList::new(config.blocklist_capacity),
            settings: Arc::clone(&settings),
            ports: WatchedPorts::new(),
            source: table(self.source_table, config.source_capacity),
            syn: table(self.syn_table, config.syn_capacity),
            udp: table(self.udp_table, config.udp_capacity),
            sink,
            protocols: ProtocolTally::new(),
            verdicts: VerdictTally::new(),
            skipped: AtomicU64::new(0),
        });

        Control::new(Arc::clone(&shared)).apply(&config)?;

        info!(
            source_capacity = shared.source.capacity(),
            syn_capacity = shared.syn.capacity(),
            udp_capacity = shared.udp.capacity(),
            blocklist_capacity = shared.blocklist.capacity(),
            event_capacity = shared.sink.capacity(),
            "guard built"
        );

        Ok(Guard {
            shared,
            evaluator: ThresholdEvaluator::new(settings),
        })
    }
}
