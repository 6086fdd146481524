//! 통계 수집 — 샤드 분산 프로토콜/판정 집계와 비율 계산
//!
//! 패킷 경로는 [`ProtocolTally`]와 [`VerdictTally`]에 원자적 덧셈만 수행합니다.
//! 각 집계는 캐시 라인 정렬된 샤드 배열이며, 스레드마다 고정된 샤드에 쓰기
//! 때문에 코어 간 캐시 라인 경합이 줄어듭니다. 읽기 측은 모든 샤드를 합산합니다.
//!
//! # 데이터 흐름
//! ```text
//! Guard::process ──fetch_add──▶ tally shards
//!                                   │
//! Control::snapshot ──sum──▶ RawTrafficSnapshot ──update──▶ TrafficStats ──▶ metrics
//!                                                           (rate 계산)
//! ```

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use floodgate_common::{
    STATS_IDX_ICMP, STATS_IDX_OTHER, STATS_IDX_TCP, STATS_IDX_UDP, STATS_MAX_ENTRIES,
};
use floodgate_core::metrics as m;
use floodgate_core::types::Action;
use serde::Serialize;

const SHARDS: usize = 16;

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD: Cell<usize> = const { Cell::new(usize::MAX) };
}

/// 현재 스레드의 샤드 인덱스
#[inline]
fn shard_index() -> usize {
    SHARD.with(|cell| {
        let idx = cell.get();
        if idx != usize::MAX {
            return idx;
        }
        let assigned = NEXT_SHARD.fetch_add(1, Ordering::Relaxed) % SHARDS;
        cell.set(assigned);
        assigned
    })
}

#[repr(align(64))]
struct ProtoShard {
    packets: [AtomicU64; STATS_MAX_ENTRIES],
    bytes: [AtomicU64; STATS_MAX_ENTRIES],
}

impl ProtoShard {
    fn new() -> Self {
        Self {
            packets: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// 전역 프로토콜별 집계 (TCP/UDP/ICMP/OTHER 고정 슬롯, 축출 없음)
pub struct ProtocolTally {
    shards: Box<[ProtoShard]>,
}

impl ProtocolTally {
    /// 제로 초기화된 집계를 생성합니다.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| ProtoShard::new()).collect(),
        }
    }

    /// 패킷 하나를 기록합니다. `index`는 `STATS_IDX_*`이며 범위 밖이면 OTHER입니다.
    #[inline]
    pub fn record(&self, index: usize, bytes: u64) {
        let index = if index < STATS_MAX_ENTRIES {
            index
        } else {
            STATS_IDX_OTHER
        };
        let shard = &self.shards[shard_index()];
        shard.packets[index].fetch_add(1, Ordering::Relaxed);
        shard.bytes[index].fetch_add(bytes, Ordering::Relaxed);
    }

    /// 한 슬롯의 합산 값
    pub fn get(&self, index: usize) -> RawProtoStats {
        if index >= STATS_MAX_ENTRIES {
            return RawProtoStats::default();
        }
        self.shards
            .iter()
            .fold(RawProtoStats::default(), |acc, shard| RawProtoStats {
                packets: acc.packets + shard.packets[index].load(Ordering::Relaxed),
                bytes: acc.bytes + shard.bytes[index].load(Ordering::Relaxed),
            })
    }

    /// 모든 값을 0으로 되돌립니다.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            for slot in shard.packets.iter().chain(shard.bytes.iter()) {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl Default for ProtocolTally {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(align(64))]
struct VerdictShard {
    pass: AtomicU64,
    drop: AtomicU64,
}

/// 판정별 집계 (PASS/DROP)
pub struct VerdictTally {
    shards: Box<[VerdictShard]>,
}

impl VerdictTally {
    /// 제로 초기화된 집계를 생성합니다.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS)
                .map(|_| VerdictShard {
                    pass: AtomicU64::new(0),
                    drop: AtomicU64::new(0),
                })
                .collect(),
        }
    }

    /// 판정 하나를 기록합니다.
    #[inline]
    pub fn record(&self, action: Action) {
        let shard = &self.shards[shard_index()];
        match action {
            Action::Pass => shard.pass.fetch_add(1, Ordering::Relaxed),
            Action::Drop => shard.drop.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// (pass, drop) 합산 값
    pub fn totals(&self) -> (u64, u64) {
        self.shards.iter().fold((0, 0), |(pass, drop), shard| {
            (
                pass + shard.pass.load(Ordering::Relaxed),
                drop + shard.drop.load(Ordering::Relaxed),
            )
        })
    }

    /// 모든 값을 0으로 되돌립니다.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.pass.store(0, Ordering::Relaxed);
            shard.drop.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for VerdictTally {
    fn default() -> Self {
        Self::new()
    }
}

/// 샤드 합산된 원시 통계 (단일 프로토콜)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RawProtoStats {
    /// 처리된 패킷 수 (누적)
    pub packets: u64,
    /// 전송 바이트 수 (누적)
    pub bytes: u64,
}

impl RawProtoStats {
    fn sum(parts: &[Self]) -> Self {
        parts.iter().fold(Self::default(), |acc, p| Self {
            packets: acc.packets + p.packets,
            bytes: acc.bytes + p.bytes,
        })
    }
}

/// 카운터 테이블 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RawTableStats {
    /// 현재 엔트리 수
    pub entries: usize,
    /// 최대 엔트리 수
    pub capacity: usize,
    /// 누적 축출 수
    pub evictions: u64,
}

/// 전체 트래픽 원시 통계 스냅샷
///
/// 한 번의 수집에서 읽은 모든 누적 값입니다. 각 값은 개별적으로 원자적이며
/// 값들 사이의 일관성은 보장하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawTrafficSnapshot {
    /// TCP 통계
    pub tcp: RawProtoStats,
    /// UDP 통계
    pub udp: RawProtoStats,
    /// ICMP 통계
    pub icmp: RawProtoStats,
    /// 기타 프로토콜 통계
    pub other: RawProtoStats,
    /// 전체 합계
    pub total: RawProtoStats,
    /// PASS 판정 수
    pub passed: u64,
    /// DROP 판정 수
    pub dropped: u64,
    /// 전송된 이벤트 수
    pub events_sent: u64,
    /// 버려진 이벤트 수
    pub events_dropped: u64,
    /// 슬롯 확보 실패로 건너뛴 카운트 수
    pub counts_skipped: u64,
    /// 출발지별 전체 카운터 테이블
    pub source_table: RawTableStats,
    /// 출발지별 SYN 카운터 테이블
    pub syn_table: RawTableStats,
    /// 출발지별 UDP 카운터 테이블
    pub udp_table: RawTableStats,
    /// 차단 목록 엔트리 수
    pub blocklist_entries: usize,
}

impl RawTrafficSnapshot {
    /// 프로토콜 집계에서 프로토콜 필드와 합계를 채웁니다.
    pub fn with_protocols(mut self, tally: &ProtocolTally) -> Self {
        self.tcp = tally.get(STATS_IDX_TCP);
        self.udp = tally.get(STATS_IDX_UDP);
        self.icmp = tally.get(STATS_IDX_ICMP);
        self.other = tally.get(STATS_IDX_OTHER);
        self.total = RawProtoStats::sum(&[self.tcp, self.udp, self.icmp, self.other]);
        self
    }
}

/// 프로토콜별 트래픽 메트릭 (누적 + 비율)
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtoMetrics {
    /// 처리된 패킷 수 (누적)
    pub packets: u64,
    /// 전송 바이트 수 (누적)
    pub bytes: u64,
    /// 초당 패킷 수 (packets per second)
    pub pps: f64,
    /// 초당 비트 수 (bits per second)
    pub bps: f64,
}

/// 전체 트래픽 통계
///
/// `update()`를 호출할 때마다 이전 스냅샷과의 차이(delta)를 시간으로 나누어
/// pps, bps를 계산하고 `metrics` 레코더에 내보냅니다.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficStats {
    /// TCP 통계
    pub tcp: ProtoMetrics,
    /// UDP 통계
    pub udp: ProtoMetrics,
    /// ICMP 통계
    pub icmp: ProtoMetrics,
    /// 기타 프로토콜 통계
    pub other: ProtoMetrics,
    /// 전체 합계
    pub total: ProtoMetrics,
    /// 마지막 원시 스냅샷
    pub latest: RawTrafficSnapshot,
    /// 마지막 업데이트 시각 (rate 계산용, 직렬화 제외)
    #[serde(skip)]
    last_poll: Option<Instant>,
    /// 이전 폴링의 원시 값 (delta 계산용, 직렬화 제외)
    #[serde(skip)]
    prev_raw: Option<RawTrafficSnapshot>,
}

impl TrafficStats {
    /// 제로 초기화된 통계를 생성합니다.
    pub fn new() -> Self {
        Self {
            tcp: ProtoMetrics::default(),
            udp: ProtoMetrics::default(),
            icmp: ProtoMetrics::default(),
            other: ProtoMetrics::default(),
            total: ProtoMetrics::default(),
            latest: RawTrafficSnapshot::default(),
            last_poll: None,
            prev_raw: None,
        }
    }

    /// 원시 스냅샷으로 통계를 갱신합니다.
    ///
    /// 첫 번째 호출에서는 rate가 0입니다.
    pub fn update(&mut self, raw: RawTrafficSnapshot) {
        self.update_at(raw, Instant::now());
    }

    /// 지정 시각 기준으로 통계를 갱신합니다.
    pub fn update_at(&mut self, raw: RawTrafficSnapshot, now: Instant) {
        match (&self.prev_raw, self.last_poll) {
            (Some(prev), Some(last_time)) => {
                let elapsed = now.saturating_duration_since(last_time).as_secs_f64();
                if elapsed > 0.0 {
                    Self::compute_rate(&mut self.tcp, &raw.tcp, &prev.tcp, elapsed);
                    Self::compute_rate(&mut self.udp, &raw.udp, &prev.udp, elapsed);
                    Self::compute_rate(&mut self.icmp, &raw.icmp, &prev.icmp, elapsed);
                    Self::compute_rate(&mut self.other, &raw.other, &prev.other, elapsed);
                    Self::compute_rate(&mut self.total, &raw.total, &prev.total, elapsed);
                }
            }
            _ => {
                Self::set_cumulative(&mut self.tcp, &raw.tcp);
                Self::set_cumulative(&mut self.udp, &raw.udp);
                Self::set_cumulative(&mut self.icmp, &raw.icmp);
                Self::set_cumulative(&mut self.other, &raw.other);
                Self::set_cumulative(&mut self.total, &raw.total);
            }
        }

        self.latest = raw.clone();
        self.prev_raw = Some(raw);
        self.last_poll = Some(now);
        self.publish();
    }

    /// 통계를 초기화합니다.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn publish(&self) {
        let raw = &self.latest;

        metrics::counter!(m::GUARD_PACKETS_TOTAL).absolute(self.total.packets);
        metrics::counter!(m::GUARD_BYTES_TOTAL).absolute(self.total.bytes);
        metrics::counter!(m::GUARD_COUNTS_SKIPPED_TOTAL).absolute(raw.counts_skipped);
        metrics::counter!(m::EVENTS_SENT_TOTAL).absolute(raw.events_sent);
        metrics::counter!(m::EVENTS_DROPPED_TOTAL).absolute(raw.events_dropped);

        for (verdict, value) in [("pass", raw.passed), ("drop", raw.dropped)] {
            metrics::counter!(m::GUARD_VERDICTS_TOTAL, m::LABEL_VERDICT => verdict)
                .absolute(value);
        }

        for (proto, stats) in [
            ("tcp", &self.tcp),
            ("udp", &self.udp),
            ("icmp", &self.icmp),
            ("other", &self.other),
        ] {
            metrics::counter!(m::GUARD_PROTOCOL_PACKETS_TOTAL, m::LABEL_PROTOCOL => proto)
                .absolute(stats.packets);
        }

        for (proto, stats) in [
            ("tcp", &self.tcp),
            ("udp", &self.udp),
            ("icmp", &self.icmp),
            ("other", &self.other),
            ("total", &self.total),
        ] {
            metrics::gauge!(m::GUARD_PACKETS_PER_SECOND, m::LABEL_PROTOCOL => proto).set(stats.pps);
            metrics::gauge!(m::GUARD_BITS_PER_SECOND, m::LABEL_PROTOCOL => proto).set(stats.bps);
        }

        for (table, stats) in [
            ("source", &raw.source_table),
            ("syn", &raw.syn_table),
            ("udp", &raw.udp_table),
        ] {
            #[allow(clippy::cast_precision_loss)]
            let entries = stats.entries as f64;
            metrics::gauge!(m::TABLE_ENTRIES, m::LABEL_TABLE => table).set(entries);
            metrics::counter!(m::TABLE_EVICTIONS_TOTAL, m::LABEL_TABLE => table)
                .absolute(stats.evictions);
        }

        #[allow(clippy::cast_precision_loss)]
        let blocklist_entries = raw.blocklist_entries as f64;
        metrics::gauge!(m::BLOCKLIST_ENTRIES).set(blocklist_entries);
    }

    fn compute_rate(
        metrics: &mut ProtoMetrics,
        current: &RawProtoStats,
        prev: &RawProtoStats,
        elapsed_secs: f64,
    ) {
        metrics.packets = current.packets;
        metrics.bytes = current.bytes;

        // 리셋 이후에는 delta가 음수가 되므로 0으로 포화
        let delta_packets = current.packets.saturating_sub(prev.packets);
        let delta_bytes = current.bytes.saturating_sub(prev.bytes);

        #[allow(clippy::cast_precision_loss)]
        {
            metrics.pps = delta_packets as f64 / elapsed_secs;
            metrics.bps = (delta_bytes as f64 * 8.0) / elapsed_secs;
        }
    }

    fn set_cumulative(metrics: &mut ProtoMetrics, raw: &RawProtoStats) {
        metrics.packets = raw.packets;
        metrics.bytes = raw.bytes;
        metrics.pps = 0.0;
        metrics.bps = 0.0;
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new()
    }
}
