//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 패킷 경로는 레코더를 직접 호출하지 않으며, 주기적으로 수집한 스냅샷을
//! `floodgate-guard`의 `TrafficStats::update()`가 이 이름으로 내보냅니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `floodgate_`
//! - 모듈명: `guard_`, `events_`, `table_`, `blocklist_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use floodgate_core::metrics as m;
//!
//! metrics::counter!(m::GUARD_PACKETS_TOTAL).absolute(total);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (tcp, udp, icmp, other, total)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 판정 레이블 키 (pass, drop)
pub const LABEL_VERDICT: &str = "verdict";

/// 카운터 테이블 레이블 키 (source, syn, udp)
pub const LABEL_TABLE: &str = "table";

// ─── Guard 메트릭 ──────────────────────────────────────────────────

/// Guard: 분류된 전체 패킷 수 (counter)
pub const GUARD_PACKETS_TOTAL: &str = "floodgate_guard_packets_total";

/// Guard: 분류된 전체 바이트 수 (counter)
pub const GUARD_BYTES_TOTAL: &str = "floodgate_guard_bytes_total";

/// Guard: 프로토콜별 패킷 수 (counter, label: protocol)
pub const GUARD_PROTOCOL_PACKETS_TOTAL: &str = "floodgate_guard_protocol_packets_total";

/// Guard: 판정별 패킷 수 (counter, label: verdict)
pub const GUARD_VERDICTS_TOTAL: &str = "floodgate_guard_verdicts_total";

/// Guard: 초당 패킷 수 (gauge, label: protocol)
pub const GUARD_PACKETS_PER_SECOND: &str = "floodgate_guard_packets_per_second";

/// Guard: 초당 비트 수 (gauge, label: protocol)
pub const GUARD_BITS_PER_SECOND: &str = "floodgate_guard_bits_per_second";

/// Guard: 슬롯 확보 실패로 건너뛴 카운트 수 (counter)
pub const GUARD_COUNTS_SKIPPED_TOTAL: &str = "floodgate_guard_counts_skipped_total";

// ─── 이벤트 메트릭 ──────────────────────────────────────────────────

/// 이벤트: 전송된 탐지 이벤트 수 (counter)
pub const EVENTS_SENT_TOTAL: &str = "floodgate_events_sent_total";

/// 이벤트: 버퍼 포화로 버려진 탐지 이벤트 수 (counter)
pub const EVENTS_DROPPED_TOTAL: &str = "floodgate_events_dropped_total";

// ─── 테이블 메트릭 ──────────────────────────────────────────────────

/// 테이블: 카운터 테이블 엔트리 수 (gauge, label: table)
pub const TABLE_ENTRIES: &str = "floodgate_table_entries";

/// 테이블: LRU 축출 수 (counter, label: table)
pub const TABLE_EVICTIONS_TOTAL: &str = "floodgate_table_evictions_total";

/// 차단 목록: 엔트리 수 (gauge)
pub const BLOCKLIST_ENTRIES: &str = "floodgate_blocklist_entries";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        GUARD_PACKETS_TOTAL,
        "Total number of IPv4 packets classified by the guard"
    );
    describe_counter!(GUARD_BYTES_TOTAL, "Total bytes of classified IPv4 packets");
    describe_counter!(
        GUARD_PROTOCOL_PACKETS_TOTAL,
        "Packets counted per protocol (tcp, udp, icmp, other)"
    );
    describe_counter!(
        GUARD_VERDICTS_TOTAL,
        "Packets per verdict (pass, drop) for classified traffic"
    );
    describe_gauge!(
        GUARD_PACKETS_PER_SECOND,
        "Current packet rate per protocol (packets/sec)"
    );
    describe_gauge!(
        GUARD_BITS_PER_SECOND,
        "Current throughput per protocol (bits/sec)"
    );
    describe_counter!(
        GUARD_COUNTS_SKIPPED_TOTAL,
        "Per-source increments skipped because no counter slot could be claimed"
    );

    describe_counter!(
        EVENTS_SENT_TOTAL,
        "Detection events accepted by the event buffer"
    );
    describe_counter!(
        EVENTS_DROPPED_TOTAL,
        "Detection events dropped because the event buffer was full or closed"
    );

    describe_gauge!(TABLE_ENTRIES, "Live entries per flow counter table");
    describe_counter!(
        TABLE_EVICTIONS_TOTAL,
        "Entries evicted (LRU) per flow counter table"
    );
    describe_gauge!(BLOCKLIST_ENTRIES, "Live entries in the block list");
}
