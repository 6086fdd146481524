//! 플로우 카운터 저장소 — 고정 용량, 락 프리, LRU 축출
//!
//! [`FlowCounterStore`]는 미리 할당된 슬롯 배열 위의 선형 탐사(open addressing)
//! 테이블입니다. 슬롯 배열은 용량의 2배 이상(2의 거듭제곱)이고, 키(출발지 IPv4)는
//! 해시 위치에서 시작하는 최대 `MAX_PROBE`개 슬롯의 체인 안에만 놓입니다.
//!
//! - 첫 관측: 체인의 첫 빈 슬롯을 PENDING으로 점유한 뒤, 같은 키의 다른 점유가
//!   없음을 확인하고 LIVE로 공개합니다 (insert-if-absent). 같은 키가 이미 LIVE이거나
//!   더 앞 인덱스에 PENDING이 있으면 점유를 되돌리고 그 엔트리를 증가시킵니다.
//! - 이후 관측: `fetch_add`, 동시 증가가 유실되지 않습니다.
//! - 축출은 엔트리 수가 용량에 도달했을 때만 일어납니다. 시계 바늘이 가리키는
//!   `SWEEP_WINDOW`개 슬롯 중 `last_seen`이 가장 오래된 엔트리를 회수합니다
//!   (슬롯 배열이 창보다 작으면 정확한 전역 LRU).
//! - 제한된 횟수 안에 슬롯을 얻지 못하면 증가를 건너뛰고 `None`을 반환합니다.
//!
//! 비워진 슬롯은 EMPTY로 돌아가지 않고 TOMBSTONE이 됩니다. 그래서 체인의 첫 EMPTY
//! 뒤에는 어떤 키도 없고, 조회는 첫 EMPTY에서 멈출 수 있습니다.
//!
//! 축출된 키가 다시 나타나면 1부터 다시 셉니다. 축출과 동시에 같은 슬롯을
//! 증가시키던 패킷은 새 키로 집계될 수 있습니다.
//!
//! ```text
//! tag (u64)
//! 0                     EMPTY
//! 1<<63                 RECLAIMING
//! 1<<62 | ipv4          LIVE
//! 1<<61 | ipv4          PENDING
//! 1<<60                 TOMBSTONE
//! ```

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

const EMPTY: u64 = 0;
const RECLAIMING: u64 = 1 << 63;
const LIVE: u64 = 1 << 62;
const PENDING: u64 = 1 << 61;
const TOMBSTONE: u64 = 1 << 60;

/// 키 하나가 놓일 수 있는 체인 길이
const MAX_PROBE: usize = 64;
/// 축출 시 한 번에 비교하는 슬롯 수
const SWEEP_WINDOW: usize = 16;
const INSTALL_ATTEMPTS: usize = 4;
/// 다른 스레드의 PENDING 점유가 풀리기를 기다리는 최대 재탐색 횟수
const SPIN_LIMIT: u32 = 1 << 14;

/// 카운터 테이블 키 (출발지 IPv4 주소)
pub type FlowKey = Ipv4Addr;

/// 카운터 엔트리 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterEntry {
    /// 출발지 주소
    pub key: FlowKey,
    /// 누적 패킷 수
    pub packets: u64,
    /// 누적 바이트 수
    pub bytes: u64,
    /// 마지막 접근 순번 (테이블 내 논리 시계)
    pub last_seen: u64,
}

/// 카운터 테이블 trait
///
/// 파이프라인은 이 trait 객체로 테이블을 주입받습니다.
/// 테스트에서는 용량/축출 동작을 제어하는 대역으로 교체할 수 있습니다.
pub trait FlowTable: Send + Sync {
    /// 키의 카운터를 1 증가시키고 새 패킷 수를 반환합니다.
    ///
    /// 슬롯을 확보하지 못하면 `None` (이번 패킷은 집계하지 않음).
    fn increment(&self, key: FlowKey, bytes: u64) -> Option<u64>;

    /// 키의 현재 값을 조회합니다.
    fn get(&self, key: FlowKey) -> Option<CounterEntry>;

    /// 키를 제거하고 마지막 값을 반환합니다.
    fn remove(&self, key: FlowKey) -> Option<CounterEntry>;

    /// 모든 엔트리를 제거합니다.
    fn clear(&self);

    /// 현재 엔트리 수
    fn len(&self) -> usize;

    /// 엔트리가 없는지 여부
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 최대 엔트리 수
    fn capacity(&self) -> usize;

    /// 누적 축출 수
    fn evictions(&self) -> u64;

    /// 모든 엔트리의 스냅샷
    fn entries(&self) -> Vec<CounterEntry>;

    /// 패킷 수 기준 상위 `n`개 엔트리
    fn top(&self, n: usize) -> Vec<CounterEntry> {
        let mut entries = self.entries();
        entries.sort_unstable_by(|a, b| b.packets.cmp(&a.packets).then(a.key.cmp(&b.key)));
        entries.truncate(n);
        entries
    }
}

#[repr(align(64))]
struct Slot {
    tag: AtomicU64,
    packets: AtomicU64,
    bytes: AtomicU64,
    last_seen: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            tag: AtomicU64::new(EMPTY),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            last_seen: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.last_seen.store(0, Ordering::Relaxed);
    }

    fn snapshot(&self, tag: u64) -> CounterEntry {
        CounterEntry {
            key: Ipv4Addr::from(tag as u32),
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            last_seen: self.last_seen.load(Ordering::Relaxed),
        }
    }
}

/// 체인 탐색 결과
enum Lookup {
    /// LIVE 엔트리 인덱스
    Found(usize),
    /// 같은 키의 설치가 진행 중
    InFlight,
    /// 키가 없음, 점유할 수 있는 첫 슬롯과 그때의 tag
    Absent(Option<(usize, u64)>),
}

/// 고정 용량 락 프리 카운터 테이블
pub struct FlowCounterStore {
    slots: Box<[Slot]>,
    mask: usize,
    shift: u32,
    capacity: usize,
    clock: AtomicU64,
    hand: AtomicUsize,
    live: AtomicUsize,
    evictions: AtomicU64,
}

impl FlowCounterStore {
    /// 최대 `capacity`개의 키를 추적하는 테이블을 생성합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let table_len = (capacity * 2).next_power_of_two();
        Self {
            slots: (0..table_len).map(|_| Slot::new()).collect(),
            mask: table_len - 1,
            shift: u64::BITS - table_len.trailing_zeros(),
            capacity,
            clock: AtomicU64::new(0),
            hand: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 키의 체인: 해시 위치부터 최대 `MAX_PROBE`개 슬롯
    fn chain(&self, key: FlowKey) -> impl Iterator<Item = usize> + '_ {
        let hash = u64::from(u32::from(key)).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> self.shift;
        let home = hash as usize & self.mask;
        (0..MAX_PROBE.min(self.slots.len())).map(move |step| (home + step) & self.mask)
    }

    fn lookup(&self, key: FlowKey) -> Lookup {
        let live_tag = LIVE | u64::from(u32::from(key));
        let pending_tag = PENDING | u64::from(u32::from(key));
        let mut tombstone = None;
        for idx in self.chain(key) {
            let tag = self.slots[idx].tag.load(Ordering::SeqCst);
            if tag == live_tag {
                return Lookup::Found(idx);
            }
            if tag == pending_tag {
                return Lookup::InFlight;
            }
            if tag == TOMBSTONE && tombstone.is_none() {
                tombstone = Some((idx, TOMBSTONE));
            }
            if tag == EMPTY {
                return Lookup::Absent(tombstone.or(Some((idx, EMPTY))));
            }
        }
        Lookup::Absent(tombstone)
    }

    fn find(&self, key: FlowKey) -> Option<usize> {
        match self.lookup(key) {
            Lookup::Found(idx) => Some(idx),
            _ => None,
        }
    }

    fn bump(&self, idx: usize, bytes: u64) -> u64 {
        let slot = &self.slots[idx];
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        slot.last_seen.store(tick, Ordering::Relaxed);
        slot.bytes.fetch_add(bytes, Ordering::Relaxed);
        slot.packets.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 엔트리 하나 분량의 자리를 확보합니다.
    ///
    /// 용량 미만이면 `live`를 늘리고, 용량에 도달했으면 LRU 엔트리를 축출해
    /// 그 몫을 넘겨받습니다 (`live`는 그대로).
    fn reserve(&self) -> bool {
        let mut live = self.live.load(Ordering::Relaxed);
        while live < self.capacity {
            match self.live.compare_exchange_weak(
                live,
                live + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
        self.evict_lru()
    }

    /// 시계 바늘 위치의 창에서 가장 오래된 LIVE 엔트리를 회수합니다.
    fn evict_lru(&self) -> bool {
        let window = SWEEP_WINDOW.min(self.slots.len());
        for _ in 0..self.slots.len().div_ceil(window) {
            let start = self.hand.fetch_add(window, Ordering::Relaxed);
            let mut victim: Option<(usize, u64, u64)> = None;
            for offset in 0..window {
                let idx = start.wrapping_add(offset) & self.mask;
                let tag = self.slots[idx].tag.load(Ordering::Acquire);
                if tag & LIVE == 0 {
                    continue;
                }
                let seen = self.slots[idx].last_seen.load(Ordering::Relaxed);
                if victim.is_none_or(|(_, _, oldest)| seen < oldest) {
                    victim = Some((idx, tag, seen));
                }
            }
            if victim.is_some_and(|(idx, tag, _)| self.reclaim(idx, tag).is_some()) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// `idx`를 PENDING으로 점유하고, 같은 키의 다른 점유가 없으면 자리를 확보해
    /// LIVE로 공개합니다.
    fn install(&self, key: FlowKey, idx: usize, seen: u64) -> Option<usize> {
        let slot = &self.slots[idx];
        let pending_tag = PENDING | u64::from(u32::from(key));
        slot.tag
            .compare_exchange(seen, pending_tag, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;

        if self.claimed_elsewhere(key, idx) || !self.reserve() {
            slot.tag.store(TOMBSTONE, Ordering::SeqCst);
            return None;
        }
        // 공개 직후 축출 후보가 되지 않도록 접근 시각을 먼저 기록
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        slot.last_seen.store(tick, Ordering::Relaxed);
        slot.tag
            .store(LIVE | u64::from(u32::from(key)), Ordering::SeqCst);
        Some(idx)
    }

    /// 같은 키가 다른 슬롯에 이미 LIVE이거나 더 앞 인덱스에서 설치 중인지 확인합니다.
    ///
    /// 더 뒤 인덱스의 PENDING은 결론이 날 때까지 기다립니다. 가장 앞선 점유는
    /// LIVE가 없는 한 물러서지 않으므로 항상 하나가 공개됩니다.
    fn claimed_elsewhere(&self, key: FlowKey, mine: usize) -> bool {
        let live_tag = LIVE | u64::from(u32::from(key));
        let pending_tag = PENDING | u64::from(u32::from(key));
        for _ in 0..SPIN_LIMIT {
            let mut waiting = false;
            for idx in self.chain(key).filter(|&idx| idx != mine) {
                let tag = self.slots[idx].tag.load(Ordering::SeqCst);
                if tag == live_tag || (tag == pending_tag && idx < mine) {
                    return true;
                }
                waiting |= tag == pending_tag;
            }
            if !waiting {
                return false;
            }
            std::hint::spin_loop();
        }
        true
    }

    /// LIVE 엔트리를 TOMBSTONE으로 비우고 마지막 값을 반환합니다.
    fn reclaim(&self, idx: usize, tag: u64) -> Option<CounterEntry> {
        let slot = &self.slots[idx];
        slot.tag
            .compare_exchange(tag, RECLAIMING, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let entry = slot.snapshot(tag);
        slot.reset();
        slot.tag.store(TOMBSTONE, Ordering::SeqCst);
        Some(entry)
    }

    fn release(&self, idx: usize, tag: u64) -> Option<CounterEntry> {
        let entry = self.reclaim(idx, tag)?;
        self.live.fetch_sub(1, Ordering::Relaxed);
        Some(entry)
    }
}

impl FlowTable for FlowCounterStore {
    fn increment(&self, key: FlowKey, bytes: u64) -> Option<u64> {
        let mut attempts = 0;
        let mut spins = 0;
        while attempts < INSTALL_ATTEMPTS {
            match self.lookup(key) {
                Lookup::Found(idx) => return Some(self.bump(idx, bytes)),
                Lookup::InFlight => {
                    spins += 1;
                    if spins > SPIN_LIMIT {
                        return None;
                    }
                    std::hint::spin_loop();
                }
                Lookup::Absent(None) => return None,
                Lookup::Absent(Some((idx, seen))) => {
                    attempts += 1;
                    if let Some(idx) = self.install(key, idx, seen) {
                        return Some(self.bump(idx, bytes));
                    }
                }
            }
        }
        None
    }

    fn get(&self, key: FlowKey) -> Option<CounterEntry> {
        let idx = self.find(key)?;
        Some(self.slots[idx].snapshot(LIVE | u64::from(u32::from(key))))
    }

    fn remove(&self, key: FlowKey) -> Option<CounterEntry> {
        let idx = self.find(key)?;
        self.release(idx, LIVE | u64::from(u32::from(key)))
    }

    fn clear(&self) {
        for idx in 0..self.slots.len() {
            let tag = self.slots[idx].tag.load(Ordering::Acquire);
            if tag & LIVE != 0 {
                self.release(idx, tag);
            }
        }
    }

    fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn entries(&self) -> Vec<CounterEntry> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let tag = slot.tag.load(Ordering::Acquire);
                (tag & LIVE != 0).then(|| slot.snapshot(tag))
            })
            .collect()
    }
}
