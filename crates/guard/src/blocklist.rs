//! 차단 목록 — 출발지 주소의 최장 프리픽스 매칭
//!
//! [`BlockList`]는 고정 크기 오픈 어드레싱 슬롯 테이블입니다. 각 슬롯의 키 워드는
//! 하나의 `AtomicU64`에 (상태, 액션, 프리픽스 길이, 네트워크)를 모두 담으므로
//! 패킷 경로는 원자적 로드 한 번으로 엔트리 전체를 읽습니다.
//!
//! # 조회
//! `active_prefixes` 비트마스크에 켜진 프리픽스 길이만 긴 것부터 짧은 것 순으로
//! 확인합니다. 길이마다 `max_probe + 1`개 이하의 슬롯을 보므로 조회 비용은
//! 엔트리 수와 무관하게 상한이 있으며, 락과 할당이 없습니다.
//!
//! # 쓰기
//! 삽입/삭제/만료 정리는 컨트롤 플레인 전용 뮤텍스로 직렬화됩니다.
//! 패킷 경로는 이 뮤텍스를 잡지 않습니다.
//!
//! # 만료
//! 조회는 `expires_at`을 보지 않습니다. 만료된 엔트리는
//! [`BlockList::purge_expired`]가 제거할 때까지 계속 매칭됩니다.
//!
//! ```text
//! key word (u64)
//! 63     62         41..40   37..32      31..0
//! LIVE | TOMBSTONE | action | prefix_len | network
//! ```

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use floodgate_core::types::{Action, Ipv4Cidr, prefix_mask};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::ControlError;

const EMPTY: u64 = 0;
const LIVE: u64 = 1 << 63;
const TOMBSTONE: u64 = 1 << 62;
const ACTION_SHIFT: u32 = 40;
const PREFIX_SHIFT: u32 = 32;
/// prefix_len(6비트) + network(32비트)
const KEY_MASK: u64 = (1 << 38) - 1;

/// 현재 Unix 시각 (초)
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// 차단 목록 엔트리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockListEntry {
    /// 네트워크 주소 (호스트 비트는 삽입 시 0으로 정규화)
    pub network: Ipv4Addr,
    /// 프리픽스 길이 (0..=32)
    pub prefix_len: u8,
    /// 매칭 시 적용할 액션
    pub action: Action,
    /// 삽입 시각 (Unix 초)
    pub inserted_at: u64,
    /// 만료 시각 (Unix 초, 없으면 영구)
    pub expires_at: Option<u64>,
}

impl BlockListEntry {
    /// 현재 시각으로 삽입되는 영구 엔트리를 생성합니다.
    pub fn new(cidr: Ipv4Cidr, action: Action) -> Self {
        Self {
            network: cidr.network(),
            prefix_len: cidr.prefix_len(),
            action,
            inserted_at: unix_now(),
            expires_at: None,
        }
    }

    /// 단일 호스트 DROP 엔트리
    pub fn drop_host(addr: Ipv4Addr) -> Self {
        Self::new(Ipv4Cidr::host(addr), Action::Drop)
    }

    /// 만료 시각을 지정합니다.
    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// `now` 시점에 만료되었는지 여부
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Slot {
    word: AtomicU64,
    inserted_at: AtomicU64,
    /// 0 = 만료 없음
    expires_at: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            word: AtomicU64::new(EMPTY),
            inserted_at: AtomicU64::new(0),
            expires_at: AtomicU64::new(0),
        }
    }

    fn entry(&self, word: u64) -> BlockListEntry {
        let expires_at = self.expires_at.load(Ordering::Relaxed);
        BlockListEntry {
            network: Ipv4Addr::from(word as u32),
            prefix_len: ((word >> PREFIX_SHIFT) & 0x3F) as u8,
            action: Action::from_code(((word >> ACTION_SHIFT) & 0x3) as u32),
            inserted_at: self.inserted_at.load(Ordering::Relaxed),
            expires_at: (expires_at != 0).then_some(expires_at),
        }
    }
}

struct WriterState {
    prefix_counts: [u32; 33],
}

/// 공유 차단 목록
pub struct BlockList {
    slots: Box<[Slot]>,
    mask: usize,
    capacity: usize,
    len: AtomicUsize,
    /// 비트 i: 프리픽스 길이 i인 엔트리가 하나 이상 존재
    active_prefixes: AtomicU64,
    /// 지금까지 삽입된 엔트리의 최대 탐사 거리
    max_probe: AtomicUsize,
    writer: Mutex<WriterState>,
}

impl BlockList {
    /// 최대 `capacity`개의 엔트리를 담는 차단 목록을 생성합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let table_len = capacity.saturating_mul(2).next_power_of_two();
        let slots: Box<[Slot]> = (0..table_len).map(|_| Slot::new()).collect();
        Self {
            slots,
            mask: table_len - 1,
            capacity,
            len: AtomicUsize::new(0),
            active_prefixes: AtomicU64::new(0),
            max_probe: AtomicUsize::new(0),
            writer: Mutex::new(WriterState {
                prefix_counts: [0; 33],
            }),
        }
    }

    /// 출발지 주소를 조회합니다 (패킷 경로).
    ///
    /// 가장 긴 매칭 프리픽스의 액션을 반환하며, 매칭이 없으면 `Pass`입니다.
    pub fn lookup(&self, addr: Ipv4Addr) -> Action {
        self.matching_action(addr).unwrap_or(Action::Pass)
    }

    /// 가장 긴 매칭 프리픽스의 액션, 매칭되는 엔트리가 없으면 `None`
    ///
    /// 명시적 `Pass` 엔트리와 "매칭 없음"을 구분해야 하는 제어면에서 씁니다.
    pub fn matching_action(&self, addr: Ipv4Addr) -> Option<Action> {
        let ip = u32::from(addr);
        let probes = self.max_probe.load(Ordering::Acquire);
        let mut active = self.active_prefixes.load(Ordering::Acquire);
        while active != 0 {
            let prefix_len = (63 - active.leading_zeros()) as u8;
            active &= !(1u64 << prefix_len);
            if let Some(word) = self.find_live(ip & prefix_mask(prefix_len), prefix_len, probes) {
                return Some(Action::from_code(((word >> ACTION_SHIFT) & 0x3) as u32));
            }
        }
        None
    }

    fn home(&self, network: u32, prefix_len: u8) -> usize {
        let key = (u64::from(network) << 6) | u64::from(prefix_len);
        (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize & self.mask
    }

    fn find_live(&self, network: u32, prefix_len: u8, probes: usize) -> Option<u64> {
        let key = key_bits(network, prefix_len);
        let mut idx = self.home(network, prefix_len);
        for _ in 0..=probes {
            let word = self.slots[idx].word.load(Ordering::Acquire);
            if word == EMPTY {
                return None;
            }
            if word & LIVE != 0 && word & KEY_MASK == key {
                return Some(word);
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// 슬롯 인덱스를 찾습니다 (writer 락 보유 상태에서만 호출).
    fn find_slot(&self, network: u32, prefix_len: u8) -> Option<usize> {
        let key = key_bits(network, prefix_len);
        let mut idx = self.home(network, prefix_len);
        for _ in 0..self.slots.len() {
            let word = self.slots[idx].word.load(Ordering::Relaxed);
            if word == EMPTY {
                return None;
            }
            if word & LIVE != 0 && word & KEY_MASK == key {
                return Some(idx);
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// 엔트리를 삽입합니다.
    ///
    /// 같은 네트워크/프리픽스가 이미 있으면 액션과 시각을 교체합니다.
    pub fn insert(&self, entry: BlockListEntry) -> Result<(), ControlError> {
        if entry.prefix_len > 32 {
            return Err(ControlError::InvalidArgument(format!(
                "prefix length {} exceeds 32",
                entry.prefix_len
            )));
        }
        let prefix_len = entry.prefix_len;
        let network = u32::from(entry.network) & prefix_mask(prefix_len);
        let word = encode(network, prefix_len, entry.action);
        let expires_at = entry.expires_at.unwrap_or(0);

        let mut state = self.writer.lock();

        if let Some(idx) = self.find_slot(network, prefix_len) {
            let slot = &self.slots[idx];
            slot.inserted_at.store(entry.inserted_at, Ordering::Relaxed);
            slot.expires_at.store(expires_at, Ordering::Relaxed);
            slot.word.store(word, Ordering::Release);
            debug!(network = %Ipv4Addr::from(network), prefix_len, action = %entry.action, "blocklist entry replaced");
            return Ok(());
        }

        if self.len.load(Ordering::Relaxed) >= self.capacity {
            return Err(ControlError::CapacityExhausted(format!(
                "blocklist holds {} entries",
                self.capacity
            )));
        }

        // 첫 번째 EMPTY 또는 TOMBSTONE 슬롯
        let mut idx = self.home(network, prefix_len);
        let mut claimed = None;
        for step in 0..self.slots.len() {
            let current = self.slots[idx].word.load(Ordering::Relaxed);
            if current & LIVE == 0 {
                claimed = Some((idx, step));
                break;
            }
            idx = (idx + 1) & self.mask;
        }
        let Some((idx, step)) = claimed else {
            return Err(ControlError::CapacityExhausted(
                "no free blocklist slot".to_owned(),
            ));
        };

        let slot = &self.slots[idx];
        slot.inserted_at.store(entry.inserted_at, Ordering::Relaxed);
        slot.expires_at.store(expires_at, Ordering::Relaxed);
        self.max_probe.fetch_max(step, Ordering::Release);
        slot.word.store(word, Ordering::Release);

        self.len.fetch_add(1, Ordering::Relaxed);
        let count = &mut state.prefix_counts[usize::from(prefix_len)];
        *count += 1;
        if *count == 1 {
            self.active_prefixes
                .fetch_or(1u64 << prefix_len, Ordering::Release);
        }
        debug!(network = %Ipv4Addr::from(network), prefix_len, action = %entry.action, "blocklist entry inserted");
        Ok(())
    }

    /// 엔트리를 삭제하고 삭제된 값을 반환합니다.
    pub fn remove(&self, network: Ipv4Addr, prefix_len: u8) -> Result<BlockListEntry, ControlError> {
        if prefix_len > 32 {
            return Err(ControlError::InvalidArgument(format!(
                "prefix length {prefix_len} exceeds 32"
            )));
        }
        let network = u32::from(network) & prefix_mask(prefix_len);
        let mut state = self.writer.lock();
        let idx = self.find_slot(network, prefix_len).ok_or_else(|| {
            ControlError::NotFound(format!("{}/{}", Ipv4Addr::from(network), prefix_len))
        })?;
        Ok(self.remove_at(&mut state, idx))
    }

    fn remove_at(&self, state: &mut WriterState, idx: usize) -> BlockListEntry {
        let slot = &self.slots[idx];
        let entry = slot.entry(slot.word.load(Ordering::Relaxed));
        slot.word.store(TOMBSTONE, Ordering::Release);
        slot.inserted_at.store(0, Ordering::Relaxed);
        slot.expires_at.store(0, Ordering::Relaxed);

        self.len.fetch_sub(1, Ordering::Relaxed);
        let count = &mut state.prefix_counts[usize::from(entry.prefix_len)];
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.active_prefixes
                .fetch_and(!(1u64 << entry.prefix_len), Ordering::Release);
        }
        entry
    }

    /// 정확히 일치하는 엔트리를 조회합니다.
    pub fn get(&self, network: Ipv4Addr, prefix_len: u8) -> Option<BlockListEntry> {
        if prefix_len > 32 {
            return None;
        }
        let network = u32::from(network) & prefix_mask(prefix_len);
        let _state = self.writer.lock();
        let idx = self.find_slot(network, prefix_len)?;
        let slot = &self.slots[idx];
        Some(slot.entry(slot.word.load(Ordering::Relaxed)))
    }

    /// 모든 엔트리의 스냅샷을 반환합니다.
    pub fn entries(&self) -> Vec<BlockListEntry> {
        let _state = self.writer.lock();
        self.slots
            .iter()
            .filter_map(|slot| {
                let word = slot.word.load(Ordering::Relaxed);
                (word & LIVE != 0).then(|| slot.entry(word))
            })
            .collect()
    }

    /// `now` 시점에 만료된 엔트리를 제거하고 제거한 개수를 반환합니다.
    pub fn purge_expired(&self, now: u64) -> usize {
        let mut state = self.writer.lock();
        let mut purged = 0;
        for idx in 0..self.slots.len() {
            let slot = &self.slots[idx];
            if slot.word.load(Ordering::Relaxed) & LIVE == 0 {
                continue;
            }
            let expires_at = slot.expires_at.load(Ordering::Relaxed);
            if expires_at != 0 && expires_at <= now {
                self.remove_at(&mut state, idx);
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "expired blocklist entries removed");
        }
        purged
    }

    /// 모든 엔트리를 제거합니다.
    pub fn clear(&self) {
        let mut state = self.writer.lock();
        self.active_prefixes.store(0, Ordering::Release);
        for slot in self.slots.iter() {
            slot.word.store(EMPTY, Ordering::Release);
            slot.inserted_at.store(0, Ordering::Relaxed);
            slot.expires_at.store(0, Ordering::Relaxed);
        }
        self.max_probe.store(0, Ordering::Release);
        self.len.store(0, Ordering::Relaxed);
        state.prefix_counts = [0; 33];
    }

    /// 현재 엔트리 수
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// 엔트리가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 최대 엔트리 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

const fn key_bits(network: u32, prefix_len: u8) -> u64 {
    ((prefix_len as u64) << PREFIX_SHIFT) | network as u64
}

fn encode(network: u32, prefix_len: u8, action: Action) -> u64 {
    LIVE | (u64::from(action.code()) << ACTION_SHIFT) | key_bits(network, prefix_len)
}
