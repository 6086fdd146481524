//! 감시 포트 집합 — 목적지 포트 비트맵
//!
//! 65536비트를 `AtomicU64` 1024개로 표현합니다. 패킷 경로의 `contains`는
//! 원자적 로드 한 번이며, 추가/제거는 컨트롤 플레인에서 `fetch_or`/`fetch_and`로
//! 수행합니다.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const WORDS: usize = (u16::MAX as usize + 1) / 64;

/// 감시 대상 목적지 포트 집합
pub struct WatchedPorts {
    bits: Box<[AtomicU64]>,
    len: AtomicUsize,
}

impl WatchedPorts {
    /// 빈 집합을 생성합니다.
    pub fn new() -> Self {
        Self {
            bits: (0..WORDS).map(|_| AtomicU64::new(0)).collect(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn locate(port: u16) -> (usize, u64) {
        (usize::from(port) / 64, 1u64 << (port % 64))
    }

    /// 포트가 감시 대상인지 확인합니다.
    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        let (word, mask) = Self::locate(port);
        self.bits[word].load(Ordering::Relaxed) & mask != 0
    }

    /// 포트를 추가합니다. 새로 추가되었으면 `true`.
    pub fn insert(&self, port: u16) -> bool {
        let (word, mask) = Self::locate(port);
        let added = self.bits[word].fetch_or(mask, Ordering::Relaxed) & mask == 0;
        if added {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        added
    }

    /// 포트를 제거합니다. 있었으면 `true`.
    pub fn remove(&self, port: u16) -> bool {
        let (word, mask) = Self::locate(port);
        let removed = self.bits[word].fetch_and(!mask, Ordering::Relaxed) & mask != 0;
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// 감시 중인 포트 목록 (오름차순)
    pub fn ports(&self) -> Vec<u16> {
        let mut out = Vec::new();
        for (idx, word) in self.bits.iter().enumerate() {
            let mut value = word.load(Ordering::Relaxed);
            while value != 0 {
                let bit = value.trailing_zeros() as usize;
                // idx < 1024, bit < 64
                out.push((idx * 64 + bit) as u16);
                value &= value - 1;
            }
        }
        out
    }

    /// 모든 포트를 제거합니다.
    pub fn clear(&self) {
        for word in self.bits.iter() {
            let old = word.swap(0, Ordering::Relaxed);
            self.len
                .fetch_sub(old.count_ones() as usize, Ordering::Relaxed);
        }
    }

    /// 감시 중인 포트 수
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WatchedPorts {
    fn default() -> Self {
        Self::new()
    }
}
