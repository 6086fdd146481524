//! 패킷 경로/컨트롤 플레인 공유 상수 및 와이어 레코드
//!
//! 이 크레이트는 `#![no_std]` 환경에서 사용 가능한 공통 상수와 타입을 정의합니다.
//! 패킷 경로(`floodgate-guard`)와 이벤트를 소비하는 외부 프로세스가
//! 동일한 인덱스와 메모리 레이아웃(`#[repr(C)]`)을 사용하도록 보장합니다.
//!
//! # 설정 슬롯 배치
//! ```text
//! index  의미
//! 0..=3  임계값 (ICMP, SYN, UDP, ANOMALY)
//! 4..=7  샘플링 간격 (ICMP, SYN, UDP, ANOMALY)
//! 8      모드 (0 = NORMAL, 1 = PROTECT)
//! ```

#![cfg_attr(not(test), no_std)]

// =============================================================================
// 헤더 상수
// =============================================================================

/// 이더넷 헤더 길이 (바이트)
pub const ETH_HDR_LEN: usize = 14;
/// IPv4 EtherType
pub const ETH_P_IP: u16 = 0x0800;
/// IPv4 최소 헤더 길이 (IHL = 5)
pub const IPV4_MIN_HDR_LEN: usize = 20;
/// TCP 최소 헤더 길이
pub const TCP_HDR_LEN: usize = 20;
/// UDP 헤더 길이
pub const UDP_HDR_LEN: usize = 8;
/// ICMP 헤더 길이
pub const ICMP_HDR_LEN: usize = 8;

// =============================================================================
// 프로토콜 상수
// =============================================================================

/// ICMP 프로토콜 번호
pub const PROTO_ICMP: u8 = 1;
/// TCP 프로토콜 번호
pub const PROTO_TCP: u8 = 6;
/// UDP 프로토콜 번호
pub const PROTO_UDP: u8 = 17;

// =============================================================================
// TCP 플래그
// =============================================================================

/// FIN 플래그
pub const TCP_FIN: u8 = 0x01;
/// SYN 플래그
pub const TCP_SYN: u8 = 0x02;
/// RST 플래그
pub const TCP_RST: u8 = 0x04;
/// PSH 플래그
pub const TCP_PSH: u8 = 0x08;
/// ACK 플래그
pub const TCP_ACK: u8 = 0x10;

// =============================================================================
// 프로토콜 통계 인덱스
// =============================================================================

/// TCP 통계 인덱스
pub const STATS_IDX_TCP: usize = 0;
/// UDP 통계 인덱스
pub const STATS_IDX_UDP: usize = 1;
/// ICMP 통계 인덱스
pub const STATS_IDX_ICMP: usize = 2;
/// 기타 프로토콜 통계 인덱스
pub const STATS_IDX_OTHER: usize = 3;
/// 프로토콜 통계 슬롯 수
pub const STATS_MAX_ENTRIES: usize = 4;

/// IP 프로토콜 번호를 통계 인덱스로 변환합니다.
pub const fn stats_index(protocol: u8) -> usize {
    match protocol {
        PROTO_TCP => STATS_IDX_TCP,
        PROTO_UDP => STATS_IDX_UDP,
        PROTO_ICMP => STATS_IDX_ICMP,
        _ => STATS_IDX_OTHER,
    }
}

// =============================================================================
// 액션 코드 (차단 목록 + 판정)
// =============================================================================

/// 패킷 통과
pub const ACTION_PASS: u32 = 0;
/// 패킷 차단
pub const ACTION_DROP: u32 = 1;

// =============================================================================
// 설정 슬롯 인덱스
// =============================================================================

/// ICMP 임계값 슬롯
pub const CONFIG_IDX_ICMP_THRESHOLD: usize = 0;
/// SYN 임계값 슬롯
pub const CONFIG_IDX_SYN_THRESHOLD: usize = 1;
/// UDP 임계값 슬롯
pub const CONFIG_IDX_UDP_THRESHOLD: usize = 2;
/// 감시 포트 이상 징후 임계값 슬롯
pub const CONFIG_IDX_ANOMALY_THRESHOLD: usize = 3;
/// ICMP 샘플링 간격 슬롯
pub const CONFIG_IDX_ICMP_INTERVAL: usize = 4;
/// SYN 샘플링 간격 슬롯
pub const CONFIG_IDX_SYN_INTERVAL: usize = 5;
/// UDP 샘플링 간격 슬롯
pub const CONFIG_IDX_UDP_INTERVAL: usize = 6;
/// 감시 포트 이상 징후 샘플링 간격 슬롯
pub const CONFIG_IDX_ANOMALY_INTERVAL: usize = 7;
/// 모드 슬롯
pub const CONFIG_IDX_MODE: usize = 8;
/// 설정 슬롯 수
pub const CONFIG_MAX_ENTRIES: usize = 16;

/// 일반 모드
pub const MODE_NORMAL: u32 = 0;
/// 보호 모드 (컨트롤 플레인이 자동 차단을 수행할 수 있음)
pub const MODE_PROTECT: u32 = 1;

// =============================================================================
// 기본 임계값 / 샘플링 간격 / 신뢰도
// =============================================================================

/// ICMP 기본 임계값
pub const DEFAULT_ICMP_THRESHOLD: u32 = 1000;
/// SYN 기본 임계값
pub const DEFAULT_SYN_THRESHOLD: u32 = 500;
/// UDP 기본 임계값
pub const DEFAULT_UDP_THRESHOLD: u32 = 2000;
/// 감시 포트 이상 징후 기본 임계값
pub const DEFAULT_ANOMALY_THRESHOLD: u32 = 100;

/// ICMP 기본 샘플링 간격
pub const DEFAULT_ICMP_INTERVAL: u32 = 100;
/// SYN 기본 샘플링 간격
pub const DEFAULT_SYN_INTERVAL: u32 = 50;
/// UDP 기본 샘플링 간격
pub const DEFAULT_UDP_INTERVAL: u32 = 200;
/// 감시 포트 이상 징후 기본 샘플링 간격
pub const DEFAULT_ANOMALY_INTERVAL: u32 = 1000;

/// ICMP flood 신뢰도
pub const CONFIDENCE_ICMP_FLOOD: u32 = 80;
/// SYN flood 신뢰도
pub const CONFIDENCE_SYN_FLOOD: u32 = 90;
/// UDP flood 신뢰도
pub const CONFIDENCE_UDP_FLOOD: u32 = 70;
/// 감시 포트 이상 징후 신뢰도
pub const CONFIDENCE_ANOMALY: u32 = 50;

// =============================================================================
// 이벤트 타입
// =============================================================================

/// SYN flood
pub const EVENT_TYPE_SYN_FLOOD: u32 = 1;
/// UDP flood
pub const EVENT_TYPE_UDP_FLOOD: u32 = 2;
/// ICMP flood
pub const EVENT_TYPE_ICMP_FLOOD: u32 = 3;
/// 감시 포트 이상 징후
pub const EVENT_TYPE_ANOMALY: u32 = 4;

// =============================================================================
// 와이어 레코드
// =============================================================================

/// 탐지 이벤트 와이어 레코드
///
/// 이벤트 버퍼를 외부 프로세스로 내보낼 때 사용하는 고정 크기 레코드입니다.
/// `src_ip`만 네트워크 바이트 오더이며 나머지 필드는 호스트 바이트 오더입니다.
///
/// # 메모리 레이아웃 (20 바이트, 4바이트 정렬)
/// ```text
/// offset  field        size
/// 0       src_ip       4
/// 4       pps          4
/// 8       event_type   4
/// 12      confidence   4
/// 16      dst_port     2
/// 18      _pad         2
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionEventData {
    /// 출발지 IPv4 주소 (네트워크 바이트 오더)
    pub src_ip: u32,
    /// 이벤트 시점의 누적 패킷 수 (u32 포화)
    pub pps: u32,
    /// 이벤트 타입 (`EVENT_TYPE_*`)
    pub event_type: u32,
    /// 신뢰도 (0..=100)
    pub confidence: u32,
    /// 목적지 포트 (ICMP는 0)
    pub dst_port: u16,
    /// 4바이트 정렬을 위한 패딩
    pub _pad: u16,
}

const _: () = assert!(core::mem::size_of::<DetectionEventData>() == DetectionEventData::SIZE);

impl DetectionEventData {
    /// 레코드 크기 (바이트)
    pub const SIZE: usize = 20;

    /// 제로 초기화된 레코드를 생성합니다.
    pub const fn zeroed() -> Self {
        Self {
            src_ip: 0,
            pps: 0,
            event_type: 0,
            confidence: 0,
            dst_port: 0,
            _pad: 0,
        }
    }

    /// 레코드를 바이트 배열로 직렬화합니다.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.src_ip.to_ne_bytes());
        out[4..8].copy_from_slice(&self.pps.to_ne_bytes());
        out[8..12].copy_from_slice(&self.event_type.to_ne_bytes());
        out[12..16].copy_from_slice(&self.confidence.to_ne_bytes());
        out[16..18].copy_from_slice(&self.dst_port.to_ne_bytes());
        out
    }

    /// 바이트 슬라이스에서 레코드를 읽습니다.
    ///
    /// 길이가 [`Self::SIZE`]보다 짧으면 `None`을 반환합니다.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let word = |at: usize| -> Option<u32> {
            let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
            Some(u32::from_ne_bytes(bytes))
        };
        if buf.len() < Self::SIZE {
            return None;
        }
        let port: [u8; 2] = buf.get(16..18)?.try_into().ok()?;
        Some(Self {
            src_ip: word(0)?,
            pps: word(4)?,
            event_type: word(8)?,
            confidence: word(12)?,
            dst_port: u16::from_ne_bytes(port),
            _pad: 0,
        })
    }
}
