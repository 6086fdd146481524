//! 이벤트 발행 — 고정 용량 탐지 이벤트 채널
//!
//! [`EventEmitter`]는 `tokio::sync::mpsc` 채널의 송신 측을 감쌉니다.
//! 패킷 경로는 `try_send`만 사용하므로 대기하거나 블로킹하지 않으며,
//! 채널이 가득 찼거나 닫혔으면 이벤트를 버리고 카운트만 올립니다.
//!
//! # 데이터 흐름
//! ```text
//! Guard::process ──emit──▶ mpsc (bounded) ──recv/drain──▶ EventReceiver
//!                  │                                      (control plane)
//!                  └─ full/closed → dropped += 1
//! ```
//!
//! tokio 채널은 내부적으로 블록 단위로 메모리를 확보하므로, 송신 한 번당
//! 힙 할당이 일어나지 않습니다 (블록 할당은 여러 메시지에 분할 상환됨).

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

use floodgate_common::{
    DetectionEventData, EVENT_TYPE_ANOMALY, EVENT_TYPE_ICMP_FLOOD, EVENT_TYPE_SYN_FLOOD,
    EVENT_TYPE_UDP_FLOOD, PROTO_ICMP, PROTO_TCP, PROTO_UDP,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// 탐지 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionKind {
    /// SYN-only 세그먼트 폭주
    SynFlood,
    /// UDP 데이터그램 폭주
    UdpFlood,
    /// ICMP 폭주
    IcmpFlood,
    /// 감시 포트 대상 이상 트래픽
    Anomaly,
}

impl DetectionKind {
    /// 와이어 이벤트 타입 코드
    pub const fn code(self) -> u32 {
        match self {
            Self::SynFlood => EVENT_TYPE_SYN_FLOOD,
            Self::UdpFlood => EVENT_TYPE_UDP_FLOOD,
            Self::IcmpFlood => EVENT_TYPE_ICMP_FLOOD,
            Self::Anomaly => EVENT_TYPE_ANOMALY,
        }
    }

    /// 와이어 코드에서 변환합니다. 알 수 없는 코드는 `None`.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            EVENT_TYPE_SYN_FLOOD => Some(Self::SynFlood),
            EVENT_TYPE_UDP_FLOOD => Some(Self::UdpFlood),
            EVENT_TYPE_ICMP_FLOOD => Some(Self::IcmpFlood),
            EVENT_TYPE_ANOMALY => Some(Self::Anomaly),
            _ => None,
        }
    }

    /// 이 종류의 이벤트가 암시하는 IP 프로토콜 (`Anomaly`는 0)
    pub const fn implied_protocol(self) -> u8 {
        match self {
            Self::SynFlood => PROTO_TCP,
            Self::UdpFlood => PROTO_UDP,
            Self::IcmpFlood => PROTO_ICMP,
            Self::Anomaly => 0,
        }
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SynFlood => "SYN_FLOOD",
            Self::UdpFlood => "UDP_FLOOD",
            Self::IcmpFlood => "ICMP_FLOOD",
            Self::Anomaly => "ANOMALY",
        };
        f.write_str(name)
    }
}

/// 탐지 이벤트
///
/// 힙 데이터가 없는 `Copy` 값입니다. 수신 후에는 소비자가 소유합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionEvent {
    /// 출발지 주소
    pub source_ip: Ipv4Addr,
    /// IP 프로토콜 번호
    pub protocol: u8,
    /// 이벤트 시점의 카운트 값
    pub rate_estimate: u64,
    /// 이벤트 종류
    pub kind: DetectionKind,
    /// 신뢰도 (0..=100)
    pub confidence: u8,
    /// 목적지 포트 (ICMP는 0)
    pub dest_port: u16,
}

impl DetectionEvent {
    /// 20바이트 와이어 레코드로 변환합니다.
    ///
    /// `rate_estimate`는 `u32` 범위로 포화됩니다.
    pub fn to_wire(&self) -> DetectionEventData {
        DetectionEventData {
            src_ip: u32::from_ne_bytes(self.source_ip.octets()),
            pps: u32::try_from(self.rate_estimate).unwrap_or(u32::MAX),
            event_type: self.kind.code(),
            confidence: u32::from(self.confidence),
            dst_port: self.dest_port,
            _pad: 0,
        }
    }

    /// 와이어 레코드에서 이벤트를 복원합니다.
    ///
    /// 알 수 없는 이벤트 타입이나 100을 넘는 신뢰도는 `None`입니다.
    /// 레코드에는 프로토콜이 없으므로 이벤트 종류에서 추정합니다.
    pub fn from_wire(data: &DetectionEventData) -> Option<Self> {
        let kind = DetectionKind::from_code(data.event_type)?;
        let confidence = u8::try_from(data.confidence).ok().filter(|c| *c <= 100)?;
        Some(Self {
            source_ip: Ipv4Addr::from(data.src_ip.to_ne_bytes()),
            protocol: kind.implied_protocol(),
            rate_estimate: u64::from(data.pps),
            kind,
            confidence,
            dest_port: data.dst_port,
        })
    }
}

/// 발행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// 채널에 들어감
    Sent,
    /// 채널 포화 또는 닫힘으로 버려짐
    Dropped,
}

/// 발행 누적 카운트
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkCounts {
    /// 전송된 이벤트 수
    pub sent: u64,
    /// 버려진 이벤트 수
    pub dropped: u64,
}

/// 이벤트 싱크 trait
///
/// 파이프라인은 이 trait 객체로 싱크를 주입받습니다.
/// `emit`은 대기하거나 블로킹해서는 안 됩니다.
pub trait EventSink: Send + Sync {
    /// 이벤트를 발행합니다.
    fn emit(&self, event: DetectionEvent) -> EmitOutcome;

    /// 누적 전송/드롭 수
    fn counts(&self) -> SinkCounts;

    /// 최대 대기 이벤트 수
    fn capacity(&self) -> usize;

    /// 현재 소비되지 않고 대기 중인 이벤트 수
    fn pending(&self) -> usize;

    /// 소비자가 사라졌는지 여부
    fn is_closed(&self) -> bool {
        false
    }
}

/// `mpsc` 기반 기본 이벤트 싱크
pub struct EventEmitter {
    tx: mpsc::Sender<DetectionEvent>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl EventSink for EventEmitter {
    fn emit(&self, event: DetectionEvent) -> EmitOutcome {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                EmitOutcome::Sent
            }
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                EmitOutcome::Dropped
            }
        }
    }

    fn counts(&self) -> SinkCounts {
        SinkCounts {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    fn pending(&self) -> usize {
        self.tx.max_capacity().saturating_sub(self.tx.capacity())
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 이벤트 수신 측 (컨트롤 플레인이 소유)
pub struct EventReceiver {
    rx: mpsc::Receiver<DetectionEvent>,
}

impl EventReceiver {
    /// 다음 이벤트를 기다립니다. 모든 송신자가 사라지면 `None`.
    pub async fn recv(&mut self) -> Option<DetectionEvent> {
        self.rx.recv().await
    }

    /// 대기 없이 이벤트 하나를 꺼냅니다.
    pub fn try_recv(&mut self) -> Option<DetectionEvent> {
        self.rx.try_recv().ok()
    }

    /// 대기 중인 이벤트를 최대 `max`개까지 꺼냅니다.
    pub fn drain(&mut self, max: usize) -> Vec<DetectionEvent> {
        let mut out = Vec::with_capacity(max.min(1024));
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(event) => out.push(event),
                Err(_) => break,
            }
        }
        out
    }

    /// 수신을 닫습니다. 이후 발행은 모두 `Dropped`가 됩니다.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// 고정 용량 이벤트 채널을 생성합니다.
///
/// # Panics
/// `capacity`가 0이면 패닉합니다 (tokio 채널 제약). 빌더는 생성 전에 검증합니다.
pub fn channel(capacity: usize) -> (EventEmitter, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        EventEmitter {
            tx,
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        },
        EventReceiver { rx },
    )
}
