#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`parser`]: Ethernet/IPv4/TCP/UDP/ICMP 헤더 분류 (경계 검사, 실패 시 통과)
//! - [`blocklist`]: 출발지 최장 프리픽스 매칭 차단 목록 (락 없는 조회)
//! - [`counter`]: 출발지별 카운터 테이블 (선형 탐사, 가득 찼을 때만 LRU 축출)
//! - [`settings`]: 런타임 조정 임계값/샘플링 간격/모드 저장소
//! - [`threshold`]: 샘플링된 임계값 초과 판정
//! - [`emitter`]: 고정 용량 탐지 이벤트 채널
//! - [`ports`]: 감시 목적지 포트 비트맵
//! - [`stats`]: 프로토콜/판정 집계와 rate 계산, 메트릭 내보내기
//! - [`pipeline`]: Guard, 패킷 단위 처리 순서
//! - [`control`]: 컨트롤 플레인 핸들
//!
//! # 공유 타입
//! 와이어 레코드와 상수는 [`floodgate_common`] 크레이트에 정의되어 있습니다.

pub mod blocklist;
pub mod control;
pub mod counter;
pub mod emitter;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod stats;
pub mod threshold;

// --- 주요 타입 re-export ---

// 엔진
pub use pipeline::{Guard, GuardBuilder, Verdict};

// 컨트롤 플레인
pub use control::{Control, Dimension};

// 에러
pub use error::{ControlError, GuardError};

// 상태 저장소
pub use blocklist::{BlockList, BlockListEntry};
pub use counter::{CounterEntry, FlowCounterStore, FlowKey, FlowTable};
pub use settings::{ConfigStore, ThresholdClass};

// 이벤트
pub use emitter::{
    DetectionEvent, DetectionKind, EmitOutcome, EventEmitter, EventReceiver, EventSink,
    SinkCounts,
};

// 통계
pub use stats::{ProtoMetrics, RawProtoStats, RawTrafficSnapshot, TrafficStats};

// 공유 타입
pub use floodgate_common;
