//! 이벤트 소비와 보호 모드 통합 테스트
//!
//! 컨트롤 플레인이 tokio 태스크에서 이벤트를 비동기로 소비하고,
//! 보호 모드에서 출발지를 차단하는 흐름을 확인합니다.

mod common;

use std::time::Duration;

use common::{FrameBuilder, default_guard, ip};
use floodgate_core::health::HealthStatus;
use floodgate_core::types::{Action, Ipv4Cidr, ProtectionMode};
use floodgate_guard::{DetectionEvent, DetectionKind};

#[tokio::test]
async fn consumer_task_drains_while_workers_run() {
    let (guard, mut rx) = default_guard();

    let consumer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        seen
    });

    let worker_guard = guard.clone();
    tokio::task::spawn_blocking(move || {
        let frame = FrameBuilder::udp(ip(172, 20, 0, 1), 53).build();
        for _ in 0..4_000 {
            worker_guard.process(&frame, frame.len());
        }
    })
    .await
    .unwrap();

    // 모든 송신자(가드 복제본)를 닫아 소비자를 종료
    drop(guard);
    let seen = consumer.await.unwrap();

    let counts: Vec<u64> = seen.iter().map(|e| e.rate_estimate).collect();
    let expected: Vec<u64> = (11..=20).map(|k| k * 200).collect();
    assert_eq!(counts, expected);
    assert!(seen.iter().all(|e| e.kind == DetectionKind::UdpFlood));
}

#[tokio::test]
async fn protect_mode_blocks_offending_source() {
    let (guard, mut rx) = default_guard();
    let control = guard.control();
    control.set_mode(ProtectionMode::Protect);

    let attacker = FrameBuilder::syn(ip(198, 18, 0, 66), 80).build();
    let mut verdicts = Vec::new();
    for _ in 0..600 {
        verdicts.push(guard.process(&attacker, attacker.len()));

        // 컨트롤 플레인 루프 한 번
        for event in rx.drain(64) {
            control
                .enforce(&event, Some(Duration::from_secs(300)))
                .unwrap();
        }
    }

    // 550번째 패킷에서 이벤트, 이후 패킷은 차단
    assert!(verdicts[..550].iter().all(|v| *v == Action::Pass));
    assert!(verdicts[550..].iter().all(|v| *v == Action::Drop));

    let entry = control
        .blocklist_get(Ipv4Cidr::host(ip(198, 18, 0, 66)))
        .unwrap();
    assert_eq!(entry.action, Action::Drop);
    assert_eq!(entry.expires_at, Some(entry.inserted_at + 300));
    assert_eq!(guard.snapshot().dropped, 50);
}

#[tokio::test]
async fn normal_mode_only_reports() {
    let (guard, mut rx) = default_guard();
    let control = guard.control();
    let frame = FrameBuilder::icmp(ip(198, 18, 0, 77)).build();
    for _ in 0..1100 {
        guard.process(&frame, frame.len());
    }

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, DetectionKind::IcmpFlood);
    assert_eq!(control.enforce(&event, None), Ok(false));
    assert_eq!(guard.process(&frame, frame.len()), Action::Pass);
}

#[test]
fn events_survive_wire_round_through_bytes() {
    let (guard, mut rx) = default_guard();
    let frame = FrameBuilder::syn(ip(1, 2, 3, 4), 8443).build();
    for _ in 0..550 {
        guard.process(&frame, frame.len());
    }
    let event = rx.try_recv().unwrap();
    let bytes = event.to_wire().to_bytes();
    assert_eq!(bytes.len(), 20);
    let decoded = floodgate_guard::floodgate_common::DetectionEventData::from_bytes(&bytes)
        .and_then(|data| DetectionEvent::from_wire(&data))
        .unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn health_tracks_consumer_state() {
    let (guard, rx) = default_guard();
    assert_eq!(guard.health_check(), HealthStatus::Healthy);
    drop(rx);
    assert!(matches!(guard.health_check(), HealthStatus::Unhealthy(_)));

    // 소비자가 없어도 패킷 경로는 계속 동작
    let frame = FrameBuilder::syn(ip(1, 1, 1, 1), 80).build();
    for _ in 0..600 {
        assert_eq!(guard.process(&frame, frame.len()), Action::Pass);
    }
    let snap = guard.snapshot();
    assert_eq!(snap.events_sent, 0);
    assert_eq!(snap.events_dropped, 2);
}
