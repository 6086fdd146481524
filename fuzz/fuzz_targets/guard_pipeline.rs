#![no_main]

use std::sync::{Mutex, OnceLock};

use arbitrary::Arbitrary;
use floodgate_core::types::Action;
use floodgate_guard::{EventReceiver, Guard};
use libfuzzer_sys::fuzz_target;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 처리할 프레임 목록
    frames: Vec<Vec<u8>>,
    /// 감시 포트 (처음 한 번 등록)
    watched: Vec<u16>,
    /// 처리 전에 차단할 /24 (상위 3옥텟)
    blocked: Option<[u8; 3]>,
}

fn guard() -> &'static (Guard, Mutex<EventReceiver>) {
    static GUARD: OnceLock<(Guard, Mutex<EventReceiver>)> = OnceLock::new();
    GUARD.get_or_init(|| {
        let (guard, rx) = Guard::builder().build().expect("default config");
        (guard, Mutex::new(rx))
    })
}

fuzz_target!(|input: FuzzInput| {
    let (guard, rx) = guard();
    let control = guard.control();

    for port in input.watched.iter().take(16) {
        control.watch_port(*port);
    }
    if let Some([a, b, c]) = input.blocked {
        let cidr = format!("{a}.{b}.{c}.0/24").parse().expect("valid cidr");
        let _ = control.block(cidr, Action::Drop, None);
    }

    // 어떤 입력이든 PASS 또는 DROP만 반환하고 패닉하지 않아야 한다
    for frame in input.frames.iter().take(64) {
        let verdict = guard.process(frame, frame.len());
        assert!(matches!(verdict, Action::Pass | Action::Drop));
    }

    // 이벤트는 모두 와이어 포맷으로 직렬화 가능해야 한다
    let mut rx = rx.lock().expect("receiver lock");
    for event in rx.drain(1024) {
        assert!(event.confidence <= 100);
        assert_eq!(event.to_wire().event_type, event.kind.code());
    }

    let snap = guard.snapshot();
    assert!(snap.source_table.entries <= snap.source_table.capacity);
});
