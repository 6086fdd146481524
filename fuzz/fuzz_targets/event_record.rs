#![no_main]

use floodgate_guard::DetectionEvent;
use floodgate_guard::floodgate_common::DetectionEventData;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 임의 바이트에서 레코드를 복원해도 패닉하지 않아야 하고,
    // 검증을 통과한 이벤트는 같은 레코드로 다시 인코딩되어야 한다
    let Some(record) = DetectionEventData::from_bytes(data) else {
        return;
    };
    if let Some(event) = DetectionEvent::from_wire(&record) {
        let again = event.to_wire();
        assert_eq!(again.src_ip, record.src_ip);
        assert_eq!(again.event_type, record.event_type);
        assert_eq!(again.dst_port, record.dst_port);
    }
});
