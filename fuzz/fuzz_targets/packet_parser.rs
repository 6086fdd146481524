#![no_main]

use floodgate_guard::parser::{self, Classified};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // 선언 길이가 버퍼보다 길거나 짧아도 패닉 없이 분류되어야 한다
    let declared = data.first().map_or(0, |b| usize::from(*b) * 4);
    for len in [data.len(), declared, usize::MAX] {
        if let Classified::Ipv4(packet) = parser::parse(data, len) {
            assert!(packet.wire_len <= data.len());
            assert!(packet.wire_len <= len);
        }
    }
});
