#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    if let Ok(packets) = rtc_rtcp::packet::unmarshal(&mut buf) {
        let _ = rtc_rtcp::packet::marshal(&packets);
    }
});
