#![no_main]

use libfuzzer_sys::fuzz_target;
use shared::marshal::{Marshal, Unmarshal};

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    if let Ok(packet) = rtc_rtp::Packet::unmarshal(&mut buf) {
        let _ = packet.marshal();
    }
});
