#![no_main]

use libfuzzer_sys::fuzz_target;
use rtc_rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use shared::marshal::Unmarshal;

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    if let Ok(nack) = TransportLayerNack::unmarshal(&mut buf) {
        let _ = nack.sequence_numbers().count();
    }
});
