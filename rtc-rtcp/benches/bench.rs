use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use rtc_rtcp::{
    packet::{self, Packet},
    payload_feedbacks::{
        picture_loss_indication::PictureLossIndication,
        reference_picture_selection_indication::ReferencePictureSelectionIndication,
        slice_loss_indication::{SliEntry, SliceLossIndication},
    },
    receiver_report::ReceiverReport,
    reception_report::ReceptionReport,
    transport_feedbacks::transport_layer_nack::{
        TransportLayerNack, nack_pairs_from_sequence_numbers,
    },
};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

fn bench_codec<P>(c: &mut Criterion, name: &str, p: &P)
where
    P: Marshal + Unmarshal + PartialEq + std::fmt::Debug,
{
    let raw = p.marshal().unwrap();
    let decoded = P::unmarshal(&mut raw.clone()).unwrap();
    assert_eq!(p, &decoded, "{name}: marshal or unmarshal not correct");

    let mut buf = BytesMut::with_capacity(p.marshal_size());
    buf.resize(p.marshal_size(), 0);
    c.bench_function(&format!("{name} MarshalTo"), |b| {
        b.iter(|| {
            let _ = p.marshal_to(&mut buf).unwrap();
        })
    });

    c.bench_function(&format!("{name} Unmarshal"), |b| {
        b.iter(|| {
            let buf = &mut raw.clone();
            let _ = P::unmarshal(buf).unwrap();
        })
    });
}

fn receiver_report() -> ReceiverReport {
    ReceiverReport {
        ssrc: 0x902f9e2e,
        reports: (0..4)
            .map(|i| ReceptionReport {
                ssrc: 0xbc5e9a40 + i,
                fraction_lost: 10,
                total_lost: 100 * i,
                last_sequence_number: 0x46e1 + i,
                jitter: 273,
                ..Default::default()
            })
            .collect(),
        profile_extensions: Bytes::new(),
    }
}

fn benchmark_receiver_report(c: &mut Criterion) {
    bench_codec(c, "ReceiverReport", &receiver_report());
}

fn benchmark_transport_layer_nack(c: &mut Criterion) {
    // a burst straddling the sequence number wrap
    let missing: Vec<u16> = (65500u16..=65535).chain(0..40).step_by(3).collect();

    c.bench_function("nack_pairs_from_sequence_numbers", |b| {
        b.iter(|| {
            let _ = nack_pairs_from_sequence_numbers(&missing);
        })
    });

    let nack = TransportLayerNack {
        sender_ssrc: 0x902f9e2e,
        media_ssrc: 0xbc5e9a40,
        nacks: nack_pairs_from_sequence_numbers(&missing),
    };
    bench_codec(c, "TransportLayerNack", &nack);
}

fn benchmark_codec_feedback(c: &mut Criterion) {
    bench_codec(
        c,
        "PictureLossIndication",
        &PictureLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0xbc5e9a40,
        },
    );

    bench_codec(
        c,
        "SliceLossIndication",
        &SliceLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0xbc5e9a40,
            sli_entries: vec![SliEntry {
                first: 0,
                number: 8160,
                picture: 17,
            }],
        },
    );

    bench_codec(
        c,
        "ReferencePictureSelectionIndication",
        &ReferencePictureSelectionIndication::with_picture_id(0x902f9e2e, 0xbc5e9a40, 100, 0x1234),
    );
}

fn benchmark_compound(c: &mut Criterion) {
    let packets: Vec<Box<dyn Packet>> = vec![
        Box::new(receiver_report()),
        Box::new(TransportLayerNack {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0xbc5e9a40,
            nacks: nack_pairs_from_sequence_numbers(&[100, 102, 140]),
        }),
        Box::new(PictureLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0xbc5e9a40,
        }),
    ];
    let raw = packet::marshal(&packets).unwrap();

    c.bench_function("Compound Unmarshal", |b| {
        b.iter(|| {
            let buf = &mut raw.clone();
            let _ = packet::unmarshal(buf).unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_receiver_report,
    benchmark_transport_layer_nack,
    benchmark_codec_feedback,
    benchmark_compound
);
criterion_main!(benches);
