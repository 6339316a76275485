//! Coded link end to end: TxControl frames through a channel into RxControl.

use ofdm_link_core::config::FecParameters;
use ofdm_link_core::feedback::{feedback_queue, FeedbackSender};
use ofdm_link_core::frame_buffer::DecodeFailurePolicy;
use ofdm_link_core::link::TxOutput;
use ofdm_link_core::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn coded_link(frame_symbols: u8) -> ValidatedLink {
    let mut config = LinkConfig::default();
    config.link.frame_symbols = frame_symbols;
    config.link.mcs_table = McsTable::new(vec![
        McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk).with_fec(1),
        McsEntry::new(8.0, ModulationScheme::Qpsk).with_fec(1),
        McsEntry::new(14.0, ModulationScheme::Psk8).with_fec(2),
        McsEntry::new(20.0, ModulationScheme::Qam16).with_fec(2),
    ])
    .unwrap();
    config.fec = Some(FecParameters {
        decode_failure: DecodeFailurePolicy::Drop,
        ..Default::default()
    });
    config.validate().unwrap()
}

fn endpoints(link: &ValidatedLink) -> (FeedbackSender, TxControl, RxControl) {
    let (fb_tx, fb_rx) = feedback_queue(4);
    let (rx_fb_tx, _rx_fb_rx) = feedback_queue(4);
    let tx = TxControl::new(link, fb_rx).unwrap();
    let rx = RxControl::new(link, FeedbackPath::Queue(rx_fb_tx)).unwrap();
    (fb_tx, tx, rx)
}

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn deliver(rx: &mut RxControl, out: &TxOutput, symbols: &[Complex], noise_var: Option<f64>) {
    let report = rx
        .on_frame(&out.header_symbols, RxPayload::Symbols { symbols, noise_var }, Some(15.0))
        .unwrap()
        .expect("header parses");
    assert_eq!(report.header, out.frame.header);
    assert_eq!(report.deframe.failed_codewords(), 0);
    assert_eq!(report.deframe.lost_codewords, 0);
}

#[test]
fn test_every_scheme_and_code_roundtrip() {
    for frame_symbols in [1u8, 3] {
        let link = coded_link(frame_symbols);
        for code in [1u8, 2] {
            for scheme in ModulationScheme::ALL {
                let (_fb, mut tx, mut rx) = endpoints(&link);
                tx.shared().publish(McsSelection::new(scheme, Some(code)));

                // Not a multiple of either k
                let data = random_bytes(157, code as u64 * 10 + scheme.id() as u64);
                tx.push_bytes(&data);
                let mut frames = 0;
                while tx.pending_bits() > 0 {
                    let out = tx.next_frame().unwrap().unwrap();
                    deliver(&mut rx, &out, &out.payload_symbols(), None);
                    frames += 1;
                }
                assert!(frames > 1);
                assert_eq!(
                    rx.drain_bytes(),
                    data,
                    "scheme {} code {} frame_symbols {}",
                    scheme,
                    code,
                    frame_symbols
                );
            }
        }
    }
}

#[test]
fn test_codewords_straddle_frames() {
    // 48 BPSK bits per frame, 96-bit codewords
    let link = coded_link(1);
    let (_fb, mut tx, _rx) = endpoints(&link);
    tx.push_bytes(&random_bytes(24, 1));
    let offsets: Vec<(u8, u16)> = (0..4)
        .map(|_| {
            let fec = tx.next_frame().unwrap().unwrap().frame.header.fec.unwrap();
            (fec.codeword_id, fec.offset)
        })
        .collect();
    assert_eq!(offsets, vec![(0, 0), (0, 48), (1, 0), (1, 48)]);
}

#[test]
fn test_feedback_changes_scheme_mid_stream() {
    let link = coded_link(2);
    let (fb, mut tx, mut rx) = endpoints(&link);
    let data = random_bytes(600, 7);
    tx.push_bytes(&data);

    let plan = [(0u8, 1u8), (1, 1), (2, 2), (3, 2), (1, 1), (0, 1), (3, 2)];
    let mut step = 0;
    while tx.pending_bits() > 0 {
        let (scheme, fec) = plan[step % plan.len()];
        fb.send(FeedbackMessage::new(scheme, fec));
        let out = tx.next_frame().unwrap().unwrap();
        assert_eq!(out.frame.header.scheme.id(), scheme);
        deliver(&mut rx, &out, &out.payload_symbols(), None);
        step += 1;
    }
    assert_eq!(rx.drain_bytes(), data);
    assert!(tx.stats().feedback_applied >= plan.len() as u64 - 1);
}

#[test]
fn test_noisy_channel_soft_decoding() {
    let link = coded_link(2);
    let (_fb, mut tx, mut rx) = endpoints(&link);
    tx.shared().publish(McsSelection::new(ModulationScheme::Qpsk, Some(1)));
    let data = random_bytes(300, 3);
    tx.push_bytes(&data);

    let sigma = 0.2;
    let noise = Normal::new(0.0, sigma).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    while tx.pending_bits() > 0 {
        let out = tx.next_frame().unwrap().unwrap();
        let noisy: Vec<Complex> = out
            .payload_symbols()
            .into_iter()
            .map(|s| s + Complex::new(noise.sample(&mut rng), noise.sample(&mut rng)))
            .collect();
        deliver(&mut rx, &out, &noisy, Some(2.0 * sigma * sigma));
    }
    assert_eq!(rx.drain_bytes(), data);
}

#[test]
fn test_starvation_stops_coded_link() {
    let mut config = LinkConfig::default();
    config.link.mcs_table = McsTable::new(vec![McsEntry::new(f64::NEG_INFINITY, ModulationScheme::Bpsk).with_fec(1)])
        .unwrap();
    config.link.max_empty_frames = Some(2);
    config.fec = Some(FecParameters::default());
    let link = config.validate().unwrap();
    let (_fb, mut tx, mut rx) = endpoints(&link);

    tx.push_bytes(&[0x42; 6]);
    let data_frame = tx.next_frame().unwrap().unwrap();
    deliver(&mut rx, &data_frame, &data_frame.payload_symbols(), None);
    for _ in 0..2 {
        let empty = tx.next_frame().unwrap().unwrap();
        assert_eq!(empty.frame.header.payload_symbols, 0);
        deliver(&mut rx, &empty, &empty.payload_symbols(), None);
    }
    assert!(tx.next_frame().unwrap().is_none());
    assert!(tx.is_stopped());
    assert_eq!(rx.drain_bytes(), vec![0x42; 6]);

    tx.push_bytes(&[1]);
    assert!(!tx.is_stopped());
    assert!(tx.next_frame().unwrap().is_some());
}
