//! Receiver decisions crossing the narrowband feedback channel on their own
//! threads, the way a modem splits Rx, feedback demodulation and Tx.

use crossbeam_channel::unbounded;
use ofdm_link_core::feedback::{FeedbackDemodulator, FeedbackModemConfig, FeedbackModulator};
use ofdm_link_core::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::thread;

const SILENCE: Complex = Complex::new(0.0, 0.0);

#[test]
fn test_threaded_feedback_climbs_transmitter() {
    let link = LinkConfig::default().validate().unwrap();
    let (samples_tx, samples_rx) = unbounded::<Vec<Complex>>();

    let rx_link = link.clone();
    let receiver = thread::spawn(move || {
        let mut rx = RxControl::new(&rx_link, FeedbackPath::burst(&rx_link).unwrap()).unwrap();
        for _ in 0..12 {
            rx.on_snr(27.0);
            for burst in rx.take_bursts() {
                let mut air = vec![SILENCE; 25];
                air.extend(burst);
                air.extend(vec![SILENCE; 200]);
                // Arbitrary block sizes on the way to the listener
                for block in air.chunks(61) {
                    samples_tx.send(block.to_vec()).unwrap();
                }
            }
        }
        rx.selection()
    });

    let (fb_tx, fb_rx) = feedback_queue(link.feedback().queue_capacity);
    let modem = link.feedback().modem.clone();
    let listener = thread::spawn(move || {
        let mut listener = FeedbackListener::new(&modem, fb_tx).unwrap();
        let mut decoded = 0;
        for block in samples_rx {
            decoded += listener.push(&block);
        }
        decoded
    });

    let rx_selection = receiver.join().unwrap();
    let decoded = listener.join().unwrap();
    assert_eq!(rx_selection, McsSelection::uncoded(ModulationScheme::Qam16));
    // BPSK to QAM16 is three confirmed single steps
    assert_eq!(decoded, 3);

    let mut tx = TxControl::new(&link, fb_rx).unwrap();
    assert_eq!(tx.selection(), McsSelection::uncoded(ModulationScheme::Bpsk));
    tx.push_bytes(&[0x5A; 10]);
    let out = tx.next_frame().unwrap().unwrap();
    assert_eq!(out.frame.header.scheme, ModulationScheme::Qam16);
    assert_eq!(tx.stats().feedback_applied, 3);
}

#[test]
fn test_coded_transmitter_rejects_uncoded_burst() {
    let coded = LinkConfig::from_yaml_str(&LinkConfig::example_yaml())
        .unwrap()
        .validate()
        .unwrap();
    let modem = FeedbackModulator::new(&coded.feedback().modem).unwrap();
    let (fb_tx, fb_rx) = feedback_queue(4);
    let mut listener = FeedbackListener::new(&coded.feedback().modem, fb_tx).unwrap();
    let mut tx = TxControl::new(&coded, fb_rx).unwrap();
    let start = tx.selection();

    let mut air = vec![SILENCE; 40];
    for msg in [FeedbackMessage::new(3, 0), FeedbackMessage::new(1, 9), FeedbackMessage::new(1, 2)] {
        air.extend(modem.modulate(&msg));
        air.extend(vec![SILENCE; 150]);
    }
    assert_eq!(listener.push(&air), 3);

    // Only the last message names a code this link has
    assert_eq!(
        tx.poll_feedback(),
        Some(McsSelection::new(ModulationScheme::Qpsk, Some(2)))
    );
    assert_ne!(start, tx.selection());
    assert_eq!(tx.stats().feedback_rejected, 2);
    assert_eq!(tx.stats().feedback_applied, 1);
}

#[test]
fn test_bursts_survive_moderate_noise() {
    let config = FeedbackModemConfig::default();
    let modem = FeedbackModulator::new(&config).unwrap();
    let mut demod = FeedbackDemodulator::new(&config).unwrap();
    let mut rng = StdRng::seed_from_u64(0x0FD);
    // 20 dB below unit burst amplitude, per component
    let noise = Normal::new(0.0, 0.07).unwrap();

    let messages: Vec<FeedbackMessage> = (0..4u8)
        .flat_map(|s| (0..3u8).map(move |f| FeedbackMessage::new(s, f)))
        .collect();
    let mut air = vec![SILENCE; 30];
    for msg in &messages {
        air.extend(modem.modulate(msg));
        air.extend(vec![SILENCE; 120]);
    }
    for s in air.iter_mut() {
        *s += Complex::new(noise.sample(&mut rng), noise.sample(&mut rng));
    }

    let mut got = Vec::new();
    for block in air.chunks(500) {
        got.extend(demod.push(block));
    }
    got.extend(demod.push(&vec![SILENCE; 400]));
    assert_eq!(got, messages);
}
