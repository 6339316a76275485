//! Uncoded byte framing.
//!
//! Each frame carries as many whole queued bytes as fit, followed by their
//! CRC-32; the header's payload length covers exactly those bytes. The rest
//! of the frame is pseudo-random filler. While the queue is empty the
//! buffer sends filler-only frames with a zero payload length, until the
//! starvation policy says stop.

use super::{
    drain_whole_bytes, DeframeReport, Deframer, FrameBuffer, FramePlan, FrameStatus, RxPayload,
    SequenceUnwrapper, StarvationPolicy, TxFrame,
};
use crate::bit_packing::{bits_to_bytes, bytes_to_bits};
use crate::crc::{append_crc32, strip_crc32, CRC32_BYTES as CRC_BYTES};
use crate::frame_store::FrameStoreWriter;
use crate::header::{FrameHeader, FRAME_NO_MODULUS, MAX_PAYLOAD_SYMBOLS};
use crate::mcs::McsSelection;
use crate::modulation::ModulationScheme;
use crate::types::{hard_bit, BitStream, LinkError, LinkResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::Write;
use tracing::{debug, trace};

type StoreWriter = FrameStoreWriter<Box<dyn Write + Send>>;

fn check_plan(plan: &FramePlan) -> LinkResult<()> {
    if plan.frame_symbols == 0 || plan.frame_symbols > 15 || plan.data_carriers == 0 {
        return Err(LinkError::InvalidConfig(format!(
            "frame plan {} carriers x {} symbols",
            plan.data_carriers, plan.frame_symbols
        )));
    }
    if plan.capacity_symbols() > MAX_PAYLOAD_SYMBOLS {
        return Err(LinkError::InvalidConfig(format!(
            "{} payload symbols per frame overflow the header length field",
            plan.capacity_symbols()
        )));
    }
    if plan.capacity_bits(ModulationScheme::Bpsk) / 8 <= CRC_BYTES {
        return Err(LinkError::InvalidConfig(format!(
            "a BPSK frame of {} bits cannot hold a byte plus its CRC",
            plan.capacity_bits(ModulationScheme::Bpsk)
        )));
    }
    Ok(())
}

/// Transmit-side byte framer.
pub struct PlainFrameBuffer {
    plan: FramePlan,
    pending: VecDeque<u8>,
    seq: u64,
    starvation: StarvationPolicy,
    rng: StdRng,
    store: Option<StoreWriter>,
}

impl std::fmt::Debug for PlainFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainFrameBuffer")
            .field("plan", &self.plan)
            .field("pending", &self.pending.len())
            .field("seq", &self.seq)
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl PlainFrameBuffer {
    pub fn new(plan: FramePlan, max_empty_frames: Option<u32>) -> LinkResult<Self> {
        check_plan(&plan)?;
        Ok(Self {
            plan,
            pending: VecDeque::new(),
            seq: 0,
            starvation: StarvationPolicy::new(max_empty_frames),
            rng: StdRng::from_entropy(),
            store: None,
        })
    }

    /// Dump every frame's payload to `writer` in frame-store format.
    pub fn with_store(mut self, writer: impl Write + Send + 'static) -> Self {
        self.store = Some(FrameStoreWriter::new(Box::new(writer)));
        self
    }

    pub fn with_filler_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Largest payload a frame of `scheme` carries.
    pub fn max_payload_bytes(&self, scheme: ModulationScheme) -> usize {
        (self.plan.capacity_bits(scheme) / 8).saturating_sub(CRC_BYTES)
    }

    /// Frames built so far.
    pub fn frames_built(&self) -> u64 {
        self.seq
    }

    pub fn flush_store(&mut self) -> LinkResult<()> {
        match self.store.as_mut() {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    fn finish(
        &mut self,
        scheme: ModulationScheme,
        payload: &[u8],
        mut bits: BitStream,
        status: FrameStatus,
    ) -> LinkResult<TxFrame> {
        let capacity = self.plan.capacity_bits(scheme);
        let payload_symbols = scheme.symbols_for_bits(bits.len());
        while bits.len() < capacity {
            bits.push(self.rng.gen_range(0..2));
        }
        let seq = self.seq;
        self.seq += 1;
        if let Some(store) = self.store.as_mut() {
            store.write_record(seq, payload)?;
        }
        let frame_no = (seq % FRAME_NO_MODULUS as u64) as u16;
        trace!(frame_no, %scheme, bytes = payload.len(), payload_symbols, "built frame");
        Ok(TxFrame {
            header: FrameHeader::new(frame_no, payload_symbols as u16, scheme, self.plan.frame_symbols),
            bits,
            status,
        })
    }
}

impl FrameBuffer for PlainFrameBuffer {
    fn push_bytes(&mut self, data: &[u8]) {
        self.pending.extend(data);
        if !data.is_empty() {
            self.starvation.on_data();
        }
    }

    fn pending_bits(&self) -> usize {
        self.pending.len() * 8
    }

    fn next_frame(&mut self, selection: McsSelection) -> LinkResult<Option<TxFrame>> {
        if let Some(fec) = selection.fec {
            return Err(LinkError::InvalidConfig(format!(
                "uncoded link given FEC code {} in selection {}",
                fec, selection
            )));
        }
        let scheme = selection.scheme;

        if self.pending.is_empty() {
            if !self.starvation.on_empty() {
                return Ok(None);
            }
            return self.finish(scheme, &[], Vec::new(), FrameStatus::Empty).map(Some);
        }

        let take = self.pending.len().min(self.max_payload_bytes(scheme));
        let payload: Vec<u8> = self.pending.drain(..take).collect();
        let mut wire = payload.clone();
        append_crc32(&mut wire);
        self.finish(scheme, &payload, bytes_to_bits(&wire), FrameStatus::Data)
            .map(Some)
    }

    fn is_stopped(&self) -> bool {
        self.starvation.is_stopped()
    }
}

/// Receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlainRxStats {
    pub frames: u64,
    pub empty: u64,
    pub crc_failures: u64,
}

/// Receive-side byte deframer.
pub struct PlainDeframer {
    output: BitStream,
    sequence: SequenceUnwrapper,
    stats: PlainRxStats,
    store: Option<StoreWriter>,
}

impl std::fmt::Debug for PlainDeframer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainDeframer")
            .field("buffered_bits", &self.output.len())
            .field("stats", &self.stats)
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl PlainDeframer {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            sequence: SequenceUnwrapper::new(),
            stats: PlainRxStats::default(),
            store: None,
        }
    }

    /// Dump every received payload (CRC failures included) to `writer`.
    pub fn with_store(mut self, writer: impl Write + Send + 'static) -> Self {
        self.store = Some(FrameStoreWriter::new(Box::new(writer)));
        self
    }

    pub fn stats(&self) -> PlainRxStats {
        self.stats
    }

    pub fn flush_store(&mut self) -> LinkResult<()> {
        match self.store.as_mut() {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }
}

impl Default for PlainDeframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer for PlainDeframer {
    fn process(&mut self, header: &FrameHeader, payload: RxPayload<'_>) -> LinkResult<DeframeReport> {
        if header.fec.is_some() {
            return Err(LinkError::InvalidConfig(
                "uncoded deframer given a header with FEC fields".into(),
            ));
        }
        let soft = match header.payload_symbols {
            0 => None,
            n => Some(payload.soft_bits(header.scheme, n as usize)?),
        };
        let mut report = DeframeReport::new(header.frame_no);
        let seq = self.sequence.unwrap(header.frame_no);
        self.stats.frames += 1;
        let Some(soft) = soft else {
            self.stats.empty += 1;
            if let Some(store) = self.store.as_mut() {
                store.write_record(seq, &[])?;
            }
            return Ok(report);
        };

        let bits: BitStream = soft.iter().map(|&l| hard_bit(l)).collect();
        let whole = bits.len() / 8 * 8;
        let bytes = bits_to_bytes(&bits[..whole]);

        let checked = strip_crc32(&bytes);
        report.crc_ok = Some(checked.is_some());
        if let Some(store) = self.store.as_mut() {
            let body = &bytes[..bytes.len().saturating_sub(CRC_BYTES)];
            store.write_record(seq, body)?;
        }
        match checked {
            Some(data) => {
                self.output.extend(bytes_to_bits(data));
                report.delivered_bits = data.len() * 8;
            }
            None => {
                self.stats.crc_failures += 1;
                debug!(frame_no = header.frame_no, bytes = bytes.len(), "payload CRC failed, frame dropped");
            }
        }
        Ok(report)
    }

    fn drain_bytes(&mut self) -> Vec<u8> {
        drain_whole_bytes(&mut self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_store::read_records;
    use crate::modulation::ModulationScheme::*;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory sink for store output.
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 13 + 5) as u8).collect()
    }

    #[test]
    fn test_frame_layout() {
        let plan = FramePlan::new(48, 2);
        let mut tx = PlainFrameBuffer::new(plan, None).unwrap();
        assert_eq!(tx.max_payload_bytes(Bpsk), 8);
        assert_eq!(tx.max_payload_bytes(Qam16), 44);
        tx.push_bytes(&data(5));
        let frame = tx.next_frame(McsSelection::uncoded(Psk8)).unwrap().unwrap();
        // 9 bytes = 72 bits = 24 8PSK symbols
        assert_eq!(frame.header.payload_symbols, 24);
        assert_eq!(frame.bits.len(), 288);
        assert_eq!(frame.status, FrameStatus::Data);
        assert_eq!(bits_to_bytes(&frame.bits[..72])[..5], data(5)[..]);
        assert!(frame.header.fec.is_none());
    }

    #[test]
    fn test_roundtrip_all_schemes() {
        let plan = FramePlan::new(48, 3);
        for scheme in ModulationScheme::ALL {
            let mut tx = PlainFrameBuffer::new(plan, None).unwrap();
            let mut rx = PlainDeframer::new();
            let input = data(301);
            tx.push_bytes(&input);
            while tx.pending_bits() > 0 {
                let frame = tx.next_frame(McsSelection::uncoded(scheme)).unwrap().unwrap();
                let symbols = frame.payload_symbols();
                let report = rx
                    .process(
                        &frame.header,
                        RxPayload::Symbols {
                            symbols: &symbols,
                            noise_var: None,
                        },
                    )
                    .unwrap();
                assert_eq!(report.crc_ok, Some(true));
            }
            assert_eq!(rx.drain_bytes(), input, "{}", scheme);
        }
    }

    #[test]
    fn test_crc_failure_drops_frame() {
        let plan = FramePlan::new(48, 1);
        let mut tx = PlainFrameBuffer::new(plan, None).unwrap();
        let mut rx = PlainDeframer::new();
        tx.push_bytes(&data(4));
        let frame = tx.next_frame(McsSelection::uncoded(Qpsk)).unwrap().unwrap();
        let mut bits = frame.payload_bits().to_vec();
        bits[9] ^= 1;
        let report = rx.process(&frame.header, RxPayload::HardBits(&bits)).unwrap();
        assert_eq!(report.crc_ok, Some(false));
        assert_eq!(report.delivered_bits, 0);
        assert!(rx.drain_bytes().is_empty());
        assert_eq!(rx.stats().crc_failures, 1);
    }

    #[test]
    fn test_empty_frames_until_stop() {
        let plan = FramePlan::new(48, 1);
        let mut tx = PlainFrameBuffer::new(plan, Some(3)).unwrap();
        let mut rx = PlainDeframer::new();
        for _ in 0..3 {
            let frame = tx.next_frame(McsSelection::uncoded(Bpsk)).unwrap().unwrap();
            assert_eq!(frame.status, FrameStatus::Empty);
            assert_eq!(frame.header.payload_symbols, 0);
            assert_eq!(frame.bits.len(), 48);
            let report = rx.process(&frame.header, RxPayload::HardBits(&[])).unwrap();
            assert_eq!(report.crc_ok, None);
        }
        assert!(tx.next_frame(McsSelection::uncoded(Bpsk)).unwrap().is_none());
        assert!(tx.is_stopped());
        assert_eq!(rx.stats().empty, 3);

        tx.push_bytes(b"x");
        let frame = tx.next_frame(McsSelection::uncoded(Bpsk)).unwrap().unwrap();
        assert_eq!(frame.status, FrameStatus::Data);
        assert_eq!(frame.header.frame_no, 3);
    }

    #[test]
    fn test_store_records_match_buffered_payloads() {
        let plan = FramePlan::new(48, 1);
        let tx_sink = Sink::default();
        let rx_sink = Sink::default();
        let mut tx = PlainFrameBuffer::new(plan, None).unwrap().with_store(tx_sink.clone());
        let mut rx = PlainDeframer::new().with_store(rx_sink.clone());
        let input = data(50);
        tx.push_bytes(&input);
        while tx.pending_bits() > 0 {
            let frame = tx.next_frame(McsSelection::uncoded(Qam16)).unwrap().unwrap();
            rx.process(&frame.header, RxPayload::HardBits(frame.payload_bits())).unwrap();
        }

        let sent = read_records(tx_sink.bytes().as_slice()).unwrap();
        let got = read_records(rx_sink.bytes().as_slice()).unwrap();
        // 48 QAM16 symbols carry 24 bytes: 20 payload + CRC
        assert_eq!(sent.len(), 3);
        assert_eq!(sent.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        let joined: Vec<u8> = sent.iter().flat_map(|r| r.payload.clone()).collect();
        assert_eq!(joined, input);
        assert_eq!(sent, got);
        let report = crate::frame_store::compare(&sent, &got);
        assert_eq!(report.bit_errors, 0);
        assert_eq!(report.frames_matched, 3);
    }

    #[test]
    fn test_rejects_fec_selection_and_tiny_plan() {
        let plan = FramePlan::new(48, 1);
        let mut tx = PlainFrameBuffer::new(plan, None).unwrap();
        tx.push_bytes(&[1]);
        assert!(tx.next_frame(McsSelection::new(Bpsk, Some(1))).is_err());
        assert!(PlainFrameBuffer::new(FramePlan::new(8, 4), None).is_err());
    }
}
