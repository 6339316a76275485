//! # Debug Frame Store
//!
//! Binary dump of frame payloads for offline bit-error-rate analysis. The
//! file is a plain sequence of records with no header, separators or index:
//!
//! ```text
//! ┌──────────────┬─────────────────┬─────────────────┐
//! │ len: i32 LE  │ seq: u64 LE     │ payload (len B) │ ...
//! └──────────────┴─────────────────┴─────────────────┘
//! ```
//!
//! The transmitter and the receiver each write one. [`compare`] lines the
//! two up by sequence number, starting at the first number both contain,
//! and counts bit errors over the frames that made it across.
//!
//! ```rust
//! use ofdm_link_core::frame_store::{compare, read_records, FrameStoreWriter};
//!
//! let mut tx = FrameStoreWriter::new(Vec::new());
//! tx.write_record(0, b"hello").unwrap();
//! tx.write_record(1, b"world").unwrap();
//! let mut rx = FrameStoreWriter::new(Vec::new());
//! rx.write_record(1, b"wornd").unwrap();
//!
//! let tx = read_records(tx.into_inner().as_slice()).unwrap();
//! let rx = read_records(rx.into_inner().as_slice()).unwrap();
//! let report = compare(&tx, &rx);
//! assert_eq!(report.frames_matched, 1);
//! assert_eq!(report.bit_errors, 1);
//! ```

use crate::header::FRAME_NO_MODULUS;
use crate::types::{LinkError, LinkResult};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

const RECORD_HEADER_BYTES: usize = 4 + 8;

/// One stored frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub seq: u64,
    pub payload: Vec<u8>,
}

/// Appends records to any writer.
#[derive(Debug)]
pub struct FrameStoreWriter<W: Write> {
    inner: W,
    records: u64,
}

impl FrameStoreWriter<BufWriter<File>> {
    /// Create (truncate) a store file.
    pub fn create(path: impl AsRef<Path>) -> LinkResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> FrameStoreWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn write_record(&mut self, seq: u64, payload: &[u8]) -> LinkResult<()> {
        let len = i32::try_from(payload.len())
            .map_err(|_| LinkError::FrameStore(format!("payload of {} bytes too large", payload.len())))?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(&seq.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> LinkResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Sequential record reader.
#[derive(Debug)]
pub struct FrameStoreReader<R: Read> {
    inner: R,
    done: bool,
}

impl FrameStoreReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> LinkResult<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> FrameStoreReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    /// Next record; `Ok(None)` at a clean end of file.
    pub fn read_record(&mut self) -> LinkResult<Option<FrameRecord>> {
        let mut head = [0u8; RECORD_HEADER_BYTES];
        let got = read_full(&mut self.inner, &mut head)?;
        if got == 0 {
            return Ok(None);
        }
        if got < RECORD_HEADER_BYTES {
            return Err(LinkError::FrameStore(format!("truncated record header ({} bytes)", got)));
        }
        let len = i32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let len = usize::try_from(len).map_err(|_| LinkError::FrameStore(format!("negative payload length {}", len)))?;
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&head[4..]);
        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.inner, &mut payload)?;
        if got < len {
            return Err(LinkError::FrameStore(format!(
                "truncated payload: {} of {} bytes",
                got, len
            )));
        }
        Ok(Some(FrameRecord {
            seq: u64::from_le_bytes(seq),
            payload,
        }))
    }
}

impl<R: Read> Iterator for FrameStoreReader<R> {
    type Item = LinkResult<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_record().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Read until `buf` is full or EOF; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> LinkResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read every record from `reader`.
pub fn read_records<R: Read>(reader: R) -> LinkResult<Vec<FrameRecord>> {
    FrameStoreReader::new(reader).collect()
}

/// Outcome of matching a transmitted store against a received one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BerReport {
    /// Transmitted frames found in the received store
    pub frames_matched: u64,
    /// Transmitted frames after alignment with no received counterpart
    pub frames_lost: u64,
    /// Transmitted frames before the first common sequence number
    pub frames_skipped: u64,
    pub bits_compared: u64,
    pub bit_errors: u64,
}

impl BerReport {
    /// Bit error rate over matched frames, `None` if nothing was compared.
    pub fn ber(&self) -> Option<f64> {
        (self.bits_compared > 0).then(|| self.bit_errors as f64 / self.bits_compared as f64)
    }
}

/// Records checked per candidate when resolving which wrap of the frame
/// number the receiver joined on.
const ALIGN_WINDOW: usize = 32;

/// Match records by sequence number and count bit errors.
///
/// The receiver numbers frames by unwrapping the 12-bit header frame number
/// from the first frame it hears, so its sequence numbers equal the
/// transmitter's only modulo [`FRAME_NO_MODULUS`]. Alignment starts at the
/// first received record whose frame number occurs in `tx`. When that
/// number occurs on several wraps the offset whose leading frames agree
/// best wins. The offset is then carried across the rest of the trace. A
/// length difference counts every missing or extra bit as an error.
pub fn compare(tx: &[FrameRecord], rx: &[FrameRecord]) -> BerReport {
    let sent: HashMap<u64, usize> = tx.iter().enumerate().map(|(i, r)| (r.seq, i)).collect();
    let mut report = BerReport::default();
    let Some((offset, start)) = align(tx, rx, &sent) else {
        report.frames_skipped = tx.len() as u64;
        return report;
    };
    report.frames_skipped = start as u64;

    let received: HashMap<u64, &FrameRecord> =
        rx.iter().map(|r| (r.seq.wrapping_add(offset), r)).collect();
    for record in &tx[start..] {
        let Some(got) = received.get(&record.seq) else {
            report.frames_lost += 1;
            continue;
        };
        let (bits, errors) = bit_errors(&record.payload, &got.payload);
        report.frames_matched += 1;
        report.bits_compared += bits;
        report.bit_errors += errors;
    }
    report
}

/// Offset to add to received sequence numbers, and the index in `tx` of
/// the first aligned record.
fn align(tx: &[FrameRecord], rx: &[FrameRecord], sent: &HashMap<u64, usize>) -> Option<(u64, usize)> {
    let modulus = FRAME_NO_MODULUS as u64;
    let (anchor, candidates) = rx.iter().enumerate().find_map(|(i, r)| {
        let hits: Vec<usize> = tx
            .iter()
            .enumerate()
            .filter(|(_, t)| t.seq % modulus == r.seq % modulus)
            .map(|(j, _)| j)
            .collect();
        (!hits.is_empty()).then_some((i, hits))
    })?;

    let window = &rx[anchor..rx.len().min(anchor + ALIGN_WINDOW)];
    candidates
        .into_iter()
        .map(|j| (tx[j].seq.wrapping_sub(rx[anchor].seq), j))
        .min_by_key(|&(offset, _)| {
            window
                .iter()
                .map(|r| match sent.get(&r.seq.wrapping_add(offset)) {
                    Some(&k) => bit_errors(&tx[k].payload, &r.payload).1,
                    None => 8 * r.payload.len().max(1) as u64,
                })
                .sum::<u64>()
        })
}

/// Bits compared and bits in error between two payloads.
fn bit_errors(sent: &[u8], got: &[u8]) -> (u64, u64) {
    let common = sent.len().min(got.len());
    let extra = (sent.len().max(got.len()) - common) as u64;
    let flipped: u64 = sent[..common]
        .iter()
        .zip(&got[..common])
        .map(|(a, b)| (a ^ b).count_ones() as u64)
        .sum();
    (8 * (common as u64 + extra), flipped + 8 * extra)
}
