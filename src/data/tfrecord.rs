// ============================================================
// Layer 4 — TFRecord Framing
// ============================================================
// Raw Records arrive as a plain byte stream in which every
// record is framed like this:
//
//   ┌──────────────┬──────────────┬──────────────┬──────────────┐
//   │ length: u64  │ crc(length)  │ data         │ crc(data)    │
//   │ little endian│ u32, masked  │ length bytes │ u32, masked  │
//   └──────────────┴──────────────┴──────────────┴──────────────┘
//
// Both checksums are CRC32C (Castagnoli) passed through a
// rotate-and-add mask so that a CRC of data that itself contains
// CRCs does not degenerate.
//
// The reader is an Iterator, so a file, a named pipe or a socket
// all look the same to the pipeline. A clean EOF between records
// ends iteration; an EOF anywhere else is Truncated.
//
// Reference: TensorFlow record_writer.cc (format only)
//            crc32c crate documentation

use std::io::{self, ErrorKind, Read, Write};

use crate::domain::error::RecordError;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Masked CRC32C as used by the record framing.
pub fn masked_crc32c(bytes: &[u8]) -> u32 {
    let crc = crc32c::crc32c(bytes);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Streams record payloads out of any `Read`.
pub struct TfRecordReader<R> {
    inner: R,
    done:  bool,
}

impl<R: Read> TfRecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        let mut header = [0u8; 12];
        match read_full(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            12 => {}
            _ => return Err(RecordError::Truncated),
        }

        let (len_bytes, len_crc) = header.split_at(8);
        if masked_crc32c(len_bytes) != u32::from_le_bytes(le4(len_crc)) {
            return Err(RecordError::CorruptLength);
        }
        let len = u64::from_le_bytes(le8(len_bytes));

        // The length is untrusted until the data CRC matches, so the
        // buffer only grows as bytes actually arrive.
        let mut data = Vec::new();
        if (&mut self.inner).take(len).read_to_end(&mut data)? as u64 != len {
            return Err(RecordError::Truncated);
        }
        let len = data.len();

        let mut data_crc = [0u8; 4];
        if read_full(&mut self.inner, &mut data_crc)? != 4 {
            return Err(RecordError::Truncated);
        }
        if masked_crc32c(&data) != u32::from_le_bytes(data_crc) {
            return Err(RecordError::CorruptData { len });
        }

        Ok(Some(data))
    }
}

impl<R: Read> Iterator for TfRecordReader<R> {
    type Item = Result<Vec<u8>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            // Framing is lost after any error, so stop here.
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Appends framed records to any `Write`.
pub struct TfRecordWriter<W> {
    inner: W,
}

impl<W: Write> TfRecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, data: &[u8]) -> io::Result<()> {
        let len = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&len)?;
        self.inner.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc32c(data).to_le_bytes())
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Like read_exact, but reports how many bytes arrived before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    out
}
