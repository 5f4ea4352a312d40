//! Little-endian binary reader/writer for the model and memory formats.
//!
//! ```text
//! i32   4 bytes, little-endian two's complement
//! f32   4 bytes, little-endian IEEE 754
//! bool  1 byte, 0 or 1
//! ```
//!
//! Collections carry no length prefix; every reader is told the length by
//! its caller.

use crate::error::{EslError, Result};

/// Deepest tree a reader will descend into before calling the stream corrupt.
pub const MAX_NESTING: usize = 512;

/// Fail with `CorruptData` once `depth` passes `MAX_NESTING`.
pub fn check_nesting(depth: usize, what: &str) -> Result<()> {
    if depth > MAX_NESTING {
        return Err(EslError::CorruptData(format!(
            "{} nested deeper than {} levels",
            what, MAX_NESTING
        )));
    }
    Ok(())
}

// ─── Writer ────────────────────────────────────────────────────────

/// Append-only byte buffer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a count. Counts past `i32::MAX` have no wire form.
    pub fn write_len(&mut self, v: usize) -> Result<()> {
        let v = i32::try_from(v).map_err(|_| {
            EslError::InvalidArgument(format!("count {} does not fit the i32 wire type", v))
        })?;
        self.write_i32(v);
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ─── Reader ────────────────────────────────────────────────────────

/// Cursor over a borrowed byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Fail with `CorruptData` unless `bytes` more bytes are available.
    pub fn ensure(&self, bytes: usize, what: &str) -> Result<()> {
        if bytes > self.remaining() {
            return Err(EslError::CorruptData(format!(
                "unexpected end of data reading {} at offset {} ({} bytes needed, {} left)",
                what,
                self.offset,
                bytes,
                self.remaining()
            )));
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        self.ensure(N, what)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.offset..self.offset + N]);
        self.offset += N;
        Ok(bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take::<4>("i32")?))
    }

    /// Read a non-negative count.
    pub fn read_len(&mut self, what: &str) -> Result<usize> {
        let v = self.read_i32()?;
        usize::try_from(v)
            .map_err(|_| EslError::CorruptData(format!("negative {}: {}", what, v)))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take::<4>("f32")?))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.take::<1>("bool")?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EslError::CorruptData(format!(
                "invalid bool byte {} at offset {}",
                other,
                self.offset - 1
            ))),
        }
    }
}
