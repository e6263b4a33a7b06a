//! # Consensus Serialization
//!
//! Bitcoin-style byte codec used for commitments, quorum data messages and
//! persisted contributions: little-endian integers, compact-size length
//! prefixes and dynamic bitsets packed least-significant-bit first.

use bitvec::prelude::*;
use thiserror::Error;

use shared_types::Hash;

/// Member-indexed bitset (bit `i` refers to committee member `i`).
pub type MemberBitset = BitVec<u8, Lsb0>;

/// Upper bound for any decoded length prefix.
pub const MAX_SIZE: u64 = 0x0200_0000;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input ended before the value was complete
    #[error("Unexpected end of input: needed {needed} bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// Compact size not minimally encoded
    #[error("Non-canonical compact size")]
    NonCanonicalSize,

    /// Length prefix above `MAX_SIZE`
    #[error("Size {0} exceeds maximum")]
    SizeTooLarge(u64),

    /// Bytes left over after a complete message
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Field carries a value outside its domain
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: u64 },
}

// =============================================================================
// ENCODING
// =============================================================================

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one byte.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    /// Write a little-endian u16.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Write a little-endian u32.
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Write raw bytes without a prefix.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Write a 32-byte hash.
    pub fn hash(&mut self, h: &Hash) -> &mut Self {
        self.bytes(h)
    }

    /// Write a compact-size integer.
    pub fn compact_size(&mut self, n: u64) -> &mut Self {
        if n < 0xfd {
            self.buf.push(n as u8);
        } else if n <= 0xffff {
            self.buf.push(0xfd);
            self.buf.extend_from_slice(&(n as u16).to_le_bytes());
        } else if n <= 0xffff_ffff {
            self.buf.push(0xfe);
            self.buf.extend_from_slice(&(n as u32).to_le_bytes());
        } else {
            self.buf.push(0xff);
            self.buf.extend_from_slice(&n.to_le_bytes());
        }
        self
    }

    /// Write a length-prefixed byte string.
    pub fn var_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.compact_size(data.len() as u64);
        self.bytes(data)
    }

    /// Write a dynamic bitset: bit count, then packed bytes.
    pub fn bitset(&mut self, bits: &MemberBitset) -> &mut Self {
        self.compact_size(bits.len() as u64);
        let mut packed = vec![0u8; bits.len().div_ceil(8)];
        for i in bits.iter_ones() {
            packed[i / 8] |= 1 << (i % 8);
        }
        self.bytes(&packed)
    }

    /// Finish and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Cursor over an encoded message.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail if any bytes are left.
    pub fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }

    /// Take `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Take a fixed-size array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Read a little-endian u32.
    pub fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read a 32-byte hash.
    pub fn hash(&mut self) -> Result<Hash, WireError> {
        self.array()
    }

    /// Read a canonical compact-size integer bounded by `MAX_SIZE`.
    pub fn compact_size(&mut self) -> Result<u64, WireError> {
        let n = match self.u8()? {
            0xfd => {
                let v = u64::from(self.u16()?);
                if v < 0xfd {
                    return Err(WireError::NonCanonicalSize);
                }
                v
            }
            0xfe => {
                let v = u64::from(self.u32()?);
                if v <= 0xffff {
                    return Err(WireError::NonCanonicalSize);
                }
                v
            }
            0xff => {
                let v = u64::from_le_bytes(self.array()?);
                if v <= 0xffff_ffff {
                    return Err(WireError::NonCanonicalSize);
                }
                v
            }
            small => u64::from(small),
        };
        if n > MAX_SIZE {
            return Err(WireError::SizeTooLarge(n));
        }
        Ok(n)
    }

    /// Read a length-prefixed byte string.
    pub fn var_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.compact_size()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Read a dynamic bitset.
    pub fn bitset(&mut self) -> Result<MemberBitset, WireError> {
        let len = self.compact_size()? as usize;
        let packed = self.take(len.div_ceil(8))?;
        let mut bits = MemberBitset::repeat(false, len);
        for i in 0..len {
            if packed[i / 8] & (1 << (i % 8)) != 0 {
                bits.set(i, true);
            }
        }
        Ok(bits)
    }
}
