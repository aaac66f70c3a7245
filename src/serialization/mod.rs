//! Bitcoin wire-format serialization primitives
//!
//! Encoding must match the deployed network bit for bit: integers are
//! little-endian, variable-length counts use the compact-size encoding, and
//! hashes are stored in internal byte order.

pub mod compact_size;
pub mod transaction;

pub use compact_size::{decode_compact_size, encode_compact_size};
pub use transaction::{
    decode_transaction, encode_transaction, encode_transaction_with_witness, txid, wtxid,
};

use crate::error::DecodeError;

/// Cursor over an input buffer shared by the wire decoders.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i64_le(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub(crate) fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub(crate) fn read_hash(&mut self) -> Result<crate::types::Hash, DecodeError> {
        let bytes = self.take(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Ok(hash)
    }

    /// Read a compact-size count and bound it by what the remaining input
    /// could possibly hold, so a hostile count cannot drive allocation.
    pub(crate) fn read_count(&mut self, min_item_size: usize) -> Result<usize, DecodeError> {
        let count = compact_size::read_compact_size(self)?;
        let cap = (self.remaining() / min_item_size.max(1)) as u64;
        if count > cap {
            return Err(DecodeError::OversizedCount(count));
        }
        Ok(count as usize)
    }
}
