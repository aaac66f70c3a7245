//! Signature-hash construction
//!
//! Computes the digest an input commits to, selected by signature version:
//! the legacy scratch-transaction scheme, the BIP143 witness v0 layout, and
//! the BIP341 tagged-hash message for taproot. The per-transaction midstate
//! digests are cached; they depend only on the transaction and the previous
//! outputs, both of which are borrowed immutably for the cache's lifetime.

use crate::crypto::{sha256, sha256d, TaggedHasher};
use crate::error::ScriptError;
use crate::serialization::compact_size::write_compact_size;
use crate::types::{Hash, Transaction, TransactionOutput};

/// Commit to all inputs and outputs
pub const SIGHASH_ALL: u8 = 0x01;
/// Commit to no outputs
pub const SIGHASH_NONE: u8 = 0x02;
/// Commit only to the output paired with this input
pub const SIGHASH_SINGLE: u8 = 0x03;
/// Commit only to this input (modifier bit)
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;
/// Taproot only: unnamed type byte, semantics of ALL
pub const SIGHASH_DEFAULT: u8 = 0x00;

/// A signature-hash type byte.
///
/// The low five bits select the output commitment mode; bit 0x80 restricts
/// the input commitment to the signing input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType(pub u8);

impl SighashType {
    pub fn from_byte(byte: u8) -> Self {
        SighashType(byte)
    }

    /// Output selection mode (low five bits)
    pub fn base(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_anyonecanpay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }

    pub fn is_none(self) -> bool {
        self.base() == SIGHASH_NONE
    }

    pub fn is_single(self) -> bool {
        self.base() == SIGHASH_SINGLE
    }

    /// Taproot's omitted-byte form
    pub fn is_default(self) -> bool {
        self.0 == SIGHASH_DEFAULT
    }

    pub fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// Taproot accepts exactly {0x00, 0x01, 0x02, 0x03, 0x81, 0x82, 0x83}
    pub fn is_valid_taproot(self) -> bool {
        matches!(self.0, 0x00..=0x03 | 0x81..=0x83)
    }
}

/// Script-path data folded into a BIP341 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapScriptPath {
    /// Tagged hash of the executed leaf
    pub tapleaf_hash: Hash,
    /// Byte offset of the last executed CODESEPARATOR, or 0xffff_ffff
    pub code_separator_pos: u32,
}

impl TapScriptPath {
    pub fn new(tapleaf_hash: Hash, code_separator_pos: Option<u32>) -> Self {
        TapScriptPath {
            tapleaf_hash,
            code_separator_pos: code_separator_pos.unwrap_or(0xffff_ffff),
        }
    }
}

struct CommonDigests {
    prevouts: Hash,
    sequences: Hash,
    outputs: Hash,
}

struct SegwitDigests {
    prevouts: Hash,
    sequences: Hash,
    outputs: Hash,
}

struct TaprootDigests {
    amounts: Hash,
    script_pubkeys: Hash,
}

/// Sighash engine bound to one transaction and its previous outputs.
///
/// Midstate digests are computed on first use and reused for every input.
/// The borrow ties the cache's validity to the transaction not changing.
pub struct SighashCache<'a> {
    tx: &'a Transaction,
    prevouts: &'a [TransactionOutput],
    common: Option<CommonDigests>,
    segwit: Option<SegwitDigests>,
    taproot: Option<TaprootDigests>,
}

impl<'a> SighashCache<'a> {
    pub fn new(tx: &'a Transaction, prevouts: &'a [TransactionOutput]) -> Self {
        SighashCache {
            tx,
            prevouts,
            common: None,
            segwit: None,
            taproot: None,
        }
    }

    /// Legacy signature hash over a scratch transaction.
    ///
    /// `script_code` is the caller-prepared script (code-separator suffix,
    /// signature occurrences already handled). A SIGHASH_SINGLE whose input
    /// index has no matching output hashes to the historical sentinel
    /// `0x01` followed by zeros instead of failing.
    pub fn legacy_signature_hash(
        &self,
        input_index: usize,
        script_code: &[u8],
        sighash_type: SighashType,
    ) -> Result<Hash, ScriptError> {
        if input_index >= self.tx.inputs.len() {
            return Err(ScriptError::InvalidSignature);
        }

        if sighash_type.is_single() && input_index >= self.tx.outputs.len() {
            let mut sentinel = [0u8; 32];
            sentinel[0] = 0x01;
            return Ok(sentinel);
        }

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.tx.version.to_le_bytes());

        // Inputs: all with blanked scripts, or just ours under ANYONECANPAY
        if sighash_type.is_anyonecanpay() {
            write_compact_size(&mut buf, 1);
            self.write_legacy_input(&mut buf, input_index, script_code, sighash_type, input_index);
        } else {
            write_compact_size(&mut buf, self.tx.inputs.len() as u64);
            for index in 0..self.tx.inputs.len() {
                self.write_legacy_input(&mut buf, index, script_code, sighash_type, input_index);
            }
        }

        // Outputs per mode: all, none, or nulled up to ours
        if sighash_type.is_none() {
            write_compact_size(&mut buf, 0);
        } else if sighash_type.is_single() {
            write_compact_size(&mut buf, input_index as u64 + 1);
            // Outputs before ours are replaced by null outputs: maximal
            // value, empty script
            for _ in 0..input_index {
                buf.extend_from_slice(&(-1i64).to_le_bytes());
                write_compact_size(&mut buf, 0);
            }
            write_output(&mut buf, &self.tx.outputs[input_index]);
        } else {
            write_compact_size(&mut buf, self.tx.outputs.len() as u64);
            for output in &self.tx.outputs {
                write_output(&mut buf, output);
            }
        }

        buf.extend_from_slice(&self.tx.lock_time.to_le_bytes());
        buf.extend_from_slice(&sighash_type.as_u32().to_le_bytes());
        Ok(sha256d(&buf))
    }

    /// BIP143 signature hash for witness v0 inputs.
    pub fn segwit_v0_signature_hash(
        &mut self,
        input_index: usize,
        script_code: &[u8],
        amount: i64,
        sighash_type: SighashType,
    ) -> Result<Hash, ScriptError> {
        if input_index >= self.tx.inputs.len() {
            return Err(ScriptError::InvalidSignature);
        }
        let input = &self.tx.inputs[input_index];

        let zero = [0u8; 32];
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.tx.version.to_le_bytes());

        if sighash_type.is_anyonecanpay() {
            buf.extend_from_slice(&zero);
        } else {
            buf.extend_from_slice(&self.segwit_digests().prevouts);
        }

        if sighash_type.is_anyonecanpay() || sighash_type.is_single() || sighash_type.is_none() {
            buf.extend_from_slice(&zero);
        } else {
            buf.extend_from_slice(&self.segwit_digests().sequences);
        }

        buf.extend_from_slice(&input.prevout.hash);
        buf.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_compact_size(&mut buf, script_code.len() as u64);
        buf.extend_from_slice(script_code);
        buf.extend_from_slice(&amount.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());

        if sighash_type.is_single() {
            if input_index < self.tx.outputs.len() {
                let mut single = Vec::with_capacity(64);
                write_output(&mut single, &self.tx.outputs[input_index]);
                buf.extend_from_slice(&sha256d(&single));
            } else {
                buf.extend_from_slice(&zero);
            }
        } else if sighash_type.is_none() {
            buf.extend_from_slice(&zero);
        } else {
            buf.extend_from_slice(&self.segwit_digests().outputs);
        }

        buf.extend_from_slice(&self.tx.lock_time.to_le_bytes());
        buf.extend_from_slice(&sighash_type.as_u32().to_le_bytes());
        Ok(sha256d(&buf))
    }

    /// BIP341 signature hash for taproot inputs, key path or script path.
    ///
    /// Requires a previous output for every input; the amounts and scripts
    /// of all spent outputs are part of the message.
    pub fn taproot_signature_hash(
        &mut self,
        input_index: usize,
        sighash_type: SighashType,
        annex: Option<&[u8]>,
        script_path: Option<TapScriptPath>,
    ) -> Result<Hash, ScriptError> {
        if !sighash_type.is_valid_taproot() {
            return Err(ScriptError::SignatureHashTypeInvalid);
        }
        if input_index >= self.tx.inputs.len() || self.prevouts.len() != self.tx.inputs.len() {
            return Err(ScriptError::InvalidSignature);
        }
        let input = &self.tx.inputs[input_index];

        let mut hasher = TaggedHasher::new("TapSighash");
        // Epoch
        hasher.update(&[0x00]);
        hasher.update(&[sighash_type.0]);
        hasher.update(&self.tx.version.to_le_bytes());
        hasher.update(&self.tx.lock_time.to_le_bytes());

        if !sighash_type.is_anyonecanpay() {
            let common_prevouts = self.common_digests().prevouts;
            let common_sequences = self.common_digests().sequences;
            let taproot = self.taproot_digests();
            let (amounts, script_pubkeys) = (taproot.amounts, taproot.script_pubkeys);
            hasher.update(&common_prevouts);
            hasher.update(&amounts);
            hasher.update(&script_pubkeys);
            hasher.update(&common_sequences);
        }

        if !sighash_type.is_none() && !sighash_type.is_single() {
            hasher.update(&self.common_digests().outputs);
        }

        let mut spend_type = 0u8;
        if annex.is_some() {
            spend_type |= 1;
        }
        if script_path.is_some() {
            spend_type |= 2;
        }
        hasher.update(&[spend_type]);

        if sighash_type.is_anyonecanpay() {
            hasher.update(&input.prevout.hash);
            hasher.update(&input.prevout.index.to_le_bytes());
            let prevout = &self.prevouts[input_index];
            hasher.update(&prevout.value.to_le_bytes());
            let mut script = Vec::with_capacity(prevout.script_pubkey.len() + 1);
            write_compact_size(&mut script, prevout.script_pubkey.len() as u64);
            script.extend_from_slice(&prevout.script_pubkey);
            hasher.update(&script);
            hasher.update(&input.sequence.to_le_bytes());
        } else {
            hasher.update(&(input_index as u32).to_le_bytes());
        }

        if let Some(annex) = annex {
            let mut prefixed = Vec::with_capacity(annex.len() + 3);
            write_compact_size(&mut prefixed, annex.len() as u64);
            prefixed.extend_from_slice(annex);
            hasher.update(&sha256(&prefixed));
        }

        if sighash_type.is_single() {
            let output = self
                .tx
                .outputs
                .get(input_index)
                .ok_or(ScriptError::SignatureHashTypeInvalid)?;
            let mut single = Vec::with_capacity(64);
            write_output(&mut single, output);
            hasher.update(&sha256(&single));
        }

        if let Some(path) = script_path {
            hasher.update(&path.tapleaf_hash);
            // Key version
            hasher.update(&[0x00]);
            hasher.update(&path.code_separator_pos.to_le_bytes());
        }

        Ok(hasher.finalize())
    }

    fn write_legacy_input(
        &self,
        buf: &mut Vec<u8>,
        index: usize,
        script_code: &[u8],
        sighash_type: SighashType,
        signing_index: usize,
    ) {
        let input = &self.tx.inputs[index];
        buf.extend_from_slice(&input.prevout.hash);
        buf.extend_from_slice(&input.prevout.index.to_le_bytes());
        if index == signing_index {
            write_compact_size(buf, script_code.len() as u64);
            buf.extend_from_slice(script_code);
        } else {
            write_compact_size(buf, 0);
        }
        // Other inputs' sequences are zeroed under NONE and SINGLE so they
        // stay mutable after signing
        let sequence = if index != signing_index
            && (sighash_type.is_none() || sighash_type.is_single())
        {
            0
        } else {
            input.sequence
        };
        buf.extend_from_slice(&sequence.to_le_bytes());
    }

    fn common_digests(&mut self) -> &CommonDigests {
        let tx = self.tx;
        self.common.get_or_insert_with(|| {
            let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
            let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
            for input in &tx.inputs {
                prevouts.extend_from_slice(&input.prevout.hash);
                prevouts.extend_from_slice(&input.prevout.index.to_le_bytes());
                sequences.extend_from_slice(&input.sequence.to_le_bytes());
            }
            let mut outputs = Vec::with_capacity(tx.outputs.len() * 34);
            for output in &tx.outputs {
                write_output(&mut outputs, output);
            }
            CommonDigests {
                prevouts: sha256(&prevouts),
                sequences: sha256(&sequences),
                outputs: sha256(&outputs),
            }
        })
    }

    fn segwit_digests(&mut self) -> &SegwitDigests {
        // The v0 digests are the double-SHA256 closures of the common ones
        let common = {
            let digests = self.common_digests();
            (digests.prevouts, digests.sequences, digests.outputs)
        };
        self.segwit.get_or_insert_with(|| SegwitDigests {
            prevouts: sha256(&common.0),
            sequences: sha256(&common.1),
            outputs: sha256(&common.2),
        })
    }

    fn taproot_digests(&mut self) -> &TaprootDigests {
        let prevouts = self.prevouts;
        self.taproot.get_or_insert_with(|| {
            let mut amounts = Vec::with_capacity(prevouts.len() * 8);
            let mut scripts = Vec::new();
            for prevout in prevouts {
                amounts.extend_from_slice(&prevout.value.to_le_bytes());
                write_compact_size(&mut scripts, prevout.script_pubkey.len() as u64);
                scripts.extend_from_slice(&prevout.script_pubkey);
            }
            TaprootDigests {
                amounts: sha256(&amounts),
                script_pubkeys: sha256(&scripts),
            }
        })
    }
}

fn write_output(buf: &mut Vec<u8>, output: &TransactionOutput) {
    buf.extend_from_slice(&output.value.to_le_bytes());
    write_compact_size(buf, output.script_pubkey.len() as u64);
    buf.extend_from_slice(&output.script_pubkey);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TransactionInput};

    fn two_input_tx() -> (Transaction, Vec<TransactionOutput>) {
        let tx = Transaction {
            version: 1,
            inputs: vec![
                TransactionInput {
                    prevout: OutPoint {
                        hash: [0x11; 32],
                        index: 0,
                    },
                    script_sig: vec![],
                    sequence: 0xffff_ffff,
                    witness: vec![],
                },
                TransactionInput {
                    prevout: OutPoint {
                        hash: [0x22; 32],
                        index: 1,
                    },
                    script_sig: vec![],
                    sequence: 0xffff_fffe,
                    witness: vec![],
                },
            ],
            outputs: vec![TransactionOutput {
                value: 90_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        };
        let prevouts = vec![
            TransactionOutput {
                value: 50_000,
                script_pubkey: vec![0x51],
            },
            TransactionOutput {
                value: 50_000,
                script_pubkey: vec![0x51],
            },
        ];
        (tx, prevouts)
    }

    #[test]
    fn test_sighash_type_bits() {
        let all_acp = SighashType(0x81);
        assert_eq!(all_acp.base(), SIGHASH_ALL);
        assert!(all_acp.is_anyonecanpay());
        assert!(!all_acp.is_single());

        assert!(SighashType(0x00).is_default());
        assert!(SighashType(0x00).is_valid_taproot());
        assert!(SighashType(0x83).is_valid_taproot());
        assert!(!SighashType(0x04).is_valid_taproot());
        assert!(!SighashType(0x41).is_valid_taproot());
    }

    #[test]
    fn test_single_out_of_range_sentinel() {
        let (tx, prevouts) = two_input_tx();
        let cache = SighashCache::new(&tx, &prevouts);
        let hash = cache
            .legacy_signature_hash(1, &[0x51], SighashType(SIGHASH_SINGLE))
            .unwrap();
        let mut sentinel = [0u8; 32];
        sentinel[0] = 0x01;
        assert_eq!(hash, sentinel);
    }

    #[test]
    fn test_legacy_deterministic_and_type_sensitive() {
        let (tx, prevouts) = two_input_tx();
        let cache = SighashCache::new(&tx, &prevouts);
        let all = cache
            .legacy_signature_hash(0, &[0x51], SighashType(SIGHASH_ALL))
            .unwrap();
        let again = cache
            .legacy_signature_hash(0, &[0x51], SighashType(SIGHASH_ALL))
            .unwrap();
        let none = cache
            .legacy_signature_hash(0, &[0x51], SighashType(SIGHASH_NONE))
            .unwrap();
        let acp = cache
            .legacy_signature_hash(0, &[0x51], SighashType(SIGHASH_ALL | SIGHASH_ANYONECANPAY))
            .unwrap();
        assert_eq!(all, again);
        assert_ne!(all, none);
        assert_ne!(all, acp);
    }

    #[test]
    fn test_segwit_v0_amount_commitment() {
        let (tx, prevouts) = two_input_tx();
        let mut cache = SighashCache::new(&tx, &prevouts);
        let a = cache
            .segwit_v0_signature_hash(0, &[0x51], 50_000, SighashType(SIGHASH_ALL))
            .unwrap();
        let b = cache
            .segwit_v0_signature_hash(0, &[0x51], 50_001, SighashType(SIGHASH_ALL))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_taproot_rejects_invalid_type() {
        let (tx, prevouts) = two_input_tx();
        let mut cache = SighashCache::new(&tx, &prevouts);
        assert_eq!(
            cache.taproot_signature_hash(0, SighashType(0x04), None, None),
            Err(ScriptError::SignatureHashTypeInvalid)
        );
    }

    #[test]
    fn test_taproot_single_without_output() {
        let (tx, prevouts) = two_input_tx();
        let mut cache = SighashCache::new(&tx, &prevouts);
        assert_eq!(
            cache.taproot_signature_hash(1, SighashType(SIGHASH_SINGLE), None, None),
            Err(ScriptError::SignatureHashTypeInvalid)
        );
    }

    #[test]
    fn test_taproot_annex_and_path_change_digest() {
        let (tx, prevouts) = two_input_tx();
        let mut cache = SighashCache::new(&tx, &prevouts);
        let key_path = cache
            .taproot_signature_hash(0, SighashType(SIGHASH_DEFAULT), None, None)
            .unwrap();
        let with_annex = cache
            .taproot_signature_hash(0, SighashType(SIGHASH_DEFAULT), Some(&[0x50]), None)
            .unwrap();
        let script_path = cache
            .taproot_signature_hash(
                0,
                SighashType(SIGHASH_DEFAULT),
                None,
                Some(TapScriptPath::new([0xab; 32], None)),
            )
            .unwrap();
        assert_ne!(key_path, with_annex);
        assert_ne!(key_path, script_path);
        assert_ne!(with_annex, script_path);
    }
}
