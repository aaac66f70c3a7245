//! Taproot commitments (BIP341)
//!
//! Script-path spends reveal a leaf script and a control block; the control
//! block carries the leaf version, the output-key parity, the internal key,
//! and the Merkle path from the leaf to the committed root. Verification
//! recomputes the root, tweaks the internal key by the tagged commitment,
//! and compares against the 32-byte witness program.

use secp256k1::Parity;

use crate::constants::{
    TAPROOT_CONTROL_BASE_SIZE, TAPROOT_CONTROL_MAX_SIZE, TAPROOT_CONTROL_NODE_SIZE,
    TAPROOT_LEAF_MASK,
};
use crate::crypto::{tweak_x_only_key, TaggedHasher};
use crate::error::ScriptError;
use crate::serialization::compact_size::write_compact_size;
use crate::types::Hash;

/// Parsed taproot control block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock<'a> {
    pub leaf_version: u8,
    pub output_parity: Parity,
    pub internal_key: [u8; 32],
    merkle_path: &'a [u8],
}

impl<'a> ControlBlock<'a> {
    /// Parse the last witness element of a script-path spend.
    ///
    /// Size must be 33 + 32m for a path depth m of at most 128.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ScriptError> {
        if bytes.len() < TAPROOT_CONTROL_BASE_SIZE
            || bytes.len() > TAPROOT_CONTROL_MAX_SIZE
            || (bytes.len() - TAPROOT_CONTROL_BASE_SIZE) % TAPROOT_CONTROL_NODE_SIZE != 0
        {
            return Err(ScriptError::TaprootControlBlockInvalid);
        }
        let mut internal_key = [0u8; 32];
        internal_key.copy_from_slice(&bytes[1..33]);
        Ok(ControlBlock {
            leaf_version: bytes[0] & TAPROOT_LEAF_MASK,
            output_parity: if bytes[0] & 0x01 == 0 {
                Parity::Even
            } else {
                Parity::Odd
            },
            internal_key,
            merkle_path: &bytes[TAPROOT_CONTROL_BASE_SIZE..],
        })
    }

    /// Merkle path depth
    pub fn path_len(&self) -> usize {
        self.merkle_path.len() / TAPROOT_CONTROL_NODE_SIZE
    }

    /// Walk the Merkle path from a leaf hash to the root.
    pub fn merkle_root(&self, tapleaf_hash: &Hash) -> Hash {
        let mut node = *tapleaf_hash;
        for step in self.merkle_path.chunks_exact(TAPROOT_CONTROL_NODE_SIZE) {
            let mut sibling = [0u8; 32];
            sibling.copy_from_slice(step);
            node = tap_branch_hash(&node, &sibling);
        }
        node
    }

    /// Check that this control block commits to `program` (the 32-byte
    /// witness program, i.e. the x-only output key) for the given leaf.
    pub fn verifies_commitment(&self, program: &[u8; 32], tapleaf_hash: &Hash) -> bool {
        let merkle_root = self.merkle_root(tapleaf_hash);
        match tweak_x_only_key(&self.internal_key, Some(&merkle_root)) {
            Ok((output_key, parity)) => output_key == *program && parity == self.output_parity,
            Err(_) => false,
        }
    }
}

/// Tagged hash of a leaf script under its leaf version.
pub fn tap_leaf_hash(leaf_version: u8, script: &[u8]) -> Hash {
    let mut hasher = TaggedHasher::new("TapLeaf");
    hasher.update(&[leaf_version]);
    let mut prefixed = Vec::with_capacity(script.len() + 3);
    write_compact_size(&mut prefixed, script.len() as u64);
    prefixed.extend_from_slice(script);
    hasher.update(&prefixed);
    hasher.finalize()
}

/// Tagged hash of an inner tree node; children sort lexicographically so a
/// path needs no left/right flags.
pub fn tap_branch_hash(a: &Hash, b: &Hash) -> Hash {
    let mut hasher = TaggedHasher::new("TapBranch");
    if a <= b {
        hasher.update(a);
        hasher.update(b);
    } else {
        hasher.update(b);
        hasher.update(a);
    }
    hasher.finalize()
}
