//! Script template classification
//!
//! Recognition is structural over the serialized byte form, because the
//! byte form is what hashes commit to. A script that decodes to the same
//! operations through a different encoding is a different script.

use crate::opcodes::*;
use crate::types::ByteString;

/// The standard locking-script templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// `<pubkey> CHECKSIG`
    PayToPubkey { pubkey: ByteString },
    /// `DUP HASH160 <20> EQUALVERIFY CHECKSIG`
    PayToPubkeyHash { pubkey_hash: [u8; 20] },
    /// `HASH160 <20> EQUAL`
    PayToScriptHash { script_hash: [u8; 20] },
    /// `OP_0 <20>`
    PayToWitnessPubkeyHash { pubkey_hash: [u8; 20] },
    /// `OP_0 <32>`
    PayToWitnessScriptHash { script_hash: [u8; 32] },
    /// `OP_1 <32>`
    PayToTaproot { output_key: [u8; 32] },
    /// `OP_m <pk1> ... <pkn> OP_n CHECKMULTISIG`
    Multisig {
        required: usize,
        pubkeys: Vec<ByteString>,
    },
    /// `RETURN ...`, the provably unspendable data carrier
    NullData,
    /// Anything else
    NonStandard,
}

/// Classify a locking script by byte pattern.
pub fn classify(script: &[u8]) -> ScriptTemplate {
    if let Some(pubkey_hash) = match_p2pkh(script) {
        return ScriptTemplate::PayToPubkeyHash { pubkey_hash };
    }
    if let Some(script_hash) = match_p2sh(script) {
        return ScriptTemplate::PayToScriptHash { script_hash };
    }
    if let Some(pubkey_hash) = match_witness_program_20(script) {
        return ScriptTemplate::PayToWitnessPubkeyHash { pubkey_hash };
    }
    if let Some(script_hash) = match_witness_program_32(script, OP_0) {
        return ScriptTemplate::PayToWitnessScriptHash { script_hash };
    }
    if let Some(output_key) = match_witness_program_32(script, OP_1) {
        return ScriptTemplate::PayToTaproot { output_key };
    }
    if let Some(pubkey) = match_p2pk(script) {
        return ScriptTemplate::PayToPubkey { pubkey };
    }
    if let Some((required, pubkeys)) = match_multisig(script) {
        return ScriptTemplate::Multisig { required, pubkeys };
    }
    if script.first() == Some(&OP_RETURN) {
        return ScriptTemplate::NullData;
    }
    ScriptTemplate::NonStandard
}

/// `HASH160 <20-byte hash> EQUAL`, the P2SH consensus pattern (BIP16).
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Witness program: a version opcode (OP_0 or OP_1..OP_16) followed by a
/// single direct push of 2 to 40 bytes (BIP141). Returns (version, program).
pub fn parse_witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_N_BASE,
        _ => return None,
    };
    let push_len = script[1] as usize;
    if !(2..=40).contains(&push_len) || script.len() != push_len + 2 {
        return None;
    }
    Some((version, &script[2..]))
}

fn match_p2pkh(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[3..23]);
        return Some(hash);
    }
    None
}

fn match_p2sh(script: &[u8]) -> Option<[u8; 20]> {
    if is_pay_to_script_hash(script) {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[2..22]);
        return Some(hash);
    }
    None
}

fn match_witness_program_20(script: &[u8]) -> Option<[u8; 20]> {
    if script.len() == 22 && script[0] == OP_0 && script[1] == 0x14 {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&script[2..]);
        return Some(hash);
    }
    None
}

fn match_witness_program_32(script: &[u8], version_op: u8) -> Option<[u8; 32]> {
    if script.len() == 34 && script[0] == version_op && script[1] == 0x20 {
        let mut program = [0u8; 32];
        program.copy_from_slice(&script[2..]);
        return Some(program);
    }
    None
}

fn match_p2pk(script: &[u8]) -> Option<ByteString> {
    let (key_len, total) = match script.first()? {
        0x21 => (33usize, 35usize),
        0x41 => (65, 67),
        _ => return None,
    };
    if script.len() == total && script[total - 1] == OP_CHECKSIG {
        let pubkey = &script[1..1 + key_len];
        // 33-byte keys start 0x02/0x03, 65-byte keys 0x04
        let valid_prefix = match key_len {
            33 => pubkey[0] == 0x02 || pubkey[0] == 0x03,
            _ => pubkey[0] == 0x04,
        };
        if valid_prefix {
            return Some(pubkey.to_vec());
        }
    }
    None
}

fn match_multisig(script: &[u8]) -> Option<(usize, Vec<ByteString>)> {
    if script.len() < 3 || *script.last()? != OP_CHECKMULTISIG {
        return None;
    }
    let required = small_constant(script[0])?;
    let total = small_constant(script[script.len() - 2])?;
    if required == 0 || required > total || total > 20 {
        return None;
    }

    let mut pubkeys = Vec::with_capacity(total);
    let mut pos = 1;
    for _ in 0..total {
        let key_len = *script.get(pos)? as usize;
        if key_len != 33 && key_len != 65 {
            return None;
        }
        let key = script.get(pos + 1..pos + 1 + key_len)?;
        pubkeys.push(key.to_vec());
        pos += 1 + key_len;
    }
    // Exactly the count opcode and CHECKMULTISIG may remain
    if pos + 2 != script.len() {
        return None;
    }
    Some((required, pubkeys))
}

fn small_constant(opcode: u8) -> Option<usize> {
    match opcode {
        OP_1..=OP_16 => Some((opcode - OP_N_BASE) as usize),
        _ => None,
    }
}
