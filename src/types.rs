//! Core transaction and script types

use serde::{Deserialize, Serialize};

/// 256-bit hash, stored internal byte order
pub type Hash = [u8; 32];

/// Raw byte string
pub type ByteString = Vec<u8>;

/// Witness: ordered list of byte strings carried outside the txid commitment.
///
/// An empty list means the input has no witness.
pub type Witness = Vec<ByteString>;

/// Reference to a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

/// Transaction input: outpoint, unlock script, sequence, optional witness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
    #[serde(default)]
    pub witness: Witness,
}

/// Transaction output: value in satoshis and lock script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: ByteString,
}

/// Transaction: version, inputs, outputs, lock time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// True if any input carries a witness
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }
}

/// Consensus dialect a script is evaluated under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptVersion {
    /// Pre-segwit scripts and P2SH redeem scripts
    Legacy,
    /// BIP141 witness program scripts (P2WPKH implicit script, P2WSH script)
    WitnessV0,
    /// BIP341 taproot key-path (no script is executed at this version)
    WitnessV1,
    /// BIP342 leaf scripts revealed in a taproot script path
    Tapscript,
}

/// A script: immutable bytes plus the dialect they execute under.
///
/// The raw bytes are what hashes and signatures commit to; decoding into
/// operations happens on demand and must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    bytes: ByteString,
    version: ScriptVersion,
}

impl Script {
    pub fn new(bytes: ByteString, version: ScriptVersion) -> Self {
        Script { bytes, version }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn version(&self) -> ScriptVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> ByteString {
        self.bytes
    }
}
