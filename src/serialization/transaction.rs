//! Transaction wire format
//!
//! Two serialized forms exist. The legacy form:
//!
//! ```text
//! version(4) || count(inputs) || inputs || count(outputs) || outputs || locktime(4)
//! ```
//!
//! and the segwit form (BIP144), identified by a zero marker byte where the
//! input count would otherwise start:
//!
//! ```text
//! version(4) || 0x00 || 0x01 || count(inputs) || inputs || count(outputs)
//!            || outputs || witnesses || locktime(4)
//! ```
//!
//! The txid commits to the legacy form only; the wtxid commits to the segwit
//! form whenever any input carries a witness.

use super::compact_size::write_compact_size;
use super::Reader;
use crate::crypto::sha256d;
use crate::error::DecodeError;
use crate::types::{Hash, OutPoint, Transaction, TransactionInput, TransactionOutput, Witness};

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

/// Minimum serialized input size: outpoint(36) + empty script(1) + sequence(4)
const MIN_INPUT_SIZE: usize = 41;

/// Minimum serialized output size: value(8) + empty script(1)
const MIN_OUTPUT_SIZE: usize = 9;

/// Serialize a transaction in the legacy (witness-stripped) form.
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(estimated_size(tx, false));
    out.extend_from_slice(&tx.version.to_le_bytes());
    write_inputs(&mut out, tx);
    write_outputs(&mut out, tx);
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
    out
}

/// Serialize a transaction in the segwit marker/flag form.
///
/// Falls back to the legacy form when no input carries a witness, matching
/// how the network serializes such transactions.
pub fn encode_transaction_with_witness(tx: &Transaction) -> Vec<u8> {
    if !tx.has_witness() {
        return encode_transaction(tx);
    }

    let mut out = Vec::with_capacity(estimated_size(tx, true));
    out.extend_from_slice(&tx.version.to_le_bytes());
    out.push(SEGWIT_MARKER);
    out.push(SEGWIT_FLAG);
    write_inputs(&mut out, tx);
    write_outputs(&mut out, tx);
    for input in &tx.inputs {
        write_witness(&mut out, &input.witness);
    }
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
    out
}

/// Decode a transaction from either wire form.
///
/// The segwit form is detected by the zero marker byte; a legal legacy
/// transaction cannot start its input count with 0x00 because empty input
/// lists only occur in the marker position.
pub fn decode_transaction(data: &[u8]) -> Result<Transaction, DecodeError> {
    let mut reader = Reader::new(data);

    let version = reader.read_i32_le()?;

    let mut segwit = false;
    let input_count = {
        let count = reader.read_count(MIN_INPUT_SIZE)?;
        if count == 0 {
            let flag = reader.read_u8()?;
            if flag != SEGWIT_FLAG {
                return Err(DecodeError::InvalidSegwitFlag(flag));
            }
            segwit = true;
            reader.read_count(MIN_INPUT_SIZE)?
        } else {
            count
        }
    };

    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        inputs.push(read_input(&mut reader)?);
    }

    let output_count = reader.read_count(MIN_OUTPUT_SIZE)?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(read_output(&mut reader)?);
    }

    if segwit {
        let mut any = false;
        for input in &mut inputs {
            input.witness = read_witness(&mut reader)?;
            any |= !input.witness.is_empty();
        }
        // A segwit serialization in which every witness is empty re-encodes
        // to the legacy form, breaking round-trip identity.
        if !any {
            return Err(DecodeError::EmptySegwitWitness);
        }
    }

    let lock_time = reader.read_u32_le()?;

    if reader.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
    })
}

/// Transaction ID: double-SHA256 of the legacy form.
///
/// Witness data never contributes, so witness mutation cannot change a txid.
pub fn txid(tx: &Transaction) -> Hash {
    sha256d(&encode_transaction(tx))
}

/// Witness transaction ID: double-SHA256 of the segwit form.
///
/// Equals the txid when no input carries a witness.
pub fn wtxid(tx: &Transaction) -> Hash {
    sha256d(&encode_transaction_with_witness(tx))
}

/// Serialized size of a witness stack, including its count prefix.
pub fn witness_serialized_size(witness: &Witness) -> usize {
    let mut size = super::compact_size::compact_size_len(witness.len() as u64);
    for element in witness {
        size += super::compact_size::compact_size_len(element.len() as u64) + element.len();
    }
    size
}

fn write_inputs(out: &mut Vec<u8>, tx: &Transaction) {
    write_compact_size(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        out.extend_from_slice(&input.prevout.hash);
        out.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_compact_size(out, input.script_sig.len() as u64);
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
}

fn write_outputs(out: &mut Vec<u8>, tx: &Transaction) {
    write_compact_size(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        write_compact_size(out, output.script_pubkey.len() as u64);
        out.extend_from_slice(&output.script_pubkey);
    }
}

fn write_witness(out: &mut Vec<u8>, witness: &Witness) {
    write_compact_size(out, witness.len() as u64);
    for element in witness {
        write_compact_size(out, element.len() as u64);
        out.extend_from_slice(element);
    }
}

fn read_input(reader: &mut Reader<'_>) -> Result<TransactionInput, DecodeError> {
    let hash = reader.read_hash()?;
    let index = reader.read_u32_le()?;
    let script_len = reader.read_count(1)?;
    let script_sig = reader.take(script_len)?.to_vec();
    let sequence = reader.read_u32_le()?;
    Ok(TransactionInput {
        prevout: OutPoint { hash, index },
        script_sig,
        sequence,
        witness: Vec::new(),
    })
}

fn read_output(reader: &mut Reader<'_>) -> Result<TransactionOutput, DecodeError> {
    let value = reader.read_i64_le()?;
    let script_len = reader.read_count(1)?;
    let script_pubkey = reader.take(script_len)?.to_vec();
    Ok(TransactionOutput {
        value,
        script_pubkey,
    })
}

fn read_witness(reader: &mut Reader<'_>) -> Result<Witness, DecodeError> {
    let count = reader.read_count(1)?;
    let mut witness = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_count(1)?;
        witness.push(reader.take(len)?.to_vec());
    }
    Ok(witness)
}

fn estimated_size(tx: &Transaction, with_witness: bool) -> usize {
    let mut size = 4 + 1 + 1 + 4;
    for input in &tx.inputs {
        size += 41 + input.script_sig.len();
        if with_witness {
            size += witness_serialized_size(&input.witness);
        }
    }
    for output in &tx.outputs {
        size += 9 + output.script_pubkey.len();
    }
    if with_witness {
        size += 2;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TransactionInput {
                prevout: OutPoint {
                    hash: [0xab; 32],
                    index: 1,
                },
                script_sig: vec![0x51],
                sequence: 0xffff_fffe,
                witness: vec![],
            }],
            outputs: vec![TransactionOutput {
                value: 50_000,
                script_pubkey: vec![0x00, 0x14, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
                    0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn test_legacy_round_trip() {
        let tx = sample_tx();
        let encoded = encode_transaction(&tx);
        let decoded = decode_transaction(&encoded).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_segwit_round_trip() {
        let mut tx = sample_tx();
        tx.inputs[0].witness = vec![vec![0x01; 71], vec![0x02; 33]];
        let encoded = encode_transaction_with_witness(&tx);
        assert_eq!(encoded[4], 0x00);
        assert_eq!(encoded[5], 0x01);
        let decoded = decode_transaction(&encoded).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_witnessless_tx_serializes_legacy() {
        let tx = sample_tx();
        assert_eq!(encode_transaction_with_witness(&tx), encode_transaction(&tx));
        assert_eq!(txid(&tx), wtxid(&tx));
    }

    #[test]
    fn test_txid_ignores_witness() {
        let stripped = sample_tx();
        let mut with_witness = stripped.clone();
        with_witness.inputs[0].witness = vec![vec![0xaa; 64]];
        assert_eq!(txid(&stripped), txid(&with_witness));
        assert_ne!(wtxid(&stripped), wtxid(&with_witness));
    }

    #[test]
    fn test_invalid_segwit_flag() {
        let mut tx = sample_tx();
        tx.inputs[0].witness = vec![vec![0x01]];
        let mut encoded = encode_transaction_with_witness(&tx);
        encoded[5] = 0x02;
        assert_eq!(
            decode_transaction(&encoded),
            Err(DecodeError::InvalidSegwitFlag(0x02))
        );
    }

    #[test]
    fn test_truncated_input_rejected() {
        let encoded = encode_transaction(&sample_tx());
        for len in 0..encoded.len() {
            assert!(decode_transaction(&encoded[..len]).is_err());
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode_transaction(&sample_tx());
        encoded.push(0x00);
        assert_eq!(decode_transaction(&encoded), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_hostile_count_rejected_before_allocation() {
        // version + a count claiming ~4 billion inputs in a 10-byte buffer
        let mut data = vec![0x01, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0xfe, 0xff, 0xff, 0xff, 0xff]);
        data.push(0x00);
        assert!(matches!(
            decode_transaction(&data),
            Err(DecodeError::OversizedCount(_))
        ));
    }

    #[test]
    fn test_witness_serialized_size() {
        let witness: Witness = vec![vec![0x01; 71], vec![0x02; 33]];
        assert_eq!(witness_serialized_size(&witness), 1 + 1 + 71 + 1 + 33);
        assert_eq!(witness_serialized_size(&Vec::new()), 1);
    }
}
