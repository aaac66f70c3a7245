//! Wire-format round-trip properties
//!
//! decode(encode(tx)) must reproduce the transaction exactly in both the
//! legacy and segwit forms, the txid must ignore witness data, and hostile
//! byte strings must produce typed failures rather than panics.

use proptest::prelude::*;

use txscript::serialization::{
    decode_transaction, encode_transaction, encode_transaction_with_witness, txid, wtxid,
};
use txscript::types::{OutPoint, Transaction, TransactionInput, TransactionOutput};

fn arb_outpoint() -> impl Strategy<Value = OutPoint> {
    (any::<[u8; 32]>(), any::<u32>()).prop_map(|(hash, index)| OutPoint { hash, index })
}

fn arb_input(with_witness: bool) -> impl Strategy<Value = TransactionInput> {
    let witness = if with_witness {
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..80), 0..4).boxed()
    } else {
        Just(Vec::new()).boxed()
    };
    (
        arb_outpoint(),
        prop::collection::vec(any::<u8>(), 0..100),
        any::<u32>(),
        witness,
    )
        .prop_map(|(prevout, script_sig, sequence, witness)| TransactionInput {
            prevout,
            script_sig,
            sequence,
            witness,
        })
}

fn arb_output() -> impl Strategy<Value = TransactionOutput> {
    (0i64..21_000_000 * 100_000_000, prop::collection::vec(any::<u8>(), 0..100))
        .prop_map(|(value, script_pubkey)| TransactionOutput {
            value,
            script_pubkey,
        })
}

fn arb_transaction(with_witness: bool) -> impl Strategy<Value = Transaction> {
    (
        any::<i32>(),
        prop::collection::vec(arb_input(with_witness), 1..5),
        prop::collection::vec(arb_output(), 0..5),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time)| Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
}

proptest! {
    #[test]
    fn prop_legacy_round_trip(tx in arb_transaction(false)) {
        let encoded = encode_transaction(&tx);
        let decoded = decode_transaction(&encoded).unwrap();
        prop_assert_eq!(decoded, tx);
    }

    #[test]
    fn prop_segwit_round_trip(tx in arb_transaction(true)) {
        let encoded = encode_transaction_with_witness(&tx);
        let decoded = decode_transaction(&encoded).unwrap();
        prop_assert_eq!(decoded, tx);
    }

    #[test]
    fn prop_txid_ignores_witness(tx in arb_transaction(true)) {
        let mut stripped = tx.clone();
        for input in &mut stripped.inputs {
            input.witness.clear();
        }
        prop_assert_eq!(txid(&tx), txid(&stripped));
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..400)) {
        // Either outcome is fine; the decoder must stay total
        let _ = decode_transaction(&bytes);
    }
}

#[test]
fn test_consensus_field_mutations_change_txid() {
    let tx = Transaction {
        version: 2,
        inputs: vec![TransactionInput {
            prevout: OutPoint {
                hash: [7; 32],
                index: 3,
            },
            script_sig: vec![0x51],
            sequence: 0xffff_fffd,
            witness: vec![vec![0xaa; 32]],
        }],
        outputs: vec![TransactionOutput {
            value: 1234,
            script_pubkey: vec![0x00, 0x14, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
                16, 17, 18, 19, 20],
        }],
        lock_time: 99,
    };
    let base = txid(&tx);

    let mut changed = tx.clone();
    changed.version = 1;
    assert_ne!(txid(&changed), base);

    let mut changed = tx.clone();
    changed.inputs[0].sequence = 0;
    assert_ne!(txid(&changed), base);

    let mut changed = tx.clone();
    changed.outputs[0].value += 1;
    assert_ne!(txid(&changed), base);

    let mut changed = tx.clone();
    changed.lock_time = 0;
    assert_ne!(txid(&changed), base);

    // Witness mutation moves the wtxid but never the txid
    let mut changed = tx.clone();
    changed.inputs[0].witness = vec![vec![0xbb; 32]];
    assert_eq!(txid(&changed), base);
    assert_ne!(wtxid(&changed), wtxid(&tx));
}

#[test]
fn test_known_transaction_bytes() {
    // Genesis coinbase transaction
    let raw = hex::decode(
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d\
         04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e\
         206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a\
         01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f\
         4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000",
    )
    .unwrap();
    let tx = decode_transaction(&raw).unwrap();
    assert_eq!(tx.version, 1);
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.outputs.len(), 1);
    assert_eq!(tx.outputs[0].value, 50 * 100_000_000);
    assert_eq!(encode_transaction(&tx), raw);

    // Displayed reverse-hex: the famous genesis txid
    let mut id = txid(&tx);
    id.reverse();
    assert_eq!(
        hex::encode(id),
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
    );
}
