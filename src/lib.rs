//! # txscript
//!
//! Bitcoin script execution, signature hashing, and transaction signing.
//!
//! The crate implements the consensus contract of the script layer: a
//! stack-based interpreter covering the four deployed script dialects
//! (legacy, witness v0, taproot key path, tapscript), the three signature
//! hash constructions (legacy, BIP143, BIP341), and a signer that produces
//! the unlock data for the standard output templates.
//!
//! Every deployed rule, soft-fork flag, and edge case must match the
//! network exactly: any deviation either rejects valid transactions or
//! accepts invalid ones. Failures are typed values throughout; adversarial
//! input never panics the core.
//!
//! ## Validation
//!
//! ```rust
//! use txscript::{verify_input, ValidationFlags};
//! use txscript::types::{OutPoint, Transaction, TransactionInput, TransactionOutput};
//!
//! let tx = Transaction {
//!     version: 2,
//!     inputs: vec![TransactionInput {
//!         prevout: OutPoint { hash: [0x11; 32], index: 0 },
//!         script_sig: vec![0x51], // OP_1
//!         sequence: 0xffff_ffff,
//!         witness: vec![],
//!     }],
//!     outputs: vec![TransactionOutput { value: 1_000, script_pubkey: vec![0x51] }],
//!     lock_time: 0,
//! };
//! let prevouts = vec![TransactionOutput { value: 1_000, script_pubkey: vec![0x51] }];
//! verify_input(&tx, 0, &prevouts, &ValidationFlags::none()).unwrap();
//! ```
//!
//! Validation of independent inputs may run in parallel: each evaluation
//! borrows the transaction and previous outputs immutably and owns its own
//! stacks.

pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod interpreter;
pub mod opcodes;
pub mod operation;
pub mod scriptnum;
pub mod serialization;
pub mod sighash;
pub mod signer;
pub mod taproot;
pub mod template;
pub mod types;

pub use config::ValidationFlags;
pub use error::{DecodeError, ScriptError, SignerError};
pub use interpreter::{verify_input, ScriptContext};
pub use serialization::{decode_transaction, encode_transaction, encode_transaction_with_witness, txid, wtxid};
pub use sighash::{SighashCache, SighashType};
pub use signer::TransactionSigner;
pub use template::{classify, ScriptTemplate};
pub use types::{OutPoint, Script, ScriptVersion, Transaction, TransactionInput, TransactionOutput, Witness};
