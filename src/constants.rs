//! Consensus constants for script execution and transaction validation

/// Maximum script length in bytes (legacy and witness v0)
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined depth of the main and alt stacks
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations per script (legacy and witness v0)
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys in a CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Maximum number of elements on a witness v0 stack
pub const MAX_WITNESS_STACK_ELEMENTS: usize = 100;

/// Maximum script number length in bytes
pub const MAX_SCRIPTNUM_SIZE: usize = 4;

/// Script number length for CHECKLOCKTIMEVERIFY / CHECKSEQUENCEVERIFY operands
pub const MAX_LOCKTIME_SCRIPTNUM_SIZE: usize = 5;

/// Lock time values below this threshold are block heights, above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number that disables lock-time semantics for an input
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// BIP68: sequence bit that disables relative lock time
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// BIP68: sequence bit selecting time-based (vs height-based) relative lock
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// BIP68: mask extracting the relative lock-time value from a sequence
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Witness program size for P2WPKH
pub const WITNESS_V0_KEYHASH_SIZE: usize = 20;

/// Witness program size for P2WSH and P2TR
pub const WITNESS_V0_SCRIPTHASH_SIZE: usize = 32;

/// Taproot control block: leaf-version/parity byte plus internal key
pub const TAPROOT_CONTROL_BASE_SIZE: usize = 33;

/// Taproot control block: size of one Merkle path node
pub const TAPROOT_CONTROL_NODE_SIZE: usize = 32;

/// Taproot control block: maximum Merkle path depth
pub const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;

/// Taproot control block: maximum total size
pub const TAPROOT_CONTROL_MAX_SIZE: usize =
    TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT;

/// Tapscript leaf version (BIP342)
pub const TAPROOT_LEAF_TAPSCRIPT: u8 = 0xc0;

/// Mask extracting the leaf version from a control block's first byte
pub const TAPROOT_LEAF_MASK: u8 = 0xfe;

/// First byte of a taproot annex
pub const TAPROOT_ANNEX_PREFIX: u8 = 0x50;

/// Tapscript sigops budget consumed per signature validation (BIP342)
pub const VALIDATION_WEIGHT_PER_SIGOP: i64 = 50;

/// Tapscript sigops budget granted on top of the witness size (BIP342)
pub const VALIDATION_WEIGHT_OFFSET: i64 = 50;

/// Maximum money supply in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;
