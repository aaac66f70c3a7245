//! Typed failures for the script, sighash, and signing core
//!
//! Every failure is a value; adversarial input must never panic the core.

use thiserror::Error;

/// Script evaluation failure.
///
/// Each variant corresponds to a deployed consensus or policy rule. The
/// interpreter aborts the current evaluation at the first failure; nothing
/// is retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    #[error("operation requires more stack elements than available")]
    StackUnderflow,

    #[error("opcode is invalid in this context")]
    InvalidOperation,

    #[error("opcode is disabled")]
    DisabledOperation,

    #[error("reserved opcode encountered in an executed branch")]
    ReservedOpcode,

    #[error("conditional block left open or closed without opening")]
    UnbalancedConditional,

    #[error("push exceeds the maximum element size")]
    PushSizeExceeded,

    #[error("stack element exceeds the maximum element size")]
    StackMaxElementSizeExceeded,

    #[error("combined stack depth exceeds the maximum")]
    StackSizeExceeded,

    #[error("non-push operation count exceeds the per-script maximum")]
    OpCountExceeded,

    #[error("script exceeds the maximum script size")]
    ScriptSizeExceeded,

    #[error("numeric operand overflows the script number range")]
    NumericOverflow,

    #[error("push is not in its minimal encoded form")]
    MinimalDataRequired,

    #[error("conditional argument is not minimally encoded")]
    MinimalIfRequired,

    #[error("multisig dummy element is not null")]
    NullDummyRequired,

    #[error("stack is not clean after evaluation")]
    CleanStackRequired,

    #[error("use of an upgradable feature is discouraged")]
    DiscourageUpgradable,

    #[error("signature appears in the script code being signed")]
    NonConstantScriptCode,

    #[error("signature is invalid or incorrectly encoded")]
    InvalidSignature,

    #[error("public key is invalid or incorrectly encoded")]
    InvalidPublicKey,

    #[error("signature hash type is invalid")]
    SignatureHashTypeInvalid,

    #[error("witness does not satisfy the witness program")]
    WitnessProgramMismatch,

    #[error("witness spend carries malleable unlock data")]
    WitnessMalleated,

    #[error("witness present for a non-witness output")]
    WitnessUnexpected,

    #[error("taproot control block is malformed or does not commit to the program")]
    TaprootControlBlockInvalid,

    #[error("tapscript signature operations exceed the validation budget")]
    TapscriptSigopsBudgetExceeded,

    #[error("verify operation failed")]
    VerifyFailed,

    #[error("lock time operand is negative")]
    NegativeLockTime,

    #[error("lock time requirement is not satisfied")]
    UnsatisfiedLockTime,

    #[error("script evaluated without error but finished with a false top element")]
    EvalFalse,

    #[error("unlock script for a script-hash spend must be push-only")]
    PushOnlyRequired,
}

/// Transaction wire-format decoding failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input ended before the encoding was complete")]
    UnexpectedEnd,

    #[error("compact size is not in its shortest form")]
    NonCanonicalCompactSize,

    #[error("declared count {0} exceeds what the remaining input could hold")]
    OversizedCount(u64),

    #[error("segwit marker present but flag byte is {0:#04x}")]
    InvalidSegwitFlag(u8),

    #[error("segwit marker present but no input carries a witness")]
    EmptySegwitWitness,

    #[error("{0} trailing bytes after the encoded transaction")]
    TrailingBytes(usize),
}

/// Transaction signing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("previous output script does not match a signable template")]
    UnsupportedScriptTemplate,

    #[error("no previous output known for input {0}")]
    MissingPreviousOutput(usize),

    #[error("input index {0} out of range")]
    InvalidInputIndex(usize),

    #[error("secret key is invalid")]
    InvalidSecretKey,

    #[error("supplied script does not hash to the committed script hash")]
    ScriptHashMismatch,

    #[error("signature hash computation failed: {0}")]
    Sighash(#[from] ScriptError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        assert_eq!(
            ScriptError::StackUnderflow.to_string(),
            "operation requires more stack elements than available"
        );
        assert_eq!(
            ScriptError::TapscriptSigopsBudgetExceeded.to_string(),
            "tapscript signature operations exceed the validation budget"
        );
    }

    #[test]
    fn test_signer_error_from_script_error() {
        let err: SignerError = ScriptError::SignatureHashTypeInvalid.into();
        assert_eq!(err, SignerError::Sighash(ScriptError::SignatureHashTypeInvalid));
    }
}
