//! Soft-fork and policy flag configuration
//!
//! Each flag maps to a deployed BIP. Flags absent from a serialized
//! configuration deserialize as inactive, so historical validation states
//! can be expressed by listing only the rules active at that height.

use serde::{Deserialize, Serialize};

/// Script validation flags.
///
/// The default value has every rule inactive; [`ValidationFlags::all`]
/// reflects the fully deployed network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationFlags {
    /// BIP66: signatures must be strictly DER encoded
    #[serde(default)]
    pub strict_der: bool,

    /// BIP62 rule 5: ECDSA S values must be in the lower half of the order
    #[serde(default)]
    pub low_s: bool,

    /// BIP147: the extra CHECKMULTISIG stack element must be empty
    #[serde(default)]
    pub null_dummy: bool,

    /// BIP62 rule 3: pushes must use their smallest encoding
    #[serde(default)]
    pub minimal_push: bool,

    /// BIP141/BIP342 policy: IF/NOTIF arguments must be empty or 0x01
    #[serde(default)]
    pub minimal_if: bool,

    /// BIP62 rule 6: exactly one element must remain after evaluation
    #[serde(default)]
    pub clean_stack: bool,

    /// Reject NOP1-NOP10 reserved for future soft forks
    #[serde(default)]
    pub discourage_upgradable_nops: bool,

    /// Reject witness program versions with no defined semantics
    #[serde(default)]
    pub discourage_upgradable_witness_program: bool,

    /// BIP65: OP_CHECKLOCKTIMEVERIFY enforces absolute lock times
    #[serde(default)]
    pub check_lock_time_verify: bool,

    /// BIP112: OP_CHECKSEQUENCEVERIFY enforces relative lock times
    #[serde(default)]
    pub check_sequence_verify: bool,

    /// BIP141: witness program evaluation
    #[serde(default)]
    pub witness: bool,

    /// BIP341: taproot key-path and script-path commitment verification
    #[serde(default)]
    pub taproot: bool,

    /// BIP342: execution of revealed tapscript leaves
    #[serde(default)]
    pub tapscript: bool,

    /// Fail when a signature appears inside the script code it signs,
    /// instead of silently deleting it from the legacy script code
    #[serde(default)]
    pub constant_script_code: bool,
}

impl ValidationFlags {
    /// No rules active (pre-soft-fork validation)
    pub fn none() -> Self {
        Self::default()
    }

    /// Every deployed rule active
    pub fn all() -> Self {
        ValidationFlags {
            strict_der: true,
            low_s: true,
            null_dummy: true,
            minimal_push: true,
            minimal_if: true,
            clean_stack: true,
            discourage_upgradable_nops: true,
            discourage_upgradable_witness_program: true,
            check_lock_time_verify: true,
            check_sequence_verify: true,
            witness: true,
            taproot: true,
            tapscript: true,
            constant_script_code: true,
        }
    }

    /// Consensus rules only, without the discouragement policy flags.
    /// Minimal-IF stays active: it is policy at witness v0 but consensus
    /// inside tapscript.
    pub fn consensus() -> Self {
        ValidationFlags {
            discourage_upgradable_nops: false,
            discourage_upgradable_witness_program: false,
            low_s: false,
            minimal_push: false,
            clean_stack: false,
            constant_script_code: false,
            ..Self::all()
        }
    }

    /// Apply soft-fork implications: taproot requires witness, tapscript
    /// requires taproot. Later forks never activate without the earlier ones.
    pub fn normalized(mut self) -> Self {
        if self.tapscript {
            self.taproot = true;
        }
        if self.taproot {
            self.witness = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_inactive() {
        let flags = ValidationFlags::default();
        assert!(!flags.witness);
        assert!(!flags.strict_der);
        assert_eq!(flags, ValidationFlags::none());
    }

    #[test]
    fn test_normalized_implications() {
        let flags = ValidationFlags {
            tapscript: true,
            ..ValidationFlags::none()
        }
        .normalized();
        assert!(flags.taproot);
        assert!(flags.witness);
    }

    #[test]
    fn test_missing_fields_deserialize_inactive() {
        let flags: ValidationFlags = serde_json::from_str(r#"{"witness":true}"#).unwrap();
        assert!(flags.witness);
        assert!(!flags.taproot);
        assert!(!flags.minimal_push);
    }
}
