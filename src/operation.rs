//! Script operation codec
//!
//! Maps between raw opcode bytes and tagged operation values. A script is
//! kept as raw bytes for hashing and decoded to operations on demand for
//! execution; encode(decode(s)) reproduces s exactly, including non-minimal
//! push forms.

use crate::constants::MAX_SCRIPT_ELEMENT_SIZE;
use crate::error::ScriptError;
use crate::opcodes::*;
use crate::types::{ByteString, Script, ScriptVersion};

/// How a data push was carried in the script bytes.
///
/// Retained so re-encoding a decoded script is byte-identical even when the
/// original used an oversized push form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEncoding {
    /// Opcode byte is the payload length (0x00-0x4b)
    Direct,
    /// OP_PUSHDATA1: one length byte
    Data1,
    /// OP_PUSHDATA2: two little-endian length bytes
    Data2,
    /// OP_PUSHDATA4: four little-endian length bytes
    Data4,
}

/// A decoded script operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOperation {
    /// Literal data push. OP_0 decodes as an empty direct push.
    Push {
        data: ByteString,
        encoding: PushEncoding,
    },
    /// Small constant push: -1 (OP_1NEGATE) or 1..=16 (OP_1..OP_16)
    Constant(i8),

    // Control flow
    Nop,
    If,
    NotIf,
    Else,
    EndIf,
    Verify,
    Return,

    // Stack manipulation
    ToAltStack,
    FromAltStack,
    Drop2,
    Dup2,
    Dup3,
    Over2,
    Rot2,
    Swap2,
    IfDup,
    Depth,
    Drop,
    Dup,
    Nip,
    Over,
    Pick,
    Roll,
    Rot,
    Swap,
    Tuck,

    // Splice
    Size,

    // Bitwise logic
    Equal,
    EqualVerify,

    // Arithmetic
    Add1,
    Sub1,
    Negate,
    Abs,
    Not,
    NotEqual0,
    Add,
    Sub,
    BoolAnd,
    BoolOr,
    NumEqual,
    NumEqualVerify,
    NumNotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Min,
    Max,
    Within,

    // Crypto
    Ripemd160,
    Sha1,
    Sha256,
    Hash160,
    Hash256,
    CodeSeparator,
    CheckSig,
    CheckSigVerify,
    CheckMultiSig,
    CheckMultiSigVerify,
    CheckSigAdd,

    // Lock time
    CheckLockTimeVerify,
    CheckSequenceVerify,

    /// Disabled opcodes (splice, bitwise, and multiplicative arithmetic);
    /// their presence alone fails a legacy or witness v0 script
    Disabled(u8),
    /// Reserved opcodes; fail when reached in an executed branch
    Reserved(u8),
    /// OP_VERIF / OP_VERNOTIF; fail even in an unexecuted branch
    Invalid(u8),
    /// NOP1 and NOP4..NOP10, reserved for future soft forks
    UpgradableNop(u8),
    /// Opcode bytes above the defined range (0xbb-0xff)
    Unknown(u8),
}

impl ScriptOperation {
    /// The opcode byte this operation serializes to.
    pub fn opcode(&self) -> u8 {
        use ScriptOperation::*;
        match self {
            Push { data, encoding } => match encoding {
                PushEncoding::Direct => data.len() as u8,
                PushEncoding::Data1 => OP_PUSHDATA1,
                PushEncoding::Data2 => OP_PUSHDATA2,
                PushEncoding::Data4 => OP_PUSHDATA4,
            },
            Constant(-1) => OP_1NEGATE,
            Constant(n) => OP_N_BASE + *n as u8,
            Nop => OP_NOP,
            If => OP_IF,
            NotIf => OP_NOTIF,
            Else => OP_ELSE,
            EndIf => OP_ENDIF,
            Verify => OP_VERIFY,
            Return => OP_RETURN,
            ToAltStack => OP_TOALTSTACK,
            FromAltStack => OP_FROMALTSTACK,
            Drop2 => OP_2DROP,
            Dup2 => OP_2DUP,
            Dup3 => OP_3DUP,
            Over2 => OP_2OVER,
            Rot2 => OP_2ROT,
            Swap2 => OP_2SWAP,
            IfDup => OP_IFDUP,
            Depth => OP_DEPTH,
            Drop => OP_DROP,
            Dup => OP_DUP,
            Nip => OP_NIP,
            Over => OP_OVER,
            Pick => OP_PICK,
            Roll => OP_ROLL,
            Rot => OP_ROT,
            Swap => OP_SWAP,
            Tuck => OP_TUCK,
            Size => OP_SIZE,
            Equal => OP_EQUAL,
            EqualVerify => OP_EQUALVERIFY,
            Add1 => OP_1ADD,
            Sub1 => OP_1SUB,
            Negate => OP_NEGATE,
            Abs => OP_ABS,
            Not => OP_NOT,
            NotEqual0 => OP_0NOTEQUAL,
            Add => OP_ADD,
            Sub => OP_SUB,
            BoolAnd => OP_BOOLAND,
            BoolOr => OP_BOOLOR,
            NumEqual => OP_NUMEQUAL,
            NumEqualVerify => OP_NUMEQUALVERIFY,
            NumNotEqual => OP_NUMNOTEQUAL,
            LessThan => OP_LESSTHAN,
            GreaterThan => OP_GREATERTHAN,
            LessThanOrEqual => OP_LESSTHANOREQUAL,
            GreaterThanOrEqual => OP_GREATERTHANOREQUAL,
            Min => OP_MIN,
            Max => OP_MAX,
            Within => OP_WITHIN,
            Ripemd160 => OP_RIPEMD160,
            Sha1 => OP_SHA1,
            Sha256 => OP_SHA256,
            Hash160 => OP_HASH160,
            Hash256 => OP_HASH256,
            CodeSeparator => OP_CODESEPARATOR,
            CheckSig => OP_CHECKSIG,
            CheckSigVerify => OP_CHECKSIGVERIFY,
            CheckMultiSig => OP_CHECKMULTISIG,
            CheckMultiSigVerify => OP_CHECKMULTISIGVERIFY,
            CheckSigAdd => OP_CHECKSIGADD,
            CheckLockTimeVerify => OP_CHECKLOCKTIMEVERIFY,
            CheckSequenceVerify => OP_CHECKSEQUENCEVERIFY,
            Disabled(op) | Reserved(op) | Invalid(op) | UpgradableNop(op) | Unknown(op) => *op,
        }
    }

    /// Serialized size in bytes, including any push payload and length prefix.
    pub fn serialized_size(&self) -> usize {
        match self {
            ScriptOperation::Push { data, encoding } => {
                let prefix = match encoding {
                    PushEncoding::Direct => 1,
                    PushEncoding::Data1 => 2,
                    PushEncoding::Data2 => 3,
                    PushEncoding::Data4 => 5,
                };
                prefix + data.len()
            }
            _ => 1,
        }
    }

    /// True for push-family operations (they never count toward the
    /// per-script operation limit).
    pub fn is_push(&self) -> bool {
        matches!(
            self,
            ScriptOperation::Push { .. } | ScriptOperation::Constant(_)
        )
    }

    /// True when a push uses the smallest encoding that can carry its
    /// payload (BIP62 rule 3). Non-push operations are trivially minimal.
    pub fn is_minimal_push(&self) -> bool {
        let ScriptOperation::Push { data, encoding } = self else {
            return true;
        };
        match data.len() {
            // Empty pushes must be OP_0; single bytes 1-16 and 0x81 have
            // dedicated constant opcodes.
            0 => *encoding == PushEncoding::Direct,
            1 => {
                let byte = data[0];
                if (1..=16).contains(&byte) || byte == 0x81 {
                    return false;
                }
                *encoding == PushEncoding::Direct
            }
            2..=75 => *encoding == PushEncoding::Direct,
            76..=255 => *encoding == PushEncoding::Data1,
            256..=65535 => *encoding == PushEncoding::Data2,
            _ => *encoding == PushEncoding::Data4,
        }
    }

    /// The data this operation pushes, if it is a push.
    pub fn push_data(&self) -> Option<ByteString> {
        match self {
            ScriptOperation::Push { data, .. } => Some(data.clone()),
            ScriptOperation::Constant(n) => Some(crate::scriptnum::encode_scriptnum(*n as i64)),
            _ => None,
        }
    }
}

/// Incremental operation decoder over raw script bytes.
///
/// The interpreter drives this directly so a failure is reported exactly
/// when the malformed byte is reached, matching the deployed evaluation
/// order (an undecodable tail after OP_RETURN is never inspected).
pub struct OperationReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> OperationReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        OperationReader { bytes, pos: 0 }
    }

    /// Byte offset of the next operation; used for CODESEPARATOR accounting.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decode the next operation, or `None` at end of script.
    pub fn next_operation(&mut self) -> Option<Result<ScriptOperation, ScriptError>> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let opcode = self.bytes[self.pos];
        self.pos += 1;
        Some(self.decode_tail(opcode))
    }

    fn decode_tail(&mut self, opcode: u8) -> Result<ScriptOperation, ScriptError> {
        use ScriptOperation::*;
        let op = match opcode {
            0x00..=0x4b => {
                let data = self.take(opcode as usize)?.to_vec();
                Push {
                    data,
                    encoding: PushEncoding::Direct,
                }
            }
            OP_PUSHDATA1 => {
                let len = self.take(1)?[0] as usize;
                Push {
                    data: self.take(len)?.to_vec(),
                    encoding: PushEncoding::Data1,
                }
            }
            OP_PUSHDATA2 => {
                let len_bytes = self.take(2)?;
                let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
                Push {
                    data: self.take(len)?.to_vec(),
                    encoding: PushEncoding::Data2,
                }
            }
            OP_PUSHDATA4 => {
                let len_bytes = self.take(4)?;
                let len =
                    u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                        as usize;
                Push {
                    data: self.take(len)?.to_vec(),
                    encoding: PushEncoding::Data4,
                }
            }
            OP_1NEGATE => Constant(-1),
            OP_1..=OP_16 => Constant((opcode - OP_N_BASE) as i8),
            OP_NOP => Nop,
            OP_IF => If,
            OP_NOTIF => NotIf,
            OP_ELSE => Else,
            OP_ENDIF => EndIf,
            OP_VERIFY => Verify,
            OP_RETURN => Return,
            OP_TOALTSTACK => ToAltStack,
            OP_FROMALTSTACK => FromAltStack,
            OP_2DROP => Drop2,
            OP_2DUP => Dup2,
            OP_3DUP => Dup3,
            OP_2OVER => Over2,
            OP_2ROT => Rot2,
            OP_2SWAP => Swap2,
            OP_IFDUP => IfDup,
            OP_DEPTH => Depth,
            OP_DROP => Drop,
            OP_DUP => Dup,
            OP_NIP => Nip,
            OP_OVER => Over,
            OP_PICK => Pick,
            OP_ROLL => Roll,
            OP_ROT => Rot,
            OP_SWAP => Swap,
            OP_TUCK => Tuck,
            OP_SIZE => Size,
            OP_EQUAL => Equal,
            OP_EQUALVERIFY => EqualVerify,
            OP_1ADD => Add1,
            OP_1SUB => Sub1,
            OP_NEGATE => Negate,
            OP_ABS => Abs,
            OP_NOT => Not,
            OP_0NOTEQUAL => NotEqual0,
            OP_ADD => Add,
            OP_SUB => Sub,
            OP_BOOLAND => BoolAnd,
            OP_BOOLOR => BoolOr,
            OP_NUMEQUAL => NumEqual,
            OP_NUMEQUALVERIFY => NumEqualVerify,
            OP_NUMNOTEQUAL => NumNotEqual,
            OP_LESSTHAN => LessThan,
            OP_GREATERTHAN => GreaterThan,
            OP_LESSTHANOREQUAL => LessThanOrEqual,
            OP_GREATERTHANOREQUAL => GreaterThanOrEqual,
            OP_MIN => Min,
            OP_MAX => Max,
            OP_WITHIN => Within,
            OP_RIPEMD160 => Ripemd160,
            OP_SHA1 => Sha1,
            OP_SHA256 => Sha256,
            OP_HASH160 => Hash160,
            OP_HASH256 => Hash256,
            OP_CODESEPARATOR => CodeSeparator,
            OP_CHECKSIG => CheckSig,
            OP_CHECKSIGVERIFY => CheckSigVerify,
            OP_CHECKMULTISIG => CheckMultiSig,
            OP_CHECKMULTISIGVERIFY => CheckMultiSigVerify,
            OP_CHECKSIGADD => CheckSigAdd,
            OP_CHECKLOCKTIMEVERIFY => CheckLockTimeVerify,
            OP_CHECKSEQUENCEVERIFY => CheckSequenceVerify,
            OP_VERIF | OP_VERNOTIF => Invalid(opcode),
            op if is_disabled_opcode(op) => Disabled(op),
            op if is_reserved_opcode(op) => Reserved(op),
            op if is_upgradable_nop(op) => UpgradableNop(op),
            op => Unknown(op),
        };
        Ok(op)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ScriptError> {
        if self.bytes.len() - self.pos < n {
            self.pos = self.bytes.len();
            return Err(ScriptError::InvalidOperation);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Decode a whole script into operations.
///
/// For non-legacy versions a push payload above the element size limit is a
/// decode failure; legacy scripts defer that check to execution.
pub fn decode_operations(script: &Script) -> Result<Vec<ScriptOperation>, ScriptError> {
    let mut reader = OperationReader::new(script.as_bytes());
    let mut ops = Vec::new();
    while let Some(op) = reader.next_operation() {
        let op = op?;
        if script.version() != ScriptVersion::Legacy {
            if let ScriptOperation::Push { data, .. } = &op {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSizeExceeded);
                }
            }
        }
        ops.push(op);
    }
    Ok(ops)
}

/// Encode operations back to script bytes. Exact inverse of decoding.
pub fn encode_operations(ops: &[ScriptOperation]) -> ByteString {
    let mut out = Vec::with_capacity(ops.iter().map(ScriptOperation::serialized_size).sum());
    for op in ops {
        out.push(op.opcode());
        if let ScriptOperation::Push { data, encoding } = op {
            match encoding {
                PushEncoding::Direct => {}
                PushEncoding::Data1 => out.push(data.len() as u8),
                PushEncoding::Data2 => out.extend_from_slice(&(data.len() as u16).to_le_bytes()),
                PushEncoding::Data4 => out.extend_from_slice(&(data.len() as u32).to_le_bytes()),
            }
            out.extend_from_slice(data);
        }
    }
    out
}

/// Append the minimal push of `data` to a script under construction.
pub fn write_push(out: &mut ByteString, data: &[u8]) {
    match data.len() {
        0 => out.push(OP_0),
        1 if (1..=16).contains(&data[0]) => out.push(OP_N_BASE + data[0]),
        1 if data[0] == 0x81 => out.push(OP_1NEGATE),
        len @ 1..=75 => {
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len @ 76..=255 => {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
            out.extend_from_slice(data);
        }
        len @ 256..=65535 => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
        len => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
}

/// True when every operation in the script is a push (the P2SH unlock rule).
pub fn is_push_only(bytes: &[u8]) -> bool {
    let mut reader = OperationReader::new(bytes);
    while let Some(op) = reader.next_operation() {
        match op {
            Ok(op) if op.is_push() => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_legacy(bytes: &[u8]) -> Result<Vec<ScriptOperation>, ScriptError> {
        decode_operations(&Script::new(bytes.to_vec(), ScriptVersion::Legacy))
    }

    #[test]
    fn test_decode_constants() {
        let ops = decode_legacy(&[0x00, 0x4f, 0x51, 0x60]).unwrap();
        assert_eq!(
            ops,
            vec![
                ScriptOperation::Push {
                    data: vec![],
                    encoding: PushEncoding::Direct
                },
                ScriptOperation::Constant(-1),
                ScriptOperation::Constant(1),
                ScriptOperation::Constant(16),
            ]
        );
    }

    #[test]
    fn test_decode_pushdata_forms() {
        let mut script = vec![0x02, 0xaa, 0xbb];
        script.extend_from_slice(&[0x4c, 0x01, 0xcc]);
        script.extend_from_slice(&[0x4d, 0x02, 0x00, 0xdd, 0xee]);
        script.extend_from_slice(&[0x4e, 0x01, 0x00, 0x00, 0x00, 0xff]);
        let ops = decode_legacy(&script).unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(
            ops[1],
            ScriptOperation::Push {
                data: vec![0xcc],
                encoding: PushEncoding::Data1
            }
        );
        assert_eq!(encode_operations(&ops), script);
    }

    #[test]
    fn test_truncated_push_fails() {
        assert_eq!(decode_legacy(&[0x05, 0x01]), Err(ScriptError::InvalidOperation));
        assert_eq!(decode_legacy(&[0x4c]), Err(ScriptError::InvalidOperation));
        assert_eq!(decode_legacy(&[0x4d, 0x10, 0x00]), Err(ScriptError::InvalidOperation));
    }

    #[test]
    fn test_oversized_push_version_dependent() {
        let mut script = vec![0x4d];
        script.extend_from_slice(&521u16.to_le_bytes());
        script.extend_from_slice(&[0u8; 521]);

        assert!(decode_legacy(&script).is_ok());
        assert_eq!(
            decode_operations(&Script::new(script, ScriptVersion::WitnessV0)),
            Err(ScriptError::PushSizeExceeded)
        );
    }

    #[test]
    fn test_round_trip_every_single_opcode() {
        for opcode in 0x4fu8..=0xff {
            let script = vec![opcode];
            let ops = decode_legacy(&script).unwrap();
            assert_eq!(encode_operations(&ops), script, "opcode {opcode:#04x}");
            assert_eq!(ops[0].serialized_size(), 1);
        }
    }

    #[test]
    fn test_minimal_push_rules() {
        let minimal = |bytes: &[u8]| decode_legacy(bytes).unwrap()[0].is_minimal_push();

        assert!(minimal(&[0x00]));
        assert!(minimal(&[0x01, 0x42]));
        // 0x05 has a dedicated constant opcode
        assert!(!minimal(&[0x01, 0x05]));
        assert!(!minimal(&[0x01, 0x81]));
        // PUSHDATA1 carrying what a direct push could
        assert!(!minimal(&[0x4c, 0x01, 0x42]));
        // PUSHDATA2 carrying what PUSHDATA1 could
        assert!(!minimal(&[0x4d, 0x01, 0x00, 0x42]));
        // 76 bytes genuinely needs PUSHDATA1
        let mut long = vec![0x4c, 76];
        long.extend_from_slice(&[0x42; 76]);
        assert!(minimal(&long));
    }

    #[test]
    fn test_write_push_minimal_forms() {
        let mut out = Vec::new();
        write_push(&mut out, &[]);
        assert_eq!(out, vec![0x00]);

        let mut out = Vec::new();
        write_push(&mut out, &[0x07]);
        assert_eq!(out, vec![0x57]);

        let mut out = Vec::new();
        write_push(&mut out, &[0x42; 76]);
        assert_eq!(out[..2], [0x4c, 76]);

        let mut out = Vec::new();
        write_push(&mut out, &[0x42; 300]);
        assert_eq!(out[..3], [0x4d, 0x2c, 0x01]);
    }

    #[test]
    fn test_is_push_only() {
        assert!(is_push_only(&[0x00, 0x51, 0x02, 0xaa, 0xbb]));
        assert!(!is_push_only(&[0x51, 0x87])); // OP_EQUAL
        assert!(!is_push_only(&[0x05, 0x01])); // truncated
        assert!(is_push_only(&[]));
    }

    #[test]
    fn test_constant_push_data() {
        assert_eq!(ScriptOperation::Constant(5).push_data(), Some(vec![0x05]));
        assert_eq!(ScriptOperation::Constant(-1).push_data(), Some(vec![0x81]));
        assert_eq!(
            ScriptOperation::Push {
                data: vec![],
                encoding: PushEncoding::Direct
            }
            .push_data(),
            Some(vec![])
        );
        assert_eq!(ScriptOperation::Dup.push_data(), None);
    }
}
