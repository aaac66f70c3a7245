//! Script opcode constants
//!
//! The full 0x00-0xff opcode byte table with classification helpers.
//! Reference: Bitcoin Core `script/script.h`.

// Push opcodes (0x00 - 0x4e). Bytes 0x01-0x4b push that many literal bytes.
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

// Constant pushes (0x4f - 0x60)
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_2: u8 = 0x52;
pub const OP_3: u8 = 0x53;
pub const OP_16: u8 = 0x60;

// Control flow (0x61 - 0x6a)
pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

// Stack operations (0x6b - 0x7d)
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

// Splice operations (0x7e - 0x82); all but OP_SIZE are disabled
pub const OP_CAT: u8 = 0x7e;
pub const OP_SUBSTR: u8 = 0x7f;
pub const OP_LEFT: u8 = 0x80;
pub const OP_RIGHT: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

// Bitwise logic (0x83 - 0x8a); INVERT/AND/OR/XOR are disabled
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

// Arithmetic (0x8b - 0xa5); 2MUL/2DIV/MUL/DIV/MOD/LSHIFT/RSHIFT are disabled
pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

// Crypto (0xa6 - 0xaf)
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// Expansion space (0xb0 - 0xb9): NOPs reserved for soft forks; two are taken
pub const OP_NOP1: u8 = 0xb0;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP10: u8 = 0xb9;

// Tapscript (BIP342)
pub const OP_CHECKSIGADD: u8 = 0xba;

/// Base for OP_1..OP_16 (OP_1 = 0x50 + 1)
pub const OP_N_BASE: u8 = 0x50;

/// True for opcodes that push data and therefore never count toward the
/// per-script operation limit.
pub fn is_push_opcode(opcode: u8) -> bool {
    opcode <= OP_16
}

/// Opcodes removed from the protocol; their presence fails a legacy or
/// witness v0 script even inside an unexecuted branch.
pub fn is_disabled_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        OP_CAT
            | OP_SUBSTR
            | OP_LEFT
            | OP_RIGHT
            | OP_INVERT
            | OP_AND
            | OP_OR
            | OP_XOR
            | OP_2MUL
            | OP_2DIV
            | OP_MUL
            | OP_DIV
            | OP_MOD
            | OP_LSHIFT
            | OP_RSHIFT
    )
}

/// Reserved opcodes: fail only when reached in an executed branch.
pub fn is_reserved_opcode(opcode: u8) -> bool {
    matches!(opcode, OP_RESERVED | OP_RESERVED1 | OP_RESERVED2 | OP_VER)
}

/// NOPs available for future soft forks (excluding the two already assigned)
pub fn is_upgradable_nop(opcode: u8) -> bool {
    opcode == OP_NOP1 || (OP_NOP4..=OP_NOP10).contains(&opcode)
}

/// BIP342 OP_SUCCESSx set: tapscript opcodes that make the script succeed
/// unconditionally, reserving them for future upgrades.
pub fn is_op_success(opcode: u8) -> bool {
    matches!(
        opcode,
        80 | 98 | 126..=129 | 131..=134 | 137..=138 | 141..=142 | 149..=153 | 187..=254
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_opcode_range() {
        assert!(is_push_opcode(OP_0));
        assert!(is_push_opcode(0x4b));
        assert!(is_push_opcode(OP_PUSHDATA4));
        assert!(is_push_opcode(OP_1NEGATE));
        assert!(is_push_opcode(OP_16));
        assert!(!is_push_opcode(OP_NOP));
    }

    #[test]
    fn test_op_success_covers_disabled_splice() {
        // The disabled splice/bitwise/arithmetic opcodes are all redefined
        // as OP_SUCCESS in tapscript.
        for op in [OP_CAT, OP_SUBSTR, OP_INVERT, OP_AND, OP_2MUL, OP_MUL, OP_LSHIFT] {
            assert!(is_op_success(op), "{op:#04x}");
        }
        // CHECKSIGADD is a real tapscript opcode, not an OP_SUCCESS
        assert!(!is_op_success(OP_CHECKSIGADD));
        // OP_VERIF stays invalid in every dialect
        assert!(!is_op_success(OP_VERIF));
    }

    #[test]
    fn test_reserved_and_nops() {
        assert!(is_reserved_opcode(OP_RESERVED));
        assert!(is_upgradable_nop(OP_NOP1));
        assert!(!is_upgradable_nop(OP_CHECKLOCKTIMEVERIFY));
        assert!(!is_upgradable_nop(OP_CHECKSEQUENCEVERIFY));
    }
}
