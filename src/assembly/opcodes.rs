//! CIL opcode table (ECMA-335 Partition III).
//!
//! This module provides the raw byte values of the opcodes the patcher understands together
//! with the [`OpCode`] enum that carries, for every opcode, its mnemonic, encoded value,
//! operand type, control flow behaviour and fixed stack effect. Two-byte opcodes use the
//! [`FE_PREFIX`] first byte; their second byte is stored with an `FE_` prefix.
//!
//! The table covers the instructions that appear in ordinary compiled method bodies
//! (argument/local access, constants, field access, calls, branches and comparisons).
//! Hosts that feed bodies with opcodes outside this set must map them before handing
//! the module to the patcher.
#![allow(missing_docs)]

use strum::IntoEnumIterator;

use crate::assembly::instruction::{FlowType, OperandType, StackBehavior};

// ── Single-byte opcodes ───────────────────────────────────────────────────

pub const NOP: u8 = 0x00;

pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_2: u8 = 0x04;
pub const LDARG_3: u8 = 0x05;
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const LDLOC_2: u8 = 0x08;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const STLOC_2: u8 = 0x0C;
pub const STLOC_3: u8 = 0x0D;
pub const LDARG_S: u8 = 0x0E;
pub const LDLOC_S: u8 = 0x11;
pub const STLOC_S: u8 = 0x13;

pub const LDNULL: u8 = 0x14;
pub const LDC_I4_M1: u8 = 0x15;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const LDC_I4_2: u8 = 0x18;
pub const LDC_I4_3: u8 = 0x19;
pub const LDC_I4_4: u8 = 0x1A;
pub const LDC_I4_5: u8 = 0x1B;
pub const LDC_I4_6: u8 = 0x1C;
pub const LDC_I4_7: u8 = 0x1D;
pub const LDC_I4_8: u8 = 0x1E;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;

pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BEQ_S: u8 = 0x2E;
pub const BNE_UN_S: u8 = 0x33;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const BEQ: u8 = 0x3B;
pub const BNE_UN: u8 = 0x40;
pub const SWITCH: u8 = 0x45;

pub const CALLVIRT: u8 = 0x6F;
pub const LDSTR: u8 = 0x72;
pub const NEWOBJ: u8 = 0x73;
pub const CASTCLASS: u8 = 0x74;
pub const ISINST: u8 = 0x75;
pub const THROW: u8 = 0x7A;
pub const LDFLD: u8 = 0x7B;
pub const LDFLDA: u8 = 0x7C;
pub const STFLD: u8 = 0x7D;
pub const LDSFLD: u8 = 0x7E;
pub const STSFLD: u8 = 0x80;
pub const BOX: u8 = 0x8C;
pub const LDTOKEN: u8 = 0xD0;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

// ── Two-byte opcodes (0xFE prefix) ────────────────────────────────────────

pub const FE_PREFIX: u8 = 0xFE;
pub const FE_CEQ: u8 = 0x01;
pub const FE_CGT: u8 = 0x02;
pub const FE_CLT: u8 = 0x04;

const fn fe(second: u8) -> u16 {
    ((FE_PREFIX as u16) << 8) | second as u16
}

const fn stack(pops: u8, pushes: u8) -> Option<StackBehavior> {
    Some(StackBehavior {
        pops,
        pushes,
        net_effect: pushes as i8 - pops as i8,
    })
}

/// Stack effect depends on the operand (calls) or on the method signature (`ret`).
const VARIABLE: Option<StackBehavior> = None;

macro_rules! define_opcodes {
    ($( $variant:ident = ($mnemonic:tt, $value:expr, $operand:ident, $flow:ident, $stack:expr) ),* $(,)?) => {
        /// A CIL opcode.
        ///
        /// `Display` renders the ECMA-335 mnemonic (e.g. `ldarg.0`, `brfalse.s`).
        #[allow(non_camel_case_types)]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            strum::Display,
            strum::IntoStaticStr,
            strum::EnumIter,
        )]
        pub enum OpCode {
            $(
                #[strum(serialize = $mnemonic)]
                $variant,
            )*
        }

        impl OpCode {
            /// Encoded opcode value; two-byte opcodes carry [`FE_PREFIX`] in the high byte.
            #[must_use]
            pub const fn value(self) -> u16 {
                match self {
                    $( OpCode::$variant => $value, )*
                }
            }

            /// The type of operand that follows the opcode bytes.
            #[must_use]
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $( OpCode::$variant => OperandType::$operand, )*
                }
            }

            /// How the instruction affects control flow.
            #[must_use]
            pub const fn flow_type(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// Fixed stack effect, or `None` where it depends on a signature.
            #[must_use]
            pub const fn stack_behavior(self) -> Option<StackBehavior> {
                match self {
                    $( OpCode::$variant => $stack, )*
                }
            }
        }
    };
}

define_opcodes! {
    Nop = ("nop", NOP as u16, None, Sequential, stack(0, 0)),

    Ldarg0 = ("ldarg.0", LDARG_0 as u16, None, Sequential, stack(0, 1)),
    Ldarg1 = ("ldarg.1", LDARG_1 as u16, None, Sequential, stack(0, 1)),
    Ldarg2 = ("ldarg.2", LDARG_2 as u16, None, Sequential, stack(0, 1)),
    Ldarg3 = ("ldarg.3", LDARG_3 as u16, None, Sequential, stack(0, 1)),
    Ldloc0 = ("ldloc.0", LDLOC_0 as u16, None, Sequential, stack(0, 1)),
    Ldloc1 = ("ldloc.1", LDLOC_1 as u16, None, Sequential, stack(0, 1)),
    Ldloc2 = ("ldloc.2", LDLOC_2 as u16, None, Sequential, stack(0, 1)),
    Ldloc3 = ("ldloc.3", LDLOC_3 as u16, None, Sequential, stack(0, 1)),
    Stloc0 = ("stloc.0", STLOC_0 as u16, None, Sequential, stack(1, 0)),
    Stloc1 = ("stloc.1", STLOC_1 as u16, None, Sequential, stack(1, 0)),
    Stloc2 = ("stloc.2", STLOC_2 as u16, None, Sequential, stack(1, 0)),
    Stloc3 = ("stloc.3", STLOC_3 as u16, None, Sequential, stack(1, 0)),
    LdargS = ("ldarg.s", LDARG_S as u16, ShortVar, Sequential, stack(0, 1)),
    LdlocS = ("ldloc.s", LDLOC_S as u16, ShortVar, Sequential, stack(0, 1)),
    StlocS = ("stloc.s", STLOC_S as u16, ShortVar, Sequential, stack(1, 0)),

    Ldnull = ("ldnull", LDNULL as u16, None, Sequential, stack(0, 1)),
    LdcI4M1 = ("ldc.i4.m1", LDC_I4_M1 as u16, None, Sequential, stack(0, 1)),
    LdcI4_0 = ("ldc.i4.0", LDC_I4_0 as u16, None, Sequential, stack(0, 1)),
    LdcI4_1 = ("ldc.i4.1", LDC_I4_1 as u16, None, Sequential, stack(0, 1)),
    LdcI4_2 = ("ldc.i4.2", LDC_I4_2 as u16, None, Sequential, stack(0, 1)),
    LdcI4_3 = ("ldc.i4.3", LDC_I4_3 as u16, None, Sequential, stack(0, 1)),
    LdcI4_4 = ("ldc.i4.4", LDC_I4_4 as u16, None, Sequential, stack(0, 1)),
    LdcI4_5 = ("ldc.i4.5", LDC_I4_5 as u16, None, Sequential, stack(0, 1)),
    LdcI4_6 = ("ldc.i4.6", LDC_I4_6 as u16, None, Sequential, stack(0, 1)),
    LdcI4_7 = ("ldc.i4.7", LDC_I4_7 as u16, None, Sequential, stack(0, 1)),
    LdcI4_8 = ("ldc.i4.8", LDC_I4_8 as u16, None, Sequential, stack(0, 1)),
    LdcI4S = ("ldc.i4.s", LDC_I4_S as u16, Int8, Sequential, stack(0, 1)),
    LdcI4 = ("ldc.i4", LDC_I4 as u16, Int32, Sequential, stack(0, 1)),

    Dup = ("dup", DUP as u16, None, Sequential, stack(1, 2)),
    Pop = ("pop", POP as u16, None, Sequential, stack(1, 0)),
    Call = ("call", CALL as u16, Method, Call, VARIABLE),
    Ret = ("ret", RET as u16, None, Return, VARIABLE),

    BrS = ("br.s", BR_S as u16, ShortBranch, UnconditionalBranch, stack(0, 0)),
    BrfalseS = ("brfalse.s", BRFALSE_S as u16, ShortBranch, ConditionalBranch, stack(1, 0)),
    BrtrueS = ("brtrue.s", BRTRUE_S as u16, ShortBranch, ConditionalBranch, stack(1, 0)),
    BeqS = ("beq.s", BEQ_S as u16, ShortBranch, ConditionalBranch, stack(2, 0)),
    BneUnS = ("bne.un.s", BNE_UN_S as u16, ShortBranch, ConditionalBranch, stack(2, 0)),
    Br = ("br", BR as u16, Branch, UnconditionalBranch, stack(0, 0)),
    Brfalse = ("brfalse", BRFALSE as u16, Branch, ConditionalBranch, stack(1, 0)),
    Brtrue = ("brtrue", BRTRUE as u16, Branch, ConditionalBranch, stack(1, 0)),
    Beq = ("beq", BEQ as u16, Branch, ConditionalBranch, stack(2, 0)),
    BneUn = ("bne.un", BNE_UN as u16, Branch, ConditionalBranch, stack(2, 0)),
    Switch = ("switch", SWITCH as u16, Switch, Switch, stack(1, 0)),

    Callvirt = ("callvirt", CALLVIRT as u16, Method, Call, VARIABLE),
    Ldstr = ("ldstr", LDSTR as u16, Token, Sequential, stack(0, 1)),
    Newobj = ("newobj", NEWOBJ as u16, Method, Call, VARIABLE),
    Castclass = ("castclass", CASTCLASS as u16, Token, Sequential, stack(1, 1)),
    Isinst = ("isinst", ISINST as u16, Token, Sequential, stack(1, 1)),
    Throw = ("throw", THROW as u16, None, Throw, stack(1, 0)),
    Ldfld = ("ldfld", LDFLD as u16, Field, Sequential, stack(1, 1)),
    Ldflda = ("ldflda", LDFLDA as u16, Field, Sequential, stack(1, 1)),
    Stfld = ("stfld", STFLD as u16, Field, Sequential, stack(2, 0)),
    Ldsfld = ("ldsfld", LDSFLD as u16, Field, Sequential, stack(0, 1)),
    Stsfld = ("stsfld", STSFLD as u16, Field, Sequential, stack(1, 0)),
    Box = ("box", BOX as u16, Token, Sequential, stack(1, 1)),
    Ldtoken = ("ldtoken", LDTOKEN as u16, Token, Sequential, stack(0, 1)),
    Endfinally = ("endfinally", ENDFINALLY as u16, None, EndFinally, stack(0, 0)),
    Leave = ("leave", LEAVE as u16, Branch, Leave, stack(0, 0)),
    LeaveS = ("leave.s", LEAVE_S as u16, ShortBranch, Leave, stack(0, 0)),

    Ceq = ("ceq", fe(FE_CEQ), None, Sequential, stack(2, 1)),
    Cgt = ("cgt", fe(FE_CGT), None, Sequential, stack(2, 1)),
    Clt = ("clt", fe(FE_CLT), None, Sequential, stack(2, 1)),
}

impl OpCode {
    /// The ECMA-335 mnemonic, e.g. `"ldflda"`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Number of bytes the opcode itself occupies (1, or 2 for `0xFE`-prefixed opcodes).
    #[must_use]
    pub const fn size(self) -> u32 {
        if self.value() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Look up an opcode by its encoded value.
    #[must_use]
    pub fn from_value(value: u16) -> Option<OpCode> {
        OpCode::iter().find(|op| op.value() == value)
    }

    /// Look up an opcode by mnemonic.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        OpCode::iter().find(|op| op.mnemonic() == mnemonic)
    }

    /// True for branch-if-false in both encodings (`brfalse`, `brfalse.s`).
    ///
    /// These pop a boolean (or reference/integer) and jump when it is zero, which is
    /// the shape compilers emit for an early-return guard.
    #[must_use]
    pub const fn is_branch_if_false(self) -> bool {
        matches!(self, OpCode::Brfalse | OpCode::BrfalseS)
    }

    /// True if the operand is a single branch target.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::ShortBranch | OperandType::Branch
        )
    }
}
