//! CIL instruction representation and operand types.
//!
//! This module defines the types the patcher uses to describe a single instruction of a
//! method body: the [`Instruction`] itself, its strongly-typed [`Operand`], the references
//! an operand can carry ([`FieldRef`], [`MethodRef`]) and the classification enums shared
//! with the opcode table ([`OperandType`], [`FlowType`], [`StackBehavior`]).
//!
//! Branch operands never own their target. They hold an [`InstructionId`], a stable handle
//! into the [`crate::assembly::InstructionList`] that owns every instruction of the body.
//! Handles survive insertions, so a branch keeps pointing at the same instruction no matter
//! how many instructions are spliced in front of it.

use std::fmt;

use crate::{
    assembly::OpCode,
    metadata::{token::Token, typesystem::TypeSig},
    Result,
};

/// Stable handle of an instruction inside its owning [`crate::assembly::InstructionList`].
///
/// Handles are allocated in creation order and are never reused or shifted, which makes
/// them safe to store in branch operands while instructions are inserted around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub(crate) u32);

impl InstructionId {
    /// Position of the instruction in the arena of its list (creation order).
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Types of operands for CIL instructions.
///
/// Each variant corresponds to a specific encoding used in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Unsigned 8-bit argument or local index
    ShortVar,
    /// Signed 8-bit immediate
    Int8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 8-bit branch displacement
    ShortBranch,
    /// Signed 32-bit branch displacement
    Branch,
    /// Switch table (count followed by 32-bit displacements)
    Switch,
    /// Field token
    Field,
    /// Method token
    Method,
    /// Any other metadata token (type, user string, ...)
    Token,
}

impl OperandType {
    /// Returns the size in bytes of this operand type.
    ///
    /// Returns `None` for `Switch`, whose size depends on the number of targets.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        match self {
            OperandType::None => Some(0),
            OperandType::ShortVar | OperandType::Int8 | OperandType::ShortBranch => Some(1),
            OperandType::Int32
            | OperandType::Branch
            | OperandType::Field
            | OperandType::Method
            | OperandType::Token => Some(4),
            OperandType::Switch => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i8,
}

/// A field as referenced from an instruction operand.
///
/// Carries everything needed to render and encode the operand without going back to the
/// module: the token, the declaring type's name and the field's declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Field (or member reference) token
    pub token: Token,
    /// Name of the type declaring the field
    pub declaring_type: String,
    /// Field name
    pub name: String,
    /// Declared type of the field
    pub signature: TypeSig,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.signature, self.declaring_type, self.name)
    }
}

/// A method as referenced from a `call`, `callvirt` or `newobj` operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    /// Method (or member reference) token
    pub token: Token,
    /// Name of the type declaring the method
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Number of declared parameters, not counting `this`
    pub param_count: u16,
    /// The method takes an implicit `this` argument
    pub has_this: bool,
    /// The method returns a value
    pub returns_value: bool,
}

impl MethodRef {
    /// Stack effect of calling this method with `opcode`.
    ///
    /// `newobj` consumes the constructor arguments and pushes the new object; `call` and
    /// `callvirt` consume `this` plus the arguments and push the return value, if any.
    #[must_use]
    pub fn stack_behavior(&self, opcode: OpCode) -> StackBehavior {
        let args = u8::try_from(self.param_count).unwrap_or(u8::MAX);
        let (pops, pushes) = if opcode == OpCode::Newobj {
            (args, 1)
        } else {
            (
                args.saturating_add(u8::from(self.has_this)),
                u8::from(self.returns_value),
            )
        };
        StackBehavior {
            pops,
            pushes,
            net_effect: i8::try_from(i16::from(pushes) - i16::from(pops)).unwrap_or(i8::MIN),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// A decoded instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Signed 8-bit immediate (`ldc.i4.s`)
    Int8(i8),
    /// Signed 32-bit immediate (`ldc.i4`)
    Int32(i32),
    /// Method argument index
    Argument(u8),
    /// Local variable index
    Local(u8),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Raw metadata token (types, user strings)
    Token(Token),
    /// Branch target
    Target(InstructionId),
    /// Switch table targets
    Switch(Vec<InstructionId>),
}

impl Operand {
    /// Returns a formatted string representation of a non-branch operand.
    ///
    /// Branch and switch targets are rendered by the owning list, which knows their
    /// offsets; this returns `None` for them and for [`Operand::None`].
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self {
            Operand::None | Operand::Target(_) | Operand::Switch(_) => None,
            Operand::Int8(value) => Some(value.to_string()),
            Operand::Int32(value) => Some(value.to_string()),
            Operand::Argument(index) => Some(format!("A_{index}")),
            Operand::Local(index) => Some(format!("V_{index}")),
            Operand::Field(field) => Some(field.to_string()),
            Operand::Method(method) => Some(method.to_string()),
            Operand::Token(token) => Some(format!("0x{:08X}", token.value())),
        }
    }

    /// Checks whether this operand can be encoded with the given operand type.
    #[must_use]
    pub fn fits(&self, operand_type: OperandType) -> bool {
        matches!(
            (self, operand_type),
            (Operand::None, OperandType::None)
                | (Operand::Int8(_), OperandType::Int8)
                | (Operand::Int32(_), OperandType::Int32)
                | (Operand::Argument(_) | Operand::Local(_), OperandType::ShortVar)
                | (Operand::Field(_), OperandType::Field)
                | (Operand::Method(_), OperandType::Method)
                | (Operand::Token(_), OperandType::Token)
                | (
                    Operand::Target(_),
                    OperandType::ShortBranch | OperandType::Branch
                )
                | (Operand::Switch(_), OperandType::Switch)
        )
    }
}

/// A single CIL instruction.
///
/// `offset` is maintained by the owning list and always reflects the instruction's IL
/// byte offset in the current layout of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand data for this instruction
    pub operand: Operand,
    /// IL byte offset within the method body
    pub offset: u32,
}

impl Instruction {
    /// Create an instruction; the offset is assigned once it is placed in a list.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            offset: 0,
        }
    }

    /// Create an instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Ensure the operand matches what the opcode encodes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on a mismatch.
    pub fn validate(&self) -> Result<()> {
        if self.operand.fits(self.opcode.operand_type()) {
            Ok(())
        } else {
            Err(malformed_error!(
                "Operand {:?} does not fit opcode {}",
                self.operand,
                self.opcode
            ))
        }
    }

    /// Encoded size in bytes, opcode and operand included.
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match (&self.operand, self.opcode.operand_type().size()) {
            (Operand::Switch(targets), _) => {
                let count = u32::try_from(targets.len()).unwrap_or(u32::MAX);
                4u32.saturating_add(count.saturating_mul(4))
            }
            (_, Some(size)) => size,
            (_, None) => 4,
        };
        self.opcode.size() + operand
    }

    /// All jump targets of this instruction (empty for non-branches).
    #[must_use]
    pub fn targets(&self) -> Vec<InstructionId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Check if this instruction is a branch instruction.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.operand, Operand::Target(_) | Operand::Switch(_))
    }

    /// True for the method return instruction.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.opcode.flow_type() == FlowType::Return
    }
}
