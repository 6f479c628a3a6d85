//! CIL instruction model: opcodes, instructions, instruction lists, assembly and encoding.
//!
//! This module holds everything the patcher needs to reason about and rewrite a method's
//! instruction stream without touching the binary file format:
//!
//! - [`OpCode`] - the opcode table with mnemonics, operand types and stack effects
//! - [`Instruction`] / [`Operand`] - a single instruction and its typed operand
//! - [`InstructionList`] - handle-addressed storage with stable branch targets
//! - [`BodyAssembler`] - label-based construction of method bodies
//! - [`encode_instructions`] - CIL byte encoding with branch range checks
//! - [`stack_depths`] - evaluation stack depth at every reachable instruction
//!
//! # Example
//!
//! ```rust
//! use cilpatch::assembly::{Instruction, InstructionList, OpCode, Operand};
//!
//! let mut list = InstructionList::new();
//! let ret = list.push(Instruction::simple(OpCode::Ret))?;
//! let tail = list.insert_before(ret, Instruction::simple(OpCode::Ldarg0))?;
//! assert_eq!(list.render(ret).as_deref(), Some("IL_0001: ret"));
//! assert_eq!(list.position(tail), Some(0));
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod assembler;
mod encoder;
mod instruction;
mod list;
pub mod opcodes;
mod stack;

pub use assembler::BodyAssembler;
pub use encoder::{encode_instructions, verify_branches};
pub use instruction::{
    FieldRef, FlowType, Instruction, InstructionId, MethodRef, Operand, OperandType,
    StackBehavior,
};
pub use list::InstructionList;
pub use opcodes::OpCode;
pub use stack::{stack_depths, StackDepths};
