//! CIL instruction encoding.
//!
//! Turns an [`InstructionList`] into the raw CIL byte stream. Branch handles are resolved to
//! displacements relative to the end of the branch instruction (ECMA-335 III.3.15), using the
//! offsets the list already maintains. Short-form branches whose displacement does not fit
//! in a signed byte are rejected with [`Error::BranchOutOfRange`] rather than truncated.
//!
//! The patcher encodes every staged body before committing it, which is how a tail
//! insertion that would push some unrelated `br.s` out of range is caught.
//!
//! # Example
//!
//! ```rust
//! use cilpatch::assembly::{encode_instructions, Instruction, InstructionList, OpCode};
//!
//! let mut list = InstructionList::new();
//! list.push(Instruction::simple(OpCode::Nop))?;
//! list.push(Instruction::simple(OpCode::Ret))?;
//! assert_eq!(encode_instructions(&list)?, vec![0x00, 0x2A]);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use crate::{
    assembly::{opcodes::FE_PREFIX, Instruction, InstructionId, InstructionList, Operand},
    Error, Result,
};

/// Encode every instruction of `list` into CIL bytecode.
///
/// # Errors
/// Returns [`Error::BranchOutOfRange`] for unreachable short branches,
/// [`Error::InvalidInstruction`] for dangling branch handles and
/// [`Error::Malformed`] for operands that do not fit their opcode.
pub fn encode_instructions(list: &InstructionList) -> Result<Vec<u8>> {
    let mut bytecode = Vec::with_capacity(list.code_size() as usize);
    for (_, instruction) in list.iter() {
        encode_instruction(list, instruction, &mut bytecode)?;
    }
    Ok(bytecode)
}

/// Check that every branch of `list` can be encoded, without keeping the bytes.
///
/// # Errors
/// Same as [`encode_instructions`].
pub fn verify_branches(list: &InstructionList) -> Result<()> {
    for (_, instruction) in list.iter().filter(|(_, i)| i.is_branch()) {
        let end = instruction.offset + instruction.size();
        match &instruction.operand {
            Operand::Target(target) => {
                let distance = displacement(list, end, *target)?;
                if instruction.opcode.operand_type().size() == Some(1)
                    && i8::try_from(distance).is_err()
                {
                    return Err(Error::BranchOutOfRange {
                        offset: instruction.offset,
                        distance,
                    });
                }
            }
            Operand::Switch(targets) => {
                for target in targets {
                    displacement(list, end, *target)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn encode_instruction(
    list: &InstructionList,
    instruction: &Instruction,
    out: &mut Vec<u8>,
) -> Result<()> {
    instruction.validate()?;

    let value = instruction.opcode.value();
    if value > 0xFF {
        out.push(FE_PREFIX);
    }
    out.push((value & 0xFF) as u8);

    let end = instruction.offset + instruction.size();
    match &instruction.operand {
        Operand::None => {}
        Operand::Int8(value) => out.push(value.to_le_bytes()[0]),
        Operand::Int32(value) => out.extend_from_slice(&value.to_le_bytes()),
        Operand::Argument(index) | Operand::Local(index) => out.push(*index),
        Operand::Field(field) => out.extend_from_slice(&field.token.value().to_le_bytes()),
        Operand::Method(method) => out.extend_from_slice(&method.token.value().to_le_bytes()),
        Operand::Token(token) => out.extend_from_slice(&token.value().to_le_bytes()),
        Operand::Target(target) => {
            let distance = displacement(list, end, *target)?;
            if instruction.opcode.operand_type().size() == Some(1) {
                let short = i8::try_from(distance).map_err(|_| Error::BranchOutOfRange {
                    offset: instruction.offset,
                    distance,
                })?;
                out.push(short.to_le_bytes()[0]);
            } else {
                let long = i32::try_from(distance).map_err(|_| Error::BranchOutOfRange {
                    offset: instruction.offset,
                    distance,
                })?;
                out.extend_from_slice(&long.to_le_bytes());
            }
        }
        Operand::Switch(targets) => {
            let count = u32::try_from(targets.len())
                .map_err(|_| malformed_error!("Switch table with {} targets", targets.len()))?;
            out.extend_from_slice(&count.to_le_bytes());
            for target in targets {
                let distance = displacement(list, end, *target)?;
                let long = i32::try_from(distance).map_err(|_| Error::BranchOutOfRange {
                    offset: instruction.offset,
                    distance,
                })?;
                out.extend_from_slice(&long.to_le_bytes());
            }
        }
    }
    Ok(())
}

fn displacement(list: &InstructionList, from: u32, target: InstructionId) -> Result<i64> {
    let target = list.get(target).ok_or(Error::InvalidInstruction(target))?;
    Ok(i64::from(target.offset) - i64::from(from))
}
