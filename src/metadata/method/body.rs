use bitflags::bitflags;

use crate::{
    assembly::{encode_instructions, InstructionId, InstructionList},
    metadata::token::Token,
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method body header flags (ECMA-335 II.25.4)
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// Flag of the fat method header, showing that there are more data sections appended to the header
        const MORE_SECTS = 0x8;
        /// Flag to indicate that this method should call the default constructor on all local variables
        const INIT_LOCALS = 0x10;
    }
}

/// Size of a fat header in 4-byte units, stored in the top nibble of the flags word
const FAT_HEADER_DWORDS: u16 = 3;

/// The IL body of a method.
///
/// A compiled body ends in exactly one terminal `ret`; [`MethodBody::terminal`] exposes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Instructions in layout order
    pub instructions: InstructionList,
    /// Maximum number of items on the operand stack
    pub max_stack: u16,
    /// Zero-initialise locals on entry
    pub init_locals: bool,
    /// `StandAloneSig` token describing the locals (null if none)
    pub local_var_sig: Token,
}

impl MethodBody {
    /// Handle of the terminal instruction: the last one, if it is a `ret`.
    #[must_use]
    pub fn terminal(&self) -> Option<InstructionId> {
        let last = self.instructions.last()?;
        self.instructions
            .get(last)
            .filter(|instr| instr.is_return())
            .map(|_| last)
    }

    /// Number of `ret` instructions in the body.
    #[must_use]
    pub fn return_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|(_, instr)| instr.is_return())
            .count()
    }

    /// True if the body can use the one-byte tiny header.
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.instructions.code_size() < 64
            && self.max_stack <= 8
            && self.local_var_sig.is_null()
            && !self.init_locals
    }

    /// Encode header and code as they appear at the method's RVA.
    ///
    /// # Errors
    /// Returns an error if any instruction cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let code = encode_instructions(&self.instructions)?;
        let code_size = u32::try_from(code.len())
            .map_err(|_| malformed_error!("Method body of {} bytes", code.len()))?;

        let mut out = Vec::with_capacity(code.len() + 12);
        if self.is_tiny() {
            // Tiny header: upper six bits carry the code size
            out.push(((code_size as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        } else {
            let mut flags = MethodBodyFlags::FAT_FORMAT;
            if self.init_locals {
                flags |= MethodBodyFlags::INIT_LOCALS;
            }
            let header = (FAT_HEADER_DWORDS << 12) | flags.bits();
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(&self.max_stack.to_le_bytes());
            out.extend_from_slice(&code_size.to_le_bytes());
            out.extend_from_slice(&self.local_var_sig.value().to_le_bytes());
        }
        out.extend_from_slice(&code);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, OpCode};

    fn body_of(opcodes: &[OpCode]) -> MethodBody {
        let mut instructions = InstructionList::new();
        for opcode in opcodes {
            instructions.push(Instruction::simple(*opcode)).unwrap();
        }
        MethodBody {
            instructions,
            max_stack: 1,
            ..MethodBody::default()
        }
    }

    #[test]
    fn terminal_is_trailing_ret() {
        let body = body_of(&[OpCode::Ldarg0, OpCode::Pop, OpCode::Ret]);
        let last = body.instructions.last().unwrap();
        assert_eq!(body.terminal(), Some(last));
        assert_eq!(body.return_count(), 1);

        let body = body_of(&[OpCode::Ldnull, OpCode::Throw]);
        assert_eq!(body.terminal(), None);
        assert_eq!(MethodBody::default().terminal(), None);
    }

    #[test]
    fn tiny_header_encoding() {
        let body = body_of(&[OpCode::Nop, OpCode::Ret]);
        assert!(body.is_tiny());
        assert_eq!(body.encode().unwrap(), vec![0x0A, 0x00, 0x2A]);
    }

    #[test]
    fn fat_header_encoding() {
        let mut body = body_of(&[OpCode::Ret]);
        body.init_locals = true;
        body.max_stack = 2;
        body.local_var_sig = Token::new(0x1100_0001);

        let bytes = body.encode().unwrap();
        assert_eq!(bytes.len(), 13);
        assert_eq!(&bytes[0..2], &[0x13, 0x30]);
        assert_eq!(&bytes[2..4], &[0x02, 0x00]);
        assert_eq!(&bytes[4..8], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[8..12], &[0x01, 0x00, 0x00, 0x11]);
        assert_eq!(bytes[12], 0x2A);
    }
}
