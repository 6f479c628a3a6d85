//! Fluent, label-based assembly of method bodies.
//!
//! [`BodyAssembler`] is how hosts and tests write method bodies by hand. Every emit method
//! returns `Result<&mut Self>` so instructions chain with `?`, and branches refer to string
//! labels that are bound to handles when [`BodyAssembler::finish`] runs. The assembler
//! tracks the evaluation stack depth while emitting and uses the peak as `max_stack` unless
//! an explicit value was requested.
//!
//! # Example
//!
//! ```rust
//! use cilpatch::assembly::BodyAssembler;
//!
//! let mut asm = BodyAssembler::new();
//! asm.ldarg_0()?
//!     .brfalse("done")?
//!     .nop()?
//!     .label("done")?
//!     .ret()?;
//! let body = asm.finish()?;
//! assert_eq!(body.instructions.len(), 4);
//! assert_eq!(body.max_stack, 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{FieldRef, Instruction, InstructionId, InstructionList, MethodRef, OpCode, Operand},
    metadata::method::MethodBody,
    Result,
};

/// Label-resolving builder for a [`MethodBody`].
#[derive(Debug, Default)]
pub struct BodyAssembler {
    instructions: InstructionList,
    labels: HashMap<String, InstructionId>,
    pending_labels: Vec<String>,
    fixups: Vec<(InstructionId, String)>,
    depth: i32,
    max_depth: i32,
    max_stack: Option<u16>,
    init_locals: bool,
}

impl BodyAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the computed `max_stack`.
    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Mark the body's locals as zero-initialised.
    pub fn init_locals(&mut self, init_locals: bool) -> &mut Self {
        self.init_locals = init_locals;
        self
    }

    /// Bind `name` to the next emitted instruction.
    ///
    /// # Errors
    /// Returns an error if the label is already defined.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.contains_key(name) || self.pending_labels.iter().any(|l| l == name) {
            return Err(malformed_error!("Label '{}' defined twice", name));
        }
        self.pending_labels.push(name.to_string());
        Ok(self)
    }

    /// Emit a raw instruction.
    ///
    /// # Errors
    /// Returns an error if the operand does not fit the opcode.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<&mut Self> {
        let stack = match &operand {
            Operand::Method(method) => Some(method.stack_behavior(opcode)),
            _ => opcode.stack_behavior(),
        };

        let id = self.instructions.push(Instruction::new(opcode, operand))?;
        for label in self.pending_labels.drain(..) {
            self.labels.insert(label, id);
        }

        if let Some(stack) = stack {
            self.depth = (self.depth + i32::from(stack.net_effect)).max(0);
            self.max_depth = self.max_depth.max(self.depth);
        }
        if opcode == OpCode::Ret {
            self.depth = 0;
        }
        Ok(self)
    }

    /// Emit a branch to `label`, resolved in [`BodyAssembler::finish`].
    ///
    /// # Errors
    /// Returns an error if `opcode` is not a single-target branch.
    pub fn branch(&mut self, opcode: OpCode, label: &str) -> Result<&mut Self> {
        if !opcode.is_branch() {
            return Err(malformed_error!("{} is not a branch opcode", opcode));
        }
        // Self-reference until the label is resolved.
        let placeholder = InstructionId(u32::try_from(self.instructions.len()).unwrap_or(u32::MAX));
        self.emit(opcode, Operand::Target(placeholder))?;
        self.fixups.push((placeholder, label.to_string()));
        Ok(self)
    }

    /// Resolve labels and produce the body.
    ///
    /// # Errors
    /// Returns an error for undefined labels or labels bound past the last instruction.
    pub fn finish(self) -> Result<MethodBody> {
        let BodyAssembler {
            mut instructions,
            labels,
            pending_labels,
            fixups,
            max_depth,
            max_stack,
            init_locals,
            ..
        } = self;

        if let Some(label) = pending_labels.first() {
            return Err(malformed_error!("Label '{}' is not followed by an instruction", label));
        }
        for (branch, label) in fixups {
            let target = labels
                .get(&label)
                .ok_or_else(|| malformed_error!("Undefined label '{}'", label))?;
            instructions.set_target(branch, *target)?;
        }

        Ok(MethodBody {
            instructions,
            max_stack: max_stack.unwrap_or_else(|| u16::try_from(max_depth).unwrap_or(u16::MAX)),
            init_locals,
            ..MethodBody::default()
        })
    }

    /// `nop`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Nop, Operand::None)
    }

    /// `ldarg.0`, the receiver of an instance method.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldarg_0(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Ldarg0, Operand::None)
    }

    /// `ldarg.1`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldarg_1(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Ldarg1, Operand::None)
    }

    /// Load argument `index`, choosing the shortest encoding.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldarg(&mut self, index: u8) -> Result<&mut Self> {
        match index {
            0 => self.emit(OpCode::Ldarg0, Operand::None),
            1 => self.emit(OpCode::Ldarg1, Operand::None),
            2 => self.emit(OpCode::Ldarg2, Operand::None),
            3 => self.emit(OpCode::Ldarg3, Operand::None),
            _ => self.emit(OpCode::LdargS, Operand::Argument(index)),
        }
    }

    /// Load local `index`, choosing the shortest encoding.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldloc(&mut self, index: u8) -> Result<&mut Self> {
        match index {
            0 => self.emit(OpCode::Ldloc0, Operand::None),
            1 => self.emit(OpCode::Ldloc1, Operand::None),
            2 => self.emit(OpCode::Ldloc2, Operand::None),
            3 => self.emit(OpCode::Ldloc3, Operand::None),
            _ => self.emit(OpCode::LdlocS, Operand::Local(index)),
        }
    }

    /// Store to local `index`, choosing the shortest encoding.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn stloc(&mut self, index: u8) -> Result<&mut Self> {
        match index {
            0 => self.emit(OpCode::Stloc0, Operand::None),
            1 => self.emit(OpCode::Stloc1, Operand::None),
            2 => self.emit(OpCode::Stloc2, Operand::None),
            3 => self.emit(OpCode::Stloc3, Operand::None),
            _ => self.emit(OpCode::StlocS, Operand::Local(index)),
        }
    }

    /// Load a 32-bit constant, choosing the shortest encoding.
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        let opcode = match value {
            -1 => OpCode::LdcI4M1,
            0 => OpCode::LdcI4_0,
            1 => OpCode::LdcI4_1,
            2 => OpCode::LdcI4_2,
            3 => OpCode::LdcI4_3,
            4 => OpCode::LdcI4_4,
            5 => OpCode::LdcI4_5,
            6 => OpCode::LdcI4_6,
            7 => OpCode::LdcI4_7,
            8 => OpCode::LdcI4_8,
            _ => {
                return match i8::try_from(value) {
                    Ok(short) => self.emit(OpCode::LdcI4S, Operand::Int8(short)),
                    Err(_) => self.emit(OpCode::LdcI4, Operand::Int32(value)),
                }
            }
        };
        self.emit(opcode, Operand::None)
    }

    /// `ldnull`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldnull(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Ldnull, Operand::None)
    }

    /// `dup`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Dup, Operand::None)
    }

    /// `pop`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Pop, Operand::None)
    }

    /// `ldfld field`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldfld(&mut self, field: FieldRef) -> Result<&mut Self> {
        self.emit(OpCode::Ldfld, Operand::Field(field))
    }

    /// `ldflda field`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ldflda(&mut self, field: FieldRef) -> Result<&mut Self> {
        self.emit(OpCode::Ldflda, Operand::Field(field))
    }

    /// `stfld field`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn stfld(&mut self, field: FieldRef) -> Result<&mut Self> {
        self.emit(OpCode::Stfld, Operand::Field(field))
    }

    /// `call method`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn call(&mut self, method: MethodRef) -> Result<&mut Self> {
        self.emit(OpCode::Call, Operand::Method(method))
    }

    /// `callvirt method`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn callvirt(&mut self, method: MethodRef) -> Result<&mut Self> {
        self.emit(OpCode::Callvirt, Operand::Method(method))
    }

    /// `brfalse label`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn brfalse(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::Brfalse, label)
    }

    /// `brfalse.s label`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn brfalse_s(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::BrfalseS, label)
    }

    /// `brtrue.s label`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn brtrue_s(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::BrtrueS, label)
    }

    /// `br.s label`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn br_s(&mut self, label: &str) -> Result<&mut Self> {
        self.branch(OpCode::BrS, label)
    }

    /// `ret`
    ///
    /// # Errors
    /// Never fails; the `Result` keeps the emit chain uniform.
    pub fn ret(&mut self) -> Result<&mut Self> {
        self.emit(OpCode::Ret, Operand::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{token::Token, typesystem::TypeSig},
        Error,
    };

    fn counter_field() -> FieldRef {
        FieldRef {
            token: Token::new(0x0400_0003),
            declaring_type: "EntityAlive".to_string(),
            name: "counter".to_string(),
            signature: TypeSig::I4,
        }
    }

    #[test]
    fn forward_and_backward_labels_resolve() {
        let mut asm = BodyAssembler::new();
        asm.label("top")
            .unwrap()
            .ldarg_0()
            .unwrap()
            .brfalse_s("end")
            .unwrap()
            .br_s("top")
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        let body = asm.finish().unwrap();
        let ids = body.instructions.ids().to_vec();

        assert_eq!(
            body.instructions.get(ids[1]).unwrap().operand,
            Operand::Target(ids[3])
        );
        assert_eq!(
            body.instructions.get(ids[2]).unwrap().operand,
            Operand::Target(ids[0])
        );
    }

    #[test]
    fn shortest_constant_encodings() {
        let mut asm = BodyAssembler::new();
        asm.ldc_i4(-1).unwrap();
        asm.ldc_i4(8).unwrap();
        asm.ldc_i4(100).unwrap();
        asm.ldc_i4(1000).unwrap();
        asm.ldarg(5).unwrap();
        asm.stloc(4).unwrap();
        let body = asm.finish().unwrap();
        let opcodes: Vec<OpCode> = body.instructions.iter().map(|(_, i)| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                OpCode::LdcI4M1,
                OpCode::LdcI4_8,
                OpCode::LdcI4S,
                OpCode::LdcI4,
                OpCode::LdargS,
                OpCode::StlocS
            ]
        );
    }

    #[test]
    fn max_stack_tracks_peak_depth() {
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .ldarg_0()
            .unwrap()
            .ldfld(counter_field())
            .unwrap()
            .ldc_i4(1)
            .unwrap()
            .pop()
            .unwrap()
            .stfld(counter_field())
            .unwrap()
            .ret()
            .unwrap();
        assert_eq!(asm.finish().unwrap().max_stack, 3);

        let mut asm = BodyAssembler::new();
        asm.max_stack(8).ret().unwrap();
        assert_eq!(asm.finish().unwrap().max_stack, 8);
    }

    #[test]
    fn undefined_and_dangling_labels_fail() {
        let mut asm = BodyAssembler::new();
        asm.br_s("nowhere").unwrap();
        assert!(matches!(asm.finish(), Err(Error::Malformed { .. })));

        let mut asm = BodyAssembler::new();
        asm.ret().unwrap().label("after").unwrap();
        assert!(asm.finish().is_err());

        let mut asm = BodyAssembler::new();
        asm.label("twice").unwrap();
        assert!(asm.label("twice").is_err());
    }

    #[test]
    fn branch_requires_branch_opcode() {
        let mut asm = BodyAssembler::new();
        assert!(asm.branch(OpCode::Ret, "x").is_err());
    }
}
