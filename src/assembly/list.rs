//! Ordered, handle-addressed instruction storage for a single method body.
//!
//! [`InstructionList`] separates *ownership* from *order*: every instruction lives in an
//! append-only arena and is addressed by its [`InstructionId`], while the body order is a
//! separate vector of handles. Inserting an instruction only touches the order vector, so
//! handles held by branch operands stay valid. IL offsets are recomputed after every
//! mutation and are always consistent with the current order.
//!
//! # Rendering
//!
//! [`InstructionList::render`] produces the canonical `IL_xxxx: mnemonic operand` text of an
//! instruction. Branch operands render as the bare label of their target, except through
//! [`InstructionList::render_operand`], which renders the full target instruction (e.g.
//! `IL_0011: ret`). The textual branch matcher relies on the latter.

use std::fmt::Write as _;

use crate::{
    assembly::{Instruction, InstructionId, Operand},
    Error, Result,
};

/// The instructions of a method body, in execution-layout order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionList {
    arena: Vec<Instruction>,
    order: Vec<InstructionId>,
}

impl InstructionList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions in the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total encoded size of the body in bytes.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.iter().map(|(_, instr)| instr.size()).sum()
    }

    /// Handle of the first instruction.
    #[must_use]
    pub fn first(&self) -> Option<InstructionId> {
        self.order.first().copied()
    }

    /// Handle of the last instruction.
    #[must_use]
    pub fn last(&self) -> Option<InstructionId> {
        self.order.last().copied()
    }

    /// Access an instruction by handle.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.arena.get(id.index())
    }

    /// Position of an instruction in the body order.
    #[must_use]
    pub fn position(&self, id: InstructionId) -> Option<usize> {
        self.order.iter().position(|&candidate| candidate == id)
    }

    /// Returns true if `id` refers to an instruction of this body.
    #[must_use]
    pub fn contains(&self, id: InstructionId) -> bool {
        id.index() < self.arena.len()
    }

    /// Iterate over the instructions in body order.
    pub fn iter(&self) -> impl Iterator<Item = (InstructionId, &Instruction)> + '_ {
        self.order.iter().map(|&id| (id, &self.arena[id.index()]))
    }

    /// Handles in body order.
    #[must_use]
    pub fn ids(&self) -> &[InstructionId] {
        &self.order
    }

    /// Append an instruction at the end of the body.
    ///
    /// # Errors
    /// Returns an error if the operand does not fit the opcode or references a
    /// handle outside this list.
    pub fn push(&mut self, instruction: Instruction) -> Result<InstructionId> {
        let at = self.order.len();
        self.insert_at(at, instruction)
    }

    /// Insert `instruction` immediately before `anchor`.
    ///
    /// `anchor` keeps its handle; only its offset changes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInstruction`] if `anchor` is not part of the body.
    pub fn insert_before(
        &mut self,
        anchor: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        let at = self
            .position(anchor)
            .ok_or(Error::InvalidInstruction(anchor))?;
        self.insert_at(at, instruction)
    }

    /// Point the branch `branch` at `target`, leaving opcode and position untouched.
    ///
    /// # Errors
    /// Returns an error if either handle is foreign or `branch` is not a single-target branch.
    pub fn set_target(&mut self, branch: InstructionId, target: InstructionId) -> Result<()> {
        if !self.contains(target) {
            return Err(Error::InvalidInstruction(target));
        }
        let instruction = self
            .arena
            .get_mut(branch.index())
            .ok_or(Error::InvalidInstruction(branch))?;
        if !instruction.opcode.is_branch() {
            return Err(malformed_error!(
                "{} at IL_{:04x} is not a branch",
                instruction.opcode,
                instruction.offset
            ));
        }
        instruction.operand = Operand::Target(target);
        Ok(())
    }

    /// All branch instructions whose operand points at `target`.
    #[must_use]
    pub fn branches_to(&self, target: InstructionId) -> Vec<InstructionId> {
        self.iter()
            .filter(|(_, instr)| instr.targets().contains(&target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Canonical text of an instruction: `IL_xxxx: mnemonic[ operand]`.
    ///
    /// Branch operands are rendered as the label of their target.
    #[must_use]
    pub fn render(&self, id: InstructionId) -> Option<String> {
        let instr = self.get(id)?;
        let mut text = format!("{}: {}", label(instr.offset), instr.opcode);
        let operand = match &instr.operand {
            Operand::Target(target) => self.get(*target).map(|t| label(t.offset)),
            Operand::Switch(targets) => Some(format!(
                "({})",
                targets
                    .iter()
                    .filter_map(|t| self.get(*t))
                    .map(|t| label(t.offset))
                    .collect::<Vec<_>>()
                    .join(",")
            )),
            other => other.as_string(),
        };
        if let Some(operand) = operand {
            let _ = write!(text, " {operand}");
        }
        Some(text)
    }

    /// Canonical text of an instruction's operand.
    ///
    /// A branch operand renders as its full target instruction, e.g. `IL_0011: ret`.
    #[must_use]
    pub fn render_operand(&self, id: InstructionId) -> Option<String> {
        match &self.get(id)?.operand {
            Operand::Target(target) => self.render(*target),
            Operand::Switch(targets) => Some(
                targets
                    .iter()
                    .filter_map(|t| self.render(*t))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            other => other.as_string(),
        }
    }

    fn insert_at(&mut self, at: usize, instruction: Instruction) -> Result<InstructionId> {
        instruction.validate()?;
        let next = u32::try_from(self.arena.len())
            .map_err(|_| malformed_error!("Instruction list exceeds {} entries", u32::MAX))?;
        if let Some(dangling) = instruction
            .targets()
            .into_iter()
            .find(|target| target.0 > next)
        {
            return Err(Error::InvalidInstruction(dangling));
        }

        let id = InstructionId(next);
        self.arena.push(instruction);
        self.order.insert(at, id);
        self.update_offsets(at);
        Ok(id)
    }

    fn update_offsets(&mut self, from: usize) {
        let mut offset = match from.checked_sub(1) {
            Some(prev) => {
                let prev = &self.arena[self.order[prev].index()];
                prev.offset + prev.size()
            }
            None => 0,
        };
        for &id in &self.order[from..] {
            let instr = &mut self.arena[id.index()];
            instr.offset = offset;
            offset += instr.size();
        }
    }
}

fn label(offset: u32) -> String {
    format!("IL_{offset:04x}")
}
