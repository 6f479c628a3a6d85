//! Evaluation stack depth analysis over an instruction list.
//!
//! Depths are propagated from the first instruction along fall-through and branch edges.
//! Every path reaching an instruction must arrive with the same depth, as ECMA-335 III.1.7.5
//! requires; instructions no path reaches get no depth.

use std::collections::HashMap;

use crate::{
    assembly::{FlowType, Instruction, InstructionId, InstructionList, Operand, StackBehavior},
    Result,
};

/// Result of [`stack_depths`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackDepths {
    entry: HashMap<InstructionId, u16>,
    peak: u16,
}

impl StackDepths {
    /// Depth of the evaluation stack before `id` executes, if `id` is reachable.
    #[must_use]
    pub fn at(&self, id: InstructionId) -> Option<u16> {
        self.entry.get(&id).copied()
    }

    /// Largest depth reached anywhere in the list.
    #[must_use]
    pub fn peak(&self) -> u16 {
        self.peak
    }
}

/// Compute the stack depth before every reachable instruction of `list`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an instruction's stack effect is unknown, if the
/// stack underflows, if two paths meet with different depths or if control falls off the
/// end of the list.
pub fn stack_depths(list: &InstructionList) -> Result<StackDepths> {
    let mut depths = StackDepths::default();
    let Some(first) = list.first() else {
        return Ok(depths);
    };
    depths.entry.insert(first, 0);
    let mut pending = vec![first];

    while let Some(id) = pending.pop() {
        let instr = list
            .get(id)
            .ok_or_else(|| malformed_error!("Instruction {} is not in the list", id))?;
        let entry = depths.at(id).unwrap_or_default();

        let exit = match instr.opcode.flow_type() {
            FlowType::Return | FlowType::Throw | FlowType::EndFinally => continue,
            FlowType::Leave => 0,
            _ => {
                let stack = stack_effect(instr)?;
                let remaining = entry.checked_sub(u16::from(stack.pops)).ok_or_else(|| {
                    malformed_error!(
                        "Stack underflow at IL_{:04x}: {} needs {} values, {} available",
                        instr.offset,
                        instr.opcode,
                        stack.pops,
                        entry
                    )
                })?;
                remaining.saturating_add(u16::from(stack.pushes))
            }
        };
        depths.peak = depths.peak.max(entry).max(exit);

        let mut successors = instr.targets();
        if !matches!(
            instr.opcode.flow_type(),
            FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            let next = list
                .position(id)
                .and_then(|pos| list.ids().get(pos + 1).copied())
                .ok_or_else(|| {
                    malformed_error!("Control falls through past IL_{:04x}", instr.offset)
                })?;
            successors.push(next);
        }

        for successor in successors {
            match depths.at(successor) {
                Some(known) if known != exit => {
                    let offset = list.get(successor).map_or(0, |target| target.offset);
                    return Err(malformed_error!(
                        "Stack depth mismatch at IL_{:04x}: {} and {}",
                        offset,
                        known,
                        exit
                    ));
                }
                Some(_) => {}
                None => {
                    depths.entry.insert(successor, exit);
                    pending.push(successor);
                }
            }
        }
    }

    Ok(depths)
}

fn stack_effect(instr: &Instruction) -> Result<StackBehavior> {
    let stack = match &instr.operand {
        Operand::Method(method) => Some(method.stack_behavior(instr.opcode)),
        _ => instr.opcode.stack_behavior(),
    };
    stack.ok_or_else(|| {
        malformed_error!(
            "Stack effect of {} at IL_{:04x} is unknown",
            instr.opcode,
            instr.offset
        )
    })
}
