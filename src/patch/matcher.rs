//! Locating the conditional branch that skips to the method's return.
//!
//! Two predicates are supported, both restricted to `brfalse` / `brfalse.s`:
//!
//! - textual: the operand, rendered as its target instruction (`IL_0042: ret`), contains a
//!   marker substring
//! - structural: the operand's handle is the body's terminal instruction
//!
//! The scan runs in body order and never mutates anything.

use log::debug;

use crate::{
    assembly::{InstructionId, Operand},
    metadata::{method::MethodBody, module::MethodHandle, module::Module},
    patch::config::{MatchStrategy, PatchConfig},
    Error, Result,
};

/// First `brfalse` whose rendered operand contains `marker`.
#[must_use]
pub fn find_branch(body: &MethodBody, marker: &str) -> Option<InstructionId> {
    textual_candidates(body, marker).next()
}

/// First `brfalse` that jumps straight to the terminal `ret`.
#[must_use]
pub fn find_branch_to_terminal(body: &MethodBody) -> Option<InstructionId> {
    structural_candidates(body).next()
}

/// Find the branch to patch in `method` according to `config`.
///
/// # Errors
/// - [`Error::PatternNotFound`] if the method has no body or no branch matches
/// - [`Error::IllFormedPatch`] if `config.require_unique` is set and several branches match
pub fn find_guard_branch(
    module: &Module,
    method: MethodHandle,
    config: &PatchConfig,
) -> Result<InstructionId> {
    let def = module.method(method)?;
    let qualified = format!("{}::{}", module.type_def(method.owner())?.name, def.name);
    let not_found = || Error::PatternNotFound {
        method: qualified.clone(),
    };

    let body = def.body.as_ref().ok_or_else(not_found)?;
    let mut matches: Vec<InstructionId> = match config.strategy {
        MatchStrategy::Textual => textual_candidates(body, &config.marker).collect(),
        MatchStrategy::Structural => structural_candidates(body).collect(),
    };

    if config.require_unique && matches.len() > 1 {
        return Err(ill_formed!(
            "{} branches in '{}' match the {} pattern, expected exactly one",
            matches.len(),
            qualified,
            config.strategy
        ));
    }
    if matches.is_empty() {
        return Err(not_found());
    }

    let branch = matches.swap_remove(0);
    debug!(
        "Matched {} in {}",
        body.instructions.render(branch).unwrap_or_default(),
        qualified
    );
    Ok(branch)
}

fn textual_candidates<'a>(
    body: &'a MethodBody,
    marker: &'a str,
) -> impl Iterator<Item = InstructionId> + 'a {
    body.instructions
        .iter()
        .filter(|(_, instr)| instr.opcode.is_branch_if_false())
        .filter(move |(id, _)| {
            body.instructions
                .render_operand(*id)
                .is_some_and(|text| text.contains(marker))
        })
        .map(|(id, _)| id)
}

fn structural_candidates(body: &MethodBody) -> impl Iterator<Item = InstructionId> + '_ {
    let terminal = body.terminal();
    body.instructions
        .iter()
        .filter(move |(_, instr)| {
            instr.opcode.is_branch_if_false()
                && terminal.is_some_and(|last| instr.operand == Operand::Target(last))
        })
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::BodyAssembler,
        test::factories::entity_alive::{entity_alive_module, EntityAliveFixture},
    };

    fn two_guards() -> MethodBody {
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .brfalse_s("end")
            .unwrap()
            .ldarg_0()
            .unwrap()
            .brfalse("end")
            .unwrap()
            .nop()
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        asm.finish().unwrap()
    }

    #[test]
    fn textual_and_structural_agree_on_simple_guard() {
        let EntityAliveFixture {
            module,
            init,
            guard,
            ..
        } = entity_alive_module();
        let body = module.method(init).unwrap().body.as_ref().unwrap();
        assert_eq!(find_branch(body, ": ret"), Some(guard));
        assert_eq!(find_branch_to_terminal(body), Some(guard));
    }

    #[test]
    fn first_match_wins() {
        let body = two_guards();
        let first = body.instructions.ids()[1];
        assert_eq!(find_branch(&body, ": ret"), Some(first));
        assert_eq!(find_branch_to_terminal(&body), Some(first));
    }

    #[test]
    fn other_branch_kinds_are_ignored() {
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .brtrue_s("end")
            .unwrap()
            .br_s("end")
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        let body = asm.finish().unwrap();
        assert_eq!(find_branch(&body, ": ret"), None);
        assert_eq!(find_branch_to_terminal(&body), None);
    }

    #[test]
    fn textual_matches_any_ret_target() {
        // An interior `ret` satisfies the text marker but is not the terminal.
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .brfalse("early")
            .unwrap()
            .nop()
            .unwrap()
            .label("early")
            .unwrap()
            .ret()
            .unwrap()
            .nop()
            .unwrap()
            .ret()
            .unwrap();
        let body = asm.finish().unwrap();
        assert!(find_branch(&body, ": ret").is_some());
        assert_eq!(find_branch_to_terminal(&body), None);
    }

    #[test]
    fn missing_body_is_pattern_not_found() {
        let EntityAliveFixture {
            mut module, init, ..
        } = entity_alive_module();
        module.method_mut(init).unwrap().body = None;
        match find_guard_branch(&module, init, &PatchConfig::default()) {
            Err(Error::PatternNotFound { method }) => assert_eq!(method, "EntityAlive::Init"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_marker_is_pattern_not_found() {
        let EntityAliveFixture { module, init, .. } = entity_alive_module();
        let config = PatchConfig::textual().with_marker(": leave");
        assert!(matches!(
            find_guard_branch(&module, init, &config),
            Err(Error::PatternNotFound { .. })
        ));
    }

    #[test]
    fn require_unique_rejects_ambiguous_guards() {
        let EntityAliveFixture {
            mut module, init, ..
        } = entity_alive_module();
        module.set_body(init, two_guards()).unwrap();

        let lenient = PatchConfig::default();
        assert!(find_guard_branch(&module, init, &lenient).is_ok());

        let strict = PatchConfig::default().with_require_unique(true);
        assert!(matches!(
            find_guard_branch(&module, init, &strict),
            Err(Error::IllFormedPatch { .. })
        ));
    }
}
