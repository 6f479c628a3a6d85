//! The tail-patch pipeline: resolve, match, inject.
//!
//! [`Patcher`] drives a single patch attempt against a loaded [`Module`] through the
//! stages below, failing fast on the first error:
//!
//! ```text
//! Start -> Resolved -> BranchFound -> Injected -> Done
//!   \________\_____________\______________\______> Failed(reason)
//! ```
//!
//! Only the injection stage mutates the module, and it commits atomically, so every
//! failure leaves the module exactly as it was handed in.
//!
//! # Example
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! let mut module = Module::new("Assembly-CSharp.dll");
//! TypeBuilder::new("MinEventParams")
//!     .value_type()
//!     .field(FieldBuilder::new("Self", TypeSig::Class("EntityAlive".into())))
//!     .build(&mut module)?;
//!
//! let mut asm = BodyAssembler::new();
//! asm.ldarg_0()?.brfalse("end")?.nop()?.label("end")?.ret()?;
//! TypeBuilder::new("EntityAlive")
//!     .field(FieldBuilder::new("MinEventContext", TypeSig::ValueType("MinEventParams".into())))
//!     .method(MethodBuilder::new("Init").body(asm.finish()?))
//!     .build(&mut module)?;
//!
//! let mut patcher = Patcher::new(PatchTarget::default());
//! let report = patcher.apply(&mut module)?;
//! assert_eq!(patcher.state(), &PatchState::Done);
//! assert_eq!(report.tail.len(), 4);
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod config;
mod injector;
mod matcher;
mod resolver;

use std::fmt;

use log::{debug, info};

pub use config::{MatchStrategy, PatchConfig, PatchTarget};
pub use injector::{inject_tail, TailHandles};
pub use matcher::{find_branch, find_branch_to_terminal, find_guard_branch};
pub use resolver::{resolve, resolve_field_chain, FieldChain};

use crate::{
    assembly::InstructionId,
    metadata::module::{MethodHandle, Module},
    Result,
};

/// Progress of a patch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PatchState {
    /// Nothing has been looked up yet
    #[default]
    Start,
    /// Type, method and field chain resolved
    Resolved,
    /// The guarding branch was located
    BranchFound,
    /// The tail was inserted and the branch retargeted
    Injected,
    /// The attempt completed
    Done,
    /// The attempt aborted; carries the error message
    Failed(String),
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchState::Start => write!(f, "start"),
            PatchState::Resolved => write!(f, "resolved"),
            PatchState::BranchFound => write!(f, "branch found"),
            PatchState::Injected => write!(f, "injected"),
            PatchState::Done => write!(f, "done"),
            PatchState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// The patched method
    pub method: MethodHandle,
    /// The retargeted branch
    pub branch: InstructionId,
    /// The inserted instructions, in body order
    pub tail: TailHandles,
    /// IL offset of the first inserted instruction, the branch's new target
    pub tail_offset: u32,
}

/// Drives one tail patch described by a [`PatchTarget`].
#[derive(Debug, Clone)]
pub struct Patcher {
    target: PatchTarget,
    config: PatchConfig,
    state: PatchState,
}

impl Patcher {
    /// Creates a patcher with the default [`PatchConfig`].
    #[must_use]
    pub fn new(target: PatchTarget) -> Self {
        Self {
            target,
            config: PatchConfig::default(),
            state: PatchState::Start,
        }
    }

    /// Replaces the matcher configuration.
    #[must_use]
    pub fn with_config(mut self, config: PatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The patch target.
    #[must_use]
    pub fn target(&self) -> &PatchTarget {
        &self.target
    }

    /// The state reached by the last call to [`Patcher::apply`].
    #[must_use]
    pub fn state(&self) -> &PatchState {
        &self.state
    }

    /// Run the pipeline against `module`.
    ///
    /// Every call is a fresh attempt starting from [`PatchState::Start`].
    ///
    /// # Errors
    /// Returns the first stage error; see [`resolve`], [`resolve_field_chain`],
    /// [`find_guard_branch`] and [`inject_tail`]. The module is unchanged on error.
    pub fn apply(&mut self, module: &mut Module) -> Result<PatchReport> {
        self.state = PatchState::Start;
        match self.run(module) {
            Ok(report) => {
                self.advance(PatchState::Done);
                Ok(report)
            }
            Err(err) => {
                self.advance(PatchState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn run(&mut self, module: &mut Module) -> Result<PatchReport> {
        let target = &self.target;
        let (ty, method) = resolve(module, &target.type_name, &target.method_name)?;
        let chain = resolve_field_chain(module, ty, target.field_path())?;
        self.advance(PatchState::Resolved);

        let branch = find_guard_branch(module, method, &self.config)?;
        self.advance(PatchState::BranchFound);

        let tail = inject_tail(module, method, branch, &chain)?;
        self.advance(PatchState::Injected);

        let tail_offset = module
            .method(method)?
            .body
            .as_ref()
            .and_then(|body| body.instructions.get(tail[0]))
            .map_or(0, |instr| instr.offset);
        info!(
            "Patched {} at IL_{:04x}",
            self.target.qualified_method(),
            tail_offset
        );

        Ok(PatchReport {
            method,
            branch,
            tail,
            tail_offset,
        })
    }

    fn advance(&mut self, next: PatchState) {
        debug!("{}: {} -> {}", self.target.qualified_method(), self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::entity_alive::{entity_alive_module, EntityAliveFixture},
        Error, SymbolKind,
    };

    #[test]
    fn successful_attempt_ends_done() {
        let EntityAliveFixture {
            mut module,
            init,
            guard,
            ..
        } = entity_alive_module();
        let mut patcher = Patcher::new(PatchTarget::default());
        let report = patcher.apply(&mut module).unwrap();

        assert_eq!(patcher.state(), &PatchState::Done);
        assert_eq!(report.method, init);
        assert_eq!(report.branch, guard);
        let body = module.method(init).unwrap().body.as_ref().unwrap();
        assert_eq!(
            body.instructions.get(report.tail[0]).unwrap().offset,
            report.tail_offset
        );
    }

    #[test]
    fn failure_records_reason_and_leaves_module_untouched() {
        let EntityAliveFixture { mut module, .. } = entity_alive_module();
        let before = module.clone();
        let mut patcher = Patcher::new(PatchTarget::new("EntityAlive", "Init", "MinEventContext", "Owner"));

        match patcher.apply(&mut module) {
            Err(Error::SymbolNotFound { kind, name }) => {
                assert_eq!(kind, SymbolKind::Field);
                assert_eq!(name, "Owner");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            patcher.state(),
            &PatchState::Failed("Failed to find field 'Owner'".to_string())
        );
        assert_eq!(module, before);
    }

    #[test]
    fn second_attempt_finds_no_guard() {
        let EntityAliveFixture { mut module, .. } = entity_alive_module();
        let mut patcher = Patcher::new(PatchTarget::default());
        patcher.apply(&mut module).unwrap();

        // The guard now jumps to the tail, not to `ret`.
        let patched = module.clone();
        assert!(matches!(
            patcher.apply(&mut module),
            Err(Error::PatternNotFound { .. })
        ));
        assert_eq!(module, patched);
    }

    #[test]
    fn textual_strategy_patches_the_same_branch() {
        let EntityAliveFixture {
            mut module, guard, ..
        } = entity_alive_module();
        let mut patcher = Patcher::new(PatchTarget::default()).with_config(PatchConfig::textual());
        let report = patcher.apply(&mut module).unwrap();
        assert_eq!(report.branch, guard);
    }

    #[test]
    fn state_display() {
        assert_eq!(PatchState::BranchFound.to_string(), "branch found");
        assert_eq!(
            PatchState::Failed("boom".to_string()).to_string(),
            "failed: boom"
        );
    }
}
