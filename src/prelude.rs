//! # cilpatch Prelude
//!
//! Re-exports of the types a mod loader or a test needs to build a module, run a patch and
//! inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilpatch operations
pub use crate::Error;

/// The result type used throughout cilpatch
pub use crate::Result;

/// Symbol kinds reported by lookup failures
pub use crate::SymbolKind;

// ================================================================================================
// Host Seam
// ================================================================================================

/// The mod lifecycle trait and the shipped mod
pub use crate::host::{CreatePlayerFix, PatcherMod};

// ================================================================================================
// Metadata Model
// ================================================================================================

/// Module container and entity handles
pub use crate::metadata::module::{FieldHandle, MethodHandle, Module, TypeHandle};

/// Builders for types and members
pub use crate::metadata::builders::{FieldBuilder, MethodBuilder, TypeBuilder};

/// Definitions and attribute flags
pub use crate::metadata::{
    field::{FieldAttributes, FieldDef},
    method::{MethodAttributes, MethodBody, MethodDef},
    typesystem::{TypeAttributes, TypeDef, TypeSig},
};

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and body construction
pub use crate::assembly::{
    encode_instructions, BodyAssembler, FieldRef, Instruction, InstructionId, InstructionList,
    MethodRef, OpCode, Operand,
};

// ================================================================================================
// Patch Pipeline
// ================================================================================================

/// Patch driver, configuration and results
pub use crate::patch::{
    FieldChain, MatchStrategy, PatchConfig, PatchReport, PatchState, PatchTarget, Patcher,
};
