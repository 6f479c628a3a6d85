//! In-memory metadata model for a loaded .NET module.
//!
//! The host reads a binary into this model, the patcher mutates method bodies in place,
//! and the host writes it back. Only the parts of ECMA-335 metadata the patcher reasons
//! about are modelled.
//!
//! # Key Components
//!
//! - [`module`] - The [`module::Module`] container and its entity handles
//! - [`typesystem`] - Type definitions and field type signatures
//! - [`field`] - Field definitions and attributes
//! - [`method`] - Method definitions and IL bodies
//! - [`token`] - Metadata table row references
//! - [`builders`] - Fluent construction of types and members
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::prelude::*;
//!
//! let mut module = Module::new("Assembly-CSharp.dll");
//! let alive = TypeBuilder::new("EntityAlive").build(&mut module)?;
//! assert_eq!(module.find_type("EntityAlive"), Some(alive));
//! # Ok::<(), cilpatch::Error>(())
//! ```

/// Fluent builders for types, fields and methods
pub mod builders;
/// Field definitions
pub mod field;
/// Method definitions and IL bodies
pub mod method;
/// The module container and entity handles
pub mod module;
/// Commonly used metadata token type
pub mod token;
/// Type definitions and signatures
pub mod typesystem;
