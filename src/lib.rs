// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilpatch
//!
//! Post-compilation CIL patching for mod loaders.
//!
//! `cilpatch` takes a loaded .NET module, finds a method by name, locates the conditional
//! branch that skips to the method's return, and splices a short instruction sequence in
//! front of the final `ret`. The branch is retargeted so the new code runs on every path
//! that used to return early. The shipped [`host::CreatePlayerFix`] mod uses this to append
//! `this.MinEventContext.Self = this;` to `EntityAlive::Init`.
//!
//! ## Features
//!
//! - **Stable instruction handles** - branch targets survive insertion without fixups
//! - **Two matchers** - structural (target is the terminal `ret`) or textual
//!   (`IL_xxxx: ret` rendering contains a marker)
//! - **All-or-nothing commits** - every failure leaves the module untouched
//! - **Branch range checks** - a tail that would push a `br.s` out of range is rejected
//!
//! ## Quick Start
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
//! let mut init = BodyAssembler::new();
//! init.ldarg_0()?.brfalse("done")?.nop()?.label("done")?.ret()?;
//! TypeBuilder::new("EntityAlive")
//!     .field(FieldBuilder::new("MinEventContext", TypeSig::ValueType("MinEventParams".into())))
//!     .method(MethodBuilder::new("Init").body(init.finish()?))
//!     .build(&mut module)?;
//!
//! assert!(CreatePlayerFix::new().patch(&mut module));
//! # Ok::<(), cilpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the in-memory module: types, fields, methods, bodies and builders
//! - [`assembly`] - opcodes, instructions, the handle-addressed instruction list,
//!   the body assembler and the CIL encoder
//! - [`patch`] - resolver, matcher and injector, driven by [`patch::Patcher`]
//! - [`host`] - the [`host::PatcherMod`] trait a mod loader calls into
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Patch failures are one of
//! [`Error::SymbolNotFound`], [`Error::PatternNotFound`] or [`Error::IllFormedPatch`];
//! [`host::PatcherMod::patch`] logs them through the `log` facade and reports `false`.
//! The library never installs a logger.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilpatch::prelude::*;
///
/// let module = Module::new("Assembly-CSharp.dll");
/// assert!(module.find_type("EntityAlive").is_none());
/// ```
pub mod prelude;

/// CIL instruction model, assembly and encoding based on ECMA-335 Partition III
pub mod assembly;

/// The mod-loader boundary
pub mod host;

/// In-memory metadata model of a loaded module
pub mod metadata;

/// The resolve / match / inject pipeline
pub mod patch;

/// `cilpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilpatch` Error type
///
/// # Examples
///
/// ```rust
/// use cilpatch::{prelude::*, Error};
///
/// let module = Module::new("Empty.dll");
/// match cilpatch::patch::resolve(&module, "EntityAlive", "Init") {
///     Err(Error::SymbolNotFound { kind, name }) => println!("missing {kind} {name}"),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

/// The kind of symbol a failed lookup was searching for
pub use error::SymbolKind;
