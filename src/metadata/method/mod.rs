//! Method definitions and method bodies.
//!
//! A [`MethodDef`] optionally owns a [`MethodBody`]; abstract and runtime-implemented
//! methods have none. The body is the only part of a module the patcher ever mutates.

mod body;

pub use body::{MethodBody, MethodBodyFlags};

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Method attributes (ECMA-335 II.23.1.10), the subset the patcher inspects
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
    }
}

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Attribute flags
    pub flags: MethodAttributes,
    /// The IL body, if the method has one
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// True if the method has no receiver (`this`).
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }
}
