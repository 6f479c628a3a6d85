//! Field definitions.

use bitflags::bitflags;

use crate::metadata::{token::Token, typesystem::TypeSig};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Field attributes (ECMA-335 II.23.1.5)
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Attribute flags
    pub flags: FieldAttributes,
    /// Declared type
    pub signature: TypeSig,
}

impl FieldDef {
    /// True if the field is defined on the type rather than per instance.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }
}
