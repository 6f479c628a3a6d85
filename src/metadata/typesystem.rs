//! Type definitions and type signatures.
//!
//! A [`TypeDef`] is a named declaration owning its fields and methods in declaration order.
//! Names are not required to be unique; lookups always return the first match. Field
//! types are described by [`TypeSig`], whose class and value-type variants name another
//! type that is resolved against the owning module by exact name.

use std::fmt;

use bitflags::bitflags;

use crate::metadata::{field::FieldDef, method::MethodDef, token::Token};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Type attributes (ECMA-335 II.23.1.15), the subset the patcher inspects
    pub struct TypeAttributes: u32 {
        /// Class is public
        const PUBLIC = 0x0000_0001;
        /// Class is nested with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Class is abstract
        const ABSTRACT = 0x0000_0080;
        /// Class cannot be extended
        const SEALED = 0x0000_0100;
        /// Initialize the class any time before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `int32`
    I4,
    /// `object`
    Object,
    /// `string`
    String,
    /// Reference type, by name
    Class(String),
    /// Value type, by name
    ValueType(String),
}

impl TypeSig {
    /// Name of the referenced type for class and value-type signatures.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match self {
            TypeSig::Class(name) | TypeSig::ValueType(name) => Some(name),
            _ => None,
        }
    }

    /// True for value-type signatures (including the primitive value types).
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeSig::ValueType(_) | TypeSig::Boolean | TypeSig::I4
        )
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Boolean => write!(f, "bool"),
            TypeSig::I4 => write!(f, "int32"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Class(name) => write!(f, "class {name}"),
            TypeSig::ValueType(name) => write!(f, "valuetype {name}"),
        }
    }
}

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Namespace (can be empty)
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Attribute flags
    pub flags: TypeAttributes,
    /// Name of the base type, if any
    pub extends: Option<String>,
    /// The type derives from `System.ValueType`
    pub is_value_type: bool,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
    /// Methods in declaration order
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Index of the first field named `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Index of the first method named `name`.
    #[must_use]
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|method| method.name == name)
    }
}
