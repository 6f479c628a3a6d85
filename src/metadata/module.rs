//! The in-memory module the patcher operates on.
//!
//! A [`Module`] owns every type, field, method and instruction transitively. The host loads
//! it, hands it to the patcher as `&mut Module`, and writes it back when the patch
//! succeeded. Entities are addressed through small `Copy` handles ([`TypeHandle`],
//! [`MethodHandle`], [`FieldHandle`]) so that lookups can be repeated and compared without
//! holding borrows across the mutating stage.

use crate::{
    assembly::FieldRef,
    metadata::{
        field::FieldDef,
        method::{MethodBody, MethodDef},
        token::Token,
        typesystem::TypeDef,
    },
    Error, Result,
};

/// Handle of a type definition inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub(crate) usize);

/// Handle of a method definition inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    pub(crate) owner: TypeHandle,
    pub(crate) index: usize,
}

impl MethodHandle {
    /// The type declaring the method.
    #[must_use]
    pub fn owner(&self) -> TypeHandle {
        self.owner
    }
}

/// Handle of a field definition inside a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldHandle {
    pub(crate) owner: TypeHandle,
    pub(crate) index: usize,
}

impl FieldHandle {
    /// The type declaring the field.
    #[must_use]
    pub fn owner(&self) -> TypeHandle {
        self.owner
    }
}

/// A loaded, mutable module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Module name (e.g. `Assembly-CSharp.dll`)
    pub name: String,
    types: Vec<TypeDef>,
    next_field_row: u32,
    next_method_row: u32,
}

impl Module {
    /// Create an empty module.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    /// All type definitions, in declaration order.
    #[must_use]
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// First type whose simple name equals `name`.
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<TypeHandle> {
        self.types
            .iter()
            .position(|ty| ty.name == name)
            .map(TypeHandle)
    }

    /// First method on `owner` whose name equals `name`.
    #[must_use]
    pub fn find_method(&self, owner: TypeHandle, name: &str) -> Option<MethodHandle> {
        self.types
            .get(owner.0)?
            .method_index(name)
            .map(|index| MethodHandle { owner, index })
    }

    /// First field on `owner` whose name equals `name`.
    #[must_use]
    pub fn find_field(&self, owner: TypeHandle, name: &str) -> Option<FieldHandle> {
        self.types
            .get(owner.0)?
            .field_index(name)
            .map(|index| FieldHandle { owner, index })
    }

    /// Access a type definition.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn type_def(&self, handle: TypeHandle) -> Result<&TypeDef> {
        self.types
            .get(handle.0)
            .ok_or_else(|| malformed_error!("Type handle {} out of range", handle.0))
    }

    /// Access a method definition.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn method(&self, handle: MethodHandle) -> Result<&MethodDef> {
        self.type_def(handle.owner)?
            .methods
            .get(handle.index)
            .ok_or_else(|| malformed_error!("Method handle {} out of range", handle.index))
    }

    /// Mutable access to a method definition.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn method_mut(&mut self, handle: MethodHandle) -> Result<&mut MethodDef> {
        self.types
            .get_mut(handle.owner.0)
            .and_then(|ty| ty.methods.get_mut(handle.index))
            .ok_or_else(|| malformed_error!("Method handle {} out of range", handle.index))
    }

    /// Access a field definition.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn field(&self, handle: FieldHandle) -> Result<&FieldDef> {
        self.type_def(handle.owner)?
            .fields
            .get(handle.index)
            .ok_or_else(|| malformed_error!("Field handle {} out of range", handle.index))
    }

    /// Operand-ready reference to a field definition.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn field_ref(&self, handle: FieldHandle) -> Result<FieldRef> {
        let owner = self.type_def(handle.owner)?;
        let field = self.field(handle)?;
        Ok(FieldRef {
            token: field.token,
            declaring_type: owner.name.clone(),
            name: field.name.clone(),
            signature: field.signature.clone(),
        })
    }

    /// True if `ty` is the type named `name` or derives from it.
    ///
    /// Walks the `extends` chain through the types defined in this module. The walk
    /// stops at the first base that is not defined here.
    #[must_use]
    pub fn derives_from(&self, ty: TypeHandle, name: &str) -> bool {
        let mut current = self.types.get(ty.0);
        // A well-formed hierarchy is acyclic, so it is never longer than the type list.
        for _ in 0..=self.types.len() {
            let Some(def) = current else {
                return false;
            };
            if def.name == name {
                return true;
            }
            match &def.extends {
                Some(base) if base == name => return true,
                Some(base) => current = self.find_type(base).and_then(|h| self.types.get(h.0)),
                None => return false,
            }
        }
        false
    }

    /// Replace the body of a method.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a handle from another module.
    pub fn set_body(&mut self, handle: MethodHandle, body: MethodBody) -> Result<()> {
        self.method_mut(handle)?.body = Some(body);
        Ok(())
    }

    /// Add a type definition, assigning tokens to it and its members.
    ///
    /// Tokens are allocated sequentially per table, as a compiler would lay them out.
    pub fn add_type(&mut self, mut def: TypeDef) -> TypeHandle {
        let row = u32::try_from(self.types.len() + 1).unwrap_or(u32::MAX);
        def.token = Token::from_parts(Token::TYPE_DEF, row);
        for field in &mut def.fields {
            self.next_field_row += 1;
            field.token = Token::from_parts(Token::FIELD, self.next_field_row);
        }
        for method in &mut def.methods {
            self.next_method_row += 1;
            method.token = Token::from_parts(Token::METHOD_DEF, self.next_method_row);
        }
        self.types.push(def);
        TypeHandle(self.types.len() - 1)
    }

    /// Look up a type by exact name, failing with [`Error::SymbolNotFound`].
    ///
    /// # Errors
    /// Returns [`Error::SymbolNotFound`] if no type is named `name`.
    pub fn require_type(&self, name: &str) -> Result<TypeHandle> {
        self.find_type(name).ok_or_else(|| Error::SymbolNotFound {
            kind: crate::SymbolKind::Type,
            name: name.to_string(),
        })
    }
}
