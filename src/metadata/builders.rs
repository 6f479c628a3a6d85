//! Fluent builders for adding types, fields and methods to a [`Module`].
//!
//! Hosts that load a module from disk populate it through these builders, and so do the
//! test fixtures. Builders are consuming (`self -> Self`) and validate required fields in
//! `build`, returning [`crate::Error::Malformed`] on missing or inconsistent input.
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
//! let alive = TypeBuilder::new("EntityAlive")
//!     .extends("Entity")
//!     .field(FieldBuilder::new("MinEventContext", TypeSig::ValueType("MinEventParams".into())))
//!     .method(MethodBuilder::new("Init"))
//!     .build(&mut module)?;
//! assert!(module.find_method(alive, "Init").is_some());
//! # Ok::<(), cilpatch::Error>(())
//! ```

use crate::{
    metadata::{
        field::{FieldAttributes, FieldDef},
        method::{MethodAttributes, MethodBody, MethodDef},
        module::{Module, TypeHandle},
        token::Token,
        typesystem::{TypeAttributes, TypeDef, TypeSig},
    },
    Result,
};

/// Builder for a [`FieldDef`].
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    flags: FieldAttributes,
    signature: TypeSig,
}

impl FieldBuilder {
    /// Creates a public instance field of the given type.
    #[must_use]
    pub fn new(name: &str, signature: TypeSig) -> Self {
        Self {
            name: name.to_string(),
            flags: FieldAttributes::PUBLIC,
            signature,
        }
    }

    /// Replaces the attribute flags.
    #[must_use]
    pub fn flags(mut self, flags: FieldAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Marks the field as static.
    #[must_use]
    pub fn static_field(mut self) -> Self {
        self.flags |= FieldAttributes::STATIC;
        self
    }

    fn into_def(self) -> Result<FieldDef> {
        if self.name.is_empty() {
            return Err(malformed_error!("Field name must not be empty"));
        }
        Ok(FieldDef {
            token: Token::default(),
            name: self.name,
            flags: self.flags,
            signature: self.signature,
        })
    }
}

/// Builder for a [`MethodDef`].
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    name: String,
    flags: MethodAttributes,
    body: Option<MethodBody>,
}

impl MethodBuilder {
    /// Creates a public instance method without a body.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            body: None,
        }
    }

    /// Replaces the attribute flags.
    #[must_use]
    pub fn flags(mut self, flags: MethodAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Marks the method as static.
    #[must_use]
    pub fn static_method(mut self) -> Self {
        self.flags |= MethodAttributes::STATIC;
        self
    }

    /// Attaches an IL body, usually produced by [`crate::assembly::BodyAssembler`].
    #[must_use]
    pub fn body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    fn into_def(self) -> Result<MethodDef> {
        if self.name.is_empty() {
            return Err(malformed_error!("Method name must not be empty"));
        }
        if self.body.is_some() && self.flags.contains(MethodAttributes::ABSTRACT) {
            return Err(malformed_error!(
                "Abstract method '{}' cannot carry a body",
                self.name
            ));
        }
        Ok(MethodDef {
            token: Token::default(),
            name: self.name,
            flags: self.flags,
            body: self.body,
        })
    }
}

/// Builder for a [`TypeDef`] and its members.
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    namespace: String,
    name: String,
    flags: TypeAttributes,
    extends: Option<String>,
    is_value_type: bool,
    fields: Vec<FieldBuilder>,
    methods: Vec<MethodBuilder>,
}

impl TypeBuilder {
    /// Creates a public class in the global namespace.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            namespace: String::new(),
            name: name.to_string(),
            flags: TypeAttributes::PUBLIC,
            extends: None,
            is_value_type: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Sets the base type by name.
    #[must_use]
    pub fn extends(mut self, base: &str) -> Self {
        self.extends = Some(base.to_string());
        self
    }

    /// Makes this a sealed value type deriving from `System.ValueType`.
    #[must_use]
    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self.extends = Some("ValueType".to_string());
        self.flags |= TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT;
        self
    }

    /// Replaces the attribute flags.
    #[must_use]
    pub fn flags(mut self, flags: TypeAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a method.
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Validates the definition and adds it to `module`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type or one of its members has an empty name.
    pub fn build(self, module: &mut Module) -> Result<TypeHandle> {
        if self.name.is_empty() {
            return Err(malformed_error!("Type name must not be empty"));
        }

        let fields = self
            .fields
            .into_iter()
            .map(FieldBuilder::into_def)
            .collect::<Result<Vec<_>>>()?;
        let methods = self
            .methods
            .into_iter()
            .map(MethodBuilder::into_def)
            .collect::<Result<Vec<_>>>()?;

        Ok(module.add_type(TypeDef {
            token: Token::default(),
            namespace: self.namespace,
            name: self.name,
            flags: self.flags,
            extends: self.extends,
            is_value_type: self.is_value_type,
            fields,
            methods,
        }))
    }
}
