//! Exact-name symbol resolution.
//!
//! Read-only lookups returning module handles. Every lookup takes the first match in
//! declaration order, so resolving the same names twice against an unmodified module yields
//! identical handles.

use log::debug;

use crate::{
    metadata::module::{FieldHandle, MethodHandle, Module, TypeHandle},
    Error, Result, SymbolKind,
};

/// A field and a field of that field's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldChain {
    /// Field on the patched type
    pub outer: FieldHandle,
    /// The type the outer field's signature names
    pub outer_type: TypeHandle,
    /// Field on `outer_type`
    pub inner: FieldHandle,
}

/// Resolve `type_name::method_name`.
///
/// # Errors
/// - [`Error::IllFormedPatch`] if either name is empty
/// - [`Error::SymbolNotFound`] naming the type or the method that is missing
pub fn resolve(
    module: &Module,
    type_name: &str,
    method_name: &str,
) -> Result<(TypeHandle, MethodHandle)> {
    require_name(SymbolKind::Type, type_name)?;
    require_name(SymbolKind::Method, method_name)?;

    let ty = module.require_type(type_name)?;
    let method = module
        .find_method(ty, method_name)
        .ok_or_else(|| not_found(SymbolKind::Method, method_name))?;

    debug!(
        "Resolved {}::{} to {}",
        type_name,
        method_name,
        module.method(method)?.token
    );
    Ok((ty, method))
}

/// Resolve `path[0]` on `owner`, then `path[1]` on the type `path[0]` is declared as.
///
/// # Errors
/// - [`Error::IllFormedPatch`] if a name is empty or the outer field has a primitive type
/// - [`Error::SymbolNotFound`] for a missing field, or an outer field type not defined in
///   the module
pub fn resolve_field_chain(module: &Module, owner: TypeHandle, path: [&str; 2]) -> Result<FieldChain> {
    let [outer_name, inner_name] = path;
    require_name(SymbolKind::Field, outer_name)?;
    require_name(SymbolKind::Field, inner_name)?;

    let outer = module
        .find_field(owner, outer_name)
        .ok_or_else(|| not_found(SymbolKind::Field, outer_name))?;

    let signature = &module.field(outer)?.signature;
    let Some(nested_name) = signature.type_name() else {
        return Err(ill_formed!(
            "field '{}' has primitive type {}, expected a value type",
            outer_name,
            signature
        ));
    };
    let outer_type = module
        .find_type(nested_name)
        .ok_or_else(|| not_found(SymbolKind::Type, nested_name))?;

    let inner = module
        .find_field(outer_type, inner_name)
        .ok_or_else(|| not_found(SymbolKind::Field, inner_name))?;

    debug!(
        "Resolved field chain {}.{} through {}",
        outer_name, inner_name, nested_name
    );
    Ok(FieldChain {
        outer,
        outer_type,
        inner,
    })
}

fn require_name(kind: SymbolKind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ill_formed!("empty {} name", kind));
    }
    Ok(())
}

fn not_found(kind: SymbolKind, name: &str) -> Error {
    Error::SymbolNotFound {
        kind,
        name: name.to_string(),
    }
}
