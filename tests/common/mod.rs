//! Fixture modules shared by the integration tests.

#![allow(dead_code)]

use cilpatch::prelude::*;

/// Install `env_logger` once per test binary; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The game-side types around `EntityAlive::Init`, without `Init`'s body.
pub fn entity_types(module: &mut Module) -> Result<TypeHandle> {
    TypeBuilder::new("Entity")
        .extends("MonoBehaviour")
        .method(MethodBuilder::new("Init"))
        .build(module)?;
    TypeBuilder::new("MinEventParams")
        .value_type()
        .field(FieldBuilder::new("Self", TypeSig::Class("EntityAlive".into())))
        .field(FieldBuilder::new("Other", TypeSig::Class("EntityAlive".into())))
        .build(module)?;
    TypeBuilder::new("EntityAlive")
        .extends("Entity")
        .field(FieldBuilder::new("isEntityRemote", TypeSig::Boolean))
        .field(FieldBuilder::new(
            "MinEventContext",
            TypeSig::ValueType("MinEventParams".into()),
        ))
        .method(MethodBuilder::new("Awake"))
        .method(MethodBuilder::new("Init"))
        .build(module)
}

/// `Init` guarded by `if (!isEntityRemote) return;`, ending in a single `ret`.
///
/// ```text
/// IL_0000: ldarg.0
/// IL_0001: ldarg.1
/// IL_0002: call Entity::Init
/// IL_0007: ldarg.0
/// IL_0008: ldfld bool EntityAlive::isEntityRemote
/// IL_000d: brfalse IL_0014
/// IL_0012: nop
/// IL_0013: nop
/// IL_0014: ret
/// ```
pub fn init_body(module: &Module, owner: TypeHandle) -> Result<MethodBody> {
    let remote = module
        .find_field(owner, "isEntityRemote")
        .ok_or_else(|| Error::SymbolNotFound {
            kind: SymbolKind::Field,
            name: "isEntityRemote".into(),
        })?;
    let base_init = MethodRef {
        token: Token::new(0x0A00_0001),
        declaring_type: "Entity".into(),
        name: "Init".into(),
        param_count: 1,
        has_this: true,
        returns_value: false,
    };

    let mut asm = BodyAssembler::new();
    asm.ldarg_0()?
        .ldarg_1()?
        .call(base_init)?
        .ldarg_0()?
        .ldfld(module.field_ref(remote)?)?
        .brfalse("end")?
        .nop()?
        .nop()?
        .label("end")?
        .ret()?;
    asm.finish()
}

/// A complete module with the guarded `EntityAlive::Init`.
pub fn game_module() -> Result<(Module, MethodHandle)> {
    let mut module = Module::new("Assembly-CSharp.dll");
    let alive = entity_types(&mut module)?;
    let body = init_body(&module, alive)?;
    let init = module
        .find_method(alive, "Init")
        .ok_or_else(|| Error::SymbolNotFound {
            kind: SymbolKind::Method,
            name: "Init".into(),
        })?;
    module.set_body(init, body)?;
    Ok((module, init))
}

/// The body of `method`, which the fixtures always provide.
pub fn body_of(module: &Module, method: MethodHandle) -> &MethodBody {
    module
        .method(method)
        .ok()
        .and_then(|def| def.body.as_ref())
        .expect("fixture method has a body")
}

/// Rendered listing of a body, one `IL_xxxx: ...` line per instruction.
pub fn listing(body: &MethodBody) -> Vec<String> {
    body.instructions
        .ids()
        .iter()
        .filter_map(|id| body.instructions.render(*id))
        .collect()
}
