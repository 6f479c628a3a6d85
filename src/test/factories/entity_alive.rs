//! A module shaped like the game assembly around `EntityAlive::Init`.
//!
//! ```text
//! IL_0000: ldarg.0
//! IL_0001: ldarg.1
//! IL_0002: call Entity::Init
//! IL_0007: ldarg.0
//! IL_0008: ldfld class EModelBase EntityAlive::emodel
//! IL_000d: brfalse IL_001e
//! IL_0012: ldarg.0
//! IL_0013: ldfld class EModelBase EntityAlive::emodel
//! IL_0018: ldc.i4.1
//! IL_0019: callvirt EModelBase::SetVisible
//! IL_001e: ret
//! ```

use crate::{
    assembly::{BodyAssembler, InstructionId, MethodRef, OpCode},
    metadata::{
        builders::{FieldBuilder, MethodBuilder, TypeBuilder},
        module::{MethodHandle, Module, TypeHandle},
        token::Token,
        typesystem::TypeSig,
    },
};

pub struct EntityAliveFixture {
    pub module: Module,
    pub entity_alive: TypeHandle,
    pub init: MethodHandle,
    /// The `brfalse` guarding the early return
    pub guard: InstructionId,
    /// The trailing `ret`
    pub terminal: InstructionId,
}

fn method_ref(row: u32, owner: &str, name: &str) -> MethodRef {
    MethodRef {
        token: Token::from_parts(Token::MEMBER_REF, row),
        declaring_type: owner.to_string(),
        name: name.to_string(),
        param_count: 1,
        has_this: true,
        returns_value: false,
    }
}

pub fn entity_alive_module() -> EntityAliveFixture {
    let mut module = Module::new("Assembly-CSharp.dll");

    TypeBuilder::new("Entity")
        .extends("MonoBehaviour")
        .method(MethodBuilder::new("Init"))
        .build(&mut module)
        .unwrap();
    TypeBuilder::new("EModelBase")
        .method(MethodBuilder::new("SetVisible"))
        .build(&mut module)
        .unwrap();
    TypeBuilder::new("MinEventParams")
        .value_type()
        .field(FieldBuilder::new("Self", TypeSig::Class("EntityAlive".into())))
        .field(FieldBuilder::new("Seed", TypeSig::I4))
        .build(&mut module)
        .unwrap();
    let entity_alive = TypeBuilder::new("EntityAlive")
        .extends("Entity")
        .field(FieldBuilder::new("entityId", TypeSig::I4))
        .field(FieldBuilder::new("emodel", TypeSig::Class("EModelBase".into())))
        .field(FieldBuilder::new(
            "MinEventContext",
            TypeSig::ValueType("MinEventParams".into()),
        ))
        .method(MethodBuilder::new("Init"))
        .build(&mut module)
        .unwrap();

    let emodel = module.find_field(entity_alive, "emodel").unwrap();
    let emodel = module.field_ref(emodel).unwrap();

    let mut asm = BodyAssembler::new();
    asm.ldarg_0()
        .unwrap()
        .ldarg_1()
        .unwrap()
        .call(method_ref(1, "Entity", "Init"))
        .unwrap()
        .ldarg_0()
        .unwrap()
        .ldfld(emodel.clone())
        .unwrap()
        .brfalse("end")
        .unwrap()
        .ldarg_0()
        .unwrap()
        .ldfld(emodel)
        .unwrap()
        .ldc_i4(1)
        .unwrap()
        .callvirt(method_ref(2, "EModelBase", "SetVisible"))
        .unwrap()
        .label("end")
        .unwrap()
        .ret()
        .unwrap();
    let body = asm.finish().unwrap();

    let guard = body
        .instructions
        .iter()
        .find(|(_, instr)| instr.opcode == OpCode::Brfalse)
        .map(|(id, _)| id)
        .unwrap();
    let terminal = body.terminal().unwrap();

    let init = module.find_method(entity_alive, "Init").unwrap();
    module.set_body(init, body).unwrap();

    EntityAliveFixture {
        module,
        entity_alive,
        init,
        guard,
        terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_layout_matches_listing() {
        let fixture = entity_alive_module();
        let body = fixture
            .module
            .method(fixture.init)
            .unwrap()
            .body
            .as_ref()
            .unwrap();
        assert_eq!(
            body.instructions.render(fixture.guard).unwrap(),
            "IL_000d: brfalse IL_001e"
        );
        assert_eq!(
            body.instructions.render(fixture.terminal).unwrap(),
            "IL_001e: ret"
        );
        assert_eq!(body.max_stack, 2);
    }
}
