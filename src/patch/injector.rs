//! Splicing the field-store tail in front of the terminal `ret`.
//!
//! The tail is `this.<outer>.<inner> = this`:
//!
//! ```text
//! ldarg.0
//! ldflda  valuetype Outer Owner::outer
//! ldarg.0
//! stfld   class Owner Outer::inner
//! ```
//!
//! All validation happens before the method body is touched. The insertion is staged on a
//! copy of the body, re-encoded to make sure every short branch still reaches its target,
//! and only then written back, so a failed injection leaves the module unchanged.
//!
//! The tail pushes two values on top of whatever the method leaves for its `ret`, so
//! `max_stack` is raised to the peak depth of the staged body.

use log::debug;

use crate::{
    assembly::{stack_depths, verify_branches, FieldRef, Instruction, InstructionId, OpCode, Operand},
    metadata::{
        module::{MethodHandle, Module},
        typesystem::TypeSig,
    },
    patch::resolver::FieldChain,
    Error, Result,
};

/// Handles of the four instructions added by [`inject_tail`], in body order.
pub type TailHandles = [InstructionId; 4];

/// Insert the tail before the terminal `ret` of `method` and retarget `branch` to it.
///
/// # Errors
/// - [`Error::IllFormedPatch`] if the method, the branch or the field chain cannot carry
///   the tail, if a short branch would be pushed out of range, or if the stack depth at
///   the tail cannot be determined
/// - [`Error::Malformed`] for handles that do not belong to `module`
pub fn inject_tail(
    module: &mut Module,
    method: MethodHandle,
    branch: InstructionId,
    chain: &FieldChain,
) -> Result<TailHandles> {
    let (outer, inner) = tail_fields(module, method, chain)?;

    let def = module.method(method)?;
    if def.is_static() {
        return Err(ill_formed!("'{}' is static and has no receiver", def.name));
    }
    let Some(body) = def.body.as_ref() else {
        return Err(ill_formed!("'{}' has no body", def.name));
    };
    let Some(last) = body.terminal() else {
        return Err(ill_formed!("'{}' does not end in a ret", def.name));
    };
    match body.instructions.get(branch) {
        Some(instr) if body.instructions.position(branch).is_some() && instr.is_branch() => {}
        Some(instr) if body.instructions.position(branch).is_some() => {
            return Err(ill_formed!(
                "{} at IL_{:04x} is not a branch",
                instr.opcode,
                instr.offset
            ));
        }
        _ => {
            return Err(ill_formed!(
                "instruction {} is not part of '{}'",
                branch,
                def.name
            ));
        }
    }

    let mut staged = body.clone();
    let tail = [
        Instruction::simple(OpCode::Ldarg0),
        Instruction::new(OpCode::Ldflda, Operand::Field(outer)),
        Instruction::simple(OpCode::Ldarg0),
        Instruction::new(OpCode::Stfld, Operand::Field(inner)),
    ];
    let mut handles = [last; 4];
    for (slot, instruction) in handles.iter_mut().zip(tail) {
        *slot = staged.instructions.insert_before(last, instruction)?;
    }
    staged.instructions.set_target(branch, handles[0])?;

    verify_branches(&staged.instructions).map_err(|err| match err {
        Error::BranchOutOfRange { .. } => ill_formed!("{}", err),
        other => other,
    })?;
    if staged.terminal() != Some(last) {
        return Err(malformed_error!("Terminal instruction moved during injection"));
    }
    let depths = stack_depths(&staged.instructions).map_err(|err| match err {
        Error::Malformed { message, .. } => {
            ill_formed!("stack depth of '{}' cannot be determined: {}", def.name, message)
        }
        other => other,
    })?;
    if depths.at(handles[0]).is_none() {
        return Err(ill_formed!("the tail of '{}' is unreachable", def.name));
    }
    staged.max_stack = staged.max_stack.max(depths.peak());

    for handle in handles {
        debug!(
            "Inserted {}",
            staged.instructions.render(handle).unwrap_or_default()
        );
    }
    debug!(
        "Retargeted {}",
        staged.instructions.render(branch).unwrap_or_default()
    );

    module.set_body(method, staged)?;
    Ok(handles)
}

/// Check that `chain` can be written through a receiver of the method's type.
fn tail_fields(
    module: &Module,
    method: MethodHandle,
    chain: &FieldChain,
) -> Result<(FieldRef, FieldRef)> {
    let owner = method.owner();
    let owner_name = &module.type_def(owner)?.name;

    let outer = module.field(chain.outer)?;
    if outer.is_static() {
        return Err(ill_formed!("field '{}' is static", outer.name));
    }
    if chain.outer.owner() != owner {
        return Err(ill_formed!(
            "field '{}' is not declared on '{}'",
            outer.name,
            owner_name
        ));
    }
    if !matches!(outer.signature, TypeSig::ValueType(_)) {
        return Err(ill_formed!(
            "field '{}' has type {}, expected a value type",
            outer.name,
            outer.signature
        ));
    }

    let inner = module.field(chain.inner)?;
    if inner.is_static() {
        return Err(ill_formed!("field '{}' is static", inner.name));
    }
    if chain.inner.owner() != chain.outer_type {
        return Err(ill_formed!(
            "field '{}' is not declared on {}",
            inner.name,
            outer.signature
        ));
    }
    let assignable = match &inner.signature {
        TypeSig::Object => true,
        TypeSig::Class(name) => module.derives_from(owner, name),
        _ => false,
    };
    if !assignable {
        return Err(ill_formed!(
            "field '{}' of type {} cannot hold a '{}'",
            inner.name,
            inner.signature,
            owner_name
        ));
    }

    Ok((module.field_ref(chain.outer)?, module.field_ref(chain.inner)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{encode_instructions, BodyAssembler},
        metadata::{
            builders::{FieldBuilder, MethodBuilder, TypeBuilder},
            method::{MethodAttributes, MethodBody},
        },
        patch::resolver::resolve_field_chain,
        test::factories::entity_alive::{entity_alive_module, EntityAliveFixture},
    };

    fn chain_of(module: &Module, owner_name: &str) -> FieldChain {
        let owner = module.find_type(owner_name).unwrap();
        resolve_field_chain(module, owner, ["MinEventContext", "Self"]).unwrap()
    }

    #[test]
    fn tail_precedes_terminal_and_branch_is_retargeted() {
        let EntityAliveFixture {
            mut module,
            init,
            guard,
            terminal,
            ..
        } = entity_alive_module();
        let chain = chain_of(&module, "EntityAlive");
        let tail = inject_tail(&mut module, init, guard, &chain).unwrap();

        let body = module.method(init).unwrap().body.as_ref().unwrap();
        let ids = body.instructions.ids();
        assert_eq!(&ids[ids.len() - 5..ids.len() - 1], &tail);
        assert_eq!(body.terminal(), Some(terminal));
        assert_eq!(body.return_count(), 1);
        assert_eq!(
            body.instructions.get(guard).unwrap().operand,
            Operand::Target(tail[0])
        );

        let opcodes: Vec<OpCode> = tail
            .iter()
            .map(|id| body.instructions.get(*id).unwrap().opcode)
            .collect();
        assert_eq!(
            opcodes,
            vec![OpCode::Ldarg0, OpCode::Ldflda, OpCode::Ldarg0, OpCode::Stfld]
        );
        assert_eq!(
            body.instructions.render(tail[1]).unwrap(),
            format!(
                "IL_{:04x}: ldflda valuetype MinEventParams EntityAlive::MinEventContext",
                body.instructions.get(tail[1]).unwrap().offset
            )
        );
        assert!(body.max_stack >= 2);
    }

    #[test]
    fn static_method_is_rejected_without_mutation() {
        let EntityAliveFixture {
            mut module,
            init,
            guard,
            ..
        } = entity_alive_module();
        module.method_mut(init).unwrap().flags |= MethodAttributes::STATIC;
        let before = module.clone();
        let chain = chain_of(&module, "EntityAlive");

        assert!(matches!(
            inject_tail(&mut module, init, guard, &chain),
            Err(Error::IllFormedPatch { .. })
        ));
        assert_eq!(module, before);
    }

    #[test]
    fn non_branch_and_foreign_handles_are_rejected() {
        let EntityAliveFixture {
            mut module,
            init,
            terminal,
            ..
        } = entity_alive_module();
        let chain = chain_of(&module, "EntityAlive");
        let before = module.clone();

        assert!(matches!(
            inject_tail(&mut module, init, terminal, &chain),
            Err(Error::IllFormedPatch { .. })
        ));
        assert!(matches!(
            inject_tail(&mut module, init, InstructionId(999), &chain),
            Err(Error::IllFormedPatch { .. })
        ));
        assert_eq!(module, before);
    }

    #[test]
    fn reference_typed_outer_field_is_rejected() {
        let EntityAliveFixture {
            mut module, init, ..
        } = entity_alive_module();
        TypeBuilder::new("Holder")
            .field(FieldBuilder::new("Self", TypeSig::Class("EntityAlive".into())))
            .build(&mut module)
            .unwrap();
        // Same body, but on a subclass whose outer field is a class reference.
        let body = module.method(init).unwrap().body.clone().unwrap();
        let guard = body.instructions.ids()[find_guard_position(&body)];
        let owner = TypeBuilder::new("EntityRef")
            .extends("EntityAlive")
            .field(FieldBuilder::new(
                "MinEventContext",
                TypeSig::Class("Holder".into()),
            ))
            .method(MethodBuilder::new("Init").body(body))
            .build(&mut module)
            .unwrap();
        let method = module.find_method(owner, "Init").unwrap();
        let chain = resolve_field_chain(&module, owner, ["MinEventContext", "Self"]).unwrap();

        let before = module.clone();
        assert!(matches!(
            inject_tail(&mut module, method, guard, &chain),
            Err(Error::IllFormedPatch { .. })
        ));
        assert_eq!(module, before);
    }

    #[test]
    fn inner_field_must_accept_receiver() {
        let mut module = Module::new("m");
        TypeBuilder::new("Ctx")
            .value_type()
            .field(FieldBuilder::new("Self", TypeSig::Class("Other".into())))
            .build(&mut module)
            .unwrap();
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .brfalse("end")
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        let body = asm.finish().unwrap();
        let guard = body.instructions.ids()[1];
        let owner = TypeBuilder::new("Actor")
            .field(FieldBuilder::new("MinEventContext", TypeSig::ValueType("Ctx".into())))
            .method(MethodBuilder::new("Init").body(body))
            .build(&mut module)
            .unwrap();
        let method = module.find_method(owner, "Init").unwrap();
        let chain = resolve_field_chain(&module, owner, ["MinEventContext", "Self"]).unwrap();

        match inject_tail(&mut module, method, guard, &chain) {
            Err(Error::IllFormedPatch { reason }) => assert!(reason.contains("cannot hold")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_branch_pushed_out_of_range_fails_cleanly() {
        let EntityAliveFixture { mut module, .. } = entity_alive_module();
        // A brfalse.s guard followed by a br.s whose distance to `ret` is 120 bytes:
        // after the 12-byte tail it no longer fits in a signed byte.
        let mut asm = BodyAssembler::new();
        asm.ldarg_0().unwrap().brfalse("end").unwrap();
        asm.br_s("end").unwrap();
        for _ in 0..120 {
            asm.nop().unwrap();
        }
        asm.label("end").unwrap().ret().unwrap();
        let body = asm.finish().unwrap();
        encode_instructions(&body.instructions).unwrap();
        let guard = body.instructions.ids()[1];

        let alive = module.find_type("EntityAlive").unwrap();
        let init = module.find_method(alive, "Init").unwrap();
        module.set_body(init, body).unwrap();
        let before = module.clone();
        let chain = chain_of(&module, "EntityAlive");

        match inject_tail(&mut module, init, guard, &chain) {
            Err(Error::IllFormedPatch { reason }) => assert!(reason.contains("cannot reach")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(module, before);
    }

    /// Installs `asm`'s body as `EntityAlive::Init` and returns the first conditional branch.
    fn install_body(module: &mut Module, asm: BodyAssembler) -> (MethodHandle, InstructionId) {
        let body = asm.finish().unwrap();
        let guard = body.instructions.ids()[find_guard_position(&body)];
        let alive = module.find_type("EntityAlive").unwrap();
        let init = module.find_method(alive, "Init").unwrap();
        module.set_body(init, body).unwrap();
        (init, guard)
    }

    #[test]
    fn max_stack_covers_value_left_for_ret() {
        let EntityAliveFixture { mut module, .. } = entity_alive_module();
        // One value stays on the stack for `ret`; the tail runs on top of it.
        let mut asm = BodyAssembler::new();
        asm.ldc_i4(1)
            .unwrap()
            .ldarg_0()
            .unwrap()
            .brfalse("end")
            .unwrap()
            .pop()
            .unwrap()
            .ldc_i4(0)
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        let (init, guard) = install_body(&mut module, asm);
        assert_eq!(module.method(init).unwrap().body.as_ref().unwrap().max_stack, 2);
        let chain = chain_of(&module, "EntityAlive");

        let tail = inject_tail(&mut module, init, guard, &chain).unwrap();

        let body = module.method(init).unwrap().body.as_ref().unwrap();
        let depths = stack_depths(&body.instructions).unwrap();
        assert_eq!(depths.at(tail[0]), Some(1));
        assert_eq!(depths.at(body.terminal().unwrap()), Some(1));
        assert_eq!(body.max_stack, 3);
    }

    #[test]
    fn larger_max_stack_is_kept() {
        let EntityAliveFixture {
            mut module,
            init,
            guard,
            ..
        } = entity_alive_module();
        module
            .method_mut(init)
            .unwrap()
            .body
            .as_mut()
            .unwrap()
            .max_stack = 8;
        let chain = chain_of(&module, "EntityAlive");

        inject_tail(&mut module, init, guard, &chain).unwrap();
        assert_eq!(module.method(init).unwrap().body.as_ref().unwrap().max_stack, 8);
    }

    #[test]
    fn inconsistent_stack_at_ret_is_rejected_without_mutation() {
        let EntityAliveFixture { mut module, .. } = entity_alive_module();
        // The branch reaches `ret` with one value, the fall-through path with none.
        let mut asm = BodyAssembler::new();
        asm.ldarg_0()
            .unwrap()
            .ldarg_0()
            .unwrap()
            .brfalse("end")
            .unwrap()
            .pop()
            .unwrap()
            .label("end")
            .unwrap()
            .ret()
            .unwrap();
        let (init, guard) = install_body(&mut module, asm);
        let before = module.clone();
        let chain = chain_of(&module, "EntityAlive");

        match inject_tail(&mut module, init, guard, &chain) {
            Err(Error::IllFormedPatch { reason }) => assert!(reason.contains("stack depth")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(module, before);
    }

    fn find_guard_position(body: &MethodBody) -> usize {
        body.instructions
            .iter()
            .position(|(_, instr)| instr.opcode.is_branch_if_false())
            .unwrap()
    }
}
