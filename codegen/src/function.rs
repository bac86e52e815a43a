//! Per-function compilation: runs one [`ssacc_ir::IrFunction`] through every stage from legacy
//! bytecode to printed assembly text.
//!
//! The seven stages (SSA lift, optimize, classify, lower, allocate, devirtualize, emit) are kept
//! as separate crate modules; this file is only the glue that hands each stage's output to the
//! next one and decides what frame requirements fall out of what the allocator actually used.

use crate::asmcmp::AsmContext;
use crate::emit::{syntax_directive, Emitter};
use crate::frame::{FrameRequirements, StackFrame};
use crate::regalloc;
use crate::{devirt, lower, Config};
use ssacc_abi::classify::{classify_function, FunctionClassification};
use ssacc_abi::layout::{calculate_type_layout, calculate_type_properties, LayoutContext, Variant};
use ssacc_ir::error::Result;
use ssacc_ir::types::{IrType, Slot, TypeCode};
use ssacc_ir::{IrFunction, IrModule};
use ssacc_optimizer::{build_from_legacy, Pipeline, PipelineConfig};

/// How many optimizer fixpoint rounds to allow before giving up and taking whatever the pipeline
/// has converged to so far; the same bound the optimizer crate's own tests use.
const MAX_OPTIMIZER_ROUNDS: u32 = 16;

fn extract_subtree(ty: &IrType, start: Slot) -> IrType {
    use ssacc_entity::EntityRef;
    let end = ty.subtree_end(start);
    let mut out = IrType::new();
    for index in start.index()..end.index() {
        out.push(*ty.entry(Slot::new(index)).expect("index within subtree_end is in range"));
    }
    out
}

/// Split a function's flattened parameter-list type into one [`IrType`] per parameter, the way
/// `ssacc_abi::classify_function` expects them. A `Struct`-headed parameter list decomposes into
/// its direct children (one call argument per member); anything else (a single-parameter function
/// whose parameter list is just that parameter's own type, or the empty type for a niladic
/// function) is taken whole.
fn decompose_parameters(params_type: &IrType) -> Vec<IrType> {
    use ssacc_entity::EntityRef;
    if params_type.is_empty() {
        return Vec::new();
    }
    match params_type.entry(Slot::new(0)) {
        Some(entry) if entry.typecode == TypeCode::Struct => {
            let mut out = Vec::new();
            let mut cursor = Slot::new(1);
            for _ in 0..entry.child_count() {
                let next = params_type.subtree_end(cursor);
                out.push(extract_subtree(params_type, cursor));
                cursor = next;
            }
            out
        }
        _ => vec![extract_subtree(params_type, Slot::new(0))],
    }
}

fn classify(module: &IrModule, function: &IrFunction) -> Result<FunctionClassification> {
    let params_type = module.ty(function.decl().params_type)?;
    let parameter_types = decompose_parameters(params_type);
    let result_type = module.ty(function.decl().result_type)?;
    let return_type = if result_type.is_empty() { None } else { Some(result_type) };
    classify_function(&parameter_types, return_type)
}

fn frame_requirements(
    module: &IrModule,
    function: &IrFunction,
    summary: &regalloc::AllocationSummary,
    config: &Config,
) -> Result<FrameRequirements> {
    let locals_type = module.ty(function.locals_type())?;
    let (local_area_size, local_area_alignment) = if locals_type.is_empty() {
        (0, 1)
    } else {
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Stack, locals_type)?;
        calculate_type_properties(locals_type, &layout)?
    };
    Ok(FrameRequirements {
        frame_pointer: !config.omit_frame_pointer,
        preserved_gpr_count: summary.callee_saved_used.len() as u32,
        save_x87_control_word: false,
        save_mxcsr: false,
        local_area_size,
        local_area_alignment,
        spill_area_slots: summary.spill_slots_used,
        temporary_area_size: 0,
        temporary_area_alignment: 1,
        is_variadic: function.decl().variadic,
        varying_stack_pointer: false,
    })
}

/// The result of compiling one function: its printed assembly body and the frame it was laid out
/// against (callers assembling a whole translation unit need the latter for nothing further;
/// it's surfaced for tests and for debug-info emission that wants region offsets).
pub struct CompiledFunction {
    /// The function's GAS-syntax assembly text, not including the syntax-mode directive (that's
    /// shared across every function in a translation unit; see [`syntax_directive`]).
    pub text: String,
    /// The frame this function's locals, spills and preserved registers were laid out against.
    pub frame: StackFrame,
}

/// Run `function` through every codegen stage and print its assembly body per `config`.
pub fn compile_function(module: &IrModule, function: &IrFunction, config: &Config) -> Result<CompiledFunction> {
    let name = module.strings().resolve(function.name()).to_string();
    log::debug!("compiling {}", name);

    let mut container = build_from_legacy(function)?;
    let pipeline_config = PipelineConfig { max_inline_depth: config.max_inline_depth };
    Pipeline::default_pipeline().run_to_fixpoint(&mut container, &pipeline_config, MAX_OPTIMIZER_ROUNDS)?;

    let classification = classify(module, function)?;

    let mut ctx = AsmContext::new();
    lower::lower_function(&mut ctx, &container, &classification)?;
    log::trace!("{}: lowered to {} virtual instructions", name, ctx.len());

    let intervals = regalloc::compute_liveness(&ctx);
    let summary = regalloc::allocate(&mut ctx, intervals)?;
    if summary.spill_slots_used > 0 {
        log::debug!("{}: register allocation spilled {} value(s)", name, summary.spill_slots_used);
    }

    let frame = StackFrame::calculate(frame_requirements(module, function, &summary, config)?)?;
    devirt::devirtualize(&mut ctx, &frame)?;

    let mut emitter = Emitter::new(config, module);
    emitter.emit_function(&name, &ctx, &frame);
    Ok(CompiledFunction { text: emitter.finish(), frame })
}

/// Compile every function in `module`, concatenating their assembly bodies behind one leading
/// syntax-mode directive.
pub fn compile_module(module: &IrModule, config: &Config) -> Result<String> {
    let mut out = String::new();
    out.push_str(syntax_directive(config.syntax));
    out.push('\n');
    for function in module.functions() {
        let compiled = compile_function(module, function, config)?;
        out.push_str(&compiled.text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::function::{FunctionDecl, Scope};
    use ssacc_ir::opcode::{Instruction, Param};
    use ssacc_ir::{IdentifierKind, Identifier, Opcode};

    fn leaf_function_returning_a_constant(module: &mut IrModule) -> ssacc_ir::StringId {
        let void = module.add_type(IrType::new());
        let name = module.strings_mut().intern("answer");
        module
            .declare_identifier(
                name,
                Identifier { kind: IdentifierKind::Function, scope: Scope::Export, alias: None, debug_type_id: None },
            )
            .unwrap();
        let decl = FunctionDecl { params_type: void, result_type: void, variadic: false };
        let mut function = ssacc_ir::IrFunction::new(name, decl, void);
        function.push_instruction(Instruction::nullary(Opcode::ConstInt, Param::Int(42)));
        function.push_instruction(Instruction::unary(Opcode::Return, 0u32, Param::None));
        module.add_function(function).unwrap();
        name
    }

    #[test]
    fn a_constant_returning_function_compiles_to_a_ret() {
        let mut module = IrModule::new();
        let name = leaf_function_returning_a_constant(&mut module);
        let function = module.function(name).unwrap();
        let compiled = compile_function(&module, function, &Config::default()).unwrap();
        assert!(compiled.text.contains("ret"));
        assert!(compiled.text.contains(".globl answer"));
    }
}
