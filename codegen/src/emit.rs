//! Textual AMD64 assembly output: walks a finalised (devirtualized) [`AsmContext`] and a
//! [`StackFrame`] and prints one GAS-compatible function body, in either syntax.
//!
//! The prologue/epilogue shape and the `__kefirrt_*`/`__kefir_debug_info_entry_N` symbol
//! conventions this prints against are an external interface other toolchain components link
//! against directly, not an internal naming choice this backend is free to rename.

use crate::asmcmp::{Arg, AsmContext, AsmOp, MemOperand, PhysReg, RegClass, RegRef, Segment};
use crate::entities::Label;
use crate::frame::{Region, StackFrame};
use crate::Config;
use ssacc_ir::{IdentifierKind, IrModule};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Which assembler dialect to print. GAS's Intel-syntax mode (`.intel_syntax noprefix`) is the
/// default; AT&T is offered for toolchains that assume it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Syntax {
    /// `.intel_syntax noprefix`: `op dst, src`, no `%`/`$` sigils.
    Intel,
    /// Traditional GAS AT&T: `op src, dst`, `%reg`, `$imm`.
    Att,
}

const CONDITION_NAMES: [&str; 6] = ["e", "ne", "l", "le", "g", "ge"];

fn condition_name(code: i64) -> &'static str {
    CONDITION_NAMES.get(code as usize).copied().unwrap_or("e")
}

/// Printer state for one function body.
pub struct Emitter<'a> {
    out: String,
    syntax: Syntax,
    module: &'a IrModule,
    emulated_tls: bool,
    position_independent_code: bool,
    debug_info: bool,
    labels: HashMap<Label, String>,
    next_label_ordinal: u32,
    next_debug_entry_ordinal: u32,
}

impl<'a> Emitter<'a> {
    /// Start a new printer against `config`, resolving string-table and identifier-kind references
    /// through `module`.
    pub fn new(config: &Config, module: &'a IrModule) -> Self {
        Emitter {
            out: String::new(),
            syntax: config.syntax,
            module,
            emulated_tls: config.emulated_tls,
            position_independent_code: config.position_independent_code,
            debug_info: config.debug_info,
            labels: HashMap::new(),
            next_label_ordinal: 0,
            next_debug_entry_ordinal: 0,
        }
    }

    fn strings(&self) -> &'a ssacc_ir::StringPool {
        self.module.strings()
    }

    fn label_name(&mut self, label: Label) -> String {
        if let Some(name) = self.labels.get(&label) {
            return name.clone();
        }
        let name = format!(".L{}", self.next_label_ordinal);
        self.next_label_ordinal += 1;
        self.labels.insert(label, name.clone());
        name
    }

    fn reg_text(&self, phys: PhysReg) -> String {
        match self.syntax {
            Syntax::Intel => phys.name().to_string(),
            Syntax::Att => format!("%{}", phys.name()),
        }
    }

    fn reg_ref_text(&self, reg: RegRef) -> String {
        match reg {
            RegRef::Physical(phys) => self.reg_text(phys),
            RegRef::Virtual(_) => "<unallocated>".to_string(),
        }
    }

    fn mem_text(&self, mem: &MemOperand) -> String {
        let mut inner = String::new();
        if let Some(base) = mem.base {
            inner.push_str(&self.reg_ref_text(base));
        }
        if let Some(index) = mem.index {
            if !inner.is_empty() {
                inner.push('+');
            }
            write!(inner, "{}*{}", self.reg_ref_text(index), mem.scale).unwrap();
        }
        if mem.disp != 0 || inner.is_empty() {
            if !inner.is_empty() && mem.disp >= 0 {
                inner.push('+');
            }
            write!(inner, "{}", mem.disp).unwrap();
        }
        let segment = match mem.segment {
            Some(Segment::Fs) => "fs:",
            Some(Segment::Gs) => "gs:",
            None => "",
        };
        match self.syntax {
            Syntax::Intel => format!("{}[{}]", segment, inner),
            Syntax::Att => format!("{}({})", segment, inner),
        }
    }

    /// Print a symbol reference, applying the thread-local relocation suffix the ABI fixes for a
    /// `thread-local-data` identifier: `__emutls_v.X` under the emulated-TLS model, `X@gottpoff`
    /// under position-independent code, `X@tpoff` otherwise. Any other identifier (or a symbol with
    /// no declared identifier, e.g. a synthesized runtime-helper label) prints as a bare name.
    fn symbol_text(&self, sym: ssacc_ir::StringId, offset: i64) -> String {
        let name = self.strings().resolve(sym);
        let is_thread_local = matches!(
            self.module.identifier(sym),
            Ok(identifier) if identifier.kind == IdentifierKind::ThreadLocalData
        );
        let base = if is_thread_local {
            if self.emulated_tls {
                format!("__emutls_v.{}", name)
            } else if self.position_independent_code {
                format!("{}@gottpoff", name)
            } else {
                format!("{}@tpoff", name)
            }
        } else {
            name.to_string()
        };
        if offset == 0 {
            base
        } else {
            format!("{}+{}", base, offset)
        }
    }

    fn arg_text(&mut self, arg: &Arg) -> String {
        match arg {
            Arg::None => String::new(),
            Arg::Physical(phys) => self.reg_text(*phys),
            Arg::Virtual(_) => "<unallocated>".to_string(),
            Arg::ImmInt(v) => match self.syntax {
                Syntax::Intel => format!("{}", v),
                Syntax::Att => format!("${}", v),
            },
            Arg::ImmSymbol(sym, offset) => self.symbol_text(*sym, *offset),
            Arg::ImmLabel(label) => self.label_name(*label),
            Arg::Memory(mem) => self.mem_text(mem),
        }
    }

    fn emit(&mut self, mnemonic: &str, arg0: &Arg, arg1: &Arg) {
        let a0 = self.arg_text(arg0);
        let a1 = self.arg_text(arg1);
        match (a0.is_empty(), a1.is_empty()) {
            (true, true) => writeln!(self.out, "\t{}", mnemonic).unwrap(),
            (false, true) => writeln!(self.out, "\t{} {}", mnemonic, a0).unwrap(),
            (false, false) => match self.syntax {
                Syntax::Intel => writeln!(self.out, "\t{} {}, {}", mnemonic, a0, a1).unwrap(),
                Syntax::Att => writeln!(self.out, "\t{} {}, {}", mnemonic, a1, a0).unwrap(),
            },
            (true, false) => writeln!(self.out, "\t{} {}", mnemonic, a1).unwrap(),
        }
    }

    fn emit_instruction(&mut self, ctx: &AsmContext, inst: crate::entities::AsmInst, frame: &StackFrame) {
        let (opcode, arg0, arg1) = ctx.data(inst);
        let (arg0, arg1) = (arg0.clone(), arg1.clone());
        match opcode {
            AsmOp::Label => {
                let name = self.arg_text(&arg0);
                writeln!(self.out, "{}:", name).unwrap();
            }
            AsmOp::Mov => self.emit("mov", &arg0, &arg1),
            AsmOp::Lea => self.emit("lea", &arg0, &arg1),
            AsmOp::Add => self.emit("add", &arg0, &arg1),
            AsmOp::Sub => self.emit("sub", &arg0, &arg1),
            AsmOp::IMul => self.emit("imul", &arg0, &arg1),
            AsmOp::IDiv => self.emit("idiv", &arg0, &arg1),
            AsmOp::Div => self.emit("div", &arg0, &arg1),
            AsmOp::And => self.emit("and", &arg0, &arg1),
            AsmOp::Or => self.emit("or", &arg0, &arg1),
            AsmOp::Xor => self.emit("xor", &arg0, &arg1),
            AsmOp::Neg => self.emit("neg", &arg0, &Arg::None),
            AsmOp::Not => self.emit("not", &arg0, &Arg::None),
            AsmOp::Shl => self.emit("shl", &arg0, &arg1),
            AsmOp::Shr => self.emit("shr", &arg0, &arg1),
            AsmOp::Sar => self.emit("sar", &arg0, &arg1),
            AsmOp::Cmp => self.emit("cmp", &arg0, &arg1),
            AsmOp::Test => self.emit("test", &arg0, &arg1),
            AsmOp::SetCc => {
                let code = match arg1 {
                    Arg::ImmInt(c) => c,
                    _ => 0,
                };
                self.emit(&format!("set{}", condition_name(code)), &arg0, &Arg::None);
            }
            AsmOp::Jmp => self.emit("jmp", &arg0, &Arg::None),
            AsmOp::Jcc => {
                let code = match arg1 {
                    Arg::ImmInt(c) => c,
                    _ => 0,
                };
                self.emit(&format!("j{}", condition_name(code)), &arg0, &Arg::None);
            }
            AsmOp::Call => self.emit("call", &arg0, &Arg::None),
            AsmOp::Ret => self.emit_epilogue(frame),
            AsmOp::MovSse => self.emit("movsd", &arg0, &arg1),
            AsmOp::AddSse => self.emit("addsd", &arg0, &arg1),
            AsmOp::SubSse => self.emit("subsd", &arg0, &arg1),
            AsmOp::MulSse => self.emit("mulsd", &arg0, &arg1),
            AsmOp::DivSse => self.emit("divsd", &arg0, &arg1),
            AsmOp::CmpSse => self.emit("comisd", &arg0, &arg1),
            AsmOp::Push => self.emit("push", &arg0, &Arg::None),
            AsmOp::Pop => self.emit("pop", &arg0, &Arg::None),
            AsmOp::Opaque => {
                let text = match &arg0 {
                    Arg::ImmSymbol(sym, _) => self.strings().resolve(*sym).to_string(),
                    _ => String::new(),
                };
                if !text.is_empty() {
                    writeln!(self.out, "\t{}", text).unwrap();
                }
            }
            AsmOp::Nop => writeln!(self.out, "\tnop").unwrap(),
        }
    }

    fn emit_prologue(&mut self, frame: &StackFrame) {
        let req = frame.requirements();
        if req.frame_pointer {
            self.emit("push", &Arg::Physical(PhysReg::gpr(5)), &Arg::None);
            self.emit("mov", &Arg::Physical(PhysReg::gpr(5)), &Arg::Physical(PhysReg::gpr(4)));
        }
        if frame.total_size() > 0 {
            self.emit("sub", &Arg::Physical(PhysReg::gpr(4)), &Arg::ImmInt(frame.total_size() as i64));
        }
        let _ = Region::PreservedRegs;
    }

    fn emit_epilogue(&mut self, frame: &StackFrame) {
        let req = frame.requirements();
        if frame.total_size() > 0 && !req.varying_stack_pointer {
            self.emit("add", &Arg::Physical(PhysReg::gpr(4)), &Arg::ImmInt(frame.total_size() as i64));
        }
        if req.frame_pointer {
            self.emit("pop", &Arg::Physical(PhysReg::gpr(5)), &Arg::None);
        }
        self.emit("ret", &Arg::None, &Arg::None);
    }

    /// Print a `__kefir_debug_info_entry_N` label if `position`'s source location differs from the
    /// one last printed. No-op unless [`Config::debug_info`] was set.
    fn emit_debug_info_label(&mut self, ctx: &AsmContext, position: u32, last: &mut Option<(ssacc_ir::StringId, u32, u32)>) {
        if !self.debug_info {
            return;
        }
        let current = ctx.source_map.lookup(position);
        if current.is_none() || current == *last {
            return;
        }
        *last = current;
        writeln!(self.out, "__kefir_debug_info_entry_{}:", self.next_debug_entry_ordinal).unwrap();
        self.next_debug_entry_ordinal += 1;
    }

    /// Print `name`'s body: a `.globl`/label header, the prologue, every instruction in `ctx`
    /// (already devirtualized), and the epilogue. Every `Ret` opcode in the body prints its own
    /// teardown sequence via [`Self::emit_epilogue`]; a trailing call covers a body that never
    /// reaches one (a function ending in `Unreachable`).
    pub fn emit_function(&mut self, name: &str, ctx: &AsmContext, frame: &StackFrame) {
        writeln!(self.out, ".globl {}", name).unwrap();
        writeln!(self.out, "{}:", name).unwrap();
        self.emit_prologue(frame);
        let mut last_location = None;
        let mut reached_ret = false;
        for (position, inst) in ctx.instructions().enumerate() {
            self.emit_debug_info_label(ctx, position as u32, &mut last_location);
            let (opcode, _, _) = ctx.data(inst);
            if opcode == AsmOp::Ret {
                reached_ret = true;
            }
            self.emit_instruction(ctx, inst, frame);
        }
        if !reached_ret {
            self.emit_epilogue(frame);
        }
    }

    /// Consume the printer, returning the accumulated assembly text.
    pub fn finish(self) -> String {
        self.out
    }
}

/// Print the syntax-mode directive GAS needs at the top of a translation unit.
pub fn syntax_directive(syntax: Syntax) -> &'static str {
    match syntax {
        Syntax::Intel => ".intel_syntax noprefix",
        Syntax::Att => ".att_syntax prefix",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asmcmp::{Arg, AsmOp, Hint};
    use crate::frame::FrameRequirements;
    use ssacc_ir::function::{Identifier, IdentifierKind, Scope};

    fn framed_pointer_requirements() -> FrameRequirements {
        FrameRequirements { frame_pointer: true, ..FrameRequirements::default() }
    }

    #[test]
    fn a_function_with_no_locals_prints_a_bare_prologue_and_ret() {
        let module = IrModule::new();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Ret, Arg::None, Arg::None);
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains(".globl f"));
        assert!(text.contains("ret"));
    }

    #[test]
    fn a_physical_move_prints_both_operands_in_intel_order() {
        let module = IrModule::new();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Mov, Arg::Physical(PhysReg::gpr(0)), Arg::ImmInt(5));
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains("mov rax, 5"));
    }

    #[test]
    fn unallocated_vreg_class_is_irrelevant_to_naming() {
        let module = IrModule::new();
        let mut ctx = AsmContext::new();
        let v = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        ctx.push(AsmOp::Mov, Arg::Virtual(v), Arg::ImmInt(1));
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains("<unallocated>"));
    }

    #[test]
    fn a_return_tears_down_the_frame_before_the_ret() {
        let module = IrModule::new();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Ret, Arg::None, Arg::None);
        let frame = StackFrame::calculate(framed_pointer_requirements()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        let push_at = text.find("push rbp").expect("prologue pushes rbp");
        let pop_at = text.find("pop rbp").expect("epilogue pops rbp");
        let ret_at = text.rfind("ret").expect("body ends in ret");
        assert!(push_at < pop_at, "pop rbp must follow the prologue's push");
        assert!(pop_at < ret_at, "pop rbp must precede the final ret");
    }

    #[test]
    fn a_body_ending_in_unreachable_still_tears_down_the_frame() {
        let module = IrModule::new();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        let frame = StackFrame::calculate(framed_pointer_requirements()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains("pop rbp"));
        assert!(text.trim_end().ends_with("ret"));
    }

    #[test]
    fn a_thread_local_symbol_gets_the_tpoff_relocation_by_default() {
        let mut module = IrModule::new();
        let name = module.strings_mut().intern("errno_tls");
        module
            .declare_identifier(
                name,
                Identifier { kind: IdentifierKind::ThreadLocalData, scope: Scope::Export, alias: None, debug_type_id: None },
            )
            .unwrap();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Mov, Arg::Physical(PhysReg::gpr(0)), Arg::ImmSymbol(name, 0));
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains("errno_tls@tpoff"));
    }

    #[test]
    fn emulated_tls_prints_the_emutls_accessor_symbol() {
        let mut module = IrModule::new();
        let name = module.strings_mut().intern("errno_tls");
        module
            .declare_identifier(
                name,
                Identifier { kind: IdentifierKind::ThreadLocalData, scope: Scope::Export, alias: None, debug_type_id: None },
            )
            .unwrap();
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Mov, Arg::Physical(PhysReg::gpr(0)), Arg::ImmSymbol(name, 0));
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let config = Config { emulated_tls: true, ..Config::default() };
        let mut emitter = Emitter::new(&config, &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(text.contains("__emutls_v.errno_tls"));
    }

    #[test]
    fn debug_info_prints_one_label_per_distinct_source_location() {
        let mut module = IrModule::new();
        let file = module.strings_mut().intern("a.c");
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        ctx.push(AsmOp::Ret, Arg::None, Arg::None);
        ctx.source_map.insert(0, 1, file, 1, 1).unwrap();
        ctx.source_map.insert(1, 2, file, 2, 1).unwrap();
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let config = Config { debug_info: true, ..Config::default() };
        let mut emitter = Emitter::new(&config, &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert_eq!(text.matches("__kefir_debug_info_entry_").count(), 2);
    }

    #[test]
    fn debug_info_off_by_default_prints_no_labels() {
        let mut module = IrModule::new();
        let file = module.strings_mut().intern("a.c");
        let mut ctx = AsmContext::new();
        ctx.push(AsmOp::Ret, Arg::None, Arg::None);
        ctx.source_map.insert(0, 1, file, 1, 1).unwrap();
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        let mut emitter = Emitter::new(&Config::default(), &module);
        emitter.emit_function("f", &ctx, &frame);
        let text = emitter.finish();
        assert!(!text.contains("__kefir_debug_info_entry_"));
    }
}
