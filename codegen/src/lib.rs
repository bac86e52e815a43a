//! AMD64 System-V machine-code emitter.
//!
//! Takes one `ssacc_ir::IrFunction`'s legacy-bytecode body through the optimizer's SSA form
//! (`ssacc-optimizer`), lowers it into this crate's own virtual-assembly representation
//! ([`asmcmp`]), assigns physical registers and a stack frame, and prints AMD64 assembly text
//! against the System V calling convention (`ssacc-abi`).
//!
//! The pipeline is seven stages, each its own module: [`lower`] turns SSA instructions into
//! asmcmp virtual instructions; [`regalloc`] computes liveness and assigns registers; [`frame`]
//! lays out the stack frame the allocator's spill/preserved-register counts require; [`devirt`]
//! rewrites every vreg reference into its final physical-register-or-memory form; [`emit`] prints
//! the result. [`inline_asm`] sits alongside lowering, expanding one `asm` statement's declared
//! parameter bindings and template into a single opaque asmcmp instruction. [`function`] is the
//! glue that runs one function through all of it.

pub mod asmcmp;
pub mod devirt;
pub mod emit;
pub mod entities;
pub mod frame;
pub mod function;
pub mod inline_asm;
pub mod lower;
pub mod regalloc;

pub use emit::Syntax;
pub use function::{compile_function, compile_module, CompiledFunction};

/// Backend-wide configuration, threaded by [`compile_function`]/[`compile_module`] into every
/// stage that needs it: the optimizer's inliner, frame layout, and the emitter.
#[derive(Clone, Debug)]
pub struct Config {
    /// Use the initial-exec/local-exec model's runtime TLS resolution trampoline instead of the
    /// general-dynamic model when addressing thread-local symbols.
    pub emulated_tls: bool,
    /// Generate position-independent addressing (`X@gottpoff` instead of `X@tpoff` for
    /// thread-local symbols; see [`emit::Emitter::symbol_text`]).
    pub position_independent_code: bool,
    /// Skip the `rbp` push/mov and address locals relative to `rsp` (never set when a
    /// variable-size allocation is present — see
    /// [`frame::FrameRequirements::varying_stack_pointer`]).
    pub omit_frame_pointer: bool,
    /// Which assembler dialect [`emit`] prints.
    pub syntax: Syntax,
    /// Emit `__kefir_debug_info_entry_N` labels at each instruction whose
    /// [`asmcmp::SourceMap`]-recorded location differs from the one last printed.
    pub debug_info: bool,
    /// Upper bound on cumulative inline depth the optimizer's inliner is allowed to reach before
    /// it must stop expanding call sites (see `ssacc_optimizer::Inlines`).
    pub max_inline_depth: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            emulated_tls: false,
            position_independent_code: false,
            omit_frame_pointer: false,
            syntax: Syntax::Intel,
            debug_info: false,
            max_inline_depth: 8,
        }
    }
}
