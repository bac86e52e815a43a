//! The transformation pipeline: one module per pass, run in a configurable order over a
//! function's [`Container`].

mod bool_simplify;
mod constant_fold;
mod dead_alloc;
mod dead_code;
mod gvn;
mod strength_reduce;
mod tail_call;

use crate::container::Container;
use ssacc_ir::error::Result;

/// Options the pipeline consults while running passes. Mirrors the subset of the top-level
/// compiler configuration the optimizer cares about; the rest (syntax, PIC, frame-pointer
/// handling, ...) is consumed only by the codegen driver.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Upper bound on cumulative inline depth, consulted by the inliner (not by any pass here
    /// directly; kept on this record because it travels with the rest of the optimizer config).
    pub max_inline_depth: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_inline_depth: 8,
        }
    }
}

/// One transformation over a function's container. Implementations report whether they changed
/// anything so the pipeline driver can decide whether another round is worthwhile.
pub trait Pass {
    /// A short, stable name for logging and pipeline-spec parsing.
    fn name(&self) -> &'static str;

    /// Apply this pass once. Returns `true` if it mutated `container`.
    fn apply(&self, container: &mut Container, config: &PipelineConfig) -> Result<bool>;
}

/// An ordered sequence of passes, run once each per [`Pipeline::run`] call.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Pipeline { passes: Vec::new() }
    }

    /// Append `pass` to the end of the pipeline.
    pub fn push(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// The pipeline the compiler runs by default: dead-alloc and dead-code first (they shrink the
    /// function before the more expensive analyses run), then GVN, constant folding and strength
    /// reduction, then the two pattern-shaped cleanups that benefit from the simplified form.
    pub fn default_pipeline() -> Self {
        let mut pipeline = Pipeline::new();
        pipeline
            .push(Box::new(dead_alloc::DeadAlloc))
            .push(Box::new(dead_code::DeadCode))
            .push(Box::new(gvn::GlobalValueNumbering))
            .push(Box::new(constant_fold::ConstantFold))
            .push(Box::new(strength_reduce::StrengthReduce))
            .push(Box::new(bool_simplify::BoolSimplify))
            .push(Box::new(dead_code::DeadCode))
            .push(Box::new(tail_call::TailCall));
        pipeline
    }

    /// Run every pass once, in order, over `container`. Returns `true` if any pass reported a
    /// change.
    pub fn run(&self, container: &mut Container, config: &PipelineConfig) -> Result<bool> {
        let mut changed = false;
        for pass in &self.passes {
            if pass.apply(container, config)? {
                log::trace!("{} changed the function", pass.name());
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Run the full pipeline repeatedly until a round makes no change, bounded by `max_rounds` to
    /// guarantee termination even if two passes were to keep undoing each other's work.
    pub fn run_to_fixpoint(
        &self,
        container: &mut Container,
        config: &PipelineConfig,
        max_rounds: u32,
    ) -> Result<()> {
        for _ in 0..max_rounds {
            if !self.run(container, config)? {
                break;
            }
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new()
    }
}
