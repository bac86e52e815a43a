//! Bookkeeping for which source functions have already been inlined into which block, so the
//! inliner can bound recursion depth and refuse to re-inline a function already on the path.

use crate::entities::Block;
use ssacc_entity::SecondaryMap;
use ssacc_ir::StringId;
use std::collections::HashMap;

/// The inline depth and provenance recorded for one source function within one block's ancestry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct InlineRecord {
    depth: u32,
}

/// Per-block record of which functions have been inlined into it, directly or transitively.
#[derive(Default, Clone)]
struct BlockInlines {
    sources: HashMap<StringId, InlineRecord>,
}

/// Tracks, for every block in a function, the set of source functions already inlined into it
/// and at what cumulative depth. Queried by the inliner before splicing a candidate's blocks in,
/// and updated after the splice completes.
#[derive(Default)]
pub struct Inlines {
    blocks: SecondaryMap<Block, BlockInlines>,
}

impl Inlines {
    /// An empty tracker: no block has had anything inlined into it yet.
    pub fn new() -> Self {
        Inlines::default()
    }

    /// `can-inline`: `false` if `candidate` is already on `block`'s inline path (would create a
    /// cycle), or if inlining it would push `block`'s cumulative depth past `max_depth`.
    pub fn can_inline(&self, block: Block, candidate: StringId, max_depth: u32) -> bool {
        match self.blocks[block].sources.get(&candidate) {
            Some(_) => false,
            None => self.deepest(block) < max_depth,
        }
    }

    fn deepest(&self, block: Block) -> u32 {
        self.blocks[block]
            .sources
            .values()
            .map(|r| r.depth)
            .max()
            .unwrap_or(0)
    }

    /// `block-inlined-from`: record that `src_block` (from `src_fn`) was spliced into
    /// `dst_block` (in `dst_fn`) as a direct inline. `dst_fn`'s own provenance set gains `src_fn`
    /// at depth 1 above whatever `dst_block` already carried, and transitively inherits every
    /// source already recorded against `src_block` (from when `src_fn` itself inlined other
    /// functions), each shifted by that same depth increment.
    pub fn block_inlined_from(
        &mut self,
        dst_block: Block,
        dst_fn: StringId,
        src_fn: StringId,
        src_block: Block,
    ) {
        let base_depth = self.deepest(dst_block) + 1;
        let inherited: Vec<(StringId, u32)> = self.blocks[src_block]
            .sources
            .iter()
            .map(|(&fn_id, rec)| (fn_id, rec.depth))
            .collect();

        let dst = &mut self.blocks[dst_block];
        dst.sources
            .entry(src_fn)
            .and_modify(|rec| rec.depth = rec.depth.max(base_depth))
            .or_insert(InlineRecord { depth: base_depth });

        for (fn_id, src_depth) in inherited {
            let carried_depth = base_depth + src_depth;
            dst.sources
                .entry(fn_id)
                .and_modify(|rec| rec.depth = rec.depth.max(carried_depth))
                .or_insert(InlineRecord {
                    depth: carried_depth,
                });
        }
        // `dst_fn` identifies the caller for symmetry with the splice call site; this tracker
        // only needs to know what was inlined *into* `dst_block`, not which function owns it, so
        // it isn't otherwise consulted here.
        let _ = dst_fn;
    }

    /// The cumulative inline depth already recorded against `block`, or `0` if nothing has been
    /// inlined into it.
    pub fn depth(&self, block: Block) -> u32 {
        self.deepest(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_entity::EntityRef;

    fn block(n: u32) -> Block {
        Block::new(n as usize)
    }

    fn intern(pool: &mut ssacc_ir::StringPool, s: &str) -> StringId {
        pool.intern(s)
    }

    #[test]
    fn fresh_block_allows_any_inline_within_depth() {
        let mut pool = ssacc_ir::StringPool::new();
        let f = intern(&mut pool, "f");
        let inlines = Inlines::new();
        assert!(inlines.can_inline(block(0), f, 4));
    }

    #[test]
    fn already_inlined_function_is_refused() {
        let mut pool = ssacc_ir::StringPool::new();
        let caller = intern(&mut pool, "caller");
        let callee = intern(&mut pool, "callee");
        let mut inlines = Inlines::new();
        inlines.block_inlined_from(block(0), caller, callee, block(1));
        assert!(!inlines.can_inline(block(0), callee, 10));
    }

    #[test]
    fn depth_bound_is_enforced() {
        let mut pool = ssacc_ir::StringPool::new();
        let caller = intern(&mut pool, "caller");
        let mut inlines = Inlines::new();
        for i in 0..3 {
            let callee = intern(&mut pool, &format!("callee{}", i));
            assert!(inlines.can_inline(block(0), callee, 3));
            inlines.block_inlined_from(block(0), caller, callee, block(1));
        }
        let last = intern(&mut pool, "callee-over");
        assert!(!inlines.can_inline(block(0), last, 3));
    }

    #[test]
    fn transitive_merge_carries_source_set_and_depth() {
        let mut pool = ssacc_ir::StringPool::new();
        let a = intern(&mut pool, "a");
        let b = intern(&mut pool, "b");
        let c = intern(&mut pool, "c");
        let mut inlines = Inlines::new();
        // b inlined c into b's block 1.
        inlines.block_inlined_from(block(1), b, c, block(2));
        assert_eq!(inlines.depth(block(1)), 1);
        // a now inlines b (whose block 1 carries c) into a's block 0.
        inlines.block_inlined_from(block(0), a, b, block(1));
        assert!(!inlines.can_inline(block(0), b, 10));
        assert!(!inlines.can_inline(block(0), c, 10));
        assert_eq!(inlines.depth(block(0)), 2);
    }
}
