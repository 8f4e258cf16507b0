//! The crafting tree: an AND/OR structure of Need Nodes and Process Nodes.
//!
//! A [`NeedNode`] resolves a requirement for one item identity, first from
//! the ledger and then through its candidate [`ProcessNode`]s (OR). A
//! Process Node applies one pattern and owns one Need Node per input (AND).
//!
//! Nodes live in slotmap arenas addressed by [`NeedId`] / [`ProcessId`].
//! The whole tree is expanded eagerly at construction. Cycle filtering uses
//! an explicit ancestor path threaded through construction instead of
//! parent back-references:
//!
//! - a pattern already applied by an ancestor Process Node is rejected;
//! - a pattern producing an identity some ancestor Need Node is already
//!   resolving is rejected.
//!
//! Resolution (`request`), shortfall harvesting (`dive`) and mode switching
//! (`set_simulate`) are implemented in the `need` and `process` submodules.

mod need;
mod process;

use crate::cancel::CancelToken;
use crate::id::*;
use crate::item::{ItemKey, ItemStack};
use crate::ledger::ActionSource;
use crate::registry::{Registry, SlotContext};
use slotmap::SlotMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a resolution call did not return a satisfied stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The current branch cannot supply `missing.quantity` of `missing.key`.
    /// Callers exploring alternatives may recover from this.
    #[error("branch failure: short {} of {:?}", .missing.quantity, .missing.key)]
    BranchFailure { missing: ItemStack },
    /// Cooperative cancellation was observed. Never recovered locally.
    #[error("resolution cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Branch state
// ---------------------------------------------------------------------------

/// Per-branch resolution state of a Process Node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchState {
    /// Not attempted yet in this pass, or re-enabled after an absorbed failure.
    #[default]
    Untried,
    /// At least one repetition has been attempted.
    Active,
    /// Production yielded nothing usable; not retried in this pass.
    Exhausted,
}

impl BranchState {
    pub fn is_possible(self) -> bool {
        self != BranchState::Exhausted
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// The input slot a Need Node fills, if it belongs to a craftable pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub pattern: PatternId,
    pub index: usize,
}

/// Resolves a requirement for one item identity.
#[derive(Debug, Clone)]
pub struct NeedNode {
    stack: ItemStack,
    slot: Option<InputSlot>,
    candidates: Vec<ProcessId>,
    simulate: bool,
    missing: u64,
}

impl NeedNode {
    /// Identity plus the per-repetition quantity this node was created for.
    pub fn stack(&self) -> &ItemStack {
        &self.stack
    }

    pub fn key(&self) -> &ItemKey {
        &self.stack.key
    }

    pub fn slot(&self) -> Option<InputSlot> {
        self.slot
    }

    /// Candidate Process Nodes in pattern registration order.
    pub fn candidates(&self) -> &[ProcessId] {
        &self.candidates
    }

    pub fn is_simulating(&self) -> bool {
        self.simulate
    }

    /// Shortfall recorded during simulation and not yet harvested.
    pub fn missing(&self) -> u64 {
        self.missing
    }
}

/// One concrete application of a pattern.
#[derive(Debug, Clone)]
pub struct ProcessNode {
    pattern: PatternId,
    output: ItemKey,
    per_repetition: u64,
    inputs: Vec<(NeedId, u64)>,
    state: BranchState,
    depth: u32,
    crafts: u64,
    attempts: u32,
}

impl ProcessNode {
    pub fn pattern(&self) -> PatternId {
        self.pattern
    }

    /// The identity this process was created to supply.
    pub fn output(&self) -> &ItemKey {
        &self.output
    }

    /// Units of [`output`](Self::output) one repetition yields.
    pub fn per_repetition(&self) -> u64 {
        self.per_repetition
    }

    /// Input Need Nodes with the quantity each repetition consumes.
    pub fn inputs(&self) -> &[(NeedId, u64)] {
        &self.inputs
    }

    pub fn state(&self) -> BranchState {
        self.state
    }

    pub fn is_possible(&self) -> bool {
        self.state.is_possible()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Repetitions that ran and were kept in the current pass.
    pub fn crafts(&self) -> u64 {
        self.crafts
    }

    /// Repetition batches attempted in the current pass, kept or not.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Shared per-pass arguments threaded through every node call.
#[derive(Clone, Copy)]
pub(crate) struct Env<'a> {
    pub src: &'a ActionSource,
    pub ctx: &'a dyn SlotContext,
    pub cancel: &'a CancelToken,
}

/// Patterns and identities held by the ancestors of the node being built.
#[derive(Debug, Default)]
struct Ancestry {
    patterns: Vec<PatternId>,
    items: Vec<ItemKey>,
}

#[derive(Debug)]
pub struct CraftingTree<'r> {
    registry: &'r Registry,
    needs: SlotMap<NeedId, NeedNode>,
    processes: SlotMap<ProcessId, ProcessNode>,
    root: NeedId,
}

impl<'r> CraftingTree<'r> {
    /// Expand the full tree for `request` against the registry's patterns.
    pub fn new(registry: &'r Registry, request: ItemStack) -> Self {
        let mut tree = CraftingTree {
            registry,
            needs: SlotMap::with_key(),
            processes: SlotMap::with_key(),
            root: NeedId::default(),
        };
        let mut path = Ancestry::default();
        tree.root = tree.build_need(request, None, &mut path, 0);
        tree
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn root(&self) -> NeedId {
        self.root
    }

    pub fn root_node(&self) -> &NeedNode {
        &self.needs[self.root]
    }

    pub fn need(&self, id: NeedId) -> Option<&NeedNode> {
        self.needs.get(id)
    }

    pub fn process(&self, id: ProcessId) -> Option<&ProcessNode> {
        self.processes.get(id)
    }

    pub fn need_count(&self) -> usize {
        self.needs.len()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Candidate processes of the root, in the order they will be tried.
    pub fn root_candidates(&self) -> &[ProcessId] {
        &self.needs[self.root].candidates
    }

    /// True if no ancestor already applies `pattern_id` and none of its
    /// outputs is an identity an ancestor is already resolving.
    fn is_recursion_safe(&self, pattern_id: PatternId, path: &Ancestry) -> bool {
        if path.patterns.contains(&pattern_id) {
            return false;
        }
        match self.registry.get_pattern(pattern_id) {
            Some(pattern) => !pattern
                .outputs
                .iter()
                .any(|out| path.items.contains(&out.key)),
            None => false,
        }
    }

    fn build_need(
        &mut self,
        stack: ItemStack,
        slot: Option<InputSlot>,
        path: &mut Ancestry,
        depth: u32,
    ) -> NeedId {
        let registry = self.registry;
        let mut candidates = Vec::new();

        for &pattern_id in registry.patterns_for(&stack.key) {
            if !self.is_recursion_safe(pattern_id, path) {
                debug!(?pattern_id, key = ?stack.key, depth, "rejecting recursive pattern");
                continue;
            }
            path.patterns.push(pattern_id);
            path.items.push(stack.key);
            let process = self.build_process(pattern_id, stack.key, path, depth + 1);
            path.patterns.pop();
            path.items.pop();

            if let Some(process) = process {
                candidates.push(process);
            }
        }

        self.needs.insert(NeedNode {
            stack,
            slot,
            candidates,
            simulate: false,
            missing: 0,
        })
    }

    fn build_process(
        &mut self,
        pattern_id: PatternId,
        output: ItemKey,
        path: &mut Ancestry,
        depth: u32,
    ) -> Option<ProcessId> {
        let registry = self.registry;
        let pattern = registry.get_pattern(pattern_id)?;
        let per_repetition = process::amount_crafted(pattern, &output);
        if per_repetition == 0 {
            debug!(?pattern_id, key = ?output, "pattern yields nothing for requested key");
            return None;
        }

        let mut inputs = Vec::new();
        if pattern.is_craftable() {
            for (index, input) in pattern.inputs.iter().enumerate() {
                let Some(input) = input else { continue };
                let slot = InputSlot {
                    pattern: pattern_id,
                    index,
                };
                let need = self.build_need(input.clone(), Some(slot), path, depth + 1);
                inputs.push((need, input.quantity));
            }
        } else {
            for input in pattern.condensed_inputs() {
                let quantity = input.quantity;
                let need = self.build_need(input, None, path, depth + 1);
                inputs.push((need, quantity));
            }
        }

        Some(self.processes.insert(ProcessNode {
            pattern: pattern_id,
            output,
            per_repetition,
            inputs,
            state: BranchState::Untried,
            depth,
            crafts: 0,
            attempts: 0,
        }))
    }
}
