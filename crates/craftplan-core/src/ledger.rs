//! Transactional view over available resources.
//!
//! A [`Ledger`] is a multiset of items that the resolver extracts from and
//! injects into. Speculative work happens in a child view created with
//! [`Ledger::child`]; the child owns its own copy of the stock and logs every
//! mutation, and only [`Ledger::commit_into`] replays those mutations onto
//! the parent. Dropping a child discards its effects.

use crate::item::{FuzzyMode, ItemKey, ItemList, ItemStack};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Whether a ledger operation only reports or actually mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actionable {
    /// Report what would happen without changing state.
    Simulate,
    /// Perform the operation.
    Modulate,
}

/// The party on whose behalf a ledger operation is performed.
///
/// The ledger does not interpret this; it is carried into trace events for
/// attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSource {
    Planner,
    Player(u32),
    Machine(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    available: ItemList,
    extracted: ItemList,
    injected: ItemList,
    depth: u32,
}

impl Ledger {
    pub fn new(available: ItemList) -> Self {
        Self {
            available,
            ..Self::default()
        }
    }

    pub fn from_stacks(stacks: impl IntoIterator<Item = ItemStack>) -> Self {
        Self::new(stacks.into_iter().collect())
    }

    /// Nesting level: zero for a root ledger.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn available(&self) -> &ItemList {
        &self.available
    }

    /// Everything removed from this view since it was created.
    pub fn extracted(&self) -> &ItemList {
        &self.extracted
    }

    /// Everything added to this view since it was created.
    pub fn injected(&self) -> &ItemList {
        &self.injected
    }

    pub fn amount(&self, key: &ItemKey) -> u64 {
        self.available.get(key)
    }

    /// Available stacks fuzzy-equal to `key`.
    pub fn find_fuzzy(&self, key: &ItemKey, mode: FuzzyMode) -> Vec<ItemStack> {
        self.available.find_fuzzy(key, mode)
    }

    /// Extract up to `request.quantity` items of `request.key`.
    ///
    /// Returns the stack that was (or, under [`Actionable::Simulate`], would
    /// be) removed, or `None` when nothing is available.
    pub fn extract(
        &mut self,
        request: &ItemStack,
        mode: Actionable,
        src: &ActionSource,
    ) -> Option<ItemStack> {
        let held = self.available.get(&request.key);
        let amount = request.quantity.min(held);
        if amount == 0 {
            return None;
        }
        if mode == Actionable::Modulate {
            let removed = self.available.remove(&request.key, amount);
            self.extracted.add(request.key, removed);
        }
        trace!(
            ?src,
            ?mode,
            depth = self.depth,
            key = ?request.key,
            requested = request.quantity,
            amount,
            "ledger extract"
        );
        Some(request.with_quantity(amount))
    }

    /// Add produced items to this view.
    pub fn inject(&mut self, stack: &ItemStack, mode: Actionable, src: &ActionSource) {
        if mode == Actionable::Modulate {
            self.available.add_stack(stack);
            self.injected.add_stack(stack);
        }
        trace!(
            ?src,
            ?mode,
            depth = self.depth,
            key = ?stack.key,
            amount = stack.quantity,
            "ledger inject"
        );
    }

    /// Hide all current stock of `key` from this view without logging an
    /// extraction. Items injected later remain visible.
    pub fn ignore(&mut self, key: &ItemKey) {
        let held = self.available.get(key);
        let _ = self.available.remove(key, held);
    }

    /// A speculative view seeded from this ledger's current stock.
    pub fn child(&self) -> Ledger {
        Ledger {
            available: self.available.clone(),
            extracted: ItemList::new(),
            injected: ItemList::new(),
            depth: self.depth + 1,
        }
    }

    /// Replay this view's injections and extractions onto `parent`.
    pub fn commit_into(self, parent: &mut Ledger, src: &ActionSource) {
        for stack in self.injected.iter() {
            parent.inject(&stack, Actionable::Modulate, src);
        }
        for stack in self.extracted.iter() {
            let taken = parent
                .extract(&stack, Actionable::Modulate, src)
                .map_or(0, |s| s.quantity);
            if taken < stack.quantity {
                // The parent changed underneath the child.
                warn!(
                    key = ?stack.key,
                    expected = stack.quantity,
                    taken,
                    "ledger commit short"
                );
            }
        }
    }
}
