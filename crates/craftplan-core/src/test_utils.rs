//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::cancel::CancelToken;
use crate::id::*;
use crate::item::{ItemKey, ItemStack};
use crate::ledger::{ActionSource, Ledger};
use crate::registry::{OpenWorld, Pattern, Registry, RegistryBuilder, SlotRule};
use crate::tree::{CraftingTree, ResolveError};

// ===========================================================================
// Stack and ledger constructors
// ===========================================================================

pub fn stack(item: ItemTypeId, quantity: u64) -> ItemStack {
    ItemStack::of(item, quantity)
}

pub fn ledger_with(items: &[(ItemTypeId, u64)]) -> Ledger {
    Ledger::from_stacks(items.iter().map(|&(item, q)| ItemStack::of(item, q)))
}

pub fn amount(ledger: &Ledger, item: ItemTypeId) -> u64 {
    ledger.amount(&ItemKey::new(item))
}

pub fn planner() -> ActionSource {
    ActionSource::Planner
}

/// Resolve `quantity` of the tree's root against `ledger` with an open world
/// and a token nobody cancels.
pub fn resolve(
    tree: &mut CraftingTree<'_>,
    quantity: u64,
    ledger: &mut Ledger,
) -> Result<ItemStack, ResolveError> {
    tree.request(quantity, ledger, &planner(), &OpenWorld, &CancelToken::new())
}

// ===========================================================================
// Pattern constructors
// ===========================================================================

/// A craftable pattern with one slot per entry of `slots`.
pub fn make_craftable(
    name: &str,
    slots: Vec<Option<(ItemTypeId, u64)>>,
    output: (ItemTypeId, u64),
) -> Pattern {
    Pattern {
        name: name.to_string(),
        inputs: slots
            .into_iter()
            .map(|slot| slot.map(|(item, q)| ItemStack::of(item, q)))
            .collect(),
        outputs: vec![ItemStack::of(output.0, output.1)],
        craftable: true,
        slot_rules: Vec::new(),
    }
}

/// Same as [`make_craftable`] with one rule applied to every slot.
pub fn make_craftable_with_rule(
    name: &str,
    slots: Vec<Option<(ItemTypeId, u64)>>,
    output: (ItemTypeId, u64),
    rule: SlotRule,
) -> Pattern {
    let mut pattern = make_craftable(name, slots, output);
    pattern.slot_rules = vec![rule; pattern.inputs.len()];
    pattern
}

// ===========================================================================
// Registry fixtures
// ===========================================================================

/// Items `a` and `b` plus one pattern converting 2 × b into 1 × a.
pub struct Conversion {
    pub registry: Registry,
    pub a: ItemTypeId,
    pub b: ItemTypeId,
    pub pattern: PatternId,
}

pub fn conversion_registry() -> Conversion {
    let mut builder = RegistryBuilder::new();
    let a = builder.register_item("a");
    let b = builder.register_item("b");
    let pattern = builder.register_processing("a_from_b", vec![(b, 2)], vec![(a, 1)]);
    Conversion {
        registry: builder.build().expect("conversion registry"),
        a,
        b,
        pattern,
    }
}

/// Two patterns for `a`: the first needs `rare` (never stocked), the second
/// needs `common`.
pub struct Fallback {
    pub registry: Registry,
    pub a: ItemTypeId,
    pub rare: ItemTypeId,
    pub common: ItemTypeId,
    pub from_rare: PatternId,
    pub from_common: PatternId,
}

pub fn fallback_registry() -> Fallback {
    let mut builder = RegistryBuilder::new();
    let a = builder.register_item("a");
    let rare = builder.register_item("rare");
    let common = builder.register_item("common");
    let from_rare = builder.register_processing("a_from_rare", vec![(rare, 1)], vec![(a, 1)]);
    let from_common =
        builder.register_processing("a_from_common", vec![(common, 1)], vec![(a, 1)]);
    Fallback {
        registry: builder.build().expect("fallback registry"),
        a,
        rare,
        common,
        from_rare,
        from_common,
    }
}

/// A linear chain: `item_0` is raw and each `item_i` takes two `item_{i-1}`.
///
/// Returns the registry and the ids from raw to final product.
pub fn build_chain_registry(length: usize) -> (Registry, Vec<ItemTypeId>) {
    let mut builder = RegistryBuilder::new();
    let items: Vec<ItemTypeId> = (0..=length)
        .map(|i| builder.register_item(&format!("item_{i}")))
        .collect();
    for pair in items.windows(2) {
        let name = format!("make_{}", pair[1].0);
        builder.register_processing(&name, vec![(pair[0], 2)], vec![(pair[1], 1)]);
    }
    (builder.build().expect("chain registry"), items)
}

/// One product with `fan_out` alternative patterns, each consuming its own
/// raw item. Returns the registry, the product and the raw items in
/// registration order.
pub fn build_wide_registry(fan_out: usize) -> (Registry, ItemTypeId, Vec<ItemTypeId>) {
    let mut builder = RegistryBuilder::new();
    let product = builder.register_item("product");
    let raws: Vec<ItemTypeId> = (0..fan_out)
        .map(|i| builder.register_item(&format!("raw_{i}")))
        .collect();
    for (i, &raw) in raws.iter().enumerate() {
        builder.register_processing(&format!("route_{i}"), vec![(raw, 1)], vec![(product, 1)]);
    }
    (builder.build().expect("wide registry"), product, raws)
}
