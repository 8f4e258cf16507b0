use crate::id::*;
use crate::item::{FuzzyMode, ItemKey, ItemList, ItemStack};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An item type definition in the registry.
#[derive(Debug, Clone)]
pub struct ItemTypeDef {
    pub name: String,
    /// Maximum durability; zero for non-damageable items.
    pub max_damage: u32,
}

/// Which concrete items a craftable pattern accepts in one input slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRule {
    /// Only the exact key declared for the slot.
    #[default]
    Exact,
    /// Any variant of the declared item type.
    AnyVariant,
    /// Keys fuzzy-equal to the declared key under the given mode.
    Fuzzy(FuzzyMode),
}

/// Host-side capability consulted when validating slot contents.
///
/// The engine never inspects world state itself; hosts that need
/// world-dependent slot checks implement this.
pub trait SlotContext {
    fn accepts(&self, pattern: &Pattern, slot: usize, candidate: &ItemKey) -> bool;
}

/// A context that accepts anything the pattern's own slot rules allow.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWorld;

impl SlotContext for OpenWorld {
    fn accepts(&self, _pattern: &Pattern, _slot: usize, _candidate: &ItemKey) -> bool {
        true
    }
}

/// A production rule: ordered input slots and one or more outputs.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    /// One entry per input slot. `None` marks an empty slot.
    pub inputs: Vec<Option<ItemStack>>,
    pub outputs: Vec<ItemStack>,
    /// True for multi-ingredient crafting; false for pass-through processing.
    pub craftable: bool,
    /// Per-slot acceptance rules. Missing entries default to [`SlotRule::Exact`].
    pub slot_rules: Vec<SlotRule>,
}

impl Pattern {
    pub fn is_craftable(&self) -> bool {
        self.craftable
    }

    pub fn slot_rule(&self, slot: usize) -> SlotRule {
        self.slot_rules.get(slot).copied().unwrap_or_default()
    }

    /// Whether `candidate` may occupy input slot `slot`.
    pub fn is_valid_for_slot(
        &self,
        slot: usize,
        candidate: &ItemKey,
        ctx: &dyn SlotContext,
    ) -> bool {
        let Some(Some(declared)) = self.inputs.get(slot) else {
            return false;
        };
        let rule_ok = match self.slot_rule(slot) {
            SlotRule::Exact => declared.key == *candidate,
            SlotRule::AnyVariant => declared.key.item_type == candidate.item_type,
            SlotRule::Fuzzy(mode) => declared.key.fuzzy_matches(candidate, mode),
        };
        rule_ok && ctx.accepts(self, slot, candidate)
    }

    /// Inputs with equal keys merged, in first-appearance order.
    pub fn condensed_inputs(&self) -> Vec<ItemStack> {
        condense(self.inputs.iter().flatten())
    }

    /// Outputs with equal keys merged, in first-appearance order.
    pub fn condensed_outputs(&self) -> Vec<ItemStack> {
        condense(self.outputs.iter())
    }
}

fn condense<'a>(stacks: impl Iterator<Item = &'a ItemStack>) -> Vec<ItemStack> {
    let mut out: Vec<ItemStack> = Vec::new();
    for stack in stacks {
        if let Some(existing) = out.iter_mut().find(|s| s.key == stack.key) {
            existing.quantity = existing.quantity.saturating_add(stack.quantity);
        } else {
            out.push(stack.clone());
        }
    }
    out
}

/// Builder for constructing an immutable Registry.
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    items: Vec<ItemTypeDef>,
    item_name_to_id: HashMap<String, ItemTypeId>,
    patterns: Vec<Pattern>,
    pattern_name_to_id: HashMap<String, PatternId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a non-damageable item type. Returns its ID.
    pub fn register_item(&mut self, name: &str) -> ItemTypeId {
        self.register_damageable_item(name, 0)
    }

    /// Phase 1: Register an item type with a maximum durability.
    pub fn register_damageable_item(&mut self, name: &str, max_damage: u32) -> ItemTypeId {
        let id = ItemTypeId(self.items.len() as u32);
        self.items.push(ItemTypeDef {
            name: name.to_string(),
            max_damage,
        });
        self.item_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Phase 1: Register a pattern. Returns its ID. Registration order is
    /// the order in which candidates are tried during resolution.
    pub fn register_pattern(&mut self, pattern: Pattern) -> PatternId {
        let id = PatternId(self.patterns.len() as u32);
        self.pattern_name_to_id.insert(pattern.name.clone(), id);
        self.patterns.push(pattern);
        id
    }

    /// Phase 1: Register a pass-through processing pattern from
    /// `(item, quantity)` pairs.
    pub fn register_processing(
        &mut self,
        name: &str,
        inputs: Vec<(ItemTypeId, u64)>,
        outputs: Vec<(ItemTypeId, u64)>,
    ) -> PatternId {
        self.register_pattern(Pattern {
            name: name.to_string(),
            inputs: inputs
                .into_iter()
                .map(|(item, q)| Some(ItemStack::of(item, q)))
                .collect(),
            outputs: outputs
                .into_iter()
                .map(|(item, q)| ItemStack::of(item, q))
                .collect(),
            craftable: false,
            slot_rules: Vec::new(),
        })
    }

    /// Phase 2: Mutate an existing pattern by name.
    pub fn mutate_pattern<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Pattern),
    {
        let id = self
            .pattern_name_to_id
            .get(name)
            .ok_or(RegistryError::NotFound(name.to_string()))?;
        f(&mut self.patterns[id.0 as usize]);
        Ok(())
    }

    /// Lookup item type ID by name.
    pub fn item_id(&self, name: &str) -> Option<ItemTypeId> {
        self.item_name_to_id.get(name).copied()
    }

    /// Lookup pattern ID by name.
    pub fn pattern_id(&self, name: &str) -> Option<PatternId> {
        self.pattern_name_to_id.get(name).copied()
    }

    /// Key for an item registered under `name`, carrying its durability.
    pub fn item_key(&self, name: &str) -> Option<ItemKey> {
        let id = self.item_id(name)?;
        let def = &self.items[id.0 as usize];
        Some(ItemKey::damageable(id, 0, def.max_damage))
    }

    /// Phase 3: Finalize and build the immutable registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut by_output: HashMap<ItemKey, Vec<PatternId>> = HashMap::new();

        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.outputs.is_empty() || pattern.outputs.iter().any(|o| o.quantity == 0) {
                return Err(RegistryError::EmptyOutput(pattern.name.clone()));
            }
            let stacks = pattern.inputs.iter().flatten().chain(pattern.outputs.iter());
            for stack in stacks {
                if stack.key.item_type.0 as usize >= self.items.len() {
                    return Err(RegistryError::InvalidItemRef(stack.key.item_type));
                }
            }

            let id = PatternId(index as u32);
            for output in pattern.condensed_outputs() {
                by_output.entry(output.key).or_default().push(id);
            }
        }

        Ok(Registry {
            items: self.items,
            item_name_to_id: self.item_name_to_id,
            patterns: self.patterns,
            pattern_name_to_id: self.pattern_name_to_id,
            by_output,
        })
    }
}

/// Immutable registry. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct Registry {
    items: Vec<ItemTypeDef>,
    item_name_to_id: HashMap<String, ItemTypeId>,
    patterns: Vec<Pattern>,
    pattern_name_to_id: HashMap<String, PatternId>,
    by_output: HashMap<ItemKey, Vec<PatternId>>,
}

impl Registry {
    pub fn get_item(&self, id: ItemTypeId) -> Option<&ItemTypeDef> {
        self.items.get(id.0 as usize)
    }

    pub fn get_pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(id.0 as usize)
    }

    pub fn item_id(&self, name: &str) -> Option<ItemTypeId> {
        self.item_name_to_id.get(name).copied()
    }

    pub fn pattern_id(&self, name: &str) -> Option<PatternId> {
        self.pattern_name_to_id.get(name).copied()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Patterns whose outputs include `key`, in registration order.
    pub fn patterns_for(&self, key: &ItemKey) -> &[PatternId] {
        self.by_output.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if at least one pattern produces `key`.
    pub fn is_craftable(&self, key: &ItemKey) -> bool {
        !self.patterns_for(key).is_empty()
    }

    /// Every distinct output the registry can produce.
    pub fn craftable_items(&self) -> ItemList {
        self.by_output.keys().map(|k| ItemStack::new(*k, 1)).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid item reference: {0:?}")]
    InvalidItemRef(ItemTypeId),
    #[error("pattern '{0}' has no output or a zero-quantity output")]
    EmptyOutput(String),
}
