use crate::id::ItemTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an item: its type plus the variant data that distinguishes
/// otherwise identical items (durability, opaque tag).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemKey {
    pub item_type: ItemTypeId,
    /// Damage (or sub-type metadata for non-damageable items).
    #[serde(default)]
    pub damage: u32,
    /// Maximum durability. Zero means the item is not damageable.
    #[serde(default)]
    pub max_damage: u32,
    /// Opaque variant hash, e.g. of attached tag data.
    #[serde(default)]
    pub tag: Option<u64>,
}

impl ItemKey {
    pub fn new(item_type: ItemTypeId) -> Self {
        Self {
            item_type,
            damage: 0,
            max_damage: 0,
            tag: None,
        }
    }

    pub fn damageable(item_type: ItemTypeId, damage: u32, max_damage: u32) -> Self {
        Self {
            item_type,
            damage,
            max_damage,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn is_damageable(&self) -> bool {
        self.max_damage > 0
    }

    /// Compare two keys under a fuzzy matching mode.
    ///
    /// The item type must always match. Damageable items compare by
    /// durability bucket; other items compare by damage value only, so tag
    /// differences are always tolerated.
    pub fn fuzzy_matches(&self, other: &ItemKey, mode: FuzzyMode) -> bool {
        if self.item_type != other.item_type {
            return false;
        }
        if !self.is_damageable() || !other.is_damageable() {
            return self.damage == other.damage;
        }
        match mode {
            FuzzyMode::IgnoreAll => true,
            FuzzyMode::Percent99 => (self.damage > 1) == (other.damage > 1),
            _ => {
                let bp = mode.break_point();
                self.above_break_point(bp) == other.above_break_point(bp)
            }
        }
    }

    /// True when the remaining durability fraction is above `bp` percent.
    fn above_break_point(&self, bp: u64) -> bool {
        let max = u64::from(self.max_damage);
        let remaining = max.saturating_sub(u64::from(self.damage));
        remaining * 100 > bp * max
    }
}

/// `ItemTypeId(3)`, followed by `@damage/max` for damageable items (or
/// `@damage` for non-zero metadata) and `#tag` when tagged.
impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.item_type)?;
        if self.is_damageable() {
            write!(f, "@{}/{}", self.damage, self.max_damage)?;
        } else if self.damage != 0 {
            write!(f, "@{}", self.damage)?;
        }
        if let Some(tag) = self.tag {
            write!(f, "#{tag}")?;
        }
        Ok(())
    }
}

/// How loosely variant data is compared when searching for substitutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMode {
    IgnoreAll,
    Percent99,
    Percent75,
    Percent50,
    Percent25,
}

impl FuzzyMode {
    /// Remaining-durability break point, in percent.
    pub fn break_point(self) -> u64 {
        match self {
            FuzzyMode::IgnoreAll => 0,
            FuzzyMode::Percent99 => 99,
            FuzzyMode::Percent75 => 75,
            FuzzyMode::Percent50 => 50,
            FuzzyMode::Percent25 => 25,
        }
    }
}

/// An item identity with a quantity: the Item Requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub key: ItemKey,
    pub quantity: u64,
}

impl ItemStack {
    pub fn new(key: ItemKey, quantity: u64) -> Self {
        Self { key, quantity }
    }

    /// Shorthand for a non-damageable, untagged item.
    pub fn of(item_type: ItemTypeId, quantity: u64) -> Self {
        Self::new(ItemKey::new(item_type), quantity)
    }

    /// A copy of this stack's identity with a different quantity.
    pub fn with_quantity(&self, quantity: u64) -> Self {
        Self {
            key: self.key,
            quantity,
        }
    }
}

/// Ordered multiset of items keyed by identity.
///
/// Iteration order is the key order, which keeps fuzzy searches and
/// snapshot encodings deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    entries: BTreeMap<ItemKey, u64>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: ItemKey, quantity: u64) {
        if quantity == 0 {
            return;
        }
        let entry = self.entries.entry(key).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    pub fn add_stack(&mut self, stack: &ItemStack) {
        self.add(stack.key, stack.quantity);
    }

    /// Remove up to `quantity` items. Returns the amount actually removed.
    #[must_use = "returns the quantity actually removed, which may be less than requested"]
    pub fn remove(&mut self, key: &ItemKey, quantity: u64) -> u64 {
        let Some(current) = self.entries.get_mut(key) else {
            return 0;
        };
        let removed = quantity.min(*current);
        *current -= removed;
        if *current == 0 {
            self.entries.remove(key);
        }
        removed
    }

    pub fn get(&self, key: &ItemKey) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// All stored stacks fuzzy-equal to `key`, in key order.
    pub fn find_fuzzy(&self, key: &ItemKey, mode: FuzzyMode) -> Vec<ItemStack> {
        self.entries
            .iter()
            .filter(|(k, _)| k.fuzzy_matches(key, mode))
            .map(|(k, &q)| ItemStack::new(*k, q))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemStack> + '_ {
        self.entries.iter().map(|(k, &q)| ItemStack::new(*k, q))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total items across all keys.
    pub fn total(&self) -> u64 {
        self.entries.values().fold(0u64, |acc, q| acc.saturating_add(*q))
    }
}

impl FromIterator<ItemStack> for ItemList {
    fn from_iter<I: IntoIterator<Item = ItemStack>>(iter: I) -> Self {
        let mut list = ItemList::new();
        for stack in iter {
            list.add_stack(&stack);
        }
        list
    }
}
