//! Serde data file structs for pattern book definitions.
//!
//! These structs define the on-disk format for items, patterns, stock and
//! jobs. They are deserialized from RON, JSON, or TOML data files and then
//! resolved into core types by the loader.

use craftplan_core::job::JobConfig;
use craftplan_core::registry::SlotRule;
use serde::Deserialize;

// ===========================================================================
// Items
// ===========================================================================

/// An item type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    /// Maximum durability. Omit (or zero) for items that do not wear.
    #[serde(default)]
    pub max_damage: u32,
}

/// A reference to an item by name with a quantity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EntryData {
    /// Short form: `("item_name", quantity)`.
    Short(String, u64),
    /// Full form, naming a specific variant.
    Full {
        item: String,
        quantity: u64,
        #[serde(default)]
        damage: u32,
        #[serde(default)]
        tag: Option<u64>,
    },
}

impl EntryData {
    pub fn item(&self) -> &str {
        match self {
            EntryData::Short(item, _) | EntryData::Full { item, .. } => item,
        }
    }

    pub fn quantity(&self) -> u64 {
        match self {
            EntryData::Short(_, quantity) | EntryData::Full { quantity, .. } => *quantity,
        }
    }
}

// ===========================================================================
// Patterns
// ===========================================================================

/// A pattern definition in a data file.
///
/// For craftable patterns `inputs` lists the grid slots in order, with
/// `None` (RON) or `null` (JSON) marking an empty slot. TOML has no null,
/// so TOML pattern books list filled slots only.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternData {
    pub name: String,
    #[serde(default)]
    pub craftable: bool,
    pub inputs: Vec<Option<EntryData>>,
    pub outputs: Vec<EntryData>,
    /// Per-slot substitution rules. Missing entries mean exact matches only.
    #[serde(default)]
    pub slot_rules: Vec<SlotRule>,
}

// ===========================================================================
// Jobs
// ===========================================================================

/// A named crafting request in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobData {
    pub name: String,
    pub item: String,
    pub quantity: u64,
    #[serde(default)]
    pub config: JobConfig,
}

// ===========================================================================
// TOML wrappers (TOML does not support top-level arrays)
// ===========================================================================

/// Wrapper for a list of items in TOML format.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlItems {
    pub items: Vec<ItemData>,
}

/// Wrapper for a list of patterns in TOML format.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlPatterns {
    pub patterns: Vec<PatternData>,
}

// ===========================================================================
// Tests
// ===========================================================================
