//! Data-driven pattern loading from JSON.
//!
//! Feature-gated behind `data-loader`. Provides JSON deserialization into
//! [`RegistryBuilder`] and [`Ledger`] for a single in-memory pattern book.
//!
//! This is the JSON subset of the `craftplan-data` schema: entries use the
//! full object form (`item`, `quantity`, optional `damage` and `tag`) only,
//! and items, patterns and stock are passed as strings rather than files.
//! The multi-format, directory-based loader with short-form entries and
//! jobs lives in the `craftplan-data` crate.

use crate::item::{ItemKey, ItemStack};
use crate::ledger::Ledger;
use crate::registry::{Pattern, Registry, RegistryBuilder, RegistryError, SlotRule};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("unknown item reference: {0}")]
    UnknownItemRef(String),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level pattern book for JSON deserialization.
#[derive(Debug, serde::Deserialize)]
pub struct PatternBookData {
    #[serde(default)]
    pub items: Vec<ItemData>,
    #[serde(default)]
    pub patterns: Vec<PatternData>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ItemData {
    pub name: String,
    #[serde(default)]
    pub max_damage: u32,
}

#[derive(Debug, serde::Deserialize)]
pub struct PatternData {
    pub name: String,
    /// One entry per slot; `null` marks an empty slot.
    #[serde(default)]
    pub inputs: Vec<Option<EntryData>>,
    pub outputs: Vec<EntryData>,
    #[serde(default)]
    pub craftable: bool,
    #[serde(default)]
    pub slot_rules: Vec<SlotRule>,
}

/// An item reference by name with a quantity and optional variant data.
#[derive(Debug, serde::Deserialize)]
pub struct EntryData {
    pub item: String,
    pub quantity: u64,
    #[serde(default)]
    pub damage: u32,
    #[serde(default)]
    pub tag: Option<u64>,
}

impl EntryData {
    /// `base` with this entry's variant data applied.
    fn key_from(&self, mut base: ItemKey) -> ItemKey {
        base.damage = self.damage;
        base.tag = self.tag;
        base
    }
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a pattern book from a JSON string.
pub fn load_registry_json(json: &str) -> Result<RegistryBuilder, DataLoadError> {
    let data: PatternBookData = serde_json::from_str(json)?;
    build_registry(data)
}

/// Load a pattern book from JSON bytes.
pub fn load_registry_json_bytes(bytes: &[u8]) -> Result<RegistryBuilder, DataLoadError> {
    let data: PatternBookData = serde_json::from_slice(bytes)?;
    build_registry(data)
}

/// Load ledger stock from a JSON array of entries, resolving names against
/// a built registry.
pub fn load_stock_json(json: &str, registry: &Registry) -> Result<Ledger, DataLoadError> {
    let entries: Vec<EntryData> = serde_json::from_str(json)?;
    let stacks = entries
        .iter()
        .map(|entry| {
            let id = registry
                .item_id(&entry.item)
                .ok_or_else(|| DataLoadError::UnknownItemRef(entry.item.clone()))?;
            let max_damage = registry.get_item(id).map_or(0, |def| def.max_damage);
            let key = entry.key_from(ItemKey::damageable(id, 0, max_damage));
            Ok(ItemStack::new(key, entry.quantity))
        })
        .collect::<Result<Vec<_>, DataLoadError>>()?;
    Ok(Ledger::from_stacks(stacks))
}

fn resolve_entry(
    builder: &RegistryBuilder,
    entry: &EntryData,
) -> Result<ItemStack, DataLoadError> {
    let base = builder
        .item_key(&entry.item)
        .ok_or_else(|| DataLoadError::UnknownItemRef(entry.item.clone()))?;
    Ok(ItemStack::new(entry.key_from(base), entry.quantity))
}

fn build_registry(data: PatternBookData) -> Result<RegistryBuilder, DataLoadError> {
    let mut builder = RegistryBuilder::new();

    // Phase 1: Register all items
    for item in &data.items {
        builder.register_damageable_item(&item.name, item.max_damage);
    }

    // Phase 2: Register all patterns (resolve item refs by name)
    for pattern in &data.patterns {
        let mut inputs = Vec::with_capacity(pattern.inputs.len());
        for slot in &pattern.inputs {
            inputs.push(match slot {
                Some(entry) => Some(resolve_entry(&builder, entry)?),
                None => None,
            });
        }
        let outputs = pattern
            .outputs
            .iter()
            .map(|entry| resolve_entry(&builder, entry))
            .collect::<Result<Vec<_>, _>>()?;

        builder.register_pattern(Pattern {
            name: pattern.name.clone(),
            inputs,
            outputs,
            craftable: pattern.craftable,
            slot_rules: pattern.slot_rules.clone(),
        });
    }

    Ok(builder)
}

// ===========================================================================
// Tests
// ===========================================================================
