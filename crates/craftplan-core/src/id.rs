use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a Need Node in a crafting tree.
    pub struct NeedId;

    /// Identifies a Process Node in a crafting tree.
    pub struct ProcessId;
}

/// Identifies an item type in the registry. Cheap to copy and compare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemTypeId(pub u32);

/// Identifies a pattern in the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PatternId(pub u32);
