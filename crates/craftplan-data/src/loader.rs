//! Resolution pipeline: reads data files, resolves cross-references, builds registry.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and deserialization
//! helpers, plus [`load_pattern_book`] which runs the whole pipeline over a
//! directory.

use crate::schema::{EntryData, ItemData, JobData, PatternData};
use craftplan_core::item::{ItemKey, ItemStack};
use craftplan_core::job::{CraftingJob, JobConfig};
use craftplan_core::ledger::Ledger;
use craftplan_core::registry::{Pattern, Registry, RegistryBuilder, RegistryError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The resolved patterns failed registry validation.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let extensions = ["ron", "toml", "json"];
    let mut found: Option<PathBuf> = None;

    for ext in &extensions {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Json => serde_json::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Toml => toml::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Json => serde_json::from_str(&content).map_err(|e| DataLoadError::Parse {
            file: path.to_path_buf(),
            detail: e.to_string(),
        }),
        Format::Toml => {
            let table: toml::Value =
                toml::from_str(&content).map_err(|e| DataLoadError::Parse {
                    file: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| DataLoadError::Parse {
                    file: path.to_path_buf(),
                    detail: format!("missing key '{toml_key}' in TOML file"),
                })?
                .clone();
            // Deserialize the array value into Vec<T>.
            array
                .try_into()
                .map_err(|e: toml::de::Error| DataLoadError::Parse {
                    file: path.to_path_buf(),
                    detail: e.to_string(),
                })
        }
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pattern book pipeline
// ===========================================================================

/// A named request ready to be planned.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub request: ItemStack,
    pub config: JobConfig,
}

/// Everything loaded from a pattern book directory.
#[derive(Debug)]
pub struct PatternBook {
    pub registry: Registry,
    /// Stock from `stock.*`, or an empty ledger if the file is absent.
    pub ledger: Ledger,
    /// Requests from `jobs.*`, in file order.
    pub jobs: Vec<JobSpec>,
}

impl PatternBook {
    pub fn job_spec(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// A job for the named request, planning against a copy of the stock.
    pub fn start_job(&self, name: &str) -> Option<CraftingJob<'_>> {
        let spec = self.job_spec(name)?;
        Some(CraftingJob::new(
            &self.registry,
            self.ledger.clone(),
            spec.request.clone(),
            spec.config.clone(),
        ))
    }
}

/// Load a pattern book from `dir`.
///
/// Reads `items` and `patterns` (required) and `stock` and `jobs`
/// (optional), each as `.ron`, `.toml` or `.json`. Item names are resolved
/// across files; patterns keep their file order, which is the order
/// alternatives are tried in.
pub fn load_pattern_book(dir: &Path) -> Result<PatternBook, DataLoadError> {
    let items_path = require_data_file(dir, "items")?;
    let items: Vec<ItemData> = deserialize_list(&items_path, "items")?;

    let mut builder = RegistryBuilder::new();
    let mut keys: HashMap<String, ItemKey> = HashMap::new();
    for item in &items {
        check_duplicate(&keys, &item.name, &items_path)?;
        let id = builder.register_damageable_item(&item.name, item.max_damage);
        keys.insert(item.name.clone(), ItemKey::damageable(id, 0, item.max_damage));
    }
    debug!(count = items.len(), file = %items_path.display(), "items loaded");

    let patterns_path = require_data_file(dir, "patterns")?;
    let patterns: Vec<PatternData> = deserialize_list(&patterns_path, "patterns")?;
    let mut pattern_ids = HashMap::new();
    for data in &patterns {
        check_duplicate(&pattern_ids, &data.name, &patterns_path)?;
        let id = builder.register_pattern(resolve_pattern(data, &keys, &patterns_path)?);
        pattern_ids.insert(data.name.clone(), id);
    }
    debug!(count = patterns.len(), file = %patterns_path.display(), "patterns loaded");

    let registry = builder.build()?;

    let ledger = match find_data_file(dir, "stock")? {
        Some(path) => {
            let stock: Vec<EntryData> = deserialize_list(&path, "stock")?;
            let stacks = stock
                .iter()
                .map(|entry| resolve_entry(entry, &keys, &path))
                .collect::<Result<Vec<_>, _>>()?;
            Ledger::from_stacks(stacks)
        }
        None => Ledger::default(),
    };

    let mut jobs = Vec::new();
    if let Some(path) = find_data_file(dir, "jobs")? {
        let data: Vec<JobData> = deserialize_list(&path, "jobs")?;
        let mut seen = HashMap::new();
        for (index, job) in data.into_iter().enumerate() {
            check_duplicate(&seen, &job.name, &path)?;
            seen.insert(job.name.clone(), index);
            let key = *resolve_name(&keys, &job.item, &path, "item")?;
            jobs.push(JobSpec {
                name: job.name,
                request: ItemStack::new(key, job.quantity),
                config: job.config,
            });
        }
    }

    info!(
        items = registry.item_count(),
        patterns = registry.pattern_count(),
        stock = ledger.available().len(),
        jobs = jobs.len(),
        dir = %dir.display(),
        "pattern book loaded"
    );
    Ok(PatternBook {
        registry,
        ledger,
        jobs,
    })
}

fn resolve_entry(
    entry: &EntryData,
    keys: &HashMap<String, ItemKey>,
    file: &Path,
) -> Result<ItemStack, DataLoadError> {
    let mut key = *resolve_name(keys, entry.item(), file, "item")?;
    if let EntryData::Full { damage, tag, .. } = entry {
        key.damage = *damage;
        key.tag = *tag;
    }
    Ok(ItemStack::new(key, entry.quantity()))
}

fn resolve_pattern(
    data: &PatternData,
    keys: &HashMap<String, ItemKey>,
    file: &Path,
) -> Result<Pattern, DataLoadError> {
    let inputs = data
        .inputs
        .iter()
        .map(|slot| slot.as_ref().map(|e| resolve_entry(e, keys, file)).transpose())
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = data
        .outputs
        .iter()
        .map(|e| resolve_entry(e, keys, file))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Pattern {
        name: data.name.clone(),
        inputs,
        outputs,
        craftable: data.craftable,
        slot_rules: data.slot_rules.clone(),
    })
}

// ===========================================================================
// Tests
// ===========================================================================
