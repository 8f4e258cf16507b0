//! Craftplan Core -- recursive crafting-plan resolution.
//!
//! Given a request for some quantity of an item, this crate expands every
//! way of obtaining it from a registry of patterns, then resolves the request
//! against a transactional ledger of available stock.
//!
//! # Resolution Model
//!
//! The [`tree::CraftingTree`] is an AND/OR tree:
//!
//! 1. **Need Node** -- pull from the ledger first, then try each candidate
//!    pattern in registration order until the shortfall is covered.
//! 2. **Process Node** -- request every input for the repetitions it runs,
//!    then inject the pattern's outputs back into the ledger.
//!
//! Every speculative attempt runs in a child view of the ledger
//! ([`ledger::Ledger::child`]). Successful attempts are folded into the
//! parent with [`ledger::Ledger::commit_into`]; failed ones are dropped.
//!
//! # Simulation
//!
//! After [`tree::CraftingTree::set_simulate`], unsatisfiable portions are
//! recorded instead of failing, and [`tree::CraftingTree::dive`] harvests
//! them. The [`job::CraftingJob`] controller uses this to report what is
//! missing when a committing pass fails:
//!
//! ```rust,ignore
//! let mut job = CraftingJob::new(&registry, ledger, request, JobConfig::default());
//! let report = job.run(&ActionSource::Planner, &OpenWorld, &CancelToken::new())?;
//! if let JobOutcome::Missing(items) = &report.outcome { /* ... */ }
//! ```
//!
//! # Key Types
//!
//! - [`registry::Registry`] -- Immutable pattern registry (frozen at build).
//! - [`ledger::Ledger`] -- Resource ledger with child views and commit.
//! - [`tree::CraftingTree`] -- Need/Process node arena and resolution.
//! - [`job::CraftingJob`] -- Run/simulate driver producing a [`job::JobReport`].
//! - [`cancel::CancelToken`] -- Cooperative cancellation flag.
//! - [`serialize`] -- Versioned ledger snapshots via bitcode.

pub mod cancel;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod id;
pub mod item;
pub mod job;
pub mod ledger;
pub mod registry;
pub mod serialize;
pub mod tree;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
