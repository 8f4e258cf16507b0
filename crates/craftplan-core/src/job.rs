//! Job controller: owns a crafting tree and the ledger it plans against.
//!
//! [`CraftingJob::run`] first attempts a committing resolution in a child
//! view of the job ledger. If that succeeds the view is committed and the
//! job is satisfied. If it fails with a branch failure the tree is switched
//! into simulation mode, resolved again in a throw-away view, and the
//! shortfalls harvested by `dive` are reported instead. A cancelled pass
//! never touches the job ledger.

use crate::cancel::CancelToken;
use crate::id::PatternId;
use crate::item::{ItemList, ItemStack};
use crate::ledger::{ActionSource, Ledger};
use crate::registry::{Registry, SlotContext};
use crate::tree::{CraftingTree, ResolveError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-job knobs. Deserializable from data files; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Hide existing stock of the requested item so it is always crafted.
    pub craft_only: bool,
    /// Run a simulation pass to list missing items when committing fails.
    pub simulate_on_failure: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            craft_only: false,
            simulate_on_failure: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Harvested results
// ---------------------------------------------------------------------------

/// A pattern scheduled to run some number of times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftingTask {
    pub pattern: PatternId,
    /// What one repetition yields of the item it was planned for.
    pub output: ItemStack,
    pub repetitions: u64,
    /// Deepest tree level the pattern was planned at.
    pub depth: u32,
}

/// Shortfalls and crafting tasks collected by a `dive` over the tree.
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    missing: ItemList,
    tasks: Vec<CraftingTask>,
}

impl JobLog {
    /// Record a shortfall. Equal identities are merged.
    pub fn add_missing(&mut self, stack: ItemStack) {
        self.missing.add_stack(&stack);
    }

    /// Record planned repetitions of a pattern. Equal patterns are merged.
    pub fn add_task(
        &mut self,
        pattern: PatternId,
        output: ItemStack,
        repetitions: u64,
        depth: u32,
    ) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.pattern == pattern) {
            task.repetitions = task.repetitions.saturating_add(repetitions);
            task.depth = task.depth.max(depth);
            return;
        }
        self.tasks.push(CraftingTask {
            pattern,
            output,
            repetitions,
            depth,
        });
    }

    pub fn missing(&self) -> Vec<ItemStack> {
        self.missing.iter().collect()
    }

    pub fn tasks(&self) -> &[CraftingTask] {
        &self.tasks
    }

    pub fn clear(&mut self) {
        self.missing = ItemList::new();
        self.tasks.clear();
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Satisfied,
    /// Satisfied except for these shortfalls.
    Missing(Vec<ItemStack>),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Satisfied => write!(f, "fully satisfied"),
            JobOutcome::Missing(items) => {
                write!(f, "satisfied except for:")?;
                for (i, stack) in items.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{} -> {}", stack.key, stack.quantity)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub request: ItemStack,
    pub outcome: JobOutcome,
    pub tasks: Vec<CraftingTask>,
    /// Net stock the plan takes out of the ledger.
    pub used_from_storage: Vec<ItemStack>,
    /// True when the report comes from a simulation pass.
    pub simulation: bool,
}

impl JobReport {
    pub fn is_satisfied(&self) -> bool {
        self.outcome == JobOutcome::Satisfied
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("crafting job cancelled")]
    Cancelled,
    #[error("cannot satisfy request: short {} of {:?}", .0.quantity, .0.key)]
    Unsatisfiable(ItemStack),
}

impl From<ResolveError> for JobError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Cancelled => JobError::Cancelled,
            ResolveError::BranchFailure { missing } => JobError::Unsatisfiable(missing),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CraftingJob<'r> {
    tree: CraftingTree<'r>,
    ledger: Ledger,
    request: ItemStack,
    config: JobConfig,
    log: JobLog,
}

impl<'r> CraftingJob<'r> {
    pub fn new(
        registry: &'r Registry,
        ledger: Ledger,
        request: ItemStack,
        config: JobConfig,
    ) -> Self {
        Self {
            tree: CraftingTree::new(registry, request.clone()),
            ledger,
            request,
            config,
            log: JobLog::default(),
        }
    }

    pub fn tree(&self) -> &CraftingTree<'r> {
        &self.tree
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub fn request(&self) -> &ItemStack {
        &self.request
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn log(&self) -> &JobLog {
        &self.log
    }

    pub fn add_missing(&mut self, stack: ItemStack) {
        self.log.add_missing(stack);
    }

    /// Plan the request, committing the plan's ledger effects on success.
    pub fn run(
        &mut self,
        src: &ActionSource,
        ctx: &dyn SlotContext,
        cancel: &CancelToken,
    ) -> Result<JobReport, JobError> {
        self.log.clear();
        self.tree.set_committing();

        let mut view = self.working_view();
        let before = view.available().clone();

        match self.tree.request(self.request.quantity, &mut view, src, ctx, cancel) {
            Ok(_) => {
                self.tree.dive(&mut self.log);
                let used = net_consumption(&before, view.available());
                view.commit_into(&mut self.ledger, src);
                info!(
                    request = ?self.request.key,
                    quantity = self.request.quantity,
                    "crafting job satisfied"
                );
                Ok(self.report(JobOutcome::Satisfied, used, false))
            }
            Err(ResolveError::Cancelled) => Err(JobError::Cancelled),
            Err(ResolveError::BranchFailure { missing }) => {
                debug!(key = ?missing.key, short = missing.quantity, "committing pass failed");
                if !self.config.simulate_on_failure {
                    return Err(JobError::Unsatisfiable(missing));
                }
                self.simulate(src, ctx, cancel)
            }
        }
    }

    /// Dry-run the request and report what is missing. Never changes the
    /// job ledger.
    pub fn simulate(
        &mut self,
        src: &ActionSource,
        ctx: &dyn SlotContext,
        cancel: &CancelToken,
    ) -> Result<JobReport, JobError> {
        self.log.clear();
        self.tree.set_simulate();

        let mut view = self.working_view();
        let before = view.available().clone();
        self.tree
            .request_in_view(self.request.quantity, &mut view, src, ctx, cancel)?;
        self.tree.dive(&mut self.log);

        let used = net_consumption(&before, view.available());
        let missing = self.log.missing();
        let outcome = if missing.is_empty() {
            JobOutcome::Satisfied
        } else {
            JobOutcome::Missing(missing)
        };
        info!(request = ?self.request.key, %outcome, "crafting job simulated");
        Ok(self.report(outcome, used, true))
    }

    fn working_view(&self) -> Ledger {
        let mut view = self.ledger.child();
        if self.config.craft_only {
            view.ignore(&self.request.key);
        }
        view
    }

    fn report(
        &self,
        outcome: JobOutcome,
        used_from_storage: Vec<ItemStack>,
        simulation: bool,
    ) -> JobReport {
        JobReport {
            request: self.request.clone(),
            outcome,
            tasks: self.log.tasks().to_vec(),
            used_from_storage,
            simulation,
        }
    }
}

/// Stock present in `before` that is no longer (fully) present in `after`.
fn net_consumption(before: &ItemList, after: &ItemList) -> Vec<ItemStack> {
    before
        .iter()
        .filter_map(|stack| {
            let left = after.get(&stack.key);
            (left < stack.quantity).then(|| stack.with_quantity(stack.quantity - left))
        })
        .collect()
}
