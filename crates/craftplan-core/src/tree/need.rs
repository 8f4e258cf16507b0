use super::{CraftingTree, Env, ResolveError};
use crate::cancel::CancelToken;
use crate::id::{NeedId, ProcessId};
use crate::item::{FuzzyMode, ItemStack};
use crate::job::JobLog;
use crate::ledger::{ActionSource, Actionable, Ledger};
use crate::registry::SlotContext;
use tracing::{debug, trace};

impl<'r> CraftingTree<'r> {
    /// Resolve `quantity` of the root identity against `ledger`.
    ///
    /// On success the requested stack is returned, including in simulation
    /// mode where any shortfall has been recorded for [`dive`](Self::dive)
    /// instead of failing. A simulated request resolves against a scratch
    /// view and leaves `ledger` untouched.
    pub fn request(
        &mut self,
        quantity: u64,
        ledger: &mut Ledger,
        src: &ActionSource,
        ctx: &dyn SlotContext,
        cancel: &CancelToken,
    ) -> Result<ItemStack, ResolveError> {
        if self.needs[self.root].simulate {
            let mut scratch = ledger.child();
            return self.request_in_view(quantity, &mut scratch, src, ctx, cancel);
        }
        self.request_in_view(quantity, ledger, src, ctx, cancel)
    }

    /// Like [`request`](Self::request), but simulated effects land in
    /// `view`. The caller owns the view and decides whether to discard it.
    pub(crate) fn request_in_view(
        &mut self,
        quantity: u64,
        view: &mut Ledger,
        src: &ActionSource,
        ctx: &dyn SlotContext,
        cancel: &CancelToken,
    ) -> Result<ItemStack, ResolveError> {
        let env = Env { src, ctx, cancel };
        self.request_need(self.root, quantity, view, &env)
    }

    /// Harvest every recorded shortfall and crafting task into `log`,
    /// resetting the shortfall counters.
    pub fn dive(&mut self, log: &mut JobLog) {
        self.dive_need(self.root, log);
    }

    /// Switch the whole tree into simulation mode and clear per-pass state.
    pub fn set_simulate(&mut self) {
        self.reset_need(self.root, true);
    }

    /// Switch the whole tree back to committing mode and clear per-pass state.
    pub fn set_committing(&mut self) {
        self.reset_need(self.root, false);
    }

    pub(crate) fn request_need(
        &mut self,
        need: NeedId,
        quantity: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> Result<ItemStack, ResolveError> {
        env.cancel.check()?;

        let node = &self.needs[need];
        let requested = node.stack.with_quantity(quantity);
        let candidates = node.candidates.clone();
        trace!(key = ?requested.key, quantity, candidates = candidates.len(), "need request");

        let mut remaining = quantity - self.extract_direct(need, quantity, ledger, env);
        if remaining == 0 {
            return Ok(requested);
        }

        match candidates.as_slice() {
            [] => {}
            [single] => {
                remaining = self.produce_single(need, *single, remaining, ledger, env)?;
            }
            many => {
                remaining = self.produce_multi(need, many, remaining, ledger, env)?;
            }
        }

        if remaining == 0 {
            return Ok(requested);
        }

        let node = &mut self.needs[need];
        if node.simulate {
            node.missing = node.missing.saturating_add(remaining);
            debug!(key = ?requested.key, remaining, "simulated shortfall recorded");
            // The caller sees the full stack so upstream multipliers stay correct.
            return Ok(requested);
        }

        Err(ResolveError::BranchFailure {
            missing: requested.with_quantity(remaining),
        })
    }

    /// Take up to `quantity` straight from the ledger. Returns the amount taken.
    ///
    /// Slots of craftable patterns accept any fuzzy-equal item the pattern
    /// allows in that slot; everything else extracts the exact identity.
    fn extract_direct(
        &self,
        need: NeedId,
        quantity: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> u64 {
        if quantity == 0 {
            return 0;
        }
        let node = &self.needs[need];
        let registry = self.registry;

        let craft_slot = node.slot.and_then(|slot| {
            registry
                .get_pattern(slot.pattern)
                .filter(|p| p.is_craftable())
                .map(|p| (p, slot.index))
        });

        let Some((pattern, index)) = craft_slot else {
            return ledger
                .extract(&node.stack.with_quantity(quantity), Actionable::Modulate, env.src)
                .map_or(0, |s| s.quantity);
        };

        let mut taken = 0;
        for candidate in ledger.find_fuzzy(&node.stack.key, FuzzyMode::IgnoreAll) {
            if taken == quantity {
                break;
            }
            if !pattern.is_valid_for_slot(index, &candidate.key, env.ctx) {
                continue;
            }
            let want = candidate.with_quantity(quantity - taken);
            if let Some(got) = ledger.extract(&want, Actionable::Modulate, env.src) {
                taken += got.quantity;
            }
        }
        taken
    }

    /// Drive the only candidate in batches sized to the shortfall.
    ///
    /// Each batch runs in a child view. If a whole batch cannot be fed, the
    /// process falls back to single repetitions until one fails, and is then
    /// exhausted for this pass. Returns the remaining shortfall.
    fn produce_single(
        &mut self,
        need: NeedId,
        process: ProcessId,
        mut remaining: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> Result<u64, ResolveError> {
        let per_repetition = self.processes[process].per_repetition;

        while self.processes[process].is_possible() && remaining > 0 {
            let times = Self::times_for(remaining, per_repetition);
            let mut stalled = false;

            if !self.try_repetitions(process, times, ledger, env)? {
                stalled = true;
                if times > 1 {
                    let mut done = 0;
                    while done < times && self.try_repetitions(process, 1, ledger, env)? {
                        done += 1;
                    }
                    debug!(?process, times, done, "batch fell back to single repetitions");
                }
            }

            let got = self.extract_direct(need, remaining, ledger, env);
            remaining -= got;
            if got == 0 || stalled {
                self.exhaust(process);
            }
        }
        Ok(remaining)
    }

    /// Try every candidate in order, one repetition at a time.
    ///
    /// A branch failure ends the attempt on that candidate and re-enables it
    /// instead of excluding it. Returns the remaining shortfall.
    fn produce_multi(
        &mut self,
        need: NeedId,
        candidates: &[ProcessId],
        mut remaining: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> Result<u64, ResolveError> {
        for &process in candidates {
            while self.processes[process].is_possible() && remaining > 0 {
                if !self.try_repetitions(process, 1, ledger, env)? {
                    self.reset_after_failure(process);
                    break;
                }
                let got = self.extract_direct(need, remaining, ledger, env);
                if got == 0 {
                    self.exhaust(process);
                } else {
                    remaining -= got;
                }
            }
            if remaining == 0 {
                break;
            }
        }
        Ok(remaining)
    }

    pub(super) fn dive_need(&mut self, need: NeedId, log: &mut JobLog) {
        let node = &mut self.needs[need];
        if node.missing > 0 {
            log.add_missing(node.stack.with_quantity(node.missing));
            node.missing = 0;
        }
        let candidates = node.candidates.clone();
        for process in candidates {
            self.dive_process(process, log);
        }
    }

    pub(super) fn reset_need(&mut self, need: NeedId, simulate: bool) {
        let node = &mut self.needs[need];
        node.simulate = simulate;
        node.missing = 0;
        let candidates = node.candidates.clone();
        for process in candidates {
            self.reset_process(process, simulate);
        }
    }
}
