use super::{BranchState, CraftingTree, Env, ResolveError};
use crate::id::{NeedId, ProcessId};
use crate::item::ItemKey;
use crate::job::JobLog;
use crate::ledger::{Actionable, Ledger};
use crate::registry::Pattern;
use tracing::debug;

/// Units of `key` one repetition of `pattern` yields. Outputs are matched
/// on the exact identity, the same way the registry indexes them.
pub(super) fn amount_crafted(pattern: &Pattern, key: &ItemKey) -> u64 {
    pattern
        .condensed_outputs()
        .iter()
        .find(|o| o.key == *key)
        .map_or(0, |o| o.quantity)
}

impl<'r> CraftingTree<'r> {
    /// Repetitions needed to cover `needed` units at `per_repetition` each.
    pub fn times_for(needed: u64, per_repetition: u64) -> u64 {
        needed.div_ceil(per_repetition.max(1))
    }

    /// Units of `key` one repetition of `process` yields, or zero if the
    /// process is unknown or does not produce it.
    pub fn amount_crafted(&self, process: ProcessId, key: &ItemKey) -> u64 {
        self.processes
            .get(process)
            .and_then(|p| self.registry.get_pattern(p.pattern))
            .map_or(0, |pattern| amount_crafted(pattern, key))
    }

    /// Run `times` repetitions of `process` in a child view of `ledger`.
    ///
    /// `Ok(true)`: the repetitions ran and were committed. `Ok(false)`: a
    /// branch failure was absorbed and the child view discarded. Branch
    /// states and craft counters of the subtree are rolled back with it.
    /// Cancellation propagates.
    pub(super) fn try_repetitions(
        &mut self,
        process: ProcessId,
        times: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> Result<bool, ResolveError> {
        let node = &mut self.processes[process];
        node.attempts = node.attempts.saturating_add(1);
        if node.state == BranchState::Untried {
            node.state = BranchState::Active;
        }

        let before = self.subtree_snapshot(process);
        let mut view = ledger.child();
        match self.request_process(process, times, &mut view, env) {
            Ok(()) => {
                view.commit_into(ledger, env.src);
                Ok(true)
            }
            Err(ResolveError::BranchFailure { missing }) => {
                debug!(
                    ?process,
                    times,
                    key = ?missing.key,
                    short = missing.quantity,
                    "repetition failed"
                );
                for (id, state, crafts) in before {
                    let node = &mut self.processes[id];
                    node.state = state;
                    node.crafts = crafts;
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Request every input for `times` repetitions, then inject the outputs.
    pub(super) fn request_process(
        &mut self,
        process: ProcessId,
        times: u64,
        ledger: &mut Ledger,
        env: &Env<'_>,
    ) -> Result<(), ResolveError> {
        env.cancel.check()?;

        let node = &self.processes[process];
        let pattern_id = node.pattern;
        let inputs = node.inputs.clone();

        for (need, per_repetition) in inputs {
            self.request_need(need, per_repetition.saturating_mul(times), ledger, env)?;
        }

        if let Some(pattern) = self.registry.get_pattern(pattern_id) {
            for output in pattern.condensed_outputs() {
                let produced = output.with_quantity(output.quantity.saturating_mul(times));
                ledger.inject(&produced, Actionable::Modulate, env.src);
            }
        }

        let node = &mut self.processes[process];
        node.crafts = node.crafts.saturating_add(times);
        Ok(())
    }

    pub(super) fn exhaust(&mut self, process: ProcessId) {
        debug!(?process, "process exhausted");
        self.processes[process].state = BranchState::Exhausted;
    }

    /// Re-enable a candidate whose repetition failed, so a later request in
    /// the same pass may try it again.
    pub(super) fn reset_after_failure(&mut self, process: ProcessId) {
        debug!(?process, "failed candidate re-enabled");
        self.processes[process].state = BranchState::Untried;
    }

    /// Branch state and craft counter of `process` and every process
    /// beneath it.
    fn subtree_snapshot(&self, process: ProcessId) -> Vec<(ProcessId, BranchState, u64)> {
        let mut out = Vec::new();
        let mut stack = vec![process];
        while let Some(id) = stack.pop() {
            let node = &self.processes[id];
            out.push((id, node.state, node.crafts));
            for (need, _) in &node.inputs {
                stack.extend(self.needs[*need].candidates.iter().copied());
            }
        }
        out
    }

    pub(super) fn dive_process(&mut self, process: ProcessId, log: &mut JobLog) {
        let node = &self.processes[process];
        if node.crafts > 0 {
            log.add_task(
                node.pattern,
                crate::item::ItemStack::new(node.output, node.per_repetition),
                node.crafts,
                node.depth,
            );
        }
        let inputs: Vec<NeedId> = node.inputs.iter().map(|(n, _)| *n).collect();
        for need in inputs {
            self.dive_need(need, log);
        }
    }

    pub(super) fn reset_process(&mut self, process: ProcessId, simulate: bool) {
        let node = &mut self.processes[process];
        node.crafts = 0;
        node.attempts = 0;
        node.state = BranchState::Untried;
        let inputs: Vec<NeedId> = node.inputs.iter().map(|(n, _)| *n).collect();
        for need in inputs {
            self.reset_need(need, simulate);
        }
    }
}
