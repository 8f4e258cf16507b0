//! Integration tests for crafting-plan resolution.
//!
//! These tests exercise end-to-end behavior across the tree, the ledger and
//! the job controller: direct extraction, production through patterns,
//! fallback between alternatives, simulation reporting and cancellation.

use craftplan_core::cancel::CancelToken;
use craftplan_core::item::{ItemKey, ItemStack};
use craftplan_core::job::{CraftingJob, JobConfig, JobError, JobLog, JobOutcome};
use craftplan_core::ledger::Ledger;
use craftplan_core::registry::{OpenWorld, Pattern, RegistryBuilder, SlotContext, SlotRule};
use craftplan_core::serialize::snapshot_ledger;
use craftplan_core::tree::{BranchState, CraftingTree, ResolveError};
use craftplan_core::test_utils::*;

// ===========================================================================
// Direct extraction
// ===========================================================================

#[test]
fn stock_on_hand_is_extracted_directly() {
    let conv = conversion_registry();
    let mut tree = CraftingTree::new(&conv.registry, stack(conv.a, 3));
    let mut ledger = ledger_with(&[(conv.a, 5)]);

    let got = resolve(&mut tree, 3, &mut ledger).unwrap();

    assert_eq!(got, stack(conv.a, 3));
    assert_eq!(amount(&ledger, conv.a), 2);
    assert_eq!(tree.process(tree.root_candidates()[0]).unwrap().crafts(), 0);
}

#[test]
fn leaf_without_stock_fails_with_full_shortfall() {
    let mut builder = RegistryBuilder::new();
    let ore = builder.register_item("ore");
    let registry = builder.build().unwrap();
    let mut tree = CraftingTree::new(&registry, stack(ore, 4));
    let mut ledger = ledger_with(&[(ore, 1)]);

    let err = resolve(&mut tree, 4, &mut ledger).unwrap_err();
    assert_eq!(err, ResolveError::BranchFailure { missing: stack(ore, 3) });
}

// ===========================================================================
// Production through a single pattern
// ===========================================================================

#[test]
fn conversion_consumes_inputs_and_delivers_output() {
    let conv = conversion_registry();
    let mut tree = CraftingTree::new(&conv.registry, stack(conv.a, 3));
    let mut ledger = ledger_with(&[(conv.b, 10)]);

    let got = resolve(&mut tree, 3, &mut ledger).unwrap();

    assert_eq!(got.quantity, 3);
    assert_eq!(amount(&ledger, conv.b), 4);
    assert_eq!(amount(&ledger, conv.a), 0);
    let process = tree.process(tree.root_candidates()[0]).unwrap();
    assert_eq!(process.crafts(), 3);
    assert_eq!(process.attempts(), 1);
}

#[test]
fn partial_production_fails_with_remaining_shortfall() {
    let conv = conversion_registry();
    let mut tree = CraftingTree::new(&conv.registry, stack(conv.a, 3));
    let ledger = ledger_with(&[(conv.b, 3)]);
    let mut view = ledger.child();

    let err = resolve(&mut tree, 3, &mut view).unwrap_err();

    // Only one repetition can be fed from 3 × b.
    assert_eq!(err, ResolveError::BranchFailure { missing: stack(conv.a, 2) });
    let process = tree.process(tree.root_candidates()[0]).unwrap();
    assert_eq!(process.state(), BranchState::Exhausted);
    assert_eq!(process.crafts(), 1);
    // Full batch, one successful single, one failed single.
    assert_eq!(process.attempts(), 3);
    drop(view);
    assert_eq!(amount(&ledger, conv.b), 3);
}

#[test]
fn failed_batch_rolls_back_nested_branch_state() {
    // a <- 2 × b, b <- 1 × c. Three c feed exactly one a.
    let mut builder = RegistryBuilder::new();
    let a = builder.register_item("a");
    let b = builder.register_item("b");
    let c = builder.register_item("c");
    builder.register_processing("a_from_b", vec![(b, 2)], vec![(a, 1)]);
    builder.register_processing("b_from_c", vec![(c, 1)], vec![(b, 1)]);
    let registry = builder.build().unwrap();

    let mut tree = CraftingTree::new(&registry, stack(a, 3));
    let ledger = ledger_with(&[(c, 3)]);
    let mut view = ledger.child();

    let err = resolve(&mut tree, 3, &mut view).unwrap_err();

    assert_eq!(err, ResolveError::BranchFailure { missing: stack(a, 2) });
    let make_a = tree.process(tree.root_candidates()[0]).unwrap();
    assert_eq!(make_a.state(), BranchState::Exhausted);
    assert_eq!(make_a.crafts(), 1);
    assert_eq!(make_a.attempts(), 3);

    // The inner process keeps only the repetitions of the committed attempt.
    let b_need = tree.need(make_a.inputs()[0].0).unwrap();
    let make_b = tree.process(b_need.candidates()[0]).unwrap();
    assert_eq!(make_b.state(), BranchState::Active);
    assert_eq!(make_b.crafts(), 2);

    assert_eq!(amount(&view, c), 1);
    assert_eq!(amount(&view, a), 0);
    drop(view);
    assert_eq!(amount(&ledger, c), 3);
}

#[test]
fn chain_plans_every_level() {
    let (registry, items) = build_chain_registry(3);
    let raw = items[0];
    let product = items[3];
    let mut job = CraftingJob::new(
        &registry,
        ledger_with(&[(raw, 10)]),
        stack(product, 1),
        JobConfig::default(),
    );

    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();

    assert!(report.is_satisfied());
    assert!(!report.simulation);
    assert_eq!(report.used_from_storage, vec![stack(raw, 8)]);
    assert_eq!(amount(job.ledger(), raw), 2);

    let planned: Vec<(String, u64, u32)> = report
        .tasks
        .iter()
        .map(|t| {
            let name = registry.get_pattern(t.pattern).unwrap().name.clone();
            (name, t.repetitions, t.depth)
        })
        .collect();
    assert_eq!(
        planned,
        vec![
            ("make_3".to_string(), 1, 1),
            ("make_2".to_string(), 2, 3),
            ("make_1".to_string(), 4, 5),
        ]
    );
}

// ===========================================================================
// Alternatives
// ===========================================================================

#[test]
fn failing_alternative_falls_through_to_next_pattern() {
    let fb = fallback_registry();
    let mut tree = CraftingTree::new(&fb.registry, stack(fb.a, 3));
    let mut ledger = ledger_with(&[(fb.common, 5)]);

    let got = resolve(&mut tree, 3, &mut ledger).unwrap();

    assert_eq!(got.quantity, 3);
    assert_eq!(amount(&ledger, fb.common), 2);
    assert_eq!(amount(&ledger, fb.a), 0);
    assert_eq!(amount(&ledger, fb.rare), 0);
}

#[test]
fn failed_alternative_is_retried_once_and_re_enabled() {
    let fb = fallback_registry();
    let mut tree = CraftingTree::new(&fb.registry, stack(fb.a, 3));
    let mut ledger = ledger_with(&[(fb.common, 5)]);
    resolve(&mut tree, 3, &mut ledger).unwrap();

    let candidates = tree.root_candidates().to_vec();
    let rare = tree.process(candidates[0]).unwrap();
    let common = tree.process(candidates[1]).unwrap();
    assert_eq!(rare.pattern(), fb.from_rare);
    assert_eq!(rare.attempts(), 1);
    assert_eq!(rare.crafts(), 0);
    assert_eq!(rare.state(), BranchState::Untried);
    assert_eq!(common.pattern(), fb.from_common);
    assert_eq!(common.attempts(), 3);
    assert_eq!(common.crafts(), 3);
}

#[test]
fn failed_alternative_leaves_no_task() {
    let fb = fallback_registry();
    let mut job = CraftingJob::new(
        &fb.registry,
        ledger_with(&[(fb.common, 5)]),
        stack(fb.a, 2),
        JobConfig::default(),
    );
    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    assert!(report.is_satisfied());
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].pattern, fb.from_common);
    assert_eq!(report.tasks[0].repetitions, 2);
}

#[test]
fn alternatives_share_the_shortfall() {
    let (registry, product, raws) = build_wide_registry(3);
    let mut tree = CraftingTree::new(&registry, stack(product, 5));
    let mut ledger = ledger_with(&[(raws[0], 2), (raws[2], 10)]);

    resolve(&mut tree, 5, &mut ledger).unwrap();

    assert_eq!(amount(&ledger, raws[0]), 0);
    assert_eq!(amount(&ledger, raws[2]), 7);
}

// ===========================================================================
// Simulation
// ===========================================================================

#[test]
fn simulation_records_leaf_shortfall_and_leaves_stock() {
    let conv = conversion_registry();
    let mut tree = CraftingTree::new(&conv.registry, stack(conv.a, 3));
    tree.set_simulate();
    assert!(tree.root_node().is_simulating());

    let mut ledger = ledger_with(&[(conv.b, 3)]);
    let got = resolve(&mut tree, 3, &mut ledger).unwrap();
    assert_eq!(got.quantity, 3);

    let mut log = JobLog::default();
    tree.dive(&mut log);
    assert_eq!(log.missing(), vec![stack(conv.b, 3)]);
    assert_eq!(amount(&ledger, conv.b), 3);
    assert_eq!(amount(&ledger, conv.a), 0);
    assert!(ledger.extracted().is_empty());
    assert!(ledger.injected().is_empty());

    // Shortfalls are harvested exactly once.
    let mut again = JobLog::default();
    tree.dive(&mut again);
    assert!(again.missing().is_empty());
}

#[test]
fn simulation_without_stock_or_patterns_reports_whole_request() {
    let mut builder = RegistryBuilder::new();
    let ore = builder.register_item("ore");
    let registry = builder.build().unwrap();
    let mut tree = CraftingTree::new(&registry, stack(ore, 7));
    tree.set_simulate();

    let mut ledger = Ledger::default();
    resolve(&mut tree, 7, &mut ledger).unwrap();
    let mut log = JobLog::default();
    tree.dive(&mut log);

    assert_eq!(log.missing(), vec![stack(ore, 7)]);
    assert!(ledger.available().is_empty());
    assert!(ledger.extracted().is_empty());
}

#[test]
fn job_reports_missing_items_when_unsatisfiable() {
    let conv = conversion_registry();
    let ledger = ledger_with(&[(conv.b, 3)]);
    let before = snapshot_ledger(&ledger).unwrap();
    let mut job = CraftingJob::new(&conv.registry, ledger, stack(conv.a, 3), JobConfig::default());

    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();

    assert!(report.simulation);
    assert_eq!(report.outcome, JobOutcome::Missing(vec![stack(conv.b, 3)]));
    assert_eq!(report.used_from_storage, vec![stack(conv.b, 3)]);
    assert_eq!(snapshot_ledger(job.ledger()).unwrap(), before);
}

#[test]
fn job_without_simulation_surfaces_branch_failure() {
    let conv = conversion_registry();
    let config = JobConfig {
        simulate_on_failure: false,
        ..JobConfig::default()
    };
    let mut job = CraftingJob::new(
        &conv.registry,
        ledger_with(&[(conv.b, 3)]),
        stack(conv.a, 3),
        config,
    );

    let err = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap_err();

    assert_eq!(err, JobError::Unsatisfiable(stack(conv.a, 2)));
    assert_eq!(amount(job.ledger(), conv.b), 3);
}

#[test]
fn simulate_is_repeatable_and_never_commits() {
    let conv = conversion_registry();
    let ledger = ledger_with(&[(conv.b, 10)]);
    let before = snapshot_ledger(&ledger).unwrap();
    let mut job = CraftingJob::new(&conv.registry, ledger, stack(conv.a, 3), JobConfig::default());

    let first = job.simulate(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    let second = job.simulate(&planner(), &OpenWorld, &CancelToken::new()).unwrap();

    assert!(first.is_satisfied());
    assert_eq!(first, second);
    assert_eq!(first.tasks[0].repetitions, 3);
    assert_eq!(snapshot_ledger(job.ledger()).unwrap(), before);
}

#[test]
fn run_after_simulate_commits() {
    let conv = conversion_registry();
    let mut job = CraftingJob::new(
        &conv.registry,
        ledger_with(&[(conv.b, 10)]),
        stack(conv.a, 3),
        JobConfig::default(),
    );
    job.simulate(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();

    assert!(report.is_satisfied());
    assert!(!job.tree().root_node().is_simulating());
    assert_eq!(report.tasks[0].repetitions, 3);
    assert_eq!(amount(job.ledger(), conv.b), 4);
}

// ===========================================================================
// Job configuration
// ===========================================================================

#[test]
fn craft_only_ignores_stock_of_the_requested_item() {
    let conv = conversion_registry();

    let mut plain = CraftingJob::new(
        &conv.registry,
        ledger_with(&[(conv.a, 5), (conv.b, 10)]),
        stack(conv.a, 1),
        JobConfig::default(),
    );
    let report = plain.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    assert!(report.tasks.is_empty());
    assert_eq!(amount(plain.ledger(), conv.a), 4);
    assert_eq!(amount(plain.ledger(), conv.b), 10);

    let config = JobConfig {
        craft_only: true,
        ..JobConfig::default()
    };
    let mut crafted = CraftingJob::new(
        &conv.registry,
        ledger_with(&[(conv.a, 5), (conv.b, 10)]),
        stack(conv.a, 1),
        config,
    );
    let report = crafted.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(amount(crafted.ledger(), conv.a), 5);
    assert_eq!(amount(crafted.ledger(), conv.b), 8);
}

#[test]
fn json_pattern_book_plans_a_job() {
    use craftplan_core::data_loader::{load_registry_json, load_stock_json};

    let registry = load_registry_json(
        r#"{
            "items": [{"name": "log"}, {"name": "plank"}],
            "patterns": [{
                "name": "saw",
                "inputs": [{"item": "log", "quantity": 1}],
                "outputs": [{"item": "plank", "quantity": 4}]
            }]
        }"#,
    )
    .unwrap()
    .build()
    .unwrap();
    let stock = load_stock_json(r#"[{"item": "log", "quantity": 3}]"#, &registry).unwrap();
    let log = registry.item_id("log").unwrap();
    let plank = registry.item_id("plank").unwrap();

    let mut job = CraftingJob::new(&registry, stock, stack(plank, 6), JobConfig::default());
    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();

    assert!(report.is_satisfied());
    assert_eq!(report.used_from_storage, vec![stack(log, 2)]);
    assert_eq!(amount(job.ledger(), log), 1);
    assert_eq!(amount(job.ledger(), plank), 2);
}

// ===========================================================================
// Slot substitution
// ===========================================================================

fn sharpen_registry(rule: SlotRule) -> (craftplan_core::registry::Registry, ItemKey, ItemKey) {
    let mut builder = RegistryBuilder::new();
    let pick = builder.register_damageable_item("pick", 100);
    let head = builder.register_item("head");
    builder.register_pattern(Pattern {
        name: "sharpen".into(),
        inputs: vec![Some(ItemStack::new(ItemKey::damageable(pick, 0, 100), 1))],
        outputs: vec![ItemStack::of(head, 1)],
        craftable: true,
        slot_rules: vec![rule],
    });
    let registry = builder.build().unwrap();
    (registry, ItemKey::damageable(pick, 0, 100), ItemKey::new(head))
}

fn run_sharpen(rule: SlotRule, worn: u32) -> (Result<bool, JobError>, Ledger) {
    let (registry, pick, head) = sharpen_registry(rule);
    let worn_pick = ItemKey { damage: worn, ..pick };
    let config = JobConfig {
        simulate_on_failure: false,
        ..JobConfig::default()
    };
    let mut job = CraftingJob::new(
        &registry,
        Ledger::from_stacks([ItemStack::new(worn_pick, 1)]),
        ItemStack::new(head, 1),
        config,
    );
    let result = job
        .run(&planner(), &OpenWorld, &CancelToken::new())
        .map(|r| r.is_satisfied());
    (result, job.into_ledger())
}

#[test]
fn any_variant_slot_accepts_worn_item() {
    let (result, ledger) = run_sharpen(SlotRule::AnyVariant, 40);
    assert_eq!(result, Ok(true));
    assert!(ledger.available().is_empty());
}

#[test]
fn exact_slot_rejects_worn_item() {
    let (result, ledger) = run_sharpen(SlotRule::Exact, 40);
    assert!(matches!(result, Err(JobError::Unsatisfiable(_))));
    assert_eq!(ledger.available().total(), 1);
}

#[test]
fn fuzzy_slot_respects_durability_bucket() {
    use craftplan_core::item::FuzzyMode;
    let (result, _) = run_sharpen(SlotRule::Fuzzy(FuzzyMode::Percent50), 40);
    assert_eq!(result, Ok(true));
    let (result, _) = run_sharpen(SlotRule::Fuzzy(FuzzyMode::Percent50), 70);
    assert!(result.is_err());
}

/// Two planks in a three-slot grid make a bench. Stock holds two planks
/// carrying a tag the pattern does not declare.
fn run_bench(rule: Option<SlotRule>) -> Result<bool, JobError> {
    let mut builder = RegistryBuilder::new();
    let plank = builder.register_item("plank");
    let bench = builder.register_item("bench");
    let grid = vec![Some((plank, 1)), None, Some((plank, 1))];
    builder.register_pattern(match rule {
        Some(rule) => make_craftable_with_rule("bench", grid, (bench, 1), rule),
        None => make_craftable("bench", grid, (bench, 1)),
    });
    let registry = builder.build().unwrap();

    let painted = ItemKey::new(plank).with_tag(7);
    let mut job = CraftingJob::new(
        &registry,
        Ledger::from_stacks([ItemStack::new(painted, 2)]),
        stack(bench, 1),
        JobConfig {
            simulate_on_failure: false,
            ..JobConfig::default()
        },
    );
    job.run(&planner(), &OpenWorld, &CancelToken::new())
        .map(|r| r.is_satisfied())
}

#[test]
fn grid_slots_with_any_variant_accept_tagged_items() {
    assert_eq!(run_bench(Some(SlotRule::AnyVariant)), Ok(true));
    assert!(matches!(run_bench(None), Err(JobError::Unsatisfiable(_))));
}

struct NoSlots;

impl SlotContext for NoSlots {
    fn accepts(&self, _pattern: &Pattern, _slot: usize, _candidate: &ItemKey) -> bool {
        false
    }
}

#[test]
fn world_context_can_veto_substitution() {
    let (registry, pick, head) = sharpen_registry(SlotRule::AnyVariant);
    let mut job = CraftingJob::new(
        &registry,
        Ledger::from_stacks([ItemStack::new(pick, 1)]),
        ItemStack::new(head, 1),
        JobConfig {
            simulate_on_failure: false,
            ..JobConfig::default()
        },
    );
    let err = job.run(&planner(), &NoSlots, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, JobError::Unsatisfiable(_)));
}

// ===========================================================================
// Cycles
// ===========================================================================

#[test]
fn recursive_patterns_terminate() {
    // seed + water -> 2 seed. Stock on hand is taken before production, so
    // the inner seed need has nothing left and cannot recurse further.
    let mut builder = RegistryBuilder::new();
    let seed = builder.register_item("seed");
    let water = builder.register_item("water");
    builder.register_processing("grow", vec![(seed, 1), (water, 1)], vec![(seed, 2)]);
    let registry = builder.build().unwrap();

    let mut job = CraftingJob::new(
        &registry,
        ledger_with(&[(seed, 1), (water, 5)]),
        stack(seed, 3),
        JobConfig {
            simulate_on_failure: false,
            ..JobConfig::default()
        },
    );
    let err = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, JobError::Unsatisfiable(_)));

    // Mutual recursion terminates too.
    let mut builder = RegistryBuilder::new();
    let a = builder.register_item("a");
    let b = builder.register_item("b");
    builder.register_processing("a_from_b", vec![(b, 1)], vec![(a, 1)]);
    builder.register_processing("b_from_a", vec![(a, 1)], vec![(b, 1)]);
    let registry = builder.build().unwrap();
    let mut job = CraftingJob::new(&registry, Ledger::default(), stack(a, 1), JobConfig::default());
    let report = job.run(&planner(), &OpenWorld, &CancelToken::new()).unwrap();
    assert!(!report.is_satisfied());
}

#[test]
fn pattern_needing_its_own_output_only_extracts() {
    // 1 x + 1 catalyst -> 2 x
    let mut builder = RegistryBuilder::new();
    let x = builder.register_item("x");
    let catalyst = builder.register_item("catalyst");
    builder.register_processing("dup", vec![(x, 1), (catalyst, 1)], vec![(x, 2)]);
    let registry = builder.build().unwrap();

    let mut tree = CraftingTree::new(&registry, stack(x, 3));
    let mut ledger = ledger_with(&[(x, 3), (catalyst, 3)]);
    resolve(&mut tree, 3, &mut ledger).unwrap();
    assert_eq!(amount(&ledger, x), 0);
    assert_eq!(amount(&ledger, catalyst), 3);
    assert_eq!(tree.process(tree.root_candidates()[0]).unwrap().crafts(), 0);

    let mut tree = CraftingTree::new(&registry, stack(x, 3));
    let mut empty = ledger_with(&[(catalyst, 3)]);
    assert!(resolve(&mut tree, 3, &mut empty).is_err());
}

// ===========================================================================
// Cancellation
// ===========================================================================

#[test]
fn cancelled_before_run_touches_nothing() {
    let conv = conversion_registry();
    let ledger = ledger_with(&[(conv.b, 10)]);
    let before = snapshot_ledger(&ledger).unwrap();
    let mut job = CraftingJob::new(&conv.registry, ledger, stack(conv.a, 3), JobConfig::default());

    let token = CancelToken::new();
    token.cancel();
    assert_eq!(
        job.run(&planner(), &OpenWorld, &token).unwrap_err(),
        JobError::Cancelled
    );
    assert_eq!(
        job.simulate(&planner(), &OpenWorld, &token).unwrap_err(),
        JobError::Cancelled
    );
    assert_eq!(snapshot_ledger(job.ledger()).unwrap(), before);
}

/// Cancels its token the first time a slot is validated.
struct CancelOnFirstSlot(CancelToken);

impl SlotContext for CancelOnFirstSlot {
    fn accepts(&self, _pattern: &Pattern, _slot: usize, _candidate: &ItemKey) -> bool {
        self.0.cancel();
        true
    }
}

#[test]
fn cancellation_mid_pass_discards_partial_work() {
    let mut builder = RegistryBuilder::new();
    let plank = builder.register_item("plank");
    let table = builder.register_item("table");
    builder.register_pattern(make_craftable(
        "table",
        vec![Some((plank, 1)), Some((plank, 1))],
        (table, 1),
    ));
    let registry = builder.build().unwrap();

    let ledger = ledger_with(&[(plank, 5)]);
    let before = snapshot_ledger(&ledger).unwrap();
    let mut job = CraftingJob::new(&registry, ledger, stack(table, 1), JobConfig::default());

    let token = CancelToken::new();
    let ctx = CancelOnFirstSlot(token.clone());
    let err = job.run(&planner(), &ctx, &token).unwrap_err();

    assert_eq!(err, JobError::Cancelled);
    assert!(job.log().missing().is_empty());
    assert_eq!(snapshot_ledger(job.ledger()).unwrap(), before);
}
