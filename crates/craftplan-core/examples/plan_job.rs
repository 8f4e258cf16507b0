//! Plan a small crafting job and print the report.
//!
//! Registers a two-level pattern book (planks sawn from logs, tables crafted
//! from planks in a grid), stocks a ledger, and runs the same job once with
//! enough logs and once with too few, printing what is missing.
//!
//! Run with: `cargo run -p craftplan-core --example plan_job`

use craftplan_core::cancel::CancelToken;
use craftplan_core::item::ItemStack;
use craftplan_core::job::{CraftingJob, JobConfig, JobOutcome};
use craftplan_core::ledger::{ActionSource, Ledger};
use craftplan_core::registry::{OpenWorld, Pattern, Registry, RegistryBuilder};

fn build_registry() -> Registry {
    let mut builder = RegistryBuilder::new();
    let log = builder.register_item("log");
    let plank = builder.register_item("plank");
    let table = builder.register_item("table");

    // 1 log -> 4 planks.
    builder.register_processing("saw", vec![(log, 1)], vec![(plank, 4)]);

    // Three planks across the top row, one in each lower corner.
    let p = || Some(ItemStack::of(plank, 1));
    builder.register_pattern(Pattern {
        name: "table".into(),
        inputs: vec![p(), p(), p(), None, None, None, p(), None, p()],
        outputs: vec![ItemStack::of(table, 1)],
        craftable: true,
        slot_rules: Vec::new(),
    });

    builder.build().expect("registry is valid")
}

fn plan(registry: &Registry, logs: u64, tables: u64) {
    let log = registry.item_id("log").expect("log registered");
    let table = registry.item_id("table").expect("table registered");

    let ledger = Ledger::from_stacks([ItemStack::of(log, logs)]);
    let mut job = CraftingJob::new(
        registry,
        ledger,
        ItemStack::of(table, tables),
        JobConfig::default(),
    );

    println!("--- {tables} table(s) from {logs} log(s) ---");
    let report = match job.run(&ActionSource::Planner, &OpenWorld, &CancelToken::new()) {
        Ok(report) => report,
        Err(err) => {
            println!("  failed: {err}");
            return;
        }
    };

    for task in &report.tasks {
        let name = registry
            .get_pattern(task.pattern)
            .map_or("?", |p| p.name.as_str());
        println!("  {name} x{} (depth {})", task.repetitions, task.depth);
    }
    match &report.outcome {
        JobOutcome::Satisfied => println!("  satisfied"),
        JobOutcome::Missing(items) => {
            for stack in items {
                let name = registry
                    .get_item(stack.key.item_type)
                    .map_or("?", |d| d.name.as_str());
                println!("  missing {name} x{}", stack.quantity);
            }
        }
    }
}

fn main() {
    let registry = build_registry();
    plan(&registry, 4, 3);
    plan(&registry, 2, 3);
}
