#![no_main]
use arbitrary::Arbitrary;
use craftplan_core::cancel::CancelToken;
use craftplan_core::job::{CraftingJob, JobConfig};
use craftplan_core::registry::{OpenWorld, RegistryBuilder};
use craftplan_core::test_utils::*;
use libfuzzer_sys::fuzz_target;

/// A processing pattern over the fixed item set, referenced by index.
#[derive(Arbitrary, Debug)]
struct FuzzPattern {
    inputs: Vec<(u8, u8)>,
    output: (u8, u8),
}

/// Top-level fuzz input: patterns, stock and one request.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    patterns: Vec<FuzzPattern>,
    stock: [u8; 4],
    request: (u8, u8),
    craft_only: bool,
}

const ITEMS: usize = 4;

fuzz_target!(|input: FuzzInput| {
    let mut builder = RegistryBuilder::new();
    let items: Vec<_> = (0..ITEMS)
        .map(|i| builder.register_item(&format!("item_{i}")))
        .collect();
    let pick = |index: u8| items[index as usize % ITEMS];

    // Limit patterns to keep the eager tree small.
    for (n, pattern) in input.patterns.iter().take(6).enumerate() {
        let inputs = pattern
            .inputs
            .iter()
            .take(3)
            .map(|&(item, q)| (pick(item), u64::from(q % 4) + 1))
            .collect();
        let output = (pick(pattern.output.0), u64::from(pattern.output.1 % 4) + 1);
        builder.register_processing(&format!("p{n}"), inputs, vec![output]);
    }
    let Ok(registry) = builder.build() else {
        return;
    };

    let stock: Vec<_> = items
        .iter()
        .zip(input.stock)
        .map(|(&item, q)| (item, u64::from(q)))
        .collect();
    let request = stack(pick(input.request.0), u64::from(input.request.1 % 16) + 1);
    let config = JobConfig {
        craft_only: input.craft_only,
        ..JobConfig::default()
    };

    // Must not panic -- any report or error is fine.
    let mut job = CraftingJob::new(&registry, ledger_with(&stock), request, config);
    let _ = job.run(&planner(), &OpenWorld, &CancelToken::new());
});
