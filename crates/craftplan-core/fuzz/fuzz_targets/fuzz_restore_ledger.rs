#![no_main]
use craftplan_core::serialize::restore_ledger;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to restore_ledger.
    // Must not panic -- returning Err is fine.
    let _ = restore_ledger(data);
});
