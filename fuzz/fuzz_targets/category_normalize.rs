#![no_main]

use libfuzzer_sys::fuzz_target;
use promptlab_core::CategorySet;

fuzz_target!(|data: &[u8]| {
    let answer = String::from_utf8_lossy(data);
    let set = CategorySet::default();
    let label = set.normalize(&answer);
    assert!(set.contains(&label) || label == set.fallback);
});
