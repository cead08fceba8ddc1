#![no_main]

use libfuzzer_sys::fuzz_target;
use promptlab_core::AppConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = AppConfig::from_yaml_str(s, "fuzz.yaml") {
            let _ = config.validate();
            let _ = config.runs_path();
        }
    }
});
