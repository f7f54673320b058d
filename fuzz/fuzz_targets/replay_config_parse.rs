#![no_main]

use formfill_replay::replay_config::parse_replay_config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(config) = parse_replay_config(&raw) {
        assert!(config.wait_policy().is_ok());
        assert!(config.build_orchestrator().is_ok());
    }
});
