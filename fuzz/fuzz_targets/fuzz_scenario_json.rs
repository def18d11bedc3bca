//! Fuzz target for scenario files.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input
//! - Any scenario that loads passes validation and yields a launchable environment

#![no_main]

use libfuzzer_sys::fuzz_target;
use snapshot_harness::ScenarioConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(scenario) = ScenarioConfig::from_json(text) {
        assert!(scenario.validate().is_ok());
        for role in scenario.roles().take(64) {
            let _ = scenario.environment(role);
        }
    }
});
