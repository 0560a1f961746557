// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz LaunchConfig TOML parsing and validation.
//!
//! Feeds arbitrary byte strings through `parse_toml` and `validate_config`,
//! verifying:
//! 1. `parse_toml` never panics on arbitrary input.
//! 2. Successfully parsed configs can be validated without panics.
//! 3. Round-trip: serialize back to TOML and re-parse produces the same config.
//! 4. Profile lookup agrees with the profile map.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(config) = xh_config::parse_toml(s) else {
        return;
    };

    match xh_config::validate_config(&config) {
        Ok(warnings) => {
            for w in &warnings {
                let _ = format!("{w}");
            }
            // A valid config never names a missing default profile.
            if config.default_profile.is_some() {
                assert!(matches!(config.select_profile(None), Ok(Some(_))));
            }
        }
        Err(e) => {
            let _ = format!("{e}");
        }
    }

    for name in config.profiles.keys() {
        assert!(config.profile(name).is_ok());
    }

    if let Ok(toml_str) = toml::to_string(&config)
        && let Ok(rt) = xh_config::parse_toml(&toml_str)
    {
        assert_eq!(config, rt, "TOML round-trip must be lossless");
    }

    if let Ok(json) = serde_json::to_string(&config) {
        let _ = serde_json::from_str::<xh_config::LaunchConfig>(&json);
    }
});
