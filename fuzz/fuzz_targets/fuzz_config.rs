//! Fuzz target for config.toml parsing and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use vmkit_core::config::Settings;

fuzz_target!(|data: &str| {
    if let Ok(settings) = Settings::from_toml_str(data, Path::new("fuzz.toml")) {
        // whatever validates must survive a round trip
        let rendered = settings.to_toml_string().unwrap();
        let reparsed = Settings::from_toml_str(&rendered, Path::new("fuzz.toml")).unwrap();
        assert_eq!(reparsed, settings);
    }
});
