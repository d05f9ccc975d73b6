#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = reef_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        // Anything the config layer accepts must convert and pass core checks
        let settings = reef_core::CoreSettings::from(&cfg);
        let _ = settings.validate();
    }
});
