use page_handler::RuntimeConfig;
use std::collections::HashMap;

fn lookup(vars: &[(&str, &str)]) -> RuntimeConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    RuntimeConfig::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn defaults_apply_without_variables() {
    assert_eq!(lookup(&[]), RuntimeConfig::default());
    assert_eq!(RuntimeConfig::default().max_ticks, 64);
    assert_eq!(RuntimeConfig::default().hydration_depth, 32);
}

#[test]
fn variables_override_and_clamp() {
    let config = lookup(&[
        ("MIRAGE_MAX_TICKS", "0"),
        ("MIRAGE_HYDRATION_DEPTH", " 5 "),
        ("MIRAGE_COALESCE", "0"),
        ("MIRAGE_TELEMETRY", "1"),
    ]);
    assert_eq!(config, RuntimeConfig::new(1, 5, false, true));
}

#[test]
fn unparsable_values_fall_back() {
    let config = lookup(&[("MIRAGE_MAX_TICKS", "many"), ("MIRAGE_COALESCE", "yes")]);
    assert_eq!(config.max_ticks, 64);
    assert!(config.coalesce);
}
