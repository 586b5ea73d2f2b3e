//! Proptest strategies.

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

use apollo_config_core::RawConfig;

/// Keys shaped like real property names.
pub fn config_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,15}"
}

/// Arbitrary printable values, including empty ones.
pub fn config_value() -> impl Strategy<Value = String> {
    "\\PC{0,24}"
}

/// A flat `configurations` map.
pub fn raw_config() -> impl Strategy<Value = RawConfig> {
    btree_map(config_key(), config_value(), 0..16)
}

/// Subscriber priorities with plenty of ties.
pub fn priorities() -> impl Strategy<Value = Vec<i32>> {
    vec(-3i32..=3, 0..12)
}

/// A sequence of releases for one namespace: `(release_key, config)`,
/// with distinct release keys `r1`, `r2`, ...
pub fn releases() -> impl Strategy<Value = Vec<(String, RawConfig)>> {
    vec(raw_config(), 1..6).prop_map(|configs| {
        configs
            .into_iter()
            .enumerate()
            .map(|(i, config)| (format!("r{}", i + 1), config))
            .collect()
    })
}
