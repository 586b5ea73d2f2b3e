//! # Apollo Config Testkit
//!
//! Testing utilities for the Apollo config client.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: response bodies, a scripted meta/config server setup on
//!   the in-memory transport, and a recording subscriber
//! - **Generators**: Proptest strategies for property-based testing
//! - **Golden vectors**: request signatures with known expected values
//!
//! ## Test Fixtures
//!
//! ```rust
//! use apollo_config_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new("my-app", 2);
//! fixture.serve_config(0, "application", &[("timeout", "30")], "r1");
//! let engine = fixture.engine("application");
//! ```
//!
//! ## Golden Vectors
//!
//! ```rust
//! use apollo_config_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok) in verify_all_vectors() {
//!     assert!(ok, "{} does not match", name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use apollo_config_testkit::generators::raw_config;
//!
//! proptest! {
//!     #[test]
//!     fn parse_is_identity_for_flat_namespaces(raw in raw_config()) {
//!         let parsed = apollo_config_core::parse_configurations("application", &raw).unwrap();
//!         prop_assert_eq!(parsed, raw);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{raw_map, RecordingSink, TestFixture};
pub use generators::{config_key, config_value, priorities, raw_config, releases};
pub use vectors::{all_vectors, verify_all_vectors, SigningVector};
