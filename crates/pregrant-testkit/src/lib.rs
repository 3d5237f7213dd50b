//! # pregrant Testkit
//!
//! Testing utilities for pregrant.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Engines over each registry backend, peers sharing their
//!   state, and planted grants
//! - **Fault injection**: Content stores that fail or stall on demand
//! - **Generators**: Proptest strategies for payloads, identifiers and records
//!
//! The multi-worker and failure scenarios live in this crate's `tests/`.
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use pregrant_testkit::fixtures::{Backend, TestFixture};
//!
//! async fn example() {
//!     let fixture = TestFixture::new(Backend::Ledger).await;
//!     let (record, _grants) = fixture
//!         .produce_and_grant("alice", &["R1"], b"{\"temp\": 21.5}")
//!         .await
//!         .unwrap();
//!     fixture.engine.worker().run_once().await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, test_config, Backend, FlakyContentStore, TestFixture};
pub use generators::{payload, payload_sizes, sensor_reading};
