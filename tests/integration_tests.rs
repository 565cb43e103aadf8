//! Integration Tests
//!
//! Exercises the dispatcher's HTTP surface end-to-end against a real,
//! migrated Postgres database (via testcontainers). GDAL/raster
//! processing itself is covered by the unit tests in `src/raster`; these
//! tests only verify the enqueue/status/cancel/queue-status contract.
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

mod common;
mod integration;

pub use common::*;
