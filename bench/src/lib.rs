//! Benchmark utilities for the Dream engine.
//!
//! - **Task benchmarks**: push/fence round trips and cache contention on the
//!   task pool
//! - **Scene benchmarks**: delete sweeps and full frames over random trees
//! - **Frame timing**: per-frame statistics for a running project
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench -p dream_bench
//!
//! # Only the sweep group
//! cargo bench -p dream_bench -- sweep
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports.

pub mod frame_timer;
pub mod scenarios;
