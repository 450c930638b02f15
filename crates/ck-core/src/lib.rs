//! # ck-core
//!
//! Property vocabulary for the conkit concurrency primitives.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths as thread diagrams
//! - One invariant module per primitive (`stack`, `queue`, `rwlock`, `pool`)
//!
//! ## How checking works
//!
//! Tests record what happened (pushes, pops, lock acquisitions, task runs)
//! into a history. A checker replays that history against a sequential model
//! of the primitive and reports the first step where the two disagree.
//! Checkers never touch the primitive itself, so the same vocabulary serves
//! unit tests, DST runs and multi-threaded stress tests.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, ThreadAction};
pub use property::{PropertyChecker, PropertyResult};
