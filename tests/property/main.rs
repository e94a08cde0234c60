//! Property-based soundness tests for the allocation engine.
//!
//! Run with: `cargo test --test property`

mod banker_safety;
