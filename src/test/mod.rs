//! Crate-internal test support: fixture modules shared by the unit tests.

pub mod factories;
