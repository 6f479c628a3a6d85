//! Factories building small but realistic modules for unit tests.

pub mod entity_alive;
