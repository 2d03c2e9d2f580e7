//! Flutter-facing bindings for AllerPaws core.

pub mod api;
