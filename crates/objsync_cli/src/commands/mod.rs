//! CLI command implementations.

pub mod scopes;
