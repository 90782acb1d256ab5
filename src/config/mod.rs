//! Configuration module for numascope
//!
//! Provides the CLI arguments and the runtime settings built from them.

mod settings;

pub use settings::*;
