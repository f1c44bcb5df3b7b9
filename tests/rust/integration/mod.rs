//! Integration tests - resolve treat queries against the fixture catalog
//!
//! Plans are checked on their shape and, through an in-memory evaluator,
//! on the rows they produce under each inheritance strategy.

mod support;

mod config_tests;
mod error_tests;
mod property_tests;
mod scenario_tests;
