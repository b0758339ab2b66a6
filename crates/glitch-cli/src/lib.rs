//! GLITCH command-line front end.
//!
//! Resolves configuration and drives a [`glitch::RuleSupplier`] from an
//! interactive terminal session.

pub mod config;
pub mod repl;
