//! Stepwise Migration Library
//!
//! Building blocks of the `stepwise-migrate` CLI: backend selection from a
//! database URL, settings resolution and migration file generation.

pub mod backend;
pub mod generate;
pub mod settings;
