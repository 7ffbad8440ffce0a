//! CLI command implementations

pub mod info;
pub mod run;

pub use run::RunCommand;
