//! Configuration loading, validation and dependency wiring.

mod dependencies;
mod settings;
pub mod validation;

pub use dependencies::Dependencies;
pub use settings::Settings;
