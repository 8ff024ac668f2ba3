pub mod config;
pub mod error;
pub mod preflight;

pub use config::Config;
pub use error::*;
pub use preflight::{PreflightReport, Role};
