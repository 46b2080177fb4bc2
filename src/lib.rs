//! Cloud detection and aerosol extinction retrieval from ceilometer profiles.

pub mod atmosphere;
pub mod config;
pub mod date_gen;
pub mod detection;
pub mod error;
pub mod instruments;
pub mod pipeline;
pub mod profiles;
pub mod readers;
pub mod retrieval;
pub mod simulation;
pub mod utils;

pub use error::{Error, Result};
