//! Molecular (Rayleigh) atmosphere
//!
//! This module provides the standard-atmosphere molecular scattering profile used
//! as the aerosol-free reference of the extinction retrieval.

pub mod constants;
pub mod rayleigh;

pub use rayleigh::MolecularProfile;
