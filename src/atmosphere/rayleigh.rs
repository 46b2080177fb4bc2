use tracing::debug;

use super::constants::{
    DEFAULT_P0, DEFAULT_T0, KING_FACTOR, LOSCHMIDT, MOLECULAR_LIDAR_RATIO, SCALE_HEIGHT_KM,
    STANDARD_LAYERS, TOP_OF_ATMOSPHERE_KM,
};
use crate::error::{Error, Result};
use crate::profiles::AltitudeGrid;

/// Rayleigh backscatter and extinction profiles in a standard atmosphere,
/// aligned to an altitude grid.
#[derive(Debug, Clone)]
pub struct MolecularProfile {
    wavelength: f64,
    t0: f64,
    p0: f64,
    /// m-1.sr-1
    backscatter: Vec<f64>,
    /// m-1
    extinction: Vec<f64>,
    /// cm2
    cross_section: f64,
    tau: f64,
}

impl MolecularProfile {
    /// Profile for the standard sea-level conditions (298 K, 1013 hPa).
    pub fn standard(grid: &AltitudeGrid, wavelength: f64) -> Result<Self> {
        Self::new(grid, wavelength, DEFAULT_T0, DEFAULT_P0)
    }

    /// Computes the molecular profile for `wavelength` (nm) with ground
    /// temperature `t0` (K) and pressure `p0` (hPa).
    ///
    /// The atmosphere is discretised every grid resolution from the ground to
    /// 100 km, and each grid altitude takes the nearest level.
    pub fn new(grid: &AltitudeGrid, wavelength: f64, t0: f64, p0: f64) -> Result<Self> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(Error::invalid(format!(
                "wavelength must be positive, got {wavelength}"
            )));
        }
        if !(t0.is_finite() && t0 > 0.0 && p0.is_finite() && p0 > 0.0) {
            return Err(Error::invalid(format!(
                "ground conditions must be positive, got T0={t0} K, P0={p0} hPa"
            )));
        }

        let dz_km = grid.resolution() / 1000.0;
        let top = ((TOP_OF_ATMOSPHERE_KM / dz_km).ceil() as usize).saturating_sub(1);
        let cross_section = rayleigh_cross_section(wavelength);

        let extinction: Vec<f64> = grid
            .altitude()
            .iter()
            .map(|z| {
                let k = ((z / 1000.0 / dz_km).round().max(0.0) as usize).min(top);
                // cm-1 to m-1
                number_density(k as f64 * dz_km, t0, p0) * cross_section * 1e2
            })
            .collect();
        let backscatter = extinction
            .iter()
            .map(|e| e / MOLECULAR_LIDAR_RATIO)
            .collect();
        let tau = extinction.iter().sum::<f64>() * grid.resolution();

        debug!(wavelength, cross_section, tau, "molecular profile");

        Ok(Self {
            wavelength,
            t0,
            p0,
            backscatter,
            extinction,
            cross_section,
            tau,
        })
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn ground_conditions(&self) -> (f64, f64) {
        (self.t0, self.p0)
    }

    pub fn backscatter(&self) -> &[f64] {
        &self.backscatter
    }

    pub fn extinction(&self) -> &[f64] {
        &self.extinction
    }

    pub fn cross_section(&self) -> f64 {
        self.cross_section
    }

    /// Molecular optical depth over the grid.
    pub fn tau(&self) -> f64 {
        self.tau
    }
}

/// Refractive index of air in a standard atmosphere (Peck and Reeder, 1972),
/// for a wavelength in µm.
fn refractive_index(wavelength_um: f64) -> f64 {
    let inv2 = wavelength_um.powi(-2);
    (8060.51 + 2480990.0 / (132.274 - inv2) + 17455.7 / (39.32957 - inv2)) * 1e-8 + 1.0
}

/// Rayleigh scattering cross section per molecule in cm2, for a wavelength in nm.
pub fn rayleigh_cross_section(wavelength: f64) -> f64 {
    let n2 = refractive_index(wavelength * 1e-3).powi(2);
    let num = 24.0 * std::f64::consts::PI.powi(3) * (n2 - 1.0).powi(2);
    let denom = (wavelength * 1e-7).powi(4) * LOSCHMIDT.powi(2) * (n2 + 2.0).powi(2);
    num / denom * KING_FACTOR
}

/// Temperature (K) at `z_km`, integrating the lapse rate of each layer.
fn temperature(z_km: f64, t0: f64) -> f64 {
    STANDARD_LAYERS.iter().fold(t0, |t, layer| {
        let thickness = (z_km.min(layer.zmax) - layer.zmin).max(0.0);
        t + thickness * layer.dtdz
    })
}

/// Molecule number density in cm-3 at `z_km`.
fn number_density(z_km: f64, t0: f64, p0: f64) -> f64 {
    let p = p0 * (-z_km / SCALE_HEIGHT_KM).exp();
    LOSCHMIDT * (t0 / p0) * (p / temperature(z_km, t0))
}
