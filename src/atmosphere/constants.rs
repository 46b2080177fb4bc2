//! Physical constants and standard atmosphere layers
//!
//! Values follow Bucholtz (1995) for the Rayleigh calculation, with the King
//! correction factor of Tomasi et al. (2005).

/// Loschmidt number, molecules per cm3 at standard temperature and pressure.
pub const LOSCHMIDT: f64 = 6.02214e23 / 22.4141 / 1000.0;

/// Depolarisation (King) correction factor of air.
pub const KING_FACTOR: f64 = 1.05;

/// Molecular extinction-to-backscatter ratio, in sr.
pub const MOLECULAR_LIDAR_RATIO: f64 = 8.0 * std::f64::consts::PI / 3.0;

/// Pressure scale height, in km.
pub const SCALE_HEIGHT_KM: f64 = 8.0;

/// Top of the modelled atmosphere, in km.
pub const TOP_OF_ATMOSPHERE_KM: f64 = 100.0;

pub const DEFAULT_T0: f64 = 298.0;
pub const DEFAULT_P0: f64 = 1013.0;

/// A layer of constant temperature lapse rate.
#[derive(Debug, Clone, Copy)]
pub struct AtmosphereLayer {
    pub name: &'static str,
    /// Bottom of the layer, in km.
    pub zmin: f64,
    /// Top of the layer, in km.
    pub zmax: f64,
    /// Temperature gradient, in K/km.
    pub dtdz: f64,
}

pub const STANDARD_LAYERS: [AtmosphereLayer; 3] = [
    AtmosphereLayer {
        name: "troposphere",
        zmin: 0.0,
        zmax: 13.0,
        dtdz: -6.5,
    },
    AtmosphereLayer {
        name: "stratosphere",
        zmin: 13.0,
        zmax: 55.0,
        dtdz: 1.4,
    },
    AtmosphereLayer {
        name: "mesosphere",
        zmin: 55.0,
        zmax: 100.0,
        dtdz: -2.4,
    },
];
