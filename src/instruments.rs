use serde::Serialize;
use std::fmt::Display;

/// Ceilometer families found in the automatic lidar networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Instrument {
    #[serde(rename = "CHM15k")]
    Chm15k,
    #[serde(rename = "CL31")]
    Cl31,
    #[serde(rename = "CL51")]
    Cl51,
    #[serde(rename = "CL61")]
    Cl61,
    #[serde(rename = "CS135")]
    Cs135,
    #[serde(rename = "Mini-MPL")]
    MiniMpl,
}

impl Instrument {
    pub const ALL: [Instrument; 6] = [
        Instrument::Chm15k,
        Instrument::Cl31,
        Instrument::Cl51,
        Instrument::Cl61,
        Instrument::Cs135,
        Instrument::MiniMpl,
    ];

    /// Nominal laser wavelength, in nm.
    pub fn wavelength(&self) -> f64 {
        match self {
            // Nd:YAG
            Instrument::Chm15k => 1064.0,
            // InGaAs diode lasers
            Instrument::Cl31 | Instrument::Cl51 => 910.0,
            Instrument::Cl61 => 910.55,
            Instrument::Cs135 => 912.0,
            Instrument::MiniMpl => 532.0,
        }
    }

    /// Case-insensitive lookup of the display name, e.g. `chm15k`.
    pub fn from_name(name: &str) -> Option<Instrument> {
        Self::ALL
            .into_iter()
            .find(|i| i.to_string().eq_ignore_ascii_case(name))
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instrument::Chm15k => write!(f, "CHM15k"),
            Instrument::Cl31 => write!(f, "CL31"),
            Instrument::Cl51 => write!(f, "CL51"),
            Instrument::Cl61 => write!(f, "CL61"),
            Instrument::Cs135 => write!(f, "CS135"),
            Instrument::MiniMpl => write!(f, "Mini-MPL"),
        }
    }
}
