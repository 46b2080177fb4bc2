//! Profiles stored as plain JSON arrays.
//!
//! ```json
//! {
//!   "time": ["2023-01-01T00:00:00", ...],
//!   "altitude": [15.0, 30.0, ...],
//!   "station_altitude": 0.0,
//!   "instrument": "CHM15k",
//!   "units": "m-1.sr-1",
//!   "attenuated_backscatter": [[1.2e-6, null, ...], ...],
//!   "cloud_base_height": [null, 2150.0, ...]
//! }
//! ```
//!
//! `wavelength` falls back to the nominal wavelength of `instrument` (matched
//! case-insensitively, unknown names are ignored) and `units` defaults to
//! m-1.sr-1. Missing values are `null` and read as NaN.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{DataReader, ReadError};
use crate::instruments::Instrument;
use crate::profiles::{AltitudeGrid, BackscatterUnits, ProfilesData};

pub struct JsonReader {
    pub file_name: PathBuf,
}

#[derive(Deserialize)]
struct ProfilesFile {
    time: Vec<NaiveDateTime>,
    altitude: Vec<f64>,
    #[serde(default)]
    station_altitude: f64,
    wavelength: Option<f64>,
    instrument: Option<String>,
    units: Option<String>,
    attenuated_backscatter: Vec<Vec<Option<f64>>>,
    cloud_base_height: Option<Vec<Option<f64>>>,
}

#[derive(Serialize)]
struct ProfilesFileRef<'a> {
    time: &'a [NaiveDateTime],
    altitude: &'a [f64],
    station_altitude: f64,
    wavelength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    instrument: Option<Instrument>,
    units: String,
    attenuated_backscatter: &'a [Vec<f64>],
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud_base_height: Option<&'a [f64]>,
}

fn nan_filled(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

impl JsonReader {
    fn path(&self) -> String {
        self.file_name.display().to_string()
    }

    fn invalid(&self, reason: impl ToString) -> ReadError {
        ReadError::Invalid {
            path: self.path(),
            reason: reason.to_string(),
        }
    }
}

impl DataReader for JsonReader {
    fn read_profiles(&self) -> Result<ProfilesData, ReadError> {
        let file = File::open(&self.file_name).map_err(|source| ReadError::Io {
            path: self.path(),
            source,
        })?;
        let raw: ProfilesFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ReadError::Json {
                path: self.path(),
                source,
            })?;

        let instrument = raw.instrument.as_deref().and_then(|name| {
            let found = Instrument::from_name(name);
            if found.is_none() {
                warn!(file = %self.file_name.display(), instrument = name, "unknown instrument");
            }
            found
        });
        let wavelength = match (raw.wavelength, instrument) {
            (Some(wl), _) => wl,
            (None, Some(instrument)) => instrument.wavelength(),
            (None, None) => return Err(self.invalid("neither wavelength nor instrument given")),
        };
        let units = raw
            .units
            .as_deref()
            .map(BackscatterUnits::from_label)
            .unwrap_or_default();

        let grid = AltitudeGrid::new(raw.altitude, raw.station_altitude)
            .map_err(|e| self.invalid(e))?;
        let data = raw
            .attenuated_backscatter
            .into_iter()
            .map(nan_filled)
            .collect();

        let mut profiles = ProfilesData::new(raw.time, grid, wavelength, units, data)
            .map_err(|e| self.invalid(e))?;
        if let Some(cbh) = raw.cloud_base_height {
            profiles = profiles
                .with_cloud_base_height(nan_filled(cbh))
                .map_err(|e| self.invalid(e))?;
        }
        if let Some(instrument) = instrument {
            profiles = profiles.with_instrument(instrument);
        }

        debug!(
            file = %self.file_name.display(),
            profiles = profiles.n_time(),
            levels = profiles.grid().len(),
            "read profiles"
        );
        Ok(profiles)
    }
}

/// Writes profiles in the layout read by `JsonReader`.
pub fn write_profiles<P: AsRef<Path>>(path: P, profiles: &ProfilesData) -> Result<(), ReadError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ReadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let grid = profiles.grid();
    let body = ProfilesFileRef {
        time: profiles.time(),
        altitude: grid.altitude(),
        station_altitude: grid.station_altitude(),
        wavelength: profiles.wavelength(),
        instrument: profiles.instrument(),
        units: profiles.units().to_string(),
        attenuated_backscatter: profiles.attenuated_backscatter(),
        cloud_base_height: profiles.cloud_base_height(),
    };
    serde_json::to_writer(BufWriter::new(file), &body).map_err(|source| ReadError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_profiles() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "chm15k.json",
            r#"{
                "time": ["2023-01-01T00:00:00", "2023-01-01T00:05:00"],
                "altitude": [115.0, 130.0, 145.0],
                "station_altitude": 100.0,
                "instrument": "CHM15k",
                "units": "Mm-1.sr-1",
                "attenuated_backscatter": [[1.0, null, 3.0], [4.0, 5.0, 6.0]],
                "cloud_base_height": [null, 145.0]
            }"#,
        );

        let profiles = JsonReader { file_name: path }.read_profiles().unwrap();
        assert_eq!(profiles.n_time(), 2);
        assert_eq!(profiles.wavelength(), 1064.0);
        assert_eq!(profiles.units(), BackscatterUnits::PerMegameterSr);
        assert_eq!(profiles.instrument(), Some(Instrument::Chm15k));
        assert!(profiles.profile(0)[1].is_nan());
        assert_eq!(profiles.profile(1), &[4.0, 5.0, 6.0]);
        assert_eq!(profiles.grid().agl(), vec![15.0, 30.0, 45.0]);
        let cbh = profiles.cloud_base_height().unwrap();
        assert!(cbh[0].is_nan());
        assert_eq!(cbh[1], 145.0);
    }

    #[test]
    fn test_read_errors() {
        let dir = tempdir().unwrap();

        let missing = JsonReader {
            file_name: dir.path().join("missing.json"),
        };
        assert!(matches!(missing.read_profiles(), Err(ReadError::Io { .. })));

        let path = write(dir.path(), "broken.json", "{\"time\": [");
        let broken = JsonReader { file_name: path };
        assert!(matches!(broken.read_profiles(), Err(ReadError::Json { .. })));

        // One profile for two timestamps.
        let path = write(
            dir.path(),
            "shape.json",
            r#"{
                "time": ["2023-01-01T00:00:00", "2023-01-01T00:05:00"],
                "altitude": [15.0, 30.0],
                "wavelength": 910.0,
                "attenuated_backscatter": [[1.0, 2.0]]
            }"#,
        );
        let shape = JsonReader { file_name: path };
        assert!(matches!(shape.read_profiles(), Err(ReadError::Invalid { .. })));

        let path = write(
            dir.path(),
            "nowl.json",
            r#"{"time": [], "altitude": [15.0, 30.0], "attenuated_backscatter": []}"#,
        );
        let no_wavelength = JsonReader { file_name: path };
        let err = no_wavelength.read_profiles().unwrap_err();
        assert!(err.to_string().contains("wavelength"));
    }

    #[test]
    fn test_instrument_names() {
        let dir = tempdir().unwrap();
        let body = |name: &str| {
            format!(
                r#"{{"time": ["2023-01-01T00:00:00"], "altitude": [15.0, 30.0],
                    "instrument": "{name}", "attenuated_backscatter": [[1.0, 2.0]]}}"#
            )
        };

        let path = write(dir.path(), "cl51.json", &body("cl51"));
        let profiles = JsonReader { file_name: path }.read_profiles().unwrap();
        assert_eq!(profiles.instrument(), Some(Instrument::Cl51));
        assert_eq!(profiles.wavelength(), 910.0);

        // An unknown name gives no wavelength to fall back on.
        let path = write(dir.path(), "other.json", &body("LR111"));
        let err = JsonReader { file_name: path }.read_profiles().unwrap_err();
        assert!(err.to_string().contains("wavelength"));
    }

    #[test]
    fn test_written_profiles_read_back() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "in.json",
            r#"{
                "time": ["2023-01-01T00:00:00"],
                "altitude": [15.0, 30.0],
                "wavelength": 532.0,
                "attenuated_backscatter": [[null, 2.0]]
            }"#,
        );
        let profiles = JsonReader { file_name: path }.read_profiles().unwrap();

        let out = dir.path().join("out.json");
        write_profiles(&out, &profiles).unwrap();
        let again = JsonReader { file_name: out }.read_profiles().unwrap();

        assert_eq!(again.wavelength(), 532.0);
        assert_eq!(again.units(), BackscatterUnits::PerMeterSr);
        assert!(again.profile(0)[0].is_nan());
        assert_eq!(again.profile(0)[1], 2.0);
        assert_eq!(again.time(), profiles.time());
    }
}
