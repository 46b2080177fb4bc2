use chrono::{Duration, Months, NaiveDate};

use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::detection::FocMethod;
use crate::pipeline::{CloudOptions, InversionOptions, PblOptions};
use crate::profiles::preprocess::PreprocessOptions;

pub mod error;
pub use error::ConfigError;

pub mod time_step;
pub use time_step::TimeStep;

/// Where the daily input files live and how they are named.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InputTemplate {
    pub base_directory: PathBuf,
    /// File name with a `{}` placeholder for the date, e.g. `chm15k_{}.json`.
    pub filename_pattern: String,
    /// One of `YYYYMMDD`, `YYYY-MM-DD` or `YYYY_MM_DD`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    "YYYYMMDD".to_string()
}

#[derive(Debug, Clone)]
pub struct Config {
    start_date: NaiveDate,
    end_date: NaiveDate,
    frequency: TimeStep,
    input: InputTemplate,
    output_directory: PathBuf,
    inversion: InversionOptions,
    clouds: Option<CloudOptions>,
    foc: Option<FocMethod>,
    pbl: Option<PblOptions>,
    preprocessing: PreprocessOptions,
}

// Dates must be valid and in order, the file pattern must carry a date
// placeholder and every retrieval parameter must pass validation.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConfigHelper {
            start_date: String,
            end_date: String,
            #[serde(default = "default_frequency")]
            frequency: String,
            input: InputTemplate,
            output_directory: PathBuf,
            #[serde(default)]
            inversion: InversionOptions,
            #[serde(default)]
            clouds: Option<CloudOptions>,
            #[serde(default)]
            foc: Option<FocMethod>,
            #[serde(default)]
            pbl: Option<PblOptions>,
            #[serde(default)]
            preprocessing: PreprocessOptions,
        }

        fn default_frequency() -> String {
            "daily".to_string()
        }

        let helper = ConfigHelper::deserialize(deserializer)?;

        let start_date = NaiveDate::parse_from_str(&helper.start_date, "%Y-%m-%d")
            .map_err(|e| D::Error::custom(format!("Invalid start_date format: {}", e)))?;

        let end_date = NaiveDate::parse_from_str(&helper.end_date, "%Y-%m-%d")
            .map_err(|e| D::Error::custom(format!("Invalid end_date format: {}", e)))?;

        if start_date > end_date {
            return Err(D::Error::custom(ConfigError::DateOrder));
        }

        let frequency: TimeStep = helper
            .frequency
            .parse()
            .map_err(|e| D::Error::custom(ConfigError::TimeStep(e)))?;

        if !helper.input.filename_pattern.contains("{}") {
            return Err(D::Error::custom(ConfigError::FilenamePattern(
                helper.input.filename_pattern,
            )));
        }

        helper.inversion.validate().map_err(D::Error::custom)?;
        if let Some(clouds) = &helper.clouds {
            clouds.validate().map_err(D::Error::custom)?;
        }
        if let Some(pbl) = &helper.pbl {
            pbl.validate().map_err(D::Error::custom)?;
        }

        Ok(Config {
            start_date,
            end_date,
            frequency,
            input: helper.input,
            output_directory: helper.output_directory,
            inversion: helper.inversion,
            clouds: helper.clouds,
            foc: helper.foc,
            pbl: helper.pbl,
            preprocessing: helper.preprocessing,
        })
    }
}

impl Config {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        frequency: TimeStep,
        input: InputTemplate,
        output_directory: PathBuf,
    ) -> Self {
        Self {
            start_date,
            end_date,
            frequency,
            input,
            output_directory,
            inversion: InversionOptions::default(),
            clouds: None,
            foc: None,
            pbl: None,
            preprocessing: PreprocessOptions::default(),
        }
    }

    pub fn with_inversion(mut self, inversion: InversionOptions) -> Self {
        self.inversion = inversion;
        self
    }

    pub fn with_clouds(mut self, clouds: CloudOptions) -> Self {
        self.clouds = Some(clouds);
        self
    }

    pub fn with_pbl(mut self, pbl: PblOptions) -> Self {
        self.pbl = Some(pbl);
        self
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn frequency(&self) -> TimeStep {
        self.frequency
    }

    pub fn input(&self) -> &InputTemplate {
        &self.input
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn inversion(&self) -> &InversionOptions {
        &self.inversion
    }

    pub fn clouds(&self) -> Option<&CloudOptions> {
        self.clouds.as_ref()
    }

    pub fn foc(&self) -> Option<FocMethod> {
        self.foc
    }

    pub fn pbl(&self) -> Option<&PblOptions> {
        self.pbl.as_ref()
    }

    pub fn preprocessing(&self) -> &PreprocessOptions {
        &self.preprocessing
    }

    fn increment_date(&self, current_date: NaiveDate) -> Option<NaiveDate> {
        match self.frequency {
            TimeStep::Daily => current_date.checked_add_signed(Duration::days(1)),
            TimeStep::Weekly => current_date.checked_add_signed(Duration::weeks(1)),
            TimeStep::Monthly => current_date.checked_add_months(Months::new(1)),
        }
    }
}

impl Iterator for Config {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start_date <= self.end_date {
            let current_date = self.start_date;
            match self.increment_date(current_date) {
                Some(next) => self.start_date = next,
                // End of the calendar.
                None => self.end_date = NaiveDate::MIN,
            }
            Some(current_date)
        } else {
            None
        }
    }
}
