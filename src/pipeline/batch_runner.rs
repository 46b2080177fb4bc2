use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ProfileOrchestrator;
use crate::config::{Config, InputTemplate};
use crate::date_gen::DateTimeGenerator;
use crate::error::{Error, Result};
use crate::profiles::ProfilesData;
use crate::readers::create_reader;
use crate::utils::log_retrieval_summary;

/// Files with at least this fraction of missing backscatter are skipped.
const MAX_NAN_FRACTION: f64 = 0.25;

/// Runs the retrieval on every daily file covered by a configuration.
#[derive(Debug)]
pub struct BatchRunner {
    datasets: Vec<(NaiveDate, PathBuf)>,
    config: Config,
}

impl BatchRunner {
    pub fn new(config: Config) -> Result<Self> {
        let datasets = Self::create_period_datasets(&config)?;
        Ok(BatchRunner { datasets, config })
    }

    pub fn datasets(&self) -> &[(NaiveDate, PathBuf)] {
        &self.datasets
    }

    /// Finds the input file of every requested date. Dates without a file are
    /// skipped.
    fn create_period_datasets(config: &Config) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let dates = DateTimeGenerator::new(config).generate_date_series();
        info!(requested = dates.len(), "searching input files");

        let template = config.input();
        let mut datasets = Vec::new();
        let mut missing_dates = Vec::new();

        for date in dates {
            match Self::find_matching_file(template, &date) {
                Some(path) => {
                    debug!(%date, file = %path.display(), "found input file");
                    datasets.push((date, path));
                }
                None => missing_dates.push(date),
            }
        }

        if !missing_dates.is_empty() {
            warn!(
                missing = missing_dates.len(),
                found = datasets.len(),
                "no input file for dates {:?}",
                missing_dates
            );
        }
        if datasets.is_empty() {
            return Err(Error::invalid(format!(
                "no input file matching '{}' under {}",
                template.filename_pattern,
                template.base_directory.display()
            )));
        }

        Ok(datasets)
    }

    /// Finds the file matching the template for the given date, first directly
    /// under the base directory and then recursively.
    fn find_matching_file(template: &InputTemplate, target_date: &NaiveDate) -> Option<PathBuf> {
        let formatted_date = Self::format_date_for_template(target_date, &template.date_format);
        let expected_filename = template.filename_pattern.replace("{}", &formatted_date);

        let direct_path = template.base_directory.join(&expected_filename);
        if direct_path.is_file() {
            return Some(direct_path);
        }

        Self::search_file_recursively(&template.base_directory, &expected_filename)
    }

    fn search_file_recursively(base_dir: &Path, filename: &str) -> Option<PathBuf> {
        if !base_dir.exists() {
            return None;
        }

        for entry in WalkDir::new(base_dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file()
                && let Some(file_name) = entry.path().file_name()
                && file_name.to_string_lossy() == filename
            {
                return Some(entry.into_path());
            }
        }

        None
    }

    fn format_date_for_template(date: &NaiveDate, format: &str) -> String {
        match format {
            "YYYYMMDD" => date.format("%Y%m%d").to_string(),
            "YYYY-MM-DD" => date.format("%Y-%m-%d").to_string(),
            "YYYY_MM_DD" => date.format("%Y_%m_%d").to_string(),
            _ => date.format("%Y%m%d").to_string(),
        }
    }

    /// Output file of one date, e.g. `<output_directory>/extinction_20230101.json`.
    pub fn output_path(&self, date: &NaiveDate) -> PathBuf {
        self.config
            .output_directory()
            .join(format!("extinction_{}.json", date.format("%Y%m%d")))
    }

    /// Processes every dataset and returns the written files.
    pub fn process(&self) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(self.config.output_directory())?;

        let mut output_files = Vec::new();
        for (date, path) in &self.datasets {
            let reader = create_reader(path.clone())?;
            let profiles = reader.read_profiles()?;
            let missing = nan_fraction(&profiles);
            if missing >= MAX_NAN_FRACTION {
                warn!(
                    %date,
                    file = %path.display(),
                    missing_pct = format_args!("{:.1}", 100.0 * missing),
                    "too many missing values, skipping"
                );
                continue;
            }
            let profiles = self.config.preprocessing().apply(&profiles)?;

            let mut orchestrator = ProfileOrchestrator::new(self.config.inversion().clone());
            if let Some(clouds) = self.config.clouds() {
                orchestrator = orchestrator.with_detector(clouds.detector());
            }
            if let Some(foc) = self.config.foc() {
                orchestrator = orchestrator.with_foc(foc);
            }
            if let Some(pbl) = self.config.pbl() {
                orchestrator = orchestrator.with_pbl(*pbl);
            }
            let output = orchestrator.run(&profiles)?;

            let filename = self.output_path(date);
            output.write_json(&filename)?;
            log_retrieval_summary(&date.to_string(), &output);
            info!(%date, file = %filename.display(), "saved retrieval");
            output_files.push(filename);
        }

        Ok(output_files)
    }
}

/// Fraction of NaN samples in the backscatter field, 1 for an empty field.
fn nan_fraction(profiles: &ProfilesData) -> f64 {
    let data = profiles.attenuated_backscatter();
    let total: usize = data.iter().map(Vec::len).sum();
    if total == 0 {
        return 1.0;
    }
    let missing = data.iter().flatten().filter(|v| v.is_nan()).count();
    missing as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format_date_for_template() {
        let d = date(2023, 7, 4);
        assert_eq!(BatchRunner::format_date_for_template(&d, "YYYYMMDD"), "20230704");
        assert_eq!(BatchRunner::format_date_for_template(&d, "YYYY-MM-DD"), "2023-07-04");
        assert_eq!(BatchRunner::format_date_for_template(&d, "YYYY_MM_DD"), "2023_07_04");
        assert_eq!(BatchRunner::format_date_for_template(&d, "other"), "20230704");
    }

    #[test]
    fn test_find_matching_file_recursively() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("2023").join("01");
        fs::create_dir_all(&nested).unwrap();
        File::create(nested.join("cl51_2023-01-02.json")).unwrap();
        File::create(dir.path().join("cl51_2023-01-01.json")).unwrap();

        let template = InputTemplate {
            base_directory: dir.path().to_path_buf(),
            filename_pattern: "cl51_{}.json".to_string(),
            date_format: "YYYY-MM-DD".to_string(),
        };
        assert_eq!(
            BatchRunner::find_matching_file(&template, &date(2023, 1, 1)),
            Some(dir.path().join("cl51_2023-01-01.json"))
        );
        assert_eq!(
            BatchRunner::find_matching_file(&template, &date(2023, 1, 2)),
            Some(nested.join("cl51_2023-01-02.json"))
        );
        assert_eq!(BatchRunner::find_matching_file(&template, &date(2023, 1, 3)), None);
    }

    #[test]
    fn test_nan_fraction() {
        use crate::profiles::{AltitudeGrid, BackscatterUnits};

        let t0 = date(2023, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        let grid = AltitudeGrid::new(vec![15.0, 30.0], 0.0).unwrap();
        let make = |rows: Vec<Vec<f64>>| {
            let time = (0..rows.len() as i64)
                .map(|i| t0 + chrono::Duration::minutes(5 * i))
                .collect();
            ProfilesData::new(time, grid.clone(), 1064.0, BackscatterUnits::PerMeterSr, rows)
                .unwrap()
        };

        let profiles = make(vec![vec![1.0, f64::NAN], vec![2.0, 3.0]]);
        assert_eq!(nan_fraction(&profiles), 0.25);
        assert!(nan_fraction(&profiles) >= MAX_NAN_FRACTION);

        let profiles = make(vec![vec![1.0, 2.0], vec![2.0, 3.0]]);
        assert_eq!(nan_fraction(&profiles), 0.0);
        assert_eq!(nan_fraction(&make(Vec::new())), 1.0);
    }

    #[test]
    fn test_missing_dates_skipped() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("cl51_20230102.json")).unwrap();
        let template = InputTemplate {
            base_directory: dir.path().to_path_buf(),
            filename_pattern: "cl51_{}.json".to_string(),
            date_format: "YYYYMMDD".to_string(),
        };
        let config = Config::new(
            date(2023, 1, 1),
            date(2023, 1, 3),
            crate::config::TimeStep::Daily,
            template.clone(),
            dir.path().join("out"),
        );
        let runner = BatchRunner::new(config).unwrap();
        assert_eq!(runner.datasets().len(), 1);
        assert_eq!(runner.datasets()[0].0, date(2023, 1, 2));
        assert_eq!(
            runner.output_path(&date(2023, 1, 2)),
            dir.path().join("out").join("extinction_20230102.json")
        );

        let config = Config::new(
            date(2023, 2, 1),
            date(2023, 2, 3),
            crate::config::TimeStep::Daily,
            template,
            dir.path().join("out"),
        );
        assert!(BatchRunner::new(config).is_err());
    }
}
