use crate::config::Config;
use chrono::NaiveDate;

pub struct DateTimeGenerator<'a> {
    config: &'a Config,
}

impl<'a> DateTimeGenerator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Dates from `start_date` to `end_date` (inclusive) at the configured
    /// frequency.
    pub fn generate_date_series(&self) -> Vec<NaiveDate> {
        self.config.clone().collect()
    }
}
