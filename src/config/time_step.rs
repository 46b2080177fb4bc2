use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    #[serde(rename(deserialize = "daily"))]
    Daily,
    #[serde(rename(deserialize = "weekly"))]
    Weekly,
    #[serde(rename(deserialize = "monthly"))]
    Monthly,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid time step '{0}', expected daily, weekly or monthly")]
pub struct TimeStepParseError(pub String);

impl FromStr for TimeStep {
    type Err = TimeStepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(TimeStep::Daily),
            "weekly" => Ok(TimeStep::Weekly),
            "monthly" => Ok(TimeStep::Monthly),
            _ => Err(TimeStepParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimeStep::Daily => write!(f, "daily"),
            TimeStep::Weekly => write!(f, "weekly"),
            TimeStep::Monthly => write!(f, "monthly"),
        }
    }
}
