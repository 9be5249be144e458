use crate::data::Grid;
use std::env;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub grid: Grid,
    /// Command line of the external solver, if any.
    pub solver: Option<String>,
    /// Concurrent solver runs allowed.
    pub max_solves: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            grid: Grid::default(),
            solver: None,
            max_solves: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
                None => Ok(default),
            }
        }

        let grid = Grid {
            days: defaults.grid.days,
            periods: parsed(&lookup, "TIMETABLE_PERIODS", defaults.grid.periods)?,
        };
        if !grid.is_supported() {
            return Err(ConfigError::InvalidValue(
                "TIMETABLE_PERIODS".to_string(),
                grid.periods.to_string(),
            ));
        }
        let max_solves: usize = parsed(&lookup, "TIMETABLE_MAX_SOLVES", defaults.max_solves)?;

        Ok(Self {
            host: lookup("TIMETABLE_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "TIMETABLE_PORT", defaults.port)?,
            grid,
            solver: lookup("TIMETABLE_SOLVER").filter(|s| !s.trim().is_empty()),
            max_solves: max_solves.max(1),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TIMETABLE_HOST".to_string(), self.host.clone()))
    }
}
