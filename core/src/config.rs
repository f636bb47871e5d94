use crate::error::{Result, TelemRadioError};
use crate::params::RuntimeParams;
use crate::{ONE_VALUE, RAMP_AMOUNT, SAMPLE_RATE, ZERO_VALUE};
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "telem_radio.config";

/// Startup settings read from a `key=value` file
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sample_rate: u32,
    pub one_value: f64,
    pub zero_value: f64,
    pub ramp_amount: f64,
    pub ramp_bits_to_compensate_hpf: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            one_value: ONE_VALUE,
            zero_value: ZERO_VALUE,
            ramp_amount: RAMP_AMOUNT,
            ramp_bits_to_compensate_hpf: true,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| TelemRadioError::ConfigValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl FromStr for Config {
    type Err = TelemRadioError;

    fn from_str(text: &str) -> Result<Self> {
        let mut config = Config::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "sample_rate" => config.sample_rate = parse_value(key, value)?,
                "one_value" => config.one_value = parse_value(key, value)?,
                "zero_value" => config.zero_value = parse_value(key, value)?,
                "ramp_amount" => config.ramp_amount = parse_value(key, value)?,
                "ramp_bits_to_compensate_hpf" => {
                    config.ramp_bits_to_compensate_hpf = parse_value::<i64>(key, value)? != 0
                }
                _ => warn!("Unknown key in config: {}", key),
            }
        }

        if config.sample_rate == 0 {
            return Err(TelemRadioError::ConfigValue {
                key: "sample_rate".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }
}

impl Config {
    /// Read and parse a config file. A missing file is reported as
    /// [`TelemRadioError::ConfigNotFound`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TelemRadioError::ConfigNotFound(path.display().to_string()),
            _ => TelemRadioError::Io(e),
        })?;
        let config: Config = text.parse()?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Seed the runtime parameters
    pub fn apply(&self, params: &RuntimeParams) {
        params.set_sample_rate(self.sample_rate);
        params.set_one_value(self.one_value);
        params.set_zero_value(self.zero_value);
        params.set_ramp_amount(self.ramp_amount);
        params.set_ramp_bits_to_compensate_hpf(self.ramp_bits_to_compensate_hpf);
    }
}
