use dotenv::var;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use xlcd_gpio::lcd::hd44780::config::LcdConfig;

const DEFAULT_CONFIG_FILE: &str = "xlcd.json";

#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub lcd: LcdConfig,
    /// One entry per display line.
    pub greeting: Vec<String>,
}

impl Config {
    /// `XLCD_CONFIG`, or `xlcd.json` in the working directory.
    pub fn path() -> PathBuf {
        PathBuf::from(var("XLCD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string()))
    }

    /// Loads the config from [Config::path]. `None` if the file doesn't exist yet.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    /// Loads the config from `path`. A missing file is `None`, an unreadable or malformed one is
    /// an error, so it never gets replaced by the default.
    pub fn load_from(path: &Path) -> eyre::Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("Cannot open {}", path.display()));
            }
        };
        let config = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("Malformed config in {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> eyre::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> eyre::Result<()> {
        let file =
            File::create(path).wrap_err_with(|| format!("Cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lcd: LcdConfig::PICDEM2,
            greeting: vec!["Hello, HD44780!".to_string(), "xlcd".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use xlcd_gpio::lcd::hd44780::config::{BusWidth, ReadyCheck};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("xlcd-{}-{}.json", std::process::id(), name))
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "lcd": { "bus_width": "eight_bit", "ready_check": "busy_flag" } }"#,
        )
        .unwrap();
        assert_eq!(config.lcd.bus_width, BusWidth::EightBit);
        assert_eq!(config.lcd.ready_check, ReadyCheck::BusyFlag);
        assert_eq!(config.greeting, Config::default().greeting);
    }

    #[test]
    fn test_missing_config_is_none() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);
        assert!(Config::load_from(&path).unwrap().is_none());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let path = temp_path("malformed");
        fs::write(&path, r#"{ "lcd": { "bus_width": "#).unwrap();

        let result = Config::load_from(&path);
        assert!(result.is_err());
        // Left alone for the user to fix
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{ "lcd": { "bus_width": "#);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_saved_config_loads_back() {
        let path = temp_path("saved");
        let config = Config {
            greeting: vec!["saved".to_string()],
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.greeting, vec!["saved".to_string()]);
        assert_eq!(loaded.lcd, LcdConfig::PICDEM2);
        fs::remove_file(&path).unwrap();
    }
}
