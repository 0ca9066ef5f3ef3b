use charlcd_gpio::lcd::hd44780::{DEFAULT_POLL_CEILING, FontSize, Geometry, LcdConfig, LcdError};
use dotenv::var;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading the config failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("the config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("the display geometry is invalid: {0}")]
    Geometry(#[from] LcdError),
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum Font {
    #[default]
    #[serde(rename = "5x8")]
    Dots5x8,
    #[serde(rename = "5x10")]
    Dots5x10,
}

impl From<Font> for FontSize {
    fn from(font: Font) -> Self {
        match font {
            Font::Dots5x8 => FontSize::Dots5x8,
            Font::Dots5x10 => FontSize::Dots5x10,
        }
    }
}

/// A custom character stored in CGRAM at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct Glyph {
    pub slot: u8,
    pub rows: [u8; 8],
}

/// Display settings, stored as JSON next to the binary unless `CHARLCD_CONFIG` says otherwise.
///
/// The board wiring isn't here, it comes from the environment.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    pub columns: u8,
    pub lines: u8,
    pub font: Font,
    pub poll_ceiling: u32,
    pub cursor: bool,
    pub blink: bool,
    pub glyphs: Vec<Glyph>,
}

impl Config {
    fn path() -> PathBuf {
        var("CHARLCD_CONFIG")
            .unwrap_or_else(|_| "charlcd.json".to_string())
            .into()
    }

    /// Loads the config, or `None` if there's no config file yet.
    pub fn try_load() -> Result<Option<Self>, ConfigError> {
        let file = match std::fs::File::open(Self::path()) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let reader = std::io::BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn lcd_config(&self) -> Result<LcdConfig, ConfigError> {
        let geometry = Geometry::new(self.columns, self.lines, self.font.into())?;
        Ok(LcdConfig::new(geometry).with_poll_ceiling(self.poll_ceiling))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            columns: 16,
            lines: 2,
            font: Font::default(),
            poll_ceiling: DEFAULT_POLL_CEILING,
            cursor: false,
            blink: false,
            glyphs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{ "columns": 20, "lines": 4 }"#).unwrap();
        assert_eq!(config.columns, 20);
        assert_eq!(config.lines, 4);
        assert_eq!(config.poll_ceiling, 0xFFFF);
        assert!(config.glyphs.is_empty());
    }

    #[test]
    fn font_names() {
        let config: Config =
            serde_json::from_str(r#"{ "lines": 1, "font": "5x10", "cursor": true }"#).unwrap();
        assert_eq!(config.font, Font::Dots5x10);
        assert!(config.cursor);

        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains(r#""font":"5x8""#));
    }

    #[test]
    fn glyphs_parse() {
        let config: Config = serde_json::from_str(
            r#"{ "glyphs": [{ "slot": 2, "rows": [0, 10, 31, 31, 14, 4, 0, 0] }] }"#,
        )
        .unwrap();
        assert_eq!(
            config.glyphs,
            vec![Glyph {
                slot: 2,
                rows: [0, 10, 31, 31, 14, 4, 0, 0],
            }]
        );
    }

    #[test]
    fn geometry_is_checked() {
        let config = Config {
            lines: 5,
            ..Config::default()
        };
        assert!(matches!(
            config.lcd_config(),
            Err(ConfigError::Geometry(LcdError::InvalidConfig(_)))
        ));

        let lcd_config = Config::default().lcd_config().unwrap();
        assert_eq!(lcd_config.geometry.columns(), 16);
        assert_eq!(lcd_config.poll_ceiling, DEFAULT_POLL_CEILING);
    }
}
