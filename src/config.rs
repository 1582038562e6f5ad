//! Generation settings parsed from environment variables.

use tracing::warn;

use crate::composite::ExportFormat;
use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Instruction sent alongside every composited map.
pub const DEFAULT_PROMPT: &str = "This is a map with a red arrow drawn on it. \
Place a camera at the tail of the arrow, at human eye level, looking in the direction the arrow points. \
Generate a photorealistic photograph of what that camera would see. \
Match the era, region and style of the place the map depicts. \
Do not draw the arrow, map symbols or any text in the photograph.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Absent keys are reported when a generation is attempted, not at startup.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeouts: Timeouts,
    pub export_format: ExportFormat,
    pub prompt: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeouts: Timeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            export_format: ExportFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            },
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Build config from the environment.
    ///
    /// - `VANTAGE_API_KEY`, else `GEMINI_API_KEY`
    /// - `VANTAGE_MODEL`, `VANTAGE_BASE_URL`, `VANTAGE_PROMPT`
    /// - `VANTAGE_REQUEST_TIMEOUT_SECS` (120), `VANTAGE_CONNECT_TIMEOUT_SECS` (10)
    /// - `VANTAGE_EXPORT_FORMAT`: `jpeg` (default) or `png`
    /// - `VANTAGE_JPEG_QUALITY` (90, clamped to 1..=100)
    ///
    /// A variable that cannot be parsed falls back to its own default with a
    /// warning; every other setting is kept.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = non_empty("VANTAGE_API_KEY").or_else(|| non_empty("GEMINI_API_KEY"));
        let model = non_empty("VANTAGE_MODEL").unwrap_or(defaults.model);
        let base_url = non_empty("VANTAGE_BASE_URL")
            .unwrap_or(defaults.base_url)
            .trim_end_matches('/')
            .to_string();
        let prompt = non_empty("VANTAGE_PROMPT").unwrap_or(defaults.prompt);
        let timeouts = Timeouts {
            request_secs: or_default(
                env_secs("VANTAGE_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            connect_secs: or_default(
                env_secs("VANTAGE_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
        };
        let quality = or_default(env_quality("VANTAGE_JPEG_QUALITY"), DEFAULT_JPEG_QUALITY);
        let export_format = or_default(
            parse_format(non_empty("VANTAGE_EXPORT_FORMAT").as_deref(), quality),
            ExportFormat::Jpeg { quality },
        );

        Self {
            api_key,
            model,
            base_url,
            timeouts,
            export_format,
            prompt,
        }
    }
}

fn or_default<T: std::fmt::Debug>(parsed: Result<Option<T>, ConfigError>, default: T) -> T {
    match parsed {
        Ok(value) => value.unwrap_or(default),
        Err(e) => {
            warn!(error = %e, default = ?default, "config: ignoring invalid value");
            default
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_format(raw: Option<&str>, quality: u8) -> Result<Option<ExportFormat>, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(None),
        Some("jpeg" | "jpg") => Ok(Some(ExportFormat::Jpeg { quality })),
        Some("png") => Ok(Some(ExportFormat::Png)),
        Some(other) => Err(ConfigError::UnknownFormat(other.to_string())),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match non_empty(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| ConfigError::NotANumber {
            var: key.to_string(),
            value: raw,
        }),
    }
}

/// Timeouts must be positive.
fn env_secs(key: &str) -> Result<Option<u64>, ConfigError> {
    match env_u64(key)? {
        Some(0) => Err(ConfigError::NotANumber {
            var: key.to_string(),
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}

fn env_quality(key: &str) -> Result<Option<u8>, ConfigError> {
    Ok(env_u64(key)?.map(|q| q.clamp(1, 100) as u8))
}
