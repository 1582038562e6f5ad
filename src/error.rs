use std::path::PathBuf;

/// Failure to turn a user-supplied file into a base image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("not a supported image: {0}")]
    Undecodable(String),

    #[error("image has no pixels")]
    Empty,
}

/// Failure while burning the marker into the base image.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("mark a viewpoint and a looking direction first")]
    IncompletePoints,

    #[error("cannot allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },

    #[error("cannot encode image: {0}")]
    Encode(String),
}

/// Failure of the external image-generation call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no API key configured (set VANTAGE_API_KEY or GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation service returned status {status}: {snippet}")]
    Status { status: u16, snippet: String },

    #[error("unexpected response from generation service: {0}")]
    Parse(String),

    #[error("request was blocked: {0}")]
    Blocked(String),

    #[error("generated image is not valid base64: {0}")]
    Payload(String),
}

/// An environment variable held a value we cannot use.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    NotANumber { var: String, value: String },

    #[error("VANTAGE_EXPORT_FORMAT must be 'jpeg' or 'png', got '{0}'")]
    UnknownFormat(String),
}

const SNIPPET_LEN: usize = 160;

/// Keep service diagnostics short: first line only, capped length.
pub fn snippet(body: &str) -> String {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= SNIPPET_LEN {
        return line.to_string();
    }
    let mut out: String = line.chars().take(SNIPPET_LEN).collect();
    out.push('…');
    out
}
