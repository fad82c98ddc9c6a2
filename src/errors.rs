use thiserror::Error;

#[derive(Debug, Error)]
pub enum MobileClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model's text could not be turned into an action. Callers usually re-prompt.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid scroll direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid hotkey: {0}")]
    InvalidHotkey(String),

    /// Link flakiness: adb hiccups, uiautomator restarts, timeouts.
    #[error("Device transient error: {0}")]
    DeviceTransient(String),

    #[error("App not found: {name} ({attempts})")]
    AppNotFound { name: String, attempts: String },

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Decision model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for MobileClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type MobileClawResult<T> = Result<T, MobileClawError>;
