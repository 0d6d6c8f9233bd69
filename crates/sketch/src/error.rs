use thiserror::Error;

#[derive(Error, Debug)]
pub enum SketchError {
    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Input cannot be decoded as a pixel grid: {0}")]
    InputDecode(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SketchError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::InputDecode(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SketchError>;
