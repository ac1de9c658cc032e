pub type WallprinterResult<T> = Result<T, WallprinterError>;

#[derive(thiserror::Error, Debug)]
pub enum WallprinterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WallprinterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
