pub type ThumbResult<T> = Result<T, ThumbError>;

#[derive(thiserror::Error, Debug)]
pub enum ThumbError {
    #[error("{0}")]
    Validation(String),

    #[error("script analysis failed: {0}")]
    Analysis(String),

    #[error("image generation failed: {0}")]
    Synthesis(String),

    #[error("invalid style configuration: {0}")]
    Config(String),

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl ThumbError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}
