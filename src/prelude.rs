use thiserror::Error;

/// Error type for RustGAN
#[derive(Debug, Error)]
pub enum Error {
    /// Indicates some dimension is incorrect in a Matrix operation.
    #[error("dimension mismatch in `{op}`: {lhs:?} against {rhs:?}")]
    DimensionErr {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
    #[error("unknown activation function `{0}`")]
    UnknownActivation(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed dataset: {0}")]
    Dataset(String),
    /// The training thread behind the GUI panicked or lost its channel.
    #[error("training thread failed")]
    ThreadErr,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn dimension_err<T>(
    op: &'static str,
    lhs: (usize, usize),
    rhs: (usize, usize),
) -> Result<T> {
    Err(Error::DimensionErr { op, lhs, rhs })
}
