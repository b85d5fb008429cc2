use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// No endpoints could be produced and direct execution is not allowed.
    #[error("no endpoints available")]
    NoEndpoints,
}

pub type Result<T> = std::result::Result<T, Error>;
