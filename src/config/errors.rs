use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read pipeline configuration [{}]: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error
    },
    #[error("Invalid pipeline configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid pipeline configuration: view [{0}] is declared more than once")]
    DuplicateView(String)
}
