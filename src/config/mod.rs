mod errors;
mod pipeline_config;

pub use errors::ConfigError;
pub use pipeline_config::{IngestConfig, PipelineConfig, RefreshConfig, ViewConfig};
