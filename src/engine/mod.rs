mod errors;
mod pipeline;
#[cfg(test)]
mod tests;

pub use errors::PipelineError;
pub use pipeline::{IngestReport, Pipeline};
