use thiserror::Error;

use crate::views::ViewError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unable to define view [{name}]: {source}")]
    Definition {
        name: String,
        #[source]
        source: ViewError
    }
}
