use thiserror::Error;

use crate::models::AggregateError;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Relation [{relation}] does not exist")]
    MissingRelation {
        relation: String
    },
    #[error("View [{view}] cannot read from [{input}]: {reason}")]
    IncompatibleSource {
        view: String,
        input: String,
        reason: &'static str
    },
    #[error("View [{view}] would depend on itself through [{}]", .path.join(" -> "))]
    Cycle {
        view: String,
        path: Vec<String>
    },
    #[error("Relation [{relation}] is still referenced by [{}]", .dependents.join(", "))]
    HasDependents {
        relation: String,
        dependents: Vec<String>
    },
    #[error("View [{view}] must declare at least one source")]
    NoSources {
        view: String
    },
    #[error("Name [{name}] is reserved or invalid")]
    InvalidName {
        name: String
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Refresh of view [{view}] failed: {source}")]
    Aggregate {
        view: String,
        #[source]
        source: AggregateError
    },
    #[error("Refresh of view [{view}] failed: materialized contents do not match the definition")]
    ShapeMismatch {
        view: String
    },
    #[error(transparent)]
    Dependency(#[from] DependencyError)
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    Refresh(#[from] RefreshError)
}
