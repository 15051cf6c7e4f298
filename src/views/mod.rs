mod catalog;
mod definition;
mod errors;
mod graph;
mod query;
mod status;
mod view;

pub use catalog::Catalog;
pub use definition::{Predicate, RefreshMode, ViewDefinition, ViewOptions};
pub use errors::{DependencyError, RefreshError, ViewError};
pub use graph::DependencyGraph;
pub use query::QueryResult;
pub use status::{RefreshAction, RefreshOutcome, RefreshPolicy, RefreshRecord, RefreshTrigger, SchedulingState, ViewInfo};
pub use view::{Contents, Snapshot, View};
