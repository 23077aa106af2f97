#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from spraywall for tests
pub use spraywall::core::store::{FsRouteStore, RouteStore};
pub use spraywall::error::{ErrorKind, PipelineError};
pub use spraywall::models::{RouteImage, SelectionRequest};
pub use spraywall::route::matcher::{NO_MATCH_EXPLANATION, NO_ROUTES_EXPLANATION, UNAVAILABLE_EXPLANATION};
pub use spraywall::route::{MatchPolicy, SelectionOutcome};
