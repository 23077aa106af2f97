pub mod annotate;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod models;
pub mod route;
pub mod server;
pub mod worker;

pub use annotate::HoldAnnotator;
pub use config::Config;
pub use self::core::{FsRouteStore, RouteStore};
pub use detection::{ColorClassifier, DetectionResult, DetectionService, HoldDetector};
pub use error::{ErrorKind, PipelineError, Result};
pub use models::{
    BoundingBox, ComparisonVerdict, Detection, HoldColor, RenderRole, Rendering, RouteImage,
    SelectionRequest,
};
pub use route::{
    DuplicateMatcher, MatchPolicy, RouteComparator, RouteRenderer, SelectionOrchestrator,
    SelectionOutcome,
};
pub use worker::WorkerPool;
