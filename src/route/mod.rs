pub mod compare;
pub mod matcher;
pub mod orchestrator;
pub mod render;

pub use compare::{ComparatorReply, GeminiComparator, RouteComparator};
pub use matcher::{DuplicateMatcher, MatchPolicy};
pub use orchestrator::{SelectionOrchestrator, SelectionOutcome, SelectionState};
pub use render::{RouteRenderer, RouteRenderings};
