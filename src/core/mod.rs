pub mod store;

pub use store::{FsRouteStore, RouteStore, TransientRendering};
