pub mod replay;

pub use replay::{AsPath, EventKind, Replayer, RouteEvent, SamplingMode, UpstreamPresence};
