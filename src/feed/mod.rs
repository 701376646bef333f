mod poller;
mod source;

pub use poller::{FeedPoller, FeedUpdate, PollSchedule};
pub use source::{FeedError, HttpSource, SnapshotSource};
