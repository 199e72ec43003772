pub mod queue;

pub use queue::{FrameQueue, QueueStats};
