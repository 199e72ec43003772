pub mod frame;
pub mod grabber;
pub mod sim;

pub use frame::Frame;
pub use frame::FrameOutput;
pub use frame::SensorChannel;
pub use grabber::{FrameGrabber, FrameSink};
pub use sim::SimGrabber;
