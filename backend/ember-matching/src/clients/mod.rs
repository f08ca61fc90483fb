pub mod safety;
pub mod swipe;

pub use safety::SafetyServiceClient;
pub use swipe::SwipeServiceClient;
