pub mod camera;
pub mod controller;
pub mod detector;
mod loop_worker;

pub use camera::{CameraHandle, FrameSource, ImageDirCamera};
pub use controller::SensingController;
pub use detector::{ContrastPresenceDetector, PresenceDetector};
