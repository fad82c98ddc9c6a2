pub mod screenshot;
pub mod stability;
pub mod types;

pub use screenshot::ScreenshotCapture;
pub use types::Screenshot;
