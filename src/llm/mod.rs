pub mod backend;
pub mod gemini;
pub mod media;

pub use backend::{EditPass, EditRequest, ImageEditBackend, VisionBackend};
pub use gemini::GeminiClient;
