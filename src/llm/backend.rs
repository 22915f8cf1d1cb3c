use std::fmt;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::fetch::FetchedImage;

/// Which step of a renovation an edit performs; backends phrase their instruction to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPass {
    /// Removes the obstructing object and restores the background behind it.
    Erase,
    /// Builds the accessible feature into an already cleared photo.
    Construct,
    Single,
}

impl fmt::Display for EditPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EditPass::Erase => "erase",
            EditPass::Construct => "construct",
            EditPass::Single => "single",
        };
        f.write_str(label)
    }
}

/// One region-scoped edit of a photo.
#[derive(Debug, Clone, Copy)]
pub struct EditRequest<'a> {
    pub pass: EditPass,
    pub image: &'a FetchedImage,
    pub prompt: &'a str,
    pub search_region: &'a str,
    pub strength: f32,
    pub grow_mask: Option<u32>,
}

#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Returns the backend's textual reply, expected to hold a JSON document.
    async fn analyze(&self, image: &FetchedImage, prompt: &str) -> Result<String, BackendError>;
}

#[async_trait]
pub trait ImageEditBackend: Send + Sync {
    async fn edit(&self, request: EditRequest<'_>) -> Result<Vec<u8>, BackendError>;
}
