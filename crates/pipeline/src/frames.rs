//! Last-frame extraction seam used to chain segments together.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::GenerationError;

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Reference to the final frame of `clip`, used as the next segment's
    /// starting frame.
    async fn extract_last_frame(&self, clip: &Path) -> Result<PathBuf, GenerationError>;
}

/// Hands the clip itself to the next call; providers that accept video
/// conditioning read the tail frame on their side.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipFrameExtractor;

#[async_trait]
impl FrameExtractor for ClipFrameExtractor {
    async fn extract_last_frame(&self, clip: &Path) -> Result<PathBuf, GenerationError> {
        if clip.as_os_str().is_empty() {
            return Err(GenerationError::Frame("empty clip path".to_string()));
        }
        Ok(clip.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn passes_clip_through() {
        let frame = ClipFrameExtractor
            .extract_last_frame(Path::new("out/s1_seg00.mp4"))
            .await
            .unwrap();
        assert_eq!(frame, PathBuf::from("out/s1_seg00.mp4"));
    }

    #[tokio::test]
    async fn rejects_empty_path() {
        assert_matches!(
            ClipFrameExtractor.extract_last_frame(Path::new("")).await,
            Err(GenerationError::Frame(_))
        );
    }
}
