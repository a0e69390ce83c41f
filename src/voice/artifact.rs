//! Temporary audio files passed between turn stages
//!
//! An [`AudioArtifact`] has exactly one owner. Whoever consumes it deletes it,
//! either explicitly with [`AudioArtifact::release`] or implicitly on drop,
//! so no exit path can leak the file or read it after deletion.

use std::fmt;
use std::path::Path;

use tempfile::{Builder, TempPath};

use crate::Result;

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Microphone recording (WAV)
    Capture,
    /// Synthesized speech (raw PCM)
    Synthesis,
}

impl ArtifactKind {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Capture => ".wav",
            Self::Synthesis => ".raw",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// A temporary audio file, deleted exactly once by its consumer
pub struct AudioArtifact {
    kind: ArtifactKind,
    path: Option<TempPath>,
}

impl AudioArtifact {
    /// Reserve an empty temporary file for an external writer (e.g. a recorder)
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be created
    pub fn reserve(kind: ArtifactKind) -> Result<Self> {
        let path = Builder::new()
            .prefix("satellite-")
            .suffix(kind.suffix())
            .tempfile()?
            .into_temp_path();

        tracing::trace!(%kind, path = %path.display(), "artifact reserved");
        Ok(Self {
            kind,
            path: Some(path),
        })
    }

    /// Create a temporary file and return it open for async writing
    ///
    /// # Errors
    ///
    /// Returns error if the temporary file cannot be created
    pub fn create(kind: ArtifactKind) -> Result<(Self, tokio::fs::File)> {
        let (file, path) = Builder::new()
            .prefix("satellite-")
            .suffix(kind.suffix())
            .tempfile()?
            .into_parts();

        tracing::trace!(%kind, path = %path.display(), "artifact created");
        Ok((
            Self {
                kind,
                path: Some(path),
            },
            tokio::fs::File::from_std(file),
        ))
    }

    /// Kind of artifact
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Filesystem path of the artifact
    #[must_use]
    pub fn path(&self) -> &Path {
        // `path` is only taken by `release`, which consumes `self`
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Read the whole artifact into memory
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }

    /// Size of the artifact in bytes
    ///
    /// # Errors
    ///
    /// Returns error if the file metadata cannot be read
    pub async fn size(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(self.path()).await?.len())
    }

    /// Delete the artifact
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be removed; the handle is gone either way
    pub fn release(mut self) -> Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };

        let shown = path.display().to_string();
        path.close()?;
        tracing::debug!(kind = %self.kind, path = %shown, "artifact released");
        Ok(())
    }

    /// Delete the artifact, logging instead of failing
    pub fn discard(self) {
        let kind = self.kind;
        if let Err(e) = self.release() {
            tracing::warn!(%kind, error = %e, "failed to delete artifact");
        }
    }
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("kind", &self.kind)
            .field("path", &self.path())
            .finish()
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            tracing::debug!(
                kind = %self.kind,
                path = %path.display(),
                "artifact dropped without release, deleting"
            );
            // TempPath removes the file on drop
        }
    }
}
