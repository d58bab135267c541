use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::Party;
use crate::audio::AudioFormat;

/// A finished recording: every chunk of one session, in arrival order
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: Uuid,
    pub mode: Party,
    pub format: AudioFormat,
    pub data: Vec<u8>,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Concatenate captured chunks into one artifact
    pub fn assemble(mode: Party, format: AudioFormat, chunks: Vec<Vec<u8>>) -> Self {
        let chunk_count = chunks.len();
        let data = chunks.concat();

        Self {
            id: Uuid::new_v4(),
            mode,
            format,
            data,
            chunk_count,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        let bytes_per_second = self.format.bytes_per_second();
        if bytes_per_second == 0 {
            return 0.0;
        }
        self.data.len() as f64 / bytes_per_second as f64
    }

    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    /// Write the recording as a PCM16 WAV file
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        // A trailing odd byte cannot form a sample
        for bytes in self.data.chunks_exact(AudioFormat::BYTES_PER_SAMPLE) {
            writer
                .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Artifact {} written to {} ({:.1}s)",
            self.id,
            path.display(),
            self.duration_secs()
        );

        Ok(())
    }
}

/// Revocable reference to an artifact held in an [`ArtifactStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: Uuid,
    pub url: String,
}

impl ArtifactRef {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            url: format!("artifact://{}", id),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Registry of finished artifacts, addressed by reference.
///
/// Entries stay resolvable until revoked; starting a new session does not
/// reclaim older ones.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: RwLock<HashMap<Uuid, Arc<Artifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, artifact: Artifact) -> ArtifactRef {
        let artifact_ref = ArtifactRef::new(artifact.id);
        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.id, Arc::new(artifact));
        debug!("Registered artifact {}", artifact_ref);
        artifact_ref
    }

    pub fn resolve(&self, artifact_ref: &ArtifactRef) -> Option<Arc<Artifact>> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&artifact_ref.id)
            .cloned()
    }

    /// Drop the artifact; returns false if it was already gone
    pub fn revoke(&self, artifact_ref: &ArtifactRef) -> bool {
        let removed = self
            .artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&artifact_ref.id)
            .is_some();
        if removed {
            debug!("Revoked artifact {}", artifact_ref);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
