//! Local filesystem sink.
//!
//! Every file is written atomically (temp file, then rename), so readers
//! never see a half-written snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Institution, ValidatedLabEntity};
use crate::pipeline::InstitutionSummary;
use crate::storage::{InstitutionSnapshot, LabSink, RunReport, WriteMetadata};

/// JSON snapshot sink rooted at a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    root_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn institution_key(id: u64) -> String {
        format!("labs/{id}.json")
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read back the last snapshot written for an institution.
    pub async fn load_institution(&self, id: u64) -> Result<Option<InstitutionSnapshot>> {
        self.read_json(&Self::institution_key(id)).await
    }

    pub async fn load_run(&self) -> Result<Option<RunReport>> {
        self.read_json("run.json").await
    }
}

#[async_trait]
impl LabSink for JsonFileSink {
    async fn write_institution(
        &self,
        institution: &Institution,
        entities: &[ValidatedLabEntity],
        summary: &InstitutionSummary,
    ) -> Result<WriteMetadata> {
        let snapshot = InstitutionSnapshot {
            written_at: Utc::now(),
            institution_id: institution.id,
            institution_name: institution.name.clone(),
            summary: summary.clone(),
            entities: entities.to_vec(),
        };
        let key = Self::institution_key(institution.id);
        self.write_json(&key, &snapshot).await?;
        log::info!("Wrote {} lab entities to {}", entities.len(), key);

        Ok(WriteMetadata {
            entity_count: entities.len(),
            location: self.path(&key).display().to_string(),
            timestamp: snapshot.written_at,
        })
    }

    async fn write_run(&self, summaries: &[InstitutionSummary]) -> Result<()> {
        self.write_json("run.json", &RunReport::new(summaries)).await
    }
}
