//! JSON-lines sinks (file and stdout)

use super::Sink;
use crate::resource::RunOutcome;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize)]
struct Line<'a> {
    run_id: Uuid,
    recorded_at: String,
    #[serde(flatten)]
    outcome: &'a RunOutcome,
}

fn encode_line(run_id: Uuid, outcome: &RunOutcome) -> Result<Vec<u8>> {
    let line = Line {
        run_id,
        recorded_at: Utc::now().to_rfc3339(),
        outcome,
    };
    let mut bytes = serde_json::to_vec(&line)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Appends one JSON object per outcome to a file
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) `path` for appending
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()> {
        let bytes = encode_line(run_id, outcome)?;

        // One write per line under the lock keeps lines whole
        let mut file = self.file.lock().await;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

/// Writes one JSON object per outcome to standard output
pub struct StdoutSink {
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn record(&self, run_id: Uuid, outcome: &RunOutcome) -> Result<()> {
        let bytes = encode_line(run_id, outcome)?;
        let mut out = self.out.lock().await;
        out.write_all(&bytes).await?;
        out.flush().await?;
        Ok(())
    }
}
