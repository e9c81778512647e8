use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One completed attempt, as handed to the recorder. `answers` preserves
/// submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub student_name: String,
    pub quiz_id: String,
    pub answers: Vec<usize>,
    pub score: String,
    pub completed_at: DateTime<Utc>,
}

/// Write-only sink for completed attempts. Failures here are logged by the
/// caller and never fed back into the quiz flow.
pub trait ResultRecorder: Send + Sync {
    fn record(&self, attempt: AttemptRecord) -> BoxFuture<'static, anyhow::Result<PathBuf>>;
}

/// Persists one pretty-printed JSON file per attempt. Filenames carry a
/// timestamp plus a random suffix, so repeated attempts by the same student
/// on the same quiz never overwrite each other.
#[derive(Clone)]
pub struct FileResultRecorder {
    dir: PathBuf,
}

impl FileResultRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

impl ResultRecorder for FileResultRecorder {
    fn record(&self, attempt: AttemptRecord) -> BoxFuture<'static, anyhow::Result<PathBuf>> {
        let dir = self.dir.clone();
        Box::pin(async move {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(char::from)
                .collect();
            let filename = format!(
                "{}_{}_{}-{}.json",
                sanitize(&attempt.quiz_id),
                sanitize(&attempt.student_name),
                attempt.completed_at.format("%Y%m%d-%H%M%S"),
                suffix.to_lowercase(),
            );
            let path = dir.join(filename);
            let serialized = serde_json::to_vec_pretty(&attempt)?;
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, serialized).await?;
            Ok(path)
        })
    }
}
