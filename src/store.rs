//! Durable result records, one JSON file per run.
//!
//! The store keys records by run identifier under a single directory.
//! Records round-trip losslessly through [`TrainingResult`]'s serde
//! representation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::training::result::TrainingResult;

/// Filesystem-backed store of finalized training results.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Persist a finalized result, returning the record's path.
    pub fn save(&self, result: &TrainingResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create results dir {}", self.dir.display()))?;
        let path = self.path_for(&result.run_id);
        result.save_to_file(&path)?;
        tracing::info!(run = %result.run_id, path = %path.display(), "result saved");
        Ok(path)
    }

    /// Load the record for a run id.
    pub fn load(&self, run_id: &str) -> Result<TrainingResult> {
        TrainingResult::load_from_file(self.path_for(run_id))
    }

    /// Run ids with a stored record, in name order.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read results dir {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
