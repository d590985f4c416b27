//! SampleStore — reads worker result files from the results directory.
//!
//! A corrupt or unreadable file never fails the scan: it is logged,
//! reported in [`SampleBatch::rejected`], and the rest of the batch is
//! still returned.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use fleetscale_core::config::SamplesConfig;
use fleetscale_core::SampleRecord;

use crate::error::{SampleError, SampleResult};

/// Reference to one sample file inside the results directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl SampleFile {
    pub fn new(path: PathBuf) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, file_name }
    }
}

/// Everything found in the results directory during one scan.
#[derive(Debug, Default)]
pub struct SampleBatch {
    /// Files that parsed into a sample.
    pub samples: Vec<(SampleFile, SampleRecord)>,
    /// Files with the sample extension that could not be used.
    pub rejected: Vec<SampleFile>,
}

impl SampleBatch {
    pub fn records(&self) -> impl Iterator<Item = &SampleRecord> {
        self.samples.iter().map(|(_, record)| record)
    }

    /// Every file this batch consumed, parsed or not.
    pub fn files(&self) -> Vec<SampleFile> {
        self.samples
            .iter()
            .map(|(file, _)| file.clone())
            .chain(self.rejected.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Worker payload. Older workers write `"Service Time"`/`"Response Time"`.
#[derive(Debug, Deserialize)]
struct SamplePayload {
    #[serde(rename = "serviceTime", alias = "Service Time", alias = "service_time")]
    service_time: f64,
    #[serde(rename = "responseTime", alias = "Response Time", alias = "response_time")]
    response_time: f64,
}

/// Read-only view of the results directory.
#[derive(Debug, Clone)]
pub struct SampleStore {
    results_dir: PathBuf,
    extension: String,
    /// History document filename; never a sample.
    reserved: String,
}

impl SampleStore {
    pub fn new(
        results_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        reserved: impl Into<String>,
    ) -> Self {
        Self {
            results_dir: results_dir.into(),
            extension: extension.into(),
            reserved: reserved.into(),
        }
    }

    pub fn from_config(config: &SamplesConfig) -> Self {
        Self::new(
            config.results_dir.clone(),
            config.extension.clone(),
            config.history_file.clone(),
        )
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Scan the results directory and parse every sample file.
    ///
    /// A missing results directory is an empty batch. Only a directory that
    /// exists but cannot be listed is an error.
    pub fn list_samples(&self) -> SampleResult<SampleBatch> {
        let mut batch = SampleBatch::default();

        if !self.results_dir.exists() {
            debug!(dir = ?self.results_dir, "results directory missing, no samples");
            return Ok(batch);
        }

        let walker = WalkDir::new(&self.results_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => {
                    return Err(SampleError::Scan {
                        path: self.results_dir.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_sample_name(entry.path()) {
                continue;
            }

            let file = SampleFile::new(entry.into_path());
            match parse_sample_file(&file) {
                Ok(record) => batch.samples.push((file, record)),
                Err(e) => {
                    warn!(file = %file.file_name, error = %e, "skipping sample");
                    batch.rejected.push(file);
                }
            }
        }

        debug!(
            samples = batch.samples.len(),
            rejected = batch.rejected.len(),
            dir = ?self.results_dir,
            "sample scan complete"
        );
        Ok(batch)
    }

    fn is_sample_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name == self.reserved {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

/// Extract the producing instance id from a sample file name.
///
/// Returns the part of the stem before the first `_`, or the whole stem when
/// there is no separator. `None` when that part is empty.
pub fn instance_id_from_file_name(file_name: &str) -> Option<&str> {
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let id = stem.split('_').next().unwrap_or(stem);
    (!id.is_empty()).then_some(id)
}

fn parse_sample_file(file: &SampleFile) -> SampleResult<SampleRecord> {
    let instance_id = instance_id_from_file_name(&file.file_name)
        .ok_or_else(|| SampleError::MissingInstanceId(file.file_name.clone()))?;

    let content = std::fs::read(&file.path).map_err(|source| SampleError::Read {
        path: file.path.clone(),
        source,
    })?;
    let payload: SamplePayload =
        serde_json::from_slice(&content).map_err(|source| SampleError::Parse {
            path: file.path.clone(),
            source,
        })?;

    for (field, value) in [
        ("serviceTime", payload.service_time),
        ("responseTime", payload.response_time),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(SampleError::Invalid {
                path: file.path.clone(),
                reason: format!("{field} must be a non-negative number, got {value}"),
            });
        }
    }

    Ok(SampleRecord::new(
        instance_id,
        payload.service_time,
        payload.response_time,
    ))
}
