//! [`BatchProcessor`]: queue-less local driver over a directory of images,
//! grounded on `core/batch_processor.py`.

use crate::error::BatchError;
use crate::pipeline::filter_pipeline::PipelineStats;
use crate::pipeline::FilterPipeline;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Outcome of processing a single image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: ImageStatus,
    pub error: Option<String>,
    pub duration: Duration,
    pub pipeline_stats: Option<PipelineStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Success,
    Failed,
}

/// Aggregate report for a full batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ImageResult>,
    pub total_time: Duration,
    pub average_time: Duration,
    pub pipeline: String,
}

/// Runs a [`FilterPipeline`] over every supported image under a directory,
/// queue-less and synchronous, isolating per-image failures so one bad
/// file doesn't abort the batch.
pub struct BatchProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    pipeline: FilterPipeline,
    recursive: bool,
    preserve_structure: bool,
}

impl BatchProcessor {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        pipeline: FilterPipeline,
    ) -> Result<Self, BatchError> {
        let input_dir = input_dir.into();
        if !input_dir.exists() {
            return Err(BatchError::InputDirNotFound(input_dir.display().to_string()));
        }
        Ok(Self {
            input_dir,
            output_dir: output_dir.into(),
            pipeline,
            recursive: true,
            preserve_structure: true,
        })
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    /// Finds every supported image under `input_dir`, case-insensitive on
    /// extension, recursing when `recursive` is set, sorted lexicographically.
    pub fn find_images(&self) -> Vec<PathBuf> {
        let mut images: Vec<PathBuf> = if self.recursive {
            WalkDir::new(&self.input_dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| is_supported(path))
                .collect()
        } else {
            std::fs::read_dir(&self.input_dir)
                .into_iter()
                .flatten()
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_supported(path))
                .collect()
        };
        images.sort();
        images
    }

    fn output_path_for(&self, input_path: &Path) -> PathBuf {
        if self.preserve_structure {
            let relative = input_path.strip_prefix(&self.input_dir).unwrap_or(input_path);
            self.output_dir.join(relative)
        } else {
            let name = input_path.file_name().expect("file has a name");
            self.output_dir.join(name)
        }
    }

    /// Processes a single image: decode, run the pipeline, encode and save.
    /// Never returns an error for per-image failures — those are reported
    /// in the returned [`ImageResult`] so the caller can continue the batch.
    pub fn process_image(&self, input_path: &Path) -> ImageResult {
        let start = Instant::now();

        let image = match image::open(input_path) {
            Ok(image) => image,
            Err(e) => {
                return ImageResult {
                    input_path: input_path.to_path_buf(),
                    output_path: None,
                    status: ImageStatus::Failed,
                    error: Some(e.to_string()),
                    duration: start.elapsed(),
                    pipeline_stats: None,
                };
            }
        };

        let output_path = self.output_path_for(input_path);
        let (result, stats) = match self.pipeline.apply(&image, None) {
            Ok(outcome) => outcome,
            Err(e) => {
                return ImageResult {
                    input_path: input_path.to_path_buf(),
                    output_path: None,
                    status: ImageStatus::Failed,
                    error: Some(e.to_string()),
                    duration: start.elapsed(),
                    pipeline_stats: None,
                };
            }
        };

        let Some(processed) = result else {
            return ImageResult {
                input_path: input_path.to_path_buf(),
                output_path: None,
                status: ImageStatus::Failed,
                error: Some("pipeline failed completely".to_string()),
                duration: start.elapsed(),
                pipeline_stats: Some(stats),
            };
        };

        if let Some(parent) = output_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ImageResult {
                    input_path: input_path.to_path_buf(),
                    output_path: None,
                    status: ImageStatus::Failed,
                    error: Some(e.to_string()),
                    duration: start.elapsed(),
                    pipeline_stats: Some(stats),
                };
            }
        }

        if let Err(e) = processed.to_rgb8().save(&output_path) {
            return ImageResult {
                input_path: input_path.to_path_buf(),
                output_path: None,
                status: ImageStatus::Failed,
                error: Some(e.to_string()),
                duration: start.elapsed(),
                pipeline_stats: Some(stats),
            };
        }

        ImageResult {
            input_path: input_path.to_path_buf(),
            output_path: Some(output_path),
            status: ImageStatus::Success,
            error: None,
            duration: start.elapsed(),
            pipeline_stats: Some(stats),
        }
    }

    /// Processes every discovered image, aggregating a [`BatchReport`].
    pub fn process_all(&self) -> BatchReport {
        let start = Instant::now();
        let images = self.find_images();
        let total = images.len();

        let results: Vec<ImageResult> = images.iter().map(|path| self.process_image(path)).collect();

        let successful = results.iter().filter(|r| r.status == ImageStatus::Success).count();
        let failed = total - successful;
        let total_time = start.elapsed();
        let average_time = if total > 0 {
            total_time / total as u32
        } else {
            Duration::ZERO
        };

        BatchReport {
            total,
            successful,
            failed,
            results,
            total_time,
            average_time,
            pipeline: self.pipeline.to_string(),
        }
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filter;
    use tempfile::tempdir;

    fn small_pipeline() -> FilterPipeline {
        FilterPipeline::new(vec![Filter::grayscale()], true, false).unwrap()
    }

    #[test]
    fn rejects_missing_input_dir() {
        let err = BatchProcessor::new("/no/such/dir", "/tmp/out", small_pipeline()).unwrap_err();
        assert!(matches!(err, BatchError::InputDirNotFound(_)));
    }

    #[test]
    fn find_images_is_case_insensitive_and_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.PNG"), b"not a real png").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"not a real jpg").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"ignored").unwrap();

        let processor = BatchProcessor::new(dir.path(), dir.path().join("out"), small_pipeline()).unwrap();
        let images = processor.find_images();
        let names: Vec<_> = images.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);
    }

    #[test]
    fn process_image_reports_decode_failure_without_aborting() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("broken.jpg");
        std::fs::write(&bad, b"not actually a jpeg").unwrap();

        let processor = BatchProcessor::new(dir.path(), dir.path().join("out"), small_pipeline()).unwrap();
        let result = processor.process_image(&bad);
        assert_eq!(result.status, ImageStatus::Failed);
        assert!(result.error.is_some());
    }

    #[test]
    fn process_all_handles_empty_directory() {
        let dir = tempdir().unwrap();
        let processor = BatchProcessor::new(dir.path(), dir.path().join("out"), small_pipeline()).unwrap();
        let report = processor.process_all();
        assert_eq!(report.total, 0);
        assert_eq!(report.average_time, Duration::ZERO);
    }
}
