//! [`FilterPipeline`]: ordered composition of filters with per-step timing,
//! error isolation and optional intermediate persistence, grounded on
//! `core/filter_pipeline.py`.

use crate::error::PipelineError;
use crate::filters::Filter;
use crate::metrics;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of a single filter step within a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct StepStat {
    pub index: usize,
    pub name: String,
    pub duration: Duration,
    pub status: StepStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Aggregate result of running a [`FilterPipeline`] once.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub steps: Vec<StepStat>,
    pub successful: usize,
    pub failed: usize,
    pub total_filters: usize,
}

/// An ordered sequence of [`Filter`]s applied to one image.
///
/// `stop_on_error` controls whether a failed step aborts the remaining
/// filters (`true`) or is skipped, leaving the working image unchanged,
/// so later steps still run (`false`). `save_intermediate`, when set,
/// writes `step_{i:02}_{FilterName}.jpg`-style files after every
/// successful step into a caller-provided directory.
pub struct FilterPipeline {
    filters: Vec<Filter>,
    stop_on_error: bool,
    save_intermediate: bool,
}

impl FilterPipeline {
    /// Builds a pipeline. Rejects an empty filter list.
    pub fn new(filters: Vec<Filter>, stop_on_error: bool, save_intermediate: bool) -> Result<Self, PipelineError> {
        if filters.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        Ok(Self {
            filters,
            stop_on_error,
            save_intermediate,
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        false // constructor guarantees non-empty
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.kind().to_string()).collect()
    }

    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Removes and returns the filter at `index`.
    pub fn remove_filter(&mut self, index: usize) -> Result<Filter, PipelineError> {
        if index >= self.filters.len() {
            return Err(PipelineError::IndexOutOfRange(index, self.filters.len()));
        }
        Ok(self.filters.remove(index))
    }

    /// Applies every filter in order to `image`.
    ///
    /// Returns `(None, stats)` when every step failed; otherwise returns
    /// the final image alongside per-step timing and status. When
    /// `output_dir` is `Some` and `save_intermediate` is enabled, writes
    /// one JPEG per successful step.
    pub fn apply(
        &self,
        image: &DynamicImage,
        output_dir: Option<&Path>,
    ) -> Result<(Option<DynamicImage>, PipelineStats), PipelineError> {
        let start = Instant::now();
        let mut working = image.clone();
        let mut steps = Vec::with_capacity(self.filters.len());
        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut any_success = false;

        if self.save_intermediate {
            if let Some(dir) = output_dir {
                std::fs::create_dir_all(dir)?;
            }
        }

        for (index, filter) in self.filters.iter().enumerate() {
            let step_start = Instant::now();
            let outcome = filter.apply(&working);

            match outcome {
                Ok(result) => {
                    working = result;
                    any_success = true;
                    successful += 1;
                    metrics::observe_filter_duration(filter.kind(), step_start.elapsed());
                    steps.push(StepStat {
                        index,
                        name: filter.to_string(),
                        duration: step_start.elapsed(),
                        status: StepStatus::Success,
                        error: None,
                    });

                    if self.save_intermediate {
                        if let Some(dir) = output_dir {
                            let path = dir.join(format!("step_{index:02}_{}.jpg", filter.kind()));
                            let _ = working.to_rgb8().save(&path);
                        }
                    }
                }
                Err(error) => {
                    failed += 1;
                    metrics::observe_filter_duration(filter.kind(), step_start.elapsed());
                    steps.push(StepStat {
                        index,
                        name: filter.to_string(),
                        duration: step_start.elapsed(),
                        status: StepStatus::Failed,
                        error: Some(error.to_string()),
                    });
                    if self.stop_on_error {
                        break;
                    }
                }
            }
        }

        let stats = PipelineStats {
            total_time: start.elapsed(),
            total_filters: self.filters.len(),
            successful,
            failed,
            steps,
        };

        if !any_success {
            return Ok((None, stats));
        }
        Ok((Some(working), stats))
    }
}

impl std::fmt::Display for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FilterPipeline({})",
            self.filters
                .iter()
                .map(|filter| filter.to_string())
                .collect::<Vec<_>>()
                .join(" \u{2192} ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn rejects_empty_pipeline() {
        assert!(matches!(
            FilterPipeline::new(vec![], true, false),
            Err(PipelineError::EmptyPipeline)
        ));
    }

    #[test]
    fn apply_runs_all_steps_in_order() {
        let pipeline = FilterPipeline::new(
            vec![Filter::grayscale(), Filter::brightness(1.2).unwrap()],
            true,
            false,
        )
        .unwrap();
        let (result, stats) = pipeline.apply(&sample_image(), None).unwrap();
        assert!(result.is_some());
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.steps.len(), 2);
    }

    #[test]
    fn stop_on_error_halts_remaining_steps() {
        let tiny = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let pipeline = FilterPipeline::new(vec![Filter::edges(), Filter::grayscale()], true, false).unwrap();
        let (result, stats) = pipeline.apply(&tiny, None).unwrap();
        assert!(result.is_none());
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.steps.len(), 1);
    }

    #[test]
    fn continues_past_failed_step_when_not_stopping() {
        let tiny = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let pipeline = FilterPipeline::new(vec![Filter::edges(), Filter::grayscale()], false, false).unwrap();
        let (result, stats) = pipeline.apply(&tiny, None).unwrap();
        assert!(result.is_some());
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.steps.len(), 2);
    }

    #[test]
    fn add_and_remove_filter() {
        let mut pipeline = FilterPipeline::new(vec![Filter::grayscale()], true, false).unwrap();
        pipeline.add_filter(Filter::edges());
        assert_eq!(pipeline.len(), 2);
        let removed = pipeline.remove_filter(0).unwrap();
        assert_eq!(removed, Filter::grayscale());
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn remove_filter_out_of_range_errors() {
        let mut pipeline = FilterPipeline::new(vec![Filter::grayscale()], true, false).unwrap();
        assert!(matches!(
            pipeline.remove_filter(5),
            Err(PipelineError::IndexOutOfRange(5, 1))
        ));
    }

    #[test]
    fn display_joins_filter_names_with_arrow() {
        let pipeline = FilterPipeline::new(vec![Filter::grayscale(), Filter::edges()], true, false).unwrap();
        assert_eq!(pipeline.to_string(), "FilterPipeline(GrayscaleFilter() \u{2192} EdgesFilter())");
    }
}
