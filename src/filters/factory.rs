//! [`FilterFactory`]: dynamic construction of filters and pipelines from
//! [`FilterDescriptor`]s, grounded on `core/filter_factory.py`'s
//! name-to-constructor registry.

use super::descriptor::FilterDescriptor;
use super::filter::Filter;
use crate::error::{FactoryError, PipelineError};
use crate::pipeline::FilterPipeline;

/// Builds [`Filter`]s and [`FilterPipeline`]s from declarative descriptors.
///
/// The registry of known filter names is fixed (blur/brightness/edges/
/// grayscale, with `gray` as an alias for `grayscale`) but can be extended
/// at runtime via [`FilterFactory::register`], the way the original
/// `register_filter` classmethod works.
pub struct FilterFactory {
    names: Vec<&'static str>,
}

impl Default for FilterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterFactory {
    pub fn new() -> Self {
        Self {
            names: vec!["blur", "brightness", "edges", "grayscale", "gray"],
        }
    }

    /// Registers an additional alias for an existing filter kind. Returns
    /// an error if `canonical_kind` isn't already a known filter kind.
    pub fn register(&mut self, alias: &'static str, canonical_kind: &str) -> Result<(), FactoryError> {
        if !self.names.iter().any(|n| resolve_alias(n) == canonical_kind) {
            return Err(FactoryError::UnknownFilter {
                requested: canonical_kind.to_string(),
                available: self.available_filters().join(", "),
            });
        }
        self.names.push(alias);
        Ok(())
    }

    pub fn available_filters(&self) -> Vec<String> {
        self.names.iter().map(|s| s.to_string()).collect()
    }

    /// Builds a single filter from a type name and raw parameters.
    pub fn create(&self, filter_type: &str, descriptor: &FilterDescriptor) -> Result<Filter, FactoryError> {
        let lowered = filter_type.to_lowercase();
        if !self.names.contains(&lowered.as_str()) {
            return Err(FactoryError::UnknownFilter {
                requested: filter_type.to_string(),
                available: self.available_filters().join(", "),
            });
        }

        match resolve_alias(&lowered) {
            "blur" => {
                let radius = descriptor.get_f32("radius").unwrap_or(2.0);
                Filter::blur(radius).map_err(|e| FactoryError::InvalidParameters {
                    filter_type: filter_type.to_string(),
                    reason: e.to_string(),
                })
            }
            "brightness" => {
                let factor = descriptor.get_f32("factor").unwrap_or(1.5);
                Filter::brightness(factor).map_err(|e| FactoryError::InvalidParameters {
                    filter_type: filter_type.to_string(),
                    reason: e.to_string(),
                })
            }
            "edges" => Ok(Filter::edges()),
            "grayscale" => Ok(Filter::grayscale()),
            other => Err(FactoryError::UnknownFilter {
                requested: other.to_string(),
                available: self.available_filters().join(", "),
            }),
        }
    }

    /// Builds a filter from a full descriptor (the `type` field selects the
    /// constructor, the rest of the fields are its parameters).
    pub fn create_from_descriptor(&self, descriptor: &FilterDescriptor) -> Result<Filter, FactoryError> {
        if descriptor.filter_type.is_empty() {
            return Err(FactoryError::MissingType);
        }
        self.create(&descriptor.filter_type, descriptor)
    }

    /// Builds an ordered [`FilterPipeline`] from a list of descriptors,
    /// wrapping any per-step build failure with its index and type.
    pub fn create_pipeline(
        &self,
        descriptors: &[FilterDescriptor],
        stop_on_error: bool,
        save_intermediate: bool,
    ) -> Result<FilterPipeline, PipelineError> {
        let mut filters = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            let filter = self.create_from_descriptor(descriptor).map_err(|source| {
                FactoryError::PipelineStepBuild {
                    index,
                    filter_type: descriptor.filter_type.clone(),
                    source: Box::new(source),
                }
            })?;
            filters.push(filter);
        }
        Ok(FilterPipeline::new(filters, stop_on_error, save_intermediate)?)
    }
}

fn resolve_alias(name: &str) -> &str {
    if name == "gray" {
        "grayscale"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_known_filters_with_defaults() {
        let factory = FilterFactory::new();
        let descriptor = FilterDescriptor::new("blur");
        let filter = factory.create_from_descriptor(&descriptor).unwrap();
        assert_eq!(filter, Filter::blur(2.0).unwrap());
    }

    #[test]
    fn gray_is_an_alias_for_grayscale() {
        let factory = FilterFactory::new();
        let filter = factory.create("gray", &FilterDescriptor::new("gray")).unwrap();
        assert_eq!(filter, Filter::grayscale());
    }

    #[test]
    fn unknown_filter_lists_available_names() {
        let factory = FilterFactory::new();
        let err = factory.create("sepia", &FilterDescriptor::new("sepia")).unwrap_err();
        match err {
            FactoryError::UnknownFilter { requested, available } => {
                assert_eq!(requested, "sepia");
                assert!(available.contains("blur"));
            }
            _ => panic!("expected UnknownFilter"),
        }
    }

    #[test]
    fn create_from_descriptor_requires_type() {
        let factory = FilterFactory::new();
        let descriptor = FilterDescriptor::new("");
        assert!(matches!(
            factory.create_from_descriptor(&descriptor),
            Err(FactoryError::MissingType)
        ));
    }

    #[test]
    fn create_pipeline_builds_ordered_filters() {
        let factory = FilterFactory::new();
        let descriptors = vec![
            FilterDescriptor::new("grayscale"),
            FilterDescriptor::new("brightness").with_param("factor", 1.2),
        ];
        let pipeline = factory.create_pipeline(&descriptors, true, false).unwrap();
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn create_pipeline_wraps_step_failure_with_context() {
        let factory = FilterFactory::new();
        let descriptors = vec![FilterDescriptor::new("brightness").with_param("factor", -1.0)];
        let err = factory.create_pipeline(&descriptors, true, false).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("brightness"));
    }
}
