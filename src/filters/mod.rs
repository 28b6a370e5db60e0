//! Pure image transforms and their dynamic construction.
//!
//! Filters are a closed, tagged-variant enum rather than an open trait
//! hierarchy: the set of filter kinds is known up front (blur, brightness,
//! edges, grayscale) and each applies to an in-memory [`image::DynamicImage`]
//! with a single `apply` method. [`FilterFactory`] builds filters and whole
//! pipelines from declarative descriptors at runtime.

mod descriptor;
mod factory;
mod filter;

pub use descriptor::FilterDescriptor;
pub use factory::FilterFactory;
pub use filter::Filter;
