//! The [`Filter`] enum: the closed set of pure image transforms.

use crate::error::FilterError;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::fmt;

/// A single pure image transform.
///
/// Deliberately a tagged-variant enum, not an open trait hierarchy: the
/// set of filter kinds is fixed and known at compile time, so dynamic
/// dispatch buys nothing and a closed match keeps `apply` exhaustive.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Gaussian blur. `radius` must be `>= 0.0`.
    Blur { radius: f32 },
    /// Linear brightness scaling. `factor` must be `> 0.0`; values above
    /// `5.0` are accepted but logged as likely overexposure.
    Brightness { factor: f32 },
    /// Edge detection via a fixed 3x3 high-pass kernel, no parameters.
    Edges,
    /// Luminance grayscale conversion, no parameters.
    Grayscale,
}

impl Filter {
    /// Builds a blur filter, rejecting a negative radius.
    pub fn blur(radius: f32) -> Result<Self, FilterError> {
        if radius < 0.0 {
            return Err(FilterError::InvalidRadius(radius));
        }
        Ok(Filter::Blur { radius })
    }

    /// Builds a brightness filter, rejecting a non-positive factor.
    pub fn brightness(factor: f32) -> Result<Self, FilterError> {
        if factor <= 0.0 {
            return Err(FilterError::InvalidFactor(factor));
        }
        if factor > 5.0 {
            tracing::warn!(factor, "brightness factor is very high, may overexpose");
        }
        Ok(Filter::Brightness { factor })
    }

    pub fn edges() -> Self {
        Filter::Edges
    }

    pub fn grayscale() -> Self {
        Filter::Grayscale
    }

    /// Applies this filter to `image`, returning a new image.
    ///
    /// Fails only for [`Filter::Edges`], whose 3x3 kernel needs an image at
    /// least 3 pixels on each side.
    pub fn apply(&self, image: &DynamicImage) -> Result<DynamicImage, FilterError> {
        match self {
            Filter::Blur { radius } => Ok(image.blur(*radius)),
            Filter::Brightness { factor } => Ok(scale_brightness(image, *factor)),
            Filter::Edges => find_edges(image),
            Filter::Grayscale => Ok(image.grayscale()),
        }
    }

    /// Lowercase, hyphen-free kind name, matching the factory's registry keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Filter::Blur { .. } => "blur",
            Filter::Brightness { .. } => "brightness",
            Filter::Edges => "edges",
            Filter::Grayscale => "grayscale",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Blur { radius } => write!(f, "BlurFilter(radius={radius})"),
            Filter::Brightness { factor } => write!(f, "BrightnessFilter(factor={factor})"),
            Filter::Edges => write!(f, "EdgesFilter()"),
            Filter::Grayscale => write!(f, "GrayscaleFilter()"),
        }
    }
}

/// Multiplies every RGB channel by `factor`, clamping to `[0, 255]`.
fn scale_brightness(image: &DynamicImage, factor: f32) -> DynamicImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbaImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let scale = |v: u8| ((v as f32) * factor).round().clamp(0.0, 255.0) as u8;
        out.put_pixel(x, y, Rgba([scale(r), scale(g), scale(b), a]));
    }

    DynamicImage::ImageRgba8(out)
}

/// PIL's `ImageFilter.FIND_EDGES` kernel: a fixed 3x3 high-pass filter
/// applied to the luminance channel.
const FIND_EDGES_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

fn find_edges(image: &DynamicImage) -> Result<DynamicImage, FilterError> {
    if image.width() < 3 || image.height() < 3 {
        return Err(FilterError::ImageTooSmallForEdges {
            width: image.width(),
            height: image.height(),
        });
    }
    let luma = image.to_luma8();
    let filtered = image::imageops::filter3x3(&luma, &FIND_EDGES_KERNEL);
    Ok(DynamicImage::ImageLuma8(filtered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_rejects_negative_radius() {
        assert!(Filter::blur(-1.0).is_err());
        assert!(Filter::blur(0.0).is_ok());
    }

    #[test]
    fn brightness_rejects_non_positive_factor() {
        assert!(Filter::brightness(0.0).is_err());
        assert!(Filter::brightness(-0.5).is_err());
        assert!(Filter::brightness(1.5).is_ok());
    }

    #[test]
    fn brightness_accepts_high_factor_with_warning() {
        assert!(Filter::brightness(10.0).is_ok());
    }

    #[test]
    fn display_matches_canonical_form() {
        assert_eq!(Filter::blur(5.0).unwrap().to_string(), "BlurFilter(radius=5)");
        assert_eq!(
            Filter::brightness(1.5).unwrap().to_string(),
            "BrightnessFilter(factor=1.5)"
        );
        assert_eq!(Filter::edges().to_string(), "EdgesFilter()");
        assert_eq!(Filter::grayscale().to_string(), "GrayscaleFilter()");
    }

    #[test]
    fn grayscale_apply_produces_luma_like_output() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 200, 30, 255])));
        let out = Filter::grayscale().apply(&img).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
    }

    #[test]
    fn edges_rejects_image_smaller_than_kernel() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        assert!(matches!(
            Filter::edges().apply(&img),
            Err(FilterError::ImageTooSmallForEdges { width: 2, height: 2 })
        ));
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255])));
        let bright = Filter::brightness(3.0).unwrap();
        let out = bright.apply(&img).unwrap().to_rgba8();
        let pixel = out.get_pixel(0, 0);
        assert_eq!(pixel.0, [255, 255, 255, 255]);
    }

    #[test]
    fn kind_matches_factory_registry_keys() {
        assert_eq!(Filter::blur(1.0).unwrap().kind(), "blur");
        assert_eq!(Filter::brightness(1.0).unwrap().kind(), "brightness");
        assert_eq!(Filter::edges().kind(), "edges");
        assert_eq!(Filter::grayscale().kind(), "grayscale");
    }
}
