//! Concrete operations: `rotate`, `scale`, `draw`, and the drawing shapes.
//!
//! | Operation | Kind | Implementation |
//! |---|---|---|
//! | [`Rotate`] | transform | `image` quarter-turn fast path, nearest-neighbour otherwise |
//! | [`Scale`] | transform | `DynamicImage::resize_exact` with `Lanczos3` |
//! | [`Draw`] | transform | renders its [`Shape`]s and overlays them at `(xloc, yloc)` |
//! | [`Shape`] | configuration only | consumed by `draw`, skipped at top level |
//!
//! Every transform takes the image by value and returns a new one; nothing
//! here holds state between calls.

use super::calculations::{calculate_rotated_bounds, calculate_scale_dimensions, quarter_turns};
use super::operations::{Transform, TransformError};
use super::params::{Color, Dimension, Proportions};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest edge a transform may produce.
pub const MAX_DIMENSION: u32 = 1 << 16;

/// Rotate clockwise by `angle` degrees about the image center.
///
/// Right angles are lossless. Any other angle grows the canvas to the rotated
/// bounding box; uncovered corners are transparent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rotate {
    pub angle: f32,
}

impl Transform for Rotate {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        match quarter_turns(self.angle) {
            Some(0) => Ok(image),
            Some(1) => Ok(image.rotate90()),
            Some(2) => Ok(image.rotate180()),
            Some(3) => Ok(image.rotate270()),
            _ => {
                let (w, h) = calculate_rotated_bounds(image.width(), image.height(), self.angle);
                check_dimensions(self.name(), w, h)?;
                Ok(DynamicImage::ImageRgba8(rotate_nearest(
                    &image.to_rgba8(),
                    self.angle,
                    (w, h),
                )))
            }
        }
    }
}

/// Inverse-map every output pixel back into the source.
fn rotate_nearest(src: &RgbaImage, degrees: f32, bounds: (u32, u32)) -> RgbaImage {
    let theta = (degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let (src_cx, src_cy) = (src.width() as f64 / 2.0, src.height() as f64 / 2.0);
    let (out_cx, out_cy) = (bounds.0 as f64 / 2.0, bounds.1 as f64 / 2.0);

    RgbaImage::from_fn(bounds.0, bounds.1, |x, y| {
        let dx = x as f64 + 0.5 - out_cx;
        let dy = y as f64 + 0.5 - out_cy;
        let sx = (dx * cos + dy * sin + src_cx).floor();
        let sy = (-dx * sin + dy * cos + src_cy).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < src.width() as f64 && sy < src.height() as f64 {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Resize to `width`×`height`, reconciled with the source aspect ratio
/// according to `proportions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scale {
    pub width: Dimension,
    pub height: Dimension,
    pub proportions: Proportions,
}

impl Transform for Scale {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let source = (image.width(), image.height());
        let requested = (self.width.resolve(source.0), self.height.resolve(source.1));
        let (w, h) = calculate_scale_dimensions(source, requested, self.proportions);
        check_dimensions(self.name(), w, h)?;
        if (w, h) == source {
            return Ok(image);
        }
        Ok(image.resize_exact(w, h, FilterType::Lanczos3))
    }
}

/// Paint nested shapes onto the image, top-left corner at `(xloc, yloc)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Draw {
    pub xloc: i64,
    pub yloc: i64,
    pub shapes: Vec<Shape>,
}

impl Transform for Draw {
    fn name(&self) -> &'static str {
        "draw"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if self.shapes.is_empty() {
            return Ok(image);
        }
        let mut canvas = image.to_rgba8();
        for shape in &self.shapes {
            let rendered = shape.render();
            image::imageops::overlay(&mut canvas, &rendered, self.xloc, self.yloc);
        }
        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

fn default_stroke() -> Color {
    Color::BLACK
}

fn default_fill() -> Color {
    Color::TRANSPARENT
}

fn default_stroke_width() -> u32 {
    1
}

/// Size and paint shared by every shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeParams {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fill")]
    pub fill: Color,
    #[serde(default = "default_stroke")]
    pub stroke: Color,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
}

impl ShapeParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("shape width and height must be at least 1".into());
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(format!("shape larger than {MAX_DIMENSION}px"));
        }
        Ok(())
    }
}

/// A drawing primitive. Only meaningful inside [`Draw`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rectangle(ShapeParams),
    Ellipse(ShapeParams),
}

impl Shape {
    pub fn params(&self) -> &ShapeParams {
        match self {
            Shape::Rectangle(p) | Shape::Ellipse(p) => p,
        }
    }

    /// Render onto a transparent `width`×`height` tile.
    pub fn render(&self) -> RgbaImage {
        let p = *self.params();
        let (w, h, sw) = (p.width, p.height, p.stroke_width);
        let paint = |on_stroke: bool| {
            if on_stroke && sw > 0 {
                Rgba(p.stroke.0)
            } else {
                Rgba(p.fill.0)
            }
        };

        match self {
            Shape::Rectangle(_) => RgbaImage::from_fn(w, h, |x, y| {
                let on_stroke = x < sw || y < sw || x + sw >= w || y + sw >= h;
                paint(on_stroke)
            }),
            Shape::Ellipse(_) => {
                let (rx, ry) = (w as f64 / 2.0, h as f64 / 2.0);
                let (inner_rx, inner_ry) = (rx - sw as f64, ry - sw as f64);
                RgbaImage::from_fn(w, h, |x, y| {
                    let dx = x as f64 + 0.5 - rx;
                    let dy = y as f64 + 0.5 - ry;
                    if (dx / rx).powi(2) + (dy / ry).powi(2) > 1.0 {
                        return Rgba([0, 0, 0, 0]);
                    }
                    let inside_inner = inner_rx > 0.0
                        && inner_ry > 0.0
                        && (dx / inner_rx).powi(2) + (dy / inner_ry).powi(2) <= 1.0;
                    paint(!inside_inner)
                })
            }
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, p) = match self {
            Shape::Rectangle(p) => ("rectangle", p),
            Shape::Ellipse(p) => ("ellipse", p),
        };
        write!(f, "{kind} {}x{}", p.width, p.height)
    }
}

fn check_dimensions(operation: &str, w: u32, h: u32) -> Result<(), TransformError> {
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(TransformError::new(
            operation,
            format!("result {w}x{h} exceeds the {MAX_DIMENSION}px limit"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    /// 4x2 image: left half red, right half blue.
    fn two_tone() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        }))
    }

    #[test]
    fn rotate_90_swaps_axes_clockwise() {
        let out = Rotate { angle: 90.0 }.apply(two_tone()).unwrap();
        assert_eq!(out.dimensions(), (2, 4));
        // Left (red) half ends up on top after a clockwise turn
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 3), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn rotate_zero_and_full_turn_are_identity() {
        let img = two_tone();
        assert_eq!(Rotate { angle: 0.0 }.apply(img.clone()).unwrap(), img);
        assert_eq!(Rotate { angle: 360.0 }.apply(img.clone()).unwrap(), img);
    }

    #[test]
    fn rotate_arbitrary_expands_canvas_with_transparent_corners() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([9, 9, 9, 255])));
        let out = Rotate { angle: 45.0 }.apply(img).unwrap();
        assert_eq!(out.dimensions(), (28, 28));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(14, 14), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn scale_percent_halves() {
        let img = DynamicImage::new_rgb8(100, 60);
        let scale = Scale {
            width: Dimension::Percent(50.0),
            height: Dimension::Percent(50.0),
            proportions: Proportions::Ignore,
        };
        assert_eq!(scale.apply(img).unwrap().dimensions(), (50, 30));
    }

    #[test]
    fn scale_fit_keeps_aspect() {
        let img = DynamicImage::new_rgb8(400, 200);
        let scale = Scale {
            width: Dimension::Pixels(100),
            height: Dimension::Pixels(100),
            proportions: Proportions::Fit,
        };
        assert_eq!(scale.apply(img).unwrap().dimensions(), (100, 50));
    }

    #[test]
    fn scale_default_is_noop() {
        let img = two_tone();
        assert_eq!(Scale::default().apply(img.clone()).unwrap(), img);
    }

    #[test]
    fn scale_over_limit_fails() {
        let img = DynamicImage::new_rgb8(10, 10);
        let scale = Scale {
            width: Dimension::Pixels(MAX_DIMENSION + 1),
            height: Dimension::Pixels(10),
            proportions: Proportions::Ignore,
        };
        let err = scale.apply(img).unwrap_err();
        assert_eq!(err.operation, "scale");
    }

    fn rect(width: u32, height: u32, fill: Color, stroke_width: u32) -> Shape {
        Shape::Rectangle(ShapeParams {
            width,
            height,
            fill,
            stroke: Color::BLACK,
            stroke_width,
        })
    }

    #[test]
    fn rectangle_renders_stroke_and_fill() {
        let tile = rect(5, 5, Color([255, 255, 255, 255]), 1).render();
        assert_eq!(*tile.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*tile.get_pixel(4, 2), Rgba([0, 0, 0, 255]));
        assert_eq!(*tile.get_pixel(2, 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn ellipse_corners_are_transparent() {
        let tile = Shape::Ellipse(ShapeParams {
            width: 10,
            height: 10,
            fill: Color([0, 255, 0, 255]),
            stroke: Color::BLACK,
            stroke_width: 0,
        })
        .render();
        assert_eq!(tile.get_pixel(0, 0)[3], 0);
        assert_eq!(*tile.get_pixel(5, 5), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn draw_overlays_at_offset() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])));
        let draw = Draw {
            xloc: 2,
            yloc: 3,
            shapes: vec![rect(3, 3, Color([255, 0, 0, 255]), 0)],
        };
        let out = draw.apply(img).unwrap();
        assert_eq!(out.get_pixel(3, 4), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(1, 1), Rgba([0, 0, 255, 255]));
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn draw_transparent_fill_keeps_background() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 6, Rgba([0, 0, 255, 255])));
        let draw = Draw {
            xloc: 0,
            yloc: 0,
            shapes: vec![rect(6, 6, Color::TRANSPARENT, 1)],
        };
        let out = draw.apply(img).unwrap();
        assert_eq!(out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(3, 3), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn shape_validate_rejects_empty() {
        let p = ShapeParams {
            width: 0,
            height: 4,
            fill: Color::TRANSPARENT,
            stroke: Color::BLACK,
            stroke_width: 1,
        };
        assert!(p.validate().is_err());
    }
}
