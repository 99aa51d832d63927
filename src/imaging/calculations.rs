//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Proportions;

/// Calculate the output size of a `scale` operation.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `requested` - Requested (width, height), already resolved to pixels
/// * `proportions` - How to reconcile the request with the source aspect ratio
///
/// # Returns
/// * `(width, height)` - Final dimensions, each at least 1
pub fn calculate_scale_dimensions(
    source: (u32, u32),
    requested: (u32, u32),
    proportions: Proportions,
) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (req_w, req_h) = requested;
    let x_ratio = req_w as f64 / src_w;
    let y_ratio = req_h as f64 / src_h;

    let ratio = match proportions {
        Proportions::Ignore => return (req_w.max(1), req_h.max(1)),
        Proportions::Width => x_ratio,
        Proportions::Height => y_ratio,
        Proportions::Fit => x_ratio.min(y_ratio),
        Proportions::Cover => x_ratio.max(y_ratio),
    };

    let w = (src_w * ratio).round() as u32;
    let h = (src_h * ratio).round() as u32;
    (w.max(1), h.max(1))
}

/// Normalize an angle in degrees to `[0, 360)`.
pub fn normalize_angle(degrees: f32) -> f32 {
    let a = degrees % 360.0;
    if a < 0.0 { a + 360.0 } else { a }
}

/// Quarter turns for angles that are an exact multiple of 90°.
///
/// Returns `None` for any other angle.
pub fn quarter_turns(degrees: f32) -> Option<u8> {
    let a = normalize_angle(degrees);
    let turns = a / 90.0;
    if (turns - turns.round()).abs() < 1e-4 {
        Some((turns.round() as u8) % 4)
    } else {
        None
    }
}

/// Size of the axis-aligned box that contains a `width`×`height` image
/// rotated by `degrees` about its center.
pub fn calculate_rotated_bounds(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let theta = (degrees as f64).to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let (w, h) = (width as f64, height as f64);
    let out_w = (w * cos + h * sin).round() as u32;
    let out_h = (w * sin + h * cos).round() as u32;
    (out_w.max(1), out_h.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_scale_dimensions
    // =========================================================================

    #[test]
    fn scale_ignore_uses_request_verbatim() {
        assert_eq!(
            calculate_scale_dimensions((400, 300), (100, 100), Proportions::Ignore),
            (100, 100)
        );
    }

    #[test]
    fn scale_width_keeps_aspect() {
        assert_eq!(
            calculate_scale_dimensions((400, 300), (200, 999), Proportions::Width),
            (200, 150)
        );
    }

    #[test]
    fn scale_height_keeps_aspect() {
        assert_eq!(
            calculate_scale_dimensions((400, 300), (999, 150), Proportions::Height),
            (200, 150)
        );
    }

    #[test]
    fn scale_fit_stays_inside_box() {
        // Landscape into a square: width is the limiting side
        assert_eq!(
            calculate_scale_dimensions((400, 200), (100, 100), Proportions::Fit),
            (100, 50)
        );
    }

    #[test]
    fn scale_cover_fills_box() {
        assert_eq!(
            calculate_scale_dimensions((400, 200), (100, 100), Proportions::Cover),
            (200, 100)
        );
    }

    #[test]
    fn scale_never_collapses_to_zero() {
        assert_eq!(
            calculate_scale_dimensions((1000, 1), (10, 10), Proportions::Width),
            (10, 1)
        );
    }

    // =========================================================================
    // Rotation helpers
    // =========================================================================

    #[test]
    fn normalize_angle_wraps_negative_and_large() {
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(450.0), 90.0);
        assert_eq!(normalize_angle(0.0), 0.0);
    }

    #[test]
    fn quarter_turns_detects_right_angles() {
        assert_eq!(quarter_turns(0.0), Some(0));
        assert_eq!(quarter_turns(90.0), Some(1));
        assert_eq!(quarter_turns(-90.0), Some(3));
        assert_eq!(quarter_turns(540.0), Some(2));
        assert_eq!(quarter_turns(45.0), None);
    }

    #[test]
    fn rotated_bounds_right_angle_swaps_axes() {
        assert_eq!(calculate_rotated_bounds(200, 100, 90.0), (100, 200));
    }

    #[test]
    fn rotated_bounds_45_degrees_square() {
        // diagonal of a 100px square ≈ 141
        assert_eq!(calculate_rotated_bounds(100, 100, 45.0), (141, 141));
    }
}
