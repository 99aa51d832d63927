//! Parameter types for image operations.
//!
//! These types describe *what* an operation should do. They are what the job
//! file deserializes into, and what the [`transforms`](super::transforms)
//! read when they run. Parsing and clamping happen here, once, so the
//! transforms never see an out-of-range value.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Dimension`]: A length in pixels (`"200"`) or relative to the source (`"50%"`).
//! - [`Proportions`]: How `scale` reconciles a requested width and height.
//! - [`Color`]: RGBA paint for `draw` shapes, from `#rrggbb`, `#rrggbbaa` or a name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// A length along one image axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DimensionRepr", into = "String")]
pub enum Dimension {
    Pixels(u32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against the source length. Never returns 0.
    pub fn resolve(self, source: u32) -> u32 {
        let px = match self {
            Dimension::Pixels(px) => px,
            Dimension::Percent(pct) => (source as f64 * pct as f64 / 100.0).round() as u32,
        };
        px.max(1)
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Dimension::Percent(100.0)
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: f32 = pct
                .trim()
                .parse()
                .map_err(|_| format!("invalid percentage '{s}'"))?;
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("percentage must be positive, got '{s}'"));
            }
            return Ok(Dimension::Percent(value));
        }
        let px: u32 = s
            .strip_suffix("px")
            .unwrap_or(s)
            .trim()
            .parse()
            .map_err(|_| format!("invalid dimension '{s}', expected pixels or a percentage"))?;
        if px == 0 {
            return Err("dimension must be at least 1 pixel".into());
        }
        Ok(Dimension::Pixels(px))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pixels(px) => write!(f, "{px}"),
            Dimension::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

impl From<Dimension> for String {
    fn from(d: Dimension) -> Self {
        d.to_string()
    }
}

/// Job files may write `width = 200` or `width = "50%"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DimensionRepr {
    Number(u32),
    Text(String),
}

impl TryFrom<DimensionRepr> for Dimension {
    type Error = String;

    fn try_from(repr: DimensionRepr) -> Result<Self, Self::Error> {
        match repr {
            DimensionRepr::Number(0) => Err("dimension must be at least 1 pixel".into()),
            DimensionRepr::Number(px) => Ok(Dimension::Pixels(px)),
            DimensionRepr::Text(s) => s.parse(),
        }
    }
}

/// How `scale` reconciles the requested width and height with the source
/// aspect ratio.
///
/// - `Ignore`: use both as given, distorting if needed
/// - `Width`: honour the width, derive the height
/// - `Height`: honour the height, derive the width
/// - `Fit`: largest size that fits inside the box
/// - `Cover`: smallest size that covers the box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proportions {
    #[default]
    Ignore,
    Width,
    Height,
    Fit,
    Cover,
}

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    pub fn is_transparent(self) -> bool {
        self.0[3] == 0
    }
}

const NAMED_COLORS: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("gray", [128, 128, 128, 255]),
    ("grey", [128, 128, 128, 255]),
    ("transparent", [0, 0, 0, 0]),
];

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let byte = |i: usize| {
                hex.get(i..i + 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("invalid color '{s}'"))
            };
            return match hex.len() {
                6 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, 255])),
                8 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
                _ => Err(format!("invalid color '{s}', expected #rrggbb or #rrggbbaa")),
            };
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, rgba)| Color(*rgba))
            .ok_or_else(|| format!("unknown color '{s}'"))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        let [r, g, b, a] = c.0;
        if a == 255 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}
