//! Route colors
//!
//! Colors arrive as CSS strings in the datasets. When a route has no usable color
//! anywhere, a hue is derived from its id so the same id always gets the same
//! color, across reloads and without any shared palette state.

use palette::{FromColor, Hsl, Srgb};
use std::fmt;

/// An opaque sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from `#rrggbb` or `#rgb`, used for the built-in palette constants
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#')?;
        match digits.len() {
            6 => {
                let value = u32::from_str_radix(digits, 16).ok()?;
                Some(Self::new(
                    (value >> 16) as u8,
                    (value >> 8) as u8,
                    value as u8,
                ))
            }
            3 => {
                let value = u16::from_str_radix(digits, 16).ok()?;
                let expand = |nibble: u16| (nibble as u8 & 0xf) * 17;
                Some(Self::new(
                    expand(value >> 8),
                    expand(value >> 4),
                    expand(value),
                ))
            }
            _ => None,
        }
    }

    /// Convert an HSL triple (hue in degrees, saturation and lightness in 0..=1)
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let hsl: Hsl = Hsl::new(hue, saturation.clamp(0.0, 1.0), lightness.clamp(0.0, 1.0));
        let rgb: Srgb<u8> = Srgb::<f32>::from_color(hsl).into_format();
        Self::new(rgb.red, rgb.green, rgb.blue)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 128, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("orange", Rgb::new(255, 165, 0)),
    ("orangered", Rgb::new(255, 69, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("gray", Rgb::new(128, 128, 128)),
    ("grey", Rgb::new(128, 128, 128)),
    ("brown", Rgb::new(165, 42, 42)),
    ("navy", Rgb::new(0, 0, 128)),
    ("teal", Rgb::new(0, 128, 128)),
    ("maroon", Rgb::new(128, 0, 0)),
    ("olive", Rgb::new(128, 128, 0)),
    ("lime", Rgb::new(0, 255, 0)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("pink", Rgb::new(255, 192, 203)),
];

/// Parse a CSS color string
///
/// Accepts `#rgb`, `#rrggbb`, `rgb(r, g, b)`, `hsl(h, s%, l%)` and basic color
/// names. Anything else is `None`, letting the caller fall through to the next
/// color source.
pub fn parse_css(value: &str) -> Option<Rgb> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with('#') {
        return Rgb::from_hex(value);
    }

    let lower = value.to_lowercase();
    if let Some(args) = function_args(&lower, "rgb") {
        let parts = split_args(args);
        if parts.len() != 3 {
            return None;
        }
        let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
        return Some(Rgb::new(
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
        ));
    }
    if let Some(args) = function_args(&lower, "hsl") {
        let parts = split_args(args);
        if parts.len() != 3 {
            return None;
        }
        let hue = parts[0].trim_end_matches("deg").parse::<f32>().ok()?;
        let percent = |s: &str| s.trim_end_matches('%').parse::<f32>().ok().map(|v| v / 100.0);
        return Some(Rgb::from_hsl(hue, percent(parts[1])?, percent(parts[2])?));
    }

    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgb)| *rgb)
}

fn function_args<'a>(value: &'a str, name: &str) -> Option<&'a str> {
    let rest = value.strip_prefix(name)?;
    let rest = rest.strip_prefix('a').unwrap_or(rest);
    rest.trim().strip_prefix('(')?.strip_suffix(')')
}

fn split_args(args: &str) -> Vec<&str> {
    args.split([',', ' ', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(3)
        .collect()
}

/// Deterministic hue in `0..360` derived from a seed string
///
/// Folds `h = h * 31 + unit` (wrapping at 32 bits) over the UTF-16 code units.
pub fn hash_hue(seed: &str) -> u32 {
    let hash = seed
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as u32));
    hash % 360
}

/// Color for a route with no color data anywhere: `hsl(hue, 85%, 45%)`
pub fn hashed_color(seed: &str) -> Rgb {
    Rgb::from_hsl(hash_hue(seed) as f32, 0.85, 0.45)
}

/// Resolve a route color by precedence: explicit > system default > id hash
pub fn resolve(explicit: Option<&str>, system_default: Option<Rgb>, seed: &str) -> Rgb {
    explicit
        .and_then(parse_css)
        .or(system_default)
        .unwrap_or_else(|| hashed_color(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_css("#FF4500"), Some(Rgb::new(255, 69, 0)));
        assert_eq!(parse_css("#fc0"), Some(Rgb::new(255, 204, 0)));
        assert_eq!(parse_css("#12345"), None);
        assert_eq!(parse_css("#gggggg"), None);
    }

    #[test]
    fn test_parse_functions_and_names() {
        assert_eq!(parse_css("rgb(10, 20, 30)"), Some(Rgb::new(10, 20, 30)));
        assert_eq!(parse_css("hsl(0, 100%, 50%)"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(parse_css("Navy"), Some(Rgb::new(0, 0, 128)));
        assert_eq!(parse_css("not-a-color"), None);
        assert_eq!(parse_css(""), None);
    }

    #[test]
    fn test_hash_hue_known_values() {
        // "A" = 65
        assert_eq!(hash_hue("A"), 65);
        // "AB" = 65 * 31 + 66 = 2081, 2081 % 360 = 281
        assert_eq!(hash_hue("AB"), 281);
        assert_eq!(hash_hue(""), 0);
    }

    #[test]
    fn test_hashed_color_deterministic() {
        for id in ["1244", "AN-05", "Línea 2", "corr:209"] {
            assert_eq!(hashed_color(id), hashed_color(id));
        }
        assert_ne!(hashed_color("A"), hashed_color("AB"));
    }

    #[test]
    fn test_resolve_precedence() {
        let default = Some(Rgb::new(1, 2, 3));
        assert_eq!(
            resolve(Some("#000000"), default, "X"),
            Rgb::new(0, 0, 0),
            "explicit color wins"
        );
        assert_eq!(resolve(Some("bogus"), default, "X"), Rgb::new(1, 2, 3));
        assert_eq!(resolve(None, None, "X"), hashed_color("X"));
    }

    #[test]
    fn test_hex_roundtrip_formatting() {
        assert_eq!(Rgb::new(14, 165, 233).to_hex(), "#0ea5e9");
        assert_eq!(Rgb::new(255, 0, 0).to_string(), "#ff0000");
    }
}
