//! Entity colors.
//!
//! Colors are plain sRGB bytes, serialized as `#RRGGBB` strings both on the
//! wire and in the store. Offspring colors are blended in HSL space so hue
//! survives the mix instead of muddying toward brown.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses a `#RRGGBB` string. Leading `#` is required.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
        let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
        let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Converts to HSL, hue in degrees, saturation and lightness in `[0, 1]`.
    pub fn to_hsl(self) -> (f32, f32, f32) {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let delta = max - min;
        if delta < f32::EPSILON {
            return (0.0, 0.0, l);
        }
        let s = delta / (1.0 - (2.0 * l - 1.0).abs());
        let h = if (max - r).abs() < f32::EPSILON {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if (max - g).abs() < f32::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        (h.rem_euclid(360.0), s, l)
    }

    /// Builds a color from HSL components. Hue wraps, saturation and
    /// lightness clamp.
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
        let m = l - c / 2.0;
        let (r, g, b) = match h {
            h if h < 60.0 => (c, x, 0.0),
            h if h < 120.0 => (x, c, 0.0),
            h if h < 180.0 => (0.0, c, x),
            h if h < 240.0 => (0.0, x, c),
            h if h < 300.0 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        Self {
            r: ((r + m) * 255.0).round() as u8,
            g: ((g + m) * 255.0).round() as u8,
            b: ((b + m) * 255.0).round() as u8,
        }
    }

    /// Offspring color: HSL midpoint of the parents with a small jitter.
    ///
    /// Hue is averaged along the shorter arc and nudged up to five degrees;
    /// saturation and lightness are kept vivid so lineages stay readable
    /// against the food layer.
    pub fn blend_offspring(a: Color, b: Color, rng: &mut impl Rng) -> Color {
        let (ha, sa, la) = a.to_hsl();
        let (hb, sb, lb) = b.to_hsl();
        let arc = ((hb - ha + 540.0).rem_euclid(360.0)) - 180.0;
        let hue = (ha + arc / 2.0).rem_euclid(360.0) + rng.gen_range(-5.0..=5.0);
        let sat = ((sa + sb) / 2.0 + rng.gen_range(-0.1..=0.1)).clamp(0.75, 1.0);
        let light = ((la + lb) / 2.0 + rng.gen_range(-0.1..=0.1)).clamp(0.35, 0.65);
        Color::from_hsl(hue, sat, light)
    }

    /// Random vivid color for a first-generation spawn.
    pub fn random_vivid(rng: &mut impl Rng) -> Color {
        Color::from_hsl(
            rng.gen_range(0.0..360.0),
            rng.gen_range(0.75..=1.0),
            rng.gen_range(0.35..=0.65),
        )
    }

    /// Linear fade toward the color's own gray level. `frac` of zero is the
    /// original color, one is fully desaturated.
    pub fn fade_to_gray(self, frac: f32) -> Color {
        let frac = frac.clamp(0.0, 1.0);
        let gray = (0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32)
            .round()
            .clamp(0.0, 255.0);
        let mix = |c: u8| (c as f32 + (gray - c as f32) * frac).round() as u8;
        Color {
            r: mix(self.r),
            g: mix(self.g),
            b: mix(self.b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn hex_round_trip() {
        let c = Color::rgb(220, 20, 60);
        assert_eq!(c.to_hex(), "#DC143C");
        assert_eq!(Color::from_hex("#DC143C"), Some(c));
        assert_eq!(Color::from_hex("#dc143c"), Some(c));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(Color::from_hex("DC143C"), None);
        assert_eq!(Color::from_hex("#DC143"), None);
        assert_eq!(Color::from_hex("#GG143C"), None);
        assert_eq!(Color::from_hex(""), None);
    }

    #[test]
    fn hsl_round_trip_is_close() {
        for c in [
            Color::rgb(255, 0, 0),
            Color::rgb(0, 128, 255),
            Color::rgb(90, 200, 60),
        ] {
            let (h, s, l) = c.to_hsl();
            let back = Color::from_hsl(h, s, l);
            assert!((back.r as i16 - c.r as i16).abs() <= 2, "{c:?} vs {back:?}");
            assert!((back.g as i16 - c.g as i16).abs() <= 2);
            assert!((back.b as i16 - c.b as i16).abs() <= 2);
        }
    }

    #[test]
    fn offspring_blend_stays_vivid() {
        let mut rng = SmallRng::seed_from_u64(9);
        let a = Color::from_hsl(10.0, 0.9, 0.5);
        let b = Color::from_hsl(50.0, 0.8, 0.5);
        for _ in 0..50 {
            let child = Color::blend_offspring(a, b, &mut rng);
            let (_, s, l) = child.to_hsl();
            assert!(s >= 0.70, "saturation drifted low: {s}");
            assert!((0.30..=0.70).contains(&l), "lightness drifted: {l}");
        }
    }

    #[test]
    fn full_fade_is_gray() {
        let faded = Color::rgb(200, 40, 40).fade_to_gray(1.0);
        assert_eq!(faded.r, faded.g);
        assert_eq!(faded.g, faded.b);
        let untouched = Color::rgb(200, 40, 40).fade_to_gray(0.0);
        assert_eq!(untouched, Color::rgb(200, 40, 40));
    }
}
