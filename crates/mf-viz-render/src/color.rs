use serde::{Deserialize, Serialize};
use std::fmt;

/// RGBA color; channels are 8-bit, alpha is `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rrggbb` (leading `#` optional). Malformed channels read as 0.
    pub fn hex(s: &str) -> Self {
        let s = s.strip_prefix('#').unwrap_or(s);
        let channel = |i: usize| s.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());
        Self {
            r: channel(0).unwrap_or(0),
            g: channel(2).unwrap_or(0),
            b: channel(4).unwrap_or(0),
            a: 1.0,
        }
    }

    /// Standard drawing colors by name (`kBlue`, `kRed`, ... style, without the prefix).
    pub fn named(name: &str) -> Option<Self> {
        let c = match name.trim().to_ascii_lowercase().trim_start_matches('k') {
            "black" => Self::rgb(0, 0, 0),
            "white" => Self::rgb(255, 255, 255),
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 160, 0),
            "blue" => Self::rgb(0, 0, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "magenta" => Self::rgb(255, 0, 255),
            "cyan" => Self::rgb(0, 255, 255),
            "orange" => Self::rgb(255, 128, 0),
            "violet" => Self::rgb(204, 0, 255),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            _ => return None,
        };
        Some(c)
    }

    /// Named color or `#rrggbb`.
    pub fn parse(s: &str) -> Self {
        Self::named(s).unwrap_or_else(|| Self::hex(s))
    }

    pub const fn with_alpha(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    pub fn to_svg_fill(&self) -> String {
        if (self.a - 1.0).abs() < 1e-6 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{:.3})", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_svg_fill())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Color::parse(&s))
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let c = Color::hex("#1D4ED8");
        assert_eq!((c.r, c.g, c.b), (0x1D, 0x4E, 0xD8));
        assert!((c.a - 1.0).abs() < 1e-9);
        // Short strings do not panic.
        assert_eq!(Color::hex("#ab"), Color::rgb(0xab, 0, 0));
    }

    #[test]
    fn named_colors() {
        assert_eq!(Color::named("blue"), Some(Color::rgb(0, 0, 255)));
        assert_eq!(Color::named("kRed"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("Violet"), Color::rgb(204, 0, 255));
        assert_eq!(Color::parse("#00ff00"), Color::rgb(0, 255, 0));
        assert!(Color::named("chartreuse-ish").is_none());
    }

    #[test]
    fn svg_fill_alpha() {
        assert_eq!(Color::rgb(29, 78, 216).to_svg_fill(), "#1d4ed8");
        assert_eq!(Color::rgb(29, 78, 216).with_alpha(0.5).to_svg_fill(), "rgba(29,78,216,0.500)");
    }
}
