use serde::{Deserialize, Serialize};

/// Color representation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_hex()
    }
}

impl Color {
    /// White color: `#FFFFFFFF`
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Black color: `#000000FF`
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Converts the color into u8 array (RGBA).
    pub fn to_u8_array(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Converts the color into HEX8 string: `#RRGGBBAA`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    /// Parses a color from the hex string. Hex string can be HEX3 (`#RGB`), HEX6 (`#RRGGBB`) or
    /// HEX8 (`#RRGGBBAA`).
    pub fn try_from_hex(hex_string: &str) -> Option<Self> {
        let digits = hex_string.strip_prefix('#')?;
        if !digits.is_ascii() {
            return None;
        }

        match digits.len() {
            3 => {
                let channel = |i: usize| {
                    u8::from_str_radix(&digits[i..i + 1], 16)
                        .ok()
                        .map(|v| v * 17)
                };
                Some(Self::rgba(channel(0)?, channel(1)?, channel(2)?, 255))
            }
            6 | 8 => {
                let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
                let a = if digits.len() == 8 { channel(6)? } else { 255 };
                Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
            }
            _ => None,
        }
    }

    /// Linearly interpolates between `self` (`k = 0`) and `other` (`k = 1`) channel by channel.
    pub fn lerp(&self, other: Color, k: f64) -> Color {
        let k = k.clamp(0.0, 1.0);
        let mix = |from: u8, to: u8| (from as f64 + (to as f64 - from as f64) * k).round() as u8;

        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }

    /// Returns `steps` colors evenly spread from `start` to `end`, both ends included.
    pub fn gradient(start: Color, end: Color, steps: usize) -> Vec<Color> {
        match steps {
            0 => vec![],
            1 => vec![start],
            _ => (0..steps)
                .map(|i| start.lerp(end, i as f64 / (steps - 1) as f64))
                .collect(),
        }
    }

    /// Red component of the color in RGBA space.
    pub fn r(&self) -> u8 {
        self.r
    }

    /// Green component of the color in RGBA space.
    pub fn g(&self) -> u8 {
        self.g
    }

    /// Blue component of the color in RGBA space.
    pub fn b(&self) -> u8 {
        self.b
    }

    /// Opacity component of the color.
    pub fn a(&self) -> u8 {
        self.a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_serialization() {
        let hex = "#FF1000AA";
        let color = Color::try_from_hex(hex).unwrap();
        assert_eq!(&color.to_hex(), hex);

        let json = serde_json::to_string(&color).unwrap();
        assert_eq!(json, "\"#FF1000AA\"");
        assert_eq!(serde_json::from_str::<Color>(&json).unwrap(), color);
    }

    #[test]
    fn parses_short_and_lowercase_hex() {
        assert_eq!(Color::try_from_hex("#fff"), Some(Color::WHITE));
        assert_eq!(
            Color::try_from_hex("#c87a74"),
            Some(Color::rgba(0xc8, 0x7a, 0x74, 255))
        );
        assert_eq!(Color::try_from_hex("c87a74"), None);
        assert_eq!(Color::try_from_hex("#c87a7"), None);
        assert_eq!(Color::try_from_hex("#zzzzzz"), None);
    }

    #[test]
    fn gradient_includes_both_ends() {
        let steps = Color::gradient(Color::BLACK, Color::WHITE, 21);
        assert_eq!(steps.len(), 21);
        assert_eq!(steps[0], Color::BLACK);
        assert_eq!(steps[20], Color::WHITE);
        assert_eq!(steps[10], Color::rgba(128, 128, 128, 255));
    }

    #[test]
    fn gradient_of_same_color_is_flat() {
        let red = Color::rgba(255, 0, 0, 255);
        assert!(Color::gradient(red, red, 5).iter().all(|c| *c == red));
        assert_eq!(Color::gradient(red, Color::WHITE, 1), vec![red]);
        assert!(Color::gradient(red, Color::WHITE, 0).is_empty());
    }
}
