//! Hex color parsing and the pink classifier

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Calibrated against swatches the catalog uses for pink products
// (#FFC0CB pink, #FFB6C1 light pink, #FF69B4 hot pink) and the colors that
// must stay out (#FF0000 red, #FA8072 salmon, #FF00FF magenta, greys).

/// Red must reach at least this value
pub const PINK_MIN_RED: u8 = 200;

/// Green floor; below it the color reads as plain red or magenta
pub const PINK_MIN_GREEN: u8 = 60;

/// Red has to exceed green by at least this much
pub const PINK_MIN_RED_OVER_GREEN: u8 = 30;

/// Blue must reach at least this value
pub const PINK_MIN_BLUE: u8 = 120;

/// Blue may trail red by at most this much (blue above red is fine)
pub const PINK_MAX_RED_OVER_BLUE: u8 = 100;

/// Channels spanning no more than this are grey or white
pub const GREY_TOLERANCE: u8 = 24;

/// Why a string is not a color
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseColorError {
    /// Nothing to parse
    #[error("empty color value")]
    Empty,

    /// Not six digits after the optional `#`
    #[error("expected 6 hex digits, found {0} characters")]
    Length(usize),

    /// Non-hex character
    #[error("invalid hex digit in '{0}'")]
    Digit(String),
}

/// An sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// Build a color from components
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Whether the color falls in the pink band
    pub fn is_pink(&self) -> bool {
        let Rgb { r, g, b } = *self;
        let spread = r.max(g).max(b) - r.min(g).min(b);

        r >= PINK_MIN_RED
            && g >= PINK_MIN_GREEN
            && r.saturating_sub(g) >= PINK_MIN_RED_OVER_GREEN
            && b >= PINK_MIN_BLUE
            && b >= g
            && r.saturating_sub(b) <= PINK_MAX_RED_OVER_BLUE
            && spread > GREY_TOLERANCE
    }
}

impl FromStr for Rgb {
    type Err = ParseColorError;

    /// Parses `#RRGGBB` or `RRGGBB`, any case, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseColorError::Empty);
        }
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.chars().count() != 6 {
            return Err(ParseColorError::Length(digits.chars().count()));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseColorError::Digit(trimmed.to_string()));
        }

        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
        match (channel(0), channel(2), channel(4)) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Rgb { r, g, b }),
            _ => Err(ParseColorError::Digit(trimmed.to_string())),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Result of classifying a color value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorClass {
    /// Inside the pink band
    Pink,
    /// A valid color outside the band
    NotPink,
    /// Missing or unparseable value
    NotApplicable,
}

impl ColorClass {
    /// Label used in reports and CSV output
    pub fn as_str(self) -> &'static str {
        match self {
            ColorClass::Pink => "pink",
            ColorClass::NotPink => "not_pink",
            ColorClass::NotApplicable => "not_applicable",
        }
    }
}

impl fmt::Display for ColorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a raw color value
pub fn classify(value: Option<&str>) -> (ColorClass, Result<Rgb, ParseColorError>) {
    let parsed = value.unwrap_or_default().parse::<Rgb>();
    let class = match &parsed {
        Ok(rgb) if rgb.is_pink() => ColorClass::Pink,
        Ok(_) => ColorClass::NotPink,
        Err(_) => ColorClass::NotApplicable,
    };
    (class, parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("#FF0000", ColorClass::NotPink)]
    #[case("#FFFFFF", ColorClass::NotPink)]
    #[case("#000000", ColorClass::NotPink)]
    #[case("#FF69B4", ColorClass::Pink)]
    #[case("#FFC0CB", ColorClass::Pink)]
    #[case("#ffb6c1", ColorClass::Pink)]
    #[case("FFC0CB", ColorClass::Pink)]
    #[case("#FA8072", ColorClass::NotPink)]
    #[case("#FF00FF", ColorClass::NotPink)]
    #[case("#808080", ColorClass::NotPink)]
    #[case("#F0E6EA", ColorClass::NotPink)]
    #[case("#0000FF", ColorClass::NotPink)]
    #[case("notacolor", ColorClass::NotApplicable)]
    #[case("", ColorClass::NotApplicable)]
    #[case("#FFF", ColorClass::NotApplicable)]
    #[case("#GGGGGG", ColorClass::NotApplicable)]
    fn test_classify(#[case] value: &str, #[case] expected: ColorClass) {
        assert_eq!(classify(Some(value)).0, expected);
    }

    #[test]
    fn test_missing_value_is_not_applicable() {
        let (class, parsed) = classify(None);
        assert_eq!(class, ColorClass::NotApplicable);
        assert_eq!(parsed, Err(ParseColorError::Empty));
    }

    #[rstest]
    // red floor and red/green margin
    #[case(Rgb::new(PINK_MIN_RED, 150, 180), true)]
    #[case(Rgb::new(PINK_MIN_RED - 1, 150, 180), false)]
    #[case(Rgb::new(255, PINK_MIN_GREEN, 180), true)]
    #[case(Rgb::new(255, PINK_MIN_GREEN - 1, 180), false)]
    #[case(Rgb::new(230, 230 - PINK_MIN_RED_OVER_GREEN, 240), true)]
    #[case(Rgb::new(230, 230 - PINK_MIN_RED_OVER_GREEN + 1, 240), false)]
    // blue floor and blue/red distance
    #[case(Rgb::new(210, 100, PINK_MIN_BLUE), true)]
    #[case(Rgb::new(210, 100, PINK_MIN_BLUE - 1), false)]
    #[case(Rgb::new(240, 100, 240 - PINK_MAX_RED_OVER_BLUE), true)]
    #[case(Rgb::new(240, 100, 240 - PINK_MAX_RED_OVER_BLUE - 1), false)]
    // blue may not sit under green (coral, salmon)
    #[case(Rgb::new(255, 160, 159), false)]
    fn test_pink_boundaries(#[case] rgb: Rgb, #[case] pink: bool) {
        assert_eq!(rgb.is_pink(), pink, "{}", rgb);
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trims() {
        let rgb: Rgb = "  #ff69B4 ".parse().unwrap();
        assert_eq!(rgb, Rgb::new(255, 105, 180));
        assert_eq!(rgb.to_string(), "#FF69B4");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("#12345".parse::<Rgb>(), Err(ParseColorError::Length(5)));
        assert!(matches!(
            "#12345Z".parse::<Rgb>(),
            Err(ParseColorError::Digit(_))
        ));
        assert!(matches!("ééé".parse::<Rgb>(), Err(ParseColorError::Length(3))));
    }
}
