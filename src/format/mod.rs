//! Number formatting under `@%`
//!
//! `@%` packs a print format into four bytes, `&WWXXYYZZ`:
//!
//! * `ZZ` field width used to right-justify numbers and for `,` tabulation
//! * `YY` digit count; 0 selects the default of ten for G and E
//! * `XX` bits 0-1 pick the style (0 G, 1 E, 2 F), bits 4-5 the width the
//!   exponent is padded to, bit 7 prints a comma for the decimal point
//! * `WW` bit 0 makes `STR$` honour `@%`
//!
//! The same value can be written as a string such as `"+F10.3"`.

use crate::error::{ErrorKind, Result};
use crate::variables::Number;

/// `STR$` follows `@%` when this bit is set
pub const STRUSE: i32 = 0x0100_0000;
/// Print a comma instead of a decimal point
pub const COMMADPT: i32 = 0x0080_0000;
/// `@%` after start-up: G format, nine digits, width ten
pub const DEFAULT_FORMAT: i32 = 0x0000_090A;
/// Significant digits when `YY` is zero
pub const DEFDIGITS: usize = 10;
/// Most digits a format may ask for
pub const MAX_DIGITS: usize = 19;

/// The three numeric styles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    General,
    Exponent,
    Fixed,
}

/// An unpacked `@%` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub style: Style,
    /// Raw digit count, 0 meaning the style's default
    pub digits: usize,
    pub width: usize,
    pub comma: bool,
    /// Characters the exponent after `E` is padded to
    pub exp_pad: usize,
    pub str_use: bool,
}

impl Format {
    pub fn from_word(word: i32) -> Format {
        let xx = (word >> 16) & 0xFF;
        let style = match xx & 3 {
            1 => Style::Exponent,
            2 => Style::Fixed,
            _ => Style::General,
        };
        Format {
            style,
            digits: ((word >> 8) & 0xFF) as usize,
            width: (word & 0xFF) as usize,
            comma: word & COMMADPT != 0,
            exp_pad: ((xx >> 4) & 3) as usize,
            str_use: word & STRUSE != 0,
        }
    }

    pub fn to_word(&self) -> i32 {
        let style = match self.style {
            Style::General => 0,
            Style::Exponent => 1,
            Style::Fixed => 2,
        };
        let mut xx = style | ((self.exp_pad as i32 & 3) << 4);
        if self.comma {
            xx |= 0x80;
        }
        let mut word = (xx << 16) | ((self.digits as i32 & 0xFF) << 8) | (self.width as i32 & 0xFF);
        if self.str_use {
            word |= STRUSE;
        }
        word
    }

    /// Significant digits for G and E, decimal places for F
    fn precision(&self) -> usize {
        match (self.style, self.digits) {
            (Style::Fixed, digits) => digits.min(MAX_DIGITS),
            (_, 0) => DEFDIGITS,
            (_, digits) => digits.min(MAX_DIGITS),
        }
    }
}

/// Read a format string such as `"G10"`, `"F8.3"` or `"+E12,4"`. Fields
/// left out keep their value from `current`.
pub fn parse_format(text: &str, current: i32) -> Result<i32> {
    let mut format = Format::from_word(current);
    let mut rest = text.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        format.str_use = true;
        rest = stripped;
    }
    let mut chars = rest.chars();
    format.style = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('G') => Style::General,
        Some('E') => Style::Exponent,
        Some('F') => Style::Fixed,
        _ => return Err(ErrorKind::Syntax.into()),
    };
    let rest = chars.as_str();
    let (width, digits) = match rest.find(['.', ',']) {
        Some(pos) => {
            format.comma = rest[pos..].starts_with(',');
            (&rest[..pos], Some(&rest[pos + 1..]))
        }
        None => (rest, None),
    };
    if !width.is_empty() {
        format.width = parse_field(width)?;
    }
    if let Some(digits) = digits {
        format.digits = parse_field(digits)?;
        if format.digits > MAX_DIGITS {
            return Err(ErrorKind::NumRange.into());
        }
    }
    Ok(format.to_word())
}

fn parse_field(text: &str) -> Result<usize> {
    match text.parse::<usize>() {
        Ok(value) if value <= 255 => Ok(value),
        Ok(_) => Err(ErrorKind::NumRange.into()),
        Err(_) => Err(ErrorKind::Syntax.into()),
    }
}

/// Write `@%` back as a format string
pub fn describe(word: i32) -> String {
    let format = Format::from_word(word);
    let style = match format.style {
        Style::General => 'G',
        Style::Exponent => 'E',
        Style::Fixed => 'F',
    };
    format!(
        "{}{}{}{}{}",
        if format.str_use { "+" } else { "" },
        style,
        format.width,
        if format.comma { ',' } else { '.' },
        format.digits
    )
}

/// Text of a number under `@%`, without justification
pub fn format_number(word: i32, value: Number) -> String {
    let format = Format::from_word(word);
    let text = match (value, format.style) {
        (Number::Int(v), Style::General) => v.to_string(),
        (Number::Int64(v), Style::General) => v.to_string(),
        _ => format_float(&format, value.to_f64()),
    };
    if format.comma {
        text.replace('.', ",")
    } else {
        text
    }
}

/// `STR$` of a number: `@%` when its STRUSE bit is set, otherwise the
/// general form with ten significant digits
pub fn str_number(word: i32, value: Number) -> String {
    if word & STRUSE != 0 {
        return format_number(word, value);
    }
    match value {
        Number::Int(v) => v.to_string(),
        Number::Int64(v) => v.to_string(),
        Number::Float(v) => general(v, DEFDIGITS),
    }
}

/// Upper-case hexadecimal, as printed by `~` and `STR$~`
pub fn format_hex(value: Number) -> Result<String> {
    let text = match value {
        Number::Int(v) => format!("{:X}", v as u32),
        Number::Int64(v) => match i32::try_from(v) {
            Ok(small) => format!("{:X}", small as u32),
            Err(_) => format!("{:X}", v as u64),
        },
        Number::Float(_) => return format_hex(Number::from_i64(value.to_i64()?)),
    };
    Ok(text)
}

/// Pad `text` on the left to `width` characters
pub fn justify(text: &str, width: usize) -> String {
    format!("{:>width$}", text, width = width)
}

fn format_float(format: &Format, v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let precision = format.precision();
    match format.style {
        Style::General => general(v, precision),
        Style::Exponent => {
            let (mantissa, exponent) = scientific(v, precision);
            exponent_form(&mantissa, exponent, format.exp_pad)
        }
        Style::Fixed => format!("{:.*}", precision, v),
    }
}

/// Round to `digits` significant digits in scientific form, returning the
/// mantissa text and the decimal exponent
fn scientific(v: f64, digits: usize) -> (String, i32) {
    let text = format!("{:.*e}", digits.max(1) - 1, v);
    match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa.to_string(), exponent.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

fn exponent_form(mantissa: &str, exponent: i32, pad: usize) -> String {
    let exp = exponent.to_string();
    format!("{}E{:<pad$}", mantissa, exp, pad = pad)
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// C `%G`: scientific only for very small or very large exponents, and no
/// trailing zeros
fn general(v: f64, digits: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let digits = digits.max(1);
    let (mantissa, exponent) = scientific(v, digits);
    if exponent < -4 || exponent >= digits as i32 {
        return exponent_form(strip_zeros(&mantissa), exponent, 0);
    }
    let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
    strip_zeros(&format!("{:.*}", decimals, v)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn test_default_general_format() {
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(std::f64::consts::PI)), "3.14159265");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Int(11)), "11");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(0.5)), "0.5");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(-2.0)), "-2");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(1e-5)), "1E-5");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(1e10)), "1E10");
        assert_eq!(format_number(DEFAULT_FORMAT, Number::Float(123456789.0)), "123456789");
    }

    #[test]
    fn test_exponent_format() {
        assert_eq!(format_number(0x0001_000A, Number::Float(1e-5)), "1.000000000E-5");
        assert_eq!(format_number(0x0001_020A, Number::Float(1e-5)), "1.0E-5");
        assert_eq!(format_number(0x0001_030A, Number::Float(1234.0)), "1.23E3");
        // exponent padded to two characters
        assert_eq!(format_number(0x0021_030A, Number::Float(1234.0)), "1.23E3 ");
        assert_eq!(format_number(0x0021_030A, Number::Float(0.01)), "1.00E-2");
    }

    #[test]
    fn test_fixed_format_and_comma() {
        assert_eq!(format_number(0x0002_020A, Number::Float(3.14159)), "3.14");
        assert_eq!(format_number(0x0002_020A, Number::Int(3)), "3.00");
        assert_eq!(format_number(0x0082_020A, Number::Float(2.5)), "2,50");
        assert_eq!(format_number(0x0002_000A, Number::Float(2.7)), "3");
    }

    #[test]
    fn test_str_uses_format_only_with_struse() {
        let fixed = 0x0002_020A;
        assert_eq!(str_number(fixed, Number::Float(1.5)), "1.5");
        assert_eq!(str_number(fixed | STRUSE, Number::Float(1.5)), "1.50");
        assert_eq!(str_number(fixed, Number::Float(std::f64::consts::PI)), "3.141592654");
    }

    #[test]
    fn test_hex() {
        assert_eq!(format_hex(Number::Int(255)).unwrap(), "FF");
        assert_eq!(format_hex(Number::Int(-1)).unwrap(), "FFFFFFFF");
        assert_eq!(format_hex(Number::Float(16.9)).unwrap(), "10");
        assert_eq!(format_hex(Number::Int64(1 << 40)).unwrap(), "10000000000");
    }

    #[test]
    fn test_parse_format_strings() {
        assert_eq!(parse_format("F10.3", DEFAULT_FORMAT).unwrap(), 0x0002_030A);
        assert_eq!(parse_format("+G12", DEFAULT_FORMAT).unwrap(), STRUSE | 0x090C);
        assert_eq!(parse_format("E", DEFAULT_FORMAT).unwrap(), 0x0001_090A);
        assert_eq!(parse_format("F8,2", 0).unwrap(), COMMADPT | 0x0002_0208);
        assert!(parse_format("X10", DEFAULT_FORMAT).is_err());
        assert_eq!(describe(0x0002_030A), "F10.3");
        assert_eq!(parse_format(&describe(0x0102_030A), 0).unwrap(), 0x0102_030A);
    }

    #[test]
    fn test_justify() {
        assert_eq!(justify("11", 10), "        11");
        assert_eq!(justify("1.000000000E-5", 10), "1.000000000E-5");
    }

    #[test]
    fn prop_word_round_trips_through_format() {
        fn prop(word: i32) -> TestResult {
            // only the defined bits survive
            let word = word & (STRUSE | COMMADPT | 0x0033_FFFF);
            if (word >> 16) & 3 == 3 {
                return TestResult::discard();
            }
            TestResult::from_bool(Format::from_word(word).to_word() == word)
        }
        QuickCheck::new()
            .tests(10)
            .quickcheck(prop as fn(i32) -> TestResult);
    }

    #[test]
    fn prop_formatting_is_deterministic() {
        fn prop(word: i32, v: f64) -> bool {
            format_number(word, Number::Float(v)) == format_number(word, Number::Float(v))
        }
        QuickCheck::new()
            .tests(10)
            .quickcheck(prop as fn(i32, f64) -> bool);
    }
}
