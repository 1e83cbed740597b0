//! printf-style rendering of item values for the FORMATTED representation.
//!
//! Supported conversions: `%d %i %u %x %X %o %b %f %e %E %g %G %s %%`, with the
//! flags `- + space 0 #`, a field width and a precision.

use std::iter::Peekable;
use std::str::Chars;

use groundlink_codec::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The format ends in the middle of a conversion specification.
    #[error("format {0:?} ends inside a conversion")]
    Incomplete(String),

    /// The conversion character is not supported.
    #[error("format {format:?} uses unsupported conversion %{conversion}")]
    Unsupported { format: String, conversion: char },

    /// A field width or precision is larger than [`MAX_FIELD`].
    #[error("format {0:?} has a width or precision above {max}", max = MAX_FIELD)]
    FieldTooWide(String),

    /// The value cannot be rendered by this conversion.
    #[error("%{conversion} cannot format a {kind} value")]
    Mismatch {
        conversion: char,
        kind: &'static str,
    },
}

/// Largest accepted field width or precision.
pub const MAX_FIELD: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

/// Render `value` through `format`. Every conversion in the format renders the same value.
pub fn format_value(format: &str, value: &Value) -> Result<String, FormatError> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = field(&mut chars, format)?;
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(field(&mut chars, format)?);
        }

        let conversion = chars
            .next()
            .ok_or_else(|| FormatError::Incomplete(format.to_string()))?;
        let rendered = match conversion {
            '%' => "%".to_string(),
            'd' | 'i' | 'u' => integer(value, conversion, &spec, 10)?,
            'x' | 'X' => integer(value, conversion, &spec, 16)?,
            'o' => integer(value, conversion, &spec, 8)?,
            'b' => integer(value, conversion, &spec, 2)?,
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => float(value, conversion, &spec)?,
            's' => {
                let text = value.to_string();
                let text = match spec.precision {
                    Some(limit) => text.chars().take(limit).collect(),
                    None => text,
                };
                pad(String::new(), text, &Spec { zero: false, ..spec })
            }
            other => {
                return Err(FormatError::Unsupported {
                    format: format.to_string(),
                    conversion: other,
                })
            }
        };
        out.push_str(&rendered);
    }

    Ok(out)
}

/// Decimal width or precision; zero when no digits follow.
fn field(chars: &mut Peekable<Chars<'_>>, format: &str) -> Result<usize, FormatError> {
    let mut number = 0usize;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = number * 10 + digit as usize;
        if number > MAX_FIELD {
            return Err(FormatError::FieldTooWide(format.to_string()));
        }
        chars.next();
    }
    Ok(number)
}

fn integer(value: &Value, conversion: char, spec: &Spec, radix: u32) -> Result<String, FormatError> {
    let number = match value {
        Value::Float(v) if v.is_finite() => v.trunc() as i128,
        other => other.as_i128().ok_or(FormatError::Mismatch {
            conversion,
            kind: other.kind(),
        })?,
    };

    let magnitude = number.unsigned_abs();
    let mut digits = match radix {
        16 if conversion == 'X' => format!("{magnitude:X}"),
        16 => format!("{magnitude:x}"),
        8 => format!("{magnitude:o}"),
        2 => format!("{magnitude:b}"),
        _ => magnitude.to_string(),
    };
    if let Some(precision) = spec.precision {
        while digits.len() < precision {
            digits.insert(0, '0');
        }
    }

    let mut prefix = sign(number < 0, spec);
    if spec.alternate && magnitude != 0 {
        match (radix, conversion) {
            (16, 'X') => prefix.push_str("0X"),
            (16, _) => prefix.push_str("0x"),
            (8, _) => prefix.push('0'),
            (2, _) => prefix.push_str("0b"),
            _ => {}
        }
    }
    // C ignores the 0 flag when a precision is given for integers.
    let zero = spec.zero && spec.precision.is_none();
    Ok(pad(prefix, digits, &Spec { zero, ..*spec }))
}

fn float(value: &Value, conversion: char, spec: &Spec) -> Result<String, FormatError> {
    let number = value.as_f64().ok_or(FormatError::Mismatch {
        conversion,
        kind: value.kind(),
    })?;
    let precision = spec.precision.unwrap_or(6);
    let prefix = sign(number.is_sign_negative() && number != 0.0, spec);
    let magnitude = number.abs();

    if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "NaN" } else { "Inf" };
        return Ok(pad(prefix, text.to_string(), &Spec { zero: false, ..*spec }));
    }

    let body = match conversion {
        'f' | 'F' => format!("{magnitude:.precision$}"),
        'e' => exponential(magnitude, precision, false),
        'E' => exponential(magnitude, precision, true),
        _ => general(magnitude, precision, conversion == 'G', spec.alternate),
    };
    Ok(pad(prefix, body, spec))
}

/// C-style `%e`: mantissa, `e`, sign, at least two exponent digits.
fn exponential(magnitude: f64, precision: usize, upper: bool) -> String {
    let rendered = format!("{magnitude:.precision$e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let marker = if upper { 'E' } else { 'e' };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}{marker}{sign}{:02}", exponent.abs())
}

/// C-style `%g`: shortest of `%e`/`%f` at the given significant digits,
/// trailing zeros removed unless `#` is set.
fn general(magnitude: f64, precision: usize, upper: bool, alternate: bool) -> String {
    let significant = precision.max(1);
    let exponent = if magnitude == 0.0 {
        0
    } else {
        // Exponent after rounding to the requested significant digits.
        let rendered = format!("{magnitude:.prec$e}", prec = significant - 1);
        rendered
            .split_once('e')
            .and_then(|(_, exp)| exp.parse::<i32>().ok())
            .unwrap_or(0)
    };

    let body = if exponent < -4 || exponent >= significant as i32 {
        exponential(magnitude, significant - 1, upper)
    } else {
        let decimals = (significant as i32 - 1 - exponent).max(0) as usize;
        format!("{magnitude:.decimals$}")
    };

    if alternate {
        return body;
    }
    match body.find(['e', 'E']) {
        Some(split) => {
            let (mantissa, exponent) = body.split_at(split);
            format!("{}{exponent}", trim_fraction(mantissa))
        }
        None => trim_fraction(&body).to_string(),
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn sign(negative: bool, spec: &Spec) -> String {
    if negative {
        "-".to_string()
    } else if spec.plus {
        "+".to_string()
    } else if spec.space {
        " ".to_string()
    } else {
        String::new()
    }
}

fn pad(prefix: String, body: String, spec: &Spec) -> String {
    let len = prefix.chars().count() + body.chars().count();
    if len >= spec.width {
        return prefix + &body;
    }
    let fill = spec.width - len;
    if spec.left {
        format!("{prefix}{body}{}", " ".repeat(fill))
    } else if spec.zero {
        format!("{prefix}{}{body}", "0".repeat(fill))
    } else {
        format!("{}{prefix}{body}", " ".repeat(fill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, value: impl Into<Value>) -> String {
        format_value(format, &value.into()).unwrap()
    }

    #[test]
    fn integers() {
        assert_eq!(fmt("%d", 42i64), "42");
        assert_eq!(fmt("%5d|", -42i64), "  -42|");
        assert_eq!(fmt("%-5d|", 42i64), "42   |");
        assert_eq!(fmt("%05d", -42i64), "-0042");
        assert_eq!(fmt("%+d", 7i64), "+7");
        assert_eq!(fmt("%.3d", 7i64), "007");
        assert_eq!(fmt("%d", 2.9), "2");
    }

    #[test]
    fn radix_conversions() {
        assert_eq!(fmt("0x%04X", 0xBEEFu64), "0xBEEF");
        assert_eq!(fmt("%#x", 255u64), "0xff");
        assert_eq!(fmt("%o", 8u64), "10");
        assert_eq!(fmt("%08b", 5u64), "00000101");
    }

    #[test]
    fn floats() {
        assert_eq!(fmt("%.2f", 3.14159), "3.14");
        assert_eq!(fmt("%8.3f", -1.5), "  -1.500");
        assert_eq!(fmt("%f", 1.0), "1.000000");
        assert_eq!(fmt("%e", 12345.678), "1.234568e+04");
        assert_eq!(fmt("%.2E", 0.000123), "1.23E-04");
        assert_eq!(fmt("%g", 0.0001), "0.0001");
        assert_eq!(fmt("%g", 123456789.0), "1.23457e+08");
        assert_eq!(fmt("%g", 100.0), "100");
        assert_eq!(fmt("%.3f V", 12u64), "12.000 V");
    }

    #[test]
    fn strings_and_literals() {
        assert_eq!(fmt("[%s]", "abc"), "[abc]");
        assert_eq!(fmt("[%6s]", "abc"), "[   abc]");
        assert_eq!(fmt("[%.2s]", "abc"), "[ab]");
        assert_eq!(fmt("100%%", 1u64), "100%");
        assert_eq!(fmt("no conversions", 1u64), "no conversions");
    }

    #[test]
    fn errors() {
        assert_eq!(
            format_value("%", &Value::Uint(1)),
            Err(FormatError::Incomplete("%".to_string()))
        );
        assert!(matches!(
            format_value("%q", &Value::Uint(1)),
            Err(FormatError::Unsupported { conversion: 'q', .. })
        ));
        assert!(matches!(
            format_value("%d", &Value::from("text")),
            Err(FormatError::Mismatch { conversion: 'd', .. })
        ));
    }

    #[test]
    fn oversized_fields_are_rejected() {
        for format in ["%99999999999999999999d", "%.99999999999999999999f", "%1025s"] {
            assert_eq!(
                format_value(format, &Value::Uint(1)),
                Err(FormatError::FieldTooWide(format.to_string()))
            );
        }
        assert_eq!(fmt("%1024d", 7u64).len(), MAX_FIELD);
    }
}
