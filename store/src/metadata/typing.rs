//! Typed value detection for a `set` operation (§4.5).
//!
//! A caller-supplied value is always stored as text; it additionally gets
//! a numeric twin when the input is an unambiguous, canonical decimal
//! literal — i.e. re-stringifying the parsed float reproduces the input
//! exactly, so the numeric form loses no information the caller didn't
//! already express.

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Numeric { text: String, num: f64 },
    Text(String),
}

pub fn detect(input: &str) -> TypedValue {
    if is_canonical_decimal(input) {
        if let Ok(num) = input.parse::<f64>() {
            if canonical_float_string(num) == input {
                return TypedValue::Numeric {
                    text: input.to_string(),
                    num,
                };
            }
        }
    }
    TypedValue::Text(input.to_string())
}

fn is_canonical_decimal(input: &str) -> bool {
    if input == "true" || input == "false" {
        return false;
    }
    if input.contains(['e', 'E']) {
        return false;
    }

    let unsigned = input.strip_prefix('-').unwrap_or(input);
    if unsigned.is_empty() {
        return false;
    }

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return false;
    }

    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if frac.ends_with('0') {
            return false;
        }
    }

    true
}

fn canonical_float_string(num: f64) -> String {
    if num.fract() == 0.0 && num.abs() < 1e15 {
        format!("{}", num as i64)
    } else {
        let s = format!("{num}");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integer_is_numeric() {
        assert_eq!(
            detect("123"),
            TypedValue::Numeric {
                text: "123".to_string(),
                num: 123.0
            }
        );
    }

    #[test]
    fn leading_zero_stays_text() {
        assert_eq!(detect("00123"), TypedValue::Text("00123".to_string()));
    }

    #[test]
    fn trailing_decimal_zero_stays_text() {
        assert_eq!(detect("1.0"), TypedValue::Text("1.0".to_string()));
    }

    #[test]
    fn scientific_notation_stays_text() {
        assert_eq!(detect("1e10"), TypedValue::Text("1e10".to_string()));
    }

    #[test]
    fn booleans_stay_text() {
        assert_eq!(detect("true"), TypedValue::Text("true".to_string()));
        assert_eq!(detect("false"), TypedValue::Text("false".to_string()));
    }

    #[test]
    fn negative_decimal_is_numeric() {
        assert_eq!(
            detect("-12.5"),
            TypedValue::Numeric {
                text: "-12.5".to_string(),
                num: -12.5
            }
        );
    }

    #[test]
    fn arbitrary_string_stays_text() {
        assert_eq!(detect("hello"), TypedValue::Text("hello".to_string()));
    }

    #[test]
    fn empty_string_is_text_not_numeric() {
        assert_eq!(detect(""), TypedValue::Text(String::new()));
    }
}
