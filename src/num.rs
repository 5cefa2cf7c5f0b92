//! Numbers are plain machine integers, so most of the work is deciding what
//! happens at the edges of their range.

/// The runtime number representation.
pub type Number = i64;

/// Reads a number literal as scanned by the lexer (`-?[0-9]+`).
///
/// Literals outside the representable range saturate instead of failing.
pub fn parse_literal(literal: &str) -> Number {
    let (is_neg, digits) = match literal.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, literal),
    };

    let mut value: Number = 0;
    for digit in digits.chars().filter_map(|c| c.to_digit(10)) {
        let digit = Number::from(digit);
        // accumulate toward the sign so that i64::MIN is reachable
        let next = value.checked_mul(10).and_then(|v| {
            if is_neg {
                v.checked_sub(digit)
            } else {
                v.checked_add(digit)
            }
        });
        match next {
            Some(next) => value = next,
            None if is_neg => return Number::MIN,
            None => return Number::MAX,
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{parse_literal, Number};
    use arbtest::arbtest;
    use assert2::check;

    #[test]
    fn literals() {
        check!(parse_literal("0") == 0);
        check!(parse_literal("-0") == 0);
        check!(parse_literal("42") == 42);
        check!(parse_literal("-17") == -17);
        check!(parse_literal("007") == 7);
    }

    #[test]
    fn literals_saturate() {
        check!(parse_literal("9223372036854775807") == Number::MAX);
        check!(parse_literal("9223372036854775808") == Number::MAX);
        check!(parse_literal("-9223372036854775808") == Number::MIN);
        check!(parse_literal("-99999999999999999999999") == Number::MIN);
    }

    #[test]
    fn literals_roundtrip() {
        arbtest(|u| {
            let n: Number = u.arbitrary()?;
            check!(parse_literal(&n.to_string()) == n);
            Ok(())
        });
    }
}
