//! Permissive numeric-token matcher for sensor lines.
//!
//! Finds the leftmost token matching `[-+]?\d*\.\d+|\d+`, trying the
//! decimal form first at each position. A sign only attaches to the decimal
//! form, so `"-3"` yields `3` while `"-3.5"` yields `-3.5`.

/// First numeric token in `line`, if any.
pub fn first_number(line: &str) -> Option<f64> {
    let bytes = line.as_bytes();
    (0..bytes.len()).find_map(|start| {
        let end = match_decimal(bytes, start).or_else(|| match_integer(bytes, start))?;
        line[start..end].parse().ok()
    })
}

fn digits_from(bytes: &[u8], at: usize) -> usize {
    bytes[at..].iter().take_while(|b| b.is_ascii_digit()).count()
}

/// `[-+]?\d*\.\d+` anchored at `start`; returns the end offset.
fn match_decimal(bytes: &[u8], start: usize) -> Option<usize> {
    let mut at = start;
    if matches!(bytes.get(at), Some(b'-' | b'+')) {
        at += 1;
    }
    at += digits_from(bytes, at);
    if bytes.get(at) != Some(&b'.') {
        return None;
    }
    let fraction = digits_from(bytes, at + 1);
    (fraction > 0).then_some(at + 1 + fraction)
}

/// `\d+` anchored at `start`.
fn match_integer(bytes: &[u8], start: usize) -> Option<usize> {
    let len = digits_from(bytes, start);
    (len > 0).then_some(start + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values() {
        assert_eq!(first_number("3.5"), Some(3.5));
        assert_eq!(first_number("12"), Some(12.0));
        assert_eq!(first_number(".25"), Some(0.25));
    }

    #[test]
    fn value_inside_text() {
        assert_eq!(first_number("Force: 1.75 N"), Some(1.75));
        assert_eq!(first_number("raw=512 adc"), Some(512.0));
        assert_eq!(first_number("a 2.0 b 9.0"), Some(2.0));
    }

    #[test]
    fn sign_binds_only_to_decimals() {
        assert_eq!(first_number("-0.5"), Some(-0.5));
        assert_eq!(first_number("+1.5"), Some(1.5));
        assert_eq!(first_number("-3"), Some(3.0));
    }

    #[test]
    fn trailing_dot_falls_back_to_integer() {
        assert_eq!(first_number("7."), Some(7.0));
    }

    #[test]
    fn no_number() {
        assert_eq!(first_number("noise"), None);
        assert_eq!(first_number(""), None);
        assert_eq!(first_number("-."), None);
    }
}
