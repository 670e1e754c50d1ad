//! Small string helpers shared by the clients and pipelines

/// Truncate to `max` characters, appending `...` when anything was cut
pub fn truncate_chars(input: &str, max: usize) -> String {
    let mut out = String::new();
    for (idx, ch) in input.chars().enumerate() {
        if idx >= max {
            out.push_str("...");
            break;
        }
        out.push(ch);
    }
    out
}

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_input() {
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn truncate_marks_cut_on_char_boundary() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn round4_drops_extra_digits() {
        assert_eq!(round4(0.123_456), 0.1235);
        assert_eq!(round4(5.5 + 0.3 + 1.0), 6.8);
    }
}
