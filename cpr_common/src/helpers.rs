/// Interprets an environment-style boolean flag. Unset or unrecognised values fall back to
/// `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    if ["1", "true", "yes", "on"].iter().any(|t| value.trim().eq_ignore_ascii_case(t)) {
        true
    } else if ["0", "false", "no", "off"].iter().any(|t| value.trim().eq_ignore_ascii_case(t)) {
        false
    } else {
        default
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognised_tokens() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_boolean_flag(Some(v.to_string()), false));
        }
        for v in ["0", "False", "no", "OFF"] {
            assert!(!parse_boolean_flag(Some(v.to_string()), true));
        }
    }

    #[test]
    fn everything_else_is_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("maybe".to_string()), true));
        assert!(!parse_boolean_flag(Some("".to_string()), false));
    }
}
