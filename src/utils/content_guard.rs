use serde_json::{json, Value};

const EXCERPT_SUFFIX: &str = "...";

/// Safely truncates a UTF-8 string without breaking character boundaries.
/// If `s` length exceeds `max`, returns a string cut at a valid char boundary and appends `suffix`.
/// The resulting string length will be <= max whenever possible (suffix included). If `max` < suffix length,
/// the function returns a safely cut string without suffix, not exceeding `max` bytes.
pub fn safe_truncate_utf8(s: &str, max: usize, suffix: &str) -> String {
    if s.len() <= max {
        return s.to_string();
    }

    if max == 0 {
        return String::new();
    }

    let suffix_len = suffix.len();
    if max <= suffix_len {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        return s[..end].to_string();
    }

    let mut end = max - suffix_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut result = String::with_capacity(end + suffix_len);
    result.push_str(&s[..end]);
    result.push_str(suffix);
    result
}

/// Short single-line excerpt of an upstream response body, for error messages.
pub fn body_excerpt(body: &str, max: usize) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    safe_truncate_utf8(&flat, max, EXCERPT_SUFFIX)
}

/// Builds the JSON body returned for failed requests:
/// `{"error": {"code": ..., "message": ...}}`.
pub fn build_error_payload(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        let s = "ééééé"; // 10 bytes
        let out = safe_truncate_utf8(s, 6, "..");
        assert_eq!(out, "éé..");
        assert!(out.len() <= 6);
    }

    #[test]
    fn short_strings_are_untouched() {
        assert_eq!(safe_truncate_utf8("ok", 10, "..."), "ok");
        assert_eq!(safe_truncate_utf8("anything", 0, "..."), "");
    }

    #[test]
    fn excerpt_flattens_whitespace() {
        let body = "{\n  \"error\": {\n    \"code\": 404\n  }\n}";
        assert_eq!(body_excerpt(body, 200), "{ \"error\": { \"code\": 404 } }");
        assert_eq!(body_excerpt(body, 10), "{ \"erro...");
    }

    #[test]
    fn error_payload_shape() {
        let payload = build_error_payload("parse_error", "bad document");
        assert_eq!(payload["error"]["code"], "parse_error");
        assert_eq!(payload["error"]["message"], "bad document");
    }
}
