use cow_utils::CowUtils;
use serde::Serialize;
use std::borrow::Cow;

use crate::error::StreamError;

/// Encodes `value` as a JS string literal that can sit inside an inline
/// `<script>` without ending it or opening a comment.
pub fn script_string(value: &str) -> String {
    // Serializing a str cannot fail.
    let json = serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""));
    make_script_safe(&json)
}

/// Encodes any serializable value as a script-safe JS expression.
pub fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StreamError> {
    let json = serde_json::to_string(value)?;
    Ok(make_script_safe(&json))
}

pub fn make_script_safe(json: &str) -> String {
    escape_script_close(json)
        .cow_replace("<!--", "<\\!--")
        .cow_replace('\u{2028}', "\\u2028")
        .cow_replace('\u{2029}', "\\u2029")
        .into_owned()
}

/// The HTML tokenizer ends a script on `</script` in any letter case.
fn escape_script_close(json: &str) -> Cow<'_, str> {
    let lower = json.to_ascii_lowercase();
    if !lower.contains("</script") {
        return Cow::Borrowed(json);
    }

    let mut out = String::with_capacity(json.len() + 8);
    let mut last = 0;
    for (idx, _) in lower.match_indices("</script") {
        out.push_str(&json[last..=idx]);
        out.push('\\');
        last = idx + 1;
    }
    out.push_str(&json[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_markup_is_left_readable() {
        assert_eq!(script_string("<p>User</p>"), r#""<p>User</p>""#);
    }

    #[test]
    fn test_script_close_is_broken_up() {
        assert_eq!(
            script_string("<script>x()</script><p>ok</p></SCRIPT>"),
            r#""<script>x()<\/script><p>ok</p><\/SCRIPT>""#
        );
    }

    #[test]
    fn test_comment_open_and_line_separators() {
        assert_eq!(script_string("<!-- a\u{2028}b\u{2029}"), r#""<\!-- a\u2028b\u2029""#);
    }

    #[test]
    fn test_quotes_and_newlines_use_json_escapes() {
        assert_eq!(script_string("say \"hi\"\n"), r#""say \"hi\"\n""#);
    }

    #[test]
    fn test_unserializable_value_is_encoding_error() {
        let mut map = std::collections::BTreeMap::new();
        map.insert((1, 2), "tuple keys");

        let error = script_json(&map).unwrap_err();
        assert_eq!(error.code(), "ENCODING_ERROR");
    }

    #[test]
    fn test_json_values() {
        let encoded = script_json(&json!({"html": "</script>", "n": 1})).unwrap();
        assert_eq!(encoded, r#"{"html":"<\/script>","n":1}"#);
    }
}
