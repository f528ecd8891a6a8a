use cow_utils::CowUtils;

use crate::node::AttrValue;

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub const PLACEHOLDER_TAG: &str = "weft-boundary";
pub const PLACEHOLDER_ID_ATTR: &str = "data-boundary-id";

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(tag))
}

pub fn escape_html(text: &str) -> String {
    text.cow_replace('&', "&amp;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .cow_replace('"', "&quot;")
        .cow_replace('\'', "&#39;")
        .into_owned()
}

pub fn escape_attribute(text: &str) -> String {
    text.cow_replace('&', "&amp;")
        .cow_replace('"', "&quot;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .into_owned()
}

pub fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| {
            c.is_whitespace()
                || c.is_control()
                || matches!(c, '"' | '\'' | '<' | '>' | '/' | '=' | '`')
        })
}

pub fn attribute_alias(name: &str) -> &str {
    match name {
        "className" => "class",
        "htmlFor" => "for",
        _ => name,
    }
}

/// Formats numbers the way a browser prints them in text content.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

pub fn write_attribute(out: &mut String, name: &str, value: &AttrValue) {
    match value {
        AttrValue::Bool(false) => {}
        AttrValue::Bool(true) => {
            out.push(' ');
            out.push_str(name);
        }
        AttrValue::Str(s) => {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attribute(s));
            out.push('"');
        }
        AttrValue::Int(i) => {
            out.push_str(&format!(r#" {}="{}""#, name, i));
        }
        AttrValue::Float(f) => {
            out.push_str(&format!(r#" {}="{}""#, name, format_number(*f)));
        }
    }
}

pub fn placeholder_open(id: impl std::fmt::Display) -> String {
    format!(r#"<{PLACEHOLDER_TAG} {PLACEHOLDER_ID_ATTR}="{id}" style="display:contents">"#)
}

pub fn placeholder_close() -> String {
    format!("</{PLACEHOLDER_TAG}>")
}
