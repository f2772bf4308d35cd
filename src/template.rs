//! URI template engine.
//!
//! A template is a literal format string containing `{name[:format]}`
//! tokens. Expansion is two-phase: token values are first extracted into a
//! positional list while the template is rewritten to positional
//! placeholders (brace runs preserved, so doubled braces still express
//! literal braces), then the rewritten string is expanded by ordinal
//! positional substitution honoring any format specifier.
//!
//! The reserved token name `operation` resolves to the operation identifier
//! being invoked; every other name resolves from the parameter bag and is a
//! construction error when absent. Bag entries not consumed by a token are
//! appended to the query string, with callback markers skipped, nested sets
//! flattened one level, and text sequences joined with a literal `+`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{Error, ErrorKind, Result};
use crate::params::{ParamValue, Params};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{+)([\w.\[\]]+)(:[^}]+)?(\}+)").expect("token pattern"));

/// A templated endpoint URI.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    format: String,
}

impl UriTemplate {
    /// Wrap a literal format string.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// The raw format string.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Expand this template for one invocation.
    ///
    /// `append_query` is false for posting operations, whose parameters
    /// travel in the form body instead of the query string; tokens still
    /// resolve either way.
    pub fn expand(&self, operation: &str, params: &Params, append_query: bool) -> Result<String> {
        let mut values: Vec<String> = Vec::new();
        let mut consumed: HashSet<String> = HashSet::new();
        let mut rewritten = String::with_capacity(self.format.len());
        let mut last_end = 0;

        for caps in TOKEN_RE.captures_iter(&self.format) {
            let whole = caps.get(0).expect("match");
            let open = caps.get(1).expect("open braces").as_str();
            let name = caps.get(2).expect("token name").as_str();
            let format_spec = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let close = caps.get(4).expect("close braces").as_str();

            rewritten.push_str(&self.format[last_end..whole.start()]);
            last_end = whole.end();

            let value = if name == "operation" && !operation.is_empty() {
                operation.to_string()
            } else {
                let param = params.get(name).ok_or_else(|| {
                    Error::new(ErrorKind::Template(format!(
                        "no parameter named '{name}' for template token"
                    )))
                })?;
                let rendered = param.render().ok_or_else(|| {
                    Error::new(ErrorKind::Template(format!(
                        "parameter '{name}' cannot be used as a template token"
                    )))
                })?;
                consumed.insert(name.to_string());
                rendered
            };

            rewritten.push_str(open);
            rewritten.push_str(&(values.len()).to_string());
            rewritten.push_str(format_spec);
            rewritten.push_str(close);
            values.push(value);
        }
        rewritten.push_str(&self.format[last_end..]);

        let mut uri = positional_format(&rewritten, &values)?;

        if !uri.contains('?') {
            uri.push('?');
        }

        if append_query {
            for (name, value) in params.iter() {
                if consumed.contains(name) {
                    continue;
                }
                append_parameter(&mut uri, name, value);
            }
        }

        Ok(uri)
    }
}

fn append_parameter(uri: &mut String, name: &str, value: &ParamValue) {
    match value {
        // Callbacks are call-site bookkeeping; never transmitted.
        ParamValue::Callback => {}
        ParamValue::Nested(nested) => {
            // One level of flattening: name.child=value.
            for (child, child_value) in nested.iter() {
                if let Some(text) = format_query_value(child_value) {
                    uri.push('&');
                    uri.push_str(name);
                    uri.push('.');
                    uri.push_str(child);
                    uri.push('=');
                    uri.push_str(&text);
                }
            }
        }
        other => {
            if let Some(text) = format_query_value(other) {
                uri.push('&');
                uri.push_str(name);
                uri.push('=');
                uri.push_str(&text);
            }
        }
    }
}

/// Render a value for the query string. Text sequences join with a literal
/// `+` and are not percent-encoded between members; every other scalar is
/// invariant-stringified and percent-encoded.
pub(crate) fn format_query_value(value: &ParamValue) -> Option<String> {
    match value {
        ParamValue::TextList(members) => Some(members.join("+")),
        ParamValue::Nested(_) | ParamValue::Callback => None,
        scalar => scalar
            .render()
            .map(|text| urlencoding::encode(&text).into_owned()),
    }
}

/// Encode a parameter set as `application/x-www-form-urlencoded` pairs
/// under the same value-formatting rules as the query string: callbacks
/// skipped, nested sets flattened one level, text sequences `+`-joined.
pub(crate) fn form_encode(params: &Params) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for (name, value) in params.iter() {
        match value {
            ParamValue::Callback => {}
            ParamValue::Nested(nested) => {
                for (child, child_value) in nested.iter() {
                    if let Some(text) = format_query_value(child_value) {
                        pairs.push(format!("{name}.{child}={text}"));
                    }
                }
            }
            other => {
                if let Some(text) = format_query_value(other) {
                    pairs.push(format!("{name}={text}"));
                }
            }
        }
    }
    pairs.join("&")
}

/// Ordinal positional substitution over `{N[:fmt]}` placeholders, with
/// `{{`/`}}` escapes for literal braces.
fn positional_format(rewritten: &str, values: &[String]) -> Result<String> {
    let mut out = String::with_capacity(rewritten.len());
    let mut chars = rewritten.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut index = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    index.push(*d);
                    chars.next();
                }
                let mut format_spec = String::new();
                if chars.peek() == Some(&':') {
                    chars.next();
                    while let Some(&d) = chars.peek() {
                        if d == '}' {
                            break;
                        }
                        format_spec.push(d);
                        chars.next();
                    }
                }
                if index.is_empty() || chars.next() != Some('}') {
                    return Err(Error::new(ErrorKind::Template(
                        "unbalanced brace in URI template".into(),
                    )));
                }
                let index: usize = index.parse().expect("digits");
                let value = values.get(index).ok_or_else(|| {
                    Error::new(ErrorKind::Template(format!(
                        "positional placeholder {index} out of range"
                    )))
                })?;
                out.push_str(&apply_format_spec(value, &format_spec));
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(Error::new(ErrorKind::Template(
                        "unbalanced brace in URI template".into(),
                    )));
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Apply a token format specifier. A run of `0`s zero-pads integral values
/// to that width; anything else (or a non-integral value) passes the value
/// through unchanged.
fn apply_format_spec(value: &str, spec: &str) -> String {
    if spec.is_empty() {
        return value.to_string();
    }
    if spec.bytes().all(|b| b == b'0') {
        if let Ok(n) = value.parse::<i64>() {
            return format!("{:0width$}", n, width = spec.len());
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_with_operation_and_format_spec() {
        let template = UriTemplate::new("/{operation}/{id}?x={x:0000}");
        let params = Params::new().with("id", 7).with("x", 3);
        let uri = template.expand("get", &params, true).unwrap();
        assert_eq!(uri, "/get/7?x=0003");
    }

    #[test]
    fn test_unconsumed_parameters_append_to_query() {
        let template = UriTemplate::new("http://api.example.com/{operation}?v=1");
        let params = Params::new().with("tags", "seattle").with("per_page", 4);
        let uri = template.expand("photos.search", &params, true).unwrap();
        assert_eq!(
            uri,
            "http://api.example.com/photos.search?v=1&tags=seattle&per_page=4"
        );
    }

    #[test]
    fn test_nested_parameter_flattens_one_level() {
        let template = UriTemplate::new("http://h/s?k=1");
        let opt = Params::new().with("a", 1).with("b", 2);
        let params = Params::new().with("opt", opt);
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/s?k=1&opt.a=1&opt.b=2");
    }

    #[test]
    fn test_text_sequence_joins_without_encoding() {
        let template = UriTemplate::new("http://h/s?k=1");
        let params = Params::new().with("Sources", vec!["Web", "Image"]);
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/s?k=1&Sources=Web+Image");
    }

    #[test]
    fn test_scalar_query_values_are_percent_encoded() {
        let template = UriTemplate::new("http://h/s?k=1");
        let params = Params::new().with("q", "space needle & more");
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/s?k=1&q=space%20needle%20%26%20more");
    }

    #[test]
    fn test_callback_marker_never_transmitted() {
        let template = UriTemplate::new("http://h/s?k=1");
        let mut params = Params::new().with("a", 1);
        params.set("onDone", ParamValue::Callback);
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/s?k=1&a=1");
    }

    #[test]
    fn test_missing_token_is_construction_error() {
        let template = UriTemplate::new("http://h/{operation}?key={apiKey}");
        let err = template.expand("get", &Params::new(), true).unwrap_err();
        assert!(err.is_construction());
        assert!(err.to_string().contains("apiKey"));
    }

    #[test]
    fn test_empty_operation_falls_back_to_bag() {
        let template = UriTemplate::new("http://h/{operation}?v=1");
        let params = Params::new().with("operation", "stored");
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/stored?v=1");

        let err = template.expand("", &Params::new(), true).unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn test_question_mark_appended_when_template_has_none() {
        let template = UriTemplate::new("http://h/{operation}");
        let params = Params::new().with("a", 1);
        let uri = template.expand("go", &params, true).unwrap();
        assert_eq!(uri, "http://h/go?&a=1");
    }

    #[test]
    fn test_posting_mode_skips_query_append() {
        let template = UriTemplate::new("http://h/{operation}?v=1");
        let params = Params::new().with("a", 1);
        let uri = template.expand("go", &params, false).unwrap();
        assert_eq!(uri, "http://h/go?v=1");
    }

    #[test]
    fn test_doubled_braces_express_literal_braces() {
        let template = UriTemplate::new("http://h/path?raw={{}}&id={id}");
        let params = Params::new().with("id", 7);
        let uri = template.expand("", &params, true).unwrap();
        assert_eq!(uri, "http://h/path?raw={}&id=7");
    }

    #[test]
    fn test_unbalanced_brace_is_construction_error() {
        let template = UriTemplate::new("http://h/}oops");
        let err = template.expand("", &Params::new(), true).unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn test_form_encode_follows_query_rules() {
        let mut params = Params::new()
            .with("bid", 1)
            .with("opt", Params::new().with("a", 1).with("b", 2))
            .with("Sources", vec!["Web", "Image"])
            .with("note", "a b");
        params.set("onDone", ParamValue::Callback);

        assert_eq!(
            form_encode(&params),
            "bid=1&opt.a=1&opt.b=2&Sources=Web+Image&note=a%20b"
        );
    }
}
