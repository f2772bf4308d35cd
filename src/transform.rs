//! Request-URI transformers and the bundled query signer.
//!
//! A transformer gets the fully assembled request URI and may rewrite it
//! before the request goes out; signing is the canonical use. The bundled
//! [`HmacQuerySigner`] implements the commerce-API style scheme: canonicalize
//! the query string, add access key and timestamp, HMAC the request shape,
//! and append the Base64 signature as a final `Signature` parameter.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use url::Url;

use crate::error::{Error, ErrorKind, Result};

type HmacSha256 = Hmac<Sha256>;

/// Pluggable request-URI mutation applied after template expansion.
pub trait UriTransformer: Send + Sync {
    /// Return the (possibly rewritten) request URI.
    fn transform(&self, uri: Url) -> Result<Url>;
}

impl std::fmt::Debug for dyn UriTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UriTransformer")
    }
}

/// RFC 3986 encode set: everything but unreserved characters. Stricter than
/// a typical URL-encoder -- space, `(`, `)`, `*`, `!` and `'` are encoded,
/// `~` never is, and hex digits come out uppercase.
const RFC3986_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode per the strict RFC 3986 rules used for signing.
pub fn percent_encode_rfc3986(text: &str) -> String {
    utf8_percent_encode(text, RFC3986_ENCODE_SET).to_string()
}

/// Signs request URIs by canonicalizing the query string and appending an
/// HMAC-SHA256 signature, in the style of commerce product-advertising APIs.
pub struct HmacQuerySigner {
    access_key: String,
    secret: Vec<u8>,
    key_parameter: String,
}

impl HmacQuerySigner {
    /// Create a signer for the given access key and shared secret.
    pub fn new(access_key: impl Into<String>, secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            access_key: access_key.into(),
            secret: secret_key.as_ref().to_vec(),
            key_parameter: "AWSAccessKeyId".to_string(),
        }
    }

    /// Override the query-parameter name the access key is sent under.
    pub fn with_key_parameter(mut self, name: impl Into<String>) -> Self {
        self.key_parameter = name.into();
        self
    }

    fn compute_signature(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can accept any key length");
        mac.update(payload.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

impl UriTransformer for HmacQuerySigner {
    fn transform(&self, uri: Url) -> Result<Url> {
        let host = uri
            .host_str()
            .ok_or_else(|| Error::new(ErrorKind::Signing("request URI has no host".into())))?
            .to_lowercase();
        let path = uri.path().to_string();

        let mut parameters = parse_query(uri.query().unwrap_or(""))?;
        parameters.insert(self.key_parameter.clone(), self.access_key.clone());
        parameters.insert(
            "Timestamp".to_string(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );

        let canonical = canonical_query(&parameters);

        // Request shape under the signature: method, host, path, query.
        let payload = format!("GET\n{host}\n{path}\n{canonical}");
        let signature = self.compute_signature(&payload);

        let authority = match uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        let signed = format!(
            "{}://{}{}?{}&Signature={}",
            uri.scheme(),
            authority,
            path,
            canonical,
            percent_encode_rfc3986(&signature)
        );
        Ok(Url::parse(&signed)?)
    }
}

/// Parse a raw query string into name->value pairs sorted by strict byte
/// ordinal key comparison. An entry without `=` is a construction error.
fn parse_query(query: &str) -> Result<BTreeMap<String, String>> {
    let mut parameters = BTreeMap::new();
    for entry in query.split('&').filter(|entry| !entry.is_empty()) {
        let (name, value) = entry.split_once('=').ok_or_else(|| {
            Error::new(ErrorKind::Signing(format!(
                "query entry '{entry}' is missing '='"
            )))
        })?;
        let value = percent_decode_str(&value.replace('+', " "))
            .decode_utf8()
            .map_err(|e| {
                Error::with_source(ErrorKind::Signing(format!("query entry '{entry}': {e}")), e)
            })?
            .into_owned();
        parameters.insert(name.to_string(), value);
    }
    Ok(parameters)
}

/// Rebuild the canonical query string: `key=value` joined with `&`, values
/// percent-encoded per the strict RFC 3986 rules.
fn canonical_query(parameters: &BTreeMap<String, String>) -> String {
    parameters
        .iter()
        .map(|(name, value)| format!("{}={}", name, percent_encode_rfc3986(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_sort_orders_uppercase_first() {
        let parameters = parse_query("b=2&A=1").unwrap();
        assert_eq!(canonical_query(&parameters), "A=1&b=2");
    }

    #[test]
    fn test_rfc3986_encoding_rules() {
        // Space, parens, star, bang and quote are encoded with uppercase
        // hex; tilde never is.
        assert_eq!(percent_encode_rfc3986("a b(c)*!'~"), "a%20b%28c%29%2A%21%27~");
        assert_eq!(percent_encode_rfc3986("Zürich"), "Z%C3%BCrich");
        assert_eq!(percent_encode_rfc3986("safe-._~09AZaz"), "safe-._~09AZaz");
    }

    #[test]
    fn test_malformed_query_entry_is_construction_error() {
        let uri = Url::parse("http://ecs.example.com/onca/xml?broken").unwrap();
        let signer = HmacQuerySigner::new("akid", "secret");
        let err = signer.transform(uri).unwrap_err();
        assert!(err.is_construction());
        assert!(err.to_string().contains("missing '='"));
    }

    #[test]
    fn test_transform_appends_sorted_signed_query() {
        let uri = Url::parse("http://ECS.Example.COM/onca/xml?b=2&A=1").unwrap();
        let signer = HmacQuerySigner::new("akid", "secret");
        let signed = signer.transform(uri).unwrap();

        assert_eq!(signed.host_str(), Some("ecs.example.com"));
        assert_eq!(signed.path(), "/onca/xml");

        let query = signed.query().unwrap();
        let names: Vec<&str> = query
            .split('&')
            .map(|entry| entry.split_once('=').unwrap().0)
            .collect();
        assert_eq!(
            names,
            vec!["A", "AWSAccessKeyId", "Timestamp", "b", "Signature"]
        );

        // Timestamp is the sign-time UTC instant in yyyy-MM-ddTHH:mm:ssZ.
        let timestamp = query
            .split('&')
            .find_map(|entry| entry.strip_prefix("Timestamp="))
            .unwrap();
        assert_eq!(percent_decode_str(timestamp).decode_utf8().unwrap().len(), 20);
        assert!(timestamp.ends_with('Z'));
    }

    #[test]
    fn test_signature_is_deterministic_for_payload() {
        let signer = HmacQuerySigner::new("akid", "secret");
        let first = signer.compute_signature("GET\nhost\n/path\na=1");
        let second = signer.compute_signature("GET\nhost\n/path\na=1");
        assert_eq!(first, second);
        assert_ne!(first, signer.compute_signature("GET\nhost\n/path\na=2"));
    }

    #[test]
    fn test_decoded_values_are_reencoded_canonically() {
        // A '+' in the raw query decodes to a space and re-encodes as %20.
        let parameters = parse_query("q=space+needle&r=a%2fb").unwrap();
        assert_eq!(canonical_query(&parameters), "q=space%20needle&r=a%2Fb");
    }

    #[test]
    fn test_custom_key_parameter_name() {
        let uri = Url::parse("http://api.example.com/svc?x=1").unwrap();
        let signer = HmacQuerySigner::new("akid", "secret").with_key_parameter("AccessKey");
        let signed = signer.transform(uri).unwrap();
        assert!(signed.query().unwrap().contains("AccessKey=akid"));
    }
}
