//! # dynrest
//!
//! A code-generation-free client for JSON/XML HTTP services: operation
//! names and parameters are resolved at call time instead of through
//! per-service stubs.
//!
//! A [`RestClient`] wraps one templated endpoint URI. Navigating names on
//! it builds a dot-joined operation path; invoking a name expands the
//! template against a parameter bag shared across the navigation chain,
//! optionally signs the request, executes it (blocking or not), and decodes
//! the response into a dynamic JSON or XML document on a [`RestOperation`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use dynrest::{ContentMode, Params, RestClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dynrest::Error> {
//!     let flickr = RestClient::new(
//!         "http://api.flickr.com/services/rest/?method=flickr.{operation}&api_key={apiKey}&format=json",
//!         ContentMode::Json,
//!     )?;
//!     flickr.set("apiKey", "...");
//!
//!     let photos = flickr.navigate_path("Photos").into_scope()?;
//!     let search = photos
//!         .invoke_named("Search", &[Params::new().with("tags", "seattle").with("per_page", 4)])
//!         .await?;
//!
//!     if let Some(err) = search.error() {
//!         eprintln!("search failed: {err}");
//!     } else if let Some(doc) = search.result() {
//!         println!("{:?}", doc.as_json());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Names invoked with the literal suffix `Async` run without blocking: the
//! returned [`RestOperation`] is pending, supports `callback`/`wait`, and
//! can be cancelled.

mod client;
mod document;
mod error;
pub mod json;
mod operation;
mod params;
mod template;
mod transform;
pub mod xml;

pub use client::{Navigated, RestClient, RestClientBuilder};
pub use document::{decode, ContentMode, Document};
pub use error::{Error, ErrorKind, Result};
pub use json::{JsonArray, JsonObject, JsonValue};
pub use operation::RestOperation;
pub use params::{ParamValue, Params, SharedParams};
pub use template::UriTemplate;
pub use transform::{percent_encode_rfc3986, HmacQuerySigner, UriTransformer};
pub use xml::{XmlNode, XmlNodeList, XmlValue};

/// User-Agent sent with requests unless overridden.
pub(crate) const USER_AGENT: &str = concat!("dynrest/", env!("CARGO_PKG_VERSION"));
