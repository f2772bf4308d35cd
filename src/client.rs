//! Dispatch core: operation-path resolution, request construction,
//! execution, decoding, completion.
//!
//! A [`RestClient`] is a proxy over one templated endpoint. Navigating a
//! name yields either a stored parameter or a child proxy whose operation
//! group is extended by `.name`; navigation never performs I/O. Invoking a
//! name expands the URI template against the shared parameter bag, applies
//! the optional transformer, issues the HTTP request (GET, or POST with a
//! form body for pre-registered posting operations), decodes the response
//! in the configured content mode, and completes a [`RestOperation`].
//!
//! Invoked names ending in the literal suffix `Async` run without blocking:
//! the pending operation is returned immediately and completed from a
//! spawned task; everything else is awaited inline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, instrument};
use url::Url;

use crate::document::{decode, ContentMode};
use crate::error::{Error, ErrorKind, Result};
use crate::operation::RestOperation;
use crate::params::{ParamValue, Params, SharedParams};
use crate::template::{form_encode, UriTemplate};
use crate::transform::UriTransformer;

/// The outcome of navigating a name on a client proxy.
///
/// Parameter lookup takes precedence over opening a new navigation scope:
/// if the bag holds the name, its value comes back; only otherwise does a
/// child proxy get created.
#[derive(Debug)]
pub enum Navigated {
    /// The name matched a stored parameter.
    Parameter(ParamValue),
    /// A child proxy with the operation group extended by the name.
    Scope(RestClient),
}

impl Navigated {
    /// The child proxy, if navigation opened a new scope.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Argument`] error when the name resolved to a
    /// stored parameter instead.
    pub fn into_scope(self) -> Result<RestClient> {
        match self {
            Navigated::Scope(client) => Ok(client),
            Navigated::Parameter(value) => Err(Error::new(ErrorKind::Argument(format!(
                "navigation resolved to a parameter value ({value:?}), not a scope"
            )))),
        }
    }

    /// The stored parameter, if navigation resolved to one.
    pub fn into_parameter(self) -> Option<ParamValue> {
        match self {
            Navigated::Parameter(value) => Some(value),
            Navigated::Scope(_) => None,
        }
    }
}

#[derive(Debug)]
struct ClientCore {
    template: UriTemplate,
    mode: ContentMode,
    transformer: Option<Arc<dyn UriTransformer>>,
    post_operations: HashSet<String>,
    credentials: Option<(String, String)>,
    strict_arity: bool,
    http: reqwest::Client,
}

/// Dynamic REST client over one templated endpoint.
///
/// Cloning (or navigating) shares the underlying configuration and the
/// parameter bag; `set` through any proxy in the chain is visible to all.
#[derive(Debug, Clone)]
pub struct RestClient {
    core: Arc<ClientCore>,
    group: Option<String>,
    params: SharedParams,
}

impl RestClient {
    /// Create a client with default configuration.
    pub fn new(uri_template: impl Into<String>, mode: ContentMode) -> Result<Self> {
        Self::builder(uri_template, mode).build()
    }

    /// Start configuring a client.
    pub fn builder(uri_template: impl Into<String>, mode: ContentMode) -> RestClientBuilder {
        RestClientBuilder::new(uri_template, mode)
    }

    /// Navigate one name: a stored parameter if the bag holds it, a child
    /// proxy otherwise. Never performs I/O.
    pub fn navigate(&self, name: &str) -> Navigated {
        if let Some(value) = self.params.get(name) {
            return Navigated::Parameter(value);
        }

        let group = match &self.group {
            Some(group) => format!("{group}.{name}"),
            None => name.to_string(),
        };
        Navigated::Scope(RestClient {
            core: Arc::clone(&self.core),
            group: Some(group),
            params: self.params.clone(),
        })
    }

    /// Navigate a dot-joined path, e.g. `"Photos.Search"`. Stops early and
    /// returns the parameter if any segment resolves to one.
    pub fn navigate_path(&self, path: &str) -> Navigated {
        let mut current = self.clone();
        for segment in path.split('.').filter(|segment| !segment.is_empty()) {
            match current.navigate(segment) {
                Navigated::Scope(next) => current = next,
                parameter => return parameter,
            }
        }
        Navigated::Scope(current)
    }

    /// Store a parameter into the bag shared across the navigation chain.
    pub fn set(&self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.set(name, value);
    }

    /// The dot-joined operation group this proxy was navigated to.
    pub fn operation_group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Invoke an operation by name.
    ///
    /// The operation identifier is the navigation group extended by `name`.
    /// A name ending in the literal suffix `Async` is stripped and runs
    /// without blocking: the returned operation is still pending and is
    /// completed from a spawned task. The first argument, if present, is
    /// the invocation parameter set; a strict client rejects any arity
    /// other than exactly one, a permissive client treats missing or extra
    /// arguments as "no parameters".
    ///
    /// # Errors
    ///
    /// Construction errors (template, signing, arity) surface here; a
    /// transport failure with no response at all does too, for the blocking
    /// path. Every other outcome is captured on the returned operation.
    #[instrument(skip(self, args), fields(group = self.group.as_deref().unwrap_or("")))]
    pub async fn invoke_named(&self, name: &str, args: &[Params]) -> Result<Arc<RestOperation>> {
        if self.core.strict_arity && args.len() != 1 {
            return Err(Error::new(ErrorKind::Argument(format!(
                "expected exactly one parameter set, got {}",
                args.len()
            ))));
        }
        let invocation = args.first().cloned().unwrap_or_default();

        let (name, run_async) = match name.strip_suffix("Async") {
            Some(base) => (base, true),
            None => (name, false),
        };

        let operation = match (&self.group, name.is_empty()) {
            (Some(group), true) => group.clone(),
            (Some(group), false) => format!("{group}.{name}"),
            (None, _) => name.to_string(),
        };

        // One effective bag for tokens, query append and form bodies: the
        // shared bag overlaid with the invocation set (invocation wins).
        let effective = self.params.snapshot().overlaid_with(&invocation);

        let posting = self.core.post_operations.contains(&operation);
        let expanded = self.core.template.expand(&operation, &effective, !posting)?;
        let mut url = Url::parse(&expanded)?;
        if let Some(transformer) = &self.core.transformer {
            url = transformer.transform(url)?;
        }
        let form = posting.then(|| form_encode(&effective));

        debug!(%url, operation, posting, run_async, "dispatching request");

        if run_async {
            let operation = Arc::new(RestOperation::with_context(Handle::current()));
            let client = self.clone();
            let pending = Arc::clone(&operation);
            tokio::spawn(async move {
                tokio::select! {
                    _ = pending.cancelled() => {
                        pending.complete_with_error(
                            Error::new(ErrorKind::Cancelled),
                            0,
                            "cancelled",
                        );
                    }
                    outcome = client.execute(&pending, url, form) => {
                        if let Err(err) = outcome {
                            // Non-blocking path has no caller left to
                            // propagate to; capture on the operation.
                            pending.complete_with_error(err, 0, "");
                        }
                    }
                }
            });
            return Ok(operation);
        }

        let operation = Arc::new(RestOperation::new());
        self.execute(&operation, url, form).await?;
        Ok(operation)
    }

    /// Invoke with an empty operation name; the identifier is the
    /// navigation group alone (or empty at the root).
    pub async fn invoke_self(&self, args: &[Params]) -> Result<Arc<RestOperation>> {
        self.invoke_named("", args).await
    }

    /// Issue the request and complete the operation with the outcome.
    async fn execute(
        &self,
        operation: &Arc<RestOperation>,
        url: Url,
        form: Option<String>,
    ) -> Result<()> {
        let mut request = match form {
            Some(body) => self
                .core
                .http
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body),
            None => self.core.http.get(url),
        };
        if let Some((user, password)) = &self.core.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                if let Some(status) = err.status() {
                    // A failure that still carries a response completes the
                    // operation with that response's status.
                    let status = status.as_u16();
                    let message = err.to_string();
                    operation.complete_with_error(Error::from(err), status, message);
                    return Ok(());
                }
                // No response at all: propagate to the caller.
                return Err(err.into());
            }
        };

        let status = response.status();
        let message = status.canonical_reason().unwrap_or_default().to_string();

        if status.as_u16() != 200 {
            debug!(status = status.as_u16(), "non-200 response");
            operation.complete_with_error(
                Error::new(ErrorKind::Http {
                    status: status.as_u16(),
                    message: message.clone(),
                }),
                status.as_u16(),
                message,
            );
            return Ok(());
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                operation.complete_with_error(Error::from(err), 200, message);
                return Ok(());
            }
        };

        match decode(self.core.mode, body) {
            Ok(document) => operation.complete(document, 200, message),
            // Decode failures are captured distinctly, never replaced with
            // an absent result.
            Err(err) => operation.complete_with_error(err, 200, message),
        }
        Ok(())
    }
}

/// Builder for [`RestClient`].
#[derive(Debug)]
pub struct RestClientBuilder {
    template: String,
    mode: ContentMode,
    transformer: Option<Arc<dyn UriTransformer>>,
    post_operations: HashSet<String>,
    credentials: Option<(String, String)>,
    strict_arity: bool,
    timeout: Duration,
    user_agent: String,
}

impl RestClientBuilder {
    fn new(template: impl Into<String>, mode: ContentMode) -> Self {
        Self {
            template: template.into(),
            mode,
            transformer: None,
            post_operations: HashSet::new(),
            credentials: None,
            strict_arity: false,
            timeout: Duration::from_secs(30),
            user_agent: crate::USER_AGENT.to_string(),
        }
    }

    /// Apply a request-URI transformer (e.g. a signer) after expansion.
    pub fn with_transformer(mut self, transformer: impl UriTransformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Register operation names forced to POST with a form body.
    pub fn with_post_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.post_operations
            .extend(operations.into_iter().map(Into::into));
        self
    }

    /// Attach Basic-Auth credentials to every request.
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Reject invocations whose arity is not exactly one parameter set.
    pub fn strict_arity(mut self) -> Self {
        self.strict_arity = true;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RestClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(RestClient {
            core: Arc::new(ClientCore {
                template: UriTemplate::new(self.template),
                mode: self.mode,
                transformer: self.transformer,
                post_operations: self.post_operations,
                credentials: self.credentials,
                strict_arity: self.strict_arity,
                http,
            }),
            group: None,
            params: SharedParams::new(),
        })
    }
}
