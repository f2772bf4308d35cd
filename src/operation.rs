//! Future-style completion for invoked operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::document::Document;
use crate::error::Error;

type Callback = Box<dyn FnOnce(&RestOperation) + Send + 'static>;

/// The observable side of one HTTP invocation.
///
/// An operation is Pending until the transport produces an outcome, then
/// Completed forever: exactly one of result or error, plus the HTTP status
/// fields. Completion drains the callback queue exactly once, in
/// registration order; a callback registered after completion is invoked
/// immediately. Completion and registration are mutually exclusive critical
/// sections, so neither a missed nor a doubled callback is possible.
pub struct RestOperation {
    state: Mutex<State>,
    done: Notify,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
    /// Runtime captured at creation; when present, callback delivery is
    /// redirected onto it instead of running on the completing thread.
    context: Option<Handle>,
}

#[derive(Default)]
struct State {
    completed: bool,
    result: Option<Document>,
    error: Option<Arc<Error>>,
    status: u16,
    status_message: String,
    callbacks: Vec<Callback>,
}

impl RestOperation {
    /// Create a pending operation whose callbacks run on the completing
    /// thread.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            done: Notify::new(),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            context: None,
        }
    }

    /// Create a pending operation whose callbacks are redirected onto the
    /// given runtime handle at completion.
    pub fn with_context(context: Handle) -> Self {
        Self {
            context: Some(context),
            ..Self::new()
        }
    }

    /// Whether the operation has completed.
    pub fn is_completed(&self) -> bool {
        self.state.lock().expect("operation lock").completed
    }

    /// The decoded result, if the operation completed successfully.
    pub fn result(&self) -> Option<Document> {
        self.state.lock().expect("operation lock").result.clone()
    }

    /// The captured error, if the operation completed with one. Check this
    /// before trusting [`result`](Self::result).
    pub fn error(&self) -> Option<Arc<Error>> {
        self.state.lock().expect("operation lock").error.clone()
    }

    /// HTTP status code of the response, 0 when no response existed.
    pub fn status(&self) -> u16 {
        self.state.lock().expect("operation lock").status
    }

    /// HTTP status message of the response.
    pub fn status_message(&self) -> String {
        self.state
            .lock()
            .expect("operation lock")
            .status_message
            .clone()
    }

    /// Register a completion callback. Runs exactly once: immediately if
    /// the operation already completed, otherwise at completion in
    /// registration order.
    pub fn callback(&self, f: impl FnOnce(&RestOperation) + Send + 'static) {
        {
            let mut state = self.state.lock().expect("operation lock");
            if !state.completed {
                state.callbacks.push(Box::new(f));
                return;
            }
        }
        f(self);
    }

    /// Block (asynchronously) until the operation completes.
    pub async fn wait(&self) {
        loop {
            let notified = self.done.notified();
            if self.is_completed() {
                return;
            }
            notified.await;
        }
    }

    /// Request cancellation of an in-flight asynchronous invocation. The
    /// executor completes the operation with a Cancelled error; cancelling
    /// an already-completed operation has no effect.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Complete with a decoded result.
    pub(crate) fn complete(
        self: &Arc<Self>,
        result: Document,
        status: u16,
        message: impl Into<String>,
    ) {
        self.finish(Some(result), None, status, message.into());
    }

    /// Complete with a captured error.
    pub(crate) fn complete_with_error(
        self: &Arc<Self>,
        error: Error,
        status: u16,
        message: impl Into<String>,
    ) {
        self.finish(None, Some(error), status, message.into());
    }

    /// Single Pending→Completed transition. A second completion attempt is
    /// ignored; the first outcome stands.
    fn finish(self: &Arc<Self>, result: Option<Document>, error: Option<Error>, status: u16, message: String) {
        let callbacks = {
            let mut state = self.state.lock().expect("operation lock");
            if state.completed {
                return;
            }
            state.completed = true;
            state.result = result;
            state.error = error.map(Arc::new);
            state.status = status;
            state.status_message = message;
            std::mem::take(&mut state.callbacks)
        };

        self.done.notify_waiters();

        if callbacks.is_empty() {
            return;
        }
        match &self.context {
            Some(handle) => {
                let operation = Arc::clone(self);
                handle.spawn(async move {
                    for callback in callbacks {
                        callback(&operation);
                    }
                });
            }
            None => {
                for callback in callbacks {
                    callback(self);
                }
            }
        }
    }
}

impl Default for RestOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RestOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().expect("operation lock");
        f.debug_struct("RestOperation")
            .field("completed", &state.completed)
            .field("status", &state.status)
            .field("status_message", &state.status_message)
            .field("has_result", &state.result.is_some())
            .field("has_error", &state.error.is_some())
            .field("queued_callbacks", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::json::JsonValue;
    use std::sync::atomic::AtomicUsize;

    fn completed_op() -> Arc<RestOperation> {
        let op = Arc::new(RestOperation::new());
        op.complete(Document::Json(JsonValue::Int(1)), 200, "OK");
        op
    }

    #[test]
    fn test_completion_sets_fields_once() {
        let op = completed_op();
        assert!(op.is_completed());
        assert_eq!(op.status(), 200);
        assert_eq!(op.status_message(), "OK");
        assert!(op.result().is_some());
        assert!(op.error().is_none());

        // Second completion is ignored.
        op.complete_with_error(
            Error::new(ErrorKind::Http {
                status: 500,
                message: "late".into(),
            }),
            500,
            "late",
        );
        assert_eq!(op.status(), 200);
        assert!(op.error().is_none());
    }

    #[test]
    fn test_error_completion() {
        let op = Arc::new(RestOperation::new());
        op.complete_with_error(
            Error::new(ErrorKind::Http {
                status: 404,
                message: "Not Found".into(),
            }),
            404,
            "Not Found",
        );
        assert!(op.result().is_none());
        assert_eq!(op.error().unwrap().status(), Some(404));
    }

    #[test]
    fn test_callbacks_drain_in_registration_order() {
        let op = Arc::new(RestOperation::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            op.callback(move |_| order.lock().unwrap().push(label));
        }

        assert!(order.lock().unwrap().is_empty());
        op.complete(Document::Json(JsonValue::Null), 200, "OK");
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_callback_after_completion_fires_immediately_exactly_once() {
        let op = completed_op();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        op.callback(move |inner| {
            assert!(inner.is_completed());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_completion() {
        let op = Arc::new(RestOperation::new());
        let waiter = Arc::clone(&op);
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            waiter.status()
        });

        tokio::task::yield_now().await;
        op.complete(Document::Json(JsonValue::Null), 200, "OK");
        assert_eq!(handle.await.unwrap(), 200);

        // wait() on an already-completed operation returns immediately.
        op.wait().await;
    }

    #[tokio::test]
    async fn test_context_redirects_callback_delivery() {
        let op = Arc::new(RestOperation::with_context(Handle::current()));
        let (tx, rx) = std::sync::mpsc::channel();
        op.callback(move |inner| {
            let _ = tx.send(inner.status());
        });

        // Complete from a plain OS thread: delivery must hop back onto the
        // captured runtime.
        let completer = Arc::clone(&op);
        std::thread::spawn(move || {
            completer.complete(Document::Json(JsonValue::Null), 200, "OK");
        })
        .join()
        .unwrap();

        let status = tokio::task::spawn_blocking(move || {
            rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap()
        })
        .await
        .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let op = Arc::new(RestOperation::new());
        assert!(!op.is_cancelled());

        let observer = Arc::clone(&op);
        let handle = tokio::spawn(async move {
            observer.cancelled().await;
            true
        });

        tokio::task::yield_now().await;
        op.cancel();
        assert!(op.is_cancelled());
        assert!(handle.await.unwrap());
    }
}
