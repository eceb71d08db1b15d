//! Per-message context and chain driver.
//!
//! One [`Context`] carries exactly one request/response cycle: the immutable
//! request body, the response buffer, the resolved handler chain with its
//! cursor, a scratch map for handlers, and the owning [`Connection`].
//!
//! # Chain Execution
//!
//! ```text
//! Pending ──▶ Running(chain[i]) ──┬──▶ Continuing (i += 1) ──▶ Running ...
//!                                 ├──▶ Aborted    (i = len)
//!                                 └──▶ Written    (response sent, i = len)
//!                                                    └──▶ Done
//! ```
//!
//! Handlers run left to right. A handler that returns without calling
//! [`Context::next`] or [`Context::abort`] passes control onward; a handler
//! that calls `next` runs the rest of the chain before its own code resumes.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::handler::{Chain, HandlerRef};
use crate::transport::Connection;

// ============================================================================
// Types
// ============================================================================

/// Scratch value stored by handlers.
type Value = Box<dyn Any + Send + Sync>;

/// Programming error recorded during a cycle.
struct Fault {
    error: Error,
    backtrace: Backtrace,
}

// ============================================================================
// CycleOutcome
// ============================================================================

/// Result of running one message cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The chain produced a response.
    Responded(Vec<u8>),
    /// The chain finished without writing.
    NoResponse,
    /// A handler panicked or misused the context; an empty frame is sent.
    Failed {
        /// What went wrong.
        error: Error,
        /// Where it was detected.
        backtrace: Backtrace,
    },
}

impl CycleOutcome {
    /// Returns the bytes to enqueue for this cycle.
    ///
    /// Every request gets exactly one frame, empty when the chain wrote
    /// nothing or the cycle failed.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Responded(body) => body,
            Self::NoResponse | Self::Failed { .. } => Vec::new(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// State of one in-flight message cycle.
pub struct Context {
    /// Normalized request payload.
    request: Vec<u8>,
    /// Response sink.
    response: Vec<u8>,
    /// Whether a response was sent this cycle.
    written: bool,
    /// Resolved handler chain.
    chain: Chain,
    /// Cursor into `chain`.
    index: usize,
    /// Scratch map shared by the chain's handlers.
    values: FxHashMap<String, Value>,
    /// Owning connection, absent for detached contexts.
    connection: Option<Connection>,
    /// First programming error of this cycle.
    fault: Option<Fault>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
            written: false,
            chain: empty_chain(),
            index: 0,
            values: FxHashMap::default(),
            connection: None,
            fault: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_len", &self.request.len())
            .field("written", &self.written)
            .field("index", &self.index)
            .field("chain_len", &self.chain.len())
            .field("values", &self.values.len())
            .finish_non_exhaustive()
    }
}

/// Returns a chain with no handlers.
#[inline]
fn empty_chain() -> Chain {
    Arc::from(Vec::<HandlerRef>::new())
}

// ============================================================================
// Context - Lifecycle
// ============================================================================

impl Context {
    /// Creates a detached context holding `request`.
    ///
    /// Detached contexts have no connection; they are handy for exercising
    /// handlers directly.
    #[must_use]
    pub fn for_request(request: Vec<u8>) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Loads a new request into a reset context.
    pub(crate) fn prepare(&mut self, request: Vec<u8>, connection: Option<Connection>) {
        self.request = request;
        self.connection = connection;
    }

    /// Installs the chain to run and rewinds the cursor.
    pub(crate) fn set_chain(&mut self, chain: Chain) {
        self.chain = chain;
        self.index = 0;
    }

    /// Clears every field so the context can serve another cycle.
    pub(crate) fn reset(&mut self) {
        self.request.clear();
        self.response.clear();
        self.written = false;
        self.chain = empty_chain();
        self.index = 0;
        self.values.clear();
        self.connection = None;
        self.fault = None;
    }

    /// Resolves the chain with `resolve` and runs it.
    ///
    /// Panics from the resolver or any handler are caught here and reported
    /// as [`CycleOutcome::Failed`], as is a repeated send.
    pub(crate) fn execute<F>(&mut self, resolve: F) -> CycleOutcome
    where
        F: FnOnce(&Self) -> Chain,
    {
        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            let chain = resolve(self);
            self.set_chain(chain);
            self.proceed();
        }));

        if let Err(payload) = run {
            self.abort();
            return CycleOutcome::Failed {
                error: Error::handler_panic(panic_message(payload.as_ref())),
                backtrace: Backtrace::capture(),
            };
        }

        if let Some(fault) = self.fault.take() {
            return CycleOutcome::Failed {
                error: fault.error,
                backtrace: fault.backtrace,
            };
        }

        if self.written {
            CycleOutcome::Responded(std::mem::take(&mut self.response))
        } else {
            CycleOutcome::NoResponse
        }
    }

    /// Runs handlers from the cursor until the chain ends or is aborted.
    pub(crate) fn proceed(&mut self) {
        let chain = Arc::clone(&self.chain);
        while self.index < chain.len() {
            chain[self.index].serve(self);
            self.index += 1;
        }
    }
}

// ============================================================================
// Context - Chain Control
// ============================================================================

impl Context {
    /// Runs the remaining handlers now.
    ///
    /// Used by middleware that needs code both before and after downstream
    /// handlers. When `next` returns, the chain is finished.
    pub fn next(&mut self) {
        self.index += 1;
        self.proceed();
    }

    /// Prevents any further handler from running.
    ///
    /// Handlers that already ran are unaffected.
    #[inline]
    pub fn abort(&mut self) {
        self.index = self.chain.len();
    }

    /// Returns `true` once no further handler will run.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.index >= self.chain.len()
    }
}

// ============================================================================
// Context - Request
// ============================================================================

impl Context {
    /// Returns the request payload.
    #[inline]
    #[must_use]
    pub fn request_body(&self) -> &[u8] {
        &self.request
    }

    /// Decodes the request payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload does not decode into `T`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.request)?)
    }

    /// Returns the owning connection, if any.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Returns the peer's network address.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().and_then(Connection::peer_addr)
    }
}

// ============================================================================
// Context - Response
// ============================================================================

impl Context {
    /// Sends `data` as this cycle's response and aborts the chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultipleResponse`] if a response was already sent.
    /// The second payload is discarded and the whole cycle is reported as
    /// failed.
    pub fn send_data(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        if self.written {
            self.abort();
            if self.fault.is_none() {
                self.fault = Some(Fault {
                    error: Error::MultipleResponse,
                    backtrace: Backtrace::capture(),
                });
            }
            return Err(Error::MultipleResponse);
        }

        self.response.extend_from_slice(data.as_ref());
        self.written = true;
        self.abort();
        Ok(())
    }

    /// Sends a text response.
    ///
    /// # Errors
    ///
    /// See [`Context::send_data`].
    #[inline]
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_data(text.as_bytes())
    }

    /// Serializes `value` as JSON and sends it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails, otherwise see
    /// [`Context::send_data`].
    pub fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.send_data(data)
    }

    /// Returns the response written so far.
    #[inline]
    #[must_use]
    pub fn response(&self) -> &[u8] {
        &self.response
    }

    /// Returns `true` if a response was sent.
    #[inline]
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Returns `true` if a programming error was recorded this cycle.
    #[inline]
    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.fault.is_some()
    }
}

// ============================================================================
// Context - Scratch Values
// ============================================================================

impl Context {
    /// Stores a value for later handlers, replacing any previous one.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Returns a mutable reference to the value under `key`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of another type is left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if a value is stored under `key`.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Renders a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
