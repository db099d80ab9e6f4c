use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::observe::Listener;

const MAX_COUNTER_LIMIT: usize = 1_000;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-logical-request state shared across every interceptor, retry attempt,
/// and redirect hop of one request.
///
/// Create a fresh context for each logical request and pass it to
/// [`RequestExecutor::execute`]; reusing a context across requests skews the
/// counters and suppresses the filtering-stage lifecycle events, which fire at
/// most once per context.
///
/// The attempt counters are monotonically non-decreasing for the lifetime of
/// the context; nothing resets them mid-flight.
///
/// [`RequestExecutor::execute`]: crate::RequestExecutor::execute
pub struct ExecContext {
    max_retries: usize,
    max_redirects: usize,
    expect_continue_enabled: bool,
    retry_count: AtomicUsize,
    redirect_count: AtomicUsize,
    listener: Option<Arc<dyn Listener>>,
    filter_listener_slot: Mutex<Option<Arc<dyn Listener>>>,
    extensions: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ExecContext {
    pub fn builder() -> ExecContextBuilder {
        ExecContextBuilder::default()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn expect_continue_enabled(&self) -> bool {
        self.expect_continue_enabled
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn redirect_count(&self) -> usize {
        self.redirect_count.load(Ordering::SeqCst)
    }

    pub(crate) fn record_retry(&self) -> usize {
        self.retry_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_redirect(&self) -> usize {
        self.redirect_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn listener(&self) -> Option<Arc<dyn Listener>> {
        self.listener.clone()
    }

    /// Hands out the listener for the filtering stage at most once, so its
    /// lifecycle events cannot fire again when retries or redirects re-enter
    /// the chain.
    pub(crate) fn take_filter_listener(&self) -> Option<Arc<dyn Listener>> {
        lock_unpoisoned(&self.filter_listener_slot).take()
    }

    /// Stores a user-defined property under `key`. Well-known engine state
    /// lives in the typed fields above; this map is only for extensions.
    pub fn set_extension<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        lock_unpoisoned(&self.extensions).insert(key.into(), Arc::new(value));
    }

    pub fn extension<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let value = lock_unpoisoned(&self.extensions).get(key)?.clone();
        value.downcast().ok()
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExecContext")
            .field("max_retries", &self.max_retries)
            .field("max_redirects", &self.max_redirects)
            .field("expect_continue_enabled", &self.expect_continue_enabled)
            .field("retry_count", &self.retry_count())
            .field("redirect_count", &self.redirect_count())
            .finish()
    }
}

#[derive(Default)]
pub struct ExecContextBuilder {
    max_retries: usize,
    max_redirects: usize,
    expect_continue_enabled: bool,
    listener: Option<Arc<dyn Listener>>,
}

impl ExecContextBuilder {
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn expect_continue(mut self, enabled: bool) -> Self {
        self.expect_continue_enabled = enabled;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn Listener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn try_build(self) -> crate::Result<ExecContext> {
        if self.max_retries > MAX_COUNTER_LIMIT {
            return Err(Error::Configuration {
                message: format!(
                    "max_retries {} exceeds the supported limit {MAX_COUNTER_LIMIT}",
                    self.max_retries
                ),
            });
        }
        if self.max_redirects > MAX_COUNTER_LIMIT {
            return Err(Error::Configuration {
                message: format!(
                    "max_redirects {} exceeds the supported limit {MAX_COUNTER_LIMIT}",
                    self.max_redirects
                ),
            });
        }

        Ok(ExecContext {
            max_retries: self.max_retries,
            max_redirects: self.max_redirects,
            expect_continue_enabled: self.expect_continue_enabled,
            retry_count: AtomicUsize::new(0),
            redirect_count: AtomicUsize::new(0),
            filter_listener_slot: Mutex::new(self.listener.clone()),
            listener: self.listener,
            extensions: Mutex::new(HashMap::new()),
        })
    }
}
