use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::time::sleep;
use tracing::debug;

use crate::backoff::{Backoff, NoBackoff};
use crate::chain::ExecChain;
use crate::context::ExecContext;
use crate::error::{Error, TransportErrorKind};
use crate::interceptor::{Interceptor, order};
use crate::request::Request;
use crate::response::Response;

/// Policy deciding whether a failed attempt is eligible for a retry.
pub trait RetryPredicate: Send + Sync {
    fn can_retry(
        &self,
        request: &Request,
        response: Option<&Response>,
        context: &ExecContext,
        cause: &Error,
    ) -> bool;
}

/// Retries only connect failures and closed-connection/closed-stream
/// transport errors; never HTTP error statuses and never arbitrary errors.
#[derive(Debug, Default)]
pub struct DefaultRetryPredicate;

impl RetryPredicate for DefaultRetryPredicate {
    fn can_retry(
        &self,
        _request: &Request,
        _response: Option<&Response>,
        _context: &ExecContext,
        cause: &Error,
    ) -> bool {
        match cause {
            Error::Transport { kind, .. } => matches!(
                kind,
                TransportErrorKind::Connect
                    | TransportErrorKind::ConnectionClosed
                    | TransportErrorKind::StreamClosed
            ),
            _ => false,
        }
    }
}

/// Re-runs the downstream chain when an attempt fails and the predicate deems
/// the failure retryable.
///
/// The retry budget lives in the context's `retry_count`, which persists
/// across every attempt of one logical request: with `max_retries = N` the
/// downstream chain runs at most N+1 times. A request with a non-replayable
/// body, or a context with `max_retries == 0`, passes through untouched.
///
/// The loop awaits each attempt's future in turn, so the stack stays bounded
/// no matter how many attempts run.
pub struct RetryInterceptor {
    predicate: Arc<dyn RetryPredicate>,
    backoff: Arc<dyn Backoff>,
}

impl RetryInterceptor {
    pub fn new() -> Self {
        Self {
            predicate: Arc::new(DefaultRetryPredicate),
            backoff: Arc::new(NoBackoff),
        }
    }

    pub fn predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for RetryInterceptor {
    fn proceed(
        &self,
        request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, crate::Result<Response>> {
        let context = chain.context().clone();
        if context.max_retries() < 1 {
            return chain.proceed(request);
        }
        let Some(original) = request.try_clone() else {
            // Streamed body: nothing to resend, hand through as-is.
            return chain.proceed(request);
        };

        let predicate = self.predicate.clone();
        let backoff = self.backoff.clone();
        async move {
            let mut outbound = request;
            loop {
                match chain.proceed(outbound).await {
                    Ok(response) => {
                        context.record_retry();
                        return Ok(response);
                    }
                    Err(cause) => {
                        if context.retry_count() >= context.max_retries() {
                            return Err(cause);
                        }
                        if !predicate.can_retry(&original, None, &context, &cause) {
                            return Err(cause);
                        }
                        let Some(replay) = original.try_clone() else {
                            return Err(cause);
                        };
                        let attempt = context.record_retry();
                        let delay = backoff.delay(attempt);
                        debug!(
                            attempt,
                            max_retries = context.max_retries(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying failed attempt"
                        );
                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                        outbound = replay;
                    }
                }
            }
        }
        .boxed()
    }

    fn order(&self) -> i32 {
        order::RETRY
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}
