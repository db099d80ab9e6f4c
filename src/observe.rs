use crate::context::ExecContext;
use crate::response::Response;

/// Observability sink for request lifecycle events.
///
/// Each hook fires exactly once per logical request, no matter how many times
/// retries or redirects re-enter the interceptor chain.
pub trait Listener: Send + Sync {
    fn on_interceptors_start(&self, _context: &ExecContext) {}

    fn on_interceptors_end(&self, _context: &ExecContext) {}

    fn on_filters_start(&self, _context: &ExecContext) {}

    fn on_exchange_complete(&self, _context: &ExecContext, _result: &crate::Result<Response>) {}
}
