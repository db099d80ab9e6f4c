use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::chain::ExecChain;
use crate::request::Request;
use crate::response::Response;

/// Default priorities for the built-in interceptors. Lower runs first, which
/// means it wraps everything that runs after it:
///
/// | interceptor     | order |
/// |-----------------|-------|
/// | expect-continue | 100   |
/// | redirect        | 300   |
/// | retry           | 500   |
/// | filtering       | 900   |
///
/// so each retry attempt re-runs the filters and the transceiver, and each
/// redirect hop restarts the retry-budgeted section. Custom interceptors slot
/// anywhere between.
pub mod order {
    pub const EXPECT_CONTINUE: i32 = 100;
    pub const REDIRECT: i32 = 300;
    pub const RETRY: i32 = 500;
    pub const FILTERING: i32 = 900;
}

/// One unit of cross-cutting request/response behavior.
///
/// `proceed` must hand the request down via `chain.proceed(..)` (possibly more
/// than once, as retry does) and may rewrite the request before and the
/// response after. It must return its future without blocking.
pub trait Interceptor: Send + Sync {
    fn proceed(
        &self,
        request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, crate::Result<Response>>;

    /// Priority within the chain; lower values run earlier (outermost).
    fn order(&self) -> i32;

    /// Short name used in logs and panic reports.
    fn name(&self) -> &'static str {
        "interceptor"
    }
}

/// Ascending by `order`, ties keep insertion order. Called once at executor
/// build time, never per request.
pub(crate) fn sort_interceptors(interceptors: &mut [Arc<dyn Interceptor>]) {
    interceptors.sort_by_key(|interceptor| interceptor.order());
}
