use futures_util::future::BoxFuture;
use http::HeaderValue;
use http::header::EXPECT;

use crate::chain::ExecChain;
use crate::interceptor::{Interceptor, order};
use crate::request::Request;
use crate::response::Response;

/// Drives the HTTP 100-continue negotiation header.
///
/// When the feature is enabled on the context, a non-empty replayable body
/// without an `Expect` header gets `Expect: 100-continue` added; an empty or
/// streamed body has any `Expect` header stripped, since the negotiation is
/// pointless for the former and unsupported for the latter. An existing
/// `Expect` header of any value is left untouched.
#[derive(Debug, Default)]
pub struct ExpectContinueInterceptor;

impl Interceptor for ExpectContinueInterceptor {
    fn proceed(
        &self,
        mut request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, crate::Result<Response>> {
        if !chain.context().expect_continue_enabled() {
            return chain.proceed(request);
        }

        if !request.body().is_replayable() || request.body().is_empty() {
            request.headers_mut().remove(EXPECT);
            return chain.proceed(request);
        }

        if !request.headers().contains_key(EXPECT) {
            request
                .headers_mut()
                .insert(EXPECT, HeaderValue::from_static("100-continue"));
        }
        chain.proceed(request)
    }

    fn order(&self) -> i32 {
        order::EXPECT_CONTINUE
    }

    fn name(&self) -> &'static str {
        "expect-continue"
    }
}
