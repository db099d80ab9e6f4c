use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::ExecContext;
use crate::request::Request;
use crate::response::Response;

/// The wire-level collaborator that actually performs the network call.
///
/// Implementations must surface failures only through the returned future,
/// never by panicking out of `handle`; the chain additionally shields callers
/// from panics, but that is a last resort, not part of the contract.
/// Per-attempt timeouts and cancellation of an in-flight call are the
/// transceiver's responsibility.
pub trait Transceiver: Send + Sync {
    fn handle(
        &self,
        request: Request,
        context: Arc<ExecContext>,
    ) -> BoxFuture<'static, crate::Result<Response>>;
}
