//! `execx` is an internal async interceptor-chain execution engine for HTTP
//! client SDKs: retry, redirect following, 100-continue negotiation, and
//! pre-request filtering composed around a pluggable wire transport.
//!
//! The crate owns no socket I/O, TLS, or framing. It drives a [`Transceiver`]
//! you supply and reports lifecycle events through an optional [`Listener`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use execx::prelude::*;
//! use futures_util::FutureExt;
//! use futures_util::future::BoxFuture;
//! use http::Method;
//!
//! struct LoopbackTransceiver;
//!
//! impl Transceiver for LoopbackTransceiver {
//!     fn handle(
//!         &self,
//!         _request: Request,
//!         _context: Arc<ExecContext>,
//!     ) -> BoxFuture<'static, execx::Result<Response>> {
//!         let response = Response::new(
//!             http::StatusCode::OK,
//!             http::HeaderMap::new(),
//!             bytes::Bytes::new(),
//!         );
//!         futures_util::future::ready(Ok(response)).boxed()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> execx::Result<()> {
//!     let executor = RequestExecutor::builder()
//!         .interceptor(ExpectContinueInterceptor::default())
//!         .interceptor(RedirectInterceptor::default())
//!         .interceptor(RetryInterceptor::new())
//!         .transceiver(LoopbackTransceiver)
//!         .try_build()?;
//!
//!     let context = Arc::new(
//!         ExecContext::builder()
//!             .max_retries(3)
//!             .max_redirects(5)
//!             .try_build()?,
//!     );
//!     let uri = "https://api.example.com/v1/items".parse().expect("uri");
//!     let response = executor.execute(Request::new(Method::GET, uri), context).await?;
//!     println!("status={}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! # Composition Order
//!
//! Interceptors are sorted once, at executor build time, ascending by
//! [`Interceptor::order`] with stable ties. The built-in priorities place the
//! chain as expect-continue, then redirect, then retry, then the filtering
//! stage, then the transceiver; see [`order`] for the table.

mod backoff;
mod chain;
mod context;
mod error;
mod executor;
mod expect_continue;
mod filter;
mod interceptor;
mod observe;
mod redirect;
mod request;
mod response;
mod retry;
mod transceiver;

pub use crate::backoff::{Backoff, ExponentialBackoff, NoBackoff};
pub use crate::chain::ExecChain;
pub use crate::context::{ExecContext, ExecContextBuilder};
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::executor::{RequestExecutor, RequestExecutorBuilder};
pub use crate::expect_continue::ExpectContinueInterceptor;
pub use crate::filter::{FilteringExec, RequestFilter};
pub use crate::interceptor::{Interceptor, order};
pub use crate::observe::Listener;
pub use crate::redirect::{RedirectInterceptor, RelativeInfo, to_relative_info};
pub use crate::request::{Body, FileBody, Part, Request, StreamBody};
pub use crate::response::Response;
pub use crate::retry::{DefaultRetryPredicate, RetryInterceptor, RetryPredicate};
pub use crate::transceiver::Transceiver;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        Backoff, Body, DefaultRetryPredicate, Error, ErrorCode, ExecChain, ExecContext,
        ExpectContinueInterceptor, ExponentialBackoff, FilteringExec, Interceptor, Listener,
        NoBackoff, Part, RedirectInterceptor, RelativeInfo, Request, RequestExecutor,
        RequestFilter, Response, RetryInterceptor, RetryPredicate, StreamBody, Transceiver,
        TransportErrorKind,
    };
}
