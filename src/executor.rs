use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::chain::ExecChain;
use crate::context::ExecContext;
use crate::error::Error;
use crate::filter::{FilteringExec, RequestFilter};
use crate::interceptor::{Interceptor, sort_interceptors};
use crate::request::Request;
use crate::response::Response;
use crate::transceiver::Transceiver;

/// Entry point of the engine: owns the fixed, pre-sorted interceptor list and
/// the transceiver, and builds one [`ExecChain`] per executed request.
pub struct RequestExecutor {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transceiver: Arc<dyn Transceiver>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::default()
    }

    /// Runs `request` through the interceptor chain down to the transceiver.
    ///
    /// Fires `on_interceptors_start` before the chain proceeds and
    /// `on_exchange_complete` when the outward future settles. Dropping the
    /// returned future cancels best-effort: the attempt already in flight is
    /// not interrupted, but nothing further is scheduled.
    pub fn execute(
        &self,
        request: Request,
        context: Arc<ExecContext>,
    ) -> BoxFuture<'static, crate::Result<Response>> {
        let chain = ExecChain::build(&self.interceptors, self.transceiver.clone(), context.clone());
        if let Some(listener) = context.listener() {
            listener.on_interceptors_start(&context);
        }
        let future = chain.proceed(request);
        async move {
            let result = future.await;
            if let Some(listener) = context.listener() {
                listener.on_exchange_complete(&context, &result);
            }
            result
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct RequestExecutorBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
    filters: Vec<Arc<dyn RequestFilter>>,
    transceiver: Option<Arc<dyn Transceiver>>,
}

impl RequestExecutorBuilder {
    pub fn interceptor(self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptor_arc(Arc::new(interceptor))
    }

    pub fn interceptor_arc(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Appends a pre-processing filter. All registered filters run strictly in
    /// registration order inside one filtering stage just before the
    /// transceiver.
    pub fn request_filter(self, filter: impl RequestFilter + 'static) -> Self {
        self.request_filter_arc(Arc::new(filter))
    }

    pub fn request_filter_arc(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn transceiver(self, transceiver: impl Transceiver + 'static) -> Self {
        self.transceiver_arc(Arc::new(transceiver))
    }

    pub fn transceiver_arc(mut self, transceiver: Arc<dyn Transceiver>) -> Self {
        self.transceiver = Some(transceiver);
        self
    }

    pub fn try_build(self) -> crate::Result<RequestExecutor> {
        let Some(transceiver) = self.transceiver else {
            return Err(Error::Configuration {
                message: "a transceiver is required".to_owned(),
            });
        };

        // The filtering stage is always present: it owns the
        // interceptors-end/filters-start lifecycle hand-off even with zero
        // filters registered.
        let mut interceptors = self.interceptors;
        interceptors.push(Arc::new(FilteringExec::new(self.filters)));
        sort_interceptors(&mut interceptors);
        debug!(interceptors = interceptors.len(), "interceptor chain built");

        Ok(RequestExecutor {
            interceptors,
            transceiver,
        })
    }
}
