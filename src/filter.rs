use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::chain::ExecChain;
use crate::context::ExecContext;
use crate::interceptor::{Interceptor, order};
use crate::request::Request;
use crate::response::Response;

/// A pre-processing hook that runs before the request is handed to the
/// transceiver, simpler than a full [`Interceptor`]: it may rewrite the
/// request but never sees the response.
pub trait RequestFilter: Send + Sync {
    fn filter<'a>(
        &'a self,
        request: &'a mut Request,
        context: &'a ExecContext,
    ) -> BoxFuture<'a, crate::Result<()>>;

    fn name(&self) -> &'static str {
        "filter"
    }
}

/// The interceptor that hosts the [`RequestFilter`] sequence.
///
/// Filters are chained strictly sequentially, never in parallel: filter *k*
/// starts only after filter *k-1*'s future completed. The first filter error
/// aborts the remainder and fails the outward future.
pub struct FilteringExec {
    filters: Arc<[Arc<dyn RequestFilter>]>,
}

impl FilteringExec {
    pub fn new(filters: Vec<Arc<dyn RequestFilter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }
}

impl Interceptor for FilteringExec {
    fn proceed(
        &self,
        mut request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, crate::Result<Response>> {
        let context = chain.context().clone();

        // Only the first pass per logical request finds the listener in the
        // slot; retry and redirect re-entries leave the events silent.
        if let Some(listener) = context.take_filter_listener() {
            listener.on_interceptors_end(&context);
            listener.on_filters_start(&context);
        }

        if self.filters.is_empty() {
            return chain.proceed(request);
        }

        let filters = self.filters.clone();
        async move {
            for filter in filters.iter() {
                filter.filter(&mut request, &context).await?;
            }
            chain.proceed(request).await
        }
        .boxed()
    }

    fn order(&self) -> i32 {
        order::FILTERING
    }

    fn name(&self) -> &'static str {
        "filtering"
    }
}
