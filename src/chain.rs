use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::context::ExecContext;
use crate::error::Error;
use crate::interceptor::Interceptor;
use crate::request::Request;
use crate::response::Response;
use crate::transceiver::Transceiver;

/// The linked continuation connecting interceptors to the transport step.
///
/// A chain is built once per logical request, right to left: the terminal node
/// invokes the [`Transceiver`], every other node wraps one [`Interceptor`] and
/// the remainder of the chain. Handles are cheap `Arc` clones, so an
/// interceptor may proceed the same downstream chain several times (retry and
/// redirect do).
#[derive(Clone)]
pub struct ExecChain {
    node: Arc<ChainNode>,
    context: Arc<ExecContext>,
}

enum ChainNode {
    Step {
        interceptor: Arc<dyn Interceptor>,
        next: ExecChain,
    },
    Terminal {
        transceiver: Arc<dyn Transceiver>,
    },
}

impl ExecChain {
    pub(crate) fn build(
        interceptors: &[Arc<dyn Interceptor>],
        transceiver: Arc<dyn Transceiver>,
        context: Arc<ExecContext>,
    ) -> Self {
        let mut chain = Self {
            node: Arc::new(ChainNode::Terminal { transceiver }),
            context: context.clone(),
        };
        for interceptor in interceptors.iter().rev() {
            chain = Self {
                node: Arc::new(ChainNode::Step {
                    interceptor: interceptor.clone(),
                    next: chain,
                }),
                context: context.clone(),
            };
        }
        chain
    }

    /// The state shared by every node of this logical request.
    pub fn context(&self) -> &Arc<ExecContext> {
        &self.context
    }

    /// Hands the request to the next step and always comes back with a
    /// future: a panic inside the step, whether before or after its first
    /// await point, settles the future with [`Error::InterceptorPanic`]
    /// instead of unwinding into the caller.
    pub fn proceed(&self, request: Request) -> BoxFuture<'static, crate::Result<Response>> {
        match &*self.node {
            ChainNode::Step { interceptor, next } => {
                let name = interceptor.name();
                let next = next.clone();
                let attempt =
                    std::panic::catch_unwind(AssertUnwindSafe(|| interceptor.proceed(request, next)));
                match attempt {
                    Ok(future) => shield_panics(name, future),
                    Err(panic) => futures_util::future::ready(Err(panic_error(name, panic))).boxed(),
                }
            }
            ChainNode::Terminal { transceiver } => {
                let context = self.context.clone();
                let attempt =
                    std::panic::catch_unwind(AssertUnwindSafe(|| transceiver.handle(request, context)));
                match attempt {
                    Ok(future) => shield_panics("transceiver", future),
                    Err(panic) => {
                        futures_util::future::ready(Err(panic_error("transceiver", panic))).boxed()
                    }
                }
            }
        }
    }
}

fn shield_panics(
    name: &'static str,
    future: BoxFuture<'static, crate::Result<Response>>,
) -> BoxFuture<'static, crate::Result<Response>> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .map(move |outcome| match outcome {
            Ok(result) => result,
            Err(panic) => Err(panic_error(name, panic)),
        })
        .boxed()
}

fn panic_error(name: &'static str, panic: Box<dyn std::any::Any + Send>) -> Error {
    let message = if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    };
    Error::InterceptorPanic {
        interceptor: name,
        message,
    }
}
