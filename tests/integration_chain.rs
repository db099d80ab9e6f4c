use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::header::EXPECT;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use execx::prelude::*;
use execx::{ExecContext, order};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Succeeds on attempt `succeed_at` (1-based) and fails with a connect error
/// before that, recording every request it sees.
struct FlakyTransceiver {
    succeed_at: usize,
    calls: AtomicUsize,
    seen_headers: Mutex<Vec<HeaderMap>>,
}

impl FlakyTransceiver {
    fn new(succeed_at: usize) -> Arc<Self> {
        Arc::new(Self {
            succeed_at,
            calls: AtomicUsize::new(0),
            seen_headers: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen_headers(&self) -> Vec<HeaderMap> {
        lock_unpoisoned(&self.seen_headers).clone()
    }
}

impl Transceiver for FlakyTransceiver {
    fn handle(
        &self,
        request: Request,
        _context: Arc<ExecContext>,
    ) -> BoxFuture<'static, execx::Result<Response>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock_unpoisoned(&self.seen_headers).push(request.headers().clone());
        let outcome = if attempt >= self.succeed_at {
            Ok(Response::new(
                StatusCode::OK,
                HeaderMap::new(),
                Bytes::new(),
            ))
        } else {
            Err(Error::transport(
                TransportErrorKind::Connect,
                request.method().clone(),
                request.uri().to_string(),
                "synthetic connect failure",
            ))
        };
        futures_util::future::ready(outcome).boxed()
    }
}

#[derive(Default)]
struct CountingListener {
    interceptors_start: AtomicUsize,
    interceptors_end: AtomicUsize,
    filters_start: AtomicUsize,
    exchange_complete: AtomicUsize,
}

impl Listener for CountingListener {
    fn on_interceptors_start(&self, _context: &ExecContext) {
        self.interceptors_start.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interceptors_end(&self, _context: &ExecContext) {
        self.interceptors_end.fetch_add(1, Ordering::SeqCst);
    }

    fn on_filters_start(&self, _context: &ExecContext) {
        self.filters_start.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exchange_complete(&self, _context: &ExecContext, _result: &execx::Result<Response>) {
        self.exchange_complete.fetch_add(1, Ordering::SeqCst);
    }
}

struct TracingInterceptor {
    tag: &'static str,
    priority: i32,
    trace: Arc<Mutex<Vec<&'static str>>>,
}

impl Interceptor for TracingInterceptor {
    fn proceed(
        &self,
        request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, execx::Result<Response>> {
        lock_unpoisoned(&self.trace).push(self.tag);
        chain.proceed(request)
    }

    fn order(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &'static str {
        self.tag
    }
}

struct HeaderFilter {
    tag: &'static str,
    header: &'static str,
    trace: Arc<Mutex<Vec<&'static str>>>,
}

impl RequestFilter for HeaderFilter {
    fn filter<'a>(
        &'a self,
        request: &'a mut Request,
        _context: &'a ExecContext,
    ) -> BoxFuture<'a, execx::Result<()>> {
        async move {
            lock_unpoisoned(&self.trace).push(self.tag);
            request.headers_mut().insert(
                self.header
                    .parse::<http::header::HeaderName>()
                    .expect("header name should parse"),
                HeaderValue::from_static("set"),
            );
            Ok(())
        }
        .boxed()
    }

    fn name(&self) -> &'static str {
        self.tag
    }
}

struct FailingFilter {
    trace: Arc<Mutex<Vec<&'static str>>>,
}

impl RequestFilter for FailingFilter {
    fn filter<'a>(
        &'a self,
        request: &'a mut Request,
        _context: &'a ExecContext,
    ) -> BoxFuture<'a, execx::Result<()>> {
        lock_unpoisoned(&self.trace).push("failing");
        let cause = Error::transport(
            TransportErrorKind::Other,
            request.method().clone(),
            request.uri().to_string(),
            "filter rejected the request",
        );
        futures_util::future::ready(Err(cause)).boxed()
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct PanickingInterceptor;

impl Interceptor for PanickingInterceptor {
    fn proceed(
        &self,
        _request: Request,
        _chain: ExecChain,
    ) -> BoxFuture<'static, execx::Result<Response>> {
        panic!("interceptor exploded")
    }

    fn order(&self) -> i32 {
        200
    }

    fn name(&self) -> &'static str {
        "panicky"
    }
}

struct PanickingTransceiver;

impl Transceiver for PanickingTransceiver {
    fn handle(
        &self,
        _request: Request,
        _context: Arc<ExecContext>,
    ) -> BoxFuture<'static, execx::Result<Response>> {
        async move { panic!("transceiver exploded") }.boxed()
    }
}

fn get(uri: &str) -> Request {
    Request::new(Method::GET, uri.parse().expect("uri should parse"))
}

fn plain_context() -> Arc<ExecContext> {
    Arc::new(
        ExecContext::builder()
            .try_build()
            .expect("context should build"),
    )
}

#[tokio::test]
async fn lifecycle_events_fire_exactly_once_despite_retries() {
    let listener = Arc::new(CountingListener::default());
    let transceiver = FlakyTransceiver::new(3);
    let executor = RequestExecutor::builder()
        .interceptor(RetryInterceptor::new())
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");
    let context = Arc::new(
        ExecContext::builder()
            .max_retries(5)
            .listener(listener.clone())
            .try_build()
            .expect("context should build"),
    );

    executor
        .execute(get("http://host/items"), context)
        .await
        .expect("third attempt succeeds");

    assert_eq!(transceiver.calls(), 3);
    assert_eq!(listener.interceptors_start.load(Ordering::SeqCst), 1);
    assert_eq!(listener.interceptors_end.load(Ordering::SeqCst), 1);
    assert_eq!(listener.filters_start.load(Ordering::SeqCst), 1);
    assert_eq!(listener.exchange_complete.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn interceptors_run_ascending_by_order_with_stable_ties() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .interceptor(TracingInterceptor {
            tag: "tie-first",
            priority: 250,
            trace: trace.clone(),
        })
        .interceptor(TracingInterceptor {
            tag: "outer",
            priority: 50,
            trace: trace.clone(),
        })
        .interceptor(TracingInterceptor {
            tag: "tie-second",
            priority: 250,
            trace: trace.clone(),
        })
        .transceiver_arc(transceiver)
        .try_build()
        .expect("executor should build");

    executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect("exchange succeeds");

    assert_eq!(
        *lock_unpoisoned(&trace),
        vec!["outer", "tie-first", "tie-second"]
    );
}

#[tokio::test]
async fn filters_run_sequentially_in_registration_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .request_filter(HeaderFilter {
            tag: "first",
            header: "x-first",
            trace: trace.clone(),
        })
        .request_filter(HeaderFilter {
            tag: "second",
            header: "x-second",
            trace: trace.clone(),
        })
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");

    executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect("exchange succeeds");

    assert_eq!(*lock_unpoisoned(&trace), vec!["first", "second"]);
    let seen = transceiver.seen_headers();
    assert!(seen[0].contains_key("x-first"));
    assert!(seen[0].contains_key("x-second"));
}

#[tokio::test]
async fn failing_filter_aborts_remaining_filters_and_the_request() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .request_filter(FailingFilter {
            trace: trace.clone(),
        })
        .request_filter(HeaderFilter {
            tag: "never-runs",
            header: "x-never",
            trace: trace.clone(),
        })
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");

    let error = executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect_err("the failing filter fails the exchange");

    assert_eq!(error.code(), ErrorCode::Transport);
    assert_eq!(*lock_unpoisoned(&trace), vec!["failing"]);
    assert_eq!(transceiver.calls(), 0);
}

#[tokio::test]
async fn zero_filters_pass_the_request_straight_through() {
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");

    let response = executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect("exchange succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transceiver.calls(), 1);
}

#[tokio::test]
async fn expect_continue_is_not_added_for_empty_bodies() {
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .interceptor(ExpectContinueInterceptor::default())
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");
    let context = Arc::new(
        ExecContext::builder()
            .expect_continue(true)
            .try_build()
            .expect("context should build"),
    );

    executor
        .execute(get("http://host/items"), context)
        .await
        .expect("exchange succeeds");

    assert!(!transceiver.seen_headers()[0].contains_key(EXPECT));
}

#[tokio::test]
async fn existing_expect_header_is_left_untouched() {
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .interceptor(ExpectContinueInterceptor::default())
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");
    let context = Arc::new(
        ExecContext::builder()
            .expect_continue(true)
            .try_build()
            .expect("context should build"),
    );

    let request = get("http://host/items")
        .with_body(Body::buffered(&b"payload"[..]))
        .with_header(EXPECT, HeaderValue::from_static("202-checkpoint"));

    executor
        .execute(request, context)
        .await
        .expect("exchange succeeds");

    let seen = transceiver.seen_headers();
    assert_eq!(
        seen[0].get(EXPECT).expect("expect header should survive"),
        "202-checkpoint"
    );
}

#[tokio::test]
async fn streamed_body_has_expect_header_stripped() {
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .interceptor(ExpectContinueInterceptor::default())
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");
    let context = Arc::new(
        ExecContext::builder()
            .expect_continue(true)
            .try_build()
            .expect("context should build"),
    );

    let chunks = vec![Ok::<Bytes, std::io::Error>(Bytes::from_static(b"chunk"))];
    let request = get("http://host/upload")
        .with_body(Body::Streamed(StreamBody::new(futures_util::stream::iter(
            chunks,
        ))))
        .with_header(EXPECT, HeaderValue::from_static("100-continue"));

    executor
        .execute(request, context)
        .await
        .expect("exchange succeeds");

    assert!(!transceiver.seen_headers()[0].contains_key(EXPECT));
}

#[tokio::test]
async fn panicking_interceptor_settles_the_future_with_an_error() {
    let transceiver = FlakyTransceiver::new(1);
    let executor = RequestExecutor::builder()
        .interceptor(PanickingInterceptor)
        .transceiver_arc(transceiver.clone())
        .try_build()
        .expect("executor should build");

    let error = executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect_err("the panic must surface as an error");

    match error {
        Error::InterceptorPanic {
            interceptor,
            message,
        } => {
            assert_eq!(interceptor, "panicky");
            assert_eq!(message, "interceptor exploded");
        }
        other => panic!("unexpected error variant: {other}"),
    }
    assert_eq!(transceiver.calls(), 0);
}

#[tokio::test]
async fn panicking_transceiver_is_shielded_at_the_terminal_node() {
    let executor = RequestExecutor::builder()
        .transceiver(PanickingTransceiver)
        .try_build()
        .expect("executor should build");

    let error = executor
        .execute(get("http://host/items"), plain_context())
        .await
        .expect_err("the panic must surface as an error");

    assert_eq!(error.code(), ErrorCode::InterceptorPanic);
}

#[test]
fn executor_requires_a_transceiver() {
    let error = RequestExecutor::builder()
        .interceptor(RetryInterceptor::new())
        .try_build()
        .expect_err("building without a transceiver must fail");
    assert_eq!(error.code(), ErrorCode::Configuration);
}

#[test]
fn builtin_order_constants_compose_outermost_first() {
    assert!(order::EXPECT_CONTINUE < order::REDIRECT);
    assert!(order::REDIRECT < order::RETRY);
    assert!(order::RETRY < order::FILTERING);
}
