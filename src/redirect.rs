use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, TRANSFER_ENCODING};
use http::{Method, StatusCode, Uri};
use tracing::{debug, warn};

use crate::chain::ExecChain;
use crate::error::Error;
use crate::interceptor::{Interceptor, order};
use crate::request::{Body, Request};
use crate::response::Response;

/// The path/query/fragment triple of a relative redirect location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelativeInfo {
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

/// Decomposes a relative location by splitting on the first `?` and the first
/// `#`; whichever appears first wins, and a missing delimiter leaves that
/// component `None`. This is deliberately the simple split, not full RFC 3986
/// resolution.
pub fn to_relative_info(location: &str) -> RelativeInfo {
    let query_at = location.find('?');
    let fragment_at = location.find('#');
    match (query_at, fragment_at) {
        (None, None) => RelativeInfo {
            path: location.to_owned(),
            query: None,
            fragment: None,
        },
        (Some(query_at), None) => RelativeInfo {
            path: location[..query_at].to_owned(),
            query: Some(location[query_at + 1..].to_owned()),
            fragment: None,
        },
        (None, Some(fragment_at)) => RelativeInfo {
            path: location[..fragment_at].to_owned(),
            query: None,
            fragment: Some(location[fragment_at + 1..].to_owned()),
        },
        (Some(query_at), Some(fragment_at)) if query_at < fragment_at => RelativeInfo {
            path: location[..query_at].to_owned(),
            query: Some(location[query_at + 1..fragment_at].to_owned()),
            fragment: Some(location[fragment_at + 1..].to_owned()),
        },
        // The fragment opens before the query marker, so everything after `#`
        // is fragment and no query exists.
        (Some(_), Some(fragment_at)) => RelativeInfo {
            path: location[..fragment_at].to_owned(),
            query: None,
            fragment: Some(location[fragment_at + 1..].to_owned()),
        },
    }
}

pub(crate) fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Only 303 rewrites the method; 301, 302, 307, and 308 keep the original.
pub(crate) fn redirect_method(method: &Method, status: StatusCode) -> Method {
    if status == StatusCode::SEE_OTHER {
        Method::GET
    } else {
        method.clone()
    }
}

/// 307 and 308 carry the entity forward; 301, 302, and 303 drop it.
pub(crate) fn preserves_body(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    )
}

fn invalid_location_error(location: &str, basis: &Request) -> Error {
    Error::InvalidRedirectLocation {
        location: location.to_owned(),
        method: basis.method().clone(),
        uri: basis.uri().to_string(),
    }
}

fn resolve_location(basis: &Request, location: &str) -> crate::Result<Uri> {
    if location.starts_with('/') {
        let info = to_relative_info(location);
        let scheme = basis
            .uri()
            .scheme_str()
            .ok_or_else(|| invalid_location_error(location, basis))?;
        let authority = basis
            .uri()
            .authority()
            .ok_or_else(|| invalid_location_error(location, basis))?;

        let mut path_and_query = info.path;
        if let Some(query) = info.query {
            path_and_query.push('?');
            path_and_query.push_str(&query);
        }
        // The fragment is client-side state and is not carried to the wire.
        return Uri::builder()
            .scheme(scheme)
            .authority(authority.as_str())
            .path_and_query(path_and_query.as_str())
            .build()
            .map_err(|_| invalid_location_error(location, basis));
    }

    let target: Uri = location
        .parse()
        .map_err(|_| invalid_location_error(location, basis))?;
    if target.scheme_str().is_none() || target.host().is_none() {
        return Err(invalid_location_error(location, basis));
    }
    Ok(target)
}

/// Builds the follow-up request for one redirect hop from the request that
/// produced the redirect response.
pub(crate) fn build_redirect_request(
    basis: &Request,
    status: StatusCode,
    location: &str,
) -> crate::Result<Request> {
    let target = resolve_location(basis, location)?;
    let method = redirect_method(basis.method(), status);
    let body = if preserves_body(status) {
        basis.body().try_clone().unwrap_or_default()
    } else {
        Body::Empty
    };

    let mut headers = basis.headers().clone();
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);
    headers.remove(CONTENT_TYPE);

    let mut next = Request::new(method, target).with_body(body);
    *next.headers_mut() = headers;
    Ok(next)
}

/// Follows 3xx responses that carry a `Location` header, up to the context's
/// `max_redirects`.
///
/// Transport failures pass upward untouched: following a redirect never masks
/// an error. A response without a `Location` header is not treated as a
/// redirect and is delivered as-is; a `Location` header that is present but
/// empty or unreadable fails the exchange, as does an unparseable target or
/// an exhausted hop budget.
#[derive(Debug, Default)]
pub struct RedirectInterceptor;

impl Interceptor for RedirectInterceptor {
    fn proceed(
        &self,
        request: Request,
        chain: ExecChain,
    ) -> BoxFuture<'static, crate::Result<Response>> {
        let context = chain.context().clone();
        if context.max_redirects() < 1 {
            return chain.proceed(request);
        }

        async move {
            let mut current = request;
            loop {
                // A streamed body cannot be resent on a later hop, so redirect
                // handling is disabled for it entirely.
                let Some(outbound) = current.try_clone() else {
                    return chain.proceed(current).await;
                };

                let response = chain.proceed(outbound).await?;
                let status = response.status();
                if !is_redirect_status(status) || !response.headers().contains_key(LOCATION) {
                    return Ok(response);
                }

                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .filter(|value| !value.is_empty())
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| Error::MissingRedirectLocation {
                        status: status.as_u16(),
                        method: current.method().clone(),
                        uri: current.uri().to_string(),
                    })?;

                if context.redirect_count() >= context.max_redirects() {
                    warn!(
                        max_redirects = context.max_redirects(),
                        uri = %current.uri(),
                        "redirect limit exceeded"
                    );
                    return Err(Error::RedirectLimitExceeded {
                        max_redirects: context.max_redirects(),
                        method: current.method().clone(),
                        uri: current.uri().to_string(),
                    });
                }

                let next = build_redirect_request(&current, status, &location)?;
                let hop = context.record_redirect();
                debug!(
                    status = status.as_u16(),
                    location = %location,
                    hop,
                    "following redirect"
                );
                current = next;
            }
        }
        .boxed()
    }

    fn order(&self) -> i32 {
        order::REDIRECT
    }

    fn name(&self) -> &'static str {
        "redirect"
    }
}
