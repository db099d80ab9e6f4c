use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

/// A request body that is produced incrementally and cannot be replayed.
///
/// Carrying one of these disables retry, redirect following, and 100-continue
/// negotiation for the request, since all three need to resend the body.
pub struct StreamBody {
    inner: Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>,
}

impl StreamBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub fn into_inner(self) -> Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>> {
        self.inner
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("StreamBody")
    }
}

#[derive(Clone, Debug)]
pub struct FileBody {
    path: PathBuf,
}

impl FileBody {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One part of a multipart body.
#[derive(Clone, Debug)]
pub struct Part {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl Part {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: data.into(),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn name_str(&self) -> &str {
        &self.name
    }

    pub fn file_name_str(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type_str(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Buffered(Bytes),
    File(FileBody),
    Multipart(Vec<Part>),
    Streamed(StreamBody),
}

impl Body {
    pub fn buffered(data: impl Into<Bytes>) -> Self {
        Self::Buffered(data.into())
    }

    /// Whether the body can be sent more than once.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Streamed(_))
    }

    /// Whether the body carries no payload: no buffered bytes, no file, and no
    /// multipart parts. A file body always counts as non-empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Buffered(data) => data.is_empty(),
            Self::File(_) => false,
            Self::Multipart(parts) => parts.is_empty(),
            Self::Streamed(_) => false,
        }
    }

    /// Clones the body, or returns `None` for a streamed body.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Buffered(data) => Some(Self::Buffered(data.clone())),
            Self::File(file) => Some(Self::File(file.clone())),
            Self::Multipart(parts) => Some(Self::Multipart(parts.clone())),
            Self::Streamed(_) => None,
        }
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Self::Buffered(data)
    }
}

#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Clones the whole request, or returns `None` when the body is streamed
    /// and therefore not replayable.
    pub fn try_clone(&self) -> Option<Self> {
        let body = self.body.try_clone()?;
        Some(Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body,
        })
    }
}
