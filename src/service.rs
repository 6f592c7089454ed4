use crate::error::{Error, Result};
use crate::layer::Settings;
use crate::sink::{Recorder, ResponseSink};
use crate::writer::GzipResponseWriter;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Request, Response, header};
use http_body_util::Full;
use std::fmt;
use std::future::{Ready, ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::trace;

/// Something that answers a request by writing into a [`ResponseSink`].
pub trait Handler {
    /// Writes the response for `req` into `sink`.
    fn serve(&self, sink: &mut dyn ResponseSink, req: &Request<Bytes>) -> Result<()>;
}

/// A [`Handler`] backed by a closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Wraps a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut dyn ResponseSink, &Request<Bytes>) -> Result<()>,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut dyn ResponseSink, &Request<Bytes>) -> Result<()>,
{
    fn serve(&self, sink: &mut dyn ResponseSink, req: &Request<Bytes>) -> Result<()> {
        (self.0)(sink, req)
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// A handler that gzips the responses of the handler it wraps.
///
/// Built by [`CompressionLayer`](crate::CompressionLayer).
#[derive(Debug, Clone)]
pub struct Compress<H> {
    inner: H,
    settings: Arc<Settings>,
}

impl<H> Compress<H> {
    pub(crate) fn new(inner: H, settings: Arc<Settings>) -> Self {
        Self { inner, settings }
    }

    /// Returns a reference to the inner handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Returns a mutable reference to the inner handler.
    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }

    /// Consumes this handler, returning the inner handler.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: Handler> Handler for Compress<H> {
    fn serve(&self, sink: &mut dyn ResponseSink, req: &Request<Bytes>) -> Result<()> {
        // Caches must know the body depends on Accept-Encoding either way.
        add_vary_accept_encoding(sink.headers_mut());

        let decision = (self.settings.policy)(req);
        if !decision.should_compress(req) {
            trace!(?decision, uri = %req.uri(), "compression not a candidate");
            return self.inner.serve(sink, req);
        }

        let mut writer = GzipResponseWriter::new(sink, &self.settings);
        let served = self.inner.serve(&mut writer, req);
        let closed = writer.close();
        served.and(closed)
    }
}

impl<H: Handler> Service<Request<Bytes>> for Compress<H> {
    type Response = Response<Full<Bytes>>;
    type Error = Error;
    type Future = Ready<Result<Self::Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Bytes>) -> Self::Future {
        let mut recorder = Recorder::new();
        let result = self
            .serve(&mut recorder, &req)
            .map(|()| recorder.into_response());
        ready(result)
    }
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));
    if !covered {
        headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    }
}
