//! The response output abstraction handlers write into.

use crate::error::Result;
use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode};
use http_body_util::Full;
use std::io;

/// Where a handler writes its response.
///
/// Headers may be changed freely until the status is written; after that
/// they are considered sent. Optional capabilities are discovered at run
/// time through the `flusher`, `hijacker` and `pusher` accessors, which
/// return `None` unless the concrete sink supports them.
pub trait ResponseSink {
    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers. Only the first call has effect.
    fn write_status(&mut self, status: StatusCode);

    /// Writes body bytes, sending a `200 OK` status first if none was sent.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes the entire buffer.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// The flush capability, if supported.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// The connection takeover capability, if supported.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    /// The server push capability, if supported.
    fn pusher(&mut self) -> Option<&mut dyn Push> {
        None
    }
}

/// Sends buffered response data to the client.
pub trait Flush {
    /// Flushes everything written so far.
    fn flush(&mut self) -> io::Result<()>;
}

/// A raw connection taken over from the HTTP server.
pub trait Connection: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send> Connection for T {}

/// Lets a handler take over the underlying connection.
pub trait Hijack {
    /// Detaches the connection from the HTTP server.
    fn hijack(&mut self) -> Result<Box<dyn Connection>>;
}

/// Options for a server push.
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Request method of the promised request.
    pub method: Method,
    /// Request headers of the promised request.
    pub headers: HeaderMap,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
        }
    }
}

/// Initiates server pushes.
pub trait Push {
    /// Pushes `target` to the client.
    fn push(&mut self, target: &str, options: PushOptions) -> Result<()>;
}

/// Adapts a sink to [`std::io::Write`] for codecs.
pub(crate) struct SinkWriter<'a>(pub(crate) &'a mut dyn ResponseSink);

impl io::Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An in-memory sink that records a response.
///
/// Headers are captured when the status is written, so changes made
/// afterwards do not show up in the recorded response, as with a real
/// connection.
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    sent: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    flushed: bool,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status sent so far, `200 OK` if none was.
    pub fn status(&self) -> StatusCode {
        self.sent
            .as_ref()
            .map_or(StatusCode::OK, |(status, _)| *status)
    }

    /// Headers as sent, or the current headers if nothing was sent yet.
    pub fn sent_headers(&self) -> &HeaderMap {
        self.sent
            .as_ref()
            .map_or(&self.headers, |(_, headers)| headers)
    }

    /// Body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the sink was flushed.
    pub fn flushed(&self) -> bool {
        self.flushed
    }

    /// Converts the recording into an HTTP response.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let (status, headers) = self
            .sent
            .unwrap_or((StatusCode::OK, self.headers));
        let mut response = Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for Recorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.sent.is_some() {
            tracing::debug!(%status, "superfluous status write");
            return;
        }
        self.sent = Some((status, self.headers.clone()));
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_status(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl Flush for Recorder {
    fn flush(&mut self) -> io::Result<()> {
        self.flushed = true;
        Ok(())
    }
}
