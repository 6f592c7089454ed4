//! The buffering response writer at the heart of the middleware.
//!
//! A [`GzipResponseWriter`] holds back the status and the first body bytes
//! until it knows enough to pick an encoding: either the body grows past the
//! minimum size and gzip starts, or something rules compression out and the
//! buffered bytes are replayed as they were written.

use crate::codec::{GZIP, GzipEncoder};
use crate::error::{Error, Result};
use crate::layer::Settings;
use crate::sink::{Connection, Flush, Hijack, Push, PushOptions, ResponseSink, SinkWriter};
use crate::sniff::detect_content_type;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use std::io;
use tracing::{debug, trace, warn};

enum State {
    /// No encoding chosen yet; body bytes are held here.
    Buffering(Vec<u8>),
    /// Body bytes go through the encoder.
    Compressing(GzipEncoder),
    /// Body bytes go straight to the inner sink.
    Passthrough,
    Closed,
}

enum StatusLine {
    Unset,
    Pending(StatusCode),
    Sent,
}

/// A [`ResponseSink`] that gzips the body it is given when worthwhile.
///
/// Handlers see it as an ordinary sink. It always offers [`Flush`], and
/// offers [`Hijack`] and [`Push`] only when the sink it wraps does.
///
/// The writer must be closed to terminate the gzip stream and return its
/// encoder to the pool. Dropping it closes it.
pub struct GzipResponseWriter<'a> {
    inner: &'a mut dyn ResponseSink,
    settings: &'a Settings,
    state: State,
    status: StatusLine,
    bytes_written: usize,
}

impl<'a> GzipResponseWriter<'a> {
    pub(crate) fn new(inner: &'a mut dyn ResponseSink, settings: &'a Settings) -> Self {
        Self {
            inner,
            settings,
            state: State::Buffering(Vec::new()),
            status: StatusLine::Unset,
            bytes_written: 0,
        }
    }

    /// Whether the response is being gzipped.
    pub fn is_compressing(&self) -> bool {
        matches!(self.state, State::Compressing(_))
    }

    /// Uncompressed body bytes accepted so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Completes the response.
    ///
    /// Still-buffered bytes are sent uncompressed, an active gzip stream is
    /// terminated and its encoder released. Closing again does nothing.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => Ok(()),
            State::Buffering(buffer) => {
                sniff_content_type(&mut *self.inner, &buffer);
                self.send_status();
                if !buffer.is_empty() {
                    self.inner.write_all(&buffer)?;
                }
                trace!(len = buffer.len(), "closed below compression threshold");
                Ok(())
            }
            State::Compressing(mut encoder) => {
                let finished = encoder.finish(&mut SinkWriter(&mut *self.inner));
                self.settings.pool.release(encoder);
                debug!(bytes = self.bytes_written, "gzip response finished");
                finished.map_err(Error::from)
            }
            State::Passthrough => {
                self.send_status();
                Ok(())
            }
        }
    }

    /// Chooses an encoding once the buffered bytes allow it.
    fn decide(&mut self) -> io::Result<()> {
        let State::Buffering(buffer) = &self.state else {
            unreachable!("encoding decided outside of buffering");
        };

        let headers = self.inner.headers();
        if headers.contains_key(header::CONTENT_ENCODING)
            || headers.contains_key(header::CONTENT_RANGE)
        {
            return self.start_plain();
        }
        if headers.contains_key(header::CONTENT_TYPE) && !self.content_type_allowed() {
            return self.start_plain();
        }
        if buffer.len() <= self.settings.min_size {
            return Ok(());
        }

        sniff_content_type(&mut *self.inner, buffer);
        if self.content_type_allowed() {
            self.start_gzip()
        } else {
            self.start_plain()
        }
    }

    /// Checks `Content-Type` against the allow-list. A value that cannot be
    /// read as text never matches a non-empty list.
    fn content_type_allowed(&self) -> bool {
        let types = &self.settings.content_types;
        if types.is_empty() {
            return true;
        }
        match self.inner.headers().get(header::CONTENT_TYPE) {
            None => true,
            Some(value) => value.to_str().is_ok_and(|ct| types.allows(ct)),
        }
    }

    fn start_gzip(&mut self) -> io::Result<()> {
        let State::Buffering(buffer) = std::mem::replace(&mut self.state, State::Passthrough)
        else {
            unreachable!("gzip started outside of buffering");
        };

        let headers = self.inner.headers_mut();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(GZIP));
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::ACCEPT_RANGES);
        self.send_status();

        let mut encoder = self.settings.pool.checkout(self.settings.level);
        let written = encoder.write(&mut SinkWriter(&mut *self.inner), &buffer);
        self.state = State::Compressing(encoder);
        debug!(buffered = buffer.len(), level = ?self.settings.level, "compressing response");
        written.map(drop)
    }

    fn start_plain(&mut self) -> io::Result<()> {
        let State::Buffering(buffer) = std::mem::replace(&mut self.state, State::Passthrough)
        else {
            unreachable!("plain output started outside of buffering");
        };

        sniff_content_type(&mut *self.inner, &buffer);
        self.send_status();
        debug!(buffered = buffer.len(), "response left uncompressed");
        if buffer.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&buffer)
    }

    fn send_status(&mut self) {
        let status = match std::mem::replace(&mut self.status, StatusLine::Sent) {
            StatusLine::Sent => return,
            StatusLine::Unset => StatusCode::OK,
            StatusLine::Pending(status) => status,
        };
        self.inner.write_status(status);
    }
}

/// Sets `Content-Type` from the body prefix unless the handler set one.
fn sniff_content_type(sink: &mut dyn ResponseSink, body: &[u8]) {
    if body.is_empty() || sink.headers().contains_key(header::CONTENT_TYPE) {
        return;
    }
    let detected = detect_content_type(body);
    trace!(content_type = detected, "sniffed content type");
    sink.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(detected));
}

impl ResponseSink for GzipResponseWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Records the status. It is sent once the encoding is chosen, and only
    /// the first call counts.
    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            StatusLine::Unset => self.status = StatusLine::Pending(status),
            _ => debug!(%status, "superfluous status write"),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match &mut self.state {
            State::Closed => return Err(io::Error::other(Error::WriterClosed)),
            State::Compressing(encoder) => encoder.write(&mut SinkWriter(&mut *self.inner), buf)?,
            State::Passthrough => self.inner.write(buf)?,
            State::Buffering(buffer) => {
                if buf.is_empty() {
                    return Ok(0);
                }
                buffer.extend_from_slice(buf);
                self.bytes_written += buf.len();
                self.decide()?;
                return Ok(buf.len());
            }
        };
        self.bytes_written += written;
        Ok(written)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.hijacker().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        if self.inner.pusher().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for GzipResponseWriter<'_> {
    /// Flushes the gzip stream, if one is running, then the inner sink.
    ///
    /// Bytes still buffered stay buffered, so the encoding is chosen by
    /// later writes as usual.
    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Closed => return Err(io::Error::other(Error::WriterClosed)),
            State::Compressing(encoder) => encoder.flush(&mut SinkWriter(&mut *self.inner))?,
            State::Buffering(_) | State::Passthrough => {}
        }

        if let Some(flusher) = self.inner.flusher() {
            flusher.flush()?;
        }
        Ok(())
    }
}

impl Hijack for GzipResponseWriter<'_> {
    fn hijack(&mut self) -> Result<Box<dyn Connection>> {
        match self.inner.hijacker() {
            Some(hijacker) => hijacker.hijack(),
            None => Err(Error::NotSupported("hijack")),
        }
    }
}

impl Push for GzipResponseWriter<'_> {
    /// Pushes through the inner sink, advertising gzip for the promised
    /// request unless the caller chose a non-empty `Accept-Encoding`.
    fn push(&mut self, target: &str, mut options: PushOptions) -> Result<()> {
        let Some(pusher) = self.inner.pusher() else {
            return Err(Error::NotSupported("push"));
        };
        let chosen = options
            .headers
            .get(header::ACCEPT_ENCODING)
            .is_some_and(|v| !v.is_empty());
        if !chosen {
            options
                .headers
                .insert(header::ACCEPT_ENCODING, HeaderValue::from_static(GZIP));
        }
        pusher.push(target, options)
    }
}

impl Drop for GzipResponseWriter<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(%error, "failed to close gzip response");
        }
    }
}
