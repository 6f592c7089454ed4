//! Gzip response compression middleware that decides per response.
//!
//! Handlers write into a [`ResponseSink`]. Wrapped by a [`CompressionLayer`],
//! they write into a buffering sink instead, which holds back the status and
//! the first body bytes until it can tell whether gzip is worthwhile. The
//! handler never knows which way it went.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::Request;
//! use http_gzip_middleware::{CompressionLayer, Handler, Recorder, ResponseSink, handler_fn};
//! use tower::Layer;
//!
//! let app = CompressionLayer::builder()
//!     .min_size(16)
//!     .build()?
//!     .layer(handler_fn(|sink: &mut dyn ResponseSink, _req: &Request<Bytes>| {
//!         sink.write_all(b"hello hello hello hello")?;
//!         Ok(())
//!     }));
//!
//! let req = Request::builder()
//!     .header("accept-encoding", "gzip")
//!     .body(Bytes::new())?;
//! let mut recorder = Recorder::new();
//! app.serve(&mut recorder, &req)?;
//! assert_eq!(recorder.sent_headers()["content-encoding"], "gzip");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Compression Rules
//!
//! A response is only considered when the request policy allows it; by
//! default that means the client's `Accept-Encoding` gives gzip a non-zero
//! quality. The response is then sent uncompressed when:
//! - `Content-Encoding` is already set
//! - `Content-Range` is present (range responses)
//! - `Content-Type`, set by the handler or sniffed from the body, is not on
//!   a configured allow-list
//! - the body ends without exceeding the minimum size (default: 512 bytes)
//!
//! # Response Modifications
//!
//! - `Vary` includes `Accept-Encoding` on every response considered
//! - `Content-Type` is sniffed from the body when the handler set none
//!
//! When compression is applied:
//! - `Content-Encoding` is set to `gzip`
//! - `Content-Length` is removed (compressed size is unknown)
//! - `Accept-Ranges` is removed

#![deny(missing_docs)]

mod codec;
mod config;
mod encoding;
mod error;
mod layer;
mod policy;
mod pool;
mod service;
mod sink;
mod sniff;
mod writer;

pub use codec::{GZIP, GzipEncoder, Level};
pub use config::CompressionConfig;
pub use encoding::{CodingError, Codings, accepts, parse_encodings, request_accepts};
pub use error::{Error, Result};
pub use layer::{Builder, CompressionLayer, DEFAULT_MIN_SIZE};
pub use policy::{ContentTypePattern, ContentTypes, Decision, PolicyFn};
pub use pool::CodecPool;
pub use service::{Compress, Handler, HandlerFn, handler_fn};
pub use sink::{Connection, Flush, Hijack, Push, PushOptions, Recorder, ResponseSink};
pub use sniff::{SNIFF_LEN, detect_content_type};
pub use writer::GzipResponseWriter;
