use crate::codec::Level;
use crate::config::CompressionConfig;
use crate::error::Result;
use crate::policy::{ContentTypes, Decision, PolicyFn};
use crate::pool::CodecPool;
use crate::service::Compress;
use bytes::Bytes;
use http::Request;
use std::fmt;
use std::sync::Arc;
use tower::Layer;

/// Default minimum body size for compression.
pub const DEFAULT_MIN_SIZE: usize = 512;

/// Validated settings shared by every request of a middleware instance.
pub(crate) struct Settings {
    pub(crate) level: Level,
    pub(crate) min_size: usize,
    pub(crate) content_types: ContentTypes,
    pub(crate) policy: PolicyFn,
    pub(crate) pool: Arc<CodecPool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            level: Level::Default,
            min_size: DEFAULT_MIN_SIZE,
            content_types: ContentTypes::default(),
            policy: negotiate(),
            pool: CodecPool::global(),
        }
    }
}

fn negotiate() -> PolicyFn {
    Arc::new(|_: &Request<Bytes>| Decision::Negotiate)
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("level", &self.level)
            .field("min_size", &self.min_size)
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

/// A layer that gzips response bodies of the handlers it wraps.
///
/// The settings are validated once when the layer is built and are shared,
/// read-only, by every request.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    settings: Arc<Settings>,
}

impl CompressionLayer {
    /// Creates a layer with default settings: default compression level,
    /// a 512 byte threshold, every content type, and negotiation through
    /// `Accept-Encoding`.
    pub fn new() -> Self {
        Self {
            settings: Arc::new(Settings::default()),
        }
    }

    /// Starts configuring a layer.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Builds a layer from deserialized configuration.
    pub fn from_config(config: &CompressionConfig) -> Result<Self> {
        Self::builder()
            .level(config.level())
            .min_size(config.min_size)
            .content_types(&config.content_types)
            .decision(config.policy)
            .build()
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Layer<H> for CompressionLayer {
    type Service = Compress<H>;

    fn layer(&self, inner: H) -> Self::Service {
        Compress::new(inner, Arc::clone(&self.settings))
    }
}

/// Builder for [`CompressionLayer`].
pub struct Builder {
    level: Level,
    min_size: usize,
    content_types: Vec<String>,
    policy: Option<PolicyFn>,
    pool: Option<Arc<CodecPool>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            level: Level::Default,
            min_size: DEFAULT_MIN_SIZE,
            content_types: Vec::new(),
            policy: None,
            pool: None,
        }
    }
}

impl Builder {
    /// Sets the gzip compression level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Bodies no longer than this are sent as written.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Restricts compression to the given `type/subtype` or `type/*`
    /// patterns. An empty list allows every content type.
    pub fn content_types<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.content_types = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();
        self
    }

    /// Decides per request whether compression is negotiated, skipped or
    /// forced.
    pub fn policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> Decision + Send + Sync + 'static,
    {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Applies the same decision to every request.
    pub fn decision(self, decision: Decision) -> Self {
        self.policy(move |_| decision)
    }

    /// Uses `pool` for encoders instead of the process-wide pool.
    pub fn pool(mut self, pool: Arc<CodecPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Validates the configuration and builds the layer.
    pub fn build(self) -> Result<CompressionLayer> {
        let level = self.level.validate()?;
        let content_types = ContentTypes::parse(&self.content_types)?;

        let settings = Settings {
            level,
            min_size: self.min_size,
            content_types,
            policy: self.policy.unwrap_or_else(negotiate),
            pool: self.pool.unwrap_or_else(CodecPool::global),
        };
        tracing::debug!(?settings, "compression layer configured");

        Ok(CompressionLayer {
            settings: Arc::new(settings),
        })
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("level", &self.level)
            .field("min_size", &self.min_size)
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let layer = CompressionLayer::new();
        assert_eq!(layer.settings.level, Level::Default);
        assert_eq!(layer.settings.min_size, DEFAULT_MIN_SIZE);
        assert!(layer.settings.content_types.is_empty());
    }

    #[test]
    fn test_builder() {
        let layer = CompressionLayer::builder()
            .level(Level::BEST_SPEED)
            .min_size(42)
            .content_types(["text/*", "application/json"])
            .build()
            .unwrap();
        assert_eq!(layer.settings.level, Level::Precise(1));
        assert_eq!(layer.settings.min_size, 42);
        assert!(layer.settings.content_types.allows("text/html"));
        assert!(!layer.settings.content_types.allows("image/png"));
    }

    #[test]
    fn test_invalid_level_fails_build() {
        for level in [0, 10, 42] {
            let result = CompressionLayer::builder().level(Level::Precise(level)).build();
            assert!(matches!(result, Err(Error::InvalidLevel(l)) if l == level));
        }
    }

    #[test]
    fn test_invalid_content_type_fails_build() {
        let result = CompressionLayer::builder().content_types(["json"]).build();
        assert!(matches!(result, Err(Error::InvalidContentType(p)) if p == "json"));
    }

    #[test]
    fn test_content_types_are_copied() {
        let mut patterns = vec!["application/example".to_string()];
        let builder = CompressionLayer::builder().content_types(&patterns);
        patterns[0] = "not a pattern".to_string();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_decision_policy() {
        let layer = CompressionLayer::builder()
            .decision(Decision::Force)
            .build()
            .unwrap();
        let req = Request::new(Bytes::new());
        assert_eq!((layer.settings.policy)(&req), Decision::Force);
    }
}
