//! Declarative configuration for the compression layer

use crate::codec::Level;
use crate::layer::DEFAULT_MIN_SIZE;
use crate::policy::Decision;

/// Compression configuration, usually read from a settings file and turned
/// into a layer with [`CompressionLayer::from_config`].
///
/// [`CompressionLayer::from_config`]: crate::CompressionLayer::from_config
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionConfig {
    /// Gzip level, 1 to 9. Unset means the codec default.
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: Option<u32>,

    /// Minimum response size to compress (in bytes)
    #[cfg_attr(feature = "serde", serde(default = "default_min_size"))]
    pub min_size: usize,

    /// `type/subtype` or `type/*` patterns eligible for compression.
    /// Empty means every type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub content_types: Vec<String>,

    /// Decision applied to every request
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: Decision,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: None,
            min_size: default_min_size(),
            content_types: Vec::new(),
            policy: Decision::Negotiate,
        }
    }
}

fn default_min_size() -> usize {
    DEFAULT_MIN_SIZE
}

impl CompressionConfig {
    /// The configured level. Not validated until the layer is built.
    pub fn level(&self) -> Level {
        self.level.map_or(Level::Default, Level::Precise)
    }
}
