use crate::codec::{GzipEncoder, Level};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Levels 1 through 9, then the default level.
const SLOTS: usize = 10;

/// Idle encoders kept per level; extra releases are dropped.
const MAX_IDLE_PER_LEVEL: usize = 64;

static GLOBAL: LazyLock<Arc<CodecPool>> = LazyLock::new(|| Arc::new(CodecPool::new()));

/// Free-lists of reusable gzip encoders, one per compression level.
///
/// Deflate state is large, so encoders are handed back here when a response
/// finishes and reset on the next checkout instead of being reallocated.
/// The pool is shared by every request of a middleware instance.
#[derive(Debug)]
pub struct CodecPool {
    slots: [Mutex<Vec<GzipEncoder>>; SLOTS],
}

impl CodecPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Returns the process-wide pool.
    pub fn global() -> Arc<CodecPool> {
        Arc::clone(&GLOBAL)
    }

    /// Takes an idle encoder for `level`, or creates one.
    pub fn checkout(&self, level: Level) -> GzipEncoder {
        let idle = self
            .slot(level)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match idle {
            Some(mut encoder) => {
                encoder.reset();
                encoder
            }
            None => {
                tracing::trace!(?level, "allocating gzip encoder");
                GzipEncoder::new(level)
            }
        }
    }

    /// Returns an encoder to the free-list of its level.
    pub fn release(&self, encoder: GzipEncoder) {
        let mut idle = self
            .slot(encoder.level())
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_PER_LEVEL {
            idle.push(encoder);
        }
    }

    /// Number of idle encoders held for `level`.
    pub fn idle(&self, level: Level) -> usize {
        self.slot(level)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, level: Level) -> &Mutex<Vec<GzipEncoder>> {
        let index = match level {
            Level::Precise(n @ 1..=9) => n as usize - 1,
            Level::Default => SLOTS - 1,
            Level::Precise(n) => panic!("codec pool used with unvalidated level {n}"),
        };
        &self.slots[index]
    }
}

impl Default for CodecPool {
    fn default() -> Self {
        Self::new()
    }
}
