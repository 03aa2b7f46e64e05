pub mod debug;
pub mod graphite;

use anyhow::Result;

use crate::metric::calculate::FlushSummary;

use self::debug::DebugEmitter;
use self::graphite::GraphiteEmitter;

/// Emitter dispatches flush summaries to the configured backends.
///
/// Enum dispatch rather than trait objects keeps the async call free of
/// `Pin<Box<dyn Future>>` overhead on every flush.
pub enum Emitter {
    Graphite(GraphiteEmitter),
    Debug(DebugEmitter),
}

impl Emitter {
    /// Returns the emitter name for logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Graphite(e) => e.name(),
            Self::Debug(e) => e.name(),
        }
    }

    /// Emit one flush summary.
    pub async fn emit(&self, summary: &FlushSummary) -> Result<()> {
        match self {
            Self::Graphite(e) => e.emit(summary).await,
            Self::Debug(e) => {
                e.emit(summary);
                Ok(())
            }
        }
    }
}
