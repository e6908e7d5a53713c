use serde::{Deserialize, Serialize};

/// How records are written by the output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Bordered, human readable frame.
    Framed,
    /// One JSON object per line.
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Framed
    }
}
