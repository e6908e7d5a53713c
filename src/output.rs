//! Rendering of session results and the single writer they all go through.

pub mod record;
pub mod renderer;
pub mod sink;

pub use record::OutputRecord;
pub use renderer::{HttpHighlighter, PlainRenderer, Renderer};
pub use sink::{output_channel, OutputSender, OutputSink};
