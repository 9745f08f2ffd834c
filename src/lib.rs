//! barvis - a media-synced audio spectrum bar visualizer core
//!
//! Renders 32 vertical bars that dance with whatever is playing, tinted to
//! match the current album artwork. The crate is the pipeline between a
//! platform frequency-capture source and a host drawing surface:
//!
//! ```text
//! host signals -> lifecycle -> (attach/detach) capture source
//!                                     |
//!                              spectrum frames
//!                                     v
//!                         magnitude filter -> bar engine -> DrawFrame
//! ```
//!
//! The platform pieces stay outside: the capture device behind
//! [`SourceProvider`], dominant-color extraction behind [`ColorExtractor`],
//! and the actual painting of [`DrawFrame`]s in the host. The host feeds
//! playback/visibility signals into [`Visualizer`]'s setters and calls
//! [`Visualizer::draw`] once per frame tick.

pub mod animate;
pub mod color;
pub mod engine;
pub mod filter;
pub mod lifecycle;
pub mod render;
pub mod source;
pub mod visualizer;

pub use color::{Artwork, ColorExtractor, Rgba, Swatches};
pub use engine::{BarEngine, FrameError, BAR_COUNT};
pub use filter::FilterCurve;
pub use lifecycle::VisualizerState;
pub use render::DrawFrame;
pub use source::{
    AcquireError, FrameCallback, SourceError, SourceProvider, SpectrumSource, CAPTURE_SIZE,
};
pub use visualizer::{Visualizer, VisualizerConfig};
