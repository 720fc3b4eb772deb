//! Bounce Stream
//!
//! A streaming physics pipeline: a background worker integrates a bouncing
//! body and streams sampled values in chunks to a render loop that draws a
//! live, auto-scaling time-series graph.
//!
//! ## Architecture
//!
//! ```text
//! producer thread                        render thread
//! ─────────────────────────────────      ─────────────────────────────────
//! SampleProducer  (producer.rs)          Session      (session.rs)
//!   └── Body::step (physics.rs)            ├── FrameStore (frame_store.rs)
//!        │                                 └── WorkerHandle (worker.rs)
//!        └── Chunk ──► transport.rs ──►  RenderClock  (clock.rs)
//!                                          └── Viewport (viewport.rs) ──► Canvas
//! ```
//!
//! Flow control is credit based: the producer may emit `allowed_buffers`
//! chunks and then idles until the session grants more.

pub mod clock;
pub mod config;
pub mod error;
pub mod frame_store;
pub mod physics;
pub mod producer;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod viewport;
pub mod worker;

// Convenience re-exports
pub use clock::{Canvas, RenderClock, TickReport};
pub use error::StreamError;
pub use frame_store::{Frame, FrameStore};
pub use producer::{ChunkSink, Credit, RunOutcome, RunParams, SampleProducer};
pub use protocol::{Chunk, Control, Envelope, Generation, ProducerMsg, RunSummary};
pub use session::{PlaybackView, Session, SessionState, SessionStats};
pub use types::{Body, ConfigPatch, GraphProperty, GraphSettings, SimConfig, Vec2};
pub use viewport::{ScreenPoint, Viewport};
