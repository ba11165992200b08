//! Viewport compositing on top of the tile cache
//!
//! [`ViewportCompositor`] turns a viewport into a Hilbert-ordered sequence of
//! tiles, filling misses through a caller-supplied generator. [`RedrawDriver`]
//! runs a compositor on a dedicated thread fed by a coalescing
//! [`ViewportMailbox`].

pub mod compositor;
pub mod driver;
pub mod mailbox;

pub use compositor::{DrawStats, ViewportCompositor};
pub use driver::{FrameReport, RedrawDriver};
pub use mailbox::ViewportMailbox;
