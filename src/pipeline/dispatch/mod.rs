//! Cross-domain handoff from the chain-driving context into consumer loops.

pub mod mailbox;
pub mod view;

pub use mailbox::Mailbox;
pub use view::{FrameRenderer, FrameView, PolledFrame, RenderProgram, Resize, ViewDirectory};
