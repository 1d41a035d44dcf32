//! Control message protocol
//!
//! Messages are framed as a little-endian `i32` class tag followed by a
//! class-specific body. Strings are UTF-8 terminated by a NUL byte, bools
//! are one byte and floats are IEEE-754 `f32`. Selections of object ids are
//! bracketed by `"#"` sentinels.
//!
//! ```text
//! Global: [class=0] selector fields...
//! Object: [class=1] patch_id object_id selector fields...
//! Patch:  [class=2] patch_id selector fields...
//! ```

mod error;
mod framing;
mod message;

pub use error::{FrameError, FrameResult};
pub use framing::{MessageReader, MessageWriter, SELECTION_SENTINEL};
pub use message::*;
