//! FFmpeg CLI access for recorded screen segments: probing and still frames.

mod decode;
mod error;
mod probe;
mod time;
mod tools;

pub use decode::{DecodedVideoFrame, decode_frame_near_seconds};
pub use error::{MediaFfmpegError, Result};
pub use probe::{VideoProbe, probe_video};
pub use time::Rational;
pub use tools::{Tools, ensure_readable};
