// Live stream plumbing: handle ownership, subprocess sources, HTTP delivery

pub mod handle;
pub mod pipeline;
pub mod process;

pub use handle::StreamHandle;
pub use pipeline::{LiveAudio, StreamPipeline};
pub use process::spawn_stdout_stream;
