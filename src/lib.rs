pub mod crc;
pub mod page;
pub mod head;
pub mod samples;
pub mod source;
pub mod variant;
pub mod config;
pub mod stream;

pub use config::StreamConfig;
pub use head::HeaderBytes;
pub use source::PhysicalSource;
pub use variant::{Variant, get_layout};
pub use stream::{VirtualStream, StreamError, open_buffered};
