mod base;
mod connection;
mod destination;
mod pipeline;
mod retry;
mod syncer;
mod watermark;

pub use base::*;
pub use connection::*;
pub use destination::*;
pub use pipeline::*;
pub use retry::*;
pub use syncer::*;
pub use watermark::*;
