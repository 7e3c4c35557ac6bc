pub mod buffer;
pub mod bytes;
pub mod cave;
mod error;
pub mod format;
pub mod header;
pub mod view;

pub use buffer::*;
pub use cave::*;
pub use error::*;
pub use format::*;
pub use view::*;
