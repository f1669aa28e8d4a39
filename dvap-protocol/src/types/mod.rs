pub mod breakpoint;
pub mod event;
pub mod snapshot;
pub mod thread;

pub use breakpoint::*;
pub use event::*;
pub use snapshot::*;
pub use thread::*;
