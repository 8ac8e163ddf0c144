//! Process-level helpers.

mod shutdown;

pub use shutdown::Shutdown;
