//! Built-in backend modules.

pub mod memory;

pub use memory::MemoryModule;
