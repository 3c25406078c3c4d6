#![forbid(unsafe_code)]

pub mod asset_io;

pub use asset_io::{DiskLoader, MemoryLoader, ResourceLoader};
