//! Binary container formats
//!
//! A converted scene is a JSON index plus one contiguous binary blob. The two
//! can be stored side by side (`.json` + `.bin`) or wrapped in a single
//! container file with a fixed 16-byte header.

pub mod container;

pub use container::*;
