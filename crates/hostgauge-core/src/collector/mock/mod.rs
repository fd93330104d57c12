//! Mock OS seams for testing.
//!
//! This module provides `MockFs`, `MockCommand` and pre-built scenarios for
//! exercising collectors without a Linux `/proc` or an installed `iostat`.

mod command;
mod filesystem;
mod scenarios;

pub use command::MockCommand;
pub use filesystem::MockFs;
pub use scenarios::TYPICAL_IOSTAT;
