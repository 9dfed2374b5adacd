// # Device Store Implementations
//
// This module provides implementations of the DeviceStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileDeviceStore;
pub use memory::MemoryDeviceStore;
