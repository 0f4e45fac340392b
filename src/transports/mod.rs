//! Built-in transport implementations

pub mod virtual_bus;

pub use virtual_bus::VirtualBus;
