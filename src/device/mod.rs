//! Host/device transfers for accelerated layers.
//!
//! [`DeviceRuntime`] is the narrow native boundary (pitched allocation, 2D
//! copy, device selection, memory query). [`Gpu`] binds a runtime to one
//! device and exposes the typed operations layers use. [`EmulatedRuntime`]
//! implements the boundary in-process.
//!
//! All calls block until the copy has completed.

pub mod emulated;
pub mod memory;
pub mod runtime;

pub use emulated::{EmulatedRuntime, EmulatorConfig, FaultSite};
pub use memory::{DeviceMemory2D, Gpu, Layout2D, MemoryInfo};
pub use runtime::{Copy2D, Copy2DKind, DeviceId, DevicePtr, DeviceRuntime, Status};
