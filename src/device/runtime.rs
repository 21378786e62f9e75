//! The native accelerator boundary.
//!
//! Every primitive reports a [`Status`] instead of panicking or returning a
//! crate error, mirroring how driver APIs report failures. The typed layer in
//! [`super::memory`] turns those statuses into [`crate::Error`] values.

use std::fmt;

/// Index of an accelerator as enumerated by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Opaque address of a device-side allocation. Never dereferenced on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

/// Completion status of a runtime call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    InvalidValue,
    OutOfMemory,
    NotInitialized,
    InvalidDevice,
    InvalidContext,
    InvalidHandle,
    Unknown(i32),
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::InvalidValue => write!(f, "invalid value"),
            Status::OutOfMemory => write!(f, "out of memory"),
            Status::NotInitialized => write!(f, "not initialized"),
            Status::InvalidDevice => write!(f, "invalid device"),
            Status::InvalidContext => write!(f, "invalid context"),
            Status::InvalidHandle => write!(f, "invalid handle"),
            Status::Unknown(code) => write!(f, "unknown error ({})", code),
        }
    }
}

/// Endpoints of a 2D copy. The host side is always a byte slice.
#[derive(Debug)]
pub enum Copy2DKind<'a> {
    HostToDevice { src: &'a [u8], dst: DevicePtr },
    DeviceToHost { src: DevicePtr, dst: &'a mut [u8] },
}

/// A single strided rectangular copy of `height` rows of `width_bytes` bytes.
///
/// Row `r` starts at `r * src_pitch` in the source and `r * dst_pitch` in the
/// destination. Both pitches must be at least `width_bytes`.
#[derive(Debug)]
pub struct Copy2D<'a> {
    pub kind: Copy2DKind<'a>,
    pub src_pitch: usize,
    pub dst_pitch: usize,
    pub width_bytes: usize,
    pub height: usize,
}

impl Copy2D<'_> {
    pub fn direction(&self) -> &'static str {
        match self.kind {
            Copy2DKind::HostToDevice { .. } => "host to device",
            Copy2DKind::DeviceToHost { .. } => "device to host",
        }
    }
}

/// Primitives an accelerator driver must provide.
///
/// Implementations act on the runtime's *current* device, which is global
/// mutable state. Callers go through [`super::Gpu`], which serializes the
/// device selection and the call that depends on it.
pub trait DeviceRuntime: Send + Sync {
    fn device_count(&self) -> u32;

    fn set_current(&self, device: DeviceId) -> Status;

    /// Allocates `height` rows of at least `width_bytes` bytes each and
    /// returns the base pointer with the row pitch actually used.
    fn malloc_pitch(&self, width_bytes: usize, height: usize) -> Result<(DevicePtr, usize), Status>;

    fn memcpy_2d(&self, copy: Copy2D<'_>) -> Status;

    /// Free and total bytes on the current device.
    fn mem_get_info(&self) -> Result<(u64, u64), Status>;

    fn free(&self, ptr: DevicePtr) -> Status;
}
