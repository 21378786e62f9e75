//! In-process accelerator for hosts without a GPU.
//!
//! Device memory is plain host memory, but allocations use a padded row pitch
//! and every call follows driver rules: a context must be current, handles must
//! be live and copies must stay inside both buffers. That makes pitch and
//! byte-count mistakes visible without real hardware.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::runtime::{Copy2D, Copy2DKind, DeviceId, DevicePtr, DeviceRuntime, Status};
use crate::{Error, Result};

const BASE_ADDRESS: u64 = 0x7f00_0000_0000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub device_count: u32,
    /// Bytes of memory per device.
    pub total_memory: u64,
    /// Row pitches are rounded up to a multiple of this many bytes.
    pub pitch_alignment: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            total_memory: 1 << 30,
            pitch_alignment: 512,
        }
    }
}

impl EmulatorConfig {
    /// Upper bound on emulated devices.
    pub const MAX_DEVICES: u32 = 64;

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_count == 0 {
            return Err(Error::Layout("emulator needs at least one device".to_string()));
        }
        if self.device_count > Self::MAX_DEVICES {
            return Err(Error::Layout(format!(
                "emulator supports at most {} devices, got {}",
                Self::MAX_DEVICES,
                self.device_count
            )));
        }
        if !self.pitch_alignment.is_power_of_two() {
            return Err(Error::Layout(format!(
                "pitch alignment {} is not a power of two",
                self.pitch_alignment
            )));
        }
        Ok(())
    }
}

/// Runtime call that an injected fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    SetCurrent,
    Malloc,
    Copy,
    MemInfo,
    Free,
}

#[derive(Debug)]
struct Allocation {
    device: DeviceId,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    current: Option<DeviceId>,
    used: Vec<u64>,
    allocations: HashMap<u64, Allocation>,
    next_address: u64,
    faults: Vec<(FaultSite, Status)>,
}

impl State {
    fn take_fault(&mut self, site: FaultSite) -> Option<Status> {
        let index = self.faults.iter().position(|(s, _)| *s == site)?;
        Some(self.faults.remove(index).1)
    }
}

#[derive(Debug)]
pub struct EmulatedRuntime {
    config: EmulatorConfig,
    state: Mutex<State>,
}

impl EmulatedRuntime {
    pub fn new(config: EmulatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: EmulatorConfig) -> Self {
        let state = State {
            used: vec![0; config.device_count as usize],
            next_address: BASE_ADDRESS,
            ..State::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Makes the next call at `site` fail with `status`. Faults queue up and
    /// fire in injection order.
    pub fn inject_fault(&self, site: FaultSite, status: Status) {
        self.state.lock().faults.push((site, status));
    }

    pub fn current_device(&self) -> Option<DeviceId> {
        self.state.lock().current
    }

    /// Drops the current context, as seen by a thread that never selected one.
    pub fn clear_current(&self) {
        self.state.lock().current = None;
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }

    pub fn used_memory(&self, device: DeviceId) -> u64 {
        self.state
            .lock()
            .used
            .get(device.0 as usize)
            .copied()
            .unwrap_or(0)
    }

    fn round_up(&self, bytes: usize) -> usize {
        let align = self.config.pitch_alignment;
        bytes.div_ceil(align) * align
    }
}

impl Default for EmulatedRuntime {
    fn default() -> Self {
        Self::with_config(EmulatorConfig::default())
    }
}

/// Bytes a strided rectangle spans: every row but the last uses the full pitch.
fn span(pitch: usize, width_bytes: usize, height: usize) -> usize {
    (height - 1) * pitch + width_bytes
}

fn copy_rows(src: &[u8], src_pitch: usize, dst: &mut [u8], dst_pitch: usize, width: usize, height: usize) {
    for row in 0..height {
        let s = row * src_pitch;
        let d = row * dst_pitch;
        dst[d..d + width].copy_from_slice(&src[s..s + width]);
    }
}

impl DeviceRuntime for EmulatedRuntime {
    fn device_count(&self) -> u32 {
        self.config.device_count
    }

    fn set_current(&self, device: DeviceId) -> Status {
        let mut state = self.state.lock();
        if let Some(status) = state.take_fault(FaultSite::SetCurrent) {
            return status;
        }
        if device.0 >= self.config.device_count {
            return Status::InvalidDevice;
        }
        state.current = Some(device);
        Status::Success
    }

    fn malloc_pitch(&self, width_bytes: usize, height: usize) -> std::result::Result<(DevicePtr, usize), Status> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_fault(FaultSite::Malloc) {
            return Err(status);
        }
        let device = state.current.ok_or(Status::InvalidContext)?;
        if width_bytes == 0 || height == 0 {
            return Err(Status::InvalidValue);
        }

        let pitch = self.round_up(width_bytes);
        let size = pitch
            .checked_mul(height)
            .ok_or(Status::InvalidValue)?;
        let used = state.used[device.0 as usize];
        if used + size as u64 > self.config.total_memory {
            return Err(Status::OutOfMemory);
        }

        let address = state.next_address;
        state.next_address += self.round_up(size) as u64;
        state.used[device.0 as usize] += size as u64;
        state.allocations.insert(
            address,
            Allocation {
                device,
                bytes: vec![0; size],
            },
        );
        Ok((DevicePtr(address), pitch))
    }

    fn memcpy_2d(&self, copy: Copy2D<'_>) -> Status {
        let mut state = self.state.lock();
        if let Some(status) = state.take_fault(FaultSite::Copy) {
            return status;
        }
        if state.current.is_none() {
            return Status::InvalidContext;
        }
        let Copy2D {
            kind,
            src_pitch,
            dst_pitch,
            width_bytes,
            height,
        } = copy;
        if src_pitch < width_bytes || dst_pitch < width_bytes {
            return Status::InvalidValue;
        }
        if width_bytes == 0 || height == 0 {
            return Status::Success;
        }
        let src_span = span(src_pitch, width_bytes, height);
        let dst_span = span(dst_pitch, width_bytes, height);

        match kind {
            Copy2DKind::HostToDevice { src, dst } => {
                let Some(allocation) = state.allocations.get_mut(&dst.0) else {
                    return Status::InvalidHandle;
                };
                if src.len() < src_span || allocation.bytes.len() < dst_span {
                    return Status::InvalidValue;
                }
                copy_rows(src, src_pitch, &mut allocation.bytes, dst_pitch, width_bytes, height);
            }
            Copy2DKind::DeviceToHost { src, dst } => {
                let Some(allocation) = state.allocations.get(&src.0) else {
                    return Status::InvalidHandle;
                };
                if allocation.bytes.len() < src_span || dst.len() < dst_span {
                    return Status::InvalidValue;
                }
                copy_rows(&allocation.bytes, src_pitch, dst, dst_pitch, width_bytes, height);
            }
        }
        Status::Success
    }

    fn mem_get_info(&self) -> std::result::Result<(u64, u64), Status> {
        let mut state = self.state.lock();
        if let Some(status) = state.take_fault(FaultSite::MemInfo) {
            return Err(status);
        }
        let device = state.current.ok_or(Status::InvalidContext)?;
        let total = self.config.total_memory;
        Ok((total - state.used[device.0 as usize], total))
    }

    fn free(&self, ptr: DevicePtr) -> Status {
        let mut state = self.state.lock();
        if let Some(status) = state.take_fault(FaultSite::Free) {
            return status;
        }
        match state.allocations.remove(&ptr.0) {
            Some(allocation) => {
                state.used[allocation.device.0 as usize] -= allocation.bytes.len() as u64;
                Status::Success
            }
            None => Status::InvalidHandle,
        }
    }
}
