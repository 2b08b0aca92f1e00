//! Host (CPU) compute device.
//!
//! Runs the compare-exchange kernel across lanes with rayon. Every pass
//! completes before its future resolves, so the device behaves like a
//! fully synchronous GPU queue. Buffer traffic is counted, and a fault can
//! be injected at a chosen pass, which makes this backend the reference
//! for the engine's buffer discipline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use rayon::prelude::*;

use crate::device::{check_buffer_len, BackendKind, ComputeDevice, DeviceInfo};
use crate::error::DeviceError;
use crate::kernel::compare_exchange_lane;
use crate::schedule::PassDescriptor;

/// Largest host buffer, in elements (1 GiB of `f32`).
const MAX_HOST_BUFFER_LEN: usize = 1 << 28;

/// A host-resident buffer.
#[derive(Debug)]
pub struct HostBuffer {
    data: RwLock<Vec<f32>>,
}

impl HostBuffer {
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts of device operations since creation or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub allocations: usize,
    pub uploads: usize,
    pub dispatches: usize,
    pub readbacks: usize,
}

/// Failure to inject into the next job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the dispatch of this pass.
    Dispatch(PassDescriptor),
    /// Fail the `n`th readback (0-based).
    Readback(usize),
}

/// CPU implementation of [`ComputeDevice`].
#[derive(Debug)]
pub struct HostDevice {
    info: DeviceInfo,
    allocations: AtomicUsize,
    uploads: AtomicUsize,
    dispatches: AtomicUsize,
    readbacks: AtomicUsize,
    fault: Mutex<Option<Fault>>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    pub fn new() -> Self {
        let threads = rayon::current_num_threads();
        Self {
            info: DeviceInfo {
                name: format!("host ({threads} threads)"),
                backend: BackendKind::Host,
                is_gpu: false,
                max_buffer_len: MAX_HOST_BUFFER_LEN,
            },
            allocations: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
            readbacks: AtomicUsize::new(0),
            fault: Mutex::new(None),
        }
    }

    /// Make a later operation fail. The fault fires once.
    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut slot) = self.fault.lock() {
            *slot = Some(fault);
        }
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            readbacks: self.readbacks.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.allocations.store(0, Ordering::Relaxed);
        self.uploads.store(0, Ordering::Relaxed);
        self.dispatches.store(0, Ordering::Relaxed);
        self.readbacks.store(0, Ordering::Relaxed);
    }

    /// Take the pending fault if `matches` accepts it.
    fn take_fault(&self, matches: impl FnOnce(Fault) -> bool) -> bool {
        let Ok(mut slot) = self.fault.lock() else {
            return false;
        };
        match *slot {
            Some(fault) if matches(fault) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn run_pass(
        &self,
        input: &HostBuffer,
        output: &HostBuffer,
        pass: PassDescriptor,
        lanes: usize,
    ) -> Result<(), DeviceError> {
        if std::ptr::eq(input, output) {
            return Err(DeviceError::dispatch("input and output buffers alias"));
        }
        if self.take_fault(|f| f == Fault::Dispatch(pass)) {
            return Err(DeviceError::dispatch(format!("injected fault at {pass}")));
        }

        let src = input
            .data
            .read()
            .map_err(|_| DeviceError::dispatch("input buffer poisoned"))?;
        let mut dst = output
            .data
            .write()
            .map_err(|_| DeviceError::dispatch("output buffer poisoned"))?;

        if lanes > src.len() || lanes > dst.len() || !lanes.is_power_of_two() {
            return Err(DeviceError::dispatch(format!(
                "{lanes} lanes do not fit buffers of {} and {} elements",
                src.len(),
                dst.len()
            )));
        }
        if pass.block_size() > lanes {
            return Err(DeviceError::dispatch(format!(
                "pass {pass} needs at least {} lanes, got {lanes}",
                pass.block_size()
            )));
        }

        let src = &src[..lanes];
        dst[..lanes]
            .par_iter_mut()
            .enumerate()
            .for_each(|(lane, slot)| *slot = compare_exchange_lane(src, lane, pass));

        self.dispatches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn copy_out(&self, buffer: &HostBuffer, count: usize) -> Result<Vec<f32>, DeviceError> {
        let index = self.readbacks.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(|f| f == Fault::Readback(index)) {
            return Err(DeviceError::readback(format!("injected fault at readback {index}")));
        }
        let data = buffer
            .data
            .read()
            .map_err(|_| DeviceError::readback("buffer poisoned"))?;
        data.get(..count).map(<[f32]>::to_vec).ok_or_else(|| {
            DeviceError::readback(format!(
                "requested {count} elements from a buffer of {}",
                data.len()
            ))
        })
    }
}

impl ComputeDevice for HostDevice {
    type Buffer = HostBuffer;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, len: usize) -> Result<HostBuffer, DeviceError> {
        check_buffer_len(&self.info, len)?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(HostBuffer {
            data: RwLock::new(vec![0.0; len]),
        })
    }

    fn upload(&self, buffer: &HostBuffer, values: &[f32]) -> Result<(), DeviceError> {
        let mut data = buffer
            .data
            .write()
            .map_err(|_| DeviceError::allocation("buffer poisoned"))?;
        let capacity = data.len();
        let dst = data.get_mut(..values.len()).ok_or_else(|| {
            DeviceError::allocation(format!(
                "{} elements do not fit a buffer of {capacity}",
                values.len()
            ))
        })?;
        dst.copy_from_slice(values);
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn dispatch_compare_exchange(
        &self,
        input: &HostBuffer,
        output: &HostBuffer,
        pass: PassDescriptor,
        lanes: usize,
    ) -> Result<(), DeviceError> {
        self.run_pass(input, output, pass, lanes)
    }

    async fn readback(&self, buffer: &HostBuffer, count: usize) -> Result<Vec<f32>, DeviceError> {
        self.copy_out(buffer, count)
    }
}
