//! Ping-pong buffer pair.
//!
//! Two equally sized device buffers live in a fixed two-slot pool. The
//! `current` index names the slot holding the latest array state; the other
//! slot is scratch for the next pass. Swapping flips the index and never
//! moves data, so the two roles can never alias.

use crate::device::ComputeDevice;
use crate::error::DeviceError;

/// Double-buffered device storage owned by a single job.
#[derive(Debug)]
pub struct BufferPair<B> {
    slots: [B; 2],
    current: usize,
    len: usize,
    uploaded: bool,
    swaps: usize,
}

impl<B> BufferPair<B> {
    /// Allocate both slots on `device`, each holding `len` elements.
    pub fn allocate<D>(device: &D, len: usize) -> Result<Self, DeviceError>
    where
        D: ComputeDevice<Buffer = B> + ?Sized,
    {
        let a = device.create_buffer(len)?;
        let b = device.create_buffer(len)?;
        Ok(Self {
            slots: [a, b],
            current: 0,
            len,
            uploaded: false,
            swaps: 0,
        })
    }

    /// Write the initial array into the current slot. Allowed once, before
    /// any pass.
    pub fn upload<D>(&mut self, device: &D, values: &[f32]) -> Result<(), DeviceError>
    where
        D: ComputeDevice<Buffer = B> + ?Sized,
    {
        if self.uploaded {
            return Err(DeviceError::allocation("buffer pair already holds a job"));
        }
        if values.len() != self.len {
            return Err(DeviceError::allocation(format!(
                "upload of {} elements into buffers of {}",
                values.len(),
                self.len
            )));
        }
        device.upload(self.current(), values)?;
        self.uploaded = true;
        Ok(())
    }

    /// Buffer holding the authoritative array state.
    #[inline]
    pub fn current(&self) -> &B {
        &self.slots[self.current]
    }

    /// Buffer the next pass writes into.
    #[inline]
    pub fn scratch(&self) -> &B {
        &self.slots[1 - self.current]
    }

    /// Flip the roles of the two slots.
    #[inline]
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
        self.swaps += 1;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Number of swaps since allocation, i.e. passes executed.
    pub fn swaps(&self) -> usize {
        self.swaps
    }

    /// Copy the first `count` elements of the current slot to the host.
    pub async fn read_current<D>(&self, device: &D, count: usize) -> Result<Vec<f32>, DeviceError>
    where
        D: ComputeDevice<Buffer = B> + ?Sized,
    {
        device.readback(self.current(), count).await
    }
}
