use crossbeam_channel::bounded;
use tracing::{debug, trace};
use wgpu::{BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Maintain, MapMode};

use crate::{Error, GpuContext, Result, ELEMENT_SIZE};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationState {
    /// Holds host data; no dispatch has touched it.
    Staged,
    /// Bound to a submitted dispatch that has not been confirmed complete.
    InFlight,
    Completed,
    Failed,
}

/// Device storage backing one host sequence of `i32`. Dropping it frees the
/// device buffer; [`BufferStager::release`] does so explicitly.
pub struct DeviceAllocation {
    buffer: wgpu::Buffer,
    len: usize,
    state: AllocationState,
}

impl DeviceAllocation {
    /// Logical element count. The backing buffer holds at least one element.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> u64 {
        (self.len * ELEMENT_SIZE) as u64
    }

    pub fn state(&self) -> AllocationState {
        self.state
    }

    pub(crate) fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub(crate) fn set_state(&mut self, state: AllocationState) {
        self.state = state;
    }
}

/// Bytes needed for `count` elements, or `AllocationFailure` if that exceeds
/// `limit_bytes`.
pub fn check_ceiling(count: usize, limit_bytes: u64) -> Result<u64> {
    let requested = (count as u64)
        .checked_mul(ELEMENT_SIZE as u64)
        .ok_or_else(|| Error::AllocationFailure {
            requested_bytes: u64::MAX,
            limit_bytes: Some(limit_bytes),
            message: format!("{} elements overflow the byte size", count),
        })?;
    if requested > limit_bytes {
        return Err(Error::AllocationFailure {
            requested_bytes: requested,
            limit_bytes: Some(limit_bytes),
            message: "exceeds the device's maximum single allocation".into(),
        });
    }
    Ok(requested)
}

// Zero-sized storage bindings are invalid, so an empty sequence still gets one
// (zeroed) element of backing storage.
fn backing_size(bytes: u64) -> u64 {
    bytes.max(ELEMENT_SIZE as u64)
}

fn encode(host_data: &[i32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(host_data.len() * ELEMENT_SIZE);
    for &v in host_data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(ELEMENT_SIZE)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Moves `i32` sequences between host memory and device storage buffers.
pub struct BufferStager<'a> {
    ctx: &'a GpuContext,
}

impl<'a> BufferStager<'a> {
    pub fn new(ctx: &'a GpuContext) -> Self {
        Self { ctx }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.ctx.max_allocation_bytes()
    }

    fn allocate(&self, label: &str, len: usize) -> Result<DeviceAllocation> {
        let requested = check_ceiling(len, self.limit_bytes())?;
        let (buffer, err) = self.ctx.capture_errors(|| {
            self.ctx.device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: backing_size(requested),
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        if let Some(e) = err {
            return Err(Error::AllocationFailure {
                requested_bytes: requested,
                limit_bytes: Some(self.limit_bytes()),
                message: e.to_string(),
            });
        }
        debug!(label, len, bytes = requested, "device buffer allocated");

        Ok(DeviceAllocation {
            buffer,
            len,
            state: AllocationState::Staged,
        })
    }

    /// Copy `host_data` into a new device allocation of exactly its size.
    pub fn stage_in(&self, host_data: &[i32]) -> Result<DeviceAllocation> {
        let allocation = self.allocate("Input", host_data.len())?;
        if !host_data.is_empty() {
            let bytes = encode(host_data);
            let ((), err) = self
                .ctx
                .capture_errors(|| self.ctx.queue.write_buffer(&allocation.buffer, 0, &bytes));
            if let Some(e) = err {
                return Err(Error::AllocationFailure {
                    requested_bytes: bytes.len() as u64,
                    limit_bytes: Some(self.limit_bytes()),
                    message: e.to_string(),
                });
            }
        }
        trace!(len = host_data.len(), "staged in");
        Ok(allocation)
    }

    /// A zero-initialized device allocation of `count` elements.
    pub fn stage_zeroed(&self, count: usize) -> Result<DeviceAllocation> {
        // wgpu zero-fills new buffers.
        self.allocate("Output", count)
    }

    /// Copy the first `count` elements of `allocation` back to the host.
    pub fn stage_out(&self, allocation: &DeviceAllocation, count: usize) -> Result<Vec<i32>> {
        match allocation.state {
            AllocationState::Staged | AllocationState::Completed => {}
            state => {
                return Err(Error::ReadFailure(format!(
                    "allocation is stale ({:?}); its dispatch never completed",
                    state
                )))
            }
        }
        if count > allocation.len {
            return Err(Error::ReadFailure(format!(
                "requested {} elements from an allocation of {}",
                count, allocation.len
            )));
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = (count * ELEMENT_SIZE) as u64;
        let device = &self.ctx.device;
        let (staging, err) = self.ctx.capture_errors(|| {
            let staging = device.create_buffer(&BufferDescriptor {
                label: Some("Staging"),
                size: bytes,
                usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
            encoder.copy_buffer_to_buffer(&allocation.buffer, 0, &staging, 0, bytes);
            let index = self.ctx.queue.submit(Some(encoder.finish()));
            (staging, index)
        });
        if let Some(e) = err {
            return Err(Error::ReadFailure(e.to_string()));
        }
        let (staging, index) = staging;

        let (tx, rx) = bounded(1);
        let slice = staging.slice(..);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(Maintain::wait_for(index));

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::ReadFailure(e.to_string())),
            Err(_) => return Err(Error::ReadFailure("buffer mapping was dropped".into())),
        }

        let mapped = slice.get_mapped_range();
        let out = decode(&mapped);
        drop(mapped);
        staging.unmap();
        trace!(count, "staged out");
        Ok(out)
    }

    /// Free the device buffer now rather than at drop.
    pub fn release(&self, allocation: DeviceAllocation) {
        trace!(len = allocation.len, state = ?allocation.state, "releasing device buffer");
        allocation.buffer.destroy();
    }
}
