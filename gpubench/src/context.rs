use pollster::block_on;
use tracing::{error, info, info_span};
use wgpu::{
    Backends, DeviceDescriptor, ErrorFilter, InstanceDescriptor, PowerPreference,
    RequestAdapterOptions,
};

use crate::{Error, Result};

/// Backend set for a config's `backends_bits`: `u32::MAX` selects every
/// backend, anything else must be a combination of known backend bits.
pub fn backends_from_bits(bits: u32) -> Result<Backends> {
    if bits == u32::MAX {
        return Ok(Backends::all());
    }
    Backends::from_bits(bits).ok_or_else(|| {
        Error::InvalidConfiguration(format!(
            "unknown backend bits {:#x} (known: {:#x})",
            bits & !Backends::all().bits(),
            Backends::all().bits()
        ))
    })
}

/// An acquired adapter, device and queue plus the limits the device was
/// created with. Capability queries (allocation ceiling, workgroup limits)
/// read from here rather than from constants.
pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    limits: wgpu::Limits,
    adapter_name: String,
}

impl GpuContext {
    pub fn new(backends: Backends) -> Result<Self> {
        let _span = info_span!("gpu_init", ?backends).entered();
        info!("initializing GPU context");

        let instance = wgpu::Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .ok_or_else(|| Error::GpuInit("no compatible GPU adapter found".into()))?;
        let adapter_name = adapter.get_info().name;
        info!(adapter = %adapter_name, "GPU adapter acquired");

        let limits = adapter.limits();
        let (device, queue) = block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("gpubench"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
            },
            None,
        ))
        .map_err(|e| Error::GpuInit(e.to_string()))?;

        // Anything not caught by an error scope is logged instead of panicking.
        device.on_uncaptured_error(Box::new(|e| {
            error!(error = %e, "uncaptured device error");
        }));
        info!(
            max_buffer_size = limits.max_buffer_size,
            max_storage_binding = limits.max_storage_buffer_binding_size,
            max_invocations = limits.max_compute_invocations_per_workgroup,
            "GPU device created"
        );

        Ok(Self {
            device,
            queue,
            limits,
            adapter_name,
        })
    }

    /// Context over the backends in `backends_bits` (see [`backends_from_bits`]).
    pub fn from_bits(backends_bits: u32) -> Result<Self> {
        Self::new(backends_from_bits(backends_bits)?)
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Largest single buffer that can also be bound as storage.
    pub fn max_allocation_bytes(&self) -> u64 {
        self.limits
            .max_buffer_size
            .min(self.limits.max_storage_buffer_binding_size as u64)
    }

    pub fn max_threadgroup_width(&self) -> u32 {
        self.limits
            .max_compute_invocations_per_workgroup
            .min(self.limits.max_compute_workgroup_size_x)
    }

    pub fn max_threadgroups_per_dimension(&self) -> u32 {
        self.limits.max_compute_workgroups_per_dimension
    }

    pub fn max_workgroup_storage_bytes(&self) -> u32 {
        self.limits.max_compute_workgroup_storage_size
    }

    /// Run `f` inside validation and out-of-memory error scopes and return the
    /// first error the device reported for it.
    pub(crate) fn capture_errors<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(ErrorFilter::Validation);
        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        let value = f();
        let out_of_memory = block_on(self.device.pop_error_scope());
        let validation = block_on(self.device.pop_error_scope());
        (value, out_of_memory.or(validation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backends_from_bits() {
        assert_eq!(backends_from_bits(u32::MAX).unwrap(), Backends::all());
        assert_eq!(backends_from_bits(Backends::VULKAN.bits()).unwrap(), Backends::VULKAN);
        let both = (Backends::METAL | Backends::DX12).bits();
        assert_eq!(backends_from_bits(both).unwrap(), Backends::METAL | Backends::DX12);
    }

    #[test]
    fn test_backends_from_bits_rejects_unknown() {
        let unknown = !Backends::all().bits() & !(1 << 31);
        match backends_from_bits(Backends::VULKAN.bits() | unknown) {
            Err(Error::InvalidConfiguration(msg)) => assert!(msg.contains("unknown backend bits")),
            other => panic!("expected InvalidConfiguration, got {:?}", other.map(|_| ())),
        }
    }
}
