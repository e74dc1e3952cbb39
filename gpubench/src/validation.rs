use crate::context::backends_from_bits;
use crate::stager::check_ceiling;
use crate::{BenchConfig, Error, GpuContext, Result, ELEMENT_SIZE};

/// Checks that need no device.
pub fn validate(config: &BenchConfig) -> Result<()> {
    if config.threadgroup_width == 0 {
        return Err(Error::InvalidConfiguration(
            "threadgroup width must be positive".into(),
        ));
    }

    // Kernels index with u32.
    if config.problem_size > u32::MAX as usize {
        return Err(Error::InvalidConfiguration(format!(
            "problem size {} exceeds 32-bit indexing",
            config.problem_size
        )));
    }

    backends_from_bits(config.backends_bits)?;
    Ok(())
}

/// Checks against what the acquired device can actually run.
pub(crate) fn validate_for_device(config: &BenchConfig, ctx: &GpuContext) -> Result<()> {
    validate(config)?;

    let max_width = ctx.max_threadgroup_width();
    if config.threadgroup_width > max_width {
        return Err(Error::InvalidConfiguration(format!(
            "threadgroup width {} exceeds device maximum {}",
            config.threadgroup_width, max_width
        )));
    }

    // Reduction kernels keep one i32 per invocation in workgroup memory.
    let shared_bytes = config.threadgroup_width as u64 * ELEMENT_SIZE as u64;
    if shared_bytes > ctx.max_workgroup_storage_bytes() as u64 {
        return Err(Error::InvalidConfiguration(format!(
            "threadgroup width {} needs {} bytes of workgroup storage, device allows {}",
            config.threadgroup_width,
            shared_bytes,
            ctx.max_workgroup_storage_bytes()
        )));
    }

    check_ceiling(config.problem_size, ctx.max_allocation_bytes())?;
    Ok(())
}
