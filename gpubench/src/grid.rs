use crate::{Error, Result};

/// One-dimensional dispatch shape: `threadgroup_count` groups of
/// `threadgroup_width` invocations, each invocation covering
/// `work_multiplier` elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridPlan {
    pub threadgroup_width: u32,
    pub threadgroup_count: u32,
    pub work_multiplier: u32,
}

impl GridPlan {
    /// Elements covered by one threadgroup.
    pub fn span(&self) -> u64 {
        self.threadgroup_width as u64 * self.work_multiplier as u64
    }

    /// Elements covered by the whole grid.
    pub fn coverage(&self) -> u64 {
        self.threadgroup_count as u64 * self.span()
    }

    /// Fold the group count into an `(x, y)` grid whose dimensions respect
    /// `max_per_dim`. `x * y >= threadgroup_count`; kernels linearize the group
    /// id and discard the tail.
    pub fn dispatch_dims(&self, max_per_dim: u32) -> Result<(u32, u32)> {
        if max_per_dim == 0 {
            return Err(Error::InvalidConfiguration(
                "max workgroups per dimension must be positive".into(),
            ));
        }
        if self.threadgroup_count <= max_per_dim {
            return Ok((self.threadgroup_count, 1));
        }
        let x = max_per_dim;
        let y = self.threadgroup_count.div_ceil(x);
        if y > max_per_dim {
            return Err(Error::InvalidConfiguration(format!(
                "{} threadgroups exceed a {}x{} dispatch grid",
                self.threadgroup_count, max_per_dim, max_per_dim
            )));
        }
        Ok((x, y))
    }
}

/// Smallest grid covering `problem_size` elements. A zero-sized problem still
/// gets one (idle) threadgroup.
pub fn plan(problem_size: usize, threadgroup_width: u32, work_multiplier: u32) -> Result<GridPlan> {
    if threadgroup_width == 0 {
        return Err(Error::InvalidConfiguration(
            "threadgroup width must be positive".into(),
        ));
    }
    if work_multiplier == 0 {
        return Err(Error::InvalidConfiguration(
            "work multiplier must be at least 1".into(),
        ));
    }

    let span = threadgroup_width as u64 * work_multiplier as u64;
    let count = (problem_size as u64).div_ceil(span).max(1);
    let threadgroup_count = u32::try_from(count).map_err(|_| {
        Error::InvalidConfiguration(format!(
            "{} threadgroups do not fit a 32-bit dispatch",
            count
        ))
    })?;

    Ok(GridPlan {
        threadgroup_width,
        threadgroup_count,
        work_multiplier,
    })
}
