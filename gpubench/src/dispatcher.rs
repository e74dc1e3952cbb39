use std::collections::HashMap;

use quanta::Clock;
use tracing::{debug, info, info_span, trace, warn};
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, BufferBindingType, CommandEncoderDescriptor,
    ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor, Maintain,
    PipelineCompilationOptions, PipelineLayoutDescriptor, ShaderModule, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

use crate::grid::plan;
use crate::stager::{check_ceiling, AllocationState, BufferStager};
use crate::{Error, GpuContext, KernelLibrary, KernelSpec, Result};

/// Binding slot of the input buffer for every kernel.
pub const INPUT_SLOT: u32 = 0;
/// Binding slot of the output buffer for every kernel.
pub const OUTPUT_SLOT: u32 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Created,
    PipelineBuilt,
    BuffersBound,
    Submitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutput {
    pub output: Vec<i32>,
    /// Submission to device-confirmed completion; staging is excluded.
    pub elapsed_ms: f64,
}

fn storage_entry(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Device objects a dispatcher builds on demand: the compiled library, one
/// pipeline per kernel and the bind group layout they share. Passing the cache
/// to a later dispatcher over the same context and library skips recompiling.
pub struct DispatchCache {
    module: Option<ShaderModule>,
    pipelines: HashMap<String, ComputePipeline>,
    layout: BindGroupLayout,
}

impl DispatchCache {
    fn new(ctx: &GpuContext) -> Self {
        let layout = ctx.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Kernel Bind Group Layout"),
            entries: &[storage_entry(INPUT_SLOT, true), storage_entry(OUTPUT_SLOT, false)],
        });
        Self {
            module: None,
            pipelines: HashMap::new(),
            layout,
        }
    }

    pub fn is_cached(&self, kernel: &str) -> bool {
        self.pipelines.contains_key(kernel)
    }
}

/// Runs one kernel from a library over one input, one dispatch at a time.
pub struct KernelDispatcher<'a> {
    ctx: &'a GpuContext,
    library: &'a KernelLibrary,
    cache: DispatchCache,
    state: DispatchState,
    clock: Clock,
}

impl<'a> KernelDispatcher<'a> {
    pub fn new(ctx: &'a GpuContext, library: &'a KernelLibrary) -> Self {
        Self::with_cache(ctx, library, DispatchCache::new(ctx))
    }

    /// Resume with objects built by an earlier dispatcher. `cache` must come
    /// from a dispatcher over the same `ctx` and `library`.
    pub fn with_cache(
        ctx: &'a GpuContext,
        library: &'a KernelLibrary,
        cache: DispatchCache,
    ) -> Self {
        Self {
            ctx,
            library,
            cache,
            state: DispatchState::Created,
            clock: Clock::new(),
        }
    }

    pub fn into_cache(self) -> DispatchCache {
        self.cache
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn transition(&mut self, next: DispatchState) {
        debug!(from = ?self.state, to = ?next, "dispatch state");
        self.state = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        self.transition(DispatchState::Failed);
        err
    }

    fn compile_library(&self, spec: &KernelSpec) -> Result<ShaderModule> {
        let source = self.library.source();
        let (module, err) = self.ctx.capture_errors(|| {
            self.ctx.device.create_shader_module(ShaderModuleDescriptor {
                label: Some("Kernel Library"),
                source: ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(e) = err {
            return Err(Error::PipelineBuildError {
                kernel: spec.name.clone(),
                message: e.to_string(),
            });
        }
        info!(source_len = source.len(), "kernel library compiled");
        Ok(module)
    }

    fn build_pipeline(&mut self, spec: &KernelSpec) -> Result<()> {
        if !self.library.contains(&spec.name) {
            return Err(Error::KernelNotFound(spec.name.clone()));
        }
        if self.cache.is_cached(&spec.name) {
            trace!("pipeline cached");
            return Ok(());
        }

        // The library is compiled once and shared by every kernel's pipeline.
        let module = match self.cache.module.take() {
            Some(m) => m,
            None => self.compile_library(spec)?,
        };

        let device = &self.ctx.device;
        let layout = &self.cache.layout;
        let (pipeline, err) = self.ctx.capture_errors(|| {
            let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("Kernel Pipeline Layout"),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(spec.name.as_str()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: spec.name.as_str(),
                compilation_options: PipelineCompilationOptions::default(),
            })
        });
        self.cache.module = Some(module);
        if let Some(e) = err {
            return Err(Error::PipelineBuildError {
                kernel: spec.name.clone(),
                message: e.to_string(),
            });
        }
        self.cache.pipelines.insert(spec.name.clone(), pipeline);
        Ok(())
    }

    /// Run `spec` over `input`, producing `output_size` elements.
    ///
    /// Both device allocations are released before returning, on success and
    /// on every error path. The wait for completion is unbounded.
    pub fn dispatch(
        &mut self,
        spec: &KernelSpec,
        input: &[i32],
        output_size: usize,
    ) -> Result<DispatchOutput> {
        let _span = info_span!("dispatch", kernel = %spec.name, n = input.len()).entered();
        self.state = DispatchState::Created;

        self.build_pipeline(spec).map_err(|e| self.fail(e))?;
        self.transition(DispatchState::PipelineBuilt);

        let stager = BufferStager::new(self.ctx);
        let limit = stager.limit_bytes();
        check_ceiling(input.len(), limit).map_err(|e| self.fail(e))?;
        check_ceiling(output_size, limit).map_err(|e| self.fail(e))?;

        let width = self.library.threadgroup_width();
        let grid = plan(input.len(), width, spec.work_multiplier).map_err(|e| self.fail(e))?;
        let (groups_x, groups_y) = grid
            .dispatch_dims(self.ctx.max_threadgroups_per_dimension())
            .map_err(|e| self.fail(e))?;

        let mut input_alloc = stager.stage_in(input).map_err(|e| self.fail(e))?;
        let mut output_alloc = stager.stage_zeroed(output_size).map_err(|e| self.fail(e))?;

        let bind_group = self.ctx.device.create_bind_group(&BindGroupDescriptor {
            label: Some("Kernel Bind Group"),
            layout: &self.cache.layout,
            entries: &[
                BindGroupEntry {
                    binding: INPUT_SLOT,
                    resource: input_alloc.buffer().as_entire_binding(),
                },
                BindGroupEntry {
                    binding: OUTPUT_SLOT,
                    resource: output_alloc.buffer().as_entire_binding(),
                },
            ],
        });
        self.transition(DispatchState::BuffersBound);

        info!(
            block_x = width,
            grid_x = groups_x,
            grid_y = groups_y,
            threadgroups = grid.threadgroup_count,
            multiplier = spec.work_multiplier,
            "grid planned"
        );

        let pipeline = match self.cache.pipelines.get(&spec.name) {
            Some(p) => p,
            None => return Err(self.fail(Error::KernelNotFound(spec.name.clone()))),
        };
        let ctx = self.ctx;
        let device = &ctx.device;
        let clock = self.clock.clone();
        let (submitted, err) = ctx.capture_errors(|| {
            let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Kernel Encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("Kernel Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups_x, groups_y, 1);
            }
            let commands = encoder.finish();
            let start = clock.now();
            let index = ctx.queue.submit(Some(commands));
            (start, index)
        });
        input_alloc.set_state(AllocationState::InFlight);
        output_alloc.set_state(AllocationState::InFlight);
        if let Some(e) = err {
            return Err(self.fail(Error::DeviceExecutionError(e.to_string())));
        }
        self.transition(DispatchState::Submitted);
        let (start, index) = submitted;

        debug!("waiting for device completion (no timeout)");
        let (_, err) = ctx.capture_errors(|| device.poll(Maintain::wait_for(index)));
        let elapsed = self.clock.now().duration_since(start);
        if let Some(e) = err {
            input_alloc.set_state(AllocationState::Failed);
            output_alloc.set_state(AllocationState::Failed);
            warn!(error = %e, "device reported an execution error");
            return Err(self.fail(Error::DeviceExecutionError(e.to_string())));
        }
        input_alloc.set_state(AllocationState::Completed);
        output_alloc.set_state(AllocationState::Completed);
        self.transition(DispatchState::Completed);

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        info!(elapsed_ms, "dispatch complete");

        let output = stager.stage_out(&output_alloc, output_size);
        stager.release(input_alloc);
        stager.release(output_alloc);

        Ok(DispatchOutput {
            output: output?,
            elapsed_ms,
        })
    }
}
