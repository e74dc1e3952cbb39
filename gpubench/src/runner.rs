use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span, warn};

use crate::dispatcher::{DispatchCache, KernelDispatcher};
use crate::kernels::{lookup, KernelLibrary};
use crate::validation::validate_for_device;
use crate::{cpu, validate, BenchConfig, GpuContext, InputFill, KernelSpec, Mode, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub kernel: String,
    pub mode: Mode,
    pub output: Vec<i32>,
    pub elapsed_ms: f64,
}

impl BenchmarkResult {
    /// The scalar a reduction produced, or the first mapped element.
    pub fn value(&self) -> Option<i32> {
        self.output.first().copied()
    }
}

/// Elapsed time as shown to users: two decimals and a unit, or `error` when
/// the run failed.
pub fn format_elapsed(result: &Result<BenchmarkResult>) -> String {
    match result {
        Ok(r) => format!("{:.2} ms", r.elapsed_ms),
        Err(_) => "error".to_string(),
    }
}

/// GPU and CPU runs of one kernel over the same input.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub gpu: BenchmarkResult,
    pub cpu: BenchmarkResult,
}

impl Comparison {
    pub fn matches(&self) -> bool {
        self.gpu.output == self.cpu.output
    }

    pub fn speedup(&self) -> Option<f64> {
        if self.gpu.elapsed_ms > 0.0 {
            Some(self.cpu.elapsed_ms / self.gpu.elapsed_ms)
        } else {
            None
        }
    }
}

struct GpuBackend {
    ctx: GpuContext,
    library: KernelLibrary,
    cache: Option<DispatchCache>,
}

impl GpuBackend {
    fn new(ctx: GpuContext, config: &BenchConfig) -> Result<Self> {
        validate_for_device(config, &ctx)?;
        let library = KernelLibrary::builtin(config.threadgroup_width)?;
        Ok(Self {
            ctx,
            library,
            cache: None,
        })
    }
}

/// Builds inputs and times kernels on either backend. Runs are sequential:
/// `run` takes `&mut self`, so one dispatch is in flight per runner.
pub struct BenchmarkRunner {
    config: BenchConfig,
    gpu: Option<GpuBackend>,
}

impl BenchmarkRunner {
    /// The GPU is acquired on the first GPU run.
    pub fn new(config: BenchConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self { config, gpu: None })
    }

    /// Reuse an already acquired device.
    pub fn with_context(config: BenchConfig, ctx: GpuContext) -> Result<Self> {
        let gpu = GpuBackend::new(ctx, &config)?;
        Ok(Self {
            config,
            gpu: Some(gpu),
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Resize later runs, rechecking the new size against the device if one
    /// is already acquired.
    pub fn set_problem_size(&mut self, problem_size: usize) -> Result<()> {
        let config = BenchConfig {
            problem_size,
            ..self.config.clone()
        };
        match &self.gpu {
            Some(gpu) => validate_for_device(&config, &gpu.ctx)?,
            None => validate(&config)?,
        }
        self.config = config;
        Ok(())
    }

    /// Fresh input of `problem_size` elements.
    pub fn build_input(&self) -> Vec<i32> {
        let n = self.config.problem_size;
        match self.config.input {
            InputFill::Ones => vec![1; n],
            InputFill::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..n).map(|_| rng.gen_range(-1000..=1000)).collect()
            }
        }
    }

    pub fn run(&mut self, kernel_name: &str, mode: Mode) -> Result<BenchmarkResult> {
        let spec = lookup(kernel_name)?;
        let input = self.build_input();
        self.run_spec(&spec, &input, mode)
    }

    /// Run both backends over one input.
    pub fn compare(&mut self, kernel_name: &str) -> Result<Comparison> {
        let spec = lookup(kernel_name)?;
        let input = self.build_input();
        let gpu = self.run_spec(&spec, &input, Mode::Gpu)?;
        let cpu = self.run_spec(&spec, &input, Mode::Cpu)?;
        Ok(Comparison { gpu, cpu })
    }

    fn run_spec(&mut self, spec: &KernelSpec, input: &[i32], mode: Mode) -> Result<BenchmarkResult> {
        let _span = info_span!("run", kernel = %spec.name, ?mode, n = input.len()).entered();
        let output_size = spec.output_len(input.len());

        let outcome = match mode {
            Mode::Cpu => Ok(cpu::run(spec.kind, input)),
            Mode::Gpu => self.run_gpu(spec, input, output_size),
        };

        match outcome {
            Ok((output, elapsed_ms)) => {
                info!(elapsed_ms, output_len = output.len(), "run finished");
                Ok(BenchmarkResult {
                    kernel: spec.name.clone(),
                    mode,
                    output,
                    elapsed_ms,
                })
            }
            Err(e) => {
                warn!(error = %e, "run failed");
                Err(e)
            }
        }
    }

    fn run_gpu(
        &mut self,
        spec: &KernelSpec,
        input: &[i32],
        output_size: usize,
    ) -> Result<(Vec<i32>, f64)> {
        let mut backend = match self.gpu.take() {
            Some(b) => b,
            None => {
                let ctx = GpuContext::from_bits(self.config.backends_bits)?;
                GpuBackend::new(ctx, &self.config)?
            }
        };

        // Pipelines built by earlier runs are reused across rounds.
        let mut dispatcher = match backend.cache.take() {
            Some(cache) => KernelDispatcher::with_cache(&backend.ctx, &backend.library, cache),
            None => KernelDispatcher::new(&backend.ctx, &backend.library),
        };
        let result = dispatcher
            .dispatch(spec, input, output_size)
            .map(|d| (d.output, d.elapsed_ms));
        backend.cache = Some(dispatcher.into_cache());
        self.gpu = Some(backend);
        result
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.gpu.as_ref().map(|g| g.ctx.adapter_name())
    }
}
