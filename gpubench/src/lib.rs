use std::fmt;

pub use gpubench_types::{BenchConfig, InputFill, KernelKind, KernelSpec, Mode};

pub mod config;
pub mod context;
pub mod cpu;
pub mod dispatcher;
pub mod grid;
pub mod kernels;
pub mod runner;
pub mod stager;
mod validation;

pub use crate::context::GpuContext;
pub use crate::dispatcher::{DispatchCache, DispatchOutput, DispatchState, KernelDispatcher};
pub use crate::grid::{plan, GridPlan};
pub use crate::kernels::{kernel_name_for_row, lookup, KernelLibrary, KERNEL_TABLE};
pub use crate::runner::{format_elapsed, BenchmarkResult, BenchmarkRunner, Comparison};
pub use crate::stager::{AllocationState, BufferStager, DeviceAllocation};
pub use crate::validation::validate;

/// Size in bytes of one problem element (`i32` on host and device).
pub const ELEMENT_SIZE: usize = std::mem::size_of::<i32>();

#[derive(Debug)]
pub enum Error {
    InvalidConfiguration(String),
    KernelNotFound(String),
    PipelineBuildError {
        kernel: String,
        message: String,
    },
    AllocationFailure {
        requested_bytes: u64,
        limit_bytes: Option<u64>,
        message: String,
    },
    ReadFailure(String),
    DeviceExecutionError(String),
    GpuInit(String),
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "invalid configuration: {}", msg),
            Error::KernelNotFound(name) => write!(f, "kernel not found: {}", name),
            Error::PipelineBuildError { kernel, message } => {
                write!(f, "failed to build pipeline for {}: {}", kernel, message)
            }
            Error::AllocationFailure {
                requested_bytes,
                limit_bytes: Some(limit),
                message,
            } => write!(
                f,
                "allocation of {} bytes failed (device limit {}): {}",
                requested_bytes, limit, message
            ),
            Error::AllocationFailure {
                requested_bytes,
                limit_bytes: None,
                message,
            } => write!(f, "allocation of {} bytes failed: {}", requested_bytes, message),
            Error::ReadFailure(msg) => write!(f, "read failure: {}", msg),
            Error::DeviceExecutionError(msg) => write!(f, "device execution error: {}", msg),
            Error::GpuInit(msg) => write!(f, "GPU initialization failed: {}", msg),
            Error::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
