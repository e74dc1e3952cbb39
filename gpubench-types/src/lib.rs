use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    Map,
    Reduce,
}

/// A kernel as the host sees it: the entry point name, what it computes and
/// how many input elements each invocation consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub name: String,
    pub kind: KernelKind,
    pub work_multiplier: u32,
}

impl KernelSpec {
    /// Number of output elements the kernel writes for `problem_size` inputs.
    pub fn output_len(&self, problem_size: usize) -> usize {
        match self.kind {
            KernelKind::Map => problem_size,
            KernelKind::Reduce => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Gpu,
    Cpu,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFill {
    Ones,
    Random { seed: u64 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    pub problem_size: usize,
    pub threadgroup_width: u32,
    pub backends_bits: u32,
    pub input: InputFill,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            problem_size: 10_000_000,
            threadgroup_width: 512,
            backends_bits: 0xFFFF_FFFF,
            input: InputFill::Ones,
        }
    }
}
