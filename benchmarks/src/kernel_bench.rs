use gpubench::{BenchConfig, BenchmarkRunner, Mode, KERNEL_TABLE};

use crate::harness::{self, BenchResult};

pub struct Config {
    pub profile: String,
    pub rounds: usize,
    pub kernel: String,
    pub threadgroup_width: u32,
}

fn sizes_for(profile: &str) -> &'static [usize] {
    match profile {
        "quick" => &[1_000, 100_000],
        "full" => &[1_000, 100_000, 1_000_000, 10_000_000],
        _ => &[1_000, 100_000, 1_000_000],
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub fn run(cfg: &Config) -> Vec<BenchResult> {
    let mut results = Vec::new();
    let sizes = sizes_for(&cfg.profile);

    let config = BenchConfig {
        problem_size: sizes[0],
        threadgroup_width: cfg.threadgroup_width,
        ..Default::default()
    };
    let mut runner = match BenchmarkRunner::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("  invalid configuration: {}", e);
            return results;
        }
    };

    eprintln!("\n=== Kernel Benchmarks: GPU dispatch vs single-thread CPU ===");
    eprintln!("  GPU time: submission to completion; CPU time: compute loop only\n");

    for &(name, _, _) in KERNEL_TABLE {
        if cfg.kernel != "all" && cfg.kernel != name {
            continue;
        }

        for &n in sizes {
            let label = format!("{} {}", name, harness::format_count(n));
            eprintln!("  {} ...", label);

            if let Err(e) = runner.set_problem_size(n) {
                eprintln!("  SKIP [{}]: {}", label, e);
                continue;
            }

            let mut gpu_output = None;
            let gpu_ms = harness::median_of(cfg.rounds, || match runner.run(name, Mode::Gpu) {
                Ok(r) => {
                    let ms = r.elapsed_ms;
                    gpu_output = Some(r.output);
                    Some(ms)
                }
                Err(e) => {
                    eprintln!("  GPU FAIL [{}]: {}", label, e);
                    None
                }
            });

            let mut cpu_output = None;
            let cpu_ms = harness::median_of(cfg.rounds, || match runner.run(name, Mode::Cpu) {
                Ok(r) => {
                    let ms = r.elapsed_ms;
                    cpu_output = Some(r.output);
                    Some(ms)
                }
                Err(e) => {
                    eprintln!("  CPU FAIL [{}]: {}", label, e);
                    None
                }
            });

            let verified = match (&gpu_output, &cpu_output) {
                (Some(g), Some(c)) => {
                    let ok = g == c;
                    if !ok {
                        eprintln!("  VERIFY FAIL [{}]: GPU and CPU outputs differ", label);
                    }
                    Some(ok)
                }
                _ => None,
            };

            results.push(BenchResult {
                name: label,
                cpu_ms,
                gpu_ms,
                verified,
            });
        }
    }

    if let Some(adapter) = runner.adapter_name() {
        eprintln!("  GPU adapter: {}", adapter);
    }
    results
}
