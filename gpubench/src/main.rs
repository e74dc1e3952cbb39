use std::str::FromStr;

use gpubench::{
    config, format_elapsed, kernel_name_for_row, BenchConfig, BenchmarkRunner, Comparison, Mode,
    KERNEL_TABLE,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: gpubench [OPTIONS] [KERNEL]");
    eprintln!();
    eprintln!("  KERNEL             Kernel to run (default: reduce)");
    eprintln!("  --row <n>          Pick the kernel by list row: 0 = map, n = reduce<n>");
    eprintln!("  --mode <m>         gpu, cpu or both (default: both)");
    eprintln!("  --size <n>         Problem size in elements");
    eprintln!("  --width <n>        Threadgroup width");
    eprintln!("  --config <path>    JSON config file");
    eprintln!("  --list             List kernels");
    eprintln!("  --help             Show this help");
}

fn parse_flag<T: FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn parse_or_exit<T: FromStr>(flag: &str, value: &str) -> T {
    match parse_flag(flag, value) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("off")),
                ),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut kernel = "reduce".to_string();
    let mut modes = vec![Mode::Gpu, Mode::Cpu];
    let mut config_path: Option<String> = None;
    let mut size: Option<usize> = None;
    let mut width: Option<u32> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--row" => {
                i += 1;
                if i < args.len() {
                    kernel = kernel_name_for_row(parse_or_exit("--row", &args[i]));
                }
            }
            "--mode" => {
                i += 1;
                if i < args.len() {
                    modes = match args[i].as_str() {
                        "gpu" => vec![Mode::Gpu],
                        "cpu" => vec![Mode::Cpu],
                        "both" => vec![Mode::Gpu, Mode::Cpu],
                        other => {
                            eprintln!("Unknown mode: {}", other);
                            print_usage();
                            std::process::exit(1);
                        }
                    };
                }
            }
            "--size" => {
                i += 1;
                if i < args.len() { size = Some(parse_or_exit("--size", &args[i])); }
            }
            "--width" => {
                i += 1;
                if i < args.len() { width = Some(parse_or_exit("--width", &args[i])); }
            }
            "--config" => {
                i += 1;
                if i < args.len() { config_path = Some(args[i].clone()); }
            }
            "--list" => {
                for (name, kind, multiplier) in KERNEL_TABLE {
                    println!("{:<10} {:?} x{}", name, kind, multiplier);
                }
                return;
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other if other.starts_with("--") => {
                eprintln!("Unknown flag: {}", other);
                print_usage();
                std::process::exit(1);
            }
            other => kernel = other.to_string(),
        }
        i += 1;
    }

    let mut cfg = match config_path {
        Some(path) => match config::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        },
        None => BenchConfig::default(),
    };
    if let Some(n) = size {
        cfg.problem_size = n;
    }
    if let Some(w) = width {
        cfg.threadgroup_width = w;
    }

    let mut runner = match BenchmarkRunner::new(cfg) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Kernel {} over {} elements",
        kernel,
        runner.config().problem_size
    );
    let mut gpu_result = None;
    let mut cpu_result = None;
    for mode in modes {
        let result = runner.run(&kernel, mode);
        let label = match mode {
            Mode::Gpu => "GPU",
            Mode::Cpu => "CPU",
        };
        match &result {
            Ok(r) => {
                let value = r.value().map_or_else(|| "-".to_string(), |v| v.to_string());
                println!("{:<4} result {:>12}  {}", label, value, format_elapsed(&result));
            }
            Err(e) => {
                println!("{:<4} {}", label, format_elapsed(&result));
                eprintln!("✗ {} run failed: {}", label, e);
            }
        }
        match (mode, result) {
            (Mode::Gpu, Ok(r)) => gpu_result = Some(r),
            (Mode::Cpu, Ok(r)) => cpu_result = Some(r),
            (Mode::Cpu, Err(_)) => std::process::exit(1),
            (Mode::Gpu, Err(_)) => {}
        }
    }
    if let (Some(gpu), Some(cpu)) = (gpu_result, cpu_result) {
        let cmp = Comparison { gpu, cpu };
        let speedup = cmp
            .speedup()
            .map_or_else(|| "N/A".to_string(), |s| format!("{:.2}x", s));
        let check = if cmp.matches() { "match" } else { "differ" };
        println!("Speedup {}  outputs {}", speedup, check);
    }
    if let Some(name) = runner.adapter_name() {
        eprintln!("GPU adapter: {}", name);
    }
}
