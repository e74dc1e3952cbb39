mod harness;
mod kernel_bench;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: benchmarks [OPTIONS]");
    eprintln!();
    eprintln!("  --kernel <name>    Kernel to run: map, map4, reduce, reduce2, ..., all (default: all)");
    eprintln!("  --profile <name>   Profile: quick, medium, full (default: medium)");
    eprintln!("  --rounds <n>       Rounds per measurement (default: 5)");
    eprintln!("  --width <n>        Threadgroup width (default: 256)");
    eprintln!("  --help             Show this help");
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

    let mut kernel = "all".to_string();
    let mut profile = "medium".to_string();
    let mut rounds: usize = 5;
    let mut width: u32 = 256;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--kernel" => {
                i += 1;
                if i < args.len() { kernel = args[i].clone(); }
            }
            "--profile" => {
                i += 1;
                if i < args.len() { profile = args[i].clone(); }
            }
            "--rounds" => {
                i += 1;
                if i < args.len() { rounds = args[i].parse().unwrap_or(5).max(1); }
            }
            "--width" => {
                i += 1;
                if i < args.len() { width = args[i].parse().unwrap_or(256); }
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other => {
                eprintln!("Unknown flag: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let cfg = kernel_bench::Config {
        profile,
        rounds,
        kernel,
        threadgroup_width: width,
    };
    let results = kernel_bench::run(&cfg);
    harness::print_table(&results);
}
