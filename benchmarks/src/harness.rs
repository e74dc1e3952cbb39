pub struct BenchResult {
    pub name: String,
    pub cpu_ms: Option<f64>,
    pub gpu_ms: Option<f64>,
    pub verified: Option<bool>,
}

/// Run a measurement `iterations` times and return the median of the runs
/// that succeeded, or None if none did.
pub fn median_of(iterations: usize, mut f: impl FnMut() -> Option<f64>) -> Option<f64> {
    let mut times: Vec<f64> = (0..iterations).filter_map(|_| f()).collect();
    if times.is_empty() {
        return None;
    }
    times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(times[times.len() / 2])
}

pub fn format_count(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("{}K", n / 1_000)
    } else {
        format!("{}", n)
    }
}

/// Print a CPU vs GPU table with speedup and check columns.
pub fn print_table(results: &[BenchResult]) {
    let name_w = 20;
    let col_w = 12;

    println!();
    println!(
        "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
        "Benchmark", "CPU", "GPU", "Speedup", "Check",
        name_w = name_w, col_w = col_w
    );
    println!("{}", "-".repeat(name_w + col_w * 3 + 6 + 4));

    for r in results {
        let cpu_str = match r.cpu_ms {
            Some(ms) => format!("{:.2} ms", ms),
            None => "error".to_string(),
        };
        let gpu_str = match r.gpu_ms {
            Some(ms) => format!("{:.2} ms", ms),
            None => "error".to_string(),
        };
        let speedup_str = match (r.cpu_ms, r.gpu_ms) {
            (Some(cpu), Some(gpu)) if gpu > 0.0 => format!("{:.2}x", cpu / gpu),
            _ => "N/A".to_string(),
        };
        let check_str = match r.verified {
            Some(true) => "\u{2713}",
            Some(false) => "\u{2717}",
            None => "\u{2014}",
        };

        println!(
            "{:<name_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>6}",
            r.name, cpu_str, gpu_str, speedup_str, check_str,
            name_w = name_w, col_w = col_w
        );
    }
    println!();
}
