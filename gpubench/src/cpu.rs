use quanta::Clock;
use tracing::debug;

use crate::KernelKind;

/// The elementwise transform applied by map kernels. The float-to-int cast
/// truncates toward zero and saturates, matching WGSL `i32(f32)`.
pub fn transform(x: i32) -> i32 {
    (x as f32).cos() as i32
}

/// Sequential map/reduce on the calling thread. Returns the output and the
/// time spent computing it; building the input is not timed.
pub fn run(kind: KernelKind, input: &[i32]) -> (Vec<i32>, f64) {
    let clock = Clock::new();
    let start = clock.now();

    let output = match kind {
        KernelKind::Map => input.iter().map(|&x| transform(x)).collect(),
        KernelKind::Reduce => {
            let mut sum = 0i32;
            for &x in input {
                sum = sum.wrapping_add(x);
            }
            vec![sum]
        }
    };

    let elapsed_ms = clock.now().duration_since(start).as_secs_f64() * 1000.0;
    debug!(?kind, n = input.len(), elapsed_ms, "cpu reference done");
    (output, elapsed_ms)
}
