use gpubench::{
    cpu, lookup, AllocationState, BenchConfig, BenchmarkRunner, BufferStager, DispatchState, Error,
    GpuContext, KernelDispatcher, KernelKind, KernelLibrary, Mode, KERNEL_TABLE,
};

/// Acquire a device, or print SKIP and return None when the machine has none.
fn gpu() -> Option<GpuContext> {
    match GpuContext::from_bits(u32::MAX) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("SKIP: {}", e);
            None
        }
    }
}

fn library(ctx: &GpuContext) -> KernelLibrary {
    KernelLibrary::builtin(ctx.max_threadgroup_width().min(256)).unwrap()
}

#[test]
fn test_integration_stage_round_trip() {
    let Some(ctx) = gpu() else { return };
    let stager = BufferStager::new(&ctx);

    let data: Vec<i32> = (0..10_000).map(|i| i * 7 - 35_000).collect();
    let allocation = stager.stage_in(&data).unwrap();
    assert_eq!(allocation.len(), data.len());
    assert_eq!(allocation.byte_len(), data.len() as u64 * 4);
    assert_eq!(allocation.state(), AllocationState::Staged);
    assert_eq!(stager.stage_out(&allocation, data.len()).unwrap(), data);
    assert_eq!(stager.stage_out(&allocation, 3).unwrap(), &data[..3]);
    stager.release(allocation);

    let empty = stager.stage_in(&[]).unwrap();
    assert!(empty.is_empty());
    assert!(stager.stage_out(&empty, 0).unwrap().is_empty());
    stager.release(empty);
}

#[test]
fn test_integration_stage_out_past_bound() {
    let Some(ctx) = gpu() else { return };
    let stager = BufferStager::new(&ctx);
    let allocation = stager.stage_in(&[1, 2, 3]).unwrap();
    assert!(matches!(stager.stage_out(&allocation, 4), Err(Error::ReadFailure(_))));
}

#[test]
fn test_integration_stage_zeroed() {
    let Some(ctx) = gpu() else { return };
    let stager = BufferStager::new(&ctx);
    let allocation = stager.stage_zeroed(512).unwrap();
    assert_eq!(stager.stage_out(&allocation, 512).unwrap(), vec![0; 512]);
}

#[test]
fn test_integration_reduce_ones_matches_cpu() {
    let Some(ctx) = gpu() else { return };
    let lib = library(&ctx);
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    for &n in &[0usize, 1, 1000, 1_000_000] {
        let input = vec![1i32; n];
        let (expected, _) = cpu::run(KernelKind::Reduce, &input);
        assert_eq!(expected, vec![n as i32]);

        for name in ["reduce", "reduce1", "reduce2", "reduce4"] {
            let spec = lookup(name).unwrap();
            let out = dispatcher.dispatch(&spec, &input, 1).unwrap();
            assert_eq!(out.output, expected, "{} over {} ones", name, n);
            assert!(out.elapsed_ms >= 0.0);
            assert_eq!(dispatcher.state(), DispatchState::Completed);
        }
    }
}

#[test]
fn test_integration_reduce_wraps_like_cpu() {
    let Some(ctx) = gpu() else { return };
    let lib = library(&ctx);
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    let input = vec![i32::MAX / 2; 5];
    let (expected, _) = cpu::run(KernelKind::Reduce, &input);
    let out = dispatcher.dispatch(&lookup("reduce").unwrap(), &input, 1).unwrap();
    assert_eq!(out.output, expected);
}

#[test]
fn test_integration_map_matches_reference() {
    let Some(ctx) = gpu() else { return };
    let lib = library(&ctx);
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    // Small arguments keep cos well away from the truncation boundaries.
    let input: Vec<i32> = (0..5000).map(|i| (i % 7) - 3).collect();
    let (expected, _) = cpu::run(KernelKind::Map, &input);

    for name in ["map", "map4"] {
        let spec = lookup(name).unwrap();
        let out = dispatcher.dispatch(&spec, &input, input.len()).unwrap();
        assert_eq!(out.output.len(), input.len());
        assert_eq!(out.output, expected, "{}", name);
    }
}

#[test]
fn test_integration_grid_folds_into_two_dimensions() {
    let Some(ctx) = gpu() else { return };
    // Width 1 forces one threadgroup per element, past the per-dimension limit.
    let lib = KernelLibrary::builtin(1).unwrap();
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    let n = ctx.max_threadgroups_per_dimension() as usize * 2 + 17;
    let input = vec![1i32; n];
    let out = dispatcher.dispatch(&lookup("reduce").unwrap(), &input, 1).unwrap();
    assert_eq!(out.output, vec![n as i32]);
}

#[test]
fn test_integration_dispatch_cache_carries_over() {
    let Some(ctx) = gpu() else { return };
    let lib = library(&ctx);

    let mut first = KernelDispatcher::new(&ctx, &lib);
    first.dispatch(&lookup("reduce2").unwrap(), &[1; 100], 1).unwrap();
    let cache = first.into_cache();
    assert!(cache.is_cached("reduce2"));
    assert!(!cache.is_cached("map"));

    let mut second = KernelDispatcher::with_cache(&ctx, &lib, cache);
    let out = second.dispatch(&lookup("reduce2").unwrap(), &[1; 300], 1).unwrap();
    assert_eq!(out.output, vec![300]);
    second.dispatch(&lookup("map").unwrap(), &[0; 4], 4).unwrap();
    assert!(second.into_cache().is_cached("map"));
}

#[test]
fn test_integration_kernel_not_found() {
    let Some(ctx) = gpu() else { return };
    let builtin = library(&ctx);
    let lib = KernelLibrary::from_wgsl(
        builtin.source().to_string(),
        vec!["map".to_string()],
        builtin.threadgroup_width(),
    );
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    match dispatcher.dispatch(&lookup("reduce4").unwrap(), &[1, 2, 3], 1) {
        Err(Error::KernelNotFound(name)) => assert_eq!(name, "reduce4"),
        other => panic!("expected KernelNotFound, got {:?}", other),
    }
    assert_eq!(dispatcher.state(), DispatchState::Failed);

    // The dispatcher is still usable afterwards.
    let out = dispatcher.dispatch(&lookup("map").unwrap(), &[0], 1).unwrap();
    assert_eq!(out.output, vec![1]);
}

#[test]
fn test_integration_pipeline_build_error() {
    let Some(ctx) = gpu() else { return };
    let lib = KernelLibrary::from_wgsl("fn map( {".to_string(), vec!["map".to_string()], 64);
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    match dispatcher.dispatch(&lookup("map").unwrap(), &[1], 1) {
        Err(Error::PipelineBuildError { kernel, .. }) => assert_eq!(kernel, "map"),
        other => panic!("expected PipelineBuildError, got {:?}", other),
    }
    assert_eq!(dispatcher.state(), DispatchState::Failed);
}

#[test]
fn test_integration_allocation_ceiling_checked_before_submit() {
    let Some(ctx) = gpu() else { return };
    let lib = library(&ctx);
    let mut dispatcher = KernelDispatcher::new(&ctx, &lib);

    let limit = ctx.max_allocation_bytes();
    let too_many = (limit / 4 + 1) as usize;
    match dispatcher.dispatch(&lookup("map").unwrap(), &[1, 2], too_many) {
        Err(Error::AllocationFailure {
            requested_bytes,
            limit_bytes,
            ..
        }) => {
            assert_eq!(requested_bytes, too_many as u64 * 4);
            assert_eq!(limit_bytes, Some(limit));
        }
        other => panic!("expected AllocationFailure, got {:?}", other),
    }
    // Failed before buffers were bound.
    assert_eq!(dispatcher.state(), DispatchState::Failed);
}

#[test]
fn test_integration_runner_compare_every_kernel() {
    let Some(ctx) = gpu() else { return };
    let config = BenchConfig {
        problem_size: 10_000,
        threadgroup_width: ctx.max_threadgroup_width().min(256),
        ..Default::default()
    };
    let mut runner = BenchmarkRunner::with_context(config, ctx).unwrap();

    for &(name, kind, _) in KERNEL_TABLE {
        let cmp = runner.compare(name).unwrap();
        assert!(cmp.matches(), "{}: gpu {:?} cpu {:?}", name, cmp.gpu.value(), cmp.cpu.value());
        let expected_len = match kind {
            KernelKind::Map => 10_000,
            KernelKind::Reduce => 1,
        };
        assert_eq!(cmp.gpu.output.len(), expected_len);
        assert_eq!(cmp.gpu.mode, Mode::Gpu);
        assert_eq!(cmp.cpu.mode, Mode::Cpu);
    }
    assert!(runner.adapter_name().is_some());
}

#[test]
fn test_integration_runner_rejects_oversized_width() {
    let Some(ctx) = gpu() else { return };
    let config = BenchConfig {
        problem_size: 16,
        threadgroup_width: ctx.max_threadgroup_width() + 1,
        ..Default::default()
    };
    assert!(matches!(
        BenchmarkRunner::with_context(config, ctx),
        Err(Error::InvalidConfiguration(_))
    ));
}
