use std::fmt::Write;

use crate::{Error, KernelKind, KernelSpec, Result};

/// Every kernel the host may request. The trailing digit of a name is the
/// number of elements one invocation consumes; no digit means one.
pub const KERNEL_TABLE: &[(&str, KernelKind, u32)] = &[
    ("map", KernelKind::Map, 1),
    ("map4", KernelKind::Map, 4),
    ("reduce", KernelKind::Reduce, 1),
    ("reduce1", KernelKind::Reduce, 1),
    ("reduce2", KernelKind::Reduce, 2),
    ("reduce4", KernelKind::Reduce, 4),
];

pub fn lookup(name: &str) -> Result<KernelSpec> {
    KERNEL_TABLE
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(n, kind, work_multiplier)| KernelSpec {
            name: n.to_string(),
            kind,
            work_multiplier,
        })
        .ok_or_else(|| Error::KernelNotFound(name.to_string()))
}

/// Kernel picked from the selection list: the first row is the map kernel,
/// row `n` is `reduce{n}`.
pub fn kernel_name_for_row(row: usize) -> String {
    if row > 0 {
        format!("reduce{}", row)
    } else {
        "map".to_string()
    }
}

// Slot 0 is the input, slot 1 the output, for every entry point. The output is
// atomic so reductions can fold workgroup partials; map kernels store into it.
const WGSL_PRELUDE: &str = r#"
@group(0) @binding(0) var<storage, read> input: array<i32>;
@group(0) @binding(1) var<storage, read_write> output: array<atomic<i32>>;

var<workgroup> partial: array<i32, WG>;

fn group_index(wid: vec3<u32>, nwg: vec3<u32>) -> u32 {
    return wid.x + wid.y * nwg.x;
}

fn transform(x: i32) -> i32 {
    return i32(cos(f32(x)));
}

fn map_n(lid: u32, group: u32, m: u32) {
    let n = min(arrayLength(&input), arrayLength(&output));
    let base = group * WG * m + lid;
    for (var k: u32 = 0u; k < m; k = k + 1u) {
        let i = base + k * WG;
        if (i < n) {
            atomicStore(&output[i], transform(input[i]));
        }
    }
}

fn reduce_n(lid: u32, group: u32, m: u32) {
    let n = arrayLength(&input);
    let base = group * WG * m + lid;
    var acc: i32 = 0;
    for (var k: u32 = 0u; k < m; k = k + 1u) {
        let i = base + k * WG;
        if (i < n) {
            acc = acc + input[i];
        }
    }
    partial[lid] = acc;
    workgroupBarrier();

    for (var s: u32 = HALF; s > 0u; s = s >> 1u) {
        if (lid < s && lid + s < WG) {
            partial[lid] = partial[lid] + partial[lid + s];
        }
        workgroupBarrier();
    }

    if (lid == 0u) {
        atomicAdd(&output[0], partial[0]);
    }
}
"#;

fn render_entry_point(out: &mut String, name: &str, kind: KernelKind, multiplier: u32) {
    let body = match kind {
        KernelKind::Map => "map_n",
        KernelKind::Reduce => "reduce_n",
    };
    // Writing to a String cannot fail.
    let _ = write!(
        out,
        r#"
@compute @workgroup_size(WG)
fn {name}(
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>
) {{
    {body}(lid.x, group_index(wid, nwg), {multiplier}u);
}}
"#,
    );
}

/// Compiled-by-name collection of compute kernels. One WGSL module, one entry
/// point per kernel, rendered for a fixed threadgroup width.
#[derive(Debug, Clone)]
pub struct KernelLibrary {
    source: String,
    entry_points: Vec<String>,
    threadgroup_width: u32,
}

impl KernelLibrary {
    /// The library holding every kernel in [`KERNEL_TABLE`].
    pub fn builtin(threadgroup_width: u32) -> Result<Self> {
        if threadgroup_width == 0 {
            return Err(Error::InvalidConfiguration(
                "threadgroup width must be positive".into(),
            ));
        }
        let half = threadgroup_width.next_power_of_two() / 2;
        let mut source = format!(
            "const WG: u32 = {}u;\nconst HALF: u32 = {}u;\n",
            threadgroup_width, half
        );
        source.push_str(WGSL_PRELUDE);
        for &(name, kind, multiplier) in KERNEL_TABLE {
            render_entry_point(&mut source, name, kind, multiplier);
        }

        Ok(Self {
            source,
            entry_points: KERNEL_TABLE.iter().map(|(n, _, _)| n.to_string()).collect(),
            threadgroup_width,
        })
    }

    /// A library from caller-provided WGSL. `entry_points` lists the kernels it
    /// exports; they must follow the slot 0 / slot 1 binding layout.
    pub fn from_wgsl(source: String, entry_points: Vec<String>, threadgroup_width: u32) -> Self {
        Self {
            source,
            entry_points,
            threadgroup_width,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn threadgroup_width(&self) -> u32 {
        self.threadgroup_width
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry_points.iter().any(|e| e == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        let spec = lookup("map").unwrap();
        assert_eq!(spec.kind, KernelKind::Map);
        assert_eq!(spec.work_multiplier, 1);

        let spec = lookup("reduce").unwrap();
        assert_eq!(spec.kind, KernelKind::Reduce);
        assert_eq!(spec.work_multiplier, 1);

        assert_eq!(lookup("reduce2").unwrap().work_multiplier, 2);
        assert_eq!(lookup("reduce4").unwrap().work_multiplier, 4);
        assert_eq!(lookup("map4").unwrap().work_multiplier, 4);
    }

    #[test]
    fn test_lookup_unknown() {
        for name in ["", "mapp", "reduce3", "Reduce", "reduce 4"] {
            match lookup(name) {
                Err(Error::KernelNotFound(n)) => assert_eq!(n, name),
                other => panic!("expected KernelNotFound for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_trailing_digit_matches_multiplier() {
        for &(name, _, m) in KERNEL_TABLE {
            let digit = name
                .chars()
                .last()
                .and_then(|c| c.to_digit(10))
                .unwrap_or(1);
            assert_eq!(digit, m, "{}", name);
        }
    }

    #[test]
    fn test_kernel_name_for_row() {
        assert_eq!(kernel_name_for_row(0), "map");
        assert_eq!(kernel_name_for_row(1), "reduce1");
        assert_eq!(kernel_name_for_row(4), "reduce4");
    }

    #[test]
    fn test_builtin_library_exports_table() {
        let lib = KernelLibrary::builtin(512).unwrap();
        for &(name, _, _) in KERNEL_TABLE {
            assert!(lib.contains(name));
            assert!(lib.source().contains(&format!("fn {}(", name)));
        }
        assert!(!lib.contains("scan"));
        assert!(lib.source().starts_with("const WG: u32 = 512u;\nconst HALF: u32 = 256u;"));
        assert!(lib.source().contains("reduce_n(lid.x, group_index(wid, nwg), 4u);"));
    }

    #[test]
    fn test_builtin_library_odd_width() {
        let lib = KernelLibrary::builtin(48).unwrap();
        assert_eq!(lib.threadgroup_width(), 48);
        assert!(lib.source().contains("const HALF: u32 = 32u;"));

        let lib = KernelLibrary::builtin(1).unwrap();
        assert!(lib.source().contains("const HALF: u32 = 0u;"));

        assert!(matches!(KernelLibrary::builtin(0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_custom_library() {
        let lib = KernelLibrary::from_wgsl(String::new(), vec!["map".into()], 64);
        assert!(lib.contains("map"));
        assert!(!lib.contains("reduce"));
        assert_eq!(lib.threadgroup_width(), 64);
    }
}
