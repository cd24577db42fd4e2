//! WGSL compute shaders for the multigrid transfer kernels.
//!
//! Index arrays are `u32`, vector values are `f32`. Every kernel assigns one
//! invocation per output element (or per coarse row) and writes disjoint
//! memory, so none of them uses atomics or barriers.

/// WGSL source containing all transfer kernels.
///
/// Entry points:
/// - `fill_u32`: buf[i] = value
/// - `f2c_operator`: fine↔coarse injection arrays, one invocation per coarse cell
/// - `prolongation`: fine[perm_fine[f2c[i]]] += coarse[perm_coarse[i]]
pub const SHADER_SOURCE: &str = r#"
// ============================================================
// Multigrid transfer kernels
// ============================================================

// --- Fill (u32) ---
// buf[i] = value for i < n. Launched as a 2D grid of 64-wide workgroups;
// stride is the number of invocations along x.

struct FillParams {
    value: u32,
    n: u32,
    stride: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read_write> fill_buf: array<u32>;
@group(0) @binding(1) var<uniform> fill_params: FillParams;

@compute @workgroup_size(64)
fn fill_u32(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.y * fill_params.stride + gid.x;
    if i >= fill_params.n {
        return;
    }
    fill_buf[i] = fill_params.value;
}

// --- Fine-to-coarse operator ---
// One invocation per coarse cell (x, y, z). The injected fine cell is
// (2x, 2y, 2z); rows are numbered z-major, then y, then x.

struct F2cParams {
    nxc: u32,
    nyc: u32,
    nzc: u32,
    _pad0: u32,
    nxf: u32,
    nyf: u32,
    nzf: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read_write> f2c_out: array<u32>;
@group(0) @binding(1) var<storage, read_write> c2f_out: array<u32>;
@group(0) @binding(2) var<uniform> f2c_params: F2cParams;

@compute @workgroup_size(4, 4, 4)
fn f2c_operator(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ixc = gid.x;
    let iyc = gid.y;
    let izc = gid.z;
    if izc >= f2c_params.nzc || iyc >= f2c_params.nyc || ixc >= f2c_params.nxc {
        return;
    }

    let ixf = ixc << 1u;
    let iyf = iyc << 1u;
    let izf = izc << 1u;

    let coarse_row = izc * f2c_params.nxc * f2c_params.nyc + iyc * f2c_params.nxc + ixc;
    let fine_row = izf * f2c_params.nxf * f2c_params.nyf + iyf * f2c_params.nxf + ixf;

    f2c_out[coarse_row] = fine_row;
    c2f_out[fine_row] = coarse_row;
}

// --- Prolongation ---
// One invocation per coarse row. f2c is injective, so the fine writes of
// distinct invocations never alias.

struct ProlongParams {
    n: u32,
    stride: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read> pr_f2c: array<u32>;
@group(0) @binding(1) var<storage, read> pr_coarse: array<f32>;
@group(0) @binding(2) var<storage, read_write> pr_fine: array<f32>;
@group(0) @binding(3) var<storage, read> pr_perm_fine: array<u32>;
@group(0) @binding(4) var<storage, read> pr_perm_coarse: array<u32>;
@group(0) @binding(5) var<uniform> pr_params: ProlongParams;

@compute @workgroup_size(64)
fn prolongation(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx_coarse = gid.y * pr_params.stride + gid.x;
    if idx_coarse >= pr_params.n {
        return;
    }
    let idx_fine = pr_f2c[idx_coarse];
    let dst = pr_perm_fine[idx_fine];
    pr_fine[dst] = pr_fine[dst] + pr_coarse[pr_perm_coarse[idx_coarse]];
}
"#;
