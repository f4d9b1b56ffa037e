use pv_budget_core::mesh::Geometry;
use pv_budget_core::{
    Mesh, MeshArrays, PeriodicHexMesh, PvConfig, PvDiagnostics, StepTendencies, Vec3,
};
use std::ptr;
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

use crate::error::{DefaultPvbError, PvbErrorCode};
use crate::helpers::{slice_from_ptr, str_from_ptr, track_error, track_result};

/// The PV diagnostics context.
/// Holds the mesh-bound diagnostics, the live model state and the driving
/// tendencies staged for the current step.
///
/// # Thread Safety
/// `PvbInstance` can be shared across threads. The diagnostics are protected
/// by an `RwLock`, allowing:
/// - **Multiple concurrent readers** (output queries, restart export): `.read()` lock
/// - **Exclusive writer** (state updates, `pvb_end_step`): `.write()` lock
///
/// Staged tendencies sit behind their own `Mutex`, so physics threads can
/// hand over their tendencies while another thread reads last step's outputs.
///
/// # Usage from a Model Driver
/// ```c
/// PvbInstance* pv = NULL;
/// double z[4] = {500.0, 1500.0, 2500.0, 3500.0};
/// if (pvb_new_periodic_hex(16, 16, 25000.0, z, 4, 1.0e-4, 0.0, NULL, &pv) != Ok) {
///     fprintf(stderr, "%s\n", pvb_get_last_error());
///     return;
/// }
///
/// for (int n = 0; n < n_steps; n++) {
///     pvb_begin_step(pv);
///     advance_model(state, dt);
///     pvb_set_state_field(pv, Theta, state->theta, n_cells * n_levels);
///     /* ... wind, density, pressure, tendencies ... */
///     pvb_end_step(pv, dt);
/// }
///
/// pvb_destroy(pv);
/// ```
pub struct PvbInstance {
    pub(crate) diagnostics: RwLock<PvDiagnostics>,
    /// Driving tendencies of the step in progress.
    /// Cleared by every `pvb_end_step`, successful or not.
    pub(crate) tendencies: Mutex<StepTendencies>,
}

impl PvbInstance {
    /// Creates a new instance on `mesh` with an optional JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `PvbErrorCode::InvalidConfig` if the configuration cannot be parsed or is inconsistent.
    /// Returns `PvbErrorCode::InvalidMesh` if the reconstruction operators cannot be built.
    pub(crate) fn new(mesh: Mesh, config_json: Option<&str>) -> Result<Box<Self>, DefaultPvbError> {
        let config = match config_json {
            Some(json) => PvConfig::from_json(json)?,
            None => PvConfig::default(),
        };
        let diagnostics = PvDiagnostics::new(config.validate()?, Arc::new(mesh))?;
        Ok(Box::new(Self {
            diagnostics: RwLock::new(diagnostics),
            tendencies: Mutex::new(StepTendencies::default()),
        }))
    }
}

/// Flat description of an arbitrary Voronoi mesh.
///
/// Positions and normals are packed as `x, y, z` triples. Every index is
/// 0-based. Per-level arrays are column-contiguous (`cell * n_levels + level`).
///
/// A `sphere_radius` of zero describes a planar mesh.
#[repr(C)]
pub struct PvbMeshDesc {
    /// Number of Voronoi cells.
    pub n_cells: usize,
    /// Number of edges.
    pub n_edges: usize,
    /// Number of vertices (dual triangles).
    pub n_vertices: usize,
    /// Number of vertical levels.
    pub n_levels: usize,
    /// Row stride of `edges_on_cell`.
    pub max_edges: usize,
    /// Sphere radius (m), or 0 for a plane.
    pub sphere_radius: f64,
    /// `3 * n_cells` cell centre coordinates (m).
    pub cell_positions: *const f64,
    /// `3 * n_edges` edge midpoint coordinates (m).
    pub edge_positions: *const f64,
    /// `3 * n_edges` unit normals, pointing from the first to the second cell.
    pub edge_normals: *const f64,
    /// `2 * n_edges` cells sharing each edge.
    pub cells_on_edge: *const u32,
    /// `n_cells` edge counts.
    pub n_edges_on_cell: *const u32,
    /// `n_cells * max_edges` edges of each cell.
    pub edges_on_cell: *const u32,
    /// `3 * n_vertices` edges of each dual triangle.
    pub edges_on_vertex: *const u32,
    /// `3 * n_vertices` circulation signs (+1 / -1).
    pub edge_signs_on_vertex: *const f64,
    /// `3 * n_vertices` cells at the triangle corners.
    pub cells_on_vertex: *const u32,
    /// `3 * n_vertices` kite areas (m²).
    pub kite_areas_on_vertex: *const f64,
    /// `n_edges` cell centre distances (m).
    pub dc_edge: *const f64,
    /// `n_cells` cell areas (m²).
    pub area_cell: *const f64,
    /// `n_vertices` triangle areas (m²).
    pub area_triangle: *const f64,
    /// `n_cells` Coriolis parameters (s⁻¹).
    pub f_cell: *const f64,
    /// `n_cells * n_levels` level mid-point heights (m).
    pub z_mid: *const f64,
}

/// # Safety
/// `data` must be null or valid for reads of `len` values.
unsafe fn u32_slice<'a>(data: *const u32, len: usize, name: &str) -> Result<&'a [u32], DefaultPvbError> {
    if data.is_null() {
        return Err(DefaultPvbError::null_pointer(name));
    }
    // SAFETY: non-null and valid for `len` reads per the caller's contract.
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

fn vec3s(data: &[f64]) -> Vec<Vec3> {
    data.chunks_exact(3)
        .map(|p| Vec3::new(p[0], p[1], p[2]))
        .collect()
}

fn triples<T: Copy>(data: &[T]) -> Vec<[T; 3]> {
    data.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect()
}

fn indices(data: &[u32]) -> Vec<usize> {
    data.iter().map(|&i| i as usize).collect()
}

impl PvbMeshDesc {
    /// Copy the described arrays into owned `MeshArrays`.
    ///
    /// # Safety
    /// Every pointer must be valid for the number of reads its field documents.
    unsafe fn to_arrays(&self) -> Result<MeshArrays, DefaultPvbError> {
        let (nc, ne, nv) = (self.n_cells, self.n_edges, self.n_vertices);
        // SAFETY: lengths as documented on each field; the caller upholds them.
        let (cell_positions, edge_positions, edge_normals) = unsafe {
            (
                slice_from_ptr(self.cell_positions, 3 * nc, "cell_positions")?,
                slice_from_ptr(self.edge_positions, 3 * ne, "edge_positions")?,
                slice_from_ptr(self.edge_normals, 3 * ne, "edge_normals")?,
            )
        };
        // SAFETY: as above.
        let (signs, kites, dc_edge, area_cell, area_triangle, f_cell, z_mid) = unsafe {
            (
                slice_from_ptr(self.edge_signs_on_vertex, 3 * nv, "edge_signs_on_vertex")?,
                slice_from_ptr(self.kite_areas_on_vertex, 3 * nv, "kite_areas_on_vertex")?,
                slice_from_ptr(self.dc_edge, ne, "dc_edge")?,
                slice_from_ptr(self.area_cell, nc, "area_cell")?,
                slice_from_ptr(self.area_triangle, nv, "area_triangle")?,
                slice_from_ptr(self.f_cell, nc, "f_cell")?,
                slice_from_ptr(self.z_mid, nc * self.n_levels, "z_mid")?,
            )
        };

        // SAFETY: as above.
        let (cells_on_edge, counts, rows, edges_on_vertex, cells_on_vertex) = unsafe {
            (
                u32_slice(self.cells_on_edge, 2 * ne, "cells_on_edge")?,
                u32_slice(self.n_edges_on_cell, nc, "n_edges_on_cell")?,
                u32_slice(self.edges_on_cell, nc * self.max_edges, "edges_on_cell")?,
                u32_slice(self.edges_on_vertex, 3 * nv, "edges_on_vertex")?,
                u32_slice(self.cells_on_vertex, 3 * nv, "cells_on_vertex")?,
            )
        };

        let cells_on_edge = indices(cells_on_edge)
            .chunks_exact(2)
            .map(|c| [c[0], c[1]])
            .collect();
        let mut edges_on_cell = Vec::with_capacity(nc);
        for (cell, &count) in counts.iter().enumerate() {
            let count = count as usize;
            if count > self.max_edges {
                return Err(DefaultPvbError::invalid_parameter(format!(
                    "cell {cell} lists {count} edges, more than max_edges = {}",
                    self.max_edges
                )));
            }
            let start = cell * self.max_edges;
            edges_on_cell.push(indices(&rows[start..start + count]));
        }

        let geometry = if self.sphere_radius > 0.0 {
            Geometry::Spherical {
                radius: self.sphere_radius,
            }
        } else {
            Geometry::Planar
        };

        Ok(MeshArrays {
            geometry,
            n_levels: self.n_levels,
            cell_positions: vec3s(cell_positions),
            edge_positions: vec3s(edge_positions),
            edge_normals: vec3s(edge_normals),
            cells_on_edge,
            edges_on_cell,
            edges_on_vertex: triples(&indices(edges_on_vertex)),
            edge_signs_on_vertex: triples(signs),
            cells_on_vertex: triples(&indices(cells_on_vertex)),
            kite_areas_on_vertex: triples(kites),
            dc_edge: dc_edge.to_vec(),
            area_cell: area_cell.to_vec(),
            area_triangle: area_triangle.to_vec(),
            f_cell: f_cell.to_vec(),
            z_mid: z_mid.to_vec(),
        })
    }
}

/// Hand a freshly built instance to the caller, or null it on error.
///
/// # Safety
/// `out_instance` must be non-null and valid for writes.
unsafe fn publish(
    result: Result<Box<PvbInstance>, DefaultPvbError>,
    out_instance: *mut *mut PvbInstance,
) -> PvbErrorCode {
    match track_result(result) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            PvbErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                // Set to null on error (per documentation contract)
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Creates PV diagnostics on a doubly periodic hexagonal mesh.
///
/// `nx` x `ny` cells with centre spacing `dc` (m), `n_levels` level heights
/// in `z_levels` (m, bottom first) and a beta-plane Coriolis parameter
/// `f = f0 + beta * y`.
///
/// `config_json` is an optional null-terminated JSON object with any of the
/// fields `pv_diag`, `pv_tend`, `pv_scalar`, `pv_microphys`, `pv_isobaric`,
/// `microphysics_scheme`, `dt_threshold`, `isobaric_levels` and
/// `accumulation_reset_interval`. Null selects the defaults (PV and the
/// dynamic tropopause only).
///
/// Returns
/// - `PvbErrorCode::Ok` on success, with the instance in `*out_instance`
/// - `PvbErrorCode::NullPointer` if `out_instance` or `z_levels` is null
/// - `PvbErrorCode::InvalidMesh` if the mesh parameters are rejected
/// - `PvbErrorCode::InvalidConfig` if the configuration is rejected
///
/// On error `*out_instance` is set to null.
///
/// # Safety
/// - `out_instance` must be a valid, non-null pointer that this function writes to.
/// - `z_levels` must point to `n_levels` readable `f64` values.
/// - `config_json` must be null or a valid null-terminated string.
#[no_mangle]
#[expect(clippy::too_many_arguments)]
pub unsafe extern "C" fn pvb_new_periodic_hex(
    nx: usize,
    ny: usize,
    dc: f64,
    z_levels: *const f64,
    n_levels: usize,
    f0: f64,
    beta: f64,
    config_json: *const std::os::raw::c_char,
    out_instance: *mut *mut PvbInstance,
) -> PvbErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_instance"));
    }

    // SAFETY: `z_levels` holds `n_levels` values per the contract above.
    let z = unsafe { slice_from_ptr(z_levels, n_levels, "z_levels") };
    // SAFETY: null or null-terminated per the contract above.
    let config = unsafe { str_from_ptr(config_json, "config_json") };
    let result = z.and_then(|z| {
        let mesh = PeriodicHexMesh::new(nx, ny, dc)
            .with_levels(z.to_vec())
            .with_coriolis(f0, beta)
            .build()?;
        info!("Periodic hex mesh {}x{} built, {} levels", nx, ny, n_levels);
        PvbInstance::new(mesh, config?)
    });

    // SAFETY: checked non-null above.
    unsafe { publish(result, out_instance) }
}

/// Creates PV diagnostics on a host-supplied Voronoi mesh.
///
/// The arrays behind `desc` are copied; the caller may free them once this
/// returns. See [`pvb_new_periodic_hex`] for `config_json`.
///
/// Returns
/// - `PvbErrorCode::Ok` on success, with the instance in `*out_instance`
/// - `PvbErrorCode::NullPointer` if `out_instance`, `desc` or any array is null
/// - `PvbErrorCode::InvalidMesh` if the arrays are inconsistent
/// - `PvbErrorCode::InvalidConfig` if the configuration is rejected
///
/// # Safety
/// - `out_instance` must be a valid, non-null pointer that this function writes to.
/// - `desc` must be null or point to a `PvbMeshDesc` whose arrays have the documented lengths.
/// - `config_json` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pvb_new_from_mesh(
    desc: *const PvbMeshDesc,
    config_json: *const std::os::raw::c_char,
    out_instance: *mut *mut PvbInstance,
) -> PvbErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultPvbError::null_pointer("out_instance"));
    }

    // SAFETY: null or a valid descriptor per the contract above.
    let desc = unsafe { desc.as_ref() }.ok_or_else(|| DefaultPvbError::null_pointer("desc"));
    // SAFETY: array lengths are the caller's responsibility.
    let arrays = desc.and_then(|desc| unsafe { desc.to_arrays() });
    // SAFETY: null or null-terminated per the contract above.
    let config = unsafe { str_from_ptr(config_json, "config_json") };
    let result = arrays.and_then(|arrays| {
        let mesh = Mesh::new(arrays)?;
        info!(
            "Host mesh accepted: {} cells, {} edges, {} vertices",
            mesh.n_cells(),
            mesh.n_edges(),
            mesh.n_vertices()
        );
        PvbInstance::new(mesh, config?)
    });

    // SAFETY: checked non-null above.
    unsafe { publish(result, out_instance) }
}

/// Destroys an instance previously created by `pvb_new_periodic_hex` or `pvb_new_from_mesh`.
///
/// Behavior:
/// - If `ptr` is null, this function is a no-op.
/// - Otherwise the instance and everything it owns (mesh, accumulators,
///   staged tendencies) is freed.
///
/// # Safety
/// - The pointer MUST have been created by one of the `pvb_new_*` functions.
/// - The pointer MUST NOT have been freed already.
/// - After calling this function, the caller must not use the pointer again (double-free or use-after-free).
#[no_mangle]
pub unsafe extern "C" fn pvb_destroy(ptr: *mut PvbInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: The pointer was created by `Box::into_raw` in `publish` and not
    // freed elsewhere. Rebuilding the Box drops the instance.
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::CString;

    pub(crate) fn new_hex(config: Option<&str>) -> *mut PvbInstance {
        let z: Vec<f64> = (0..6).map(|k| 500.0 + 1000.0 * f64::from(k)).collect();
        let json = config.map(|c| CString::new(c).unwrap());
        let mut out = ptr::null_mut();
        let code = unsafe {
            pvb_new_periodic_hex(
                6,
                6,
                20_000.0,
                z.as_ptr(),
                z.len(),
                1.0e-4,
                0.0,
                json.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                &mut out,
            )
        };
        assert_eq!(code, PvbErrorCode::Ok);
        out
    }

    #[test]
    fn test_create_and_destroy() {
        let pv = new_hex(Some(r#"{"pv_tend": true}"#));
        assert!(!pv.is_null());
        unsafe { pvb_destroy(pv) };
        unsafe { pvb_destroy(ptr::null_mut()) };
    }

    #[test]
    fn test_invalid_mesh_nulls_output() {
        let z = [500.0];
        let mut out = ptr::NonNull::<PvbInstance>::dangling().as_ptr();
        let code = unsafe {
            pvb_new_periodic_hex(2, 5, 1000.0, z.as_ptr(), 1, 0.0, 0.0, ptr::null(), &mut out)
        };
        assert_eq!(code, PvbErrorCode::InvalidMesh);
        assert!(out.is_null());
        assert_eq!(crate::error::pvb_get_last_error_code(), PvbErrorCode::InvalidMesh);
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let z = [500.0, 1500.0];
        let json = CString::new(r#"{"pv_diag": false, "pv_tend": true}"#).unwrap();
        let mut out = ptr::null_mut();
        let code = unsafe {
            pvb_new_periodic_hex(4, 4, 1000.0, z.as_ptr(), 2, 0.0, 0.0, json.as_ptr(), &mut out)
        };
        assert_eq!(code, PvbErrorCode::InvalidConfig);
        assert!(out.is_null());
    }

    #[test]
    fn test_mesh_descriptor_round_trips_hex_arrays() {
        let arrays = PeriodicHexMesh::new(4, 4, 1000.0)
            .with_levels(vec![100.0, 300.0])
            .arrays()
            .unwrap();
        let flat3 = |v: &[Vec3]| v.iter().flat_map(|p| [p.x, p.y, p.z]).collect::<Vec<f64>>();
        let idx = |v: &[usize]| v.iter().map(|&i| u32::try_from(i).unwrap()).collect::<Vec<u32>>();
        let max_edges = arrays.edges_on_cell.iter().map(Vec::len).max().unwrap();

        let cell_positions = flat3(&arrays.cell_positions);
        let edge_positions = flat3(&arrays.edge_positions);
        let edge_normals = flat3(&arrays.edge_normals);
        let cells_on_edge = idx(&arrays.cells_on_edge.concat());
        let n_edges_on_cell = idx(&arrays.edges_on_cell.iter().map(Vec::len).collect::<Vec<_>>());
        let mut edges_on_cell = vec![0_u32; arrays.cell_positions.len() * max_edges];
        for (c, row) in arrays.edges_on_cell.iter().enumerate() {
            for (i, &e) in row.iter().enumerate() {
                edges_on_cell[c * max_edges + i] = u32::try_from(e).unwrap();
            }
        }
        let edges_on_vertex = idx(&arrays.edges_on_vertex.concat());
        let signs = arrays.edge_signs_on_vertex.concat();
        let cells_on_vertex = idx(&arrays.cells_on_vertex.concat());
        let kites = arrays.kite_areas_on_vertex.concat();

        let desc = PvbMeshDesc {
            n_cells: arrays.cell_positions.len(),
            n_edges: arrays.edge_positions.len(),
            n_vertices: arrays.area_triangle.len(),
            n_levels: arrays.n_levels,
            max_edges,
            sphere_radius: 0.0,
            cell_positions: cell_positions.as_ptr(),
            edge_positions: edge_positions.as_ptr(),
            edge_normals: edge_normals.as_ptr(),
            cells_on_edge: cells_on_edge.as_ptr(),
            n_edges_on_cell: n_edges_on_cell.as_ptr(),
            edges_on_cell: edges_on_cell.as_ptr(),
            edges_on_vertex: edges_on_vertex.as_ptr(),
            edge_signs_on_vertex: signs.as_ptr(),
            cells_on_vertex: cells_on_vertex.as_ptr(),
            kite_areas_on_vertex: kites.as_ptr(),
            dc_edge: arrays.dc_edge.as_ptr(),
            area_cell: arrays.area_cell.as_ptr(),
            area_triangle: arrays.area_triangle.as_ptr(),
            f_cell: arrays.f_cell.as_ptr(),
            z_mid: arrays.z_mid.as_ptr(),
        };
        let copied = unsafe { desc.to_arrays() }.unwrap();
        assert_eq!(copied.edges_on_cell, arrays.edges_on_cell);
        assert_eq!(copied.cells_on_vertex, arrays.cells_on_vertex);
        assert_eq!(copied.edge_normals, arrays.edge_normals);

        let mut out = ptr::null_mut();
        let code = unsafe { pvb_new_from_mesh(&desc, ptr::null(), &mut out) };
        assert_eq!(code, PvbErrorCode::Ok);
        unsafe { pvb_destroy(out) };
    }
}
