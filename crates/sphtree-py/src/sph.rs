use ndarray::{Array2, ArrayView1, ArrayView2};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::ThreadPoolBuilder;

use sphtree::direct;
use sphtree::{
    GravityConfig, GravityEvaluator, KernelKind, Particle, SmoothingLengthConfig,
    SmoothingLengthSolver, SpatialTree, TreeConfig, Vector,
};

type Vec3 = Vector<3>;

fn to_py(e: sphtree::Error) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Run `f` on a dedicated rayon pool of `threads` workers when
/// `threads > 0`, otherwise on the global pool.
fn with_thread_pool<F, R>(threads: usize, f: F) -> PyResult<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    if threads == 0 {
        return Ok(f());
    }
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| PyValueError::new_err(format!("failed to build rayon thread pool: {e}")))?;
    Ok(pool.install(f))
}

/// Copy `(N,3)` positions, `(N,)` masses and optional `(N,)` smoothing
/// lengths into particles.
fn particles(
    positions: ArrayView2<'_, f64>,
    masses: ArrayView1<'_, f64>,
    sml: Option<ArrayView1<'_, f64>>,
) -> PyResult<Vec<Particle<3>>> {
    if positions.shape()[1] != 3 {
        return Err(PyValueError::new_err("positions must be (N,3) float64 array"));
    }
    let n = positions.shape()[0];
    if masses.len() != n {
        return Err(PyValueError::new_err("masses must be length N"));
    }
    if sml.as_ref().is_some_and(|h| h.len() != n) {
        return Err(PyValueError::new_err("sml must be length N"));
    }
    Ok((0..n)
        .map(|i| {
            let pos = Vec3::new(positions[[i, 0]], positions[[i, 1]], positions[[i, 2]]);
            let p = Particle::new(pos, masses[i]).with_id(i);
            match &sml {
                Some(h) => p.with_sml(h[i]),
                None => p,
            }
        })
        .collect())
}

fn build_tree(
    ps: &[Particle<3>],
    max_level: usize,
    leaf_particle_num: usize,
) -> sphtree::Result<SpatialTree<3>> {
    let config = TreeConfig {
        max_level,
        leaf_particle_num,
    };
    config.validate()?;
    let mut tree = SpatialTree::new(config);
    tree.build(ps, ps.len())?;
    Ok(tree)
}

fn vectors_to_array(v: impl ExactSizeIterator<Item = Vec3>) -> PyResult<Array2<f64>> {
    let n = v.len();
    let flat: Vec<f64> = v.flat_map(|a| [a[0], a[1], a[2]]).collect();
    Array2::from_shape_vec((n, 3), flat).map_err(|e| PyValueError::new_err(e.to_string()))
}

type Arr1<'py> = Bound<'py, PyArray1<f64>>;
type Arr2<'py> = Bound<'py, PyArray2<f64>>;

/// Smoothing lengths converged to `neighbor_number` neighbours.
///
/// Returns `(sml, dens, gradh, neighbor)`. Particles without a starting
/// `sml` get one from the mean number density of the particle cloud.
/// `kernel` is `"cubic_spline"` (default) or `"wendland_c4"`.
#[pyfunction]
#[pyo3(signature = (positions, masses, neighbor_number, sml=None, kernel=None, max_level=20, leaf_particle_num=1, threads=0))]
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn smoothing_lengths<'py>(
    py: Python<'py>,
    positions: PyReadonlyArray2<'py, f64>,
    masses: PyReadonlyArray1<'py, f64>,
    neighbor_number: usize,
    sml: Option<PyReadonlyArray1<'py, f64>>,
    kernel: Option<String>,
    max_level: usize,
    leaf_particle_num: usize,
    threads: usize,
) -> PyResult<(Arr1<'py>, Arr1<'py>, Arr1<'py>, Bound<'py, PyArray1<u64>>)> {
    let kind = match kernel {
        Some(name) => name.parse::<KernelKind>().map_err(to_py)?,
        None => KernelKind::default(),
    };
    let solver =
        SmoothingLengthSolver::<3>::new(kind, neighbor_number, SmoothingLengthConfig::default())
            .map_err(to_py)?;
    let mut ps = particles(
        positions.as_array(),
        masses.as_array(),
        sml.as_ref().map(|h| h.as_array()),
    )?;

    py.allow_threads(|| {
        with_thread_pool(threads, || -> sphtree::Result<()> {
            let tree = build_tree(&ps, max_level, leaf_particle_num)?;
            solver.initialize_smoothing_lengths(&tree, &mut ps)?;
            solver.solve_all(&tree, &mut ps)?;
            Ok(())
        })
    })?
    .map_err(to_py)?;

    let h: Vec<f64> = ps.iter().map(|p| p.sml).collect();
    let dens: Vec<f64> = ps.iter().map(|p| p.dens).collect();
    let gradh: Vec<f64> = ps.iter().map(|p| p.gradh).collect();
    let neighbor: Vec<u64> = ps.iter().map(|p| p.neighbor as u64).collect();
    Ok((
        h.into_pyarray_bound(py),
        dens.into_pyarray_bound(py),
        gradh.into_pyarray_bound(py),
        neighbor.into_pyarray_bound(py),
    ))
}

/// Barnes–Hut accelerations and potentials, softened by `sml`.
///
/// Returns `(acc, phi)` with shapes `(N,3)` and `(N,)`.
#[pyfunction]
#[pyo3(signature = (positions, masses, sml=None, theta=0.5, g=1.0, h_min=0.0, max_level=20, leaf_particle_num=1, threads=0))]
#[allow(clippy::too_many_arguments)]
pub fn tree_gravity<'py>(
    py: Python<'py>,
    positions: PyReadonlyArray2<'py, f64>,
    masses: PyReadonlyArray1<'py, f64>,
    sml: Option<PyReadonlyArray1<'py, f64>>,
    theta: f64,
    g: f64,
    h_min: f64,
    max_level: usize,
    leaf_particle_num: usize,
    threads: usize,
) -> PyResult<(Arr2<'py>, Arr1<'py>)> {
    let eval = GravityEvaluator::new(&GravityConfig {
        constant: g,
        theta,
        h_min,
    })
    .map_err(to_py)?;
    let mut ps = particles(
        positions.as_array(),
        masses.as_array(),
        sml.as_ref().map(|h| h.as_array()),
    )?;

    py.allow_threads(|| {
        with_thread_pool(threads, || -> sphtree::Result<()> {
            let tree = build_tree(&ps, max_level, leaf_particle_num)?;
            eval.calc_force_all(&tree, &mut ps)?;
            Ok(())
        })
    })?
    .map_err(to_py)?;

    let acc = vectors_to_array(ps.iter().map(|p| p.acc))?;
    let phi: Vec<f64> = ps.iter().map(|p| p.phi).collect();
    Ok((acc.into_pyarray_bound(py), phi.into_pyarray_bound(py)))
}

/// O(N^2) reference for [`tree_gravity`], using the same softening.
#[pyfunction]
#[pyo3(signature = (positions, masses, sml=None, g=1.0, h_min=0.0, threads=0))]
#[allow(clippy::too_many_arguments)]
pub fn direct_gravity<'py>(
    py: Python<'py>,
    positions: PyReadonlyArray2<'py, f64>,
    masses: PyReadonlyArray1<'py, f64>,
    sml: Option<PyReadonlyArray1<'py, f64>>,
    g: f64,
    h_min: f64,
    threads: usize,
) -> PyResult<(Arr2<'py>, Arr1<'py>)> {
    let config = GravityConfig {
        constant: g,
        theta: 0.0,
        h_min,
    };
    let ps = particles(
        positions.as_array(),
        masses.as_array(),
        sml.as_ref().map(|h| h.as_array()),
    )?;

    let out = py
        .allow_threads(|| {
            with_thread_pool(threads, || direct::direct_gravity(&ps, ps.len(), &config, None))
        })?
        .map_err(to_py)?;

    let acc = vectors_to_array(out.iter().map(|o| o.acc))?;
    let phi: Vec<f64> = out.iter().map(|o| o.phi).collect();
    Ok((acc.into_pyarray_bound(py), phi.into_pyarray_bound(py)))
}
