use pyo3::prelude::*;

mod sph;

/// Python entry point, importable as `sphtree._sphtree`.
///
/// Exposes smoothing-length solving and tree/direct self-gravity over
/// `(N,3)` float64 arrays.
#[pymodule]
fn _sphtree<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(sph::smoothing_lengths, m)?)?;
    m.add_function(wrap_pyfunction!(sph::tree_gravity, m)?)?;
    m.add_function(wrap_pyfunction!(sph::direct_gravity, m)?)?;
    Ok(())
}
