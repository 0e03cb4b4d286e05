//! Warnings emitted through `tracing`, captured with a scoped subscriber.

use std::io;
use std::sync::{Arc, Mutex};

use sphtree::{
    KernelKind, Particle, SmoothingLengthConfig, SmoothingLengthSolver, SpatialTree, TreeConfig,
    Vector,
};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, captured.text())
}

#[test]
fn lone_particle_without_a_length_is_reported() {
    let ps = vec![Particle::new(Vector::<2>::new(0.3, 0.4), 1.0).with_id(7)];
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let config = SmoothingLengthConfig::default();
    let solver = SmoothingLengthSolver::<2>::new(KernelKind::CubicSpline, 32, config).unwrap();

    let (out, logs) = with_captured_logs(|| solver.solve(&tree, &ps, 0).unwrap());

    assert_eq!(out.h, 0.0);
    assert_eq!(out.iterations, 0);
    assert!(!out.converged);
    assert_eq!(out.dens, 0.0);
    assert!(logs.contains("WARN"), "no warning in {logs:?}");
    assert!(logs.contains("did not converge"), "{logs}");
    assert!(logs.contains("id=7"), "{logs}");
}

#[test]
fn failed_newton_solve_is_reported() {
    // rho h is independent of h for a lone 1D particle.
    let ps = vec![Particle::new(Vector::<1>::new(0.0), 1.0).with_sml(1.0)];
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let config = SmoothingLengthConfig::default();
    let solver = SmoothingLengthSolver::<1>::new(KernelKind::CubicSpline, 4, config).unwrap();

    let (out, logs) = with_captured_logs(|| solver.solve(&tree, &ps, 0).unwrap());

    assert!(!out.converged);
    assert_eq!(out.h, 1.0);
    assert!(logs.contains("keeping previous value"), "{logs}");
}
