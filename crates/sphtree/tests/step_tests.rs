use rand::{rngs::StdRng, Rng, SeedableRng};
use sphtree::{CoreConfig, GravityConfig, Particle, Periodic, SphCore, Vector};

/// `n x n` lattice in the unit square, each point jittered by up to
/// `jitter * dx`.
fn jittered_lattice(seed: u64, n: usize, jitter: f64) -> Vec<Particle<2>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dx = 1.0 / n as f64;
    let mut ps = Vec::with_capacity(n * n);
    for a in 0..n {
        for b in 0..n {
            let pos = Vector::<2>::new(
                (a as f64 + 0.5 + (2.0 * rng.gen::<f64>() - 1.0) * jitter) * dx,
                (b as f64 + 0.5 + (2.0 * rng.gen::<f64>() - 1.0) * jitter) * dx,
            );
            ps.push(Particle::new(pos, dx * dx).with_sound(1.0).with_id(ps.len()));
        }
    }
    ps
}

#[test]
fn periodic_step_with_gravity() {
    let mut ps = jittered_lattice(1, 20, 0.1);
    let n = ps.len();
    let config = CoreConfig::<2>::builder()
        .neighbor_number(24)
        .periodic(Periodic::new(Vector::<2>::zeros(), Vector::<2>::new(1.0, 1.0)).unwrap())
        .gravity(GravityConfig::default())
        .build()
        .unwrap();
    let mut core = SphCore::new(config).unwrap();
    let report = core.run_step(&mut ps, n).unwrap();

    assert_eq!(report.solve.solved, n);
    assert_eq!(report.solve.fallbacks, 0);
    assert_eq!(report.truncated_lists, 0);

    let he = (24.0 / std::f64::consts::PI).sqrt() / 20.0;
    for p in &ps {
        assert!((p.sml / he - 1.0).abs() < 0.1, "h / he = {}", p.sml / he);
        assert!((p.dens - 1.0).abs() < 0.1);
        assert!(p.gradh.is_finite() && p.gradh > 0.0);
        assert!(p.phi.is_finite() && p.phi < 0.0);
    }
    // Static gas: the signal speed is 2c, so dt_sound = min h / 2.
    assert!((report.dt_sound - report.solve.min_h / 2.0).abs() < 1e-12);

    let g = report.gravity.unwrap();
    assert_eq!(g.particles, n);
    assert_eq!(report.dt_force, g.min_timestep);
    assert!(report.dt_force.is_finite() && report.dt_force > 0.0);

    let lists = core.neighbor_lists();
    assert_eq!(lists.len(), n);
    for i in 0..n {
        let list = lists.get(i).unwrap();
        assert_eq!(list.indices[0], i);
        assert!(list.len() >= ps[i].neighbor);
    }
    assert_eq!(core.tree().len(), n);
}

#[test]
fn ghosts_take_part_but_keep_their_state() {
    let mut ps = jittered_lattice(2, 16, 0.0);
    let n_real = ps.len();
    // Mirror the strip next to x = 0 into a ghost layer.
    let ghosts: Vec<_> = ps
        .iter()
        .filter(|p| p.pos[0] < 0.25)
        .map(|p| {
            let mut g = p.clone().ghost().with_sml(0.07);
            g.pos[0] = -g.pos[0];
            g
        })
        .collect();
    let n_ghost = ghosts.len();
    ps.extend(ghosts);
    let before: Vec<_> = ps[n_real..].to_vec();

    let config = CoreConfig::<2>::builder().neighbor_number(24).build().unwrap();
    let mut core = SphCore::new(config).unwrap();
    let n = ps.len();
    let report = core.run_step(&mut ps, n).unwrap();

    assert_eq!(n, n_real + n_ghost);
    assert_eq!(report.solve.solved, n_real);
    assert!(report.gravity.is_none());
    assert_eq!(report.dt_force, f64::INFINITY);
    assert_eq!(&ps[n_real..], &before[..]);
    for i in n_real..n_real + n_ghost {
        assert!(core.neighbor_lists().get(i).unwrap().is_empty());
    }
    for p in &ps[..n_real] {
        assert!(p.sml.is_finite() && p.sml > 0.0);
        assert!(p.dens.is_finite() && p.dens > 0.0);
    }
    // A particle by the mirrored wall sees the ghost layer.
    let edge = ps[..n_real]
        .iter()
        .position(|p| p.pos[0] < 0.05 && (p.pos[1] - 0.5).abs() < 0.05)
        .unwrap();
    let list = core.neighbor_lists().get(edge).unwrap();
    assert!(list.indices.iter().any(|&j| j >= n_real));
}

#[test]
fn core_is_reusable_across_steps() {
    let mut ps = jittered_lattice(3, 12, 0.2);
    let config = CoreConfig::<2>::builder().neighbor_number(20).build().unwrap();
    let mut core = SphCore::new(config).unwrap();

    core.run_step(&mut ps, 100).unwrap();
    assert_eq!(core.tree().len(), 100);
    assert_eq!(core.neighbor_lists().len(), 100);

    let report = core.run_step(&mut ps, 144).unwrap();
    assert_eq!(core.tree().len(), 144);
    assert_eq!(report.solve.solved, 144);
    assert!(core.run_step(&mut ps, 145).is_err());
}
