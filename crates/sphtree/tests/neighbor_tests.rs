use sphtree::direct::exhaustive_neighbors;
use sphtree::{
    NeighborLists, NeighborSearchConfig, OverflowPolicy, Particle, Periodic, RadiusPolicy,
    SpatialTree, TreeConfig, Vector,
};

fn gen_particles<const D: usize>(seed: u64, n: usize, h_lo: f64, h_hi: f64) -> Vec<Particle<D>> {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let pos = Vector::<D>::from_fn(|_, _| rng.gen::<f64>());
            Particle::new(pos, 1.0)
                .with_sml(rng.gen_range(h_lo..h_hi))
                .with_id(i)
        })
        .collect()
}

fn check_against_exhaustive<const D: usize>(
    ps: &[Particle<D>],
    tree: &SpatialTree<D>,
    policy: RadiusPolicy,
    periodic: Option<&Periodic<D>>,
) {
    let cfg = NeighborSearchConfig::new(50, policy);
    for i in (0..ps.len()).step_by(7) {
        let got = tree.find_neighbors(ps, i, &cfg).unwrap();
        let want =
            exhaustive_neighbors(ps, ps.len(), &ps[i].pos, ps[i].sml, policy, periodic).unwrap();
        assert_eq!(got.indices, want, "particle {i} ({policy:?})");
        assert!(!got.is_truncated);
        assert_eq!(got.total_candidates, want.len());
        assert_eq!(got.indices.first(), Some(&i), "self must come first");
    }
}

#[test]
fn asymmetric_search_matches_exhaustive() {
    let ps = gen_particles::<3>(1, 800, 0.05, 0.15);
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    check_against_exhaustive(&ps, &tree, RadiusPolicy::Asymmetric, None);
}

#[test]
fn symmetric_search_matches_exhaustive() {
    // Wide spread of h, so many pairs are reached only through h_j.
    let ps = gen_particles::<2>(2, 600, 0.01, 0.2);
    let mut tree = SpatialTree::new(TreeConfig { max_level: 20, leaf_particle_num: 4 });
    tree.build(&ps, ps.len()).unwrap();
    check_against_exhaustive(&ps, &tree, RadiusPolicy::Symmetric, None);
}

#[test]
fn symmetric_lists_are_supersets_of_asymmetric_ones() {
    let ps = gen_particles::<2>(3, 300, 0.02, 0.2);
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let asym = NeighborSearchConfig::new(32, RadiusPolicy::Asymmetric);
    let sym = NeighborSearchConfig::new(32, RadiusPolicy::Symmetric);
    for i in 0..ps.len() {
        let a = tree.find_neighbors(&ps, i, &asym).unwrap();
        let s = tree.find_neighbors(&ps, i, &sym).unwrap();
        assert!(a.indices.iter().all(|j| s.indices.contains(j)));
    }
}

#[test]
fn periodic_search_wraps_around_the_box() {
    let ps = gen_particles::<2>(4, 400, 0.05, 0.12);
    let periodic = Periodic::new(Vector::<2>::zeros(), Vector::<2>::new(1.0, 1.0)).unwrap();
    let mut tree = SpatialTree::new(TreeConfig::default()).with_periodic(periodic);
    tree.build(&ps, ps.len()).unwrap();
    check_against_exhaustive(&ps, &tree, RadiusPolicy::Asymmetric, Some(&periodic));
    check_against_exhaustive(&ps, &tree, RadiusPolicy::Symmetric, Some(&periodic));

    let corner = tree
        .find_neighbors_at(
            &ps,
            &Vector::<2>::new(0.0, 0.0),
            0.2,
            &NeighborSearchConfig::new(50, RadiusPolicy::Asymmetric),
        )
        .unwrap();
    assert!(corner
        .indices
        .iter()
        .any(|&j| ps[j].pos[0] > 0.5 && ps[j].pos[1] > 0.5));
}

#[test]
fn results_are_sorted_by_distance() {
    let ps = gen_particles::<3>(5, 500, 0.2, 0.3);
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let center = Vector::<3>::new(0.5, 0.5, 0.5);
    let cfg = NeighborSearchConfig::new(50, RadiusPolicy::Asymmetric);
    let res = tree.find_neighbors_at(&ps, &center, 0.3, &cfg).unwrap();
    assert!(!res.is_empty());
    let d: Vec<f64> = res.indices.iter().map(|&j| (ps[j].pos - center).norm()).collect();
    assert!(d.windows(2).all(|w| w[0] <= w[1]));
    assert!(d.iter().all(|&r| r < 0.3));
}

#[test]
fn truncation_keeps_the_nearest_and_reports_the_full_count() {
    let ps = gen_particles::<2>(6, 2000, 0.3, 0.31);
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let grow = NeighborSearchConfig::new(1, RadiusPolicy::Asymmetric);
    let truncate = grow.with_overflow(OverflowPolicy::Truncate);

    let full = tree.find_neighbors(&ps, 0, &grow).unwrap();
    let cut = tree.find_neighbors(&ps, 0, &truncate).unwrap();

    assert_eq!(truncate.max_neighbors, 20);
    assert!(full.len() > 20, "test needs a crowded neighbourhood");
    assert!(!full.is_truncated);
    assert!(cut.is_truncated);
    assert_eq!(cut.len(), 20);
    assert_eq!(cut.total_candidates, full.len());
    assert_eq!(cut.indices[..], full.indices[..20], "truncation keeps the nearest");
}

#[test]
fn zero_radius_finds_nothing() {
    let ps = gen_particles::<1>(7, 50, 0.1, 0.2);
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let cfg = NeighborSearchConfig::new(4, RadiusPolicy::Asymmetric);
    let res = tree.find_neighbors_at(&ps, &ps[3].pos, 0.0, &cfg).unwrap();
    assert!(res.is_empty());
    assert_eq!(res.total_candidates, 0);
}

#[test]
fn neighbor_lists_cover_real_particles_only() {
    let mut ps = gen_particles::<3>(8, 1200, 0.05, 0.1);
    for p in ps.iter_mut().skip(1100) {
        p.kind = sphtree::ParticleKind::Ghost;
    }
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let cfg = NeighborSearchConfig::new(32, RadiusPolicy::Symmetric);
    let lists = NeighborLists::collect(&tree, &ps, &cfg).unwrap();
    assert_eq!(lists.len(), ps.len());
    for (i, list) in lists.iter().enumerate() {
        if i < 1100 {
            assert_eq!(list, &tree.find_neighbors(&ps, i, &cfg).unwrap());
        } else {
            assert!(list.is_empty());
        }
    }
    assert_eq!(lists.truncated_count(), 0);
    assert!(lists.max_len() >= 1);
}

#[test]
fn ghosts_are_found_as_neighbours() {
    let mut ps = vec![
        Particle::new(Vector::<1>::new(0.0), 1.0).with_sml(0.5),
        Particle::new(Vector::<1>::new(-0.2), 1.0).with_sml(0.5).ghost(),
    ];
    ps.push(Particle::new(Vector::<1>::new(2.0), 1.0).with_sml(0.5));
    let mut tree = SpatialTree::new(TreeConfig::default());
    tree.build(&ps, ps.len()).unwrap();
    let res = tree
        .find_neighbors(&ps, 0, &NeighborSearchConfig::new(4, RadiusPolicy::Asymmetric))
        .unwrap();
    assert_eq!(res.indices, vec![0, 1]);
}
