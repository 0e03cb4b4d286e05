use sphtree::config::suggested_neighbor_number;
use sphtree::{
    CoreConfig, Error, Formulation, GravityConfig, KernelKind, OverflowPolicy,
    SmoothingLengthConfig, SmoothingLengthPolicy, TreeConfig,
};

#[test]
fn builder_applies_defaults() {
    let cfg = CoreConfig::<3>::builder().neighbor_number(50).build().unwrap();
    assert_eq!(cfg.neighbor_number(), 50);
    assert_eq!(*cfg.tree(), TreeConfig::default());
    assert_eq!(cfg.kernel(), KernelKind::CubicSpline);
    assert_eq!(cfg.formulation(), Formulation::Ssph);
    assert!(cfg.iterative_sml());
    assert_eq!(cfg.overflow(), OverflowPolicy::Grow);
    assert_eq!(cfg.smoothing().policy, SmoothingLengthPolicy::NoMinimum);
    assert!(cfg.gravity().is_none());
    assert!(cfg.periodic().is_none());
}

#[test]
fn builder_rejects_bad_values() {
    let invalid = |r: sphtree::Result<CoreConfig<2>>| matches!(r, Err(Error::InvalidParam(_)));

    assert!(invalid(CoreConfig::builder().build()), "neighbor_number is required");
    assert!(invalid(CoreConfig::builder().neighbor_number(0).build()));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .tree(TreeConfig { max_level: 0, leaf_particle_num: 1 })
            .build()
    ));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .tree(TreeConfig { max_level: 20, leaf_particle_num: 0 })
            .build()
    ));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .gravity(GravityConfig { theta: -0.1, ..GravityConfig::default() })
            .build()
    ));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .gravity(GravityConfig { constant: 0.0, ..GravityConfig::default() })
            .build()
    ));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .smoothing(SmoothingLengthConfig::physics_based(0.0, 2.0))
            .build()
    ));
    assert!(invalid(
        CoreConfig::builder()
            .neighbor_number(32)
            .smoothing(SmoothingLengthConfig::constant(-1.0))
            .build()
    ));

    let one_d = CoreConfig::<1>::builder()
        .neighbor_number(4)
        .kernel(KernelKind::WendlandC4)
        .build();
    assert!(matches!(one_d, Err(Error::InvalidParam(_))));
}

#[test]
fn deserialises_with_defaults_and_validation() {
    let cfg: CoreConfig<2> = serde_json::from_str(
        r#"{
            "neighbor_number": 32,
            "kernel": "wendland_c4",
            "formulation": "disph",
            "overflow": "truncate",
            "tree": { "leaf_particle_num": 8 },
            "gravity": { "theta": 0.7 },
            "periodic": { "min": [0.0, 0.0], "max": [1.0, 2.0] }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.kernel(), KernelKind::WendlandC4);
    assert_eq!(cfg.formulation(), Formulation::Disph);
    assert_eq!(cfg.overflow(), OverflowPolicy::Truncate);
    assert_eq!(cfg.tree().leaf_particle_num, 8);
    assert_eq!(cfg.tree().max_level, 20);
    let g = cfg.gravity().unwrap();
    assert_eq!(g.theta, 0.7);
    assert_eq!(g.constant, 1.0);
    assert_eq!(cfg.periodic().unwrap().range()[1], 2.0);

    let back: CoreConfig<2> = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
    assert_eq!(back, cfg);

    assert!(serde_json::from_str::<CoreConfig<2>>(r#"{ "kernel": "cubic_spline" }"#).is_err());
    assert!(serde_json::from_str::<CoreConfig<2>>(
        r#"{ "neighbor_number": 32, "periodic": { "min": [0.0, 0.0], "max": [1.0, 0.0] } }"#
    )
    .is_err());
}

#[test]
fn formulation_names() {
    let all: Vec<_> = Formulation::all().collect();
    assert_eq!(all, vec![Formulation::Ssph, Formulation::Disph, Formulation::Gsph]);
    for f in all {
        assert_eq!(f.key().parse::<Formulation>().unwrap(), f);
        assert_eq!(f.to_string(), f.name());
    }
    assert_eq!("GSPH".parse::<Formulation>().unwrap(), Formulation::Gsph);
    assert_eq!(Formulation::Disph.name(), "Density Independent SPH");
    assert!(matches!(
        "mfm".parse::<Formulation>(),
        Err(Error::UnknownName { kind: "formulation", .. })
    ));
}

#[test]
fn suggested_neighbour_numbers_are_clamped_per_dimension() {
    // 2 * 2.0 * 1.2 = 4.8
    assert_eq!(suggested_neighbor_number::<1>(2.0), 4);
    assert_eq!(suggested_neighbor_number::<1>(100.0), 10);
    assert_eq!(suggested_neighbor_number::<2>(0.1), 12);
    // pi * 3^2 * 1.2 = 33.9
    assert_eq!(suggested_neighbor_number::<2>(3.0), 33);
    assert_eq!(suggested_neighbor_number::<3>(1.0), 30);
    assert_eq!(suggested_neighbor_number::<3>(10.0), 100);
}

#[test]
fn minimal_document_takes_every_default() {
    let cfg: CoreConfig<1> = serde_json::from_str(r#"{ "neighbor_number": 4 }"#).unwrap();
    assert_eq!(cfg, CoreConfig::<1>::builder().neighbor_number(4).build().unwrap());
    assert!(cfg.iterative_sml());
    assert!(cfg.periodic().is_none());
}
