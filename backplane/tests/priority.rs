//! Priority resolution across whole systems: specificity, declared
//! priorities, manual overrides, stability with respect to
//! registration order, and the fatal misconfiguration cases.

mod common;

use backplane::testing::dummy_spec;
use backplane::{BackendSpec, BackendSystem, BuildError, OverrideConfig};
use common::{API, float_b, float_bh, float_bl, int_b, int_b2, int_sub_b, real_b, system_with};

fn order(system: &BackendSystem) -> Vec<&str> {
    system.priority_order().iter().map(String::as_str).collect()
}

#[test]
fn specificity_orders_narrow_before_wide() {
    let system = system_with(
        &["num:Int"],
        vec![real_b(), int_b(), int_b2(), float_b(), int_sub_b()],
    );
    assert_eq!(
        order(&system),
        ["default", "IntB", "IntB2", "IntSubB", "FloatB", "RealB"]
    );
}

#[test]
fn undetermined_pairs_keep_registration_order() {
    // Reversed registration only swaps the pair with no derivable
    // order; everything else is unchanged.
    let system = system_with(
        &["num:Int"],
        vec![int_sub_b(), float_b(), int_b2(), int_b(), real_b()],
    );
    assert_eq!(
        order(&system),
        ["default", "IntB2", "IntB", "IntSubB", "FloatB", "RealB"]
    );
}

#[test]
fn declared_priorities_beat_specificity() {
    let backends = vec![
        real_b(),
        int_b(),
        float_b(),
        float_bh(),
        float_bl(),
        int_sub_b(),
    ];
    let expected = [
        "default", "IntB", "IntSubB", "FloatBH", "FloatB", "FloatBL", "RealB",
    ];

    let system = system_with(&["num:Int"], backends.clone());
    assert_eq!(order(&system), expected);

    // Deterministic here even under reversal: every pair is ordered.
    let reversed: Vec<BackendSpec> = backends.into_iter().rev().collect();
    let system = system_with(&["num:Int"], reversed);
    assert_eq!(order(&system), expected);
}

#[test]
fn order_override_beats_declared_priorities() {
    let config = OverrideConfig::new().set_order("FloatB>FloatBH").unwrap();
    let system = BackendSystem::builder("numlib")
        .default_primary_types(["num:Int"])
        .backend(float_b())
        .backend(float_bh())
        .config(config)
        .build()
        .unwrap();
    assert_eq!(order(&system), ["default", "FloatB", "FloatBH"]);
}

#[test]
fn inconsistent_priorities_fail_the_build() {
    let mut a = dummy_spec("a", &["num:Int"], &[], &[API]);
    a.higher_priority_than = vec!["b".into()];
    let mut b = dummy_spec("b", &["num:Float"], &[], &[API]);
    b.higher_priority_than = vec!["a".into()];

    let err = BackendSystem::builder("numlib")
        .backend(a)
        .backend(b)
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::InconsistentPriorities { .. }));
}

#[test]
fn priority_cycles_fail_with_a_suggestion() {
    let mut a = dummy_spec("a", &["num:Int"], &[], &[API]);
    a.higher_priority_than = vec!["b".into()];
    let mut b = dummy_spec("b", &["num:Float"], &[], &[API]);
    b.higher_priority_than = vec!["c".into()];
    let mut c = dummy_spec("c", &["text:Str"], &[], &[API]);
    c.higher_priority_than = vec!["a".into()];

    let err = BackendSystem::builder("numlib")
        .backend(a)
        .backend(b)
        .backend(c)
        .build()
        .unwrap_err();
    let BuildError::PriorityCycle { chain, suggestion } = err else {
        panic!("expected a cycle error, got {err:?}");
    };
    assert_eq!(chain.first(), chain.last());
    assert!(suggestion.contains('>'));
}

#[test]
fn explicit_invalid_spec_is_fatal_but_discovered_is_skipped() {
    use backplane::testing::StaticDiscovery;

    let invalid = dummy_spec("nameless", &[], &[], &[API]);

    let err = BackendSystem::builder("numlib")
        .backend(invalid.clone())
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::Backend(_)));

    let system = BackendSystem::builder("numlib")
        .backend(int_b())
        .discovery(StaticDiscovery(vec![invalid, float_b()]))
        .build()
        .unwrap();
    assert_eq!(order(&system), ["IntB", "FloatB"]);
}

#[test]
fn duplicates_and_blocked_backends_are_dropped() {
    use backplane::testing::StaticDiscovery;

    let mut renamed_float = float_b();
    renamed_float.name = "IntB".into();

    let config = OverrideConfig::new().block("RealB").unwrap();
    let system = BackendSystem::builder("numlib")
        .backend(int_b())
        .backend(real_b())
        .discovery(StaticDiscovery(vec![renamed_float, float_b()]))
        .config(config)
        .build()
        .unwrap();

    // The duplicate "IntB" keeps the explicit registration.
    assert_eq!(order(&system), ["IntB", "FloatB"]);
    assert!(
        system
            .backend("IntB")
            .unwrap()
            .secondary_types()
            .is_empty()
    );
}

#[test]
fn discovered_backends_register_after_explicit_sorted_by_name() {
    use backplane::testing::StaticDiscovery;

    // Neither pair has a derivable order, so registration order shows.
    let system = BackendSystem::builder("numlib")
        .backend(int_b2())
        .discovery(StaticDiscovery(vec![int_b(), int_b2(), int_sub_b()]))
        .build()
        .unwrap();
    assert_eq!(order(&system), ["IntB2", "IntB", "IntSubB"]);
}
