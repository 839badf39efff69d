use std::sync::Arc;

use modwire::core::capability::Namespace;
use modwire::core::resolver::ResolveError;

use resolver_tests::helpers::{
    assert_wired, module, package_wires, registry, DenyExport, EventLog, PanickingListener,
};
use resolver_tests::wire_fingerprint;

#[test]
fn basic_wiring() {
    // A exports p 1.0; B requires p >= 1.0. B wires to A, both resolve.
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    let b = module().imports_versioned("p", "1.0.0").add_to(&reg);

    reg.resolve(b).unwrap();

    assert!(reg.is_resolved(a));
    assert!(reg.is_resolved(b));
    assert_wired(&reg, b, "p", a);
    assert_eq!(reg.wires(b).len(), 1);
    assert!(reg.wires(a).is_empty());
}

#[test]
fn higher_version_wins() {
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    let c = module().exports("p", "1.1.0").add_to(&reg);
    let b = module().imports_versioned("p", "1.0.0").add_to(&reg);

    reg.resolve(b).unwrap();

    assert_wired(&reg, b, "p", c);
    // The losing exporter is untouched: unresolved, nothing in use.
    assert!(!reg.is_resolved(a));
    assert!(reg.in_use_capabilities(a).is_empty());
}

#[test]
fn version_tie_prefers_lower_bundle() {
    let reg = registry();
    let first = module().exports("p", "2.0.0").add_to(&reg);
    let _second = module().exports("p", "2.0.0").add_to(&reg);
    let b = module().imports("p").add_to(&reg);

    reg.resolve(b).unwrap();
    assert_wired(&reg, b, "p", first);
}

#[test]
fn in_use_exporter_preferred_over_newer_unused() {
    // Once A.p is in use, later importers reuse it even though a newer
    // unused export exists; reusing commitments keeps source sets small.
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    reg.resolve(b).unwrap();
    assert_wired(&reg, b, "p", a);

    let _c = module().exports("p", "9.0.0").add_to(&reg);
    let d = module().imports("p").add_to(&reg);
    reg.resolve(d).unwrap();
    assert_wired(&reg, d, "p", a);
}

#[test]
fn resolve_is_idempotent() {
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    let ids = [a, b];

    reg.resolve(b).unwrap();
    let first = wire_fingerprint(&reg, &ids);
    reg.resolve(b).unwrap();
    reg.resolve(a).unwrap();
    assert_eq!(wire_fingerprint(&reg, &ids), first);
}

#[test]
fn missing_mandatory_requirement_fails() {
    let reg = registry();
    let b = module().imports("q").add_to(&reg);

    let err = reg.resolve(b).unwrap_err();
    assert_eq!(err.module(), b);
    let requirement = err.requirement().expect("failure should name the requirement");
    assert_eq!(requirement.target_package().unwrap().as_str(), "q");
    assert!(!reg.is_resolved(b));
}

#[test]
fn missing_optional_requirement_is_tolerated() {
    let reg = registry();
    let b = module()
        .exports("b", "1.0.0")
        .imports_optionally("q")
        .add_to(&reg);

    reg.resolve(b).unwrap();
    assert!(reg.is_resolved(b));
    assert!(reg.wires(b).is_empty());
}

#[test]
fn failing_provider_error_propagates_to_root_resolve() {
    // Q exports q but cannot itself resolve; B's mandatory import of q
    // surfaces Q's failure.
    let reg = registry();
    let q = module().exports("q", "1.0.0").imports("missing").add_to(&reg);
    let b = module().imports("q").add_to(&reg);

    let err = reg.resolve(b).unwrap_err();
    assert_eq!(err.module(), q);
    assert_eq!(
        err.requirement().unwrap().target_package().unwrap().as_str(),
        "missing"
    );
}

#[test]
fn failing_provider_of_optional_requirement_is_skipped() {
    let reg = registry();
    let _q = module().exports("q", "1.0.0").imports("missing").add_to(&reg);
    let b = module()
        .exports("b", "1.0.0")
        .imports_optionally("q")
        .add_to(&reg);

    reg.resolve(b).unwrap();
    assert!(reg.wires(b).is_empty());
}

#[test]
fn cyclic_imports_resolve_together() {
    let reg = registry();
    let a = module().exports("pa", "1.0.0").imports("pb").add_to(&reg);
    let b = module().exports("pb", "1.0.0").imports("pa").add_to(&reg);

    reg.resolve(a).unwrap();

    assert!(reg.is_resolved(a));
    assert!(reg.is_resolved(b));
    assert_wired(&reg, a, "pb", b);
    assert_wired(&reg, b, "pa", a);
}

#[test]
fn uses_conflict_with_no_alternative_fails() {
    // A exports p constrained to the q it imports (v1 only). B wants p and
    // a q >= 2, which no configuration can reconcile.
    let reg = registry();
    let _d = module().exports("q", "1.0.0").add_to(&reg);
    let _e = module().exports("q", "2.0.0").add_to(&reg);
    let _a = module()
        .exports_with_uses("p", "1.0.0", &["q"])
        .requires_filter("(&(package=q)(version<=1.0.0))")
        .add_to(&reg);
    let b = module()
        .imports("p")
        .imports_versioned("q", "2.0.0")
        .add_to(&reg);

    let err = reg.resolve(b).unwrap_err();
    assert!(matches!(err, ResolveError::ConstraintViolation { .. }));
    assert!(!reg.is_resolved(b));
}

#[test]
fn uses_conflict_forces_backtrack_to_consistent_configuration() {
    // A's p uses q; A would prefer q v2 but B can only see q v1, so the
    // odometer must walk A back to the v1 exporter.
    let reg = registry();
    let d = module().exports("q", "1.0.0").add_to(&reg);
    let _e = module().exports("q", "2.0.0").add_to(&reg);
    let a = module()
        .exports_with_uses("p", "1.0.0", &["q"])
        .imports("q")
        .add_to(&reg);
    let b = module()
        .imports("p")
        .requires_filter("(&(package=q)(version<=1.0.0))")
        .add_to(&reg);

    reg.resolve(b).unwrap();

    assert_wired(&reg, b, "p", a);
    assert_wired(&reg, b, "q", d);
    assert_wired(&reg, a, "q", d);
}

#[test]
fn required_module_flattening() {
    // M provides module `lib` re-exporting p and r; N's module wire to M
    // carries both packages with M as the source.
    let reg = registry();
    let m = module()
        .provides_module("lib", "1.0.0")
        .exports("p", "1.0.0")
        .exports("r", "1.0.0")
        .add_to(&reg);
    let n = module().requires_module("lib").add_to(&reg);

    reg.resolve(n).unwrap();

    let wires = reg.wires(n);
    assert_eq!(wires.len(), 1);
    let wire = &wires[0];
    assert!(!wire.is_package_wire());
    assert_eq!(wire.exporter(), m);
    let packages = wire.packages().unwrap();
    assert_eq!(packages.len(), 2);
    for pkg in ["p", "r"] {
        let sources = wire.package_sources(pkg);
        assert_eq!(sources.len(), 1, "package `{}` should have one source", pkg);
        assert_eq!(sources[0].module(), m);
    }
}

#[test]
fn required_module_flattens_transitively() {
    // lib2 requires lib1; requiring lib2 sees lib1's exports too, each
    // attributed to its actual exporter.
    let reg = registry();
    let base = module()
        .provides_module("lib1", "1.0.0")
        .exports("p", "1.0.0")
        .add_to(&reg);
    let mid = module()
        .provides_module("lib2", "1.0.0")
        .exports("r", "1.0.0")
        .requires_module("lib1")
        .add_to(&reg);
    let top = module().requires_module("lib2").add_to(&reg);

    reg.resolve(top).unwrap();

    let wires = reg.wires(top);
    assert_eq!(wires.len(), 1);
    assert_eq!(wires[0].package_sources("r")[0].module(), mid);
    assert_eq!(wires[0].package_sources("p")[0].module(), base);
}

#[test]
fn module_wires_follow_package_wires() {
    let reg = registry();
    let _a = module().exports("p", "1.0.0").add_to(&reg);
    let _m = module()
        .provides_module("lib", "1.0.0")
        .exports("r", "1.0.0")
        .add_to(&reg);
    let n = module().requires_module("lib").imports("p").add_to(&reg);

    reg.resolve(n).unwrap();

    let wires = reg.wires(n);
    assert_eq!(wires.len(), 2);
    assert!(wires[0].is_package_wire());
    assert!(!wires[1].is_package_wire());
}

#[test]
fn no_duplicate_package_wires() {
    let reg = registry();
    let _a = module().exports("p", "1.0.0").exports("q", "1.0.0").add_to(&reg);
    let b = module().imports("p").imports("q").add_to(&reg);

    reg.resolve(b).unwrap();

    let mut names: Vec<String> = package_wires(&reg, b).into_iter().map(|(n, _)| n).collect();
    let before = names.len();
    names.dedup();
    assert_eq!(names.len(), before);
}

#[test]
fn exporter_capabilities_become_in_use() {
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    let b = module().imports("p").add_to(&reg);

    reg.resolve(b).unwrap();

    let in_use = reg.in_use_capabilities(a);
    assert_eq!(in_use.len(), 1);
    assert_eq!(in_use[0].package_name().unwrap().as_str(), "p");
}

#[test]
fn export_only_capabilities_promoted_on_resolve() {
    // A self-contained exporter that resolves promotes its own package
    // capabilities, but not its module identity, into the in-use index.
    let reg = registry();
    let a = module()
        .exports("p", "1.0.0")
        .provides_module("lib", "1.0.0")
        .add_to(&reg);

    reg.resolve(a).unwrap();

    let in_use = reg.in_use_capabilities(a);
    assert_eq!(in_use.len(), 1);
    assert_eq!(in_use[0].namespace(), Namespace::Package);
}

#[test]
fn resolved_events_fire_in_commit_order() {
    let reg = registry();
    let log = EventLog::new();
    reg.add_resolver_listener(log.clone());

    let a = module().exports("p", "1.0.0").add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    reg.resolve(b).unwrap();

    // Root first, then the modules it pulled in.
    assert_eq!(
        log.events(),
        vec![format!("resolved {}", b), format!("resolved {}", a)]
    );
}

#[test]
fn already_resolved_module_fires_no_events() {
    let reg = registry();
    let log = EventLog::new();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    reg.resolve(a).unwrap();

    reg.add_resolver_listener(log.clone());
    reg.resolve(a).unwrap();
    assert!(log.events().is_empty());
}

#[test]
fn panicking_listener_does_not_block_delivery() {
    let reg = registry();
    let log = EventLog::new();
    reg.add_resolver_listener(Arc::new(PanickingListener));
    reg.add_resolver_listener(log.clone());

    let a = module().exports("p", "1.0.0").add_to(&reg);
    reg.resolve(a).unwrap();

    assert_eq!(log.events(), vec![format!("resolved {}", a)]);
}

#[test]
fn removed_listener_receives_nothing() {
    let reg = registry();
    let log = EventLog::new();
    let listener: Arc<dyn modwire::core::registry::ResolverListener> = log.clone();
    reg.add_resolver_listener(listener.clone());
    reg.remove_resolver_listener(&listener);

    let a = module().exports("p", "1.0.0").add_to(&reg);
    reg.resolve(a).unwrap();
    assert!(log.events().is_empty());
}

#[test]
fn module_lifecycle_events() {
    let reg = registry();
    let log = EventLog::new();
    reg.add_module_listener(log.clone());
    reg.add_resolver_listener(log.clone());

    let a = module().exports("p", "1.0.0").add_to(&reg);
    reg.resolve(a).unwrap();
    assert!(reg.remove_module(a));
    assert!(!reg.remove_module(a));

    assert_eq!(
        log.events(),
        vec![
            format!("added {}", a),
            format!("resolved {}", a),
            format!("removed {}", a),
            // Removal of a resolved module unresolves it for listeners.
            format!("unresolved {}", a),
        ]
    );
    assert!(reg.definition(a).is_none());
    assert!(reg.in_use_capabilities(a).is_empty());
}

#[test]
fn resolving_a_removed_module_fails() {
    let reg = registry();
    let a = module().exports("p", "1.0.0").add_to(&reg);
    reg.remove_module(a);

    let err = reg.resolve(a).unwrap_err();
    assert!(matches!(err, ResolveError::UnknownModule { .. }));
}

#[test]
fn denied_export_blocks_in_use_candidates() {
    // The export gate runs in the in-use scan; once A.p is a commitment,
    // a denied exporter disappears from every candidate pool.
    let reg = registry();
    let a = module()
        .exports("p", "1.0.0")
        .secured(DenyExport::of("p"))
        .add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    reg.resolve(b).unwrap();
    assert_wired(&reg, b, "p", a);

    let d = module().imports("p").add_to(&reg);
    let err = reg.resolve(d).unwrap_err();
    assert_eq!(err.module(), d);
}
