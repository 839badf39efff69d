use modwire::core::module::CallerKind;

use resolver_tests::helpers::{
    module, policy, policy_with_boot, registry, url, RecordingHost,
};

#[test]
fn boot_delegation_bypasses_wires_and_content() {
    // `java.*` delegates to the host exactly once per load, even though a
    // module exports a java package and the importer could see it.
    let reg = registry();
    let _evil = module().exports("java.util", "1.0.0").class("java.util.List").add_to(&reg);
    let b = module().imports("java.util").class("java.util.List").add_to(&reg);

    let host = RecordingHost::with_classes(["java.util.List"]);
    let search = policy(&reg, &host);

    let class = search.find_class(b, "java.util.List", CallerKind::Module).unwrap();
    assert_eq!(class.name(), "java.util.List");
    assert_eq!(host.load_count("java.util.List"), 1);
}

#[test]
fn boot_delegation_propagates_host_failure() {
    let reg = registry();
    let b = module().exports("b", "1.0.0").add_to(&reg);
    let host = RecordingHost::new();
    let search = policy(&reg, &host);

    let err = search.find_class(b, "java.nio.Missing", CallerKind::Module).unwrap_err();
    // The host error travels with the failure; no wiring diagnostic
    // applies to a boot-delegated package.
    assert!(err.diagnostic().is_none());
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(host.load_count("java.nio.Missing"), 1);
}

#[test]
fn configured_boot_prefixes_apply(){
    let reg = registry();
    let b = module().exports("b", "1.0.0").add_to(&reg);
    let host = RecordingHost::with_classes(["com.vendor.impl.Widget"]);
    let search = policy_with_boot(&reg, &host, "com.vendor.*");

    search
        .find_class(b, "com.vendor.impl.Widget", CallerKind::Module)
        .unwrap();
    assert_eq!(host.load_count("com.vendor.impl.Widget"), 1);
}

#[test]
fn class_found_through_static_wire() {
    let reg = registry();
    let _a = module().exports("p", "1.0.0").class("p.C").add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    let host = RecordingHost::new();
    let search = policy(&reg, &host);

    // find_class resolves the module lazily.
    assert!(!reg.is_resolved(b));
    let class = search.find_class(b, "p.C", CallerKind::Module).unwrap();
    assert_eq!(class.name(), "p.C");
    assert!(reg.is_resolved(b));
    assert_eq!(host.load_count("p.C"), 0);
}

#[test]
fn covering_wire_miss_is_authoritative() {
    // B imports p; the wired exporter lacks p.X. Local content never gets
    // consulted: the wire is the package's single provenance.
    let reg = registry();
    let _a = module().exports("p", "1.0.0").class("p.C").add_to(&reg);
    let b = module().imports("p").class("p.X").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let err = search.find_class(b, "p.X", CallerKind::Module).unwrap_err();
    let diagnostic = err.diagnostic().unwrap();
    assert!(diagnostic.contains("imports"), "diagnostic: {}", diagnostic);
}

#[test]
fn local_content_serves_unexported_packages() {
    let reg = registry();
    let b = module().exports("b", "1.0.0").class("internal.Impl").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let class = search.find_class(b, "internal.Impl", CallerKind::Module).unwrap();
    assert_eq!(class.name(), "internal.Impl");
}

#[test]
fn class_through_module_wire_reaches_transitive_exports() {
    let reg = registry();
    let _m = module()
        .provides_module("lib", "1.0.0")
        .exports("p", "1.0.0")
        .class("p.C")
        .add_to(&reg);
    let n = module().requires_module("lib").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let class = search.find_class(n, "p.C", CallerKind::Module).unwrap();
    assert_eq!(class.name(), "p.C");
}

#[test]
fn dynamic_import_attaches_wire_on_first_load() {
    let reg = registry();
    let a = module()
        .exports("p", "1.0.0")
        .class("p.C")
        .class("p.D")
        .add_to(&reg);
    let b = module().dynamically_imports("p.*").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    reg.resolve(b).unwrap();
    assert!(reg.wires(b).is_empty());

    search.find_class(b, "p.C", CallerKind::Module).unwrap();
    assert_eq!(reg.wires(b).len(), 1);
    assert_eq!(reg.wires(b)[0].exporter(), a);

    // The second load rides the wire already attached: still one wire, and
    // the exporter resolved exactly once.
    search.find_class(b, "p.D", CallerKind::Module).unwrap();
    assert_eq!(reg.wires(b).len(), 1);
}

#[test]
fn dynamic_import_resolves_the_chosen_exporter() {
    let reg = registry();
    let a = module().exports("p.q", "1.0.0").class("p.q.C").add_to(&reg);
    let b = module().dynamically_imports("*").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    assert!(!reg.is_resolved(a));
    search.find_class(b, "p.q.C", CallerKind::Module).unwrap();
    assert!(reg.is_resolved(a));
}

#[test]
fn dynamic_import_respects_pattern_scope() {
    let reg = registry();
    let _a = module().exports("q", "1.0.0").class("q.C").add_to(&reg);
    let b = module().dynamically_imports("p.*").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let err = search.find_class(b, "q.C", CallerKind::Module).unwrap_err();
    // `q` is exported, just not importable here: diagnostic names the
    // exporter and the missing import.
    let diagnostic = err.diagnostic().unwrap();
    assert!(diagnostic.contains("does not import"), "diagnostic: {}", diagnostic);
    assert!(reg.wires(b).is_empty());
}

#[test]
fn optional_import_without_provider_explains_itself() {
    let reg = registry();
    let b = module()
        .exports("b", "1.0.0")
        .imports_optionally("q")
        .add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    reg.resolve(b).unwrap();
    let err = search.find_class(b, "q.X", CallerKind::Module).unwrap_err();
    let diagnostic = err.diagnostic().unwrap();
    assert!(
        diagnostic.contains("optionally imported"),
        "diagnostic: {}",
        diagnostic
    );
    assert!(diagnostic.contains("no module currently exports"));
}

#[test]
fn host_only_class_concedes_to_host_path_callers() {
    let reg = registry();
    let b = module().exports("b", "1.0.0").add_to(&reg);
    let host = RecordingHost::with_classes(["legacy.Util"]);
    let search = policy(&reg, &host);

    // A modular caller fails, with the host visibility called out.
    let err = search.find_class(b, "legacy.Util", CallerKind::Module).unwrap_err();
    assert!(err.diagnostic().unwrap().contains("host class path"));

    // A host-path caller still expects host visibility and gets it.
    let class = search.find_class(b, "legacy.Util", CallerKind::Host).unwrap();
    assert_eq!(class.name(), "legacy.Util");
}

#[test]
fn unknown_class_diagnostic_names_nobody() {
    let reg = registry();
    let b = module().exports("b", "1.0.0").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let err = search.find_class(b, "ghost.Phantom", CallerKind::Module).unwrap_err();
    assert!(err.diagnostic().unwrap().contains("no module exports"));
}

#[test]
fn failed_resolve_surfaces_in_class_error() {
    let reg = registry();
    let b = module().imports("missing").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let err = search.find_class(b, "any.C", CallerKind::Module).unwrap_err();
    let resolve_error = err.resolve_error().unwrap();
    assert_eq!(resolve_error.module(), b);
}

#[test]
fn resource_found_through_wire() {
    let reg = registry();
    let _a = module()
        .exports("p", "1.0.0")
        .resource("p/data.txt", "module://a/p/data.txt")
        .add_to(&reg);
    let b = module().imports("p").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let found = search.find_resource(b, "p/data.txt").unwrap();
    assert_eq!(found, url("module://a/p/data.txt"));
}

#[test]
fn unresolvable_module_still_serves_local_resources() {
    let reg = registry();
    let b = module()
        .imports("missing")
        .resource("local/data.txt", "module://b/local/data.txt")
        .add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let found = search.find_resource(b, "local/data.txt").unwrap();
    assert_eq!(found, url("module://b/local/data.txt"));

    // But anything else reports the resolution failure.
    let err = search.find_resource(b, "other.txt").unwrap_err();
    assert!(err.resolve_error().is_some());
}

#[test]
fn find_resources_returns_first_nonempty_source_without_merging() {
    // The wired exporter holds two copies; the importer's local copy is
    // shadowed entirely (single-source rule).
    let reg = registry();
    let _a = module()
        .exports("p", "1.0.0")
        .resource("p/cfg", "module://a/p/cfg.one")
        .resource("p/cfg", "module://a/p/cfg.two")
        .add_to(&reg);
    let b = module()
        .imports("p")
        .resource("p/cfg", "module://b/p/cfg")
        .add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let found = search.find_resources(b, "p/cfg").unwrap();
    assert_eq!(
        found,
        vec![url("module://a/p/cfg.one"), url("module://a/p/cfg.two")]
    );
}

#[test]
fn find_resources_errors_when_nothing_is_visible() {
    let reg = registry();
    let b = module().exports("b", "1.0.0").add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    assert!(search.find_resources(b, "nope.txt").is_err());
}

#[test]
fn find_library_matches_declared_and_mapped_names() {
    let reg = registry();
    let b = module()
        .exports("b", "1.0.0")
        .native_library("native/libcrypt.so", "content/native/libcrypt.so")
        .add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    assert_eq!(
        search.find_library(b, "crypt").as_deref(),
        Some("content/native/libcrypt.so")
    );
    assert!(search.find_library(b, "other").is_none());
}

#[test]
fn define_package_reads_definition_headers() {
    let reg = registry();
    let b = module()
        .exports("p", "1.0.0")
        .header("Specification-Title", "Example API")
        .header("Specification-Version", "1.0")
        .header("Sealed", "true")
        .add_to(&reg);
    let search = policy(&reg, &RecordingHost::new());

    let attrs = search.define_package(b, "p").unwrap();
    assert_eq!(attrs.spec_title.as_deref(), Some("Example API"));
    assert_eq!(attrs.spec_version.as_deref(), Some("1.0"));
    assert!(attrs.sealed);
    assert!(attrs.impl_title.is_none());
}
