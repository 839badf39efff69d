//! Shared infrastructure for the resolver test suites: a module DSL,
//! content/host fakes, a generator of random registries for the property
//! tests, and an independent validator for the transitive uses invariant.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use modwire::core::capability::Namespace;
use modwire::core::module::ModuleId;
use modwire::core::registry::ModuleRegistry;
use modwire::core::resolver::types::PackageSource;

pub mod helpers;

use self::helpers::module;

/// One exported package of a generated module.
#[derive(Clone, Debug)]
pub struct ExportSpec {
    pub package: String,
    pub major: u64,
    pub uses: Vec<String>,
}

/// One package requirement of a generated module.
#[derive(Clone, Debug)]
pub struct RequireSpec {
    pub package: String,
    pub min_major: u64,
    pub optional: bool,
}

#[derive(Clone, Debug)]
pub struct ModuleSpec {
    pub exports: Vec<ExportSpec>,
    pub requires: Vec<RequireSpec>,
}

const PACKAGE_POOL: [&str; 5] = ["p0", "p1", "p2", "p3", "p4"];

/// Generates registries of up to `max_modules` modules exporting and
/// requiring packages from a small pool, with occasional uses constraints
/// and optional requirements. Small enough that resolution always
/// terminates quickly, adversarial enough to exercise backtracking.
pub fn registry_strategy(max_modules: usize) -> impl Strategy<Value = Vec<ModuleSpec>> {
    let export = (0usize..PACKAGE_POOL.len(), 1u64..=3, prop::collection::vec(0usize..PACKAGE_POOL.len(), 0..2))
        .prop_map(|(pkg, major, uses)| ExportSpec {
            package: PACKAGE_POOL[pkg].to_string(),
            major,
            uses: uses.into_iter().map(|u| PACKAGE_POOL[u].to_string()).collect(),
        });
    let require = (0usize..PACKAGE_POOL.len(), 1u64..=3, any::<bool>()).prop_map(
        |(pkg, min_major, optional)| RequireSpec {
            package: PACKAGE_POOL[pkg].to_string(),
            min_major,
            optional,
        },
    );
    let module_spec = (
        prop::collection::vec(export, 0..3),
        prop::collection::vec(require, 0..3),
    )
        .prop_map(|(mut exports, mut requires)| {
            // One export and one requirement per package name keeps every
            // definition well-formed.
            exports.sort_by(|a, b| a.package.cmp(&b.package));
            exports.dedup_by(|a, b| a.package == b.package);
            requires.sort_by(|a, b| a.package.cmp(&b.package));
            requires.dedup_by(|a, b| a.package == b.package);
            ModuleSpec { exports, requires }
        });
    prop::collection::vec(module_spec, 1..=max_modules)
}

/// Materializes specs into a registry; module ids come back in spec order.
pub fn build_registry(specs: &[ModuleSpec]) -> (Arc<ModuleRegistry>, Vec<ModuleId>) {
    let registry = helpers::registry();
    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut builder = module();
        for export in &spec.exports {
            let uses: Vec<&str> = export.uses.iter().map(String::as_str).collect();
            builder = builder.exports_with_uses(
                &export.package,
                &format!("{}.0.0", export.major),
                &uses,
            );
        }
        for require in &spec.requires {
            builder = if require.optional {
                builder.imports_optionally(&require.package)
            } else {
                builder.imports_versioned(&require.package, &format!("{}.0.0", require.min_major))
            };
        }
        ids.push(builder.add_to(&registry));
    }
    (registry, ids)
}

/// A stable textual rendering of every wire in the registry, in module
/// order. Equal fingerprints mean equal wirings.
pub fn wire_fingerprint(registry: &ModuleRegistry, modules: &[ModuleId]) -> Vec<String> {
    let mut fingerprint = Vec::new();
    for module in modules {
        for wire in registry.wires(*module).iter() {
            fingerprint.push(wire.to_string());
        }
    }
    fingerprint
}

fn source_key(source: &PackageSource) -> (u64, u32, usize) {
    (
        source.module().bundle(),
        source.module().revision(),
        source.capability().index(),
    )
}

type SourceSet = HashSet<(u64, u32, usize)>;

/// A module's package map recomputed from its committed wires and its own
/// exports: module-wire packages unioned, own exports unioned, package
/// wires overwriting.
fn committed_package_map(
    registry: &ModuleRegistry,
    module: ModuleId,
) -> HashMap<String, (SourceSet, Vec<PackageSource>)> {
    let mut map: HashMap<String, (SourceSet, Vec<PackageSource>)> = HashMap::new();
    let mut union = |map: &mut HashMap<String, (SourceSet, Vec<PackageSource>)>,
                     pkg: String,
                     source: PackageSource| {
        let entry = map.entry(pkg).or_default();
        if entry.0.insert(source_key(&source)) {
            entry.1.push(source);
        }
    };

    let wires = registry.wires(module);
    for wire in wires.iter() {
        if let Some(packages) = wire.packages() {
            for (pkg, resolved) in packages {
                for source in resolved.sources() {
                    union(&mut map, pkg.to_string(), source.clone());
                }
            }
        }
    }
    if let Some(definition) = registry.definition(module) {
        for capability in definition.capabilities() {
            if capability.namespace() == Namespace::Package {
                if let Some(pkg) = capability.package_name() {
                    union(
                        &mut map,
                        pkg.to_string(),
                        PackageSource::new(module, capability.clone()),
                    );
                }
            }
        }
    }
    for wire in wires.iter() {
        if let Some(pkg) = wire.package_name() {
            let source = PackageSource::new(wire.exporter(), wire.capability().clone());
            map.insert(
                pkg.to_string(),
                (HashSet::from([source_key(&source)]), vec![source]),
            );
        }
    }
    map
}

/// Independently re-derives the transitive uses constraints of every
/// resolved module from the committed wires and checks that each
/// constrained package's source set is subset-comparable with the module's
/// own view. Mirrors the invariant the resolver is supposed to enforce,
/// computed a second way.
pub fn check_uses_closure(
    registry: &ModuleRegistry,
    modules: &[ModuleId],
) -> Result<(), String> {
    let mut maps: HashMap<ModuleId, HashMap<String, (SourceSet, Vec<PackageSource>)>> =
        HashMap::new();
    for module in modules {
        if registry.is_resolved(*module) {
            maps.insert(*module, committed_package_map(registry, *module));
        }
    }

    for (module, own_map) in &maps {
        let mut constraints: HashMap<String, SourceSet> = HashMap::new();
        let mut visited: HashSet<(u64, u32, usize)> = HashSet::new();
        let mut queue: Vec<PackageSource> = own_map
            .values()
            .flat_map(|(_, sources)| sources.iter().cloned())
            .collect();

        while let Some(source) = queue.pop() {
            if !visited.insert(source_key(&source)) {
                continue;
            }
            let source_map = maps
                .get(&source.module())
                .cloned()
                .unwrap_or_else(|| committed_package_map(registry, source.module()));
            for constrained in source.capability().uses() {
                if let Some((set, sources)) = source_map.get(constrained.as_str()) {
                    let entry = constraints.entry(constrained.to_string()).or_default();
                    if !entry.is_empty()
                        && !entry.is_subset(set)
                        && !set.is_subset(entry)
                    {
                        return Err(format!(
                            "module {}: incompatible uses sources for `{}`",
                            module, constrained
                        ));
                    }
                    entry.extend(set.iter().copied());
                    queue.extend(sources.iter().cloned());
                }
            }
        }

        for (pkg, constrained_set) in &constraints {
            if let Some((own_set, _)) = own_map.get(pkg) {
                if !own_set.is_subset(constrained_set) && !constrained_set.is_subset(own_set) {
                    return Err(format!(
                        "module {}: package `{}` visible from {:?} but constrained to {:?}",
                        module, pkg, own_set, constrained_set
                    ));
                }
            }
        }
    }
    Ok(())
}
