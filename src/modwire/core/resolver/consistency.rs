//! Class-space consistency checking.
//!
//! For a tentative candidate configuration the checker computes, per
//! module, the map of every package name to the sources it is visible from
//! (required packages flattened through module wires, own exports, then
//! imports overwriting both), then accumulates the transitive `uses`
//! constraints of the root's sources. A configuration is consistent when
//! every constrained package resolves to a source set subset-comparable
//! with the root's own view of that package.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::core::capability::Namespace;
use crate::core::interning::InternedString;
use crate::core::module::ModuleId;
use crate::core::registry::RegistryState;
use crate::core::resolver::types::{PackageMap, PackageSource, ResolvedPackage};
use crate::core::resolver::ResolverMap;

/// Two `uses` paths proposed genuinely incompatible sources for one
/// package. The resolver treats this as "advance the odometer".
#[derive(Debug)]
pub(crate) struct ConsistencyViolation {
    package: InternedString,
    reason: &'static str,
}

impl ConsistencyViolation {
    pub(crate) fn package(&self) -> InternedString {
        self.package
    }
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for package `{}`", self.reason, self.package)
    }
}

/// One consistency test over the current odometer position. Package maps
/// are memoised per instance; the resolver discards the instance (and with
/// it the caches) before advancing the configuration.
pub(crate) struct ClassSpace<'a> {
    state: &'a RegistryState,
    rmap: &'a ResolverMap,
    pkg_maps: HashMap<ModuleId, Rc<PackageMap>>,
}

impl<'a> ClassSpace<'a> {
    pub(crate) fn new(state: &'a RegistryState, rmap: &'a ResolverMap) -> ClassSpace<'a> {
        ClassSpace {
            state,
            rmap,
            pkg_maps: HashMap::new(),
        }
    }

    pub(crate) fn check(&mut self, root: ModuleId) -> Result<(), ConsistencyViolation> {
        let root_map = self.package_map(root);
        let mut uses_map = PackageMap::new();
        let mut visited = HashSet::new();
        for resolved_pkg in root_map.values() {
            for source in resolved_pkg.sources() {
                self.accumulate_uses(source, &mut uses_map, &mut visited)?;
            }
        }

        for (name, proposed) in uses_map.iter() {
            if let Some(actual) = root_map.get(name.as_str()) {
                if !actual.subset_comparable(proposed) {
                    trace!(
                        "uses conflict at module {} on `{}`: {} source(s) vs {} constrained",
                        root,
                        name,
                        actual.sources().len(),
                        proposed.sources().len()
                    );
                    return Err(ConsistencyViolation {
                        package: *name,
                        reason: "uses constraint conflict",
                    });
                }
            }
        }
        Ok(())
    }

    /// The module's ResolvedPackage map under the current configuration:
    /// required packages (flattened module wires), own exports, then
    /// imports overwriting both.
    pub(crate) fn package_map(&mut self, module: ModuleId) -> Rc<PackageMap> {
        if let Some(map) = self.pkg_maps.get(&module) {
            return map.clone();
        }

        let mut map = PackageMap::new();

        // Required packages.
        if self.state.is_resolved(module) {
            for wire in self.state.wires(module).iter() {
                if let Some(packages) = wire.packages() {
                    union_map(&mut map, packages);
                }
            }
        } else if let Some(sets) = self.rmap.get(&module) {
            for set in sets {
                if set.requirement().namespace() == Namespace::Module {
                    let flat = flattened_exports(
                        self.state,
                        self.rmap,
                        set.selected().module(),
                        &mut HashSet::new(),
                    );
                    union_map(&mut map, &flat);
                }
            }
        }

        // Exported packages.
        export_own_packages(self.state, module, &mut map);

        // Imported packages overwrite required/exported entries.
        if self.state.is_resolved(module) {
            for wire in self.state.wires(module).iter() {
                if let Some(name) = wire.package_name() {
                    let source = PackageSource::new(wire.exporter(), wire.capability().clone());
                    map.insert(name, ResolvedPackage::from_source(name, source));
                }
            }
        } else if let Some(sets) = self.rmap.get(&module) {
            for set in sets {
                if set.requirement().namespace() == Namespace::Package {
                    let source = set.selected();
                    if let Some(name) = source.capability().package_name() {
                        map.insert(name, ResolvedPackage::from_source(name, source.clone()));
                    }
                }
            }
        }

        let map = Rc::new(map);
        self.pkg_maps.insert(module, map.clone());
        map
    }

    /// Accumulates the uses constraints reachable from `source`. Memoised
    /// on the source to cut cycles. Two paths proposing entries for the
    /// same package are compatible iff one source set contains the other;
    /// compatibility widens the entry to their union.
    fn accumulate_uses(
        &mut self,
        source: &PackageSource,
        uses_map: &mut PackageMap,
        visited: &mut HashSet<(ModuleId, usize)>,
    ) -> Result<(), ConsistencyViolation> {
        if !visited.insert(source.key()) {
            return Ok(());
        }
        let source_map = self.package_map(source.module());
        let uses: Vec<InternedString> = source.capability().uses().to_vec();
        for constrained in uses {
            let proposed = match source_map.get(constrained.as_str()) {
                Some(rp) => rp.clone(),
                None => continue,
            };
            match uses_map.get(constrained.as_str()).cloned() {
                Some(existing) => {
                    if !existing.subset_comparable(&proposed) {
                        trace!(
                            "incompatible package sources for `{}` via uses of {}",
                            constrained,
                            source
                        );
                        return Err(ConsistencyViolation {
                            package: constrained,
                            reason: "incompatible package sources",
                        });
                    }
                    uses_map.insert(constrained, existing.merged(&proposed));
                }
                None => {
                    uses_map.insert(constrained, proposed.clone());
                }
            }
            for next in proposed.sources().to_vec() {
                self.accumulate_uses(&next, uses_map, visited)?;
            }
        }
        Ok(())
    }
}

/// The package set transitively exported through `module`: its own package
/// capabilities plus, assuming full re-export, everything flowing through
/// its required modules under the current configuration.
pub(crate) fn flattened_exports(
    state: &RegistryState,
    rmap: &ResolverMap,
    module: ModuleId,
    visited: &mut HashSet<ModuleId>,
) -> PackageMap {
    let mut map = PackageMap::new();
    if !visited.insert(module) {
        return map;
    }

    if state.is_resolved(module) {
        for wire in state.wires(module).iter() {
            if let Some(packages) = wire.packages() {
                union_map(&mut map, packages);
            }
        }
    } else if let Some(sets) = rmap.get(&module) {
        for set in sets {
            if set.requirement().namespace() == Namespace::Module {
                let sub = flattened_exports(state, rmap, set.selected().module(), visited);
                union_map(&mut map, &sub);
            }
        }
    }

    export_own_packages(state, module, &mut map);
    map
}

fn export_own_packages(state: &RegistryState, module: ModuleId, map: &mut PackageMap) {
    let definition = match state.definition(module) {
        Some(definition) => definition,
        None => return,
    };
    for capability in definition.capabilities() {
        if capability.namespace() != Namespace::Package {
            continue;
        }
        if let Some(name) = capability.package_name() {
            map.entry(name)
                .or_insert_with(|| ResolvedPackage::new(name))
                .add_source(PackageSource::new(module, capability.clone()));
        }
    }
}

fn union_map(map: &mut PackageMap, other: &PackageMap) {
    for (name, resolved_pkg) in other {
        match map.get_mut(name.as_str()) {
            Some(existing) => {
                for source in resolved_pkg.sources() {
                    existing.add_source(source.clone());
                }
            }
            None => {
                map.insert(*name, resolved_pkg.clone());
            }
        }
    }
}
