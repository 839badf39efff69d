//! Resolution of module requirements into committed wires.
//!
//! Resolving a module means choosing, for every requirement of the module
//! and of everything it transitively pulls in, one providing capability
//! such that the resulting class space is consistent: every package visible
//! from any covered module has exactly one provenance, and every transitive
//! `uses` constraint is honored.
//!
//! The search runs in three phases under the registry-wide factory lock:
//!
//! 1. **Populate** — a depth-first traversal builds one [`CandidateSet`]
//!    per requirement, in-use candidates sorting ahead of unused ones.
//! 2. **Search** — the candidate configuration is tested for class-space
//!    consistency; on conflict the per-set selection indexes advance like
//!    an odometer over the flat, deterministic sequence of all sets.
//! 3. **Commit** — the chosen configuration becomes wires; covered modules
//!    are marked resolved and their exported capabilities move into the
//!    in-use index.
//!
//! The space of configurations is combinatorial, so like any such search
//! this is worst-case exponential; the version-descending candidate order
//! makes the first configuration the right one in the common case.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::core::capability::{Namespace, Requirement};
use crate::core::module::ModuleId;
use crate::core::registry::{promote_in_use, RegistryState};

pub use self::errors::ResolveError;
pub use self::types::{CandidateSet, PackageMap, PackageSource, ResolvedPackage, Wire};

use self::candidates::{in_use_candidates, unused_candidates};
use self::consistency::{flattened_exports, ClassSpace};

pub(crate) mod candidates;
pub(crate) mod consistency;
pub mod errors;
pub mod types;

/// Candidate sets per module, in population order. The odometer treats the
/// flattened sequence of all sets as one positional counter, which makes
/// the configuration search total and deterministic.
pub(crate) type ResolverMap = IndexMap<ModuleId, Vec<CandidateSet>>;

/// Resolves `root` and commits wires for every module the resolution
/// covered. Returns the newly resolved modules in commit order so the
/// caller can fire events after releasing the factory lock.
///
/// Fails fast (with an empty result) when `root` is already resolved.
pub(crate) fn resolve_locked(
    state: &mut RegistryState,
    root: ModuleId,
) -> Result<Vec<ModuleId>, ResolveError> {
    if !state.contains(root) {
        return Err(ResolveError::unknown_module(root));
    }
    if state.is_resolved(root) {
        return Ok(Vec::new());
    }

    // Phase A: build the candidate-set graph.
    let mut rmap = ResolverMap::new();
    populate(state, root, &mut rmap)?;
    prune_dangling(state, root, &mut rmap)?;

    // Phase B: walk candidate configurations until one yields a consistent
    // class space for every module the configuration would commit, not
    // just the root; a dependency can carry a conflict the root's own
    // package view never reaches. Memoization caches live in the
    // per-iteration ClassSpace.
    loop {
        let verdict = {
            let mut space = ClassSpace::new(state, &rmap);
            reachable(state, &rmap, root)
                .into_iter()
                .try_for_each(|module| space.check(module))
        };
        match verdict {
            Ok(()) => break,
            Err(violation) => {
                trace!("configuration inconsistent: {}", violation);
                if !advance(&mut rmap) {
                    return Err(ResolveError::constraint_violation(
                        root,
                        violation.package(),
                    ));
                }
            }
        }
    }

    // Phase C: commit wires for the chosen configuration.
    let mut wire_map: IndexMap<ModuleId, Vec<Wire>> = IndexMap::new();
    build_wire_map(state, &rmap, root, &mut wire_map);

    let mut newly_resolved = Vec::with_capacity(wire_map.len());
    for (module, wires) in wire_map {
        debug!("module {} resolved with {} wire(s)", module, wires.len());
        promote_in_use(state, module, &wires);
        state.set_wires(module, wires);
        state.set_resolved(module);
        newly_resolved.push(module);
    }
    Ok(newly_resolved)
}

/// Depth-first candidate population rooted at `module`. Presence as a key
/// in `rmap` is the cycle guard, so the module registers itself before
/// recursing into candidates.
fn populate(
    state: &RegistryState,
    module: ModuleId,
    rmap: &mut ResolverMap,
) -> Result<(), ResolveError> {
    if rmap.contains_key(&module) {
        return Ok(());
    }
    rmap.insert(module, Vec::new());

    let definition = state
        .definition(module)
        .ok_or_else(|| ResolveError::unknown_module(module))?;

    let mut sets = Vec::new();
    for requirement in definition.requirements() {
        // In-use candidates sort ahead of unused ones.
        let mut candidates: Vec<Option<PackageSource>> =
            in_use_candidates(state, requirement)
                .into_iter()
                .chain(unused_candidates(state, requirement))
                .map(Some)
                .collect();
        trace!(
            "module {}: {} candidate(s) for {}",
            module,
            candidates.len(),
            requirement
        );

        let mut last_error = None;
        for slot in candidates.iter_mut() {
            let candidate = slot.as_ref().unwrap();
            if !state.is_resolved(candidate.module()) {
                if let Err(error) = populate(state, candidate.module(), rmap) {
                    trace!("candidate {} dropped: {}", candidate, error);
                    last_error = Some(error);
                    *slot = None;
                }
            }
        }
        let candidates: Vec<PackageSource> = candidates.into_iter().flatten().collect();

        if candidates.is_empty() {
            if requirement.is_optional() {
                continue;
            }
            // The module is unresolvable; leaving its partial entry behind
            // would let later requirements treat it as populated.
            rmap.shift_remove(&module);
            return Err(last_error
                .unwrap_or_else(|| ResolveError::unresolved_requirement(module, requirement)));
        }
        sets.push(CandidateSet::new(module, requirement.clone(), candidates));
    }

    *rmap.get_mut(&module).unwrap() = sets;
    Ok(())
}

/// Candidate sets built while a module was still on the population stack
/// can reference a module that subsequently failed to populate. Drop such
/// candidates, cascading the failure to any module (and ultimately the
/// root) left without a provider for a mandatory requirement, so the
/// commit phase can never select an unpopulatable module.
fn prune_dangling(
    state: &RegistryState,
    root: ModuleId,
    rmap: &mut ResolverMap,
) -> Result<(), ResolveError> {
    loop {
        let live: HashSet<ModuleId> = rmap.keys().copied().collect();
        let mut failed: Option<(ModuleId, Requirement)> = None;
        for (module, sets) in rmap.iter_mut() {
            let mut emptied = None;
            for set in sets.iter_mut() {
                let survives = set.retain(|candidate| {
                    state.is_resolved(candidate.module()) || live.contains(&candidate.module())
                });
                if !survives && !set.requirement().is_optional() {
                    emptied = Some(set.requirement().clone());
                    break;
                }
            }
            sets.retain(|set| !set.candidates().is_empty());
            if let Some(requirement) = emptied {
                failed = Some((*module, requirement));
                break;
            }
        }
        match failed {
            Some((module, requirement)) => {
                let error = ResolveError::unresolved_requirement(module, &requirement);
                if module == root {
                    return Err(error);
                }
                trace!("pruning {}: {}", module, error);
                rmap.shift_remove(&module);
            }
            None => return Ok(()),
        }
    }
}

/// The unresolved modules the current selection would commit: root plus
/// everything reachable through selected candidates.
fn reachable(state: &RegistryState, rmap: &ResolverMap, root: ModuleId) -> Vec<ModuleId> {
    let mut covered = Vec::new();
    let mut stack = vec![root];
    let mut seen = HashSet::new();
    while let Some(module) = stack.pop() {
        if state.is_resolved(module) || !seen.insert(module) {
            continue;
        }
        covered.push(module);
        if let Some(sets) = rmap.get(&module) {
            for set in sets {
                stack.push(set.selected().module());
            }
        }
    }
    covered
}

/// Advances the candidate configuration one step: the first set (in flat
/// order) that can move does, and every earlier set resets to its first
/// candidate. Returns false when the configuration space is exhausted.
fn advance(rmap: &mut ResolverMap) -> bool {
    let mut pivot = None;
    let mut flat = 0;
    'scan: for sets in rmap.values() {
        for set in sets {
            if set.can_advance() {
                pivot = Some(flat);
                break 'scan;
            }
            flat += 1;
        }
    }
    let pivot = match pivot {
        Some(pivot) => pivot,
        None => return false,
    };

    let mut flat = 0;
    for sets in rmap.values_mut() {
        for set in sets.iter_mut() {
            if flat < pivot {
                set.reset();
            } else {
                set.advance();
                return true;
            }
            flat += 1;
        }
    }
    unreachable!("pivot index out of range");
}

/// Builds the wires of every unresolved module reachable from `module`
/// under the chosen configuration. Each visited module is recorded in the
/// wire map up-front so cycles short-circuit. Module wires are appended
/// after all package wires of the same importer so package lookups see
/// direct imports first.
fn build_wire_map(
    state: &RegistryState,
    rmap: &ResolverMap,
    module: ModuleId,
    wire_map: &mut IndexMap<ModuleId, Vec<Wire>>,
) {
    if state.is_resolved(module) || wire_map.contains_key(&module) {
        return;
    }
    wire_map.insert(module, Vec::new());

    let mut package_wires = Vec::new();
    let mut module_wires = Vec::new();
    for set in &rmap[&module] {
        let source = set.selected();
        build_wire_map(state, rmap, source.module(), wire_map);
        match set.requirement().namespace() {
            Namespace::Package => {
                package_wires.push(Wire::package(module, source.clone()));
            }
            Namespace::Module => {
                let packages =
                    flattened_exports(state, rmap, source.module(), &mut HashSet::new());
                module_wires.push(Wire::module(module, source.clone(), packages));
            }
        }
    }
    package_wires.extend(module_wires);
    *wire_map.get_mut(&module).unwrap() = package_wires;
}

/// Attempts a dynamic package import for `importer` under the factory
/// lock: the first matching dynamic pattern whose conjoined filter finds a
/// usable candidate yields a new package wire. Individual candidate
/// failures are swallowed. Returns the wire plus any modules resolved on
/// the way, in commit order.
pub(crate) fn dynamic_import_locked(
    state: &mut RegistryState,
    importer: ModuleId,
    pkg: &str,
) -> Option<(Wire, Vec<ModuleId>)> {
    // Only reachable without an existing wire for the package.
    if state.wires(importer).iter().any(|wire| wire.covers(pkg)) {
        return None;
    }
    let definition = state.definition(importer)?;

    for pattern in definition.dynamic_requirements() {
        if !pattern.covers_dynamic(pkg) {
            continue;
        }
        let filter = pattern.filter().pinned_to_package(pkg);
        let requirement = Requirement::new(Namespace::Package, filter);

        let mut newly_resolved = Vec::new();
        let mut chosen = in_use_candidates(state, &requirement).into_iter().next();
        if chosen.is_none() {
            for candidate in unused_candidates(state, &requirement) {
                match resolve_locked(state, candidate.module()) {
                    Ok(resolved) => {
                        newly_resolved.extend(resolved);
                        chosen = Some(candidate);
                        break;
                    }
                    Err(error) => {
                        debug!(
                            "dynamic import of `{}`: candidate {} failed: {}",
                            pkg, candidate, error
                        );
                    }
                }
            }
        }

        if let Some(source) = chosen {
            let wire = Wire::package(importer, source.clone());
            debug!("dynamic import attached {}", wire);
            state.append_wire(importer, wire.clone());
            state.add_in_use(source.module(), source.capability().clone());
            return Some((wire, newly_resolved));
        }
    }
    None
}
