//! Candidate selection: which capabilities could satisfy a requirement.
//!
//! Two pools exist. In-use capabilities are commitments already visible to
//! the running system; reusing them avoids multiplying class-space source
//! sets. Unused candidates are consulted when no in-use option exists or
//! when only combining them yields a consistent configuration, so the
//! in-use pool always sorts ahead of the unused one.

use tracing::debug;

use crate::core::capability::Requirement;
use crate::core::registry::RegistryState;
use crate::core::resolver::types::PackageSource;

/// Every in-use capability satisfying `requirement`, in `PackageSource`
/// order. Candidates whose exporter is denied the corresponding package
/// export by its security context are dropped; denials are logged and
/// otherwise invisible.
pub(crate) fn in_use_candidates(
    state: &RegistryState,
    requirement: &Requirement,
) -> Vec<PackageSource> {
    let mut candidates = Vec::new();
    for (module, caps) in state.in_use_iter() {
        for capability in caps {
            if !capability.satisfies(requirement) {
                continue;
            }
            if let Some(package) = capability.package_name() {
                if !state.export_permitted(module, package) {
                    debug!(
                        "module {} denied export permission for `{}`; candidate dropped",
                        module, package
                    );
                    continue;
                }
            }
            candidates.push(PackageSource::new(module, capability.clone()));
        }
    }
    candidates.sort();
    candidates
}

/// Every capability satisfying `requirement` that is not already in use by
/// its owning module, in `PackageSource` order.
pub(crate) fn unused_candidates(
    state: &RegistryState,
    requirement: &Requirement,
) -> Vec<PackageSource> {
    let mut candidates = Vec::new();
    for (module, entry) in state.modules_iter() {
        let in_use = state.in_use(module);
        for capability in entry.definition().capabilities() {
            if capability.satisfies(requirement) && !in_use.contains(capability) {
                candidates.push(PackageSource::new(module, capability.clone()));
            }
        }
    }
    candidates.sort();
    candidates
}
