//! Value types shared by the resolver, the consistency checker and the
//! search policy: package sources, resolved packages, candidate sets and
//! wires.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;

use crate::core::capability::{Capability, Requirement};
use crate::core::interning::InternedString;
use crate::core::module::ModuleId;

/// A package name mapped to every source it is visible from. Keyed maps of
/// these describe a module's whole class space.
pub type PackageMap = IndexMap<InternedString, ResolvedPackage>;

/// One provider of a capability: the exporting module plus the capability
/// itself. Ordered by descending version, then ascending bundle id, so the
/// preferred candidate sorts first.
#[derive(Clone, Debug)]
pub struct PackageSource {
    module: ModuleId,
    capability: Capability,
}

impl PackageSource {
    pub fn new(module: ModuleId, capability: Capability) -> PackageSource {
        PackageSource { module, capability }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Identity key: owning module plus the capability's definition slot.
    pub(crate) fn key(&self) -> (ModuleId, usize) {
        (self.module, self.capability.index())
    }
}

impl PartialEq for PackageSource {
    fn eq(&self, other: &PackageSource) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PackageSource {}

impl std::hash::Hash for PackageSource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for PackageSource {
    fn cmp(&self, other: &PackageSource) -> Ordering {
        other
            .capability
            .version()
            .cmp(&self.capability.version())
            .then(self.module.bundle().cmp(&other.module.bundle()))
            .then_with(|| self.key().cmp(&other.key()))
    }
}

impl PartialOrd for PackageSource {
    fn partial_cmp(&self, other: &PackageSource) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module {} ({})", self.module, self.capability)
    }
}

/// A package name and the set of sources it is simultaneously visible from.
/// A single source means the package is imported; several mean it is
/// required through module wires.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPackage {
    name: InternedString,
    sources: Vec<PackageSource>,
}

impl ResolvedPackage {
    pub fn new(name: InternedString) -> ResolvedPackage {
        ResolvedPackage {
            name,
            sources: Vec::new(),
        }
    }

    pub fn from_source(name: InternedString, source: PackageSource) -> ResolvedPackage {
        ResolvedPackage {
            name,
            sources: vec![source],
        }
    }

    pub fn name(&self) -> InternedString {
        self.name
    }

    pub fn sources(&self) -> &[PackageSource] {
        &self.sources
    }

    pub fn add_source(&mut self, source: PackageSource) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    pub fn is_required(&self) -> bool {
        self.sources.len() > 1
    }

    fn is_subset_of(&self, other: &ResolvedPackage) -> bool {
        self.sources.iter().all(|s| other.sources.contains(s))
    }

    /// The compatibility relation of the uses checker: one source set must
    /// contain the other. Set equality is not demanded because required
    /// packages are legitimately multi-source.
    pub fn subset_comparable(&self, other: &ResolvedPackage) -> bool {
        self.is_subset_of(other) || other.is_subset_of(self)
    }

    /// Union of two compatible entries, preserving source order.
    pub fn merged(&self, other: &ResolvedPackage) -> ResolvedPackage {
        let mut merged = self.clone();
        for source in other.sources() {
            merged.add_source(source.clone());
        }
        merged
    }
}

/// The candidate providers for one requirement of one importer, plus the
/// index of the tentatively selected one. The resolver's configuration
/// search advances these indexes odometer-style.
#[derive(Debug)]
pub struct CandidateSet {
    module: ModuleId,
    requirement: Requirement,
    candidates: Vec<PackageSource>,
    idx: usize,
}

impl CandidateSet {
    pub fn new(
        module: ModuleId,
        requirement: Requirement,
        candidates: Vec<PackageSource>,
    ) -> CandidateSet {
        debug_assert!(!candidates.is_empty());
        CandidateSet {
            module,
            requirement,
            candidates,
            idx: 0,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn candidates(&self) -> &[PackageSource] {
        &self.candidates
    }

    pub fn selected(&self) -> &PackageSource {
        &self.candidates[self.idx]
    }

    /// Drops candidates rejected by `keep`; returns whether any survive.
    /// Only valid before the configuration search starts.
    pub(crate) fn retain(&mut self, keep: impl FnMut(&PackageSource) -> bool) -> bool {
        debug_assert_eq!(self.idx, 0);
        self.candidates.retain(keep);
        !self.candidates.is_empty()
    }

    pub fn can_advance(&self) -> bool {
        self.idx + 1 < self.candidates.len()
    }

    pub fn advance(&mut self) {
        self.idx += 1;
    }

    pub fn reset(&mut self) {
        self.idx = 0;
    }
}

/// A committed binding from one requirement of the importer to one
/// capability of the exporter.
#[derive(Clone, Debug)]
pub struct Wire {
    importer: ModuleId,
    exporter: ModuleId,
    capability: Capability,
    kind: WireKind,
}

#[derive(Clone, Debug)]
enum WireKind {
    /// Resolves a single package requirement.
    Package,
    /// Resolves a require-module dependency; carries the package set
    /// transitively exported through the required module.
    Module { packages: PackageMap },
}

impl Wire {
    pub fn package(importer: ModuleId, source: PackageSource) -> Wire {
        Wire {
            importer,
            exporter: source.module(),
            capability: source.capability().clone(),
            kind: WireKind::Package,
        }
    }

    pub fn module(importer: ModuleId, source: PackageSource, packages: PackageMap) -> Wire {
        Wire {
            importer,
            exporter: source.module(),
            capability: source.capability().clone(),
            kind: WireKind::Module { packages },
        }
    }

    pub fn importer(&self) -> ModuleId {
        self.importer
    }

    pub fn exporter(&self) -> ModuleId {
        self.exporter
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn is_package_wire(&self) -> bool {
        matches!(self.kind, WireKind::Package)
    }

    /// The package this wire resolves, for package wires.
    pub fn package_name(&self) -> Option<InternedString> {
        match self.kind {
            WireKind::Package => self.capability.package_name(),
            WireKind::Module { .. } => None,
        }
    }

    /// The flattened package map, for module wires.
    pub fn packages(&self) -> Option<&PackageMap> {
        match &self.kind {
            WireKind::Package => None,
            WireKind::Module { packages } => Some(packages),
        }
    }

    /// Whether a lookup in `pkg` should consult this wire.
    pub fn covers(&self, pkg: &str) -> bool {
        match &self.kind {
            WireKind::Package => self
                .capability
                .package_name()
                .map(|name| name.as_str() == pkg)
                .unwrap_or(false),
            WireKind::Module { packages } => packages.contains_key(pkg),
        }
    }

    /// The sources a covered package can be served from, in map order.
    pub fn package_sources(&self, pkg: &str) -> &[PackageSource] {
        match &self.kind {
            WireKind::Package => &[],
            WireKind::Module { packages } => packages
                .get(pkg)
                .map(|rp| rp.sources())
                .unwrap_or(&[]),
        }
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wire {} -> [{}] -> {}",
            self.importer, self.capability, self.exporter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capability::Capability;

    fn source(bundle: u64, pkg: &str, version: &str) -> PackageSource {
        let cap = Capability::package(pkg, version.parse().unwrap()).build();
        PackageSource::new(ModuleId::new(bundle, 0), cap.reindexed(0))
    }

    #[test]
    fn source_ordering_prefers_high_version_then_low_bundle() {
        let mut sources = vec![
            source(4, "p", "1.0.0"),
            source(2, "p", "1.1.0"),
            source(3, "p", "1.1.0"),
            source(1, "p", "0.9.0"),
        ];
        sources.sort();
        let order: Vec<u64> = sources.iter().map(|s| s.module().bundle()).collect();
        assert_eq!(order, [2, 3, 4, 1]);
    }

    #[test]
    fn subset_comparability() {
        let name = InternedString::new("p");
        let a = ResolvedPackage::from_source(name, source(1, "p", "1.0.0"));
        let mut ab = a.clone();
        ab.add_source(source(2, "p", "1.0.0"));
        let c = ResolvedPackage::from_source(name, source(3, "p", "1.0.0"));

        assert!(a.subset_comparable(&ab));
        assert!(ab.subset_comparable(&a));
        assert!(!a.subset_comparable(&c));

        let merged = a.merged(&ab);
        assert_eq!(merged.sources().len(), 2);
        assert!(merged.is_required());
    }

    #[test]
    fn candidate_set_odometer_steps() {
        let req = crate::core::capability::Requirement::parse(
            crate::core::capability::Namespace::Package,
            "(package=p)",
        )
        .unwrap();
        let mut set = CandidateSet::new(
            ModuleId::new(9, 0),
            req,
            vec![source(1, "p", "2.0.0"), source(2, "p", "1.0.0")],
        );
        assert_eq!(set.selected().module().bundle(), 1);
        assert!(set.can_advance());
        set.advance();
        assert_eq!(set.selected().module().bundle(), 2);
        assert!(!set.can_advance());
        set.reset();
        assert_eq!(set.selected().module().bundle(), 1);
    }
}
