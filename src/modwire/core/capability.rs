//! The capability / requirement value model.
//!
//! A module's definition is a list of capabilities it provides and
//! requirements it needs. Both come in two namespaces: `package` (exported /
//! imported packages) and `module` (provided / required module identities).
//! Requirements select capabilities through an LDAP-style [`Filter`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::core::filter::Filter;
use crate::core::interning::InternedString;
use crate::core::version::Version;
use crate::util::errors::InvalidFilterError;

/// Capability and requirement namespaces.
///
/// Future namespaces add variants here rather than subtypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Package,
    Module,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Package => write!(f, "package"),
            Namespace::Module => write!(f, "module"),
        }
    }
}

/// Well-known attribute keys.
pub mod attrs {
    pub const PACKAGE: &str = "package";
    pub const MODULE: &str = "module";
    pub const VERSION: &str = "version";
}

/// An attribute value. Filter comparisons are version-aware for
/// `Value::Version` attributes and plain string comparisons otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(InternedString),
    Version(Version),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Version(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug)]
struct CapabilityInner {
    namespace: Namespace,
    /// Position within the owning definition; capability identity is
    /// `(module, index)`.
    index: usize,
    properties: IndexMap<InternedString, Value>,
    uses: Vec<InternedString>,
}

/// An offer made by a module: an exported package or a provided module
/// identity. Immutable and cheap to clone.
#[derive(Clone, Debug)]
pub struct Capability {
    inner: Arc<CapabilityInner>,
}

impl Capability {
    /// Starts a `package` capability: `package=name`, `version=version`.
    pub fn package(name: &str, version: Version) -> CapabilityBuilder {
        let mut properties = IndexMap::new();
        properties.insert(
            InternedString::new(attrs::PACKAGE),
            Value::Str(InternedString::new(name)),
        );
        properties.insert(InternedString::new(attrs::VERSION), Value::Version(version));
        CapabilityBuilder {
            namespace: Namespace::Package,
            properties,
            uses: Vec::new(),
        }
    }

    /// Starts a `module` capability: `module=name`, `version=version`.
    pub fn module(name: &str, version: Version) -> CapabilityBuilder {
        let mut properties = IndexMap::new();
        properties.insert(
            InternedString::new(attrs::MODULE),
            Value::Str(InternedString::new(name)),
        );
        properties.insert(InternedString::new(attrs::VERSION), Value::Version(version));
        CapabilityBuilder {
            namespace: Namespace::Module,
            properties,
            uses: Vec::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.inner.namespace
    }

    /// Position within the owning definition.
    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn properties(&self) -> &IndexMap<InternedString, Value> {
        &self.inner.properties
    }

    /// The ordered `uses` constraint list (possibly empty).
    pub fn uses(&self) -> &[InternedString] {
        &self.inner.uses
    }

    /// The `package` attribute, for package-namespace capabilities.
    pub fn package_name(&self) -> Option<InternedString> {
        match self.inner.properties.get(attrs::PACKAGE) {
            Some(Value::Str(name)) => Some(*name),
            _ => None,
        }
    }

    /// The `module` attribute, for module-namespace capabilities.
    pub fn module_name(&self) -> Option<InternedString> {
        match self.inner.properties.get(attrs::MODULE) {
            Some(Value::Str(name)) => Some(*name),
            _ => None,
        }
    }

    pub fn version(&self) -> Version {
        match self.inner.properties.get(attrs::VERSION) {
            Some(Value::Version(v)) => *v,
            _ => Version::zero(),
        }
    }

    /// Whether this capability satisfies `requirement`: same namespace and
    /// the requirement's filter accepts the property map.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.inner.namespace == requirement.namespace()
            && requirement.filter().matches(&self.inner.properties)
    }

    pub(crate) fn reindexed(&self, index: usize) -> Capability {
        Capability {
            inner: Arc::new(CapabilityInner {
                namespace: self.inner.namespace,
                index,
                properties: self.inner.properties.clone(),
                uses: self.inner.uses.clone(),
            }),
        }
    }
}

/// Capability identity is positional: same definition slot.
impl PartialEq for Capability {
    fn eq(&self, other: &Capability) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.namespace == other.inner.namespace
                && self.inner.index == other.inner.index
                && self.inner.properties == other.inner.properties)
    }
}

impl Eq for Capability {}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.namespace {
            Namespace::Package => write!(
                f,
                "package {}; version {}",
                self.package_name()
                    .unwrap_or_else(|| InternedString::new("<unnamed>")),
                self.version()
            ),
            Namespace::Module => write!(
                f,
                "module {}; version {}",
                self.module_name()
                    .unwrap_or_else(|| InternedString::new("<unnamed>")),
                self.version()
            ),
        }
    }
}

pub struct CapabilityBuilder {
    namespace: Namespace,
    properties: IndexMap<InternedString, Value>,
    uses: Vec<InternedString>,
}

impl CapabilityBuilder {
    pub fn attribute(mut self, key: &str, value: Value) -> CapabilityBuilder {
        self.properties.insert(InternedString::new(key), value);
        self
    }

    pub fn uses<'a>(mut self, packages: impl IntoIterator<Item = &'a str>) -> CapabilityBuilder {
        self.uses
            .extend(packages.into_iter().map(InternedString::new));
        self
    }

    pub fn build(self) -> Capability {
        Capability {
            inner: Arc::new(CapabilityInner {
                namespace: self.namespace,
                // Real index assigned when the definition is built.
                index: usize::MAX,
                properties: self.properties,
                uses: self.uses,
            }),
        }
    }
}

#[derive(Debug)]
struct RequirementInner {
    namespace: Namespace,
    filter: Filter,
    optional: bool,
    dynamic: bool,
    /// Extracted `(package=..)` literal; may be `*` or a `p.*` wildcard for
    /// dynamic-only requirements.
    target: Option<InternedString>,
}

/// A demand made by a module, expressed as a filter over capability
/// properties. Immutable and cheap to clone.
#[derive(Clone, Debug)]
pub struct Requirement {
    inner: Arc<RequirementInner>,
}

impl Requirement {
    pub fn new(namespace: Namespace, filter: Filter) -> Requirement {
        let target = filter.target_package();
        Requirement {
            inner: Arc::new(RequirementInner {
                namespace,
                filter,
                optional: false,
                dynamic: false,
                target,
            }),
        }
    }

    /// Parses `expr` as a filter and builds a requirement in `namespace`.
    pub fn parse(namespace: Namespace, expr: &str) -> Result<Requirement, InvalidFilterError> {
        Ok(Requirement::new(namespace, expr.parse()?))
    }

    pub fn optional(self) -> Requirement {
        self.rebuild(|inner| inner.optional = true)
    }

    pub fn dynamic(self) -> Requirement {
        self.rebuild(|inner| inner.dynamic = true)
    }

    fn rebuild(self, f: impl FnOnce(&mut RequirementInner)) -> Requirement {
        let mut inner = RequirementInner {
            namespace: self.inner.namespace,
            filter: self.inner.filter.clone(),
            optional: self.inner.optional,
            dynamic: self.inner.dynamic,
            target: self.inner.target,
        };
        f(&mut inner);
        Requirement {
            inner: Arc::new(inner),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.inner.namespace
    }

    pub fn filter(&self) -> &Filter {
        &self.inner.filter
    }

    pub fn is_optional(&self) -> bool {
        self.inner.optional
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.dynamic
    }

    /// The package name this requirement targets, as written in the filter.
    pub fn target_package(&self) -> Option<InternedString> {
        self.inner.target
    }

    /// Whether a dynamic-requirement pattern covers `pkg`: the target is
    /// `*`, equals `pkg`, or is a `p.*` wildcard with `pkg` equal to `p` or
    /// underneath it.
    pub fn covers_dynamic(&self, pkg: &str) -> bool {
        let target = match self.inner.target {
            Some(t) => t,
            None => return false,
        };
        if target.as_str() == "*" {
            return true;
        }
        if let Some(prefix) = target.as_str().strip_suffix(".*") {
            return pkg == prefix || pkg.starts_with(&format!("{}.", prefix));
        }
        target.as_str() == pkg
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requirement {}", self.inner.namespace, self.inner.filter)?;
        if self.inner.optional {
            write!(f, " (optional)")?;
        }
        if self.inner.dynamic {
            write!(f, " (dynamic)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_satisfies_requirement() {
        let cap = Capability::package("org.example.api", "1.2.0".parse().unwrap()).build();
        let req =
            Requirement::parse(Namespace::Package, "(&(package=org.example.api)(version>=1.0.0))")
                .unwrap();
        assert!(cap.satisfies(&req));

        let too_new = Requirement::parse(
            Namespace::Package,
            "(&(package=org.example.api)(version>=2.0.0))",
        )
        .unwrap();
        assert!(!cap.satisfies(&too_new));

        // Namespace mismatch never satisfies, filter match or not.
        let module_req = Requirement::parse(Namespace::Module, "(package=org.example.api)").unwrap();
        assert!(!cap.satisfies(&module_req));
    }

    #[test]
    fn dynamic_pattern_coverage() {
        let any = Requirement::parse(Namespace::Package, "(package=*)")
            .unwrap()
            .dynamic();
        assert!(any.covers_dynamic("anything.at.all"));

        let exact = Requirement::parse(Namespace::Package, "(package=p.q)")
            .unwrap()
            .dynamic();
        assert!(exact.covers_dynamic("p.q"));
        assert!(!exact.covers_dynamic("p.q.r"));

        let prefix = Requirement::parse(Namespace::Package, "(package=p.*)")
            .unwrap()
            .dynamic();
        assert!(prefix.covers_dynamic("p"));
        assert!(prefix.covers_dynamic("p.q"));
        assert!(prefix.covers_dynamic("p.q.r"));
        assert!(!prefix.covers_dynamic("pq"));
    }

    #[test]
    fn uses_are_ordered() {
        let cap = Capability::package("p", Version::new(1, 0, 0))
            .uses(["q", "r", "q"])
            .build();
        let names: Vec<_> = cap.uses().iter().map(|u| u.as_str()).collect();
        assert_eq!(names, ["q", "r", "q"]);
    }
}
