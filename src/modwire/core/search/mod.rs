//! The runtime search policy: locating classes and resources for a module.
//!
//! A lookup walks boot delegation, then the module's static wires, then its
//! own content, then dynamic import, resolving the module on first use. The
//! wiring gives every visible package exactly one provenance, so a covering
//! package wire answers definitively, hit or miss.

use std::sync::Arc;

use tracing::trace;
use url::Url;

use crate::core::module::{CallerKind, Class, ContentLoader, HostLoader, ModuleId, NativeLibrary};
use crate::core::registry::ModuleRegistry;
use crate::core::resolver::types::Wire;
use crate::util::errors::{ClassNotFoundError, ResourceNotFoundError};

mod diagnostics;

/// Configuration property naming the boot-delegated package patterns.
pub const BOOT_DELEGATION_PROP: &str = "framework.bootdelegation";
/// Configuration property naming the host's own exported packages;
/// informational, surfaced in diagnostics only.
pub const SYSTEM_PACKAGES_PROP: &str = "framework.systempackages";

/// One boot-delegation pattern: an exact package name, or a prefix ending
/// in `*`.
#[derive(Clone, Debug)]
struct BootPattern {
    prefix: String,
    wildcard: bool,
}

impl BootPattern {
    fn parse(pattern: &str) -> BootPattern {
        match pattern.strip_suffix('*') {
            Some(prefix) => BootPattern {
                prefix: prefix.to_string(),
                wildcard: true,
            },
            None => BootPattern {
                prefix: pattern.to_string(),
                wildcard: false,
            },
        }
    }

    /// A wildcard pattern matches the prefix itself without its trailing
    /// dot, so `java.*` accepts `java` as well as `java.util`.
    fn matches(&self, pkg: &str) -> bool {
        if self.wildcard {
            pkg == self.prefix.trim_end_matches('.') || pkg.starts_with(&self.prefix)
        } else {
            pkg == self.prefix
        }
    }
}

/// Host-supplied search configuration.
#[derive(Clone, Debug)]
pub struct PolicyConfig {
    boot_delegation: Vec<BootPattern>,
    system_packages: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> PolicyConfig {
        PolicyConfig {
            boot_delegation: vec![BootPattern::parse("java.*")],
            system_packages: None,
        }
    }
}

impl PolicyConfig {
    /// Builds a configuration from host properties. The boot delegation
    /// list is comma/space-separated; `java.*` is always appended.
    pub fn from_properties<'a>(
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> PolicyConfig {
        let mut boot_delegation = Vec::new();
        let mut system_packages = None;
        for (key, value) in properties {
            match key {
                BOOT_DELEGATION_PROP => {
                    boot_delegation.extend(
                        value
                            .split(|c: char| c == ',' || c.is_whitespace())
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(BootPattern::parse),
                    );
                }
                SYSTEM_PACKAGES_PROP => {
                    system_packages = Some(value.to_string());
                }
                _ => {}
            }
        }
        boot_delegation.push(BootPattern::parse("java.*"));
        PolicyConfig {
            boot_delegation,
            system_packages,
        }
    }

    fn boot_delegated(&self, pkg: &str) -> bool {
        self.boot_delegation.iter().any(|p| p.matches(pkg))
    }

    pub fn system_packages(&self) -> Option<&str> {
        self.system_packages.as_deref()
    }
}

/// The sealed package attributes assembled for `define_package`, populated
/// from the module's definition headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageAttributes {
    pub spec_title: Option<String>,
    pub spec_version: Option<String>,
    pub spec_vendor: Option<String>,
    pub impl_title: Option<String>,
    pub impl_version: Option<String>,
    pub impl_vendor: Option<String>,
    pub sealed: bool,
}

/// Locates classes and resources for modules, resolving lazily on first
/// use.
pub struct SearchPolicy {
    registry: Arc<ModuleRegistry>,
    host: Arc<dyn HostLoader>,
    config: PolicyConfig,
}

impl SearchPolicy {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        host: Arc<dyn HostLoader>,
        config: PolicyConfig,
    ) -> SearchPolicy {
        SearchPolicy {
            registry,
            host,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Finds `name` for `module`: boot delegation, static wires, local
    /// content, then dynamic import. `caller` records whether the
    /// instigating caller lives on the host path; host-path callers still
    /// expect visibility of host classes, so they get a final host
    /// delegation before the lookup fails.
    pub fn find_class(
        &self,
        module: ModuleId,
        name: &str,
        caller: CallerKind,
    ) -> Result<Class, ClassNotFoundError> {
        if !self.registry.is_resolved(module) {
            if let Err(error) = self.registry.resolve(module) {
                return Err(ClassNotFoundError::new(name).with_resolve_error(error));
            }
        }

        let pkg = class_package(name);

        if self.config.boot_delegated(&pkg) {
            trace!("`{}` boot-delegated to the host loader", name);
            return self
                .host
                .load_class(name)
                .map_err(|error| ClassNotFoundError::new(name).with_host_error(error));
        }

        let wires = self.registry.wires(module);
        for wire in wires.iter() {
            if !wire.covers(&pkg) {
                continue;
            }
            match self.class_from_wire(wire, &pkg, name) {
                Some(class) => return Ok(class),
                // A covering package wire is the package's single
                // provenance; its miss is final.
                None if wire.is_package_wire() => {
                    return Err(self.class_miss(module, &pkg, name));
                }
                None => {}
            }
        }

        if let Some(content) = self.registry.content(module) {
            if let Some(class) = content.get_class(name) {
                return Ok(class);
            }
        }

        if let Some(wire) = self.registry.attempt_dynamic_import(module, &pkg) {
            if let Some(class) = self.class_from_wire(&wire, &pkg, name) {
                return Ok(class);
            }
            return Err(self.class_miss(module, &pkg, name));
        }

        if caller == CallerKind::Host {
            if let Ok(class) = self.host.load_class(name) {
                trace!("`{}` conceded to the host loader for a host-path caller", name);
                return Ok(class);
            }
        }

        Err(self.class_miss(module, &pkg, name))
    }

    /// Finds a single resource. An unresolved module whose resolution
    /// fails still serves its own content.
    pub fn find_resource(
        &self,
        module: ModuleId,
        name: &str,
    ) -> Result<Url, ResourceNotFoundError> {
        if !self.registry.is_resolved(module) {
            if let Err(error) = self.registry.resolve(module) {
                if let Some(url) = self.local_resource(module, name) {
                    return Ok(url);
                }
                return Err(ResourceNotFoundError::new(name).with_resolve_error(error));
            }
        }

        let pkg = resource_package(name);

        if self.config.boot_delegated(&pkg) {
            return self
                .host
                .get_resource(name)
                .ok_or_else(|| ResourceNotFoundError::new(name));
        }

        let wires = self.registry.wires(module);
        for wire in wires.iter() {
            if !wire.covers(&pkg) {
                continue;
            }
            match self.resource_from_wire(wire, &pkg, name) {
                Some(url) => return Ok(url),
                None if wire.is_package_wire() => {
                    return Err(ResourceNotFoundError::new(name));
                }
                None => {}
            }
        }

        if let Some(url) = self.local_resource(module, name) {
            return Ok(url);
        }

        if let Some(wire) = self.registry.attempt_dynamic_import(module, &pkg) {
            if let Some(url) = self.resource_from_wire(&wire, &pkg, name) {
                return Ok(url);
            }
        }

        Err(ResourceNotFoundError::new(name))
    }

    /// Finds every visible copy of a resource. The walk order matches
    /// `find_resource`, but each source is tried; the first source with a
    /// non-empty enumeration wins outright (single-source assumption, no
    /// merging across wires).
    pub fn find_resources(
        &self,
        module: ModuleId,
        name: &str,
    ) -> Result<Vec<Url>, ResourceNotFoundError> {
        if !self.registry.is_resolved(module) {
            if let Err(error) = self.registry.resolve(module) {
                let local = self.local_resources(module, name);
                if !local.is_empty() {
                    return Ok(local);
                }
                return Err(ResourceNotFoundError::new(name).with_resolve_error(error));
            }
        }

        let pkg = resource_package(name);

        if self.config.boot_delegated(&pkg) {
            let urls = self.host.get_resources(name);
            return if urls.is_empty() {
                Err(ResourceNotFoundError::new(name))
            } else {
                Ok(urls)
            };
        }

        let wires = self.registry.wires(module);
        for wire in wires.iter() {
            if !wire.covers(&pkg) {
                continue;
            }
            let urls = self.resources_from_wire(wire, &pkg, name);
            if !urls.is_empty() {
                return Ok(urls);
            }
        }

        let local = self.local_resources(module, name);
        if !local.is_empty() {
            return Ok(local);
        }

        if let Some(wire) = self.registry.attempt_dynamic_import(module, &pkg) {
            let urls = self.resources_from_wire(&wire, &pkg, name);
            if !urls.is_empty() {
                return Ok(urls);
            }
        }

        Err(ResourceNotFoundError::new(name))
    }

    /// The path of a native library declared by the module, matched by its
    /// declared name or platform file stem.
    pub fn find_library(&self, module: ModuleId, name: &str) -> Option<String> {
        let definition = self.registry.definition(module)?;
        definition
            .native_libraries()
            .iter()
            .find(|library| library_matches(library, name))
            .map(|library| library.path().to_string())
    }

    /// Assembles the sealed package attributes for a package of `module`
    /// from its definition headers.
    pub fn define_package(&self, module: ModuleId, _pkg: &str) -> Option<PackageAttributes> {
        let definition = self.registry.definition(module)?;
        let header = |name: &str| definition.header(name).map(str::to_string);
        Some(PackageAttributes {
            spec_title: header("Specification-Title"),
            spec_version: header("Specification-Version"),
            spec_vendor: header("Specification-Vendor"),
            impl_title: header("Implementation-Title"),
            impl_version: header("Implementation-Version"),
            impl_vendor: header("Implementation-Vendor"),
            sealed: definition
                .header("Sealed")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }

    /// Class lookup through one wire: a package wire consults its exporter
    /// directly, a module wire tries every source of the covered package in
    /// map order.
    fn class_from_wire(&self, wire: &Wire, pkg: &str, name: &str) -> Option<Class> {
        if wire.is_package_wire() {
            return self.registry.content(wire.exporter())?.get_class(name);
        }
        for source in wire.package_sources(pkg) {
            if let Some(class) = self
                .registry
                .content(source.module())
                .and_then(|content| content.get_class(name))
            {
                return Some(class);
            }
        }
        None
    }

    fn resource_from_wire(&self, wire: &Wire, pkg: &str, name: &str) -> Option<Url> {
        if wire.is_package_wire() {
            return self.registry.content(wire.exporter())?.get_resource(name);
        }
        for source in wire.package_sources(pkg) {
            if let Some(url) = self
                .registry
                .content(source.module())
                .and_then(|content| content.get_resource(name))
            {
                return Some(url);
            }
        }
        None
    }

    fn resources_from_wire(&self, wire: &Wire, pkg: &str, name: &str) -> Vec<Url> {
        if wire.is_package_wire() {
            return self
                .registry
                .content(wire.exporter())
                .map(|content| content.get_resources(name))
                .unwrap_or_default();
        }
        for source in wire.package_sources(pkg) {
            let urls = self
                .registry
                .content(source.module())
                .map(|content| content.get_resources(name))
                .unwrap_or_default();
            if !urls.is_empty() {
                return urls;
            }
        }
        Vec::new()
    }

    fn local_resource(&self, module: ModuleId, name: &str) -> Option<Url> {
        self.registry
            .content(module)
            .and_then(|content| content.get_resource(name))
    }

    fn local_resources(&self, module: ModuleId, name: &str) -> Vec<Url> {
        self.registry
            .content(module)
            .map(|content| content.get_resources(name))
            .unwrap_or_default()
    }

    fn class_miss(&self, module: ModuleId, pkg: &str, name: &str) -> ClassNotFoundError {
        let diagnostic = diagnostics::explain_class_miss(
            &self.registry,
            self.host.as_ref(),
            &self.config,
            module,
            pkg,
            name,
        );
        ClassNotFoundError::new(name).with_diagnostic(diagnostic)
    }
}

/// The package of a binary class name; empty for the default package.
fn class_package(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(pkg, _)| pkg.to_string())
        .unwrap_or_default()
}

/// The package of a `/`-separated resource path; empty for top-level
/// resources.
fn resource_package(name: &str) -> String {
    name.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir.replace('/', "."))
        .unwrap_or_default()
}

fn library_matches(library: &NativeLibrary, requested: &str) -> bool {
    if library.name() == requested {
        return true;
    }
    let file = library
        .name()
        .rsplit_once('/')
        .map(|(_, f)| f)
        .unwrap_or_else(|| library.name());
    let stem = file.split_once('.').map(|(s, _)| s).unwrap_or(file);
    stem == requested || stem.strip_prefix("lib") == Some(requested)
}
