//! Builders and fakes shared by the resolver and search-policy test
//! suites.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use url::Url;

use modwire::core::capability::{Capability, Namespace, Requirement};
use modwire::core::module::{
    Class, ContentLoader, HostLoader, ModuleDefinition, ModuleId, NativeLibrary, PackagePermission,
    SecurityContext,
};
use modwire::core::registry::{ModuleEvent, ModuleListener, ModuleRegistry, ResolverListener};
use modwire::core::search::{PolicyConfig, SearchPolicy, BOOT_DELEGATION_PROP};
use modwire::core::version::Version;

pub fn registry() -> Arc<ModuleRegistry> {
    Arc::new(ModuleRegistry::new())
}

pub fn policy(registry: &Arc<ModuleRegistry>, host: &Arc<RecordingHost>) -> SearchPolicy {
    let host: Arc<dyn HostLoader> = host.clone();
    SearchPolicy::new(registry.clone(), host, PolicyConfig::default())
}

pub fn policy_with_boot(
    registry: &Arc<ModuleRegistry>,
    host: &Arc<RecordingHost>,
    boot: &str,
) -> SearchPolicy {
    let host: Arc<dyn HostLoader> = host.clone();
    SearchPolicy::new(
        registry.clone(),
        host,
        PolicyConfig::from_properties([(BOOT_DELEGATION_PROP, boot)]),
    )
}

pub fn ver(s: &str) -> Version {
    s.parse().unwrap()
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// In-memory module content.
#[derive(Default)]
pub struct MapContent {
    classes: HashSet<String>,
    resources: HashMap<String, Vec<Url>>,
}

impl ContentLoader for MapContent {
    fn get_class(&self, name: &str) -> Option<Class> {
        self.classes
            .contains(name)
            .then(|| Class::new(name, Vec::new()))
    }

    fn get_resource(&self, name: &str) -> Option<Url> {
        self.resources.get(name).and_then(|urls| urls.first().cloned())
    }

    fn get_resources(&self, name: &str) -> Vec<Url> {
        self.resources.get(name).cloned().unwrap_or_default()
    }
}

/// A host loader over a fixed class/resource set that records every class
/// load it is asked for.
#[derive(Default)]
pub struct RecordingHost {
    classes: HashSet<String>,
    resources: HashMap<String, Vec<Url>>,
    loads: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Arc<RecordingHost> {
        Arc::new(RecordingHost::default())
    }

    pub fn with_classes<'a>(names: impl IntoIterator<Item = &'a str>) -> Arc<RecordingHost> {
        Arc::new(RecordingHost {
            classes: names.into_iter().map(str::to_string).collect(),
            ..RecordingHost::default()
        })
    }

    pub fn load_count(&self, name: &str) -> usize {
        self.loads
            .lock()
            .unwrap()
            .iter()
            .filter(|loaded| loaded.as_str() == name)
            .count()
    }
}

impl HostLoader for RecordingHost {
    fn load_class(&self, name: &str) -> anyhow::Result<Class> {
        self.loads.lock().unwrap().push(name.to_string());
        if self.classes.contains(name) {
            Ok(Class::new(name, Vec::new()))
        } else {
            anyhow::bail!("host class path does not contain `{}`", name)
        }
    }

    fn get_resource(&self, name: &str) -> Option<Url> {
        self.resources.get(name).and_then(|urls| urls.first().cloned())
    }

    fn get_resources(&self, name: &str) -> Vec<Url> {
        self.resources.get(name).cloned().unwrap_or_default()
    }
}

/// Denies export permission for one package; everything else is allowed.
pub struct DenyExport {
    package: String,
}

impl DenyExport {
    pub fn of(package: &str) -> Arc<DenyExport> {
        Arc::new(DenyExport {
            package: package.to_string(),
        })
    }
}

impl SecurityContext for DenyExport {
    fn implies(&self, permission: &PackagePermission) -> bool {
        permission.package().as_str() != self.package
    }
}

/// Records resolver and factory events as readable strings.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn new() -> Arc<EventLog> {
        Arc::new(EventLog::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ResolverListener for EventLog {
    fn module_resolved(&self, event: &ModuleEvent) {
        self.push(format!("resolved {}", event.module()));
    }

    fn module_unresolved(&self, event: &ModuleEvent) {
        self.push(format!("unresolved {}", event.module()));
    }
}

impl ModuleListener for EventLog {
    fn module_added(&self, event: &ModuleEvent) {
        self.push(format!("added {}", event.module()));
    }

    fn module_removed(&self, event: &ModuleEvent) {
        self.push(format!("removed {}", event.module()));
    }
}

/// A listener that panics on every resolved event.
pub struct PanickingListener;

impl ResolverListener for PanickingListener {
    fn module_resolved(&self, _event: &ModuleEvent) {
        panic!("listener failure");
    }
}

/// Fluent module construction: capabilities, requirements, content.
pub fn module() -> ModuleBuilder {
    ModuleBuilder {
        capabilities: Vec::new(),
        requirements: Vec::new(),
        libraries: Vec::new(),
        headers: Vec::new(),
        content: MapContent::default(),
        security: None,
    }
}

pub struct ModuleBuilder {
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    libraries: Vec<NativeLibrary>,
    headers: Vec<(String, String)>,
    content: MapContent,
    security: Option<Arc<dyn SecurityContext>>,
}

impl ModuleBuilder {
    pub fn exports(self, pkg: &str, version: &str) -> Self {
        self.exports_with_uses(pkg, version, &[])
    }

    pub fn exports_with_uses(mut self, pkg: &str, version: &str, uses: &[&str]) -> Self {
        self.capabilities.push(
            Capability::package(pkg, ver(version))
                .uses(uses.iter().copied())
                .build(),
        );
        self
    }

    pub fn provides_module(mut self, name: &str, version: &str) -> Self {
        self.capabilities
            .push(Capability::module(name, ver(version)).build());
        self
    }

    pub fn imports(self, pkg: &str) -> Self {
        self.requires_filter(&format!("(package={})", pkg))
    }

    pub fn imports_versioned(self, pkg: &str, min: &str) -> Self {
        self.requires_filter(&format!("(&(package={})(version>={}))", pkg, min))
    }

    pub fn imports_optionally(mut self, pkg: &str) -> Self {
        self.requirements.push(
            Requirement::parse(Namespace::Package, &format!("(package={})", pkg))
                .unwrap()
                .optional(),
        );
        self
    }

    pub fn requires_filter(mut self, filter: &str) -> Self {
        self.requirements
            .push(Requirement::parse(Namespace::Package, filter).unwrap());
        self
    }

    pub fn requires_module(mut self, name: &str) -> Self {
        self.requirements
            .push(Requirement::parse(Namespace::Module, &format!("(module={})", name)).unwrap());
        self
    }

    pub fn dynamically_imports(mut self, pattern: &str) -> Self {
        self.requirements.push(
            Requirement::parse(Namespace::Package, &format!("(package={})", pattern))
                .unwrap()
                .dynamic(),
        );
        self
    }

    pub fn class(mut self, name: &str) -> Self {
        self.content.classes.insert(name.to_string());
        self
    }

    pub fn resource(mut self, name: &str, location: &str) -> Self {
        self.content
            .resources
            .entry(name.to_string())
            .or_default()
            .push(url(location));
        self
    }

    pub fn native_library(mut self, name: &str, path: &str) -> Self {
        self.libraries.push(NativeLibrary::new(name, path));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn secured(mut self, security: Arc<dyn SecurityContext>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn add_to(self, registry: &ModuleRegistry) -> ModuleId {
        let mut definition = ModuleDefinition::builder();
        for capability in self.capabilities {
            definition = definition.capability(capability);
        }
        for requirement in self.requirements {
            definition = definition.requirement(requirement);
        }
        for library in self.libraries {
            definition = definition.native_library(library);
        }
        for (name, value) in &self.headers {
            definition = definition.header(name, value);
        }
        registry.add_secured_module(
            definition.build(),
            Arc::new(self.content),
            self.security,
        )
    }
}

/// The `(package, exporter bundle)` pairs of a module's package wires.
pub fn package_wires(registry: &ModuleRegistry, module: ModuleId) -> Vec<(String, u64)> {
    registry
        .wires(module)
        .iter()
        .filter_map(|wire| {
            wire.package_name()
                .map(|pkg| (pkg.to_string(), wire.exporter().bundle()))
        })
        .collect()
}

pub fn assert_wired(registry: &ModuleRegistry, importer: ModuleId, pkg: &str, exporter: ModuleId) {
    let wires = package_wires(registry, importer);
    assert!(
        wires
            .iter()
            .any(|(name, bundle)| name == pkg && *bundle == exporter.bundle()),
        "expected {} to wire `{}` to {}, got {:?}",
        importer,
        pkg,
        exporter,
        wires
    );
}
