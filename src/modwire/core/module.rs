//! Module identity, definitions and the collaborator traits at the edge of
//! the core: content loading, host delegation and export permissions.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use url::Url;

use crate::core::capability::{Capability, Requirement};
use crate::core::interning::InternedString;

/// Stable numeric handle for a module: the owning bundle id plus a
/// per-revision counter. Wires and candidate structures carry `ModuleId`
/// values, never owning references, so cyclic module graphs stay cycles of
/// plain numbers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId {
    bundle: u64,
    revision: u32,
}

impl ModuleId {
    pub fn new(bundle: u64, revision: u32) -> ModuleId {
        ModuleId { bundle, revision }
    }

    pub fn bundle(&self) -> u64 {
        self.bundle
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.bundle, self.revision)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A native library carried by a module's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeLibrary {
    name: String,
    path: String,
}

impl NativeLibrary {
    pub fn new(name: &str, path: &str) -> NativeLibrary {
        NativeLibrary {
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The immutable description of what a module provides and needs.
#[derive(Debug)]
pub struct ModuleDefinition {
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    dynamic_requirements: Vec<Requirement>,
    native_libraries: Vec<NativeLibrary>,
    headers: IndexMap<InternedString, String>,
}

impl ModuleDefinition {
    pub fn builder() -> ModuleDefinitionBuilder {
        ModuleDefinitionBuilder {
            capabilities: Vec::new(),
            requirements: Vec::new(),
            dynamic_requirements: Vec::new(),
            native_libraries: Vec::new(),
            headers: IndexMap::new(),
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Dynamic-requirement patterns, consulted at class-load time only.
    pub fn dynamic_requirements(&self) -> &[Requirement] {
        &self.dynamic_requirements
    }

    pub fn native_libraries(&self) -> &[NativeLibrary] {
        &self.native_libraries
    }

    pub fn headers(&self) -> &IndexMap<InternedString, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

pub struct ModuleDefinitionBuilder {
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    dynamic_requirements: Vec<Requirement>,
    native_libraries: Vec<NativeLibrary>,
    headers: IndexMap<InternedString, String>,
}

impl ModuleDefinitionBuilder {
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        if requirement.is_dynamic() {
            self.dynamic_requirements.push(requirement);
        } else {
            self.requirements.push(requirement);
        }
        self
    }

    pub fn native_library(mut self, library: NativeLibrary) -> Self {
        self.native_libraries.push(library);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(InternedString::new(name), value.to_string());
        self
    }

    pub fn build(self) -> Arc<ModuleDefinition> {
        let capabilities = self
            .capabilities
            .iter()
            .enumerate()
            .map(|(index, cap)| cap.reindexed(index))
            .collect();
        Arc::new(ModuleDefinition {
            capabilities,
            requirements: self.requirements,
            dynamic_requirements: self.dynamic_requirements,
            native_libraries: self.native_libraries,
            headers: self.headers,
        })
    }
}

#[derive(Debug)]
struct ClassInner {
    name: InternedString,
    bytes: Vec<u8>,
}

/// A loaded class: the binary name plus its defining bytes. Opaque to the
/// core beyond the name.
#[derive(Clone, Debug)]
pub struct Class {
    inner: Arc<ClassInner>,
}

impl Class {
    pub fn new(name: &str, bytes: Vec<u8>) -> Class {
        Class {
            inner: Arc::new(ClassInner {
                name: InternedString::new(name),
                bytes,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name.as_str()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Class) -> bool {
        self.inner.name == other.inner.name
    }
}

/// Fetches classes and resources from a module's own content. No
/// delegation happens behind this trait; every accessor may return absent.
pub trait ContentLoader: Send + Sync {
    fn get_class(&self, name: &str) -> Option<Class>;

    fn get_resource(&self, name: &str) -> Option<Url>;

    fn get_resources(&self, name: &str) -> Vec<Url> {
        self.get_resource(name).into_iter().collect()
    }
}

/// The host runtime's built-in loader, used for boot-delegated packages and
/// the host-caller concession. Class loads may fail with an arbitrary host
/// error, which the policy propagates to its caller.
pub trait HostLoader: Send + Sync {
    fn load_class(&self, name: &str) -> anyhow::Result<Class>;

    fn get_resource(&self, name: &str) -> Option<Url>;

    fn get_resources(&self, name: &str) -> Vec<Url> {
        self.get_resource(name).into_iter().collect()
    }
}

/// A permission to export one package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagePermission {
    package: InternedString,
}

impl PackagePermission {
    pub fn export(package: InternedString) -> PackagePermission {
        PackagePermission { package }
    }

    pub fn package(&self) -> InternedString {
        self.package
    }
}

/// The security facility of the host, injected per module. Candidate
/// selection consults it before offering an in-use export.
pub trait SecurityContext: Send + Sync {
    fn implies(&self, permission: &PackagePermission) -> bool;
}

/// Who is asking for a class. The host runtime's own callers still expect
/// visibility of host classes; modular callers do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallerKind {
    Module,
    Host,
}
