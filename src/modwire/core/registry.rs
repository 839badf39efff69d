//! The live-module registry.
//!
//! All shared resolver state lives here behind one registry-wide mutex (the
//! "factory lock"): the module table, per-module resolved state and wires,
//! and the in-use capability index. Listener registration uses a separate
//! monitor with copy-on-write snapshots so that event delivery never holds
//! the factory lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::core::capability::{Capability, Namespace};
use crate::core::interning::InternedString;
use crate::core::module::{
    ContentLoader, ModuleDefinition, ModuleId, PackagePermission, SecurityContext,
};
use crate::core::resolver::errors::ResolveError;
use crate::core::resolver::types::Wire;
use crate::core::resolver::{dynamic_import_locked, resolve_locked};

pub(crate) struct ModuleEntry {
    definition: Arc<ModuleDefinition>,
    content: Arc<dyn ContentLoader>,
    security: Option<Arc<dyn SecurityContext>>,
    resolved: bool,
    wires: Arc<Vec<Wire>>,
}

impl ModuleEntry {
    pub(crate) fn definition(&self) -> &Arc<ModuleDefinition> {
        &self.definition
    }
}

/// The mutable registry state; every access happens with the factory lock
/// held. Wire lists and capability arrays stored here are immutable values
/// replaced wholesale, so lock-free readers can keep snapshots.
pub(crate) struct RegistryState {
    modules: IndexMap<ModuleId, ModuleEntry>,
    in_use_caps: IndexMap<ModuleId, Vec<Capability>>,
    next_bundle: u64,
}

impl RegistryState {
    fn new() -> RegistryState {
        RegistryState {
            modules: IndexMap::new(),
            in_use_caps: IndexMap::new(),
            next_bundle: 1,
        }
    }

    fn insert(
        &mut self,
        definition: Arc<ModuleDefinition>,
        content: Arc<dyn ContentLoader>,
        security: Option<Arc<dyn SecurityContext>>,
    ) -> ModuleId {
        let id = ModuleId::new(self.next_bundle, 0);
        self.next_bundle += 1;
        self.modules.insert(
            id,
            ModuleEntry {
                definition,
                content,
                security,
                resolved: false,
                wires: Arc::new(Vec::new()),
            },
        );
        id
    }

    /// Removes the module and its per-module state; returns whether it was
    /// resolved at the time.
    fn remove(&mut self, module: ModuleId) -> Option<bool> {
        let entry = self.modules.shift_remove(&module)?;
        self.in_use_caps.shift_remove(&module);
        Some(entry.resolved)
    }

    pub(crate) fn contains(&self, module: ModuleId) -> bool {
        self.modules.contains_key(&module)
    }

    pub(crate) fn definition(&self, module: ModuleId) -> Option<Arc<ModuleDefinition>> {
        self.modules.get(&module).map(|e| e.definition.clone())
    }

    pub(crate) fn content(&self, module: ModuleId) -> Option<Arc<dyn ContentLoader>> {
        self.modules.get(&module).map(|e| e.content.clone())
    }

    pub(crate) fn is_resolved(&self, module: ModuleId) -> bool {
        self.modules.get(&module).map(|e| e.resolved).unwrap_or(false)
    }

    pub(crate) fn set_resolved(&mut self, module: ModuleId) {
        if let Some(entry) = self.modules.get_mut(&module) {
            entry.resolved = true;
        }
    }

    pub(crate) fn wires(&self, module: ModuleId) -> Arc<Vec<Wire>> {
        self.modules
            .get(&module)
            .map(|e| e.wires.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_wires(&mut self, module: ModuleId, wires: Vec<Wire>) {
        if let Some(entry) = self.modules.get_mut(&module) {
            entry.wires = Arc::new(wires);
        }
    }

    /// Appends a wire by allocating a replacement list; existing snapshots
    /// stay untouched.
    pub(crate) fn append_wire(&mut self, module: ModuleId, wire: Wire) {
        if let Some(entry) = self.modules.get_mut(&module) {
            let mut wires = Vec::clone(&entry.wires);
            wires.push(wire);
            entry.wires = Arc::new(wires);
        }
    }

    pub(crate) fn in_use(&self, module: ModuleId) -> &[Capability] {
        self.in_use_caps
            .get(&module)
            .map(|caps| caps.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn add_in_use(&mut self, module: ModuleId, capability: Capability) {
        let caps = self.in_use_caps.entry(module).or_default();
        if !caps.contains(&capability) {
            caps.push(capability);
        }
    }

    pub(crate) fn in_use_iter(&self) -> impl Iterator<Item = (ModuleId, &[Capability])> {
        self.in_use_caps
            .iter()
            .map(|(id, caps)| (*id, caps.as_slice()))
    }

    pub(crate) fn modules_iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleEntry)> {
        self.modules.iter().map(|(id, entry)| (*id, entry))
    }

    /// The injected export-permission hook: a module without a security
    /// context may export anything.
    pub(crate) fn export_permitted(&self, module: ModuleId, package: InternedString) -> bool {
        match self.modules.get(&module).and_then(|e| e.security.as_ref()) {
            Some(context) => context.implies(&PackagePermission::export(package)),
            None => true,
        }
    }
}

/// A resolver or factory event naming the affected module.
#[derive(Clone, Debug)]
pub struct ModuleEvent {
    module: ModuleId,
}

impl ModuleEvent {
    fn new(module: ModuleId) -> ModuleEvent {
        ModuleEvent { module }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }
}

/// Observes module wiring transitions.
pub trait ResolverListener: Send + Sync {
    fn module_resolved(&self, _event: &ModuleEvent) {}

    fn module_unresolved(&self, _event: &ModuleEvent) {}
}

/// Observes registry membership.
pub trait ModuleListener: Send + Sync {
    fn module_added(&self, _event: &ModuleEvent) {}

    fn module_removed(&self, _event: &ModuleEvent) {}
}

/// Copy-on-write listener array: registration clones under a dedicated
/// monitor, firing iterates a stable snapshot without any lock held.
struct ListenerSet<T: ?Sized> {
    snapshot: Mutex<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> ListenerSet<T> {
    fn new() -> ListenerSet<T> {
        ListenerSet {
            snapshot: Mutex::new(Arc::new(Vec::new())),
        }
    }

    fn add(&self, listener: Arc<T>) {
        let mut guard = self.snapshot.lock().unwrap();
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    fn remove(&self, listener: &Arc<T>) {
        let mut guard = self.snapshot.lock().unwrap();
        let next: Vec<Arc<T>> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        *guard = Arc::new(next);
    }

    fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.lock().unwrap().clone()
    }
}

/// The module registry: the factory the rest of the system talks to.
pub struct ModuleRegistry {
    state: Mutex<RegistryState>,
    module_listeners: ListenerSet<dyn ModuleListener>,
    resolver_listeners: ListenerSet<dyn ResolverListener>,
}

impl Default for ModuleRegistry {
    fn default() -> ModuleRegistry {
        ModuleRegistry::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> ModuleRegistry {
        ModuleRegistry {
            state: Mutex::new(RegistryState::new()),
            module_listeners: ListenerSet::new(),
            resolver_listeners: ListenerSet::new(),
        }
    }

    /// Registers a module and returns its stable handle.
    pub fn add_module(
        &self,
        definition: Arc<ModuleDefinition>,
        content: Arc<dyn ContentLoader>,
    ) -> ModuleId {
        self.add_secured_module(definition, content, None)
    }

    pub fn add_secured_module(
        &self,
        definition: Arc<ModuleDefinition>,
        content: Arc<dyn ContentLoader>,
        security: Option<Arc<dyn SecurityContext>>,
    ) -> ModuleId {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.insert(definition, content, security)
        };
        debug!("module {} added", id);
        self.fire_module_added(id);
        id
    }

    /// Drops the module and all of its per-module state. Fires
    /// `module_removed`, and `module_unresolved` when the module had been
    /// resolved.
    pub fn remove_module(&self, module: ModuleId) -> bool {
        let was_resolved = {
            let mut state = self.state.lock().unwrap();
            state.remove(module)
        };
        match was_resolved {
            Some(was_resolved) => {
                debug!("module {} removed", module);
                self.fire_module_removed(module);
                if was_resolved {
                    self.fire_module_unresolved(module);
                }
                true
            }
            None => false,
        }
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        let state = self.state.lock().unwrap();
        state.modules.keys().copied().collect()
    }

    pub fn definition(&self, module: ModuleId) -> Option<Arc<ModuleDefinition>> {
        self.state.lock().unwrap().definition(module)
    }

    pub fn content(&self, module: ModuleId) -> Option<Arc<dyn ContentLoader>> {
        self.state.lock().unwrap().content(module)
    }

    pub fn is_resolved(&self, module: ModuleId) -> bool {
        self.state.lock().unwrap().is_resolved(module)
    }

    /// The module's committed wires; empty for unresolved modules.
    pub fn wires(&self, module: ModuleId) -> Arc<Vec<Wire>> {
        self.state.lock().unwrap().wires(module)
    }

    /// The capabilities of `module` currently bound by live wires or
    /// promoted as export-only.
    pub fn in_use_capabilities(&self, module: ModuleId) -> Vec<Capability> {
        self.state.lock().unwrap().in_use(module).to_vec()
    }

    /// Resolves `module` and everything it transitively needs, committing
    /// wires for every module the resolution covered. Fails fast when the
    /// module is already resolved.
    pub fn resolve(&self, module: ModuleId) -> Result<(), ResolveError> {
        let newly_resolved = {
            let mut state = self.state.lock().unwrap();
            resolve_locked(&mut state, module)?
        };
        self.fire_resolved(&newly_resolved);
        Ok(())
    }

    /// Attempts a dynamic package import for `importer`; returns the newly
    /// created wire, if any. Candidate failures are swallowed.
    pub fn attempt_dynamic_import(&self, importer: ModuleId, pkg: &str) -> Option<Wire> {
        let (wire, newly_resolved) = {
            let mut state = self.state.lock().unwrap();
            match dynamic_import_locked(&mut state, importer, pkg) {
                Some(outcome) => outcome,
                None => return None,
            }
        };
        self.fire_resolved(&newly_resolved);
        Some(wire)
    }

    pub fn add_resolver_listener(&self, listener: Arc<dyn ResolverListener>) {
        self.resolver_listeners.add(listener);
    }

    pub fn remove_resolver_listener(&self, listener: &Arc<dyn ResolverListener>) {
        self.resolver_listeners.remove(listener);
    }

    pub fn add_module_listener(&self, listener: Arc<dyn ModuleListener>) {
        self.module_listeners.add(listener);
    }

    pub fn remove_module_listener(&self, listener: &Arc<dyn ModuleListener>) {
        self.module_listeners.remove(listener);
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        let state = self.state.lock().unwrap();
        f(&state)
    }

    fn fire_resolved(&self, modules: &[ModuleId]) {
        if modules.is_empty() {
            return;
        }
        let snapshot = self.resolver_listeners.snapshot();
        for module in modules {
            let event = ModuleEvent::new(*module);
            for listener in snapshot.iter() {
                isolate(module, "moduleResolved", || listener.module_resolved(&event));
            }
        }
    }

    fn fire_module_unresolved(&self, module: ModuleId) {
        let snapshot = self.resolver_listeners.snapshot();
        let event = ModuleEvent::new(module);
        for listener in snapshot.iter() {
            isolate(&module, "moduleUnresolved", || {
                listener.module_unresolved(&event)
            });
        }
    }

    fn fire_module_added(&self, module: ModuleId) {
        let snapshot = self.module_listeners.snapshot();
        let event = ModuleEvent::new(module);
        for listener in snapshot.iter() {
            isolate(&module, "moduleAdded", || listener.module_added(&event));
        }
    }

    fn fire_module_removed(&self, module: ModuleId) {
        let snapshot = self.module_listeners.snapshot();
        let event = ModuleEvent::new(module);
        for listener in snapshot.iter() {
            isolate(&module, "moduleRemoved", || listener.module_removed(&event));
        }
    }
}

/// A panicking listener must not prevent delivery to the rest.
fn isolate(module: &ModuleId, event: &str, deliver: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(deliver)).is_err() {
        warn!("listener panicked delivering {} for module {}", event, module);
    }
}

/// Promotes into the in-use index every capability committed by `wires`,
/// plus the export-only package capabilities of a freshly resolved module
/// (those not matched by any of the module's own requirements).
pub(crate) fn promote_in_use(state: &mut RegistryState, module: ModuleId, wires: &[Wire]) {
    for wire in wires {
        state.add_in_use(wire.exporter(), wire.capability().clone());
    }
    let definition = match state.definition(module) {
        Some(definition) => definition,
        None => return,
    };
    for capability in definition.capabilities() {
        if capability.namespace() != Namespace::Package {
            continue;
        }
        let imported_by_self = definition
            .requirements()
            .iter()
            .any(|req| capability.satisfies(req));
        if !imported_by_self {
            state.add_in_use(module, capability.clone());
        }
    }
}
