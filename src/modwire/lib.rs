//! modwire — a module resolver and class-space search policy for modular
//! runtimes.
//!
//! Modules declare *capabilities* (exported packages, provided module
//! identities) and *requirements* (imports, required modules). The
//! [`core::ModuleRegistry`] holds the live modules; its resolver computes a
//! wiring of requirements to capabilities such that every package visible
//! from any module has exactly one provenance, enforcing transitive `uses`
//! constraints across exported packages. The [`core::SearchPolicy`] then
//! locates classes and resources through that wiring on demand: boot
//! delegation, static wires, local content, dynamic import.
//!
//! The crate is the wiring core only. Manifest parsing, content loading,
//! life-cycle and the host's security facility live behind the collaborator
//! traits in [`core::module`].

#![allow(clippy::redundant_closure)]

pub use crate::core::{
    CallerKind, Capability, Class, ContentLoader, HostLoader, ModuleDefinition, ModuleId,
    ModuleRegistry, Namespace, PolicyConfig, Requirement, ResolveError, SearchPolicy, Version,
};
pub use crate::util::errors::{ClassNotFoundError, InvalidFilterError, ResourceNotFoundError};

pub mod core;
pub mod util;
