pub use self::capability::{Capability, CapabilityBuilder, Namespace, Requirement, Value};
pub use self::filter::{CompareOp, Filter};
pub use self::interning::InternedString;
pub use self::module::{
    CallerKind, Class, ContentLoader, HostLoader, ModuleDefinition, ModuleDefinitionBuilder,
    ModuleId, NativeLibrary, PackagePermission, SecurityContext,
};
pub use self::registry::{ModuleEvent, ModuleListener, ModuleRegistry, ResolverListener};
pub use self::resolver::{PackageSource, ResolveError, ResolvedPackage, Wire};
pub use self::search::{PackageAttributes, PolicyConfig, SearchPolicy};
pub use self::version::{Version, VersionParseError};

pub mod capability;
pub mod filter;
pub mod interning;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod search;
pub mod version;
