//! Human-readable explanations for class lookup failures, synthesized by
//! case analysis over the wiring state.

use itertools::Itertools;

use crate::core::module::{HostLoader, ModuleId};
use crate::core::registry::{ModuleRegistry, RegistryState};
use crate::core::search::PolicyConfig;

/// Wiring facts about (module, pkg) gathered under the factory lock.
struct WiringFacts {
    /// Exporter behind a live wire covering the package.
    wired_exporter: Option<ModuleId>,
    /// The module declares a static requirement targeting the package.
    has_static_import: bool,
    /// ... and that requirement is optional.
    import_is_optional: bool,
    /// A dynamic pattern of the module covers the package.
    dynamically_importable: bool,
    /// Every module currently exporting the package.
    exporters: Vec<ModuleId>,
}

fn gather(state: &RegistryState, module: ModuleId, pkg: &str) -> WiringFacts {
    let wired_exporter = state
        .wires(module)
        .iter()
        .find(|wire| wire.covers(pkg))
        .map(|wire| wire.exporter());

    let (mut has_static_import, mut import_is_optional) = (false, false);
    let mut dynamically_importable = false;
    if let Some(definition) = state.definition(module) {
        for requirement in definition.requirements() {
            if requirement.target_package().map(|t| t.as_str()) == Some(pkg) {
                has_static_import = true;
                import_is_optional = requirement.is_optional();
                break;
            }
        }
        dynamically_importable = definition
            .dynamic_requirements()
            .iter()
            .any(|pattern| pattern.covers_dynamic(pkg));
    }

    let exporters = state
        .modules_iter()
        .filter(|(_, entry)| {
            entry
                .definition()
                .capabilities()
                .iter()
                .any(|cap| cap.package_name().map(|n| n.as_str()) == Some(pkg))
        })
        .map(|(id, _)| id)
        .collect();

    WiringFacts {
        wired_exporter,
        has_static_import,
        import_is_optional,
        dynamically_importable,
        exporters,
    }
}

/// Explains why `name` (in package `pkg`) is not visible to `module`, with
/// a remediation per case.
pub(crate) fn explain_class_miss(
    registry: &ModuleRegistry,
    host: &dyn HostLoader,
    config: &PolicyConfig,
    module: ModuleId,
    pkg: &str,
    name: &str,
) -> String {
    let facts = registry.with_state(|state| gather(state, module, pkg));

    // (a) The package is imported, so the wired exporter was authoritative.
    if let Some(exporter) = facts.wired_exporter {
        return format!(
            "class `{}` is in package `{}`, which module {} imports from module {}, but the \
             exporting module does not contain the class; verify the exported content of \
             module {} or correct the class name",
            name, pkg, module, exporter, exporter
        );
    }

    // (b) Optionally imported, wired or not, provider present or absent.
    if facts.has_static_import && facts.import_is_optional {
        return if facts.exporters.is_empty() {
            format!(
                "package `{}` is optionally imported by module {} and no module currently \
                 exports it; install a provider if `{}` is required",
                pkg, module, name
            )
        } else {
            format!(
                "package `{}` is optionally imported by module {} and an exporter (module {}) \
                 is available, but the import was not wired when the module resolved; \
                 re-resolving the importer may attach it",
                pkg,
                module,
                facts.exporters.iter().join(", ")
            )
        };
    }

    // (c) Dynamically importable but no provider satisfied the pattern.
    if facts.dynamically_importable {
        return format!(
            "package `{}` is dynamically importable by module {}, but no exporter satisfied \
             the pattern at load time; install a module exporting the package",
            pkg, module
        );
    }

    // (d) Exported somewhere, just not imported here.
    if !facts.exporters.is_empty() {
        return format!(
            "package `{}` is exported by module(s) {}, but module {} does not import it; add \
             an import for the package to the importer's definition",
            pkg,
            facts.exporters.iter().join(", "),
            module
        );
    }

    // (e) Visible to the host only.
    if host.load_class(name).is_ok() {
        return format!(
            "class `{}` is present on the host class path but not exported by any module; \
             the modular class space does not see the host class path, so export package \
             `{}` from a module or add it to the boot delegation list",
            name, pkg
        );
    }

    // (f) Nobody provides it.
    let mut message = format!(
        "no module exports package `{}` and the class is not on the host class path; \
         module {} cannot load `{}`",
        pkg, module, name
    );
    if let Some(system_packages) = config.system_packages() {
        message.push_str(&format!(
            " (system packages configured: {})",
            system_packages
        ));
    }
    message
}
