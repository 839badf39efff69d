use crate::core::capability::Requirement;
use crate::core::interning::InternedString;
use crate::core::module::ModuleId;

/// Failure to resolve a module, attached to the offending module and, when
/// one exists, the requirement that could not be satisfied.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("module {module} is not present in the registry")]
    UnknownModule { module: ModuleId },

    #[error("unable to resolve module {module}: {requirement} has no provider")]
    UnresolvedRequirement {
        module: ModuleId,
        requirement: Requirement,
    },

    #[error(
        "unable to resolve module {module}: constraint violation on package `{package}`, \
         no candidate configuration yields a consistent class space"
    )]
    ConstraintViolation {
        module: ModuleId,
        package: InternedString,
    },
}

impl ResolveError {
    pub fn unknown_module(module: ModuleId) -> ResolveError {
        ResolveError::UnknownModule { module }
    }

    pub fn unresolved_requirement(module: ModuleId, requirement: &Requirement) -> ResolveError {
        ResolveError::UnresolvedRequirement {
            module,
            requirement: requirement.clone(),
        }
    }

    pub fn constraint_violation(module: ModuleId, package: InternedString) -> ResolveError {
        ResolveError::ConstraintViolation { module, package }
    }

    /// The module the failure is attached to.
    pub fn module(&self) -> ModuleId {
        match self {
            ResolveError::UnknownModule { module }
            | ResolveError::UnresolvedRequirement { module, .. }
            | ResolveError::ConstraintViolation { module, .. } => *module,
        }
    }

    /// The requirement that could not be satisfied, when the failure names
    /// one.
    pub fn requirement(&self) -> Option<&Requirement> {
        match self {
            ResolveError::UnresolvedRequirement { requirement, .. } => Some(requirement),
            _ => None,
        }
    }
}
