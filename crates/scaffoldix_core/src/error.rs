use std::collections::BTreeMap;
use std::fmt;

pub type Result<T> = std::result::Result<T, ScaffoldError>;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error codes. The set is closed: every failure the engine
/// can surface maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    // manifest
    ManifestNotFound,
    ManifestYamlError,
    ManifestSchemaError,
    // pack / store
    PackNotFound,
    PackStoreMissing,
    PackManifestCorrupt,
    PackPathNotFound,
    PackNotDirectory,
    GitCloneFailed,
    StoreInvalidConfig,
    StoreInvalidSource,
    StoreInstallFailed,
    StorePermissionDenied,
    StoreDiskFull,
    StoreReadonlyFs,
    StoreCreateFailed,
    // registry
    RegistryReadError,
    RegistryInvalidJson,
    RegistryInvalidSchema,
    RegistrySaveError,
    RegistrySaveInvalid,
    RegistryDirError,
    RegistryInvalidInput,
    RegistryInvalidPath,
    // resolve / generate
    InvalidArchetypeRef,
    ArchetypeNotFound,
    TemplateDirNotFound,
    VersionNotFound,
    GenerateConflict,
    // inputs
    InputRequired,
    InputValidationFailed,
    UserCancelled,
    // patches / hooks / checks
    PatchEngineError,
    PatchApplicationFailed,
    HookExecutionFailed,
    CheckFailed,
    // state
    StateInvalidJson,
    StateInvalidSchema,
    // compatibility
    PackIncompatible,
    // internal
    InternalError,
}

/// Area grouping used by callers to map codes to exit-code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Pack,
    Manifest,
    Store,
    Registry,
    Generation,
    Input,
    Patch,
    Hook,
    State,
    Compatibility,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestNotFound => "MANIFEST_NOT_FOUND",
            Self::ManifestYamlError => "MANIFEST_YAML_ERROR",
            Self::ManifestSchemaError => "MANIFEST_SCHEMA_ERROR",
            Self::PackNotFound => "PACK_NOT_FOUND",
            Self::PackStoreMissing => "PACK_STORE_MISSING",
            Self::PackManifestCorrupt => "PACK_MANIFEST_CORRUPT",
            Self::PackPathNotFound => "PACK_PATH_NOT_FOUND",
            Self::PackNotDirectory => "PACK_NOT_DIRECTORY",
            Self::GitCloneFailed => "GIT_CLONE_FAILED",
            Self::StoreInvalidConfig => "STORE_INVALID_CONFIG",
            Self::StoreInvalidSource => "STORE_INVALID_SOURCE",
            Self::StoreInstallFailed => "STORE_INSTALL_FAILED",
            Self::StorePermissionDenied => "STORE_PERMISSION_DENIED",
            Self::StoreDiskFull => "STORE_DISK_FULL",
            Self::StoreReadonlyFs => "STORE_READONLY_FS",
            Self::StoreCreateFailed => "STORE_CREATE_FAILED",
            Self::RegistryReadError => "REGISTRY_READ_ERROR",
            Self::RegistryInvalidJson => "REGISTRY_INVALID_JSON",
            Self::RegistryInvalidSchema => "REGISTRY_INVALID_SCHEMA",
            Self::RegistrySaveError => "REGISTRY_SAVE_ERROR",
            Self::RegistrySaveInvalid => "REGISTRY_SAVE_INVALID",
            Self::RegistryDirError => "REGISTRY_DIR_ERROR",
            Self::RegistryInvalidInput => "REGISTRY_INVALID_INPUT",
            Self::RegistryInvalidPath => "REGISTRY_INVALID_PATH",
            Self::InvalidArchetypeRef => "INVALID_ARCHETYPE_REF",
            Self::ArchetypeNotFound => "ARCHETYPE_NOT_FOUND",
            Self::TemplateDirNotFound => "TEMPLATE_DIR_NOT_FOUND",
            Self::VersionNotFound => "VERSION_NOT_FOUND",
            Self::GenerateConflict => "GENERATE_CONFLICT",
            Self::InputRequired => "INPUT_REQUIRED",
            Self::InputValidationFailed => "INPUT_VALIDATION_FAILED",
            Self::UserCancelled => "USER_CANCELLED",
            Self::PatchEngineError => "PATCH_ENGINE_ERROR",
            Self::PatchApplicationFailed => "PATCH_APPLICATION_FAILED",
            Self::HookExecutionFailed => "HOOK_EXECUTION_FAILED",
            Self::CheckFailed => "CHECK_FAILED",
            Self::StateInvalidJson => "STATE_INVALID_JSON",
            Self::StateInvalidSchema => "STATE_INVALID_SCHEMA",
            Self::PackIncompatible => "PACK_INCOMPATIBLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ManifestNotFound
            | Self::ManifestYamlError
            | Self::ManifestSchemaError
            | Self::PackManifestCorrupt => ErrorCategory::Manifest,
            Self::PackNotFound
            | Self::PackStoreMissing
            | Self::PackPathNotFound
            | Self::PackNotDirectory
            | Self::GitCloneFailed => ErrorCategory::Pack,
            Self::StoreInvalidConfig
            | Self::StoreInvalidSource
            | Self::StoreInstallFailed
            | Self::StorePermissionDenied
            | Self::StoreDiskFull
            | Self::StoreReadonlyFs
            | Self::StoreCreateFailed => ErrorCategory::Store,
            Self::RegistryReadError
            | Self::RegistryInvalidJson
            | Self::RegistryInvalidSchema
            | Self::RegistrySaveError
            | Self::RegistrySaveInvalid
            | Self::RegistryDirError
            | Self::RegistryInvalidInput
            | Self::RegistryInvalidPath => ErrorCategory::Registry,
            Self::InvalidArchetypeRef
            | Self::ArchetypeNotFound
            | Self::TemplateDirNotFound
            | Self::VersionNotFound
            | Self::GenerateConflict => ErrorCategory::Generation,
            Self::InputRequired | Self::InputValidationFailed | Self::UserCancelled => {
                ErrorCategory::Input
            }
            Self::PatchEngineError | Self::PatchApplicationFailed => ErrorCategory::Patch,
            Self::HookExecutionFailed | Self::CheckFailed => ErrorCategory::Hook,
            Self::StateInvalidJson | Self::StateInvalidSchema => ErrorCategory::State,
            Self::PackIncompatible => ErrorCategory::Compatibility,
            Self::InternalError => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type of the engine.
///
/// Operational errors (bad user input, missing resources, conflicts) carry an
/// actionable `hint` and are surfaced verbatim. Programming errors (violated
/// invariants, relative paths where absolute ones are required) set the
/// `programming` flag and carry no hint.
#[derive(Debug)]
pub struct ScaffoldError {
    code: ErrorCode,
    message: String,
    hint: Option<String>,
    details: BTreeMap<String, serde_json::Value>,
    source: Option<Source>,
    programming: bool,
}

impl ScaffoldError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            details: BTreeMap::new(),
            source: None,
            programming: false,
        }
    }

    /// Shorthand for invariant violations.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message).programming()
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Mark this error as a programming error rather than an operational one.
    #[must_use]
    pub fn programming(mut self) -> Self {
        self.programming = true;
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn details(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.details
    }

    pub fn is_programming(&self) -> bool {
        self.programming
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for ScaffoldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScaffoldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn std::error::Error + 'static))
    }
}
