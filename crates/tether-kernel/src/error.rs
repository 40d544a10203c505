//! Kernel error types.

use tether_engine::Exception;

/// Errors surfaced to the host as `{error, name, stack?}` responses.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Object token not present in the object table
    #[error("object reference {0} not found")]
    ReferenceNotFound(String),

    /// Fqn not present in any loaded assembly
    #[error("type '{0}' not found")]
    TypeNotFound(String),

    /// Member not declared anywhere in the type's hierarchy
    #[error("type '{fqn}' has no member '{member}'")]
    MemberNotFound { fqn: String, member: String },

    /// Override declares the wrong kind of member, or both kinds
    #[error("{0}")]
    OverrideKindConflict(String),

    /// Two overrides for the same member
    #[error("duplicate override for member '{0}'")]
    DuplicateOverride(String),

    #[error("cannot set value of immutable property '{property}' of '{fqn}'")]
    ImmutablePropertyWrite { fqn: String, property: String },

    /// `invoke` on an async method or `begin` on a sync one
    #[error("{0}")]
    WrongCallStyle(String),

    #[error("cannot begin async method '{method}' while a synchronous callback is in progress ({sync})")]
    AsyncWhileSyncCallback { method: String, sync: String },

    #[error("cannot process '{0}' while waiting for a synchronous callback to complete")]
    NestedAsyncNotAllowed(String),

    #[error("{0}")]
    MissingRequiredArgument(String),

    #[error("too many arguments: '{method}' takes {expected}, got {actual}")]
    TooManyArguments {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("missing required property '{property}' of struct '{fqn}'")]
    MissingRequiredProperty { fqn: String, property: String },

    /// Value does not fit the declared type
    #[error("{0}")]
    TypeMismatch(String),

    /// Every alternative of a union failed; one message per attempt
    #[error("value did not match any type in the union: {}", .0.join("; "))]
    NoMatchingUnionMember(Vec<String>),

    #[error("multiple versions of '{name}' requested: {loaded} is loaded, {requested} was requested")]
    VersionConflict {
        name: String,
        loaded: String,
        requested: String,
    },

    /// Structurally invalid wire value
    #[error("{0}")]
    MalformedWireValue(String),

    /// Structurally invalid request
    #[error("{0}")]
    MalformedRequest(String),

    #[error("member '{member}' of '{fqn}' is not static")]
    NotStatic { fqn: String, member: String },

    #[error("type '{0}' is not a class and cannot be created")]
    NotConstructible(String),

    #[error("assembly '{0}' is not loaded")]
    AssemblyNotFound(String),

    #[error("future {0} not found")]
    FutureNotFound(String),

    #[error("future {0} has not settled yet")]
    FuturePending(String),

    #[error("callback {0} not found")]
    CallbackNotFound(String),

    /// Channel closed or exit requested while a callback was outstanding
    #[error("interrupted before callback {0} returned")]
    Interrupted(String),

    /// Exception raised by native code or reported by the host
    #[error("{}", .0.message)]
    Thrown(Exception),

    /// Package extraction failure
    #[error("archive error: {0}")]
    Archive(String),

    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl KernelError {
    /// Stable kind name reported in the `name` field of error responses.
    pub fn name(&self) -> &str {
        match self {
            KernelError::ReferenceNotFound(_) => "ReferenceNotFound",
            KernelError::TypeNotFound(_) => "TypeNotFound",
            KernelError::MemberNotFound { .. } => "MemberNotFound",
            KernelError::OverrideKindConflict(_) => "OverrideKindConflict",
            KernelError::DuplicateOverride(_) => "DuplicateOverride",
            KernelError::ImmutablePropertyWrite { .. } => "ImmutablePropertyWrite",
            KernelError::WrongCallStyle(_) => "WrongCallStyle",
            KernelError::AsyncWhileSyncCallback { .. } => "AsyncWhileSyncCallback",
            KernelError::NestedAsyncNotAllowed(_) => "NestedAsyncNotAllowed",
            KernelError::MissingRequiredArgument(_) => "MissingRequiredArgument",
            KernelError::TooManyArguments { .. } => "TooManyArguments",
            KernelError::MissingRequiredProperty { .. } => "MissingRequiredProperty",
            KernelError::TypeMismatch(_) => "TypeMismatch",
            KernelError::NoMatchingUnionMember(_) => "NoMatchingUnionMember",
            KernelError::VersionConflict { .. } => "VersionConflict",
            KernelError::MalformedWireValue(_) => "MalformedWireValue",
            KernelError::MalformedRequest(_) => "MalformedRequest",
            KernelError::NotStatic { .. } => "NotStatic",
            KernelError::NotConstructible(_) => "NotConstructible",
            KernelError::AssemblyNotFound(_) => "AssemblyNotFound",
            KernelError::FutureNotFound(_) => "FutureNotFound",
            KernelError::FuturePending(_) => "FuturePending",
            KernelError::CallbackNotFound(_) => "CallbackNotFound",
            KernelError::Interrupted(_) => "Interrupted",
            KernelError::Thrown(e) => &e.name,
            KernelError::Archive(_) => "ArchiveError",
            KernelError::Io(_) => "IoError",
            KernelError::Json(_) => "JsonError",
        }
    }

    /// Stack text, for errors that carry one.
    pub fn stack(&self) -> Option<&str> {
        match self {
            KernelError::Thrown(e) => e.stack.as_deref(),
            _ => None,
        }
    }

    /// Convert into an engine exception, keeping the kind name.
    pub fn into_exception(self) -> Exception {
        match self {
            KernelError::Thrown(e) => e,
            other => Exception::new(other.name().to_string(), other.to_string()),
        }
    }
}

impl From<Exception> for KernelError {
    fn from(e: Exception) -> Self {
        KernelError::Thrown(e)
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
