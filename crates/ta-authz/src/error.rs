// error.rs — Error types for the authorization engine.
//
// Only configuration problems and engine safeguards cross the `Authorizer`
// boundary. Unification mismatches and host access failures are absorbed by
// the resolver and turned into backtracking; "no rule applies" is a plain
// `false`, never an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::term::InstanceId;

/// Errors surfaced by the engine to the embedding application.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A query argument or specializer names a class that was never registered.
    #[error("class '{class}' is not registered")]
    UnregisteredClass { class: String },

    /// A class was registered twice under the same tag.
    #[error("class '{class}' is already registered")]
    DuplicateClass { class: String },

    /// A rule body calls a predicate with no definition in the knowledge base.
    #[error("rule body calls undefined predicate {name}/{arity}")]
    UnknownRule { name: String, arity: usize },

    /// A rule is structurally invalid and was rejected at load time.
    #[error("invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// An inline query in a policy source has no solution; the source was
    /// not loaded.
    #[error("inline query failed in {source_name}: {query}")]
    InlineQueryFailed { source_name: String, query: String },

    /// A constant could not be registered.
    #[error("invalid constant '{name}': {reason}")]
    InvalidConstant { name: String, reason: String },

    /// The engine configuration could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// The query executed more goals than `EngineConfig::max_steps` allows.
    #[error("query exceeded the step limit of {limit} goals")]
    StepLimitExceeded { limit: usize },

    /// A writer panicked while holding the engine state lock.
    #[error("engine state lock poisoned: {0}")]
    LockPoisoned(String),

    /// A host access failure. The resolver converts this into goal failure;
    /// it only escapes through direct `HostBridge` use.
    #[error("host access failed: {0}")]
    Host(#[from] HostError),
}

/// Failures reported by the host application (or the built-in methods)
/// while reading a field or invoking a method.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    /// The class does not declare (or the host does not expose) this field.
    #[error("{class} has no field '{field}'")]
    UnknownField { class: String, field: String },

    /// The class does not declare (or the host does not expose) this method.
    #[error("{class} has no method '{method}'")]
    UnknownMethod { class: String, method: String },

    /// The handle does not refer to a live host object.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// The receiver is not something members can be accessed on.
    #[error("cannot access members on {0}")]
    NotAnObject(String),

    /// The method was called with arguments it cannot accept.
    #[error("bad arguments to '{method}': {reason}")]
    BadArguments { method: String, reason: String },

    /// The host's accessor itself failed.
    #[error("{0}")]
    Failed(String),
}
