//! Error types for talos-core

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Profile document could not be loaded, parsed, or merged
    #[error("profile resolution error: {0}")]
    Resolution(String),

    /// The profile inheritance chain loops back on itself
    #[error("cyclic profile inheritance: {chain}")]
    CyclicInheritance {
        /// The reference path that closed the cycle
        chain: String,
    },

    /// A module name is already taken on the target mount point
    #[error("duplicate module '{name}' on mount point '{point}'")]
    DuplicateMount {
        /// Mount point name
        point: String,
        /// Module name
        name: String,
    },

    /// A module's initialization entry point failed; already-mounted
    /// modules have been torn down
    #[error("failed to mount module '{name}': {source}")]
    MountFailed {
        /// Module name from the descriptor
        name: String,
        /// Underlying module error
        #[source]
        source: anyhow::Error,
    },

    /// No mount point with the given name exists
    #[error("unknown mount point '{0}'")]
    UnknownMountPoint(String),

    /// No usable provider for the current turn
    #[error("no usable provider: {0}")]
    ProviderUnavailable(String),

    /// LLM provider error (after any retries)
    #[error("llm error: {0}")]
    Llm(#[from] talos_llm::Error),

    /// Tool dispatch error
    #[error("tool error: {0}")]
    Tool(#[from] talos_tools::Error),

    /// Recipe definition or session-state error
    #[error("recipe error: {0}")]
    Recipe(String),

    /// No session with the given ID is known
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// A required approval was denied
    #[error("approval denied at stage '{stage}'")]
    ApprovalDenied {
        /// The denied stage name
        stage: String,
    },

    /// A stored checkpoint could not be decoded; the file is left untouched
    #[error("checkpoint corrupt for session {id}: {detail}")]
    CheckpointCorrupt {
        /// Session ID
        id: Uuid,
        /// Decode failure detail
        detail: String,
    },

    /// The turn was cancelled; context is at its last committed state
    #[error("turn cancelled")]
    Cancelled,

    /// Internal error (I/O, serialization, invariant breakage)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
