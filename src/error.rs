//! Error types for the SHSWorks TCP/IP client.
//!
//! Every failure that references a command carries a human-readable
//! attribution of the form `<method>(): <exact wire text sent>` so a caller
//! can reproduce the failing exchange verbatim.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShsError>;

/// Client-side error taxonomy.
///
/// `ConnectionFailure`, `ConnectionLost`, `UnknownCommand`, `Protocol` and
/// `StillBusy` all carry the attribution of the command in flight when the
/// failure occurred. `InvalidArgument` is raised before anything touches the
/// wire; `UnexpectedFormat` is raised after a successful exchange when the
/// payload does not decode into the expected shape.
#[derive(Debug, Error)]
pub enum ShsError {
    /// The remote endpoint refused the connection.
    #[error(
        "connection failed: check that SHSWorks is running, \
         TCP/IP remote control is enabled and the port is {port}"
    )]
    ConnectionFailure {
        /// Port the connect was attempted on.
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The peer reset or closed the connection mid-transaction.
    #[error("connection lost during {command}")]
    ConnectionLost {
        /// Attribution of the command being sent.
        command: String,
        #[source]
        source: io::Error,
    },

    /// SHSWorks does not recognize the opcode.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// Attribution of the command being sent.
        command: String,
    },

    /// SHSWorks executed the command but reported a non-success error code.
    #[error(
        "SHSWorks reported an error during {command}: {code}{}",
        .message.as_ref().map(|m| format!(" {m}")).unwrap_or_default()
    )]
    Protocol {
        /// Attribution of the command being sent.
        command: String,
        /// Raw error-code token (field index 3 of the answer).
        code: String,
        /// Extended message from the field after the error code, if present.
        message: Option<String>,
    },

    /// Local pre-send validation failure.
    #[error("{0}")]
    InvalidArgument(String),

    /// The answer payload is malformed for the expected decode shape.
    #[error("unexpected answer format: {0}")]
    UnexpectedFormat(String),

    /// The live/static acquisition lock persisted past the bounded recovery.
    #[error(
        "SHSWorks still blocked (live or static mode) after \
         {attempts} stop-live attempts during {command}"
    )]
    StillBusy {
        /// Number of stop-live rounds performed before giving up.
        attempts: u32,
        /// Attribution of the command being retried.
        command: String,
    },

    /// Pass/fail queries came back empty because evaluation is switched off.
    #[error("the pass/fail evaluation is switched off")]
    PassFailEvaluationOff,

    /// Pass/fail queries came back empty because no items are selected.
    #[error("no pass/fail items are selected")]
    NoPassFailItemsSelected,

    /// Any other socket I/O failure during a transaction.
    #[error("I/O error during {command}")]
    Io {
        /// Attribution of the command being sent.
        command: String,
        #[source]
        source: io::Error,
    },
}
