//! Command/response protocol engine for SHSWorks remote control.
//!
//! This module is the wire-protocol boundary of the crate:
//!
//! ```text
//! ┌─────────────────┐          TCP socket           ┌─────────────────────┐
//! │   ShsClient     │ ◄────────────────────────────►│      SHSWorks       │
//! │   (Session)     │  pipe-delimited, CRLF, cp1252 │  (instrument host)  │
//! └─────────────────┘                               └─────────────────────┘
//! ```
//!
//! `session` owns the socket, job-id sequencing, framing, busy-state
//! recovery and the header checks; `answer` decodes the validated answer
//! string into typed values. The session never uses `answer` for its own
//! control fields — the job id and error code are decoded inline because
//! they are load-bearing for protocol correctness.

pub mod answer;
pub mod session;

pub use session::{command_name, Arg, Session, DEFAULT_PORT, MAX_COMMAND_LENGTH};
