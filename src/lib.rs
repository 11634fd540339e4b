//! SHSWorks TCP/IP Client Library
//!
//! Remote control for SHSWorks wavefront-sensor software over its
//! line-oriented TCP protocol:
//!
//! - `protocol` - the session engine (framing, job-id sequencing, busy-state
//!   recovery) and the answer grammar decoders
//! - `client` - one typed method per remote operation, opcodes 0-45
//! - `models` - decoded value types and wire enums
//! - `config` - JSON connection settings
//! - `error` - the failure taxonomy
//!
//! # Usage
//!
//! ```ignore
//! use shsworks_client::ShsClient;
//!
//! let mut client = ShsClient::new("localhost", 29800);
//! let version = client.get_version()?;
//! let settings = client.get_cam_settings()?;
//! println!("{version}: averaging {} frames", settings["SHS"]["AVE"]);
//! ```
//!
//! The engine is synchronous and strictly half-duplex: one socket, one
//! outstanding command, no background threads. Callers that need a deadline
//! impose it at the socket layer via
//! [`Session::set_read_timeout`](protocol::Session::set_read_timeout).

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;

pub use client::ShsClient;
pub use config::{default_config_path, ClientConfig};
pub use error::{Result, ShsError};
pub use models::{CamSettings, Camera, CamSetting, Evaluation, FieldPart, FieldStats, Number, ParamValue};
pub use protocol::{command_name, Arg, Session};
