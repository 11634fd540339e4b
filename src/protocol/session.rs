//! TCP session engine for SHSWorks remote control.
//!
//! Owns the connection, the job-id sequence, command framing, answer
//! collection and the busy-state recovery. The protocol is strictly
//! half-duplex request/response over one socket: a command blocks the
//! calling thread until a full CRLF-terminated answer has been read or the
//! connection fails. A `Session` must not be shared across concurrent
//! callers — job-id sequencing and the last-sent-frame diagnostics are
//! single-owner state.
//!
//! # Wire format
//!
//! ```text
//! Start|{jid:03}|{mid:02}[|{arg}]*|\r\n     (trailing pipe when no args)
//! ```
//!
//! Frames are Windows-1252, never UTF-8 — a contract with SHSWorks that has
//! to be preserved bit-exactly.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use crate::error::{Result, ShsError};

/// Maximum encoded command length in bytes.
pub const MAX_COMMAND_LENGTH: usize = 4096;

/// Default SHSWorks remote-control port.
pub const DEFAULT_PORT: u16 = 29800;

/// Default number of stop-live rounds before giving up on a blocked
/// instrument.
pub const DEFAULT_BUSY_RETRY_LIMIT: u32 = 3;

/// Receive chunk size for the answer accumulation loop.
const RECV_CHUNK: usize = 512;

/// Opcode of the stop-live command used for busy-state recovery.
const STOP_LIVE_MID: u8 = 8;

/// Marker SHSWorks answers with while a live/static acquisition holds the
/// command lock.
const BUSY_MARKER: &str = "SHSWorks blocked (live or static mode)!";

/// Both case variants SHSWorks uses for an unrecognized opcode.
const UNKNOWN_COMMAND_MARKERS: [&str; 2] = ["Unknown Command", "Unknown command"];

/// Opcode → method-name table, used for error attribution only.
const COMMAND_NAMES: [&str; 46] = [
    "test",
    "open_live",
    "grab_org",
    "grab_ref",
    "evaluation",
    "load_setup",
    "import_par",
    "get_pf_indices",
    "close_live",
    "get_cam_settings",
    "set_cam_setting",
    "tilt_cal_org",
    "tilt_cal_ref",
    "import_spot_data",
    "export_spot_data",
    "eval_spot_data",
    "select_field",
    "delete_fields",
    "center_sample",
    "get_center_sample_state",
    "get_pf_names",
    "get_version",
    "get_first_zernike_index",
    "get_number_of_zernikes",
    "get_pf_values",
    "get_pf_result",
    "get_par",
    "set_par",
    "get_pf_item_value",
    "get_pf_item_result",
    "load_file",
    "save_file",
    "set_output_path",
    "set_output_name",
    "copy_data_from_to",
    "get_field_stats",
    "get_pf_item_use",
    "set_pf_item_use",
    "save_setup",
    "save_vcc_bmp",
    "save_radial_power_map",
    "get_radial_power_map_stats",
    "shs_freerun_state",
    "open_cameras",
    "close_cameras",
    "set_improc_cfg_path",
];

/// Human-readable name of an opcode, for diagnostics.
pub fn command_name(mid: u8) -> &'static str {
    COMMAND_NAMES.get(mid as usize).copied().unwrap_or("unknown")
}

/// A positional command argument in its wire string form.
///
/// `Display` produces the exact text placed between the pipes.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{value}"),
            Arg::Float(value) => write!(f, "{value}"),
            Arg::Str(value) => f.write_str(value),
            Arg::Path(value) => write!(f, "{}", value.display()),
        }
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Path(value.to_path_buf())
    }
}

impl From<PathBuf> for Arg {
    fn from(value: PathBuf) -> Self {
        Arg::Path(value)
    }
}

/// One TCP session with an SHSWorks instance.
///
/// The socket is owned exclusively and recreated on each connect. Dropping
/// the session closes the socket, so the connection is released on every
/// exit path; `close()` is available for explicit teardown and is safe to
/// call any number of times.
pub struct Session {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    jid: u32,
    sent_last: String,
    busy_retry_limit: u32,
    read_timeout: Option<Duration>,
}

impl Session {
    /// Create a session for `host:port`. No connection is made yet; the
    /// engine connects transparently before the first transmission.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Session {
            host: host.into(),
            port,
            stream: None,
            jid: 0,
            sent_last: String::new(),
            busy_retry_limit: DEFAULT_BUSY_RETRY_LIMIT,
            read_timeout: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current job counter. Increments exactly once per physical
    /// transmission and never decreases.
    pub fn jid(&self) -> u32 {
        self.jid
    }

    /// Whether the socket is currently open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// The exact wire text of the last transmitted frame.
    pub fn sent_last(&self) -> &str {
        &self.sent_last
    }

    /// Bound on stop-live recovery rounds before `StillBusy` is reported.
    pub fn set_busy_retry_limit(&mut self, limit: u32) {
        self.busy_retry_limit = limit;
    }

    /// Impose a deadline on the blocking answer read. The engine itself has
    /// no timers; this is the socket-layer hook for callers that need one.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.read_timeout = timeout;
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(timeout).map_err(|source| ShsError::Io {
                command: self.last_command(),
                source,
            })?;
        }
        Ok(())
    }

    /// Connect to SHSWorks. No-op if already open.
    pub fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|source| {
            ShsError::ConnectionFailure {
                port: self.port,
                source,
            }
        })?;
        if let Some(timeout) = self.read_timeout {
            stream
                .set_read_timeout(Some(timeout))
                .map_err(|source| ShsError::Io {
                    command: self.last_command(),
                    source,
                })?;
        }
        debug!(host = %self.host, port = self.port, "TCP/IP connection to SHSWorks established");
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the socket. Safe to call repeatedly or on a never-connected
    /// session.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("connection to SHSWorks closed");
        }
    }

    /// Send a command and return the full decoded answer on success.
    ///
    /// Frames the command, transmits it (connecting first if necessary),
    /// collects the CRLF-terminated answer and validates the header. When
    /// SHSWorks answers with the live/static busy marker, one stop-live
    /// exchange is issued and the original command is retransmitted with a
    /// fresh job id, up to the configured retry limit.
    pub fn send_command(&mut self, mid: u8, args: &[Arg]) -> Result<String> {
        let mut busy_rounds = 0;
        loop {
            let answer = self.exchange(mid, args)?;
            if !answer.contains(BUSY_MARKER) {
                return self.check_error_code(answer);
            }
            if busy_rounds >= self.busy_retry_limit {
                return Err(ShsError::StillBusy {
                    attempts: busy_rounds,
                    command: self.last_command(),
                });
            }
            busy_rounds += 1;
            warn!(
                attempt = busy_rounds,
                "SHSWorks blocked in live/static mode, stopping live dialog and retrying"
            );
            let stop_answer = self.exchange(STOP_LIVE_MID, &[])?;
            if !stop_answer.contains(BUSY_MARKER) {
                // validate and discard; a failed stop-live propagates
                self.check_error_code(stop_answer)?;
            }
        }
    }

    /// One physical command/answer exchange: frame, count, validate length,
    /// connect, transmit, collect, scan for the unknown-command markers.
    fn exchange(&mut self, mid: u8, args: &[Arg]) -> Result<String> {
        let frame = self.frame(mid, args);
        // the counter advances even for frames rejected below
        self.jid += 1;
        let (encoded, _, had_errors) = WINDOWS_1252.encode(&frame);
        if had_errors {
            return Err(ShsError::InvalidArgument(format!(
                "command contains characters outside the Windows-1252 wire charset: {frame:?}"
            )));
        }
        if encoded.len() > MAX_COMMAND_LENGTH {
            return Err(ShsError::InvalidArgument(format!(
                "the maximum command length is {MAX_COMMAND_LENGTH} bytes; \
                 the command {frame:?} is too long"
            )));
        }
        let encoded = encoded.into_owned();
        self.connect()?;
        self.sent_last = frame;
        debug!(command = %self.last_command(), "transmitting");

        let answer = self.transmit(&encoded)?;
        if UNKNOWN_COMMAND_MARKERS
            .iter()
            .any(|marker| answer.contains(marker))
        {
            return Err(ShsError::UnknownCommand {
                command: self.last_command(),
            });
        }
        Ok(answer)
    }

    /// Build the wire frame for the *current* job id.
    fn frame(&self, mid: u8, args: &[Arg]) -> String {
        let mut message = format!("Start|{:03}|{:02}", self.jid, mid);
        for arg in args {
            message.push('|');
            message.push_str(&arg.to_string());
        }
        if args.is_empty() {
            // the header always carries an argument slot, even when empty
            message.push('|');
        }
        message.push_str("\r\n");
        message
    }

    /// Write the encoded frame and accumulate reads until the answer ends
    /// in CRLF. A dead socket is dropped so the next send reconnects.
    fn transmit(&mut self, payload: &[u8]) -> Result<String> {
        let command = self.last_command();
        let Some(stream) = self.stream.as_mut() else {
            return Err(ShsError::Io {
                command,
                source: io::Error::new(io::ErrorKind::NotConnected, "socket closed before send"),
            });
        };
        match Self::exchange_on_stream(stream, payload) {
            Ok(raw) => {
                let (decoded, _, _) = WINDOWS_1252.decode(&raw);
                Ok(decoded.into_owned())
            }
            Err(source) => {
                self.close();
                Err(wire_error(command, source))
            }
        }
    }

    fn exchange_on_stream(stream: &mut TcpStream, payload: &[u8]) -> io::Result<Vec<u8>> {
        stream.write_all(payload)?;
        let mut answer = Vec::new();
        let mut chunk = [0u8; RECV_CHUNK];
        while !answer.ends_with(b"\r\n") {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection mid-answer",
                ));
            }
            answer.extend_from_slice(&chunk[..n]);
        }
        Ok(answer)
    }

    /// Validate the error-code token (field index 3). `"1="` is the only
    /// success marker; anything else fails with the token and, when present,
    /// the following field as an extended message.
    fn check_error_code(&self, answer: String) -> Result<String> {
        let (code, message) = {
            let fields: Vec<&str> = super::answer::split_answer(&answer);
            let code = fields.get(3).ok_or_else(|| {
                ShsError::UnexpectedFormat(format!(
                    "answer has fewer than four fields: {answer:?}"
                ))
            })?;
            if code.starts_with("1=") {
                // 1=Ok!
                return Ok(answer);
            }
            (
                code.to_string(),
                fields.get(4).map(|field| field.to_string()),
            )
        };
        Err(ShsError::Protocol {
            command: self.last_command(),
            code,
            message,
        })
    }

    /// Attribution string for error paths: `<name>(): <exact wire text>`,
    /// derived by re-parsing the last transmitted frame.
    fn last_command(&self) -> String {
        let sent = self.sent_last.trim_end_matches("\r\n");
        match sent
            .split('|')
            .nth(2)
            .and_then(|field| field.parse::<u8>().ok())
        {
            Some(mid) => format!("{}(): {sent}", command_name(mid)),
            None => format!("<none>(): {sent}"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("open", &self.is_open())
            .field("jid", &self.jid)
            .finish()
    }
}

/// Map a transaction-time I/O failure onto the error taxonomy: resets and
/// truncated answers are `ConnectionLost`, everything else stays `Io`.
fn wire_error(command: String, source: io::Error) -> ShsError {
    match source.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ShsError::ConnectionLost { command, source },
        _ => ShsError::Io { command, source },
    }
}
