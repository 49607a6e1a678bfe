//! Message Log
//!
//! Captures the primary header of selected software-bus messages to a log
//! file on command, and plays previously captured headers back into the
//! telemetry stream at a bounded rate.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`field_map`] | Declarative JSON key → table field bindings |
//! | [`table`] | Message Log table: load (all-or-nothing commit), dump, status |
//! | [`msglog`] | Idle / Logging / Playback state machine and the child task hook |
//! | [`log_file`] | Text encoding of captured header entries |
//! | [`transport`] | Software bus seam (subscribe, unsubscribe, publish) |
//!
//! # Example table
//!
//! ```text
//! {
//!    "file": {
//!      "path-base-name": "/cf/msglog_",
//!      "extension": ".txt",
//!      "entry-cnt": 10
//!    },
//!    "playbk-delay": 4
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod field_map;
pub mod log_file;
pub mod msglog;
pub mod table;
pub mod transport;

pub use msglog::{ActivityKind, ChildFuncStatus, MsgLog, MsgLogStatus};
pub use table::{FileCfg, MsgLogTable, MsgLogTblData, TblLoadStatus};
pub use transport::{MemoryTransport, Transport};

/// Software bus message identifier
pub type MsgId = u16;

/// Bytes captured from the front of each logged message
pub const HEADER_LEN: usize = 16;

/// Captured header block, stored and replayed as an opaque unit
pub type HeaderBlock = [u8; HEADER_LEN];

/// Path buffer size in bytes, terminator included
pub const OS_MAX_PATH_LEN: usize = 64;

/// Extension buffer size in bytes, terminator included
pub const FILE_EXT_MAX_LEN: usize = 8;

/// Largest table file accepted by a load (bytes)
pub const JSON_FILE_MAX_CHAR: usize = 4096;

/// Table name written into dump headers
pub const TBL_NAME: &str = "Message Log";

// Event ids reported with every diagnostic
pub const MSGLOG_BASE_EID: u16 = 200;
pub const MSGLOG_PERIODIC_CMD_EID: u16 = MSGLOG_BASE_EID;
pub const MSGLOG_START_LOG_CMD_EID: u16 = MSGLOG_BASE_EID + 1;
pub const MSGLOG_STOP_LOG_CMD_EID: u16 = MSGLOG_BASE_EID + 2;
pub const MSGLOG_START_PLAYBK_CMD_EID: u16 = MSGLOG_BASE_EID + 3;
pub const MSGLOG_STOP_PLAYBK_CMD_EID: u16 = MSGLOG_BASE_EID + 4;
pub const MSGLOG_WRITE_ENTRY_EID: u16 = MSGLOG_BASE_EID + 5;

pub const MSGLOGTBL_BASE_EID: u16 = 220;
pub const MSGLOGTBL_LOAD_EID: u16 = MSGLOGTBL_BASE_EID;
pub const MSGLOGTBL_LOAD_ERR_EID: u16 = MSGLOGTBL_BASE_EID + 1;
pub const MSGLOGTBL_DUMP_EID: u16 = MSGLOGTBL_BASE_EID + 2;
pub const MSGLOGTBL_DUMP_ERR_EID: u16 = MSGLOGTBL_BASE_EID + 3;

/// File operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoOp {
    Open,
    Read,
    Write,
    Close,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            IoOp::Open => "open",
            IoOp::Read => "read",
            IoOp::Write => "write",
            IoOp::Close => "close",
        };
        f.write_str(op)
    }
}

#[derive(Error, Debug)]
pub enum MsgLogError {
    #[error("{requested} rejected: {active:?} already active")]
    AlreadyActive {
        requested: &'static str,
        active: ActivityKind,
    },
    #[error("{0} ignored: not active")]
    NotActive(&'static str),
    #[error("File {op} error on {path:?}: {source}")]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No log file available for playback")]
    NoLogFile,
    #[error("Table load rejected: {loaded} of {required} required data objects populated")]
    ConfigInvalid { loaded: usize, required: usize },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Table text is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },
    #[error("Error creating dump file {path:?}: {source}")]
    StorageCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl MsgLogError {
    /// Benign errors are reported but leave nothing to recover
    pub fn is_benign(&self) -> bool {
        matches!(self, MsgLogError::NotActive(_))
    }
}

pub type Result<T> = std::result::Result<T, MsgLogError>;

/// Playback telemetry packet, one captured header per packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybkPkt {
    /// Log file entry being telemetered (0-based)
    pub log_file_entry: u16,
    /// Captured header bytes
    pub hdr: HeaderBlock,
}

impl PlaybkPkt {
    /// Header as uppercase hex text
    pub fn hdr_txt(&self) -> String {
        log_file::to_hex(&self.hdr)
    }
}
