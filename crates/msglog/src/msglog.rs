//! Message Log controller
//!
//! Logging and playback share one file handle, so the controller holds a
//! single [`Activity`] slot: `Idle`, `Logging` or `Playback`. The open file
//! lives inside the active session and is closed when the session leaves the
//! slot.
//!
//! ```text
//!            start_log(id)                  start_playbk()
//!   Logging <------------- Idle -------------------------> Playback
//!      |                   ^  ^                                |
//!      +-------------------+  +--------------------------------+
//!  stop_log(), entry limit,      stop_playbk(), end of file,
//!  write error                   read error
//! ```
//!
//! Inbound messages arrive through [`MsgLog::on_message`]. Playback is paced
//! by [`MsgLog::run_child_func`], which the scheduler calls once per tick.

use crate::log_file;
use crate::table::MsgLogTable;
use crate::transport::Transport;
use crate::{
    HeaderBlock, IoOp, MsgId, MsgLogError, PlaybkPkt, Result, TblLoadStatus,
    MSGLOG_PERIODIC_CMD_EID, MSGLOG_START_LOG_CMD_EID, MSGLOG_START_PLAYBK_CMD_EID,
    MSGLOG_STOP_LOG_CMD_EID, MSGLOG_STOP_PLAYBK_CMD_EID, MSGLOG_WRITE_ENTRY_EID, OS_MAX_PATH_LEN,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, LineWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Idle,
    Logging,
    Playback,
}

struct LogSession {
    msg_id: MsgId,
    filename: PathBuf,
    writer: LineWriter<File>,
    entry_cnt: u16,
}

struct PlaybkSession {
    filename: PathBuf,
    reader: BufReader<File>,
    line_no: usize,
    entry_cnt: u16,
    delay_remaining: u16,
}

impl PlaybkSession {
    /// Next stored entry, `None` at end of file. Blank lines are skipped.
    fn next_entry(&mut self) -> io::Result<Option<(MsgId, HeaderBlock)>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                break;
            }
        }

        log_file::parse_entry(&line).map(Some).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed log entry on line {}", self.line_no),
            )
        })
    }
}

enum Activity {
    Idle,
    Logging(LogSession),
    Playback(PlaybkSession),
}

impl Activity {
    fn kind(&self) -> ActivityKind {
        match self {
            Activity::Idle => ActivityKind::Idle,
            Activity::Logging(_) => ActivityKind::Logging,
            Activity::Playback(_) => ActivityKind::Playback,
        }
    }
}

/// Outcome of one child task tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFuncStatus {
    Idle,
    /// Logging is driven by message delivery, nothing to do on a tick
    Logging,
    /// Playback is waiting out the inter-entry delay
    Waiting { remaining: u16 },
    /// Playback sent the entry with this sequence number
    Sent(u16),
    /// Playback reached end of file after sending this many entries
    Completed(u16),
}

/// Housekeeping snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLogStatus {
    pub activity: ActivityKind,
    pub msg_id: Option<MsgId>,
    pub log_entry_cnt: u16,
    pub playbk_entry_cnt: u16,
    pub filename: Option<PathBuf>,
    pub tbl_loaded: bool,
    pub tbl_last_load_status: TblLoadStatus,
    pub tbl_last_load_cnt: usize,
}

/// Message log and playback controller
pub struct MsgLog<T: Transport> {
    tbl: MsgLogTable,
    transport: T,
    activity: Activity,
    last_log_file: Option<PathBuf>,
    file_seq: u32,
}

impl<T: Transport> MsgLog<T> {
    pub fn new(app_name: impl Into<String>, transport: T) -> Self {
        Self {
            tbl: MsgLogTable::new(app_name),
            transport,
            activity: Activity::Idle,
            last_log_file: None,
            file_seq: 0,
        }
    }

    pub fn table(&self) -> &MsgLogTable {
        &self.tbl
    }

    pub fn table_mut(&mut self) -> &mut MsgLogTable {
        &mut self.tbl
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn activity(&self) -> ActivityKind {
        self.activity.kind()
    }

    /// Log file playback will read from
    pub fn last_log_file(&self) -> Option<&Path> {
        self.last_log_file.as_deref()
    }

    pub fn status(&self) -> MsgLogStatus {
        let (msg_id, log_entry_cnt, playbk_entry_cnt, filename) = match &self.activity {
            Activity::Idle => (None, 0, 0, None),
            Activity::Logging(s) => (Some(s.msg_id), s.entry_cnt, 0, Some(s.filename.clone())),
            Activity::Playback(s) => (None, 0, s.entry_cnt, Some(s.filename.clone())),
        };

        MsgLogStatus {
            activity: self.activity.kind(),
            msg_id,
            log_entry_cnt,
            playbk_entry_cnt,
            filename,
            tbl_loaded: self.tbl.loaded(),
            tbl_last_load_status: self.tbl.last_load_status(),
            tbl_last_load_cnt: self.tbl.last_load_cnt(),
        }
    }

    /// Reset status reporting; table data and activity are not affected
    pub fn reset_status(&mut self) {
        self.tbl.reset_status();
    }

    pub fn load_tbl(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        self.tbl.load(path)
    }

    pub fn dump_tbl(&self, path: impl AsRef<Path>) -> Result<()> {
        self.tbl.dump(path)
    }

    fn reject_if_active(&self, requested: &'static str, eid: u16) -> Result<()> {
        match self.activity.kind() {
            ActivityKind::Idle => Ok(()),
            active => {
                error!(eid, "{} rejected, {:?} already active", requested, active);
                Err(MsgLogError::AlreadyActive { requested, active })
            }
        }
    }

    fn next_log_filename(&mut self, msg_id: MsgId) -> PathBuf {
        let file = &self.tbl.data().file;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let name = format!(
            "{}{:04X}_{}_{}{}",
            file.path_base_name, msg_id, timestamp, self.file_seq, file.extension
        );
        self.file_seq = self.file_seq.wrapping_add(1);
        PathBuf::from(name)
    }

    /// Generated names share the path buffer limit with the base name
    fn check_name_len(filename: &Path) -> io::Result<()> {
        let len = filename.as_os_str().len();
        if len >= OS_MAX_PATH_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "log file name is {} bytes, limit is {}",
                    len,
                    OS_MAX_PATH_LEN - 1
                ),
            ));
        }
        Ok(())
    }

    /// Start capturing headers of `msg_id` messages to a new log file
    pub fn start_log(&mut self, msg_id: MsgId) -> Result<()> {
        self.reject_if_active("Start log", MSGLOG_START_LOG_CMD_EID)?;

        let filename = self.next_log_filename(msg_id);
        let file = Self::check_name_len(&filename)
            .and_then(|()| {
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&filename)
            })
            .map_err(|source| {
                error!(
                    eid = MSGLOG_START_LOG_CMD_EID,
                    "Start log failed, error creating {:?}: {}", filename, source
                );
                MsgLogError::Io {
                    op: IoOp::Open,
                    path: filename.clone(),
                    source,
                }
            })?;

        if let Err(e) = self.transport.subscribe(msg_id) {
            error!(
                eid = MSGLOG_START_LOG_CMD_EID,
                "Start log failed, subscription to 0x{:04X} refused: {}", msg_id, e
            );
            drop(file);
            if let Err(rm) = fs::remove_file(&filename) {
                warn!("Could not remove unused log file {:?}: {}", filename, rm);
            }
            return Err(e);
        }

        info!(
            eid = MSGLOG_START_LOG_CMD_EID,
            "Logging messages 0x{:04X} to {:?}, limit {} entries",
            msg_id,
            filename,
            self.tbl.data().file.entry_cnt.max(1)
        );

        self.activity = Activity::Logging(LogSession {
            msg_id,
            filename,
            writer: LineWriter::new(file),
            entry_cnt: 0,
        });
        Ok(())
    }

    fn close_log(&mut self, session: LogSession) -> Result<u16> {
        let LogSession {
            msg_id,
            filename,
            mut writer,
            entry_cnt,
        } = session;

        let flushed = writer.flush();
        drop(writer);

        if let Err(e) = self.transport.unsubscribe(msg_id) {
            warn!(
                eid = MSGLOG_STOP_LOG_CMD_EID,
                "Unsubscribe from 0x{:04X} failed: {}", msg_id, e
            );
        }
        self.last_log_file = Some(filename.clone());

        if let Err(source) = flushed {
            error!(
                eid = MSGLOG_STOP_LOG_CMD_EID,
                "Error closing log file {:?}: {}", filename, source
            );
            return Err(MsgLogError::Io {
                op: IoOp::Close,
                path: filename,
                source,
            });
        }

        info!(
            eid = MSGLOG_STOP_LOG_CMD_EID,
            "Stopped logging 0x{:04X}, {} entries in {:?}", msg_id, entry_cnt, filename
        );
        Ok(entry_cnt)
    }

    /// Stop logging; returns the number of entries written
    pub fn stop_log(&mut self) -> Result<u16> {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Logging(session) => self.close_log(session),
            other => {
                self.activity = other;
                warn!(eid = MSGLOG_STOP_LOG_CMD_EID, "Stop log ignored, logging not active");
                Err(MsgLogError::NotActive("Stop log"))
            }
        }
    }

    /// Message delivery callback. Returns whether the message was captured.
    ///
    /// The entry count is checked after each write, so a limit of N writes
    /// exactly N entries and stops logging on the N-th. A limit of 0 acts
    /// like 1.
    pub fn on_message(&mut self, msg_id: MsgId, payload: &[u8]) -> Result<bool> {
        let limit = self.tbl.data().file.entry_cnt.max(1);

        let Activity::Logging(session) = &mut self.activity else {
            return Ok(false);
        };
        if session.msg_id != msg_id {
            return Ok(false);
        }

        let hdr = log_file::capture_header(payload);
        let written = session
            .writer
            .write_all(log_file::encode_entry(msg_id, &hdr).as_bytes());

        if let Err(source) = written {
            let path = session.filename.clone();
            error!(
                eid = MSGLOG_WRITE_ENTRY_EID,
                "Error writing entry {} to {:?}: {}", session.entry_cnt, path, source
            );
            // The write error is the one worth reporting
            if let Err(e) = self.stop_log() {
                debug!(eid = MSGLOG_WRITE_ENTRY_EID, "Close after write error: {}", e);
            }
            return Err(MsgLogError::Io {
                op: IoOp::Write,
                path,
                source,
            });
        }

        session.entry_cnt = session.entry_cnt.saturating_add(1);
        debug!(
            eid = MSGLOG_WRITE_ENTRY_EID,
            "Logged 0x{:04X} entry {}", msg_id, session.entry_cnt
        );

        if session.entry_cnt >= limit {
            info!(
                eid = MSGLOG_WRITE_ENTRY_EID,
                "Log entry limit {} reached", limit
            );
            self.stop_log()?;
        }

        Ok(true)
    }

    /// Start playing back the most recent log file
    pub fn start_playbk(&mut self) -> Result<()> {
        self.reject_if_active("Start playback", MSGLOG_START_PLAYBK_CMD_EID)?;

        let Some(filename) = self.last_log_file.clone() else {
            error!(
                eid = MSGLOG_START_PLAYBK_CMD_EID,
                "Start playback failed, no log file has been created"
            );
            return Err(MsgLogError::NoLogFile);
        };

        let file = File::open(&filename).map_err(|source| {
            error!(
                eid = MSGLOG_START_PLAYBK_CMD_EID,
                "Start playback failed, error opening {:?}: {}", filename, source
            );
            MsgLogError::Io {
                op: IoOp::Open,
                path: filename.clone(),
                source,
            }
        })?;

        let delay = self.tbl.data().playbk_delay;
        info!(
            eid = MSGLOG_START_PLAYBK_CMD_EID,
            "Playing back {:?}, {} tick delay", filename, delay
        );

        self.activity = Activity::Playback(PlaybkSession {
            filename,
            reader: BufReader::new(file),
            line_no: 0,
            entry_cnt: 0,
            delay_remaining: delay,
        });
        Ok(())
    }

    fn close_playbk(session: PlaybkSession) -> u16 {
        info!(
            eid = MSGLOG_STOP_PLAYBK_CMD_EID,
            "Stopped playback of {:?} after {} entries", session.filename, session.entry_cnt
        );
        session.entry_cnt
    }

    /// Stop playback; returns the number of entries sent
    pub fn stop_playbk(&mut self) -> Result<u16> {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Playback(session) => Ok(Self::close_playbk(session)),
            other => {
                self.activity = other;
                warn!(
                    eid = MSGLOG_STOP_PLAYBK_CMD_EID,
                    "Stop playback ignored, playback not active"
                );
                Err(MsgLogError::NotActive("Stop playback"))
            }
        }
    }

    /// Periodic child task hook, called once per scheduler tick
    pub fn run_child_func(&mut self) -> Result<ChildFuncStatus> {
        let delay = self.tbl.data().playbk_delay;

        let session = match &mut self.activity {
            Activity::Idle => return Ok(ChildFuncStatus::Idle),
            Activity::Logging(_) => return Ok(ChildFuncStatus::Logging),
            Activity::Playback(session) => session,
        };

        session.delay_remaining = session.delay_remaining.saturating_sub(1);
        if session.delay_remaining > 0 {
            return Ok(ChildFuncStatus::Waiting {
                remaining: session.delay_remaining,
            });
        }

        match session.next_entry() {
            Ok(Some((msg_id, hdr))) => {
                let pkt = PlaybkPkt {
                    log_file_entry: session.entry_cnt,
                    hdr,
                };
                session.entry_cnt = session.entry_cnt.wrapping_add(1);
                session.delay_remaining = delay;

                debug!(
                    eid = MSGLOG_PERIODIC_CMD_EID,
                    "Playback entry {}: 0x{:04X} {}",
                    pkt.log_file_entry,
                    msg_id,
                    pkt.hdr_txt()
                );
                if let Err(e) = self.transport.publish(pkt) {
                    error!(
                        eid = MSGLOG_PERIODIC_CMD_EID,
                        "Playback packet {} not sent: {}", pkt.log_file_entry, e
                    );
                }
                Ok(ChildFuncStatus::Sent(pkt.log_file_entry))
            }
            Ok(None) => {
                let sent = self.stop_playbk()?;
                info!(
                    eid = MSGLOG_PERIODIC_CMD_EID,
                    "Playback complete, {} entries sent", sent
                );
                Ok(ChildFuncStatus::Completed(sent))
            }
            Err(source) => {
                let path = session.filename.clone();
                error!(
                    eid = MSGLOG_PERIODIC_CMD_EID,
                    "Error reading {:?}, playback stopped: {}", path, source
                );
                if let Err(e) = self.stop_playbk() {
                    debug!(eid = MSGLOG_PERIODIC_CMD_EID, "Close after read error: {}", e);
                }
                Err(MsgLogError::Io {
                    op: IoOp::Read,
                    path,
                    source,
                })
            }
        }
    }
}

impl<T: Transport> Drop for MsgLog<T> {
    fn drop(&mut self) {
        match self.activity.kind() {
            ActivityKind::Logging => {
                if let Err(e) = self.stop_log() {
                    debug!(eid = MSGLOG_STOP_LOG_CMD_EID, "Close on drop: {}", e);
                }
            }
            ActivityKind::Playback => {
                if let Err(e) = self.stop_playbk() {
                    debug!(eid = MSGLOG_STOP_PLAYBK_CMD_EID, "Close on drop: {}", e);
                }
            }
            ActivityKind::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::HEADER_LEN;
    use tempfile::{tempdir, TempDir};

    fn msglog_in(dir: &TempDir, entry_cnt: u16, playbk_delay: u16) -> MsgLog<MemoryTransport> {
        let mut msglog = MsgLog::new("MSGLOG", MemoryTransport::new());
        let base = dir.path().join("msglog_");
        let tbl = serde_json::json!({
            "file": {
                "path-base-name": base.to_str().unwrap(),
                "extension": ".txt",
                "entry-cnt": entry_cnt
            },
            "playbk-delay": playbk_delay
        });
        msglog.table_mut().load_str(&tbl.to_string()).unwrap();
        msglog
    }

    fn header(seq: u8) -> [u8; 6] {
        [0x08, 0x01, 0xC0, seq, 0x00, 0x09]
    }

    #[test]
    fn test_start_log_subscribes_and_creates_file() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 5, 1);

        msglog.start_log(0x0801).unwrap();

        let status = msglog.status();
        assert_eq!(status.activity, ActivityKind::Logging);
        assert_eq!(status.msg_id, Some(0x0801));
        assert!(status.filename.as_ref().unwrap().exists());
        assert!(msglog.transport().is_subscribed(0x0801));
        let name = status.filename.unwrap();
        let name = name.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("msglog_0801_"));
        assert!(name.ends_with(".txt"));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 5, 1);
        msglog.start_log(0x0801).unwrap();

        let err = msglog.start_log(0x0802).unwrap_err();
        assert!(matches!(
            err,
            MsgLogError::AlreadyActive {
                active: ActivityKind::Logging,
                ..
            }
        ));
        assert!(matches!(
            msglog.start_playbk(),
            Err(MsgLogError::AlreadyActive { .. })
        ));
        assert_eq!(msglog.status().msg_id, Some(0x0801));
        assert!(!msglog.transport().is_subscribed(0x0802));
    }

    #[test]
    fn test_stop_when_idle_is_benign() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 5, 1);
        let before = msglog.status();

        let err = msglog.stop_log().unwrap_err();
        assert!(err.is_benign());
        assert!(matches!(
            msglog.stop_playbk(),
            Err(MsgLogError::NotActive(_))
        ));
        assert_eq!(msglog.status(), before);
    }

    #[test]
    fn test_only_target_messages_are_logged() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 10, 1);
        msglog.start_log(0x0801).unwrap();

        assert!(msglog.on_message(0x0801, &header(0)).unwrap());
        assert!(!msglog.on_message(0x0802, &header(1)).unwrap());
        assert!(msglog.on_message(0x0801, &header(2)).unwrap());

        assert_eq!(msglog.status().log_entry_cnt, 2);
        assert_eq!(msglog.stop_log().unwrap(), 2);
        assert!(!msglog.transport().is_subscribed(0x0801));

        let text = fs::read_to_string(msglog.last_log_file().unwrap()).unwrap();
        let entries: Vec<_> = text.lines().filter_map(log_file::parse_entry).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].1[3], 2);
    }

    #[test]
    fn test_entry_limit_stops_logging() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 3, 1);
        msglog.start_log(0x0801).unwrap();

        for seq in 0..3 {
            assert!(msglog.on_message(0x0801, &header(seq)).unwrap());
        }
        assert_eq!(msglog.activity(), ActivityKind::Idle);
        assert!(!msglog.on_message(0x0801, &header(3)).unwrap());

        let text = fs::read_to_string(msglog.last_log_file().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_zero_entry_limit_writes_one_entry() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 0, 1);
        msglog.start_log(0x0801).unwrap();

        assert!(msglog.on_message(0x0801, &header(0)).unwrap());
        assert_eq!(msglog.activity(), ActivityKind::Idle);
    }

    #[test]
    fn test_start_log_open_failure_stays_idle() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 3, 1);
        let missing = dir.path().join("missing").join("msglog_");
        let tbl = serde_json::json!({"file": {"path-base-name": missing.to_str().unwrap()}});
        msglog.table_mut().load_str(&tbl.to_string()).unwrap();

        let err = msglog.start_log(0x0801).unwrap_err();

        assert!(matches!(err, MsgLogError::Io { op: IoOp::Open, .. }));
        assert_eq!(msglog.activity(), ActivityKind::Idle);
        assert!(!msglog.transport().is_subscribed(0x0801));
    }

    #[test]
    fn test_log_filename_over_path_limit_is_refused() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 3, 1);
        let dir_name = dir.path().to_str().unwrap();
        let pad = OS_MAX_PATH_LEN - 1 - dir_name.len() - 1;
        let base = format!("{dir_name}/{}", "p".repeat(pad));
        assert_eq!(base.len(), OS_MAX_PATH_LEN - 1);
        let tbl = serde_json::json!({"file": {"path-base-name": base, "extension": ".txtlon"}});
        assert_eq!(msglog.table_mut().load_str(&tbl.to_string()).unwrap(), 2);

        let err = msglog.start_log(0x0801).unwrap_err();

        match err {
            MsgLogError::Io { op, source, .. } => {
                assert_eq!(op, IoOp::Open);
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(msglog.activity(), ActivityKind::Idle);
        assert!(!msglog.transport().is_subscribed(0x0801));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_log_filename_within_path_limit_is_created() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 3, 1);

        msglog.start_log(0x0801).unwrap();

        let name = msglog.status().filename.unwrap();
        assert!(name.as_os_str().len() < OS_MAX_PATH_LEN);
        assert!(name.exists());
    }

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn subscribe(&mut self, msg_id: MsgId) -> Result<()> {
            Err(MsgLogError::Transport(format!("no route for 0x{msg_id:04X}")))
        }

        fn unsubscribe(&mut self, _msg_id: MsgId) -> Result<()> {
            Ok(())
        }

        fn publish(&mut self, _pkt: PlaybkPkt) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_subscribe_failure_removes_file() {
        let dir = tempdir().unwrap();
        let mut msglog = MsgLog::new("MSGLOG", RefusingTransport);
        let base = dir.path().join("msglog_");
        let tbl = serde_json::json!({
            "file": {"path-base-name": base.to_str().unwrap(), "extension": ".txt", "entry-cnt": 2},
            "playbk-delay": 1
        });
        msglog.table_mut().load_str(&tbl.to_string()).unwrap();

        assert!(matches!(
            msglog.start_log(0x0801),
            Err(MsgLogError::Transport(_))
        ));
        assert_eq!(msglog.activity(), ActivityKind::Idle);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_playback_without_log_file() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 3, 1);

        assert!(matches!(msglog.start_playbk(), Err(MsgLogError::NoLogFile)));
        assert_eq!(msglog.activity(), ActivityKind::Idle);
    }

    #[test]
    fn test_playback_paced_by_delay() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 10, 3);
        msglog.start_log(0x0801).unwrap();
        msglog.on_message(0x0801, &header(0)).unwrap();
        msglog.on_message(0x0801, &header(1)).unwrap();
        msglog.stop_log().unwrap();

        msglog.start_playbk().unwrap();

        assert_eq!(
            msglog.run_child_func().unwrap(),
            ChildFuncStatus::Waiting { remaining: 2 }
        );
        assert_eq!(
            msglog.run_child_func().unwrap(),
            ChildFuncStatus::Waiting { remaining: 1 }
        );
        assert_eq!(msglog.run_child_func().unwrap(), ChildFuncStatus::Sent(0));
        assert_eq!(
            msglog.run_child_func().unwrap(),
            ChildFuncStatus::Waiting { remaining: 2 }
        );
        msglog.run_child_func().unwrap();
        assert_eq!(msglog.run_child_func().unwrap(), ChildFuncStatus::Sent(1));
        msglog.run_child_func().unwrap();
        msglog.run_child_func().unwrap();
        assert_eq!(
            msglog.run_child_func().unwrap(),
            ChildFuncStatus::Completed(2)
        );
        assert_eq!(msglog.activity(), ActivityKind::Idle);

        let sent = msglog.transport().published();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].log_file_entry, 0);
        assert_eq!(sent[1].hdr[3], 1);
        assert_eq!(sent[1].hdr[HEADER_LEN - 1], 0);
    }

    #[test]
    fn test_stop_log_during_playback_is_ignored() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 10, 0);
        msglog.start_log(0x0801).unwrap();
        msglog.on_message(0x0801, &header(0)).unwrap();
        msglog.stop_log().unwrap();
        msglog.start_playbk().unwrap();

        assert!(matches!(msglog.stop_log(), Err(MsgLogError::NotActive(_))));
        assert_eq!(msglog.activity(), ActivityKind::Playback);
        assert_eq!(msglog.stop_playbk().unwrap(), 0);
        assert_eq!(msglog.activity(), ActivityKind::Idle);
    }

    #[test]
    fn test_malformed_log_file_stops_playback() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 10, 0);
        msglog.start_log(0x0801).unwrap();
        msglog.on_message(0x0801, &header(0)).unwrap();
        msglog.stop_log().unwrap();
        let path = msglog.last_log_file().unwrap().to_path_buf();
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("garbage line\n");
        fs::write(&path, text).unwrap();

        msglog.start_playbk().unwrap();
        assert_eq!(msglog.run_child_func().unwrap(), ChildFuncStatus::Sent(0));
        let err = msglog.run_child_func().unwrap_err();

        assert!(matches!(err, MsgLogError::Io { op: IoOp::Read, .. }));
        assert_eq!(msglog.activity(), ActivityKind::Idle);
        assert_eq!(msglog.status().filename, None);
        assert_eq!(msglog.run_child_func().unwrap(), ChildFuncStatus::Idle);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let dir = tempdir().unwrap();
        let mut bus = MemoryTransport::new();
        let base = dir.path().join("msglog_");
        {
            let mut msglog = MsgLog::new("MSGLOG", &mut bus);
            let tbl = serde_json::json!({
                "file": {"path-base-name": base.to_str().unwrap(), "extension": ".txt", "entry-cnt": 4},
                "playbk-delay": 1
            });
            msglog.table_mut().load_str(&tbl.to_string()).unwrap();
            msglog.start_log(0x0801).unwrap();
            assert!(msglog.transport().is_subscribed(0x0801));
        }
        assert_eq!(bus.subscriptions().count(), 0);
    }

    #[test]
    fn test_reset_status_clears_table_status() {
        let dir = tempdir().unwrap();
        let mut msglog = msglog_in(&dir, 10, 0);
        assert_eq!(msglog.status().tbl_last_load_status, TblLoadStatus::Valid);

        msglog.reset_status();

        let status = msglog.status();
        assert_eq!(status.tbl_last_load_status, TblLoadStatus::Undefined);
        assert_eq!(status.tbl_last_load_cnt, 0);
        assert!(status.tbl_loaded);
    }
}
