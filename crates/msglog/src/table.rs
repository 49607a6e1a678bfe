//! Message Log table
//!
//! Owns the authoritative table data. A load parses the JSON file into a
//! staging copy of the current data and only commits it when enough fields
//! were populated:
//!
//! - never loaded: every bound field must be present and valid
//! - loaded before: any non-zero number of fields, the rest keep their values
//!
//! A dump writes the current data in the same JSON layout, so a dump file is
//! always a valid load file.

use crate::field_map::{self, MSGLOG_TBL_FIELDS};
use crate::{
    IoOp, MsgLogError, Result, JSON_FILE_MAX_CHAR, MSGLOGTBL_DUMP_EID, MSGLOGTBL_DUMP_ERR_EID,
    MSGLOGTBL_LOAD_EID, MSGLOGTBL_LOAD_ERR_EID, TBL_NAME,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::{error, info};

/// Log file naming and size limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCfg {
    pub path_base_name: String,
    pub extension: String,
    /// Entries written before logging stops automatically
    pub entry_cnt: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgLogTblData {
    pub file: FileCfg,
    /// Scheduler ticks between played back entries
    pub playbk_delay: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TblLoadStatus {
    #[default]
    Undefined,
    Valid,
    Invalid,
}

#[derive(Debug)]
pub struct MsgLogTable {
    app_name: String,
    data: MsgLogTblData,
    loaded: bool,
    last_load_status: TblLoadStatus,
    last_load_cnt: usize,
}

impl MsgLogTable {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            data: MsgLogTblData::default(),
            loaded: false,
            last_load_status: TblLoadStatus::Undefined,
            last_load_cnt: 0,
        }
    }

    pub fn data(&self) -> &MsgLogTblData {
        &self.data
    }

    /// True once any load has been committed
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn last_load_status(&self) -> TblLoadStatus {
        self.last_load_status
    }

    /// Fields populated by the most recent load attempt
    pub fn last_load_cnt(&self) -> usize {
        self.last_load_cnt
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Clear load status reporting. Table data is not affected.
    pub fn reset_status(&mut self) {
        self.last_load_status = TblLoadStatus::Undefined;
        self.last_load_cnt = 0;
    }

    fn reject(&mut self, loaded: usize) {
        self.last_load_status = TblLoadStatus::Invalid;
        self.last_load_cnt = loaded;
    }

    fn read_failed(&mut self, path: &Path, source: io::Error) -> MsgLogError {
        error!(
            eid = MSGLOGTBL_LOAD_ERR_EID,
            "Error reading table file {:?}: {}", path, source
        );
        self.reject(0);
        MsgLogError::Io {
            op: IoOp::Read,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Load the table from a JSON file
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        info!(eid = MSGLOGTBL_LOAD_EID, "Loading table from {:?}", path);

        // One byte past the limit is enough to tell an oversize file apart
        let mut buf = Vec::with_capacity(JSON_FILE_MAX_CHAR + 1);
        let read = File::open(path).and_then(|file| {
            file.take(JSON_FILE_MAX_CHAR as u64 + 1)
                .read_to_end(&mut buf)
        });
        if let Err(source) = read {
            return Err(self.read_failed(path, source));
        }
        if buf.len() > JSON_FILE_MAX_CHAR {
            error!(
                eid = MSGLOGTBL_LOAD_ERR_EID,
                "Table file {:?} exceeds {} bytes", path, JSON_FILE_MAX_CHAR
            );
            self.reject(0);
            return Err(MsgLogError::TooLarge {
                len: buf.len(),
                max: JSON_FILE_MAX_CHAR,
            });
        }
        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(e) => {
                let source = io::Error::new(io::ErrorKind::InvalidData, e);
                return Err(self.read_failed(path, source));
            }
        };

        self.load_str(&text)
    }

    /// Load the table from JSON text; returns the number of fields populated
    pub fn load_str(&mut self, text: &str) -> Result<usize> {
        if text.len() > JSON_FILE_MAX_CHAR {
            error!(
                eid = MSGLOGTBL_LOAD_ERR_EID,
                "Table text is {} bytes, limit is {}",
                text.len(),
                JSON_FILE_MAX_CHAR
            );
            self.reject(0);
            return Err(MsgLogError::TooLarge {
                len: text.len(),
                max: JSON_FILE_MAX_CHAR,
            });
        }

        let pairs = match field_map::parse(text) {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(eid = MSGLOGTBL_LOAD_ERR_EID, "Table parse failed: {}", e);
                self.reject(0);
                return Err(e);
            }
        };

        let mut staging = self.data.clone();
        let populated = field_map::load_fields(MSGLOG_TBL_FIELDS, &pairs, &mut staging);
        let required = if self.loaded {
            1
        } else {
            MSGLOG_TBL_FIELDS.len()
        };

        if populated < required {
            if self.loaded {
                error!(
                    eid = MSGLOGTBL_LOAD_ERR_EID,
                    "Table load contains no valid data objects"
                );
            } else {
                error!(
                    eid = MSGLOGTBL_LOAD_ERR_EID,
                    "Table has never been loaded and new table only contains {} of {} data objects",
                    populated,
                    MSGLOG_TBL_FIELDS.len()
                );
            }
            self.reject(populated);
            return Err(MsgLogError::ConfigInvalid {
                loaded: populated,
                required,
            });
        }

        self.data = staging;
        self.loaded = true;
        self.last_load_status = TblLoadStatus::Valid;
        self.last_load_cnt = populated;

        info!(
            eid = MSGLOGTBL_LOAD_EID,
            populated,
            "Table loaded: path-base-name {:?}, extension {:?}, entry-cnt {}, playbk-delay {}",
            self.data.file.path_base_name,
            self.data.file.extension,
            self.data.file.entry_cnt,
            self.data.playbk_delay
        );

        Ok(populated)
    }

    /// Render the dump text with the given timestamp in the description
    fn render_dump(&self, timestamp: &str) -> String {
        // Strings go through serde_json so paths with quotes or backslashes stay valid JSON
        let quote = |s: &str| serde_json::Value::from(s).to_string();

        let mut out = String::with_capacity(256);
        let _ = writeln!(out, "{{");
        let _ = writeln!(out, "   \"app-name\": {},", quote(self.app_name()));
        let _ = writeln!(out, "   \"tbl-name\": {},", quote(TBL_NAME));
        let _ = writeln!(
            out,
            "   \"description\": {},",
            quote(&format!("Table dumped at {timestamp}"))
        );
        let _ = writeln!(out, "   \"file\": {{");
        let _ = writeln!(
            out,
            "     \"path-base-name\": {},",
            quote(&self.data.file.path_base_name)
        );
        let _ = writeln!(out, "     \"extension\": {},", quote(&self.data.file.extension));
        let _ = writeln!(out, "     \"entry-cnt\": {}", self.data.file.entry_cnt);
        let _ = writeln!(out, "   }},");
        let _ = writeln!(out, "   \"playbk-delay\": {}", self.data.playbk_delay);
        let _ = writeln!(out, "}}");
        out
    }

    /// Write the current table to `path`, replacing any existing file
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let file = File::create(path).map_err(|source| {
            error!(
                eid = MSGLOGTBL_DUMP_ERR_EID,
                "Error creating dump file {:?}: {}", path, source
            );
            MsgLogError::StorageCreate {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string();
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.render_dump(&timestamp).as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|source| {
                error!(
                    eid = MSGLOGTBL_DUMP_ERR_EID,
                    "Error writing dump file {:?}: {}", path, source
                );
                MsgLogError::Io {
                    op: IoOp::Write,
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        info!(eid = MSGLOGTBL_DUMP_EID, "Table dumped to {:?}", path);
        Ok(())
    }
}
