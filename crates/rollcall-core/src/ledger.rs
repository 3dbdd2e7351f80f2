//! Append-only attendance ledger.
//!
//! One CSV file with columns `Name,Date,Time,Status`, human-readable and
//! the single source of truth. `mark` re-scans the person's records for
//! the day to decide the next status, so within one (name, day) group the
//! statuses strictly alternate starting with Punch In. There is no index
//! and no locking; single-digit concurrent recognitions over an
//! append-mostly log do not need either.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Punch direction. A person's records per day toggle between the two,
/// always starting with Punch In.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunchStatus {
    #[serde(rename = "Punch In")]
    PunchIn,
    #[serde(rename = "Punch Out")]
    PunchOut,
}

impl PunchStatus {
    pub fn toggled(self) -> PunchStatus {
        match self {
            PunchStatus::PunchIn => PunchStatus::PunchOut,
            PunchStatus::PunchOut => PunchStatus::PunchIn,
        }
    }
}

impl fmt::Display for PunchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PunchStatus::PunchIn => write!(f, "Punch In"),
            PunchStatus::PunchOut => write!(f, "Punch Out"),
        }
    }
}

/// One ledger row. Never mutated or individually deleted; removing a
/// person from the dataset leaves their history intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: PunchStatus,
}

impl AttendanceRecord {
    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Handle to the CSV ledger file.
#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
}

impl AttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> AttendanceLog {
        AttendanceLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. A missing file degrades to an empty history.
    pub fn read_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|source| {
            LedgerError::Csv { path: self.path.clone(), source }
        })?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: AttendanceRecord =
                row.map_err(|source| LedgerError::Csv { path: self.path.clone(), source })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Append one record for `name` at the current local time, toggling
    /// off the person's most recent status for today.
    pub fn mark(&self, name: &str) -> Result<PunchStatus, LedgerError> {
        let now = Local::now().naive_local();
        // Sub-second precision would only clutter a human-readable log.
        let now = now.with_nanosecond(0).unwrap_or(now);
        self.mark_at(name, now)
    }

    /// `mark` with an explicit timestamp.
    pub fn mark_at(&self, name: &str, when: NaiveDateTime) -> Result<PunchStatus, LedgerError> {
        let status = self
            .last_status_for(name, when.date())?
            .map(PunchStatus::toggled)
            .unwrap_or(PunchStatus::PunchIn);

        self.append(&AttendanceRecord {
            name: name.to_string(),
            date: when.date(),
            time: when.time(),
            status,
        })?;

        tracing::info!(name = %name, status = %status, "attendance marked");
        Ok(status)
    }

    /// Status of the most recent record for (name, date), if any.
    fn last_status_for(
        &self,
        name: &str,
        date: NaiveDate,
    ) -> Result<Option<PunchStatus>, LedgerError> {
        Ok(self
            .read_all()?
            .iter()
            .rev()
            .find(|r| r.name == name && r.date == date)
            .map(|r| r.status))
    }

    fn append(&self, record: &AttendanceRecord) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Io { path: self.path.clone(), source })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(record)
            .map_err(|source| LedgerError::Csv { path: self.path.clone(), source })?;
        writer
            .flush()
            .map_err(|source| LedgerError::Io { path: self.path.clone(), source })?;

        Ok(())
    }
}
