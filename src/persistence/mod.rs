//! CSV Persistence Module
//!
//! Appends one row per completed decision cycle to a daily CSV so runs can
//! be audited and replayed offline. Rows land regardless of whether the
//! cycle persisted state; the `persisted` column records which ones did.

use anyhow::{Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;

/// One completed decision cycle as written to CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: i64,
    pub request_id: String,
    pub score: u8,
    pub triggered: bool,
    pub eth_price: f64,
    pub btc_price: f64,
    pub eth_deviation_pct: f64,
    pub btc_deviation_pct: f64,
    pub reason: String,
    pub persisted: bool,
}

/// Append-only CSV audit log, one file per day
pub struct CycleRecorder {
    data_dir: PathBuf,
    cycle_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl CycleRecorder {
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(data_dir.join("cycles")).context("Failed to create data directory")?;

        let today = Utc::now().format("%Y-%m-%d");
        let cycle_writer =
            Self::create_writer(&data_dir.join("cycles"), &format!("cycles_{}.csv", today))?;

        Ok(Self {
            data_dir,
            cycle_writer: Arc::new(AsyncRwLock::new(cycle_writer)),
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Append one cycle row and flush it to disk.
    pub async fn save_cycle(&self, record: CycleRecord) -> Result<()> {
        let mut writer = self.cycle_writer.write().await;
        writer
            .serialize(&record)
            .context("Failed to write cycle record")?;
        writer.flush().context("Failed to flush cycle writer")?;
        Ok(())
    }

    /// Load cycle rows from the last `days` daily files, oldest first.
    pub fn load_recent(&self, days: u32) -> Result<Vec<CycleRecord>> {
        let mut records = Vec::new();

        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let filename = format!("cycles_{}.csv", date.format("%Y-%m-%d"));
            let path = self.data_dir.join("cycles").join(&filename);

            if path.exists() {
                let file = std::fs::File::open(&path).context("Failed to open cycle file")?;
                let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

                for result in reader.deserialize() {
                    let record: CycleRecord =
                        result.context("Failed to deserialize cycle record")?;
                    records.push(record);
                }
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}
