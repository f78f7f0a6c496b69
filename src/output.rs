//! Audit log output
//!
//! Every run writes its result twice under `<output_dir>/<env>/<process>/`:
//! `lastrun.json` (overwritten) and `<unix-millis>.json` (kept).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputRecord<'a, T: Serialize> {
    process_name: &'a str,
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    body: &'a T,
}

/// Write `body` as the latest and a timestamped output of `process_name`.
///
/// Returns the path of the timestamped file.
pub fn write_output_files<T: Serialize>(
    env_output_dir: &Path,
    process_name: &str,
    body: &T,
) -> Result<PathBuf> {
    let dir = env_output_dir.join(process_name);
    fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create output dir {}", dir.display()))?;

    let generated_at = Utc::now();
    let record = OutputRecord {
        process_name,
        generated_at,
        body,
    };
    let json = serde_json::to_string_pretty(&record).wrap_err("Failed to serialize output")?;

    let latest = dir.join("lastrun.json");
    fs::write(&latest, &json).wrap_err_with(|| format!("Failed to write {}", latest.display()))?;

    let stamped = dir.join(format!("{}.json", generated_at.timestamp_millis()));
    fs::write(&stamped, &json)
        .wrap_err_with(|| format!("Failed to write {}", stamped.display()))?;

    info!(path = %stamped.display(), "Output written");
    Ok(stamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Body {
        chain_count: u32,
    }

    #[test]
    fn test_writes_latest_and_stamped_files() {
        let dir = tempfile::tempdir().unwrap();
        let stamped =
            write_output_files(dir.path(), "configureDeliveryProvider", &Body { chain_count: 3 })
                .unwrap();

        let latest = dir
            .path()
            .join("configureDeliveryProvider")
            .join("lastrun.json");
        let latest_raw = fs::read_to_string(&latest).unwrap();
        assert_eq!(latest_raw, fs::read_to_string(&stamped).unwrap());

        let value: serde_json::Value = serde_json::from_str(&latest_raw).unwrap();
        assert_eq!(value["processName"], "configureDeliveryProvider");
        assert_eq!(value["chainCount"], 3);
        assert!(value["generatedAt"].is_string());
    }
}
