//! Small helpers shared across formfill crates: the wall clock used to stamp
//! run reports and the atomic JSON writer that persists them.

pub mod clock;
pub mod report_file;

pub use clock::current_unix_timestamp_ms;
pub use report_file::write_json_pretty_atomic;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct SampleReport {
        records: usize,
        status: &'static str,
    }

    fn sample() -> SampleReport {
        SampleReport {
            records: 3,
            status: "completed",
        }
    }

    #[test]
    fn unit_current_unix_timestamp_ms_is_non_decreasing() {
        let first = current_unix_timestamp_ms();
        let second = current_unix_timestamp_ms();
        assert!(first > 1_600_000_000_000);
        assert!(second >= first);
    }

    #[test]
    fn functional_write_json_pretty_atomic_creates_parents_and_ends_with_newline() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("reports/nested/run-report.json");
        write_json_pretty_atomic(&path, &sample()).expect("write json");
        let raw = read_to_string(&path).expect("read");
        assert!(raw.ends_with("}\n"));
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed["records"], 3);
        assert_eq!(parsed["status"], "completed");
    }

    #[test]
    fn functional_rewrite_replaces_content_and_leaves_no_staging_files() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("run-report.json");
        std::fs::write(&path, "stale").expect("seed");
        write_json_pretty_atomic(&path, &sample()).expect("write json");
        assert!(read_to_string(&path).expect("read").contains("\"completed\""));
        let leftovers = std::fs::read_dir(tempdir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn regression_directory_destination_is_rejected() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let nested = tempdir.path().join("run-report.json");
        std::fs::create_dir_all(&nested).expect("mkdir");
        let error = write_json_pretty_atomic(&nested, &sample()).expect_err("directory");
        assert!(error.to_string().contains("is a directory"));
    }
}
