use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch; a clock before 1970 reads as 0.
pub fn current_unix_timestamp_ms() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    u64::try_from(since_epoch).unwrap_or(u64::MAX)
}
