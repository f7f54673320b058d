#![no_main]

use formfill_replay::record_source::{CellGrid, RecordSource, RecordSourceOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(grid) = CellGrid::from_csv_reader(data) else {
        return;
    };
    let source = RecordSource::from_grid("fuzz", grid, RecordSourceOptions::default());
    assert!(source.labels().all(|label| !label.trim().is_empty()));
    let width = source.labels().count();
    let mut previous_row = 1;
    for record in source.records() {
        assert!(record.row_number > previous_row);
        assert_eq!(record.fields.len(), width);
        previous_row = record.row_number;
    }
});
