use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Dimensions, Reader, Sheets, Xlsx};
use thiserror::Error;

pub const DEFAULT_TRAILING_IGNORED_COLUMNS: usize = 1;

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];
const PARTIAL_DOWNLOAD_EXTENSIONS: [&str; 3] = ["crdownload", "part", "tmp"];

/// Conditions under which no records can be produced at all. Every variant is
/// fatal to a run and reported as `origin_unreadable`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("origin {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error(
        "origin directory {} holds {count} candidate files; expected exactly one",
        dir.display()
    )]
    Ambiguous { dir: PathBuf, count: usize },
    #[error("origin {} has unsupported format '{extension}'", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("origin {origin} could not be read: {detail}")]
    Unreadable { origin: String, detail: String },
}

impl OriginError {
    pub fn reason_code(&self) -> &'static str {
        "origin_unreadable"
    }
}

/// How far an origin's columns reach, independent of which cells hold values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColumnExtent {
    /// Rows carry every column (CSV, in-memory grids).
    #[default]
    Exact,
    /// Width declared by the sheet itself; may run past the last non-empty cell.
    Declared(usize),
    /// The reader dropped trailing empty columns and the declared width is unknown.
    Trimmed,
}

/// Raw rows of text cells; an empty string is an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellGrid {
    rows: Vec<Vec<String>>,
    extent: ColumnExtent,
}

impl CellGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows,
            extent: ColumnExtent::Exact,
        }
    }

    pub fn with_extent(mut self, extent: ColumnExtent) -> Self {
        self.extent = extent;
        self
    }

    pub fn extent(&self) -> ColumnExtent {
        self.extent
    }

    pub fn from_str_rows(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
                .collect(),
        )
    }

    /// Parses CSV without an implicit header so the first row stays addressable.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::new(rows))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Widest row, i.e. the origin's column extent.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Anything that can hand over a full grid of cells for one run.
pub trait TabularOrigin {
    fn describe(&self) -> String;
    fn load_grid(&self) -> Result<CellGrid, OriginError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryOrigin {
    grid: CellGrid,
}

impl InMemoryOrigin {
    pub fn new(grid: CellGrid) -> Self {
        Self { grid }
    }
}

impl TabularOrigin for InMemoryOrigin {
    fn describe(&self) -> String {
        format!("in-memory grid ({} rows)", self.grid.rows.len())
    }

    fn load_grid(&self) -> Result<CellGrid, OriginError> {
        Ok(self.grid.clone())
    }
}

/// Spreadsheet or CSV file on disk, format picked from the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOrigin {
    path: PathBuf,
}

impl FileOrigin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unreadable(&self, detail: impl ToString) -> OriginError {
        OriginError::Unreadable {
            origin: self.path.display().to_string(),
            detail: detail.to_string(),
        }
    }

    fn load_csv(&self) -> Result<CellGrid, OriginError> {
        let file = std::fs::File::open(&self.path).map_err(|error| self.unreadable(error))?;
        CellGrid::from_csv_reader(file).map_err(|error| self.unreadable(error))
    }

    fn load_spreadsheet(&self) -> Result<CellGrid, OriginError> {
        let mut workbook = open_workbook_auto(&self.path).map_err(|error| self.unreadable(error))?;
        let declared_columns = match &mut workbook {
            Sheets::Xlsx(xlsx) => declared_xlsx_columns(xlsx),
            _ => None,
        };
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| self.unreadable("workbook has no worksheets"))?
            .map_err(|error| self.unreadable(error))?;

        // calamine crops to the used range; pad leading columns back so positions hold.
        let leading_columns = range
            .start()
            .map(|(_, column)| column as usize)
            .unwrap_or(0);
        let rows = range
            .rows()
            .map(|row| {
                std::iter::repeat(String::new())
                    .take(leading_columns)
                    .chain(row.iter().map(spreadsheet_cell_text))
                    .collect()
            })
            .collect();
        let extent = match declared_columns {
            Some(columns) => ColumnExtent::Declared(columns),
            None => ColumnExtent::Trimmed,
        };
        Ok(CellGrid::new(rows).with_extent(extent))
    }
}

/// Column count from the first worksheet's `<dimension>`, which counts formatted
/// blank cells the value range leaves out.
fn declared_xlsx_columns<RS: Read + Seek>(xlsx: &mut Xlsx<RS>) -> Option<usize> {
    let first_sheet = xlsx.sheet_names().into_iter().next()?;
    let dimensions = xlsx.worksheet_cells_reader(&first_sheet).ok()?.dimensions();
    if dimensions == Dimensions::default() {
        return None;
    }
    usize::try_from(dimensions.end.1).ok().map(|last| last + 1)
}

impl TabularOrigin for FileOrigin {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load_grid(&self) -> Result<CellGrid, OriginError> {
        if !self.path.is_file() {
            return Err(OriginError::Missing {
                path: self.path.clone(),
            });
        }
        let extension = self
            .path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if extension == "csv" {
            return self.load_csv();
        }
        if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            return self.load_spreadsheet();
        }
        Err(OriginError::UnsupportedFormat {
            path: self.path.clone(),
            extension,
        })
    }
}

/// Download directory expected to hold exactly one completed origin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDirOrigin {
    dir: PathBuf,
}

impl DownloadDirOrigin {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TabularOrigin for DownloadDirOrigin {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn load_grid(&self) -> Result<CellGrid, OriginError> {
        FileOrigin::new(discover_origin_file(&self.dir)?).load_grid()
    }
}

fn spreadsheet_cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(text) => text.clone(),
        Data::Int(value) => value.to_string(),
        // Phone numbers arrive as floats; keep them digit-for-digit.
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        other => other.to_string(),
    }
}

/// Returns true for files a browser is still writing or that are not user data.
pub fn is_partial_or_hidden_download(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    let partial = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            PARTIAL_DOWNLOAD_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        });
    hidden || partial
}

/// Completed candidate files in `dir`, sorted by name.
pub fn completed_download_candidates(dir: &Path) -> Result<Vec<PathBuf>, OriginError> {
    let entries = std::fs::read_dir(dir).map_err(|_| OriginError::Missing {
        path: dir.to_path_buf(),
    })?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| OriginError::Unreadable {
            origin: dir.display().to_string(),
            detail: error.to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && !is_partial_or_hidden_download(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// The single completed origin file in a download directory.
pub fn discover_origin_file(dir: &Path) -> Result<PathBuf, OriginError> {
    let mut candidates = completed_download_candidates(dir)?;
    match candidates.len() {
        0 => Err(OriginError::Missing {
            path: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        count => Err(OriginError::Ambiguous {
            dir: dir.to_path_buf(),
            count,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSourceOptions {
    /// Trailing origin columns excluded from mapping (a status column in the
    /// challenge spreadsheet).
    pub trailing_ignored_columns: usize,
}

impl Default for RecordSourceOptions {
    fn default() -> Self {
        Self {
            trailing_ignored_columns: DEFAULT_TRAILING_IGNORED_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub label: String,
    pub value: String,
}

/// One replay unit: header-aligned (label, value) pairs from a single data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based row position in the origin, header included.
    pub row_number: usize,
    pub fields: Vec<RecordField>,
}

impl Record {
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|field| (field.label.as_str(), field.value.as_str()))
    }

    pub fn value_of(&self, label: &str) -> Option<&str> {
        self.pairs()
            .find(|(candidate, _)| *candidate == label)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderColumn {
    position: usize,
    label: String,
}

/// Loaded origin plus its effective header; `records()` can be replayed any
/// number of times and always yields the same sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSource {
    origin: String,
    columns: Vec<HeaderColumn>,
    grid: CellGrid,
}

impl RecordSource {
    pub fn open<O: TabularOrigin + ?Sized>(
        origin: &O,
        options: RecordSourceOptions,
    ) -> Result<Self, OriginError> {
        let grid = origin.load_grid()?;
        Ok(Self::from_grid(origin.describe(), grid, options))
    }

    pub fn from_grid(origin: impl Into<String>, grid: CellGrid, options: RecordSourceOptions) -> Self {
        let mapped_width = match grid.extent {
            ColumnExtent::Exact => grid
                .column_count()
                .saturating_sub(options.trailing_ignored_columns),
            ColumnExtent::Declared(declared) => declared
                .max(grid.column_count())
                .saturating_sub(options.trailing_ignored_columns),
            // Only trailing blank columns were dropped; anything left carries data.
            ColumnExtent::Trimmed => grid.column_count(),
        };
        let columns = grid
            .rows
            .first()
            .map(|header| {
                (0..mapped_width)
                    .filter_map(|position| {
                        let label = header.get(position).map(|cell| cell.trim()).unwrap_or("");
                        (!label.is_empty()).then(|| HeaderColumn {
                            position,
                            label: label.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            origin: origin.into(),
            columns,
            grid,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.label.as_str())
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            source: self,
            next_row: 1,
        }
    }
}

/// Lazy cursor over the data rows of a `RecordSource`.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    source: &'a RecordSource,
    next_row: usize,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.source.grid.rows();
        while self.next_row < rows.len() {
            let index = self.next_row;
            self.next_row += 1;
            let row = &rows[index];
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            let fields = self
                .source
                .columns
                .iter()
                .map(|column| RecordField {
                    label: column.label.clone(),
                    value: row.get(column.position).cloned().unwrap_or_default(),
                })
                .collect();
            return Some(Record {
                row_number: index + 1,
                fields,
            });
        }
        None
    }
}
