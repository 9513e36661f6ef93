use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use std::path::Path;

/// Sentinel stored when a source row leaves justification/staff blank.
pub const UNSPECIFIED_TEXT: &str = "Não especificado";

/// Canonical fields the alias table can map a column onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Date,
    Justification,
    Staff,
    GuardianName,
    GuardianPhone,
}

// Many-to-one header aliases, matched against the trimmed, upper-cased
// literal header text. Unmapped columns are kept but never interpreted.
const HEADER_ALIASES: &[(Field, &[&str])] = &[
    (Field::Name, &["NOME", "ALUNO", "ALUNOS"]),
    (Field::Date, &["DATA", "DIA"]),
    (
        Field::Justification,
        &["RELATO", "JUSTIFICATIVA", "MOTIVO", "OBSERVAÇÃO", "OBSERVACAO"],
    ),
    (
        Field::Staff,
        &["PROFESSOR", "PROFESSOR RESPONSAVEL", "PROFESSOR RESPONSÁVEL"],
    ),
    (
        Field::GuardianName,
        &[
            "RESPONSAVEL",
            "RESPONSÁVEL",
            "NOME RESPONSAVEL",
            "NOME DO RESPONSAVEL",
            "NOME DO RESPONSÁVEL",
        ],
    ),
    (
        Field::GuardianPhone,
        &[
            "TELEFONE",
            "TELEFONE RESPONSAVEL",
            "TELEFONE DO RESPONSAVEL",
            "CONTATO",
        ],
    ),
];

pub fn alias_field(header: &str) -> Option<Field> {
    let needle = header.trim().to_uppercase();
    for (field, aliases) in HEADER_ALIASES {
        if aliases.iter().any(|a| *a == needle) {
            return Some(*field);
        }
    }
    None
}

/// One sheet of raw cells, before header discovery. `source` identifies the
/// file (and sheet, for workbooks) in warnings.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub source: String,
    pub rows: Vec<Vec<String>>,
}

/// A header-normalized table: the first recognizable header row and
/// everything below it, with each column mapped through the alias table.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub source: String,
    pub header_row: usize,
    pub headers: Vec<String>,
    pub fields: Vec<Option<Field>>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn column(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|f| *f == Some(field))
    }
}

/// Scans top-to-bottom for the first row carrying a known header token.
/// Exports often stack title/metadata rows above the real header, so row
/// zero means nothing.
pub fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter()
        .position(|row| row.iter().any(|cell| is_header_token(cell)))
}

fn is_header_token(cell: &str) -> bool {
    alias_field(cell).is_some() || looks_like_time_range(cell)
}

// Schedule grids mark their header row with ranges like "13:30 às 14:30".
fn looks_like_time_range(cell: &str) -> bool {
    let lower = cell.to_lowercase();
    lower.contains(" às ") && lower.chars().any(|c| c.is_ascii_digit())
}

/// Locates the header row and normalizes columns. Returns None when no row
/// maps at least one column through the alias table; that sheet cannot be
/// interpreted as a record table.
pub fn detect_table(sheet: &RawSheet) -> Option<SheetTable> {
    let header_row = find_header_row(&sheet.rows)?;
    let headers: Vec<String> = sheet.rows[header_row]
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let fields: Vec<Option<Field>> = headers.iter().map(|h| alias_field(h)).collect();
    if !fields.iter().any(|f| f.is_some()) {
        return None;
    }
    Some(SheetTable {
        source: sheet.source.clone(),
        header_row,
        headers,
        fields,
        rows: sheet.rows[header_row + 1..].to_vec(),
    })
}

/// Reads a tabular source of unknown shape into raw sheets. Interpretations
/// are tried in priority order: native spreadsheet formats first, then
/// delimited text under candidate encodings × candidate delimiters. Errors
/// only when nothing matches; callers treat that as fatal for this source
/// and continue with the rest of the batch.
pub fn load_source(path: &Path) -> anyhow::Result<Vec<RawSheet>> {
    match load_workbook(path) {
        Ok(sheets) if !sheets.is_empty() => return Ok(sheets),
        Ok(_) => {}
        Err(e) => log::debug!("{}: not a native workbook: {}", path.display(), e),
    }
    load_delimited(path)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("source")
        .to_string()
}

fn load_workbook(path: &Path) -> anyhow::Result<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let name = source_name(path);
    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{}#{}: unreadable sheet: {}", name, sheet_name, e);
                continue;
            }
        };
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        sheets.push(RawSheet {
            source: format!("{}#{}", name, sheet_name),
            rows,
        });
    }
    Ok(sheets)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERR({:?})", e),
        // Serial value; parse_date_cell turns it back into a calendar date.
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

const DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

fn load_delimited(path: &Path) -> anyhow::Result<Vec<RawSheet>> {
    let bytes = std::fs::read(path)?;
    let name = source_name(path);

    for (text, encoding) in decode_candidates(&bytes) {
        for delimiter in DELIMITERS {
            let Ok(rows) = parse_delimited(&text, delimiter) else {
                continue;
            };
            let sheet = RawSheet {
                source: name.clone(),
                rows,
            };
            if detect_table(&sheet).is_some() {
                log::debug!(
                    "{}: delimited text ({}, delimiter {:?})",
                    name,
                    encoding,
                    delimiter as char
                );
                return Ok(vec![sheet]);
            }
        }
    }

    anyhow::bail!(
        "{}: no interpretation matched (not a workbook, and no encoding/delimiter candidate produced a recognizable header)",
        name
    )
}

// UTF-8 strictly first; Latin-1 always decodes, so it goes last.
fn decode_candidates(bytes: &[u8]) -> Vec<(String, &'static str)> {
    let mut out = Vec::new();
    if let Ok(s) = std::str::from_utf8(bytes) {
        out.push((s.to_string(), "utf-8"));
    }
    out.push((bytes.iter().map(|&b| b as char).collect(), "latin-1"));
    out
}

fn parse_delimited(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }
    Ok(rows)
}

/// Coerces a date-like cell to a calendar date. Handles ISO, Brazilian
/// day-first forms, datetime exports with a time suffix, and Excel serials.
pub fn parse_date_cell(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    if let Some(head) = t.get(..10).filter(|_| t.len() > 10) {
        for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
            if let Ok(d) = NaiveDate::parse_from_str(head, fmt) {
                return Some(d);
            }
        }
    }
    if let Ok(serial) = t.parse::<f64>() {
        // Days since the Excel epoch; the window covers 1954..2119.
        if (20_000.0..80_000.0).contains(&serial) {
            return NaiveDate::from_ymd_opt(1899, 12, 30)
                .and_then(|base| base.checked_add_signed(Duration::days(serial as i64)));
        }
    }
    None
}

/// One cleaned historical-attendance row, ready for reconciliation.
#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub name: String,
    pub date: NaiveDate,
    pub justification: String,
    pub staff: String,
}

/// One cleaned roster row.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub name: String,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
}

/// Row-level validation for attendance sheets: name and a parseable date
/// are required, free-text fields default to the unspecified sentinel.
/// Returns the surviving rows plus one warning per dropped-for-cause row.
pub fn clean_attendance_rows(table: &SheetTable) -> (Vec<AttendanceRow>, Vec<String>) {
    let mut out = Vec::new();
    let mut warnings = Vec::new();

    let Some(name_col) = table.column(Field::Name) else {
        warnings.push(format!("{}: no student-name column recognized", table.source));
        return (out, warnings);
    };
    let Some(date_col) = table.column(Field::Date) else {
        warnings.push(format!("{}: no date column recognized", table.source));
        return (out, warnings);
    };
    let just_col = table.column(Field::Justification);
    let staff_col = table.column(Field::Staff);

    for (i, row) in table.rows.iter().enumerate() {
        // 1-based source line, counting from the top of the sheet.
        let line = table.header_row + i + 2;
        let name = row.get(name_col).map(|s| s.trim()).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let raw_date = row.get(date_col).map(|s| s.trim()).unwrap_or("");
        let Some(date) = parse_date_cell(raw_date) else {
            warnings.push(format!(
                "{} row {}: unparseable date {:?} for {:?}; row skipped",
                table.source, line, raw_date, name
            ));
            continue;
        };
        out.push(AttendanceRow {
            name: name.to_string(),
            date,
            justification: cell_or_unspecified(row, just_col),
            staff: cell_or_unspecified(row, staff_col),
        });
    }

    (out, warnings)
}

/// Row-level validation for roster sheets: only the name is required;
/// guardian fields stay absent rather than defaulting.
pub fn clean_roster_rows(table: &SheetTable) -> (Vec<RosterRow>, Vec<String>) {
    let mut out = Vec::new();
    let mut warnings = Vec::new();

    let Some(name_col) = table.column(Field::Name) else {
        warnings.push(format!("{}: no student-name column recognized", table.source));
        return (out, warnings);
    };
    let guardian_col = table.column(Field::GuardianName);
    let phone_col = table.column(Field::GuardianPhone);

    for row in &table.rows {
        let name = row.get(name_col).map(|s| s.trim()).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        out.push(RosterRow {
            name: name.to_string(),
            guardian_name: cell_non_empty(row, guardian_col),
            guardian_phone: cell_non_empty(row, phone_col),
        });
    }

    (out, warnings)
}

fn cell_non_empty(row: &[String], col: Option<usize>) -> Option<String> {
    col.and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn cell_or_unspecified(row: &[String], col: Option<usize>) -> String {
    cell_non_empty(row, col).unwrap_or_else(|| UNSPECIFIED_TEXT.to_string())
}
