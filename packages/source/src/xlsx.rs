//! Minimal `.xlsx` worksheet reader.
//!
//! An `.xlsx` file is a zip archive of XML parts. Only what is needed to
//! turn one worksheet into a grid of cell values is read: the workbook's
//! sheet list, its relationships, the shared string table, and the
//! worksheet itself. Styles, formulas, and merged ranges are ignored.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use serde::Deserialize;

use crate::SourceError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Row limit of the XLSX format.
pub const MAX_ROWS: usize = 1_048_576;

/// Column limit of the XLSX format (`XFD`).
pub const MAX_COLUMNS: usize = 16_384;

/// One cell value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    /// No value.
    #[default]
    Empty,
    /// Text (shared, inline, or formula string).
    Text(String),
    /// Numeric value, including dates stored as serial numbers.
    Number(f64),
}

impl Cell {
    /// Cell content as trimmed text; numbers use their shortest form.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        }
    }

    /// Returns `true` for empty cells and whitespace-only text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }
}

/// A worksheet as a dense grid of rows, indexed from zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Builds a sheet from already-decoded rows.
    #[must_use]
    pub const fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Number of rows, including trailing rows that only hold empty cells.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.rows.len()
    }

    /// The cell at `(row, col)`, or [`Cell::Empty`] outside the used range.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    /// Cells of one row.
    #[must_use]
    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Deserialize)]
struct WorksheetXml {
    #[serde(rename = "sheetData", default)]
    sheet_data: SheetDataXml,
}

#[derive(Debug, Default, Deserialize)]
struct SheetDataXml {
    #[serde(rename = "row", default)]
    rows: Vec<RowXml>,
}

#[derive(Debug, Deserialize)]
struct RowXml {
    #[serde(rename = "@r")]
    number: Option<usize>,
    #[serde(rename = "c", default)]
    cells: Vec<CellXml>,
}

#[derive(Debug, Deserialize)]
struct CellXml {
    #[serde(rename = "@r")]
    reference: Option<String>,
    #[serde(rename = "@t")]
    kind: Option<String>,
    v: Option<String>,
    is: Option<RichTextXml>,
}

#[derive(Debug, Deserialize)]
struct SharedStringsXml {
    #[serde(rename = "si", default)]
    items: Vec<RichTextXml>,
}

/// `<si>` or `<is>`: either one `<t>` or a list of formatted runs.
#[derive(Debug, Deserialize)]
struct RichTextXml {
    t: Option<TextXml>,
    #[serde(rename = "r", default)]
    runs: Vec<RunXml>,
}

#[derive(Debug, Deserialize)]
struct RunXml {
    t: Option<TextXml>,
}

#[derive(Debug, Default, Deserialize)]
struct TextXml {
    #[serde(rename = "$text", default)]
    value: String,
}

impl RichTextXml {
    fn into_string(self) -> String {
        let mut text = self.t.map(|t| t.value).unwrap_or_default();
        for run in self.runs {
            if let Some(t) = run.t {
                text.push_str(&t.value);
            }
        }
        text
    }
}

/// Reads one worksheet of an `.xlsx` workbook.
///
/// `sheet_name` selects a sheet case-insensitively; `None` picks the first
/// sheet in workbook order.
///
/// # Errors
///
/// Returns [`SourceError::Zip`] if the bytes are not a zip archive,
/// [`SourceError::Xml`] for malformed parts, and [`SourceError::Parse`] if
/// the requested sheet does not exist.
pub fn read_sheet(bytes: &[u8], sheet_name: Option<&str>) -> Result<Sheet, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let sheets = parse_sheet_list(&read_part(&mut archive, WORKBOOK_PART)?)?;
    let position = match sheet_name {
        Some(name) => sheets
            .iter()
            .position(|(n, _)| n.trim().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| SourceError::parse(format!("workbook has no sheet named {name:?}")))?,
        None if sheets.is_empty() => return Err(SourceError::parse("workbook has no sheets")),
        None => 0,
    };

    let rels = match read_optional_part(&mut archive, WORKBOOK_RELS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => BTreeMap::new(),
    };
    let part = rels
        .get(&sheets[position].1)
        .map_or_else(
            || format!("xl/worksheets/sheet{}.xml", position + 1),
            |target| resolve_target(target),
        );

    let shared = match read_optional_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => quick_xml::de::from_str::<SharedStringsXml>(&xml)?
            .items
            .into_iter()
            .map(RichTextXml::into_string)
            .collect(),
        None => Vec::new(),
    };

    let worksheet: WorksheetXml = quick_xml::de::from_str(&read_part(&mut archive, &part)?)?;
    build_grid(worksheet, &shared)
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, SourceError> {
    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn read_optional_part<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, SourceError> {
    match read_part(archive, name) {
        Ok(xml) => Ok(Some(xml)),
        Err(SourceError::Zip(zip::result::ZipError::FileNotFound)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn xml_error(e: impl Into<quick_xml::Error>) -> SourceError {
    SourceError::Xml(quick_xml::DeError::from(e.into()))
}

/// Returns `(name, relationship id)` for each `<sheet>` in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, SourceError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = String::new();
                let mut rel_id = String::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    let value = attr.unescape_value().map_err(xml_error)?.into_owned();
                    match attr.key.as_ref() {
                        b"name" => name = value,
                        key if key.ends_with(b":id") || key == b"id" => rel_id = value,
                        _ => {}
                    }
                }
                sheets.push((name, rel_id));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheets)
}

/// Maps relationship ids to their target paths.
fn parse_relationships(xml: &str) -> Result<BTreeMap<String, String>, SourceError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut rels = BTreeMap::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    let value = attr.unescape_value().map_err(xml_error)?.into_owned();
                    match attr.key.as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    target
        .strip_prefix('/')
        .map_or_else(|| format!("xl/{target}"), String::from)
}

fn build_grid(worksheet: WorksheetXml, shared: &[String]) -> Result<Sheet, SourceError> {
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut next_row = 0usize;

    for row in worksheet.sheet_data.rows {
        let row_idx = row
            .number
            .and_then(|n| n.checked_sub(1))
            .unwrap_or(next_row);
        if row_idx >= MAX_ROWS {
            return Err(SourceError::parse(format!(
                "worksheet row {} exceeds the {MAX_ROWS} row limit",
                row_idx + 1
            )));
        }
        next_row = row_idx + 1;

        let mut next_col = 0usize;
        for cell in row.cells {
            let col_idx = cell
                .reference
                .as_deref()
                .and_then(column_index)
                .unwrap_or(next_col);
            if col_idx >= MAX_COLUMNS {
                return Err(SourceError::parse(format!(
                    "worksheet column {} exceeds the {MAX_COLUMNS} column limit",
                    col_idx + 1
                )));
            }
            next_col = col_idx + 1;

            let value = decode_cell(cell, shared);
            if value == Cell::Empty {
                continue;
            }

            if rows.len() <= row_idx {
                rows.resize_with(row_idx + 1, Vec::new);
            }
            let cells = &mut rows[row_idx];
            if cells.len() <= col_idx {
                cells.resize(col_idx + 1, Cell::Empty);
            }
            cells[col_idx] = value;
        }
    }

    Ok(Sheet::from_rows(rows))
}

fn decode_cell(cell: CellXml, shared: &[String]) -> Cell {
    match cell.kind.as_deref() {
        Some("s") => cell
            .v
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i))
            .map_or(Cell::Empty, |s| Cell::Text(s.clone())),
        Some("inlineStr") => cell
            .is
            .map_or(Cell::Empty, |is| Cell::Text(is.into_string())),
        Some("str" | "e" | "d") => cell.v.map_or(Cell::Empty, Cell::Text),
        _ => match cell.v {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .map_or_else(|_| Cell::Text(v), Cell::Number),
            None => Cell::Empty,
        },
    }
}

/// Converts the letter part of an `A1` reference to a zero-based column.
#[must_use]
pub fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .collect();
    if letters.is_empty() {
        return None;
    }
    let one_based = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add(usize::from(b.to_ascii_uppercase() - b'A' + 1))
    })?;
    Some(one_based - 1)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write as _;

    /// Builds an `.xlsx` archive with one sheet per `(name, rows)` entry.
    ///
    /// Cells that parse as numbers become numeric cells, others inline
    /// strings; empty strings are left out.
    pub fn workbook(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let mut sheet_list = String::new();
        let mut rels = String::new();
        for (i, (name, _)) in sheets.iter().enumerate() {
            let n = i + 1;
            sheet_list.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }

        writer.start_file("xl/workbook.xml", options).unwrap();
        write!(
            writer,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_list}</sheets></workbook>"#
        )
        .unwrap();

        writer.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        write!(
            writer,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        )
        .unwrap();

        for (i, (_, rows)) in sheets.iter().enumerate() {
            writer
                .start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
                .unwrap();
            write!(writer, "{}", sheet_xml(rows)).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }

    fn sheet_xml(rows: &[&[&str]]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            let number = r + 1;
            xml.push_str(&format!(r#"<row r="{number}">"#));
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let reference = format!("{}{number}", column_name(c));
                if value.parse::<f64>().is_ok() {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
                } else {
                    let escaped = value.replace('&', "&amp;").replace('<', "&lt;");
                    xml.push_str(&format!(
                        r#"<c r="{reference}" t="inlineStr"><is><t>{escaped}</t></is></c>"#
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }

    fn column_name(mut index: usize) -> String {
        let mut name = Vec::new();
        loop {
            name.push(b'A' + u8::try_from(index % 26).unwrap());
            if index < 26 {
                break;
            }
            index = index / 26 - 1;
        }
        name.reverse();
        String::from_utf8(name).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn converts_column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("H12"), Some(7));
        assert_eq!(column_index("AA3"), Some(26));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index("XFD1"), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index(&"Z".repeat(40)), None);
    }

    fn raw_sheet(sheet_data: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("xl/workbook.xml", options).unwrap();
        writer
            .write_all(br#"<workbook><sheets><sheet name="Only" sheetId="1"/></sheets></workbook>"#)
            .unwrap();
        writer.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        write!(writer, "<worksheet><sheetData>{sheet_data}</sheetData></worksheet>").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn rejects_row_beyond_format_limit() {
        let bytes = raw_sheet(r#"<row r="99999999999"><c r="A99999999999"><v>1</v></c></row>"#);
        let err = read_sheet(&bytes, None).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("row limit"), "{err}");
    }

    #[test]
    fn rejects_column_beyond_format_limit() {
        let bytes = raw_sheet(r#"<row r="1"><c r="ZZZZZZ1"><v>1</v></c></row>"#);
        let err = read_sheet(&bytes, None).unwrap_err();
        assert!(err.to_string().contains("column limit"), "{err}");

        let bytes = raw_sheet(r#"<row r="1"><c r="XFD1"><v>1</v></c></row>"#);
        let sheet = read_sheet(&bytes, None).unwrap();
        assert_eq!(sheet.cell(0, MAX_COLUMNS - 1), &Cell::Number(1.0));
    }

    #[test]
    fn reads_first_sheet_by_default() {
        let bytes = test_support::workbook(&[
            ("Forecasts", &[&["Institution", "2025"], &["FPB", "1.2"]]),
            ("Notes", &[&["ignored"]]),
        ]);
        let sheet = read_sheet(&bytes, None).unwrap();
        assert_eq!(sheet.height(), 2);
        assert_eq!(sheet.cell(0, 0), &Cell::Text("Institution".to_string()));
        assert_eq!(sheet.cell(1, 1), &Cell::Number(1.2));
        assert_eq!(sheet.cell(9, 9), &Cell::Empty);
    }

    #[test]
    fn selects_sheet_by_name() {
        let bytes = test_support::workbook(&[
            ("Forecasts", &[&["a"]]),
            ("Notes", &[&["b"]]),
        ]);
        let sheet = read_sheet(&bytes, Some("notes")).unwrap();
        assert_eq!(sheet.cell(0, 0).text(), "b");

        let err = read_sheet(&bytes, Some("missing")).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn keeps_gaps_between_sparse_cells() {
        let bytes = test_support::workbook(&[("S", &[&["x", "", "", "7"], &[], &["", "y"]])]);
        let sheet = read_sheet(&bytes, None).unwrap();
        assert_eq!(sheet.cell(0, 3), &Cell::Number(7.0));
        assert!(sheet.cell(0, 1).is_blank());
        assert!(sheet.row(1).is_empty());
        assert_eq!(sheet.cell(2, 1).text(), "y");
    }

    #[test]
    fn resolves_shared_and_rich_strings() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("xl/workbook.xml", options).unwrap();
        writer
            .write_all(br#"<workbook><sheets><sheet name="Only" sheetId="1"/></sheets></workbook>"#)
            .unwrap();
        writer.start_file("xl/sharedStrings.xml", options).unwrap();
        writer
            .write_all(
                br#"<sst count="2"><si><t xml:space="preserve">Croissance du PIB</t></si><si><r><t>Mise &#224; j</t></r><r><rPr><b/></rPr><t>our</t></r></si></sst>"#,
            )
            .unwrap();
        writer.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        writer
            .write_all(
                br#"<worksheet><sheetData><row r="2"><c r="B2" t="s"><v>0</v></c><c r="C2" t="s"><v>1</v></c><c r="D2" t="str"><v>calc</v></c></row></sheetData></worksheet>"#,
            )
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let sheet = read_sheet(&bytes, None).unwrap();
        assert!(sheet.row(0).is_empty());
        assert_eq!(sheet.cell(1, 1).text(), "Croissance du PIB");
        assert_eq!(sheet.cell(1, 2).text(), "Mise à jour");
        assert_eq!(sheet.cell(1, 3).text(), "calc");
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let err = read_sheet(b"<html>not a workbook</html>", None).unwrap_err();
        assert!(matches!(err, SourceError::Zip(_)));
        assert!(err.is_parse());
    }
}
