//! Header listing for uploaded mapping spreadsheets.
//!
//! Purely descriptive: the result feeds a key-selection control, nothing here
//! takes part in the merge.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MappingFileError;
use crate::table::read_csv;

/// Sheet name → header cells of the sheet's first row.
pub type SheetHeaders = BTreeMap<String, Vec<String>>;

/// Lists the headers of a `.csv` or `.xlsx` mapping file.
///
/// A CSV file yields a single sheet named after the file stem.
pub fn list_headers(path: &Path) -> Result<SheetHeaders, MappingFileError> {
    let bytes = std::fs::read(path).map_err(|e| MappingFileError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    list_headers_in(filename, &bytes)
}

/// Same as [`list_headers`] for a file already held in memory. The format
/// is picked from the extension of `filename`.
pub fn list_headers_in(filename: &str, bytes: &[u8]) -> Result<SheetHeaders, MappingFileError> {
    let path = Path::new(filename);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => {
            let table = read_csv(bytes)?;
            let sheet = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sheet")
                .to_string();
            let mut sheets = SheetHeaders::new();
            sheets.insert(sheet, table.headers().to_vec());
            Ok(sheets)
        }
        "xlsx" => xlsx_headers(Cursor::new(bytes)),
        other => Err(MappingFileError::UnsupportedFormat(if other.is_empty() {
            filename.to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

/// Reads the first row of every worksheet in an XLSX workbook.
pub fn xlsx_headers<R: Read + Seek>(reader: R) -> Result<SheetHeaders, MappingFileError> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| MappingFileError::Xlsx(format!("Failed to open workbook: {}", e)))?;

    let workbook = read_entry(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| MappingFileError::Xlsx("Missing xl/workbook.xml".to_string()))?;
    let sheets = parse_workbook(&workbook)?;

    let relationships = match read_entry(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut headers = SheetHeaders::new();
    for (index, (name, rel_id)) in sheets.into_iter().enumerate() {
        let target = rel_id
            .and_then(|id| relationships.get(&id).cloned())
            .map(|t| sheet_path(&t))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));

        let row = match read_entry(&mut archive, &target)? {
            Some(xml) => parse_first_row(&xml, &shared_strings)?,
            None => {
                log::warn!("Worksheet '{}' not found at {}", name, target);
                Vec::new()
            }
        };
        headers.insert(name, row);
    }

    Ok(headers)
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, MappingFileError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(MappingFileError::Xlsx(format!(
                "Failed to open {}: {}",
                name, e
            )))
        }
    };

    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| MappingFileError::Xlsx(format!("Failed to read {}: {}", name, e)))?;
    Ok(Some(content))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn sheet_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn attribute(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn xml_error(e: quick_xml::Error) -> MappingFileError {
    MappingFileError::Xlsx(format!("XML parsing error: {}", e))
}

fn decode_text(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.into_owned(),
    }
}

/// Returns `(sheet name, relationship id)` in workbook order.
fn parse_workbook(xml: &str) -> Result<Vec<(String, Option<String>)>, MappingFileError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if let Some(name) = attribute(&e, b"name") {
                    sheets.push((name, attribute(&e, b"id")));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheets)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, MappingFileError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attribute(&e, b"Id"), attribute(&e, b"Target"))
                {
                    relationships.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(relationships)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, MappingFileError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = in_item,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(e) if in_text => current.push_str(&decode_text(&e)),
            Event::CData(e) if in_text => current.push_str(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Reads the header cells of the first `<row>` in a worksheet. Blank cells
/// are skipped.
fn parse_first_row(xml: &str, shared_strings: &[String]) -> Result<Vec<String>, MappingFileError> {
    let mut reader = Reader::from_str(xml);
    let mut headers = Vec::new();
    let mut in_row = false;
    let mut cell_type: Option<String> = None;
    let mut in_value = false;
    let mut value = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => in_row = true,
                b"c" if in_row => {
                    cell_type = attribute(&e, b"t");
                    value.clear();
                }
                b"v" | b"t" if in_row => in_value = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"row" if in_row => break,
                b"v" | b"t" => in_value = false,
                b"c" if in_row => {
                    let text = match cell_type.as_deref() {
                        Some("s") => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|idx| shared_strings.get(idx).cloned())
                            .unwrap_or_default(),
                        _ => value.clone(),
                    };
                    let text = text.trim();
                    if !text.is_empty() {
                        headers.push(text.to_string());
                    }
                    cell_type = None;
                }
                _ => {}
            },
            Event::Text(e) if in_value => value.push_str(&decode_text(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(headers)
}
