//! Tabular (`.xlsx`) rendering of a bundle: a README sheet followed by one
//! sheet per table.

use crate::bundle::Bundle;
use crate::datastore::{column_union, Row};
use crate::error::{Result, VaultError};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use std::collections::HashSet;

/// Excel's sheet name limit
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Excel's per-cell text limit
const MAX_CELL_TEXT_LEN: usize = 32_767;

const README_SHEET: &str = "README";

/// Sheet name for a table: invalid characters replaced, truncated to the
/// sheet name limit and made unique against `taken` (case-insensitive).
pub fn sheet_name(table: &str, taken: &HashSet<String>) -> String {
    let cleaned: String = table
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let cleaned = if cleaned.is_empty() { "table" } else { cleaned };

    let base: String = cleaned.chars().take(MAX_SHEET_NAME_LEN).collect();
    if !taken.contains(&base.to_lowercase()) {
        return base;
    }

    for n in 2.. {
        let suffix = format!("~{}", n);
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        let candidate: String = cleaned.chars().take(keep).chain(suffix.chars()).collect();
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
    }
    unreachable!("sheet name suffixes are unbounded")
}

/// Render the bundle as an `.xlsx` document
pub fn render_workbook(bundle: &Bundle) -> Result<Vec<u8>> {
    build_workbook(bundle).map_err(|e| VaultError::archive(format!("Failed to render workbook: {}", e)))
}

fn build_workbook(bundle: &Bundle) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let mut taken: HashSet<String> = HashSet::new();
    taken.insert(README_SHEET.to_lowercase());

    let sheet_names: Vec<(String, String)> = bundle
        .tables
        .keys()
        .map(|table| {
            let name = sheet_name(table, &taken);
            taken.insert(name.to_lowercase());
            (table.clone(), name)
        })
        .collect();

    {
        let readme = workbook.add_worksheet();
        readme.set_name(README_SHEET)?;
        readme.write_string_with_format(0, 0, "CRM backup", &bold)?;

        let meta = &bundle.meta;
        let rows = [
            ("Version", meta.version.clone()),
            ("Created at", meta.created_at.to_rfc3339()),
            ("Created by", meta.created_by.clone()),
            ("Modules", meta.include_modules.join(", ")),
            ("Includes files", meta.include_files.to_string()),
        ];
        for (i, (label, value)) in rows.iter().enumerate() {
            let row = (i + 2) as u32;
            readme.write_string_with_format(row, 0, *label, &bold)?;
            readme.write_string(row, 1, value.as_str())?;
        }

        let header_row = (rows.len() + 3) as u32;
        readme.write_string_with_format(header_row, 0, "Table", &bold)?;
        readme.write_string_with_format(header_row, 1, "Sheet", &bold)?;
        readme.write_string_with_format(header_row, 2, "Rows", &bold)?;
        for (i, (table, sheet)) in sheet_names.iter().enumerate() {
            let row = header_row + 1 + i as u32;
            let count = bundle.tables.get(table).map(Vec::len).unwrap_or(0);
            readme.write_string(row, 0, table.as_str())?;
            readme.write_string(row, 1, sheet.as_str())?;
            readme.write_number(row, 2, count as f64)?;
        }
    }

    for (table, sheet) in &sheet_names {
        let rows = bundle.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.as_str())?;
        write_table(worksheet, rows, &bold)?;
    }

    workbook.save_to_buffer()
}

fn write_table(
    worksheet: &mut Worksheet,
    rows: &[Row],
    header_format: &Format,
) -> std::result::Result<(), XlsxError> {
    let columns = column_union(rows);

    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name.as_str(), header_format)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (col, name) in columns.iter().enumerate() {
            let col = col as u16;
            match row.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(excel_row, col, *b)?;
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) if n.is_f64() || f.abs() < 1e15 => {
                        worksheet.write_number(excel_row, col, f)?;
                    }
                    _ => {
                        worksheet.write_string(excel_row, col, n.to_string())?;
                    }
                },
                Some(Value::String(s)) => {
                    worksheet.write_string(excel_row, col, cell_text(s))?;
                }
                Some(other) => {
                    worksheet.write_string(excel_row, col, cell_text(&other.to_string()))?;
                }
            }
        }
    }

    Ok(())
}

fn cell_text(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_TEXT_LEN {
        text.to_string()
    } else {
        text.chars().take(MAX_CELL_TEXT_LEN).collect()
    }
}
