use crate::domain::model::{Cell, OutputFormat, Workbook};
use crate::domain::ports::WorkbookWriter;
use crate::utils::error::{ReportError, Result};
use rust_xlsxwriter::Format;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

// 超過這個範圍的整數存成 f64 會失真，改寫成文字
const MAX_EXACT_INTEGER: u64 = 1 << 53;

// Excel 單一儲存格的字元上限
const MAX_CELL_CHARS: usize = 32_767;

pub fn writer_for(format: OutputFormat) -> Box<dyn WorkbookWriter> {
    match format {
        OutputFormat::Xlsx => Box::new(XlsxWriter),
        OutputFormat::CsvZip => Box::new(CsvZipWriter),
    }
}

/// 一個查詢一個工作表，標題列為粗體
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxWriter;

impl WorkbookWriter for XlsxWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Xlsx
    }

    fn render(&self, workbook: &Workbook) -> Result<Vec<u8>> {
        let mut book = rust_xlsxwriter::Workbook::new();
        let header = Format::new().set_bold();

        for sheet in &workbook.sheets {
            let worksheet = book.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (c, column) in sheet.columns.iter().enumerate() {
                let (row, col) = position(0, c)?;
                let text = fit_cell(column, &sheet.name, row, col);
                worksheet.write_string_with_format(row, col, text, &header)?;
            }

            for (r, values) in sheet.rows.iter().enumerate() {
                for (c, cell) in values.iter().enumerate() {
                    let (row, col) = position(r + 1, c)?;
                    match cell {
                        Cell::Null => {}
                        Cell::Bool(b) => {
                            worksheet.write_boolean(row, col, *b)?;
                        }
                        Cell::Int(i) if i.unsigned_abs() <= MAX_EXACT_INTEGER => {
                            worksheet.write_number(row, col, *i as f64)?;
                        }
                        Cell::Int(i) => {
                            worksheet.write_string(row, col, i.to_string())?;
                        }
                        Cell::Float(v) => {
                            worksheet.write_number(row, col, *v)?;
                        }
                        Cell::Text(s) => {
                            let text = fit_cell(s, &sheet.name, row, col);
                            worksheet.write_string(row, col, text)?;
                        }
                    }
                }
            }
        }

        Ok(book.save_to_buffer()?)
    }
}

/// 超過上限的文字截斷，整份檔案仍可寫出
fn fit_cell<'a>(text: &'a str, sheet: &str, row: u32, col: u16) -> &'a str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        None => text,
        Some((cut, _)) => {
            tracing::warn!(
                "⚠️ {} row {} column {}: {} characters truncated to {}",
                sheet,
                row,
                col,
                text.chars().count(),
                MAX_CELL_CHARS
            );
            &text[..cut]
        }
    }
}

fn position(row: usize, col: usize) -> Result<(u32, u16)> {
    let row = u32::try_from(row).map_err(|_| ReportError::ValidationError {
        message: format!("row {} is beyond the spreadsheet limit", row),
    })?;
    let col = u16::try_from(col).map_err(|_| ReportError::ValidationError {
        message: format!("column {} is beyond the spreadsheet limit", col),
    })?;
    Ok((row, col))
}

/// 每個工作表一個 `<sheet>.csv`，打包成 zip
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvZipWriter;

impl WorkbookWriter for CsvZipWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::CsvZip
    }

    fn render(&self, workbook: &Workbook) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        for sheet in &workbook.sheets {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(&sheet.columns)?;
            for row in &sheet.rows {
                writer.write_record(row.iter().map(|cell| cell.to_string()))?;
            }
            let data = writer
                .into_inner()
                .map_err(|e| ReportError::IoError(e.into_error()))?;

            zip.start_file::<_, ()>(format!("{}.csv", sheet.name), FileOptions::default())?;
            zip.write_all(&data)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}
