//! Sheet-writing primitives used by the renderer.
//!
//! [`SheetSink`] is the seam between layout logic and the spreadsheet
//! library: [`XlsxSheetSink`] forwards to a `rust_xlsxwriter` worksheet,
//! [`GridSheetSink`] records everything in memory.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;

use rust_xlsxwriter::{ConditionalFormatError, Format, FormatAlign, FormatBorder, Worksheet};

use crate::conf::C_NUM_FORMAT_DATE;
use crate::spec::{EnumCellValue, ReportError, SpecCellFormat};
use crate::util::{cast_col_num, cast_row_num, derive_naive_date_from_epoch_days};

/// Cell-level write operations on one worksheet.
///
/// Rows and columns are 0-based sheet coordinates; ranges are inclusive.
pub trait SheetSink {
    /// Write one value with a format.
    fn write_cell(
        &mut self,
        row: usize,
        col: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError>;

    /// Merge a range into one cell holding `value`.
    fn merge_range(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError>;

    /// Apply `fmt` to every non-error cell in the range.
    fn conditional_format(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError>;

    /// Freeze rows above `row` and columns left of `col`.
    fn set_freeze_panes(&mut self, row: usize, col: usize) -> Result<(), ReportError>;

    /// Set a column width in character units.
    fn set_column_width(&mut self, col: usize, width: f64) -> Result<(), ReportError>;
}

////////////////////////////////////////////////////////////////////////////////
// #region XlsxSheetSink

/// [`SheetSink`] over a `rust_xlsxwriter` worksheet with a format cache.
pub struct XlsxSheetSink<'a> {
    worksheet: &'a mut Worksheet,
    dict_fmt_cache: HashMap<SpecCellFormat, Format>,
}

impl<'a> XlsxSheetSink<'a> {
    /// Wrap a worksheet.
    pub fn new(worksheet: &'a mut Worksheet) -> Self {
        Self {
            worksheet,
            dict_fmt_cache: HashMap::new(),
        }
    }

    fn derive_format(&mut self, spec: &SpecCellFormat) -> Format {
        self.dict_fmt_cache
            .entry(spec.clone())
            .or_insert_with(|| derive_rust_xlsx_format(spec))
            .clone()
    }
}

impl SheetSink for XlsxSheetSink<'_> {
    fn write_cell(
        &mut self,
        row: usize,
        col: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        let (n_row, n_col) = (cast_row_num(row)?, cast_col_num(col)?);

        match value {
            EnumCellValue::None => {
                let format = self.derive_format(fmt);
                self.worksheet.write_blank(n_row, n_col, &format)?;
            }
            EnumCellValue::Number(val) if !val.is_finite() => {
                let format = self.derive_format(fmt);
                self.worksheet.write_blank(n_row, n_col, &format)?;
            }
            EnumCellValue::Number(val) => {
                let format = self.derive_format(fmt);
                self.worksheet
                    .write_number_with_format(n_row, n_col, *val, &format)?;
            }
            EnumCellValue::String(val) => {
                let format = self.derive_format(fmt);
                self.worksheet
                    .write_string_with_format(n_row, n_col, val, &format)?;
            }
            EnumCellValue::Date(days) => {
                let format = if fmt.num_format.is_some() {
                    self.derive_format(fmt)
                } else {
                    self.derive_format(&fmt.with_(SpecCellFormat {
                        num_format: Some(C_NUM_FORMAT_DATE.to_string()),
                        ..Default::default()
                    }))
                };
                // Outside the 1900-9999 Excel date range the ISO text is written.
                match derive_naive_date_from_epoch_days(*days) {
                    Some(date) if (1900..=9999).contains(&date.year()) => {
                        self.worksheet
                            .write_date_with_format(n_row, n_col, &date, &format)?;
                    }
                    _ => {
                        self.worksheet.write_string_with_format(
                            n_row,
                            n_col,
                            value.to_text(),
                            &format,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_range(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        if row_first == row_last && col_first == col_last {
            return self.write_cell(row_first, col_first, value, fmt);
        }

        let format = self.derive_format(fmt);
        let c_text = match value {
            EnumCellValue::String(val) => val.as_str(),
            _ => "",
        };
        self.worksheet.merge_range(
            cast_row_num(row_first)?,
            cast_col_num(col_first)?,
            cast_row_num(row_last)?,
            cast_col_num(col_last)?,
            c_text,
            &format,
        )?;

        // Non-text values overwrite the merge anchor with their typed cell.
        if !matches!(value, EnumCellValue::String(_) | EnumCellValue::None) {
            self.write_cell(row_first, col_first, value, fmt)?;
        }
        Ok(())
    }

    fn conditional_format(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        let format = self.derive_format(fmt);
        let cond_fmt = ConditionalFormatError::new().invert().set_format(format);
        self.worksheet.add_conditional_format(
            cast_row_num(row_first)?,
            cast_col_num(col_first)?,
            cast_row_num(row_last)?,
            cast_col_num(col_last)?,
            &cond_fmt,
        )?;
        Ok(())
    }

    fn set_freeze_panes(&mut self, row: usize, col: usize) -> Result<(), ReportError> {
        self.worksheet
            .set_freeze_panes(cast_row_num(row)?, cast_col_num(col)?)?;
        Ok(())
    }

    fn set_column_width(&mut self, col: usize, width: f64) -> Result<(), ReportError> {
        self.worksheet.set_column_width(cast_col_num(col)?, width)?;
        Ok(())
    }
}

/// Convert a [`SpecCellFormat`] into a `rust_xlsxwriter` format.
pub fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if let Some(val) = &spec.border_color {
        format = format.set_border_color(val.as_str());
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "center_across" => Some(FormatAlign::CenterAcross),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        "vjustify" | "vertical_justify" => Some(FormatAlign::VerticalJustify),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridSheetSink

/// Recorded cell write.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGridCell {
    /// Written value.
    pub value: EnumCellValue,
    /// Format passed with the write.
    pub fmt: SpecCellFormat,
}

/// Recorded rectangular range (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecGridRange {
    /// First row.
    pub row_first: usize,
    /// First column.
    pub col_first: usize,
    /// Last row.
    pub row_last: usize,
    /// Last column.
    pub col_last: usize,
}

impl SpecGridRange {
    /// Whether (`row`, `col`) lies inside the range.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_first..=self.row_last).contains(&row)
            && (self.col_first..=self.col_last).contains(&col)
    }

    /// Whether two ranges share at least one cell.
    pub fn overlaps(&self, other: &SpecGridRange) -> bool {
        self.row_first <= other.row_last
            && other.row_first <= self.row_last
            && self.col_first <= other.col_last
            && other.col_first <= self.col_last
    }
}

/// In-memory [`SheetSink`]; later writes to a cell replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct GridSheetSink {
    /// Cells by `(row, col)`.
    pub cells: BTreeMap<(usize, usize), SpecGridCell>,
    /// Merged ranges in write order.
    pub merges: Vec<SpecGridRange>,
    /// Conditional formats in write order.
    pub conditional_formats: Vec<(SpecGridRange, SpecCellFormat)>,
    /// Frozen pane position.
    pub freeze_panes: Option<(usize, usize)>,
    /// Column widths.
    pub column_widths: BTreeMap<usize, f64>,
}

impl GridSheetSink {
    /// Empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored at exactly (`row`, `col`).
    pub fn value_at(&self, row: usize, col: usize) -> Option<&EnumCellValue> {
        self.cells.get(&(row, col)).map(|cell| &cell.value)
    }

    /// Displayed value at (`row`, `col`), resolving merged ranges to their anchor.
    pub fn displayed_value_at(&self, row: usize, col: usize) -> Option<&EnumCellValue> {
        match self.merges.iter().find(|range| range.contains(row, col)) {
            Some(range) => self.value_at(range.row_first, range.col_first),
            None => self.value_at(row, col),
        }
    }

    /// Format stored at (`row`, `col`).
    pub fn format_at(&self, row: usize, col: usize) -> Option<&SpecCellFormat> {
        self.cells.get(&(row, col)).map(|cell| &cell.fmt)
    }
}

impl SheetSink for GridSheetSink {
    fn write_cell(
        &mut self,
        row: usize,
        col: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        self.cells.insert(
            (row, col),
            SpecGridCell {
                value: value.clone(),
                fmt: fmt.clone(),
            },
        );
        Ok(())
    }

    fn merge_range(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        value: &EnumCellValue,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        if row_first == row_last && col_first == col_last {
            return self.write_cell(row_first, col_first, value, fmt);
        }

        let range = SpecGridRange {
            row_first,
            col_first,
            row_last,
            col_last,
        };
        if let Some(existing) = self.merges.iter().find(|other| other.overlaps(&range)) {
            return Err(ReportError::WriteFailure(format!(
                "merge range {range:?} overlaps existing merge {existing:?}"
            )));
        }
        self.merges.push(range);
        self.write_cell(row_first, col_first, value, fmt)
    }

    fn conditional_format(
        &mut self,
        row_first: usize,
        col_first: usize,
        row_last: usize,
        col_last: usize,
        fmt: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        self.conditional_formats.push((
            SpecGridRange {
                row_first,
                col_first,
                row_last,
                col_last,
            },
            fmt.clone(),
        ));
        Ok(())
    }

    fn set_freeze_panes(&mut self, row: usize, col: usize) -> Result<(), ReportError> {
        self.freeze_panes = Some((row, col));
        Ok(())
    }

    fn set_column_width(&mut self, col: usize, width: f64) -> Result<(), ReportError> {
        self.column_widths.insert(col, width);
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_sink_rejects_overlapping_merges() {
        let mut sink = GridSheetSink::new();
        let fmt = SpecCellFormat::default();
        let value = EnumCellValue::Number(1.0);

        sink.merge_range(1, 0, 3, 0, &value, &fmt).unwrap();
        let err = sink.merge_range(3, 0, 4, 0, &value, &fmt).unwrap_err();
        assert!(matches!(err, ReportError::WriteFailure(_)));

        sink.merge_range(4, 0, 5, 0, &value, &fmt).unwrap();
        assert_eq!(sink.merges.len(), 2);
    }

    #[test]
    fn test_grid_sink_displayed_value_resolves_merge_anchor() {
        let mut sink = GridSheetSink::new();
        let fmt = SpecCellFormat::default();
        let value = EnumCellValue::String("grp".to_string());

        sink.merge_range(1, 2, 3, 2, &value, &fmt).unwrap();

        assert_eq!(sink.value_at(2, 2), None);
        assert_eq!(sink.displayed_value_at(2, 2), Some(&value));
        assert_eq!(sink.displayed_value_at(4, 2), None);
    }

    #[test]
    fn test_grid_sink_single_cell_merge_is_plain_write() {
        let mut sink = GridSheetSink::new();
        let fmt = SpecCellFormat::default();
        sink.merge_range(1, 1, 1, 1, &EnumCellValue::Number(2.0), &fmt)
            .unwrap();
        assert!(sink.merges.is_empty());
        assert_eq!(sink.value_at(1, 1), Some(&EnumCellValue::Number(2.0)));
    }

    #[test]
    fn test_derive_format_border_and_align_lookup() {
        assert_eq!(derive_format_border(2), FormatBorder::Medium);
        assert_eq!(derive_format_border(99), FormatBorder::None);
        assert_eq!(derive_format_align(" VCenter "), Some(FormatAlign::VerticalCenter));
        assert_eq!(derive_format_align("sideways"), None);
    }
}
