//! Shared report specification models, options and errors.

use polars::prelude::PolarsError;
use rust_xlsxwriter::XlsxError;

use crate::table::Table;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification; every `None` field leaves the property unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Border color for all sides.
    pub border_color: Option<String>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            border_color: other
                .border_color
                .clone()
                .or_else(|| self.border_color.clone()),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

/// Normalized cell value.
///
/// Tables carry exactly these four shapes; rendering and statistics dispatch
/// on the tag rather than inspecting source dtypes.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Calendar date as days since 1970-01-01.
    Date(i32),
}

impl EnumCellValue {
    /// Whether the value is missing (`None` or a NaN number).
    pub fn is_missing(&self) -> bool {
        match self {
            Self::None => true,
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Plain display text; missing values render as an empty string.
    pub fn to_text(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::String(s) => s.clone(),
            Self::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::Date(days) => crate::util::format_epoch_days(*days),
        }
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl<T> From<Option<T>> for EnumCellValue
where
    T: Into<EnumCellValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LayoutSpecification

/// One contiguous run of rows sharing a grouping key.
///
/// Rows are 0-based table positions; `row_first <= row_last`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSpan {
    /// Value of the last grouping column for this run.
    pub value: EnumCellValue,
    /// First table row of the run (inclusive).
    pub row_first: usize,
    /// Last table row of the run (inclusive).
    pub row_last: usize,
    /// Index of the last grouping column in the table's column order.
    pub col_idx: usize,
}

impl SpecSpan {
    /// Number of rows covered.
    pub fn n_rows(&self) -> usize {
        self.row_last - self.row_first + 1
    }
}

/// Span placed on the sheet, tagged with its prefix and band parity.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecPlannedSpan {
    /// Grouping prefix length (1-based) that produced this span.
    pub n_prefix: usize,
    /// Band parity: 0 selects band A, 1 selects band B.
    pub parity: u8,
    /// Span in table coordinates.
    pub span: SpecSpan,
    /// First sheet row (`span.row_first + row_padding`).
    pub row_first_sheet: usize,
    /// Last sheet row (`span.row_last + row_padding`).
    pub row_last_sheet: usize,
}

/// Ordered spans for every grouping prefix of one sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRenderPlan {
    /// Resolved grouping columns, most-significant first.
    pub cols_group: Vec<String>,
    /// Columns not used for grouping, in table order.
    pub cols_remaining: Vec<String>,
    /// Header rows preceding the first data row.
    pub row_padding: usize,
    /// Spans ordered by prefix then by group.
    pub spans: Vec<SpecPlannedSpan>,
}

impl SpecRenderPlan {
    /// Spans produced for one prefix length.
    pub fn spans_for_prefix(&self, n_prefix: usize) -> impl Iterator<Item = &SpecPlannedSpan> {
        self.spans
            .iter()
            .filter(move |planned| planned.n_prefix == n_prefix)
    }

    /// Whether a remaining-columns pass is required.
    pub fn has_remaining_columns(&self) -> bool {
        !self.cols_remaining.is_empty()
    }
}

/// Horizontal header merge plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHeaderMerge {
    /// Header row index where the merge is applied.
    pub row_idx: usize,
    /// Start column index (inclusive).
    pub col_idx_start: usize,
    /// End column index (inclusive).
    pub col_idx_end: usize,
    /// Merge display text.
    pub text: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetOptions

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only (default).
    #[default]
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells.
    All,
}

/// Autofit policy for one sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::Header,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Formatting and layout options for merged-cell sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMergeReportOptions {
    /// Header cell format.
    pub fmt_header: SpecCellFormat,
    /// Band format for parity 0.
    pub fmt_band_a: SpecCellFormat,
    /// Band format for parity 1.
    pub fmt_band_b: SpecCellFormat,
    /// Format for ungrouped cells before conditional banding applies.
    pub fmt_body: SpecCellFormat,
    /// Number format overlaid on date cells.
    pub num_format_date: String,
    /// Merge multi-row spans into one cell instead of banding each row.
    pub if_merge_cells: bool,
    /// Number of frozen columns.
    pub col_freeze: usize,
    /// Frozen row index; defaults to the row padding when `None`.
    pub row_freeze: Option<usize>,
    /// Column autofit policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
}

impl Default for SpecMergeReportOptions {
    fn default() -> Self {
        crate::conf::derive_default_merge_report_options()
    }
}

/// One sheet request for the workbook orchestrator.
#[derive(Debug, Clone)]
pub struct SpecMergeSheet {
    /// Source table.
    pub table: Table,
    /// Requested sheet name (sanitized and de-duplicated on write).
    pub sheet_name: String,
    /// Grouping columns; empty groups by all columns.
    pub cols_group: Vec<String>,
    /// Merge multi-row spans.
    pub if_merge_cells: bool,
    /// Optional multi-level header grid aligned to the table's columns.
    pub header_grid: Option<Vec<Vec<String>>>,
}

impl SpecMergeSheet {
    /// Sheet grouped by every column, merged, with a single header row.
    pub fn new(table: Table, sheet_name: impl Into<String>) -> Self {
        Self {
            table,
            sheet_name: sheet_name.into(),
            cols_group: vec![],
            if_merge_cells: true,
            header_grid: None,
        }
    }

    /// Set grouping columns.
    pub fn with_cols_group<I, S>(mut self, cols_group: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cols_group = cols_group.into_iter().map(Into::into).collect();
        self
    }

    /// Set the merge flag.
    pub fn with_merge_cells(mut self, if_merge_cells: bool) -> Self {
        self.if_merge_cells = if_merge_cells;
        self
    }

    /// Set a multi-level header grid.
    pub fn with_header_grid(mut self, header_grid: Vec<Vec<String>>) -> Self {
        self.header_grid = Some(header_grid);
        self
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Per-sheet write report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecSheetReport {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Data rows written.
    pub n_rows: usize,
    /// Data columns written.
    pub n_cols: usize,
    /// Spans rendered across all prefixes.
    pub n_spans: usize,
    /// Spans rendered as merged ranges.
    pub n_merged: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecSheetReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ProfileSpecification

/// Inferred column dtype label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumColumnDtype {
    /// Whole numbers without missing values.
    Int64,
    /// Any other numeric column.
    Float64,
    /// Calendar dates.
    Date,
    /// Text, mixed or entirely missing.
    Object,
}

impl EnumColumnDtype {
    /// Label written to the profile report.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Date => "datetime64[ns]",
            Self::Object => "object",
        }
    }

    /// Whether numeric statistics apply.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

/// Table-level shape and duplicate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecTableContents {
    /// Row count.
    pub no_rows: usize,
    /// Column count.
    pub no_col: usize,
    /// Rows equal to an earlier row on every column.
    pub dup_rows: usize,
    /// Rows whose every value is missing.
    pub all_nan_rows: usize,
}

/// Per-column missingness.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecColumnContents {
    /// Column name.
    pub variable: String,
    /// Inferred dtype.
    pub dtype: EnumColumnDtype,
    /// Non-missing values.
    pub count_excluding_nan: usize,
    /// Missing values.
    pub count_nan: usize,
    /// `count_nan` as a percentage of all rows.
    pub pct_missing: f64,
}

/// Level summary for an object column.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecObjectContents {
    /// Column name.
    pub variable: String,
    /// Distinct non-missing values.
    pub no_levels: usize,
    /// Distinct values counting missing as one level.
    pub no_levels_all: usize,
    /// First distinct values in appearance order (capped).
    pub levels: Vec<EnumCellValue>,
}

/// Describe-style statistics for a numeric column.
///
/// Undefined statistics are NaN (e.g. `std` with fewer than two values).
#[derive(Debug, Clone, PartialEq)]
pub struct SpecNumericStats {
    /// Column name.
    pub variable: String,
    /// Non-missing values.
    pub count: usize,
    /// Arithmetic mean of the non-missing values.
    pub mean: f64,
    /// Sample standard deviation.
    pub std: f64,
    /// Smallest value.
    pub min: f64,
    /// 25th percentile, linear interpolation.
    pub q25: f64,
    /// Median.
    pub q50: f64,
    /// 75th percentile, linear interpolation.
    pub q75: f64,
    /// Largest value.
    pub max: f64,
}

/// Everything written by the profile report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecProfileReport {
    /// Whole-table counts (`table_contents` sheet).
    pub table_contents: SpecTableContents,
    /// One entry per column (`col_contents` sheet).
    pub col_contents: Vec<SpecColumnContents>,
    /// Object columns and their levels (`obj_contents` sheet).
    pub obj_contents: Vec<SpecObjectContents>,
    /// Numeric columns only (`num_stats` sheet).
    pub num_stats: Vec<SpecNumericStats>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Errors raised while planning or writing reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A referenced column does not exist in the table.
    #[error("Column not found: {0:?}")]
    InvalidColumn(String),
    /// Column names (table or grouping list) are repeated.
    #[error("Duplicate column names detected: {0}")]
    DuplicateColumn(String),
    /// The table has zero rows.
    #[error("Table has no rows; spans and statistics are undefined.")]
    EmptyTable,
    /// Table shape exceeds worksheet limits.
    #[error("Excel limit exceeded: {0}")]
    ExcelLimit(String),
    /// Table construction or conversion failed.
    #[error("Invalid table: {0}")]
    InvalidTable(String),
    /// Underlying workbook or file write failed.
    #[error("xlsx write error: {0}")]
    WriteFailure(String),
    /// Writer already persisted its workbook.
    #[error("Cannot write after close().")]
    WriterClosed,
}

impl From<XlsxError> for ReportError {
    fn from(err: XlsxError) -> Self {
        Self::WriteFailure(err.to_string())
    }
}

impl From<PolarsError> for ReportError {
    fn from(err: PolarsError) -> Self {
        Self::InvalidTable(err.to_string())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_format_merge_prefers_right_side() {
        let base = SpecCellFormat {
            font_name: Some("Calibri".to_string()),
            border: Some(1),
            bg_color: Some("#FFFFFF".to_string()),
            ..Default::default()
        };
        let merged = base.with_(SpecCellFormat {
            bg_color: Some("#B8CCE4".to_string()),
            ..Default::default()
        });

        assert_eq!(merged.font_name.as_deref(), Some("Calibri"));
        assert_eq!(merged.border, Some(1));
        assert_eq!(merged.bg_color.as_deref(), Some("#B8CCE4"));
    }

    #[test]
    fn test_cell_value_text_and_missing() {
        assert_eq!(EnumCellValue::Number(3.0).to_text(), "3");
        assert_eq!(EnumCellValue::Number(2.5).to_text(), "2.5");
        assert_eq!(EnumCellValue::Date(0).to_text(), "1970-01-01");
        assert!(EnumCellValue::None.is_missing());
        assert!(EnumCellValue::Number(f64::NAN).is_missing());
        assert!(!EnumCellValue::from("x").is_missing());
        assert_eq!(EnumCellValue::from(Some(1i64)), EnumCellValue::Number(1.0));
        assert_eq!(EnumCellValue::from(None::<i64>), EnumCellValue::None);
    }
}
