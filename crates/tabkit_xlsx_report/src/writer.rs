//! Workbook orchestration for merged-cell report sheets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rust_xlsxwriter::Workbook;

use crate::conf::N_LEN_EXCEL_SHEET_NAME_MAX;
use crate::layout::build_plan;
use crate::render::render_sheet;
use crate::sink::XlsxSheetSink;
use crate::spec::{ReportError, SpecMergeReportOptions, SpecMergeSheet, SpecSheetReport};
use crate::table::Table;
use crate::util::{derive_row_padding, sanitize_sheet_name, validate_sheet_dimensions};

/// Stateful workbook writer for merged-cell sheets.
///
/// The workbook is buffered in memory and persisted once by [`Self::close`].
/// Dropping the writer without closing discards everything written so far.
pub struct MergeReportWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    options: SpecMergeReportOptions,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecSheetReport>,
    if_closed: bool,
}

impl MergeReportWriter {
    /// Create writer bound to an output path and sheet options.
    pub fn new(path_file_out: impl Into<PathBuf>, options: SpecMergeReportOptions) -> Self {
        Self {
            path_file_out: path_file_out.into(),
            workbook: Workbook::new(),
            options,
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Return immutable snapshot of per-sheet write reports.
    pub fn report(&self) -> Vec<SpecSheetReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), ReportError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook.save(&self.path_file_out)?;
        self.if_closed = true;
        info!(
            "saved workbook {} with {} sheet(s)",
            self.file_out(),
            self.l_reports.len()
        );
        Ok(())
    }

    /// Plan and render one merged-cell sheet.
    ///
    /// Everything that can be validated is checked before a worksheet is
    /// added. If rendering itself fails the workbook may hold a partial sheet
    /// and the writer should be dropped.
    pub fn write_merged_sheet(
        &mut self,
        sheet: SpecMergeSheet,
    ) -> Result<SpecSheetReport, ReportError> {
        if self.if_closed {
            return Err(ReportError::WriterClosed);
        }

        let SpecMergeSheet {
            table,
            sheet_name,
            cols_group,
            if_merge_cells,
            header_grid,
        } = sheet;

        let n_header_levels = header_grid.as_ref().map_or(1, Vec::len);
        let row_padding = derive_row_padding(n_header_levels);
        validate_sheet_dimensions(table.height(), table.width(), row_padding)?;

        let l_cols_original = table.columns().to_vec();
        let (plan, table) = build_plan(table, &cols_group, row_padding)?;
        let header_grid = header_grid
            .map(|grid| derive_projected_header_grid(grid, &l_cols_original, table.columns()))
            .transpose()?;

        let options = SpecMergeReportOptions {
            if_merge_cells,
            ..self.options.clone()
        };

        let sheet_name_unique =
            self.derive_unique_sheet_name(&sanitize_sheet_name(&sheet_name, "_"));
        let worksheet = self.workbook.add_worksheet();
        worksheet.set_name(&sheet_name_unique)?;
        info!(
            "sheet {sheet_name_unique:?}: {} rows x {} cols, grouped by {:?}",
            table.height(),
            table.width(),
            plan.cols_group
        );

        let mut sink = XlsxSheetSink::new(worksheet);
        let mut report = render_sheet(&mut sink, &plan, &table, header_grid.as_deref(), &options)?;
        if sheet_name_unique != sheet_name {
            report.warn(format!(
                "sheet name {sheet_name:?} written as {sheet_name_unique:?}."
            ));
        }
        report.sheet_name = sheet_name_unique;

        self.l_reports.push(report.clone());
        Ok(report)
    }

    /// Excel compares sheet names case-insensitively, so the registry holds
    /// lowercased names.
    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        if self.set_sheet_names_existing.insert(name.to_lowercase()) {
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if self.set_sheet_names_existing.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// Produces the sheets of one workbook.
///
/// Called once per workbook. Implementations may also write sheets directly
/// through the writer before returning the rest.
pub trait SheetBuilder {
    /// Return the sheets still to be written, in workbook order.
    ///
    /// An error aborts the workbook before anything is saved.
    fn build(
        &mut self,
        writer: &mut MergeReportWriter,
    ) -> Result<Vec<SpecMergeSheet>, ReportError>;
}

impl<F> SheetBuilder for F
where
    F: FnMut(&mut MergeReportWriter) -> Result<Vec<SpecMergeSheet>, ReportError>,
{
    fn build(
        &mut self,
        writer: &mut MergeReportWriter,
    ) -> Result<Vec<SpecMergeSheet>, ReportError> {
        self(writer)
    }
}

/// Write every sheet in order and persist the workbook once.
pub fn build_workbook(
    path: impl AsRef<Path>,
    sheets: Vec<SpecMergeSheet>,
) -> Result<Vec<SpecSheetReport>, ReportError> {
    build_workbook_with_options(path, sheets, SpecMergeReportOptions::default())
}

/// [`build_workbook`] with explicit sheet options.
pub fn build_workbook_with_options(
    path: impl AsRef<Path>,
    sheets: Vec<SpecMergeSheet>,
    options: SpecMergeReportOptions,
) -> Result<Vec<SpecSheetReport>, ReportError> {
    let mut writer = MergeReportWriter::new(path.as_ref(), options);
    let result = write_sheets(&mut writer, sheets).and_then(|()| writer.close());
    finish_writer(writer, result)
}

/// Write one table as a single merged-cell sheet.
///
/// `cols_sort` of `None` (or empty) groups by every column.
pub fn write_merged_sheet(
    table: Table,
    path: impl AsRef<Path>,
    sheet_name: &str,
    cols_sort: Option<&[String]>,
    if_merge_cells: bool,
) -> Result<SpecSheetReport, ReportError> {
    let sheet = SpecMergeSheet::new(table, sheet_name)
        .with_cols_group(cols_sort.unwrap_or_default().iter().cloned())
        .with_merge_cells(if_merge_cells);

    let l_reports = build_workbook(path, vec![sheet])?;
    l_reports
        .into_iter()
        .next()
        .ok_or_else(|| ReportError::WriteFailure("no sheet was written.".to_string()))
}

/// Let `builder` produce the sheets of one workbook, then persist it once.
pub fn write_multi_sheet_workbook(
    path: impl AsRef<Path>,
    mut builder: impl SheetBuilder,
) -> Result<Vec<SpecSheetReport>, ReportError> {
    let mut writer = MergeReportWriter::new(path.as_ref(), SpecMergeReportOptions::default());
    let result = builder
        .build(&mut writer)
        .and_then(|sheets| write_sheets(&mut writer, sheets))
        .and_then(|()| writer.close());
    finish_writer(writer, result)
}

fn write_sheets(
    writer: &mut MergeReportWriter,
    sheets: Vec<SpecMergeSheet>,
) -> Result<(), ReportError> {
    for sheet in sheets {
        writer.write_merged_sheet(sheet)?;
    }
    Ok(())
}

fn finish_writer(
    writer: MergeReportWriter,
    result: Result<(), ReportError>,
) -> Result<Vec<SpecSheetReport>, ReportError> {
    match result {
        Ok(()) => Ok(writer.report()),
        Err(err) => {
            warn!("discarding unsaved workbook {}: {err}", writer.file_out());
            Err(err)
        }
    }
}

/// Reorder header grid columns from `cols_original` order to `cols_projected` order.
fn derive_projected_header_grid(
    header_grid: Vec<Vec<String>>,
    cols_original: &[String],
    cols_projected: &[String],
) -> Result<Vec<Vec<String>>, ReportError> {
    if header_grid.is_empty() {
        return Err(ReportError::InvalidTable(
            "header grid must have >= 1 row.".to_string(),
        ));
    }
    if let Some(row) = header_grid.iter().find(|row| row.len() != cols_original.len()) {
        return Err(ReportError::InvalidTable(format!(
            "header grid width {} must equal table width {}.",
            row.len(),
            cols_original.len()
        )));
    }
    if cols_original == cols_projected {
        return Ok(header_grid);
    }

    let l_positions: Vec<usize> = cols_projected
        .iter()
        .map(|c_name| {
            cols_original
                .iter()
                .position(|c_orig| c_orig == c_name)
                .ok_or_else(|| ReportError::InvalidColumn(c_name.clone()))
        })
        .collect::<Result<_, _>>()?;

    Ok(header_grid
        .into_iter()
        .map(|row| l_positions.iter().map(|&n_pos| row[n_pos].clone()).collect())
        .collect())
}
