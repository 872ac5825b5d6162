//! `tabkit_xlsx_report` v1:
//! Formatted XLSX reports from tabular data.
//!
//! Modules:
//! - `conf`    : constants and default presets
//! - `spec`    : specs/models/options and errors
//! - `util`    : pure helper functions
//! - `table`   : in-memory table model and input adapters
//! - `layout`  : group spans and per-prefix render plans
//! - `sink`    : sheet-writing seam (xlsx and in-memory)
//! - `render`  : merged-cell sheet renderer
//! - `writer`  : workbook orchestration
//! - `profile` : summary/profiling report
pub mod conf;
pub mod layout;
pub mod profile;
pub mod render;
pub mod sink;
pub mod spec;
pub mod table;
pub mod util;
pub mod writer;

pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use layout::{build_plan, compute_spans};
pub use profile::{derive_profile_report, write_profile_report};
pub use render::render_sheet;
pub use sink::{GridSheetSink, SheetSink, XlsxSheetSink};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumColumnDtype, ReportError, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecMergeReportOptions, SpecMergeSheet, SpecPlannedSpan, SpecProfileReport,
    SpecRenderPlan, SpecSheetReport, SpecSpan,
};
pub use table::Table;
pub use writer::{
    build_workbook, build_workbook_with_options, write_merged_sheet, write_multi_sheet_workbook,
    MergeReportWriter, SheetBuilder,
};
