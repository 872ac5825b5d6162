//! Summary/profiling report: shape, duplicates, missingness and column statistics.

use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::info;
use rust_xlsxwriter::Workbook;

use crate::conf::{
    derive_default_report_formats, C_EXT_XLSX, C_SHEET_COL_CONTENTS, C_SHEET_NUM_STATS,
    C_SHEET_OBJ_CONTENTS, C_SHEET_TABLE_CONTENTS, N_PROFILE_LEVELS_MAX,
};
use crate::sink::{SheetSink, XlsxSheetSink};
use crate::spec::{
    EnumCellValue, EnumColumnDtype, ReportError, SpecAutofitCellsPolicy, SpecCellFormat,
    SpecColumnContents, SpecNumericStats, SpecObjectContents, SpecProfileReport,
    SpecTableContents,
};
use crate::table::{compare_cell_values, Table};
use crate::util::{calculate_autofit_width, estimate_unicode_string_width};

////////////////////////////////////////////////////////////////////////////////
// #region Statistics

/// Compute every statistic written by [`write_profile_report`].
pub fn derive_profile_report(table: &Table) -> SpecProfileReport {
    let l_dtypes: Vec<EnumColumnDtype> = (0..table.width())
        .map(|n_col| infer_column_dtype(table.column(n_col)))
        .collect();

    let mut report = SpecProfileReport {
        table_contents: derive_table_contents(table),
        ..Default::default()
    };

    for (n_col, c_name) in table.columns().iter().enumerate() {
        let values = table.column(n_col);
        let n_missing = values.iter().filter(|value| value.is_missing()).count();
        let dtype = l_dtypes[n_col];

        report.col_contents.push(SpecColumnContents {
            variable: c_name.clone(),
            dtype,
            count_excluding_nan: values.len() - n_missing,
            count_nan: n_missing,
            pct_missing: n_missing as f64 / values.len() as f64 * 100.0,
        });

        if dtype == EnumColumnDtype::Object {
            report.obj_contents.push(derive_object_contents(c_name, values));
        }
        if dtype.is_numeric() {
            report.num_stats.push(derive_numeric_stats(c_name, values));
        }
    }

    report
}

fn derive_table_contents(table: &Table) -> SpecTableContents {
    let n_height = table.height();
    let l_cols_idx: Vec<usize> = (0..table.width()).collect();

    let mut l_order: Vec<usize> = (0..n_height).collect();
    l_order.sort_by(|&row_a, &row_b| {
        l_cols_idx
            .iter()
            .map(|&n_col| compare_cell_values(table.value(row_a, n_col), table.value(row_b, n_col)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    let n_dup_rows = l_order
        .windows(2)
        .filter(|pair| table.rows_equal_on(&l_cols_idx, pair[0], pair[1]))
        .count();

    let n_all_nan_rows = if l_cols_idx.is_empty() {
        0
    } else {
        (0..n_height)
            .filter(|&n_row| {
                l_cols_idx
                    .iter()
                    .all(|&n_col| table.value(n_row, n_col).is_missing())
            })
            .count()
    };

    SpecTableContents {
        no_rows: n_height,
        no_col: table.width(),
        dup_rows: n_dup_rows,
        all_nan_rows: n_all_nan_rows,
    }
}

/// Infer a dtype label from non-missing values.
pub fn infer_column_dtype(values: &[EnumCellValue]) -> EnumColumnDtype {
    let mut if_any_number = false;
    let mut if_any_date = false;
    let mut if_any_text = false;
    let mut if_all_integral = true;
    let mut if_any_missing = false;

    for value in values {
        match value {
            EnumCellValue::None => if_any_missing = true,
            EnumCellValue::Number(n) if n.is_nan() => {
                if_any_missing = true;
                if_any_number = true;
            }
            EnumCellValue::Number(n) => {
                if_any_number = true;
                if_all_integral &= n.fract() == 0.0;
            }
            EnumCellValue::Date(_) => if_any_date = true,
            EnumCellValue::String(_) => if_any_text = true,
        }
    }

    match (if_any_number, if_any_date, if_any_text) {
        (true, false, false) if if_all_integral && !if_any_missing => EnumColumnDtype::Int64,
        (true, false, false) => EnumColumnDtype::Float64,
        (false, true, false) => EnumColumnDtype::Date,
        _ => EnumColumnDtype::Object,
    }
}

fn derive_object_contents(c_name: &str, values: &[EnumCellValue]) -> SpecObjectContents {
    let mut l_present: Vec<&EnumCellValue> =
        values.iter().filter(|value| !value.is_missing()).collect();
    l_present.sort_by(|a, b| compare_cell_values(a, b));
    l_present.dedup_by(|a, b| compare_cell_values(a, b) == Ordering::Equal);
    let n_levels = l_present.len();
    let if_any_missing = values.iter().any(EnumCellValue::is_missing);

    let mut l_levels: Vec<EnumCellValue> = Vec::new();
    for value in values {
        if l_levels.len() >= N_PROFILE_LEVELS_MAX {
            break;
        }
        let value = if value.is_missing() {
            EnumCellValue::None
        } else {
            value.clone()
        };
        if !l_levels
            .iter()
            .any(|seen| compare_cell_values(seen, &value) == Ordering::Equal)
        {
            l_levels.push(value);
        }
    }

    SpecObjectContents {
        variable: c_name.to_string(),
        no_levels: n_levels,
        no_levels_all: n_levels + usize::from(if_any_missing),
        levels: l_levels,
    }
}

fn derive_numeric_stats(c_name: &str, values: &[EnumCellValue]) -> SpecNumericStats {
    let mut l_values: Vec<f64> = values
        .iter()
        .filter_map(|value| match value {
            EnumCellValue::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        })
        .collect();
    l_values.sort_by(f64::total_cmp);

    let n_count = l_values.len();
    let mean = if n_count == 0 {
        f64::NAN
    } else {
        l_values.iter().sum::<f64>() / n_count as f64
    };
    let std = if n_count < 2 {
        f64::NAN
    } else {
        let sum_sq: f64 = l_values.iter().map(|x| (x - mean).powi(2)).sum();
        (sum_sq / (n_count - 1) as f64).sqrt()
    };

    SpecNumericStats {
        variable: c_name.to_string(),
        count: n_count,
        mean,
        std,
        min: l_values.first().copied().unwrap_or(f64::NAN),
        q25: calculate_quantile_linear(&l_values, 0.25),
        q50: calculate_quantile_linear(&l_values, 0.5),
        q75: calculate_quantile_linear(&l_values, 0.75),
        max: l_values.last().copied().unwrap_or(f64::NAN),
    }
}

/// Linear-interpolated quantile of ascending `values`; NaN when empty.
fn calculate_quantile_linear(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let pos = q * (values.len() - 1) as f64;
    let n_lo = pos.floor() as usize;
    let n_hi = pos.ceil() as usize;
    values[n_lo] + (values[n_hi] - values[n_lo]) * (pos - n_lo as f64)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Writer

/// Write the four-sheet profile workbook for `table`.
///
/// `.xlsx` is appended unless `path_no_ext` already ends with it. Returns the
/// path written.
pub fn write_profile_report(
    table: &Table,
    path_no_ext: impl AsRef<Path>,
) -> Result<PathBuf, ReportError> {
    let path_file_out = derive_xlsx_path(path_no_ext.as_ref());
    let report = derive_profile_report(table);
    let l_sheets = derive_profile_sheet_tables(&report)?;

    let dict_fmt = derive_default_report_formats();
    let fmt_of = |key: &str| dict_fmt.get(key).cloned().unwrap_or_default();
    let fmt_header = fmt_of("header");
    let fmt_text = fmt_of("text");
    let fmt_integer = fmt_of("integer");
    let fmt_decimal = fmt_of("decimal");
    let policy = SpecAutofitCellsPolicy::default();

    let mut workbook = Workbook::new();
    for (c_sheet_name, sheet_table, l_kinds) in &l_sheets {
        let l_fmt_by_col: Vec<&SpecCellFormat> = l_kinds
            .iter()
            .map(|kind| match kind {
                EnumProfileColumnKind::Text => &fmt_text,
                EnumProfileColumnKind::Integer => &fmt_integer,
                EnumProfileColumnKind::Decimal => &fmt_decimal,
            })
            .collect();

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*c_sheet_name)?;
        let mut sink = XlsxSheetSink::new(worksheet);
        write_plain_sheet(&mut sink, sheet_table, &l_fmt_by_col, &fmt_header, &policy)?;
    }

    workbook.save(&path_file_out)?;
    info!(
        "saved profile report {} ({} rows x {} cols)",
        path_file_out.display(),
        table.height(),
        table.width()
    );
    Ok(path_file_out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumProfileColumnKind {
    Text,
    Integer,
    Decimal,
}

type ProfileSheet = (&'static str, Table, Vec<EnumProfileColumnKind>);

fn derive_profile_sheet_tables(report: &SpecProfileReport) -> Result<Vec<ProfileSheet>, ReportError> {
    use EnumProfileColumnKind::{Decimal, Integer, Text};

    let count = |n: usize| EnumCellValue::Number(n as f64);
    let text = |s: &str| EnumCellValue::String(s.to_string());

    let contents = &report.table_contents;
    let table_contents = Table::new(vec![
        ("no_rows", vec![count(contents.no_rows)]),
        ("no_col", vec![count(contents.no_col)]),
        ("dup_rows", vec![count(contents.dup_rows)]),
        ("all_nan_rows", vec![count(contents.all_nan_rows)]),
    ])?;

    let l_cols = &report.col_contents;
    let col_contents = Table::new(vec![
        ("", (0..l_cols.len()).map(count).collect()),
        ("variable", l_cols.iter().map(|col| text(&col.variable)).collect()),
        ("dtype", l_cols.iter().map(|col| text(col.dtype.as_str())).collect()),
        (
            "count_excluding_nan",
            l_cols.iter().map(|col| count(col.count_excluding_nan)).collect(),
        ),
        ("count_nan", l_cols.iter().map(|col| count(col.count_nan)).collect()),
        (
            "pct_missing",
            l_cols
                .iter()
                .map(|col| EnumCellValue::Number(col.pct_missing))
                .collect(),
        ),
    ])?;

    let l_objs = &report.obj_contents;
    let obj_contents = Table::new(vec![
        ("variable", l_objs.iter().map(|obj| text(&obj.variable)).collect()),
        ("no_levels", l_objs.iter().map(|obj| count(obj.no_levels)).collect()),
        (
            "no_levels_all",
            l_objs.iter().map(|obj| count(obj.no_levels_all)).collect(),
        ),
        (
            "levels",
            l_objs
                .iter()
                .map(|obj| text(&format_levels(&obj.levels)))
                .collect(),
        ),
    ])?;

    let l_nums = &report.num_stats;
    let decimal = |f: fn(&SpecNumericStats) -> f64| -> Vec<EnumCellValue> {
        l_nums.iter().map(|stats| EnumCellValue::Number(f(stats))).collect()
    };
    let num_stats = Table::new(vec![
        ("", l_nums.iter().map(|stats| text(&stats.variable)).collect()),
        ("count", l_nums.iter().map(|stats| count(stats.count)).collect()),
        ("mean", decimal(|stats| stats.mean)),
        ("std", decimal(|stats| stats.std)),
        ("min", decimal(|stats| stats.min)),
        ("25%", decimal(|stats| stats.q25)),
        ("50%", decimal(|stats| stats.q50)),
        ("75%", decimal(|stats| stats.q75)),
        ("max", decimal(|stats| stats.max)),
    ])?;

    Ok(vec![
        (C_SHEET_TABLE_CONTENTS, table_contents, vec![Integer; 4]),
        (
            C_SHEET_COL_CONTENTS,
            col_contents,
            vec![Integer, Text, Text, Integer, Integer, Decimal],
        ),
        (
            C_SHEET_OBJ_CONTENTS,
            obj_contents,
            vec![Text, Integer, Integer, Text],
        ),
        (
            C_SHEET_NUM_STATS,
            num_stats,
            vec![Text, Integer, Decimal, Decimal, Decimal, Decimal, Decimal, Decimal, Decimal],
        ),
    ])
}

/// Render sample levels as `[a, b, nan]`.
fn format_levels(levels: &[EnumCellValue]) -> String {
    let l_text: Vec<String> = levels
        .iter()
        .map(|value| {
            if value.is_missing() {
                "nan".to_string()
            } else {
                value.to_text()
            }
        })
        .collect();
    format!("[{}]", l_text.join(", "))
}

/// Header row plus body rows, no grouping.
fn write_plain_sheet(
    sink: &mut dyn SheetSink,
    table: &Table,
    fmt_by_col: &[&SpecCellFormat],
    fmt_header: &SpecCellFormat,
    policy: &SpecAutofitCellsPolicy,
) -> Result<(), ReportError> {
    for (n_col, c_name) in table.columns().iter().enumerate() {
        let value = if c_name.is_empty() {
            EnumCellValue::None
        } else {
            EnumCellValue::String(c_name.clone())
        };
        sink.write_cell(0, n_col, &value, fmt_header)?;

        for n_row in 0..table.height() {
            sink.write_cell(n_row + 1, n_col, table.value(n_row, n_col), fmt_by_col[n_col])?;
        }

        let n_width_body = table
            .column(n_col)
            .iter()
            .map(|value| estimate_unicode_string_width(&value.to_text()))
            .max()
            .unwrap_or(0);
        if let Some(n_width) =
            calculate_autofit_width(estimate_unicode_string_width(c_name), n_width_body, policy)
        {
            sink.set_column_width(n_col, n_width as f64)?;
        }
    }

    sink.set_freeze_panes(1, 0)?;
    Ok(())
}

fn derive_xlsx_path(path: &Path) -> PathBuf {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(C_EXT_XLSX))
    {
        return path.to_path_buf();
    }
    let mut os_path = OsString::from(path.as_os_str());
    os_path.push(".");
    os_path.push(C_EXT_XLSX);
    PathBuf::from(os_path)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
