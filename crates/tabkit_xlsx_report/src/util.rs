//! Stateless helper utilities shared by the planner, renderer and writers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, TimeDelta};

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{EnumAutofitColumnsRule, ReportError, SpecAutofitCellsPolicy, SpecHeaderMerge};

////////////////////////////////////////////////////////////////////////////////
// #region ColumnUtils

/// Validate that `columns` has no duplicated names.
pub fn validate_unique_columns(columns: &[String]) -> Result<(), ReportError> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter_map(|(c_name, l_pos)| {
            if l_pos.len() > 1 {
                Some(format!(
                    "{c_name:?} x{} at indices {:?}",
                    l_pos.len(),
                    l_pos
                ))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(ReportError::DuplicateColumn(c_msg))
}

/// Header rows preceding data: 1 for a single header row, `levels + 1` otherwise.
pub fn derive_row_padding(n_header_levels: usize) -> usize {
    if n_header_levels > 1 {
        n_header_levels + 1
    } else {
        1
    }
}

/// Reject tables that cannot fit on one worksheet below the header rows.
pub fn validate_sheet_dimensions(
    height_df: usize,
    width_df: usize,
    row_padding: usize,
) -> Result<(), ReportError> {
    if width_df > N_NCOLS_EXCEL_MAX {
        return Err(ReportError::ExcelLimit(format!(
            "width={width_df} exceeds {N_NCOLS_EXCEL_MAX} columns."
        )));
    }
    if height_df + row_padding > N_NROWS_EXCEL_MAX {
        return Err(ReportError::ExcelLimit(format!(
            "height={height_df} plus {row_padding} header rows exceeds {N_NROWS_EXCEL_MAX} rows."
        )));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
///
/// Excel also rejects names that start or end with an apostrophe.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    let c_name: String = c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect();
    c_name.trim_end_matches('\'').to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region HeaderMergeUtils

/// Inclusive `(first, last)` positions of runs of two or more equal,
/// non-empty labels.
fn derive_repeated_runs(labels: &[&str]) -> Vec<(usize, usize)> {
    let mut l_runs = Vec::new();
    let mut n_first = 0;
    while n_first < labels.len() {
        let c_label = labels[n_first];
        let n_len = labels[n_first..]
            .iter()
            .take_while(|&&c_next| c_next == c_label)
            .count();
        if !c_label.is_empty() && n_len > 1 {
            l_runs.push((n_first, n_first + n_len - 1));
        }
        n_first += n_len;
    }
    l_runs
}

/// Horizontal merges for repeated labels within each header level, keyed by level.
pub fn plan_horizontal_merges(header_grid: &[Vec<String>]) -> BTreeMap<usize, Vec<SpecHeaderMerge>> {
    header_grid
        .iter()
        .enumerate()
        .filter_map(|(row_idx, l_level)| {
            let l_labels: Vec<&str> = l_level.iter().map(String::as_str).collect();
            let l_merges: Vec<SpecHeaderMerge> = derive_repeated_runs(&l_labels)
                .into_iter()
                .map(|(col_idx_start, col_idx_end)| SpecHeaderMerge {
                    row_idx,
                    col_idx_start,
                    col_idx_end,
                    text: l_level[col_idx_start].clone(),
                })
                .collect();
            (!l_merges.is_empty()).then_some((row_idx, l_merges))
        })
        .collect()
}

/// Repeated labels down one column across levels, as `(col, row_first, row_last)`.
fn derive_vertical_runs(header_grid: &[Vec<String>]) -> Vec<(usize, usize, usize)> {
    let n_cols = header_grid.first().map_or(0, Vec::len);
    (0..n_cols)
        .flat_map(|col_idx| {
            let l_labels: Vec<&str> = header_grid
                .iter()
                .map(|l_level| l_level.get(col_idx).map_or("", String::as_str))
                .collect();
            derive_repeated_runs(&l_labels)
                .into_iter()
                .map(move |(row_first, row_last)| (col_idx, row_first, row_last))
        })
        .collect()
}

/// Keep a repeated column label on its top level only; lower levels go blank.
pub fn apply_vertical_run_text_blankout(header_grid: &mut [Vec<String>]) {
    for (col_idx, row_first, row_last) in derive_vertical_runs(header_grid) {
        for l_level in &mut header_grid[row_first + 1..=row_last] {
            l_level[col_idx].clear();
        }
    }
}

/// Cells covered by a horizontal merge, excluding each merge's anchor.
pub fn derive_horizontal_merge_tracker(
    dict_merges_by_row: &BTreeMap<usize, Vec<SpecHeaderMerge>>,
) -> BTreeSet<(usize, usize)> {
    dict_merges_by_row
        .values()
        .flatten()
        .flat_map(|merge| {
            (merge.col_idx_start + 1..=merge.col_idx_end).map(move |col_idx| (merge.row_idx, col_idx))
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DateUtils

/// Calendar date for a count of days since 1970-01-01.
///
/// Returns `None` when the result falls outside chrono's date range.
pub fn derive_naive_date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(TimeDelta::try_days(i64::from(days))?)
}

/// `YYYY-MM-DD` text for a count of days since 1970-01-01.
pub fn format_epoch_days(days: i32) -> String {
    match derive_naive_date_from_epoch_days(days) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => days.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthUtils

/// Approximate display width; non-ASCII glyphs count as 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Final column width from recorded header/body widths and the autofit policy.
///
/// Returns `None` when autofit is disabled.
pub fn calculate_autofit_width(
    width_header: usize,
    width_body: usize,
    policy: &SpecAutofitCellsPolicy,
) -> Option<usize> {
    let n_width_recorded = match policy.rule_columns {
        EnumAutofitColumnsRule::None => return None,
        EnumAutofitColumnsRule::Header => width_header,
        EnumAutofitColumnsRule::Body => width_body,
        EnumAutofitColumnsRule::All => usize::max(width_header, width_body),
    };

    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy.width_cell_max));
    Some(usize::min(
        n_max,
        usize::max(n_min, n_width_recorded + policy.width_cell_padding),
    ))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Casting

/// Cast a sheet row index to the xlsx row type.
pub fn cast_row_num(value: usize) -> Result<u32, ReportError> {
    u32::try_from(value).map_err(|_| ReportError::ExcelLimit(format!("row index overflow: {value}")))
}

/// Cast a sheet column index to the xlsx column type.
pub fn cast_col_num(value: usize) -> Result<u16, ReportError> {
    u16::try_from(value)
        .map_err(|_| ReportError::ExcelLimit(format!("column index overflow: {value}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_repeated_runs_skip_blank_labels() {
        assert_eq!(
            derive_repeated_runs(&["grp", "grp", "", "", "tag", "grp", "grp", "grp"]),
            vec![(0, 1), (5, 7)]
        );
        assert!(derive_repeated_runs(&["lev1", "lev2"]).is_empty());
        assert!(derive_repeated_runs(&[]).is_empty());
    }

    #[test]
    fn test_vertical_runs_follow_label_down_levels() {
        let l_grid = grid(&[
            &["grp", "grp", "tag", "n"],
            &["lev1", "lev2", "tag", "n"],
            &["lev1", "val", "tag", ""],
        ]);

        assert_eq!(
            derive_vertical_runs(&l_grid),
            vec![(0, 1, 2), (2, 0, 2), (3, 0, 1)]
        );
    }

    #[test]
    fn test_blankout_keeps_label_on_top_level() {
        let mut l_grid = grid(&[&["grp", "grp", "tag"], &["lev1", "lev2", "tag"]]);

        apply_vertical_run_text_blankout(&mut l_grid);

        assert_eq!(l_grid[0], vec!["grp", "grp", "tag"]);
        assert_eq!(l_grid[1], vec!["lev1", "lev2", ""]);

        let dict_merges = plan_horizontal_merges(&l_grid);
        assert_eq!(dict_merges.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(dict_merges[&0][0].col_idx_end, 1);

        // A blank level between equal labels breaks the run.
        let mut grid_gap = grid(&[&["tag"], &[""], &["tag"]]);
        apply_vertical_run_text_blankout(&mut grid_gap);
        assert_eq!(grid_gap, grid(&[&["tag"], &[""], &["tag"]]));
    }

    #[test]
    fn test_plan_horizontal_merges_and_tracker() {
        let grid = grid(&[&["grp", "grp", "grp", "val"], &["a", "b", "c", ""]]);

        let dict_merges = plan_horizontal_merges(&grid);
        assert_eq!(
            dict_merges.get(&0),
            Some(&vec![SpecHeaderMerge {
                row_idx: 0,
                col_idx_start: 0,
                col_idx_end: 2,
                text: "grp".to_string(),
            }])
        );
        assert!(!dict_merges.contains_key(&1));

        let set_covered = derive_horizontal_merge_tracker(&dict_merges);
        assert_eq!(
            set_covered.into_iter().collect::<Vec<_>>(),
            vec![(0, 1), (0, 2)]
        );
    }

    #[test]
    fn test_validate_unique_columns_reports_positions() {
        let cols = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let err = validate_unique_columns(&cols).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateColumn(ref msg) if msg.contains("[0, 2]")));
        assert!(validate_unique_columns(&cols[..2]).is_ok());
    }

    #[test]
    fn test_row_padding_accounts_for_header_levels() {
        assert_eq!(derive_row_padding(0), 1);
        assert_eq!(derive_row_padding(1), 1);
        assert_eq!(derive_row_padding(2), 3);
        assert_eq!(derive_row_padding(3), 4);
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("  ", "_"), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40), "_").len(), 31);
        assert_eq!(sanitize_sheet_name("'quoted'", "_"), "quoted");
        assert_eq!(sanitize_sheet_name(" ' ", "_"), "Sheet");
        assert_eq!(sanitize_sheet_name("it's", "_"), "it's");

        let c_cut = format!("{}'tail", "y".repeat(30));
        assert_eq!(sanitize_sheet_name(&c_cut, "_"), "y".repeat(30));
    }

    #[test]
    fn test_epoch_day_conversions() {
        assert_eq!(
            derive_naive_date_from_epoch_days(19_723),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(derive_naive_date_from_epoch_days(i32::MAX), None);

        assert_eq!(format_epoch_days(0), "1970-01-01");
        assert_eq!(format_epoch_days(59), "1970-03-01");
        assert_eq!(format_epoch_days(-1), "1969-12-31");
        assert_eq!(format_epoch_days(i32::MAX), i32::MAX.to_string());
    }

    #[test]
    fn test_calculate_autofit_width_clamps() {
        let policy = SpecAutofitCellsPolicy::default();
        assert_eq!(calculate_autofit_width(3, 100, &policy), Some(8));
        assert_eq!(calculate_autofit_width(20, 0, &policy), Some(22));
        assert_eq!(calculate_autofit_width(200, 0, &policy), Some(60));

        let policy_none = SpecAutofitCellsPolicy {
            rule_columns: EnumAutofitColumnsRule::None,
            ..Default::default()
        };
        assert_eq!(calculate_autofit_width(20, 0, &policy_none), None);
    }

    #[test]
    fn test_validate_sheet_dimensions() {
        assert!(validate_sheet_dimensions(10, 3, 1).is_ok());
        assert!(matches!(
            validate_sheet_dimensions(N_NROWS_EXCEL_MAX, 3, 1),
            Err(ReportError::ExcelLimit(_))
        ));
        assert!(matches!(
            validate_sheet_dimensions(1, N_NCOLS_EXCEL_MAX + 1, 1),
            Err(ReportError::ExcelLimit(_))
        ));
    }
}
