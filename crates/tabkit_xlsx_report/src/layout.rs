//! Group-range computation and per-prefix render planning.
//!
//! For grouping columns `[c1, .., cn]` the planner visits prefixes
//! `[c1]`, `[c1, c2]`, .. `[c1, .., cn]`. Before each prefix the table is
//! stable-sorted by that prefix, then contiguous runs of equal keys become
//! spans anchored on the prefix's last column.

use log::debug;

use crate::spec::{ReportError, SpecPlannedSpan, SpecRenderPlan, SpecSpan};
use crate::table::Table;
use crate::util::validate_unique_columns;

/// Contiguous first/last rows per run of equal `columns` values.
///
/// Runs follow the table's current row order; a key that reappears after a
/// different key starts a new span.
pub fn compute_spans(table: &Table, columns: &[String]) -> Result<Vec<SpecSpan>, ReportError> {
    let l_cols_idx = table.column_indices(columns)?;
    let Some(&n_col_idx_last) = l_cols_idx.last() else {
        return Err(ReportError::InvalidColumn(
            "<empty column selection>".to_string(),
        ));
    };

    let n_height = table.height();
    if n_height == 0 {
        return Err(ReportError::EmptyTable);
    }

    let mut l_spans = Vec::new();
    let mut n_row_start = 0;
    for n_row in 1..=n_height {
        if n_row < n_height && table.rows_equal_on(&l_cols_idx, n_row - 1, n_row) {
            continue;
        }
        l_spans.push(SpecSpan {
            value: table.value(n_row_start, n_col_idx_last).clone(),
            row_first: n_row_start,
            row_last: n_row - 1,
            col_idx: n_col_idx_last,
        });
        n_row_start = n_row;
    }

    Ok(l_spans)
}

/// Sort, group and tag spans for every prefix of `cols_group`.
///
/// An empty `cols_group` groups by all columns. When `cols_group` is a strict
/// subset, the returned table is projected so grouping columns come first (in
/// grouping order) followed by the remaining columns in their original order;
/// span column indices refer to that projected order. The returned table is in
/// its final sort order (by the full grouping list).
pub fn build_plan(
    table: Table,
    cols_group: &[String],
    row_padding: usize,
) -> Result<(SpecRenderPlan, Table), ReportError> {
    let l_cols_group: Vec<String> = if cols_group.is_empty() {
        table.columns().to_vec()
    } else {
        cols_group.to_vec()
    };
    validate_unique_columns(&l_cols_group)?;
    table.column_indices(&l_cols_group)?;
    if table.height() == 0 {
        return Err(ReportError::EmptyTable);
    }

    let l_cols_remaining: Vec<String> = table
        .columns()
        .iter()
        .filter(|c_name| !l_cols_group.contains(c_name))
        .cloned()
        .collect();

    let mut table = if l_cols_remaining.is_empty() && l_cols_group == table.columns() {
        table
    } else {
        let l_cols_projected: Vec<String> = l_cols_group
            .iter()
            .chain(l_cols_remaining.iter())
            .cloned()
            .collect();
        table.select(&l_cols_projected)?
    };

    let mut l_planned = Vec::new();
    for n_prefix in 1..=l_cols_group.len() {
        let l_cols_prefix = &l_cols_group[..n_prefix];
        table.sort_by_columns(l_cols_prefix)?;
        let l_spans = compute_spans(&table, l_cols_prefix)?;
        debug!(
            "prefix {:?}: {} spans over {} rows",
            l_cols_prefix,
            l_spans.len(),
            table.height()
        );

        for (n_idx_group, span) in l_spans.into_iter().enumerate() {
            l_planned.push(SpecPlannedSpan {
                n_prefix,
                parity: (n_idx_group % 2) as u8,
                row_first_sheet: span.row_first + row_padding,
                row_last_sheet: span.row_last + row_padding,
                span,
            });
        }
    }

    Ok((
        SpecRenderPlan {
            cols_group: l_cols_group,
            cols_remaining: l_cols_remaining,
            row_padding,
            spans: l_planned,
        },
        table,
    ))
}
