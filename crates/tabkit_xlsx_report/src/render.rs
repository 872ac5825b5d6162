//! Sheet rendering from a [`SpecRenderPlan`].
//!
//! Write order is header, grouped spans, then the remaining-columns pass.
//! All coordinates are sheet coordinates; data starts at `plan.row_padding`.

use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, ReportError, SpecCellFormat, SpecMergeReportOptions,
    SpecRenderPlan, SpecSheetReport,
};
use crate::sink::SheetSink;
use crate::table::Table;
use crate::util::{
    apply_vertical_run_text_blankout, calculate_autofit_width, derive_horizontal_merge_tracker,
    derive_row_padding, estimate_unicode_string_width, plan_horizontal_merges,
};

/// Render one sheet.
///
/// `table` must be the table returned by [`crate::layout::build_plan`] for
/// `plan`. `header_grid`, when given, has one row per header level and one
/// column per table column in the same (projected) order.
///
/// The returned report leaves `sheet_name` empty for the caller to fill.
pub fn render_sheet(
    sink: &mut dyn SheetSink,
    plan: &SpecRenderPlan,
    table: &Table,
    header_grid: Option<&[Vec<String>]>,
    options: &SpecMergeReportOptions,
) -> Result<SpecSheetReport, ReportError> {
    let l_header_grid = match header_grid {
        Some(grid) => {
            validate_header_grid(grid, table.width(), plan.row_padding)?;
            grid.to_vec()
        }
        None => vec![table.columns().to_vec()],
    };

    write_header(sink, l_header_grid.clone(), &options.fmt_header)?;

    let mut report = SpecSheetReport {
        n_rows: table.height(),
        n_cols: table.width(),
        n_spans: plan.spans.len(),
        ..Default::default()
    };

    for planned in &plan.spans {
        let fmt_band = if planned.parity == 0 {
            &options.fmt_band_a
        } else {
            &options.fmt_band_b
        };
        let fmt = derive_value_format(fmt_band, &planned.span.value, options);

        if options.if_merge_cells && planned.row_first_sheet != planned.row_last_sheet {
            sink.merge_range(
                planned.row_first_sheet,
                planned.span.col_idx,
                planned.row_last_sheet,
                planned.span.col_idx,
                &planned.span.value,
                &fmt,
            )?;
            report.n_merged += 1;
        } else {
            for n_row in planned.row_first_sheet..=planned.row_last_sheet {
                sink.write_cell(n_row, planned.span.col_idx, &planned.span.value, &fmt)?;
            }
        }
    }

    if plan.has_remaining_columns() {
        write_remaining_columns(sink, plan, table, options)?;
    }

    sink.set_freeze_panes(
        options.row_freeze.unwrap_or(plan.row_padding),
        options.col_freeze,
    )?;

    apply_autofit(sink, table, &l_header_grid, options)?;

    Ok(report)
}

fn validate_header_grid(
    grid: &[Vec<String>],
    n_width: usize,
    row_padding: usize,
) -> Result<(), ReportError> {
    if grid.is_empty() {
        return Err(ReportError::InvalidTable(
            "header grid must have >= 1 row.".to_string(),
        ));
    }
    if derive_row_padding(grid.len()) != row_padding {
        return Err(ReportError::InvalidTable(format!(
            "header grid has {} level(s) but the plan reserves {row_padding} header row(s).",
            grid.len()
        )));
    }
    if let Some((n_row, row)) = grid.iter().enumerate().find(|(_, row)| row.len() != n_width) {
        return Err(ReportError::InvalidTable(format!(
            "header grid row {n_row} has {} columns; expected {n_width}.",
            row.len()
        )));
    }
    Ok(())
}

fn write_header(
    sink: &mut dyn SheetSink,
    mut header_grid: Vec<Vec<String>>,
    fmt_header: &SpecCellFormat,
) -> Result<(), ReportError> {
    apply_vertical_run_text_blankout(&mut header_grid);
    let dict_horizontal_merges_by_row = plan_horizontal_merges(&header_grid);
    let set_merged_cells = derive_horizontal_merge_tracker(&dict_horizontal_merges_by_row);

    for (row_idx, row_values) in header_grid.iter().enumerate() {
        for (col_idx, cell_value) in row_values.iter().enumerate() {
            if set_merged_cells.contains(&(row_idx, col_idx)) {
                continue;
            }
            let value = if cell_value.is_empty() {
                EnumCellValue::None
            } else {
                EnumCellValue::String(cell_value.clone())
            };
            sink.write_cell(row_idx, col_idx, &value, fmt_header)?;
        }

        if let Some(l_merges) = dict_horizontal_merges_by_row.get(&row_idx) {
            for merge in l_merges {
                sink.merge_range(
                    row_idx,
                    merge.col_idx_start,
                    row_idx,
                    merge.col_idx_end,
                    &EnumCellValue::String(merge.text.clone()),
                    fmt_header,
                )?;
            }
        }
    }

    Ok(())
}

/// Plain body writes for ungrouped columns, then one band rule per row.
fn write_remaining_columns(
    sink: &mut dyn SheetSink,
    plan: &SpecRenderPlan,
    table: &Table,
    options: &SpecMergeReportOptions,
) -> Result<(), ReportError> {
    let n_col_offset = plan.cols_group.len();
    let n_width = table.width();

    for n_row in 0..table.height() {
        let n_row_sheet = n_row + plan.row_padding;
        for n_col in n_col_offset..n_width {
            let value = table.value(n_row, n_col);
            let fmt = derive_value_format(&options.fmt_body, value, options);
            sink.write_cell(n_row_sheet, n_col, value, &fmt)?;
        }
    }

    for n_row in 0..table.height() {
        let n_row_sheet = n_row + plan.row_padding;
        let fmt_band = if n_row_sheet % 2 == 0 {
            &options.fmt_band_a
        } else {
            &options.fmt_band_b
        };
        sink.conditional_format(n_row_sheet, 0, n_row_sheet, n_width - 1, fmt_band)?;
    }

    Ok(())
}

fn derive_value_format(
    fmt: &SpecCellFormat,
    value: &EnumCellValue,
    options: &SpecMergeReportOptions,
) -> SpecCellFormat {
    match value {
        EnumCellValue::Date(_) => fmt.with_(SpecCellFormat {
            num_format: Some(options.num_format_date.clone()),
            ..Default::default()
        }),
        _ => fmt.clone(),
    }
}

fn apply_autofit(
    sink: &mut dyn SheetSink,
    table: &Table,
    header_grid: &[Vec<String>],
    options: &SpecMergeReportOptions,
) -> Result<(), ReportError> {
    let policy = &options.policy_autofit;
    if policy.rule_columns == EnumAutofitColumnsRule::None {
        return Ok(());
    }

    let n_rows_body = policy
        .height_body_inferred_max
        .map_or(table.height(), |n_max| usize::min(n_max, table.height()));
    let if_scan_body = matches!(
        policy.rule_columns,
        EnumAutofitColumnsRule::Body | EnumAutofitColumnsRule::All
    );

    for n_col in 0..table.width() {
        let n_width_header = header_grid
            .iter()
            .map(|row| estimate_unicode_string_width(&row[n_col]))
            .max()
            .unwrap_or(0);
        let n_width_body = if if_scan_body {
            table.column(n_col)[..n_rows_body]
                .iter()
                .map(|value| estimate_unicode_string_width(&value.to_text()))
                .max()
                .unwrap_or(0)
        } else {
            0
        };

        if let Some(n_width_final) = calculate_autofit_width(n_width_header, n_width_body, policy)
        {
            sink.set_column_width(n_col, n_width_final as f64)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::build_plan;
    use crate::sink::{GridSheetSink, SpecGridRange};

    fn num(x: f64) -> EnumCellValue {
        EnumCellValue::Number(x)
    }

    fn text(s: &str) -> EnumCellValue {
        EnumCellValue::String(s.to_string())
    }

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn table_levels() -> Table {
        Table::new(vec![
            ("lev1", vec![num(1.0), num(1.0), num(2.0), num(1.0), num(2.0)]),
            ("lev2", vec![num(1.0), num(2.0), num(1.0), num(1.0), num(1.0)]),
            ("tag", vec![text("a"), text("b"), text("c"), text("d"), text("e")]),
        ])
        .unwrap()
    }

    fn render_to_grid(
        table: Table,
        cols_group: &[String],
        if_merge_cells: bool,
    ) -> (GridSheetSink, SpecRenderPlan, Table, SpecSheetReport) {
        let (plan, table) = build_plan(table, cols_group, 1).unwrap();
        let options = SpecMergeReportOptions {
            if_merge_cells,
            ..Default::default()
        };
        let mut sink = GridSheetSink::new();
        let report = render_sheet(&mut sink, &plan, &table, None, &options).unwrap();
        (sink, plan, table, report)
    }

    #[test]
    fn test_remaining_columns_start_after_header_at_group_offset() {
        let table = Table::new(vec![
            ("lev1", vec![num(1.0), num(1.0), num(2.0)]),
            ("a", vec![text("x"), text("y"), text("z")]),
        ])
        .unwrap();

        let (sink, _, _, _) = render_to_grid(table, &names(&["lev1"]), true);

        assert_eq!(sink.value_at(0, 0), Some(&text("lev1")));
        assert_eq!(sink.value_at(0, 1), Some(&text("a")));
        assert_eq!(sink.value_at(1, 1), Some(&text("x")));
        assert_eq!(sink.value_at(3, 1), Some(&text("z")));
        assert_eq!(sink.value_at(1, 0), Some(&num(1.0)));
        assert_eq!(
            sink.merges,
            vec![SpecGridRange {
                row_first: 1,
                col_first: 0,
                row_last: 2,
                col_last: 0
            }]
        );

        let options = SpecMergeReportOptions::default();
        let l_bands: Vec<(usize, usize, &SpecCellFormat)> = sink
            .conditional_formats
            .iter()
            .map(|(range, fmt)| (range.row_first, range.col_last, fmt))
            .collect();
        assert_eq!(
            l_bands,
            vec![
                (1, 1, &options.fmt_band_b),
                (2, 1, &options.fmt_band_a),
                (3, 1, &options.fmt_band_b),
            ]
        );
    }

    #[test]
    fn test_merge_and_band_render_same_values() {
        let cols = names(&["lev1", "lev2"]);
        let (sink_merge, plan, _, report_merge) = render_to_grid(table_levels(), &cols, true);
        let (sink_band, _, _, report_band) = render_to_grid(table_levels(), &cols, false);

        assert!(sink_band.merges.is_empty());
        assert_eq!(report_band.n_merged, 0);
        assert_eq!(report_merge.n_merged, sink_merge.merges.len());
        assert_eq!(
            sink_merge.merges.len(),
            plan.spans.iter().filter(|planned| planned.span.n_rows() > 1).count()
        );

        for planned in &plan.spans {
            for n_row in planned.row_first_sheet..=planned.row_last_sheet {
                let n_col = planned.span.col_idx;
                assert_eq!(
                    sink_band.value_at(n_row, n_col),
                    Some(&planned.span.value)
                );
                assert_eq!(
                    sink_merge.displayed_value_at(n_row, n_col),
                    sink_band.value_at(n_row, n_col)
                );
            }
        }
    }

    #[test]
    fn test_span_format_follows_parity() {
        let (sink, plan, _, _) = render_to_grid(table_levels(), &names(&["lev1"]), false);
        let options = SpecMergeReportOptions::default();

        for planned in &plan.spans {
            let fmt_expected = if planned.parity == 0 {
                &options.fmt_band_a
            } else {
                &options.fmt_band_b
            };
            assert_eq!(
                sink.format_at(planned.row_first_sheet, planned.span.col_idx),
                Some(fmt_expected)
            );
        }
    }

    #[test]
    fn test_all_columns_grouped_has_no_conditional_bands() {
        let (sink, _, table, report) = render_to_grid(table_levels(), &[], true);

        assert!(sink.conditional_formats.is_empty());
        assert_eq!(report.n_cols, 3);
        assert_eq!(report.n_rows, table.height());
        assert_eq!(sink.freeze_panes, Some((1, 0)));
    }

    #[test]
    fn test_multi_level_header_merges_and_padding() {
        let header_grid = vec![
            names(&["grp", "grp", "tag"]),
            names(&["lev1", "lev2", "tag"]),
        ];
        let n_padding = derive_row_padding(header_grid.len());
        let (plan, table) = build_plan(table_levels(), &names(&["lev1"]), n_padding).unwrap();
        let mut sink = GridSheetSink::new();

        render_sheet(
            &mut sink,
            &plan,
            &table,
            Some(header_grid.as_slice()),
            &SpecMergeReportOptions::default(),
        )
        .unwrap();

        assert!(sink.merges.contains(&SpecGridRange {
            row_first: 0,
            col_first: 0,
            row_last: 0,
            col_last: 1
        }));
        assert_eq!(sink.value_at(0, 0), Some(&text("grp")));
        assert_eq!(sink.value_at(0, 2), Some(&text("tag")));
        assert_eq!(sink.value_at(1, 2), Some(&EnumCellValue::None));
        assert_eq!(sink.value_at(2, 0), None);
        assert_eq!(sink.displayed_value_at(3, 0), Some(&num(1.0)));
        assert_eq!(sink.freeze_panes, Some((3, 0)));
    }

    #[test]
    fn test_header_grid_width_mismatch_fails() {
        let (plan, table) = build_plan(table_levels(), &[], 1).unwrap();
        let header_grid = vec![names(&["a", "b"])];

        let err = render_sheet(
            &mut GridSheetSink::new(),
            &plan,
            &table,
            Some(header_grid.as_slice()),
            &SpecMergeReportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTable(_)));
    }

    #[test]
    fn test_header_grid_levels_must_match_row_padding() {
        let header_grid = vec![
            names(&["grp", "grp", "tag"]),
            names(&["lev1", "lev2", "tag"]),
        ];
        let (plan, table) = build_plan(table_levels(), &names(&["lev1"]), 1).unwrap();

        let err = render_sheet(
            &mut GridSheetSink::new(),
            &plan,
            &table,
            Some(header_grid.as_slice()),
            &SpecMergeReportOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTable(ref msg) if msg.contains("2 level(s)")));
    }

    #[test]
    fn test_date_values_get_date_number_format() {
        let table = Table::new(vec![
            ("day", vec![EnumCellValue::Date(0), EnumCellValue::Date(0)]),
            ("n", vec![num(1.0), num(2.0)]),
        ])
        .unwrap();

        let (sink, _, _, _) = render_to_grid(table, &names(&["day"]), true);

        assert_eq!(
            sink.format_at(1, 0).and_then(|fmt| fmt.num_format.as_deref()),
            Some("yyyy-mm-dd")
        );
        assert_eq!(sink.format_at(1, 1).and_then(|fmt| fmt.num_format.as_deref()), None);
    }

    #[test]
    fn test_header_autofit_uses_policy_bounds() {
        let table = Table::new(vec![
            ("k", vec![num(1.0)]),
            ("a_rather_long_column_name", vec![num(2.0)]),
        ])
        .unwrap();

        let (sink, _, _, _) = render_to_grid(table, &[], true);

        assert_eq!(sink.column_widths.get(&0), Some(&8.0));
        assert_eq!(sink.column_widths.get(&1), Some(&27.0));
    }
}
