//! Report constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecAutofitCellsPolicy, SpecCellFormat, SpecMergeReportOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Header fill color.
pub const C_COLOR_HEADER_BG: &str = "#4F81BD";
/// Band fill color for parity 0.
pub const C_COLOR_BAND_A: &str = "#B8CCE4";
/// Band fill color for parity 1.
pub const C_COLOR_BAND_B: &str = "#DCE6F1";
/// Border/font color used on colored cells.
pub const C_COLOR_WHITE: &str = "#FFFFFF";

/// Number format applied to date cells.
pub const C_NUM_FORMAT_DATE: &str = "yyyy-mm-dd";
/// File extension appended to profile report paths.
pub const C_EXT_XLSX: &str = "xlsx";

/// Maximum sample levels listed per text column in the profile report.
pub const N_PROFILE_LEVELS_MAX: usize = 10;

/// Profile report sheet names, in write order.
pub const C_SHEET_TABLE_CONTENTS: &str = "table_contents";
pub const C_SHEET_COL_CONTENTS: &str = "col_contents";
pub const C_SHEET_OBJ_CONTENTS: &str = "obj_contents";
pub const C_SHEET_NUM_STATS: &str = "num_stats";

/// Build named format presets used by the report writers.
///
/// Keys: `header`, `band_a`, `band_b`, `body`, `text`, `integer`, `decimal`.
pub fn derive_default_report_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_size: Some(11),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };
    let cfg_band_fmt_spec = cfg_base_fmt_spec.with_(SpecCellFormat {
        border: Some(1),
        border_color: Some(C_COLOR_WHITE.to_string()),
        align: Some("center".to_string()),
        ..Default::default()
    });

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            border: Some(2),
            border_color: Some(C_COLOR_WHITE.to_string()),
            bg_color: Some(C_COLOR_HEADER_BG.to_string()),
            font_color: Some(C_COLOR_WHITE.to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "band_a".to_string(),
        cfg_band_fmt_spec.with_(SpecCellFormat {
            bg_color: Some(C_COLOR_BAND_A.to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "band_b".to_string(),
        cfg_band_fmt_spec.with_(SpecCellFormat {
            bg_color: Some(C_COLOR_BAND_B.to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert("body".to_string(), cfg_band_fmt_spec.clone());
    dict_fmt.insert("text".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "integer".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "decimal".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            num_format: Some("0.0000".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default merged-sheet options from the format presets.
pub fn derive_default_merge_report_options() -> SpecMergeReportOptions {
    let mut dict_fmt = derive_default_report_formats();
    let mut take = |key: &str| dict_fmt.remove(key).unwrap_or_default();

    SpecMergeReportOptions {
        fmt_header: take("header"),
        fmt_band_a: take("band_a"),
        fmt_band_b: take("band_b"),
        fmt_body: take("body"),
        num_format_date: C_NUM_FORMAT_DATE.to_string(),
        if_merge_cells: true,
        col_freeze: 0,
        row_freeze: None,
        policy_autofit: SpecAutofitCellsPolicy::default(),
    }
}
