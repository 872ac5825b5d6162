//! Column-oriented in-memory table with stable multi-column sorting.

use std::cmp::Ordering;
use std::io::Cursor;

use polars::prelude::{AnyValue, DataFrame, IpcReader, SerReader};

use crate::spec::{EnumCellValue, ReportError};
use crate::util::validate_unique_columns;

/// Ordered named columns of [`EnumCellValue`] with a shared row order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    values: Vec<Vec<EnumCellValue>>,
    height: usize,
}

impl Table {
    /// Build a table from `(name, values)` pairs.
    ///
    /// Names must be unique and every column must have the same length.
    pub fn new<S>(columns: Vec<(S, Vec<EnumCellValue>)>) -> Result<Self, ReportError>
    where
        S: Into<String>,
    {
        let (l_colnames, l_values): (Vec<String>, Vec<Vec<EnumCellValue>>) = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .unzip();
        validate_unique_columns(&l_colnames)?;

        let n_height = l_values.first().map_or(0, Vec::len);
        if let Some((n_idx, _)) = l_values
            .iter()
            .enumerate()
            .find(|(_, col)| col.len() != n_height)
        {
            return Err(ReportError::InvalidTable(format!(
                "column {:?} has {} rows; expected {n_height}.",
                l_colnames[n_idx],
                l_values[n_idx].len()
            )));
        }

        Ok(Self {
            columns: l_colnames,
            values: l_values,
            height: n_height,
        })
    }

    /// Convert a polars dataframe cell by cell.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self, ReportError> {
        let l_colnames: Vec<String> = df
            .get_column_names_str()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        let n_height = df.height();

        let mut l_columns = Vec::with_capacity(l_colnames.len());
        for (c_name, col) in l_colnames.into_iter().zip(df.get_columns()) {
            let mut l_values = Vec::with_capacity(n_height);
            for n_row in 0..n_height {
                let value = col.get(n_row).map_err(|err| {
                    ReportError::InvalidTable(format!("Failed to access cell value: {err}"))
                })?;
                l_values.push(derive_cell_value_from_any_value(value));
            }
            l_columns.push((c_name, l_values));
        }

        Self::new(l_columns)
    }

    /// Read a table from Polars IPC bytes.
    pub fn from_ipc_bytes(v_ipc_df: &[u8]) -> Result<Self, ReportError> {
        let df = IpcReader::new(Cursor::new(v_ipc_df))
            .finish()
            .map_err(|err| {
                ReportError::InvalidTable(format!("Failed to read IPC DataFrame bytes: {err}"))
            })?;
        Self::from_dataframe(&df)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of `name` in the column order.
    pub fn column_index(&self, name: &str) -> Result<usize, ReportError> {
        self.columns
            .iter()
            .position(|c_name| c_name == name)
            .ok_or_else(|| ReportError::InvalidColumn(name.to_string()))
    }

    /// Values of the column at `col_idx`.
    pub fn column(&self, col_idx: usize) -> &[EnumCellValue] {
        &self.values[col_idx]
    }

    /// Values of the column called `name`.
    pub fn column_by_name(&self, name: &str) -> Result<&[EnumCellValue], ReportError> {
        Ok(self.column(self.column_index(name)?))
    }

    /// Cell at (`row`, `col_idx`).
    pub fn value(&self, row: usize, col_idx: usize) -> &EnumCellValue {
        &self.values[col_idx][row]
    }

    /// Resolve names to positions, failing on the first unknown name.
    pub fn column_indices(&self, names: &[String]) -> Result<Vec<usize>, ReportError> {
        names.iter().map(|name| self.column_index(name)).collect()
    }

    /// Whether rows `row_a` and `row_b` are equal on every column in `cols_idx`.
    pub fn rows_equal_on(&self, cols_idx: &[usize], row_a: usize, row_b: usize) -> bool {
        cols_idx.iter().all(|&n_idx| {
            compare_cell_values(self.value(row_a, n_idx), self.value(row_b, n_idx))
                == Ordering::Equal
        })
    }

    /// Stable sort of all rows by `names`, most-significant first.
    pub fn sort_by_columns(&mut self, names: &[String]) -> Result<(), ReportError> {
        let l_cols_idx = self.column_indices(names)?;

        let mut l_order: Vec<usize> = (0..self.height).collect();
        l_order.sort_by(|&row_a, &row_b| {
            l_cols_idx
                .iter()
                .map(|&n_idx| compare_cell_values(self.value(row_a, n_idx), self.value(row_b, n_idx)))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        for col in &mut self.values {
            *col = l_order.iter().map(|&n_row| col[n_row].clone()).collect();
        }
        Ok(())
    }

    /// New table with only `names`, in that order.
    pub fn select(&self, names: &[String]) -> Result<Self, ReportError> {
        validate_unique_columns(names)?;
        let l_cols_idx = self.column_indices(names)?;
        Ok(Self {
            columns: names.to_vec(),
            values: l_cols_idx
                .into_iter()
                .map(|n_idx| self.values[n_idx].clone())
                .collect(),
            height: self.height,
        })
    }
}

/// Total order used for sorting and grouping.
///
/// Same-kind values compare naturally (numbers numerically with NaN last).
/// Across kinds: numbers < dates < strings < missing, so nulls sort last.
pub fn compare_cell_values(a: &EnumCellValue, b: &EnumCellValue) -> Ordering {
    match (a, b) {
        (EnumCellValue::Number(x), EnumCellValue::Number(y)) => match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        },
        (EnumCellValue::Date(x), EnumCellValue::Date(y)) => x.cmp(y),
        (EnumCellValue::String(x), EnumCellValue::String(y)) => x.cmp(y),
        _ => derive_kind_rank(a).cmp(&derive_kind_rank(b)),
    }
}

fn derive_kind_rank(value: &EnumCellValue) -> u8 {
    match value {
        EnumCellValue::Number(_) => 0,
        EnumCellValue::Date(_) => 1,
        EnumCellValue::String(_) => 2,
        EnumCellValue::None => 3,
    }
}

fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => {
            EnumCellValue::String(if val { "True" } else { "False" }.to_string())
        }
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int128(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        AnyValue::Date(val) => EnumCellValue::Date(val),
        _ => EnumCellValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::{DataType, IntoColumn, IpcWriter, NamedFrom, SerWriter, Series};

    use super::*;

    fn num(x: f64) -> EnumCellValue {
        EnumCellValue::Number(x)
    }

    fn text(s: &str) -> EnumCellValue {
        EnumCellValue::String(s.to_string())
    }

    #[test]
    fn test_new_rejects_ragged_and_duplicate_columns() {
        let err = Table::new(vec![("a", vec![num(1.0)]), ("b", vec![])]).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTable(_)));

        let err = Table::new(vec![("a", vec![num(1.0)]), ("a", vec![num(2.0)])]).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateColumn(_)));
    }

    #[test]
    fn test_sort_by_columns_is_stable() {
        let mut table = Table::new(vec![
            ("k", vec![num(2.0), num(1.0), num(2.0), num(1.0)]),
            ("tag", vec![text("a"), text("b"), text("c"), text("d")]),
        ])
        .unwrap();

        table.sort_by_columns(&["k".to_string()]).unwrap();

        assert_eq!(table.column(0), &[num(1.0), num(1.0), num(2.0), num(2.0)]);
        assert_eq!(table.column(1), &[text("b"), text("d"), text("a"), text("c")]);
    }

    #[test]
    fn test_sort_places_missing_last() {
        let mut table = Table::new(vec![(
            "k",
            vec![EnumCellValue::None, text("b"), num(f64::NAN), num(3.0)],
        )])
        .unwrap();

        table.sort_by_columns(&["k".to_string()]).unwrap();

        assert_eq!(table.value(0, 0), &num(3.0));
        assert!(matches!(table.value(1, 0), EnumCellValue::Number(n) if n.is_nan()));
        assert_eq!(table.value(2, 0), &text("b"));
        assert_eq!(table.value(3, 0), &EnumCellValue::None);
    }

    #[test]
    fn test_sort_unknown_column_fails() {
        let mut table = Table::new(vec![("k", vec![num(1.0)])]).unwrap();
        let err = table.sort_by_columns(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, ReportError::InvalidColumn(ref name) if name == "missing"));
    }

    #[test]
    fn test_select_reorders_columns() {
        let table = Table::new(vec![
            ("a", vec![num(1.0)]),
            ("b", vec![num(2.0)]),
            ("c", vec![num(3.0)]),
        ])
        .unwrap();

        let selected = table.select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(selected.columns(), &["c".to_string(), "a".to_string()]);
        assert_eq!(selected.value(0, 0), &num(3.0));
        assert_eq!(selected.height(), 1);
    }

    #[test]
    fn test_from_dataframe_converts_dtypes() {
        let df = polars::df!(
            "lev1" => [1i64, 1, 2],
            "name" => [Some("x"), None, Some("z")],
            "flag" => [true, false, true],
            "score" => [0.5f64, 1.5, 2.5],
        )
        .unwrap();

        let table = Table::from_dataframe(&df).unwrap();

        assert_eq!(table.height(), 3);
        assert_eq!(table.columns(), &["lev1", "name", "flag", "score"]);
        assert_eq!(table.value(2, 0), &num(2.0));
        assert_eq!(table.value(1, 1), &EnumCellValue::None);
        assert_eq!(table.value(0, 2), &text("True"));
        assert_eq!(table.value(1, 3), &num(1.5));
    }

    #[test]
    fn test_from_dataframe_keeps_date_columns_as_dates() {
        let day = Series::new("day".into(), &[0i32, 19_723])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![day.into_column()]).unwrap();

        let table = Table::from_dataframe(&df).unwrap();

        assert_eq!(table.value(0, 0), &EnumCellValue::Date(0));
        assert_eq!(table.value(1, 0), &EnumCellValue::Date(19_723));
        assert_eq!(table.value(1, 0).to_text(), "2024-01-01");
    }

    #[test]
    fn test_from_ipc_bytes_reads_written_frame() {
        let mut df = polars::df!(
            "lev1" => ["a", "a", "b"],
            "score" => [1.0f64, 2.0, 3.0],
        )
        .unwrap();
        let mut v_ipc_df: Vec<u8> = Vec::new();
        IpcWriter::new(&mut v_ipc_df).finish(&mut df).unwrap();

        let table = Table::from_ipc_bytes(&v_ipc_df).unwrap();

        assert_eq!(table.columns(), &["lev1", "score"]);
        assert_eq!(table.height(), 3);
        assert_eq!(table.value(2, 0), &text("b"));
        assert_eq!(table.value(1, 1), &num(2.0));

        let err = Table::from_ipc_bytes(b"not ipc").unwrap_err();
        assert!(matches!(err, ReportError::InvalidTable(ref msg) if msg.contains("IPC")));
    }
}
