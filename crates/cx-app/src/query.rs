//! Query helpers for extracting data from run results.

use cx_results::ResultsTable;

use crate::error::{AppError, AppResult};

/// Summary of a run's time range and data.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub time_range: (f64, f64),
    pub point_count: usize,
    pub column_count: usize,
}

pub fn get_run_summary(table: &ResultsTable) -> AppResult<RunSummary> {
    let (Some(first), Some(last)) = (table.rows.first(), table.rows.last()) else {
        return Err(AppError::InvalidInput("No points in run".to_string()));
    };
    Ok(RunSummary {
        time_range: (first[0], last[0]),
        point_count: table.row_count(),
        // Excludes the time column.
        column_count: table.column_count().saturating_sub(1),
    })
}

/// Recorded variable uris, in column order.
pub fn list_columns(table: &ResultsTable) -> Vec<String> {
    table.headers.iter().skip(1).cloned().collect()
}

/// Find a column by exact uri, then case-insensitively, then by bare
/// variable name when exactly one component declares it.
pub fn resolve_column<'a>(table: &'a ResultsTable, query: &str) -> AppResult<&'a str> {
    let headers = &table.headers[1.min(table.headers.len())..];
    if let Some(h) = headers.iter().find(|h| h.as_str() == query) {
        return Ok(h.as_str());
    }
    if let Some(h) = headers.iter().find(|h| h.eq_ignore_ascii_case(query)) {
        return Ok(h.as_str());
    }
    let by_name: Vec<&String> = headers
        .iter()
        .filter(|h| h.rsplit('/').next() == Some(query))
        .collect();
    match by_name.as_slice() {
        [only] => Ok(only.as_str()),
        [] => Err(AppError::InvalidInput(format!("Unknown variable: {query}"))),
        _ => Err(AppError::InvalidInput(format!(
            "Ambiguous variable '{query}', qualify it with its component"
        ))),
    }
}

/// `(time, value)` pairs of one variable.
pub fn extract_series(table: &ResultsTable, query: &str) -> AppResult<Vec<(f64, f64)>> {
    let header = resolve_column(table, query)?;
    let index = table
        .headers
        .iter()
        .position(|h| h == header)
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown variable: {query}")))?;
    Ok(table.rows.iter().map(|r| (r[0], r[index])).collect())
}

/// Table restricted to the given variables, in the given order.
pub fn select_columns(table: &ResultsTable, queries: &[&str]) -> AppResult<ResultsTable> {
    if queries.is_empty() {
        return Ok(table.clone());
    }
    let mut indices = vec![0];
    for q in queries {
        let header = resolve_column(table, q)?;
        if let Some(i) = table.headers.iter().position(|h| h == header) {
            indices.push(i);
        }
    }
    Ok(ResultsTable {
        headers: indices.iter().map(|&i| table.headers[i].clone()).collect(),
        rows: table
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i]).collect())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ResultsTable {
        ResultsTable {
            headers: vec![
                "time".into(),
                "a/x".into(),
                "b/x".into(),
                "cell/Y".into(),
            ],
            rows: vec![vec![0.0, 1.0, 2.0, 3.0], vec![0.5, 4.0, 5.0, 6.0]],
        }
    }

    #[test]
    fn summary_and_columns() {
        let t = table();
        let s = get_run_summary(&t).unwrap();
        assert_eq!(s.time_range, (0.0, 0.5));
        assert_eq!(s.point_count, 2);
        assert_eq!(s.column_count, 3);
        assert_eq!(list_columns(&t), ["a/x", "b/x", "cell/Y"]);

        let empty = ResultsTable {
            headers: vec!["time".into()],
            rows: vec![],
        };
        assert!(get_run_summary(&empty).is_err());
    }

    #[test]
    fn resolves_names() {
        let t = table();
        assert_eq!(resolve_column(&t, "a/x").unwrap(), "a/x");
        assert_eq!(resolve_column(&t, "CELL/y").unwrap(), "cell/Y");
        assert_eq!(resolve_column(&t, "Y").unwrap(), "cell/Y");
        assert!(resolve_column(&t, "x").is_err());
        assert!(resolve_column(&t, "time").is_err());
        assert_eq!(extract_series(&t, "b/x").unwrap(), vec![(0.0, 2.0), (0.5, 5.0)]);
    }

    #[test]
    fn selects_columns_in_order() {
        let s = select_columns(&table(), &["Y", "a/x"]).unwrap();
        assert_eq!(s.headers, ["time", "cell/Y", "a/x"]);
        assert_eq!(s.rows[1], vec![0.5, 6.0, 4.0]);
    }
}
