//! Tabular export of recorded results.

use serde::{Deserialize, Serialize};

/// A time column followed by one column per exported variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ResultsTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Values under `header`, if present.
    pub fn column(&self, header: &str) -> Option<Vec<f64>> {
        let index = self.headers.iter().position(|h| h == header)?;
        Some(self.rows.iter().map(|r| r[index]).collect())
    }

    pub fn to_csv(&self) -> String {
        let mut csv = self.headers.join(",");
        csv.push('\n');
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            csv.push_str(&line.join(","));
            csv.push('\n');
        }
        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_layout() {
        let table = ResultsTable {
            headers: vec!["time".into(), "y".into()],
            rows: vec![vec![0.0, 1.0], vec![0.5, 0.25]],
        };
        assert_eq!(table.to_csv(), "time,y\n0,1\n0.5,0.25\n");
        assert_eq!(table.column("y"), Some(vec![1.0, 0.25]));
    }
}
