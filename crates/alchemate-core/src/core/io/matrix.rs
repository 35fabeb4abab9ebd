use super::{ReadError, display_path, open};
use nalgebra::DMatrix;
use std::path::Path;

/// File name a replica-exchange backend writes its transition matrix to.
pub const EXCHANGE_MATRIX_FILE: &str = "repex_matrix.txt";

/// Reads a whitespace-separated square matrix of replica-exchange probabilities.
///
/// Entry `(i, j)` is the observed probability of swapping configurations between lambda
/// windows `i` and `j`. Lines starting with `#` are ignored.
pub fn read_exchange_matrix(path: &Path) -> Result<DMatrix<f64>, ReadError> {
    let file = open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ReadError::Csv {
            path: display_path(path),
            source: e,
        })?;
        let line = record.position().map_or(0, |p| p.line());

        let row = record
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| {
                field.parse::<f64>().map_err(|_| ReadError::Value {
                    path: display_path(path),
                    line,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !row.is_empty() {
            rows.push(row);
        }
    }

    let n = rows.len();
    if n == 0 {
        return Err(ReadError::Shape {
            path: display_path(path),
            message: "matrix is empty".to_string(),
        });
    }
    if let Some(bad) = rows.iter().position(|row| row.len() != n) {
        return Err(ReadError::Shape {
            path: display_path(path),
            message: format!(
                "expected a {n}x{n} matrix, row {} has {} column(s)",
                bad + 1,
                rows[bad].len()
            ),
        });
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(DMatrix::from_row_slice(n, n, &flat))
}
