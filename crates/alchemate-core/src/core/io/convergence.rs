use super::{ReadError, display_path, open};
use serde::Deserialize;
use std::path::Path;

/// File name a backend writes its forward/backward convergence analysis to.
pub const CONVERGENCE_TABLE_FILE: &str = "convergence.csv";

/// One row of a forward/backward convergence analysis, free energies in kT/mol.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConvergencePoint {
    pub data_fraction: f64,
    pub forward: f64,
    pub backward: f64,
}

pub fn read_convergence_table(path: &Path) -> Result<Vec<ConvergencePoint>, ReadError> {
    let file = open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    reader
        .deserialize::<ConvergencePoint>()
        .map(|result| {
            result.map_err(|e| ReadError::Csv {
                path: display_path(path),
                source: e,
            })
        })
        .collect()
}

/// Sample standard deviation of the forward estimate over the trailing part of the data
/// (`data_fraction` in `[min_fraction, 1]`). Returns `None` with fewer than two points.
pub fn forward_std_over_tail(points: &[ConvergencePoint], min_fraction: f64) -> Option<f64> {
    let tail: Vec<f64> = points
        .iter()
        .filter(|p| p.data_fraction >= min_fraction && p.data_fraction <= 1.0)
        .map(|p| p.forward)
        .collect();
    if tail.len() < 2 {
        return None;
    }
    let n = tail.len() as f64;
    let mean = tail.iter().sum::<f64>() / n;
    let variance = tail.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}
