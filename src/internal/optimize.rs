//! Linear sum assignment over dense cost matrices.
//!
//! Shortest augmenting path variant of the Hungarian algorithm with row and
//! column potentials (Jonker-Volgenant style). Entries that are not finite
//! are unmatchable: they are never part of a returned assignment.

use nalgebra::DMatrix;

/// Represents a match between a row index and column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub row_idx: usize,
    pub col_idx: usize,
}

/// Result of linear sum assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// Valid assignments (row, col pairs), sorted by row
    pub assignments: Vec<Assignment>,
    /// Indices of rows that were not matched
    pub unmatched_rows: Vec<usize>,
    /// Indices of columns that were not matched
    pub unmatched_cols: Vec<usize>,
}

impl AssignmentResult {
    fn unmatched(num_rows: usize, num_cols: usize) -> Self {
        Self {
            assignments: Vec::new(),
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: (0..num_cols).collect(),
        }
    }
}

/// Solve the minimum-cost rectangular assignment problem.
///
/// The solver first maximizes the number of finite pairs and, among those
/// assignments, minimizes the summed cost. Non-finite entries (`inf`, `nan`)
/// mark pairs that must never be assigned.
///
/// # Arguments
/// * `cost_matrix` - Cost matrix where `cost_matrix[(i, j)]` is the cost of assigning
///   row i to column j
///
/// # Returns
/// AssignmentResult containing:
/// - assignments: (row, col) pairs with finite cost
/// - unmatched_rows: Row indices that were not matched
/// - unmatched_cols: Column indices that were not matched
pub fn linear_sum_assignment(cost_matrix: &DMatrix<f64>) -> AssignmentResult {
    let num_rows = cost_matrix.nrows();
    let num_cols = cost_matrix.ncols();

    let max_abs = cost_matrix
        .iter()
        .filter(|c| c.is_finite())
        .fold(None, |acc: Option<f64>, &c| Some(acc.map_or(c.abs(), |m| m.max(c.abs()))));
    let Some(max_abs) = max_abs else {
        return AssignmentResult::unmatched(num_rows, num_cols);
    };

    // Any assignment using one more finite pair beats every assignment with
    // fewer finite pairs once unmatchable entries cost more than this bound.
    let rank = num_rows.min(num_cols) as f64;
    let expensive = 2.0 * max_abs * rank + 1.0;

    // The solver wants rows <= cols.
    let transposed = num_rows > num_cols;
    let cost = if transposed {
        cost_matrix.transpose()
    } else {
        cost_matrix.clone()
    };
    let cost = cost.map(|c| if c.is_finite() { c } else { expensive });

    let row_to_col = shortest_augmenting_path(&cost);

    let mut assignments = Vec::new();
    let mut matched_rows = vec![false; num_rows];
    let mut matched_cols = vec![false; num_cols];
    for (r, &c) in row_to_col.iter().enumerate() {
        let (row_idx, col_idx) = if transposed { (c, r) } else { (r, c) };
        if cost_matrix[(row_idx, col_idx)].is_finite() {
            assignments.push(Assignment { row_idx, col_idx });
            matched_rows[row_idx] = true;
            matched_cols[col_idx] = true;
        }
    }
    assignments.sort_by_key(|a| a.row_idx);

    AssignmentResult {
        assignments,
        unmatched_rows: (0..num_rows).filter(|&i| !matched_rows[i]).collect(),
        unmatched_cols: (0..num_cols).filter(|&j| !matched_cols[j]).collect(),
    }
}

/// Solve the maximum-weight rectangular assignment problem.
///
/// Non-finite weights are unmatchable, like in [`linear_sum_assignment`].
pub fn maximum_weight_assignment(weights: &DMatrix<f64>) -> AssignmentResult {
    linear_sum_assignment(&weights.map(|w| -w))
}

/// Core solver. `cost` must be finite with `nrows() <= ncols()`.
///
/// Returns the assigned column of every row.
fn shortest_augmenting_path(cost: &DMatrix<f64>) -> Vec<usize> {
    let n = cost.nrows();
    let m = cost.ncols();
    if n == 0 {
        return Vec::new();
    }

    // 1-based bookkeeping; index 0 is the virtual root column.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut col_owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        col_owner[0] = row;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = col_owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[col_owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if col_owner[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path back to the root.
        loop {
            let j1 = way[j0];
            col_owner[j0] = col_owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![0usize; n];
    for j in 1..=m {
        if col_owner[j] != 0 {
            row_to_col[col_owner[j] - 1] = j - 1;
        }
    }
    row_to_col
}
