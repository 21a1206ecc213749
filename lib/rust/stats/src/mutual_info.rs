// Mutual information between two labelings of the same items, with the
// chance correction of Vinh, Epps and Bailey (2010).

use statrs::function::factorial::ln_factorial;
use std::collections::HashMap;
use std::hash::Hash;

// Sparse contingency table of two labelings.
struct Contingency {
    n: u64,
    row_sums: Vec<u64>,
    col_sums: Vec<u64>,
    cells: Vec<u64>,
}

// Map each label to its order of first appearance.
fn relabel<T: Hash + Eq>(labels: &[T]) -> (Vec<usize>, usize) {
    let mut index: HashMap<&T, usize> = HashMap::new();
    let ids = labels
        .iter()
        .map(|label| {
            let next = index.len();
            *index.entry(label).or_insert(next)
        })
        .collect();
    (ids, index.len())
}

impl Contingency {
    fn new<A: Hash + Eq, B: Hash + Eq>(labels_true: &[A], labels_pred: &[B]) -> Self {
        assert_eq!(
            labels_true.len(),
            labels_pred.len(),
            "labelings must cover the same items"
        );
        let (rows, n_rows) = relabel(labels_true);
        let (cols, n_cols) = relabel(labels_pred);
        let mut row_sums = vec![0; n_rows];
        let mut col_sums = vec![0; n_cols];
        let mut cells: HashMap<(usize, usize), u64> = HashMap::new();
        for (&i, &j) in rows.iter().zip(&cols) {
            row_sums[i] += 1;
            col_sums[j] += 1;
            *cells.entry((i, j)).or_insert(0) += 1;
        }
        Contingency {
            n: labels_true.len() as u64,
            row_sums,
            col_sums,
            cells: cells.into_iter().map(|(_, n_ij)| n_ij).collect(),
        }
    }

    fn mutual_info(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        // Only the cell values are needed once the marginals are folded in:
        // sum n_ij/n ln(n_ij n / (a_i b_j)) = sum n_ij/n ln(n_ij/n) + H(a) + H(b)
        let joint: f64 = self
            .cells
            .iter()
            .map(|&n_ij| {
                let p = n_ij as f64 / n;
                p * p.ln()
            })
            .sum();
        (joint + entropy_of_counts(&self.row_sums, self.n) + entropy_of_counts(&self.col_sums, self.n))
            .max(0.0)
    }

    // Identical up to renaming of labels.
    fn is_bijection(&self) -> bool {
        self.row_sums.len() == self.col_sums.len() && self.cells.len() == self.row_sums.len()
    }
}

fn entropy_of_counts(counts: &[u64], n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Shannon entropy (natural log) of a labeling.
pub fn entropy<T: Hash + Eq>(labels: &[T]) -> f64 {
    let (ids, n_labels) = relabel(labels);
    let mut counts = vec![0; n_labels];
    for i in ids {
        counts[i] += 1;
    }
    entropy_of_counts(&counts, labels.len() as u64)
}

/// Mutual information (natural log) between two labelings of the same items.
pub fn mutual_info<A: Hash + Eq, B: Hash + Eq>(labels_true: &[A], labels_pred: &[B]) -> f64 {
    Contingency::new(labels_true, labels_pred).mutual_info()
}

/// Expected mutual information of two random labelings with the given
/// cluster sizes, under the hypergeometric model of randomness.
pub fn expected_mutual_info(row_sums: &[u64], col_sums: &[u64]) -> f64 {
    let n: u64 = row_sums.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let ln_n = nf.ln();
    let lf = ln_factorial;
    let ln_fact_n = lf(n);
    let mut emi = 0.0;
    for &a in row_sums.iter().filter(|&&a| a > 0) {
        for &b in col_sums.iter().filter(|&&b| b > 0) {
            let start = (a + b).saturating_sub(n).max(1);
            let end = a.min(b);
            let fixed = lf(a) + lf(b) + lf(n - a) + lf(n - b) - ln_fact_n;
            for n_ij in start..=end {
                let term1 = n_ij as f64 / nf;
                let term2 = ln_n + (n_ij as f64).ln() - (a as f64).ln() - (b as f64).ln();
                let ln_p = fixed - lf(n_ij) - lf(a - n_ij) - lf(b - n_ij) - lf(n + n_ij - a - b);
                emi += term1 * term2 * ln_p.exp();
            }
        }
    }
    emi
}

/// Adjusted mutual information between a reference labeling and a predicted
/// one, normalized by the arithmetic mean of the two entropies.
///
/// 1.0 means the labelings agree exactly (up to renaming); values near 0 are
/// what two independent random labelings score.
///
/// # Panics
/// - If the two slices have different lengths.
///
/// # Example
/// ```rust
/// use stats::adjusted_mutual_info;
/// let truth = ["x", "x", "y", "y"];
/// assert_eq!(adjusted_mutual_info(&truth, &[1, 1, 2, 2]), 1.0);
/// assert!(adjusted_mutual_info(&truth, &[1, 2, 3, 4]).abs() < 1e-9);
/// ```
pub fn adjusted_mutual_info<A: Hash + Eq, B: Hash + Eq>(labels_true: &[A], labels_pred: &[B]) -> f64 {
    let table = Contingency::new(labels_true, labels_pred);
    let (n_rows, n_cols) = (table.row_sums.len(), table.col_sums.len());
    if (n_rows == 1 && n_cols == 1) || (n_rows == 0 && n_cols == 0) || table.is_bijection() {
        return 1.0;
    }
    let mi = table.mutual_info();
    let emi = expected_mutual_info(&table.row_sums, &table.col_sums);
    let h_true = entropy_of_counts(&table.row_sums, table.n);
    let h_pred = entropy_of_counts(&table.col_sums, table.n);
    let mut denominator = 0.5 * (h_true + h_pred) - emi;
    if denominator < 0.0 {
        denominator = denominator.min(-f64::EPSILON);
    } else {
        denominator = denominator.max(f64::EPSILON);
    }
    (mi - emi) / denominator
}
