//! Linear residual term produced by linearizing a nonlinear factor
//!
//! A [`JacobianFactor`] represents the Gaussian
//!
//! ```text
//! 0.5 ‖ Σₖ Aₖ δₖ + b ‖²
//! ```
//!
//! with one dense block `Aₖ` per variable key and a residual `b`, both already whitened by
//! the factor's noise model. Many factors can be stacked into one sparse system with
//! [`JacobianFactor::assemble`].

use crate::core::{
    CoreError, CoreResult,
    values::{Key, format_key},
};
use faer::{
    Mat,
    sparse::{SparseColMat, Triplet},
};
use nalgebra::{DMatrix, DVector};
use std::collections::{HashMap, HashSet};

/// Whitened linear factor: ordered keys, one Jacobian block per key and a residual.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    residual: DVector<f64>,
}

impl JacobianFactor {
    /// Create a factor from `(key, block)` terms and a residual.
    ///
    /// Terms are stored sorted by key. Every block must have as many rows as the residual,
    /// and each key may appear only once.
    pub fn new(mut terms: Vec<(Key, DMatrix<f64>)>, residual: DVector<f64>) -> CoreResult<Self> {
        terms.sort_by_key(|(key, _)| *key);

        for window in terms.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(CoreError::DuplicateVariable { key: window[0].0 }.log());
            }
        }

        for (key, block) in &terms {
            if block.nrows() != residual.len() {
                return Err(CoreError::DimensionMismatch {
                    context: format!("Jacobian block rows for {}", format_key(key)),
                    expected: residual.len(),
                    actual: block.nrows(),
                }
                .log());
            }
        }

        let (keys, blocks) = terms.into_iter().unzip();
        Ok(JacobianFactor {
            keys,
            blocks,
            residual,
        })
    }

    /// Factor with no variable blocks (e.g. a constant-only expression).
    pub fn constant(residual: DVector<f64>) -> Self {
        JacobianFactor {
            keys: Vec::new(),
            blocks: Vec::new(),
            residual,
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of residual rows.
    pub fn rows(&self) -> usize {
        self.residual.len()
    }

    /// Sum of the block widths.
    pub fn cols(&self) -> usize {
        self.blocks.iter().map(DMatrix::ncols).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn jacobian(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.keys
            .binary_search(&key)
            .ok()
            .map(|index| &self.blocks[index])
    }

    /// Iterate `(key, block)` pairs in key order.
    pub fn terms(&self) -> impl Iterator<Item = (Key, &DMatrix<f64>)> {
        self.keys.iter().copied().zip(self.blocks.iter())
    }

    pub fn residual(&self) -> &DVector<f64> {
        &self.residual
    }

    /// Evaluate `Σₖ Aₖ δₖ + b`. Keys missing from `delta` contribute nothing.
    pub fn error_vector(&self, delta: &HashMap<Key, DVector<f64>>) -> CoreResult<DVector<f64>> {
        let mut result = self.residual.clone();
        for (key, block) in self.terms() {
            if let Some(step) = delta.get(&key) {
                if step.len() != block.ncols() {
                    return Err(CoreError::DimensionMismatch {
                        context: format!("linear step for {}", format_key(&key)),
                        expected: block.ncols(),
                        actual: step.len(),
                    }
                    .log());
                }
                result += block * step;
            }
        }
        Ok(result)
    }

    /// Evaluate the linearized cost `0.5 ‖Σₖ Aₖ δₖ + b‖²`.
    pub fn error(&self, delta: &HashMap<Key, DVector<f64>>) -> CoreResult<f64> {
        Ok(0.5 * self.error_vector(delta)?.norm_squared())
    }

    /// Dense augmented matrix `[A | b]` with block columns in `ordering`.
    ///
    /// Keys in `ordering` that this factor does not involve are skipped; every key of the
    /// factor must appear in `ordering`.
    pub fn to_dense(&self, ordering: &[Key]) -> CoreResult<DMatrix<f64>> {
        if let Some(key) = self.keys.iter().find(|k| !ordering.contains(*k)) {
            return Err(CoreError::MissingVariable { key: *key }.log());
        }

        let mut augmented = DMatrix::zeros(self.rows(), self.cols() + 1);
        let mut col = 0;
        for key in ordering {
            if let Some(block) = self.jacobian(*key) {
                augmented
                    .view_mut((0, col), (block.nrows(), block.ncols()))
                    .copy_from(block);
                col += block.ncols();
            }
        }
        augmented.column_mut(col).copy_from(&self.residual);
        Ok(augmented)
    }

    /// Compare keys exactly and blocks and residual entry-wise within `tolerance`.
    pub fn is_approx(&self, other: &JacobianFactor, tolerance: f64) -> bool {
        self.keys == other.keys
            && self.residual.len() == other.residual.len()
            && (&self.residual - &other.residual).amax() <= tolerance
            && self.blocks.iter().zip(other.blocks.iter()).all(|(a, b)| {
                a.shape() == b.shape() && (a - b).amax() <= tolerance
            })
    }

    /// Stack many factors into a sparse Jacobian and a dense right-hand side.
    ///
    /// Columns are laid out by `ordering`; each key's width is taken from the factors that
    /// reference it. Rows follow the order of `factors`. Returns `(A, b)` so that the stacked
    /// linear cost is `0.5 ‖A δ + b‖²`. Each key may appear in `ordering` only once.
    pub fn assemble(
        factors: &[JacobianFactor],
        ordering: &[Key],
    ) -> CoreResult<(SparseColMat<usize, f64>, Mat<f64>)> {
        let mut seen = HashSet::with_capacity(ordering.len());
        if let Some(&key) = ordering.iter().find(|key| !seen.insert(**key)) {
            return Err(CoreError::DuplicateVariable { key }.log());
        }

        let mut widths: HashMap<Key, usize> = HashMap::new();
        for factor in factors {
            for (key, block) in factor.terms() {
                if !ordering.contains(&key) {
                    return Err(CoreError::DimensionMismatch {
                        context: format!("ordering does not contain {}", format_key(&key)),
                        expected: ordering.len() + 1,
                        actual: ordering.len(),
                    }
                    .log());
                }
                match widths.get(&key) {
                    Some(&width) if width != block.ncols() => {
                        return Err(CoreError::DimensionMismatch {
                            context: format!("block width for {}", format_key(&key)),
                            expected: width,
                            actual: block.ncols(),
                        }
                        .log());
                    }
                    Some(_) => {}
                    None => {
                        widths.insert(key, block.ncols());
                    }
                }
            }
        }

        let mut offsets = HashMap::with_capacity(ordering.len());
        let mut total_cols = 0;
        for key in ordering {
            offsets.insert(*key, total_cols);
            total_cols += widths.get(key).copied().unwrap_or(0);
        }
        let total_rows: usize = factors.iter().map(JacobianFactor::rows).sum();

        let mut triplets = Vec::new();
        let mut rhs = Mat::zeros(total_rows, 1);
        let mut row_offset = 0;
        for factor in factors {
            for (key, block) in factor.terms() {
                let col_offset = offsets[&key];
                for c in 0..block.ncols() {
                    for r in 0..block.nrows() {
                        let value = block[(r, c)];
                        if value != 0.0 {
                            triplets.push(Triplet::new(row_offset + r, col_offset + c, value));
                        }
                    }
                }
            }
            for (r, value) in factor.residual.iter().enumerate() {
                rhs[(row_offset + r, 0)] = *value;
            }
            row_offset += factor.rows();
        }

        let jacobian = SparseColMat::try_new_from_triplets(total_rows, total_cols, &triplets)
            .map_err(|e| {
                CoreError::InvalidInput("Failed to assemble sparse Jacobian".to_string())
                    .log_with_source(e)
            })?;

        Ok((jacobian, rhs))
    }
}
