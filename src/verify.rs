// verify.rs — Element-wise comparison of the source and read-back buffers.
//
// Comparison is exact (`!=` on f32). Point sampling at texel centres
// returns stored values unchanged, so any difference at all is a defect
// in the upload, the sampler configuration, the launch geometry or the
// read-back path.
//
// SCAN POLICY
// ───────────
// Rows are scanned top to bottom. Within a row the scan stops at the first
// mismatch and moves on to the next row, so at most one mismatch is
// recorded per row and a fully corrupted buffer reports `height` entries.

use std::fmt;

use crate::image::Image;

/// One recorded difference between source and output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub expected: f32,
    pub actual: f32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Difference [ {} {} ]:{:.6} ----{:.6}",
            self.row, self.col, self.expected, self.actual
        )
    }
}

/// Result of comparing two equally sized buffers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Verification {
    /// At most one entry per row, in row order.
    pub mismatches: Vec<Mismatch>,
    /// Number of element pairs actually inspected.
    pub compared: usize,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn first(&self) -> Option<&Mismatch> {
        self.mismatches.first()
    }
}

/// Compare `output` against `source`, element by element.
///
/// # Panics
/// Panics if the two images differ in width or height.
pub fn compare(source: &Image<f32>, output: &Image<f32>) -> Verification {
    assert!(
        source.width() == output.width() && source.height() == output.height(),
        "cannot compare {}×{} source against {}×{} output",
        source.width(),
        source.height(),
        output.width(),
        output.height(),
    );

    let mut result = Verification::default();
    for row in 0..source.height() {
        let expected_row = source.row(row);
        let actual_row = output.row(row);
        for (col, (&expected, &actual)) in expected_row.iter().zip(actual_row).enumerate() {
            result.compared += 1;
            if expected != actual {
                log::debug!("mismatch at row {row} col {col}: {expected} != {actual}");
                result.mismatches.push(Mismatch { row, col, expected, actual });
                break;
            }
        }
    }
    result
}
