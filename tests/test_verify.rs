// tests/test_verify.rs — Integration tests for the source/output comparison.

use tex2d_probe::image::{linear_ramp, Image};
use tex2d_probe::verify::{compare, Mismatch};

#[test]
fn identical_buffers_pass() {
    let src = linear_ramp(256, 256);
    let v = compare(&src, &src.clone());
    assert!(v.passed());
    assert_eq!(v.compared, 256 * 256);
    assert!(v.first().is_none());
}

#[test]
fn two_mismatches_in_one_row_record_only_the_first() {
    let src = linear_ramp(8, 4);
    let mut out = src.clone();
    out.set(2, 1, -1.0);
    out.set(6, 1, -2.0);

    let v = compare(&src, &out);
    assert_eq!(v.mismatches.len(), 1);
    assert_eq!(
        v.mismatches[0],
        Mismatch { row: 1, col: 2, expected: 10.0, actual: -1.0 }
    );
}

#[test]
fn one_mismatch_in_each_of_two_rows_records_both() {
    let src = linear_ramp(8, 4);
    let mut out = src.clone();
    out.set(0, 0, 99.0);
    out.set(7, 3, 99.0);

    let v = compare(&src, &out);
    let coords: Vec<_> = v.mismatches.iter().map(|m| (m.row, m.col)).collect();
    assert_eq!(coords, vec![(0, 0), (3, 7)]);
    assert!(!v.passed());
}

#[test]
fn fully_corrupted_output_reports_one_entry_per_row() {
    let src = linear_ramp(16, 5);
    let out: Image<f32> = Image::from_vec(16, 5, vec![-1.0; 80]);
    let v = compare(&src, &out);
    assert_eq!(v.mismatches.len(), 5);
    assert!(v.mismatches.iter().all(|m| m.col == 0));
}

#[test]
fn mismatch_line_format() {
    let m = Mismatch { row: 3, col: 17, expected: 785.0, actual: 0.5 };
    assert_eq!(m.to_string(), "Difference [ 3 17 ]:785.000000 ----0.500000");
}

#[test]
#[should_panic(expected = "cannot compare")]
fn size_mismatch_panics() {
    compare(&linear_ramp(4, 4), &linear_ramp(4, 5));
}
