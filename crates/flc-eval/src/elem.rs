use flc_common::NullableFloat;
use flc_parse::ArithOp;
use rustc_hash::FxHashSet;

/// One recorded comparison failure. Values are the rounded operands of
/// the failed pair; `delta` is their difference rounded to two digits.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFailure {
    pub left: f64,
    pub op: &'static str,
    pub right: f64,
    pub delta: f64,
}

/// A runtime value flowing through a control expression: the number
/// itself plus the report coordinates it came from (kept as sets, for
/// diagnostics and sum routing) and the failures collected so far.
#[derive(Debug, Clone)]
pub struct Elem {
    pub sections: FxHashSet<String>,
    pub rows: FxHashSet<String>,
    pub columns: FxHashSet<String>,
    pub val: NullableFloat,
    pub truth: bool,
    pub blank_row: bool,
    pub failures: Vec<ControlFailure>,
}

impl Elem {
    pub fn scalar(value: f64) -> Self {
        Elem {
            sections: FxHashSet::default(),
            rows: FxHashSet::default(),
            columns: FxHashSet::default(),
            val: NullableFloat::new(value),
            truth: true,
            blank_row: false,
            failures: Vec::new(),
        }
    }

    /// A cell read from the report.
    pub fn cell(val: NullableFloat, section: &str, row: &str, column: &str, blank_row: bool) -> Self {
        let mut sections = FxHashSet::default();
        sections.insert(section.to_string());
        let mut rows = FxHashSet::default();
        rows.insert(row.to_string());
        let mut columns = FxHashSet::default();
        columns.insert(column.to_string());
        Elem {
            sections,
            rows,
            columns,
            val,
            truth: true,
            blank_row,
            failures: Vec::new(),
        }
    }

    /// A stand-in for a cell that is not there.
    pub fn stub(section: &str, row: &str, column: &str) -> Self {
        Elem::cell(NullableFloat::null(), section, row, column, true)
    }

    /// A coordinate-free null, as produced by `nullif` and empty sums.
    pub fn null() -> Self {
        let mut elem = Elem::scalar(0.0);
        elem.val = NullableFloat::null();
        elem
    }

    /// Apply a binary arithmetic operator, merging origin coordinates.
    /// Division by zero leaves the value as it was.
    pub fn combine(mut self, other: &Elem, op: ArithOp) -> Self {
        self.rows.extend(other.rows.iter().cloned());
        self.columns.extend(other.columns.iter().cloned());
        self.sections.extend(other.sections.iter().cloned());
        self.val = match op {
            ArithOp::Add => self.val + other.val,
            ArithOp::Sub => self.val - other.val,
            ArithOp::Mul => self.val * other.val,
            ArithOp::Div => self.val / other.val,
        };
        self
    }

    /// Record a failed comparison against `right`.
    pub fn record_failure(&mut self, right: &Elem, op: &'static str) {
        self.truth = false;
        self.failures.push(ControlFailure {
            left: self.val.value(),
            op,
            right: right.val.value(),
            delta: (self.val - right.val).round(2).value(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_merges_coordinates_and_values() {
        let a = Elem::cell(NullableFloat::new(2.0), "1", "1", "3", false);
        let b = Elem::cell(NullableFloat::new(5.0), "1", "2", "3", false);
        let sum = a.combine(&b, ArithOp::Add);
        assert_eq!(sum.val.value(), 7.0);
        assert!(sum.rows.contains("1") && sum.rows.contains("2"));
    }

    #[test]
    fn stub_sums_stay_null() {
        let total = Elem::stub("1", "1", "3").combine(&Elem::stub("1", "2", "3"), ArithOp::Add);
        assert!(total.val.is_null());
        let mixed = total.combine(&Elem::cell(NullableFloat::new(1.0), "1", "3", "3", false), ArithOp::Add);
        assert!(!mixed.val.is_null());
        assert_eq!(mixed.val.value(), 1.0);
    }

    #[test]
    fn division_by_zero_keeps_the_value() {
        let a = Elem::scalar(9.0);
        let out = a.combine(&Elem::scalar(0.0), ArithOp::Div);
        assert_eq!(out.val.value(), 9.0);
    }

    #[test]
    fn failures_carry_the_rounded_delta() {
        let mut left = Elem::scalar(10.0);
        let right = Elem::scalar(4.0);
        left.record_failure(&right, "=");
        assert!(!left.truth);
        assert_eq!(
            left.failures,
            vec![ControlFailure {
                left: 10.0,
                op: "=",
                right: 4.0,
                delta: 6.0,
            }]
        );
    }
}
