//! Tree interpreter for control expressions.
//!
//! Every node evaluates to an operand: a row-major matrix of [`Elem`]s
//! plus the literal row/column sets of the slice it came from. The
//! opposing operand of the nearest enclosing binary node (its "shape")
//! steers `SUM` routing and is derived from the expression tree without
//! evaluating it.

use rustc_hash::FxHashSet;
use thiserror::Error;

use flc_common::NullableFloat;
use flc_model::{Report, Schema};
use flc_parse::{ArithOp, CmpOp, Expr, LogicOp, ParamFunc, Selector, SliceRef, UnaryFunc};

use crate::elem::Elem;
use crate::specific::{Specific, match_all};

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("нет элемента для сравнения")]
    NoElemToCompare,
    #[error("раздел {0} отсутствует в отчёте")]
    NoSection(String),
    #[error("нет формата специфик для раздела {section}, строки {row}")]
    NoFormatForRow { section: String, row: String },
    #[error("несравнимые операнды длины {left} и {right}")]
    BadBroadcast { left: usize, right: usize },
}

/// Evaluation settings of one control run. A condition is evaluated with
/// `fault = -1` (no tolerance) and `is_rule = false`.
#[derive(Debug, Clone, Copy)]
pub struct ControlParams {
    pub precision: i32,
    pub fault: f64,
    pub is_rule: bool,
}

impl ControlParams {
    pub fn rule(precision: i32, fault: f64) -> Self {
        ControlParams {
            precision,
            fault,
            is_rule: true,
        }
    }

    pub fn condition(precision: i32) -> Self {
        ControlParams {
            precision,
            fault: -1.0,
            is_rule: false,
        }
    }
}

/// Evaluate a parsed control formula against a report. The result is the
/// flattened element stream of the top node; callers read the failure
/// lists off it.
pub fn evaluate(
    expr: &Expr,
    report: &Report,
    schema: &Schema,
    params: &ControlParams,
) -> Result<Vec<Elem>, EvalError> {
    let interp = Interp {
        report,
        schema,
        params,
    };
    Ok(interp.eval(expr, &Shape::default())?.flatten())
}

/// The coordinate footprint of an operand, read off the tree.
#[derive(Debug, Default, Clone)]
struct Shape {
    rows: FxHashSet<String>,
    columns: FxHashSet<String>,
    logical: bool,
}

fn shape_of(expr: &Expr) -> Shape {
    match expr {
        Expr::Num(_) => Shape::default(),
        Expr::Slice(slice) => Shape {
            rows: slice.rows.iter().cloned().collect(),
            columns: slice.columns.iter().cloned().collect(),
            logical: false,
        },
        Expr::Neg(inner) => shape_of(inner),
        Expr::Apply { expr, .. } => shape_of(expr),
        Expr::Call { expr, .. } => shape_of(expr),
        Expr::Arith { left, .. } => shape_of(left),
        Expr::Cmp { .. } | Expr::Logic { .. } => Shape {
            logical: true,
            ..Shape::default()
        },
        Expr::Select { args, .. } => args.first().map(shape_of).unwrap_or_default(),
    }
}

struct Operand {
    rows: FxHashSet<String>,
    columns: FxHashSet<String>,
    matrix: Vec<Vec<Elem>>,
}

impl Operand {
    fn scalar(value: f64) -> Self {
        Operand {
            rows: FxHashSet::default(),
            columns: FxHashSet::default(),
            matrix: vec![vec![Elem::scalar(value)]],
        }
    }

    fn from_elems(elems: Vec<Elem>) -> Self {
        Operand {
            rows: FxHashSet::default(),
            columns: FxHashSet::default(),
            matrix: elems.into_iter().map(|elem| vec![elem]).collect(),
        }
    }

    fn flatten(self) -> Vec<Elem> {
        self.matrix.into_iter().flatten().collect()
    }

    fn is_empty(&self) -> bool {
        self.matrix.iter().all(Vec::is_empty)
    }

    fn map_vals(&mut self, f: impl Fn(NullableFloat) -> NullableFloat) {
        for row in &mut self.matrix {
            for elem in row {
                elem.val = f(elem.val);
            }
        }
    }
}

struct Interp<'a> {
    report: &'a Report,
    schema: &'a Schema,
    params: &'a ControlParams,
}

impl Interp<'_> {
    fn eval(&self, expr: &Expr, ctx: &Shape) -> Result<Operand, EvalError> {
        match expr {
            Expr::Num(value) => Ok(Operand::scalar(*value)),
            Expr::Slice(slice) => self.eval_slice(slice),
            Expr::Neg(inner) => {
                let mut operand = self.eval(inner, ctx)?;
                operand.map_vals(|val| -val);
                Ok(operand)
            }
            Expr::Apply {
                func: UnaryFunc::Sum,
                expr,
            } => {
                let mut operand = self.eval(expr, ctx)?;
                self.apply_sum(&mut operand, ctx);
                Ok(operand)
            }
            Expr::Apply {
                func: UnaryFunc::Abs,
                expr,
            } => {
                let mut operand = self.eval(expr, ctx)?;
                operand.map_vals(NullableFloat::abs);
                Ok(operand)
            }
            Expr::Apply {
                func: UnaryFunc::Floor,
                expr,
            } => {
                let mut operand = self.eval(expr, ctx)?;
                operand.map_vals(NullableFloat::floor);
                Ok(operand)
            }
            Expr::Call { func, expr, args } => self.eval_call(*func, expr, args, ctx),
            Expr::Arith { op, left, right } => self.eval_arith(*op, left, right, ctx),
            Expr::Cmp { op, left, right } => self.eval_control(Compare::Cmp(*op), left, right),
            Expr::Logic { op, left, right } => self.eval_control(Compare::Logic(*op), left, right),
            Expr::Select { kind, args } => self.eval_select(*kind, args, ctx),
        }
    }

    /// Read a rectangular slice off the report. Missing rows and columns
    /// become null stubs so zipping and summation stay aligned.
    fn eval_slice(&self, slice: &SliceRef) -> Result<Operand, EvalError> {
        let sec = slice.section();
        let section = self
            .report
            .section(sec)
            .ok_or_else(|| EvalError::NoSection(sec.to_string()))?;

        let first_row = slice.rows.first().map(String::as_str).unwrap_or("");
        let mut specs = [
            Specific::from_group(1, slice.specs[0].as_deref()),
            Specific::from_group(2, slice.specs[1].as_deref()),
            Specific::from_group(3, slice.specs[2].as_deref()),
        ];
        for spec in specs.iter_mut() {
            spec.prepare(sec, first_row, &self.schema.formats, &self.schema.catalogs)?;
        }

        let wild_rows = slice.rows.len() == 1 && slice.rows[0] == "*";
        let row_codes: Vec<String> = if wild_rows {
            section
                .row_codes()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            slice.rows.clone()
        };

        let empty: Vec<String> = Vec::new();
        let wild_cols = slice.columns.len() == 1 && slice.columns[0] == "*";
        let col_codes: &[String] = if wild_cols {
            self.schema
                .dimension
                .get(sec)
                .map(Vec::as_slice)
                .unwrap_or(&empty)
        } else {
            &slice.columns
        };

        let mut matrix = Vec::new();
        for code in &row_codes {
            let matching: Vec<_> = section
                .rows_by_code(code)
                .filter(|row| match_all(&specs, row))
                .collect();
            if matching.is_empty() {
                matrix.push(col_codes.iter().map(|col| Elem::stub(sec, code, col)).collect());
                continue;
            }
            for row in matching {
                let cells = col_codes
                    .iter()
                    .map(|col| {
                        let val = row
                            .value(col)
                            .map(NullableFloat::parse)
                            .unwrap_or_else(NullableFloat::null);
                        Elem::cell(val, sec, code, col, row.blank())
                    })
                    .collect();
                matrix.push(cells);
            }
        }

        Ok(Operand {
            rows: slice.rows.iter().cloned().collect(),
            columns: slice.columns.iter().cloned().collect(),
            matrix,
        })
    }

    /// The routing rule of `SUM`, driven by the opposing operand.
    fn apply_sum(&self, operand: &mut Operand, ctx: &Shape) {
        if ctx.logical {
            self.sum_all(operand);
        } else if operand.columns == ctx.columns {
            self.sum_rows(operand);
        } else if operand.rows == ctx.rows {
            self.sum_columns(operand);
        } else if operand.is_empty() {
            operand.matrix = vec![vec![Elem::null()]];
        } else {
            self.sum_all(operand);
        }
    }

    /// One total per column, summed across rows.
    fn sum_rows(&self, operand: &mut Operand) {
        let width = operand.matrix.iter().map(Vec::len).min().unwrap_or(0);
        let mut columns: Vec<Vec<Elem>> = Vec::with_capacity(width);
        for j in 0..width {
            let mut total: Option<Elem> = None;
            for row in &operand.matrix {
                let elem = row[j].clone();
                total = Some(match total {
                    None => elem,
                    Some(total) => total.combine(&elem, ArithOp::Add),
                });
            }
            if let Some(total) = total {
                columns.push(vec![total]);
            }
        }
        operand.matrix = columns;
    }

    /// One total per row, summed across columns.
    fn sum_columns(&self, operand: &mut Operand) {
        let mut rows = Vec::with_capacity(operand.matrix.len());
        for row in operand.matrix.drain(..) {
            let mut iter = row.into_iter();
            if let Some(first) = iter.next() {
                let total = iter.fold(first, |total, elem| total.combine(&elem, ArithOp::Add));
                rows.push(vec![total]);
            }
        }
        operand.matrix = rows;
    }

    /// A single grand total.
    fn sum_all(&self, operand: &mut Operand) {
        let elems: Vec<Elem> = operand.matrix.drain(..).flatten().collect();
        let mut iter = elems.into_iter();
        let total = match iter.next() {
            Some(first) => iter.fold(first, |total, elem| total.combine(&elem, ArithOp::Add)),
            None => Elem::null(),
        };
        operand.matrix = vec![vec![total]];
    }

    /// `round` / `isnull`: the target inherits the surrounding context;
    /// the scalar parameters are evaluated against the target's own
    /// shape.
    fn eval_call(
        &self,
        func: ParamFunc,
        target: &Expr,
        args: &[Expr],
        ctx: &Shape,
    ) -> Result<Operand, EvalError> {
        let target_shape = shape_of(target);
        let mut operand = self.eval(target, ctx)?;
        match func {
            ParamFunc::Round => {
                let ndigits = self.scalar_arg(&args[0], &target_shape)? as i32;
                let truncate = match args.get(1) {
                    Some(arg) => self.scalar_arg(arg, &target_shape)? > 0.0,
                    None => false,
                };
                operand.map_vals(|val| {
                    if truncate {
                        val.truncate(ndigits)
                    } else {
                        val.round(ndigits)
                    }
                });
            }
            ParamFunc::IsNull => {
                let replace = self.scalar_arg(&args[0], &target_shape)?;
                // Zero stands for "nothing was reported" as well.
                operand.map_vals(|val| {
                    if val.is_null() || val.value() == 0.0 {
                        NullableFloat::new(replace)
                    } else {
                        val
                    }
                });
            }
        }
        Ok(operand)
    }

    fn scalar_arg(&self, expr: &Expr, ctx: &Shape) -> Result<f64, EvalError> {
        let elems = self.eval(expr, ctx)?.flatten();
        let first = elems.first().ok_or(EvalError::NoElemToCompare)?;
        Ok(first.val.value())
    }

    fn eval_arith(
        &self,
        op: ArithOp,
        left: &Expr,
        right: &Expr,
        ctx: &Shape,
    ) -> Result<Operand, EvalError> {
        let left_shape = shape_of(left);
        let left_operand = self.eval(left, ctx)?;
        let right_operand = self.eval(right, &left_shape)?;

        let rows = left_operand.rows.clone();
        let columns = left_operand.columns.clone();
        let pairs = zip_broadcast(left_operand.flatten(), right_operand.flatten())?;
        let matrix = pairs
            .into_iter()
            .map(|(l, r)| vec![l.combine(&r, op)])
            .collect();
        Ok(Operand {
            rows,
            columns,
            matrix,
        })
    }

    /// Comparison / boolean node: evaluate both sides against each
    /// other's shape, zip, compare pair by pair.
    fn eval_control(&self, cmp: Compare, left: &Expr, right: &Expr) -> Result<Operand, EvalError> {
        let left_elems = self.eval(left, &shape_of(right))?.flatten();
        let right_elems = self.eval(right, &shape_of(left))?.flatten();
        if left_elems.is_empty() || right_elems.is_empty() {
            return Err(EvalError::NoElemToCompare);
        }

        let mut elems = Vec::new();
        for (mut l, mut r) in zip_broadcast(left_elems, right_elems)? {
            l.val = l.val.round(self.params.precision);
            r.val = r.val.round(self.params.precision);

            let success = if !self.comparable(&l, &r, cmp) {
                false
            } else {
                let held = match cmp {
                    Compare::Cmp(op) => op.eval_f64(l.val.value(), r.val.value()),
                    Compare::Logic(op) => op.eval(l.truth, r.truth),
                };
                held || (l.val.value() - r.val.value()).abs() <= self.params.fault
            };

            if success {
                l.truth = true;
                if cmp == Compare::Logic(LogicOp::Or) {
                    // Any-success semantics: one passing branch absolves
                    // the other's recorded failures.
                    if !l.failures.is_empty() {
                        l.failures.clear();
                    } else {
                        r.failures.clear();
                    }
                }
            } else {
                l.record_failure(&r, cmp.as_str());
            }
            l.failures.extend(r.failures);
            l.val = r.val;
            elems.push(l);
        }
        Ok(Operand::from_elems(elems))
    }

    /// In a condition, equality-family comparisons over blank-row stubs
    /// fail without comparing: an empty row cannot satisfy a condition.
    fn comparable(&self, l: &Elem, r: &Elem, cmp: Compare) -> bool {
        if self.params.is_rule {
            return true;
        }
        if matches!(cmp, Compare::Logic(_)) {
            return true;
        }
        !(l.blank_row || r.blank_row)
    }

    fn eval_select(
        &self,
        kind: Selector,
        args: &[Expr],
        ctx: &Shape,
    ) -> Result<Operand, EvalError> {
        let mut results = Vec::with_capacity(args.len());
        for arg in args {
            results.push(self.eval(arg, ctx)?.flatten());
        }
        let lines = zip_broadcast_n(results)?;

        let mut elems = Vec::with_capacity(lines.len());
        for mut line in lines {
            match kind {
                Selector::NullIf => {
                    let keep = line[0].val.value() != line[1].val.value();
                    elems.push(if keep { line.swap_remove(0) } else { Elem::null() });
                }
                Selector::Coalesce => {
                    let found = line.iter().position(|elem| !elem.val.is_null());
                    let pick = found.unwrap_or(line.len() - 1);
                    elems.push(line.swap_remove(pick));
                }
            }
        }
        Ok(Operand::from_elems(elems))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Compare {
    Cmp(CmpOp),
    Logic(LogicOp),
}

impl Compare {
    fn as_str(self) -> &'static str {
        match self {
            Compare::Cmp(op) => op.as_str(),
            Compare::Logic(op) => op.as_str(),
        }
    }
}

/// Pair two element streams. A one-element side is replicated to the
/// other's length; independent copies keep failure lists from being
/// shared.
fn zip_broadcast(left: Vec<Elem>, right: Vec<Elem>) -> Result<Vec<(Elem, Elem)>, EvalError> {
    let (left, right) = match (left.len(), right.len()) {
        (l, r) if l == r => (left, right),
        (1, r) => (vec![left[0].clone(); r], right),
        (l, 1) => (left, vec![right[0].clone(); l]),
        (l, r) => return Err(EvalError::BadBroadcast { left: l, right: r }),
    };
    Ok(left.into_iter().zip(right).collect())
}

/// N-ary variant used by selectors: transpose the argument streams into
/// lines, broadcasting one-element streams.
fn zip_broadcast_n(streams: Vec<Vec<Elem>>) -> Result<Vec<Vec<Elem>>, EvalError> {
    let target = streams.iter().map(Vec::len).max().unwrap_or(0);
    if target == 0 {
        return Ok(Vec::new());
    }
    let mut expanded = Vec::with_capacity(streams.len());
    for stream in streams {
        match stream.len() {
            n if n == target => expanded.push(stream),
            1 => expanded.push(vec![stream[0].clone(); target]),
            n => {
                return Err(EvalError::BadBroadcast {
                    left: n,
                    right: target,
                });
            }
        }
    }
    let mut lines = Vec::with_capacity(target);
    for i in 0..target {
        lines.push(expanded.iter().map(|stream| stream[i].clone()).collect());
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flc_model::{Row, Section};
    use flc_parse::parse;

    fn fixture_report() -> Report {
        let mut report = Report::new("2020".into(), "0401".into());
        let mut section = Section::new("1".into());

        let mut row = Row::new("1".into(), None, None, None);
        row.add_column("1".into(), Some("1".into()));
        row.add_column("2".into(), Some("2".into()));
        row.add_column("3".into(), Some("3".into()));
        section.push_row(row);

        let mut row = Row::new("2".into(), None, None, None);
        row.add_column("1".into(), Some("4".into()));
        row.add_column("2".into(), Some("5".into()));
        row.add_column("3".into(), Some("6".into()));
        section.push_row(row);

        let mut row = Row::new("9".into(), None, None, None);
        row.add_column("3".into(), Some("9".into()));
        section.push_row(row);

        report.add_section(section);
        report.mark_filled();
        report
    }

    fn fixture_schema() -> Schema {
        let mut schema = Schema::default();
        schema.dimension.insert(
            "1".into(),
            vec!["1".into(), "2".into(), "3".into()],
        );
        schema
    }

    fn failures(formula: &str, params: &ControlParams) -> Vec<Elem> {
        let expr = parse(formula).unwrap();
        evaluate(&expr, &fixture_report(), &fixture_schema(), params).unwrap()
    }

    fn fail_count(formula: &str, params: &ControlParams) -> usize {
        failures(formula, params)
            .iter()
            .map(|elem| elem.failures.len())
            .sum()
    }

    const RULE: ControlParams = ControlParams {
        precision: 2,
        fault: 0.0,
        is_rule: true,
    };

    #[test]
    fn sum_collapses_per_column_when_columns_match() {
        // Rows 1..2 of column 3 total 9, matching row 9.
        assert_eq!(fail_count("SUM{[1][1-2][3]} |=| {[1][9][3]}", &RULE), 0);
        // Disjoint coordinates route to a grand total (1 + 4 = 5, not 9).
        assert_eq!(fail_count("SUM{[1][1-2][1]} |=| {[1][9][3]}", &RULE), 1);
    }

    #[test]
    fn sum_of_matching_columns_runs_per_column() {
        // Per-column totals over rows 1..2: [5, 7, 9] vs themselves.
        assert_eq!(
            fail_count("SUM{[1][1-2][1-3]} |=| SUM{[1][1-2][1-3]}", &RULE),
            0
        );
    }

    #[test]
    fn sum_against_scalar_is_a_grand_total() {
        assert_eq!(fail_count("SUM{[1][*][3]} |=| 18", &RULE), 0);
        assert_eq!(fail_count("SUM{[1][*][3]} |=| 17", &RULE), 1);
    }

    #[test]
    fn sum_per_row_when_rows_match() {
        // Rows 1..2 summed across all columns: 6 and 15.
        assert_eq!(
            fail_count("SUM{[1][1,2][*]} |<=| {[1][1,2][3]} * 3", &RULE),
            0
        );
    }

    #[test]
    fn scalar_broadcasts_across_a_vector() {
        assert_eq!(fail_count("{[1][1][1-3]} |>| 0", &RULE), 0);
        let elems = failures("{[1][1][1-3]} |>| 2", &RULE);
        assert_eq!(elems.len(), 3);
        let failed: usize = elems.iter().map(|e| e.failures.len()).sum();
        assert_eq!(failed, 2);
    }

    #[test]
    fn arithmetic_zips_and_absorbs_zero_division() {
        assert_eq!(fail_count("{[1][1][1]} + {[1][2][1]} |=| 5", &RULE), 0);
        assert_eq!(fail_count("{[1][1][1]} / 0 |=| 1", &RULE), 0);
        assert_eq!(fail_count("{[1][1][1-2]} - {[1][2][1-2]} |=| -3", &RULE), 0);
    }

    #[test]
    fn isnull_fills_missing_cells() {
        assert_eq!(fail_count("isnull({[1][9][1]}, 5) |=| 5", &RULE), 0);
    }

    #[test]
    fn round_and_floor_apply_pointwise() {
        assert_eq!(fail_count("round({[1][1][1]} / 3, 2) |=| 0.33", &RULE), 0);
        assert_eq!(fail_count("floor({[1][2][2]} / 2) |=| 2", &RULE), 0);
    }

    #[test]
    fn selectors_pick_by_nullness() {
        assert_eq!(
            fail_count("coalesce({[1][9][1]}, {[1][1][1]}) |=| 1", &RULE),
            0
        );
        assert_eq!(
            fail_count("isnull(nullif({[1][1][1]}, 1), 7) |=| 7", &RULE),
            0
        );
        assert_eq!(fail_count("nullif({[1][1][1]}, 2) |=| 1", &RULE), 0);
    }

    #[test]
    fn or_success_absolves_recorded_failures() {
        assert_eq!(
            fail_count("{[1][1][1]} |=| 99 or {[1][1][1]} |=| 1", &RULE),
            0
        );
        assert_eq!(
            fail_count("{[1][1][1]} |=| 1 or {[1][1][1]} |=| 99", &RULE),
            0
        );
        assert!(fail_count("{[1][1][1]} |=| 99 or {[1][1][1]} |=| 98", &RULE) > 0);
        assert_eq!(
            fail_count("{[1][1][1]} |=| 1 and {[1][2][1]} |=| 4", &RULE),
            0
        );
    }

    #[test]
    fn fault_forgives_small_differences() {
        let tolerant = ControlParams::rule(2, 5.0);
        assert_eq!(fail_count("{[1][1][1]} |=| 5", &tolerant), 0);
        let strict = ControlParams::rule(2, 3.0);
        assert_eq!(fail_count("{[1][1][1]} |=| 5", &strict), 1);
    }

    #[test]
    fn precision_rounds_before_comparing() {
        assert_eq!(fail_count("{[1][1][1]} |=| 1.4", &ControlParams::rule(0, 0.0)), 0);
        assert_eq!(fail_count("{[1][1][1]} |=| 1.4", &ControlParams::rule(1, 0.0)), 1);
    }

    #[test]
    fn missing_section_and_empty_streams_error() {
        let expr = parse("{[7][1][1]} |=| 1").unwrap();
        let err = evaluate(&expr, &fixture_report(), &fixture_schema(), &RULE).unwrap_err();
        assert_eq!(err, EvalError::NoSection("7".to_string()));
    }

    #[test]
    fn condition_comparisons_skip_blank_rows() {
        // Row 77 does not exist: its stub may not satisfy a condition.
        let condition = ControlParams::condition(2);
        assert_eq!(fail_count("{[1][77][3]} |=| 0", &condition), 1);
        assert_eq!(fail_count("{[1][77][3]} |=| 0", &RULE), 0);
    }

    #[test]
    fn failure_records_operands_and_delta() {
        let elems = failures("{[1][9][3]} |=| SUM{[1][1-2][3]} + 5", &RULE);
        let fails: Vec<_> = elems.iter().flat_map(|e| e.failures.clone()).collect();
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].left, 9.0);
        assert_eq!(fails[0].right, 14.0); // 3 + 6 + 5
        assert_eq!(fails[0].op, "=");
        assert_eq!(fails[0].delta, -5.0);
    }
}
