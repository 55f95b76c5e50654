use flc_model::{ControlDef, Report, Schema};
use flc_parse::{PeriodClause, parse};

use crate::elem::ControlFailure;
use crate::interp::{ControlParams, evaluate};

/// What happened to one control. Exceptions-as-control-flow of the
/// classic checker are spelled out as a value here.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// Period gate closed, condition not met, or a previous-period
    /// formula under `skip_warns`.
    Skipped,
    /// The formula reads previous-period values; one warning per control.
    PrevPeriod,
    PeriodExprError,
    ConditionExprError,
    RuleExprError,
    /// Evaluation broke down (no element to compare, unknown section…).
    EvalFailed(String),
    /// The rule compared and some pairs did not hold.
    Failed(Vec<ControlFailure>),
    Passed,
}

/// Runs one control: period gate, previous-period marker, condition gate,
/// then the rule itself.
pub struct ControlChecker<'a> {
    def: &'a ControlDef,
    schema: &'a Schema,
}

/// A value wrapped in doubled braces refers to the previous reporting
/// period, which is not supported.
fn prev_period(formula: &str) -> bool {
    formula.contains("{{")
}

impl<'a> ControlChecker<'a> {
    pub fn new(def: &'a ControlDef, schema: &'a Schema) -> Self {
        ControlChecker { def, schema }
    }

    pub fn check(&self, report: &Report) -> ControlOutcome {
        let Ok(clause) = PeriodClause::parse(&self.def.period_clause) else {
            return ControlOutcome::PeriodExprError;
        };
        if !clause.matches(report.period_code()) {
            tracing::debug!(control = %self.def.id, "period gate closed");
            return ControlOutcome::Skipped;
        }

        match self.condition_holds(report) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(control = %self.def.id, "condition not met");
                return ControlOutcome::Skipped;
            }
            Err(outcome) => return outcome,
        }

        self.check_rule(report)
    }

    /// The condition is evaluated with the control's precision but with
    /// no fault tolerance at all.
    fn condition_holds(&self, report: &Report) -> Result<bool, ControlOutcome> {
        let condition = &self.def.condition;
        if condition.is_empty() {
            return Ok(true);
        }
        if prev_period(condition) {
            return if self.schema.skip_warns {
                Ok(true)
            } else {
                Err(ControlOutcome::PrevPeriod)
            };
        }

        let expr = parse(condition).map_err(|err| {
            tracing::debug!(control = %self.def.id, %err, "condition parse failed");
            ControlOutcome::ConditionExprError
        })?;
        let params = ControlParams::condition(self.def.precision);
        let elems = evaluate(&expr, report, self.schema, &params)
            .map_err(|err| ControlOutcome::EvalFailed(err.to_string()))?;
        Ok(elems.iter().all(|elem| elem.failures.is_empty()))
    }

    fn check_rule(&self, report: &Report) -> ControlOutcome {
        let rule = &self.def.rule;
        if rule.is_empty() {
            return ControlOutcome::Passed;
        }
        if prev_period(rule) {
            return if self.schema.skip_warns {
                ControlOutcome::Skipped
            } else {
                ControlOutcome::PrevPeriod
            };
        }

        let expr = match parse(rule) {
            Ok(expr) => expr,
            Err(err) => {
                tracing::debug!(control = %self.def.id, %err, "rule parse failed");
                return ControlOutcome::RuleExprError;
            }
        };
        let params = ControlParams::rule(self.def.precision, self.def.fault);
        let elems = match evaluate(&expr, report, self.schema, &params) {
            Ok(elems) => elems,
            Err(err) => return ControlOutcome::EvalFailed(err.to_string()),
        };

        let failures: Vec<ControlFailure> = elems
            .into_iter()
            .flat_map(|elem| elem.failures)
            .collect();
        if failures.is_empty() {
            ControlOutcome::Passed
        } else {
            ControlOutcome::Failed(failures)
        }
    }
}
