//! The four-stage validation pipeline. Stages run in a fixed order and
//! the pipeline stops at the first stage that accumulated errors; each
//! emitted record carries `<stage_code>.<in_stage_code>`, the stage name
//! and a message.

use once_cell::sync::Lazy;
use regex::Regex;

use flc_common::ValidationError;
use flc_model::{Report, Schema};

use crate::control::{ControlChecker, ControlOutcome};
use crate::inspect::{SpecInspector, ValueInspector};

/// A stage-internal error; the runner prefixes the stage code.
struct StageError {
    code: String,
    message: String,
    tip: Option<bool>,
}

impl StageError {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        StageError {
            code: code.into(),
            message: message.into(),
            tip: None,
        }
    }
}

trait Validator {
    fn code(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn validate(&mut self, schema: &Schema, report: &mut Report) -> Vec<StageError>;
}

/// Run the whole pipeline. The report is mutable because the attribute
/// stage may repair its period pair.
pub fn validate(schema: &Schema, report: &mut Report) -> Vec<ValidationError> {
    let mut stages: [Box<dyn Validator>; 4] = [
        Box::new(AttrValidator),
        Box::new(TitleValidator),
        Box::new(FormatValidator),
        Box::new(ControlValidator),
    ];
    for stage in &mut stages {
        tracing::debug!(stage = stage.name(), "running stage");
        let errors = stage.validate(schema, report);
        if !errors.is_empty() {
            tracing::debug!(stage = stage.name(), count = errors.len(), "stage failed");
            let (code, name) = (stage.code(), stage.name());
            return errors
                .into_iter()
                .map(|err| {
                    let mut out = ValidationError::new(
                        format!("{code}.{}", err.code),
                        name,
                        err.message,
                    );
                    if let Some(tip) = err.tip {
                        out = out.with_tip(tip);
                    }
                    out
                })
                .collect();
        }
    }
    Vec::new()
}

/* ───────────────────────── 1. Attributes ───────────────────────── */

static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(18|19|20)\d{2}$").unwrap());

struct AttrValidator;

impl Validator for AttrValidator {
    fn code(&self) -> &'static str {
        "1"
    }

    fn name(&self) -> &'static str {
        "Проверка аттрибутов"
    }

    fn validate(&mut self, schema: &Schema, report: &mut Report) -> Vec<StageError> {
        let mut errors = Vec::new();

        if !YEAR_PATTERN.is_match(&report.year) {
            errors.push(StageError::new("1", "Указан недопустимый год"));
        }

        if let Some(period_type) = report.period_type() {
            if period_type != schema.idp {
                errors.push(StageError::new(
                    "2",
                    "Тип периодичности отчёта не соответствует типу периодичности шаблона",
                ));
            }
        }

        if report.period_code().is_none() && !report.set_periods(&schema.catalogs, &schema.idp) {
            errors.push(StageError::new("3", "Неверное значение периода отчёта"));
        }

        errors
    }
}

/* ─────────────────────────── 2. Title ──────────────────────────── */

struct TitleValidator;

impl TitleValidator {
    fn fmt_field(schema: &Schema, field: &str) -> String {
        match schema.title_name(field) {
            Some(name) => format!("\"{name}\" [{field}]"),
            None => format!("[{field}]"),
        }
    }

    fn okpo_valid(value: &str) -> bool {
        matches!(value.len(), 8 | 10 | 14) && value.bytes().all(|b| b.is_ascii_digit())
    }
}

impl Validator for TitleValidator {
    fn code(&self) -> &'static str {
        "2"
    }

    fn name(&self) -> &'static str {
        "Проверка полей заголовка"
    }

    fn validate(&mut self, schema: &Schema, report: &mut Report) -> Vec<StageError> {
        let mut errors = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for (field, value) in &report.title {
            if !schema.has_title_field(field) {
                errors.push(StageError::new("1", format!("Лишнее поле [{field}]")));
            }
            if seen.contains(&field.as_str()) {
                let field = Self::fmt_field(schema, field);
                errors.push(StageError::new("2", format!("Повтор поля {field}")));
            }
            if value.is_empty() {
                let field = Self::fmt_field(schema, field);
                errors.push(StageError::new(
                    "3",
                    format!("Отсутствует значение в поле {field}"),
                ));
            }
            if *field == schema.obj && !Self::okpo_valid(value) {
                errors.push(StageError::new(
                    "4",
                    "Код ОКПО должен быть длиной 8, 10 или 14 цифр",
                ));
            }
            seen.push(field.as_str());
        }

        let obj_missing = !seen.contains(&schema.obj.as_str());
        if obj_missing {
            let field = Self::fmt_field(schema, &schema.obj);
            errors.push(StageError::new(
                "5",
                format!("Отсутствует ключевое поле {field}"),
            ));
        }

        for (field, _) in &schema.title_fields {
            if *field == schema.obj && obj_missing {
                continue;
            }
            if !seen.contains(&field.as_str()) {
                let field = Self::fmt_field(schema, field);
                errors.push(StageError::new("6", format!("Отсутствует поле {field}")));
            }
        }

        errors
    }
}

/* ─────────────────────────── 3. Format ─────────────────────────── */

struct FormatValidator;

impl FormatValidator {
    /// Structural checks raise; per-cell faults accumulate.
    fn run(
        &self,
        schema: &Schema,
        report: &Report,
        errors: &mut Vec<StageError>,
    ) -> Result<(), StageError> {
        Self::check_sections(schema, report)?;
        Self::check_duplicates(report)?;
        Self::check_required(schema, report)?;
        Self::check_format(schema, report, errors)
    }

    fn check_sections(schema: &Schema, report: &Report) -> Result<(), StageError> {
        let mut declared: Vec<&String> = schema.dimension.keys().collect();
        declared.sort();
        for sec in declared {
            if report.section(sec).is_none() {
                return Err(StageError::new(
                    "1",
                    format!("Раздел {sec} отсутствует в отчёте"),
                ));
            }
        }
        Ok(())
    }

    fn check_duplicates(report: &Report) -> Result<(), StageError> {
        let mut keys: Vec<_> = report.row_counters.iter().collect();
        keys.sort_by(|a, b| a.0.cmp(b.0));
        for (key, count) in keys {
            if *count > 1 {
                let (code, s1, s2, s3) = key;
                let specs: Vec<String> = [s1, s2, s3]
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| {
                        s.as_ref().map(|s| format!("s{}={s}", i + 1))
                    })
                    .collect();
                let row = if specs.is_empty() {
                    code.clone()
                } else {
                    format!("{code} {}", specs.join(" "))
                };
                return Err(StageError::new(
                    "2",
                    format!("Строка {row} повторяется {count} раз(а)"),
                ));
            }
        }
        Ok(())
    }

    fn check_required(schema: &Schema, report: &Report) -> Result<(), StageError> {
        for (sec, row_code, col) in &schema.required {
            let rows: Vec<_> = match report.section(sec) {
                Some(section) => section.rows_by_code(row_code).collect(),
                None => Vec::new(),
            };
            if rows.is_empty() {
                return Err(StageError::new(
                    "3",
                    format!("Раздел {sec}, строка {row_code} не может быть пустой"),
                ));
            }
            for row in rows {
                if row.value(col).is_none() {
                    return Err(StageError::new(
                        "4",
                        format!("Раздел {sec}, строка {row_code}, графа {col} не может быть пустой"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_format(
        schema: &Schema,
        report: &Report,
        errors: &mut Vec<StageError>,
    ) -> Result<(), StageError> {
        for section in report.sections() {
            let sec = section.code.as_str();
            let specs_map = schema
                .formats
                .specs_map(sec)
                .ok_or_else(|| {
                    StageError::new("5", format!("Раздел {sec} не описан в шаблоне"))
                })?
                .to_vec();

            for row in section.rows() {
                for (col, fld) in &specs_map {
                    let rule = Self::rule(schema, sec, &row.code, col)?;
                    let Some(axis) = fld.chars().last().and_then(|c| c.to_digit(10)) else {
                        continue;
                    };
                    let inspector = SpecInspector::new(rule, &schema.catalogs);
                    if let Err(fault) = inspector.check(row, axis as u8, sec, &schema.formats) {
                        errors.push(StageError::new(
                            fault.code(),
                            format!(
                                "Раздел {sec}, строка {}, специфика {axis}. {fault}",
                                row.code
                            ),
                        ));
                    }
                }

                let mut columns: Vec<_> = row.columns().collect();
                columns.sort_by_key(|col| {
                    col.code.parse::<i64>().map_err(|_| col.code.clone())
                });
                for column in columns {
                    let Some(value) = column.value.as_deref().filter(|v| !v.is_empty()) else {
                        continue;
                    };
                    let rule = Self::rule(schema, sec, &row.code, &column.code)?;
                    let inspector = ValueInspector::new(rule, &schema.catalogs);
                    if let Err(fault) = inspector.check(value) {
                        errors.push(StageError::new(
                            fault.code(),
                            format!(
                                "Раздел {sec}, строка {}, графа {}. {fault}",
                                row.code, column.code
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn rule<'a>(
        schema: &'a Schema,
        sec: &str,
        row: &str,
        col: &str,
    ) -> Result<&'a flc_model::FormatRule, StageError> {
        schema.formats.rule(sec, row, col).ok_or_else(|| {
            StageError::new(
                "6",
                format!(
                    "Раздел {sec}, строка {row}, графа {col}. \
                     В шаблоне отсутствует правило для проверки этого поля"
                ),
            )
        })
    }
}

impl Validator for FormatValidator {
    fn code(&self) -> &'static str {
        "3"
    }

    fn name(&self) -> &'static str {
        "Проверка формата"
    }

    fn validate(&mut self, schema: &Schema, report: &mut Report) -> Vec<StageError> {
        let mut errors = Vec::new();
        if let Err(structural) = self.run(schema, report, &mut errors) {
            errors.push(structural);
        }
        errors
    }
}

/* ────────────────────────── 4. Controls ────────────────────────── */

struct ControlValidator;

impl Validator for ControlValidator {
    fn code(&self) -> &'static str {
        "4"
    }

    fn name(&self) -> &'static str {
        "Проверка контролей"
    }

    fn validate(&mut self, schema: &Schema, report: &mut Report) -> Vec<StageError> {
        let mut errors = Vec::new();
        if report.blank {
            return errors;
        }

        for def in &schema.controls {
            let outcome = ControlChecker::new(def, schema).check(report);
            let mut push = |code: &str, message: String| {
                errors.push(StageError {
                    code: code.to_string(),
                    message,
                    tip: Some(def.mandatory()),
                });
            };
            match outcome {
                ControlOutcome::Passed | ControlOutcome::Skipped => {}
                ControlOutcome::PrevPeriod => push(
                    &def.id,
                    format!(
                        "{} Проверка со значениями из прошлого периода не реализована",
                        def.id
                    ),
                ),
                ControlOutcome::PeriodExprError => push(
                    &def.id,
                    format!("{} Ошибка разбора формулы проверки периодичности", def.id),
                ),
                ControlOutcome::ConditionExprError => {
                    push(&def.id, format!("{} Ошибка разбора условия контроля", def.id))
                }
                ControlOutcome::RuleExprError => {
                    push(&def.id, format!("{} Ошибка разбора правила контроля", def.id))
                }
                ControlOutcome::EvalFailed(message) => {
                    push(&def.id, format!("{} {}; {message}", def.id, def.name))
                }
                ControlOutcome::Failed(failures) => {
                    for fail in failures {
                        push(
                            &def.id,
                            format!(
                                "{} {}; слева {} {} справа {} разница {}; обязательность {}",
                                def.id,
                                def.name,
                                fail.left,
                                fail.op,
                                fail.right,
                                fail.delta,
                                if def.mandatory() { "да" } else { "нет" },
                            ),
                        );
                    }
                }
            }
        }
        errors
    }
}
