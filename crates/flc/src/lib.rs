//! Format-logical control (FLC) of statistical reports.
//!
//! A report and its template arrive as XML, become in-memory trees, and
//! run through a fixed validator pipeline: attributes, title, per-cell
//! formats, then the declarative controls written in the template's
//! expression DSL.
//!
//! ```no_run
//! # let (schema_xml, report_xml) = ("", "");
//! let schema = flc::parse_schema(schema_xml, false)?;
//! let mut report = flc::parse_report(report_xml)?;
//! for error in flc::validate(&schema, &mut report) {
//!     println!("{error}");
//! }
//! # Ok::<(), flc::XmlError>(())
//! ```

pub use flc_common::{NullableFloat, ValidationError, canon_code};
pub use flc_eval::{ControlChecker, ControlOutcome, Elem, EvalError, validate};
pub use flc_model::{Catalogs, ControlDef, Report, Schema, Section, XmlError};
pub use flc_parse::{Expr, ParseError, PeriodClause, parse};

/// Parse a report document.
pub fn parse_report(xml: &str) -> Result<Report, XmlError> {
    flc_model::xml::report_from_xml(xml)
}

/// Parse a template document. With `skip_warns`, controls referencing the
/// previous period are skipped silently instead of producing warnings.
pub fn parse_schema(xml: &str, skip_warns: bool) -> Result<Schema, XmlError> {
    flc_model::xml::schema_from_xml(xml, skip_warns)
}

/// One-call convenience: parse both documents and validate. Ingest
/// failures come back as the single "unexpected error" record instead of
/// a panic or a lost report.
pub fn validate_xml(
    schema_xml: &str,
    report_xml: &str,
    skip_warns: bool,
) -> Vec<ValidationError> {
    let schema = match parse_schema(schema_xml, skip_warns) {
        Ok(schema) => schema,
        Err(err) => {
            tracing::warn!(%err, "template ingest failed");
            return vec![ValidationError::unexpected()];
        }
    };
    let mut report = match parse_report(report_xml) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(%err, "report ingest failed");
            return vec![ValidationError::unexpected()];
        }
    };
    validate(&schema, &mut report)
}
