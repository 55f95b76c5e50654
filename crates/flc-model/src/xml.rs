//! XML ingest for both documents.
//!
//! Report: `/report[@year, @period]` with a `title/item` list and
//! `sections/section/row/col` data. Template: `/metaForm[@idp, @obj]` with
//! title fields, section layouts (`columns` declare the universe,
//! `rows/cell` the per-cell rules), controls and catalogs. Codes are
//! canonicalized on the way in.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashMap;
use thiserror::Error;

use flc_common::canon_code;

use crate::report::{Report, Row, Section};
use crate::schema::{ControlDef, FormatRule, Schema, SectionFormats};

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml read error: {0}")]
    Read(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing attribute `{attr}` on <{element}>")]
    MissingAttr {
        element: &'static str,
        attr: &'static str,
    },
    #[error("document has no <{0}> root")]
    MissingRoot(&'static str),
}

fn attr(e: &BytesStart, name: &'static str) -> Result<Option<String>, XmlError> {
    match e.try_get_attribute(name)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn req_attr(e: &BytesStart, element: &'static str, name: &'static str) -> Result<String, XmlError> {
    attr(e, name)?.ok_or(XmlError::MissingAttr {
        element,
        attr: name,
    })
}

fn code_attr(e: &BytesStart, element: &'static str, name: &'static str) -> Result<String, XmlError> {
    Ok(canon_code(&req_attr(e, element, name)?))
}

/// Parse a report document.
pub fn report_from_xml(xml: &str) -> Result<Report, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report: Option<Report> = None;
    let mut section: Option<Section> = None;
    let mut row: Option<Row> = None;
    let mut col_code: Option<String> = None;
    let mut col_text: Option<String> = None;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"report" => {
                        report = Some(Report::new(
                            req_attr(e, "report", "year")?,
                            req_attr(e, "report", "period")?,
                        ));
                    }
                    b"item" => {
                        if let Some(report) = report.as_mut() {
                            let field = req_attr(e, "item", "name")?;
                            let value = attr(e, "value")?.unwrap_or_default().trim().to_string();
                            report.title.push((field, value));
                        }
                    }
                    b"section" => {
                        section = Some(Section::new(code_attr(e, "section", "code")?));
                    }
                    b"row" => {
                        row = Some(Row::new(
                            code_attr(e, "row", "code")?,
                            attr(e, "s1")?,
                            attr(e, "s2")?,
                            attr(e, "s3")?,
                        ));
                    }
                    b"col" => {
                        col_code = Some(code_attr(e, "col", "code")?);
                        col_text = None;
                    }
                    _ => {}
                }
                if matches!(event, Event::Empty(_)) {
                    close_report_element(
                        &name,
                        &mut report,
                        &mut section,
                        &mut row,
                        &mut col_code,
                        &mut col_text,
                    );
                }
            }
            Event::Text(ref t) => {
                if col_code.is_some() {
                    col_text = Some(t.decode().map_err(quick_xml::Error::from)?.into_owned());
                }
            }
            Event::End(ref e) => {
                let name = e.name().as_ref().to_vec();
                close_report_element(
                    &name,
                    &mut report,
                    &mut section,
                    &mut row,
                    &mut col_code,
                    &mut col_text,
                );
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let report = report.ok_or(XmlError::MissingRoot("report"))?;
    tracing::debug!(
        sections = report.sections().count(),
        rows = report.row_counters.values().sum::<usize>(),
        blank = report.blank,
        "report ingested"
    );
    Ok(report)
}

fn close_report_element(
    name: &[u8],
    report: &mut Option<Report>,
    section: &mut Option<Section>,
    row: &mut Option<Row>,
    col_code: &mut Option<String>,
    col_text: &mut Option<String>,
) {
    match name {
        b"col" => {
            if let (Some(row), Some(code)) = (row.as_mut(), col_code.take()) {
                row.add_column(code, col_text.take());
                if let Some(report) = report.as_mut() {
                    report.mark_filled();
                }
            }
        }
        b"row" => {
            if let (Some(section), Some(row)) = (section.as_mut(), row.take()) {
                section.push_row(row);
            }
        }
        b"section" => {
            if let (Some(report), Some(section)) = (report.as_mut(), section.take()) {
                report.add_section(section);
            }
        }
        _ => {}
    }
}

fn format_rule(e: &BytesStart) -> Result<FormatRule, XmlError> {
    Ok(FormatRule {
        format: attr(e, "format")?,
        vld_type: attr(e, "vldType")?,
        vld: attr(e, "vld")?,
        dic: attr(e, "dic")?,
        default: attr(e, "default")?,
    })
}

/// Parse a template document.
pub fn schema_from_xml(xml: &str, skip_warns: bool) -> Result<Schema, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut schema: Option<Schema> = None;
    let mut state = SchemaState::default();

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.name().as_ref().to_vec();
                state.open(&mut schema, &name, e)?;
                if matches!(event, Event::Empty(_)) {
                    state.close(&mut schema, &name);
                }
            }
            Event::End(ref e) => {
                let name = e.name().as_ref().to_vec();
                state.close(&mut schema, &name);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut schema = schema.ok_or(XmlError::MissingRoot("metaForm"))?;
    schema.skip_warns = skip_warns;
    tracing::debug!(
        controls = schema.controls.len(),
        catalogs = schema.catalogs.len(),
        required = schema.required.len(),
        "template ingested"
    );
    Ok(schema)
}

/// Walk state while assembling a `Schema`; one live entry per nesting
/// level that matters.
#[derive(Default)]
struct SchemaState {
    sec_code: Option<String>,
    sec_formats: SectionFormats,
    sec_defaults: FxHashMap<String, FormatRule>,
    col_code: Option<String>,
    row: Option<(String, String)>,
    row_cells: FxHashMap<String, FormatRule>,
    dic_id: Option<String>,
}

impl SchemaState {
    fn open(
        &mut self,
        schema: &mut Option<Schema>,
        name: &[u8],
        e: &BytesStart,
    ) -> Result<(), XmlError> {
        match name {
            b"metaForm" => {
                let mut parsed = Schema::default();
                parsed.idp = canon_code(&req_attr(e, "metaForm", "idp")?);
                parsed.obj = req_attr(e, "metaForm", "obj")?;
                *schema = Some(parsed);
            }
            b"item" => {
                if let Some(schema) = schema.as_mut() {
                    let field = req_attr(e, "item", "field")?;
                    let name = attr(e, "name")?.unwrap_or_default();
                    schema.title_fields.push((field, name));
                }
            }
            b"section" => {
                self.sec_code = Some(code_attr(e, "section", "code")?);
                self.sec_formats = SectionFormats::default();
                self.sec_defaults.clear();
            }
            b"column" => {
                let col = code_attr(e, "column", "code")?;
                let col_type = attr(e, "type")?.unwrap_or_default();
                match col_type.as_str() {
                    "S" => {
                        if let Some(fld) = attr(e, "fld")? {
                            self.sec_formats.specs.push((col.clone(), fld));
                        }
                    }
                    "Z" => {
                        if let (Some(schema), Some(sec)) = (schema.as_mut(), &self.sec_code) {
                            schema
                                .dimension
                                .entry(sec.clone())
                                .or_default()
                                .push(col.clone());
                        }
                    }
                    _ => {}
                }
                self.col_code = Some(col);
            }
            b"default-cell" => {
                if let Some(col) = &self.col_code {
                    self.sec_defaults.insert(col.clone(), format_rule(e)?);
                }
            }
            b"row" => {
                let code = code_attr(e, "row", "code")?;
                let row_type = attr(e, "type")?.unwrap_or_default();
                self.row_cells = self.sec_defaults.clone();
                self.row = Some((code, row_type));
            }
            b"cell" => {
                // Rows of type C are computed; their cells carry no rules.
                let Some((row_code, row_type)) = self.row.clone() else {
                    return Ok(());
                };
                if row_type == "C" {
                    return Ok(());
                }
                let col = code_attr(e, "cell", "column")?;
                let rule = format_rule(e)?;
                let input_type = attr(e, "inputType")?.unwrap_or_default();
                if let (Some(schema), Some(sec)) = (schema.as_mut(), &self.sec_code) {
                    if input_type == "1" && row_type != "M" {
                        schema
                            .required
                            .push((sec.clone(), row_code.clone(), col.clone()));
                    }
                }
                self.row_cells.insert(col, rule);
            }
            b"control" => {
                if let Some(schema) = schema.as_mut() {
                    schema.controls.push(ControlDef {
                        id: req_attr(e, "control", "id")?,
                        name: attr(e, "name")?.unwrap_or_default(),
                        rule: attr(e, "rule")?.unwrap_or_default().trim().to_string(),
                        condition: attr(e, "condition")?.unwrap_or_default().trim().to_string(),
                        period_clause: attr(e, "periodClause")?.unwrap_or_default(),
                        tip: attr(e, "tip")?.unwrap_or_else(|| "1".to_string()),
                        fault: attr(e, "fault")?
                            .and_then(|f| f.trim().parse().ok())
                            .unwrap_or(-1.0),
                        precision: attr(e, "precision")?
                            .and_then(|p| p.trim().parse().ok())
                            .unwrap_or(2),
                    });
                }
            }
            b"dic" => {
                let id = req_attr(e, "dic", "id")?;
                if let Some(schema) = schema.as_mut() {
                    schema.catalogs.entry(id.clone()).or_default();
                }
                self.dic_id = Some(id);
            }
            b"term" => {
                let (Some(schema), Some(dic)) = (schema.as_mut(), &self.dic_id) else {
                    return Ok(());
                };
                let Some(catalog) = schema.catalogs.get_mut(dic) else {
                    return Ok(());
                };
                let term_id = req_attr(e, "term", "id")?;
                if !catalog.ids.contains(&term_id) {
                    catalog.ids.push(term_id.clone());
                }
                let full = catalog.full.entry(term_id).or_default();
                for a in e.attributes() {
                    let a = a?;
                    let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                    if key == "id" {
                        continue;
                    }
                    full.entry(key).or_default().insert(a.unescape_value()?.into_owned());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, schema: &mut Option<Schema>, name: &[u8]) {
        match name {
            b"column" => self.col_code = None,
            b"row" => {
                if let Some((code, row_type)) = self.row.take() {
                    if row_type != "C" {
                        self.sec_formats
                            .insert_row(code, std::mem::take(&mut self.row_cells));
                    }
                }
            }
            b"section" => {
                if let (Some(schema), Some(sec)) = (schema.as_mut(), self.sec_code.take()) {
                    schema
                        .formats
                        .insert_section(sec, std::mem::take(&mut self.sec_formats));
                }
            }
            b"dic" => self.dic_id = None,
            _ => {}
        }
    }
}
