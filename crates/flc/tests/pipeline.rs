//! End-to-end runs of the validator pipeline over XML fixtures.

use flc::{ValidationError, validate_xml};

fn schema_xml(controls: &str) -> String {
    format!(
        r#"<metaForm idp="4" obj="okpo">
  <title>
    <item field="okpo" name="Код ОКПО"/>
    <item field="name" name="Наименование организации"/>
  </title>
  <sections>
    <section code="1">
      <columns>
        <column code="1" type="Z"><default-cell inputType="2" format="N(8,2)" vldType="0"/></column>
        <column code="2" type="Z"><default-cell inputType="2" format="N(8,2)" vldType="0"/></column>
        <column code="3" type="Z"><default-cell inputType="2" format="N(8,2)" vldType="0"/></column>
      </columns>
      <rows>
        <row type="Д" code="1"/>
        <row type="Д" code="2"/>
        <row type="Д" code="9"/>
      </rows>
    </section>
  </sections>
  <controls>{controls}</controls>
  <dics>
    <dic id="s_time"><term id="1"/><term id="2"/><term id="3"/><term id="4"/></dic>
  </dics>
</metaForm>"#
    )
}

fn report_xml(year: &str, period: &str, rows: &str) -> String {
    format!(
        r#"<report year="{year}" period="{period}">
  <title>
    <item name="okpo" value="12345678"/>
    <item name="name" value="Организация"/>
  </title>
  <sections>
    <section code="1">{rows}</section>
  </sections>
</report>"#
    )
}

fn rows(r1: &str, r2: &str, r9: &str) -> String {
    format!(
        r#"<row code="1"><col code="3">{r1}</col></row>
           <row code="2"><col code="3">{r2}</col></row>
           <row code="9"><col code="3">{r9}</col></row>"#
    )
}

const SUM_CONTROL: &str = r#"<control id="1.1" name="Итог по графе 3"
    rule="{[1][9][3]} |=| SUM{[1][1-2][3]}" condition=""
    tip="1" fault="0" precision="0"/>"#;

fn codes(errors: &[ValidationError]) -> Vec<&str> {
    errors.iter().map(|e| e.code.as_str()).collect()
}

/* ───────────────────────── seed scenarios ───────────────────────── */

#[test]
fn s1_valid_report_passes_the_whole_pipeline() {
    let errors = validate_xml(
        &schema_xml(""),
        &report_xml("2020", "0401", &rows("4", "5", "9")),
        false,
    );
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn s2_invalid_year_fails_the_attribute_stage() {
    let errors = validate_xml(
        &schema_xml(""),
        &report_xml("1799", "0401", &rows("4", "5", "9")),
        false,
    );
    assert_eq!(codes(&errors), vec!["1.1"]);
}

#[test]
fn s3_sum_control_passes_and_reports_the_delta() {
    let schema = schema_xml(SUM_CONTROL);
    let good = validate_xml(&schema, &report_xml("2020", "0401", &rows("4", "5", "9")), false);
    assert!(good.is_empty(), "unexpected errors: {good:?}");

    // Row 9 bumped by +5: exactly one failure carrying the difference.
    let bad = validate_xml(&schema, &report_xml("2020", "0401", &rows("4", "5", "14")), false);
    assert_eq!(codes(&bad), vec!["4.1.1"]);
    assert!(bad[0].message.contains("слева 14"), "{}", bad[0].message);
    assert!(bad[0].message.contains("справа 9"), "{}", bad[0].message);
    assert!(bad[0].message.contains("разница 5"), "{}", bad[0].message);
    assert!(bad[0].message.contains("обязательность да"), "{}", bad[0].message);
    assert_eq!(bad[0].tip, Some(true));
}

#[test]
fn s4_fault_forgives_small_differences_only() {
    let control = r#"<control id="2" name="Итог" tip="0"
        rule="{[1][9][3]} |=| SUM{[1][1-2][3]}" condition="" fault="10" precision="0"/>"#;
    let schema = schema_xml(control);

    let within = validate_xml(&schema, &report_xml("2020", "0401", &rows("4", "5", "16")), false);
    assert!(within.is_empty(), "difference of 7 is inside fault=10: {within:?}");

    let outside = validate_xml(&schema, &report_xml("2020", "0401", &rows("4", "5", "20")), false);
    assert_eq!(codes(&outside), vec!["4.2"]);
    assert_eq!(outside[0].tip, Some(false));
    assert!(outside[0].message.contains("обязательность нет"));
}

#[test]
fn s5_failed_condition_suppresses_the_rule() {
    let control = r#"<control id="3" name="Условный"
        rule="{[1][9][3]} |=| SUM{[1][1-2][3]}"
        condition="{[1][1][3]} |=| 999" fault="0" precision="0"/>"#;
    // The rule alone would fail (9 + 5 != 20), but the condition gates it.
    let errors = validate_xml(
        &schema_xml(control),
        &report_xml("2020", "0401", &rows("4", "5", "20")),
        false,
    );
    assert!(errors.is_empty(), "condition must gate the rule: {errors:?}");
}

#[test]
fn s6_previous_period_controls_warn_unless_skipped() {
    let control = r#"<control id="4" name="Динамика"
        rule="{{[1][1][3]}} |=| {[1][1][3]}" condition="" fault="0" precision="0"/>"#;
    let schema = schema_xml(control);
    let report = report_xml("2020", "0401", &rows("4", "5", "9"));

    assert!(validate_xml(&schema, &report, true).is_empty());

    let warned = validate_xml(&schema, &report, false);
    assert_eq!(codes(&warned), vec!["4.4"]);
    assert!(warned[0].message.contains("не реализована"));
}

#[test]
fn s7_title_duplicate_stops_before_controls() {
    let report = format!(
        r#"<report year="2020" period="0401">
  <title>
    <item name="okpo" value="12345678"/>
    <item name="okpo" value="12345678"/>
    <item name="name" value="Организация"/>
  </title>
  <sections>
    <section code="1">{}</section>
  </sections>
</report>"#,
        rows("4", "5", "20")
    );
    // The sum control would fail, but the pipeline never gets there.
    let errors = validate_xml(&schema_xml(SUM_CONTROL), &report, false);
    assert_eq!(codes(&errors), vec!["2.2"]);
    assert_eq!(errors[0].name, "Проверка полей заголовка");
}

/* ─────────────────────── attribute stage ────────────────────────── */

#[test]
fn period_type_mismatch_is_reported() {
    let errors = validate_xml(
        &schema_xml(""),
        &report_xml("2020", "0301", &rows("4", "5", "9")),
        false,
    );
    assert_eq!(codes(&errors), vec!["1.2"]);
}

#[test]
fn short_period_is_repaired_through_the_catalog() {
    let errors = validate_xml(
        &schema_xml(""),
        &report_xml("2020", "02", &rows("4", "5", "9")),
        false,
    );
    assert!(errors.is_empty(), "period 02 is admissible: {errors:?}");

    let errors = validate_xml(
        &schema_xml(""),
        &report_xml("2020", "07", &rows("4", "5", "9")),
        false,
    );
    assert_eq!(codes(&errors), vec!["1.3"]);
}

/* ───────────────────────── title stage ──────────────────────────── */

#[test]
fn missing_key_field_and_bad_okpo() {
    let no_okpo = format!(
        r#"<report year="2020" period="0401">
  <title><item name="name" value="Организация"/></title>
  <sections><section code="1">{}</section></sections>
</report>"#,
        rows("4", "5", "9")
    );
    let errors = validate_xml(&schema_xml(""), &no_okpo, false);
    assert_eq!(codes(&errors), vec!["2.5"]);
    assert!(errors[0].message.contains("Код ОКПО"));

    let bad_okpo = report_xml("2020", "0401", &rows("4", "5", "9")).replace("12345678", "1234x");
    let errors = validate_xml(&schema_xml(""), &bad_okpo, false);
    assert_eq!(codes(&errors), vec!["2.4"]);
}

#[test]
fn extra_and_empty_title_fields_accumulate() {
    let report = format!(
        r#"<report year="2020" period="0401">
  <title>
    <item name="okpo" value="12345678"/>
    <item name="name" value=""/>
    <item name="address" value="somewhere"/>
  </title>
  <sections><section code="1">{}</section></sections>
</report>"#,
        rows("4", "5", "9")
    );
    let errors = validate_xml(&schema_xml(""), &report, false);
    let mut got = codes(&errors);
    got.sort();
    assert_eq!(got, vec!["2.1", "2.3"]);
}

/* ───────────────────────── format stage ─────────────────────────── */

#[test]
fn duplicate_rows_fail_the_format_stage() {
    let report = report_xml(
        "2020",
        "0401",
        r#"<row code="1"><col code="3">4</col></row>
           <row code="1"><col code="3">4</col></row>
           <row code="2"><col code="3">5</col></row>
           <row code="9"><col code="3">9</col></row>"#,
    );
    let errors = validate_xml(&schema_xml(""), &report, false);
    assert_eq!(codes(&errors), vec!["3.2"]);
    assert!(errors[0].message.contains("повторяется 2 раз(а)"));
}

#[test]
fn value_faults_accumulate_instead_of_stopping() {
    let report = report_xml("2020", "0401", &rows("abc", "123456789", "9"));
    let errors = validate_xml(&schema_xml(""), &report, false);
    let mut got = codes(&errors);
    got.sort();
    // Not a number, and an integer part longer than N(8,2) allows.
    assert_eq!(got, vec!["3.10", "3.9"]);
}

#[test]
fn missing_section_is_structural() {
    let schema = schema_xml("").replace(
        "</sections>\n  <controls>",
        r#"<section code="2">
      <columns><column code="1" type="Z"><default-cell inputType="2" format="N(8,2)" vldType="0"/></column></columns>
      <rows><row type="Д" code="1"/></rows>
    </section>
  </sections>
  <controls>"#,
    );
    let errors = validate_xml(&schema, &report_xml("2020", "0401", &rows("4", "5", "9")), false);
    assert_eq!(codes(&errors), vec!["3.1"]);
    assert!(errors[0].message.contains("Раздел 2"));
}

#[test]
fn required_cells_must_be_filled() {
    let schema = schema_xml("").replace(
        r#"<row type="Д" code="1"/>"#,
        r#"<row type="Д" code="1"><cell column="3" inputType="1" format="N(8,2)" vldType="0"/></row>"#,
    );

    let missing_row = report_xml(
        "2020",
        "0401",
        r#"<row code="2"><col code="3">5</col></row>
           <row code="9"><col code="3">9</col></row>"#,
    );
    let errors = validate_xml(&schema, &missing_row, false);
    assert_eq!(codes(&errors), vec!["3.3"]);

    let empty_cell = report_xml(
        "2020",
        "0401",
        r#"<row code="1"><col code="1">1</col></row>
           <row code="2"><col code="3">5</col></row>
           <row code="9"><col code="3">9</col></row>"#,
    );
    let errors = validate_xml(&schema, &empty_cell, false);
    assert_eq!(codes(&errors), vec!["3.4"]);
}

#[test]
fn undeclared_row_has_no_rule() {
    let report = report_xml(
        "2020",
        "0401",
        r#"<row code="7"><col code="3">1</col></row>
           <row code="1"><col code="3">4</col></row>
           <row code="2"><col code="3">5</col></row>
           <row code="9"><col code="3">9</col></row>"#,
    );
    let errors = validate_xml(&schema_xml(""), &report, false);
    assert_eq!(codes(&errors), vec!["3.6"]);
    assert!(errors[0].message.contains("строка 7"));
}

#[test]
fn spec_outside_its_catalog_is_caught() {
    let schema = r#"<metaForm idp="4" obj="okpo">
  <title><item field="okpo" name="Код ОКПО"/></title>
  <sections>
    <section code="1">
      <columns>
        <column code="1" type="S" fld="s1"/>
        <column code="2" type="Z"><default-cell inputType="2" format="N(8,2)" vldType="0"/></column>
      </columns>
      <rows>
        <row type="Д" code="1">
          <cell column="1" inputType="2" format="C(10)" vldType="4" vld="s_spec"/>
        </row>
      </rows>
    </section>
  </sections>
  <controls/>
  <dics>
    <dic id="s_spec"><term id="1.1"/><term id="1.2"/></dic>
  </dics>
</metaForm>"#;
    let report = |spec: &str| {
        format!(
            r#"<report year="2020" period="0401">
  <title><item name="okpo" value="12345678"/></title>
  <sections>
    <section code="1">
      <row code="1" s1="{spec}"><col code="2">5</col></row>
    </section>
  </sections>
</report>"#
        )
    };

    assert!(validate_xml(schema, &report("1.2"), false).is_empty());

    let errors = validate_xml(schema, &report("9.9"), false);
    assert_eq!(codes(&errors), vec!["3.7"]);
    assert!(errors[0].message.contains("специфика 1"));
}

/* ──────────────────────── control stage ─────────────────────────── */

#[test]
fn period_gate_skips_the_whole_control() {
    let control = r#"<control id="5" name="Квартальный"
        rule="{[1][9][3]} |=| 0" condition="" periodClause="(&amp;NP in (2,3))"
        fault="0" precision="0"/>"#;
    let errors = validate_xml(
        &schema_xml(control),
        &report_xml("2020", "0401", &rows("4", "5", "9")),
        false,
    );
    assert!(errors.is_empty(), "period 1 is outside (2,3): {errors:?}");
}

#[test]
fn unparsable_rule_is_one_error_per_control() {
    let control = r#"<control id="6" name="Сломанный"
        rule="{[1][9]} |=| 0" condition="" fault="0" precision="0"/>"#;
    let errors = validate_xml(
        &schema_xml(control),
        &report_xml("2020", "0401", &rows("4", "5", "9")),
        false,
    );
    assert_eq!(codes(&errors), vec!["4.6"]);
    assert!(errors[0].message.contains("Ошибка разбора правила контроля"));
}

#[test]
fn blank_report_skips_controls() {
    let report = r#"<report year="2020" period="0401">
  <title>
    <item name="okpo" value="12345678"/>
    <item name="name" value="Организация"/>
  </title>
  <sections><section code="1"/></sections>
</report>"#;
    let errors = validate_xml(&schema_xml(SUM_CONTROL), report, false);
    assert!(errors.is_empty(), "blank reports are not controlled: {errors:?}");
}

#[test]
fn broken_xml_becomes_the_unexpected_record() {
    let errors = validate_xml("<metaForm", "<report/>", false);
    assert_eq!(codes(&errors), vec!["0.0"]);
}
