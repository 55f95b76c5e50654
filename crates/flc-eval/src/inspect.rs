use thiserror::Error;

use flc_model::{Catalogs, FormatRule, Formats, Row};

/// Per-cell format and catalog-membership faults. Codes continue the
/// structural numbering of the format stage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatFault {
    #[error("Специфика отсутствует в справочнике")]
    SpecNotInCatalog,
    #[error("Недопустимое значение специфики")]
    SpecValue,
    #[error("Значение не является числом")]
    NotNumber,
    #[error("Число не соответствует формату")]
    BadNumberFormat,
    #[error("Длина строки больше допустимого")]
    TooLong,
    #[error("Значение отсутствует в справочнике")]
    NotInCatalog,
    #[error("Значение не входит в диапазон допустимых")]
    NotInRange,
    #[error("Значение не входит в список допустимых")]
    NotInList,
}

impl FormatFault {
    pub fn code(&self) -> &'static str {
        match self {
            FormatFault::SpecNotInCatalog => "7",
            FormatFault::SpecValue => "8",
            FormatFault::NotNumber => "9",
            FormatFault::BadNumberFormat => "10",
            FormatFault::TooLong => "11",
            FormatFault::NotInCatalog => "12",
            FormatFault::NotInRange => "13",
            FormatFault::NotInList => "14",
        }
    }
}

/// Checks one cell value against its format mask (`N(i,f)` / `C(n)`) and
/// validation type: 1 — catalog membership, 2 — numeric range, 3 — value
/// list.
pub struct ValueInspector<'a> {
    rule: &'a FormatRule,
    catalogs: &'a Catalogs,
}

impl<'a> ValueInspector<'a> {
    pub fn new(rule: &'a FormatRule, catalogs: &'a Catalogs) -> Self {
        ValueInspector { rule, catalogs }
    }

    pub fn check(&self, value: &str) -> Result<(), FormatFault> {
        self.check_mask(value)?;
        match self.rule.vld_type.as_deref() {
            Some("1") => self.check_catalog(value),
            Some("2") => self.check_range(value),
            Some("3") => self.check_list(value),
            _ => Ok(()),
        }
    }

    fn check_mask(&self, value: &str) -> Result<(), FormatFault> {
        let Some(format) = self.rule.format.as_deref() else {
            return Ok(());
        };
        let Some((alias, args)) = format.trim().trim_end_matches([')', ' ']).split_once('(')
        else {
            return Ok(());
        };
        match alias {
            "N" => Self::check_number(value, args),
            "C" => Self::check_chars(value, args),
            _ => Ok(()),
        }
    }

    /// `N(i,f)` — lengths of the integer and fractional parts.
    fn check_number(value: &str, limits: &str) -> Result<(), FormatFault> {
        if value.parse::<f64>().is_err() {
            return Err(FormatFault::NotNumber);
        }
        let (int_part, frac_part) = match value.split_once('.') {
            Some((int_part, frac_part)) => (int_part.len(), frac_part.len()),
            None => (value.len(), 0),
        };
        let Some((int_limit, frac_limit)) = limits.split_once(',') else {
            return Ok(());
        };
        let (Ok(int_limit), Ok(frac_limit)) =
            (int_limit.trim().parse::<usize>(), frac_limit.trim().parse::<usize>())
        else {
            return Ok(());
        };
        if int_part <= int_limit && frac_part <= frac_limit {
            Ok(())
        } else {
            Err(FormatFault::BadNumberFormat)
        }
    }

    /// `C(n)` — character count cap.
    fn check_chars(value: &str, limit: &str) -> Result<(), FormatFault> {
        let Ok(limit) = limit.trim().parse::<usize>() else {
            return Ok(());
        };
        if value.chars().count() <= limit {
            Ok(())
        } else {
            Err(FormatFault::TooLong)
        }
    }

    fn check_catalog(&self, value: &str) -> Result<(), FormatFault> {
        let known = self
            .rule
            .dic
            .as_deref()
            .and_then(|dic| self.catalogs.get(dic))
            .is_some_and(|catalog| catalog.ids.iter().any(|id| id == value));
        if known {
            Ok(())
        } else {
            Err(FormatFault::NotInCatalog)
        }
    }

    fn check_range(&self, value: &str) -> Result<(), FormatFault> {
        let Ok(value) = value.parse::<f64>() else {
            return Err(FormatFault::NotInRange);
        };
        let bounds = self.rule.vld.as_deref().and_then(|vld| {
            let (start, end) = vld.split_once('-')?;
            Some((
                start.trim().parse::<i64>().ok()?,
                end.trim().parse::<i64>().ok()?,
            ))
        });
        let Some((start, end)) = bounds else {
            return Ok(());
        };
        if value >= start as f64 && value <= end as f64 {
            Ok(())
        } else {
            Err(FormatFault::NotInRange)
        }
    }

    fn check_list(&self, value: &str) -> Result<(), FormatFault> {
        let listed = self
            .rule
            .vld
            .as_deref()
            .is_some_and(|vld| vld.split(',').any(|item| item == value));
        if listed {
            Ok(())
        } else {
            Err(FormatFault::NotInList)
        }
    }
}

/// Checks a row's specifics: 4 — the axis value belongs to the `vld`
/// catalog; 5 — coordinate-linked catalog, where the axis value selects a
/// term whose attribute set must contain the linked axis value.
pub struct SpecInspector<'a> {
    rule: &'a FormatRule,
    catalogs: &'a Catalogs,
}

impl<'a> SpecInspector<'a> {
    pub fn new(rule: &'a FormatRule, catalogs: &'a Catalogs) -> Self {
        SpecInspector { rule, catalogs }
    }

    pub fn check(
        &self,
        row: &Row,
        axis: u8,
        sec: &str,
        formats: &Formats,
    ) -> Result<(), FormatFault> {
        match self.rule.vld_type.as_deref() {
            Some("4") => self.check_catalog(row, axis),
            Some("5") => self.check_linked(row, axis, sec, formats),
            _ => Ok(()),
        }
    }

    fn check_catalog(&self, row: &Row, axis: u8) -> Result<(), FormatFault> {
        let Some(value) = row.spec(axis) else {
            return Err(FormatFault::SpecNotInCatalog);
        };
        let known = self
            .rule
            .vld
            .as_deref()
            .and_then(|dic| self.catalogs.get(dic))
            .is_some_and(|catalog| catalog.ids.iter().any(|id| id == value));
        if known {
            Ok(())
        } else {
            Err(FormatFault::SpecNotInCatalog)
        }
    }

    /// `vld` looks like `okei=#1,2,3`: the attribute name and a coordinate
    /// triple of which only the trailing column code is used.
    fn check_linked(
        &self,
        row: &Row,
        axis: u8,
        sec: &str,
        formats: &Formats,
    ) -> Result<(), FormatFault> {
        let linked = self.rule.vld.as_deref().and_then(|vld| {
            let (attr, coords) = vld.split_once("=#")?;
            let col = coords.rsplit(',').next()?.trim();
            let ctx_axis = formats.spec_axis(sec, col)?;
            Some((attr, ctx_axis))
        });
        let Some((attr, ctx_axis)) = linked else {
            return Err(FormatFault::SpecValue);
        };

        let allowed = (|| {
            let term = row.spec(axis)?;
            let ctx_value = row.spec(ctx_axis)?;
            let catalog = self.catalogs.get(self.rule.dic.as_deref()?)?;
            let attrs = catalog.full.get(term)?.get(attr)?;
            Some(attrs.contains(ctx_value))
        })();
        match allowed {
            Some(true) => Ok(()),
            _ => Err(FormatFault::SpecValue),
        }
    }
}
