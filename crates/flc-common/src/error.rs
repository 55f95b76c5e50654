use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One entry of the list a validation run produces.
///
/// `code` is composite: the stage number, a dot, and a stage-internal code
/// (for the control stage the internal part is the control id). `name` is
/// the human name of the stage that emitted the entry. Rule failures
/// additionally carry `tip`: whether the failed control was mandatory.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: String,
    pub name: String,
    pub message: String,
    pub tip: Option<bool>,
}

impl ValidationError {
    pub fn new<C, N, M>(code: C, name: N, message: M) -> Self
    where
        C: Into<String>,
        N: Into<String>,
        M: Into<String>,
    {
        ValidationError {
            code: code.into(),
            name: name.into(),
            message: message.into(),
            tip: None,
        }
    }

    pub fn with_tip(mut self, mandatory: bool) -> Self {
        self.tip = Some(mandatory);
        self
    }

    /// The record emitted when a check blows up instead of failing.
    pub fn unexpected() -> Self {
        ValidationError::new(
            "0.0",
            "Непредвиденная ошибка",
            "Не удалось выполнить проверку",
        )
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.name, self.message)?;
        if let Some(mandatory) = self.tip {
            write!(f, " (обязательность {})", if mandatory { "да" } else { "нет" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ValidationError;

    #[test]
    fn display_includes_code_and_tip() {
        let err = ValidationError::new("4.1", "Проверка контролей", "msg").with_tip(true);
        let text = err.to_string();
        assert!(text.starts_with("[4.1]"));
        assert!(text.contains("обязательность да"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn error_round_trips_through_json() {
        let err = ValidationError::new("1.1", "Проверка аттрибутов", "Указан недопустимый год");
        let json = serde_json::to_string(&err).unwrap();
        let back: ValidationError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
