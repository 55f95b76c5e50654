use smallvec::SmallVec;
use thiserror::Error;

/// Characters the tokenizer silently steps over. The pipe is deliberate:
/// comparison operators arrive wrapped in pipes (`|<=|`) so they cannot be
/// confused with range literals, and dropping the pipes here lets the
/// operator scanner see a plain `<=`.
const IGNORED: &[u8] = b" \t\r\n\x0c|";

#[derive(Debug, Error)]
#[error("{message} (at byte {pos})")]
pub struct TokenError {
    pub message: String,
    pub pos: usize,
}

impl TokenError {
    fn new(message: impl Into<String>, pos: usize) -> Self {
        TokenError {
            message: message.into(),
            pos,
        }
    }
}

/// One comma-separated bracket list, ranges already expanded.
pub type CoordGroup = SmallVec<[String; 4]>;

/// Comparison operators of the DSL (pipe-delimited in source) and of the
/// period clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl CmpOp {
    pub fn parse(text: &str) -> Option<CmpOp> {
        match text {
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            "=" => Some(CmpOp::Eq),
            ">=" => Some(CmpOp::Ge),
            ">" => Some(CmpOp::Gt),
            "<>" => Some(CmpOp::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
            CmpOp::Ne => "<>",
        }
    }

    pub fn eval_f64(self, left: f64, right: f64) -> bool {
        match self {
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Eq => left == right,
            CmpOp::Ge => left >= right,
            CmpOp::Gt => left > right,
            CmpOp::Ne => left != right,
        }
    }

    pub fn eval_i64(self, left: i64, right: i64) -> bool {
        self.eval_f64(left as f64, right as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicOp::And => "and",
            LogicOp::Or => "or",
        }
    }

    pub fn eval(self, left: bool, right: bool) -> bool {
        match self {
            LogicOp::And => left && right,
            LogicOp::Or => left || right,
        }
    }
}

/// Function keywords, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncName {
    Sum,
    Abs,
    Floor,
    Round,
    IsNull,
    NullIf,
    Coalesce,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Num(f64),
    Group(CoordGroup),
    Cmp(CmpOp),
    Logic(LogicOp),
    Func(FuncName),
    Plus,
    Minus,
    Star,
    Slash,
    Comma,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

/// A token with its byte span in the source formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// A tokenizer for control formulas. Whole-formula tokenization happens in
/// `new`; illegal characters are logged and skipped rather than failing
/// the formula.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    offset: usize,
}

impl Tokenizer {
    pub fn new(formula: &str) -> Result<Self, TokenError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            offset: 0,
        };
        tokenizer.scan()?;
        Ok(tokenizer)
    }

    #[inline]
    fn byte(&self, at: usize) -> Option<u8> {
        self.formula.as_bytes().get(at).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.items.push(Token { kind, start, end });
    }

    fn scan(&mut self) -> Result<(), TokenError> {
        while let Some(curr) = self.byte(self.offset) {
            if IGNORED.contains(&curr) {
                self.offset += 1;
                continue;
            }
            match curr {
                b'[' => self.scan_group()?,
                b'0'..=b'9' => self.scan_number(),
                b'<' | b'>' | b'=' => self.scan_comparison()?,
                b'a'..=b'z' | b'A'..=b'Z' => self.scan_word()?,
                _ => self.scan_single(curr),
            }
        }
        Ok(())
    }

    fn scan_single(&mut self, curr: u8) {
        let start = self.offset;
        let kind = match curr {
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b',' => Some(TokenKind::Comma),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            _ => None,
        };
        match kind {
            Some(kind) => {
                self.offset += 1;
                self.push(kind, start, self.offset);
            }
            None => {
                // Not part of the grammar: report and carry on.
                let ch = self.formula[start..].chars().next().unwrap_or('\u{fffd}');
                tracing::warn!(pos = start, %ch, "illegal character in formula, skipped");
                self.offset += ch.len_utf8().max(1);
            }
        }
    }

    /// A bracket list: comma-separated codes, `*`, or `a-b` ranges.
    /// Pure-integer ranges are expanded here; anything with a dot
    /// (`1.1-1.5`) is a catalog range and stays literal.
    fn scan_group(&mut self) -> Result<(), TokenError> {
        let start = self.offset;
        let bytes = self.formula.as_bytes();
        let mut end = self.offset + 1;
        while end < bytes.len() && bytes[end] != b']' {
            end += 1;
        }
        if end == bytes.len() {
            return Err(TokenError::new("unterminated bracket list", start));
        }

        let mut group = CoordGroup::new();
        for item in self.formula[start + 1..end].split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match numeric_range(item) {
                Some((from, to)) => {
                    for code in from..=to {
                        group.push(code.to_string());
                    }
                }
                None => group.push(item.to_string()),
            }
        }
        self.offset = end + 1;
        self.push(TokenKind::Group(group), start, self.offset);
        Ok(())
    }

    fn scan_number(&mut self) {
        let bytes = self.formula.as_bytes();
        let start = self.offset;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len()
            && bytes[end] == b'.'
            && bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit())
        {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        // The digits-and-dot slice always parses.
        let value: f64 = self.formula[start..end].parse().unwrap_or(0.0);
        self.offset = end;
        self.push(TokenKind::Num(value), start, end);
    }

    fn scan_comparison(&mut self) -> Result<(), TokenError> {
        let bytes = self.formula.as_bytes();
        let start = self.offset;
        let mut end = start;
        while end < bytes.len() && end - start < 2 && matches!(bytes[end], b'<' | b'>' | b'=') {
            end += 1;
        }
        let op = CmpOp::parse(&self.formula[start..end])
            .ok_or_else(|| TokenError::new("unknown comparison operator", start))?;
        self.offset = end;
        self.push(TokenKind::Cmp(op), start, end);
        Ok(())
    }

    fn scan_word(&mut self) -> Result<(), TokenError> {
        let bytes = self.formula.as_bytes();
        let start = self.offset;
        let mut end = start;
        while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
            end += 1;
        }
        let word = self.formula[start..end].to_ascii_lowercase();
        let kind = match word.as_str() {
            "sum" => TokenKind::Func(FuncName::Sum),
            "abs" => TokenKind::Func(FuncName::Abs),
            "floor" => TokenKind::Func(FuncName::Floor),
            "round" => TokenKind::Func(FuncName::Round),
            "isnull" => TokenKind::Func(FuncName::IsNull),
            "nullif" => TokenKind::Func(FuncName::NullIf),
            "coalesce" => TokenKind::Func(FuncName::Coalesce),
            "and" => TokenKind::Logic(LogicOp::And),
            "or" => TokenKind::Logic(LogicOp::Or),
            _ => return Err(TokenError::new(format!("unknown word `{word}`"), start)),
        };
        self.offset = end;
        self.push(kind, start, end);
        Ok(())
    }
}

/// `"3-7"` → `Some((3, 7))`; dotted or non-numeric items are not ranges.
fn numeric_range(item: &str) -> Option<(i64, i64)> {
    if item.contains('.') {
        return None;
    }
    let (from, to) = item.split_once('-')?;
    let from: i64 = from.trim().parse().ok()?;
    let to: i64 = to.trim().parse().ok()?;
    Some((from, to))
}
