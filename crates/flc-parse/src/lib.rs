pub mod parser;
pub mod period;
pub mod tokenizer;

pub use parser::{
    ArithOp, Expr, ParamFunc, ParseError, Parser, Selector, SliceRef, UnaryFunc, parse,
};
pub use period::{PeriodClause, PeriodExprError};
pub use tokenizer::{CmpOp, CoordGroup, FuncName, LogicOp, Token, TokenError, TokenKind, Tokenizer};
