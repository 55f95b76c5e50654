pub mod control;
pub mod elem;
pub mod inspect;
pub mod interp;
pub mod specific;
pub mod validate;

pub use control::{ControlChecker, ControlOutcome};
pub use elem::{ControlFailure, Elem};
pub use inspect::{FormatFault, SpecInspector, ValueInspector};
pub use interp::{ControlParams, EvalError, evaluate};
pub use specific::Specific;
pub use validate::validate;
