pub mod report;
pub mod schema;
pub mod xml;

pub use report::{Column, Report, Row, RowKey, Section};
pub use schema::{Catalog, Catalogs, ControlDef, FormatRule, Formats, Schema, SectionFormats};
pub use xml::XmlError;
