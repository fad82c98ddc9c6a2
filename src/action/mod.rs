pub mod literal;
pub mod parser;
pub mod types;

pub use parser::parse;
pub use types::{quote_literal, Action, ActionKind, ParsedTurn, PointEncoding, ScrollDirection};
