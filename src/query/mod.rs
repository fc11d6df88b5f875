//! SQL dialect over the `txtai` virtual table with a `similar()` predicate.
//!
//! Queries starting with `SELECT` are parsed with sqlparser and translated into
//! [`SelectStatement`]; anything else is free text and becomes a similarity
//! search over `id, text, score`.

mod ast;
mod executor;
mod parser;
mod value;

use thiserror::Error;

pub use ast::{
    AggregateCall, AggregateFunction, BinaryOp, DATA_COLUMN, ENTRY_COLUMN, Expr, ID_COLUMN,
    OrderBy, Projection, SCORE_COLUMN, ScalarFunction, SelectStatement, SimilarCall, TABLE_NAME,
    TEXT_COLUMN, UnaryOp, WILDCARD_COLUMNS, is_sql,
};
pub use executor::{
    MIN_CANDIDATES, RowSource, Similarity, default_candidates, execute, lookup_data,
};
pub use parser::parse;
pub use value::{Arithmetic, Value};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("SQL syntax error: {message}")]
    Syntax { message: String },

    #[error("Unsupported query feature: {feature}\nSuggestion: Queries support SELECT over a single table with WHERE, GROUP BY, HAVING, ORDER BY and LIMIT")]
    Unsupported { feature: String },

    #[error("Unknown table '{table}'\nSuggestion: Select from the virtual table 'txtai'")]
    UnknownTable { table: String },

    #[error("Invalid argument to {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("Similarity search failed: {reason}")]
    Similarity { reason: String },
}

/// Translates a search request into a statement. `limit` bounds free-text
/// searches and is the default LIMIT for SQL.
pub fn translate(query: &str, limit: usize) -> Result<SelectStatement, QueryError> {
    if is_sql(query) {
        parse(query)
    } else {
        Ok(SelectStatement::similarity(query, limit))
    }
}
