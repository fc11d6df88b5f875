//! Query AST for the `txtai` virtual table.
//!
//! Aggregates and `similar()` calls are hoisted out of expressions into slots on
//! [`SelectStatement`]; the expression tree only holds their slot index so the
//! executor can compute each one once and bind the result at evaluation time.

use super::value::Value;

/// Name of the only table queries may select from.
pub const TABLE_NAME: &str = "txtai";

/// Built-in columns of the virtual table.
pub const ID_COLUMN: &str = "id";
pub const TEXT_COLUMN: &str = "text";
pub const DATA_COLUMN: &str = "data";
pub const SCORE_COLUMN: &str = "score";
pub const ENTRY_COLUMN: &str = "entry";

/// Columns produced by `SELECT *`.
pub const WILDCARD_COLUMNS: [&str; 3] = [ID_COLUMN, TEXT_COLUMN, SCORE_COLUMN];

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference; dotted names address nested data keys
    Column(String),
    Literal(Value),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Function {
        func: ScalarFunction,
        args: Vec<Expr>,
    },
    /// Slot into [`SelectStatement::aggregates`]
    Aggregate(usize),
    /// Slot into [`SelectStatement::similar`]; evaluates to candidate membership
    Similar(usize),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// True when the expression references an aggregate slot.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::Similar(_) => false,
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.has_aggregate(),
            Expr::Binary { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Expr::Like { expr, pattern, .. } => expr.has_aggregate() || pattern.has_aggregate(),
            Expr::InList { expr, list, .. } => {
                expr.has_aggregate() || list.iter().any(Expr::has_aggregate)
            }
            Expr::Between {
                expr, low, high, ..
            } => expr.has_aggregate() || low.has_aggregate() || high.has_aggregate(),
            Expr::Function { args, .. } => args.iter().any(Expr::has_aggregate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Lower,
    Upper,
    Length,
    Abs,
}

impl ScalarFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "length" => Some(Self::Length),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunction,
    /// `None` for `count(*)`
    pub arg: Option<Expr>,
    pub distinct: bool,
}

/// A `similar(query[, candidates])` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarCall {
    pub query: String,
    pub candidates: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expr,
    /// Output key in the result row
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub projections: Vec<Projection>,
    pub distinct: bool,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub similar: Vec<SimilarCall>,
    pub aggregates: Vec<AggregateCall>,
}

impl SelectStatement {
    /// Free-text search:
    /// `SELECT id, text, score FROM txtai WHERE similar(query, limit) ORDER BY score DESC LIMIT limit`.
    pub fn similarity(query: &str, limit: usize) -> Self {
        Self {
            projections: WILDCARD_COLUMNS
                .iter()
                .map(|name| Projection {
                    expr: Expr::column(*name),
                    label: (*name).to_string(),
                })
                .collect(),
            filter: Some(Expr::Similar(0)),
            order_by: vec![OrderBy {
                expr: Expr::column(SCORE_COLUMN),
                descending: true,
            }],
            limit: Some(limit),
            similar: vec![SimilarCall {
                query: query.to_string(),
                candidates: Some(limit),
            }],
            ..Self::default()
        }
    }

    pub fn has_similar(&self) -> bool {
        !self.similar.is_empty()
    }

    /// Grouping applies with GROUP BY or when any aggregate is used.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates.is_empty()
    }
}

/// True when `query` should be parsed as SQL rather than treated as free text.
pub fn is_sql(query: &str) -> bool {
    let trimmed = query.trim_start();
    trimmed
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"))
        && trimmed[6..].starts_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sql() {
        assert!(is_sql("select id from txtai"));
        assert!(is_sql("  SELECT\n* from txtai"));
        assert!(!is_sql("selection of stories"));
        assert!(!is_sql("select"));
        assert!(!is_sql("feel good story"));
    }

    #[test]
    fn test_similarity_statement() {
        let statement = SelectStatement::similarity("feel good story", 3);
        assert_eq!(statement.projections.len(), 3);
        assert_eq!(statement.limit, Some(3));
        assert_eq!(statement.similar[0].query, "feel good story");
        assert!(statement.has_similar());
        assert!(!statement.is_grouped());
    }

    #[test]
    fn test_has_aggregate() {
        let expr = Expr::Binary {
            left: Box::new(Expr::Aggregate(0)),
            op: BinaryOp::Gt,
            right: Box::new(Expr::Literal(Value::Integer(0))),
        };
        assert!(expr.has_aggregate());
        assert!(!Expr::column("text").has_aggregate());
    }
}
