//! Translates sqlparser's AST into a [`SelectStatement`].
//!
//! Only single `SELECT` statements over the `txtai` virtual table are accepted.
//! Aggregate and `similar()` calls are hoisted into statement slots as they are
//! encountered.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::QueryError;
use super::ast::{
    AggregateCall, AggregateFunction, BinaryOp, Expr, OrderBy, Projection, ScalarFunction,
    SelectStatement, SimilarCall, TABLE_NAME, UnaryOp, WILDCARD_COLUMNS,
};
use super::value::Value;

type ParseResult<T> = Result<T, QueryError>;

/// Parses `sql` into a statement over the `txtai` table.
pub fn parse(sql: &str) -> ParseResult<SelectStatement> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql).map_err(|e| QueryError::Syntax {
        message: e.to_string(),
    })?;

    let mut statements = statements.into_iter();
    let statement = match (statements.next(), statements.next()) {
        (Some(statement), None) => statement,
        (None, _) => {
            return Err(QueryError::Syntax {
                message: "empty query".to_string(),
            });
        }
        (Some(_), Some(_)) => return Err(unsupported("multiple statements")),
    };

    match statement {
        sp::Statement::Query(query) => Translator::default().query(&query),
        other => Err(unsupported(format!("statement: {}", first_word(&other.to_string())))),
    }
}

fn unsupported(feature: impl Into<String>) -> QueryError {
    QueryError::Unsupported {
        feature: feature.into(),
    }
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or(text)
}

/// Clause being translated; controls where aggregates are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Projection,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Aggregate,
}

#[derive(Debug, Default)]
struct Translator {
    similar: Vec<SimilarCall>,
    aggregates: Vec<AggregateCall>,
}

impl Translator {
    fn query(mut self, query: &sp::Query) -> ParseResult<SelectStatement> {
        if query.with.is_some() {
            return Err(unsupported("WITH"));
        }
        let select = match query.body.as_ref() {
            sp::SetExpr::Select(select) => select,
            sp::SetExpr::Query(_) => return Err(unsupported("subqueries")),
            sp::SetExpr::SetOperation { .. } => return Err(unsupported("set operations")),
            _ => return Err(unsupported("non-SELECT query body")),
        };

        self.from(&select.from)?;

        let distinct = match &select.distinct {
            None => false,
            Some(sp::Distinct::Distinct) => true,
            Some(sp::Distinct::On(_)) => return Err(unsupported("DISTINCT ON")),
        };

        let mut projections = Vec::new();
        for item in &select.projection {
            self.projection(item, &mut projections)?;
        }

        let filter = select
            .selection
            .as_ref()
            .map(|e| self.expr(e, Clause::Where))
            .transpose()?;

        let group_by = match &select.group_by {
            sp::GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(|e| self.expr(e, Clause::GroupBy))
                .collect::<ParseResult<Vec<_>>>()?,
            sp::GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
        };

        let having = select
            .having
            .as_ref()
            .map(|e| self.expr(e, Clause::Having))
            .transpose()?;

        let order_by = match &query.order_by {
            None => Vec::new(),
            Some(order_by) => match &order_by.kind {
                sp::OrderByKind::Expressions(exprs) => exprs
                    .iter()
                    .map(|e| self.order_by(e, &projections))
                    .collect::<ParseResult<Vec<_>>>()?,
                sp::OrderByKind::All(_) => return Err(unsupported("ORDER BY ALL")),
            },
        };

        let (limit, offset) = match &query.limit_clause {
            None => (None, None),
            Some(sp::LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            }) => {
                if !limit_by.is_empty() {
                    return Err(unsupported("LIMIT BY"));
                }
                let limit = limit.as_ref().map(|e| count_literal(e, "LIMIT")).transpose()?;
                let offset = offset
                    .as_ref()
                    .map(|o| count_literal(&o.value, "OFFSET"))
                    .transpose()?;
                (limit, offset)
            }
            Some(sp::LimitClause::OffsetCommaLimit { offset, limit }) => (
                Some(count_literal(limit, "LIMIT")?),
                Some(count_literal(offset, "OFFSET")?),
            ),
        };

        Ok(SelectStatement {
            projections,
            distinct,
            filter,
            group_by,
            having,
            order_by,
            limit,
            offset,
            similar: self.similar,
            aggregates: self.aggregates,
        })
    }

    fn from(&self, from: &[sp::TableWithJoins]) -> ParseResult<()> {
        let table = match from {
            [] => return Err(unsupported("SELECT without FROM")),
            [table] => table,
            _ => return Err(unsupported("joins")),
        };
        if !table.joins.is_empty() {
            return Err(unsupported("joins"));
        }
        match &table.relation {
            sp::TableFactor::Table { name, .. } => {
                let name = name.to_string();
                if name.eq_ignore_ascii_case(TABLE_NAME) {
                    Ok(())
                } else {
                    Err(QueryError::UnknownTable { table: name })
                }
            }
            sp::TableFactor::Derived { .. } => Err(unsupported("subqueries")),
            other => Err(unsupported(format!("table source: {other}"))),
        }
    }

    fn projection(&mut self, item: &sp::SelectItem, out: &mut Vec<Projection>) -> ParseResult<()> {
        match item {
            sp::SelectItem::UnnamedExpr(e) => {
                let expr = self.expr(e, Clause::Projection)?;
                let label = match &expr {
                    Expr::Column(name) => name.clone(),
                    _ => e.to_string(),
                };
                out.push(Projection { expr, label });
            }
            sp::SelectItem::ExprWithAlias { expr, alias } => {
                out.push(Projection {
                    expr: self.expr(expr, Clause::Projection)?,
                    label: alias.value.clone(),
                });
            }
            sp::SelectItem::Wildcard(_) => out.extend(wildcard()),
            sp::SelectItem::QualifiedWildcard(kind, _) => match kind {
                sp::SelectItemQualifiedWildcardKind::ObjectName(name) => {
                    let qualifier = name.to_string();
                    if !qualifier.eq_ignore_ascii_case(TABLE_NAME) {
                        return Err(QueryError::UnknownTable { table: qualifier });
                    }
                    out.extend(wildcard());
                }
                sp::SelectItemQualifiedWildcardKind::Expr(_) => {
                    return Err(unsupported("qualified wildcard on expression"));
                }
            },
        }
        Ok(())
    }

    /// ORDER BY accepts projection aliases and 1-based projection positions.
    fn order_by(&mut self, item: &sp::OrderByExpr, projections: &[Projection]) -> ParseResult<OrderBy> {
        let descending = item.options.asc == Some(false);

        let expr = match &item.expr {
            sp::Expr::Identifier(ident) => projections
                .iter()
                .find(|p| p.label == ident.value)
                .map(|p| p.expr.clone()),
            sp::Expr::Value(sp::ValueWithSpan {
                value: sp::Value::Number(n, _),
                ..
            }) => {
                let position: usize = n.parse().map_err(|_| QueryError::InvalidArgument {
                    function: "ORDER BY".to_string(),
                    reason: format!("'{n}' is not a column position"),
                })?;
                match position.checked_sub(1).and_then(|i| projections.get(i)) {
                    Some(p) => Some(p.expr.clone()),
                    None => {
                        return Err(QueryError::InvalidArgument {
                            function: "ORDER BY".to_string(),
                            reason: format!("position {position} is out of range"),
                        });
                    }
                }
            }
            _ => None,
        };

        let expr = match expr {
            Some(expr) => expr,
            None => self.expr(&item.expr, Clause::OrderBy)?,
        };
        Ok(OrderBy { expr, descending })
    }

    fn expr(&mut self, expr: &sp::Expr, clause: Clause) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(ident) => Ok(Expr::Column(ident.value.clone())),
            sp::Expr::CompoundIdentifier(idents) => {
                let mut parts: Vec<&str> = idents.iter().map(|i| i.value.as_str()).collect();
                if parts.len() > 1 && parts[0].eq_ignore_ascii_case(TABLE_NAME) {
                    parts.remove(0);
                }
                Ok(Expr::Column(parts.join(".")))
            }
            sp::Expr::Value(value) => literal(&value.value).map(Expr::Literal),
            sp::Expr::Nested(inner) => self.expr(inner, clause),
            sp::Expr::UnaryOp { op, expr } => {
                let op = match op {
                    sp::UnaryOperator::Not => UnaryOp::Not,
                    sp::UnaryOperator::Minus => UnaryOp::Minus,
                    sp::UnaryOperator::Plus => UnaryOp::Plus,
                    other => return Err(unsupported(format!("operator {other}"))),
                };
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(self.expr(expr, clause)?),
                })
            }
            sp::Expr::BinaryOp { left, op, right } => {
                let op = binary_op(op)?;
                Ok(Expr::Binary {
                    left: Box::new(self.expr(left, clause)?),
                    op,
                    right: Box::new(self.expr(right, clause)?),
                })
            }
            sp::Expr::Like {
                negated,
                expr,
                pattern,
                ..
            }
            | sp::Expr::ILike {
                negated,
                expr,
                pattern,
                ..
            } => Ok(Expr::Like {
                expr: Box::new(self.expr(expr, clause)?),
                pattern: Box::new(self.expr(pattern, clause)?),
                negated: *negated,
            }),
            sp::Expr::InList {
                expr,
                list,
                negated,
            } => Ok(Expr::InList {
                expr: Box::new(self.expr(expr, clause)?),
                list: list
                    .iter()
                    .map(|e| self.expr(e, clause))
                    .collect::<ParseResult<Vec<_>>>()?,
                negated: *negated,
            }),
            sp::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Expr::Between {
                expr: Box::new(self.expr(expr, clause)?),
                low: Box::new(self.expr(low, clause)?),
                high: Box::new(self.expr(high, clause)?),
                negated: *negated,
            }),
            sp::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.expr(inner, clause)?),
                negated: false,
            }),
            sp::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.expr(inner, clause)?),
                negated: true,
            }),
            sp::Expr::Function(function) => self.function(function, clause),
            sp::Expr::Subquery(_) | sp::Expr::InSubquery { .. } | sp::Expr::Exists { .. } => {
                Err(unsupported("subqueries"))
            }
            other => Err(unsupported(format!("expression {other}"))),
        }
    }

    fn function(&mut self, function: &sp::Function, clause: Clause) -> ParseResult<Expr> {
        let name = function.name.to_string().to_lowercase();
        if function.over.is_some() {
            return Err(unsupported("window functions"));
        }
        if function.filter.is_some() {
            return Err(unsupported("aggregate FILTER"));
        }

        let (args, distinct) = match &function.args {
            sp::FunctionArguments::None => (Vec::new(), false),
            sp::FunctionArguments::Subquery(_) => return Err(unsupported("subqueries")),
            sp::FunctionArguments::List(list) => (
                list.args.iter().collect::<Vec<_>>(),
                matches!(list.duplicate_treatment, Some(sp::DuplicateTreatment::Distinct)),
            ),
        };

        if name == "similar" {
            return self.similar(&args);
        }

        if let Some(func) = AggregateFunction::from_name(&name) {
            return self.aggregate(func, &name, &args, distinct, clause);
        }

        let func = ScalarFunction::from_name(&name)
            .ok_or_else(|| unsupported(format!("function {name}()")))?;
        if args.len() != 1 {
            return Err(QueryError::InvalidArgument {
                function: name,
                reason: format!("expected 1 argument, found {}", args.len()),
            });
        }
        let arg = self.argument(args[0], &name, clause)?;
        Ok(Expr::Function {
            func,
            args: vec![arg],
        })
    }

    fn aggregate(
        &mut self,
        func: AggregateFunction,
        name: &str,
        args: &[&sp::FunctionArg],
        distinct: bool,
        clause: Clause,
    ) -> ParseResult<Expr> {
        match clause {
            Clause::Where | Clause::GroupBy => {
                return Err(unsupported(format!("aggregate {name}() outside SELECT, HAVING or ORDER BY")));
            }
            Clause::Aggregate => return Err(unsupported("nested aggregates")),
            Clause::Projection | Clause::Having | Clause::OrderBy => {}
        }

        let arg = match args {
            [arg] if is_wildcard(arg) => {
                if func != AggregateFunction::Count {
                    return Err(QueryError::InvalidArgument {
                        function: name.to_string(),
                        reason: "'*' is only valid in count(*)".to_string(),
                    });
                }
                None
            }
            [arg] => Some(self.argument(arg, name, Clause::Aggregate)?),
            _ => {
                return Err(QueryError::InvalidArgument {
                    function: name.to_string(),
                    reason: format!("expected 1 argument, found {}", args.len()),
                });
            }
        };

        let call = AggregateCall {
            func,
            arg,
            distinct,
        };
        let slot = match self.aggregates.iter().position(|a| *a == call) {
            Some(slot) => slot,
            None => {
                self.aggregates.push(call);
                self.aggregates.len() - 1
            }
        };
        Ok(Expr::Aggregate(slot))
    }

    fn similar(&mut self, args: &[&sp::FunctionArg]) -> ParseResult<Expr> {
        let invalid = |reason: String| QueryError::InvalidArgument {
            function: "similar".to_string(),
            reason,
        };

        let (query, candidates) = match args {
            [query] => (*query, None),
            [query, candidates] => (*query, Some(*candidates)),
            _ => return Err(invalid(format!("expected 1 or 2 arguments, found {}", args.len()))),
        };

        let query = match argument_expr(query) {
            Some(sp::Expr::Value(sp::ValueWithSpan {
                value: sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s),
                ..
            })) => s.clone(),
            _ => return Err(invalid("the query must be a string literal".to_string())),
        };

        let candidates = match candidates {
            None => None,
            Some(arg) => match argument_expr(arg) {
                Some(e) => Some(count_literal(e, "similar")?),
                None => return Err(invalid("the candidate count must be an integer".to_string())),
            },
        };

        self.similar.push(SimilarCall { query, candidates });
        Ok(Expr::Similar(self.similar.len() - 1))
    }

    fn argument(&mut self, arg: &sp::FunctionArg, function: &str, clause: Clause) -> ParseResult<Expr> {
        match argument_expr(arg) {
            Some(e) => self.expr(e, clause),
            None => Err(QueryError::InvalidArgument {
                function: function.to_string(),
                reason: "wildcard arguments are not supported".to_string(),
            }),
        }
    }
}

fn wildcard() -> impl Iterator<Item = Projection> {
    WILDCARD_COLUMNS.iter().map(|name| Projection {
        expr: Expr::column(*name),
        label: (*name).to_string(),
    })
}

fn argument_expr(arg: &sp::FunctionArg) -> Option<&sp::Expr> {
    let arg = match arg {
        sp::FunctionArg::Unnamed(arg)
        | sp::FunctionArg::Named { arg, .. }
        | sp::FunctionArg::ExprNamed { arg, .. } => arg,
    };
    match arg {
        sp::FunctionArgExpr::Expr(e) => Some(e),
        sp::FunctionArgExpr::QualifiedWildcard(_) | sp::FunctionArgExpr::Wildcard => None,
    }
}

fn is_wildcard(arg: &sp::FunctionArg) -> bool {
    matches!(
        arg,
        sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard | sp::FunctionArgExpr::QualifiedWildcard(_))
    )
}

fn literal(value: &sp::Value) -> ParseResult<Value> {
    match value {
        sp::Value::Number(n, _) => match n.parse::<i64>() {
            Ok(i) => Ok(Value::Integer(i)),
            Err(_) => n.parse::<f64>().map(Value::Float).map_err(|_| QueryError::Syntax {
                message: format!("invalid number literal '{n}'"),
            }),
        },
        sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => Ok(Value::Text(s.clone())),
        sp::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sp::Value::Null => Ok(Value::Null),
        other => Err(unsupported(format!("literal {other}"))),
    }
}

/// Non-negative integer literal used by LIMIT, OFFSET and candidate counts.
fn count_literal(expr: &sp::Expr, context: &str) -> ParseResult<usize> {
    match expr {
        sp::Expr::Value(sp::ValueWithSpan {
            value: sp::Value::Number(n, _),
            ..
        }) => n.parse::<usize>().map_err(|_| QueryError::InvalidArgument {
            function: context.to_string(),
            reason: format!("'{n}' is not a non-negative integer"),
        }),
        other => Err(QueryError::InvalidArgument {
            function: context.to_string(),
            reason: format!("expected an integer literal, found '{other}'"),
        }),
    }
}

fn binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOp> {
    Ok(match op {
        sp::BinaryOperator::And => BinaryOp::And,
        sp::BinaryOperator::Or => BinaryOp::Or,
        sp::BinaryOperator::Eq => BinaryOp::Eq,
        sp::BinaryOperator::NotEq => BinaryOp::NotEq,
        sp::BinaryOperator::Lt => BinaryOp::Lt,
        sp::BinaryOperator::LtEq => BinaryOp::LtEq,
        sp::BinaryOperator::Gt => BinaryOp::Gt,
        sp::BinaryOperator::GtEq => BinaryOp::GtEq,
        sp::BinaryOperator::Plus => BinaryOp::Plus,
        sp::BinaryOperator::Minus => BinaryOp::Minus,
        sp::BinaryOperator::Multiply => BinaryOp::Multiply,
        sp::BinaryOperator::Divide => BinaryOp::Divide,
        sp::BinaryOperator::Modulo => BinaryOp::Modulo,
        sp::BinaryOperator::StringConcat => BinaryOp::Concat,
        other => return Err(unsupported(format!("operator {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_columns() {
        let statement = parse("select id, text, data, entry from txtai").unwrap();
        let labels: Vec<_> = statement.projections.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["id", "text", "data", "entry"]);
        assert!(!statement.has_similar());
    }

    #[test]
    fn test_wildcard_expands() {
        let statement = parse("SELECT * FROM txtai").unwrap();
        let labels: Vec<_> = statement.projections.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["id", "text", "score"]);
    }

    #[test]
    fn test_similar_and_grouping() {
        let statement = parse(
            "select id, text, score from txtai where similar('feel good story', 50) \
             group by text having count(*) > 0 order by score desc limit 1",
        )
        .unwrap();

        assert_eq!(
            statement.similar,
            vec![SimilarCall {
                query: "feel good story".to_string(),
                candidates: Some(50),
            }]
        );
        assert_eq!(statement.filter, Some(Expr::Similar(0)));
        assert_eq!(statement.group_by, vec![Expr::column("text")]);
        assert_eq!(statement.aggregates.len(), 1);
        assert_eq!(statement.aggregates[0].arg, None);
        assert_eq!(statement.limit, Some(1));
        assert!(statement.order_by[0].descending);
    }

    #[test]
    fn test_count_label() {
        let statement = parse("select count(*) from txtai").unwrap();
        assert_eq!(statement.projections[0].label, "count(*)");
        assert_eq!(statement.projections[0].expr, Expr::Aggregate(0));
    }

    #[test]
    fn test_duplicate_aggregates_share_a_slot() {
        let statement =
            parse("select count(*) from txtai group by text having count(*) > 1").unwrap();
        assert_eq!(statement.aggregates.len(), 1);
    }

    #[test]
    fn test_dotted_columns() {
        let statement = parse("select txtai.text, meta.author from txtai").unwrap();
        assert_eq!(statement.projections[0].expr, Expr::column("text"));
        assert_eq!(statement.projections[1].expr, Expr::column("meta.author"));
    }

    #[test]
    fn test_limit_offset() {
        let statement = parse("select id from txtai limit 5 offset 2").unwrap();
        assert_eq!((statement.limit, statement.offset), (Some(5), Some(2)));
    }

    #[test]
    fn test_order_by_alias_and_position() {
        let statement = parse("select length(text) as size, id from txtai order by size, 2 desc").unwrap();
        assert!(matches!(statement.order_by[0].expr, Expr::Function { .. }));
        assert_eq!(statement.order_by[1].expr, Expr::column("id"));
        assert!(statement.order_by[1].descending);
    }

    #[test]
    fn test_syntax_error() {
        let err = parse("select * from txtai where bad,query").unwrap_err();
        assert!(matches!(err, QueryError::Syntax { .. }));
    }

    #[test]
    fn test_unsupported_shapes() {
        assert!(matches!(
            parse("select * from documents"),
            Err(QueryError::UnknownTable { .. })
        ));
        assert!(matches!(
            parse("select * from txtai a join txtai b on a.id = b.id"),
            Err(QueryError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("select * from txtai; select * from txtai"),
            Err(QueryError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("select * from txtai where id in (select id from txtai)"),
            Err(QueryError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("select * from txtai where count(*) > 1"),
            Err(QueryError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("delete from txtai"),
            Err(QueryError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_similar_arguments() {
        assert!(matches!(
            parse("select id from txtai where similar(text)"),
            Err(QueryError::InvalidArgument { .. })
        ));
        assert!(matches!(
            parse("select id from txtai where similar('a', 'b')"),
            Err(QueryError::InvalidArgument { .. })
        ));
    }
}
