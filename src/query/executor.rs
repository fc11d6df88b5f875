//! Evaluates a [`SelectStatement`] over a [`RowSource`].
//!
//! Execution runs every `similar()` search first, filters the candidate union
//! (or the full table when the statement has no similarity predicate), then
//! groups, applies HAVING, sorts, deduplicates, and slices.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Map;

use super::QueryError;
use super::ast::{
    AggregateCall, AggregateFunction, BinaryOp, Expr, ScalarFunction, SCORE_COLUMN,
    SelectStatement, UnaryOp,
};
use super::value::{Arithmetic, Value};
use crate::types::{ResultRow, RowId};

/// Minimum number of candidates fetched for a `similar()` call without an
/// explicit count.
pub const MIN_CANDIDATES: usize = 100;

/// Rows of the virtual table.
pub trait RowSource {
    /// Live row ids in insertion order.
    fn row_ids(&self) -> Vec<RowId>;

    fn contains(&self, row: RowId) -> bool;

    /// Value of column `name` for `row`. `score` is bound by the executor;
    /// unknown columns are NULL.
    fn column(&self, row: RowId, name: &str) -> Value;
}

/// Nearest-neighbor search backing `similar()`.
pub trait Similarity {
    /// Up to `candidates` rows ranked by score descending.
    fn search(&self, query: &str, candidates: usize) -> Result<Vec<(RowId, f32)>, QueryError>;
}

impl<F> Similarity for F
where
    F: Fn(&str, usize) -> Result<Vec<(RowId, f32)>, QueryError>,
{
    fn search(&self, query: &str, candidates: usize) -> Result<Vec<(RowId, f32)>, QueryError> {
        self(query, candidates)
    }
}

/// Candidate count for a `similar()` call without an explicit count.
pub fn default_candidates(limit: usize) -> usize {
    limit.saturating_mul(10).max(MIN_CANDIDATES)
}

/// Looks up `name` in a row's data object. Exact keys win over dotted paths;
/// a leading `data.` segment addresses the object itself.
pub fn lookup_data(data: &Map<String, serde_json::Value>, name: &str) -> Value {
    if let Some(value) = data.get(name) {
        return Value::from_json(value);
    }

    let path = name.strip_prefix("data.").unwrap_or(name);
    if let Some(value) = data.get(path) {
        return Value::from_json(value);
    }

    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Value::Null;
    };
    let mut current = match data.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for part in parts {
        current = match current {
            serde_json::Value::Object(map) => match map.get(part) {
                Some(value) => value,
                None => return Value::Null,
            },
            serde_json::Value::Array(items) => match part.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    Value::from_json(current)
}

/// Runs `statement`. `limit` applies when the statement has no LIMIT clause.
pub fn execute(
    statement: &SelectStatement,
    source: &dyn RowSource,
    similarity: &dyn Similarity,
    limit: usize,
) -> Result<Vec<ResultRow>, QueryError> {
    Executor {
        statement,
        source,
        patterns: RefCell::new(HashMap::new()),
    }
    .run(similarity, limit)
}

/// A row flowing through the pipeline with its bound similarity state.
#[derive(Debug)]
struct Candidate {
    row: RowId,
    score: Option<f64>,
    matches: Vec<bool>,
}

#[derive(Debug)]
struct Group<'a> {
    rows: Vec<&'a Candidate>,
    aggregates: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Row(&'a Candidate),
    Group(&'a Group<'a>),
}

impl<'a> Scope<'a> {
    fn first(self) -> Option<&'a Candidate> {
        match self {
            Scope::Row(candidate) => Some(candidate),
            Scope::Group(group) => group.rows.first().copied(),
        }
    }
}

struct Executor<'a> {
    statement: &'a SelectStatement,
    source: &'a dyn RowSource,
    patterns: RefCell<HashMap<String, Regex>>,
}

impl Executor<'_> {
    fn run(&self, similarity: &dyn Similarity, limit: usize) -> Result<Vec<ResultRow>, QueryError> {
        let statement = self.statement;
        let limit = statement.limit.unwrap_or(limit);

        let candidates = self.candidates(similarity, limit)?;

        let mut filtered = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let keep = match &statement.filter {
                Some(filter) => self.eval(filter, Scope::Row(candidate))?.truthy() == Some(true),
                None => true,
            };
            if keep {
                filtered.push(candidate);
            }
        }

        let groups = if statement.is_grouped() {
            self.group(&filtered)?
        } else {
            Vec::new()
        };
        let mut scopes: Vec<Scope<'_>> = if statement.is_grouped() {
            groups.iter().map(Scope::Group).collect()
        } else {
            filtered.iter().copied().map(Scope::Row).collect()
        };

        if let Some(having) = &statement.having {
            let mut kept = Vec::with_capacity(scopes.len());
            for scope in scopes {
                if self.eval(having, scope)?.truthy() == Some(true) {
                    kept.push(scope);
                }
            }
            scopes = kept;
        }

        if !statement.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(scopes.len());
            for scope in scopes {
                let keys = statement
                    .order_by
                    .iter()
                    .map(|order| self.eval(&order.expr, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                keyed.push((keys, scope));
            }
            // Stable: ties keep the default order
            keyed.sort_by(|(a, _), (b, _)| {
                statement
                    .order_by
                    .iter()
                    .zip(a.iter().zip(b))
                    .map(|(order, (x, y))| {
                        let ordering = x.sort_cmp(y);
                        if order.descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            scopes = keyed.into_iter().map(|(_, scope)| scope).collect();
        }

        let offset = statement.offset.unwrap_or(0);
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for scope in scopes {
            let values = statement
                .projections
                .iter()
                .map(|projection| self.eval(&projection.expr, scope))
                .collect::<Result<Vec<_>, _>>()?;

            if statement.distinct {
                let key: Vec<String> = values.iter().map(Value::group_key).collect();
                if !seen.insert(key) {
                    continue;
                }
            }

            results.push(values);
        }

        Ok(results
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|values| {
                statement
                    .projections
                    .iter()
                    .zip(values)
                    .map(|(projection, value)| (projection.label.clone(), value.to_json()))
                    .collect::<ResultRow>()
            })
            .collect())
    }

    /// Binds similarity scores and produces rows in their default order.
    fn candidates(&self, similarity: &dyn Similarity, limit: usize) -> Result<Vec<Candidate>, QueryError> {
        let statement = self.statement;

        if !statement.has_similar() {
            return Ok(self
                .source
                .row_ids()
                .into_iter()
                .map(|row| Candidate {
                    row,
                    score: None,
                    matches: Vec::new(),
                })
                .collect());
        }

        let calls = statement.similar.len();
        let mut bound: HashMap<RowId, Vec<Option<f32>>> = HashMap::new();
        for (slot, call) in statement.similar.iter().enumerate() {
            let candidates = call.candidates.unwrap_or_else(|| default_candidates(limit));
            let hits = similarity.search(&call.query, candidates)?;
            tracing::debug!(
                "similar('{}') bound {} of {} candidates",
                call.query,
                hits.len(),
                candidates
            );
            for (row, score) in hits {
                if !self.source.contains(row) {
                    continue;
                }
                bound.entry(row).or_insert_with(|| vec![None; calls])[slot] = Some(score);
            }
        }

        let mut candidates: Vec<Candidate> = bound
            .into_iter()
            .map(|(row, scores)| {
                let matched: Vec<f64> = scores.iter().flatten().map(|s| f64::from(*s)).collect();
                let score = (!matched.is_empty()).then(|| matched.iter().sum::<f64>() / matched.len() as f64);
                Candidate {
                    row,
                    score,
                    matches: scores.iter().map(Option::is_some).collect(),
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.score.unwrap_or(f64::NEG_INFINITY))
                .then(a.row.cmp(&b.row))
        });
        Ok(candidates)
    }

    /// Groups rows by the GROUP BY keys in first-seen order and computes every
    /// aggregate slot per group. Aggregates without GROUP BY form one group.
    fn group<'c>(&self, rows: &[&'c Candidate]) -> Result<Vec<Group<'c>>, QueryError> {
        let statement = self.statement;

        let mut order: Vec<Vec<String>> = Vec::new();
        let mut members: HashMap<Vec<String>, Vec<&'c Candidate>> = HashMap::new();
        if statement.group_by.is_empty() {
            order.push(Vec::new());
            members.insert(Vec::new(), rows.to_vec());
        } else {
            for &candidate in rows {
                let key = statement
                    .group_by
                    .iter()
                    .map(|expr| self.eval(expr, Scope::Row(candidate)).map(|v| v.group_key()))
                    .collect::<Result<Vec<_>, _>>()?;
                match members.get_mut(&key) {
                    Some(group) => group.push(candidate),
                    None => {
                        order.push(key.clone());
                        members.insert(key, vec![candidate]);
                    }
                }
            }
        }

        let mut groups = Vec::with_capacity(order.len());
        for key in order {
            let rows = members.remove(&key).unwrap_or_default();
            let aggregates = statement
                .aggregates
                .iter()
                .map(|call| self.aggregate(call, &rows))
                .collect::<Result<Vec<_>, _>>()?;
            groups.push(Group { rows, aggregates });
        }
        Ok(groups)
    }

    fn aggregate(&self, call: &AggregateCall, rows: &[&Candidate]) -> Result<Value, QueryError> {
        let Some(arg) = &call.arg else {
            return Ok(Value::Integer(rows.len() as i64));
        };

        let mut values = Vec::with_capacity(rows.len());
        let mut seen = HashSet::new();
        for candidate in rows {
            let value = self.eval(arg, Scope::Row(candidate))?;
            if value.is_null() || (call.distinct && !seen.insert(value.group_key())) {
                continue;
            }
            values.push(value);
        }

        Ok(match call.func {
            AggregateFunction::Count => Value::Integer(values.len() as i64),
            AggregateFunction::Sum => sum(&values),
            AggregateFunction::Avg => {
                let numbers: Vec<f64> = values.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggregateFunction::Min => values
                .into_iter()
                .min_by(|a, b| a.sort_cmp(b))
                .unwrap_or(Value::Null),
            AggregateFunction::Max => values
                .into_iter()
                .max_by(|a, b| a.sort_cmp(b))
                .unwrap_or(Value::Null),
        })
    }

    fn eval(&self, expr: &Expr, scope: Scope<'_>) -> Result<Value, QueryError> {
        Ok(match expr {
            Expr::Column(name) => match scope.first() {
                None => Value::Null,
                Some(candidate) if name.eq_ignore_ascii_case(SCORE_COLUMN) => {
                    candidate.score.map_or(Value::Null, Value::Float)
                }
                Some(candidate) => self.source.column(candidate.row, name),
            },
            Expr::Literal(value) => value.clone(),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, scope)?;
                match op {
                    UnaryOp::Not => Value::from(value.truthy().map(|b| !b)),
                    UnaryOp::Minus => value.negate(),
                    UnaryOp::Plus => value,
                }
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right, scope)?,
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = self.eval(expr, scope)?.to_text();
                let pattern = self.eval(pattern, scope)?.to_text();
                match (value, pattern) {
                    (Some(value), Some(pattern)) => {
                        Value::Boolean(self.like(&value, &pattern)? != *negated)
                    }
                    _ => Value::Null,
                }
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, scope)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut unknown = false;
                let mut found = false;
                for item in list {
                    match value.compare(&self.eval(item, scope)?) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        None => unknown = true,
                        Some(_) => {}
                    }
                }
                if found {
                    Value::Boolean(!negated)
                } else if unknown {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                }
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr, scope)?;
                let above = value.compare(&self.eval(low, scope)?).map(|o| o != Ordering::Less);
                let below = value.compare(&self.eval(high, scope)?).map(|o| o != Ordering::Greater);
                let within = and(above, below);
                Value::from(within.map(|b| b != *negated))
            }
            Expr::IsNull { expr, negated } => Value::Boolean(self.eval(expr, scope)?.is_null() != *negated),
            Expr::Function { func, args } => {
                let value = match args.first() {
                    Some(arg) => self.eval(arg, scope)?,
                    None => Value::Null,
                };
                scalar(*func, value)
            }
            Expr::Aggregate(slot) => match scope {
                Scope::Group(group) => group.aggregates.get(*slot).cloned().unwrap_or(Value::Null),
                Scope::Row(_) => Value::Null,
            },
            Expr::Similar(slot) => match scope.first() {
                Some(candidate) => Value::Boolean(candidate.matches.get(*slot).copied().unwrap_or(false)),
                None => Value::Null,
            },
        })
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr, scope: Scope<'_>) -> Result<Value, QueryError> {
        let a = self.eval(left, scope)?;
        let b = self.eval(right, scope)?;

        let compare = |accept: fn(Ordering) -> bool| Value::from(a.compare(&b).map(accept));

        Ok(match op {
            BinaryOp::And => Value::from(and(a.truthy(), b.truthy())),
            BinaryOp::Or => Value::from(match (a.truthy(), b.truthy()) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }),
            BinaryOp::Eq => compare(|o| o == Ordering::Equal),
            BinaryOp::NotEq => compare(|o| o != Ordering::Equal),
            BinaryOp::Lt => compare(|o| o == Ordering::Less),
            BinaryOp::LtEq => compare(|o| o != Ordering::Greater),
            BinaryOp::Gt => compare(|o| o == Ordering::Greater),
            BinaryOp::GtEq => compare(|o| o != Ordering::Less),
            BinaryOp::Plus => a.arithmetic(Arithmetic::Add, &b),
            BinaryOp::Minus => a.arithmetic(Arithmetic::Subtract, &b),
            BinaryOp::Multiply => a.arithmetic(Arithmetic::Multiply, &b),
            BinaryOp::Divide => a.arithmetic(Arithmetic::Divide, &b),
            BinaryOp::Modulo => a.arithmetic(Arithmetic::Modulo, &b),
            BinaryOp::Concat => match (a.to_text(), b.to_text()) {
                (Some(x), Some(y)) => Value::Text(x + &y),
                _ => Value::Null,
            },
        })
    }

    /// SQL LIKE: `%` matches any run, `_` one character, case-insensitive.
    fn like(&self, value: &str, pattern: &str) -> Result<bool, QueryError> {
        let mut patterns = self.patterns.borrow_mut();
        if let Some(regex) = patterns.get(pattern) {
            return Ok(regex.is_match(value));
        }

        let mut source = String::from("(?is)^");
        for c in pattern.chars() {
            match c {
                '%' => source.push_str(".*"),
                '_' => source.push('.'),
                c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| QueryError::InvalidArgument {
            function: "LIKE".to_string(),
            reason: e.to_string(),
        })?;
        let matched = regex.is_match(value);
        patterns.insert(pattern.to_string(), regex);
        Ok(matched)
    }
}

fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn sum(values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    values
        .iter()
        .fold(Value::Integer(0), |total, value| match value {
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => {
                total.arithmetic(Arithmetic::Add, value)
            }
            other => {
                let value = Value::Float(other.as_f64().unwrap_or(0.0));
                total.arithmetic(Arithmetic::Add, &value)
            }
        })
}

fn scalar(func: ScalarFunction, value: Value) -> Value {
    match func {
        ScalarFunction::Lower => value.to_text().map_or(Value::Null, |s| Value::Text(s.to_lowercase())),
        ScalarFunction::Upper => value.to_text().map_or(Value::Null, |s| Value::Text(s.to_uppercase())),
        ScalarFunction::Length => value
            .to_text()
            .map_or(Value::Null, |s| Value::Integer(s.chars().count() as i64)),
        ScalarFunction::Abs => match value {
            Value::Null => Value::Null,
            Value::Integer(i) => i.checked_abs().map_or(Value::Float((i as f64).abs()), Value::Integer),
            Value::Float(f) => Value::Float(f.abs()),
            Value::Boolean(b) => Value::Integer(i64::from(b)),
            Value::Text(_) => Value::Float(value.as_f64().unwrap_or(0.0).abs()),
        },
    }
}
