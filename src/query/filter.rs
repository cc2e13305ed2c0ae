//! # Column Filtering Primitives
//!
//! Building blocks used to restrict the documents returned when reading a
//! stored object. Filters are expressed over the object's columns and later
//! compiled against the physical representation (SQL over `jsonb` documents or
//! in-memory evaluation).
//!
//! The filtering logic is built hierarchically:
//!
//! -   _Value_: the unit of data.
//!     A wrapper ([`Value`]) that allows heterogeneous types (Integers, Floats, Strings, Booleans)
//!     to be treated uniformly within dynamic containers.
//!
//! -   _Operation_ ([`Op`]): the logical predicate.
//!     An [`Op`] defines *how* to compare data. It represents specific conditions like equality
//!     (`Eq`), ranges (`Between`), set membership (`In`), or existence (`Ex`).
//!
//! -   _Expression_ ([`Expr`]): the single constraint.
//!     An expression binds a document field ([`FieldPath`]) to an [`Op`]
//!     (e.g., *"temperature > 25.0"*).
//!
//! -   _Filter_: the composite query.
//!     A [`Filter`] is a conjunction of [`Clause`]s, either plain expressions or
//!     element matches over a nested sequence of documents.

use std::collections::HashSet;

/// Floating point value type alias
pub type Float = f64;
/// Integer value type alias
pub type Integer = i64;
/// Literal type alias
pub type Text = String;

/// Separator between the keyword form of a field and its operator, e.g. `price__gte`
const KEYWORD_OP_SEPARATOR: &str = "__";

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// Operand of a type the filter language cannot carry, e.g. a JSON object
    #[error("wrong type")]
    WrongType,

    #[error("unsupported operation")]
    UnsupportedOperation,

    /// `between` bounds with `min > max`
    #[error("empty range")]
    EmptyRange,
}

/// Scalar operand of a filter, mirrors the JSON scalars stored in documents
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Integer(Integer),
    Float(Float),
    Text(Text),
    Boolean(bool),
}

impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Integer(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Text(v) => serde_json::Value::from(v.as_str()),
            Self::Boolean(v) => serde_json::Value::from(*v),
        }
    }

    pub fn try_from_json(value: &serde_json::Value) -> Result<Self, OpError> {
        match value {
            serde_json::Value::Bool(v) => Ok(Self::Boolean(*v)),
            serde_json::Value::String(v) => Ok(Self::Text(v.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else {
                    n.as_f64().map(Self::Float).ok_or(OpError::WrongType)
                }
            }
            _ => Err(OpError::WrongType),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Operations a filter operand accepts, checked when an [`Expr`] is built.
/// Nothing is supported unless overridden.
pub trait IsSupportedOp {
    fn support_eq(&self) -> bool {
        false
    }
    fn support_ordering(&self) -> bool {
        false
    }
    fn support_in(&self) -> bool {
        false
    }
    fn support_match(&self) -> bool {
        false
    }
}

impl IsSupportedOp for Value {
    fn support_eq(&self) -> bool {
        true
    }

    fn support_ordering(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Boolean(_) => false,
            Self::Integer(_) => true,
            Self::Float(_) => true,
        }
    }

    fn support_in(&self) -> bool {
        true
    }

    fn support_match(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T> Range<T>
where
    T: PartialOrd,
{
    pub fn try_new(min: T, max: T) -> Result<Self, OpError> {
        if min > max {
            return Err(OpError::EmptyRange);
        }
        Ok(Self { min, max })
    }
}

/// Dotted path to a document field, e.g. `position.x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    value: String,
}

impl FieldPath {
    pub fn try_new(v: impl Into<String>) -> Result<Self, super::Error> {
        let value = v.into();
        if value.is_empty() || value.split('.').any(str::is_empty) {
            return Err(super::Error::BadField { field: value });
        }
        Ok(Self { value })
    }

    /// First segment of the path, the top level document field
    pub fn root(&self) -> &str {
        self.value.split('.').next().unwrap_or(&self.value)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.value.split('.')
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns a copy of the path with the top level field replaced
    pub fn with_root(&self, root: &str) -> Self {
        let rest = &self.value[self.root().len()..];
        Self {
            value: format!("{root}{rest}"),
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// A single constraint.
/// An expression is formed by binding a specific field ([`FieldPath`])
/// to an [`Op`]. It asserts a rule for that specific field (e.g., *"temperature > 25.0"*).
#[derive(Debug, Clone)]
pub struct Expr<T>(FieldPath, Op<T>);

impl<T> Expr<T> {
    pub fn field(&self) -> &FieldPath {
        &self.0
    }

    pub fn op(&self) -> &Op<T> {
        &self.1
    }

    pub fn into_parts(self) -> (FieldPath, Op<T>) {
        (self.0, self.1)
    }
}

impl<T> From<(FieldPath, Op<T>)> for Expr<T> {
    fn from(value: (FieldPath, Op<T>)) -> Self {
        Self(value.0, value.1)
    }
}

/// An expression group is defined as a series of fields
/// with associated operations, all of them must hold.
#[derive(Debug, Clone)]
pub struct ExprGroup<T> {
    pub group: Vec<Expr<T>>,
}

impl<T> ExprGroup<T> {
    pub fn new(group: Vec<Expr<T>>) -> Self {
        Self { group }
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr<T>> {
        self.group.iter()
    }
}

impl<T> Default for ExprGroup<T> {
    fn default() -> Self {
        Self { group: Vec::new() }
    }
}

impl<T> IntoIterator for ExprGroup<T> {
    type Item = Expr<T>;
    type IntoIter = std::vec::IntoIter<Expr<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.group.into_iter()
    }
}

/// Represents the logical operator to apply to a field for filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum Op<T> {
    /// Equal
    Eq(T),
    /// Not equal
    Neq(T),
    /// Less than or equal
    Leq(T),
    /// Greater then or equal
    Geq(T),
    /// Lower then
    Lt(T),
    /// Greater then
    Gt(T),
    /// Exists
    Ex,
    /// Not exists
    Nex,
    /// In between a two value range [a, b] with a <= b
    Between(Range<T>),
    /// Found in a set
    In(Vec<T>),
    /// Matches a regular expression
    Match(T),
}

impl<T> Op<T>
where
    T: IsSupportedOp,
{
    pub fn is_supported_op(&self) -> bool {
        match self {
            Self::Eq(v) => v.support_eq(),
            Op::Neq(v) => v.support_eq(),
            Op::Leq(v) => v.support_ordering(),
            Op::Geq(v) => v.support_ordering(),
            Op::Lt(v) => v.support_ordering(),
            Op::Gt(v) => v.support_ordering(),
            Op::Ex => true,
            Op::Nex => true,
            Op::Between(range) => range.min.support_ordering(),
            Op::In(items) => items.iter().all(|v| v.support_in()),
            Op::Match(v) => v.support_match(),
        }
    }
}

impl<T> Op<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Eq(_) => "eq",
            Self::Neq(_) => "ne",
            Self::Leq(_) => "lte",
            Self::Geq(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Gt(_) => "gt",
            Self::Ex => "exists",
            Self::Nex => "not exists",
            Self::Between(_) => "between",
            Self::In(_) => "in",
            Self::Match(_) => "contains",
        }
    }
}

/// Constraint part of a [`Filter`].
#[derive(Debug, Clone)]
pub enum Clause {
    /// Constraint over a single field
    Expr(Expr<Value>),
    /// Holds if at least one element of the sequence at `array` satisfies
    /// every expression of `group` (paths are relative to the element)
    ElemMatch {
        array: FieldPath,
        group: ExprGroup<Value>,
    },
}

/// A conjunction of clauses. An empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn into_clauses(self) -> Vec<Clause> {
        self.clauses
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    /// Adds a constraint, `field` is a dotted path
    pub fn with(mut self, field: &str, op: Op<Value>) -> Result<Self, super::Error> {
        let field = FieldPath::try_new(field)?;
        if !op.is_supported_op() {
            return Err(super::Error::UnsupportedOp {
                field: field.to_string(),
                op: op.name(),
            });
        }
        self.clauses.push(Clause::Expr((field, op).into()));
        Ok(self)
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Result<Self, super::Error> {
        self.with(field, Op::Eq(value.into()))
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Result<Self, super::Error> {
        self.with(field, Op::Gt(value.into()))
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Result<Self, super::Error> {
        self.with(field, Op::Lt(value.into()))
    }

    /// Merges two filters, both must hold
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    /// Returns the set of top level fields referenced by this filter
    pub fn root_fields(&self) -> HashSet<&str> {
        self.clauses
            .iter()
            .map(|c| match c {
                Clause::Expr(e) => e.field().root(),
                Clause::ElemMatch { array, .. } => array.root(),
            })
            .collect()
    }

    /// Renames the top level field of each clause using `rename`.
    ///
    /// The whole field is looked up first, so a column whose name contains a
    /// dot is matched as a single key. Otherwise only the first segment is
    /// renamed. Fields for which `rename` returns [`None`] are kept as they are.
    pub fn map_roots<F>(self, rename: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let rename_path = |path: FieldPath| match rename(path.value()) {
            Some(whole) => FieldPath { value: whole },
            None => match rename(path.root()) {
                Some(root) => path.with_root(&root),
                None => path,
            },
        };

        let clauses = self
            .clauses
            .into_iter()
            .map(|c| match c {
                Clause::Expr(expr) => {
                    let (field, op) = expr.into_parts();
                    Clause::Expr((rename_path(field), op).into())
                }
                Clause::ElemMatch { array, group } => Clause::ElemMatch {
                    array: rename_path(array),
                    group,
                },
            })
            .collect();

        Self { clauses }
    }

    /// Moves every plain expression whose top level field is not accepted by
    /// `keep_top_level` inside a single element match over `array`.
    pub fn nest_into(self, array: &str, keep_top_level: impl Fn(&str) -> bool) -> Result<Self, super::Error> {
        let array = FieldPath::try_new(array)?;
        let mut clauses = Vec::new();
        let mut nested = ExprGroup::default();

        for clause in self.clauses {
            match clause {
                Clause::Expr(expr) if !keep_top_level(expr.field().root()) => {
                    nested.group.push(expr);
                }
                other => clauses.push(other),
            }
        }

        if !nested.is_empty() {
            clauses.push(Clause::ElemMatch {
                array,
                group: nested,
            });
        }

        Ok(Self { clauses })
    }

    /// Parses the keyword form of a filter, a JSON object mapping
    /// `field` or `field__op` to a value, e.g.
    ///
    /// ```json
    /// { "city": "Zurich", "price__gte": 10, "tag__in": ["a", "b"] }
    /// ```
    ///
    /// Supported operators: `eq`, `ne`, `lt`, `lte`, `gt`, `gte`, `in`,
    /// `between` (two elements array), `exists` (boolean) and `contains`
    /// (regular expression).
    pub fn try_from_json(value: &serde_json::Value) -> Result<Self, super::Error> {
        let map = value.as_object().ok_or_else(|| {
            super::Error::InvalidFilter("keyword filter must be an object".to_owned())
        })?;

        let mut filter = Self::new();
        for (key, value) in map {
            let (field, op) = match key.rsplit_once(KEYWORD_OP_SEPARATOR) {
                Some((field, op)) if !field.is_empty() => (field, op),
                _ => (key.as_str(), "eq"),
            };

            let op = keyword_op(op, value).map_err(|e| super::Error::InvalidFilter(format!(
                "field `{field}`: {e}"
            )))?;

            filter = filter.with(field, op)?;
        }

        Ok(filter)
    }
}

fn keyword_op(op: &str, value: &serde_json::Value) -> Result<Op<Value>, OpError> {
    let scalar = || Value::try_from_json(value);
    let list = || -> Result<Vec<Value>, OpError> {
        value
            .as_array()
            .ok_or(OpError::WrongType)?
            .iter()
            .map(Value::try_from_json)
            .collect()
    };

    let op = match op {
        "eq" => Op::Eq(scalar()?),
        "ne" => Op::Neq(scalar()?),
        "lt" => Op::Lt(scalar()?),
        "lte" => Op::Leq(scalar()?),
        "gt" => Op::Gt(scalar()?),
        "gte" => Op::Geq(scalar()?),
        "in" => Op::In(list()?),
        "contains" => Op::Match(scalar()?),
        "exists" => match value.as_bool() {
            Some(true) => Op::Ex,
            Some(false) => Op::Nex,
            None => return Err(OpError::WrongType),
        },
        "between" => {
            let mut items = list()?;
            if items.len() != 2 {
                return Err(OpError::WrongType);
            }
            let max = items.pop().ok_or(OpError::WrongType)?;
            let min = items.pop().ok_or(OpError::WrongType)?;
            Op::Between(Range::try_new(min, max)?)
        }
        _ => return Err(OpError::UnsupportedOperation),
    };

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_path() {
        let fp = FieldPath::try_new("position.x").expect("");

        assert_eq!(fp.root(), "position");
        assert_eq!(fp.segments().collect::<Vec<_>>(), vec!["position", "x"]);
        assert_eq!(fp.with_root("pos").value(), "pos.x");

        assert!(FieldPath::try_new("").is_err());
        assert!(FieldPath::try_new("a..b").is_err());
    }

    #[test]
    fn keyword_filter() {
        let filter = Filter::try_from_json(&serde_json::json!({
            "city": "Zurich",
            "price__gte": 10,
            "tag__in": ["a", "b"],
            "score__between": [0.5, 1.5],
            "note__exists": false,
        }))
        .unwrap();

        assert_eq!(filter.clauses().len(), 5);
        let names: Vec<&str> = filter
            .clauses()
            .iter()
            .map(|c| match c {
                Clause::Expr(e) => e.op().name(),
                Clause::ElemMatch { .. } => "elem",
            })
            .collect();
        assert!(names.contains(&"eq"));
        assert!(names.contains(&"gte"));
        assert!(names.contains(&"in"));
        assert!(names.contains(&"between"));
        assert!(names.contains(&"not exists"));
    }

    #[test]
    fn keyword_filter_rejects_bad_input() {
        assert!(Filter::try_from_json(&serde_json::json!([1, 2])).is_err());
        assert!(Filter::try_from_json(&serde_json::json!({"a__near": 1})).is_err());
        assert!(Filter::try_from_json(&serde_json::json!({"a__between": [3, 1]})).is_err());
        // ordering over text is not supported
        assert!(Filter::try_from_json(&serde_json::json!({"a__gt": "x"})).is_err());
    }

    #[test]
    fn nest_into_keeps_group_keys() {
        let filter = Filter::new()
            .eq("g", "a")
            .unwrap()
            .gt("x", 2)
            .unwrap()
            .nest_into("_data", |f| f == "g")
            .unwrap();

        let clauses = filter.clauses();
        assert_eq!(clauses.len(), 2);
        assert!(matches!(&clauses[0], Clause::Expr(e) if e.field().value() == "g"));
        assert!(
            matches!(&clauses[1], Clause::ElemMatch { array, group } if array.value() == "_data" && group.len() == 1)
        );
    }

    #[test]
    fn map_roots() {
        let filter = Filter::new()
            .eq("a.b", 1)
            .unwrap()
            .map_roots(|r| (r == "a").then(|| "A".to_owned()));
        assert!(matches!(&filter.clauses()[0], Clause::Expr(e) if e.field().value() == "A.b"));
    }

    #[test]
    fn map_roots_prefers_whole_field() {
        let filter = Filter::new()
            .gt("unit.price", 2.0)
            .unwrap()
            .eq("unit.code", "x")
            .unwrap()
            .map_roots(|f| match f {
                "unit.price" => Some("unit%2Eprice".to_owned()),
                "unit" => Some("u".to_owned()),
                _ => None,
            });

        let fields: Vec<&str> = filter
            .clauses()
            .iter()
            .filter_map(|c| match c {
                Clause::Expr(e) => Some(e.field().value()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["unit%2Eprice", "u.code"]);
        assert!(filter.root_fields().contains("unit%2Eprice"));
    }
}
