//! Compilation of filters into SQL predicates over `jsonb` documents.
//!
//! Every document lives in a `jsonb` column; fields are addressed with the
//! `#>` path operator and compared against `jsonb` literals, so typed
//! comparisons follow the `jsonb` ordering rules. Bound parameters are always
//! text (or text arrays) cast on the SQL side.
use super::{Clause, Error, ExprGroup, FieldPath, Filter, IsSupportedOp, Op, Value};

const EMPTY_CLAUSE: &str = "()";

/// Parameter bound to a compiled clause
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    TextArray(Vec<String>),
}

pub struct CompiledClause {
    pub clause: String,
    pub values: Vec<SqlValue>,
}

impl CompiledClause {
    pub fn new(clause: String, values: Vec<SqlValue>) -> Self {
        Self { clause, values }
    }

    pub fn empty() -> Self {
        Self {
            clause: EMPTY_CLAUSE.to_owned(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clause == EMPTY_CLAUSE
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.clause, self.values)
    }
}

pub trait CompileClause {
    fn compile_clause(&mut self, field: &FieldPath, op: Op<Value>) -> Result<CompiledClause, Error>;

    /// Compiles a group of expressions that must hold for at least one
    /// element of the sequence stored at `array`
    fn compile_elem_match(
        &mut self,
        array: &FieldPath,
        group: ExprGroup<Value>,
    ) -> Result<CompiledClause, Error>;
}

#[derive(Debug)]
pub struct CompilerResult {
    pub clauses: Vec<String>,
    pub values: Vec<SqlValue>,
}

impl CompilerResult {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Conjunction of every compiled clause, `TRUE` when unfiltered
    pub fn predicate(&self) -> String {
        if self.is_unfiltered() {
            "TRUE".to_owned()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

pub struct ClausesCompiler {
    result: CompilerResult,
    error: Option<Error>,
}

impl Default for ClausesCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClausesCompiler {
    pub fn new() -> Self {
        Self {
            result: CompilerResult::new(),
            error: None,
        }
    }

    fn push(&mut self, compiled: Result<CompiledClause, Error>) {
        match compiled {
            Ok(compiled) => {
                if compiled.is_empty() {
                    return;
                }
                let (clause, mut values) = compiled.into_parts();
                self.result.clauses.push(clause);
                self.result.values.append(&mut values);
            }
            Err(err) => self.error = Some(err),
        }
    }

    pub fn expr<F>(mut self, field: &FieldPath, op: Op<Value>, mapper: &mut F) -> Self
    where
        F: CompileClause,
    {
        if self.error.is_some() {
            return self;
        }

        let compiled = mapper.compile_clause(field, op);
        self.push(compiled);
        self
    }

    pub fn group<F>(mut self, group: ExprGroup<Value>, mapper: &mut F) -> Self
    where
        F: CompileClause,
    {
        for expr in group {
            if self.error.is_some() {
                break;
            }
            let (field, op) = expr.into_parts();
            self = self.expr(&field, op, mapper);
        }
        self
    }

    pub fn filter<F>(mut self, filter: Filter, mapper: &mut F) -> Self
    where
        F: CompileClause,
    {
        for clause in filter.into_clauses() {
            if self.error.is_some() {
                break;
            }
            match clause {
                Clause::Expr(expr) => {
                    let (field, op) = expr.into_parts();
                    self = self.expr(&field, op, mapper);
                }
                Clause::ElemMatch { array, group } => {
                    let compiled = mapper.compile_elem_match(&array, group);
                    self.push(compiled);
                }
            }
        }
        self
    }

    pub fn compile(self) -> Result<CompilerResult, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Compiles clauses over a `jsonb` expression (a column or an alias).
///
/// Placeholders are numbered from `first_placeholder`, so compiled clauses can
/// be appended to a query that already binds other parameters.
pub struct JsonbClauseCompiler {
    target: String,
    next_placeholder: usize,
}

impl JsonbClauseCompiler {
    pub fn new(target: &str, first_placeholder: usize) -> Self {
        Self {
            target: target.to_owned(),
            next_placeholder: first_placeholder,
        }
    }

    /// Number of the next free placeholder
    pub fn next_placeholder(&self) -> usize {
        self.next_placeholder
    }

    fn placeholder(&mut self) -> String {
        let p = format!("${}", self.next_placeholder);
        self.next_placeholder += 1;
        p
    }

    fn path(&mut self, field: &FieldPath, values: &mut Vec<SqlValue>) -> String {
        let p = self.placeholder();
        values.push(SqlValue::TextArray(
            field.segments().map(str::to_owned).collect(),
        ));
        format!("({} #> {}::text[])", self.target, p)
    }

    fn literal(&mut self, value: &Value, values: &mut Vec<SqlValue>) -> Result<String, Error> {
        let p = self.placeholder();
        values.push(SqlValue::Text(serde_json::to_string(&value.to_json())?));
        Ok(format!("{p}::jsonb"))
    }

    fn ordering(
        &mut self,
        field: &FieldPath,
        sql_op: &str,
        value: &Value,
        values: &mut Vec<SqlValue>,
    ) -> Result<String, Error> {
        let path = self.path(field, values);
        let lit = self.literal(value, values)?;
        Ok(format!(
            "(jsonb_typeof({path}) = 'number' AND {path} {sql_op} {lit})"
        ))
    }
}

impl CompileClause for JsonbClauseCompiler {
    fn compile_clause(&mut self, field: &FieldPath, op: Op<Value>) -> Result<CompiledClause, Error> {
        if !op.is_supported_op() {
            return Err(Error::UnsupportedOp {
                field: field.to_string(),
                op: op.name(),
            });
        }

        let mut values = Vec::new();

        let clause = match op {
            Op::Eq(v) => {
                let path = self.path(field, &mut values);
                let lit = self.literal(&v, &mut values)?;
                format!("{path} = {lit}")
            }
            Op::Neq(v) => {
                let path = self.path(field, &mut values);
                let lit = self.literal(&v, &mut values)?;
                format!("{path} IS DISTINCT FROM {lit}")
            }
            Op::Lt(v) => self.ordering(field, "<", &v, &mut values)?,
            Op::Leq(v) => self.ordering(field, "<=", &v, &mut values)?,
            Op::Gt(v) => self.ordering(field, ">", &v, &mut values)?,
            Op::Geq(v) => self.ordering(field, ">=", &v, &mut values)?,
            Op::Ex => format!("{} IS NOT NULL", self.path(field, &mut values)),
            Op::Nex => format!("{} IS NULL", self.path(field, &mut values)),
            Op::Between(range) => {
                let path = self.path(field, &mut values);
                let min = self.literal(&range.min, &mut values)?;
                let max = self.literal(&range.max, &mut values)?;
                format!("(jsonb_typeof({path}) = 'number' AND {path} >= {min} AND {path} <= {max})")
            }
            Op::In(items) => {
                if items.is_empty() {
                    return Ok(CompiledClause::new("FALSE".to_owned(), values));
                }
                let path = self.path(field, &mut values);
                let p = self.placeholder();
                let items = items
                    .iter()
                    .map(|v| serde_json::to_string(&v.to_json()))
                    .collect::<Result<Vec<_>, _>>()?;
                values.push(SqlValue::TextArray(items));
                format!("{path} = ANY({p}::text[]::jsonb[])")
            }
            Op::Match(v) => {
                let p = self.placeholder();
                values.push(SqlValue::TextArray(
                    field.segments().map(str::to_owned).collect(),
                ));
                let pattern = self.placeholder();
                let Value::Text(text) = v else {
                    return Err(Error::UnsupportedOp {
                        field: field.to_string(),
                        op: "contains",
                    });
                };
                // validate early, the database error would be far less readable
                regex::Regex::new(&text)?;
                values.push(SqlValue::Text(text));
                format!("({} #>> {p}::text[]) ~ {pattern}", self.target)
            }
        };

        Ok(CompiledClause::new(format!("({clause})"), values))
    }

    fn compile_elem_match(
        &mut self,
        array: &FieldPath,
        group: ExprGroup<Value>,
    ) -> Result<CompiledClause, Error> {
        let mut values = Vec::new();
        let path = self.path(array, &mut values);

        let mut inner = JsonbClauseCompiler::new("elem", self.next_placeholder);
        let result = ClausesCompiler::new().group(group, &mut inner).compile()?;
        self.next_placeholder = inner.next_placeholder;

        let predicate = result.predicate();
        values.extend(result.values);

        let clause = format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof({path}) = 'array' THEN {path} ELSE '[]'::jsonb END) AS elem WHERE {predicate})"
        );

        Ok(CompiledClause::new(clause, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(filter: Filter) -> CompilerResult {
        let mut compiler = JsonbClauseCompiler::new("body", 2);
        ClausesCompiler::new()
            .filter(filter, &mut compiler)
            .compile()
            .unwrap()
    }

    #[test]
    fn unfiltered() {
        let res = compile(Filter::new());
        assert!(res.is_unfiltered());
        assert_eq!(res.predicate(), "TRUE");
    }

    #[test]
    fn equality_and_ordering() {
        let res = compile(Filter::new().eq("a", 1).unwrap().gt("b.c", 2.5).unwrap());

        assert_eq!(res.clauses.len(), 2);
        assert_eq!(res.clauses[0], "((body #> $2::text[]) = $3::jsonb)");
        assert_eq!(
            res.clauses[1],
            "((jsonb_typeof((body #> $4::text[])) = 'number' AND (body #> $4::text[]) > $5::jsonb))"
        );
        assert_eq!(
            res.values,
            vec![
                SqlValue::TextArray(vec!["a".to_owned()]),
                SqlValue::Text("1".to_owned()),
                SqlValue::TextArray(vec!["b".to_owned(), "c".to_owned()]),
                SqlValue::Text("2.5".to_owned()),
            ]
        );
    }

    #[test]
    fn in_and_exists() {
        let filter = Filter::new()
            .with("t", Op::In(vec!["x".into(), "y".into()]))
            .unwrap()
            .with("u", Op::Nex)
            .unwrap();
        let res = compile(filter);

        assert_eq!(res.clauses[0], "((body #> $2::text[]) = ANY($3::text[]::jsonb[]))");
        assert_eq!(res.clauses[1], "((body #> $4::text[]) IS NULL)");
        assert_eq!(
            res.values[1],
            SqlValue::TextArray(vec![r#""x""#.to_owned(), r#""y""#.to_owned()])
        );
    }

    #[test]
    fn elem_match_shares_placeholders() {
        let filter = Filter::new()
            .eq("g", "a")
            .unwrap()
            .gt("x", 1)
            .unwrap()
            .nest_into("_data", |f| f == "g")
            .unwrap();
        let res = compile(filter);

        assert_eq!(res.clauses.len(), 2);
        assert!(res.clauses[1].starts_with("EXISTS (SELECT 1 FROM jsonb_array_elements("));
        assert!(res.clauses[1].contains("(elem #> $5::text[])"));
        assert!(res.clauses[1].contains("$6::jsonb"));
        assert_eq!(res.values.len(), 5);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let filter = Filter::new().with("t", Op::Match("(".into())).unwrap();
        let mut compiler = JsonbClauseCompiler::new("body", 2);
        let res = ClausesCompiler::new().filter(filter, &mut compiler).compile();
        assert!(matches!(res, Err(Error::Regex(_))));
    }
}
