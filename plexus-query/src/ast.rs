//! Abstract syntax tree for the Cypher dialect.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    With(WithClause),
    Unwind(UnwindClause),
    Return(ReturnClause),
    Create(CreateClause),
    Merge(MergeClause),
    Set(SetClause),
    Remove(RemoveClause),
    Delete(DeleteClause),
    Foreach(ForeachClause),
    Call(CallClause),
    CreateIndex(CreateIndexClause),
    CreateConstraint(CreateConstraintClause),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhereClause {
    pub expression: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub where_clause: Option<WhereClause>,
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnwindClause {
    pub expression: Expression,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<OrderByItem>,
    pub skip: Option<Expression>,
    pub limit: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderByItem {
    pub expression: Expression,
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateClause {
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeClause {
    pub pattern: Pattern,
    pub on_create: Vec<SetItem>,
    pub on_match: Vec<SetItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetClause {
    pub items: Vec<SetItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SetItem {
    /// `n.prop = expr`
    Property { variable: String, property: String, value: Expression },
    /// `n = expr` (replace) or `n += expr` (merge)
    Properties { variable: String, value: Expression, merge: bool },
    /// `n:Label1:Label2`
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveClause {
    pub items: Vec<RemoveItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RemoveItem {
    Property { variable: String, property: String },
    Labels { variable: String, labels: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteClause {
    pub detach: bool,
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForeachClause {
    pub variable: String,
    pub list: Expression,
    pub updates: Vec<Clause>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallClause {
    pub name: String,
    pub arguments: Vec<Expression>,
    pub yields: Option<Vec<YieldItem>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YieldItem {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateIndexClause {
    pub name: Option<String>,
    pub label: String,
    pub properties: Vec<String>,
    /// `fulltext` when written as `CREATE FULLTEXT INDEX`.
    pub fulltext: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateConstraintClause {
    pub name: Option<String>,
    pub label: String,
    pub property: String,
    pub kind: ConstraintRequirement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConstraintRequirement {
    Unique,
    Exists,
    OfType(String),
}

// ---- patterns ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pattern {
    /// Path variable for `p = (a)-[..]->(b)`.
    pub variable: Option<String>,
    pub elements: Vec<PatternElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PatternElement {
    Node(NodePattern),
    Relationship(RelationshipPattern),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expression)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub types: Vec<String>,
    pub direction: PatternDirection,
    pub properties: Vec<(String, Expression)>,
    pub length: Option<VarLength>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatternDirection {
    Outgoing,
    Incoming,
    Undirected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VarLength {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

// ---- expressions ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Parameter(String),
    Variable(String),
    Property(Box<Expression>, String),
    /// Dynamic access `x[expr]`.
    Index(Box<Expression>, Box<Expression>),
    /// Slice `x[a..b]`; either bound may be absent.
    Slice {
        target: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),
    Unary(UnaryOp, Box<Expression>),
    Binary(Box<Expression>, BinaryOp, Box<Expression>),
    IsNull(Box<Expression>, bool),
    Case(Box<CaseExpression>),
    FunctionCall(FunctionCall),
    /// `[x IN xs WHERE pred | proj]`
    ListComprehension(Box<ListComprehension>),
    /// `[(a)-[:R]->(b) WHERE pred | proj]`
    PatternComprehension(Box<PatternComprehension>),
    /// `ALL/ANY/NONE/SINGLE (x IN xs WHERE pred)`
    Quantifier(Box<QuantifierExpression>),
    /// `reduce(acc = init, x IN xs | expr)`
    Reduce(Box<ReduceExpression>),
    /// `EXISTS((a)-[:R]->(b))` or a bare pattern used as a predicate.
    PatternPredicate(Box<Pattern>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    StartsWith,
    EndsWith,
    Contains,
    Regex,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseExpression {
    /// Operand for the simple form `CASE x WHEN v THEN ...`.
    pub operand: Option<Expression>,
    pub branches: Vec<(Expression, Expression)>,
    pub fallback: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListComprehension {
    pub variable: String,
    pub list: Expression,
    pub predicate: Option<Expression>,
    pub projection: Option<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternComprehension {
    pub pattern: Pattern,
    pub predicate: Option<Expression>,
    pub projection: Expression,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
    None,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuantifierExpression {
    pub quantifier: Quantifier,
    pub variable: String,
    pub list: Expression,
    pub predicate: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReduceExpression {
    pub accumulator: String,
    pub init: Expression,
    pub variable: String,
    pub list: Expression,
    pub expression: Expression,
}

/// Aggregate functions recognized inside `RETURN` / `WITH` projections.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "collect", "stdev",
];

/// Whether any aggregate call appears outside a nested scope.
pub fn contains_aggregate(expr: &Expression) -> bool {
    match expr {
        Expression::FunctionCall(call) => {
            AGGREGATE_FUNCTIONS.contains(&call.name.to_lowercase().as_str())
                || call.args.iter().any(contains_aggregate)
        }
        Expression::Literal(_) | Expression::Parameter(_) | Expression::Variable(_) => false,
        Expression::Property(inner, _) => contains_aggregate(inner),
        Expression::Index(a, b) => contains_aggregate(a) || contains_aggregate(b),
        Expression::Slice { target, from, to } => {
            contains_aggregate(target)
                || from.as_deref().map(contains_aggregate).unwrap_or(false)
                || to.as_deref().map(contains_aggregate).unwrap_or(false)
        }
        Expression::List(items) => items.iter().any(contains_aggregate),
        Expression::Map(pairs) => pairs.iter().any(|(_, e)| contains_aggregate(e)),
        Expression::Unary(_, inner) => contains_aggregate(inner),
        Expression::Binary(left, _, right) => contains_aggregate(left) || contains_aggregate(right),
        Expression::IsNull(inner, _) => contains_aggregate(inner),
        Expression::Case(case) => {
            case.operand.as_ref().map(contains_aggregate).unwrap_or(false)
                || case
                    .branches
                    .iter()
                    .any(|(w, t)| contains_aggregate(w) || contains_aggregate(t))
                || case.fallback.as_ref().map(contains_aggregate).unwrap_or(false)
        }
        Expression::ListComprehension(_)
        | Expression::PatternComprehension(_)
        | Expression::Quantifier(_)
        | Expression::Reduce(_)
        | Expression::PatternPredicate(_) => false,
    }
}
