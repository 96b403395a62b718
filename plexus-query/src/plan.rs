//! Logical plan operators.
//!
//! A plan is a tree of data-only operator nodes; the executor walks it with
//! per-instance state. Rows flow bottom-up: a row is a mapping from bound
//! name to value, and projection keeps its inputs alive until a final
//! `Strip` so that `ORDER BY` can still see pre-projection bindings.

use std::collections::HashSet;

use crate::ast::*;

#[derive(Debug, Clone)]
pub enum Plan {
    /// One empty row; the leaf under every chain.
    SingleRow,
    /// Binds `variable` to candidate nodes: an index seek, a label scan or
    /// a full scan. Passes through rows where `variable` is already bound.
    NodeScan {
        input: Box<Plan>,
        variable: String,
        labels: Vec<String>,
        seek: Option<Seek>,
    },
    Expand(ExpandSpec),
    /// Expand that emits one null-padded row when nothing matches.
    OptionalExpand(ExpandSpec),
    /// General OPTIONAL MATCH: run `subplan` seeded with each input row;
    /// on zero results emit the row with `introduced` bound to null.
    Optional {
        input: Box<Plan>,
        subplan: Box<Plan>,
        introduced: Vec<String>,
    },
    Filter {
        input: Box<Plan>,
        predicate: Expression,
    },
    Project {
        input: Box<Plan>,
        items: Vec<(Expression, String)>,
        /// Keep input bindings alongside the projected columns until `Strip`.
        keep_inputs: bool,
    },
    /// Drops every column not listed, fixing the output order.
    Strip {
        input: Box<Plan>,
        columns: Vec<String>,
    },
    Unwind {
        input: Box<Plan>,
        expression: Expression,
        variable: String,
    },
    Distinct {
        input: Box<Plan>,
        columns: Vec<String>,
    },
    Sort {
        input: Box<Plan>,
        items: Vec<(Expression, bool)>,
    },
    Skip {
        input: Box<Plan>,
        expression: Expression,
    },
    Limit {
        input: Box<Plan>,
        expression: Expression,
    },
    Aggregate {
        input: Box<Plan>,
        group: Vec<(Expression, String)>,
        aggregates: Vec<AggregateSpec>,
    },
    /// Builds a named path value out of already-bound pattern variables.
    ProjectPath {
        input: Box<Plan>,
        variable: String,
        parts: Vec<PathPart>,
    },
    Create {
        input: Box<Plan>,
        patterns: Vec<Pattern>,
    },
    Merge {
        input: Box<Plan>,
        pattern: Pattern,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
    },
    SetItems {
        input: Box<Plan>,
        items: Vec<SetItem>,
    },
    RemoveItems {
        input: Box<Plan>,
        items: Vec<RemoveItem>,
    },
    Delete {
        input: Box<Plan>,
        detach: bool,
        expressions: Vec<Expression>,
    },
    Foreach {
        input: Box<Plan>,
        variable: String,
        list: Expression,
        updates: Vec<Clause>,
    },
    CallProcedure {
        input: Box<Plan>,
        name: String,
        arguments: Vec<Expression>,
        /// `(procedure column, bound name)` pairs.
        yields: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct ExpandSpec {
    pub input: Box<Plan>,
    pub from: String,
    pub to: String,
    pub rel_variable: String,
    pub types: Vec<String>,
    pub direction: PatternDirection,
    /// `None` is a plain single hop; `Some` is variable-length and binds
    /// `rel_variable` to the list of traversed relationships.
    pub length: Option<VarLength>,
    /// Relationship property equality from the pattern, checked per hop.
    pub rel_props: Vec<(String, Expression)>,
}

#[derive(Debug, Clone)]
pub struct Seek {
    pub index_name: String,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub enum PathPart {
    Node(String),
    Rel(String),
}

#[derive(Debug, Clone)]
pub struct AggregateSpec {
    /// Lowercased function name (`count`, `sum`, ...).
    pub function: String,
    /// `None` for `count(*)`.
    pub argument: Option<Expression>,
    pub distinct: bool,
    pub alias: String,
}

/// Canonical text of an expression, used for default column names and for
/// resolving `ORDER BY`/`DISTINCT` references to projected columns.
pub fn expression_text(expr: &Expression) -> String {
    match expr {
        Expression::Literal(Literal::Null) => "null".to_string(),
        Expression::Literal(Literal::Bool(b)) => b.to_string(),
        Expression::Literal(Literal::Integer(i)) => i.to_string(),
        Expression::Literal(Literal::Float(f)) => f.to_string(),
        Expression::Literal(Literal::String(s)) => format!("'{s}'"),
        Expression::Parameter(name) => format!("${name}"),
        Expression::Variable(name) => name.clone(),
        Expression::Property(inner, key) => format!("{}.{key}", expression_text(inner)),
        Expression::Index(target, index) => {
            format!("{}[{}]", expression_text(target), expression_text(index))
        }
        Expression::Slice { target, from, to } => format!(
            "{}[{}..{}]",
            expression_text(target),
            from.as_deref().map(expression_text).unwrap_or_default(),
            to.as_deref().map(expression_text).unwrap_or_default()
        ),
        Expression::List(items) => format!(
            "[{}]",
            items
                .iter()
                .map(expression_text)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Expression::Map(pairs) => format!(
            "{{{}}}",
            pairs
                .iter()
                .map(|(k, v)| format!("{k}: {}", expression_text(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Expression::Unary(UnaryOp::Not, inner) => format!("NOT {}", expression_text(inner)),
        Expression::Unary(UnaryOp::Negate, inner) => format!("-{}", expression_text(inner)),
        Expression::Binary(left, op, right) => format!(
            "{} {} {}",
            expression_text(left),
            binary_op_text(*op),
            expression_text(right)
        ),
        Expression::IsNull(inner, negated) => format!(
            "{} IS {}NULL",
            expression_text(inner),
            if *negated { "NOT " } else { "" }
        ),
        Expression::Case(_) => "CASE".to_string(),
        Expression::FunctionCall(call) => format!(
            "{}({}{})",
            call.name,
            if call.distinct { "DISTINCT " } else { "" },
            if call.args.is_empty() && call.name.eq_ignore_ascii_case("count") {
                "*".to_string()
            } else {
                call.args
                    .iter()
                    .map(expression_text)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        ),
        Expression::ListComprehension(_) => "[...]".to_string(),
        Expression::PatternComprehension(_) => "[pattern]".to_string(),
        Expression::Quantifier(q) => format!("{:?}(...)", q.quantifier).to_lowercase(),
        Expression::Reduce(_) => "reduce(...)".to_string(),
        Expression::PatternPredicate(_) => "exists(pattern)".to_string(),
    }
}

fn binary_op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Xor => "XOR",
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::In => "IN",
        BinaryOp::StartsWith => "STARTS WITH",
        BinaryOp::EndsWith => "ENDS WITH",
        BinaryOp::Contains => "CONTAINS",
        BinaryOp::Regex => "=~",
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Power => "^",
    }
}

/// Splits a predicate on top-level ANDs.
pub fn split_conjuncts(expr: Expression) -> Vec<Expression> {
    match expr {
        Expression::Binary(left, BinaryOp::And, right) => {
            let mut out = split_conjuncts(*left);
            out.extend(split_conjuncts(*right));
            out
        }
        other => vec![other],
    }
}

/// Free variables of an expression; locals introduced by comprehensions,
/// quantifiers and reduce are excluded.
pub fn free_variables(expr: &Expression) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_free(expr, &mut HashSet::new(), &mut out);
    out
}

fn collect_free(expr: &Expression, locals: &mut HashSet<String>, out: &mut HashSet<String>) {
    match expr {
        Expression::Literal(_) | Expression::Parameter(_) => {}
        Expression::Variable(name) => {
            if !locals.contains(name) {
                out.insert(name.clone());
            }
        }
        Expression::Property(inner, _) => collect_free(inner, locals, out),
        Expression::Index(a, b) => {
            collect_free(a, locals, out);
            collect_free(b, locals, out);
        }
        Expression::Slice { target, from, to } => {
            collect_free(target, locals, out);
            if let Some(from) = from {
                collect_free(from, locals, out);
            }
            if let Some(to) = to {
                collect_free(to, locals, out);
            }
        }
        Expression::List(items) => {
            for item in items {
                collect_free(item, locals, out);
            }
        }
        Expression::Map(pairs) => {
            for (_, value) in pairs {
                collect_free(value, locals, out);
            }
        }
        Expression::Unary(_, inner) => collect_free(inner, locals, out),
        Expression::Binary(left, _, right) => {
            collect_free(left, locals, out);
            collect_free(right, locals, out);
        }
        Expression::IsNull(inner, _) => collect_free(inner, locals, out),
        Expression::Case(case) => {
            if let Some(operand) = &case.operand {
                collect_free(operand, locals, out);
            }
            for (when, then) in &case.branches {
                collect_free(when, locals, out);
                collect_free(then, locals, out);
            }
            if let Some(fallback) = &case.fallback {
                collect_free(fallback, locals, out);
            }
        }
        Expression::FunctionCall(call) => {
            for arg in &call.args {
                collect_free(arg, locals, out);
            }
        }
        Expression::ListComprehension(comp) => {
            collect_free(&comp.list, locals, out);
            let added = locals.insert(comp.variable.clone());
            if let Some(predicate) = &comp.predicate {
                collect_free(predicate, locals, out);
            }
            if let Some(projection) = &comp.projection {
                collect_free(projection, locals, out);
            }
            if added {
                locals.remove(&comp.variable);
            }
        }
        Expression::PatternComprehension(comp) => {
            let mut added = Vec::new();
            for element in &comp.pattern.elements {
                let var = match element {
                    PatternElement::Node(n) => n.variable.clone(),
                    PatternElement::Relationship(r) => r.variable.clone(),
                };
                if let Some(var) = var {
                    if locals.insert(var.clone()) {
                        added.push(var);
                    }
                }
            }
            if let Some(predicate) = &comp.predicate {
                collect_free(predicate, locals, out);
            }
            collect_free(&comp.projection, locals, out);
            for var in added {
                locals.remove(&var);
            }
        }
        Expression::Quantifier(q) => {
            collect_free(&q.list, locals, out);
            let added = locals.insert(q.variable.clone());
            collect_free(&q.predicate, locals, out);
            if added {
                locals.remove(&q.variable);
            }
        }
        Expression::Reduce(r) => {
            collect_free(&r.init, locals, out);
            collect_free(&r.list, locals, out);
            let added_acc = locals.insert(r.accumulator.clone());
            let added_var = locals.insert(r.variable.clone());
            collect_free(&r.expression, locals, out);
            if added_acc {
                locals.remove(&r.accumulator);
            }
            if added_var {
                locals.remove(&r.variable);
            }
        }
        Expression::PatternPredicate(pattern) => {
            for element in &pattern.elements {
                if let PatternElement::Node(n) = element {
                    if let Some(var) = &n.variable {
                        if !locals.contains(var) {
                            out.insert(var.clone());
                        }
                    }
                }
            }
        }
    }
}
