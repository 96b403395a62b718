//! Pull-based plan execution.
//!
//! Every operator keeps per-instance state and exposes `open` / `next` /
//! `close`; `next` polls the cancellation flag before doing work. Rows own
//! their values, so a bound node carries a snapshot of its labels and
//! properties taken when it was bound (writes re-bind the variables they
//! touch).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use plexus_core::{
    Direction, Error, Node, NodeId, PathValue, Relationship, RelationshipId, Result, Value,
};
use plexus_storage::{GraphStore, PatchMode};

use crate::ast::{
    Clause, Expression, NodePattern, Pattern, PatternDirection, PatternElement,
    RelationshipPattern, RemoveItem, SetItem, VarLength,
};
use crate::evaluator::{evaluate, truth, values_equal};
use crate::plan::{expression_text, AggregateSpec, ExpandSpec, PathPart, Plan, Seek};
use crate::procedures::ProcedureRegistry;
use crate::Params;

/// A binding of names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cols: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.cols
            .iter()
            .find_map(|(k, v)| if k == name { Some(v) } else { None })
    }

    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self
            .cols
            .iter_mut()
            .find_map(|(k, v)| if k == name { Some(v) } else { None })
        {
            *slot = value;
        } else {
            self.cols.push((name.to_string(), value));
        }
    }

    pub fn with(&self, name: &str, value: Value) -> Row {
        let mut out = self.clone();
        out.set(name, value);
        out
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.cols
    }

    pub fn into_columns(self) -> Vec<(String, Value)> {
        self.cols
    }
}

/// Everything an operator needs while running.
pub struct ExecContext<'a> {
    pub store: &'a mut GraphStore,
    pub params: &'a Params,
    pub procedures: &'a ProcedureRegistry,
    pub cancel: &'a AtomicBool,
}

impl ExecContext<'_> {
    pub fn check_canceled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Builds the operator tree, drives it to completion and returns the rows.
pub fn run_plan(ctx: &mut ExecContext, plan: &Plan, seed: Row) -> Result<Vec<Row>> {
    let mut root = build(plan, seed);
    root.open();
    let mut out = Vec::new();
    while let Some(row) = root.next(ctx)? {
        out.push(row);
    }
    root.close();
    Ok(out)
}

fn build(plan: &Plan, seed: Row) -> ExecNode {
    match plan {
        Plan::SingleRow => ExecNode::SingleRow { seed, done: false },
        Plan::NodeScan {
            input,
            variable,
            labels,
            seek,
        } => ExecNode::NodeScan {
            child: Box::new(build(input, seed)),
            variable: variable.clone(),
            labels: labels.clone(),
            seek: seek.clone(),
            staged: VecDeque::new(),
        },
        Plan::Expand(spec) => ExecNode::Expand {
            child: Box::new(build(&spec.input, seed)),
            spec: spec.clone(),
            optional: false,
            staged: VecDeque::new(),
        },
        Plan::OptionalExpand(spec) => ExecNode::Expand {
            child: Box::new(build(&spec.input, seed)),
            spec: spec.clone(),
            optional: true,
            staged: VecDeque::new(),
        },
        Plan::Optional {
            input,
            subplan,
            introduced,
        } => ExecNode::Optional {
            child: Box::new(build(input, seed)),
            subplan: (**subplan).clone(),
            introduced: introduced.clone(),
            staged: VecDeque::new(),
        },
        Plan::Filter { input, predicate } => ExecNode::Filter {
            child: Box::new(build(input, seed)),
            predicate: predicate.clone(),
        },
        Plan::Project {
            input,
            items,
            keep_inputs,
        } => ExecNode::Project {
            child: Box::new(build(input, seed)),
            items: items.clone(),
            keep_inputs: *keep_inputs,
        },
        Plan::Strip { input, columns } => ExecNode::Strip {
            child: Box::new(build(input, seed)),
            columns: columns.clone(),
        },
        Plan::Unwind {
            input,
            expression,
            variable,
        } => ExecNode::Unwind {
            child: Box::new(build(input, seed)),
            expression: expression.clone(),
            variable: variable.clone(),
            staged: VecDeque::new(),
        },
        Plan::Distinct { input, columns } => ExecNode::Distinct {
            child: Box::new(build(input, seed)),
            columns: columns.clone(),
            seen: HashSet::new(),
        },
        Plan::Sort { input, items } => ExecNode::Sort {
            child: Box::new(build(input, seed)),
            items: items.clone(),
            sorted: None,
        },
        Plan::Skip { input, expression } => ExecNode::Skip {
            child: Box::new(build(input, seed)),
            expression: expression.clone(),
            remaining: None,
        },
        Plan::Limit { input, expression } => ExecNode::Limit {
            child: Box::new(build(input, seed)),
            expression: expression.clone(),
            remaining: None,
        },
        Plan::Aggregate {
            input,
            group,
            aggregates,
        } => ExecNode::Aggregate {
            child: Box::new(build(input, seed)),
            group: group.clone(),
            aggregates: aggregates.clone(),
            output: None,
        },
        Plan::ProjectPath {
            input,
            variable,
            parts,
        } => ExecNode::ProjectPath {
            child: Box::new(build(input, seed)),
            variable: variable.clone(),
            parts: parts.clone(),
        },
        Plan::Create { input, patterns } => ExecNode::Create {
            child: Box::new(build(input, seed)),
            patterns: patterns.clone(),
        },
        Plan::Merge {
            input,
            pattern,
            on_create,
            on_match,
        } => ExecNode::Merge {
            child: Box::new(build(input, seed)),
            pattern: pattern.clone(),
            on_create: on_create.clone(),
            on_match: on_match.clone(),
            staged: VecDeque::new(),
        },
        Plan::SetItems { input, items } => ExecNode::SetItems {
            child: Box::new(build(input, seed)),
            items: items.clone(),
        },
        Plan::RemoveItems { input, items } => ExecNode::RemoveItems {
            child: Box::new(build(input, seed)),
            items: items.clone(),
        },
        Plan::Delete {
            input,
            detach,
            expressions,
        } => ExecNode::Delete {
            child: Box::new(build(input, seed)),
            detach: *detach,
            expressions: expressions.clone(),
        },
        Plan::Foreach {
            input,
            variable,
            list,
            updates,
        } => ExecNode::Foreach {
            child: Box::new(build(input, seed)),
            variable: variable.clone(),
            list: list.clone(),
            updates: updates.clone(),
        },
        Plan::CallProcedure {
            input,
            name,
            arguments,
            yields,
        } => ExecNode::CallProcedure {
            child: Box::new(build(input, seed)),
            name: name.clone(),
            arguments: arguments.clone(),
            yields: yields.clone(),
            staged: VecDeque::new(),
        },
    }
}

enum ExecNode {
    SingleRow {
        seed: Row,
        done: bool,
    },
    NodeScan {
        child: Box<ExecNode>,
        variable: String,
        labels: Vec<String>,
        seek: Option<Seek>,
        staged: VecDeque<Row>,
    },
    Expand {
        child: Box<ExecNode>,
        spec: ExpandSpec,
        optional: bool,
        staged: VecDeque<Row>,
    },
    Optional {
        child: Box<ExecNode>,
        subplan: Plan,
        introduced: Vec<String>,
        staged: VecDeque<Row>,
    },
    Filter {
        child: Box<ExecNode>,
        predicate: Expression,
    },
    Project {
        child: Box<ExecNode>,
        items: Vec<(Expression, String)>,
        keep_inputs: bool,
    },
    Strip {
        child: Box<ExecNode>,
        columns: Vec<String>,
    },
    Unwind {
        child: Box<ExecNode>,
        expression: Expression,
        variable: String,
        staged: VecDeque<Row>,
    },
    Distinct {
        child: Box<ExecNode>,
        columns: Vec<String>,
        seen: HashSet<Vec<Value>>,
    },
    Sort {
        child: Box<ExecNode>,
        items: Vec<(Expression, bool)>,
        sorted: Option<VecDeque<Row>>,
    },
    Skip {
        child: Box<ExecNode>,
        expression: Expression,
        remaining: Option<i64>,
    },
    Limit {
        child: Box<ExecNode>,
        expression: Expression,
        remaining: Option<i64>,
    },
    Aggregate {
        child: Box<ExecNode>,
        group: Vec<(Expression, String)>,
        aggregates: Vec<AggregateSpec>,
        output: Option<VecDeque<Row>>,
    },
    ProjectPath {
        child: Box<ExecNode>,
        variable: String,
        parts: Vec<PathPart>,
    },
    Create {
        child: Box<ExecNode>,
        patterns: Vec<Pattern>,
    },
    Merge {
        child: Box<ExecNode>,
        pattern: Pattern,
        on_create: Vec<SetItem>,
        on_match: Vec<SetItem>,
        staged: VecDeque<Row>,
    },
    SetItems {
        child: Box<ExecNode>,
        items: Vec<SetItem>,
    },
    RemoveItems {
        child: Box<ExecNode>,
        items: Vec<RemoveItem>,
    },
    Delete {
        child: Box<ExecNode>,
        detach: bool,
        expressions: Vec<Expression>,
    },
    Foreach {
        child: Box<ExecNode>,
        variable: String,
        list: Expression,
        updates: Vec<Clause>,
    },
    CallProcedure {
        child: Box<ExecNode>,
        name: String,
        arguments: Vec<Expression>,
        yields: Vec<(String, String)>,
        staged: VecDeque<Row>,
    },
}

impl ExecNode {
    fn open(&mut self) {
        match self {
            ExecNode::SingleRow { done, .. } => *done = false,
            ExecNode::NodeScan { child, staged, .. } => {
                staged.clear();
                child.open();
            }
            ExecNode::Expand { child, staged, .. } => {
                staged.clear();
                child.open();
            }
            ExecNode::Optional { child, staged, .. } => {
                staged.clear();
                child.open();
            }
            ExecNode::Filter { child, .. }
            | ExecNode::Project { child, .. }
            | ExecNode::Strip { child, .. }
            | ExecNode::ProjectPath { child, .. }
            | ExecNode::Create { child, .. }
            | ExecNode::SetItems { child, .. }
            | ExecNode::RemoveItems { child, .. }
            | ExecNode::Delete { child, .. }
            | ExecNode::Foreach { child, .. } => child.open(),
            ExecNode::Unwind { child, staged, .. } => {
                staged.clear();
                child.open();
            }
            ExecNode::Distinct { child, seen, .. } => {
                seen.clear();
                child.open();
            }
            ExecNode::Sort { child, sorted, .. } => {
                *sorted = None;
                child.open();
            }
            ExecNode::Skip {
                child, remaining, ..
            }
            | ExecNode::Limit {
                child, remaining, ..
            } => {
                *remaining = None;
                child.open();
            }
            ExecNode::Aggregate { child, output, .. } => {
                *output = None;
                child.open();
            }
            ExecNode::Merge { child, staged, .. } => {
                staged.clear();
                child.open();
            }
            ExecNode::CallProcedure { child, staged, .. } => {
                staged.clear();
                child.open();
            }
        }
    }

    fn close(&mut self) {
        // Buffers are dropped with the node; nothing else to release.
    }

    fn next(&mut self, ctx: &mut ExecContext) -> Result<Option<Row>> {
        ctx.check_canceled()?;
        match self {
            ExecNode::SingleRow { seed, done } => {
                if *done {
                    Ok(None)
                } else {
                    *done = true;
                    Ok(Some(seed.clone()))
                }
            }
            ExecNode::NodeScan {
                child,
                variable,
                labels,
                seek,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                match row.get(variable).cloned() {
                    Some(Value::Node(node)) => {
                        if labels.iter().all(|l| node.has_label(l)) {
                            staged.push_back(row);
                        }
                    }
                    Some(Value::Null) => {}
                    Some(other) => {
                        return Err(Error::SemanticError(format!(
                            "variable '{variable}' is already bound to a {}",
                            other.kind().name()
                        )));
                    }
                    None => {
                        let ids: Vec<NodeId> = match seek {
                            Some(seek) => {
                                let value = evaluate(ctx, &row, &seek.value)?;
                                if value.is_null() {
                                    Vec::new()
                                } else {
                                    ctx.store.index_seek(&seek.index_name, &value)?
                                }
                            }
                            None => ctx.store.node_ids(labels.first().map(String::as_str))?,
                        };
                        for id in ids {
                            let node = ctx.store.get_node(id)?;
                            if labels.iter().all(|l| node.has_label(l)) {
                                staged.push_back(row.with(variable, Value::Node(node)));
                            }
                        }
                    }
                }
            },
            ExecNode::Expand {
                child,
                spec,
                optional,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let emitted = expand_row(ctx, spec, &row, staged)?;
                if !emitted && *optional {
                    let mut padded = row.clone();
                    if padded.get(&spec.rel_variable).is_none() {
                        padded.set(&spec.rel_variable, Value::Null);
                    }
                    if padded.get(&spec.to).is_none() {
                        padded.set(&spec.to, Value::Null);
                    }
                    staged.push_back(padded);
                }
            },
            ExecNode::Optional {
                child,
                subplan,
                introduced,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let matches = run_plan(ctx, subplan, row.clone())?;
                if matches.is_empty() {
                    let mut padded = row;
                    for name in introduced.iter() {
                        padded.set(name, Value::Null);
                    }
                    staged.push_back(padded);
                } else {
                    staged.extend(matches);
                }
            },
            ExecNode::Filter { child, predicate } => loop {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                if truth(&evaluate(ctx, &row, predicate)?) == Some(true) {
                    return Ok(Some(row));
                }
            },
            ExecNode::Project {
                child,
                items,
                keep_inputs,
            } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let mut out = if *keep_inputs { row.clone() } else { Row::new() };
                for (expr, name) in items.iter() {
                    let value = evaluate(ctx, &row, expr)?;
                    out.set(name, value);
                }
                Ok(Some(out))
            }
            ExecNode::Strip { child, columns } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let mut out = Row::new();
                for column in columns.iter() {
                    out.set(column, row.get(column).cloned().unwrap_or(Value::Null));
                }
                Ok(Some(out))
            }
            ExecNode::Unwind {
                child,
                expression,
                variable,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                match evaluate(ctx, &row, expression)? {
                    Value::Null => {}
                    Value::List(items) => {
                        for item in items {
                            staged.push_back(row.with(variable, item));
                        }
                    }
                    other => {
                        return Err(Error::TypeError(format!(
                            "UNWIND expects a list, got {}",
                            other.kind().name()
                        )));
                    }
                }
            },
            ExecNode::Distinct {
                child,
                columns,
                seen,
            } => loop {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let key: Vec<Value> = columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                if seen.insert(key) {
                    return Ok(Some(row));
                }
            },
            ExecNode::Sort {
                child,
                items,
                sorted,
            } => {
                if sorted.is_none() {
                    let mut rows = Vec::new();
                    while let Some(row) = child.next(ctx)? {
                        let mut keys = Vec::with_capacity(items.len());
                        for (expr, _) in items.iter() {
                            keys.push(sort_key(ctx, &row, expr)?);
                        }
                        rows.push((row, keys));
                    }
                    let directions: Vec<bool> = items.iter().map(|(_, asc)| *asc).collect();
                    rows.sort_by(|a, b| {
                        for (idx, ascending) in directions.iter().enumerate() {
                            let ord = a.1[idx].cypher_cmp(&b.1[idx]);
                            if ord != std::cmp::Ordering::Equal {
                                return if *ascending { ord } else { ord.reverse() };
                            }
                        }
                        std::cmp::Ordering::Equal
                    });
                    *sorted = Some(rows.into_iter().map(|(row, _)| row).collect());
                }
                Ok(sorted.as_mut().and_then(VecDeque::pop_front))
            }
            ExecNode::Skip {
                child,
                expression,
                remaining,
            } => {
                if remaining.is_none() {
                    *remaining = Some(paging_count(ctx, expression, "SKIP")?);
                }
                loop {
                    let Some(row) = child.next(ctx)? else {
                        return Ok(None);
                    };
                    let left = remaining.as_mut().expect("initialized");
                    if *left > 0 {
                        *left -= 1;
                        continue;
                    }
                    return Ok(Some(row));
                }
            }
            ExecNode::Limit {
                child,
                expression,
                remaining,
            } => {
                if remaining.is_none() {
                    *remaining = Some(paging_count(ctx, expression, "LIMIT")?);
                }
                let left = remaining.as_mut().expect("initialized");
                if *left <= 0 {
                    return Ok(None);
                }
                match child.next(ctx)? {
                    Some(row) => {
                        *left -= 1;
                        Ok(Some(row))
                    }
                    None => Ok(None),
                }
            }
            ExecNode::Aggregate {
                child,
                group,
                aggregates,
                output,
            } => {
                if output.is_none() {
                    *output = Some(aggregate_all(ctx, child, group, aggregates)?);
                }
                Ok(output.as_mut().and_then(VecDeque::pop_front))
            }
            ExecNode::ProjectPath {
                child,
                variable,
                parts,
            } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let path = build_path(ctx, &row, parts)?;
                Ok(Some(row.with(variable, path)))
            }
            ExecNode::Create { child, patterns } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let mut row = row;
                for pattern in patterns.iter() {
                    apply_create(ctx, &mut row, pattern)?;
                }
                Ok(Some(row))
            }
            ExecNode::Merge {
                child,
                pattern,
                on_create,
                on_match,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                staged.extend(apply_merge(ctx, &row, pattern, on_create, on_match)?);
            },
            ExecNode::SetItems { child, items } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let mut row = row;
                apply_set_items(ctx, &mut row, items)?;
                Ok(Some(row))
            }
            ExecNode::RemoveItems { child, items } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let mut row = row;
                apply_remove_items(ctx, &mut row, items)?;
                Ok(Some(row))
            }
            ExecNode::Delete {
                child,
                detach,
                expressions,
            } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                for expr in expressions.iter() {
                    let value = evaluate(ctx, &row, expr)?;
                    delete_value(ctx, &value, *detach)?;
                }
                Ok(Some(row))
            }
            ExecNode::Foreach {
                child,
                variable,
                list,
                updates,
            } => {
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                apply_foreach(ctx, &row, variable, list, updates)?;
                Ok(Some(row))
            }
            ExecNode::CallProcedure {
                child,
                name,
                arguments,
                yields,
                staged,
            } => loop {
                if let Some(row) = staged.pop_front() {
                    return Ok(Some(row));
                }
                let Some(row) = child.next(ctx)? else {
                    return Ok(None);
                };
                let procedure = ctx
                    .procedures
                    .get(name)
                    .ok_or_else(|| Error::SemanticError(format!("unknown procedure: {name}")))?;
                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments.iter() {
                    args.push(evaluate(ctx, &row, arg)?);
                }
                let results = procedure.call(ctx.store, &args)?;
                for result in results {
                    let mut out = row.clone();
                    if yields.is_empty() {
                        for (column, value) in result {
                            out.set(&column, value);
                        }
                    } else {
                        for (column, alias) in yields.iter() {
                            let value = result
                                .iter()
                                .find(|(k, _)| k == column)
                                .map(|(_, v)| v.clone())
                                .ok_or_else(|| {
                                    Error::SemanticError(format!(
                                        "procedure {name} does not yield '{column}'"
                                    ))
                                })?;
                            out.set(alias, value);
                        }
                    }
                    staged.push_back(out);
                }
            },
        }
    }
}

/// `ORDER BY` items first resolve against a projected column of the same
/// text, then fall back to evaluation against the full row.
fn sort_key(ctx: &mut ExecContext, row: &Row, expr: &Expression) -> Result<Value> {
    if let Some(value) = row.get(&expression_text(expr)) {
        return Ok(value.clone());
    }
    evaluate(ctx, row, expr)
}

fn paging_count(ctx: &mut ExecContext, expression: &Expression, clause: &str) -> Result<i64> {
    let value = evaluate(ctx, &Row::new(), expression)?;
    match value {
        Value::Int(n) if n >= 0 => Ok(n),
        other => Err(Error::SemanticError(format!(
            "{clause} expects a non-negative integer, got {other}"
        ))),
    }
}

// ---- expansion ----

fn pattern_direction(direction: PatternDirection) -> Direction {
    match direction {
        PatternDirection::Outgoing => Direction::Outgoing,
        PatternDirection::Incoming => Direction::Incoming,
        PatternDirection::Undirected => Direction::Both,
    }
}

fn hop_bounds(length: Option<VarLength>, cap: usize) -> (u32, u32) {
    match length {
        None => (1, 1),
        Some(len) => (len.min.unwrap_or(1), len.max.unwrap_or(cap as u32)),
    }
}

/// Bounded BFS from `from`: paths ordered by hop count, then by the
/// relationship-id sequence. A path never reuses a relationship.
#[allow(clippy::too_many_arguments)]
fn expand_paths(
    ctx: &mut ExecContext,
    row: &Row,
    from: NodeId,
    types: &[String],
    direction: PatternDirection,
    min: u32,
    max: u32,
    rel_props: &[(String, Expression)],
) -> Result<Vec<(Vec<Relationship>, Node)>> {
    let dir = pattern_direction(direction);
    let mut out = Vec::new();

    if min == 0 {
        out.push((Vec::new(), ctx.store.get_node(from)?));
    }

    // Evaluate pattern property expressions once per input row.
    let mut wanted = Vec::with_capacity(rel_props.len());
    for (key, expr) in rel_props {
        wanted.push((key.clone(), evaluate(ctx, row, expr)?));
    }

    let mut frontier: Vec<(Vec<Relationship>, NodeId)> = vec![(Vec::new(), from)];
    for depth in 1..=max {
        let mut next_frontier = Vec::new();
        for (path, node_id) in &frontier {
            ctx.check_canceled()?;
            let type_filter = if types.len() == 1 {
                Some(types[0].as_str())
            } else {
                None
            };
            let neighbors = ctx.store.neighbors(*node_id, dir, type_filter)?;
            for (rel, end) in neighbors {
                if types.len() > 1 && !types.iter().any(|t| *t == rel.rel_type) {
                    continue;
                }
                if path.iter().any(|r| r.id == rel.id) {
                    continue;
                }
                let admitted = wanted.iter().all(|(key, value)| {
                    rel.properties
                        .get(key)
                        .map(|have| values_equal(have, value) == Some(true))
                        .unwrap_or(false)
                });
                if !admitted {
                    continue;
                }
                let mut new_path = path.clone();
                new_path.push(rel);
                if depth >= min {
                    out.push((new_path.clone(), end.clone()));
                }
                next_frontier.push((new_path, end.id));
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }
    Ok(out)
}

/// Expands one input row, staging every produced row. Returns whether
/// anything was emitted.
fn expand_row(
    ctx: &mut ExecContext,
    spec: &ExpandSpec,
    row: &Row,
    staged: &mut VecDeque<Row>,
) -> Result<bool> {
    let from = match row.get(&spec.from) {
        Some(Value::Node(node)) => node.clone(),
        Some(Value::Null) | None => return Ok(false),
        Some(other) => {
            return Err(Error::SemanticError(format!(
                "variable '{}' is bound to a {}, expected a node",
                spec.from,
                other.kind().name()
            )));
        }
    };
    let bound_to: Option<NodeId> = match row.get(&spec.to) {
        Some(Value::Node(node)) => Some(node.id),
        Some(Value::Null) => return Ok(false),
        _ => None,
    };

    let cap = ctx.store.options().max_traversal_depth;
    let (min, max) = hop_bounds(spec.length, cap);
    let paths = expand_paths(
        ctx,
        row,
        from.id,
        &spec.types,
        spec.direction,
        min,
        max,
        &spec.rel_props,
    )?;

    let mut emitted = false;
    for (rels, end) in paths {
        if let Some(bound) = bound_to {
            if end.id != bound {
                continue;
            }
        }
        let mut out = row.clone();
        let rel_value = if spec.length.is_some() {
            Value::List(rels.into_iter().map(Value::Relationship).collect())
        } else {
            match rels.into_iter().next() {
                Some(rel) => Value::Relationship(rel),
                None => Value::Null,
            }
        };
        out.set(&spec.rel_variable, rel_value);
        if bound_to.is_none() {
            out.set(&spec.to, Value::Node(end));
        }
        staged.push_back(out);
        emitted = true;
    }
    Ok(emitted)
}

// ---- pattern matching for MERGE and pattern expressions ----

/// All assignments of `pattern` that extend `seed`, as rows. Relationship
/// uniqueness holds across the whole pattern.
pub(crate) fn match_pattern_rows(
    ctx: &mut ExecContext,
    seed: &Row,
    pattern: &Pattern,
) -> Result<Vec<Row>> {
    let Some(PatternElement::Node(first)) = pattern.elements.first() else {
        return Err(Error::SemanticError("empty pattern".to_string()));
    };
    let mut out = Vec::new();
    for node in node_candidates(ctx, seed, first)? {
        let mut row = seed.clone();
        if let Some(var) = &first.variable {
            row.set(var, Value::Node(node.clone()));
        }
        let mut used = Vec::new();
        match_step(ctx, &pattern.elements, 1, node, row, &mut used, &mut out)?;
    }
    Ok(out)
}

fn match_step(
    ctx: &mut ExecContext,
    elements: &[PatternElement],
    index: usize,
    current: Node,
    row: Row,
    used: &mut Vec<RelationshipId>,
    out: &mut Vec<Row>,
) -> Result<()> {
    if index >= elements.len() {
        out.push(row);
        return Ok(());
    }
    let PatternElement::Relationship(rel_pattern) = &elements[index] else {
        return Err(Error::SemanticError("malformed pattern".to_string()));
    };
    let PatternElement::Node(node_pattern) = &elements[index + 1] else {
        return Err(Error::SemanticError("malformed pattern".to_string()));
    };

    let cap = ctx.store.options().max_traversal_depth;
    let (min, max) = hop_bounds(rel_pattern.length, cap);
    let paths = expand_paths(
        ctx,
        &row,
        current.id,
        &rel_pattern.types,
        rel_pattern.direction,
        min,
        max,
        &rel_pattern.properties,
    )?;

    for (rels, end) in paths {
        if rels.iter().any(|r| used.contains(&r.id)) {
            continue;
        }
        if !node_admits(ctx, &row, &end, node_pattern)? {
            continue;
        }
        let mut new_row = row.clone();
        if let Some(var) = &rel_pattern.variable {
            let value = if rel_pattern.length.is_some() {
                Value::List(rels.iter().cloned().map(Value::Relationship).collect())
            } else {
                match rels.first() {
                    Some(rel) => Value::Relationship(rel.clone()),
                    None => Value::Null,
                }
            };
            new_row.set(var, value);
        }
        if let Some(var) = &node_pattern.variable {
            new_row.set(var, Value::Node(end.clone()));
        }
        let added = rels.len();
        used.extend(rels.iter().map(|r| r.id));
        match_step(ctx, elements, index + 2, end, new_row, used, out)?;
        used.truncate(used.len() - added);
    }
    Ok(())
}

fn node_candidates(ctx: &mut ExecContext, row: &Row, pattern: &NodePattern) -> Result<Vec<Node>> {
    if let Some(var) = &pattern.variable {
        match row.get(var) {
            Some(Value::Node(node)) => {
                let node = node.clone();
                return if node_admits(ctx, row, &node, pattern)? {
                    Ok(vec![node])
                } else {
                    Ok(Vec::new())
                };
            }
            Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => {
                return Err(Error::SemanticError(format!(
                    "variable '{var}' is bound to a {}, expected a node",
                    other.kind().name()
                )));
            }
            None => {}
        }
    }
    let mut props = std::collections::BTreeMap::new();
    for (key, expr) in &pattern.properties {
        props.insert(key.clone(), evaluate(ctx, row, expr)?);
    }
    ctx.store.match_nodes(&pattern.labels, &props)
}

/// Whether `node` satisfies a node pattern's labels, properties and any
/// existing binding of its variable.
fn node_admits(
    ctx: &mut ExecContext,
    row: &Row,
    node: &Node,
    pattern: &NodePattern,
) -> Result<bool> {
    if let Some(var) = &pattern.variable {
        if let Some(Value::Node(bound)) = row.get(var) {
            if bound.id != node.id {
                return Ok(false);
            }
        }
    }
    if !pattern.labels.iter().all(|l| node.has_label(l)) {
        return Ok(false);
    }
    for (key, expr) in &pattern.properties {
        let wanted = evaluate(ctx, row, expr)?;
        let have = node.properties.get(key);
        if have.map(|v| values_equal(v, &wanted) == Some(true)) != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

// ---- writes ----

fn evaluate_property_map(
    ctx: &mut ExecContext,
    row: &Row,
    pairs: &[(String, Expression)],
) -> Result<std::collections::BTreeMap<String, Value>> {
    let mut out = std::collections::BTreeMap::new();
    for (key, expr) in pairs {
        let value = evaluate(ctx, row, expr)?;
        if !value.is_null() {
            out.insert(key.clone(), value);
        }
    }
    Ok(out)
}

fn apply_create(ctx: &mut ExecContext, row: &mut Row, pattern: &Pattern) -> Result<()> {
    create_pattern(ctx, row, pattern, false)
}

/// Creates the pattern. With `reuse_bound` (MERGE), bound node variables are
/// taken as-is; plain CREATE rejects rebinding a constrained variable.
fn create_pattern(
    ctx: &mut ExecContext,
    row: &mut Row,
    pattern: &Pattern,
    reuse_bound: bool,
) -> Result<()> {
    let mut node_ids: Vec<NodeId> = Vec::new();

    for element in &pattern.elements {
        let PatternElement::Node(node_pattern) = element else {
            continue;
        };
        let existing = node_pattern
            .variable
            .as_ref()
            .and_then(|var| row.get(var).cloned());
        match existing {
            Some(Value::Node(node)) => {
                if !reuse_bound
                    && (!node_pattern.labels.is_empty() || !node_pattern.properties.is_empty())
                {
                    return Err(Error::SemanticError(format!(
                        "variable '{}' is already bound",
                        node_pattern.variable.as_deref().unwrap_or_default()
                    )));
                }
                node_ids.push(node.id);
            }
            Some(Value::Null) => {
                return Err(Error::SemanticError(
                    "cannot create a pattern over a null binding".to_string(),
                ));
            }
            Some(other) => {
                return Err(Error::TypeError(format!(
                    "expected a node binding, got {}",
                    other.kind().name()
                )));
            }
            None => {
                let properties = evaluate_property_map(ctx, row, &node_pattern.properties)?;
                let node = ctx.store.create_node(&node_pattern.labels, properties)?;
                node_ids.push(node.id);
                if let Some(var) = &node_pattern.variable {
                    row.set(var, Value::Node(node));
                }
            }
        }
    }

    for (position, element) in pattern.elements.iter().enumerate() {
        let PatternElement::Relationship(rel_pattern) = element else {
            continue;
        };
        let rel = create_pattern_relationship(ctx, row, rel_pattern, &node_ids, position)?;
        if let Some(var) = &rel_pattern.variable {
            row.set(var, Value::Relationship(rel));
        }
    }
    Ok(())
}

fn create_pattern_relationship(
    ctx: &mut ExecContext,
    row: &Row,
    rel_pattern: &RelationshipPattern,
    node_ids: &[NodeId],
    position: usize,
) -> Result<Relationship> {
    if rel_pattern.length.is_some() {
        return Err(Error::SemanticError(
            "variable-length relationships cannot be created".to_string(),
        ));
    }
    if rel_pattern.types.len() != 1 {
        return Err(Error::SemanticError(
            "creating a relationship requires exactly one type".to_string(),
        ));
    }
    let left = node_ids[(position - 1) / 2];
    let right = node_ids[(position + 1) / 2];
    let (source, target) = match rel_pattern.direction {
        PatternDirection::Outgoing => (left, right),
        PatternDirection::Incoming => (right, left),
        PatternDirection::Undirected => {
            return Err(Error::SemanticError(
                "creating a relationship requires a direction".to_string(),
            ));
        }
    };
    let properties = evaluate_property_map(ctx, row, &rel_pattern.properties)?;
    ctx.store
        .create_relationship(source, target, &rel_pattern.types[0], properties)
}

fn apply_merge(
    ctx: &mut ExecContext,
    row: &Row,
    pattern: &Pattern,
    on_create: &[SetItem],
    on_match: &[SetItem],
) -> Result<Vec<Row>> {
    let matches = match_pattern_rows(ctx, row, pattern)?;
    if !matches.is_empty() {
        let mut out = Vec::with_capacity(matches.len());
        for mut matched in matches {
            apply_set_items(ctx, &mut matched, on_match)?;
            out.push(matched);
        }
        return Ok(out);
    }

    let mut created = row.clone();
    create_pattern(ctx, &mut created, pattern, true)?;
    apply_set_items(ctx, &mut created, on_create)?;
    Ok(vec![created])
}

pub(crate) fn apply_set_items(
    ctx: &mut ExecContext,
    row: &mut Row,
    items: &[SetItem],
) -> Result<()> {
    for item in items {
        match item {
            SetItem::Property {
                variable,
                property,
                value,
            } => {
                let target = row.get(variable).cloned();
                let new_value = evaluate(ctx, row, value)?;
                let mut patch = std::collections::BTreeMap::new();
                patch.insert(property.clone(), new_value);
                match target {
                    Some(Value::Node(node)) => {
                        let updated =
                            ctx.store
                                .update_node_properties(node.id, patch, PatchMode::Merge)?;
                        row.set(variable, Value::Node(updated));
                    }
                    Some(Value::Relationship(rel)) => {
                        let updated = ctx.store.update_relationship_properties(
                            rel.id,
                            patch,
                            PatchMode::Merge,
                        )?;
                        row.set(variable, Value::Relationship(updated));
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(Error::TypeError(format!(
                            "SET expects a node or relationship, got {}",
                            other.kind().name()
                        )));
                    }
                }
            }
            SetItem::Properties {
                variable,
                value,
                merge,
            } => {
                let target = row.get(variable).cloned();
                let patch = match evaluate(ctx, row, value)? {
                    Value::Map(map) => map,
                    Value::Node(node) => node.properties,
                    Value::Relationship(rel) => rel.properties,
                    Value::Null => continue,
                    other => {
                        return Err(Error::TypeError(format!(
                            "SET {variable} = ... expects a map, got {}",
                            other.kind().name()
                        )));
                    }
                };
                let mode = if *merge {
                    PatchMode::Merge
                } else {
                    PatchMode::Replace
                };
                match target {
                    Some(Value::Node(node)) => {
                        let updated = ctx.store.update_node_properties(node.id, patch, mode)?;
                        row.set(variable, Value::Node(updated));
                    }
                    Some(Value::Relationship(rel)) => {
                        let updated =
                            ctx.store.update_relationship_properties(rel.id, patch, mode)?;
                        row.set(variable, Value::Relationship(updated));
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(Error::TypeError(format!(
                            "SET expects a node or relationship, got {}",
                            other.kind().name()
                        )));
                    }
                }
            }
            SetItem::Labels { variable, labels } => match row.get(variable).cloned() {
                Some(Value::Node(node)) => {
                    let updated = ctx.store.add_labels(node.id, labels)?;
                    row.set(variable, Value::Node(updated));
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(Error::TypeError(format!(
                        "SET :Label expects a node, got {}",
                        other.kind().name()
                    )));
                }
            },
        }
    }
    Ok(())
}

fn apply_remove_items(ctx: &mut ExecContext, row: &mut Row, items: &[RemoveItem]) -> Result<()> {
    for item in items {
        match item {
            RemoveItem::Property { variable, property } => {
                let mut patch = std::collections::BTreeMap::new();
                patch.insert(property.clone(), Value::Null);
                match row.get(variable).cloned() {
                    Some(Value::Node(node)) => {
                        let updated =
                            ctx.store
                                .update_node_properties(node.id, patch, PatchMode::Merge)?;
                        row.set(variable, Value::Node(updated));
                    }
                    Some(Value::Relationship(rel)) => {
                        let updated = ctx.store.update_relationship_properties(
                            rel.id,
                            patch,
                            PatchMode::Merge,
                        )?;
                        row.set(variable, Value::Relationship(updated));
                    }
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        return Err(Error::TypeError(format!(
                            "REMOVE expects a node or relationship, got {}",
                            other.kind().name()
                        )));
                    }
                }
            }
            RemoveItem::Labels { variable, labels } => match row.get(variable).cloned() {
                Some(Value::Node(node)) => {
                    let updated = ctx.store.remove_labels(node.id, labels)?;
                    row.set(variable, Value::Node(updated));
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(Error::TypeError(format!(
                        "REMOVE :Label expects a node, got {}",
                        other.kind().name()
                    )));
                }
            },
        }
    }
    Ok(())
}

fn delete_value(ctx: &mut ExecContext, value: &Value, detach: bool) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::Node(node) => match ctx.store.delete_node(node.id, detach) {
            Ok(()) => Ok(()),
            // Another row already deleted it.
            Err(Error::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        },
        Value::Relationship(rel) => match ctx.store.delete_relationship(rel.id) {
            Ok(()) => Ok(()),
            Err(Error::NotFound(_)) => Ok(()),
            Err(other) => Err(other),
        },
        Value::Path(path) => {
            for rel in &path.relationships {
                match ctx.store.delete_relationship(rel.id) {
                    Ok(()) | Err(Error::NotFound(_)) => {}
                    Err(other) => return Err(other),
                }
            }
            for node in &path.nodes {
                match ctx.store.delete_node(node.id, detach) {
                    Ok(()) | Err(Error::NotFound(_)) => {}
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }
        Value::List(items) => {
            for item in items {
                delete_value(ctx, item, detach)?;
            }
            Ok(())
        }
        other => Err(Error::TypeError(format!(
            "DELETE expects nodes, relationships or paths, got {}",
            other.kind().name()
        ))),
    }
}

fn apply_foreach(
    ctx: &mut ExecContext,
    row: &Row,
    variable: &str,
    list: &Expression,
    updates: &[Clause],
) -> Result<()> {
    let items = match evaluate(ctx, row, list)? {
        Value::Null => return Ok(()),
        Value::List(items) => items,
        other => {
            return Err(Error::TypeError(format!(
                "FOREACH expects a list, got {}",
                other.kind().name()
            )));
        }
    };
    for item in items {
        let mut scoped = row.with(variable, item);
        apply_update_clauses(ctx, &mut scoped, updates)?;
    }
    Ok(())
}

fn apply_update_clauses(ctx: &mut ExecContext, row: &mut Row, updates: &[Clause]) -> Result<()> {
    for clause in updates {
        match clause {
            Clause::Create(create) => {
                for pattern in &create.patterns {
                    apply_create(ctx, row, pattern)?;
                }
            }
            Clause::Merge(merge) => {
                let rows = apply_merge(ctx, row, &merge.pattern, &merge.on_create, &merge.on_match)?;
                // Keep the first binding for subsequent update clauses.
                if let Some(first) = rows.into_iter().next() {
                    *row = first;
                }
            }
            Clause::Set(set) => apply_set_items(ctx, row, &set.items)?,
            Clause::Remove(remove) => apply_remove_items(ctx, row, &remove.items)?,
            Clause::Delete(delete) => {
                for expr in &delete.expressions {
                    let value = evaluate(ctx, row, expr)?;
                    delete_value(ctx, &value, delete.detach)?;
                }
            }
            Clause::Foreach(foreach) => {
                apply_foreach(ctx, row, &foreach.variable, &foreach.list, &foreach.updates)?;
            }
            other => {
                return Err(Error::SemanticError(format!(
                    "clause not allowed inside FOREACH: {other:?}"
                )));
            }
        }
    }
    Ok(())
}

// ---- aggregation ----

fn aggregate_all(
    ctx: &mut ExecContext,
    child: &mut ExecNode,
    group: &[(Expression, String)],
    aggregates: &[AggregateSpec],
) -> Result<VecDeque<Row>> {
    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut groups: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();

    while let Some(row) = child.next(ctx)? {
        let mut key = Vec::with_capacity(group.len());
        for (expr, _) in group {
            key.push(evaluate(ctx, &row, expr)?);
        }
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    // A global aggregation over zero rows still emits one row.
    if order.is_empty() && group.is_empty() {
        order.push(Vec::new());
        groups.insert(Vec::new(), Vec::new());
    }

    let mut out = VecDeque::with_capacity(order.len());
    for key in order {
        let rows = groups.remove(&key).unwrap_or_default();
        let mut result = Row::new();
        for ((_, name), value) in group.iter().zip(key.into_iter()) {
            result.set(name, value);
        }
        for spec in aggregates {
            let value = compute_aggregate(ctx, spec, &rows)?;
            result.set(&spec.alias, value);
        }
        out.push_back(result);
    }
    Ok(out)
}

fn compute_aggregate(
    ctx: &mut ExecContext,
    spec: &AggregateSpec,
    rows: &[Row],
) -> Result<Value> {
    // count(*) counts rows; everything else works over non-null argument
    // values, deduplicated first when DISTINCT.
    if spec.function == "count" && spec.argument.is_none() {
        return Ok(Value::Int(rows.len() as i64));
    }
    let argument = spec.argument.as_ref().ok_or_else(|| {
        Error::SemanticError(format!("{}() requires an argument", spec.function))
    })?;

    let mut values = Vec::with_capacity(rows.len());
    let mut seen = HashSet::new();
    for row in rows {
        let value = evaluate(ctx, row, argument)?;
        if value.is_null() {
            continue;
        }
        if spec.distinct && !seen.insert(value.clone()) {
            continue;
        }
        values.push(value);
    }

    match spec.function.as_str() {
        "count" => Ok(Value::Int(values.len() as i64)),
        "collect" => Ok(Value::List(values)),
        "sum" => {
            let mut int_sum = 0i64;
            let mut float_sum = 0f64;
            let mut any_float = false;
            for value in &values {
                match value {
                    Value::Int(i) => {
                        int_sum = int_sum.wrapping_add(*i);
                        float_sum += *i as f64;
                    }
                    Value::Float(f) => {
                        any_float = true;
                        float_sum += f;
                    }
                    other => {
                        return Err(Error::TypeError(format!(
                            "sum() over a {}",
                            other.kind().name()
                        )));
                    }
                }
            }
            Ok(if any_float {
                Value::Float(float_sum)
            } else {
                Value::Int(int_sum)
            })
        }
        "avg" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0f64;
            for value in &values {
                total += value.as_f64().ok_or_else(|| {
                    Error::TypeError(format!("avg() over a {}", value.kind().name()))
                })?;
            }
            Ok(Value::Float(total / values.len() as f64))
        }
        "min" => Ok(values
            .into_iter()
            .min_by(|a, b| a.cypher_cmp(b))
            .unwrap_or(Value::Null)),
        "max" => Ok(values
            .into_iter()
            .max_by(|a, b| a.cypher_cmp(b))
            .unwrap_or(Value::Null)),
        "stdev" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            if values.len() == 1 {
                return Ok(Value::Float(0.0));
            }
            let mut nums = Vec::with_capacity(values.len());
            for value in &values {
                nums.push(value.as_f64().ok_or_else(|| {
                    Error::TypeError(format!("stdev() over a {}", value.kind().name()))
                })?);
            }
            let mean = nums.iter().sum::<f64>() / nums.len() as f64;
            let variance =
                nums.iter().map(|n| (n - mean) * (n - mean)).sum::<f64>() / (nums.len() - 1) as f64;
            Ok(Value::Float(variance.sqrt()))
        }
        other => Err(Error::SemanticError(format!(
            "unknown aggregate function: {other}()"
        ))),
    }
}

// ---- named paths ----

/// Materializes a path from bound pattern variables, walking relationship
/// lists to recover intermediate nodes.
fn build_path(ctx: &mut ExecContext, row: &Row, parts: &[PathPart]) -> Result<Value> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut relationships: Vec<Relationship> = Vec::new();

    let first = match parts.first() {
        Some(PathPart::Node(var)) => var,
        _ => return Err(Error::SemanticError("path must start at a node".to_string())),
    };
    let mut current = match row.get(first) {
        Some(Value::Node(node)) => node.clone(),
        Some(Value::Null) | None => return Ok(Value::Null),
        Some(other) => {
            return Err(Error::TypeError(format!(
                "path variable over a {}",
                other.kind().name()
            )));
        }
    };
    nodes.push(current.clone());

    for part in &parts[1..] {
        let PathPart::Rel(var) = part else {
            // Node parts are recovered from the relationship walk.
            continue;
        };
        let rels: Vec<Relationship> = match row.get(var) {
            Some(Value::Relationship(rel)) => vec![rel.clone()],
            Some(Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Relationship(rel) => out.push(rel.clone()),
                        _ => return Ok(Value::Null),
                    }
                }
                out
            }
            Some(Value::Null) | None => return Ok(Value::Null),
            Some(other) => {
                return Err(Error::TypeError(format!(
                    "path relationship over a {}",
                    other.kind().name()
                )));
            }
        };
        for rel in rels {
            let next_id = rel.other_end(current.id);
            relationships.push(rel);
            current = ctx.store.get_node(next_id)?;
            nodes.push(current.clone());
        }
    }

    Ok(Value::Path(PathValue {
        nodes,
        relationships,
    }))
}
