//! AST to logical plan translation.
//!
//! Planning rules: label and property-equality pushdown into scans (a
//! matching property index wins over a label scan, which wins over a full
//! scan), anchor selection on the most selective pattern element, and
//! placement of each WHERE conjunct at the earliest operator that has all
//! of its variables bound.

use std::collections::HashSet;

use plexus_core::{Error, Result};
use plexus_storage::GraphStore;

use crate::ast::*;
use crate::plan::*;

/// A fully planned statement.
pub enum Planned {
    Query {
        plan: Plan,
        /// Output column names; `None` means derive them at runtime.
        columns: Option<Vec<String>>,
    },
    CreateIndex(CreateIndexClause),
    CreateConstraint(CreateConstraintClause),
}

pub struct Planner<'a> {
    store: &'a GraphStore,
    anon: usize,
}

impl<'a> Planner<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store, anon: 0 }
    }

    pub fn plan(&mut self, query: Query) -> Result<Planned> {
        // Schema statements stand alone.
        if let [clause] = query.clauses.as_slice() {
            match clause {
                Clause::CreateIndex(ci) => return Ok(Planned::CreateIndex(ci.clone())),
                Clause::CreateConstraint(cc) => {
                    return Ok(Planned::CreateConstraint(cc.clone()));
                }
                _ => {}
            }
        }

        let mut plan = Plan::SingleRow;
        let mut bound: HashSet<String> = HashSet::new();
        let mut columns: Option<Vec<String>> = None;
        let total = query.clauses.len();

        for (position, clause) in query.clauses.into_iter().enumerate() {
            if columns.is_some() {
                return Err(Error::SemanticError(
                    "RETURN must be the final clause".to_string(),
                ));
            }
            match clause {
                Clause::CreateIndex(_) | Clause::CreateConstraint(_) => {
                    return Err(Error::SemanticError(
                        "schema clauses cannot be combined with other clauses".to_string(),
                    ));
                }
                Clause::Match(m) => {
                    plan = self.plan_match(plan, m, &mut bound)?;
                }
                Clause::With(w) => {
                    let (new_plan, out) = self.plan_projection(
                        plan,
                        w.items,
                        w.distinct,
                        w.order_by,
                        w.skip,
                        w.limit,
                        w.where_clause,
                        &bound,
                    )?;
                    plan = new_plan;
                    bound = out.iter().cloned().collect();
                }
                Clause::Unwind(u) => {
                    bound.insert(u.alias.clone());
                    plan = Plan::Unwind {
                        input: Box::new(plan),
                        expression: u.expression,
                        variable: u.alias,
                    };
                }
                Clause::Return(r) => {
                    let (new_plan, out) = self.plan_projection(
                        plan,
                        r.items,
                        r.distinct,
                        r.order_by,
                        r.skip,
                        r.limit,
                        None,
                        &bound,
                    )?;
                    plan = new_plan;
                    columns = Some(out);
                }
                Clause::Create(c) => {
                    plan = self.plan_create(plan, c.patterns, &mut bound)?;
                }
                Clause::Merge(m) => {
                    let pattern = self.name_pattern(m.pattern);
                    for var in pattern_variables(&pattern) {
                        bound.insert(var);
                    }
                    plan = Plan::Merge {
                        input: Box::new(plan),
                        pattern,
                        on_create: m.on_create,
                        on_match: m.on_match,
                    };
                }
                Clause::Set(s) => {
                    plan = Plan::SetItems {
                        input: Box::new(plan),
                        items: s.items,
                    };
                }
                Clause::Remove(r) => {
                    plan = Plan::RemoveItems {
                        input: Box::new(plan),
                        items: r.items,
                    };
                }
                Clause::Delete(d) => {
                    plan = Plan::Delete {
                        input: Box::new(plan),
                        detach: d.detach,
                        expressions: d.expressions,
                    };
                }
                Clause::Foreach(f) => {
                    plan = Plan::Foreach {
                        input: Box::new(plan),
                        variable: f.variable,
                        list: f.list,
                        updates: f.updates,
                    };
                }
                Clause::Call(c) => {
                    let yields: Vec<(String, String)> = c
                        .yields
                        .clone()
                        .unwrap_or_default()
                        .into_iter()
                        .map(|item| {
                            let bound_name = item.alias.clone().unwrap_or_else(|| item.name.clone());
                            (item.name, bound_name)
                        })
                        .collect();
                    for (_, name) in &yields {
                        bound.insert(name.clone());
                    }
                    let is_last = position + 1 == total;
                    if is_last && !yields.is_empty() {
                        columns = Some(yields.iter().map(|(_, name)| name.clone()).collect());
                    } else if is_last {
                        columns = None;
                    }
                    plan = Plan::CallProcedure {
                        input: Box::new(plan),
                        name: c.name,
                        arguments: c.arguments,
                        yields,
                    };
                    if is_last {
                        return Ok(Planned::Query { plan, columns });
                    }
                }
            }
        }

        Ok(Planned::Query { plan, columns })
    }

    // ---- MATCH ----

    fn plan_match(
        &mut self,
        input: Plan,
        clause: MatchClause,
        bound: &mut HashSet<String>,
    ) -> Result<Plan> {
        if clause.optional {
            let mut inner_bound = bound.clone();
            let mut subplan = Plan::SingleRow;
            let mut conjuncts = clause
                .where_clause
                .map(|w| split_conjuncts(w.expression))
                .unwrap_or_default();
            for pattern in clause.patterns {
                subplan = self.plan_pattern(subplan, pattern, &mut conjuncts, &mut inner_bound)?;
            }
            for conjunct in conjuncts {
                subplan = Plan::Filter {
                    input: Box::new(subplan),
                    predicate: conjunct,
                };
            }
            let introduced: Vec<String> = inner_bound
                .difference(bound)
                .filter(|name| !name.starts_with("__anon"))
                .cloned()
                .collect();
            bound.extend(introduced.iter().cloned());
            return Ok(Plan::Optional {
                input: Box::new(input),
                subplan: Box::new(subplan),
                introduced,
            });
        }

        let mut plan = input;
        let mut conjuncts = clause
            .where_clause
            .map(|w| split_conjuncts(w.expression))
            .unwrap_or_default();
        for pattern in clause.patterns {
            plan = self.plan_pattern(plan, pattern, &mut conjuncts, bound)?;
        }
        for conjunct in conjuncts {
            plan = Plan::Filter {
                input: Box::new(plan),
                predicate: conjunct,
            };
        }
        Ok(plan)
    }

    /// Plans one linear pattern: anchor scan, then expansion outward with
    /// conjuncts attached as soon as their variables are bound.
    fn plan_pattern(
        &mut self,
        input: Plan,
        pattern: Pattern,
        conjuncts: &mut Vec<Expression>,
        bound: &mut HashSet<String>,
    ) -> Result<Plan> {
        let pattern = self.name_pattern(pattern);
        let path_variable = pattern.variable.clone();

        // Property maps become equality conjuncts over the named elements.
        for element in &pattern.elements {
            match element {
                PatternElement::Node(n) => {
                    let var = n.variable.clone().expect("named by name_pattern");
                    for (key, value) in &n.properties {
                        conjuncts.push(property_equals(&var, key, value.clone()));
                    }
                }
                PatternElement::Relationship(r) => {
                    // Var-length relationship properties are checked per hop
                    // inside Expand; single-hop ones become conjuncts.
                    if r.length.is_none() {
                        let var = r.variable.clone().expect("named by name_pattern");
                        for (key, value) in &r.properties {
                            conjuncts.push(property_equals(&var, key, value.clone()));
                        }
                    }
                }
            }
        }

        // Two relationship slots in one pattern never bind the same edge.
        let rel_vars: Vec<String> = pattern
            .elements
            .iter()
            .filter_map(|e| match e {
                PatternElement::Relationship(r) if r.length.is_none() => r.variable.clone(),
                _ => None,
            })
            .collect();
        for i in 0..rel_vars.len() {
            for j in (i + 1)..rel_vars.len() {
                conjuncts.push(Expression::Binary(
                    Box::new(Expression::Variable(rel_vars[i].clone())),
                    BinaryOp::NotEq,
                    Box::new(Expression::Variable(rel_vars[j].clone())),
                ));
            }
        }

        let nodes: Vec<&NodePattern> = pattern
            .elements
            .iter()
            .filter_map(|e| match e {
                PatternElement::Node(n) => Some(n),
                PatternElement::Relationship(_) => None,
            })
            .collect();
        let anchor_idx = self.select_anchor(&nodes, conjuncts, bound);

        let mut plan = input;

        // Bind the anchor.
        let anchor = nodes[anchor_idx];
        let anchor_var = anchor.variable.clone().expect("named");
        let seek = if bound.contains(&anchor_var) {
            None
        } else {
            self.find_seek(anchor, conjuncts, bound)
        };
        plan = Plan::NodeScan {
            input: Box::new(plan),
            variable: anchor_var.clone(),
            labels: anchor.labels.clone(),
            seek,
        };
        bound.insert(anchor_var);
        plan = place_ready_conjuncts(plan, conjuncts, bound);

        // Expand rightward from the anchor, then leftward.
        plan = self.expand_walk(plan, &pattern, anchor_idx, true, conjuncts, bound)?;
        plan = self.expand_walk(plan, &pattern, anchor_idx, false, conjuncts, bound)?;

        if let Some(path_var) = path_variable {
            let parts = pattern
                .elements
                .iter()
                .map(|e| match e {
                    PatternElement::Node(n) => PathPart::Node(n.variable.clone().expect("named")),
                    PatternElement::Relationship(r) => {
                        PathPart::Rel(r.variable.clone().expect("named"))
                    }
                })
                .collect();
            bound.insert(path_var.clone());
            plan = Plan::ProjectPath {
                input: Box::new(plan),
                variable: path_var,
                parts,
            };
        }
        Ok(plan)
    }

    /// Walks node elements from the anchor in one direction, emitting an
    /// Expand per relationship element.
    fn expand_walk(
        &mut self,
        mut plan: Plan,
        pattern: &Pattern,
        anchor_idx: usize,
        rightward: bool,
        conjuncts: &mut Vec<Expression>,
        bound: &mut HashSet<String>,
    ) -> Result<Plan> {
        let node_count = pattern.elements.len() / 2 + 1;
        let steps: Vec<usize> = if rightward {
            (anchor_idx + 1..node_count).collect()
        } else {
            (0..anchor_idx).rev().collect()
        };

        for to_node_idx in steps {
            let from_node_idx = if rightward {
                to_node_idx - 1
            } else {
                to_node_idx + 1
            };
            let rel_idx = from_node_idx.min(to_node_idx) * 2 + 1;
            let rel = match &pattern.elements[rel_idx] {
                PatternElement::Relationship(r) => r,
                PatternElement::Node(_) => unreachable!("odd positions hold relationships"),
            };
            let to_node = match &pattern.elements[to_node_idx * 2] {
                PatternElement::Node(n) => n,
                PatternElement::Relationship(_) => unreachable!("even positions hold nodes"),
            };
            let from_var = match &pattern.elements[from_node_idx * 2] {
                PatternElement::Node(n) => n.variable.clone().expect("named"),
                PatternElement::Relationship(_) => unreachable!(),
            };
            let to_var = to_node.variable.clone().expect("named");

            // Direction is stored relative to the left-hand node; flip it
            // when walking right-to-left.
            let direction = if rightward {
                rel.direction
            } else {
                reverse_direction(rel.direction)
            };

            plan = Plan::Expand(ExpandSpec {
                input: Box::new(plan),
                from: from_var,
                to: to_var.clone(),
                rel_variable: rel.variable.clone().expect("named"),
                types: rel.types.clone(),
                direction,
                length: rel.length,
                rel_props: if rel.length.is_some() {
                    rel.properties.clone()
                } else {
                    Vec::new()
                },
            });
            bound.insert(rel.variable.clone().expect("named"));
            let newly_bound = bound.insert(to_var.clone());

            // Labels on the target are verified by a pass-through scan.
            if !to_node.labels.is_empty() && newly_bound {
                plan = Plan::NodeScan {
                    input: Box::new(plan),
                    variable: to_var,
                    labels: to_node.labels.clone(),
                    seek: None,
                };
            }
            plan = place_ready_conjuncts(plan, conjuncts, bound);
        }
        Ok(plan)
    }

    /// Most selective node element: already bound > indexed property
    /// equality > labeled > anything.
    fn select_anchor(
        &self,
        nodes: &[&NodePattern],
        conjuncts: &[Expression],
        bound: &HashSet<String>,
    ) -> usize {
        let mut best = 0usize;
        let mut best_score = -1i32;
        for (idx, node) in nodes.iter().enumerate() {
            let var = node.variable.as_deref().unwrap_or_default();
            let score = if bound.contains(var) {
                3
            } else if self.find_seek(node, conjuncts, bound).is_some() {
                2
            } else if !node.labels.is_empty() {
                1
            } else {
                0
            };
            if score > best_score {
                best_score = score;
                best = idx;
            }
        }
        best
    }

    /// A usable `(index, value)` seek for this node, if a property index
    /// covers one of its equality conjuncts.
    fn find_seek(
        &self,
        node: &NodePattern,
        conjuncts: &[Expression],
        bound: &HashSet<String>,
    ) -> Option<Seek> {
        let var = node.variable.as_deref()?;
        for label in &node.labels {
            for conjunct in conjuncts {
                let Some((c_var, property, value)) = as_property_equality(conjunct) else {
                    continue;
                };
                if c_var != var {
                    continue;
                }
                if !free_variables(&value).is_subset(bound) {
                    continue;
                }
                if let Ok(Some(index_name)) = self.store.property_index_for(label, &property) {
                    return Some(Seek {
                        index_name,
                        value,
                    });
                }
            }
        }
        None
    }

    fn plan_create(
        &mut self,
        input: Plan,
        patterns: Vec<Pattern>,
        bound: &mut HashSet<String>,
    ) -> Result<Plan> {
        let patterns: Vec<Pattern> = patterns
            .into_iter()
            .map(|p| self.name_pattern(p))
            .collect();
        for pattern in &patterns {
            for var in pattern_variables(pattern) {
                bound.insert(var);
            }
        }
        let mut plan = Plan::Create {
            input: Box::new(input),
            patterns: patterns.clone(),
        };
        for pattern in patterns {
            if let Some(path_var) = pattern.variable.clone() {
                let parts = pattern
                    .elements
                    .iter()
                    .map(|e| match e {
                        PatternElement::Node(n) => {
                            PathPart::Node(n.variable.clone().expect("named"))
                        }
                        PatternElement::Relationship(r) => {
                            PathPart::Rel(r.variable.clone().expect("named"))
                        }
                    })
                    .collect();
                bound.insert(path_var.clone());
                plan = Plan::ProjectPath {
                    input: Box::new(plan),
                    variable: path_var,
                    parts,
                };
            }
        }
        Ok(plan)
    }

    // ---- projections ----

    #[allow(clippy::too_many_arguments)]
    fn plan_projection(
        &mut self,
        input: Plan,
        items: Vec<ProjectionItem>,
        distinct: bool,
        order_by: Vec<OrderByItem>,
        skip: Option<Expression>,
        limit: Option<Expression>,
        where_clause: Option<WhereClause>,
        _bound: &HashSet<String>,
    ) -> Result<(Plan, Vec<String>)> {
        let has_aggregate = items.iter().any(|i| contains_aggregate(&i.expression));

        let mut columns = Vec::with_capacity(items.len());
        let mut plan;
        if has_aggregate {
            let mut group = Vec::new();
            let mut aggregates = Vec::new();
            for item in items {
                let name = item
                    .alias
                    .clone()
                    .unwrap_or_else(|| expression_text(&item.expression));
                columns.push(name.clone());
                match aggregate_call(&item.expression) {
                    Some(call) => aggregates.push(AggregateSpec {
                        function: call.name.to_lowercase(),
                        argument: call.args.first().cloned(),
                        distinct: call.distinct,
                        alias: name,
                    }),
                    None => {
                        if contains_aggregate(&item.expression) {
                            return Err(Error::SemanticError(
                                "aggregate calls cannot be nested inside expressions".to_string(),
                            ));
                        }
                        group.push((item.expression, name));
                    }
                }
            }
            plan = Plan::Aggregate {
                input: Box::new(input),
                group,
                aggregates,
            };
        } else {
            let projections: Vec<(Expression, String)> = items
                .into_iter()
                .map(|item| {
                    let name = item
                        .alias
                        .clone()
                        .unwrap_or_else(|| expression_text(&item.expression));
                    columns.push(name.clone());
                    (item.expression, name)
                })
                .collect();
            plan = Plan::Project {
                input: Box::new(input),
                items: projections,
                keep_inputs: true,
            };
        }

        if let Some(w) = where_clause {
            plan = Plan::Filter {
                input: Box::new(plan),
                predicate: w.expression,
            };
        }
        if distinct {
            plan = Plan::Distinct {
                input: Box::new(plan),
                columns: columns.clone(),
            };
        }
        if !order_by.is_empty() {
            plan = Plan::Sort {
                input: Box::new(plan),
                items: order_by
                    .into_iter()
                    .map(|item| (item.expression, item.ascending))
                    .collect(),
            };
        }
        if let Some(skip) = skip {
            plan = Plan::Skip {
                input: Box::new(plan),
                expression: skip,
            };
        }
        if let Some(limit) = limit {
            plan = Plan::Limit {
                input: Box::new(plan),
                expression: limit,
            };
        }
        plan = Plan::Strip {
            input: Box::new(plan),
            columns: columns.clone(),
        };
        Ok((plan, columns))
    }

    /// Gives every anonymous pattern element an internal name.
    fn name_pattern(&mut self, mut pattern: Pattern) -> Pattern {
        for element in &mut pattern.elements {
            let slot = match element {
                PatternElement::Node(n) => &mut n.variable,
                PatternElement::Relationship(r) => &mut r.variable,
            };
            if slot.is_none() {
                self.anon += 1;
                *slot = Some(format!("__anon{}", self.anon));
            }
        }
        pattern
    }
}

fn reverse_direction(direction: PatternDirection) -> PatternDirection {
    match direction {
        PatternDirection::Outgoing => PatternDirection::Incoming,
        PatternDirection::Incoming => PatternDirection::Outgoing,
        PatternDirection::Undirected => PatternDirection::Undirected,
    }
}

fn property_equals(variable: &str, key: &str, value: Expression) -> Expression {
    Expression::Binary(
        Box::new(Expression::Property(
            Box::new(Expression::Variable(variable.to_string())),
            key.to_string(),
        )),
        BinaryOp::Eq,
        Box::new(value),
    )
}

/// `var.prop = expr` (either side), for seek extraction.
fn as_property_equality(expr: &Expression) -> Option<(String, String, Expression)> {
    let Expression::Binary(left, BinaryOp::Eq, right) = expr else {
        return None;
    };
    for (side, other) in [(left, right), (right, left)] {
        if let Expression::Property(target, key) = side.as_ref() {
            if let Expression::Variable(var) = target.as_ref() {
                return Some((var.clone(), key.clone(), other.as_ref().clone()));
            }
        }
    }
    None
}

/// Pops every conjunct whose free variables are all bound, wrapping the plan
/// in filters for them.
fn place_ready_conjuncts(
    mut plan: Plan,
    conjuncts: &mut Vec<Expression>,
    bound: &HashSet<String>,
) -> Plan {
    let mut remaining = Vec::new();
    for conjunct in conjuncts.drain(..) {
        if free_variables(&conjunct).is_subset(bound) {
            plan = Plan::Filter {
                input: Box::new(plan),
                predicate: conjunct,
            };
        } else {
            remaining.push(conjunct);
        }
    }
    *conjuncts = remaining;
    plan
}

fn pattern_variables(pattern: &Pattern) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(var) = &pattern.variable {
        out.push(var.clone());
    }
    for element in &pattern.elements {
        let var = match element {
            PatternElement::Node(n) => &n.variable,
            PatternElement::Relationship(r) => &r.variable,
        };
        if let Some(var) = var {
            out.push(var.clone());
        }
    }
    out
}

/// The aggregate call when the whole item is one, e.g. `count(x)`.
fn aggregate_call(expr: &Expression) -> Option<&FunctionCall> {
    if let Expression::FunctionCall(call) = expr {
        if AGGREGATE_FUNCTIONS.contains(&call.name.to_lowercase().as_str()) {
            return Some(call);
        }
    }
    None
}
