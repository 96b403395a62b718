//! Recursive-descent parser for the Cypher dialect.
//!
//! Expression parsing is layered to match the operator precedence ladder;
//! chained comparisons (`a <= b < c`) desugar into conjunctions. Every
//! failure is a `SyntaxError` carrying the offending token's position.

use plexus_core::{Error, Result};

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenType};

pub fn parse(input: &str) -> Result<Query> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = TokenParser::new(tokens);
    parser.parse_query()
}

struct TokenParser {
    tokens: Vec<Token>,
    position: usize,
}

impl TokenParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    // ---- token plumbing ----

    fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self) -> &TokenType {
        &self.peek().token_type
    }

    fn peek_next_type(&self) -> &TokenType {
        let idx = (self.position + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn check(&self, expected: &TokenType) -> bool {
        self.peek_type() == expected
    }

    fn match_token(&mut self, expected: &TokenType) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, expected: &TokenType, description: &str) -> Result<Token> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.err_here(description))
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_type(), TokenType::Eof)
    }

    fn err_here(&self, expected: &str) -> Error {
        let token = self.peek();
        Error::SyntaxError {
            line: token.line,
            col: token.column,
            expected: expected.to_string(),
            found: token.token_type.describe(),
        }
    }

    fn identifier(&mut self, context: &str) -> Result<String> {
        match self.peek_type().clone() {
            TokenType::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.err_here(context)),
        }
    }

    /// Identifiers plus keywords, for positions where Cypher allows both
    /// (property keys, map keys, yield columns).
    fn symbolic_name(&mut self, context: &str) -> Result<String> {
        if let TokenType::Identifier(name) = self.peek_type().clone() {
            self.advance();
            return Ok(name);
        }
        if let TokenType::String(name) = self.peek_type().clone() {
            self.advance();
            return Ok(name);
        }
        if let Some(text) = keyword_text(self.peek_type()) {
            self.advance();
            return Ok(text.to_string());
        }
        Err(self.err_here(context))
    }

    // ---- query & clauses ----

    fn parse_query(&mut self) -> Result<Query> {
        let mut clauses = Vec::new();
        while !self.is_at_end() {
            if self.match_token(&TokenType::Semicolon) {
                continue;
            }
            clauses.push(self.parse_clause()?);
        }
        if clauses.is_empty() {
            return Err(self.err_here("a query clause"));
        }
        Ok(Query { clauses })
    }

    fn parse_clause(&mut self) -> Result<Clause> {
        if self.match_token(&TokenType::Optional) {
            self.consume(&TokenType::Match, "MATCH after OPTIONAL")?;
            return Ok(Clause::Match(self.parse_match(true)?));
        }
        if self.match_token(&TokenType::Match) {
            return Ok(Clause::Match(self.parse_match(false)?));
        }
        if self.match_token(&TokenType::With) {
            return Ok(Clause::With(self.parse_with()?));
        }
        if self.match_token(&TokenType::Unwind) {
            return Ok(Clause::Unwind(self.parse_unwind()?));
        }
        if self.match_token(&TokenType::Return) {
            return Ok(Clause::Return(self.parse_return()?));
        }
        if self.match_token(&TokenType::Create) {
            return self.parse_create_family();
        }
        if self.match_token(&TokenType::Merge) {
            return Ok(Clause::Merge(self.parse_merge()?));
        }
        if self.match_token(&TokenType::Set) {
            return Ok(Clause::Set(SetClause {
                items: self.parse_set_items()?,
            }));
        }
        if self.match_token(&TokenType::Remove) {
            return Ok(Clause::Remove(self.parse_remove()?));
        }
        if self.check(&TokenType::Delete) || self.check(&TokenType::Detach) {
            return Ok(Clause::Delete(self.parse_delete()?));
        }
        if self.match_token(&TokenType::Foreach) {
            return Ok(Clause::Foreach(self.parse_foreach()?));
        }
        if self.match_token(&TokenType::Call) {
            return Ok(Clause::Call(self.parse_call()?));
        }
        Err(self.err_here("a clause (MATCH, CREATE, RETURN, ...)"))
    }

    fn parse_match(&mut self, optional: bool) -> Result<MatchClause> {
        let mut patterns = vec![self.parse_pattern()?];
        while self.match_token(&TokenType::Comma) {
            patterns.push(self.parse_pattern()?);
        }
        let where_clause = if self.match_token(&TokenType::Where) {
            Some(WhereClause {
                expression: self.parse_expression()?,
            })
        } else {
            None
        };
        Ok(MatchClause {
            optional,
            patterns,
            where_clause,
        })
    }

    fn parse_with(&mut self) -> Result<WithClause> {
        let distinct = self.match_token(&TokenType::Distinct);
        let items = self.parse_projection_items()?;
        let order_by = self.parse_order_by()?;
        let skip = self.parse_skip()?;
        let limit = self.parse_limit()?;
        let where_clause = if self.match_token(&TokenType::Where) {
            Some(WhereClause {
                expression: self.parse_expression()?,
            })
        } else {
            None
        };
        Ok(WithClause {
            distinct,
            items,
            where_clause,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_unwind(&mut self) -> Result<UnwindClause> {
        let expression = self.parse_expression()?;
        self.consume(&TokenType::As, "AS after UNWIND expression")?;
        let alias = self.identifier("alias after UNWIND ... AS")?;
        Ok(UnwindClause { expression, alias })
    }

    fn parse_return(&mut self) -> Result<ReturnClause> {
        let distinct = self.match_token(&TokenType::Distinct);
        let items = self.parse_projection_items()?;
        let order_by = self.parse_order_by()?;
        let skip = self.parse_skip()?;
        let limit = self.parse_limit()?;
        Ok(ReturnClause {
            distinct,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_projection_items(&mut self) -> Result<Vec<ProjectionItem>> {
        let mut items = Vec::new();
        loop {
            let expression = self.parse_expression()?;
            let alias = if self.match_token(&TokenType::As) {
                Some(self.symbolic_name("alias after AS")?)
            } else {
                None
            };
            items.push(ProjectionItem { expression, alias });
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderByItem>> {
        if !self.match_token(&TokenType::Order) {
            return Ok(Vec::new());
        }
        self.consume(&TokenType::By, "BY after ORDER")?;
        let mut items = Vec::new();
        loop {
            let expression = self.parse_expression()?;
            let ascending = if self.match_token(&TokenType::Desc) {
                false
            } else {
                self.match_token(&TokenType::Asc);
                true
            };
            items.push(OrderByItem {
                expression,
                ascending,
            });
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_skip(&mut self) -> Result<Option<Expression>> {
        if self.match_token(&TokenType::Skip) {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_limit(&mut self) -> Result<Option<Expression>> {
        if self.match_token(&TokenType::Limit) {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_create_family(&mut self) -> Result<Clause> {
        if self.match_token(&TokenType::Fulltext) {
            self.consume(&TokenType::Index, "INDEX after CREATE FULLTEXT")?;
            return Ok(Clause::CreateIndex(self.parse_create_index(true)?));
        }
        if self.match_token(&TokenType::Index) {
            return Ok(Clause::CreateIndex(self.parse_create_index(false)?));
        }
        if self.match_token(&TokenType::Constraint) {
            return Ok(Clause::CreateConstraint(self.parse_create_constraint()?));
        }
        let mut patterns = vec![self.parse_pattern()?];
        while self.match_token(&TokenType::Comma) {
            patterns.push(self.parse_pattern()?);
        }
        Ok(Clause::Create(CreateClause { patterns }))
    }

    /// `CREATE [FULLTEXT] INDEX [name] FOR (n:Label) ON (n.p1[, n.p2 ...])`
    fn parse_create_index(&mut self, fulltext: bool) -> Result<CreateIndexClause> {
        let name = if let TokenType::Identifier(name) = self.peek_type().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        self.consume(&TokenType::For, "FOR in CREATE INDEX")?;
        self.consume(&TokenType::LeftParen, "'(' after FOR")?;
        let variable = self.identifier("node variable")?;
        self.consume(&TokenType::Colon, "':' before label")?;
        let label = self.identifier("label name")?;
        self.consume(&TokenType::RightParen, "')' after label")?;
        self.consume(&TokenType::On, "ON in CREATE INDEX")?;
        self.consume(&TokenType::LeftParen, "'(' after ON")?;
        let mut properties = Vec::new();
        loop {
            let var = self.identifier("node variable in property reference")?;
            if var != variable {
                return Err(self.err_here(&format!("a reference to '{variable}'")));
            }
            self.consume(&TokenType::Dot, "'.' in property reference")?;
            properties.push(self.symbolic_name("property name")?);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightParen, "')' after properties")?;
        Ok(CreateIndexClause {
            name,
            label,
            properties,
            fulltext,
        })
    }

    /// `CREATE CONSTRAINT [name] FOR (n:Label) REQUIRE n.p IS UNIQUE`
    /// (also `IS NOT NULL` and `IS TYPED <kind>`).
    fn parse_create_constraint(&mut self) -> Result<CreateConstraintClause> {
        let name = if let TokenType::Identifier(name) = self.peek_type().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        self.consume(&TokenType::For, "FOR in CREATE CONSTRAINT")?;
        self.consume(&TokenType::LeftParen, "'(' after FOR")?;
        let variable = self.identifier("node variable")?;
        self.consume(&TokenType::Colon, "':' before label")?;
        let label = self.identifier("label name")?;
        self.consume(&TokenType::RightParen, "')' after label")?;
        self.consume(&TokenType::Require, "REQUIRE in CREATE CONSTRAINT")?;
        let var = self.identifier("node variable in property reference")?;
        if var != variable {
            return Err(self.err_here(&format!("a reference to '{variable}'")));
        }
        self.consume(&TokenType::Dot, "'.' in property reference")?;
        let property = self.symbolic_name("property name")?;
        self.consume(&TokenType::Is, "IS in constraint requirement")?;
        let kind = if self.match_token(&TokenType::Unique) {
            ConstraintRequirement::Unique
        } else if self.match_token(&TokenType::Not) {
            self.consume(&TokenType::Null, "NULL after IS NOT")?;
            ConstraintRequirement::Exists
        } else {
            // `IS TYPED <kind>`: TYPED arrives as a plain identifier.
            let marker = self.identifier("UNIQUE, NOT NULL or TYPED")?;
            if !marker.eq_ignore_ascii_case("typed") {
                return Err(self.err_here("UNIQUE, NOT NULL or TYPED"));
            }
            ConstraintRequirement::OfType(self.symbolic_name("value kind")?.to_lowercase())
        };
        Ok(CreateConstraintClause {
            name,
            label,
            property,
            kind,
        })
    }

    fn parse_merge(&mut self) -> Result<MergeClause> {
        let pattern = self.parse_pattern()?;
        let mut on_create = Vec::new();
        let mut on_match = Vec::new();
        while self.match_token(&TokenType::On) {
            if self.match_token(&TokenType::Create) {
                self.consume(&TokenType::Set, "SET after ON CREATE")?;
                on_create.extend(self.parse_set_items()?);
            } else if self.match_token(&TokenType::Match) {
                self.consume(&TokenType::Set, "SET after ON MATCH")?;
                on_match.extend(self.parse_set_items()?);
            } else {
                return Err(self.err_here("CREATE or MATCH after ON"));
            }
        }
        Ok(MergeClause {
            pattern,
            on_create,
            on_match,
        })
    }

    fn parse_set_items(&mut self) -> Result<Vec<SetItem>> {
        let mut items = Vec::new();
        loop {
            let variable = self.identifier("variable in SET")?;
            if self.match_token(&TokenType::Dot) {
                let property = self.symbolic_name("property name")?;
                self.consume(&TokenType::Equals, "'=' in SET")?;
                let value = self.parse_expression()?;
                items.push(SetItem::Property {
                    variable,
                    property,
                    value,
                });
            } else if self.match_token(&TokenType::PlusEquals) {
                let value = self.parse_expression()?;
                items.push(SetItem::Properties {
                    variable,
                    value,
                    merge: true,
                });
            } else if self.match_token(&TokenType::Equals) {
                let value = self.parse_expression()?;
                items.push(SetItem::Properties {
                    variable,
                    value,
                    merge: false,
                });
            } else if self.check(&TokenType::Colon) {
                let labels = self.parse_label_chain()?;
                items.push(SetItem::Labels { variable, labels });
            } else {
                return Err(self.err_here("'.', '=', '+=' or ':' in SET item"));
            }
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_remove(&mut self) -> Result<RemoveClause> {
        let mut items = Vec::new();
        loop {
            let variable = self.identifier("variable in REMOVE")?;
            if self.match_token(&TokenType::Dot) {
                let property = self.symbolic_name("property name")?;
                items.push(RemoveItem::Property { variable, property });
            } else if self.check(&TokenType::Colon) {
                let labels = self.parse_label_chain()?;
                items.push(RemoveItem::Labels { variable, labels });
            } else {
                return Err(self.err_here("'.' or ':' in REMOVE item"));
            }
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        Ok(RemoveClause { items })
    }

    fn parse_label_chain(&mut self) -> Result<Vec<String>> {
        let mut labels = Vec::new();
        while self.match_token(&TokenType::Colon) {
            labels.push(self.identifier("label name after ':'")?);
        }
        if labels.is_empty() {
            return Err(self.err_here("a label after ':'"));
        }
        Ok(labels)
    }

    fn parse_delete(&mut self) -> Result<DeleteClause> {
        let detach = self.match_token(&TokenType::Detach);
        self.consume(&TokenType::Delete, "DELETE")?;
        let mut expressions = vec![self.parse_expression()?];
        while self.match_token(&TokenType::Comma) {
            expressions.push(self.parse_expression()?);
        }
        Ok(DeleteClause {
            detach,
            expressions,
        })
    }

    fn parse_foreach(&mut self) -> Result<ForeachClause> {
        self.consume(&TokenType::LeftParen, "'(' after FOREACH")?;
        let variable = self.identifier("FOREACH variable")?;
        self.consume(&TokenType::In, "IN after FOREACH variable")?;
        let list = self.parse_expression()?;
        self.consume(&TokenType::Pipe, "'|' after FOREACH list")?;

        let mut updates = Vec::new();
        while !self.check(&TokenType::RightParen) && !self.is_at_end() {
            let clause = self.parse_clause()?;
            match clause {
                Clause::Create(_)
                | Clause::Merge(_)
                | Clause::Set(_)
                | Clause::Remove(_)
                | Clause::Delete(_)
                | Clause::Foreach(_) => updates.push(clause),
                _ => {
                    return Err(self.err_here("an update clause inside FOREACH"));
                }
            }
        }
        self.consume(&TokenType::RightParen, "')' closing FOREACH")?;
        Ok(ForeachClause {
            variable,
            list,
            updates,
        })
    }

    fn parse_call(&mut self) -> Result<CallClause> {
        let mut name = self.identifier("procedure name")?;
        while self.match_token(&TokenType::Dot) {
            name.push('.');
            name.push_str(&self.symbolic_name("procedure name segment")?);
        }
        self.consume(&TokenType::LeftParen, "'(' after procedure name")?;
        let mut arguments = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "')' after procedure arguments")?;

        let yields = if self.match_token(&TokenType::Yield) {
            let mut items = Vec::new();
            loop {
                let name = self.symbolic_name("yield column")?;
                let alias = if self.match_token(&TokenType::As) {
                    Some(self.symbolic_name("alias after AS")?)
                } else {
                    None
                };
                items.push(YieldItem { name, alias });
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
            Some(items)
        } else {
            None
        };

        Ok(CallClause {
            name,
            arguments,
            yields,
        })
    }

    // ---- patterns ----

    fn parse_pattern(&mut self) -> Result<Pattern> {
        let variable = if matches!(self.peek_type(), TokenType::Identifier(_))
            && matches!(self.peek_next_type(), TokenType::Equals)
        {
            let var = self.identifier("path variable")?;
            self.advance(); // '='
            Some(var)
        } else {
            None
        };

        let mut elements = vec![PatternElement::Node(self.parse_node_pattern()?)];
        while matches!(self.peek_type(), TokenType::Dash | TokenType::LeftArrow) {
            elements.push(PatternElement::Relationship(self.parse_rel_pattern()?));
            elements.push(PatternElement::Node(self.parse_node_pattern()?));
        }
        Ok(Pattern { variable, elements })
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern> {
        self.consume(&TokenType::LeftParen, "'(' starting a node pattern")?;
        let variable = if let TokenType::Identifier(name) = self.peek_type().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let mut labels = Vec::new();
        while self.match_token(&TokenType::Colon) {
            labels.push(self.identifier("label name")?);
        }
        let properties = if self.check(&TokenType::LeftBrace) {
            self.parse_property_map()?
        } else {
            Vec::new()
        };
        self.consume(&TokenType::RightParen, "')' closing node pattern")?;
        Ok(NodePattern {
            variable,
            labels,
            properties,
        })
    }

    fn parse_rel_pattern(&mut self) -> Result<RelationshipPattern> {
        let left_arrow = self.match_token(&TokenType::LeftArrow);
        if !left_arrow {
            self.consume(&TokenType::Dash, "'-' starting a relationship")?;
        }

        let mut variable = None;
        let mut types = Vec::new();
        let mut properties = Vec::new();
        let mut length = None;

        if self.match_token(&TokenType::LeftBracket) {
            if let TokenType::Identifier(name) = self.peek_type().clone() {
                self.advance();
                variable = Some(name);
            }
            if self.match_token(&TokenType::Colon) {
                loop {
                    types.push(self.identifier("relationship type")?);
                    if !self.match_token(&TokenType::Pipe) {
                        break;
                    }
                    // `|:T` is tolerated alongside `|T`.
                    self.match_token(&TokenType::Colon);
                }
            }
            if self.match_token(&TokenType::Asterisk) {
                length = Some(self.parse_var_length()?);
            }
            if self.check(&TokenType::LeftBrace) {
                properties = self.parse_property_map()?;
            }
            self.consume(&TokenType::RightBracket, "']' closing relationship")?;
        }

        let right_arrow = self.match_token(&TokenType::RightArrow);
        if !right_arrow {
            self.consume(&TokenType::Dash, "'-' or '->' ending a relationship")?;
        }

        let direction = match (left_arrow, right_arrow) {
            (true, true) | (false, false) => PatternDirection::Undirected,
            (true, false) => PatternDirection::Incoming,
            (false, true) => PatternDirection::Outgoing,
        };

        Ok(RelationshipPattern {
            variable,
            types,
            direction,
            properties,
            length,
        })
    }

    fn parse_var_length(&mut self) -> Result<VarLength> {
        let mut min = None;
        let mut max = None;
        if let TokenType::Integer(n) = *self.peek_type() {
            self.advance();
            min = Some(n as u32);
            if self.match_token(&TokenType::RangeDots) {
                if let TokenType::Integer(n) = *self.peek_type() {
                    self.advance();
                    max = Some(n as u32);
                }
            } else {
                max = min;
            }
        } else if self.match_token(&TokenType::RangeDots) {
            if let TokenType::Integer(n) = *self.peek_type() {
                self.advance();
                max = Some(n as u32);
            }
        }
        Ok(VarLength { min, max })
    }

    fn parse_property_map(&mut self) -> Result<Vec<(String, Expression)>> {
        self.consume(&TokenType::LeftBrace, "'{' starting a property map")?;
        let mut pairs = Vec::new();
        while !self.check(&TokenType::RightBrace) {
            let key = self.symbolic_name("property key")?;
            self.consume(&TokenType::Colon, "':' after property key")?;
            let value = self.parse_expression()?;
            pairs.push((key, value));
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightBrace, "'}' closing a property map")?;
        Ok(pairs)
    }

    // ---- expressions (layered by precedence, low to high) ----

    pub(crate) fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_xor()?;
        while self.match_token(&TokenType::Or) {
            let rhs = self.parse_xor()?;
            lhs = Expression::Binary(Box::new(lhs), BinaryOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_and()?;
        while self.match_token(&TokenType::Xor) {
            let rhs = self.parse_and()?;
            lhs = Expression::Binary(Box::new(lhs), BinaryOp::Xor, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_not()?;
        while self.match_token(&TokenType::And) {
            let rhs = self.parse_not()?;
            lhs = Expression::Binary(Box::new(lhs), BinaryOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expression> {
        if self.match_token(&TokenType::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    /// `a <= b < c` desugars into `a <= b AND b < c`.
    fn parse_comparison(&mut self) -> Result<Expression> {
        let first = self.parse_predicate()?;
        let mut operands = vec![first];
        let mut operators = Vec::new();
        loop {
            let op = match self.peek_type() {
                TokenType::Equals => BinaryOp::Eq,
                TokenType::NotEquals => BinaryOp::NotEq,
                TokenType::LessThan => BinaryOp::Lt,
                TokenType::LessEqual => BinaryOp::LtEq,
                TokenType::GreaterThan => BinaryOp::Gt,
                TokenType::GreaterEqual => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            operators.push(op);
            operands.push(self.parse_predicate()?);
        }
        if operators.is_empty() {
            return Ok(operands.pop().expect("one operand"));
        }
        let mut conjuncts = Vec::with_capacity(operators.len());
        for (i, op) in operators.into_iter().enumerate() {
            conjuncts.push(Expression::Binary(
                Box::new(operands[i].clone()),
                op,
                Box::new(operands[i + 1].clone()),
            ));
        }
        let mut out = conjuncts.remove(0);
        for conjunct in conjuncts {
            out = Expression::Binary(Box::new(out), BinaryOp::And, Box::new(conjunct));
        }
        Ok(out)
    }

    /// String predicates, `IN`, `=~` and the `IS [NOT] NULL` postfix.
    fn parse_predicate(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_additive()?;
        loop {
            if self.match_token(&TokenType::In) {
                let rhs = self.parse_additive()?;
                lhs = Expression::Binary(Box::new(lhs), BinaryOp::In, Box::new(rhs));
            } else if self.match_token(&TokenType::Starts) {
                self.consume(&TokenType::With, "WITH after STARTS")?;
                let rhs = self.parse_additive()?;
                lhs = Expression::Binary(Box::new(lhs), BinaryOp::StartsWith, Box::new(rhs));
            } else if self.match_token(&TokenType::Ends) {
                self.consume(&TokenType::With, "WITH after ENDS")?;
                let rhs = self.parse_additive()?;
                lhs = Expression::Binary(Box::new(lhs), BinaryOp::EndsWith, Box::new(rhs));
            } else if self.match_token(&TokenType::Contains) {
                let rhs = self.parse_additive()?;
                lhs = Expression::Binary(Box::new(lhs), BinaryOp::Contains, Box::new(rhs));
            } else if self.match_token(&TokenType::RegexMatch) {
                let rhs = self.parse_additive()?;
                lhs = Expression::Binary(Box::new(lhs), BinaryOp::Regex, Box::new(rhs));
            } else if self.match_token(&TokenType::Is) {
                let negated = self.match_token(&TokenType::Not);
                self.consume(&TokenType::Null, "NULL after IS")?;
                lhs = Expression::IsNull(Box::new(lhs), negated);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.match_token(&TokenType::Plus) {
                BinaryOp::Add
            } else if self.match_token(&TokenType::Dash) {
                BinaryOp::Subtract
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expression::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.match_token(&TokenType::Asterisk) {
                BinaryOp::Multiply
            } else if self.match_token(&TokenType::Slash) {
                BinaryOp::Divide
            } else if self.match_token(&TokenType::Percent) {
                BinaryOp::Modulo
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expression::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if self.match_token(&TokenType::Dash) {
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        if self.match_token(&TokenType::Plus) {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expression> {
        let lhs = self.parse_postfix()?;
        if self.match_token(&TokenType::Caret) {
            // Right-associative.
            let rhs = self.parse_unary()?;
            return Ok(Expression::Binary(
                Box::new(lhs),
                BinaryOp::Power,
                Box::new(rhs),
            ));
        }
        Ok(lhs)
    }

    /// Property access, dynamic access and slicing bind tightest.
    fn parse_postfix(&mut self) -> Result<Expression> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.match_token(&TokenType::Dot) {
                let property = self.symbolic_name("property name after '.'")?;
                expr = Expression::Property(Box::new(expr), property);
            } else if self.match_token(&TokenType::LeftBracket) {
                // `x[..b]`, `x[a..b]`, `x[a..]` or plain `x[i]`.
                if self.match_token(&TokenType::RangeDots) {
                    let to = if self.check(&TokenType::RightBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    self.consume(&TokenType::RightBracket, "']' closing a slice")?;
                    expr = Expression::Slice {
                        target: Box::new(expr),
                        from: None,
                        to,
                    };
                    continue;
                }
                let first = self.parse_expression()?;
                if self.match_token(&TokenType::RangeDots) {
                    let to = if self.check(&TokenType::RightBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    self.consume(&TokenType::RightBracket, "']' closing a slice")?;
                    expr = Expression::Slice {
                        target: Box::new(expr),
                        from: Some(Box::new(first)),
                        to,
                    };
                } else {
                    self.consume(&TokenType::RightBracket, "']' closing an index")?;
                    expr = Expression::Index(Box::new(expr), Box::new(first));
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expression> {
        match self.peek_type().clone() {
            TokenType::Null => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            TokenType::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Literal::Bool(b)))
            }
            TokenType::Integer(i) => {
                self.advance();
                Ok(Expression::Literal(Literal::Integer(i)))
            }
            TokenType::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(f)))
            }
            TokenType::String(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            TokenType::Parameter(name) => {
                self.advance();
                Ok(Expression::Parameter(name))
            }
            TokenType::LeftParen => self.parse_paren_or_pattern(),
            TokenType::LeftBracket => self.parse_list_like(),
            TokenType::LeftBrace => {
                let pairs = self.parse_property_map()?;
                Ok(Expression::Map(pairs))
            }
            TokenType::Case => {
                self.advance();
                self.parse_case()
            }
            TokenType::Reduce => {
                self.advance();
                self.parse_reduce()
            }
            TokenType::All => self.parse_quantifier(Quantifier::All),
            TokenType::Any => self.parse_quantifier(Quantifier::Any),
            TokenType::None => self.parse_quantifier(Quantifier::None),
            TokenType::Single => self.parse_quantifier(Quantifier::Single),
            TokenType::Exists => {
                self.advance();
                self.parse_exists()
            }
            TokenType::Identifier(name) => {
                self.advance();
                if self.check(&TokenType::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(Expression::Variable(name))
                }
            }
            _ => Err(self.err_here("an expression")),
        }
    }

    /// `(expr)` or a pattern expression like `(a)-[:R]->(b)`.
    fn parse_paren_or_pattern(&mut self) -> Result<Expression> {
        let start = self.position;
        if let Ok(pattern) = self.parse_pattern() {
            if pattern.elements.len() > 1 {
                return Ok(Expression::PatternPredicate(Box::new(pattern)));
            }
        }
        self.position = start;
        self.consume(&TokenType::LeftParen, "'('")?;
        let expr = self.parse_expression()?;
        self.consume(&TokenType::RightParen, "')'")?;
        Ok(expr)
    }

    /// A list literal, a list comprehension or a pattern comprehension.
    fn parse_list_like(&mut self) -> Result<Expression> {
        self.consume(&TokenType::LeftBracket, "'['")?;

        // List comprehension: [x IN xs ...]
        if matches!(self.peek_type(), TokenType::Identifier(_))
            && matches!(self.peek_next_type(), TokenType::In)
        {
            let variable = self.identifier("comprehension variable")?;
            self.advance(); // IN
            let list = self.parse_expression()?;
            let predicate = if self.match_token(&TokenType::Where) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let projection = if self.match_token(&TokenType::Pipe) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.consume(&TokenType::RightBracket, "']' closing a comprehension")?;
            return Ok(Expression::ListComprehension(Box::new(ListComprehension {
                variable,
                list,
                predicate,
                projection,
            })));
        }

        // Pattern comprehension: [(a)-[:R]->(b) WHERE ... | expr]
        if self.check(&TokenType::LeftParen) {
            let start = self.position;
            if let Ok(pattern) = self.parse_pattern() {
                if pattern.elements.len() > 1 || self.check(&TokenType::Pipe) || self.check(&TokenType::Where) {
                    let predicate = if self.match_token(&TokenType::Where) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    self.consume(&TokenType::Pipe, "'|' in pattern comprehension")?;
                    let projection = self.parse_expression()?;
                    self.consume(&TokenType::RightBracket, "']' closing a comprehension")?;
                    return Ok(Expression::PatternComprehension(Box::new(
                        PatternComprehension {
                            pattern,
                            predicate,
                            projection,
                        },
                    )));
                }
            }
            self.position = start;
        }

        let mut items = Vec::new();
        while !self.check(&TokenType::RightBracket) {
            items.push(self.parse_expression()?);
            if !self.match_token(&TokenType::Comma) {
                break;
            }
        }
        self.consume(&TokenType::RightBracket, "']' closing a list")?;
        Ok(Expression::List(items))
    }

    fn parse_case(&mut self) -> Result<Expression> {
        let operand = if self.check(&TokenType::When) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let mut branches = Vec::new();
        while self.match_token(&TokenType::When) {
            let condition = self.parse_expression()?;
            self.consume(&TokenType::Then, "THEN after WHEN")?;
            let value = self.parse_expression()?;
            branches.push((condition, value));
        }
        if branches.is_empty() {
            return Err(self.err_here("WHEN after CASE"));
        }
        let fallback = if self.match_token(&TokenType::Else) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(&TokenType::End, "END closing CASE")?;
        Ok(Expression::Case(Box::new(CaseExpression {
            operand,
            branches,
            fallback,
        })))
    }

    fn parse_reduce(&mut self) -> Result<Expression> {
        self.consume(&TokenType::LeftParen, "'(' after reduce")?;
        let accumulator = self.identifier("accumulator name")?;
        self.consume(&TokenType::Equals, "'=' after accumulator")?;
        let init = self.parse_expression()?;
        self.consume(&TokenType::Comma, "',' after accumulator initializer")?;
        let variable = self.identifier("reduce variable")?;
        self.consume(&TokenType::In, "IN in reduce")?;
        let list = self.parse_expression()?;
        self.consume(&TokenType::Pipe, "'|' in reduce")?;
        let expression = self.parse_expression()?;
        self.consume(&TokenType::RightParen, "')' closing reduce")?;
        Ok(Expression::Reduce(Box::new(ReduceExpression {
            accumulator,
            init,
            variable,
            list,
            expression,
        })))
    }

    fn parse_quantifier(&mut self, quantifier: Quantifier) -> Result<Expression> {
        self.advance(); // the quantifier keyword
        self.consume(&TokenType::LeftParen, "'(' after quantifier")?;
        let variable = self.identifier("quantifier variable")?;
        self.consume(&TokenType::In, "IN in quantifier")?;
        let list = self.parse_expression()?;
        let predicate = if self.match_token(&TokenType::Where) {
            self.parse_expression()?
        } else {
            Expression::Literal(Literal::Bool(true))
        };
        self.consume(&TokenType::RightParen, "')' closing quantifier")?;
        Ok(Expression::Quantifier(Box::new(QuantifierExpression {
            quantifier,
            variable,
            list,
            predicate,
        })))
    }

    /// `EXISTS((a)-[:R]->(b))` or the legacy `exists(n.prop)` form.
    fn parse_exists(&mut self) -> Result<Expression> {
        self.consume(&TokenType::LeftParen, "'(' after EXISTS")?;
        if self.check(&TokenType::LeftParen) {
            let start = self.position;
            if let Ok(pattern) = self.parse_pattern() {
                if self.match_token(&TokenType::RightParen) {
                    return Ok(Expression::PatternPredicate(Box::new(pattern)));
                }
            }
            self.position = start;
        }
        let inner = self.parse_expression()?;
        self.consume(&TokenType::RightParen, "')' closing EXISTS")?;
        Ok(Expression::FunctionCall(FunctionCall {
            name: "exists".to_string(),
            args: vec![inner],
            distinct: false,
        }))
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression> {
        self.consume(&TokenType::LeftParen, "'(' after function name")?;

        // count(*)
        if name.eq_ignore_ascii_case("count") && self.match_token(&TokenType::Asterisk) {
            self.consume(&TokenType::RightParen, "')' after count(*)")?;
            return Ok(Expression::FunctionCall(FunctionCall {
                name,
                args: Vec::new(),
                distinct: false,
            }));
        }

        let distinct = self.match_token(&TokenType::Distinct);
        let mut args = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenType::RightParen, "')' after function arguments")?;
        Ok(Expression::FunctionCall(FunctionCall {
            name,
            args,
            distinct,
        }))
    }
}

/// The lowercase text a keyword token stands for, used wherever Cypher
/// accepts keywords as plain names.
fn keyword_text(token: &TokenType) -> Option<&'static str> {
    Some(match token {
        TokenType::Match => "match",
        TokenType::Optional => "optional",
        TokenType::Where => "where",
        TokenType::With => "with",
        TokenType::Unwind => "unwind",
        TokenType::Return => "return",
        TokenType::Order => "order",
        TokenType::By => "by",
        TokenType::Asc => "asc",
        TokenType::Desc => "desc",
        TokenType::Skip => "skip",
        TokenType::Limit => "limit",
        TokenType::Distinct => "distinct",
        TokenType::Create => "create",
        TokenType::Merge => "merge",
        TokenType::On => "on",
        TokenType::Set => "set",
        TokenType::Remove => "remove",
        TokenType::Delete => "delete",
        TokenType::Detach => "detach",
        TokenType::Foreach => "foreach",
        TokenType::Call => "call",
        TokenType::Yield => "yield",
        TokenType::And => "and",
        TokenType::Or => "or",
        TokenType::Not => "not",
        TokenType::Xor => "xor",
        TokenType::In => "in",
        TokenType::Starts => "starts",
        TokenType::Ends => "ends",
        TokenType::Contains => "contains",
        TokenType::Is => "is",
        TokenType::Case => "case",
        TokenType::When => "when",
        TokenType::Then => "then",
        TokenType::Else => "else",
        TokenType::End => "end",
        TokenType::As => "as",
        TokenType::Index => "index",
        TokenType::Constraint => "constraint",
        TokenType::For => "for",
        TokenType::Require => "require",
        TokenType::Unique => "unique",
        TokenType::Exists => "exists",
        TokenType::Fulltext => "fulltext",
        TokenType::Reduce => "reduce",
        TokenType::All => "all",
        TokenType::Any => "any",
        TokenType::None => "none",
        TokenType::Single => "single",
        TokenType::Null => "null",
        _ => return None,
    })
}
