//! Recursive-descent parser producing [`Statement`]s.
//!
//! Precedence, loosest first: `OR`, `AND`, `NOT`, comparisons (`=`, `LIKE`,
//! `IN`, `BETWEEN`, `IS NULL`), `+ - ||`, `* / %`, unary minus.

use serde_json::Value;

use super::ast::*;
use super::lexer::{Spanned, Token, tokenize};
use crate::error::{EngineError, Result};

/// Words that end an expression or clause and so cannot be implicit aliases.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "LIMIT", "OFFSET", "INTO",
    "JOIN", "INNER", "LEFT", "OUTER", "ON", "AS", "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE",
    "BETWEEN", "CASE", "WHEN", "THEN", "ELSE", "END", "DISTINCT", "TOP", "ASC", "DESC", "INSERT",
    "VALUES", "TRUE", "FALSE",
];

/// Parse every `;`-separated statement in `sql`.
pub fn parse(sql: &str) -> Result<Vec<Statement>> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser {
        sql,
        tokens,
        pos: 0,
        positional: 0,
    };
    parser.statements()
}

struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    /// Next index handed to a `?` parameter.
    positional: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.sql.len())
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(EngineError::Syntax {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.is_keyword_at(0, keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            self.error(format!("expected {}", keyword))
        }
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.is_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            self.error(format!("expected '{}'", symbol))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w)) if !is_reserved(w) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            Some(Token::Quoted(q)) => {
                let q = q.clone();
                self.pos += 1;
                Ok(q)
            }
            _ => self.error("expected identifier"),
        }
    }

    /// `[AS] alias`, where the alias may be omitted.
    fn optional_alias(&mut self) -> Result<Option<String>> {
        if self.eat_keyword("AS") {
            return match self.advance() {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) | Some(Token::Str(w)) => Ok(Some(w)),
                _ => self.error("expected alias after AS"),
            };
        }
        match self.peek() {
            Some(Token::Word(w)) if !is_reserved(w) => self.identifier().map(Some),
            Some(Token::Quoted(_)) => self.identifier().map(Some),
            _ => Ok(None),
        }
    }

    fn statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.eat_symbol(";") {}
            if self.peek().is_none() {
                break;
            }
            statements.push(self.statement()?);
            if self.peek().is_some() && !self.is_symbol(";") {
                return self.error("expected end of statement");
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement> {
        if self.is_keyword("SELECT") {
            Ok(Statement::Select(self.select()?))
        } else if self.is_keyword("INSERT") {
            Ok(Statement::Insert(self.insert()?))
        } else {
            self.error("expected SELECT or INSERT")
        }
    }

    fn insert(&mut self) -> Result<Insert> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let target = self.hook_call()?;

        let mut columns = Vec::new();
        if self.eat_symbol("(") {
            loop {
                columns.push(self.identifier()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
            self.expect_symbol(")")?;
        }

        let source = if self.eat_keyword("VALUES") {
            if columns.is_empty() {
                return self.error("INSERT ... VALUES needs a column list");
            }
            let mut tuples = Vec::new();
            loop {
                self.expect_symbol("(")?;
                let values = self.expr_list()?;
                self.expect_symbol(")")?;
                if values.len() != columns.len() {
                    return self.error(format!(
                        "expected {} values, found {}",
                        columns.len(),
                        values.len()
                    ));
                }
                tuples.push(values);
                if !self.eat_symbol(",") {
                    break;
                }
            }
            InsertSource::Values(tuples)
        } else {
            InsertSource::Select(Box::new(self.select()?))
        };

        Ok(Insert {
            target,
            columns,
            source,
        })
    }

    fn select(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;
        let mut select = Select {
            distinct: self.eat_keyword("DISTINCT"),
            ..Select::default()
        };
        if self.eat_keyword("TOP") {
            select.top = Some(self.primary()?);
        }

        loop {
            select.items.push(self.select_item()?);
            if !self.eat_symbol(",") {
                break;
            }
        }

        if self.eat_keyword("INTO") {
            select.into = Some(self.hook_call()?);
        }
        if self.eat_keyword("FROM") {
            select.from = Some(self.from_clause()?);
        }
        if self.eat_keyword("WHERE") {
            select.selection = Some(self.expr()?);
        }
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            select.group_by = self.expr_list()?;
        }
        if self.eat_keyword("HAVING") {
            select.having = Some(self.expr()?);
        }
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expr()?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                select.order_by.push(OrderItem { expr, descending });
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        if self.eat_keyword("LIMIT") {
            select.limit = Some(self.expr()?);
            if self.eat_keyword("OFFSET") {
                select.offset = Some(self.expr()?);
            }
        } else if self.eat_keyword("OFFSET") {
            select.offset = Some(self.expr()?);
        }
        Ok(select)
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        if self.eat_symbol("*") {
            return Ok(SelectItem::Wildcard);
        }
        let qualified_star = matches!(self.peek(), Some(Token::Word(_) | Token::Quoted(_)))
            && matches!(self.peek_at(1), Some(Token::Symbol(".")))
            && matches!(self.peek_at(2), Some(Token::Symbol("*")));
        if qualified_star {
            let table = match self.advance() {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) => w,
                _ => return self.error("expected table name"),
            };
            self.pos += 2;
            return Ok(SelectItem::QualifiedWildcard(table));
        }

        let start = self.offset();
        let expr = self.expr()?;
        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.end)
            .unwrap_or(self.sql.len());
        let label = self.sql[start..end].trim().to_string();
        let alias = self.optional_alias()?;
        Ok(SelectItem::Expr { expr, label, alias })
    }

    fn hook_call(&mut self) -> Result<HookCall> {
        let name = match self.advance() {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) => w.to_ascii_uppercase(),
            _ => return self.error("expected source name"),
        };
        let mut args = Vec::new();
        if self.eat_symbol("(") {
            if !self.is_symbol(")") {
                args = self.expr_list()?;
            }
            self.expect_symbol(")")?;
        }
        Ok(HookCall { name, args })
    }

    fn from_clause(&mut self) -> Result<FromClause> {
        let table = self.table_ref()?;
        let mut joins = Vec::new();
        loop {
            let kind = if self.eat_keyword("JOIN") {
                JoinKind::Inner
            } else if self.is_keyword("INNER") && self.is_keyword_at(1, "JOIN") {
                self.pos += 2;
                JoinKind::Inner
            } else if self.eat_keyword("LEFT") {
                self.eat_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinKind::Left
            } else {
                break;
            };
            let table = self.table_ref()?;
            self.expect_keyword("ON")?;
            let on = self.expr()?;
            joins.push(Join { kind, table, on });
        }
        Ok(FromClause { table, joins })
    }

    fn table_ref(&mut self) -> Result<TableRef> {
        let source = match self.peek() {
            Some(Token::Param(_)) => match self.primary()? {
                Expr::Param(param) => Source::Param(param),
                _ => return self.error("expected parameter"),
            },
            Some(Token::Symbol("(")) => {
                self.pos += 1;
                let select = self.select()?;
                self.expect_symbol(")")?;
                Source::Subquery(Box::new(select))
            }
            _ => Source::Hook(self.hook_call()?),
        };
        let alias = self.optional_alias()?;
        Ok(TableRef { source, alias })
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = vec![self.expr()?];
        while self.eat_symbol(",") {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    pub(crate) fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("AND") {
            let right = self.not_expr()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            let expr = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("=")) => Some(BinaryOp::Eq),
                Some(Token::Symbol("<>")) | Some(Token::Symbol("!=")) => Some(BinaryOp::NotEq),
                Some(Token::Symbol("<")) => Some(BinaryOp::Lt),
                Some(Token::Symbol("<=")) => Some(BinaryOp::LtEq),
                Some(Token::Symbol(">")) => Some(BinaryOp::Gt),
                Some(Token::Symbol(">=")) => Some(BinaryOp::GtEq),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 1;
                let right = self.additive()?;
                left = binary(left, op, right);
                continue;
            }

            if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                self.expect_keyword("NULL")?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            let negated = self.is_keyword("NOT")
                && (self.is_keyword_at(1, "LIKE")
                    || self.is_keyword_at(1, "IN")
                    || self.is_keyword_at(1, "BETWEEN"));
            if negated {
                self.pos += 1;
            }

            if self.eat_keyword("LIKE") {
                let pattern = self.additive()?;
                left = Expr::Like {
                    expr: Box::new(left),
                    pattern: Box::new(pattern),
                    negated,
                };
            } else if self.eat_keyword("IN") {
                self.expect_symbol("(")?;
                let list = self.expr_list()?;
                self.expect_symbol(")")?;
                left = Expr::InList {
                    expr: Box::new(left),
                    list,
                    negated,
                };
            } else if self.eat_keyword("BETWEEN") {
                let low = self.additive()?;
                self.expect_keyword("AND")?;
                let high = self.additive()?;
                left = Expr::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else if self.eat_symbol("||") {
                BinaryOp::Concat
            } else {
                break;
            };
            let right = self.multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_symbol("/") {
                BinaryOp::Div
            } else if self.eat_symbol("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_symbol("-") {
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        if self.eat_symbol("+") {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return self.error("unexpected end of query");
        };

        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(super::value::number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Param(None) => {
                self.pos += 1;
                let index = self.positional;
                self.positional += 1;
                Ok(Expr::Param(ParamRef::Positional(index)))
            }
            Token::Param(Some(name)) => {
                self.pos += 1;
                Ok(Expr::Param(ParamRef::Named(name)))
            }
            Token::Symbol("(") => {
                self.pos += 1;
                let expr = self.expr()?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            Token::Symbol("{") => {
                self.pos += 1;
                self.object_literal()
            }
            Token::Quoted(name) => {
                self.pos += 1;
                self.column_tail(name)
            }
            Token::Word(word) => {
                let upper = word.to_ascii_uppercase();
                match upper.as_str() {
                    "NULL" => {
                        self.pos += 1;
                        Ok(Expr::Literal(Value::Null))
                    }
                    "TRUE" => {
                        self.pos += 1;
                        Ok(Expr::Literal(Value::Bool(true)))
                    }
                    "FALSE" => {
                        self.pos += 1;
                        Ok(Expr::Literal(Value::Bool(false)))
                    }
                    "CASE" => {
                        self.pos += 1;
                        self.case_expr()
                    }
                    _ if matches!(self.peek_at(1), Some(Token::Symbol("("))) => {
                        self.pos += 2;
                        self.function_call(upper)
                    }
                    _ if is_reserved(&word) => self.error(format!("unexpected keyword {}", upper)),
                    _ => {
                        self.pos += 1;
                        self.column_tail(word)
                    }
                }
            }
            Token::Symbol(s) => self.error(format!("unexpected '{}'", s)),
        }
    }

    /// After an identifier: either `name` or `table.name`.
    fn column_tail(&mut self, first: String) -> Result<Expr> {
        if self.eat_symbol(".") {
            let name = match self.advance() {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) => w,
                _ => return self.error("expected column name after '.'"),
            };
            return Ok(Expr::Column {
                table: Some(first),
                name,
            });
        }
        Ok(Expr::Column {
            table: None,
            name: first,
        })
    }

    fn function_call(&mut self, name: String) -> Result<Expr> {
        if self.eat_symbol("*") {
            self.expect_symbol(")")?;
            return Ok(Expr::Function {
                name,
                args: Vec::new(),
                star: true,
            });
        }
        let args = if self.is_symbol(")") {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.expect_symbol(")")?;
        Ok(Expr::Function {
            name,
            args,
            star: false,
        })
    }

    fn object_literal(&mut self) -> Result<Expr> {
        let mut fields = Vec::new();
        if self.eat_symbol("}") {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.advance() {
                Some(Token::Word(w)) | Some(Token::Quoted(w)) | Some(Token::Str(w)) => w,
                _ => return self.error("expected object key"),
            };
            self.expect_symbol(":")?;
            fields.push((key, self.expr()?));
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol("}")?;
        Ok(Expr::Object(fields))
    }

    fn case_expr(&mut self) -> Result<Expr> {
        let operand = if self.is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let mut branches = Vec::new();
        while self.eat_keyword("WHEN") {
            let condition = self.expr()?;
            self.expect_keyword("THEN")?;
            let result = self.expr()?;
            branches.push((condition, result));
        }
        if branches.is_empty() {
            return self.error("CASE needs at least one WHEN");
        }
        let otherwise = if self.eat_keyword("ELSE") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case {
            operand,
            branches,
            otherwise,
        })
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}
