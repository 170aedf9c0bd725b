//! Parser: recursive descent parser for rule source
//!
//! Consumes tokens from the lexer and produces a [`Program`]: an optional
//! language header followed by named functions. Expression precedence,
//! loosest first: `||`, `&&`, comparison, `+`/`-`, unary, postfix.

use crate::ast::{BinaryOp, Expr, FunctionDef, Program, SortOrder, Stmt, UnaryOp, BUILTINS, ROOTS};
use crate::errors::{RuleError, RuleResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::Value;

/// Parser for rule source
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse rule source text into a Program
    pub fn parse(input: &str) -> RuleResult<Program> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Self { tokens, pos: 0 };
        parser.parse_program()
    }

    fn parse_program(&mut self) -> RuleResult<Program> {
        let mut program = Program::default();

        if self.check(TokenKind::Language) {
            self.advance();
            program.language = Some(self.expect(TokenKind::StringLiteral)?.text.clone());
        }

        while !self.check(TokenKind::Eof) {
            program.functions.push(self.parse_function()?);
        }

        Ok(program)
    }

    fn parse_function(&mut self) -> RuleResult<FunctionDef> {
        let line = self.expect(TokenKind::Fn)?.line;
        let name = if self.check(TokenKind::StringLiteral) {
            self.advance().text.clone()
        } else {
            self.expect_identifier()?
        };
        let body = self.parse_block()?;
        Ok(FunctionDef { name, line, body })
    }

    fn parse_block(&mut self) -> RuleResult<Vec<Stmt>> {
        self.expect(TokenKind::OpenBrace)?;
        let mut body = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::CloseBrace)?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> RuleResult<Stmt> {
        match self.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::Require => {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect(TokenKind::Else)?;
                let message = self.parse_expr()?;
                Ok(Stmt::Require { condition, message })
            }
            TokenKind::Error => {
                self.advance();
                Ok(Stmt::Error(self.parse_expr()?))
            }
            TokenKind::Warn => {
                self.advance();
                Ok(Stmt::Warn(self.parse_expr()?))
            }
            TokenKind::Fail => {
                self.advance();
                Ok(Stmt::Fail(self.parse_expr()?))
            }
            TokenKind::CreatePool => {
                self.advance();
                let product = self.parse_expr()?;
                self.expect(TokenKind::Quantity)?;
                let quantity = self.parse_expr()?;
                Ok(Stmt::CreatePool { product, quantity })
            }
            TokenKind::Record => {
                self.advance();
                let key = self.parse_expr()?;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                Ok(Stmt::Record { key, value })
            }
            TokenKind::Select => self.parse_select(),
            TokenKind::Return => {
                self.advance();
                Ok(Stmt::Return)
            }
            TokenKind::Eof => Err(RuleError::UnexpectedEof("statement".into())),
            _ => {
                let tok = self.peek();
                Err(RuleError::UnexpectedToken {
                    expected: "statement".into(),
                    found: tok.text.clone(),
                    line: tok.line,
                })
            }
        }
    }

    fn parse_if(&mut self) -> RuleResult<Stmt> {
        self.expect(TokenKind::If)?;
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block()?;

        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            if self.check(TokenKind::If) {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_select(&mut self) -> RuleResult<Stmt> {
        self.expect(TokenKind::Select)?;

        let filter = if self.check(TokenKind::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order = if self.check(TokenKind::Order) {
            self.advance();
            self.expect(TokenKind::By)?;
            let key = self.parse_expr()?;
            let direction = match self.peek_kind() {
                TokenKind::Asc => {
                    self.advance();
                    SortOrder::Asc
                }
                TokenKind::Desc => {
                    self.advance();
                    SortOrder::Desc
                }
                _ => SortOrder::Asc,
            };
            Some((key, direction))
        } else {
            None
        };

        Ok(Stmt::Select { filter, order })
    }

    fn parse_expr(&mut self) -> RuleResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> RuleResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> RuleResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> RuleResult<Expr> {
        let left = self.parse_sum()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_sum()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_sum(&mut self) -> RuleResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> RuleResult<Expr> {
        match self.peek_kind() {
            TokenKind::Not => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> RuleResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_word()?;
                    expr = Expr::Field(Box::new(expr), field);
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::CloseBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> RuleResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::NumberLiteral => {
                self.advance();
                let value = tok.text.parse::<i64>().map_err(|_| RuleError::ParseError {
                    line: tok.line,
                    col: tok.col,
                    message: format!("'{}' is not a valid integer", tok.text),
                })?;
                Ok(Expr::Literal(Value::Int(value)))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Ok(Expr::Literal(Value::Str(tok.text)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::Literal(Value::None))
            }
            TokenKind::Now => {
                self.advance();
                Ok(Expr::Now)
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Identifier if self.peek_kind_at(1) == TokenKind::OpenParen => {
                self.parse_call()
            }
            TokenKind::Identifier => {
                self.advance();
                if !ROOTS.contains(&tok.text.as_str()) {
                    return Err(RuleError::ParseError {
                        line: tok.line,
                        col: tok.col,
                        message: format!(
                            "Unknown name '{}': expected one of {}",
                            tok.text,
                            ROOTS.join(", ")
                        ),
                    });
                }
                Ok(Expr::Root(tok.text))
            }
            TokenKind::Eof => Err(RuleError::UnexpectedEof("expression".into())),
            _ => Err(RuleError::UnexpectedToken {
                expected: "expression".into(),
                found: tok.text,
                line: tok.line,
            }),
        }
    }

    fn parse_call(&mut self) -> RuleResult<Expr> {
        let tok = self.advance().clone();
        if !BUILTINS.contains(&tok.text.as_str()) {
            return Err(RuleError::ParseError {
                line: tok.line,
                col: tok.col,
                message: format!("Unknown function '{}'", tok.text),
            });
        }

        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            args.push(self.parse_expr()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(Expr::Call(tok.text, args))
    }

    // --- Token helpers ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[idx].kind.clone()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn expect(&mut self, kind: TokenKind) -> RuleResult<&Token> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else if self.check(TokenKind::Eof) {
            Err(RuleError::UnexpectedEof(format!("{}", kind)))
        } else {
            let tok = self.peek();
            Err(RuleError::UnexpectedToken {
                expected: format!("{}", kind),
                found: tok.text.clone(),
                line: tok.line,
            })
        }
    }

    fn expect_identifier(&mut self) -> RuleResult<String> {
        let tok = self.expect(TokenKind::Identifier)?;
        Ok(tok.text.clone())
    }

    /// Field names may collide with keywords (`entitlement.quantity`).
    fn expect_word(&mut self) -> RuleResult<String> {
        if self.peek().kind.is_word() {
            Ok(self.advance().text.clone())
        } else {
            self.expect_identifier()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_header() {
        let program = Parser::parse(r#"language "allot-rules/1""#).unwrap();
        assert_eq!(program.language.as_deref(), Some("allot-rules/1"));
        assert!(program.functions.is_empty());
    }

    #[test]
    fn test_parse_string_function_name() {
        let program = Parser::parse(r#"fn "pre_rhel-server" { return }"#).unwrap();
        assert_eq!(program.functions[0].name, "pre_rhel-server");
        assert_eq!(program.functions[0].body, vec![Stmt::Return]);
    }

    #[test]
    fn test_parse_pre_rule() {
        let input = r#"
        fn pre_monitoring {
            require consumer.type != "" else "Consumer type is required"
            if consumer.type == "hypervisor" {
                error "Hypervisors may not consume " + product.id
            } else if !pool.available {
                error "No entitlements available"
            }
            warn "checked"
        }
        "#;

        let program = Parser::parse(input).unwrap();
        let body = &program.functions[0].body;
        assert_eq!(body.len(), 3);
        assert!(matches!(body[0], Stmt::Require { .. }));
        match &body[1] {
            Stmt::If { else_branch, .. } => {
                assert_eq!(else_branch.len(), 1);
                assert!(matches!(else_branch[0], Stmt::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let program =
            Parser::parse("fn pre_x { if pool.available && 1 + 2 < 4 || false { return } }")
                .unwrap();
        let Stmt::If { condition, .. } = &program.functions[0].body[0] else {
            panic!("expected if");
        };
        let Expr::Binary(BinaryOp::Or, left, _) = condition else {
            panic!("expected || at the top, got {:?}", condition);
        };
        let Expr::Binary(BinaryOp::And, _, cmp) = left.as_ref() else {
            panic!("expected && under ||");
        };
        assert!(matches!(cmp.as_ref(), Expr::Binary(BinaryOp::Lt, _, _)));
    }

    #[test]
    fn test_parse_postfix_chain() {
        let program =
            Parser::parse(r#"fn pre_x { if product.attributes["virt_limit"] == none { return } }"#)
                .unwrap();
        let Stmt::If { condition, .. } = &program.functions[0].body[0] else {
            panic!("expected if");
        };
        let Expr::Binary(BinaryOp::Eq, left, right) = condition else {
            panic!("expected ==");
        };
        assert!(matches!(left.as_ref(), Expr::Index(_, _)));
        assert_eq!(right.as_ref(), &Expr::Literal(Value::None));
    }

    #[test]
    fn test_parse_keyword_field_name() {
        let program =
            Parser::parse("fn post_x { record \"q\" = entitlement.quantity }").unwrap();
        let Stmt::Record { value, .. } = &program.functions[0].body[0] else {
            panic!("expected record");
        };
        assert_eq!(
            value,
            &Expr::Field(Box::new(Expr::Root("entitlement".into())), "quantity".into())
        );
    }

    #[test]
    fn test_parse_select() {
        let program = Parser::parse(
            "fn select_pool_global { select where pool.available order by pool.end_date desc }",
        )
        .unwrap();
        match &program.functions[0].body[0] {
            Stmt::Select { filter, order } => {
                assert!(filter.is_some());
                assert_eq!(order.as_ref().map(|(_, o)| *o), Some(SortOrder::Desc));
            }
            other => panic!("expected select, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_pool_and_call() {
        let program =
            Parser::parse(r#"fn post_x { create_pool "virt_guest" quantity int("4") }"#).unwrap();
        match &program.functions[0].body[0] {
            Stmt::CreatePool { quantity, .. } => {
                assert!(matches!(quantity, Expr::Call(name, args) if name == "int" && args.len() == 1));
            }
            other => panic!("expected create_pool, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_unknown_root() {
        let err = Parser::parse("fn pre_x { error owner.name }").unwrap_err();
        assert!(matches!(err, RuleError::ParseError { .. }));
    }

    #[test]
    fn test_parse_error_unknown_function() {
        assert!(Parser::parse("fn pre_x { error upper(\"a\") }").is_err());
    }

    #[test]
    fn test_parse_error_missing_brace() {
        let err = Parser::parse("fn pre_x { return").unwrap_err();
        assert!(matches!(err, RuleError::UnexpectedEof(_)));
    }

    #[test]
    fn test_parse_error_require_without_else() {
        assert!(Parser::parse("fn pre_x { require true }").is_err());
    }
}
