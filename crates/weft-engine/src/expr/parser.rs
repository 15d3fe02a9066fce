use serde_json::Value;

use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Lt,
    Le,
    Gt,
    Ge,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Condition expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
}

/// Nesting bound for parentheses, unary chains, and postfix chains.
const MAX_DEPTH: usize = 64;

/// Binary and logical operators allowed in one expression. Operator chains
/// build left-deep trees that evaluation walks recursively.
const MAX_OPERATORS: usize = 512;

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::syntax(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
        end: src.len(),
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(ExprError::syntax(t.pos, format!("unexpected {:?}", t.token))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    operators: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn here(&self) -> usize {
        self.peek().map_or(self.end, |s| s.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let at = self.here();
        match self.advance() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(ExprError::syntax(at, format!("expected {:?}, found {:?}", want, t))),
            None => Err(ExprError::syntax(at, format!("expected {:?}", want))),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::syntax(self.here(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Consume an operator token, counting it against the operator budget.
    fn operator(&mut self) -> Result<(), ExprError> {
        let at = self.here();
        self.advance();
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ExprError::syntax(at, "expression too long"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.peek_token() == Some(&Token::Or) {
            self.operator()?;
            let rhs = self.and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.equality()?;
        while self.peek_token() == Some(&Token::And) {
            self.operator()?;
            let rhs = self.equality()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::EqEq) => BinaryOp::LooseEq,
                Some(Token::NotEq) => BinaryOp::LooseNe,
                Some(Token::StrictEq) => BinaryOp::StrictEq,
                Some(Token::StrictNotEq) => BinaryOp::StrictNe,
                _ => return Ok(lhs),
            };
            self.operator()?;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.operator()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek_token() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            match self.peek_token() {
                Some(Token::Dot) => {
                    self.advance();
                    let at = self.here();
                    let name = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        _ => return Err(ExprError::syntax(at, "expected property name after '.'")),
                    };
                    if self.peek_token() == Some(&Token::LParen) {
                        self.advance();
                        let args = self.arguments()?;
                        expr = Expr::Call {
                            target: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    self.enter()?;
                    let index = self.or();
                    self.leave();
                    let index = index?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
            chain += 1;
            if chain > MAX_DEPTH {
                return Err(ExprError::syntax(self.here(), "expression nested too deeply"));
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.peek_token() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            self.enter()?;
            let arg = self.or();
            self.leave();
            args.push(arg?);
            let at = self.here();
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(ExprError::syntax(at, "expected ',' or ')' in argument list")),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let at = self.here();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or();
                self.leave();
                let inner = inner?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(ExprError::syntax(at, format!("unexpected {:?}", t))),
            None => Err(ExprError::syntax(at, "unexpected end of expression")),
        }
    }
}
