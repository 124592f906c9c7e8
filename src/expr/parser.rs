//! Pratt parser over the token stream produced by `lexer::lex` (spec §4.D).

use std::rc::Rc;

use crate::error::{FailureKind, YamletError, YamletResult};

use super::ast::{BinOp, BoolOp, CmpOp, CompClause, CompKind, Expr, Subscript, UnaryOp};
use super::lexer::Tok;

pub struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
}

fn err(msg: impl Into<String>) -> YamletError {
    YamletError::new(FailureKind::ConstructionError, msg.into())
}

pub fn parse(toks: &[Tok]) -> YamletResult<Expr> {
    let mut p = Parser { toks, pos: 0 };
    let e = p.parse_expr()?;
    p.expect(&Tok::Eof)?;
    Ok(e)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> YamletResult<()> {
        if self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(err(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    /// Entry point: the conditional expression `x if c else y`, then
    /// boolean `or`/`and`.
    pub fn parse_expr(&mut self) -> YamletResult<Expr> {
        let body = self.parse_or()?;
        if self.at(&Tok::If) {
            self.advance();
            let test = self.parse_or()?;
            self.expect(&Tok::Else)?;
            let orelse = self.parse_expr()?;
            return Ok(Expr::IfExp { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_and()?;
        while self.at(&Tok::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_not()?;
        while self.at(&Tok::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> YamletResult<Expr> {
        if self.at(&Tok::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> YamletResult<Expr> {
        let left = self.parse_composition()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Eq2 => CmpOp::Eq,
                Tok::NotEq => CmpOp::Ne,
                Tok::Lt => CmpOp::Lt,
                Tok::Le => CmpOp::Le,
                Tok::Gt => CmpOp::Gt,
                Tok::Ge => CmpOp::Ge,
                Tok::In => CmpOp::In,
                Tok::Is => {
                    self.advance();
                    if self.at(&Tok::Not) {
                        self.advance();
                        chain.push((CmpOp::IsNot, self.parse_composition()?));
                    } else {
                        chain.push((CmpOp::Is, self.parse_composition()?));
                    }
                    continue;
                }
                Tok::Not => {
                    self.advance();
                    self.expect(&Tok::In)?;
                    chain.push((CmpOp::NotIn, self.parse_composition()?));
                    continue;
                }
                _ => break,
            };
            self.advance();
            chain.push((op, self.parse_composition()?));
        }
        if chain.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), chain))
        }
    }

    /// `@`, spec §4.D's implicit composition token, binds tighter than
    /// comparisons but looser than arithmetic: `a + b c` composes `(a+b)`
    /// with `c`, matching the "adjacent atoms" framing.
    fn parse_composition(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_bitor()?;
        while self.at(&Tok::At) {
            self.advance();
            let right = self.parse_bitor()?;
            left = Expr::Compose(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.at(&Tok::Pipe) {
            self.advance();
            let right = self.parse_bitxor()?;
            left = Expr::Binary(BinOp::BitOr, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_bitand()?;
        while self.at(&Tok::Caret) {
            self.advance();
            let right = self.parse_bitand()?;
            left = Expr::Binary(BinOp::BitXor, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_shift()?;
        while self.at(&Tok::Amp) {
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary(BinOp::BitAnd, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::Shl => BinOp::LShift,
                Tok::Shr => BinOp::RShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> YamletResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::DSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> YamletResult<Expr> {
        let op = match self.peek() {
            Tok::Plus => Some(UnaryOp::Pos),
            Tok::Minus => Some(UnaryOp::Neg),
            Tok::Tilde => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> YamletResult<Expr> {
        let mut atom = self.parse_atom()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    atom = Expr::Attribute(Box::new(atom), name);
                }
                Tok::LParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    self.expect(&Tok::RParen)?;
                    atom = Expr::Call { func: Box::new(atom), args, kwargs };
                }
                Tok::LBracket => {
                    self.advance();
                    let sub = self.parse_subscript()?;
                    self.expect(&Tok::RBracket)?;
                    atom = Expr::Subscript(Box::new(atom), Box::new(sub));
                }
                _ => break,
            }
        }
        Ok(atom)
    }

    fn expect_name(&mut self) -> YamletResult<Rc<str>> {
        match self.advance() {
            Tok::Name(n) => Ok(n),
            other => Err(err(format!("expected a name, found {other:?}"))),
        }
    }

    fn parse_call_args(&mut self) -> YamletResult<(Vec<Expr>, Vec<(Rc<str>, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.at(&Tok::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            if let Tok::Name(name) = self.peek().clone() {
                if self.toks.get(self.pos + 1) == Some(&Tok::Assign) {
                    self.advance();
                    self.advance();
                    let v = self.parse_expr()?;
                    kwargs.push((name, v));
                    if self.at(&Tok::Comma) {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            args.push(self.parse_expr()?);
            if self.at(&Tok::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok((args, kwargs))
    }

    fn parse_subscript(&mut self) -> YamletResult<Subscript> {
        let lo = if self.at(&Tok::Colon) { None } else { Some(Box::new(self.parse_expr()?)) };
        if !self.at(&Tok::Colon) {
            return Ok(Subscript::Index(*lo.expect("index form requires an expression")));
        }
        self.advance();
        let hi = if matches!(self.peek(), Tok::RBracket | Tok::Colon) { None } else { Some(Box::new(self.parse_expr()?)) };
        let step = if self.at(&Tok::Colon) {
            self.advance();
            if self.at(&Tok::RBracket) { None } else { Some(Box::new(self.parse_expr()?)) }
        } else {
            None
        };
        Ok(Subscript::Slice { lo, hi, step })
    }

    fn parse_comp_clauses(&mut self) -> YamletResult<Vec<CompClause>> {
        let mut clauses = Vec::new();
        while self.at(&Tok::For) {
            self.advance();
            let target = self.expect_name()?;
            self.expect_in_keyword()?;
            let iter = self.parse_or()?;
            let mut ifs = Vec::new();
            while self.at(&Tok::If) {
                self.advance();
                ifs.push(self.parse_or()?);
            }
            clauses.push(CompClause { target, iter, ifs });
        }
        Ok(clauses)
    }

    fn expect_in_keyword(&mut self) -> YamletResult<()> {
        if self.at(&Tok::In) {
            self.advance();
            Ok(())
        } else {
            Err(err("expected `in` in comprehension"))
        }
    }

    fn parse_atom(&mut self) -> YamletResult<Expr> {
        match self.advance() {
            Tok::Int(v) => Ok(Expr::ConstInt(v)),
            Tok::Float(v) => Ok(Expr::ConstFloat(v)),
            Tok::Str(s) => Ok(Expr::ConstStr(s)),
            Tok::Bool(b) => Ok(Expr::ConstBool(b)),
            Tok::Null => Ok(Expr::ConstNull),
            Tok::Name(n) => Ok(Expr::Name(n)),
            Tok::LParen => {
                if self.at(&Tok::RParen) {
                    self.advance();
                    return Ok(Expr::HostTuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at(&Tok::Comma) {
                    let mut items = vec![first];
                    while self.at(&Tok::Comma) {
                        self.advance();
                        if self.at(&Tok::RParen) {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    self.expect(&Tok::RParen)?;
                    Ok(Expr::HostTuple(items))
                } else {
                    self.expect(&Tok::RParen)?;
                    Ok(first)
                }
            }
            Tok::LBracket => {
                if self.at(&Tok::RBracket) {
                    self.advance();
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at(&Tok::For) {
                    let clauses = self.parse_comp_clauses()?;
                    self.expect(&Tok::RBracket)?;
                    return Ok(Expr::Comp(Box::new(CompKind::List { elt: first, clauses })));
                }
                let mut items = vec![first];
                while self.at(&Tok::Comma) {
                    self.advance();
                    if self.at(&Tok::RBracket) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect(&Tok::RBracket)?;
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                if self.at(&Tok::RBrace) {
                    self.advance();
                    return Ok(Expr::Dict(Vec::new()));
                }
                let first_key = self.parse_expr()?;
                if self.at(&Tok::Colon) {
                    self.advance();
                    let first_val = self.parse_expr()?;
                    if self.at(&Tok::For) {
                        let clauses = self.parse_comp_clauses()?;
                        self.expect(&Tok::RBrace)?;
                        return Ok(Expr::Comp(Box::new(CompKind::Dict { key: first_key, value: first_val, clauses })));
                    }
                    let mut pairs = vec![(first_key, first_val)];
                    while self.at(&Tok::Comma) {
                        self.advance();
                        if self.at(&Tok::RBrace) {
                            break;
                        }
                        let k = self.parse_expr()?;
                        self.expect(&Tok::Colon)?;
                        let v = self.parse_expr()?;
                        pairs.push((k, v));
                    }
                    self.expect(&Tok::RBrace)?;
                    Ok(Expr::Dict(pairs))
                } else if self.at(&Tok::For) {
                    let clauses = self.parse_comp_clauses()?;
                    self.expect(&Tok::RBrace)?;
                    Ok(Expr::Comp(Box::new(CompKind::Set { elt: first_key, clauses })))
                } else {
                    let mut items = vec![first_key];
                    while self.at(&Tok::Comma) {
                        self.advance();
                        if self.at(&Tok::RBrace) {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    self.expect(&Tok::RBrace)?;
                    Ok(Expr::SetLit(items))
                }
            }
            other => Err(err(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::lex;

    #[test]
    fn parses_implicit_composition_as_compose_node() {
        let ast = parse(&lex("a b c").unwrap()).unwrap();
        match ast {
            Expr::Compose(l, r) => {
                assert!(matches!(*r, Expr::Name(_)));
                assert!(matches!(*l, Expr::Compose(_, _)));
            }
            other => panic!("expected Compose, got {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_kwargs() {
        let ast = parse(&lex("f(1, name=2)").unwrap()).unwrap();
        match ast {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs.len(), 1);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn parses_slice_subscript() {
        let ast = parse(&lex("a[1:2:3]").unwrap()).unwrap();
        assert!(matches!(ast, Expr::Subscript(_, _)));
    }
}
