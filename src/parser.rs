//! Recursive-descent / precedence-climbing parser for SysY.
//!
//! One `parse_*` method per grammar production, mirroring `seq-compiler`'s
//! `Parser` (a token cursor plus per-production methods returning
//! `Result<_, String>`). Dangling-else is resolved by always parsing the
//! `else` branch greedily when it follows immediately, rather than by a
//! separate open/closed AST node — the ambiguity is purely a parse-time
//! concern once the AST's `else_branch: Option<_>` can represent both.

use crate::ast::*;
use crate::lexer::{Lexer, Spanned, Token};

pub struct Parser {
    toks: Vec<Spanned>,
    pos: usize,
    next_block_id: u32,
    next_stmt_id: u32,
}

impl Parser {
    pub fn new(src: &str) -> Result<Self, String> {
        let toks = Lexer::new(src).tokenize()?;
        Ok(Parser {
            toks,
            pos: 0,
            // Starts at 1, not 0: block id 0 is reserved for `symbol::GLOBAL_NAMESPACE`,
            // and `Symbols::open_scope` must never be handed that id.
            next_block_id: 1,
            next_stmt_id: 0,
        })
    }

    fn fresh_block_id(&mut self) -> u32 {
        let id = self.next_block_id;
        self.next_block_id += 1;
        id
    }

    fn fresh_stmt_id(&mut self) -> u32 {
        let id = self.next_stmt_id;
        self.next_stmt_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.toks[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.toks
            .get(self.pos + offset)
            .map(|s| &s.tok)
            .unwrap_or(&Token::Eof)
    }

    fn loc(&self) -> String {
        let s = &self.toks[self.pos];
        format!("{}:{}", s.line, s.col)
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<(), String> {
        if self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(format!(
                "expected {:?}, found {:?} at {}",
                tok,
                self.peek(),
                self.loc()
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, String> {
        let mut items = Vec::new();
        while *self.peek() != Token::Eof {
            items.push(self.parse_global_item()?);
        }
        Ok(Program { items })
    }

    fn parse_global_item(&mut self) -> Result<GlobalItem, String> {
        if *self.peek() == Token::KwConst {
            return Ok(GlobalItem::Decl(self.parse_const_decl()?));
        }
        // Either `void ident(...)` or `int ident(...)` (FuncDef) / `int ident ...;` (VarDecl).
        let is_void = *self.peek() == Token::KwVoid;
        self.expect_ident_type()?;
        let ident = self.expect_ident()?;
        if *self.peek() == Token::LParen {
            Ok(GlobalItem::FuncDef(self.parse_func_def_tail(is_void, ident)?))
        } else {
            Ok(GlobalItem::Decl(Decl::Var(
                BType::Int,
                self.parse_var_def_list(ident)?,
            )))
        }
    }

    fn expect_ident_type(&mut self) -> Result<(), String> {
        match self.bump() {
            Token::KwInt | Token::KwVoid => Ok(()),
            other => Err(format!("expected type, found {:?}", other)),
        }
    }

    fn parse_const_decl(&mut self) -> Result<Decl, String> {
        self.expect(&Token::KwConst)?;
        self.expect(&Token::KwInt)?;
        let mut defs = vec![self.parse_const_def()?];
        while *self.peek() == Token::Comma {
            self.bump();
            defs.push(self.parse_const_def()?);
        }
        self.expect(&Token::Semi)?;
        Ok(Decl::Const(BType::Int, defs))
    }

    fn parse_const_def(&mut self) -> Result<ConstDef, String> {
        let ident = self.expect_ident()?;
        let dims = self.parse_array_dims()?;
        self.expect(&Token::Assign)?;
        let init = self.parse_init_val()?;
        Ok(ConstDef { ident, dims, init })
    }

    fn parse_array_dims(&mut self) -> Result<Vec<Expr>, String> {
        let mut dims = Vec::new();
        while *self.peek() == Token::LBracket {
            self.bump();
            dims.push(self.parse_exp()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(dims)
    }

    fn parse_init_val(&mut self) -> Result<InitVal, String> {
        if *self.peek() == Token::LBrace {
            self.bump();
            let mut list = Vec::new();
            if *self.peek() != Token::RBrace {
                list.push(self.parse_init_val()?);
                while *self.peek() == Token::Comma {
                    self.bump();
                    list.push(self.parse_init_val()?);
                }
            }
            self.expect(&Token::RBrace)?;
            Ok(InitVal::List(list))
        } else {
            Ok(InitVal::Exp(self.parse_exp()?))
        }
    }

    fn parse_var_def_list(&mut self, first_ident: String) -> Result<Vec<VarDef>, String> {
        let mut defs = vec![self.parse_var_def_tail(first_ident)?];
        while *self.peek() == Token::Comma {
            self.bump();
            let ident = self.expect_ident()?;
            defs.push(self.parse_var_def_tail(ident)?);
        }
        self.expect(&Token::Semi)?;
        Ok(defs)
    }

    fn parse_var_def_tail(&mut self, ident: String) -> Result<VarDef, String> {
        let dims = self.parse_array_dims()?;
        let init = if *self.peek() == Token::Assign {
            self.bump();
            Some(self.parse_init_val()?)
        } else {
            None
        };
        Ok(VarDef { ident, dims, init })
    }

    fn parse_func_def_tail(&mut self, is_void: bool, ident: String) -> Result<FuncDef, String> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if *self.peek() != Token::RParen {
            params.push(self.parse_func_param()?);
            while *self.peek() == Token::Comma {
                self.bump();
                params.push(self.parse_func_param()?);
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(FuncDef {
            ret_ty: if is_void {
                FuncRetType::Void
            } else {
                FuncRetType::Int
            },
            ident,
            params,
            body,
        })
    }

    fn parse_func_param(&mut self) -> Result<FuncParam, String> {
        self.expect(&Token::KwInt)?;
        let ident = self.expect_ident()?;
        if *self.peek() == Token::LBracket {
            self.bump();
            self.expect(&Token::RBracket)?;
            let mut trailing = Vec::new();
            while *self.peek() == Token::LBracket {
                self.bump();
                trailing.push(self.parse_exp()?);
                self.expect(&Token::RBracket)?;
            }
            Ok(FuncParam {
                ident,
                array_dims: Some(trailing),
            })
        } else {
            Ok(FuncParam {
                ident,
                array_dims: None,
            })
        }
    }

    fn parse_block(&mut self) -> Result<Block, String> {
        let id = self.fresh_block_id();
        self.expect(&Token::LBrace)?;
        let mut items = Vec::new();
        while *self.peek() != Token::RBrace {
            items.push(self.parse_block_item()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Block { id, items })
    }

    fn parse_block_item(&mut self) -> Result<BlockItem, String> {
        if *self.peek() == Token::KwConst {
            return Ok(BlockItem::Decl(self.parse_const_decl()?));
        }
        if *self.peek() == Token::KwInt {
            self.bump();
            let ident = self.expect_ident()?;
            return Ok(BlockItem::Decl(Decl::Var(
                BType::Int,
                self.parse_var_def_list(ident)?,
            )));
        }
        Ok(BlockItem::Stmt(self.parse_stmt()?))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek() {
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::KwReturn => {
                let id = self.fresh_stmt_id();
                self.bump();
                let exp = if *self.peek() == Token::Semi {
                    None
                } else {
                    Some(self.parse_exp()?)
                };
                self.expect(&Token::Semi)?;
                Ok(Stmt::Return { id, exp })
            }
            Token::KwBreak => {
                let id = self.fresh_stmt_id();
                self.bump();
                self.expect(&Token::Semi)?;
                Ok(Stmt::Break { id })
            }
            Token::KwContinue => {
                let id = self.fresh_stmt_id();
                self.bump();
                self.expect(&Token::Semi)?;
                Ok(Stmt::Continue { id })
            }
            Token::KwIf => {
                let id = self.fresh_stmt_id();
                self.bump();
                self.expect(&Token::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&Token::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if *self.peek() == Token::KwElse {
                    self.bump();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    id,
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Token::KwWhile => {
                let id = self.fresh_stmt_id();
                self.bump();
                self.expect(&Token::LParen)?;
                let cond = self.parse_exp()?;
                self.expect(&Token::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { id, cond, body })
            }
            Token::Semi => {
                self.bump();
                Ok(Stmt::Exp(None))
            }
            _ => {
                // Either an assignment (`LVal = Exp;`) or a bare expression
                // statement. Both start with an identifier-led primary, so
                // try parsing an LVal and look for `=` before committing.
                if self.looks_like_assignment() {
                    let lval = self.parse_lval()?;
                    self.expect(&Token::Assign)?;
                    let exp = self.parse_exp()?;
                    self.expect(&Token::Semi)?;
                    Ok(Stmt::Assign { lval, exp })
                } else {
                    let exp = self.parse_exp()?;
                    self.expect(&Token::Semi)?;
                    Ok(Stmt::Exp(Some(exp)))
                }
            }
        }
    }

    /// Lookahead: an `Ident` followed by any run of `[Exp]` subscripts and
    /// then `=` (not `==`) is an assignment target.
    fn looks_like_assignment(&self) -> bool {
        if !matches!(self.peek(), Token::Ident(_)) {
            return false;
        }
        let mut i = 1;
        loop {
            match self.peek_at(i) {
                Token::LBracket => {
                    // Skip a balanced bracket pair without re-parsing the
                    // expression inside.
                    let mut depth = 1;
                    i += 1;
                    while depth > 0 {
                        match self.peek_at(i) {
                            Token::LBracket => depth += 1,
                            Token::RBracket => depth -= 1,
                            Token::Eof => return false,
                            _ => {}
                        }
                        i += 1;
                    }
                }
                Token::Assign => return true,
                _ => return false,
            }
        }
    }

    fn parse_lval(&mut self) -> Result<LVal, String> {
        let ident = self.expect_ident()?;
        let mut indices = Vec::new();
        while *self.peek() == Token::LBracket {
            self.bump();
            indices.push(self.parse_exp()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(LVal { ident, indices })
    }

    pub fn parse_exp(&mut self) -> Result<Expr, String> {
        self.parse_lor_exp()
    }

    fn parse_lor_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_land_exp()?;
        while *self.peek() == Token::OrOr {
            self.bump();
            let rhs = self.parse_land_exp()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_land_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_eq_exp()?;
        while *self.peek() == Token::AndAnd {
            self.bump();
            let rhs = self.parse_eq_exp()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_rel_exp()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_rel_exp()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_add_exp()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_add_exp()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_mul_exp()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_mul_exp()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul_exp(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary_exp()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary_exp()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary_exp(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::Plus => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.parse_unary_exp()?)))
            }
            Token::Minus => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary_exp()?)))
            }
            Token::Not => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary_exp()?)))
            }
            Token::Ident(_) if *self.peek_at(1) == Token::LParen => {
                let ident = self.expect_ident()?;
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Token::RParen {
                    args.push(self.parse_exp()?);
                    while *self.peek() == Token::Comma {
                        self.bump();
                        args.push(self.parse_exp()?);
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::Call { ident, args })
            }
            _ => self.parse_primary_exp(),
        }
    }

    fn parse_primary_exp(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::LParen => {
                self.bump();
                let e = self.parse_exp()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Token::IntConst(_) => match self.bump() {
                Token::IntConst(v) => Ok(Expr::Number(v)),
                _ => unreachable!(),
            },
            Token::Ident(_) => Ok(Expr::LVal(self.parse_lval()?)),
            other => Err(format!(
                "expected expression, found {:?} at {}",
                other,
                self.loc()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse_program().unwrap()
    }

    #[test]
    fn parses_minimal_main() {
        let p = parse("int main() { return 0; }");
        assert_eq!(p.items.len(), 1);
        match &p.items[0] {
            GlobalItem::FuncDef(f) => {
                assert_eq!(f.ident, "main");
                assert_eq!(f.ret_ty, FuncRetType::Int);
                assert_eq!(f.body.items.len(), 1);
            }
            _ => panic!("expected func def"),
        }
    }

    #[test]
    fn parses_precedence_ladder() {
        let p = parse("int main() { int a = 1+2*3; return a; }");
        match &p.items[0] {
            GlobalItem::FuncDef(f) => match &f.body.items[0] {
                BlockItem::Decl(Decl::Var(_, defs)) => match &defs[0].init {
                    Some(InitVal::Exp(Expr::Binary(BinOp::Add, _, rhs))) => {
                        assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
                    }
                    other => panic!("unexpected init {:?}", other),
                },
                other => panic!("unexpected item {:?}", other),
            },
            _ => panic!("expected func def"),
        }
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let p = parse("int main() { if (1) if (0) return 1; else return 2; return 0; }");
        match &p.items[0] {
            GlobalItem::FuncDef(f) => match &f.body.items[0] {
                BlockItem::Stmt(Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                }) => {
                    assert!(else_branch.is_none());
                    assert!(matches!(**then_branch, Stmt::If { else_branch: Some(_), .. }));
                }
                other => panic!("unexpected stmt {:?}", other),
            },
            _ => panic!("expected func def"),
        }
    }

    #[test]
    fn parses_array_decl_and_index() {
        let p = parse("int main() { int a[2][3] = {{1,2,3},{4,5,6}}; return a[1][2]; }");
        match &p.items[0] {
            GlobalItem::FuncDef(f) => {
                assert_eq!(f.body.items.len(), 2);
            }
            _ => panic!("expected func def"),
        }
    }
}
