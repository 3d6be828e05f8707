//! Hand-written lexer for SysY.
//!
//! No generator (no lalrpop/logos): the teacher's own front end
//! (`seq-compiler`'s `parser.rs`) tokenizes by hand over a char cursor, and
//! SysY's token set is small enough that a generator would add a build
//! dependency for no real gain.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    IntConst(i32),
    // Keywords
    KwConst,
    KwInt,
    KwVoid,
    KwIf,
    KwElse,
    KwWhile,
    KwBreak,
    KwContinue,
    KwReturn,
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Assign,
    // Operators
    Plus,
    Minus,
    Not,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub tok: Token,
    pub line: u32,
    pub col: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek2() == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenize the whole input. Returns a lex error naming the offending
    /// byte and its line/column on an invalid character.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, String> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                out.push(Spanned {
                    tok: Token::Eof,
                    line,
                    col,
                });
                break;
            };

            let tok = if c.is_ascii_digit() {
                self.lex_number()?
            } else if c == b'_' || c.is_ascii_alphabetic() {
                self.lex_ident_or_keyword()
            } else {
                self.lex_punct(line, col)?
            };
            out.push(Spanned { tok, line, col });
        }
        Ok(out)
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let s = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match s {
            "const" => Token::KwConst,
            "int" => Token::KwInt,
            "void" => Token::KwVoid,
            "if" => Token::KwIf,
            "else" => Token::KwElse,
            "while" => Token::KwWhile,
            "break" => Token::KwBreak,
            "continue" => Token::KwContinue,
            "return" => Token::KwReturn,
            _ => Token::Ident(s.to_string()),
        }
    }

    /// Decimal, octal (leading `0`) and hex (`0x`/`0X`) integer literals.
    fn lex_number(&mut self) -> Result<Token, String> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            let digit_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = std::str::from_utf8(&self.src[digit_start..self.pos]).unwrap();
            let v = i64::from_str_radix(digits, 16).map_err(|e| e.to_string())?;
            return Ok(Token::IntConst(v as i32));
        }
        if self.peek() == Some(b'0') {
            self.bump();
            let digit_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            if self.pos == digit_start {
                return Ok(Token::IntConst(0));
            }
            let digits = std::str::from_utf8(&self.src[digit_start..self.pos]).unwrap();
            let v = i64::from_str_radix(digits, 8).map_err(|e| e.to_string())?;
            return Ok(Token::IntConst(v as i32));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let digits = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        let v: i64 = digits.parse().map_err(|_: std::num::ParseIntError| {
            format!("integer literal '{}' out of range", digits)
        })?;
        Ok(Token::IntConst(v as i32))
    }

    fn lex_punct(&mut self, line: u32, col: u32) -> Result<Token, String> {
        let c = self.bump().unwrap();
        let tok = match c {
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b',' => Token::Comma,
            b';' => Token::Semi,
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::NotEq
                } else {
                    Token::Not
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'&' if self.peek() == Some(b'&') => {
                self.bump();
                Token::AndAnd
            }
            b'|' if self.peek() == Some(b'|') => {
                self.bump();
                Token::OrOr
            }
            other => {
                return Err(format!(
                    "unexpected character '{}' at {}:{}",
                    other as char, line, col
                ));
            }
        };
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.tok)
            .collect()
    }

    #[test]
    fn lexes_keywords_and_idents() {
        assert_eq!(
            toks("int main"),
            vec![
                Token::KwInt,
                Token::Ident("main".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_number_bases() {
        assert_eq!(
            toks("0 017 0x1F 42"),
            vec![
                Token::IntConst(0),
                Token::IntConst(15),
                Token::IntConst(31),
                Token::IntConst(42),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            toks("1 /* a block\ncomment */ + // line comment\n 2"),
            vec![
                Token::IntConst(1),
                Token::Plus,
                Token::IntConst(2),
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_short_circuit_operators() {
        assert_eq!(
            toks("a && b || !c"),
            vec![
                Token::Ident("a".into()),
                Token::AndAnd,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Not,
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }
}
