//! Recursive-descent parser for rule source strings
//!
//! The grammar is a small JavaScript subset: declarations, assignments,
//! `if`/`else`, `return`, and expressions with member access, calls,
//! object/array literals (with spread), and the usual operator precedence.

use super::ast::{
    AssignOp, BinaryOp, Element, Entry, Expr, Key, LogicalOp, Place, Program, Property, Stmt,
    UnaryOp,
};
use super::lexer::{tokenize, Punct, Spanned, Token};
use super::ParseError;
use crate::Value;

const RESERVED: &[&str] = &["let", "const", "var", "return", "if", "else", "typeof"];

/// Parse a rule body
///
/// A source that is exactly one expression parses as `Program::Expression`,
/// anything else as a statement block.
pub fn parse_program(source: &str, max_depth: usize) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;

    let mut parser = Parser::new(tokens.clone(), max_depth);
    if !parser.at_eof() {
        if let Ok(expr) = parser.parse_expression() {
            if parser.at_eof() {
                return Ok(Program::Expression(expr));
            }
        }
    }

    let mut parser = Parser::new(tokens, max_depth);
    let mut body = Vec::new();
    while !parser.at_eof() {
        if let Some(stmt) = parser.parse_statement()? {
            body.push(stmt);
        }
    }
    Ok(Program::Block(body))
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn check(&self, punct: Punct) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == word)
    }

    fn expect(&mut self, punct: Punct, expected: &str) -> Result<(), ParseError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: describe(self.peek()),
            offset: self.offset(),
        }
    }

    /// Go one level deeper, failing past the depth limit
    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.enter()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // === Statements ===

    fn parse_statement(&mut self) -> Result<Option<Stmt>, ParseError> {
        self.nested(|p| {
            if p.eat(Punct::Semi) {
                return Ok(None);
            }
            if p.check(Punct::LBrace) {
                return Ok(Some(Stmt::Block(p.parse_block()?)));
            }
            if p.check_keyword("let") || p.check_keyword("const") || p.check_keyword("var") {
                p.advance();
                let name = p.parse_binding_name()?;
                let init = if p.eat(Punct::Assign) {
                    Some(p.parse_expression()?)
                } else {
                    None
                };
                p.eat(Punct::Semi);
                return Ok(Some(Stmt::Let { name, init }));
            }
            if p.check_keyword("return") {
                p.advance();
                let value = if p.check(Punct::Semi) || p.check(Punct::RBrace) || p.at_eof() {
                    None
                } else {
                    Some(p.parse_expression()?)
                };
                p.eat(Punct::Semi);
                return Ok(Some(Stmt::Return(value)));
            }
            if p.check_keyword("if") {
                p.advance();
                p.expect(Punct::LParen, "'(' after if")?;
                let cond = p.parse_expression()?;
                p.expect(Punct::RParen, "')' after condition")?;
                let then_branch = p.parse_branch()?;
                let else_branch = if p.check_keyword("else") {
                    p.advance();
                    p.parse_branch()?
                } else {
                    Vec::new()
                };
                return Ok(Some(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                }));
            }

            let offset = p.offset();
            let expr = p.parse_expression()?;
            let op = match p.peek() {
                Token::Punct(Punct::Assign) => Some(AssignOp::Set),
                Token::Punct(Punct::PlusAssign) => Some(AssignOp::Add),
                Token::Punct(Punct::MinusAssign) => Some(AssignOp::Sub),
                Token::Punct(Punct::StarAssign) => Some(AssignOp::Mul),
                Token::Punct(Punct::SlashAssign) => Some(AssignOp::Div),
                _ => None,
            };
            let stmt = match op {
                Some(op) => {
                    p.advance();
                    let target = place_of(expr).ok_or(ParseError::InvalidAssignmentTarget { offset })?;
                    let value = p.parse_expression()?;
                    Stmt::Assign { target, op, value }
                }
                None => Stmt::Expr(expr),
            };
            p.eat(Punct::Semi);
            Ok(Some(stmt))
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Punct::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            if let Some(stmt) = self.parse_statement()? {
                body.push(stmt);
            }
        }
        self.advance();
        Ok(body)
    }

    fn parse_branch(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.check(Punct::LBrace) {
            self.parse_block()
        } else {
            Ok(self.parse_statement()?.into_iter().collect())
        }
    }

    fn parse_binding_name(&mut self) -> Result<String, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Token::Ident(name) if RESERVED.contains(&name.as_str()) => {
                Err(ParseError::ReservedWord { word: name, offset })
            }
            Token::Ident(name) => Ok(name),
            other => Err(ParseError::UnexpectedToken {
                expected: "variable name".to_string(),
                found: describe(&other),
                offset,
            }),
        }
    }

    // === Expressions ===

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(|p| p.parse_conditional())
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_nullish()?;
        if !self.eat(Punct::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expression()?;
        self.expect(Punct::Colon, "':' in conditional expression")?;
        let else_expr = self.parse_expression()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then_expr),
            Box::new(else_expr),
        ))
    }

    fn parse_nullish(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_or, nullish_op, Expr::Logical)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_and, or_op, Expr::Logical)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_equality, and_op, Expr::Logical)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_relational, equality_op, Expr::Binary)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_additive, relational_op, Expr::Binary)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_multiplicative, additive_op, Expr::Binary)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_chain(Self::parse_unary, multiplicative_op, Expr::Binary)
    }

    /// Left-associative operator chain
    ///
    /// Every fold nests the tree built so far one level deeper, so each one
    /// counts against the depth limit like an explicit parenthesis would.
    fn parse_chain<Op>(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
        operator: fn(&Token) -> Option<Op>,
        combine: fn(Op, Box<Expr>, Box<Expr>) -> Expr,
    ) -> Result<Expr, ParseError> {
        let mut left = operand(self)?;
        let mut folds = 0;
        while let Some(op) = operator(self.peek()) {
            self.advance();
            self.enter()?;
            folds += 1;
            let right = operand(self)?;
            left = combine(op, Box::new(left), Box::new(right));
        }
        self.depth -= folds;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Punct(Punct::Bang) => Some(UnaryOp::Not),
            Token::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            Token::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            Token::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                self.nested(|p| Ok(Expr::Unary(op, Box::new(p.parse_unary()?))))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        let mut folds = 0;
        loop {
            if matches!(
                self.peek(),
                Token::Punct(Punct::Dot | Punct::QuestionDot | Punct::LBracket | Punct::LParen)
            ) {
                self.enter()?;
                folds += 1;
            }
            if self.eat(Punct::Dot) {
                let name = self.parse_property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Property::Name(name),
                    optional: false,
                };
            } else if self.eat(Punct::QuestionDot) {
                let property = if self.eat(Punct::LBracket) {
                    let index = self.parse_expression()?;
                    self.expect(Punct::RBracket, "']'")?;
                    Property::Index(Box::new(index))
                } else {
                    Property::Name(self.parse_property_name()?)
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: true,
                };
            } else if self.eat(Punct::LBracket) {
                let index = self.parse_expression()?;
                self.expect(Punct::RBracket, "']'")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Property::Index(Box::new(index)),
                    optional: false,
                };
            } else if self.eat(Punct::LParen) {
                let args = self.parse_elements(Punct::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                self.depth -= folds;
                return Ok(expr);
            }
        }
    }

    fn parse_property_name(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(ParseError::UnexpectedToken {
                expected: "property name".to_string(),
                found: describe(&other),
                offset: self.offset(),
            }),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(word) => {
                let literal = match word.as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    "null" => Some(Value::Null),
                    "undefined" => return Ok(Expr::Undefined),
                    _ => None,
                };
                if let Some(value) = literal {
                    return Ok(Expr::Literal(value));
                }
                if RESERVED.contains(&word.as_str()) {
                    return Err(ParseError::ReservedWord { word, offset });
                }
                Ok(Expr::Ident(word))
            }
            Token::Punct(Punct::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Punct::RParen, "')'")?;
                Ok(expr)
            }
            Token::Punct(Punct::LBracket) => Ok(Expr::Array(self.parse_elements(Punct::RBracket)?)),
            Token::Punct(Punct::LBrace) => self.parse_object(),
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: describe(&other),
                offset,
            }),
        }
    }

    /// Comma-separated elements up to `close`, which is consumed
    fn parse_elements(&mut self, close: Punct) -> Result<Vec<Element>, ParseError> {
        let mut elements = Vec::new();
        while !self.eat(close) {
            if self.eat(Punct::Ellipsis) {
                elements.push(Element::Spread(self.parse_expression()?));
            } else {
                elements.push(Element::Item(self.parse_expression()?));
            }
            if !self.eat(Punct::Comma) {
                self.expect(close, "',' or closing bracket")?;
                break;
            }
        }
        Ok(elements)
    }

    fn parse_object(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !self.eat(Punct::RBrace) {
            if self.eat(Punct::Ellipsis) {
                entries.push(Entry::Spread(self.parse_expression()?));
            } else {
                let offset = self.offset();
                let key = match self.advance() {
                    Token::Ident(name) => {
                        if !self.check(Punct::Colon) {
                            // Shorthand `{ name }`; `{ return x }` is a block, not an object
                            if RESERVED.contains(&name.as_str()) {
                                return Err(ParseError::ReservedWord { word: name, offset });
                            }
                            entries.push(Entry::Field(Key::Static(name.clone()), Expr::Ident(name)));
                            if !self.eat(Punct::Comma) {
                                self.expect(Punct::RBrace, "',' or '}'")?;
                                break;
                            }
                            continue;
                        }
                        Key::Static(name)
                    }
                    Token::Str(s) => Key::Static(s),
                    Token::Int(i) => Key::Static(i.to_string()),
                    Token::Punct(Punct::LBracket) => {
                        let key = self.parse_expression()?;
                        self.expect(Punct::RBracket, "']'")?;
                        Key::Computed(key)
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "object key".to_string(),
                            found: describe(&other),
                            offset,
                        })
                    }
                };
                self.expect(Punct::Colon, "':' after object key")?;
                entries.push(Entry::Field(key, self.parse_expression()?));
            }
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace, "',' or '}'")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }

    #[cfg(test)]
    fn remaining(&self) -> usize {
        self.tokens.len() - 1 - self.pos
    }
}

fn nullish_op(token: &Token) -> Option<LogicalOp> {
    matches!(token, Token::Punct(Punct::QuestionQuestion)).then_some(LogicalOp::Nullish)
}

fn or_op(token: &Token) -> Option<LogicalOp> {
    matches!(token, Token::Punct(Punct::OrOr)).then_some(LogicalOp::Or)
}

fn and_op(token: &Token) -> Option<LogicalOp> {
    matches!(token, Token::Punct(Punct::AndAnd)).then_some(LogicalOp::And)
}

fn equality_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Punct(Punct::EqEqEq) => Some(BinaryOp::StrictEq),
        Token::Punct(Punct::NotEqEq) => Some(BinaryOp::StrictNe),
        Token::Punct(Punct::EqEq) => Some(BinaryOp::LooseEq),
        Token::Punct(Punct::NotEq) => Some(BinaryOp::LooseNe),
        _ => None,
    }
}

fn relational_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Punct(Punct::Lt) => Some(BinaryOp::Lt),
        Token::Punct(Punct::Le) => Some(BinaryOp::Le),
        Token::Punct(Punct::Gt) => Some(BinaryOp::Gt),
        Token::Punct(Punct::Ge) => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn additive_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Punct(Punct::Plus) => Some(BinaryOp::Add),
        Token::Punct(Punct::Minus) => Some(BinaryOp::Sub),
        _ => None,
    }
}

fn multiplicative_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Punct(Punct::Star) => Some(BinaryOp::Mul),
        Token::Punct(Punct::Slash) => Some(BinaryOp::Div),
        Token::Punct(Punct::Percent) => Some(BinaryOp::Mod),
        _ => None,
    }
}

/// Convert an expression to an assignable place, if it is one
fn place_of(expr: Expr) -> Option<Place> {
    match expr {
        Expr::Ident(root) => Some(Place {
            root,
            path: Vec::new(),
        }),
        Expr::Member {
            object,
            property,
            optional: false,
        } => {
            let mut place = place_of(*object)?;
            place.path.push(property);
            Some(place)
        }
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => i.to_string(),
        Token::Float(f) => f.to_string(),
        Token::Str(s) => format!("string {:?}", s),
        Token::Ident(name) => format!("'{}'", name),
        Token::Punct(p) => format!("{:?}", p),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse_program(source, 64).unwrap() {
            Program::Expression(e) => e,
            other => panic!("expected expression form, got {:?}", other),
        }
    }

    fn block(source: &str) -> Vec<Stmt> {
        match parse_program(source, 64).unwrap() {
            Program::Block(body) => body,
            other => panic!("expected block form, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let parsed = expr("1 + 2 * 3");
        assert_eq!(
            parsed,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Literal(Value::Int(1))),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Literal(Value::Int(2))),
                    Box::new(Expr::Literal(Value::Int(3))),
                )),
            )
        );
    }

    #[test]
    fn test_member_chain() {
        let parsed = expr("payload.items[0]");
        assert!(matches!(
            parsed,
            Expr::Member {
                property: Property::Index(_),
                optional: false,
                ..
            }
        ));
    }

    #[test]
    fn test_bare_object_is_expression_form() {
        let parsed = expr("{...state, count: state.count + 1}");
        match parsed {
            Expr::Object(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(matches!(entries[0], Entry::Spread(_)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_statement_forms() {
        let body = block("const next = state.count + 1; if (next > 3) { return null; } else return next;");
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0], Stmt::Let { .. }));
        match &body[1] {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_semicolon_is_block_form() {
        let body = block("payload.type === 'ping';");
        assert!(matches!(body[0], Stmt::Expr(_)));
    }

    #[test]
    fn test_assignment_targets() {
        let body = block("state.items[2].done = true; state.count += 1;");
        match &body[0] {
            Stmt::Assign { target, op, .. } => {
                assert_eq!(target.root, "state");
                assert_eq!(target.path.len(), 3);
                assert_eq!(*op, AssignOp::Set);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
        assert!(matches!(
            parse_program("f() = 1;", 64),
            Err(ParseError::InvalidAssignmentTarget { .. })
        ));
    }

    #[test]
    fn test_reserved_words_are_not_identifiers() {
        assert!(matches!(
            parse_program("let return = 1", 64),
            Err(ParseError::ReservedWord { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(
            parse_program(&source, 32),
            Err(ParseError::TooDeep { max: 32 })
        ));
        assert!(parse_program(&source, 256).is_ok());
    }

    #[test]
    fn test_operator_chains_count_toward_depth() {
        let chain = vec!["a"; 40].join(" && ");
        assert!(matches!(
            parse_program(&chain, 16),
            Err(ParseError::TooDeep { max: 16 })
        ));
        assert!(parse_program(&chain, 64).is_ok());

        let calls = format!("a{}", ".b()".repeat(20));
        assert!(matches!(
            parse_program(&calls, 16),
            Err(ParseError::TooDeep { max: 16 })
        ));
    }

    #[test]
    fn test_undefined_is_not_null() {
        assert_eq!(expr("undefined"), Expr::Undefined);
        assert_eq!(expr("null"), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_unbalanced_input_is_an_error() {
        assert!(parse_program("(1 + 2", 64).is_err());
        assert!(parse_program("{ return 1;", 64).is_err());
    }

    #[test]
    fn test_parser_consumes_all_tokens() {
        let tokens = tokenize("a.b(c, ...d)").unwrap();
        let mut parser = Parser::new(tokens, 64);
        parser.parse_expression().unwrap();
        assert_eq!(parser.remaining(), 0);
    }
}
