//! Tokenizer for rule source strings

use super::ParseError;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Punct(Punct),
    Eof,
}

/// Punctuation and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Question,
    QuestionDot,
    QuestionQuestion,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

/// A token with its byte offset in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

// Longest operators first so that prefixes don't shadow them.
const OPERATORS: &[(&str, Punct)] = &[
    ("===", Punct::EqEqEq),
    ("!==", Punct::NotEqEq),
    ("...", Punct::Ellipsis),
    ("==", Punct::EqEq),
    ("!=", Punct::NotEq),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("??", Punct::QuestionQuestion),
    ("?.", Punct::QuestionDot),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("*=", Punct::StarAssign),
    ("/=", Punct::SlashAssign),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    (",", Punct::Comma),
    (";", Punct::Semi),
    (":", Punct::Colon),
    (".", Punct::Dot),
    ("?", Punct::Question),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
];

/// Split a source string into tokens, terminated by `Token::Eof`
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Comments
        if source[pos..].starts_with("//") {
            pos = source[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
            continue;
        }
        if source[pos..].starts_with("/*") {
            let end = source[pos + 2..]
                .find("*/")
                .ok_or(ParseError::UnterminatedComment { offset: pos })?;
            pos += end + 4;
            continue;
        }

        let start = pos;

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let (token, end) = lex_number(source, pos)?;
            tokens.push(Spanned { token, offset: start });
            pos = end;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (text, end) = lex_string(source, pos)?;
            tokens.push(Spanned {
                token: Token::Str(text),
                offset: start,
            });
            pos = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
            {
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(source[start..pos].to_string()),
                offset: start,
            });
            continue;
        }

        // `?.` followed by a digit is a ternary with a decimal literal, not optional chaining
        let rest = &source[pos..];
        let op = OPERATORS.iter().find(|(text, punct)| {
            rest.starts_with(text)
                && !(*punct == Punct::QuestionDot
                    && bytes.get(pos + 2).is_some_and(u8::is_ascii_digit))
        });
        match op {
            Some((text, punct)) => {
                tokens.push(Spanned {
                    token: Token::Punct(*punct),
                    offset: start,
                });
                pos += text.len();
            }
            None => {
                let found = rest.chars().next().unwrap_or('\0');
                return Err(ParseError::UnexpectedChar { found, offset: pos });
            }
        }
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: bytes.len(),
    });
    Ok(tokens)
}

fn lex_number(source: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut is_float = false;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            is_float = true;
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &source[start..pos];
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
        offset: start,
    };
    let token = if is_float {
        Token::Float(text.parse().map_err(|_| invalid())?)
    } else {
        match text.parse::<i64>() {
            Ok(i) => Token::Int(i),
            // Too large for i64, keep it as a float like JSON numbers do
            Err(_) => Token::Float(text.parse().map_err(|_| invalid())?),
        }
    };
    Ok((token, pos))
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), ParseError> {
    let mut chars = source[start..].char_indices();
    let (_, quote) = chars.next().ok_or(ParseError::UnterminatedString { offset: start })?;
    let mut out = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, start + i + c.len_utf8())),
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or(ParseError::UnterminatedString { offset: start })?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let digit = chars
                                .next()
                                .and_then(|(_, d)| d.to_digit(16))
                                .ok_or(ParseError::InvalidEscape { offset: start + i })?;
                            code = code * 16 + digit;
                        }
                        out.push(
                            char::from_u32(code)
                                .ok_or(ParseError::InvalidEscape { offset: start + i })?,
                        );
                    }
                    other => out.push(other),
                }
            }
            '\n' => return Err(ParseError::UnterminatedString { offset: start }),
            c => out.push(c),
        }
    }

    Err(ParseError::UnterminatedString { offset: start })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a === b !== c"),
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::EqEqEq),
                Token::Ident("b".into()),
                Token::Punct(Punct::NotEqEq),
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42")[0], Token::Int(42));
        assert_eq!(kinds("4.5")[0], Token::Float(4.5));
        assert_eq!(kinds(".5")[0], Token::Float(0.5));
        assert_eq!(kinds("1e3")[0], Token::Float(1000.0));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#""a\"b""#)[0], Token::Str("a\"b".into()));
        assert_eq!(kinds(r"'it\'s'")[0], Token::Str("it's".into()));
        assert_eq!(kinds(r#""\u0041""#)[0], Token::Str("A".into()));
        assert!(matches!(
            tokenize("'open"),
            Err(ParseError::UnterminatedString { offset: 0 })
        ));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// note\nx /* inline */ + 1"),
            vec![
                Token::Ident("x".into()),
                Token::Punct(Punct::Plus),
                Token::Int(1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_optional_chain_vs_ternary() {
        assert_eq!(kinds("a?.b")[1], Token::Punct(Punct::QuestionDot));
        assert_eq!(kinds("a?.5:1")[1], Token::Punct(Punct::Question));
    }

    #[test]
    fn test_unexpected_char() {
        assert!(matches!(
            tokenize("a # b"),
            Err(ParseError::UnexpectedChar { found: '#', offset: 2 })
        ));
    }
}
