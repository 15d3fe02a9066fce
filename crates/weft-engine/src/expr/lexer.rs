use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Not,
    Minus,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    And,
    Or,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let (token, len) = match c {
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let (n, len) = number(src, i)?;
                (Token::Number(n), len)
            }
            b'0'..=b'9' => {
                let (n, len) = number(src, i)?;
                (Token::Number(n), len)
            }
            b'"' | b'\'' => {
                let (s, len) = string(src, i)?;
                (Token::Str(s), len)
            }
            b'.' => (Token::Dot, 1),
            b',' => (Token::Comma, 1),
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b'[' => (Token::LBracket, 1),
            b']' => (Token::RBracket, 1),
            b'-' => (Token::Minus, 1),
            b'<' if bytes.get(i + 1) == Some(&b'=') => (Token::Le, 2),
            b'<' => (Token::Lt, 1),
            b'>' if bytes.get(i + 1) == Some(&b'=') => (Token::Ge, 2),
            b'>' => (Token::Gt, 1),
            b'=' if src[i..].starts_with("===") => (Token::StrictEq, 3),
            b'=' if src[i..].starts_with("==") => (Token::EqEq, 2),
            b'!' if src[i..].starts_with("!==") => (Token::StrictNotEq, 3),
            b'!' if src[i..].starts_with("!=") => (Token::NotEq, 2),
            b'!' => (Token::Not, 1),
            b'&' if src[i..].starts_with("&&") => (Token::And, 2),
            b'|' if src[i..].starts_with("||") => (Token::Or, 2),
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => {
                let len = src[i..]
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$')
                    .count();
                let word = &src[i..i + len];
                let token = match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    _ => Token::Ident(word.to_string()),
                };
                (token, len)
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(ExprError::syntax(start, format!("unexpected character '{}'", ch)));
            }
        };

        tokens.push(Spanned { token, pos: start });
        i += len;
    }

    Ok(tokens)
}

fn number(src: &str, start: usize) -> Result<(f64, usize), ExprError> {
    let len = src[start..]
        .bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b'.')
        .count();
    let text = &src[start..start + len];
    text.parse::<f64>()
        .map(|n| (n, len))
        .map_err(|_| ExprError::syntax(start, format!("invalid number '{}'", text)))
}

fn string(src: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut chars = src[start..].char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(ExprError::syntax(start, "unterminated string")),
    };

    let mut out = String::new();
    while let Some((offset, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, offset + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(ExprError::syntax(start, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a === b !== c == d != e <= f >= g"),
            vec![
                Token::Ident("a".into()),
                Token::StrictEq,
                Token::Ident("b".into()),
                Token::StrictNotEq,
                Token::Ident("c".into()),
                Token::EqEq,
                Token::Ident("d".into()),
                Token::NotEq,
                Token::Ident("e".into()),
                Token::Le,
                Token::Ident("f".into()),
                Token::Ge,
                Token::Ident("g".into()),
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![Token::Str("it's".into()), Token::Str("a\"b".into())]
        );
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn test_numbers_and_member_access() {
        assert_eq!(
            kinds("result.length > 0.5"),
            vec![
                Token::Ident("result".into()),
                Token::Dot,
                Token::Ident("length".into()),
                Token::Gt,
                Token::Number(0.5),
            ]
        );
    }

    #[test]
    fn test_rejects_assignment_and_unknown_chars() {
        assert!(tokenize("a = 1").is_err());
        assert!(tokenize("a; b").is_err());
        assert!(tokenize("a & b").is_err());
    }
}
