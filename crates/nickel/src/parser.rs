use thiserror::Error;

use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: &'static str,
}

pub struct Parser<'a> {
    input: &'a str,
    position: usize,
    line: u32,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
        }
    }

    fn current(&self) -> char {
        self.input[self.position..].chars().next().unwrap_or('\0')
    }

    // One character of lookahead, for telling `-123` apart from the name `-`.
    fn second(&self) -> char {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn advance(&mut self) {
        let c = self.current();
        if c == '\n' {
            self.line += 1;
        }
        self.position += c.len_utf8();
    }

    fn error(&self, message: &'static str) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message,
        }
    }
}

pub fn skip_whitespace_and_comments(p: &mut Parser<'_>) {
    loop {
        match p.current() {
            c if c.is_ascii_whitespace() => p.advance(),
            ';' => {
                while p.current() != '\n' && p.current() != '\0' {
                    p.advance();
                }
            }
            _ => break,
        }
    }
}

fn parse_int(p: &mut Parser<'_>) -> Result<Node, SyntaxError> {
    let start = p.position;
    if p.current() == '-' {
        p.advance();
    }
    while p.current().is_ascii_digit() {
        p.advance();
    }

    let digits = &p.input[start..p.position];
    let value = digits.parse().map_err(|_| p.error("bad integer"))?;
    Ok(Node::Int(value))
}

fn parse_string(p: &mut Parser<'_>) -> Result<Node, SyntaxError> {
    p.advance(); // skip past opening quote

    let mut string = String::new();
    loop {
        match p.current() {
            '\0' => return Err(p.error("missing '\"' to close string literal")),
            '"' => {
                p.advance();
                break;
            }
            '\\' => {
                p.advance();
                let escape = p.current();
                match escape {
                    'n' => string.push('\n'),
                    'r' => string.push('\r'),
                    't' => string.push('\t'),
                    '0' => string.push('\0'),
                    '"' => string.push('"'),
                    '\\' => string.push('\\'),
                    '\0' => return Err(p.error("missing '\"' to close string literal")),
                    // Anything else is kept verbatim, backslash included.
                    other => {
                        string.push('\\');
                        string.push(other);
                    }
                }
                p.advance();
            }
            other => {
                string.push(other);
                p.advance();
            }
        }
    }

    Ok(Node::String(string))
}

fn parse_name(p: &mut Parser<'_>) -> Node {
    let start = p.position;
    loop {
        match p.current() {
            '\0' | ']' => break,
            c if c.is_ascii_whitespace() => break,
            _ => p.advance(),
        }
    }

    Node::Name(p.input[start..p.position].into())
}

fn parse_list(p: &mut Parser<'_>) -> Result<Node, SyntaxError> {
    p.advance(); // skip past opening bracket

    let mut nodes = Vec::new();
    loop {
        skip_whitespace_and_comments(p);
        match p.current() {
            '\0' => return Err(p.error("missing ']' to close '['")),
            ']' => {
                p.advance();
                break;
            }
            _ => match parse_node(p)? {
                Some(node) => nodes.push(node),
                None => return Err(p.error("missing ']' to close '['")),
            },
        }
    }

    Ok(Node::List(nodes))
}

/// Parses the next node, or returns `None` once the input is exhausted.
pub fn parse_node(p: &mut Parser<'_>) -> Result<Option<Node>, SyntaxError> {
    skip_whitespace_and_comments(p);

    match p.current() {
        '\0' => Ok(None),
        c if c.is_ascii_digit() => parse_int(p).map(Some),
        '-' if p.second().is_ascii_digit() => parse_int(p).map(Some),
        '[' => parse_list(p).map(Some),
        '"' => parse_string(p).map(Some),
        ']' => Err(p.error("unexpected ']'")),
        // NOTE: Because of the `match` order, names cannot start with a digit,
        // a bracket, or a quote.
        _ => Ok(Some(parse_name(p))),
    }
}

pub fn parse_program(p: &mut Parser<'_>) -> Result<Node, SyntaxError> {
    let mut nodes = Vec::new();
    while let Some(node) = parse_node(p)? {
        nodes.push(node);
    }

    Ok(Node::Program(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn parse_one(source: &str) -> Node {
        let mut p = Parser::new(source);
        parse_node(&mut p)
            .expect("parse error")
            .expect("no node produced")
    }

    #[track_caller]
    fn parse_error(source: &str) -> SyntaxError {
        let mut p = Parser::new(source);
        loop {
            match parse_node(&mut p) {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a syntax error"),
                Err(error) => return error,
            }
        }
    }

    #[test]
    fn ints() {
        assert_eq!(parse_one("123"), Node::Int(123));
        assert_eq!(parse_one("-42"), Node::Int(-42));
        assert_eq!(parse_one("0"), Node::Int(0));
    }

    #[test]
    fn int_overflow_is_bad() {
        let error = parse_error("123456789123456789123456789");
        assert_eq!(error.message, "bad integer");
        assert_eq!(error.line, 1);
    }

    #[test]
    fn int_stops_at_first_non_digit() {
        let mut p = Parser::new("12abc");
        assert_eq!(parse_node(&mut p).unwrap(), Some(Node::Int(12)));
        assert_eq!(parse_node(&mut p).unwrap(), Some(Node::Name("abc".into())));
    }

    #[test]
    fn names() {
        assert_eq!(parse_one("-"), Node::Name("-".into()));
        assert_eq!(parse_one("+"), Node::Name("+".into()));
        assert_eq!(parse_one("foo-bar!"), Node::Name("foo-bar!".into()));
        assert_eq!(parse_one(":1"), Node::Name(":1".into()));
    }

    #[test]
    fn name_ends_at_bracket() {
        let mut p = Parser::new("[len foo]");
        assert_eq!(
            parse_node(&mut p).unwrap(),
            Some(Node::List(vec![
                Node::Name("len".into()),
                Node::Name("foo".into()),
            ]))
        );
    }

    #[test]
    fn strings() {
        assert_eq!(parse_one(r#""hello""#), Node::String("hello".into()));
        assert_eq!(
            parse_one(r#""a\nb\tc\r\0""#),
            Node::String("a\nb\tc\r\0".into())
        );
        assert_eq!(
            parse_one(r#""say \"hi\"""#),
            Node::String(r#"say "hi""#.into())
        );
        assert_eq!(parse_one(r#""back\\slash""#), Node::String("back\\slash".into()));
    }

    #[test]
    fn unknown_escape_is_preserved() {
        assert_eq!(parse_one(r#""a\qb""#), Node::String("a\\qb".into()));
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(
            parse_error("\"oops"),
            SyntaxError {
                line: 1,
                message: "missing '\"' to close string literal",
            }
        );
        // A quote escaped at the very end does not close the literal.
        assert_eq!(parse_error("\"oops\\\"").message, "missing '\"' to close string literal");
    }

    #[test]
    fn lists() {
        assert_eq!(parse_one("[]"), Node::List(Vec::new()));
        assert_eq!(
            parse_one("[+ 1 [\n* 2 3 ; nested\n]]"),
            Node::List(vec![
                Node::Name("+".into()),
                Node::Int(1),
                Node::List(vec![Node::Name("*".into()), Node::Int(2), Node::Int(3)]),
            ])
        );
    }

    #[test]
    fn unterminated_list() {
        assert_eq!(
            parse_error("[print\n[+ 1 2]"),
            SyntaxError {
                line: 2,
                message: "missing ']' to close '['",
            }
        );
    }

    #[test]
    fn stray_closing_bracket() {
        assert_eq!(
            parse_error("; leading comment\n]"),
            SyntaxError {
                line: 2,
                message: "unexpected ']'",
            }
        );
    }

    #[test]
    fn comments_and_lines() {
        let mut p = Parser::new("; one\n; two\n42 ; trailing");
        assert_eq!(parse_node(&mut p).unwrap(), Some(Node::Int(42)));
        assert_eq!(parse_node(&mut p).unwrap(), None);
    }

    #[test]
    fn line_counting_spans_strings() {
        // The newline inside the string literal counts toward the line number.
        let error = parse_error("\"a\nb\" ]");
        assert_eq!(error.line, 2);
    }

    #[test]
    fn toplevel() {
        let mut p = Parser::new("1 two \"three\"");
        assert_eq!(
            parse_program(&mut p).unwrap(),
            Node::Program(vec![
                Node::Int(1),
                Node::Name("two".into()),
                Node::String("three".into()),
            ])
        );
    }

    #[test]
    fn int_print_round_trip() {
        for source in ["0", "7", "-13", "9223372036854775807"] {
            let node = parse_one(source);
            assert_eq!(node.to_string(), source);
            assert_eq!(parse_one(&node.to_string()), node);
        }
    }
}
