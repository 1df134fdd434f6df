use crate::ast::{Group, Term};
use crate::error::{Position, SyntaxError};
use crate::normalize::ORIGIN_MARKER;
use crate::value::{is_bare_char, Operator, Value};

/// Parser state: tracks position in the input string.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

/// Where a group is being parsed. The document level only admits
/// assignments and blocks; block bodies also admit queries and bare values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Document,
    Block,
}

/// A key or value token as written.
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn into_value(self) -> Value {
        if self.quoted {
            Value::Quoted(self.text)
        } else {
            Value::classify(&self.text)
        }
    }

    /// The token as a key: quoted keys keep their quotes.
    fn into_key(self) -> String {
        if self.quoted {
            format!("\"{}\"", self.text)
        } else {
            self.text
        }
    }
}

/// Parse normalized text into its top-level groups.
///
/// The whole input must be consumed, and a document holds at least one
/// assignment or block.
pub fn parse(input: &str) -> Result<Vec<Group>, SyntaxError> {
    let mut parser = Parser { input, pos: 0 };
    let mut groups = Vec::new();

    parser.skip_ws();
    while parser.pos < parser.input.len() {
        let group = parser.parse_group(Level::Document)?;
        groups.push(group);
        parser.skip_ws();
    }

    if groups.is_empty() {
        return Err(parser.error_point("assignment or block"));
    }
    Ok(groups)
}

impl<'a> Parser<'a> {
    // ── Helpers ──────────────────────────────────────────────────────

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) {
            self.advance(ch.len_utf8());
            true
        } else {
            false
        }
    }

    /// Current position in the source.
    fn position(&self) -> Position {
        let consumed = &self.input[..self.pos];
        let line = consumed.matches('\n').count();
        let last_newline = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = consumed[last_newline..].chars().count();
        Position {
            line,
            column,
            offset: self.pos,
        }
    }

    /// Describe what sits at the current position, for error messages.
    fn found(&self) -> String {
        match self.peek_char() {
            None => "end of input".to_string(),
            Some(ch) if is_bare_char(ch) => {
                let run: String = self.remaining().chars().take_while(|c| is_bare_char(*c)).collect();
                format!("'{}'", run)
            }
            Some(ch) => format!("'{}'", ch),
        }
    }

    /// Create an error at a single point (current position).
    fn error_point(&self, expected: &str) -> SyntaxError {
        let pos = self.position();
        SyntaxError::new(expected, self.found(), pos, pos)
    }

    /// Create an error spanning from `begin` to the current position.
    fn error_span(&self, expected: &str, found: String, begin: Position) -> SyntaxError {
        SyntaxError::new(expected, found, begin, self.position())
    }

    // ── Whitespace ───────────────────────────────────────────────────

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }
    }

    fn skip_inline_ws(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == ' ' || ch == '\t' {
                self.advance(1);
            } else {
                break;
            }
        }
    }

    // ── Groups ───────────────────────────────────────────────────────

    /// block | assignment | query | value, each with an optional origin.
    fn parse_group(&mut self, level: Level) -> Result<Group, SyntaxError> {
        let begin = self.position();
        let token = self.parse_token(level)?;
        self.skip_ws();

        let terms = match self.parse_operator() {
            Some(op) => {
                self.skip_ws();
                if op == Operator::Assign && self.peek_char() == Some('{') {
                    let body = self.parse_block_body()?;
                    vec![Term::Key(token.into_key()), Term::Operator(op), Term::Nested(body)]
                } else if level == Level::Document && op.is_comparison() {
                    return Err(self.error_span(
                        "assignment or block",
                        format!("query operator '{}'", op),
                        begin,
                    ));
                } else {
                    let value = self.parse_value()?;
                    vec![Term::Key(token.into_key()), Term::Operator(op), Term::Value(value)]
                }
            }
            None if level == Level::Document => {
                return Err(self.error_point("'=' after top-level key"));
            }
            None => vec![Term::Value(token.into_value())],
        };

        let origin = self.parse_origin()?;
        Ok(Group {
            terms,
            origin,
            begin,
        })
    }

    /// `{ group* }`. An empty body is the empty block.
    fn parse_block_body(&mut self) -> Result<Vec<Group>, SyntaxError> {
        let begin = self.position();
        if !self.eat_char('{') {
            return Err(self.error_point("'{'"));
        }

        let mut body = Vec::new();
        loop {
            self.skip_ws();
            if self.eat_char('}') {
                return Ok(body);
            }
            if self.pos >= self.input.len() {
                return Err(self.error_span("'}'", "end of input".to_string(), begin));
            }
            let group = self.parse_group(Level::Block)?;
            body.push(group);
        }
    }

    fn parse_operator(&mut self) -> Option<Operator> {
        let (op, len) = if self.starts_with(">=") {
            (Operator::GreaterOrEqual, 2)
        } else if self.starts_with("<=") {
            (Operator::LessOrEqual, 2)
        } else if self.starts_with(">") {
            (Operator::Greater, 1)
        } else if self.starts_with("<") {
            (Operator::Less, 1)
        } else if self.starts_with("=") {
            (Operator::Assign, 1)
        } else {
            return None;
        };
        self.advance(len);
        Some(op)
    }

    /// `#ORIGIN = label`, where the label is a quoted string or a run of
    /// characters other than whitespace, braces and `=`.
    fn parse_origin(&mut self) -> Result<Option<String>, SyntaxError> {
        self.skip_ws();
        if !self.starts_with(ORIGIN_MARKER) {
            return Ok(None);
        }
        let begin = self.position();
        self.advance(ORIGIN_MARKER.len());
        self.skip_inline_ws();

        if self.peek_char() == Some('"') {
            return self.parse_quoted_string().map(Some);
        }

        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || matches!(ch, '{' | '}' | '=') {
                break;
            }
            self.advance(ch.len_utf8());
        }
        if self.pos == start {
            return Err(self.error_span("origin label", self.found(), begin));
        }
        Ok(Some(self.input[start..self.pos].to_string()))
    }

    // ── Tokens ───────────────────────────────────────────────────────

    fn parse_value(&mut self) -> Result<Value, SyntaxError> {
        match self.peek_char() {
            Some('"') => self.parse_quoted_string().map(Value::Quoted),
            Some(ch) if ch == '+' || is_bare_char(ch) => {
                let text = self.parse_unquoted(true)?;
                Ok(Value::classify(&text))
            }
            _ => Err(self.error_point("value")),
        }
    }

    fn parse_token(&mut self, level: Level) -> Result<Token, SyntaxError> {
        match self.peek_char() {
            Some('"') => Ok(Token {
                text: self.parse_quoted_string()?,
                quoted: true,
            }),
            Some(ch) if is_bare_char(ch) || (ch == '+' && level == Level::Block) => Ok(Token {
                text: self.parse_unquoted(level == Level::Block)?,
                quoted: false,
            }),
            _ if level == Level::Document => Err(self.error_point("assignment or block")),
            _ => Err(self.error_point("block, assignment, query or value")),
        }
    }

    /// A run of unquoted-string characters. A leading `+` is only
    /// accepted where a signed number may appear.
    fn parse_unquoted(&mut self, allow_sign: bool) -> Result<String, SyntaxError> {
        let start = self.pos;
        if allow_sign {
            self.eat_char('+');
        }
        let body_start = self.pos;
        while let Some(ch) = self.peek_char() {
            if is_bare_char(ch) {
                self.advance(ch.len_utf8());
            } else {
                break;
            }
        }
        if self.pos == body_start {
            self.pos = start;
            return Err(self.error_point("unquoted string"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// A double-quoted string on a single line. Contents are returned
    /// verbatim: a backslash is kept and pairs with the next character,
    /// so `\"` does not end the string, and `""` is an embedded quote.
    fn parse_quoted_string(&mut self) -> Result<String, SyntaxError> {
        let begin = self.position();
        if !self.eat_char('"') {
            return Err(self.error_point("quoted string"));
        }
        let mut result = String::new();
        loop {
            match self.peek_char() {
                None | Some('\r') | Some('\n') => {
                    return Err(self.error_span("closing '\"'", self.found(), begin));
                }
                Some('"') => {
                    self.advance(1);
                    if !result.is_empty() && self.starts_with("\"") {
                        self.advance(1);
                        result.push_str("\"\"");
                        continue;
                    }
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance(1);
                    result.push('\\');
                    match self.peek_char() {
                        None | Some('\r') | Some('\n') => {
                            return Err(self.error_span("closing '\"'", self.found(), begin));
                        }
                        Some(ch) => {
                            self.advance(ch.len_utf8());
                            result.push(ch);
                        }
                    }
                }
                Some(ch) => {
                    self.advance(ch.len_utf8());
                    result.push(ch);
                }
            }
        }
    }
}
