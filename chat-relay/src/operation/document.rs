//! Operation document reader
//!
//! Parses operations and fragment definitions into selection trees with
//! aliases, arguments and directives. Variable definitions are skipped;
//! variable values come from the request and are substituted on use.

use std::fmt;

use serde_json::{Map, Number, Value};

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `query` or a shorthand `{ … }` document
    Query,
    /// `mutation`
    Mutation,
    /// `subscription`
    Subscription,
}

impl OperationKind {
    /// Name of the root type fields are resolved against
    pub fn root_type(&self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
            Self::Subscription => "Subscription",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// Argument value as written in the document
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// `$name`
    Variable(String),
    /// Scalar, enum or null literal
    Literal(Value),
    /// `[ … ]`
    List(Vec<InputValue>),
    /// `{ name: value … }`
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// Substitute variables; an undefined variable resolves to `null`.
    pub fn resolve(&self, variables: Option<&Map<String, Value>>) -> Value {
        match self {
            Self::Variable(name) => variables
                .and_then(|vars| vars.get(name))
                .cloned()
                .unwrap_or(Value::Null),
            Self::Literal(value) => value.clone(),
            Self::List(items) => Value::Array(items.iter().map(|item| item.resolve(variables)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.resolve(variables)))
                    .collect(),
            ),
        }
    }
}

/// A directive applied to a field or fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Directive name without the `@`
    pub name: String,
    /// Arguments in document order
    pub arguments: Vec<(String, InputValue)>,
}

impl Directive {
    /// Look up an argument by name
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// Whether `@skip` / `@include` leave a selection in place
///
/// Other directives are ignored. A condition that does not resolve to a
/// boolean counts as `false`.
pub fn is_included(directives: &[Directive], variables: Option<&Map<String, Value>>) -> bool {
    let condition = |directive: &Directive| {
        directive
            .argument("if")
            .map(|value| value.resolve(variables))
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    };

    directives.iter().all(|directive| match directive.name.as_str() {
        "skip" => !condition(directive),
        "include" => condition(directive),
        _ => true,
    })
}

/// A field selection
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// `alias:` prefix, if any
    pub alias: Option<String>,
    /// Field name
    pub name: String,
    /// Arguments in document order
    pub arguments: Vec<(String, InputValue)>,
    /// Directives in document order
    pub directives: Vec<Directive>,
    /// Sub-selections; empty for leaf fields
    pub selection_set: Vec<Selection>,
}

impl Field {
    /// Key the result is reported under
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Look up an argument by name
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// One entry of a selection set
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `name`, `alias: name(args) { … }`
    Field(Field),
    /// `...Name`
    FragmentSpread {
        /// Fragment name
        name: String,
        /// Directives on the spread
        directives: Vec<Directive>,
    },
    /// `... on Type { … }` or `... { … }`
    InlineFragment {
        /// Type the fragment applies to; `None` applies everywhere
        type_condition: Option<String>,
        /// Directives on the fragment
        directives: Vec<Directive>,
        /// Selections inside the fragment
        selection_set: Vec<Selection>,
    },
}

/// A named fragment definition
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    /// Fragment name
    pub name: String,
    /// Type named after `on`
    pub type_condition: String,
    /// Selections inside the fragment
    pub selection_set: Vec<Selection>,
}

/// One operation of a document
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    /// Operation type
    pub kind: OperationKind,
    /// Operation name
    pub name: Option<String>,
    /// Root selection set
    pub selection_set: Vec<Selection>,
}

impl OperationDefinition {
    /// The single root field this operation runs
    ///
    /// Operations select exactly one root field, written out as a field.
    pub fn root_field(&self) -> Result<&Field, DocumentError> {
        match self.selection_set.as_slice() {
            [Selection::Field(field)] => Ok(field),
            [_] => Err(DocumentError::RootFragment),
            _ => Err(DocumentError::MultipleRootFields),
        }
    }
}

/// Errors reading a document or picking an operation from it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// Malformed document
    #[error("Syntax Error: {message} (at offset {offset})")]
    Syntax {
        /// What was wrong
        message: String,
        /// Byte offset into the document
        offset: usize,
    },

    /// Document without any operation
    #[error("no operation provided")]
    NoOperation,

    /// Several operations and no `operationName`
    #[error("operation name is required when the document contains more than one operation")]
    NameRequired,

    /// `operationName` matched nothing
    #[error("operation {0} not found")]
    UnknownOperation(String),

    /// Root selection is a fragment rather than a field
    #[error("fragments are not supported at the root of an operation")]
    RootFragment,

    /// More than one root selection
    #[error("an operation must select exactly one root field")]
    MultipleRootFields,
}

/// Parsed operation document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    operations: Vec<OperationDefinition>,
    fragments: Vec<FragmentDefinition>,
}

impl Document {
    /// Parse an operation document
    pub fn parse(source: &str) -> Result<Self, DocumentError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };

        let (operations, fragments) = parser.document()?;
        if operations.is_empty() {
            return Err(DocumentError::NoOperation);
        }

        Ok(Self {
            operations,
            fragments,
        })
    }

    /// Operations in document order
    pub fn operations(&self) -> &[OperationDefinition] {
        &self.operations
    }

    /// Look up a fragment definition by name
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|fragment| fragment.name == name)
    }

    /// Pick the operation to run
    ///
    /// Without a name the document must hold exactly one operation.
    pub fn select(&self, name: Option<&str>) -> Result<&OperationDefinition, DocumentError> {
        match name.filter(|name| !name.is_empty()) {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| DocumentError::UnknownOperation(name.to_string())),
            None => match self.operations.as_slice() {
                [operation] => Ok(operation),
                [] => Err(DocumentError::NoOperation),
                _ => Err(DocumentError::NameRequired),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Punct(char),
    Spread,
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "Name \"{}\"", name),
            Self::Punct(c) => write!(f, "\"{}\"", c),
            Self::Spread => write!(f, "\"...\""),
            Self::Str(_) => write!(f, "String"),
            Self::Int(i) => write!(f, "Int \"{}\"", i),
            Self::Float(x) => write!(f, "Float \"{}\"", x),
        }
    }
}

fn syntax(message: impl Into<String>, offset: usize) -> DocumentError {
    DocumentError::Syntax {
        message: message.into(),
        offset,
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, DocumentError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' | b',' => i += 1,
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
            }
            b'{' | b'}' | b'(' | b')' | b'[' | b']' | b':' | b'$' | b'!' | b'=' | b'@' | b'|' | b'&' => {
                tokens.push((Token::Punct(c as char), i));
                i += 1;
            }
            b'.' => {
                if source[i..].starts_with("...") {
                    tokens.push((Token::Spread, i));
                    i += 3;
                } else {
                    return Err(syntax("Unexpected \".\"", i));
                }
            }
            b'"' => {
                let (value, next) = if source[i..].starts_with("\"\"\"") {
                    lex_block_string(source, i)?
                } else {
                    lex_string(source, i)?
                };
                tokens.push((Token::Str(value), i));
                i = next;
            }
            b'-' | b'0'..=b'9' => {
                let (token, next) = lex_number(source, i)?;
                tokens.push((token, i));
                i = next;
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let start = i;
                while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
                    i += 1;
                }
                tokens.push((Token::Name(source[start..i].to_string()), start));
            }
            _ => {
                if source[i..].starts_with('\u{feff}') {
                    i += '\u{feff}'.len_utf8();
                    continue;
                }
                let ch = source[i..].chars().next().unwrap_or('?');
                return Err(syntax(format!("Unexpected character {:?}", ch), i));
            }
        }
    }

    Ok(tokens)
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), DocumentError> {
    let unterminated = || syntax("Unterminated string", start);
    let body = start + 1;
    let mut out = String::new();
    let mut chars = source[body..].char_indices();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '"' => return Ok((out, body + offset + 1)),
            '\n' | '\r' => return Err(unterminated()),
            '\\' => {
                let (_, escape) = chars.next().ok_or_else(unterminated)?;
                match escape {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'u' => {
                        let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                        let decoded = (hex.len() == 4)
                            .then(|| u32::from_str_radix(&hex, 16).ok())
                            .flatten()
                            .and_then(char::from_u32)
                            .ok_or_else(|| syntax(format!("Invalid Unicode escape \\u{}", hex), body + offset))?;
                        out.push(decoded);
                    }
                    other => {
                        return Err(syntax(format!("Invalid escape sequence \\{}", other), body + offset));
                    }
                }
            }
            other => out.push(other),
        }
    }

    Err(unterminated())
}

fn lex_block_string(source: &str, start: usize) -> Result<(String, usize), DocumentError> {
    let body = start + 3;
    let mut search = body;

    loop {
        let found = source[search..]
            .find("\"\"\"")
            .ok_or_else(|| syntax("Unterminated string", start))?;
        let close = search + found;

        if source[..close].ends_with('\\') {
            search = close + 3;
            continue;
        }

        let raw = source[body..close].replace("\\\"\"\"", "\"\"\"");
        return Ok((dedent_block(&raw), close + 3));
    }
}

/// Strip common indentation and blank leading/trailing lines
fn dedent_block(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();

    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| if i == 0 { *line } else { line.get(indent..).unwrap_or("") })
        .collect();

    while out.first().is_some_and(|line| line.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }

    out.join("\n")
}

fn lex_number(source: &str, start: usize) -> Result<(Token, usize), DocumentError> {
    let bytes = source.as_bytes();
    let mut i = start;
    let mut float = false;

    let digits = |i: &mut usize| {
        let from = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i > from
    };

    if bytes[i] == b'-' {
        i += 1;
    }
    if !digits(&mut i) {
        return Err(syntax("Invalid number, expected digit", i));
    }
    if i < bytes.len() && bytes[i] == b'.' {
        float = true;
        i += 1;
        if !digits(&mut i) {
            return Err(syntax("Invalid number, expected digit", i));
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        float = true;
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if !digits(&mut i) {
            return Err(syntax("Invalid number, expected digit", i));
        }
    }

    let text = &source[start..i];
    let token = if float {
        Token::Float(text.parse().map_err(|_| syntax("Invalid number", start))?)
    } else {
        Token::Int(text.parse().map_err(|_| syntax("Invalid number", start))?)
    };

    Ok((token, i))
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> DocumentError {
        let found = match self.peek() {
            Some(token) => token.to_string(),
            None => "<EOF>".to_string(),
        };
        syntax(format!("Expected {}, found {}", expected, found), self.offset())
    }

    fn expect_punct(&mut self, c: char) -> Result<(), DocumentError> {
        if self.peek_punct(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("\"{}\"", c)))
        }
    }

    fn expect_name(&mut self) -> Result<String, DocumentError> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("Name")),
        }
    }

    fn document(&mut self) -> Result<(Vec<OperationDefinition>, Vec<FragmentDefinition>), DocumentError> {
        let mut operations = Vec::new();
        let mut fragments = Vec::new();

        while let Some(token) = self.peek() {
            match token {
                Token::Punct('{') => {
                    let selection_set = self.selection_set()?;
                    operations.push(OperationDefinition {
                        kind: OperationKind::Query,
                        name: None,
                        selection_set,
                    });
                }
                Token::Name(keyword) if keyword == "fragment" => fragments.push(self.fragment()?),
                Token::Name(keyword) if OperationKind::from_keyword(keyword).is_some() => {
                    operations.push(self.operation()?);
                }
                _ => return Err(self.unexpected("an operation or fragment definition")),
            }
        }

        Ok((operations, fragments))
    }

    fn operation(&mut self) -> Result<OperationDefinition, DocumentError> {
        let offset = self.offset();
        let keyword = self.expect_name()?;
        let kind = OperationKind::from_keyword(&keyword)
            .ok_or_else(|| syntax(format!("Unexpected Name \"{}\"", keyword), offset))?;

        let name = match self.peek() {
            Some(Token::Name(_)) => Some(self.expect_name()?),
            _ => None,
        };

        // Variable definitions are not checked; values come from the request
        if self.peek_punct('(') {
            self.skip_balanced('(', ')')?;
        }
        self.directives()?;

        let selection_set = self.selection_set()?;
        Ok(OperationDefinition {
            kind,
            name,
            selection_set,
        })
    }

    fn fragment(&mut self) -> Result<FragmentDefinition, DocumentError> {
        self.expect_name()?;
        let name = self.expect_name()?;
        self.expect_on()?;
        let type_condition = self.expect_name()?;
        self.directives()?;
        let selection_set = self.selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            selection_set,
        })
    }

    fn expect_on(&mut self) -> Result<(), DocumentError> {
        let offset = self.offset();
        if self.expect_name()? != "on" {
            return Err(syntax("Expected \"on\"", offset));
        }
        Ok(())
    }

    fn peek_on(&self) -> bool {
        matches!(self.peek(), Some(Token::Name(name)) if name == "on")
    }

    fn directives(&mut self) -> Result<Vec<Directive>, DocumentError> {
        let mut directives = Vec::new();
        while self.peek_punct('@') {
            self.pos += 1;
            let name = self.expect_name()?;
            let arguments = if self.peek_punct('(') {
                self.arguments()?
            } else {
                Vec::new()
            };
            directives.push(Directive { name, arguments });
        }
        Ok(directives)
    }

    fn skip_balanced(&mut self, open: char, close: char) -> Result<(), DocumentError> {
        self.expect_punct(open)?;
        let mut depth = 1usize;

        loop {
            match self.advance() {
                None => return Err(syntax(format!("Expected \"{}\", found <EOF>", close), self.end)),
                Some(Token::Punct(c)) if c == open => depth += 1,
                Some(Token::Punct(c)) if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn selection_set(&mut self) -> Result<Vec<Selection>, DocumentError> {
        self.expect_punct('{')?;

        let mut selections = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Punct('}')) if !selections.is_empty() => {
                    self.pos += 1;
                    return Ok(selections);
                }
                Some(Token::Spread) => selections.push(self.fragment_selection()?),
                Some(Token::Name(_)) => selections.push(Selection::Field(self.field()?)),
                _ => return Err(self.unexpected("Name")),
            }
        }
    }

    fn fragment_selection(&mut self) -> Result<Selection, DocumentError> {
        self.pos += 1;

        if matches!(self.peek(), Some(Token::Name(_))) && !self.peek_on() {
            let name = self.expect_name()?;
            let directives = self.directives()?;
            return Ok(Selection::FragmentSpread { name, directives });
        }

        let type_condition = if self.peek_on() {
            self.pos += 1;
            Some(self.expect_name()?)
        } else {
            None
        };
        let directives = self.directives()?;
        let selection_set = self.selection_set()?;

        Ok(Selection::InlineFragment {
            type_condition,
            directives,
            selection_set,
        })
    }

    fn field(&mut self) -> Result<Field, DocumentError> {
        let first = self.expect_name()?;

        let (alias, name) = if self.peek_punct(':') {
            self.pos += 1;
            (Some(first), self.expect_name()?)
        } else {
            (None, first)
        };

        let arguments = if self.peek_punct('(') {
            self.arguments()?
        } else {
            Vec::new()
        };

        let directives = self.directives()?;

        let selection_set = if self.peek_punct('{') {
            self.selection_set()?
        } else {
            Vec::new()
        };

        Ok(Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
        })
    }

    fn arguments(&mut self) -> Result<Vec<(String, InputValue)>, DocumentError> {
        self.expect_punct('(')?;

        let mut arguments = Vec::new();
        while !self.peek_punct(')') {
            let name = self.expect_name()?;
            self.expect_punct(':')?;
            arguments.push((name, self.value()?));
        }
        self.expect_punct(')')?;

        Ok(arguments)
    }

    fn value(&mut self) -> Result<InputValue, DocumentError> {
        let offset = self.offset();

        let value = match self.advance() {
            Some(Token::Punct('$')) => InputValue::Variable(self.expect_name()?),
            Some(Token::Str(s)) => InputValue::Literal(Value::String(s)),
            Some(Token::Int(i)) => InputValue::Literal(Value::from(i)),
            Some(Token::Float(x)) => {
                InputValue::Literal(Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null))
            }
            Some(Token::Name(name)) => InputValue::Literal(match name.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => Value::String(name),
            }),
            Some(Token::Punct('[')) => {
                let mut items = Vec::new();
                while !self.peek_punct(']') {
                    items.push(self.value()?);
                }
                self.expect_punct(']')?;
                InputValue::List(items)
            }
            Some(Token::Punct('{')) => {
                let mut fields = Vec::new();
                while !self.peek_punct('}') {
                    let name = self.expect_name()?;
                    self.expect_punct(':')?;
                    fields.push((name, self.value()?));
                }
                self.expect_punct('}')?;
                InputValue::Object(fields)
            }
            Some(token) => return Err(syntax(format!("Unexpected {}", token), offset)),
            None => return Err(syntax("Unexpected <EOF>", offset)),
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(source: &str) -> OperationDefinition {
        Document::parse(source).unwrap().select(None).unwrap().clone()
    }

    #[test]
    fn test_shorthand_query() {
        let op = single("{ messages { id content user { id nickname } createdAt } }");
        assert_eq!(op.kind, OperationKind::Query);
        assert!(op.name.is_none());
        assert_eq!(op.root_field().unwrap().name, "messages");
        assert_eq!(op.root_field().unwrap().response_key(), "messages");
    }

    #[test]
    fn test_named_subscription() {
        let op = single("subscription OnMessageAdded { messageAdded { id content } }");
        assert_eq!(op.kind, OperationKind::Subscription);
        assert_eq!(op.name.as_deref(), Some("OnMessageAdded"));
        assert_eq!(op.root_field().unwrap().name, "messageAdded");
    }

    #[test]
    fn test_variables_skipped_and_directives_kept() {
        let op = single(
            r#"mutation SendMessage($content: String! = "x") @trace {
                sendMessage(content: $content) @skip(if: false) { id }
            }"#,
        );

        assert_eq!(op.kind, OperationKind::Mutation);
        let root = op.root_field().unwrap();
        assert_eq!(root.name, "sendMessage");
        assert_eq!(
            root.argument("content"),
            Some(&InputValue::Variable("content".to_string()))
        );
        assert_eq!(root.directives.len(), 1);
        assert_eq!(root.directives[0].name, "skip");
        assert_eq!(
            root.directives[0].argument("if"),
            Some(&InputValue::Literal(json!(false)))
        );
    }

    #[test]
    fn test_alias_and_literal_arguments() {
        let op = single(r#"mutation { me: login(nickname: "al\"iceé") { id } }"#);
        assert_eq!(op.root_field().unwrap().alias.as_deref(), Some("me"));
        assert_eq!(op.root_field().unwrap().response_key(), "me");
        assert_eq!(op.root_field().unwrap().argument("nickname"), Some(&InputValue::Literal(json!("al\"iceé"))));
    }

    #[test]
    fn test_compound_literals_resolve() {
        let op = single(r#"query { search(filter: {ids: [1, 2.5, $extra], on: true, kind: RECENT, none: null}) }"#);
        let mut vars = Map::new();
        vars.insert("extra".to_string(), json!("x"));

        let resolved = op.root_field().unwrap().argument("filter").unwrap().resolve(Some(&vars));
        assert_eq!(
            resolved,
            json!({"ids": [1, 2.5, "x"], "on": true, "kind": "RECENT", "none": null})
        );
    }

    #[test]
    fn test_undefined_variable_resolves_to_null() {
        let value = InputValue::Variable("missing".into());
        assert_eq!(value.resolve(None), Value::Null);
    }

    #[test]
    fn test_block_string_is_dedented() {
        let op = single("mutation { sendMessage(content: \"\"\"\n    hello\n      world\n\"\"\") { id } }");
        assert_eq!(
            op.root_field().unwrap().argument("content"),
            Some(&InputValue::Literal(json!("hello\n  world")))
        );
    }

    #[test]
    fn test_comments_and_fragments() {
        let source = r#"
            # fetch history
            fragment Fields on Message { id content }
            query History { messages { ...Fields } }
        "#;
        let doc = Document::parse(source).unwrap();
        assert_eq!(doc.operations().len(), 1);

        let root = doc.select(None).unwrap().root_field().unwrap();
        assert_eq!(root.name, "messages");
        assert_eq!(
            root.selection_set,
            vec![Selection::FragmentSpread {
                name: "Fields".to_string(),
                directives: Vec::new(),
            }]
        );

        let fragment = doc.fragment("Fields").unwrap();
        assert_eq!(fragment.type_condition, "Message");
        assert_eq!(fragment.selection_set.len(), 2);
        assert!(doc.fragment("Other").is_none());
    }

    #[test]
    fn test_nested_selections_are_kept() {
        let op = single("{ messages { id author: user { nickname __typename } ... on Message @include(if: $x) { content } } }");
        let root = op.root_field().unwrap();

        let names: Vec<&str> = root
            .selection_set
            .iter()
            .filter_map(|selection| match selection {
                Selection::Field(field) => Some(field.response_key()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["id", "author"]);

        match &root.selection_set[1] {
            Selection::Field(field) => {
                assert_eq!(field.name, "user");
                assert_eq!(field.selection_set.len(), 2);
            }
            other => panic!("expected a field, got {:?}", other),
        }

        match &root.selection_set[2] {
            Selection::InlineFragment {
                type_condition,
                directives,
                selection_set,
            } => {
                assert_eq!(type_condition.as_deref(), Some("Message"));
                assert_eq!(directives[0].name, "include");
                assert_eq!(selection_set.len(), 1);
            }
            other => panic!("expected an inline fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_and_include_conditions() {
        let op = single("{ a @skip(if: true) b @include(if: $show) c @skip(if: false) @include(if: true) d @deprecated }");
        let mut vars = Map::new();
        vars.insert("show".to_string(), json!(true));

        let included: Vec<bool> = op
            .selection_set
            .iter()
            .map(|selection| match selection {
                Selection::Field(field) => is_included(&field.directives, Some(&vars)),
                other => panic!("expected a field, got {:?}", other),
            })
            .collect();
        assert_eq!(included, vec![false, true, true, true]);

        match &op.selection_set[1] {
            Selection::Field(field) => assert!(!is_included(&field.directives, None)),
            other => panic!("expected a field, got {:?}", other),
        }
    }

    #[test]
    fn test_select_by_name() {
        let doc = Document::parse(
            "query A { messages { id } } subscription B { messageAdded { id } }",
        )
        .unwrap();

        assert_eq!(doc.select(Some("B")).unwrap().kind, OperationKind::Subscription);
        assert_eq!(doc.select(None), Err(DocumentError::NameRequired));
        assert_eq!(
            doc.select(Some("C")),
            Err(DocumentError::UnknownOperation("C".to_string()))
        );
    }

    #[test]
    fn test_empty_operation_name_means_none() {
        let doc = Document::parse("{ messages { id } }").unwrap();
        assert!(doc.select(Some("")).is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "query { messages { id }",
            "query { }",
            "mutation { login(nickname: ) { id } }",
            "mutation { login(nickname: \"open) { id } }",
            "type Query { a: Int }",
            "query { a } .",
            "query { a(n: -) }",
        ] {
            assert!(
                matches!(Document::parse(source), Err(DocumentError::Syntax { .. })),
                "expected syntax error for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_no_operation() {
        assert_eq!(Document::parse("   "), Err(DocumentError::NoOperation));
        assert_eq!(
            Document::parse("fragment F on Message { id }"),
            Err(DocumentError::NoOperation)
        );
    }

    #[test]
    fn test_root_fragment_rejected() {
        let op = single("fragment F on Query { messages { id } } query { ...F }");
        assert_eq!(op.root_field(), Err(DocumentError::RootFragment));

        let op = single("query { ... on Query { messages { id } } }");
        assert_eq!(op.root_field(), Err(DocumentError::RootFragment));
    }

    #[test]
    fn test_multiple_root_fields_rejected() {
        let op = single("{ messages { id } other: messages { id } }");
        assert_eq!(op.selection_set.len(), 2);
        assert_eq!(op.root_field(), Err(DocumentError::MultipleRootFields));
    }
}
