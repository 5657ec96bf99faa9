//! Search-expression parser and SQL compiler.
//!
//! The grammar follows the flashcard browser's search box:
//!
//! ```text
//! expr    := and_expr ( "or" and_expr )*
//! and_expr:= unary ( ["and"] unary )*          adjacent terms are ANDed
//! unary   := "-" unary | "(" expr ")" | term
//! term    := text | "quoted text" | key:value
//! ```
//!
//! Keys: `deck:`, `tag:`, `note:`, `is:`, `added:`, `nid:`, `cid:`; any other
//! `name:value` is a field search.  In values, `*` matches any run of
//! characters and `_` a single character; `\*` and `\_` are literal.
//!
//! [`parse`] never touches the database.  [`SqlWriter`] turns the resulting
//! [`Node`] into a parameterised `WHERE` clause over `cards c JOIN notes n`.

use std::collections::HashMap;

use rusqlite::types::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// SearchError
// ---------------------------------------------------------------------------

/// Problems found while parsing a search expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("unbalanced parentheses")]
    UnbalancedParens,

    #[error("empty group \"()\"")]
    EmptyGroup,

    #[error("\"{0}\" is missing a search term")]
    DanglingOperator(String),

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("empty search term")]
    EmptyTerm,

    #[error("unknown state \"is:{0}\"")]
    UnknownState(String),

    #[error("\"{key}:{value}\" expects {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

/// Card scheduling states reachable with `is:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    New,
    Learn,
    Review,
    Suspended,
    Buried,
}

/// A single leaf of a search expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTerm {
    /// Unqualified text: substring match over every field.
    Text(String),
    /// `name:value`: whole-field match on the named field.
    Field { name: String, value: String },
    /// `deck:Name`: the deck and all of its children.
    Deck(String),
    /// `tag:name`: the tag and all of its children; `tag:none` is untagged.
    Tag(String),
    /// `note:Name`: note type name.
    Notetype(String),
    /// `is:state`
    State(CardState),
    /// `added:N`: cards created in the last N days.
    AddedDays(u32),
    /// `nid:1,2`
    NoteIds(Vec<i64>),
    /// `cid:1,2`
    CardIds(Vec<i64>),
}

/// Parsed search expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// All children must match.  An empty `And` matches everything.
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Term(SearchTerm),
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Negate,
    And,
    Or,
    Text(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, SearchError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(n) if !n.is_whitespace() && *n != ')' => tokens.push(Token::Negate),
                    _ => tokens.push(Token::Text("-".into())),
                }
            }
            _ => {
                let mut text = String::new();
                let mut quoted = false;
                let mut in_quote = false;
                while let Some(&c) = chars.peek() {
                    if !in_quote && (c.is_whitespace() || c == '(' || c == ')') {
                        break;
                    }
                    chars.next();
                    match c {
                        '"' => {
                            in_quote = !in_quote;
                            quoted = true;
                        }
                        '\\' => {
                            // Keep the escape so wildcard conversion sees it.
                            text.push('\\');
                            if let Some(next) = chars.next() {
                                text.push(next);
                            }
                        }
                        c => text.push(c),
                    }
                }
                if in_quote {
                    return Err(SearchError::UnterminatedQuote);
                }
                let token = if !quoted && text.eq_ignore_ascii_case("and") {
                    Token::And
                } else if !quoted && text.eq_ignore_ascii_case("or") {
                    Token::Or
                } else {
                    Token::Text(text)
                };
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a search expression.  An empty (or all-whitespace) expression
/// yields `Node::And(vec![])`, which matches every card.
pub fn parse(input: &str) -> Result<Node, SearchError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Node::And(Vec::new()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.or_expr()?;
    match parser.peek() {
        None => Ok(node),
        Some(Token::Close) => Err(SearchError::UnbalancedParens),
        Some(other) => Err(SearchError::DanglingOperator(token_label(other))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn or_expr(&mut self) -> Result<Node, SearchError> {
        let mut branches = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.bump();
            branches.push(self.and_expr()?);
        }
        Ok(collapse(branches, Node::Or))
    }

    fn and_expr(&mut self) -> Result<Node, SearchError> {
        let mut parts = vec![self.unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.bump();
                    parts.push(self.unary()?);
                }
                Some(Token::Text(_)) | Some(Token::Open) | Some(Token::Negate) => {
                    parts.push(self.unary()?);
                }
                _ => break,
            }
        }
        Ok(collapse(parts, Node::And))
    }

    fn unary(&mut self) -> Result<Node, SearchError> {
        match self.bump() {
            Some(Token::Negate) => Ok(Node::Not(Box::new(self.unary()?))),
            Some(Token::Open) => {
                if self.peek() == Some(&Token::Close) {
                    return Err(SearchError::EmptyGroup);
                }
                let inner = self.or_expr()?;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(SearchError::UnbalancedParens),
                }
            }
            Some(Token::Text(text)) => Ok(Node::Term(parse_term(&text)?)),
            Some(Token::Close) => Err(SearchError::UnbalancedParens),
            Some(op @ (Token::And | Token::Or)) => {
                Err(SearchError::DanglingOperator(token_label(&op)))
            }
            None => {
                let label = self
                    .pos
                    .checked_sub(1)
                    .and_then(|i| self.tokens.get(i))
                    .map(token_label)
                    .unwrap_or_default();
                Err(SearchError::DanglingOperator(label))
            }
        }
    }
}

fn collapse(mut nodes: Vec<Node>, wrap: fn(Vec<Node>) -> Node) -> Node {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        wrap(nodes)
    }
}

fn token_label(token: &Token) -> String {
    match token {
        Token::Open => "(".into(),
        Token::Close => ")".into(),
        Token::Negate => "-".into(),
        Token::And => "and".into(),
        Token::Or => "or".into(),
        Token::Text(t) => t.clone(),
    }
}

/// Position of the first `:` not preceded by a backslash.
fn find_key_separator(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ':' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

fn parse_term(text: &str) -> Result<SearchTerm, SearchError> {
    let Some(sep) = find_key_separator(text) else {
        if text.is_empty() {
            return Err(SearchError::EmptyTerm);
        }
        return Ok(SearchTerm::Text(text.to_string()));
    };

    let key = &text[..sep];
    let value = &text[sep + 1..];
    if key.is_empty() {
        return Ok(SearchTerm::Text(text.to_string()));
    }

    match key.to_ascii_lowercase().as_str() {
        "deck" => Ok(SearchTerm::Deck(value.to_string())),
        "tag" => Ok(SearchTerm::Tag(value.to_string())),
        "note" => Ok(SearchTerm::Notetype(value.to_string())),
        "is" => parse_state(value).map(SearchTerm::State),
        "added" => match value.parse::<u32>() {
            Ok(days) if days > 0 => Ok(SearchTerm::AddedDays(days)),
            _ => Err(SearchError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                expected: "a positive number of days",
            }),
        },
        "nid" => parse_ids(key, value).map(SearchTerm::NoteIds),
        "cid" => parse_ids(key, value).map(SearchTerm::CardIds),
        _ => Ok(SearchTerm::Field {
            name: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_state(value: &str) -> Result<CardState, SearchError> {
    match value.to_ascii_lowercase().as_str() {
        "new" => Ok(CardState::New),
        "learn" => Ok(CardState::Learn),
        "review" => Ok(CardState::Review),
        "suspended" => Ok(CardState::Suspended),
        "buried" => Ok(CardState::Buried),
        _ => Err(SearchError::UnknownState(value.to_string())),
    }
}

fn parse_ids(key: &str, value: &str) -> Result<Vec<i64>, SearchError> {
    value
        .split(',')
        .map(|id| id.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| SearchError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a comma-separated list of ids",
        })
}

// ---------------------------------------------------------------------------
// Wildcards
// ---------------------------------------------------------------------------

/// Convert a search wildcard pattern to a SQL `LIKE` pattern using `\` as
/// the escape character.
pub fn to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(lit @ ('%' | '_' | '\\')) => {
                    out.push('\\');
                    out.push(lit);
                }
                Some(lit) => out.push(lit),
                None => out.push_str("\\\\"),
            },
            '*' => out.push('%'),
            '%' => out.push_str("\\%"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// SQL compilation
// ---------------------------------------------------------------------------

/// Lower-cased field name → every `(notetype id, field ordinal)` using it.
pub type FieldMap = HashMap<String, Vec<(i64, i64)>>;

/// Separator between deck-name components in the `decks` table.
const DECK_SEPARATOR: char = '\x1f';

const MS_PER_DAY: i64 = 86_400_000;

/// Compiles a [`Node`] into a parameterised SQL condition.
///
/// The condition refers to `c` (cards) and `n` (notes) and uses the
/// `field_at(flds, ord)` scalar function registered by the collection.
pub struct SqlWriter<'a> {
    fields: &'a FieldMap,
    now_ms: i64,
    sql: String,
    params: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    pub fn new(fields: &'a FieldMap, now_ms: i64) -> Self {
        Self {
            fields,
            now_ms,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Consume the writer and return `(where_clause, params)`.
    pub fn write(mut self, node: &Node) -> (String, Vec<Value>) {
        self.node(node);
        (self.sql, self.params)
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::And(children) if children.is_empty() => self.sql.push('1'),
            Node::And(children) => self.join(children, " AND "),
            Node::Or(children) if children.is_empty() => self.sql.push('0'),
            Node::Or(children) => self.join(children, " OR "),
            Node::Not(inner) => {
                self.sql.push_str("NOT (");
                self.node(inner);
                self.sql.push(')');
            }
            Node::Term(term) => self.term(term),
        }
    }

    fn join(&mut self, children: &[Node], op: &str) {
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(op);
            }
            self.sql.push('(');
            self.node(child);
            self.sql.push(')');
        }
    }

    fn param(&mut self, value: impl Into<Value>) {
        self.sql.push('?');
        self.params.push(value.into());
    }

    fn term(&mut self, term: &SearchTerm) {
        match term {
            SearchTerm::Text(text) => {
                self.sql.push_str("n.flds LIKE ");
                self.param(format!("%{}%", to_like(text)));
                self.sql.push_str(" ESCAPE '\\'");
            }
            SearchTerm::Field { name, value } => self.field(name, value),
            SearchTerm::Deck(name) => {
                let pattern = to_like(&name.replace("::", &DECK_SEPARATOR.to_string()));
                for (i, column) in ["c.did", "c.odid"].iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(" OR ");
                    }
                    self.sql.push_str(column);
                    self.sql.push_str(" IN (SELECT id FROM decks WHERE name LIKE ");
                    self.param(pattern.clone());
                    self.sql.push_str(" ESCAPE '\\' OR name LIKE ");
                    self.param(format!("{}{}%", pattern, DECK_SEPARATOR));
                    self.sql.push_str(" ESCAPE '\\')");
                }
            }
            SearchTerm::Tag(name) if name.eq_ignore_ascii_case("none") => {
                self.sql.push_str("trim(n.tags) = ''");
            }
            SearchTerm::Tag(name) => {
                let pattern = to_like(name);
                self.sql.push_str("(' ' || n.tags || ' ') LIKE ");
                self.param(format!("% {pattern} %"));
                self.sql.push_str(" ESCAPE '\\' OR (' ' || n.tags || ' ') LIKE ");
                self.param(format!("% {pattern}::%"));
                self.sql.push_str(" ESCAPE '\\'");
            }
            SearchTerm::Notetype(name) => {
                self.sql
                    .push_str("n.mid IN (SELECT id FROM notetypes WHERE name LIKE ");
                self.param(to_like(name));
                self.sql.push_str(" ESCAPE '\\')");
            }
            SearchTerm::State(state) => self.sql.push_str(match state {
                CardState::New => "c.type = 0",
                CardState::Learn => "c.queue IN (1, 3)",
                CardState::Review => "c.type IN (2, 3)",
                CardState::Suspended => "c.queue = -1",
                CardState::Buried => "c.queue IN (-2, -3)",
            }),
            SearchTerm::AddedDays(days) => {
                let cutoff = self.now_ms - i64::from(*days) * MS_PER_DAY;
                self.sql.push_str("c.id > ");
                self.param(cutoff);
            }
            SearchTerm::NoteIds(ids) => self.id_list("n.id", ids),
            SearchTerm::CardIds(ids) => self.id_list("c.id", ids),
        }
    }

    fn field(&mut self, name: &str, value: &str) {
        let Some(ords) = self
            .fields
            .get(&name.to_lowercase())
            .filter(|o| !o.is_empty())
        else {
            // No note type has this field.
            self.sql.push('0');
            return;
        };
        let pattern = to_like(value);
        for (i, (ntid, ord)) in ords.clone().into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(" OR ");
            }
            self.sql.push_str("(n.mid = ");
            self.param(ntid);
            self.sql.push_str(" AND field_at(n.flds, ");
            self.param(ord);
            self.sql.push_str(") LIKE ");
            self.param(pattern.clone());
            self.sql.push_str(" ESCAPE '\\')");
        }
    }

    fn id_list(&mut self, column: &str, ids: &[i64]) {
        let list: Vec<String> = ids.iter().map(i64::to_string).collect();
        self.sql
            .push_str(&format!("{column} IN ({})", list.join(", ")));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
