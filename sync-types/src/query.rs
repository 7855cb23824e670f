//! Typed query predicates and their text form.
//!
//! Record stores accept filter expressions such as
//!
//! ```text
//! group_id in ("A", "B") and status != "closed" order by $id asc limit 500 offset 0
//! ```
//!
//! Building those strings by hand is where escaping bugs live, so every query
//! in tally-sync is built as a [`Query`] value and serialized through its
//! `Display` impl. That is the only place literals are escaped. [`Query::parse`]
//! reads the same grammar back, which lets in-memory stores evaluate queries
//! exactly as they were sent.
//!
//! # Escaping
//!
//! Literals are always double-quoted. Inside a literal a backslash becomes `\\`
//! and a double quote becomes `\"`. Nothing else is escaped.

use std::fmt;

use crate::{QueryError, Record};

/// Comparison operator in a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `like` (substring match)
    Like,
}

impl Op {
    /// Operator as written in a query.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "!=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Like => "like",
        }
    }
}

/// Sort direction for `order by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `field op "value"`
    Compare {
        /// Field code.
        field: String,
        /// Operator.
        op: Op,
        /// Unescaped literal.
        value: String,
    },
    /// `field in (...)` or `field not in (...)`
    In {
        /// Field code.
        field: String,
        /// Unescaped literals.
        values: Vec<String>,
        /// True for `not in`.
        negated: bool,
    },
    /// All of the inner predicates.
    And(Vec<Predicate>),
    /// Any of the inner predicates.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// `field = "value"`
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Self::compare(field, Op::Eq, value)
    }

    /// `field <op> "value"`
    pub fn compare(field: &str, op: Op, value: impl Into<String>) -> Self {
        Self::Compare {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    /// `field in ("v1", "v2", ...)`
    pub fn is_in<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `field not in ("v1", "v2", ...)`
    pub fn not_in<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Conjunction, flattening nested `and`s.
    pub fn and(self, other: Predicate) -> Self {
        let mut items = match self {
            Predicate::And(items) => items,
            p => vec![p],
        };
        match other {
            Predicate::And(more) => items.extend(more),
            p => items.push(p),
        }
        Predicate::And(items)
    }

    /// Disjunction, flattening nested `or`s.
    pub fn or(self, other: Predicate) -> Self {
        let mut items = match self {
            Predicate::Or(items) => items,
            p => vec![p],
        };
        match other {
            Predicate::Or(more) => items.extend(more),
            p => items.push(p),
        }
        Predicate::Or(items)
    }

    /// Evaluate the predicate against a record.
    ///
    /// Field values are compared as text (see [`Record::text`]). Ordering
    /// operators compare numerically when both sides parse as numbers.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Compare { field, op, value } => {
                let actual = record.text(field);
                match op {
                    Op::Eq => actual == *value,
                    Op::NotEq => actual != *value,
                    Op::Like => actual.contains(value.as_str()),
                    Op::Gt => compare_text(&actual, value).is_gt(),
                    Op::Ge => compare_text(&actual, value).is_ge(),
                    Op::Lt => compare_text(&actual, value).is_lt(),
                    Op::Le => compare_text(&actual, value).is_le(),
                }
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let actual = record.text(field);
                values.iter().any(|v| *v == actual) != *negated
            }
            Predicate::And(items) => items.iter().all(|p| p.matches(record)),
            Predicate::Or(items) => items.iter().any(|p| p.matches(record)),
        }
    }
}

/// Order two field values the way stores order them: numerically when both
/// parse as numbers, as text otherwise.
pub fn compare_text(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Escape a literal for embedding between double quotes.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"{}\"", escape_literal(value))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} ", field, op.as_str())?;
                write_literal(f, value)
            }
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let keyword = if *negated { "not in" } else { "in" };
                write!(f, "{} {} (", field, keyword)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str(")")
            }
            Predicate::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    // `and` binds tighter than `or`
                    if matches!(item, Predicate::Or(inner) if inner.len() > 1) {
                        write!(f, "({})", item)?;
                    } else {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Predicate::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// A complete query: optional filter, ordering and paging clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Filter expression, `None` selects every record.
    pub filter: Option<Predicate>,
    /// `order by` clauses in priority order.
    pub order_by: Vec<(String, Direction)>,
    /// `limit n`
    pub limit: Option<usize>,
    /// `offset n`
    pub offset: Option<usize>,
}

impl Query {
    /// A query selecting every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// A query with the given filter.
    pub fn filtered(filter: Predicate) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// Append an `order by` clause.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    /// Set `limit`.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set `offset`.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Parse a query expression.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(input)?;
        Parser { tokens, pos: 0 }.query()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::with_capacity(4);

        if let Some(filter) = &self.filter {
            clauses.push(filter.to_string());
        }
        if !self.order_by.is_empty() {
            let orderings: Vec<String> = self
                .order_by
                .iter()
                .map(|(field, direction)| format!("{} {}", field, direction.as_str()))
                .collect();
            clauses.push(format!("order by {}", orderings.join(", ")));
        }
        if let Some(limit) = self.limit {
            clauses.push(format!("limit {}", limit));
        }
        if let Some(offset) = self.offset {
            clauses.push(format!("offset {}", offset));
        }

        f.write_str(&clauses.join(" "))
    }
}

// ===========================================
// Parsing
// ===========================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    Op(Op),
    LParen,
    RParen,
    Comma,
}

impl Tok {
    fn text(&self) -> String {
        match self {
            Tok::Word(w) => w.clone(),
            Tok::Str(s) => format!("\"{}\"", escape_literal(s)),
            Tok::Op(op) => op.as_str().to_string(),
            Tok::LParen => "(".into(),
            Tok::RParen => ")".into(),
            Tok::Comma => ",".into(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Tok::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ',' | '=' | '!' | '<' | '>')
}

fn tokenize(input: &str) -> Result<Vec<(usize, Tok)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((pos, Tok::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Tok::RParen));
            }
            ',' => {
                chars.next();
                tokens.push((pos, Tok::Comma));
            }
            '=' => {
                chars.next();
                tokens.push((pos, Tok::Op(Op::Eq)));
            }
            '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some(&(_, '=')));
                if followed_by_eq {
                    chars.next();
                }
                let op = match (c, followed_by_eq) {
                    ('!', true) => Op::NotEq,
                    ('<', true) => Op::Le,
                    ('<', false) => Op::Lt,
                    ('>', true) => Op::Ge,
                    ('>', false) => Op::Gt,
                    _ => {
                        return Err(QueryError::UnexpectedToken {
                            token: c.to_string(),
                            position: pos,
                        })
                    }
                };
                tokens.push((pos, Tok::Op(op)));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((at, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, '\\')) => value.push('\\'),
                            Some((_, '"')) => value.push('"'),
                            _ => return Err(QueryError::InvalidEscape(at)),
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(QueryError::UnterminatedString(pos));
                }
                tokens.push((pos, Tok::Str(value)));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push((pos, Tok::Word(word)));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Tok), QueryError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(QueryError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected((position, token): (usize, Tok)) -> QueryError {
        QueryError::UnexpectedToken {
            token: token.text(),
            position,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        let token = self.next()?;
        if token.1.is_keyword(keyword) {
            Ok(())
        } else {
            Err(Self::unexpected(token))
        }
    }

    fn at_clause_start(&self) -> bool {
        match self.peek() {
            None => true,
            Some(t) => t.is_keyword("order") || t.is_keyword("limit") || t.is_keyword("offset"),
        }
    }

    fn query(mut self) -> Result<Query, QueryError> {
        let mut query = Query::new();

        if !self.at_clause_start() {
            query.filter = Some(self.or_expr()?);
        }

        if self.peek().is_some_and(|t| t.is_keyword("order")) {
            self.next()?;
            self.expect_keyword("by")?;
            loop {
                let field = self.word()?;
                let direction = match self.peek() {
                    Some(t) if t.is_keyword("asc") => {
                        self.next()?;
                        Direction::Asc
                    }
                    Some(t) if t.is_keyword("desc") => {
                        self.next()?;
                        Direction::Desc
                    }
                    _ => Direction::Asc,
                };
                query.order_by.push((field, direction));
                if self.peek() == Some(&Tok::Comma) {
                    self.next()?;
                } else {
                    break;
                }
            }
        }

        if self.peek().is_some_and(|t| t.is_keyword("limit")) {
            self.next()?;
            query.limit = Some(self.number()?);
        }

        if self.peek().is_some_and(|t| t.is_keyword("offset")) {
            self.next()?;
            query.offset = Some(self.number()?);
        }

        match self.tokens.get(self.pos).cloned() {
            None => Ok(query),
            Some(token) => Err(Self::unexpected(token)),
        }
    }

    fn or_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut items = vec![self.and_expr()?];
        while self.peek().is_some_and(|t| t.is_keyword("or")) {
            self.next()?;
            items.push(self.and_expr()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::Or(items)
        })
    }

    fn and_expr(&mut self) -> Result<Predicate, QueryError> {
        let mut items = vec![self.atom()?];
        while self.peek().is_some_and(|t| t.is_keyword("and")) {
            self.next()?;
            items.push(self.atom()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::And(items)
        })
    }

    fn atom(&mut self) -> Result<Predicate, QueryError> {
        if self.peek() == Some(&Tok::LParen) {
            self.next()?;
            let inner = self.or_expr()?;
            let close = self.next()?;
            if close.1 != Tok::RParen {
                return Err(Self::unexpected(close));
            }
            return Ok(inner);
        }

        let field = self.word()?;
        let token = self.next()?;
        match token.1 {
            Tok::Op(op) => Ok(Predicate::Compare {
                field,
                op,
                value: self.string()?,
            }),
            ref t if t.is_keyword("like") => Ok(Predicate::Compare {
                field,
                op: Op::Like,
                value: self.string()?,
            }),
            ref t if t.is_keyword("in") => Ok(Predicate::In {
                field,
                values: self.list()?,
                negated: false,
            }),
            ref t if t.is_keyword("not") => {
                self.expect_keyword("in")?;
                Ok(Predicate::In {
                    field,
                    values: self.list()?,
                    negated: true,
                })
            }
            _ => Err(Self::unexpected(token)),
        }
    }

    fn list(&mut self) -> Result<Vec<String>, QueryError> {
        let open = self.next()?;
        if open.1 != Tok::LParen {
            return Err(Self::unexpected(open));
        }
        let mut values = Vec::new();
        if self.peek() == Some(&Tok::RParen) {
            self.next()?;
            return Ok(values);
        }
        loop {
            values.push(self.string()?);
            let token = self.next()?;
            match token.1 {
                Tok::Comma => continue,
                Tok::RParen => return Ok(values),
                _ => return Err(Self::unexpected(token)),
            }
        }
    }

    fn word(&mut self) -> Result<String, QueryError> {
        match self.next()? {
            (_, Tok::Word(w)) => Ok(w),
            other => Err(Self::unexpected(other)),
        }
    }

    fn string(&mut self) -> Result<String, QueryError> {
        match self.next()? {
            (_, Tok::Str(s)) => Ok(s),
            other => Err(Self::unexpected(other)),
        }
    }

    fn number(&mut self) -> Result<usize, QueryError> {
        let (position, token) = self.next()?;
        match token {
            Tok::Word(w) => w.parse().map_err(|_| QueryError::InvalidNumber {
                value: w,
                position,
            }),
            other => Err(Self::unexpected((position, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // Serialization Tests
    // ===========================================

    #[test]
    fn escape_backslash_then_quote() {
        assert_eq!(escape_literal(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_literal(r"a\b"), r"a\\b");
        assert_eq!(escape_literal(r#"\""#), r#"\\\""#);
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn compare_renders_quoted_literal() {
        let p = Predicate::eq("group_id", r#"say "hi""#);
        assert_eq!(p.to_string(), r#"group_id = "say \"hi\"""#);
    }

    #[test]
    fn in_clause_renders_list() {
        let p = Predicate::is_in("k", ["A", "B"]);
        assert_eq!(p.to_string(), r#"k in ("A", "B")"#);
        let p = Predicate::not_in("k", ["A"]);
        assert_eq!(p.to_string(), r#"k not in ("A")"#);
    }

    #[test]
    fn or_inside_and_is_parenthesised() {
        let p = Predicate::eq("a", "1")
            .or(Predicate::eq("b", "2"))
            .and(Predicate::eq("c", "3"));
        assert_eq!(p.to_string(), r#"(a = "1" or b = "2") and c = "3""#);
    }

    #[test]
    fn and_flattens() {
        let p = Predicate::eq("a", "1")
            .and(Predicate::eq("b", "2"))
            .and(Predicate::eq("c", "3"));
        match p {
            Predicate::And(items) => assert_eq!(items.len(), 3),
            other => panic!("Expected And, got {:?}", other),
        }
    }

    #[test]
    fn full_query_clause_order() {
        let q = Query::filtered(Predicate::eq("k", "A"))
            .order_by("$id", Direction::Asc)
            .limit(500)
            .offset(1000);
        assert_eq!(
            q.to_string(),
            r#"k = "A" order by $id asc limit 500 offset 1000"#
        );
    }

    #[test]
    fn probe_query_has_no_filter() {
        assert_eq!(Query::new().limit(1).to_string(), "limit 1");
        assert_eq!(Query::new().to_string(), "");
    }

    // ===========================================
    // Parsing Tests
    // ===========================================

    #[test]
    fn parse_reads_back_serialized_query() {
        let q = Query::filtered(
            Predicate::is_in("group", [r#"x"y"#, r"c:\dir", "plain"])
                .and(Predicate::compare("score", Op::Ge, "10").or(Predicate::eq("vip", "yes"))),
        )
        .order_by("作成日時", Direction::Desc)
        .order_by("$id", Direction::Asc)
        .limit(100)
        .offset(200);

        let parsed = Query::parse(&q.to_string()).unwrap();
        assert_eq!(parsed, q);
    }

    #[test]
    fn parse_empty_query() {
        assert_eq!(Query::parse("").unwrap(), Query::new());
        assert_eq!(Query::parse("limit 1").unwrap(), Query::new().limit(1));
    }

    #[test]
    fn parse_keywords_case_insensitive() {
        let q = Query::parse(r#"a = "1" AND b IN ("2") ORDER BY a DESC LIMIT 5"#).unwrap();
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.order_by, vec![("a".to_string(), Direction::Desc)]);
    }

    #[test]
    fn parse_rejects_unterminated_string() {
        let err = Query::parse(r#"a = "open"#).unwrap_err();
        assert_eq!(err, QueryError::UnterminatedString(4));
    }

    #[test]
    fn parse_rejects_unknown_escape() {
        let err = Query::parse(r#"a = "\n""#).unwrap_err();
        assert!(matches!(err, QueryError::InvalidEscape(_)));
    }

    #[test]
    fn parse_rejects_bare_value() {
        let err = Query::parse("a = b").unwrap_err();
        assert!(matches!(err, QueryError::UnexpectedToken { .. }));
    }

    #[test]
    fn parse_rejects_bad_limit() {
        let err = Query::parse("limit ten").unwrap_err();
        assert!(matches!(err, QueryError::InvalidNumber { .. }));
    }

    #[test]
    fn parse_rejects_trailing_tokens() {
        assert!(Query::parse(r#"a = "1" limit 1 garbage"#).is_err());
    }

    // ===========================================
    // Evaluation Tests
    // ===========================================

    #[test]
    fn escaped_key_selects_only_exact_record() {
        let tricky = r#"we"ird\key"#;
        let records = vec![
            Record::new("1").with_field("k", tricky),
            Record::new("2").with_field("k", r#"we"ird"#),
            Record::new("3").with_field("k", r#"we\"ird\\key"#),
            Record::new("4").with_field("k", r#"we\"ird\key"#),
        ];

        let text = Query::filtered(Predicate::eq("k", tricky)).to_string();
        let parsed = Query::parse(&text).unwrap();
        let filter = parsed.filter.unwrap();

        let hits: Vec<_> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(hits, vec!["1"]);
    }

    #[test]
    fn in_and_not_in_evaluate() {
        let record = Record::new("1").with_field("k", "B");
        assert!(Predicate::is_in("k", ["A", "B"]).matches(&record));
        assert!(!Predicate::not_in("k", ["A", "B"]).matches(&record));
        assert!(!Predicate::is_in("k", Vec::<String>::new()).matches(&record));
    }

    #[test]
    fn ordering_operators_are_numeric_when_possible() {
        let record = Record::new("1").with_field("n", 9);
        assert!(Predicate::compare("n", Op::Lt, "10").matches(&record));
        assert!(!Predicate::compare("n", Op::Gt, "10").matches(&record));
    }
}
