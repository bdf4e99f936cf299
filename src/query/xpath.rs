//! A subset of XPath 1.0 over `roxmltree` documents.
//!
//! Supported: absolute and relative location paths, `//`, `.`, `..`, `*`,
//! `@name`, `@*`, `text()`, `node()`, unions with `|`, and predicates of the
//! forms `[2]`, `[last()]`, `[@a]`, `[@a='v']`, `[@a!='v']`, `[child]`,
//! `[child='v']`, `[text()='v']` and `[.='v']`.
//!
//! Names match on local names, so `dc:title` selects `<dc:title>` whatever
//! namespace the prefix is bound to. Results are in document order without
//! duplicates.

use roxmltree::Node;
use serde_json::Value;

use crate::query::{Querier, QueryError, QueryStrategy, SourceNode};

/// The `xpath` query language.
#[derive(Debug, Clone, Copy, Default)]
pub struct XPathQuerier;

impl QueryStrategy for XPathQuerier {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        let node = node.as_xml(Querier::Xpath)?;
        let xpath = XPath::parse(expr).map_err(|e| QueryError::invalid(Querier::Xpath, e))?;
        Ok(xpath
            .select(node)
            .into_iter()
            .map(|item| Value::String(item.string_value().trim().to_string()))
            .collect())
    }
}

/// A compiled expression: one or more location paths joined by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    paths: Vec<LocationPath>,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    DescendantOrSelf,
    SelfNode,
    Parent,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    Exists(Operand),
    Compare(Operand, Comparison, String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Attribute(Option<String>),
    Child(String),
    Text,
    Dot,
}

/// One selected item.
#[derive(Debug, Clone, Copy)]
pub enum XPathItem<'a, 'input> {
    Node(Node<'a, 'input>),
    Attribute { owner: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> XPathItem<'a, 'input> {
    /// The XPath string-value: attribute value, text, or all descendant text.
    pub fn string_value(&self) -> String {
        match self {
            XPathItem::Node(node) if node.is_text() => node.text().unwrap_or_default().to_string(),
            XPathItem::Node(node) => node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
            XPathItem::Attribute { owner, index } => owner
                .attributes()
                .nth(*index)
                .map(|a| a.value().to_string())
                .unwrap_or_default(),
        }
    }

    /// Document order: nodes by id, attributes right after their owner.
    fn order_key(&self) -> (u32, usize) {
        match self {
            XPathItem::Node(node) => (node.id().get(), 0),
            XPathItem::Attribute { owner, index } => (owner.id().get(), index + 1),
        }
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn sort_unique(items: &mut Vec<XPathItem<'_, '_>>) {
    items.sort_by_key(|item| item.order_key());
    items.dedup_by_key(|item| item.order_key());
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let mut paths = vec![parser.location_path()?];
        while parser.eat(&Token::Pipe) {
            paths.push(parser.location_path()?);
        }
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected {:?}", token));
        }
        Ok(Self { paths })
    }

    /// Items selected with `node` as the context node.
    pub fn select<'a, 'input>(&self, node: Node<'a, 'input>) -> Vec<XPathItem<'a, 'input>> {
        let mut items: Vec<XPathItem<'a, 'input>> =
            self.paths.iter().flat_map(|path| path.select(node)).collect();
        sort_unique(&mut items);
        items
    }
}

impl LocationPath {
    fn select<'a, 'input>(&self, node: Node<'a, 'input>) -> Vec<XPathItem<'a, 'input>> {
        let start = if self.absolute {
            node.document().root()
        } else {
            node
        };
        let mut current = vec![XPathItem::Node(start)];
        for step in &self.steps {
            let mut next = Vec::new();
            for item in &current {
                step.apply(*item, &mut next);
            }
            sort_unique(&mut next);
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

impl Step {
    fn apply<'a, 'input>(&self, item: XPathItem<'a, 'input>, out: &mut Vec<XPathItem<'a, 'input>>) {
        let mut candidates = self.candidates(item);
        for predicate in &self.predicates {
            candidates = predicate.filter(candidates);
        }
        out.extend(candidates);
    }

    fn candidates<'a, 'input>(&self, item: XPathItem<'a, 'input>) -> Vec<XPathItem<'a, 'input>> {
        let node = match item {
            XPathItem::Node(node) => node,
            XPathItem::Attribute { owner, .. } => {
                return match self.axis {
                    Axis::SelfNode if matches!(self.test, NodeTest::Node | NodeTest::Any) => {
                        vec![item]
                    }
                    Axis::Parent if self.matches(owner) => vec![XPathItem::Node(owner)],
                    _ => Vec::new(),
                };
            }
        };

        match self.axis {
            Axis::Child => node
                .children()
                .filter(|n| self.matches(*n))
                .map(XPathItem::Node)
                .collect(),
            Axis::DescendantOrSelf => node
                .descendants()
                .filter(|n| self.matches(*n))
                .map(XPathItem::Node)
                .collect(),
            Axis::SelfNode => {
                if self.matches(node) {
                    vec![item]
                } else {
                    Vec::new()
                }
            }
            Axis::Parent => node
                .parent()
                .filter(|n| self.matches(*n))
                .map(XPathItem::Node)
                .into_iter()
                .collect(),
            Axis::Attribute => node
                .attributes()
                .enumerate()
                .filter(|(_, attr)| match &self.test {
                    NodeTest::Name(name) => attr.name() == name,
                    NodeTest::Any | NodeTest::Node => true,
                    NodeTest::Text => false,
                })
                .map(|(index, _)| XPathItem::Attribute { owner: node, index })
                .collect(),
        }
    }

    fn matches(&self, node: Node<'_, '_>) -> bool {
        match &self.test {
            NodeTest::Name(name) => node.is_element() && node.tag_name().name() == name,
            NodeTest::Any => node.is_element(),
            NodeTest::Text => node.is_text(),
            NodeTest::Node => true,
        }
    }
}

impl Predicate {
    fn filter<'a, 'input>(&self, candidates: Vec<XPathItem<'a, 'input>>) -> Vec<XPathItem<'a, 'input>> {
        match self {
            Predicate::Position(position) => position
                .checked_sub(1)
                .and_then(|i| candidates.get(i).copied())
                .into_iter()
                .collect(),
            Predicate::Last => candidates.last().copied().into_iter().collect(),
            Predicate::Exists(operand) => candidates
                .into_iter()
                .filter(|item| !operand.values(item).is_empty())
                .collect(),
            Predicate::Compare(operand, comparison, literal) => candidates
                .into_iter()
                .filter(|item| {
                    operand.values(item).iter().any(|value| {
                        let equal = value.trim() == literal;
                        match comparison {
                            Comparison::Eq => equal,
                            Comparison::Ne => !equal,
                        }
                    })
                })
                .collect(),
        }
    }
}

impl Operand {
    fn values(&self, item: &XPathItem<'_, '_>) -> Vec<String> {
        let node = match (self, item) {
            (Operand::Dot, _) => return vec![item.string_value()],
            (_, XPathItem::Node(node)) => *node,
            (_, XPathItem::Attribute { .. }) => return Vec::new(),
        };
        match self {
            Operand::Attribute(name) => node
                .attributes()
                .filter(|attr| name.as_deref().map_or(true, |name| attr.name() == name))
                .map(|attr| attr.value().to_string())
                .collect(),
            Operand::Child(name) => node
                .children()
                .filter(|child| child.is_element() && child.tag_name().name() == name)
                .map(|child| XPathItem::Node(child).string_value())
                .collect(),
            Operand::Text => node
                .children()
                .filter(|child| child.is_text())
                .filter_map(|child| child.text())
                .map(str::to_string)
                .collect(),
            Operand::Dot => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Name(String),
    Number(usize),
    Literal(String),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '/' if chars.peek().map(|(_, c)| *c) == Some('/') => {
                chars.next();
                Token::DoubleSlash
            }
            '/' => Token::Slash,
            '.' if chars.peek().map(|(_, c)| *c) == Some('.') => {
                chars.next();
                Token::DotDot
            }
            '.' => Token::Dot,
            '@' => Token::At,
            '*' => Token::Star,
            '|' => Token::Pipe,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' => Token::Eq,
            '!' if chars.peek().map(|(_, c)| *c) == Some('=') => {
                chars.next();
                Token::Ne
            }
            '\'' | '"' => {
                let mut literal = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == c {
                        closed = true;
                        break;
                    }
                    literal.push(next);
                }
                if !closed {
                    return Err(format!("unterminated string at {}", start));
                }
                Token::Literal(literal)
            }
            c if c.is_ascii_digit() => {
                let mut digits = c.to_string();
                while let Some((_, next)) = chars.peek().copied() {
                    if !next.is_ascii_digit() {
                        break;
                    }
                    digits.push(next);
                    chars.next();
                }
                let number = digits
                    .parse()
                    .map_err(|_| format!("number out of range at {}", start))?;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                let mut name = c.to_string();
                while let Some((_, next)) = chars.peek().copied() {
                    if !is_name_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                Token::Name(name)
            }
            other => return Err(format!("unexpected character '{}' at {}", other, start)),
        };
        tokens.push(token);
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?} at end of expression", expected)),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn is_call(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == name)
            && self.peek_at(1) == Some(&Token::LParen)
    }

    fn location_path(&mut self) -> Result<LocationPath, String> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.starts_step() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };

        loop {
            steps.push(self.step()?);
            if self.eat(&Token::Slash) {
                continue;
            }
            if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self());
                continue;
            }
            break;
        }

        Ok(LocationPath { absolute, steps })
    }

    fn step(&mut self) -> Result<Step, String> {
        let (axis, test) = match self.next() {
            Some(Token::Dot) => (Axis::SelfNode, NodeTest::Node),
            Some(Token::DotDot) => (Axis::Parent, NodeTest::Node),
            Some(Token::At) => match self.next() {
                Some(Token::Name(name)) => (Axis::Attribute, NodeTest::Name(local_name(&name).to_string())),
                Some(Token::Star) => (Axis::Attribute, NodeTest::Any),
                other => return Err(format!("expected attribute name after '@', found {:?}", other)),
            },
            Some(Token::Star) => (Axis::Child, NodeTest::Any),
            Some(Token::Name(name)) => {
                if self.eat(&Token::LParen) {
                    self.expect(Token::RParen)?;
                    match name.as_str() {
                        "text" => (Axis::Child, NodeTest::Text),
                        "node" => (Axis::Child, NodeTest::Node),
                        other => return Err(format!("unsupported function '{}()'", other)),
                    }
                } else {
                    (Axis::Child, NodeTest::Name(local_name(&name).to_string()))
                }
            }
            Some(token) => return Err(format!("expected a step, found {:?}", token)),
            None => return Err("expected a step at end of expression".to_string()),
        };

        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.predicate()?);
            self.expect(Token::RBracket)?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn predicate(&mut self) -> Result<Predicate, String> {
        if let Some(Token::Number(n)) = self.peek() {
            let n = *n;
            self.pos += 1;
            return Ok(Predicate::Position(n));
        }
        if self.is_call("last") {
            self.pos += 2;
            self.expect(Token::RParen)?;
            return Ok(Predicate::Last);
        }

        let operand = if self.is_call("text") {
            self.pos += 2;
            self.expect(Token::RParen)?;
            Operand::Text
        } else {
            match self.next() {
                Some(Token::At) => match self.next() {
                    Some(Token::Name(name)) => Operand::Attribute(Some(local_name(&name).to_string())),
                    Some(Token::Star) => Operand::Attribute(None),
                    other => return Err(format!("expected attribute name after '@', found {:?}", other)),
                },
                Some(Token::Dot) => Operand::Dot,
                Some(Token::Name(name)) => Operand::Child(local_name(&name).to_string()),
                Some(token) => return Err(format!("unsupported predicate starting with {:?}", token)),
                None => return Err("unterminated predicate".to_string()),
            }
        };

        let comparison = if self.eat(&Token::Eq) {
            Comparison::Eq
        } else if self.eat(&Token::Ne) {
            Comparison::Ne
        } else {
            return Ok(Predicate::Exists(operand));
        };

        let literal = match self.next() {
            Some(Token::Literal(literal)) => literal,
            Some(Token::Number(n)) => n.to_string(),
            other => return Err(format!("expected a string after comparison, found {:?}", other)),
        };
        Ok(Predicate::Compare(operand, comparison, literal))
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}
