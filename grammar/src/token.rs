//! The values produced by successful matches.

use std::ops::Range;

/// A matched piece of input, tagged with the kind of terminal which matched it.  Tokens form a
/// singly linked chain in input order.
///
/// When parse trees are enabled (see [`Config::parse_tree`](crate::Config::parse_tree)), each
/// named rule also produces a token, whose children are the tokens matched by the rule's body.
#[derive(Debug)]
pub struct Token {
    /// For literals this is the literal text; for regexes it's `"regex"`; for named rules it's the
    /// rule's name
    pub kind: String,
    pub value: String,
    /// Byte offsets of the matched input
    pub span: Range<usize>,
    next: Option<Box<Token>>,
    children: Option<Box<Token>>,
}

impl Token {
    pub fn new(kind: impl Into<String>, value: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            span,
            next: None,
            children: None,
        }
    }

    /// Makes `children` (a chain) the children of this token
    pub fn with_children(mut self, children: Option<Token>) -> Self {
        self.children = children.map(Box::new);
        self
    }

    /// Links `tokens` into one chain, returning its head (or `None` if `tokens` is empty)
    pub fn chain(tokens: impl IntoIterator<Item = Token>) -> Option<Token> {
        let tokens: Vec<Token> = tokens.into_iter().collect();
        let mut head: Option<Box<Token>> = None;
        for mut token in tokens.into_iter().rev() {
            token.next = head;
            head = Some(Box::new(token));
        }
        head.map(|token| *token)
    }

    pub fn next(&self) -> Option<&Token> {
        self.next.as_deref()
    }

    /// The first child of this token, if it has any
    pub fn children(&self) -> Option<&Token> {
        self.children.as_deref()
    }

    /// Iterates over this token and every token chained after it
    pub fn iter(&self) -> Iter {
        Iter { next: Some(self) }
    }

    /// The number of tokens in the chain starting at `self`
    pub fn chain_len(&self) -> usize {
        self.iter().count()
    }

    /// Iterates depth-first over this chain and all of its descendants, yielding each token with
    /// its depth below `self`.  Parents come before their children.
    pub fn walk(&self) -> Walk {
        Walk {
            stack: vec![(0, self)],
        }
    }

    fn fields(&self) -> (&str, &str, &Range<usize>) {
        (&self.kind, &self.value, &self.span)
    }

    /// A copy of this token alone, without the rest of its chain or its children
    fn detached(&self) -> Token {
        Token::new(self.kind.clone(), self.value.clone(), self.span.clone())
    }
}

// Chains can be very long and trees very deep, so clone, compare and drop them iteratively
// rather than recursing through the `Box`es
impl Clone for Token {
    fn clone(&self) -> Self {
        // `levels[d]` holds the copies at depth `d` whose children may still be coming
        let mut levels: Vec<Vec<Token>> = Vec::new();
        for (depth, token) in self.walk() {
            close_levels(&mut levels, depth + 1);
            if levels.len() == depth {
                levels.push(Vec::new());
            }
            levels[depth].push(token.detached());
        }
        close_levels(&mut levels, 1);
        levels
            .pop()
            .and_then(Token::chain)
            .unwrap_or_else(|| self.detached())
    }
}

/// Pops levels until only `len` are left, making each popped level the children of the last
/// token of the level above it
fn close_levels(levels: &mut Vec<Vec<Token>>, len: usize) {
    while levels.len() > len {
        let children = levels.pop().and_then(Token::chain);
        if let Some(parent) = levels.last_mut().and_then(|level| level.last_mut()) {
            parent.children = children.map(Box::new);
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.walk()
            .map(|(depth, t)| (depth, t.fields()))
            .eq(other.walk().map(|(depth, t)| (depth, t.fields())))
    }
}

impl Eq for Token {}

impl Drop for Token {
    fn drop(&mut self) {
        let mut pending: Vec<Box<Token>> =
            self.next.take().into_iter().chain(self.children.take()).collect();
        while let Some(mut token) = pending.pop() {
            pending.extend(token.next.take());
            pending.extend(token.children.take());
        }
    }
}

impl IntoIterator for Token {
    type Item = Token;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter {
            next: Some(Box::new(self)),
        }
    }
}

impl<'t> IntoIterator for &'t Token {
    type Item = &'t Token;
    type IntoIter = Iter<'t>;

    fn into_iter(self) -> Iter<'t> {
        self.iter()
    }
}

/// Borrowing iterator over a chain of [`Token`]s
#[derive(Debug, Clone)]
pub struct Iter<'t> {
    next: Option<&'t Token>,
}

impl<'t> Iterator for Iter<'t> {
    type Item = &'t Token;

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.next?;
        self.next = token.next();
        Some(token)
    }
}

/// Depth-first iterator over a tree of [`Token`]s, created by [`Token::walk`]
#[derive(Debug, Clone)]
pub struct Walk<'t> {
    stack: Vec<(usize, &'t Token)>,
}

impl<'t> Iterator for Walk<'t> {
    type Item = (usize, &'t Token);

    fn next(&mut self) -> Option<(usize, &'t Token)> {
        let (depth, token) = self.stack.pop()?;
        if let Some(next) = token.next() {
            self.stack.push((depth, next));
        }
        if let Some(child) = token.children() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, token))
    }
}

/// Consuming iterator over a chain of [`Token`]s.  Each yielded token is detached from the rest
/// of the chain.
#[derive(Debug)]
pub struct IntoIter {
    next: Option<Box<Token>>,
}

impl Iterator for IntoIter {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let mut token = self.next.take()?;
        self.next = token.next.take();
        Some(*token)
    }
}

/// The result of a successful match: either some tokens, or the distinguished empty result (which
/// is not a failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Empty,
    Token(Token),
}

impl Match {
    /// Concatenates the token chains of `matches`, in order
    pub fn concat(matches: impl IntoIterator<Item = Match>) -> Match {
        let tokens = matches.into_iter().flat_map(Match::into_tokens);
        Match::from(Token::chain(tokens))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Match::Empty)
    }

    pub fn into_token(self) -> Option<Token> {
        match self {
            Match::Empty => None,
            Match::Token(token) => Some(token),
        }
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            Match::Empty => None,
            Match::Token(token) => Some(token),
        }
    }

    pub fn tokens(&self) -> Iter {
        Iter { next: self.token() }
    }

    pub fn into_tokens(self) -> IntoIter {
        IntoIter {
            next: match self {
                Match::Empty => None,
                Match::Token(token) => Some(Box::new(token)),
            },
        }
    }
}

impl From<Option<Token>> for Match {
    fn from(token: Option<Token>) -> Self {
        token.map_or(Match::Empty, Match::Token)
    }
}

/// The result of a failed match.  Failures carry no data; they are an ordinary outcome and the
/// cursor has already been restored by the time one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatch;

/// The result of running a parser
pub type Outcome = Result<Match, NoMatch>;

#[cfg(test)]
mod tests {
    use super::{Match, Token};

    fn tok(text: &str, start: usize) -> Token {
        Token::new(text, text, start..start + text.len())
    }

    #[test]
    fn chain() {
        assert_eq!(Token::chain(vec![]), None);
        let head = Token::chain(vec![tok("a", 0), tok("bc", 1), tok("d", 3)]).unwrap();
        assert_eq!(head.chain_len(), 3);
        let values: Vec<&str> = head.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["a", "bc", "d"]);
        assert_eq!(head.next().map(|t| t.span.clone()), Some(1..3));
    }

    #[test]
    fn concat() {
        let first = Match::Token(Token::chain(vec![tok("a", 0), tok("b", 1)]).unwrap());
        let second = Match::Token(tok("c", 2));
        let joined = Match::concat(vec![first, Match::Empty, second]);
        let kinds: Vec<&str> = joined.tokens().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);

        assert_eq!(Match::concat(vec![Match::Empty, Match::Empty]), Match::Empty);
        assert!(Match::concat(vec![]).is_empty());
    }

    #[test]
    fn long_chains_drop() {
        let head = Token::chain((0..200_000).map(|i| tok("x", i))).unwrap();
        assert_eq!(head.chain_len(), 200_000);
        drop(head);
    }

    /// `(a (b c) d)`, with `b` nested under `a`'s second child
    fn tree() -> Token {
        let inner = Token::new("pair", "bc", 1..3)
            .with_children(Token::chain(vec![tok("b", 1), tok("c", 2)]));
        let outer = Token::new("group", "abcd", 0..4)
            .with_children(Token::chain(vec![tok("a", 0), inner, tok("d", 3)]));
        Token::chain(vec![outer, tok("e", 4)]).unwrap()
    }

    #[test]
    fn trees() {
        let root = tree();
        assert_eq!(root.chain_len(), 2);
        let walked: Vec<(usize, &str)> =
            root.walk().map(|(d, t)| (d, t.kind.as_str())).collect();
        assert_eq!(
            walked,
            vec![(0, "group"), (1, "a"), (1, "pair"), (2, "b"), (2, "c"), (1, "d"), (0, "e")]
        );

        let copy = root.clone();
        assert_eq!(copy, root);
        let copied: Vec<(usize, &str)> =
            copy.walk().map(|(d, t)| (d, t.kind.as_str())).collect();
        assert_eq!(copied, walked);

        // Same tokens, different shape
        let flat = Token::chain(root.walk().map(|(_, t)| t.detached())).unwrap();
        assert_eq!(flat.chain_len(), 7);
        assert_ne!(flat, root);
    }

    #[test]
    fn deep_trees_drop() {
        let mut token = tok("x", 0);
        for _ in 0..200_000 {
            token = Token::new("wrap", "x", 0..1).with_children(Some(token));
        }
        let copy = token.clone();
        assert_eq!(copy.walk().count(), 200_001);
        assert!(copy == token);
        drop(token);
    }
}
