//! Path Resolver / Namespace Walker
//!
//! Resolves a Graphite find pattern into namespace nodes, querying ATSD
//! metadata only where the pattern leaves a level open.
//!
//! # Namespaces
//!
//! ```text
//! entities.<folder>.<entity>.<metric>[.<tag: value>...].detail
//! entities.<folder>.<entity>.<metric>[.<tag: value>...].stats.<aggregator>.<period>
//! metrics.<folder>.<metric>.<entity>[...same tail...]
//! <view>.<level 0>.<level 1>...
//! ```
//!
//! # Resolution
//!
//! The parent path is walked segment by segment. A literal segment is bound
//! directly to its level without any backend call; a wildcard segment
//! enumerates the children of every candidate and keeps the matching ones.
//! The last step either lists children (enumeration) or emits the node the
//! path names (exact request). Every emitted path is matched against the
//! original pattern.
//!
//! A failing metadata call only prunes the branch it was made for.

pub mod schema;
pub mod tree;
pub mod view;

pub use schema::{
    AggregatorEntry, FolderEntry, Level, LevelKind, PeriodEntry, Pins, ViewConfig, ViewSchema,
};
pub use tree::TreeSchema;

use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FinderError, FinderResult};
use crate::pattern::{metric_quote, parse_query, PathGlob, RequestKind, Scope, Segment, Token};
use crate::reader::{ReaderContext, SeriesReader};

/// A find request from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery {
    pub pattern: String,
}

impl FindQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

/// A namespace node, built fresh for every find call
#[derive(Clone)]
pub enum Node {
    Branch {
        path: String,
        label: String,
    },
    Leaf {
        path: String,
        label: String,
        reader: SeriesReader,
    },
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::Branch { path, .. } | Node::Leaf { path, .. } => path,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Node::Branch { label, .. } | Node::Leaf { label, .. } => label,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn reader(&self) -> Option<&SeriesReader> {
        match self {
            Node::Leaf { reader, .. } => Some(reader),
            Node::Branch { .. } => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Branch { path, .. } => write!(f, "Branch({})", path),
            Node::Leaf { path, reader, .. } => write!(f, "Leaf({}, {})", path, reader.identity()),
        }
    }
}

/// A resolved place in a namespace
#[derive(Debug, Clone)]
pub(crate) struct Position {
    /// Quoted path
    pub path: String,
    /// Decoded text of the last segment
    pub label: String,
    /// Segments bound below the root
    pub depth: usize,
    pub tokens: Vec<Token>,
    pub scope: Scope,
    pub leaf: bool,
}

impl Position {
    fn root(name: &str) -> Self {
        let token = Token::Root(name.to_string());
        Self {
            path: metric_quote(name),
            label: name.to_string(),
            depth: 0,
            scope: Scope::default().with(std::slice::from_ref(&token)),
            tokens: vec![token],
            leaf: false,
        }
    }

    /// Child named by backend or configured `text`
    pub fn child(&self, text: &str, tokens: Vec<Token>, leaf: bool) -> Self {
        self.extend(metric_quote(text), text.to_string(), tokens, leaf)
    }

    /// Child named by a segment of the request
    fn bound(&self, segment: &Segment, tokens: Vec<Token>, leaf: bool) -> Self {
        self.extend(
            segment.raw().to_string(),
            segment.text().to_string(),
            tokens,
            leaf,
        )
    }

    fn extend(&self, quoted: String, label: String, tokens: Vec<Token>, leaf: bool) -> Self {
        let scope = self.scope.clone().with(&tokens);
        let mut all = self.tokens.clone();
        all.extend(tokens);
        Self {
            path: format!("{}.{}", self.path, quoted),
            label,
            depth: self.depth + 1,
            tokens: all,
            scope,
            leaf,
        }
    }

    /// Quoted last segment
    fn segment(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Root namespace name
    pub fn root_name(&self) -> &str {
        self.scope.root.as_deref().unwrap_or_default()
    }
}

enum Namespace<'a> {
    Tree,
    View(&'a ViewSchema),
}

/// Resolves find patterns against ATSD metadata
pub struct Finder {
    tree: TreeSchema,
    views: BTreeMap<String, ViewSchema>,
    context: ReaderContext,
}

impl Finder {
    /// Create a finder; view names may not shadow the tree roots
    pub fn new(
        tree: TreeSchema,
        views: Vec<ViewSchema>,
        context: ReaderContext,
    ) -> FinderResult<Self> {
        let mut by_name = BTreeMap::new();
        for view in views {
            if tree::ROOTS.contains(&view.name()) {
                return Err(FinderError::Config(format!(
                    "view name '{}' is reserved",
                    view.name()
                )));
            }
            by_name.insert(view.name().to_string(), view);
        }

        Ok(Self {
            tree,
            views: by_name,
            context,
        })
    }

    pub fn context(&self) -> &ReaderContext {
        &self.context
    }

    /// Names of the namespace roots
    pub fn roots(&self) -> Vec<&str> {
        tree::ROOTS
            .iter()
            .copied()
            .chain(self.views.keys().map(String::as_str))
            .collect()
    }

    /// Resolve `query`, logging failures and yielding no nodes for them
    pub async fn find_nodes(&self, query: &FindQuery) -> Vec<Node> {
        match self.resolve(query).await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(pattern = %query.pattern, error = %e, "Find failed");
                Vec::new()
            }
        }
    }

    /// Resolve `query`, reporting malformed patterns
    pub async fn resolve(&self, query: &FindQuery) -> FinderResult<Vec<Node>> {
        let parsed = parse_query(&query.pattern)?;
        let pattern = PathGlob::new(&query.pattern)?;
        tracing::debug!(pattern = %query.pattern, kind = ?parsed.kind, "Resolving");

        let candidates = match parsed.segments.split_first() {
            None => self.root_positions(None),
            Some((root, rest)) => {
                let last = rest.len();
                let mut frontier = self.root_positions(Some(root));

                for (i, segment) in rest.iter().enumerate() {
                    let final_exact = parsed.kind == RequestKind::Exact && i + 1 == last;
                    frontier = self.advance(frontier, segment, final_exact).await?;
                    if frontier.is_empty() {
                        break;
                    }
                }

                match parsed.kind {
                    RequestKind::Exact => frontier,
                    RequestKind::Enumerate => self.expand(&frontier).await,
                }
            }
        };

        let nodes: Vec<Node> = candidates
            .into_iter()
            .filter(|pos| pattern.matches(&pos.path))
            .filter_map(|pos| self.node(pos))
            .collect();

        tracing::debug!(pattern = %query.pattern, nodes = nodes.len(), "Resolved");
        Ok(nodes)
    }

    /// Roots named by `segment`, every root when absent
    fn root_positions(&self, segment: Option<&Segment>) -> Vec<Position> {
        let roots = self.roots();
        match segment {
            None => roots.into_iter().map(Position::root).collect(),
            Some(segment) if segment.is_glob() => match PathGlob::new(segment.raw()) {
                Ok(glob) => roots
                    .into_iter()
                    .map(Position::root)
                    .filter(|pos| glob.matches(&pos.path))
                    .collect(),
                Err(_) => Vec::new(),
            },
            Some(segment) => roots
                .into_iter()
                .filter(|root| *root == segment.text())
                .map(Position::root)
                .collect(),
        }
    }

    /// Move every candidate one segment down
    async fn advance(
        &self,
        frontier: Vec<Position>,
        segment: &Segment,
        final_exact: bool,
    ) -> FinderResult<Vec<Position>> {
        if segment.is_glob() {
            let glob = PathGlob::new(segment.raw())?;
            let children = self.expand(&frontier).await;
            return Ok(children
                .into_iter()
                .filter(|child| glob.matches(child.segment()))
                .collect());
        }

        let mut bound = Vec::new();
        let mut failure = None;
        for pos in &frontier {
            let result = match self.namespace(pos) {
                _ if pos.leaf => Err(FinderError::MalformedPattern(format!(
                    "'{}' is a leaf",
                    pos.path
                ))),
                Some(Namespace::Tree) => self.tree.bind(pos, segment),
                Some(Namespace::View(schema)) => view::bind(schema, pos, segment, final_exact),
                None => continue,
            };
            match result {
                Ok((tokens, leaf)) => bound.push(pos.bound(segment, tokens, leaf)),
                Err(e) => {
                    tracing::debug!(path = %pos.path, segment = segment.raw(), error = %e, "Dropping branch");
                    failure.get_or_insert(e);
                }
            }
        }

        // Malformed only when no candidate accepts the segment
        match failure {
            Some(e) if bound.is_empty() => Err(e),
            _ => Ok(bound),
        }
    }

    /// Children of every candidate, enumerated concurrently
    async fn expand(&self, frontier: &[Position]) -> Vec<Position> {
        join_all(frontier.iter().map(|pos| self.children(pos)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn children(&self, pos: &Position) -> Vec<Position> {
        if pos.leaf {
            return Vec::new();
        }

        let metadata = &self.context.metadata;
        let result = match self.namespace(pos) {
            Some(Namespace::Tree) => self.tree.children(metadata, pos).await,
            Some(Namespace::View(schema)) => view::children(schema, metadata, pos).await,
            None => Ok(Vec::new()),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(path = %pos.path, error = %e, "Branch enumeration failed");
            Vec::new()
        })
    }

    fn namespace(&self, pos: &Position) -> Option<Namespace<'_>> {
        let root = pos.root_name();
        if tree::ROOTS.contains(&root) {
            Some(Namespace::Tree)
        } else {
            self.views.get(root).map(Namespace::View)
        }
    }

    fn node(&self, pos: Position) -> Option<Node> {
        if !pos.leaf {
            return Some(Node::Branch {
                path: pos.path,
                label: pos.label,
            });
        }

        match self.reader(&pos.scope) {
            Ok(reader) => Some(Node::Leaf {
                path: pos.path,
                label: pos.label,
                reader,
            }),
            Err(e) => {
                tracing::debug!(path = %pos.path, error = %e, "Skipping leaf");
                None
            }
        }
    }

    fn reader(&self, scope: &Scope) -> FinderResult<SeriesReader> {
        let identity = scope
            .identity()
            .ok_or_else(|| FinderError::MalformedPattern("leaf without a metric".to_string()))?;

        let mut reader = SeriesReader::new(identity, self.context.clone());
        if let Some(aggregation) = scope.aggregation()? {
            reader = reader.with_aggregation(aggregation);
        }
        if let Some(interval) = scope.interval_ms {
            reader = reader.with_interval(interval);
        }
        Ok(reader)
    }
}
