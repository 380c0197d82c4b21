//! Pattern table: `(host, path)` → most specific registered entry.
//!
//! Pattern syntax is `[host]/rooted/path`. A path ending in `/` names a
//! subtree and matches every path below it. Any other path is exact and may
//! contain `{name}` parameter segments, matched through a [`matchit`] radix
//! tree.
//!
//! Precedence, most specific first:
//!
//! 1. host-qualified patterns, then host-agnostic ones;
//! 2. within a host scope, an exact match, then the longest subtree prefix.
//!
//! Subtree roots requested without their trailing slash redirect to the
//! slash-suffixed path, unless the bare path matches an exact pattern.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

/// A parsed route pattern.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct Pattern {
    host: Option<String>,
    path: String,
}

impl Pattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, String> {
        let slash = raw.find('/').ok_or_else(|| format!("pattern `{raw}` has no rooted path"))?;
        let (host, path) = raw.split_at(slash);
        let host = (!host.is_empty()).then(|| host.to_ascii_lowercase());
        Ok(Self { host, path: path.to_owned() })
    }

    pub(crate) fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn is_subtree(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// Result of resolving a request against the table.
#[derive(Debug)]
pub(crate) enum Lookup<'a, T> {
    Found { value: &'a T, params: HashMap<String, String> },
    /// Answer with a permanent redirect to this path.
    Redirect(String),
    NotFound,
    /// Not an origin-form path (e.g. `OPTIONS *`); answered with 400.
    Invalid,
}

/// Patterns sharing one host qualifier (or none).
struct Scope {
    exact: MatchitRouter<usize>,
    // Longest first, so the first prefix hit is the most specific.
    subtrees: Vec<(String, usize)>,
}

impl Scope {
    fn new() -> Self {
        Self { exact: MatchitRouter::new(), subtrees: Vec::new() }
    }

    fn has_exact(&self, path: &str) -> bool {
        self.exact.at(path).is_ok()
    }

    fn has_subtree(&self, prefix: &str) -> bool {
        self.subtrees.iter().any(|(p, _)| p == prefix)
    }
}

pub(crate) struct PatternTable<T> {
    values: Vec<T>,
    slots: HashMap<Pattern, usize>,
    scopes: HashMap<Option<String>, Scope>,
}

impl<T> PatternTable<T> {
    pub(crate) fn new() -> Self {
        Self { values: Vec::new(), slots: HashMap::new(), scopes: HashMap::new() }
    }

    /// The entry for `pattern`, inserting `init()` on first registration.
    pub(crate) fn entry_or_insert_with(
        &mut self,
        pattern: &Pattern,
        init: impl FnOnce() -> T,
    ) -> Result<&mut T, String> {
        if let Some(&slot) = self.slots.get(pattern) {
            return Ok(&mut self.values[slot]);
        }

        let slot = self.values.len();
        let scope = self.scopes.entry(pattern.host.clone()).or_insert_with(Scope::new);
        if pattern.is_subtree() {
            let at = scope.subtrees.partition_point(|(p, _)| p.len() >= pattern.path.len());
            scope.subtrees.insert(at, (pattern.path.clone(), slot));
        } else {
            scope.exact.insert(pattern.path.as_str(), slot).map_err(|e| e.to_string())?;
        }

        self.values.push(init());
        self.slots.insert(pattern.clone(), slot);
        Ok(&mut self.values[slot])
    }

    /// Resolves a request path on an already allow-listed host.
    pub(crate) fn lookup(&self, host: &str, path: &str) -> Lookup<'_, T> {
        if !path.starts_with('/') {
            return Lookup::Invalid;
        }
        let cleaned = clean_path(path);
        if cleaned != path {
            return Lookup::Redirect(cleaned);
        }

        let scopes = [self.scopes.get(&Some(host.to_owned())), self.scopes.get(&None)];

        if !path.ends_with('/') && !scopes.iter().flatten().any(|s| s.has_exact(path)) {
            let root = format!("{path}/");
            if scopes.iter().flatten().any(|s| s.has_subtree(&root)) {
                return Lookup::Redirect(root);
            }
        }

        for scope in scopes.into_iter().flatten() {
            if let Ok(matched) = scope.exact.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                return Lookup::Found { value: &self.values[*matched.value], params };
            }
            if let Some((_, slot)) = scope.subtrees.iter().find(|(p, _)| path.starts_with(p.as_str())) {
                return Lookup::Found { value: &self.values[*slot], params: HashMap::new() };
            }
        }

        Lookup::NotFound
    }
}

/// Canonical form of a request path: rooted, no `.`/`..` elements, no
/// repeated slashes. A trailing slash survives.
pub(crate) fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() || path.ends_with('/') {
        out.push('/');
    }
    out
}
