// Completion index and the memoizing query front.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Reserved scope for names reachable directly from the root.
pub const ROOT_SCOPE: &str = "global";
pub const PATH_SEPARATOR: char = '.';

const MEMO_CAPACITY: usize = 128;

/// Scope name (dotted path) to the property names visible on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionIndex {
    scopes: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, Vec<String>>> for CompletionIndex {
    fn from(scopes: BTreeMap<String, Vec<String>>) -> Self {
        Self { scopes }
    }
}

impl CompletionIndex {
    pub fn insert(&mut self, scope: impl Into<String>, properties: Vec<String>) {
        self.scopes.insert(scope.into(), properties);
    }

    pub fn get(&self, scope: &str) -> Option<&[String]> {
        self.scopes.get(scope).map(Vec::as_slice)
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn scopes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.scopes
    }

    /// Completions for the text typed so far.
    ///
    /// `Game.cr` looks up scope `Game` and returns its properties starting
    /// with `cr` (ignoring case) as `Game.<property>`. Text without a
    /// separator completes against the root scope.
    pub fn completions_for(&self, text: &str) -> Vec<String> {
        let (qualifier, parent, partial) = match text.rfind(PATH_SEPARATOR) {
            Some(split) => {
                let parent = &text[..split];
                let parent = if parent.is_empty() { ROOT_SCOPE } else { parent };
                (&text[..=split], parent, &text[split + 1..])
            }
            None => ("", ROOT_SCOPE, text),
        };
        let Some(properties) = self.get(parent) else {
            return Vec::new();
        };

        let partial = partial.to_lowercase();
        properties
            .iter()
            .filter(|property| property.to_lowercase().starts_with(&partial))
            .map(|property| format!("{qualifier}{property}"))
            .collect()
    }
}

/// A finished index with memoized queries.
pub struct Completer {
    index: CompletionIndex,
    memo: Mutex<LruCache<String, Vec<String>>>,
}

impl Completer {
    pub fn new(index: CompletionIndex) -> Self {
        let capacity = NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self { index, memo: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn index(&self) -> &CompletionIndex {
        &self.index
    }

    pub fn completions_for(&self, text: &str) -> Vec<String> {
        let Ok(mut memo) = self.memo.lock() else {
            return self.index.completions_for(text);
        };
        if let Some(hit) = memo.get(text) {
            return hit.clone();
        }
        let completions = self.index.completions_for(text);
        memo.put(text.to_string(), completions.clone());
        completions
    }

    #[cfg(test)]
    fn memoized(&self) -> usize {
        self.memo.lock().map(|memo| memo.len()).unwrap_or_default()
    }
}
