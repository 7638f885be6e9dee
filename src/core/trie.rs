//! Character trie used for dictionary and piece prefix search.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct Node<V> {
    children: FxHashMap<char, u32>,
    value: Option<V>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            children: FxHashMap::default(),
            value: None,
        }
    }
}

/// Maps character strings to values and enumerates every key that is a
/// prefix of a query.
#[derive(Debug, Clone)]
pub struct PrefixTrie<V> {
    nodes: Vec<Node<V>>,
    len: usize,
}

impl<V> Default for PrefixTrie<V> {
    fn default() -> Self {
        Self {
            nodes: vec![Node::default()],
            len: 0,
        }
    }
}

impl<V> PrefixTrie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutable slot for `key`, created empty if absent.
    pub fn entry(&mut self, key: &str) -> &mut Option<V> {
        let mut node = 0usize;
        for ch in key.chars() {
            node = match self.nodes[node].children.get(&ch) {
                Some(&child) => child as usize,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(ch, child as u32);
                    child
                }
            };
        }
        let slot = &mut self.nodes[node].value;
        if slot.is_none() {
            self.len += 1;
        }
        slot
    }

    pub fn insert(&mut self, key: &str, value: V) {
        *self.entry(key) = Some(value);
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = 0usize;
        for ch in key.chars() {
            node = *self.nodes[node].children.get(&ch)? as usize;
        }
        self.nodes[node].value.as_ref()
    }

    /// Every stored key that is a prefix of `chars`, as (length in chars,
    /// value), shortest first.
    pub fn common_prefixes<'a>(
        &'a self,
        chars: &'a [char],
    ) -> impl Iterator<Item = (usize, &'a V)> + 'a {
        let mut node = Some(0usize);
        chars.iter().enumerate().map_while(move |(i, ch)| {
            let current = node?;
            let child = *self.nodes[current].children.get(ch)? as usize;
            node = Some(child);
            Some((i + 1, self.nodes[child].value.as_ref()))
        })
        .filter_map(|(len, value)| value.map(|v| (len, v)))
    }
}
