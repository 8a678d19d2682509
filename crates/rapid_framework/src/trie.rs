//! Prefix tree over words, used for command-name completion.

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    is_word: bool,
}

impl TrieNode {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A set of words supporting exact and prefix lookups.
#[derive(Debug, Default, Clone)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `word`. Returns `false` if it was already present.
    pub fn insert(&mut self, word: &str) -> bool {
        let mut node = &mut self.root;
        for c in word.chars() {
            node = node.children.entry(c).or_default();
        }

        if node.is_word {
            return false;
        }
        node.is_word = true;
        self.len += 1;
        true
    }

    /// Whether `word` was inserted (prefixes of inserted words don't count).
    pub fn find(&self, word: &str) -> bool {
        self.node(word).is_some_and(|node| node.is_word)
    }

    /// Removes `word` and prunes the branches it leaves empty.
    /// Returns `false` if it was not present.
    pub fn delete(&mut self, word: &str) -> bool {
        let chars: Vec<char> = word.chars().collect();
        let removed = Self::delete_from(&mut self.root, &chars);
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn delete_from(node: &mut TrieNode, rest: &[char]) -> bool {
        let Some((first, tail)) = rest.split_first() else {
            let was_word = node.is_word;
            node.is_word = false;
            return was_word;
        };

        let Some(child) = node.children.get_mut(first) else {
            return false;
        };

        let removed = Self::delete_from(child, tail);
        if removed && child.is_leaf() && !child.is_word {
            node.children.remove(first);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// All words starting with `prefix`, in lexicographic order.
    pub fn words_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut words = Vec::new();
        if let Some(node) = self.node(prefix) {
            let mut buffer = prefix.to_string();
            Self::collect(node, &mut buffer, &mut words);
        }
        words
    }

    fn collect(node: &TrieNode, buffer: &mut String, words: &mut Vec<String>) {
        if node.is_word {
            words.push(buffer.clone());
        }
        for (c, child) in &node.children {
            buffer.push(*c);
            Self::collect(child, buffer, words);
            buffer.pop();
        }
    }

    fn node(&self, prefix: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for c in prefix.chars() {
            node = node.children.get(&c)?;
        }
        Some(node)
    }
}

impl<'a> FromIterator<&'a str> for Trie {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for word in iter {
            trie.insert(word);
        }
        trie
    }
}
