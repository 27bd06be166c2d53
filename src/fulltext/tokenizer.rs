//! Tokenization strategies (spec §4.5): `simple`, `stem` (handled by a
//! filter, see `filters::stemmer`), `ngram(k)`, `keyword`. Kept from the
//! teacher's `analysis::tokenizer::{Tokenizer, StandardTokenizer}`.

use unicode_segmentation::UnicodeSegmentation;

use super::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
    fn name(&self) -> &str;
}

pub struct StandardTokenizer {
    pub lowercase: bool,
    pub max_token_length: usize,
}

impl StandardTokenizer {
    pub fn new() -> Self {
        StandardTokenizer { lowercase: true, max_token_length: 255 }
    }
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (position, (offset, word)) in text.unicode_word_indices().enumerate() {
            if word.len() > self.max_token_length {
                continue;
            }
            let text = if self.lowercase { word.to_lowercase() } else { word.to_string() };
            tokens.push(Token::word(text, position, offset));
        }
        tokens
    }

    fn name(&self) -> &str {
        "simple"
    }
}

/// `keyword` strategy: the whole field value is a single token, unsplit.
pub struct KeywordTokenizer;

impl Tokenizer for KeywordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![Token::word(text.to_string(), 0, 0)]
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// `ngram(k)` strategy: fixed k-gram over the unicode scalar sequence.
pub struct NGramTokenizer {
    pub k: usize,
}

impl Tokenizer for NGramTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() < self.k {
            return Vec::new();
        }
        let mut tokens = Vec::new();
        for (position, window) in chars.windows(self.k).enumerate() {
            let gram: String = window.iter().collect();
            tokens.push(Token::word(gram, position, position));
        }
        tokens
    }

    fn name(&self) -> &str {
        "ngram"
    }
}
