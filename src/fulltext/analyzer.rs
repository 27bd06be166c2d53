//! Ties a tokenizer to a pipeline of filters, matching the teacher's
//! `analysis::analyzer::Analyzer` shape generalized to the configurable
//! tokenizer strategies of spec §4.5.

use std::collections::HashMap;
use std::sync::Arc;

use super::filter::TokenFilter;
use super::filters::{LowercaseFilter, StemmerFilter, StopWordFilter};
use super::token::Token;
use super::tokenizer::{KeywordTokenizer, NGramTokenizer, StandardTokenizer, Tokenizer};

pub struct Analyzer {
    pub name: String,
    tokenizer: Arc<dyn Tokenizer>,
    filters: Vec<Arc<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(name: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Analyzer { name: name.into(), tokenizer, filters: Vec::new() }
    }

    pub fn with_filter(mut self, filter: Arc<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        tokens
    }
}

pub struct AnalyzerRegistry {
    analyzers: HashMap<String, Arc<Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        AnalyzerRegistry { analyzers: HashMap::new() }
    }

    pub fn register(&mut self, analyzer: Analyzer) {
        self.analyzers.insert(analyzer.name.clone(), Arc::new(analyzer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    /// `simple` + lowercase, the default full-text strategy (spec §4.5).
    pub fn standard_english() -> Analyzer {
        Analyzer::new("standard", Arc::new(StandardTokenizer::new()))
            .with_filter(Arc::new(LowercaseFilter))
            .with_filter(Arc::new(StopWordFilter::english()))
            .with_filter(Arc::new(StemmerFilter::english()))
    }

    pub fn keyword() -> Analyzer {
        Analyzer::new("keyword", Arc::new(KeywordTokenizer))
    }

    pub fn ngram(k: usize) -> Analyzer {
        Analyzer::new(format!("ngram{}", k), Arc::new(NGramTokenizer { k }))
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Self::standard_english());
        registry.register(Self::keyword());
        registry
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_english_drops_stopwords_and_stems() {
        let analyzer = AnalyzerRegistry::standard_english();
        let tokens = analyzer.analyze("The foxes are running quickly");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert!(!words.contains(&"the"));
        assert!(!words.contains(&"are"));
        assert!(words.contains(&"fox"));
    }

    #[test]
    fn registry_resolves_by_name() {
        let registry = AnalyzerRegistry::with_defaults();
        assert!(registry.get("standard").is_some());
        assert!(registry.get("missing").is_none());
    }
}
