use rust_stemmers::{Algorithm, Stemmer};

use crate::fulltext::filter::TokenFilter;
use crate::fulltext::token::Token;

/// Wraps `rust_stemmers`, reducing tokens to their stem (spec §4.5 `stem`
/// tokenizer strategy, implemented here as a filter so it composes with
/// `StandardTokenizer` instead of replacing it).
pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn english() -> Self {
        StemmerFilter { stemmer: Stemmer::create(Algorithm::English) }
    }

    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter { stemmer: Stemmer::create(algorithm) }
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut t| {
                t.text = self.stemmer.stem(&t.text).into_owned();
                t
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stemmer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_plural_to_singular_root() {
        let filter = StemmerFilter::english();
        let tokens = vec![Token::word("running", 0, 0), Token::word("flies", 1, 8)];
        let stemmed = filter.filter(tokens);
        assert_eq!(stemmed[0].text, "run");
        assert_eq!(stemmed[1].text, "fli");
    }
}
