use crate::fulltext::filter::TokenFilter;
use crate::fulltext::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut t| {
                t.text = t.text.to_lowercase();
                t
            })
            .collect()
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}
