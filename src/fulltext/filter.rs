//! Kept from the teacher's `analysis::filter::TokenFilter`.

use super::token::Token;

pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;
    fn name(&self) -> &str;
}
