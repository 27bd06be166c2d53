pub mod lowercase;
pub mod stemmer;
pub mod stopword;

pub use lowercase::LowercaseFilter;
pub use stemmer::StemmerFilter;
pub use stopword::StopWordFilter;
