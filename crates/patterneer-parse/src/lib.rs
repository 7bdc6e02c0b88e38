pub mod tokenizer;

pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError, variable_tokens};
