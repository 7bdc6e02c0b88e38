use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{self, Display};

use once_cell::sync::Lazy;
use smallvec::SmallVec;

const TOKEN_ENDERS: &str = ",;) +-*/^=><%|!?:";

const fn build_token_enders() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = TOKEN_ENDERS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static TOKEN_ENDERS_TABLE: [bool; 256] = build_token_enders();

#[inline(always)]
fn is_token_ender(c: u8) -> bool {
    TOKEN_ENDERS_TABLE[c as usize]
}

/// Built-in math functions and constants of the formula language. An operand
/// matching one of these names is never reported as a variable token.
static BUILTIN_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh", "tanh", "asinh",
        "acosh", "atanh", "log2", "log10", "log", "ln", "exp", "sqrt", "sign", "rint", "abs",
        "min", "max", "sum", "avg", "fmod", "csrCm", "cmCsr",
    ]
    .into_iter()
    .collect()
});

/// A custom error type for the tokenizer.
#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError: {} (at byte {})", self.message, self.pos)
    }
}

impl Error for TokenizerError {}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenType {
    Operand,
    Func,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
    Whitespace,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The subtype of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenSubType {
    None,
    Identifier,
    Number,
    Text,
    Logical,
    Open,
    Close,
}

impl Display for TokenSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A token in a pattern formula, carrying its byte span in the source.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} subtype: {:?} value: {}>",
            self.token_type, self.subtype, self.value
        )
    }
}

impl Token {
    fn from_slice(
        source: &str,
        token_type: TokenType,
        subtype: TokenSubType,
        start: usize,
        end: usize,
    ) -> Self {
        Token {
            value: source[start..end].to_string(),
            token_type,
            subtype,
            start,
            end,
        }
    }

    fn make_operand_from_slice(source: &str, start: usize, end: usize) -> Self {
        let value = &source[start..end];
        let subtype = operand_subtype(value);
        Token::from_slice(source, TokenType::Operand, subtype, start, end)
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::OpPrefix | TokenType::OpInfix | TokenType::OpPostfix
        )
    }

    /// True for an operand that names a variable: an identifier that is not
    /// a built-in function or constant of the formula language.
    pub fn is_variable(&self) -> bool {
        self.token_type == TokenType::Operand
            && self.subtype == TokenSubType::Identifier
            && !BUILTIN_NAMES.contains(self.value.as_str())
    }
}

fn operand_subtype(value: &str) -> TokenSubType {
    if value.starts_with('"') {
        TokenSubType::Text
    } else if value == "true" || value == "false" {
        TokenSubType::Logical
    } else if value.parse::<f64>().is_ok() {
        TokenSubType::Number
    } else {
        TokenSubType::Identifier
    }
}

/// A tokenizer for pattern-drafting formulas.
///
/// Formulas are plain expressions (`Line_A_B * 1.5 + height/2`); there is no
/// leading `=` and no cell-reference grammar. Tokens keep their byte spans so
/// a caller can splice replacements back into the source string.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    paren_stack: SmallVec<[usize; 8]>,
    offset: usize,
    token_start: usize,
    token_end: usize,
}

impl Tokenizer {
    /// Create a new tokenizer and immediately tokenize the formula.
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            paren_stack: SmallVec::new(),
            offset: 0,
            token_start: 0,
            token_end: 0,
        };
        tokenizer.parse()?;
        Ok(tokenizer)
    }

    #[inline]
    fn current_byte(&self) -> Option<u8> {
        self.formula.as_bytes().get(self.offset).copied()
    }

    #[inline]
    fn has_token(&self) -> bool {
        self.token_end > self.token_start
    }

    #[inline]
    fn start_token(&mut self) {
        self.token_start = self.offset;
        self.token_end = self.offset;
    }

    #[inline]
    fn extend_token(&mut self) {
        self.token_end = self.offset;
    }

    fn parse(&mut self) -> Result<(), TokenizerError> {
        if self.formula.is_empty() {
            return Ok(());
        }

        self.start_token();

        while self.offset < self.formula.len() {
            if self.check_scientific_notation() {
                continue;
            }

            let curr_byte = self.formula.as_bytes()[self.offset];

            if is_token_ender(curr_byte) && self.has_token() {
                self.save_token();
                self.start_token();
            }

            match curr_byte {
                b'"' => self.parse_string()?,
                b' ' | b'\t' | b'\n' => self.parse_whitespace(),
                b'+' | b'-' | b'*' | b'/' | b'^' | b'%' | b'=' | b'>' | b'<' | b'!' | b'&'
                | b'|' | b'?' | b':' => self.parse_operator()?,
                b'(' => self.parse_opener(),
                b')' => self.parse_closer()?,
                b';' | b',' => self.parse_separator(),
                _ => {
                    if !self.has_token() {
                        self.start_token();
                    }
                    self.offset += 1;
                    self.extend_token();
                }
            }
        }

        if self.has_token() {
            self.save_token();
        }

        if !self.paren_stack.is_empty() {
            return Err(TokenizerError {
                message: "Unmatched opening parenthesis".to_string(),
                pos: self.offset,
            });
        }

        Ok(())
    }

    /// If the current token looks like a number in scientific notation,
    /// consume the '+' or '-' as part of the number.
    fn check_scientific_notation(&mut self) -> bool {
        if let Some(curr_byte) = self.current_byte() {
            if (curr_byte == b'+' || curr_byte == b'-')
                && self.has_token()
                && self.is_scientific_notation_base()
            {
                self.offset += 1;
                self.extend_token();
                return true;
            }
        }
        false
    }

    fn is_scientific_notation_base(&self) -> bool {
        if !self.has_token() {
            return false;
        }

        let token_slice = &self.formula.as_bytes()[self.token_start..self.token_end];
        if token_slice.len() < 2 {
            return false;
        }

        let last = token_slice[token_slice.len() - 1];
        if !(last == b'E' || last == b'e') {
            return false;
        }

        if !token_slice[0].is_ascii_digit() {
            return false;
        }

        let mut dot_seen = false;
        for &ch in &token_slice[1..token_slice.len() - 1] {
            match ch {
                b'0'..=b'9' => {}
                b'.' if !dot_seen => dot_seen = true,
                _ => return false,
            }
        }
        true
    }

    /// If there is an accumulated token, convert it to an operand token and
    /// add it to the list.
    fn save_token(&mut self) {
        if self.has_token() {
            let token =
                Token::make_operand_from_slice(&self.formula, self.token_start, self.token_end);
            self.items.push(token);
        }
    }

    /// Parse a double-quoted string literal.
    fn parse_string(&mut self) -> Result<(), TokenizerError> {
        self.save_token();

        let string_start = self.offset;
        self.offset += 1; // Skip opening quote

        while self.offset < self.formula.len() {
            if self.formula.as_bytes()[self.offset] == b'"' {
                self.offset += 1;
                // A doubled quote is an escaped quote inside the literal
                if self.offset < self.formula.len() && self.formula.as_bytes()[self.offset] == b'"'
                {
                    self.offset += 1;
                } else {
                    let token =
                        Token::make_operand_from_slice(&self.formula, string_start, self.offset);
                    self.items.push(token);
                    self.start_token();
                    return Ok(());
                }
            } else {
                self.offset += 1;
            }
        }

        Err(TokenizerError {
            message: "Reached end of formula while parsing string".to_string(),
            pos: self.offset,
        })
    }

    fn parse_whitespace(&mut self) {
        self.save_token();

        let ws_start = self.offset;
        while self.offset < self.formula.len() {
            match self.formula.as_bytes()[self.offset] {
                b' ' | b'\t' | b'\n' => self.offset += 1,
                _ => break,
            }
        }

        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Whitespace,
            TokenSubType::None,
            ws_start,
            self.offset,
        ));
        self.start_token();
    }

    fn parse_operator(&mut self) -> Result<(), TokenizerError> {
        self.save_token();

        // Two-character operators first
        if self.offset + 1 < self.formula.len() {
            let two_char = &self.formula.as_bytes()[self.offset..self.offset + 2];
            if matches!(two_char, b">=" | b"<=" | b"==" | b"!=" | b"&&" | b"||") {
                self.items.push(Token::from_slice(
                    &self.formula,
                    TokenType::OpInfix,
                    TokenSubType::None,
                    self.offset,
                    self.offset + 2,
                ));
                self.offset += 2;
                self.start_token();
                return Ok(());
            }
        }

        let curr_byte = self.formula.as_bytes()[self.offset];

        // Single '&' or '|' is not an operator in this language
        if curr_byte == b'&' || curr_byte == b'|' {
            return Err(TokenizerError {
                message: format!("Stray '{}' in formula", curr_byte as char),
                pos: self.offset,
            });
        }

        let token_type = match curr_byte {
            b'%' => TokenType::OpPostfix,
            b'!' => TokenType::OpPrefix,
            b'+' | b'-' => {
                // Prefix if nothing meaningful precedes, infix otherwise
                let prev = self
                    .items
                    .iter()
                    .rev()
                    .find(|t| t.token_type != TokenType::Whitespace);
                match prev {
                    Some(p)
                        if p.subtype == TokenSubType::Close
                            || p.token_type == TokenType::OpPostfix
                            || p.token_type == TokenType::Operand =>
                    {
                        TokenType::OpInfix
                    }
                    Some(_) | None => TokenType::OpPrefix,
                }
            }
            _ => TokenType::OpInfix,
        };

        self.items.push(Token::from_slice(
            &self.formula,
            token_type,
            TokenSubType::None,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    /// Parse '('. If an operand directly precedes it, the pair forms a
    /// function call and the accumulated name becomes part of the opener.
    fn parse_opener(&mut self) {
        let token = if self.has_token() {
            let token = Token::from_slice(
                &self.formula,
                TokenType::Func,
                TokenSubType::Open,
                self.token_start,
                self.offset + 1,
            );
            self.token_start = self.offset + 1;
            self.token_end = self.offset + 1;
            token
        } else {
            Token::from_slice(
                &self.formula,
                TokenType::Paren,
                TokenSubType::Open,
                self.offset,
                self.offset + 1,
            )
        };

        self.paren_stack.push(self.offset);
        self.items.push(token);
        self.offset += 1;
        self.start_token();
    }

    fn parse_closer(&mut self) -> Result<(), TokenizerError> {
        self.save_token();

        if self.paren_stack.pop().is_none() {
            return Err(TokenizerError {
                message: format!("No matching opener for ')' at position {}", self.offset),
                pos: self.offset,
            });
        }

        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Paren,
            TokenSubType::Close,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    fn parse_separator(&mut self) {
        self.save_token();

        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Sep,
            TokenSubType::None,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    /// Reconstruct the formula from the parsed tokens.
    pub fn render(&self) -> String {
        self.items.iter().map(|t| t.value.as_str()).collect()
    }
}

impl TryFrom<&str> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Tokenizer::new(value)
    }
}

impl TryFrom<String> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tokenizer::new(&value)
    }
}

/// Map of byte position to variable token for every identifier operand in
/// the formula. This is the view rename propagation consumes: positions are
/// ascending, so replacements applied in reverse keep earlier spans valid.
pub fn variable_tokens(formula: &str) -> Result<BTreeMap<usize, String>, TokenizerError> {
    let tokenizer = Tokenizer::new(formula)?;
    Ok(tokenizer
        .items
        .into_iter()
        .filter(|t| t.is_variable())
        .map(|t| (t.start, t.value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<(TokenType, TokenSubType, String)> {
        Tokenizer::new(formula)
            .unwrap()
            .items
            .into_iter()
            .map(|t| (t.token_type, t.subtype, t.value))
            .collect()
    }

    #[test]
    fn simple_expression() {
        let tokens = kinds("Line_A_B*2");
        assert_eq!(
            tokens,
            vec![
                (
                    TokenType::Operand,
                    TokenSubType::Identifier,
                    "Line_A_B".to_string()
                ),
                (TokenType::OpInfix, TokenSubType::None, "*".to_string()),
                (TokenType::Operand, TokenSubType::Number, "2".to_string()),
            ]
        );
    }

    #[test]
    fn function_call_is_not_an_operand() {
        let tokens = kinds("max(height, Line_A_B)");
        assert_eq!(tokens[0].0, TokenType::Func);
        assert_eq!(tokens[0].2, "max(");
        assert!(
            tokens
                .iter()
                .any(|(ty, sub, v)| *ty == TokenType::Operand
                    && *sub == TokenSubType::Identifier
                    && v == "height")
        );
    }

    #[test]
    fn scientific_notation_is_one_number() {
        let tokens = kinds("1.5e-3+x");
        assert_eq!(
            tokens[0],
            (TokenType::Operand, TokenSubType::Number, "1.5e-3".to_string())
        );
        assert_eq!(tokens[1].2, "+");
        assert_eq!(tokens[2].2, "x");
    }

    #[test]
    fn unary_minus_is_prefix() {
        let tokens = kinds("-x + (-y)");
        assert_eq!(tokens[0].0, TokenType::OpPrefix);
        let inner_minus = tokens.iter().filter(|(ty, ..)| *ty == TokenType::OpPrefix);
        assert_eq!(inner_minus.count(), 2);
    }

    #[test]
    fn comparison_operators() {
        let tokens = kinds("a>=b && c!=d");
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|(ty, ..)| *ty == TokenType::OpInfix)
            .map(|(.., v)| v.as_str())
            .collect();
        assert_eq!(ops, vec![">=", "&&", "!="]);
    }

    #[test]
    fn unbalanced_parens_error() {
        assert!(Tokenizer::new("(a+b").is_err());
        assert!(Tokenizer::new("a+b)").is_err());
    }

    #[test]
    fn unterminated_string_error() {
        assert!(Tokenizer::new("\"abc").is_err());
    }

    #[test]
    fn render_round_trips() {
        for formula in [
            "Line_A_B * 1.5 + height/2",
            "max( RadiusArc_O_12, -3.2e2 )",
            "a >= b && sin(x)",
            "\"with \"\"quote\"\" inside\" + 1",
        ] {
            let t = Tokenizer::new(formula).unwrap();
            assert_eq!(t.render(), formula);
        }
    }

    #[test]
    fn variable_tokens_positions() {
        let vars = variable_tokens("Line_A_B + max(height, 2)").unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[&0], "Line_A_B");
        assert_eq!(vars[&15], "height");
    }

    #[test]
    fn builtins_are_not_variables() {
        let vars = variable_tokens("sin + cos").unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn empty_formula_has_no_tokens() {
        let t = Tokenizer::new("").unwrap();
        assert!(t.items.is_empty());
        assert!(variable_tokens("").unwrap().is_empty());
    }
}
