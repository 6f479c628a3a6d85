//! Metadata tokens.
//!
//! The high byte selects a metadata table, the low 24 bits a 1-based row. The patcher mints
//! tokens for the three definition tables it models when a type is added to a module; tokens
//! handed in by the host (member references, user strings, signatures) pass through as-is.

use std::fmt;

/// A 32-bit ECMA-335 metadata token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

const ROW_MASK: u32 = 0x00FF_FFFF;

impl Token {
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `Field` table
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table
    pub const MEMBER_REF: u8 = 0x0A;
    /// `StandAloneSig` table
    pub const STANDALONE_SIG: u8 = 0x11;
    /// `#US` heap offsets, as used by `ldstr`
    pub const USER_STRING: u8 = 0x70;

    /// Wrap a raw token value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table byte and a row; rows wider than 24 bits are truncated.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & ROW_MASK))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// The 1-based row.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & ROW_MASK
    }

    /// True for the null token, used where a body has no local signature.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Name of the table this token points into, if it is one the patcher knows.
    #[must_use]
    pub fn table_name(&self) -> Option<&'static str> {
        match self.table() {
            Token::TYPE_DEF => Some("TypeDef"),
            Token::FIELD => Some("Field"),
            Token::METHOD_DEF => Some("MethodDef"),
            Token::MEMBER_REF => Some("MemberRef"),
            Token::STANDALONE_SIG => Some("StandAloneSig"),
            Token::USER_STRING => Some("UserString"),
            _ => None,
        }
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_name() {
            Some(name) => write!(f, "Token({name}#{})", self.row()),
            None => write!(f, "Token(0x{:08x})", self.0),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
