use bitflags::bitflags;

/// Column types reported by a cursor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Null = 0x00,
    Bool = 0x01,
    I8 = 0x02,
    I16 = 0x03,
    I32 = 0x04,
    I64 = 0x05,
    U8 = 0x06,
    U16 = 0x07,
    U32 = 0x08,
    U64 = 0x09,
    F32 = 0x0a,
    F64 = 0x0b,
    Decimal = 0x0c,
    Text = 0x0d,
    Bytes = 0x0e,
    DateTime = 0x0f,
    Guid = 0x10,
}

impl DbType {
    pub fn is_signed_integer(self) -> bool {
        matches!(self, DbType::I8 | DbType::I16 | DbType::I32 | DbType::I64)
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DbType::U8 | DbType::U16 | DbType::U32 | DbType::U64)
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_float(self) -> bool {
        matches!(self, DbType::F32 | DbType::F64)
    }

    /// Integers, floats, decimals and booleans all convert between each other.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || matches!(self, DbType::Decimal | DbType::Bool)
    }

    /// Bit width of an integer type, `None` for everything else.
    pub fn integer_bits(self) -> Option<u32> {
        match self {
            DbType::I8 | DbType::U8 => Some(8),
            DbType::I16 | DbType::U16 => Some(16),
            DbType::I32 | DbType::U32 => Some(32),
            DbType::I64 | DbType::U64 => Some(64),
            _ => None,
        }
    }
}

bitflags! {
    /// Switches for the SQL text rewriter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RewriteFlags: u32 {
        /// Pad expanded lists to a multiple of ten by repeating the last value.
        const PAD_LISTS = 0x0000_0001;
        /// Accept bare `?` markers when a template uses no named placeholders.
        const ALLOW_LEGACY_MARKERS = 0x0000_0002;
        /// Substitute `{=name}` tokens with literal text.
        const LITERAL_TOKENS = 0x0000_0004;
    }
}

impl Default for RewriteFlags {
    fn default() -> Self {
        RewriteFlags::ALLOW_LEGACY_MARKERS | RewriteFlags::LITERAL_TOKENS
    }
}

/// Statement verbs that are sent as-is, without parameter rewriting.
pub const CONTROL_VERBS: &[&str] = &["commit", "rollback", "revert", "vacuum", "begin"];

/// Characters that make a template "more than a bare name".
pub const STATEMENT_MARKERS: &[char] = &[';', '/', '-', '+', '*', '(', ')', ',', '=', '\'', '"'];
