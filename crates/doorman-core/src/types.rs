use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// One of the two reader data lines.
///
/// Line A carries `0` bits (DATA0, green wire), line B carries `1` bits
/// (DATA1, white wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Line {
    A,
    B,
}

impl Line {
    /// Both lines, in index order.
    pub const ALL: [Line; 2] = [Line::A, Line::B];

    /// Bit value an edge on this line contributes to a frame.
    #[inline]
    #[must_use]
    pub fn bit(self) -> u64 {
        match self {
            Line::A => 0,
            Line::B => 1,
        }
    }

    /// Array index for per-line bookkeeping.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Line::A => 0,
            Line::B => 1,
        }
    }

    /// Line that carries the given bit value.
    #[inline]
    #[must_use]
    pub fn for_bit(bit: bool) -> Self {
        if bit { Line::B } else { Line::A }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Line::A => write!(f, "A"),
            Line::B => write!(f, "B"),
        }
    }
}

/// A single falling edge observed on a data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub line: Line,
    pub at: Instant,
}

impl EdgeEvent {
    pub fn new(line: Line, at: Instant) -> Self {
        Self { line, at }
    }
}

/// A completed run of bits from the signal decoder.
///
/// The first bit received is the most significant bit of `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitFrame {
    pub bit_count: u32,
    pub value: u64,
}

impl BitFrame {
    pub fn new(bit_count: u32, value: u64) -> Self {
        Self { bit_count, value }
    }

    /// Bits in transmission order, most significant first.
    ///
    /// Frames wider than 64 bits only keep their trailing 64 bits of value;
    /// missing leading bits read as `false`.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.bit_count).rev().map(move |shift| {
            if shift >= u64::BITS {
                false
            } else {
                (self.value >> shift) & 1 == 1
            }
        })
    }
}

impl fmt::Display for BitFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} bits ({:#x})", self.bit_count, self.value)
    }
}

/// Credential family a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Presented card, identified by its canonical hex UID.
    Card,
    /// Code typed on the keypad between two delimiters.
    Code,
}

impl TokenKind {
    /// Parse the credential-store spelling (`"card"` / `"code"`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "card" => Some(TokenKind::Card),
            "code" => Some(TokenKind::Code),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Card => "card",
            TokenKind::Code => "code",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized token used for credential lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalToken {
    value: String,
    kind: TokenKind,
}

impl CanonicalToken {
    /// Token from a canonicalized card frame.
    pub fn card(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: TokenKind::Card,
        }
    }

    /// Token from a completed keypad code.
    pub fn code(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: TokenKind::Code,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl fmt::Display for CanonicalToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
