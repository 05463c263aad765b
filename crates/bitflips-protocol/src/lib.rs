//! Client-request vocabulary shared by instrumented programs and the
//! bitflips SEU engine.
//!
//! This crate defines the request codes, the six-word argument block, and
//! the element-type / layout flag words an instrumented program uses to
//! tell the engine which memory is susceptible to Single Event Upsets.
//! It is `no_std`-compatible with zero dependencies.
//!
//! # Transport
//!
//! The host framework hands the engine a block of six machine words for
//! every client request:
//!
//! ```text
//! Word  Field
//! ────  ──────────────────────────────
//! 0     request code (tool_base('B','F') + n)
//! 1     start address of the region
//! 2     rows
//! 3     cols
//! 4     guest address of a NUL-terminated description
//! 5     element type | layout flags
//! ```
//!
//! `ON` / `OFF` ignore words 1..5, `MEM_OFF` only reads word 1 (word 4
//! may still carry the description for logging).

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

// ═══════════════════════════════════════════════════════════════════════
//  Request codes
// ═══════════════════════════════════════════════════════════════════════

/// Compute the base request code owned by the tool identified by `a`, `b`.
pub const fn tool_base(a: u8, b: u8) -> u64 {
    ((a as u64) << 24) | ((b as u64) << 16)
}

/// Whether `code` belongs to the tool identified by `a`, `b`.
pub const fn is_tool_request(a: u8, b: u8, code: u64) -> bool {
    (code & 0xFFFF_0000) == tool_base(a, b)
}

/// Base code for every bitflips request.
pub const BITFLIPS_BASE: u64 = tool_base(b'B', b'F');

/// Arm fault injection.
pub const REQ_ON: u64 = BITFLIPS_BASE;

/// Disarm fault injection.
pub const REQ_OFF: u64 = BITFLIPS_BASE + 1;

/// Register a memory region as susceptible to SEUs.
pub const REQ_MEM_ON: u64 = BITFLIPS_BASE + 2;

/// Unregister the most recently registered region starting at an address.
pub const REQ_MEM_OFF: u64 = BITFLIPS_BASE + 3;

/// Number of words in a request argument block.
pub const REQUEST_WORDS: usize = 6;

/// Maximum number of description bytes read from guest memory.
pub const DESCRIPTION_MAX: usize = 256;

// ═══════════════════════════════════════════════════════════════════════
//  Status words
// ═══════════════════════════════════════════════════════════════════════

/// Request handled.
pub const STATUS_OK: u64 = 0;

/// Request code belongs to this tool but is not one it understands.
pub const STATUS_UNKNOWN: u64 = 1;

// ═══════════════════════════════════════════════════════════════════════
//  Element type and layout flags
// ═══════════════════════════════════════════════════════════════════════

pub const TYPE_CHAR: u32 = 1;
pub const TYPE_UCHAR: u32 = 2;
pub const TYPE_SHORT: u32 = 4;
pub const TYPE_USHORT: u32 = 8;
pub const TYPE_INT: u32 = 16;
pub const TYPE_UINT: u32 = 32;
pub const TYPE_LONG: u32 = 64;
pub const TYPE_ULONG: u32 = 128;
pub const TYPE_FLOAT: u32 = 256;
pub const TYPE_DOUBLE: u32 = 512;

/// Row-major matrix layout.
pub const LAYOUT_ROW_MAJOR: u32 = 1024;

/// Column-major matrix layout.
pub const LAYOUT_COL_MAJOR: u32 = 2048;

// The layout bits must sit above every type bit so the two can be OR-ed.
const _: () = assert!(TYPE_DOUBLE < LAYOUT_ROW_MAJOR);
const _: () = assert!(LAYOUT_ROW_MAJOR.is_power_of_two());

/// Split a combined flag word into `(type_code, layout_bits)`.
pub const fn split_flags(flags: u32) -> (u32, u32) {
    (
        flags & (LAYOUT_ROW_MAJOR - 1),
        flags & (LAYOUT_ROW_MAJOR | LAYOUT_COL_MAJOR),
    )
}

/// Element type of a registered region.
///
/// `Long` / `ULong` are host words (8 bytes on the 64-bit hosts the
/// engine supports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl ElementType {
    /// Every element type, in flag order.
    pub const ALL: [ElementType; 10] = [
        ElementType::Char,
        ElementType::UChar,
        ElementType::Short,
        ElementType::UShort,
        ElementType::Int,
        ElementType::UInt,
        ElementType::Long,
        ElementType::ULong,
        ElementType::Float,
        ElementType::Double,
    ];

    /// Decode a type code.  Returns `None` for unknown or combined codes.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            TYPE_CHAR => Some(ElementType::Char),
            TYPE_UCHAR => Some(ElementType::UChar),
            TYPE_SHORT => Some(ElementType::Short),
            TYPE_USHORT => Some(ElementType::UShort),
            TYPE_INT => Some(ElementType::Int),
            TYPE_UINT => Some(ElementType::UInt),
            TYPE_LONG => Some(ElementType::Long),
            TYPE_ULONG => Some(ElementType::ULong),
            TYPE_FLOAT => Some(ElementType::Float),
            TYPE_DOUBLE => Some(ElementType::Double),
            _ => None,
        }
    }

    /// The flag word for this type.
    pub const fn code(self) -> u32 {
        match self {
            ElementType::Char => TYPE_CHAR,
            ElementType::UChar => TYPE_UCHAR,
            ElementType::Short => TYPE_SHORT,
            ElementType::UShort => TYPE_USHORT,
            ElementType::Int => TYPE_INT,
            ElementType::UInt => TYPE_UINT,
            ElementType::Long => TYPE_LONG,
            ElementType::ULong => TYPE_ULONG,
            ElementType::Float => TYPE_FLOAT,
            ElementType::Double => TYPE_DOUBLE,
        }
    }

    /// Storage width of one element in bytes.
    pub const fn width_bytes(self) -> u32 {
        match self {
            ElementType::Char | ElementType::UChar => 1,
            ElementType::Short | ElementType::UShort => 2,
            ElementType::Int | ElementType::UInt | ElementType::Float => 4,
            ElementType::Long | ElementType::ULong | ElementType::Double => 8,
        }
    }

    /// Whether the element is an IEEE-754 value.
    pub const fn is_float(self) -> bool {
        matches!(self, ElementType::Float | ElementType::Double)
    }

    /// Short C-style name.
    pub const fn name(self) -> &'static str {
        match self {
            ElementType::Char => "char",
            ElementType::UChar => "uchar",
            ElementType::Short => "short",
            ElementType::UShort => "ushort",
            ElementType::Int => "int",
            ElementType::UInt => "uint",
            ElementType::Long => "long",
            ElementType::ULong => "ulong",
            ElementType::Float => "float",
            ElementType::Double => "double",
        }
    }

    /// Parse a name produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Matrix layout of a registered region.
///
/// Anything other than exactly one of the two layout bits is kept as
/// `Unspecified` with the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    RowMajor,
    ColMajor,
    Unspecified(u32),
}

impl Layout {
    /// Decode the layout bits of a flag word.
    pub const fn from_bits(bits: u32) -> Self {
        match bits {
            LAYOUT_ROW_MAJOR => Layout::RowMajor,
            LAYOUT_COL_MAJOR => Layout::ColMajor,
            other => Layout::Unspecified(other),
        }
    }

    /// The flag bits for this layout.
    pub const fn bits(self) -> u32 {
        match self {
            Layout::RowMajor => LAYOUT_ROW_MAJOR,
            Layout::ColMajor => LAYOUT_COL_MAJOR,
            Layout::Unspecified(bits) => bits,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Requests
// ═══════════════════════════════════════════════════════════════════════

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Arm fault injection.
    On,
    /// Disarm fault injection.
    Off,
    /// Register a region.
    MemOn {
        start: u64,
        rows: u64,
        cols: u64,
        desc_ptr: u64,
        flags: u32,
    },
    /// Unregister a region by start address.
    MemOff { start: u64, desc_ptr: u64 },
}

impl Request {
    /// Decode an argument block.
    ///
    /// Returns `None` if the code does not belong to bitflips or is not a
    /// known bitflips request.
    pub const fn decode(args: &[u64; REQUEST_WORDS]) -> Option<Self> {
        if !is_tool_request(b'B', b'F', args[0]) {
            return None;
        }
        match args[0] {
            REQ_ON => Some(Request::On),
            REQ_OFF => Some(Request::Off),
            REQ_MEM_ON => Some(Request::MemOn {
                start: args[1],
                rows: args[2],
                cols: args[3],
                desc_ptr: args[4],
                flags: args[5] as u32,
            }),
            REQ_MEM_OFF => Some(Request::MemOff {
                start: args[1],
                desc_ptr: args[4],
            }),
            _ => None,
        }
    }

    /// Encode into an argument block.
    pub const fn encode(&self) -> [u64; REQUEST_WORDS] {
        match *self {
            Request::On => [REQ_ON, 0, 0, 0, 0, 0],
            Request::Off => [REQ_OFF, 0, 0, 0, 0, 0],
            Request::MemOn {
                start,
                rows,
                cols,
                desc_ptr,
                flags,
            } => [REQ_MEM_ON, start, rows, cols, desc_ptr, flags as u64],
            Request::MemOff { start, desc_ptr } => [REQ_MEM_OFF, start, 0, 0, desc_ptr, 0],
        }
    }

    /// The request code.
    pub const fn code(&self) -> u64 {
        match self {
            Request::On => REQ_ON,
            Request::Off => REQ_OFF,
            Request::MemOn { .. } => REQ_MEM_ON,
            Request::MemOff { .. } => REQ_MEM_OFF,
        }
    }
}

/// Build a `MemOn` request for a typed matrix.
pub const fn mem_on(
    start: u64,
    rows: u64,
    cols: u64,
    desc_ptr: u64,
    element: ElementType,
    layout: Layout,
) -> Request {
    Request::MemOn {
        start,
        rows,
        cols,
        desc_ptr,
        flags: element.code() | layout.bits(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Description decoding
// ═══════════════════════════════════════════════════════════════════════

#[cfg(feature = "std")]
extern crate alloc;

/// Decode a description buffer read from guest memory.
///
/// Stops at the first NUL (or at [`DESCRIPTION_MAX`] bytes); invalid UTF-8
/// is replaced lossily.
#[cfg(feature = "std")]
pub fn decode_description(buf: &[u8]) -> alloc::string::String {
    let limit = buf.len().min(DESCRIPTION_MAX);
    let end = buf[..limit].iter().position(|&b| b == 0).unwrap_or(limit);
    alloc::string::String::from_utf8_lossy(&buf[..end]).into_owned()
}
