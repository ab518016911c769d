//! Tokenizer for BBC BASIC source code
//!
//! Converts a source line into the byte encoding the executor walks.
//! Keywords become single bytes at 0x80 and above, or a prefix byte
//! (0xC6, 0xC7, 0xC8) followed by a second byte. Literals are encoded
//! with a marker byte and a fixed or length-prefixed payload. Names,
//! punctuation and single-character operators stay as ASCII. Spaces are
//! dropped except inside strings and the raw text after `REM` and `DATA`.

use crate::error::{ErrorKind, Result};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Largest line number a program may use
pub const MAX_LINE_NUMBER: u32 = 65279;

// Literal and operator markers (below 0x20, never produced by source text)
pub const TOK_INT: u8 = 0x01;
pub const TOK_INT64: u8 = 0x02;
pub const TOK_FLOAT: u8 = 0x03;
pub const TOK_STRCON: u8 = 0x04;
pub const TOK_LE: u8 = 0x05;
pub const TOK_GE: u8 = 0x06;
pub const TOK_NE: u8 = 0x07;
pub const TOK_LSL: u8 = 0x08;
pub const TOK_ASR: u8 = 0x09;
pub const TOK_LSR: u8 = 0x0A;
pub const TOK_PLUSAB: u8 = 0x0B;
pub const TOK_MINUSAB: u8 = 0x0C;
/// End of line
pub const TOK_EOL: u8 = 0x0D;
/// `|.` floating point indirection
pub const TOK_FLTIND: u8 = 0x0E;

// Operators and connectives (0x80-0x8C)
pub const TOK_AND: u8 = 0x80;
pub const TOK_DIV: u8 = 0x81;
pub const TOK_EOR: u8 = 0x82;
pub const TOK_MOD: u8 = 0x83;
pub const TOK_OR: u8 = 0x84;
pub const TOK_ERROR: u8 = 0x85;
pub const TOK_LINE: u8 = 0x86;
pub const TOK_OFF: u8 = 0x87;
pub const TOK_STEP: u8 = 0x88;
pub const TOK_SPC: u8 = 0x89;
pub const TOK_TAB: u8 = 0x8A;
pub const TOK_ELSE: u8 = 0x8B;
pub const TOK_THEN: u8 = 0x8C;
/// Line number reference, followed by two bytes
pub const TOK_LINENUM: u8 = 0x8D;

// Functions and pseudo-variables (0x8E-0xC5)
pub const TOK_OPENIN: u8 = 0x8E;
pub const TOK_PTR: u8 = 0x8F;
pub const TOK_PAGE: u8 = 0x90;
pub const TOK_TIME: u8 = 0x91;
pub const TOK_LOMEM: u8 = 0x92;
pub const TOK_HIMEM: u8 = 0x93;
pub const TOK_ABS: u8 = 0x94;
pub const TOK_ACS: u8 = 0x95;
pub const TOK_ADVAL: u8 = 0x96;
pub const TOK_ASC: u8 = 0x97;
pub const TOK_ASN: u8 = 0x98;
pub const TOK_ATN: u8 = 0x99;
pub const TOK_BGET: u8 = 0x9A;
pub const TOK_COS: u8 = 0x9B;
pub const TOK_COUNT: u8 = 0x9C;
pub const TOK_DEG: u8 = 0x9D;
pub const TOK_ERL: u8 = 0x9E;
pub const TOK_ERR: u8 = 0x9F;
pub const TOK_EVAL: u8 = 0xA0;
pub const TOK_EXP: u8 = 0xA1;
pub const TOK_EXT: u8 = 0xA2;
pub const TOK_FALSE: u8 = 0xA3;
pub const TOK_FN: u8 = 0xA4;
pub const TOK_GET: u8 = 0xA5;
pub const TOK_INKEY: u8 = 0xA6;
pub const TOK_INSTR: u8 = 0xA7;
pub const TOK_INT_FN: u8 = 0xA8;
pub const TOK_LEN: u8 = 0xA9;
pub const TOK_LN: u8 = 0xAA;
pub const TOK_LOG: u8 = 0xAB;
pub const TOK_NOT: u8 = 0xAC;
pub const TOK_OPENOUT: u8 = 0xAD;
pub const TOK_OPENUP: u8 = 0xAE;
pub const TOK_PI: u8 = 0xAF;
pub const TOK_POINT: u8 = 0xB0;
pub const TOK_POS: u8 = 0xB1;
pub const TOK_RAD: u8 = 0xB2;
pub const TOK_RND: u8 = 0xB3;
pub const TOK_SGN: u8 = 0xB4;
pub const TOK_SIN: u8 = 0xB5;
pub const TOK_SQR: u8 = 0xB6;
pub const TOK_TAN: u8 = 0xB7;
pub const TOK_TO: u8 = 0xB8;
pub const TOK_TRUE: u8 = 0xB9;
pub const TOK_USR: u8 = 0xBA;
pub const TOK_VAL: u8 = 0xBB;
pub const TOK_VPOS: u8 = 0xBC;
pub const TOK_CHRS: u8 = 0xBD;
pub const TOK_GETS: u8 = 0xBE;
pub const TOK_INKEYS: u8 = 0xBF;
pub const TOK_LEFTS: u8 = 0xC0;
pub const TOK_MIDS: u8 = 0xC1;
pub const TOK_RIGHTS: u8 = 0xC2;
pub const TOK_STRS: u8 = 0xC3;
pub const TOK_STRINGS: u8 = 0xC4;
pub const TOK_EOF: u8 = 0xC5;

// Prefix bytes for two-byte tokens
pub const PREFIX_FUNCTION: u8 = 0xC6;
pub const PREFIX_COMMAND: u8 = 0xC7;
pub const PREFIX_STATEMENT: u8 = 0xC8;

// Statements (0xD4-0xFF)
pub const TOK_SOUND: u8 = 0xD4;
pub const TOK_BPUT: u8 = 0xD5;
pub const TOK_CALL: u8 = 0xD6;
pub const TOK_CHAIN: u8 = 0xD7;
pub const TOK_CLEAR: u8 = 0xD8;
pub const TOK_CLOSE: u8 = 0xD9;
pub const TOK_CLG: u8 = 0xDA;
pub const TOK_CLS: u8 = 0xDB;
pub const TOK_DATA: u8 = 0xDC;
pub const TOK_DEF: u8 = 0xDD;
pub const TOK_DIM: u8 = 0xDE;
pub const TOK_DRAW: u8 = 0xDF;
pub const TOK_END: u8 = 0xE0;
pub const TOK_ENDPROC: u8 = 0xE1;
pub const TOK_ENVELOPE: u8 = 0xE2;
pub const TOK_FOR: u8 = 0xE3;
pub const TOK_GOSUB: u8 = 0xE4;
pub const TOK_GOTO: u8 = 0xE5;
pub const TOK_GCOL: u8 = 0xE6;
pub const TOK_IF: u8 = 0xE7;
pub const TOK_INPUT: u8 = 0xE8;
pub const TOK_LET: u8 = 0xE9;
pub const TOK_LOCAL: u8 = 0xEA;
pub const TOK_MODE: u8 = 0xEB;
pub const TOK_MOVE: u8 = 0xEC;
pub const TOK_NEXT: u8 = 0xED;
pub const TOK_ON: u8 = 0xEE;
pub const TOK_VDU: u8 = 0xEF;
pub const TOK_PLOT: u8 = 0xF0;
pub const TOK_PRINT: u8 = 0xF1;
pub const TOK_PROC: u8 = 0xF2;
pub const TOK_READ: u8 = 0xF3;
pub const TOK_REM: u8 = 0xF4;
pub const TOK_REPEAT: u8 = 0xF5;
pub const TOK_REPORT: u8 = 0xF6;
pub const TOK_RESTORE: u8 = 0xF7;
pub const TOK_RETURN: u8 = 0xF8;
pub const TOK_RUN: u8 = 0xF9;
pub const TOK_STOP: u8 = 0xFA;
pub const TOK_COLOUR: u8 = 0xFB;
pub const TOK_TRACE: u8 = 0xFC;
pub const TOK_UNTIL: u8 = 0xFD;
pub const TOK_WIDTH: u8 = 0xFE;
pub const TOK_OSCLI: u8 = 0xFF;

// Second bytes after PREFIX_FUNCTION
pub const XFN_REPORTS: u8 = 0x8E;
pub const XFN_TOP: u8 = 0x8F;

// Second bytes after PREFIX_STATEMENT
pub const XST_CIRCLE: u8 = 0x8F;
pub const XST_ORIGIN: u8 = 0x91;
pub const XST_RECTANGLE: u8 = 0x93;
pub const XST_SWAP: u8 = 0x94;
pub const XST_WHILE: u8 = 0x95;
pub const XST_MOUSE: u8 = 0x97;
pub const XST_QUIT: u8 = 0x98;
pub const XST_SYS: u8 = 0x99;
pub const XST_INSTALL: u8 = 0x9A;
pub const XST_LIBRARY: u8 = 0x9B;
pub const XST_ELLIPSE: u8 = 0x9D;
pub const XST_BEATS: u8 = 0x9E;
pub const XST_TEMPO: u8 = 0x9F;
pub const XST_VOICES: u8 = 0xA0;
pub const XST_VOICE: u8 = 0xA1;
pub const XST_STEREO: u8 = 0xA2;
pub const XST_ENDWHILE: u8 = 0xA4;
pub const XST_ENDIF: u8 = 0xA5;
pub const XST_EXIT: u8 = 0xA6;

/// A complete tokenized line with line number and token bytes
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedLine {
    pub line_number: Option<u16>,
    /// Token bytes, without the end-of-line marker
    pub tokens: Vec<u8>,
}

impl TokenizedLine {
    /// Create a new tokenized line
    pub fn new(line_number: Option<u16>, tokens: Vec<u8>) -> Self {
        Self { line_number, tokens }
    }

    /// Create an empty tokenized line
    pub fn empty() -> Self {
        Self {
            line_number: None,
            tokens: Vec::new(),
        }
    }
}

// Main keywords, one byte each
const MAIN_KEYWORDS: &[(&str, u8)] = &[
    // Operators and connectives (0x80-0x8C)
    ("AND", TOK_AND),
    ("DIV", TOK_DIV),
    ("EOR", TOK_EOR),
    ("MOD", TOK_MOD),
    ("OR", TOK_OR),
    ("ERROR", TOK_ERROR),
    ("LINE", TOK_LINE),
    ("OFF", TOK_OFF),
    ("STEP", TOK_STEP),
    ("SPC", TOK_SPC),
    ("TAB(", TOK_TAB),
    ("ELSE", TOK_ELSE),
    ("THEN", TOK_THEN),
    // Functions and pseudo-variables (0x8E-0xC5)
    ("OPENIN", TOK_OPENIN),
    ("PTR", TOK_PTR),
    ("PAGE", TOK_PAGE),
    ("TIME", TOK_TIME),
    ("LOMEM", TOK_LOMEM),
    ("HIMEM", TOK_HIMEM),
    ("ABS", TOK_ABS),
    ("ACS", TOK_ACS),
    ("ADVAL", TOK_ADVAL),
    ("ASC", TOK_ASC),
    ("ASN", TOK_ASN),
    ("ATN", TOK_ATN),
    ("BGET", TOK_BGET),
    ("COS", TOK_COS),
    ("COUNT", TOK_COUNT),
    ("DEG", TOK_DEG),
    ("ERL", TOK_ERL),
    ("ERR", TOK_ERR),
    ("EVAL", TOK_EVAL),
    ("EXP", TOK_EXP),
    ("EXT", TOK_EXT),
    ("FALSE", TOK_FALSE),
    ("FN", TOK_FN),
    ("GET", TOK_GET),
    ("INKEY", TOK_INKEY),
    ("INSTR(", TOK_INSTR),
    ("INT", TOK_INT_FN),
    ("LEN", TOK_LEN),
    ("LN", TOK_LN),
    ("LOG", TOK_LOG),
    ("NOT", TOK_NOT),
    ("OPENOUT", TOK_OPENOUT),
    ("OPENUP", TOK_OPENUP),
    ("PI", TOK_PI),
    ("POINT(", TOK_POINT),
    ("POS", TOK_POS),
    ("RAD", TOK_RAD),
    ("RND", TOK_RND),
    ("SGN", TOK_SGN),
    ("SIN", TOK_SIN),
    ("SQR", TOK_SQR),
    ("TAN", TOK_TAN),
    ("TO", TOK_TO),
    ("TRUE", TOK_TRUE),
    ("USR", TOK_USR),
    ("VAL", TOK_VAL),
    ("VPOS", TOK_VPOS),
    ("CHR$", TOK_CHRS),
    ("GET$", TOK_GETS),
    ("INKEY$", TOK_INKEYS),
    ("LEFT$(", TOK_LEFTS),
    ("MID$(", TOK_MIDS),
    ("RIGHT$(", TOK_RIGHTS),
    ("STR$", TOK_STRS),
    ("STRING$(", TOK_STRINGS),
    ("EOF", TOK_EOF),
    // Statements (0xD4-0xFF)
    ("SOUND", TOK_SOUND),
    ("BPUT", TOK_BPUT),
    ("CALL", TOK_CALL),
    ("CHAIN", TOK_CHAIN),
    ("CLEAR", TOK_CLEAR),
    ("CLOSE", TOK_CLOSE),
    ("CLG", TOK_CLG),
    ("CLS", TOK_CLS),
    ("DATA", TOK_DATA),
    ("DEF", TOK_DEF),
    ("DIM", TOK_DIM),
    ("DRAW", TOK_DRAW),
    ("END", TOK_END),
    ("ENDPROC", TOK_ENDPROC),
    ("ENVELOPE", TOK_ENVELOPE),
    ("FOR", TOK_FOR),
    ("GOSUB", TOK_GOSUB),
    ("GOTO", TOK_GOTO),
    ("GCOL", TOK_GCOL),
    ("IF", TOK_IF),
    ("INPUT", TOK_INPUT),
    ("LET", TOK_LET),
    ("LOCAL", TOK_LOCAL),
    ("MODE", TOK_MODE),
    ("MOVE", TOK_MOVE),
    ("NEXT", TOK_NEXT),
    ("ON", TOK_ON),
    ("VDU", TOK_VDU),
    ("PLOT", TOK_PLOT),
    ("PRINT", TOK_PRINT),
    ("PROC", TOK_PROC),
    ("READ", TOK_READ),
    ("REM", TOK_REM),
    ("REPEAT", TOK_REPEAT),
    ("REPORT", TOK_REPORT),
    ("RESTORE", TOK_RESTORE),
    ("RETURN", TOK_RETURN),
    ("RUN", TOK_RUN),
    ("STOP", TOK_STOP),
    ("COLOUR", TOK_COLOUR),
    ("TRACE", TOK_TRACE),
    ("UNTIL", TOK_UNTIL),
    ("WIDTH", TOK_WIDTH),
    ("OSCLI", TOK_OSCLI),
];

// Extended functions (0xC6 prefix)
const EXTENDED_FUNCTIONS: &[(&str, u8)] = &[("REPORT$", XFN_REPORTS), ("TOP", XFN_TOP)];

// Extended commands (0xC7 prefix), rejected inside programs
const EXTENDED_COMMANDS: &[(&str, u8)] = &[
    ("AUTO", 0x8F),
    ("DELETE", 0x91),
    ("EDIT", 0x92),
    ("LIST", 0x94),
    ("LOAD", 0x95),
    ("NEW", 0x97),
    ("OLD", 0x98),
    ("RENUMBER", 0x99),
    ("SAVE", 0x9A),
];

// Extended statements (0xC8 prefix)
const EXTENDED_STATEMENTS: &[(&str, u8)] = &[
    ("CIRCLE", XST_CIRCLE),
    ("ORIGIN", XST_ORIGIN),
    ("RECTANGLE", XST_RECTANGLE),
    ("SWAP", XST_SWAP),
    ("WHILE", XST_WHILE),
    ("MOUSE", XST_MOUSE),
    ("QUIT", XST_QUIT),
    ("SYS", XST_SYS),
    ("INSTALL", XST_INSTALL),
    ("LIBRARY", XST_LIBRARY),
    ("ELLIPSE", XST_ELLIPSE),
    ("BEATS", XST_BEATS),
    ("TEMPO", XST_TEMPO),
    ("VOICES", XST_VOICES),
    ("VOICE", XST_VOICE),
    ("STEREO", XST_STEREO),
    ("ENDWHILE", XST_ENDWHILE),
    ("ENDIF", XST_ENDIF),
    ("EXIT", XST_EXIT),
];

/// Keywords that may be glued to a following number (`GOTO100`, `TO10`)
const NUMERIC_GLUE: &[&str] = &["GOTO", "GOSUB", "THEN", "ELSE", "RESTORE", "TO", "STEP"];

struct KeywordMaps {
    encode: HashMap<&'static str, Vec<u8>>,
    decode: HashMap<Vec<u8>, &'static str>,
}

fn keyword_maps() -> &'static KeywordMaps {
    static MAPS: OnceLock<KeywordMaps> = OnceLock::new();
    MAPS.get_or_init(|| {
        let encode = create_keyword_maps();
        let decode = encode.iter().map(|(&k, v)| (v.clone(), k)).collect();
        KeywordMaps { encode, decode }
    })
}

/// Create keyword lookup tables for tokenization
pub fn create_keyword_maps() -> HashMap<&'static str, Vec<u8>> {
    let mut keywords = HashMap::new();
    for &(keyword, token) in MAIN_KEYWORDS {
        keywords.insert(keyword, vec![token]);
    }
    for &(keyword, token) in EXTENDED_FUNCTIONS {
        keywords.insert(keyword, vec![PREFIX_FUNCTION, token]);
    }
    for &(keyword, token) in EXTENDED_COMMANDS {
        keywords.insert(keyword, vec![PREFIX_COMMAND, token]);
    }
    for &(keyword, token) in EXTENDED_STATEMENTS {
        keywords.insert(keyword, vec![PREFIX_STATEMENT, token]);
    }
    keywords
}

/// Name of the keyword starting at `bytes[0]`, if any
pub fn keyword_name(bytes: &[u8]) -> Option<&'static str> {
    let len = token_len(bytes, 0);
    bytes
        .get(..len)
        .and_then(|token| keyword_maps().decode.get(token).copied())
}

/// Length in bytes of the token starting at `pos`, including its payload
pub fn token_len(bytes: &[u8], pos: usize) -> usize {
    match bytes.get(pos) {
        Some(&TOK_INT) => 5,
        Some(&TOK_INT64) | Some(&TOK_FLOAT) => 9,
        Some(&TOK_LINENUM) => 3,
        Some(&TOK_STRCON) => {
            let lo = bytes.get(pos + 1).copied().unwrap_or(0) as usize;
            let hi = bytes.get(pos + 2).copied().unwrap_or(0) as usize;
            3 + (lo | hi << 8)
        }
        Some(&PREFIX_FUNCTION) | Some(&PREFIX_COMMAND) | Some(&PREFIX_STATEMENT) => 2,
        _ => 1,
    }
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'`'
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'`'
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    out: Vec<u8>,
    /// A line number may follow (after GOTO, GOSUB, THEN, ELSE, RESTORE)
    expect_line: bool,
    /// The previous token was a line number, so a comma keeps `expect_line`
    after_line: bool,
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> u8 {
        self.src.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn run(&mut self) -> Result<()> {
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b' ' || c == b'\t' {
                self.pos += 1;
                continue;
            }
            let was_line = std::mem::take(&mut self.after_line);
            let expecting = std::mem::take(&mut self.expect_line);
            match c {
                b'"' => self.string_literal()?,
                b'0'..=b'9' => self.number(expecting)?,
                b'.' if self.peek(1).is_ascii_digit() => self.number(false)?,
                b'&' => self.radix_literal(16)?,
                b'%' if matches!(self.peek(1), b'0' | b'1') => self.radix_literal(2)?,
                b'@' if self.peek(1) == b'%' => {
                    self.out.extend_from_slice(b"@%");
                    self.pos += 2;
                }
                c if is_name_start(c) => {
                    if self.word()? {
                        return Ok(());
                    }
                }
                b'<' => self.operator(&[(b"<=", TOK_LE), (b"<>", TOK_NE), (b"<<", TOK_LSL)]),
                b'>' => self.operator(&[(b">=", TOK_GE), (b">>>", TOK_LSR), (b">>", TOK_ASR)]),
                b'+' => self.operator(&[(b"+=", TOK_PLUSAB)]),
                b'-' => self.operator(&[(b"-=", TOK_MINUSAB)]),
                b'|' => self.operator(&[(b"|.", TOK_FLTIND)]),
                b',' => {
                    self.out.push(c);
                    self.pos += 1;
                    self.expect_line = was_line;
                }
                c if c.is_ascii() && !c.is_ascii_control() => {
                    self.out.push(c);
                    self.pos += 1;
                }
                _ => return Err(ErrorKind::Syntax.into()),
            }
        }
        Ok(())
    }

    /// Emit the longest matching two- or three-character operator, or the
    /// single character itself
    fn operator(&mut self, table: &[(&[u8], u8)]) {
        let rest = &self.src[self.pos..];
        let best = table
            .iter()
            .filter(|(text, _)| rest.starts_with(text))
            .max_by_key(|(text, _)| text.len());
        match best {
            Some(&(text, token)) => {
                self.out.push(token);
                self.pos += text.len();
            }
            None => {
                self.out.push(rest[0]);
                self.pos += 1;
            }
        }
    }

    fn string_literal(&mut self) -> Result<()> {
        self.pos += 1;
        let mut text = Vec::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b'"' {
                if self.peek(1) == b'"' {
                    text.push(b'"');
                    self.pos += 2;
                    continue;
                }
                self.pos += 1;
                break;
            }
            text.push(c);
            self.pos += 1;
        }
        let len = u16::try_from(text.len()).map_err(|_| ErrorKind::StringLen)?;
        self.out.push(TOK_STRCON);
        self.out.extend_from_slice(&len.to_le_bytes());
        self.out.extend_from_slice(&text);
        Ok(())
    }

    fn number(&mut self, line_number: bool) -> Result<()> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek(0).is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek(0) == b'.' {
            is_float = true;
            self.pos += 1;
            while self.peek(0).is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.peek(0) == b'E' {
            let digit_at = if matches!(self.peek(1), b'+' | b'-') { 2 } else { 1 };
            if self.peek(digit_at).is_ascii_digit() {
                is_float = true;
                self.pos += digit_at;
                while self.peek(0).is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).map_err(|_| ErrorKind::Syntax)?;

        if line_number && !is_float {
            let n: u32 = text.parse().map_err(|_| ErrorKind::LineNo)?;
            if n > MAX_LINE_NUMBER {
                return Err(ErrorKind::LineNo.into());
            }
            self.out.push(TOK_LINENUM);
            self.out.extend_from_slice(&(n as u16).to_le_bytes());
            self.after_line = true;
            return Ok(());
        }
        if !is_float {
            if let Ok(v) = text.parse::<i64>() {
                self.emit_integer(v);
                return Ok(());
            }
        }
        let v: f64 = text.parse().map_err(|_| ErrorKind::Syntax)?;
        self.out.push(TOK_FLOAT);
        self.out.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn emit_integer(&mut self, v: i64) {
        match i32::try_from(v) {
            Ok(small) => {
                self.out.push(TOK_INT);
                self.out.extend_from_slice(&small.to_le_bytes());
            }
            Err(_) => {
                self.out.push(TOK_INT64);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    /// `&hex` or `%binary`; up to 32 bits wraps to a signed 32-bit value
    fn radix_literal(&mut self, radix: u32) -> Result<()> {
        self.pos += 1;
        let start = self.pos;
        while (self.peek(0) as char).is_digit(radix) {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.src[start..self.pos]).map_err(|_| ErrorKind::Syntax)?;
        if digits.is_empty() {
            return Err(ErrorKind::Syntax.into());
        }
        let value = u64::from_str_radix(digits, radix).map_err(|_| ErrorKind::NumRange)?;
        match u32::try_from(value) {
            Ok(small) => self.emit_integer(small as i32 as i64),
            Err(_) => {
                self.out.push(TOK_INT64);
                self.out.extend_from_slice(&(value as i64).to_le_bytes());
            }
        }
        Ok(())
    }

    /// Tokenise a run of name characters. Returns true when the rest of the
    /// line has been consumed as raw text (`REM`, `DATA`).
    fn word(&mut self) -> Result<bool> {
        let start = self.pos;
        let mut end = start;
        while self.src.get(end).copied().map_or(false, is_name_char) {
            end += 1;
        }
        let rest = &self.src[end..];
        if rest.starts_with(b"%%") {
            end += 2;
        } else if matches!(rest.first(), Some(b'%') | Some(b'&') | Some(b'$')) {
            end += 1;
        }
        let word = std::str::from_utf8(&self.src[start..end]).map_err(|_| ErrorKind::Syntax)?;
        let maps = keyword_maps();

        if self.src.get(end) == Some(&b'(') {
            let with_paren = format!("{}(", word);
            if let Some(token) = maps.encode.get(with_paren.as_str()) {
                self.out.extend_from_slice(token);
                self.pos = end + 1;
                return Ok(false);
            }
        }
        if let Some(token) = maps.encode.get(word) {
            self.out.extend_from_slice(token);
            self.pos = end;
            return Ok(self.after_keyword(token[0]));
        }
        for (prefix, token) in [("PROC", TOK_PROC), ("FN", TOK_FN)] {
            if word.len() > prefix.len() && word.starts_with(prefix) {
                self.out.push(token);
                self.out.extend_from_slice(&self.src[start + prefix.len()..end]);
                self.pos = end;
                return Ok(false);
            }
        }
        for glue in NUMERIC_GLUE {
            if let Some(digits) = word.strip_prefix(glue) {
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    let token = maps.encode.get(*glue).map_or(TOK_TO, |t| t[0]);
                    self.out.push(token);
                    self.pos = start + glue.len();
                    self.after_keyword(token);
                    return Ok(false);
                }
            }
        }
        self.out.extend_from_slice(word.as_bytes());
        self.pos = end;
        Ok(false)
    }

    fn after_keyword(&mut self, token: u8) -> bool {
        let qualifier = matches!(
            self.out.iter().rev().nth(1),
            Some(&TOK_LOCAL) | Some(&TOK_RESTORE)
        );
        match token {
            TOK_DATA if qualifier => false,
            TOK_REM | TOK_DATA => {
                self.out.extend_from_slice(&self.src[self.pos..]);
                self.pos = self.src.len();
                true
            }
            TOK_GOTO | TOK_GOSUB | TOK_THEN | TOK_ELSE | TOK_RESTORE => {
                self.expect_line = true;
                false
            }
            _ => false,
        }
    }
}

fn read_line_number(src: &[u8]) -> Result<(Option<u16>, usize)> {
    let digits = src.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Ok((None, 0));
    }
    let text = std::str::from_utf8(&src[..digits]).map_err(|_| ErrorKind::Syntax)?;
    let n: u32 = text.parse().map_err(|_| ErrorKind::LineNo)?;
    if n > MAX_LINE_NUMBER {
        return Err(ErrorKind::LineNo.into());
    }
    Ok((Some(n as u16), digits))
}

/// Tokenize a BBC BASIC source line
pub fn tokenize(source_line: &str) -> Result<TokenizedLine> {
    let src = source_line.trim_end_matches(['\r', '\n']).as_bytes();
    let leading = src.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    let (line_number, digits) = read_line_number(&src[leading..])?;

    let mut lexer = Lexer {
        src,
        pos: leading + digits,
        out: Vec::new(),
        expect_line: false,
        after_line: false,
    };
    lexer.run()?;
    Ok(TokenizedLine::new(line_number, lexer.out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<u8> {
        tokenize(text).unwrap().tokens
    }

    fn int(v: i32) -> Vec<u8> {
        let mut out = vec![TOK_INT];
        out.extend_from_slice(&v.to_le_bytes());
        out
    }

    #[test]
    fn test_tokenized_line_creation() {
        let line = TokenizedLine::new(Some(10), vec![TOK_PRINT]);
        assert_eq!(line.line_number, Some(10));
        assert_eq!(line.tokens.len(), 1);
        assert_eq!(TokenizedLine::empty().tokens.len(), 0);
    }

    #[test]
    fn test_keyword_maps_creation() {
        let keywords = create_keyword_maps();
        assert_eq!(keywords.get("PRINT"), Some(&vec![0xF1]));
        assert_eq!(keywords.get("FOR"), Some(&vec![0xE3]));
        assert_eq!(keywords.get("AND"), Some(&vec![0x80]));
        assert_eq!(keywords.get("WHILE"), Some(&vec![PREFIX_STATEMENT, XST_WHILE]));
        assert_eq!(keywords.get("LIST"), Some(&vec![PREFIX_COMMAND, 0x94]));
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(keyword_name(&[TOK_PRINT]), Some("PRINT"));
        assert_eq!(keyword_name(&[PREFIX_FUNCTION, XFN_TOP]), Some("TOP"));
        assert_eq!(keyword_name(b"x"), None);
    }

    #[test]
    fn test_line_number_and_spaces() {
        let line = tokenize("10 PRINT 3 + 4").unwrap();
        assert_eq!(line.line_number, Some(10));
        let mut expected = vec![TOK_PRINT];
        expected.extend(int(3));
        expected.push(b'+');
        expected.extend(int(4));
        assert_eq!(line.tokens, expected);
    }

    #[test]
    fn test_line_number_out_of_range() {
        assert_eq!(tokenize("70000 PRINT").unwrap_err().kind, ErrorKind::LineNo);
    }

    #[test]
    fn test_string_literal_with_doubled_quote() {
        let t = tokens(r#"PRINT "A""B""#);
        assert_eq!(t, vec![TOK_PRINT, TOK_STRCON, 3, 0, b'A', b'"', b'B']);
    }

    #[test]
    fn test_goto_line_numbers() {
        let t = tokens("GOTO 100");
        assert_eq!(t, vec![TOK_GOTO, TOK_LINENUM, 100, 0]);
        let t = tokens("ON x GOTO 10,20");
        assert_eq!(
            t,
            vec![TOK_ON, b'x', TOK_GOTO, TOK_LINENUM, 10, 0, b',', TOK_LINENUM, 20, 0]
        );
        assert_eq!(tokens("GOTO100"), vec![TOK_GOTO, TOK_LINENUM, 100, 0]);
    }

    #[test]
    fn test_names_and_suffixes() {
        assert_eq!(tokens("a%%=1")[..4], *b"a%%=");
        assert_eq!(tokens("b&=1")[..3], *b"b&=");
        assert_eq!(tokens("name$(3)")[..6], *b"name$(");
        assert_eq!(tokens("A%=@%"), b"A%=@%".to_vec());
    }

    #[test]
    fn test_proc_and_fn_names() {
        assert_eq!(tokens("PROCdraw(1)")[..6], [TOK_PROC, b'd', b'r', b'a', b'w', b'(']);
        assert_eq!(tokens("DEF FNsq(x)")[..5], [TOK_DEF, TOK_FN, b's', b'q', b'(']);
    }

    #[test]
    fn test_function_keywords_with_parenthesis() {
        assert_eq!(tokens("LEFT$(a$,1)")[0], TOK_LEFTS);
        assert_eq!(tokens("LEFT$(a$,1)")[1], b'a');
        assert_eq!(tokens("SIN(x)")[..2], [TOK_SIN, b'(']);
        assert_eq!(tokens("DIM(a(),1)")[..3], [TOK_DIM, b'(', b'a']);
    }

    #[test]
    fn test_two_character_operators() {
        assert_eq!(tokens("a<=b")[1], TOK_LE);
        assert_eq!(tokens("a<>b")[1], TOK_NE);
        assert_eq!(tokens("a>>>b")[1], TOK_LSR);
        assert_eq!(tokens("a>>b")[1], TOK_ASR);
        assert_eq!(tokens("a+=1")[1], TOK_PLUSAB);
        assert_eq!(tokens("|.p=1")[0], TOK_FLTIND);
    }

    #[test]
    fn test_hex_binary_and_float_literals() {
        assert_eq!(tokens("&FF"), int(255));
        assert_eq!(tokens("&FFFFFFFF"), int(-1));
        assert_eq!(tokens("%101"), int(5));
        // a bare leading number would be read as the line number
        let t = tokens("PRINT 1.5E3");
        assert_eq!(t[..2], [TOK_PRINT, TOK_FLOAT]);
        assert_eq!(f64::from_le_bytes(t[2..10].try_into().unwrap()), 1500.0);
        assert_eq!(tokens("PRINT 3000000000")[1], TOK_INT64);
    }

    #[test]
    fn test_rem_and_data_keep_raw_text() {
        let mut rem = vec![TOK_REM];
        rem.extend_from_slice(b"  hello");
        assert_eq!(tokens("REM  hello"), rem);
        let mut data = vec![TOK_DATA];
        data.extend_from_slice(b" 1, two");
        assert_eq!(tokens("DATA 1, two"), data);
    }

    #[test]
    fn test_local_data_is_tokenised() {
        assert_eq!(
            tokens("LOCAL DATA:PRINT"),
            vec![TOK_LOCAL, TOK_DATA, b':', TOK_PRINT]
        );
        assert_eq!(tokens("RESTORE DATA"), vec![TOK_RESTORE, TOK_DATA]);
    }

    #[test]
    fn test_keyword_glued_to_number() {
        let t = tokens("FOR I%=1TO10");
        let to = t.iter().position(|&b| b == TOK_TO).unwrap();
        assert_eq!(t[to + 1..], int(10)[..]);
    }

    #[test]
    fn test_token_lengths() {
        let t = tokens(r#"PRINT "AB";1"#);
        assert_eq!(token_len(&t, 0), 1);
        assert_eq!(token_len(&t, 1), 5);
        assert_eq!(token_len(&t, 7), 5);
        assert_eq!(token_len(&[PREFIX_STATEMENT, XST_WHILE], 0), 2);
    }
}
