use crate::objects::{dict_dictionary, dict_entry, dict_number, number, resolve};
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;
use tracing::debug;

/// Advance used to move the text matrix when a font carries no metrics.
const ESTIMATED_GLYPH_WIDTH: f64 = 500.0;
const DEFAULT_CID_WIDTH: f64 = 1000.0;
const MAX_RANGE_SPAN: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Code {
    pub value: u32,
    pub len: u8,
}

/// What the text interpreter needs to know about a font: how to split a
/// string into codes, how to turn codes into text, and how far each advances.
#[derive(Debug, Clone, Default)]
pub(crate) struct FontInfo {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    has_metrics: bool,
    to_unicode: HashMap<u32, String>,
}

impl FontInfo {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let subtype = dict_entry(doc, dict, b"Subtype")
            .and_then(|object| object.as_name().ok())
            .unwrap_or_default();

        let mut font = if subtype == b"Type0" {
            Self::load_composite(doc, dict)
        } else {
            Self::load_simple(doc, dict)
        };

        if let Some(stream) = dict_entry(doc, dict, b"ToUnicode").and_then(|o| o.as_stream().ok())
        {
            let data = stream.decompressed_content().unwrap_or_else(|_| stream.content.clone());
            font.to_unicode = parse_to_unicode(&data);
        }

        debug!(
            two_byte = font.two_byte,
            has_metrics = font.has_metrics,
            mapped = font.to_unicode.len(),
            "loaded font"
        );
        font
    }

    fn load_simple(doc: &Document, dict: &Dictionary) -> Self {
        let first_char = dict_number(doc, dict, b"FirstChar").unwrap_or(0.0).max(0.0) as u32;
        let widths: Vec<f64> = dict_entry(doc, dict, b"Widths")
            .and_then(|object| object.as_array().ok())
            .map(|array| {
                array.iter().map(|item| number(resolve(doc, item)).unwrap_or(0.0)).collect()
            })
            .unwrap_or_default();
        let missing_width = dict_dictionary(doc, dict, b"FontDescriptor")
            .and_then(|descriptor| dict_number(doc, descriptor, b"MissingWidth"))
            .unwrap_or(0.0);
        let has_metrics = !widths.is_empty();

        Self {
            two_byte: false,
            first_char,
            widths,
            default_width: if has_metrics { missing_width } else { ESTIMATED_GLYPH_WIDTH },
            has_metrics,
            ..Self::default()
        }
    }

    fn load_composite(doc: &Document, dict: &Dictionary) -> Self {
        let descendant = dict_entry(doc, dict, b"DescendantFonts")
            .and_then(|object| object.as_array().ok())
            .and_then(|array| array.first())
            .and_then(|object| resolve(doc, object).as_dict().ok());

        let (default_width, cid_widths) = match descendant {
            Some(cid_font) => (
                dict_number(doc, cid_font, b"DW").unwrap_or(DEFAULT_CID_WIDTH),
                dict_entry(doc, cid_font, b"W")
                    .and_then(|object| object.as_array().ok())
                    .map(|array| parse_cid_widths(doc, array))
                    .unwrap_or_default(),
            ),
            None => (DEFAULT_CID_WIDTH, HashMap::new()),
        };

        Self {
            two_byte: true,
            default_width,
            cid_widths,
            has_metrics: true,
            ..Self::default()
        }
    }

    pub fn has_metrics(&self) -> bool {
        self.has_metrics
    }

    pub fn codes(&self, bytes: &[u8]) -> Vec<Code> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => Code { value: (u32::from(*hi) << 8) | u32::from(*lo), len: 2 },
                    [single] => Code { value: u32::from(*single), len: 1 },
                    _ => Code { value: 0, len: 0 },
                })
                .collect()
        } else {
            bytes.iter().map(|byte| Code { value: u32::from(*byte), len: 1 }).collect()
        }
    }

    pub fn decode(&self, code: Code) -> String {
        if let Some(mapped) = self.to_unicode.get(&code.value) {
            return mapped.clone();
        }
        char::from_u32(code.value).map(String::from).unwrap_or_default()
    }

    /// Glyph advance in thousandths of text space.
    pub fn width(&self, code: Code) -> f64 {
        if self.two_byte {
            return self.cid_widths.get(&code.value).copied().unwrap_or(self.default_width);
        }

        code.value
            .checked_sub(self.first_char)
            .and_then(|index| self.widths.get(index as usize))
            .copied()
            .unwrap_or(self.default_width)
    }
}

fn parse_cid_widths(doc: &Document, array: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let items: Vec<&Object> = array.iter().map(|item| resolve(doc, item)).collect();
    let mut index = 0;

    while index < items.len() {
        let Some(first) = number(items[index]) else {
            index += 1;
            continue;
        };
        let first = first.max(0.0) as u32;

        match items.get(index + 1) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    let Some(cid) = u32::try_from(offset).ok().and_then(|o| first.checked_add(o))
                    else {
                        break;
                    };
                    if let Some(width) = number(resolve(doc, width)) {
                        widths.insert(cid, width);
                    }
                }
                index += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(0.0).max(0.0) as u32;
                if let Some(width) = items.get(index + 2).and_then(|object| number(object)) {
                    if last >= first && last - first < MAX_RANGE_SPAN {
                        for cid in first..=last {
                            widths.insert(cid, width);
                        }
                    }
                }
                index += 3;
            }
            None => break,
        }
    }

    widths
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let text = String::from_utf8_lossy(data);
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        match ch {
            '%' => {
                while index < chars.len() && chars[index] != '\n' && chars[index] != '\r' {
                    index += 1;
                }
            }
            '<' if chars.get(index + 1) == Some(&'<') => {
                tokens.push(Token::Word("<<".to_owned()));
                index += 2;
            }
            '>' if chars.get(index + 1) == Some(&'>') => {
                tokens.push(Token::Word(">>".to_owned()));
                index += 2;
            }
            '<' => {
                let start = index + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '>' {
                    end += 1;
                }
                let digits: String =
                    chars[start..end].iter().filter(|c| c.is_ascii_hexdigit()).collect();
                tokens.push(Token::Hex(hex_bytes(&digits)));
                index = end + 1;
            }
            '[' => {
                tokens.push(Token::Open);
                index += 1;
            }
            ']' => {
                tokens.push(Token::Close);
                index += 1;
            }
            c if c.is_whitespace() => index += 1,
            _ => {
                let start = index;
                while index < chars.len()
                    && !chars[index].is_whitespace()
                    && !matches!(chars[index], '<' | '>' | '[' | ']' | '%')
                {
                    index += 1;
                }
                if index == start {
                    index += 1;
                    continue;
                }
                tokens.push(Token::Word(chars[start..index].iter().collect()));
            }
        }
    }

    tokens
}

fn hex_bytes(digits: &str) -> Vec<u8> {
    let mut padded = digits.to_owned();
    if padded.len() % 2 == 1 {
        padded.push('0');
    }
    (0..padded.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

fn utf16_text(bytes: &[u8]) -> String {
    if bytes.len() == 1 {
        return char::from(bytes[0]).to_string();
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (u16::from(*hi) << 8) | u16::from(*lo),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Adds `offset` to the last UTF-16 unit of a `bfrange` destination.
fn offset_destination(bytes: &[u8], offset: u32) -> String {
    let mut bytes = bytes.to_vec();
    if bytes.len() >= 2 {
        let last = bytes.len() - 2;
        let unit = ((u32::from(bytes[last]) << 8) | u32::from(bytes[last + 1])) + offset;
        bytes[last] = ((unit >> 8) & 0xff) as u8;
        bytes[last + 1] = (unit & 0xff) as u8;
    } else if let Some(byte) = bytes.last_mut() {
        *byte = byte.wrapping_add(offset as u8);
    }
    utf16_text(&bytes)
}

/// Parses the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub(crate) fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut index = 0;

    while index < tokens.len() {
        match &tokens[index] {
            Token::Word(word) if word == "beginbfchar" => {
                index += 1;
                while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                    (tokens.get(index), tokens.get(index + 1))
                {
                    map.insert(code_value(src), utf16_text(dst));
                    index += 2;
                }
            }
            Token::Word(word) if word == "beginbfrange" => {
                index += 1;
                while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                    (tokens.get(index), tokens.get(index + 1))
                {
                    let (lo, hi) = (code_value(lo), code_value(hi));
                    let valid = hi >= lo && hi - lo < MAX_RANGE_SPAN;
                    match tokens.get(index + 2) {
                        Some(Token::Hex(dst)) => {
                            if valid {
                                for code in lo..=hi {
                                    map.insert(code, offset_destination(dst, code - lo));
                                }
                            }
                            index += 3;
                        }
                        Some(Token::Open) => {
                            index += 3;
                            let mut code = Some(lo);
                            while let Some(Token::Hex(dst)) = tokens.get(index) {
                                if let Some(current) = code.filter(|&c| valid && c <= hi) {
                                    map.insert(current, utf16_text(dst));
                                }
                                code = code.and_then(|c| c.checked_add(1));
                                index += 1;
                            }
                            if tokens.get(index) == Some(&Token::Close) {
                                index += 1;
                            }
                        }
                        _ => {
                            index += 2;
                            break;
                        }
                    }
                }
            }
            _ => index += 1,
        }
    }

    map
}
