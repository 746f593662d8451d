//! Assembly text parsing: line splitting, labels, comments, register-alias
//! pragmas, macro expansion, and the region markers that delimit the
//! optimize window.
//!
//! The dialect is GNU-flavored: `name:` labels, one instruction per line
//! with comma-separated operands, `//` comments, `#` comments (a `#`
//! followed by a digit or `-` is an immediate instead), `name .req reg`
//! aliases, and `.macro`/`.endm` definitions with `\arg` substitution.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// A region marker found in a comment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Marker {
    /// `slothy:start`
    Start,
    /// `slothy:end`
    End,
}

/// One logical line of the input.
#[derive(Clone, Debug)]
pub struct SourceLine {
    /// 1-based line number in the original text.
    pub line: usize,
    /// The original text, for pass-through emission.
    pub raw: String,
    /// Label defined on this line, colon stripped.
    pub label: Option<String>,
    /// Instruction text with comments stripped and aliases applied.
    pub code: Option<String>,
    /// Region marker carried by this line's comment.
    pub marker: Option<Marker>,
}

/// The parsed input file.
#[derive(Clone, Debug, Default)]
pub struct SourceFile {
    /// All logical lines, in order.
    pub lines: Vec<SourceLine>,
}

impl SourceFile {
    /// Index of the line defining `label`.
    pub fn find_label(&self, label: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.label.as_deref() == Some(label))
    }

    /// Line index range `[start, end)` of the marked region, if both
    /// markers are present.
    pub fn marked_region(&self) -> Option<(usize, usize)> {
        let start = self.lines.iter().position(|l| l.marker == Some(Marker::Start))?;
        let end = self.lines[start..]
            .iter()
            .position(|l| l.marker == Some(Marker::End))?
            + start;
        Some((start + 1, end))
    }
}

struct MacroDef {
    params: Vec<String>,
    body: Vec<String>,
}

/// Strip comments from a line, reporting any region marker found inside
/// them. A `#` immediately followed by a digit or `-` is an immediate.
fn strip_comments(line: &str) -> (&str, Option<Marker>) {
    let mut marker = None;
    let mut cut = line.len();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let is_comment = match bytes[i] {
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => true,
            b'#' => !matches!(bytes.get(i + 1), Some(c) if c.is_ascii_digit() || *c == b'-'),
            _ => false,
        };
        if is_comment {
            cut = i;
            let comment = &line[i..];
            if comment.contains("slothy:start") {
                marker = Some(Marker::Start);
            } else if comment.contains("slothy:end") {
                marker = Some(Marker::End);
            }
            break;
        }
        i += 1;
    }
    (&line[..cut], marker)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Replace whole identifier tokens according to the alias table.
fn apply_aliases(text: &str, aliases: &FxHashMap<String, String>) -> String {
    if aliases.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();
    for c in text.chars() {
        if is_ident_char(c) {
            token.push(c);
        } else {
            if !token.is_empty() {
                match aliases.get(&token) {
                    Some(repl) => out.push_str(repl),
                    None => out.push_str(&token),
                }
                token.clear();
            }
            out.push(c);
        }
    }
    if !token.is_empty() {
        match aliases.get(&token) {
            Some(repl) => out.push_str(repl),
            None => out.push_str(&token),
        }
    }
    out
}

/// Substitute `\param` occurrences in a macro body line.
fn substitute_args(body: &str, params: &[String], args: &[&str]) -> String {
    let mut out = body.to_string();
    for (param, arg) in params.iter().zip(args) {
        out = out.replace(&format!("\\{param}"), arg.trim());
    }
    out
}

/// Parse raw assembly text into logical lines.
pub fn parse_source(input: &str) -> Result<SourceFile> {
    let mut file = SourceFile::default();
    let mut aliases: FxHashMap<String, String> = FxHashMap::default();
    let mut macros: FxHashMap<String, MacroDef> = FxHashMap::default();
    let mut pending_macro: Option<(String, MacroDef)> = None;

    for (idx, raw_line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let (stripped, marker) = strip_comments(raw_line);
        let mut text = stripped.trim().to_string();

        if pending_macro.is_some() {
            if text == ".endm" {
                let (name, def) = pending_macro.take().expect("macro in progress");
                macros.insert(name, def);
            } else if !text.is_empty() {
                if let Some((_, def)) = pending_macro.as_mut() {
                    def.body.push(text.clone());
                }
            }
            // Definition lines are not part of the program proper.
            file.lines.push(SourceLine {
                line: line_no,
                raw: raw_line.to_string(),
                label: None,
                code: None,
                marker,
            });
            continue;
        }

        // Alias pragmas: `name .req reg`, `.unreq name`.
        if let Some(pos) = text.find(" .req ") {
            let alias = text[..pos].trim().to_string();
            let target = text[pos + 6..].trim().to_string();
            if alias.is_empty() || target.is_empty() {
                return Err(Error::parse(line_no, "malformed .req pragma"));
            }
            aliases.insert(alias, target);
            file.lines.push(SourceLine {
                line: line_no,
                raw: raw_line.to_string(),
                label: None,
                code: None,
                marker,
            });
            continue;
        }
        if let Some(rest) = text.strip_prefix(".unreq") {
            aliases.remove(rest.trim());
            file.lines.push(SourceLine {
                line: line_no,
                raw: raw_line.to_string(),
                label: None,
                code: None,
                marker,
            });
            continue;
        }

        // Macro definitions.
        if let Some(rest) = text.strip_prefix(".macro") {
            let mut parts = rest.trim().split_whitespace();
            let name = parts
                .next()
                .ok_or_else(|| Error::parse(line_no, "macro without a name"))?
                .to_string();
            let params: Vec<String> = parts
                .flat_map(|p| p.split(','))
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            pending_macro = Some((
                name,
                MacroDef {
                    params,
                    body: Vec::new(),
                },
            ));
            file.lines.push(SourceLine {
                line: line_no,
                raw: raw_line.to_string(),
                label: None,
                code: None,
                marker,
            });
            continue;
        }

        // Labels, possibly followed by code on the same line.
        let mut label = None;
        if let Some(colon) = text.find(':') {
            let head = &text[..colon];
            if !head.is_empty() && head.chars().all(is_ident_char) {
                label = Some(head.to_string());
                text = text[colon + 1..].trim().to_string();
            }
        }

        if text.is_empty() || text.starts_with('.') {
            // Blank lines and remaining directives pass through untouched.
            file.lines.push(SourceLine {
                line: line_no,
                raw: raw_line.to_string(),
                label,
                code: None,
                marker,
            });
            continue;
        }

        // Macro invocation?
        let head_len = text.find(char::is_whitespace).unwrap_or(text.len());
        if let Some(def) = macros.get(&text[..head_len]) {
            let args: Vec<&str> = if head_len == text.len() {
                Vec::new()
            } else {
                text[head_len..].trim().split(',').collect()
            };
            if args.len() != def.params.len() {
                return Err(Error::parse(
                    line_no,
                    format!(
                        "macro `{}` expects {} arguments, got {}",
                        &text[..head_len],
                        def.params.len(),
                        args.len()
                    ),
                ));
            }
            let mut first = true;
            for body_line in &def.body {
                let expanded = substitute_args(body_line, &def.params, &args);
                let code = apply_aliases(&expanded, &aliases);
                file.lines.push(SourceLine {
                    line: line_no,
                    raw: format!("    {expanded}"),
                    label: if first { label.take() } else { None },
                    code: Some(code),
                    marker: if first { marker } else { None },
                });
                first = false;
            }
            continue;
        }

        let code = apply_aliases(&text, &aliases);
        file.lines.push(SourceLine {
            line: line_no,
            raw: raw_line.to_string(),
            label,
            code: Some(code),
            marker,
        });
    }

    if pending_macro.is_some() {
        return Err(Error::parse(input.lines().count(), "unterminated .macro"));
    }
    Ok(file)
}

/// A raw operand, before matching against the architecture tables.
#[derive(Clone, Debug, PartialEq)]
pub enum RawOperand {
    /// An identifier: an architectural register, a symbolic register, or a
    /// symbolic immediate, depending on the slot it matches.
    Name(String),
    /// A literal immediate.
    Imm(i64),
    /// A memory address.
    Addr {
        /// Base register name.
        base: String,
        /// Constant offset.
        offset: i64,
        /// Base is written back (pre/post indexing).
        writeback: bool,
    },
}

/// Split an instruction line into its mnemonic and raw operand texts.
/// Commas inside brackets do not separate operands.
pub fn split_line(text: &str) -> (String, Vec<String>) {
    let text = text.trim();
    let head_len = text.find(char::is_whitespace).unwrap_or(text.len());
    let mnemonic = text[..head_len].to_string();
    let rest = text[head_len..].trim();
    if rest.is_empty() {
        return (mnemonic, Vec::new());
    }
    let mut operands = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in rest.chars() {
        match c {
            '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                operands.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        operands.push(current.trim().to_string());
    }
    (mnemonic, operands)
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.strip_prefix('#').unwrap_or(text);
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if neg { -value } else { value })
}

/// Parse one raw operand text.
pub fn parse_operand(text: &str, line: usize) -> Result<RawOperand> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('[') {
        let (inner, after) = inner
            .split_once(']')
            .ok_or_else(|| Error::parse(line, format!("unterminated address `{text}`")))?;
        let writeback = after.trim() == "!";
        if !after.trim().is_empty() && !writeback {
            return Err(Error::parse(line, format!("trailing junk after `{text}`")));
        }
        let parts: SmallVec<[&str; 2]> = inner.split(',').map(str::trim).collect();
        let base = parts
            .first()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::parse(line, "empty address base"))?
            .to_string();
        let offset = match parts.get(1) {
            None => 0,
            Some(off) => parse_int(off)
                .ok_or_else(|| Error::parse(line, format!("bad address offset `{off}`")))?,
        };
        if parts.len() > 2 {
            return Err(Error::parse(line, format!("bad address `{text}`")));
        }
        return Ok(RawOperand::Addr {
            base,
            offset,
            writeback,
        });
    }
    if text.starts_with('#') || text.starts_with(|c: char| c.is_ascii_digit()) || text.starts_with('-')
    {
        let value = parse_int(text)
            .ok_or_else(|| Error::parse(line, format!("bad immediate `{text}`")))?;
        return Ok(RawOperand::Imm(value));
    }
    if text.is_empty() || !text.chars().all(is_ident_char) {
        return Err(Error::parse(line, format!("bad operand `{text}`")));
    }
    Ok(RawOperand::Name(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_immediates() {
        let (code, marker) = strip_comments("vldrw q0, [r0, #16] // load row");
        assert_eq!(code, "vldrw q0, [r0, #16] ");
        assert_eq!(marker, None);
        let (code, _) = strip_comments("add r0, r0, #-4 # bump");
        assert_eq!(code, "add r0, r0, #-4 ");
    }

    #[test]
    fn markers() {
        let src = "nop\n// slothy:start\nadd r0, r0, r1\n// slothy:end\nnop\n";
        let file = parse_source(src).expect("parses");
        assert_eq!(file.marked_region(), Some((2, 3)));
    }

    #[test]
    fn labels_and_code() {
        let file = parse_source("start: add r0, r0, r1\nloop:\n  eor r1, r2, r3\n").expect("parses");
        assert_eq!(file.lines[0].label.as_deref(), Some("start"));
        assert_eq!(file.lines[0].code.as_deref(), Some("add r0, r0, r1"));
        assert_eq!(file.lines[1].label.as_deref(), Some("loop"));
        assert_eq!(file.lines[1].code, None);
        assert_eq!(file.find_label("loop"), Some(1));
    }

    #[test]
    fn req_aliases_apply() {
        let src = "acc .req q7\nvadd q0, acc, q1\n.unreq acc\nvadd q0, acc, q1\n";
        let file = parse_source(src).expect("parses");
        assert_eq!(file.lines[1].code.as_deref(), Some("vadd q0, q7, q1"));
        assert_eq!(file.lines[3].code.as_deref(), Some("vadd q0, acc, q1"));
    }

    #[test]
    fn macros_expand() {
        let src = "\
.macro qmac dst, a, b
    vmla \\dst, \\a, \\b
.endm
qmac q0, q1, r2
";
        let file = parse_source(src).expect("parses");
        let expanded: Vec<&str> = file.lines.iter().filter_map(|l| l.code.as_deref()).collect();
        assert_eq!(expanded, vec!["vmla q0, q1, r2"]);
    }

    #[test]
    fn operand_splitting() {
        let (mnemonic, ops) = split_line("vldrw.u32 q0, [r0, #32]");
        assert_eq!(mnemonic, "vldrw.u32");
        assert_eq!(ops, vec!["q0", "[r0, #32]"]);
    }

    #[test]
    fn operand_parsing() {
        assert_eq!(
            parse_operand("[r0, #16]", 1).expect("parses"),
            RawOperand::Addr {
                base: "r0".to_string(),
                offset: 16,
                writeback: false,
            }
        );
        assert_eq!(
            parse_operand("[r5]!", 1).expect("parses"),
            RawOperand::Addr {
                base: "r5".to_string(),
                offset: 0,
                writeback: true,
            }
        );
        assert_eq!(parse_operand("#0x20", 1).expect("parses"), RawOperand::Imm(32));
        assert_eq!(
            parse_operand("inA", 1).expect("parses"),
            RawOperand::Name("inA".to_string())
        );
        assert!(parse_operand("[r0", 1).is_err());
    }
}
