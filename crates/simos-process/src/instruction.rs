//! The synthetic instruction set
//!
//! Instructions are a tagged enum; `Display` renders the textual syntax the
//! shell accepts (`DECLARE(x, 5)`, `READ 0x20`, `FOR([...], 3)`) and
//! [`parse_instruction`] reads it back. `For` bodies nest at most
//! [`MAX_FOR_DEPTH`] deep.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum `For` nesting depth.
pub const MAX_FOR_DEPTH: usize = 3;

/// A value operand: a literal or a variable reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Value(u16),
    Var(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{}", v),
            Operand::Var(name) => write!(f, "{}", name),
        }
    }
}

/// One synthetic instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Bind `var` to a literal value.
    Declare { var: String, value: u16 },
    /// `dst = lhs + rhs`, saturating at 0xFFFF.
    Add {
        dst: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dst = lhs - rhs`, saturating at 0.
    Sub {
        dst: String,
        lhs: Operand,
        rhs: Operand,
    },
    /// Append a message (optionally suffixed with a variable's value) to
    /// the process log.
    Print { message: String, var: Option<String> },
    /// Put the process to sleep for `ticks` CPU ticks.
    Sleep { ticks: u8 },
    /// Repeat `body` `repeats` times.
    For {
        body: Vec<Instruction>,
        repeats: u32,
    },
    /// 16-bit read from a virtual address.
    Read { address: u32 },
    /// 16-bit write to a virtual address.
    Write { address: u32, value: Operand },
}

impl Instruction {
    /// Depth of the deepest `For` nesting rooted at this instruction.
    pub fn for_depth(&self) -> usize {
        match self {
            Instruction::For { body, .. } => {
                1 + body.iter().map(Instruction::for_depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Declare { var, value } => write!(f, "DECLARE({}, {})", var, value),
            Instruction::Add { dst, lhs, rhs } => write!(f, "ADD({}, {}, {})", dst, lhs, rhs),
            Instruction::Sub { dst, lhs, rhs } => {
                write!(f, "SUBTRACT({}, {}, {})", dst, lhs, rhs)
            }
            Instruction::Print { message, var } => match var {
                Some(name) => write!(f, "PRINT(\"{}\" + {})", message, name),
                None => write!(f, "PRINT(\"{}\")", message),
            },
            Instruction::Sleep { ticks } => write!(f, "SLEEP({})", ticks),
            Instruction::For { body, repeats } => {
                write!(f, "FOR([")?;
                for (i, inner) in body.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", inner)?;
                }
                write!(f, "], {})", repeats)
            }
            Instruction::Read { address } => write!(f, "READ 0x{:X}", address),
            Instruction::Write { address, value } => write!(f, "WRITE 0x{:X} {}", address, value),
        }
    }
}

/// Error produced by [`parse_instruction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid instruction: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse one instruction in the shell's textual syntax.
pub fn parse_instruction(text: &str) -> Result<Instruction, ParseError> {
    parse_at_depth(text.trim(), 1)
}

fn parse_at_depth(text: &str, depth: usize) -> Result<Instruction, ParseError> {
    let upper = text.to_ascii_uppercase();

    if let Some(args) = call_args(&upper, text, "DECLARE") {
        let parts = split_top_level(args)?;
        let [var, value] = two(&parts, "DECLARE takes (var, value)")?;
        return Ok(Instruction::Declare {
            var: parse_var(var)?,
            value: parse_u16(value)?,
        });
    }
    if let Some(args) = call_args(&upper, text, "ADD") {
        let parts = split_top_level(args)?;
        let [dst, lhs, rhs] = three(&parts, "ADD takes (dst, lhs, rhs)")?;
        return Ok(Instruction::Add {
            dst: parse_var(dst)?,
            lhs: parse_operand(lhs)?,
            rhs: parse_operand(rhs)?,
        });
    }
    if let Some(args) = call_args(&upper, text, "SUBTRACT") {
        let parts = split_top_level(args)?;
        let [dst, lhs, rhs] = three(&parts, "SUBTRACT takes (dst, lhs, rhs)")?;
        return Ok(Instruction::Sub {
            dst: parse_var(dst)?,
            lhs: parse_operand(lhs)?,
            rhs: parse_operand(rhs)?,
        });
    }
    if let Some(args) = call_args(&upper, text, "PRINT") {
        return parse_print(args);
    }
    if let Some(args) = call_args(&upper, text, "SLEEP") {
        let ticks: u8 = args
            .trim()
            .parse()
            .map_err(|_| ParseError::new("SLEEP takes a tick count in [0, 255]"))?;
        return Ok(Instruction::Sleep { ticks });
    }
    if let Some(args) = call_args(&upper, text, "FOR") {
        return parse_for(args, depth);
    }
    if let Some(rest) = keyword_rest(&upper, text, "READ") {
        let address = parse_address(rest.trim())?;
        return Ok(Instruction::Read { address });
    }
    if let Some(rest) = keyword_rest(&upper, text, "WRITE") {
        let mut parts = rest.split_whitespace();
        let address = parse_address(parts.next().ok_or_else(|| ParseError::new("WRITE takes an address"))?)?;
        let value = parse_operand(
            parts
                .next()
                .ok_or_else(|| ParseError::new("WRITE takes a value"))?,
        )?;
        return Ok(Instruction::Write { address, value });
    }

    Err(ParseError::new(format!("unknown instruction {:?}", text)))
}

/// `NAME(args)` -> the span inside the outermost parentheses.
fn call_args<'a>(upper: &str, text: &'a str, keyword: &str) -> Option<&'a str> {
    let prefix = format!("{}(", keyword);
    if !upper.starts_with(&prefix) || !text.ends_with(')') {
        return None;
    }
    Some(&text[prefix.len()..text.len() - 1])
}

/// `NAME rest` -> the span after the keyword.
fn keyword_rest<'a>(upper: &str, text: &'a str, keyword: &str) -> Option<&'a str> {
    if upper.starts_with(&format!("{} ", keyword)) || upper.starts_with(&format!("{}\t", keyword)) {
        Some(&text[keyword.len()..])
    } else {
        None
    }
}

/// Split on commas that sit outside any nested `(...)` / `[...]` / quotes.
fn split_top_level(args: &str) -> Result<Vec<&str>, ParseError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' | '[' if !in_string => depth += 1,
            ')' | ']' if !in_string => depth -= 1,
            ',' if depth == 0 && !in_string => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || in_string {
        return Err(ParseError::new("unbalanced brackets or quotes"));
    }
    parts.push(args[start..].trim());
    Ok(parts)
}

fn two<'a>(parts: &[&'a str], msg: &str) -> Result<[&'a str; 2], ParseError> {
    match *parts {
        [a, b] => Ok([a, b]),
        _ => Err(ParseError::new(msg)),
    }
}

fn three<'a>(parts: &[&'a str], msg: &str) -> Result<[&'a str; 3], ParseError> {
    match *parts {
        [a, b, c] => Ok([a, b, c]),
        _ => Err(ParseError::new(msg)),
    }
}

fn parse_var(token: &str) -> Result<String, ParseError> {
    let token = token.trim();
    if token.is_empty()
        || !token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || token.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        return Err(ParseError::new(format!("bad variable name {:?}", token)));
    }
    Ok(token.to_string())
}

fn parse_u16(token: &str) -> Result<u16, ParseError> {
    // Out-of-range literals clamp to the 16-bit domain.
    let value: i64 = token
        .trim()
        .parse()
        .map_err(|_| ParseError::new(format!("bad numeric literal {:?}", token)))?;
    Ok(value.clamp(0, u16::MAX as i64) as u16)
}

fn parse_operand(token: &str) -> Result<Operand, ParseError> {
    let token = token.trim();
    if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Ok(Operand::Value(parse_u16(token)?))
    } else {
        Ok(Operand::Var(parse_var(token)?))
    }
}

fn parse_address(token: &str) -> Result<u32, ParseError> {
    let hex = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .ok_or_else(|| ParseError::new(format!("address must be hex: {:?}", token)))?;
    u32::from_str_radix(hex, 16)
        .map_err(|_| ParseError::new(format!("bad address {:?}", token)))
}

fn parse_print(args: &str) -> Result<Instruction, ParseError> {
    let args = args.trim();

    // `"message" + var` or just `"message"`
    let (message_part, var) = match args.rfind(" + ") {
        Some(pos) if args[pos + 3..].trim().chars().next().is_some_and(|c| !c.is_ascii_digit()) => {
            let var = parse_var(args[pos + 3..].trim())?;
            (args[..pos].trim(), Some(var))
        }
        _ => (args, None),
    };

    let message = if message_part.len() >= 2
        && message_part.starts_with('"')
        && message_part.ends_with('"')
    {
        message_part[1..message_part.len() - 1].to_string()
    } else {
        message_part.to_string()
    };

    Ok(Instruction::Print { message, var })
}

fn parse_for(args: &str, depth: usize) -> Result<Instruction, ParseError> {
    if depth > MAX_FOR_DEPTH {
        return Err(ParseError::new("FOR nesting exceeds depth 3"));
    }
    let args = args.trim();
    if !args.starts_with('[') {
        return Err(ParseError::new("FOR takes ([body], repeats)"));
    }

    // Find the matching close bracket of the body list.
    let mut bracket_depth = 0i32;
    let mut body_end = None;
    for (i, c) in args.char_indices() {
        match c {
            '[' => bracket_depth += 1,
            ']' => {
                bracket_depth -= 1;
                if bracket_depth == 0 {
                    body_end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let body_end = body_end.ok_or_else(|| ParseError::new("unterminated FOR body"))?;

    let body_text = &args[1..body_end];
    let rest = args[body_end + 1..].trim();
    let repeats_text = rest
        .strip_prefix(',')
        .ok_or_else(|| ParseError::new("FOR takes ([body], repeats)"))?
        .trim();
    let repeats: u32 = repeats_text
        .parse()
        .map_err(|_| ParseError::new(format!("bad repeat count {:?}", repeats_text)))?;

    let mut body = Vec::new();
    if !body_text.trim().is_empty() {
        for part in split_top_level(body_text)? {
            body.push(parse_at_depth(part, depth + 1)?);
        }
    }
    if body.is_empty() {
        return Err(ParseError::new("FOR body is empty"));
    }

    Ok(Instruction::For { body, repeats })
}
