//! Phrase-book parser: indentation-structured source to a [`RuleTable`].
//!
//! ```text
//! %preamble:
//! - duration: 4
//! - imports: k3x9 as shapes
//!
//! root:
//! - Dear {{ giver }}, thank you for the {{ object }}.
//! - [3] <svg>{{ _ }}</svg>
//!   - {{ shapes.circle(r: 10, fill: "red") }}
//!   - <rect width="{{ ~ease(from: 0, to: 90) }}"/>
//! ```
//!
//! The parser does not resolve references; unknown names surface when the
//! rule is expanded.

use std::collections::HashSet;
use thiserror::Error;
use tracing::trace;

use crate::schema::preamble::{Import, Preamble};
use crate::schema::rule_table::{
    anonymous_name, ArgValue, Argument, Reference, RuleDef, RuleTable, Segment, Template,
    Variant, NAMESPACE_SEPARATOR, PREAMBLE,
};

/// Placeholder name that refers to an alternative's nested anonymous rule.
pub const ANONYMOUS_REF: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// True if `name` is a valid unqualified rule or argument name.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name != ANONYMOUS_REF
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// True if `name` is a valid, possibly `alias.`-qualified, reference.
pub fn is_qualified_identifier(name: &str) -> bool {
    name.split(NAMESPACE_SEPARATOR).all(is_identifier)
}

/// Parse phrase-book source into a rule table.
pub fn parse(input: &str) -> Result<RuleTable, ParseError> {
    Parser::default().run(input)
}

struct PendingVariant {
    weight: f64,
    template: Template,
    line: usize,
    column: usize,
    child: Option<String>,
}

struct Frame {
    name: String,
    line: usize,
    alt_indent: Option<usize>,
    variants: Vec<PendingVariant>,
    preamble: bool,
}

#[derive(Default)]
struct Parser {
    table: RuleTable,
    seen: HashSet<String>,
    stack: Vec<Frame>,
}

impl Parser {
    fn run(mut self, input: &str) -> Result<RuleTable, ParseError> {
        for (index, raw) in input.split('\n').enumerate() {
            let line_no = index + 1;
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let content = line.trim_start_matches(|c: char| c == ' ' || c == '\t');
            if content.is_empty() || content.starts_with('#') {
                continue;
            }
            let indent_str = &line[..line.len() - content.len()];
            if let Some(pos) = indent_str.find('\t') {
                return Err(ParseError::new(
                    line_no,
                    pos + 1,
                    "tabs are not allowed in indentation",
                ));
            }
            let indent = indent_str.len();

            if content == "-" || content.starts_with("- ") {
                let text = content.get(2..).unwrap_or("");
                self.alternative(line_no, indent, text)?;
            } else if content.starts_with('-') {
                return Err(ParseError::new(
                    line_no,
                    indent + 2,
                    "expected a space after '-'",
                ));
            } else {
                self.header(line_no, indent, content)?;
            }
        }
        self.close_all()?;
        Ok(self.table)
    }

    fn header(&mut self, line: usize, indent: usize, content: &str) -> Result<(), ParseError> {
        if indent > 0 {
            return Err(ParseError::new(
                line,
                1,
                "rule headers must start at column 1; nest alternatives with '- ' instead",
            ));
        }
        let name = content.trim_end().strip_suffix(':').ok_or_else(|| {
            ParseError::new(line, 1, "expected a 'name:' header or a '- ' alternative")
        })?;
        let preamble = name == PREAMBLE;
        if !preamble && !is_identifier(name) {
            return Err(ParseError::new(
                line,
                1,
                format!(
                    "invalid rule name '{}': use letters, digits, '_' and '-'",
                    name
                ),
            ));
        }
        if !self.seen.insert(name.to_string()) {
            return Err(ParseError::new(
                line,
                1,
                format!("duplicate rule '{}'", name),
            ));
        }
        self.close_all()?;
        self.stack.push(Frame {
            name: name.to_string(),
            line,
            alt_indent: None,
            variants: Vec::new(),
            preamble,
        });
        Ok(())
    }

    fn alternative(&mut self, line: usize, indent: usize, text: &str) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            return Err(ParseError::new(
                line,
                indent + 1,
                "alternative outside of a rule; start with a 'name:' header",
            ));
        }

        // Close nested levels this line dedents out of.
        while let Some(top) = self.stack.last() {
            match top.alt_indent {
                Some(level) if indent < level => {
                    if self.stack.len() == 1 {
                        return Err(inconsistent(line, indent));
                    }
                    self.close_top()?;
                }
                _ => break,
            }
        }

        let top = self.stack.len() - 1;
        let nested = match self.stack[top].alt_indent {
            None => {
                self.stack[top].alt_indent = Some(indent);
                false
            }
            Some(level) if indent == level => false,
            Some(_) => true,
        };

        if nested {
            let parent = &mut self.stack[top];
            if parent.preamble {
                return Err(ParseError::new(
                    line,
                    indent + 1,
                    "the preamble cannot contain nested alternatives",
                ));
            }
            let owner = parent.variants.len() - 1;
            if parent.variants[owner].child.is_some() {
                return Err(inconsistent(line, indent));
            }
            let name = anonymous_name(&parent.name, owner);
            parent.variants[owner].child = Some(name.clone());
            self.stack.push(Frame {
                name,
                line,
                alt_indent: Some(indent),
                variants: Vec::new(),
                preamble: false,
            });
        }

        let column = indent + 3;
        let frame = self
            .stack
            .last_mut()
            .ok_or_else(|| inconsistent(line, indent))?;
        if frame.preamble {
            return preamble_entry(&mut self.table.preamble, line, column, text);
        }
        let (weight, body, body_column) = parse_weight(text, line, column)?;
        let template = parse_template(body, line, body_column)?;
        frame.variants.push(PendingVariant {
            weight,
            template,
            line,
            column,
            child: None,
        });
        Ok(())
    }

    fn close_all(&mut self) -> Result<(), ParseError> {
        while !self.stack.is_empty() {
            self.close_top()?;
        }
        Ok(())
    }

    fn close_top(&mut self) -> Result<(), ParseError> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        if frame.preamble {
            return Ok(());
        }
        if frame.variants.is_empty() {
            return Err(ParseError::new(
                frame.line,
                1,
                format!("rule '{}' has no alternatives", frame.name),
            ));
        }
        if frame.variants.iter().map(|v| v.weight).sum::<f64>() <= 0.0 {
            return Err(ParseError::new(
                frame.line,
                1,
                format!("rule '{}' has no alternative with positive weight", frame.name),
            ));
        }

        let mut variants = Vec::with_capacity(frame.variants.len());
        for pending in frame.variants {
            variants.push(bind_anonymous(pending)?);
        }
        trace!(rule = %frame.name, variants = variants.len(), "parsed rule");
        self.table.rules.insert(
            frame.name.clone(),
            RuleDef {
                name: frame.name,
                variants,
            },
        );
        Ok(())
    }
}

fn inconsistent(line: usize, indent: usize) -> ParseError {
    ParseError::new(line, indent + 1, "inconsistent indentation")
}

/// Point `{{ _ }}` placeholders at the alternative's nested rule.
fn bind_anonymous(pending: PendingVariant) -> Result<Variant, ParseError> {
    let mut template = pending.template;
    let mut used = false;
    for segment in &mut template.segments {
        if let Segment::Reference(r) = segment {
            if r.name == ANONYMOUS_REF && !r.animated {
                let child = pending.child.as_ref().ok_or_else(|| {
                    ParseError::new(
                        pending.line,
                        pending.column,
                        "'{{ _ }}' needs a nested block of alternatives below this line",
                    )
                })?;
                r.name = child.clone();
                used = true;
            }
        }
    }
    if pending.child.is_some() && !used {
        return Err(ParseError::new(
            pending.line,
            pending.column,
            "nested alternatives are never used; place '{{ _ }}' where they belong",
        ));
    }
    Ok(Variant {
        weight: pending.weight,
        template,
    })
}

/// Split an optional `[weight] ` prefix off an alternative. Brackets that
/// do not hold a number are ordinary text.
fn parse_weight(text: &str, line: usize, column: usize) -> Result<(f64, &str, usize), ParseError> {
    if text.starts_with("\\[") {
        // Escaped bracket: keep '[' as literal text.
        return Ok((1.0, &text[1..], column + 1));
    }
    let Some((raw, after)) = text
        .strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
    else {
        return Ok((1.0, text, column));
    };
    let Ok(weight) = raw.trim().parse::<f64>() else {
        return Ok((1.0, text, column));
    };
    if !weight.is_finite() || weight < 0.0 {
        return Err(ParseError::new(
            line,
            column,
            format!("weight must be a non-negative number, got '{}'", raw.trim()),
        ));
    }
    let body = after.strip_prefix(' ').unwrap_or(after);
    let consumed = text.len() - body.len();
    Ok((weight, body, column + text[..consumed].chars().count()))
}

/// Parse one alternative's text into segments.
///
/// `column` is the 1-based column of the first character of `input`.
pub fn parse_template(input: &str, line: usize, column: usize) -> Result<Template, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < len {
        if chars[i] == '\\' && i + 2 < len && chars[i + 1] == '{' && chars[i + 2] == '{' {
            literal.push_str("{{");
            i += 3;
            continue;
        }
        if chars[i] == '{' && i + 1 < len && chars[i + 1] == '{' {
            let start_col = column + i;
            let end = find_close(&chars, i + 2).ok_or_else(|| {
                ParseError::new(line, start_col, "unterminated placeholder; expected '}}'")
            })?;
            let inner: String = chars[i + 2..end].iter().collect();
            if inner.contains("{{") {
                return Err(ParseError::new(
                    line,
                    start_col,
                    "placeholders cannot be nested; pass '$name' arguments instead",
                ));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Reference(parse_placeholder(&inner, line, start_col)?));
            i = end + 2;
            continue;
        }
        literal.push(chars[i]);
        i += 1;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(Template { segments })
}

/// Index of the `}}` closing a placeholder whose body starts at `from`,
/// skipping over quoted argument values.
fn find_close(chars: &[char], from: usize) -> Option<usize> {
    let mut in_quote = false;
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' if in_quote => i += 1,
            '"' => in_quote = !in_quote,
            '}' if !in_quote && chars.get(i + 1) == Some(&'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn parse_placeholder(inner: &str, line: usize, column: usize) -> Result<Reference, ParseError> {
    let err = |message: String| ParseError::new(line, column, message);

    let mut body = inner.trim();
    let animated = match body.strip_prefix('~') {
        Some(rest) => {
            body = rest.trim_start();
            true
        }
        None => false,
    };

    let name_len = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .unwrap_or(body.len());
    let name = &body[..name_len];
    if name.is_empty() {
        return Err(err(format!("expected a rule name in '{{{{{}}}}}'", inner)));
    }
    if name != ANONYMOUS_REF && !is_qualified_identifier(name) {
        return Err(err(format!("invalid rule name '{}'", name)));
    }

    let rest = body[name_len..].trim_start();
    let args = if let Some(args_body) = rest.strip_prefix('(') {
        let close = find_paren_close(args_body)
            .ok_or_else(|| err(format!("unterminated argument list in '{}'", name)))?;
        let trailing = args_body[close + 1..].trim();
        if !trailing.is_empty() {
            return Err(err(format!("unexpected '{}' after arguments", trailing)));
        }
        parse_args(&args_body[..close], line, column)?
    } else if rest.is_empty() {
        Vec::new()
    } else {
        return Err(err(format!("unexpected '{}' after rule name '{}'", rest, name)));
    };

    Ok(Reference {
        name: name.to_string(),
        args,
        animated,
        binding: None,
    })
}

fn find_paren_close(body: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ')' if !in_quote => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split on commas outside quotes.
fn split_args(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ',' if !in_quote => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn parse_args(body: &str, line: usize, column: usize) -> Result<Vec<Argument>, ParseError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for part in split_args(body) {
        let part = part.trim();
        if part.is_empty() {
            return Err(ParseError::new(line, column, "empty argument"));
        }
        let (name, value) = part.split_once(':').ok_or_else(|| {
            ParseError::new(
                line,
                column,
                format!("argument '{}' must be written as 'name: value'", part),
            )
        })?;
        let name = name.trim();
        if !is_identifier(name) {
            return Err(ParseError::new(
                line,
                column,
                format!("invalid argument name '{}'", name),
            ));
        }
        args.push(Argument {
            name: name.to_string(),
            value: parse_arg_value(value.trim(), line, column)?,
            binding: None,
        });
    }
    Ok(args)
}

fn parse_arg_value(raw: &str, line: usize, column: usize) -> Result<ArgValue, ParseError> {
    if let Some(quoted) = raw.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = quoted.chars();
        loop {
            match chars.next() {
                Some('\\') => match chars.next() {
                    Some(c) => out.push(c),
                    None => break,
                },
                Some('"') => {
                    let trailing: String = chars.collect();
                    if !trailing.trim().is_empty() {
                        return Err(ParseError::new(
                            line,
                            column,
                            format!("unexpected '{}' after quoted value", trailing.trim()),
                        ));
                    }
                    return Ok(ArgValue::Text(out));
                }
                Some(c) => out.push(c),
                None => break,
            }
        }
        return Err(ParseError::new(line, column, "unterminated quoted value"));
    }
    if let Some(name) = raw.strip_prefix('$') {
        if !is_qualified_identifier(name) {
            return Err(ParseError::new(
                line,
                column,
                format!("invalid reference '${}'", name),
            ));
        }
        return Ok(ArgValue::Ref(name.to_string()));
    }
    Ok(ArgValue::Text(raw.to_string()))
}

fn preamble_entry(
    preamble: &mut Preamble,
    line: usize,
    column: usize,
    text: &str,
) -> Result<(), ParseError> {
    let (key, value) = text.split_once(':').ok_or_else(|| {
        ParseError::new(line, column, "preamble entries are written as 'key: value'")
    })?;
    let value = value.trim();
    match key.trim() {
        "duration" => {
            let duration: f64 = value.parse().map_err(|_| {
                ParseError::new(line, column, format!("invalid duration '{}'", value))
            })?;
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ParseError::new(
                    line,
                    column,
                    "duration must be a positive number of seconds",
                ));
            }
            preamble.duration = duration;
        }
        "animation" => {
            preamble.animation = value
                .parse()
                .map_err(|e: String| ParseError::new(line, column, e))?;
        }
        "imports" | "import" => {
            for entry in value.split(',') {
                let import = parse_import(entry.trim(), line, column)?;
                if preamble.imports.iter().any(|i| i.alias == import.alias) {
                    return Err(ParseError::new(
                        line,
                        column,
                        format!("import alias '{}' is used twice", import.alias),
                    ));
                }
                preamble.imports.push(import);
            }
        }
        other => {
            return Err(ParseError::new(
                line,
                column,
                format!(
                    "unknown preamble key '{}': expected duration, animation or imports",
                    other
                ),
            ))
        }
    }
    Ok(())
}

fn parse_import(entry: &str, line: usize, column: usize) -> Result<Import, ParseError> {
    let words: Vec<&str> = entry.split_whitespace().collect();
    let (id, alias) = match words.as_slice() {
        [id] => (*id, *id),
        [id, "as", alias] => (*id, *alias),
        _ => {
            return Err(ParseError::new(
                line,
                column,
                format!("invalid import '{}': expected 'id' or 'id as alias'", entry),
            ))
        }
    };
    if !is_identifier(alias) {
        return Err(ParseError::new(
            line,
            column,
            format!("invalid import alias '{}'", alias),
        ));
    }
    Ok(Import {
        id: id.to_string(),
        alias: alias.to_string(),
    })
}
