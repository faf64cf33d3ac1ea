//! Kernel declaration scanner for the simulated driver.
//!
//! This is not a compiler. It finds `__kernel` function definitions, their
//! parameter lists and `reqd_work_group_size` attributes, and reports the
//! structural errors a real front end would reject first.

use std::fmt;

/// Address space / argument class of one kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParamKind {
    Global,
    Constant,
    Local,
    Sampler,
    Image,
    /// By-value argument; `None` for types whose size is not known here
    /// (structs, typedefs).
    Value(Option<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamDecl {
    pub name: String,
    pub type_name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KernelDecl {
    pub name: String,
    /// Line of the `__kernel` keyword.
    pub line: usize,
    pub params: Vec<ParamDecl>,
    pub reqd_work_group_size: Option<[usize; 3]>,
    /// Attribute list as reported by `CL_KERNEL_ATTRIBUTES`.
    pub attributes: String,
}

impl KernelDecl {
    /// Work-items in the required work-group, if one is declared. The scanner
    /// rejects dimensions whose product does not fit a `usize`.
    pub fn required_work_group_total(&self) -> Option<usize> {
        self.reqd_work_group_size
            .map(|dims| dims.iter().fold(1usize, |acc, d| acc.saturating_mul(*d)))
    }
}

/// One build log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<source>:{}: error: {}", self.line, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    line: usize,
}

impl Token {
    fn is(&self, s: &str) -> bool {
        self.text == s
    }

    fn is_ident(&self) -> bool {
        self.text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    }
}

/// Scans `source` and returns every kernel definition in order.
pub(crate) fn scan(source: &str) -> Result<Vec<KernelDecl>, Vec<Diagnostic>> {
    let tokens = tokenize(&strip_comments(source));
    let mut diagnostics = check_delimiters(&tokens);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let mut kernels: Vec<KernelDecl> = Vec::new();
    let mut pending_attributes: Vec<Vec<Token>> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        match token.text.as_str() {
            "{" => depth += 1,
            "}" => {
                depth = depth.saturating_sub(1);
                pending_attributes.clear();
            }
            ";" => pending_attributes.clear(),
            "__attribute__" if depth == 0 => match attribute_end(&tokens, i) {
                Ok(end) => {
                    pending_attributes.push(tokens[i + 1..=end].to_vec());
                    i = end;
                }
                Err(diag) => {
                    diagnostics.push(diag);
                    break;
                }
            },
            "__kernel" | "kernel" if depth == 0 => {
                let attributes = std::mem::take(&mut pending_attributes);
                match parse_kernel(&tokens, i, attributes) {
                    Ok((Some(decl), next)) => {
                        if kernels.iter().any(|k| k.name == decl.name) {
                            diagnostics.push(Diagnostic {
                                line: token.line,
                                message: format!("redefinition of kernel '{}'", decl.name),
                            });
                        } else {
                            kernels.push(decl);
                        }
                        i = next;
                        continue;
                    }
                    Ok((None, next)) => {
                        i = next;
                        continue;
                    }
                    Err(diag) => {
                        diagnostics.push(diag);
                        break;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }

    if diagnostics.is_empty() {
        Ok(kernels)
    } else {
        Err(diagnostics)
    }
}

/// Parses one kernel starting at the `__kernel` token. Returns `None` for a
/// prototype (no body) and the index just past the definition.
fn parse_kernel(
    tokens: &[Token],
    start: usize,
    mut attributes: Vec<Vec<Token>>,
) -> Result<(Option<KernelDecl>, usize), Diagnostic> {
    let line = tokens[start].line;
    let mut i = start + 1;

    // Qualifiers and attributes between `__kernel` and the return type.
    loop {
        let Some(token) = tokens.get(i) else {
            return Err(Diagnostic {
                line,
                message: "expected kernel declaration".into(),
            });
        };
        if token.is("__attribute__") {
            let end = attribute_end(tokens, i)?;
            attributes.push(tokens[i + 1..=end].to_vec());
            i = end + 1;
        } else if token.is("inline") || token.is("static") {
            i += 1;
        } else {
            break;
        }
    }

    if !tokens[i].is("void") {
        return Err(Diagnostic {
            line: tokens[i].line,
            message: format!(
                "kernel function return type must be void, found '{}'",
                tokens[i].text
            ),
        });
    }
    i += 1;

    let name = match tokens.get(i) {
        Some(token) if token.is_ident() => token.text.clone(),
        _ => {
            return Err(Diagnostic {
                line,
                message: "expected kernel name".into(),
            });
        }
    };
    i += 1;

    if !tokens.get(i).is_some_and(|t| t.is("(")) {
        return Err(Diagnostic {
            line,
            message: format!("expected '(' after kernel name '{}'", name),
        });
    }
    let close = matching_paren(tokens, i).ok_or_else(|| never_closed(&tokens[i]))?;
    let params = parse_params(&tokens[i + 1..close], &name)?;
    i = close + 1;

    match tokens.get(i).map(|t| t.text.as_str()) {
        Some(";") => return Ok((None, i + 1)),
        Some("{") => {}
        _ => {
            return Err(Diagnostic {
                line,
                message: format!("expected function body after declaration of '{}'", name),
            });
        }
    }
    let body_end = matching_brace(tokens, i).ok_or_else(|| never_closed(&tokens[i]))?;

    let mut reqd_work_group_size = None;
    let mut attribute_text = Vec::new();
    for attr in &attributes {
        for (name, args) in split_attributes(attr, line)? {
            if name == "reqd_work_group_size" {
                let dims: Vec<usize> = args
                    .iter()
                    .filter_map(|t| t.text.parse().ok())
                    .collect();
                if dims.len() != 3 || dims.contains(&0) {
                    return Err(Diagnostic {
                        line,
                        message: "reqd_work_group_size requires three positive integers".into(),
                    });
                }
                if dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d)).is_none() {
                    return Err(Diagnostic {
                        line,
                        message: "reqd_work_group_size is too large".into(),
                    });
                }
                reqd_work_group_size = Some([dims[0], dims[1], dims[2]]);
            }
            let rendered: Vec<&str> = args.iter().map(|t| t.text.as_str()).collect();
            if rendered.is_empty() {
                attribute_text.push(name);
            } else {
                attribute_text.push(format!("{}({})", name, rendered.join("")));
            }
        }
    }

    Ok((
        Some(KernelDecl {
            name,
            line,
            params,
            reqd_work_group_size,
            attributes: attribute_text.join(" "),
        }),
        body_end + 1,
    ))
}

fn parse_params(tokens: &[Token], kernel: &str) -> Result<Vec<ParamDecl>, Diagnostic> {
    if tokens.is_empty() || (tokens.len() == 1 && tokens[0].is("void")) {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    for group in tokens.split(|t| t.is(",")) {
        let line = group.first().map_or(0, |t| t.line);
        let mut address_space = None;
        let mut pointer = false;
        let mut words: Vec<&str> = Vec::new();
        let mut in_array = false;

        for token in group {
            match token.text.as_str() {
                "__global" | "global" => address_space = Some(ParamKind::Global),
                "__constant" | "constant" => address_space = Some(ParamKind::Constant),
                "__local" | "local" => address_space = Some(ParamKind::Local),
                "__private" | "private" | "const" | "volatile" | "restrict" | "__restrict"
                | "__read_only" | "read_only" | "__write_only" | "write_only"
                | "__read_write" | "read_write" => {}
                "*" => pointer = true,
                "[" => in_array = true,
                "]" => in_array = false,
                _ if in_array => {}
                text if token.is_ident() => words.push(text),
                other => {
                    return Err(Diagnostic {
                        line,
                        message: format!("unexpected '{}' in parameter list of '{}'", other, kernel),
                    });
                }
            }
        }

        let Some(name) = words.pop() else {
            return Err(Diagnostic {
                line,
                message: format!("parameter of '{}' has no name", kernel),
            });
        };
        if words.is_empty() {
            return Err(Diagnostic {
                line,
                message: format!("parameter '{}' of '{}' has no type", name, kernel),
            });
        }
        let type_name = words.join(" ");

        let kind = if pointer {
            match address_space {
                Some(space) => space,
                None => {
                    return Err(Diagnostic {
                        line,
                        message: format!(
                            "pointer argument '{}' of kernel '{}' must be declared in the global, constant or local address space",
                            name, kernel
                        ),
                    });
                }
            }
        } else if type_name == "sampler_t" {
            ParamKind::Sampler
        } else if type_name.starts_with("image") && type_name.ends_with("_t") {
            ParamKind::Image
        } else {
            ParamKind::Value(value_size(&type_name))
        };

        params.push(ParamDecl {
            name: name.to_string(),
            type_name,
            kind,
        });
    }
    Ok(params)
}

/// Size in bytes of a scalar or vector OpenCL C type.
pub(crate) fn value_size(type_name: &str) -> Option<usize> {
    let type_name = match type_name {
        "unsigned" | "signed" => "int",
        other => other
            .strip_prefix("unsigned ")
            .or_else(|| other.strip_prefix("signed "))
            .unwrap_or(other),
    };

    let split = type_name
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(type_name.len());
    let (base, lanes) = type_name.split_at(split);

    let scalar = match base {
        "char" | "uchar" | "bool" => 1,
        "short" | "ushort" | "half" => 2,
        "int" | "uint" | "float" => 4,
        "long" | "ulong" | "double" | "size_t" | "ptrdiff_t" | "intptr_t" | "uintptr_t" => 8,
        _ => return None,
    };

    let lanes = match lanes {
        "" => 1,
        "2" => 2,
        "3" | "4" => 4,
        "8" => 8,
        "16" => 16,
        _ => return None,
    };
    Some(scalar * lanes)
}

/// Splits `((a, b(1,2,3)))` into `[("a", []), ("b", [1, ",", 2, ...])]`.
fn split_attributes(
    tokens: &[Token],
    line: usize,
) -> Result<Vec<(String, Vec<Token>)>, Diagnostic> {
    let malformed = || Diagnostic {
        line: tokens.first().map_or(line, |t| t.line),
        message: "malformed attribute, expected __attribute__((...))".into(),
    };

    // The outer `((` must close exactly at the trailing `))`.
    let inner = match tokens {
        [open, open_inner, inner @ .., close_inner, close]
            if open.is("(")
                && open_inner.is("(")
                && close_inner.is(")")
                && close.is(")")
                && matching_paren(tokens, 1) == Some(tokens.len() - 2) =>
        {
            inner
        }
        _ => return Err(malformed()),
    };

    let mut out = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        let token = &inner[i];
        if token.is_ident() {
            if inner.get(i + 1).is_some_and(|t| t.is("(")) {
                let end = matching_paren(inner, i + 1).ok_or_else(malformed)?;
                out.push((token.text.clone(), inner[i + 2..end].to_vec()));
                i = end + 1;
                continue;
            }
            out.push((token.text.clone(), Vec::new()));
        } else if !token.is(",") {
            return Err(malformed());
        }
        i += 1;
    }
    Ok(out)
}

/// Index of the `)` closing the attribute argument list that follows the
/// `__attribute__` token at `at`.
fn attribute_end(tokens: &[Token], at: usize) -> Result<usize, Diagnostic> {
    let line = tokens[at].line;
    if !tokens.get(at + 1).is_some_and(|t| t.is("(")) {
        return Err(Diagnostic {
            line,
            message: "expected '(' after __attribute__".into(),
        });
    }
    matching_paren(tokens, at + 1).ok_or(Diagnostic {
        line,
        message: "'(' is never closed".into(),
    })
}

fn never_closed(open: &Token) -> Diagnostic {
    Diagnostic {
        line: open.line,
        message: format!("'{}' is never closed", open.text),
    }
}

/// Index of the `)` matching the `(` at `open`.
fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    matching(tokens, open, "(", ")")
}

fn matching_brace(tokens: &[Token], open: usize) -> Option<usize> {
    matching(tokens, open, "{", "}")
}

fn matching(tokens: &[Token], open: usize, left: &str, right: &str) -> Option<usize> {
    if !tokens.get(open).is_some_and(|t| t.is(left)) {
        return None;
    }
    let mut depth = 0usize;
    for (offset, token) in tokens.iter().enumerate().skip(open) {
        if token.is(left) {
            depth += 1;
        } else if token.is(right) {
            depth -= 1;
            if depth == 0 {
                return Some(offset);
            }
        }
    }
    None
}

/// Diagnostics for kernels whose required work-group size exceeds
/// `max_work_group_size`.
pub(crate) fn check_work_group_limit(
    kernels: &[KernelDecl],
    max_work_group_size: usize,
) -> Vec<Diagnostic> {
    kernels
        .iter()
        .filter_map(|kernel| {
            let total = kernel.required_work_group_total()?;
            (total > max_work_group_size).then(|| Diagnostic {
                line: kernel.line,
                message: format!(
                    "kernel '{}' requires a work-group of {} work-items, device maximum is {}",
                    kernel.name, total, max_work_group_size
                ),
            })
        })
        .collect()
}

fn check_delimiters(tokens: &[Token]) -> Vec<Diagnostic> {
    let mut stack: Vec<&Token> = Vec::new();
    for token in tokens {
        match token.text.as_str() {
            "(" | "{" | "[" => stack.push(token),
            ")" | "}" | "]" => {
                let expected = match token.text.as_str() {
                    ")" => "(",
                    "}" => "{",
                    _ => "[",
                };
                match stack.pop() {
                    Some(open) if open.is(expected) => {}
                    _ => {
                        return vec![Diagnostic {
                            line: token.line,
                            message: format!("unmatched '{}'", token.text),
                        }];
                    }
                }
            }
            _ => {}
        }
    }
    stack
        .last()
        .map(|open| {
            vec![Diagnostic {
                line: open.line,
                message: format!("'{}' is never closed", open.text),
            }]
        })
        .unwrap_or_default()
}

/// Replaces comments with spaces, keeping line breaks so line numbers hold.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Identifiers, numbers and single-character punctuation. Preprocessor lines
/// are skipped.
fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        if line.trim_start().starts_with('#') {
            continue;
        }
        let mut chars = line.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            if c.is_whitespace() {
                continue;
            }
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    text: line[start..end].to_string(),
                    line: line_no,
                });
            } else {
                tokens.push(Token {
                    text: c.to_string(),
                    line: line_no,
                });
            }
        }
    }
    tokens
}
