// crates/p2n-notebook/src/validator.rs
// ============================================================================
// Module: Notebook Validator
// Description: Static checks run before any notebook blob is persisted.
// Purpose: Reject generation bugs without executing any code.
// Dependencies: crate::notebook, serde
// ============================================================================

//! ## Overview
//! Two checks gate persistence: a conservative surface-syntax check over each
//! code cell (string termination, bracket balance, indentation consistency,
//! block introducers) and a forbidden-argument table for known library
//! symbols. Textual matching may flag commented-out code; that trade is
//! accepted because a missed real violation fails the run much later.
//!
//! Future check categories are interfaces only: import-use consistency via
//! syntax-tree analysis, bounded dry-run execution, per-generator self-test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::notebook::Notebook;

// ============================================================================
// SECTION: Issues
// ============================================================================

/// Category of a validation issue.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Surface-syntax violation.
    Syntax,
    /// Forbidden keyword argument for a known symbol.
    ForbiddenArgument,
}

/// One validation issue with its location.
///
/// # Invariants
/// - `cell_index` counts all cells; `line` is 1-based within the cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Index of the offending cell.
    pub cell_index: usize,
    /// 1-based line within the cell.
    pub line: usize,
    /// Issue category.
    pub kind: IssueKind,
    /// Human-readable reason.
    pub message: String,
}

// ============================================================================
// SECTION: Forbidden Argument Rules
// ============================================================================

/// A forbidden keyword argument for a known API symbol.
#[derive(Debug, Clone, Copy)]
pub struct ForbiddenArgRule {
    /// Call symbol the rule applies to.
    pub symbol: &'static str,
    /// Forbidden keyword argument.
    pub argument: &'static str,
    /// Human reason reported on violation.
    pub reason: &'static str,
}

/// The forbidden-argument rule table.
pub const FORBIDDEN_ARG_RULES: [ForbiddenArgRule; 3] = [
    ForbiddenArgRule {
        symbol: "CountVectorizer",
        argument: "random_state",
        reason: "deterministic, does not accept random_state",
    },
    ForbiddenArgRule {
        symbol: "TfidfVectorizer",
        argument: "random_state",
        reason: "deterministic, does not accept random_state",
    },
    ForbiddenArgRule {
        symbol: "make_classification",
        argument: "stratify",
        reason: "stratify belongs to train_test_split, not the generator",
    },
];

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a notebook, returning every issue found.
///
/// An empty result means the notebook may be persisted.
#[must_use]
pub fn validate_notebook(notebook: &Notebook) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (cell_index, cell) in notebook.cells.iter().enumerate() {
        if !cell.is_code() {
            continue;
        }
        let source = cell.source_text();
        check_syntax(cell_index, &source, &mut issues);
        check_forbidden_arguments(cell_index, &source, &mut issues);
    }
    issues
}

// ============================================================================
// SECTION: Syntax Check
// ============================================================================

/// Per-line scan state for the surface-syntax check.
#[derive(Default)]
struct SyntaxScan {
    /// Net bracket depth across the cell.
    depth: i64,
    /// Open triple-quote delimiter, when inside a block string.
    triple: Option<&'static str>,
    /// Pending block introducer line awaiting an indented body.
    pending_block: Option<(usize, usize)>,
}

/// Runs the conservative surface-syntax check over one code cell.
fn check_syntax(cell_index: usize, source: &str, issues: &mut Vec<ValidationIssue>) {
    let mut scan = SyntaxScan::default();

    for (offset, line) in source.lines().enumerate() {
        let line_number = offset + 1;
        if scan.triple.is_some() {
            scan.absorb_triple_continuation(line);
            continue;
        }

        let indent = leading_indent(line);
        if indent.contains(' ') && indent.contains('\t') {
            issues.push(ValidationIssue {
                cell_index,
                line: line_number,
                kind: IssueKind::Syntax,
                message: "indentation mixes tabs and spaces".to_string(),
            });
        }

        let code = match scan_line(line, &mut scan) {
            Ok(code) => code,
            Err(message) => {
                issues.push(ValidationIssue {
                    cell_index,
                    line: line_number,
                    kind: IssueKind::Syntax,
                    message,
                });
                continue;
            }
        };
        if scan.depth < 0 {
            issues.push(ValidationIssue {
                cell_index,
                line: line_number,
                kind: IssueKind::Syntax,
                message: "unbalanced closing bracket".to_string(),
            });
            scan.depth = 0;
        }

        let trimmed = code.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((intro_line, intro_indent)) = scan.pending_block.take()
            && indent.len() <= intro_indent
        {
            issues.push(ValidationIssue {
                cell_index,
                line: intro_line,
                kind: IssueKind::Syntax,
                message: "block introducer is not followed by an indented line".to_string(),
            });
        }
        if scan.depth == 0 && trimmed.ends_with(':') {
            scan.pending_block = Some((line_number, indent.len()));
        }
    }

    if let Some((intro_line, _)) = scan.pending_block {
        issues.push(ValidationIssue {
            cell_index,
            line: intro_line,
            kind: IssueKind::Syntax,
            message: "block introducer is not followed by an indented line".to_string(),
        });
    }
    if scan.triple.is_some() {
        issues.push(ValidationIssue {
            cell_index,
            line: source.lines().count(),
            kind: IssueKind::Syntax,
            message: "unterminated triple-quoted string".to_string(),
        });
    }
    if scan.depth > 0 {
        issues.push(ValidationIssue {
            cell_index,
            line: source.lines().count(),
            kind: IssueKind::Syntax,
            message: "unbalanced opening bracket".to_string(),
        });
    }
}

impl SyntaxScan {
    /// Consumes a line inside a triple-quoted string.
    fn absorb_triple_continuation(&mut self, line: &str) {
        if let Some(delimiter) = self.triple
            && line.contains(delimiter)
        {
            self.triple = None;
        }
    }
}

/// Returns the leading whitespace of a line.
fn leading_indent(line: &str) -> &str {
    let end = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..end]
}

/// Scans one line outside triple strings: strings, comments, brackets.
///
/// Operates on bytes so multi-byte text inside literals cannot break the
/// scan. Returns the line with comments and strings removed, or an error
/// message for an unterminated single-line string.
fn scan_line(line: &str, scan: &mut SyntaxScan) -> Result<String, String> {
    let mut code = String::new();
    let bytes = line.as_bytes();
    let mut position = 0usize;

    while position < bytes.len() {
        let rest = &bytes[position..];
        if rest.starts_with(b"\"\"\"") || rest.starts_with(b"'''") {
            let delimiter = if rest.starts_with(b"\"\"\"") { "\"\"\"" } else { "'''" };
            if let Some(end) = find_subslice(&rest[3..], delimiter.as_bytes()) {
                position += 3 + end + 3;
            } else {
                scan.triple = Some(delimiter);
                return Ok(code);
            }
            continue;
        }
        let byte = bytes[position];
        match byte {
            b'#' => return Ok(code),
            b'"' | b'\'' => {
                let closed = scan_string(bytes, position);
                match closed {
                    Some(next) => position = next,
                    None => return Err("unterminated string literal".to_string()),
                }
            }
            b'(' | b'[' | b'{' => {
                scan.depth += 1;
                code.push(char::from(byte));
                position += 1;
            }
            b')' | b']' | b'}' => {
                scan.depth -= 1;
                code.push(char::from(byte));
                position += 1;
            }
            _ => {
                code.push(char::from(byte));
                position += 1;
            }
        }
    }
    Ok(code)
}

/// Finds the first occurrence of a needle in a byte slice.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Scans a single-line string literal, returning the index after its close.
fn scan_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut position = start + 1;
    while position < bytes.len() {
        match bytes[position] {
            b'\\' => position += 2,
            byte if byte == quote => return Some(position + 1),
            _ => position += 1,
        }
    }
    None
}

// ============================================================================
// SECTION: Forbidden Argument Check
// ============================================================================

/// Runs the forbidden-argument table over one code cell.
///
/// Matching is conservative and textual: commented-out violations may be
/// reported, real violations never slip through.
fn check_forbidden_arguments(cell_index: usize, source: &str, issues: &mut Vec<ValidationIssue>) {
    for rule in FORBIDDEN_ARG_RULES {
        let needle = format!("{}(", rule.symbol);
        let mut search_from = 0usize;
        while let Some(found) = source[search_from..].find(&needle) {
            let call_start = search_from + found;
            let args_start = call_start + needle.len();
            let span = call_span(source, args_start);
            if let Some(argument_offset) = find_keyword_argument(&source[args_start..span], rule.argument)
            {
                let absolute = args_start + argument_offset;
                issues.push(ValidationIssue {
                    cell_index,
                    line: line_of(source, absolute),
                    kind: IssueKind::ForbiddenArgument,
                    message: format!(
                        "{}() must not receive {}: {}",
                        rule.symbol, rule.argument, rule.reason
                    ),
                });
            }
            search_from = span.max(args_start);
        }
    }
}

/// Returns the end offset of a call's argument span via bracket counting.
fn call_span(source: &str, args_start: usize) -> usize {
    let mut depth = 1i64;
    for (offset, byte) in source.as_bytes().iter().enumerate().skip(args_start) {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return offset;
                }
            }
            _ => {}
        }
    }
    source.len()
}

/// Finds a keyword-argument use of `argument` inside an argument span.
fn find_keyword_argument(span: &str, argument: &str) -> Option<usize> {
    let mut search_from = 0usize;
    while let Some(found) = span[search_from..].find(argument) {
        let start = search_from + found;
        let after = span[start + argument.len()..].trim_start();
        let boundary_before = start == 0
            || !span.as_bytes()[start - 1].is_ascii_alphanumeric()
                && span.as_bytes()[start - 1] != b'_';
        if boundary_before && after.starts_with('=') && !after.starts_with("==") {
            return Some(start);
        }
        search_from = start + argument.len();
    }
    None
}

/// Returns the 1-based line of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&byte| byte == b'\n').count() + 1
}
