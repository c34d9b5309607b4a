//! Whitelisted transform registry.
//!
//! Every transform is a pure function over its input text: no store
//! access, no clock, no randomness. The whitelist is a closed enum so
//! dispatch is an exhaustive match and an unknown operation can only be
//! rejected, never invented.

use crate::error::{AgramaError, AgramaResult};
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use similar::{ChangeTag, TextDiff};
use std::sync::OnceLock;

/// The closed set of transform operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformOp {
    /// Extract function signatures from source text
    ParseFunctions,
    /// Extract import/use statements
    ExtractImports,
    /// Produce a leading-sentence summary with basic stats
    GenerateSummary,
    /// Collapse whitespace and blank lines
    CompressText,
    /// Line diff of the input against `options.original`
    DiffContent,
    /// Line-level union merge of the input with `options.other`
    MergeContent,
    /// Count lines, functions, branches; estimate cyclomatic complexity
    AnalyzeComplexity,
    /// Extract declared dependency names from manifest-like text
    ExtractDependencies,
    /// Check delimiter balance, reporting the first offending line
    ValidateSyntax,
}

impl TransformOp {
    /// All operations, in wire-name order.
    pub const ALL: [TransformOp; 9] = [
        TransformOp::ParseFunctions,
        TransformOp::ExtractImports,
        TransformOp::GenerateSummary,
        TransformOp::CompressText,
        TransformOp::DiffContent,
        TransformOp::MergeContent,
        TransformOp::AnalyzeComplexity,
        TransformOp::ExtractDependencies,
        TransformOp::ValidateSyntax,
    ];

    /// Resolve a wire name.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for anything outside the whitelist.
    pub fn from_name(name: &str) -> AgramaResult<Self> {
        match name {
            "parse_functions" => Ok(TransformOp::ParseFunctions),
            "extract_imports" => Ok(TransformOp::ExtractImports),
            "generate_summary" => Ok(TransformOp::GenerateSummary),
            "compress_text" => Ok(TransformOp::CompressText),
            "diff_content" => Ok(TransformOp::DiffContent),
            "merge_content" => Ok(TransformOp::MergeContent),
            "analyze_complexity" => Ok(TransformOp::AnalyzeComplexity),
            "extract_dependencies" => Ok(TransformOp::ExtractDependencies),
            "validate_syntax" => Ok(TransformOp::ValidateSyntax),
            other => Err(AgramaError::UnsupportedOperation {
                operation: other.to_string(),
            }),
        }
    }

    /// The operation's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::ParseFunctions => "parse_functions",
            TransformOp::ExtractImports => "extract_imports",
            TransformOp::GenerateSummary => "generate_summary",
            TransformOp::CompressText => "compress_text",
            TransformOp::DiffContent => "diff_content",
            TransformOp::MergeContent => "merge_content",
            TransformOp::AnalyzeComplexity => "analyze_complexity",
            TransformOp::ExtractDependencies => "extract_dependencies",
            TransformOp::ValidateSyntax => "validate_syntax",
        }
    }

    /// Apply the transform to `data`.
    ///
    /// `options` carries operation-specific inputs (`original` for diff,
    /// `other` for merge). Execution is pure: identical inputs always
    /// produce identical output.
    pub fn apply(&self, data: &str, options: &JsonValue) -> AgramaResult<JsonValue> {
        match self {
            TransformOp::ParseFunctions => Ok(parse_functions(data)),
            TransformOp::ExtractImports => Ok(extract_imports(data)),
            TransformOp::GenerateSummary => Ok(generate_summary(data)),
            TransformOp::CompressText => Ok(compress_text(data)),
            TransformOp::DiffContent => {
                let original = require_str_option(options, "original")?;
                Ok(diff_content(original, data))
            }
            TransformOp::MergeContent => {
                let other = require_str_option(options, "other")?;
                Ok(merge_content(data, other))
            }
            TransformOp::AnalyzeComplexity => Ok(analyze_complexity(data)),
            TransformOp::ExtractDependencies => Ok(extract_dependencies(data)),
            TransformOp::ValidateSyntax => Ok(validate_syntax(data)),
        }
    }
}

fn require_str_option<'a>(options: &'a JsonValue, field: &str) -> AgramaResult<&'a str> {
    match options.get(field) {
        Some(JsonValue::String(s)) => Ok(s),
        Some(_) => Err(AgramaError::InvalidType {
            field: field.to_string(),
            expected: "string".to_string(),
        }),
        None => Err(AgramaError::MissingField {
            field: field.to_string(),
        }),
    }
}

fn function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Rust fns (with visibility/async), JS/TS functions, Python defs,
        // Go funcs. Captures the signature up to (but excluding) the body.
        Regex::new(
            r"(?m)^\s*((?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+\w+\s*(?:<[^>{]*>)?\s*\([^)]*\)(?:\s*->\s*[^{;]+?)?|(?:async\s+)?function\s*\*?\s*\w*\s*\([^)]*\)|def\s+\w+\s*\([^)]*\)|func\s+(?:\([^)]*\)\s*)?\w+\s*\([^)]*\))",
        )
        .expect("function regex")
    })
}

fn parse_functions(data: &str) -> JsonValue {
    let functions: Vec<String> = function_regex()
        .captures_iter(data)
        .map(|c| c[1].trim().to_string())
        .collect();
    json!(functions)
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*(use\s+[\w:{}*,\s]+?;|import\s+[^;\n]+|from\s+[\w.]+\s+import\s+[^\n]+|(?:const|let|var)\s+\w+\s*=\s*require\([^)]*\))"#,
        )
        .expect("import regex")
    })
}

fn extract_imports(data: &str) -> JsonValue {
    let imports: Vec<String> = import_regex()
        .captures_iter(data)
        .map(|c| c[1].trim().to_string())
        .collect();
    json!(imports)
}

fn generate_summary(data: &str) -> JsonValue {
    let trimmed = data.trim();
    let words = trimmed.split_whitespace().count();
    let lines = trimmed.lines().count();

    // Leading sentences, capped at 240 chars on a char boundary
    const SENTENCE_ENDS: &[char] = &['.', '!', '?'];
    let mut summary = String::new();
    for sentence in trimmed.split_inclusive(SENTENCE_ENDS) {
        summary.push_str(sentence);
        if summary.trim_end().ends_with(SENTENCE_ENDS) && summary.len() >= 40 {
            break;
        }
        if summary.len() >= 240 {
            break;
        }
    }
    let mut summary = summary.trim().to_string();
    if summary.len() > 240 {
        let cut = summary
            .char_indices()
            .take_while(|&(i, _)| i < 240)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        summary.truncate(cut);
        summary.push('…');
    }

    json!({
        "summary": summary,
        "word_count": words,
        "line_count": lines,
    })
}

fn compress_text(data: &str) -> JsonValue {
    let compressed: Vec<String> = data
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    let output = compressed.join("\n");
    json!({
        "text": output,
        "original_length": data.len(),
        "compressed_length": output.len(),
    })
}

fn diff_content(original: &str, updated: &str) -> JsonValue {
    let diff = TextDiff::from_lines(original, updated);
    let mut changes = Vec::new();
    let mut added = 0usize;
    let mut removed = 0usize;

    for change in diff.iter_all_changes() {
        let tag = match change.tag() {
            ChangeTag::Delete => {
                removed += 1;
                "-"
            }
            ChangeTag::Insert => {
                added += 1;
                "+"
            }
            ChangeTag::Equal => " ",
        };
        changes.push(format!("{}{}", tag, change.value().trim_end_matches('\n')));
    }

    json!({
        "changes": changes,
        "added": added,
        "removed": removed,
        "ratio": diff.ratio(),
    })
}

fn merge_content(ours: &str, other: &str) -> JsonValue {
    // Union merge: keep our lines in order, append other's lines that we
    // don't already have, preserving their relative order.
    let ours_lines: Vec<&str> = ours.lines().collect();
    let have: std::collections::HashSet<&str> = ours_lines.iter().copied().collect();
    let mut merged: Vec<&str> = ours_lines.clone();
    let mut appended = 0usize;
    for line in other.lines() {
        if !have.contains(line) {
            merged.push(line);
            appended += 1;
        }
    }
    json!({
        "text": merged.join("\n"),
        "kept": ours_lines.len(),
        "appended": appended,
    })
}

fn analyze_complexity(data: &str) -> JsonValue {
    static BRANCH_RE: OnceLock<Regex> = OnceLock::new();
    let branch_re = BRANCH_RE.get_or_init(|| {
        Regex::new(r"\b(?:if|else if|elif|for|while|match|switch|case|catch)\b|&&|\|\|")
            .expect("branch regex")
    });

    let lines = data.lines().count();
    let functions = function_regex().captures_iter(data).count();
    let branches = branch_re.find_iter(data).count();

    let mut depth = 0usize;
    let mut max_depth = 0usize;
    for c in data.chars() {
        match c {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    json!({
        "lines": lines,
        "functions": functions,
        "branches": branches,
        "max_nesting": max_depth,
        // Classic estimate: decision points + 1
        "cyclomatic": branches + 1,
    })
}

fn extract_dependencies(data: &str) -> JsonValue {
    static DEP_RE: OnceLock<Regex> = OnceLock::new();
    let dep_re = DEP_RE.get_or_init(|| {
        // TOML table entries (`serde = "1.0"` / `serde = { ... }`) and
        // package.json-style `"name": "version"` pairs.
        Regex::new(r#"(?m)^\s*(?:"([\w@/.-]+)"\s*:\s*"[^"]+"|([\w-]+)\s*=\s*(?:\{|"[^"]+"))"#)
            .expect("dependency regex")
    });

    let mut deps = Vec::new();
    for capture in dep_re.captures_iter(data) {
        let name = capture
            .get(1)
            .or_else(|| capture.get(2))
            .map(|m| m.as_str().to_string());
        if let Some(name) = name {
            if !deps.contains(&name) {
                deps.push(name);
            }
        }
    }
    json!(deps)
}

fn validate_syntax(data: &str) -> JsonValue {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (line_no, line) in data.lines().enumerate() {
        for c in line.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match in_string {
                Some(quote) => match c {
                    '\\' => escaped = true,
                    _ if c == quote => in_string = None,
                    _ => {}
                },
                None => match c {
                    '"' | '\'' => in_string = Some(c),
                    '(' | '[' | '{' => stack.push((c, line_no + 1)),
                    ')' | ']' | '}' => {
                        let expected = match c {
                            ')' => '(',
                            ']' => '[',
                            _ => '{',
                        };
                        match stack.pop() {
                            Some((open, _)) if open == expected => {}
                            Some((open, open_line)) => errors.push(format!(
                                "line {}: '{}' closes '{}' opened on line {}",
                                line_no + 1,
                                c,
                                open,
                                open_line
                            )),
                            None => errors
                                .push(format!("line {}: unmatched '{}'", line_no + 1, c)),
                        }
                    }
                    _ => {}
                },
            }
        }
        // String literals don't span lines in this check
        in_string = None;
        escaped = false;
    }

    for (open, line) in stack {
        errors.push(format!("line {line}: unclosed '{open}'"));
    }

    json!({
        "valid": errors.is_empty(),
        "errors": errors,
    })
}
