//! Lightweight statement classification for the project-data tools.
//!
//! This is not a SQL parser. It tokenizes just enough (words, semicolons,
//! quoted text, comments) to tell a single read from a single data write.

use helmsman_core::error::ToolError;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Semicolon,
}

/// Keywords that never belong in a read or a data write.
const SCHEMA_KEYWORDS: &[&str] = &[
    "drop", "alter", "create", "attach", "detach", "pragma", "vacuum", "reindex",
];

const WRITE_KEYWORDS: &[&str] = &["insert", "update", "delete"];

fn skip_quoted(chars: &mut Peekable<Chars<'_>>, close: char) {
    while let Some(c) = chars.next() {
        if c == close {
            // A doubled quote is an escaped quote
            if close != ']' && chars.peek() == Some(&close) {
                chars.next();
                continue;
            }
            return;
        }
    }
}

fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => skip_quoted(&mut chars, c),
            '[' => skip_quoted(&mut chars, ']'),
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ';' => tokens.push(Token::Semicolon),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c.to_ascii_lowercase());
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next.to_ascii_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            _ => {}
        }
    }
    tokens
}

/// Words of the one statement in `sql`; trailing semicolons are allowed.
fn single_statement_words(tool_name: &str, sql: &str) -> Result<Vec<String>, ToolError> {
    let mut words = Vec::new();
    let mut terminated = false;
    for token in tokenize(sql) {
        match token {
            Token::Semicolon => terminated = true,
            Token::Word(_) if terminated => {
                return Err(ToolError::InvalidArguments(format!(
                    "{tool_name} accepts a single SQL statement"
                )));
            }
            Token::Word(word) => words.push(word),
        }
    }
    if words.is_empty() {
        return Err(ToolError::InvalidArguments("Empty SQL statement".into()));
    }
    Ok(words)
}

fn denied(tool_name: &str, reason: impl Into<String>) -> ToolError {
    ToolError::PermissionDenied {
        tool_name: tool_name.to_string(),
        reason: reason.into(),
    }
}

fn has_replace_into(words: &[String]) -> bool {
    words.windows(2).any(|w| w[0] == "replace" && w[1] == "into")
}

fn schema_keyword(words: &[String]) -> Option<&str> {
    words
        .iter()
        .find(|w| SCHEMA_KEYWORDS.contains(&w.as_str()))
        .map(String::as_str)
}

/// Accept one `SELECT` or `WITH ... SELECT` statement.
pub fn ensure_read_only(tool_name: &str, sql: &str) -> Result<(), ToolError> {
    let words = single_statement_words(tool_name, sql)?;
    if !matches!(words[0].as_str(), "select" | "with") {
        return Err(denied(
            tool_name,
            format!("only SELECT statements are allowed, got {}", words[0].to_uppercase()),
        ));
    }
    if let Some(word) = words
        .iter()
        .find(|w| WRITE_KEYWORDS.contains(&w.as_str()))
        .map(String::as_str)
        .or_else(|| schema_keyword(&words))
    {
        return Err(denied(
            tool_name,
            format!("{} is not allowed in a read-only query", word.to_uppercase()),
        ));
    }
    if has_replace_into(&words) {
        return Err(denied(tool_name, "REPLACE is not allowed in a read-only query"));
    }
    Ok(())
}

/// Accept one `INSERT`, `UPDATE`, `DELETE` or `REPLACE` statement.
pub fn ensure_data_write(tool_name: &str, sql: &str) -> Result<(), ToolError> {
    let words = single_statement_words(tool_name, sql)?;
    if let Some(word) = schema_keyword(&words) {
        return Err(denied(
            tool_name,
            format!("{} statements are not allowed", word.to_uppercase()),
        ));
    }
    let writes =
        words.iter().any(|w| WRITE_KEYWORDS.contains(&w.as_str())) || has_replace_into(&words);
    let leading = matches!(words[0].as_str(), "insert" | "update" | "delete" | "replace" | "with");
    if !leading || !writes {
        return Err(denied(
            tool_name,
            "only INSERT, UPDATE and DELETE statements are allowed",
        ));
    }
    Ok(())
}
