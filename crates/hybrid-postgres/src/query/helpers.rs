//! Identifier validation and placeholder helpers.

use crate::{HybridError, Result};
use unicode_normalization::UnicodeNormalization;

/// Quotes a SQL identifier.
///
/// Handles qualified names (`schema.table`, `table.column`) by quoting each part separately.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Validates a SQL identifier (table/column name).
///
/// Accepts a simple identifier or a two-part qualified one (`public.users`, `users.id`).
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HybridError::Query("Identifier cannot be empty".to_string()));
    }

    if name.contains('.') {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 2 {
            return Err(HybridError::Query(format!(
                "Invalid qualified identifier '{}': expected 'qualifier.name'",
                name
            )));
        }
        for part in parts {
            validate_identifier_part(part)?;
        }
        return Ok(());
    }

    validate_identifier_part(name)
}

/// Validates a single part of an identifier (no dots allowed).
pub fn validate_identifier_part(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HybridError::Query("Identifier part cannot be empty".to_string()));
    }

    // NFKC folds Unicode confusables before the ASCII check
    let name = name.nfkc().collect::<String>();

    // PostgreSQL limit is 63 bytes per part
    if name.len() > 63 {
        return Err(HybridError::Query(format!(
            "Identifier '{}' exceeds maximum length of 63",
            name
        )));
    }

    let first_char = name
        .chars()
        .next()
        .ok_or_else(|| HybridError::Query(format!("Identifier '{}' is empty or invalid", name)))?;
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(HybridError::Query(format!(
            "Identifier '{}' must start with a letter or underscore",
            name
        )));
    }

    if let Some(ch) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(HybridError::Query(format!(
            "Identifier '{}' contains invalid character '{}'",
            name, ch
        )));
    }

    let name_lower = name.to_lowercase();
    if name_lower.starts_with("pg_") {
        return Err(HybridError::Query(format!(
            "Access to PostgreSQL system catalog '{}' is not allowed",
            name
        )));
    }
    if name_lower == "information_schema" {
        return Err(HybridError::Query(
            "Access to information_schema is not allowed".to_string(),
        ));
    }

    const SQL_KEYWORDS: &[&str] = &[
        "select", "insert", "update", "delete", "drop", "create", "alter",
        "truncate", "grant", "revoke", "exec", "execute", "union", "declare",
        "table", "index", "view", "schema", "database",
        "from", "where", "join", "inner", "outer", "left", "right",
        "on", "using", "and", "or", "not", "in", "exists", "between",
        "like", "ilike", "is", "null", "true", "false", "case", "when",
        "then", "else", "as", "by", "having",
        "limit", "offset", "distinct", "all", "any", "some",
    ];

    if SQL_KEYWORDS.contains(&name_lower.as_str()) {
        return Err(HybridError::Query(format!(
            "Identifier '{}' is a reserved SQL keyword",
            name
        )));
    }

    Ok(())
}

/// Visits every `$n` placeholder outside single-quoted literals.
///
/// `on_param` receives the placeholder number and returns its replacement text.
pub(crate) fn rewrite_placeholders(sql: &str, mut on_param: impl FnMut(usize) -> String) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;

    while let Some(ch) = chars.next() {
        if ch == '\'' {
            in_literal = !in_literal;
            result.push(ch);
            continue;
        }
        if ch != '$' || in_literal {
            result.push(ch);
            continue;
        }

        let mut num_str = String::new();
        while let Some(&next_ch) = chars.peek() {
            if !next_ch.is_ascii_digit() {
                break;
            }
            num_str.push(next_ch);
            chars.next();
        }

        match num_str.parse::<usize>() {
            Ok(num) => result.push_str(&on_param(num)),
            Err(_) => {
                result.push('$');
                result.push_str(&num_str);
            }
        }
    }

    result
}

/// Shifts every `$n` placeholder in `sql` by `offset`.
pub fn adjust_param_indices(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    rewrite_placeholders(sql, |num| format!("${}", num + offset))
}
