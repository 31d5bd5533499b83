use regex::Regex;

/// Why a statement was refused by the read-only guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatementRejection {
    #[error("empty statement")]
    Empty,
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("only read-only SELECT statements are allowed, found '{0}'")]
    NotReadOnly(String),
}

/// Keywords that can only occur in a statement that writes, alters schema,
/// or changes connection state. Checked on the comment- and literal-stripped
/// text, so they cannot hide inside strings, quoted identifiers, or comments.
const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE", "GRANT", "REVOKE",
];

/// Accept exactly one SELECT (or WITH ... SELECT) statement; refuse anything
/// else. The statement type is allow-listed, not pattern-matched: comments,
/// string literals, and quoted identifiers are stripped first, so case games
/// and `SEL/**/ECT`-style obfuscation leave nothing recognizable behind.
pub fn ensure_read_only(sql: &str) -> Result<(), StatementRejection> {
    let stripped = strip_literals_and_comments(sql);
    let statements: Vec<&str> = stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match statements.len() {
        0 => Err(StatementRejection::Empty),
        1 => check_statement(statements[0]),
        _ => Err(StatementRejection::MultipleStatements),
    }
}

fn check_statement(stmt: &str) -> Result<(), StatementRejection> {
    let word = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").map_err(|_| StatementRejection::Empty)?;
    let keywords: Vec<String> = word.find_iter(stmt).map(|m| m.as_str().to_uppercase()).collect();
    let first = keywords.first().ok_or(StatementRejection::Empty)?;
    if first != "SELECT" && first != "WITH" {
        return Err(StatementRejection::NotReadOnly(first.clone()));
    }
    // A WITH-headed statement may still carry top-level DML; plain SELECTs
    // cannot legally contain these words outside quoted names, which are
    // already gone.
    for kw in &keywords {
        if WRITE_KEYWORDS.contains(&kw.as_str()) {
            return Err(StatementRejection::NotReadOnly(kw.clone()));
        }
    }
    Ok(())
}

/// Replace string literals, quoted identifiers, and comments with spaces.
/// SQLite block comments do not nest; `''` escapes a quote inside a string.
fn strip_literals_and_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            '\'' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.push(' ');
            }
            quote @ ('"' | '`') => {
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.push(' ');
            }
            '[' => {
                i += 1;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i = (i + 1).min(chars.len());
                out.push(' ');
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}
