//! SQL statement extraction
//!
//! Two sources feed this extractor:
//! - `.sql` files, split into statements line by line
//! - SQL embedded in Python string literals passed to a call
//!
//! Statement analysis is regex based on purpose. Table and column lists are a
//! best-effort approximation and will miss or misread nested expressions.

use super::{scan_markers, EntityKind, SourceEntity};
use super::python::strip_string_literal;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Kind of SQL statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Procedure,
    Function,
    View,
    Trigger,
    Query,
}

impl SqlType {
    fn from_keyword(keyword: &str) -> Self {
        match keyword.to_ascii_uppercase().as_str() {
            "PROCEDURE" => SqlType::Procedure,
            "FUNCTION" => SqlType::Function,
            "VIEW" => SqlType::View,
            "TRIGGER" => SqlType::Trigger,
            _ => SqlType::Query,
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Procedure => write!(f, "procedure"),
            SqlType::Function => write!(f, "function"),
            SqlType::View => write!(f, "view"),
            SqlType::Trigger => write!(f, "trigger"),
            SqlType::Query => write!(f, "query"),
        }
    }
}

/// A SQL statement extracted from a `.sql` file or a Python string literal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlBlock {
    /// Derived statement name
    pub name: String,
    /// File path relative to the source root
    pub file_path: String,
    /// First non-blank line of the statement
    pub start_line: usize,
    /// Last line of the statement
    pub end_line: usize,
    /// Statement text
    pub source_code: String,
    /// Explicit business rule annotations from `--` comments
    pub business_rule_markers: Vec<String>,
    /// Statement kind
    pub sql_type: SqlType,
    /// Referenced tables
    pub tables: Vec<String>,
    /// Selected columns
    pub columns: Vec<String>,
    /// Leading comment description
    pub description: Option<String>,
    /// Lifted from a Python string literal
    pub embedded: bool,
}

impl SourceEntity for SqlBlock {
    fn kind(&self) -> EntityKind {
        EntityKind::SqlBlock
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn file_path(&self) -> &str {
        &self.file_path
    }

    fn source_code(&self) -> &str {
        &self.source_code
    }

    fn business_rule_markers(&self) -> &[String] {
        &self.business_rule_markers
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// `CREATE [OR REPLACE] <KIND> [IF NOT EXISTS] <ident>`, anchored at the statement start
static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(PROCEDURE|FUNCTION|VIEW|TRIGGER)\b(?:\s+IF\s+NOT\s+EXISTS)?\s*([A-Za-z_"`\[][\w$."`\[\]]*)?"#,
    )
    .expect("valid create regex")
});

/// `-- name: <ident>`
static NAME_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^name\s*:\s*([A-Za-z_][\w.$]*)").expect("valid name regex"));

/// Leading `WITH <ident> AS`
static CTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^WITH\s+(?:RECURSIVE\s+)?([A-Za-z_]\w*)\s+AS\b").expect("valid cte regex")
});

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+([A-Za-z_][\w$]*(?:\.[A-Za-z_][\w$]*)*)")
        .expect("valid table regex")
});

static SELECT_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bSELECT\s+(?:DISTINCT\s+)?(.*?)\s+FROM\b").expect("valid select regex")
});

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bAS\s+["`]?([A-Za-z_]\w*)["`]?\s*$"#).expect("valid alias regex")
});

static TRAILING_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]\w*)\s*$").expect("valid identifier regex"));

/// A call whose first argument is a string literal
static EMBEDDED_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)\b[A-Za-z_][\w.]*\s*\(\s*([rRuUbBfF]{0,2}(?:"""(?:.*?)"""|'''(?:.*?)'''|"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'))"#,
    )
    .expect("valid embedded call regex")
});

/// A top-level clause keyword opening the text, after any `--` comment lines
static SQL_SNIFF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^(?:\s*--[^\n]*\n)*\s*\(?\s*(?:SELECT|INSERT|UPDATE|DELETE|CREATE|DROP|ALTER|TRUNCATE|MERGE|WITH)\b",
    )
    .expect("valid sniff regex")
});

/// Words that can follow `CREATE <kind>` when the object name is missing
const NOT_OBJECT_NAMES: &[&str] = &[
    "as", "after", "before", "instead", "on", "begin", "returns", "is",
];

/// Words the table regex can pick up that are never table names
const NON_TABLE_WORDS: &[&str] = &["select", "set", "values", "lateral"];

/// A raw statement produced by the splitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Split SQL file content into statements.
///
/// Lines accumulate into the open statement until a line ends with `;`.
/// Blank and comment lines stay with the statement they fall into; leftover
/// text at end of file becomes a final statement.
pub fn split_statements(content: &str) -> Vec<RawStatement> {
    let mut statements = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start = 0;

    for (idx, line) in content.lines().enumerate() {
        if current.is_empty() {
            start = idx + 1;
        }
        current.push(line);

        if line.trim().ends_with(';') {
            if let Some(statement) = finish_statement(&current, start, idx + 1) {
                statements.push(statement);
            }
            current.clear();
        }
    }

    if !current.is_empty() {
        let end = start + current.len() - 1;
        if let Some(statement) = finish_statement(&current, start, end) {
            statements.push(statement);
        }
    }

    statements
}

fn finish_statement(lines: &[&str], start: usize, end: usize) -> Option<RawStatement> {
    let leading_blank = lines.iter().take_while(|l| l.trim().is_empty()).count();
    if leading_blank == lines.len() {
        return None;
    }

    Some(RawStatement {
        text: lines[leading_blank..].join("\n").trim_end().to_string(),
        start_line: start + leading_blank,
        end_line: end,
    })
}

/// Leading comment block of a statement and the SQL that follows it
struct Preamble<'a> {
    description: Vec<&'a str>,
    name_hint: Option<&'a str>,
    body: &'a str,
}

fn read_preamble(text: &str) -> Preamble<'_> {
    let mut description = Vec::new();
    let mut name_hint = None;
    let mut describing = true;
    let mut in_block = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if in_block {
            if let Some(end) = line.find("*/") {
                in_block = false;
                let rest = &line[end + 2..];
                if !rest.trim().is_empty() {
                    let rest_start = line_start + end + 2;
                    return Preamble {
                        description,
                        name_hint,
                        body: text[rest_start..].trim_start(),
                    };
                }
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(comment) = trimmed.strip_prefix("--") {
            let comment = comment.trim();
            if let Some(caps) = NAME_HINT_RE.captures(comment) {
                if name_hint.is_none() {
                    name_hint = caps.get(1).map(|m| m.as_str());
                }
            } else if describing && !comment.is_empty() && scan_markers([comment]).is_empty() {
                // marker lines are reported as markers, not description
                description.push(comment);
            }
            continue;
        }

        if trimmed.starts_with("/*") {
            // A block comment ends the description without adding to it
            describing = false;
            let block_start = line_start + line.find("/*").unwrap_or(0);
            match text[block_start + 2..].find("*/") {
                Some(rel_end) if block_start + 2 + rel_end < offset => {
                    let after = block_start + 2 + rel_end + 2;
                    if !text[after..offset].trim().is_empty() {
                        return Preamble {
                            description,
                            name_hint,
                            body: text[after..].trim_start(),
                        };
                    }
                }
                _ => in_block = true,
            }
            continue;
        }

        return Preamble {
            description,
            name_hint,
            body: text[line_start..].trim_start(),
        };
    }

    Preamble {
        description,
        name_hint,
        body: "",
    }
}

/// Drop `--` comment tails so keywords inside comments are not analyzed
fn strip_line_comments(body: &str) -> String {
    body.lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_identifier(ident: &str) -> String {
    ident
        .chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect()
}

/// Derived facts about one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementInfo {
    pub name: String,
    pub sql_type: SqlType,
    pub description: Option<String>,
    pub business_rule_markers: Vec<String>,
    pub tables: Vec<String>,
    pub columns: Vec<String>,
}

/// Analyze a statement: type, name, description, markers, tables, columns
pub fn analyze_statement(text: &str) -> StatementInfo {
    let preamble = read_preamble(text);
    let body = strip_line_comments(preamble.body);
    let body = body.trim_start();

    let (sql_type, name) = match CREATE_RE.captures(body) {
        Some(caps) => {
            let sql_type = SqlType::from_keyword(&caps[1]);
            let name = caps
                .get(2)
                .map(|m| clean_identifier(m.as_str()))
                .filter(|n| {
                    !n.is_empty() && !NOT_OBJECT_NAMES.contains(&n.to_ascii_lowercase().as_str())
                })
                .unwrap_or_else(|| format!("unnamed_{}", sql_type));
            (sql_type, name)
        }
        None => {
            let name = if let Some(hint) = preamble.name_hint {
                hint.to_string()
            } else if let Some(caps) = CTE_RE.captures(body) {
                format!("cte_{}", &caps[1])
            } else {
                "unnamed_query".to_string()
            };
            (SqlType::Query, name)
        }
    };

    let description = if preamble.description.is_empty() {
        None
    } else {
        Some(preamble.description.join(" "))
    };

    let comment_lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.trim().strip_prefix("--"))
        .collect();
    let business_rule_markers = scan_markers(comment_lines);

    StatementInfo {
        name,
        sql_type,
        description,
        business_rule_markers,
        tables: extract_tables(body),
        columns: extract_columns(body),
    }
}

/// Identifiers following FROM / JOIN / INTO / UPDATE, first-seen order
pub fn extract_tables(body: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();

    for caps in TABLE_RE.captures_iter(body) {
        let table = caps[1].to_string();
        if NON_TABLE_WORDS.contains(&table.to_ascii_lowercase().as_str()) {
            continue;
        }
        if !tables.contains(&table) {
            tables.push(table);
        }
    }

    tables
}

/// Output column names of the first `SELECT ... FROM`
pub fn extract_columns(body: &str) -> Vec<String> {
    let Some(caps) = SELECT_LIST_RE.captures(body) else {
        return Vec::new();
    };

    let mut columns: Vec<String> = Vec::new();
    for item in caps[1].split(',') {
        let item = item.trim();
        if item.is_empty() || item == "*" || item.ends_with(".*") {
            continue;
        }

        let column = ALIAS_RE
            .captures(item)
            .or_else(|| TRAILING_IDENT_RE.captures(item))
            .map(|c| c[1].to_string());

        if let Some(column) = column {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }

    columns
}

/// Whether a string literal's content looks like SQL
pub fn looks_like_sql(text: &str) -> bool {
    SQL_SNIFF_RE.is_match(text)
}

/// Extracts SQL blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlExtractor;

impl SqlExtractor {
    /// Create a new SQL extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract statements from a `.sql` file
    pub fn extract_file(&self, file_path: &str, content: &str) -> Vec<SqlBlock> {
        split_statements(content)
            .into_iter()
            .map(|statement| {
                let info = analyze_statement(&statement.text);
                SqlBlock {
                    name: info.name,
                    file_path: file_path.to_string(),
                    start_line: statement.start_line,
                    end_line: statement.end_line,
                    source_code: statement.text,
                    business_rule_markers: info.business_rule_markers,
                    sql_type: info.sql_type,
                    tables: info.tables,
                    columns: info.columns,
                    description: info.description,
                    embedded: false,
                }
            })
            .collect()
    }

    /// Extract SQL passed as a string literal argument in Python source
    pub fn extract_embedded(&self, file_path: &str, content: &str) -> Vec<SqlBlock> {
        let mut blocks = Vec::new();

        for caps in EMBEDDED_CALL_RE.captures_iter(content) {
            let (Some(call), Some(literal)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            let sql = strip_string_literal(literal.as_str()).trim();
            if !looks_like_sql(sql) {
                continue;
            }

            let start_line = content[..call.start()].matches('\n').count() + 1;
            let end_line = start_line + call.as_str().matches('\n').count();
            let info = analyze_statement(sql);

            blocks.push(SqlBlock {
                name: format!("embedded_sql_{}", blocks.len() + 1),
                file_path: file_path.to_string(),
                start_line,
                end_line,
                source_code: sql.to_string(),
                business_rule_markers: info.business_rule_markers,
                sql_type: info.sql_type,
                tables: info.tables,
                columns: info.columns,
                description: info.description,
                embedded: true,
            });
        }

        blocks
    }
}
