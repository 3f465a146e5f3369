use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic kind of a target column, derived from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Bool,
    BigInt,
    Int,
    Float,
    DateTime,
    Json,
    Enum,
    Text,
}

impl ColumnKind {
    /// Classify a column from `DATA_TYPE` (e.g. `tinyint`) and the full
    /// `COLUMN_TYPE` (e.g. `enum('a','b')`).
    pub fn classify(data_type: &str, column_type: &str) -> Self {
        let data_type = data_type.trim().to_ascii_lowercase();
        let column_type = column_type.trim().to_ascii_lowercase();

        match data_type.as_str() {
            "bool" | "boolean" | "tinyint" => return ColumnKind::Bool,
            "enum" | "set" => return ColumnKind::Enum,
            _ => {}
        }
        if column_type.starts_with("enum(") || column_type.starts_with("set(") {
            return ColumnKind::Enum;
        }
        if data_type.contains("bigint") {
            ColumnKind::BigInt
        } else if data_type.contains("int") {
            ColumnKind::Int
        } else if ["float", "double", "decimal", "numeric", "real"]
            .iter()
            .any(|name| data_type.contains(name))
        {
            ColumnKind::Float
        } else if data_type.contains("datetime") || data_type.contains("timestamp") {
            ColumnKind::DateTime
        } else if data_type.contains("json") {
            ColumnKind::Json
        } else {
            ColumnKind::Text
        }
    }
}

/// Live metadata for one target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetColumnInfo {
    pub name: String,
    pub data_type: String,
    pub column_type: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<usize>,
    /// Ordered legal literals for enum-typed columns; empty otherwise.
    pub enum_values: Vec<String>,
    pub auto_increment: bool,
}

impl TargetColumnInfo {
    pub fn new(name: impl Into<String>, data_type: &str, column_type: &str) -> Self {
        let kind = ColumnKind::classify(data_type, column_type);
        let enum_values = if kind == ColumnKind::Enum {
            parse_enum_domain(column_type)
        } else {
            Vec::new()
        };
        Self {
            name: name.into(),
            data_type: data_type.to_ascii_lowercase(),
            column_type: column_type.to_string(),
            kind,
            nullable: true,
            default: None,
            max_length: None,
            enum_values,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// NOT NULL with neither a default nor a generated value.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.auto_increment
    }
}

/// Parse the literal list out of `enum('a','b')` / `set('a','b')`.
///
/// Literals keep their declared order. Doubled quotes and backslash escapes
/// inside a literal are unescaped.
pub fn parse_enum_domain(column_type: &str) -> Vec<String> {
    let trimmed = column_type.trim();
    let Some(open) = trimmed.find('(') else {
        return Vec::new();
    };
    let Some(close) = trimmed.rfind(')') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }

    let body: Vec<char> = trimmed[open + 1..close].chars().collect();
    let mut values = Vec::new();
    let mut idx = 0;

    while idx < body.len() {
        if body[idx] != '\'' {
            idx += 1;
            continue;
        }
        idx += 1;
        let mut literal = String::new();
        while idx < body.len() {
            match body[idx] {
                '\\' if idx + 1 < body.len() => {
                    literal.push(body[idx + 1]);
                    idx += 2;
                }
                '\'' if body.get(idx + 1) == Some(&'\'') => {
                    literal.push('\'');
                    idx += 2;
                }
                '\'' => {
                    idx += 1;
                    break;
                }
                ch => {
                    literal.push(ch);
                    idx += 1;
                }
            }
        }
        values.push(literal);
    }

    values
}

/// Columns of one target table keyed by column name.
pub type TableColumns = BTreeMap<String, TargetColumnInfo>;

/// Snapshot of every table currently present in the target database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSchema {
    tables: BTreeMap<String, TableColumns>,
}

impl TargetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_column(&mut self, table: &str, column: TargetColumnInfo) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(column.name.clone(), column);
    }

    pub fn with_table(mut self, table: &str, columns: Vec<TargetColumnInfo>) -> Self {
        let entry = self.tables.entry(table.to_string()).or_default();
        for column in columns {
            entry.insert(column.name.clone(), column);
        }
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableColumns> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enum_literals_in_order() {
        assert_eq!(
            parse_enum_domain("enum('active','on_hold','disabled')"),
            vec!["active", "on_hold", "disabled"]
        );
    }

    #[test]
    fn parses_escaped_literals() {
        assert_eq!(
            parse_enum_domain(r"enum('it''s','a\,b','h3,h2')"),
            vec!["it's", "a,b", "h3,h2"]
        );
        assert!(parse_enum_domain("varchar(64)").is_empty());
        assert!(parse_enum_domain("enum").is_empty());
    }

    #[test]
    fn classifies_mysql_types() {
        assert_eq!(ColumnKind::classify("tinyint", "tinyint(1)"), ColumnKind::Bool);
        assert_eq!(ColumnKind::classify("bigint", "bigint(20)"), ColumnKind::BigInt);
        assert_eq!(ColumnKind::classify("int", "int(11)"), ColumnKind::Int);
        assert_eq!(ColumnKind::classify("decimal", "decimal(10,2)"), ColumnKind::Float);
        assert_eq!(ColumnKind::classify("datetime", "datetime(6)"), ColumnKind::DateTime);
        assert_eq!(ColumnKind::classify("json", "json"), ColumnKind::Json);
        assert_eq!(ColumnKind::classify("enum", "enum('a')"), ColumnKind::Enum);
        assert_eq!(ColumnKind::classify("varchar", "varchar(64)"), ColumnKind::Text);
    }

    #[test]
    fn required_excludes_defaults_and_auto_increment() {
        let id = TargetColumnInfo::new("id", "int", "int").not_null().auto_increment();
        let status = TargetColumnInfo::new("status", "varchar", "varchar(8)")
            .not_null()
            .with_default("active");
        let name = TargetColumnInfo::new("name", "varchar", "varchar(8)").not_null();
        assert!(!id.is_required());
        assert!(!status.is_required());
        assert!(name.is_required());
    }
}
