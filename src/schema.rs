// 📐 Shape Layer - Entity schemas
// Declares every API entity once (fields, kinds, widths, uniqueness, parents)
// so storage, filtering and validation can be written a single time.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

// ============================================================================
// FIELD KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed-width classification code (e.g. "A", "01", "0111301")
    Code { width: usize },
    /// Free text with an upper bound on length
    Text { max_len: usize },
    /// Fixed-point decimal, stored in canonical "123.45" form
    Decimal { max_digits: usize, places: usize },
    /// Calendar day, stored as YYYY-MM-DD
    Date,
    /// Integer id of a row in another entity
    ForeignKey { target: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Name used in JSON payloads and query parameters
    pub name: &'static str,
    /// Column name in SQLite
    pub column: &'static str,
    pub kind: FieldKind,
    pub unique: bool,
}

/// How list/retrieve responses are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadShape {
    /// `{id, <field>...}` with foreign keys rendered as ids
    Plain,
    /// Collection records denormalized with ancestor codes and descriptions
    Collection,
}

#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub shape: ReadShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Integer,
    Text,
}

/// One projected column of a read query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadColumn {
    pub name: &'static str,
    pub expr: String,
    pub kind: ReadKind,
}

#[derive(Debug, Clone)]
pub struct ReadQuery {
    pub from: String,
    pub columns: Vec<ReadColumn>,
}

const DESCRIPTION_MAX_LEN: usize = 255;

const fn code(width: usize) -> FieldDef {
    FieldDef {
        name: "codigo",
        column: "codigo",
        kind: FieldKind::Code { width },
        unique: true,
    }
}

const DESCRIPTION: FieldDef = FieldDef {
    name: "descricao",
    column: "descricao",
    kind: FieldKind::Text {
        max_len: DESCRIPTION_MAX_LEN,
    },
    unique: true,
};

const fn parent(name: &'static str, column: &'static str) -> FieldDef {
    FieldDef {
        name,
        column,
        kind: FieldKind::ForeignKey { target: name },
        unique: false,
    }
}

// ============================================================================
// ENTITY DECLARATIONS
// ============================================================================

pub static SECAO: EntitySchema = EntitySchema {
    name: "secao",
    table: "secao",
    fields: &[code(1), DESCRIPTION],
    shape: ReadShape::Plain,
};

pub static DIVISAO: EntitySchema = EntitySchema {
    name: "divisao",
    table: "divisao",
    fields: &[code(2), DESCRIPTION, parent("secao", "secao_id")],
    shape: ReadShape::Plain,
};

pub static GRUPO: EntitySchema = EntitySchema {
    name: "grupo",
    table: "grupo",
    fields: &[code(3), DESCRIPTION, parent("divisao", "divisao_id")],
    shape: ReadShape::Plain,
};

pub static CLASSE: EntitySchema = EntitySchema {
    name: "classe",
    table: "classe",
    fields: &[code(5), DESCRIPTION, parent("grupo", "grupo_id")],
    shape: ReadShape::Plain,
};

pub static SUBCLASSE: EntitySchema = EntitySchema {
    name: "subclasse",
    table: "subclasse",
    fields: &[code(7), DESCRIPTION, parent("classe", "classe_id")],
    shape: ReadShape::Plain,
};

pub static SETOR: EntitySchema = EntitySchema {
    name: "setor",
    table: "setor",
    fields: &[DESCRIPTION],
    shape: ReadShape::Plain,
};

pub static COMERCIO: EntitySchema = EntitySchema {
    name: "comercio",
    table: "comercio",
    fields: &[DESCRIPTION],
    shape: ReadShape::Plain,
};

pub static ARRECADACAO: EntitySchema = EntitySchema {
    name: "arrecadacao",
    table: "arrecadacao",
    fields: &[
        FieldDef {
            name: "valor",
            column: "valor",
            kind: FieldKind::Decimal {
                max_digits: 20,
                places: 2,
            },
            unique: false,
        },
        FieldDef {
            name: "data",
            column: "data",
            kind: FieldKind::Date,
            unique: false,
        },
        parent("subclasse", "subclasse_id"),
        parent("setor", "setor_id"),
        parent("comercio", "comercio_id"),
    ],
    shape: ReadShape::Collection,
};

/// Every entity in dependency order (parents before children).
pub static ENTITIES: [&EntitySchema; 8] = [
    &SECAO,
    &DIVISAO,
    &GRUPO,
    &CLASSE,
    &SUBCLASSE,
    &SETOR,
    &COMERCIO,
    &ARRECADACAO,
];

/// Look up an entity by its endpoint name.
pub fn find(name: &str) -> Option<&'static EntitySchema> {
    ENTITIES.iter().copied().find(|schema| schema.name == name)
}

/// Every (entity, field) pair holding a foreign key to `target`.
pub fn referencing(target: &str) -> Vec<(&'static EntitySchema, &'static FieldDef)> {
    ENTITIES
        .iter()
        .copied()
        .flat_map(|schema| schema.fields.iter().map(move |field| (schema, field)))
        .filter(|(_, field)| matches!(field.kind, FieldKind::ForeignKey { target: t } if t == target))
        .collect()
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// `CREATE TABLE` statement with protect-on-delete foreign keys.
    pub fn create_table_sql(&self) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];

        for field in self.fields {
            let column = match field.kind {
                FieldKind::ForeignKey { target } => {
                    let table = find(target).map(|s| s.table).unwrap_or(target);
                    format!(
                        "{} INTEGER NOT NULL REFERENCES {}(id) ON DELETE RESTRICT",
                        field.column, table
                    )
                }
                _ if field.unique => format!("{} TEXT NOT NULL UNIQUE", field.column),
                _ => format!("{} TEXT NOT NULL", field.column),
            };
            columns.push(column);
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }

    /// Projection used by list and retrieve. The base table is always aliased `t`.
    pub fn read_query(&self) -> ReadQuery {
        match self.shape {
            ReadShape::Plain => {
                let mut columns = vec![ReadColumn {
                    name: "id",
                    expr: "t.id".to_string(),
                    kind: ReadKind::Integer,
                }];
                columns.extend(self.fields.iter().map(|field| ReadColumn {
                    name: field.name,
                    expr: format!("t.{}", field.column),
                    kind: match field.kind {
                        FieldKind::ForeignKey { .. } => ReadKind::Integer,
                        _ => ReadKind::Text,
                    },
                }));
                ReadQuery {
                    from: format!("{} t", self.table),
                    columns,
                }
            }
            ReadShape::Collection => collection_read_query(self.table),
        }
    }
}

fn collection_read_query(table: &str) -> ReadQuery {
    let from = format!(
        "{table} t
         JOIN subclasse sc ON sc.id = t.subclasse_id
         JOIN classe cl ON cl.id = sc.classe_id
         JOIN grupo gr ON gr.id = cl.grupo_id
         JOIN divisao dv ON dv.id = gr.divisao_id
         JOIN secao se ON se.id = dv.secao_id
         JOIN setor st ON st.id = t.setor_id
         JOIN comercio co ON co.id = t.comercio_id"
    );

    let text = |name: &'static str, expr: &str| ReadColumn {
        name,
        expr: expr.to_string(),
        kind: ReadKind::Text,
    };

    ReadQuery {
        from,
        columns: vec![
            ReadColumn {
                name: "id",
                expr: "t.id".to_string(),
                kind: ReadKind::Integer,
            },
            text("valor", "t.valor"),
            text("data", "t.data"),
            text("secao", "se.codigo"),
            text("divisao", "dv.codigo"),
            text("grupo", "gr.codigo"),
            text("classe", "cl.codigo"),
            text("subclasse", "sc.codigo"),
            text("setor", "st.descricao"),
            text("comercio", "co.descricao"),
        ],
    }
}

// ============================================================================
// VALUE COERCION
// ============================================================================

impl FieldDef {
    /// Validate a JSON payload value and convert it to its stored form.
    pub fn coerce(&self, value: &Value) -> Result<SqlValue, String> {
        match (self.kind, value) {
            (_, Value::Null) => Err("This field may not be null.".to_string()),
            (FieldKind::ForeignKey { .. }, Value::Number(n)) => n
                .as_i64()
                .map(SqlValue::Integer)
                .ok_or_else(|| "Incorrect type. Expected pk value, received float.".to_string()),
            (FieldKind::ForeignKey { .. }, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| "Incorrect type. Expected pk value, received str.".to_string()),
            (FieldKind::ForeignKey { .. }, _) => {
                Err("Incorrect type. Expected pk value.".to_string())
            }
            (FieldKind::Decimal { .. }, Value::Number(n)) => self.coerce_str(&n.to_string()),
            (_, Value::String(s)) => self.coerce_str(s),
            _ => Err("Not a valid string.".to_string()),
        }
    }

    /// Validate a textual value (payload string or query parameter).
    pub fn coerce_str(&self, raw: &str) -> Result<SqlValue, String> {
        match self.kind {
            FieldKind::Code { width } => {
                let value = raw.trim();
                if value.is_empty() {
                    return Err("This field may not be blank.".to_string());
                }
                if value.chars().count() != width {
                    return Err(format!(
                        "Ensure this field has exactly {} characters.",
                        width
                    ));
                }
                Ok(SqlValue::Text(value.to_string()))
            }
            FieldKind::Text { max_len } => {
                let value = raw.trim();
                if value.is_empty() {
                    return Err("This field may not be blank.".to_string());
                }
                if value.chars().count() > max_len {
                    return Err(format!(
                        "Ensure this field has no more than {} characters.",
                        max_len
                    ));
                }
                Ok(SqlValue::Text(value.to_string()))
            }
            FieldKind::Decimal { max_digits, places } => {
                normalize_decimal(raw, max_digits, places).map(SqlValue::Text)
            }
            FieldKind::Date => parse_date(raw)
                .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| {
                    "Date has wrong format. Use one of these formats instead: YYYY-MM-DD."
                        .to_string()
                }),
            FieldKind::ForeignKey { .. } => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Integer)
                .map_err(|_| "Select a valid choice.".to_string()),
        }
    }
}

/// Calendar years a stored date may carry (four-digit years only).
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// Parse a `YYYY-MM-DD` date whose year lies in `MIN_YEAR..=MAX_YEAR`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .filter(|date| (MIN_YEAR..=MAX_YEAR).contains(&date.year()))
}

/// Canonical fixed-point rendering of a decimal string ("10.5" -> "10.50").
///
/// Rejects exponents, more than `places` fractional digits and more than
/// `max_digits - places` integer digits.
pub fn normalize_decimal(raw: &str, max_digits: usize, places: usize) -> Result<String, String> {
    let invalid = || "A valid number is required.".to_string();

    let trimmed = raw.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    if frac_part.len() > places {
        return Err(format!(
            "Ensure that there are no more than {} decimal places.",
            places
        ));
    }

    let int_digits = int_part.trim_start_matches('0');
    let max_whole = max_digits.saturating_sub(places);
    if int_digits.len() > max_whole {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_whole
        ));
    }

    let whole = if int_digits.is_empty() { "0" } else { int_digits };
    let fraction = format!("{:0<width$}", frac_part, width = places);
    let is_zero = whole == "0" && fraction.chars().all(|c| c == '0');
    let sign = if negative && !is_zero { "-" } else { "" };

    if places == 0 {
        Ok(format!("{}{}", sign, whole))
    } else {
        Ok(format!("{}{}.{}", sign, whole, fraction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_entities() {
        assert_eq!(find("secao").map(|s| s.table), Some("secao"));
        assert_eq!(find("arrecadacao").map(|s| s.shape), Some(ReadShape::Collection));
        assert!(find("municipio").is_none());
    }

    #[test]
    fn test_referencing_finds_children_and_facts() {
        let refs: Vec<&str> = referencing("subclasse")
            .iter()
            .map(|(schema, _)| schema.name)
            .collect();
        assert_eq!(refs, vec!["arrecadacao"]);

        let refs: Vec<&str> = referencing("secao")
            .iter()
            .map(|(schema, _)| schema.name)
            .collect();
        assert_eq!(refs, vec!["divisao"]);

        assert!(referencing("arrecadacao").is_empty());
    }

    #[test]
    fn test_create_table_sql_protects_parents() {
        let sql = DIVISAO.create_table_sql();
        assert!(sql.contains("codigo TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("secao_id INTEGER NOT NULL REFERENCES secao(id) ON DELETE RESTRICT"));
    }

    #[test]
    fn test_code_width_is_exact() {
        let field = SECAO.field("codigo").unwrap();
        assert_eq!(field.coerce_str("A"), Ok(SqlValue::Text("A".to_string())));
        assert!(field.coerce_str("AB").is_err());
        assert!(field.coerce_str("  ").is_err());

        let field = SUBCLASSE.field("codigo").unwrap();
        assert!(field.coerce_str("0111301").is_ok());
        assert!(field.coerce_str("011130").is_err());
    }

    #[test]
    fn test_normalize_decimal() {
        assert_eq!(normalize_decimal("10.5", 20, 2), Ok("10.50".to_string()));
        assert_eq!(normalize_decimal("007", 20, 2), Ok("7.00".to_string()));
        assert_eq!(normalize_decimal(".5", 20, 2), Ok("0.50".to_string()));
        assert_eq!(normalize_decimal("-0.00", 20, 2), Ok("0.00".to_string()));
        assert_eq!(normalize_decimal("-3.1", 20, 2), Ok("-3.10".to_string()));
        assert!(normalize_decimal("1.234", 20, 2).is_err());
        assert!(normalize_decimal("abc", 20, 2).is_err());
        assert!(normalize_decimal("1e5", 20, 2).is_err());
        assert!(normalize_decimal(".", 20, 2).is_err());
        assert!(normalize_decimal("1234567890123456789", 20, 2).is_err());
        assert!(normalize_decimal("123456789012345678", 20, 2).is_ok());
    }

    #[test]
    fn test_parse_date_bounds_year() {
        assert_eq!(parse_date(" 2020-01-15 "), NaiveDate::from_ymd_opt(2020, 1, 15));
        assert_eq!(parse_date("9999-12-31"), NaiveDate::from_ymd_opt(9999, 12, 31));
        assert_eq!(parse_date("0001-01-01"), NaiveDate::from_ymd_opt(1, 1, 1));
        assert_eq!(parse_date("10000-01-01"), None);
        assert_eq!(parse_date("+262142-12-15"), None);
        assert_eq!(parse_date("15/01/2020"), None);
    }

    #[test]
    fn test_coerce_json_values() {
        let valor = ARRECADACAO.field("valor").unwrap();
        assert_eq!(
            valor.coerce(&serde_json::json!(12.5)),
            Ok(SqlValue::Text("12.50".to_string()))
        );
        assert_eq!(
            valor.coerce(&serde_json::json!("99")),
            Ok(SqlValue::Text("99.00".to_string()))
        );
        assert!(valor.coerce(&Value::Null).is_err());

        let data = ARRECADACAO.field("data").unwrap();
        assert!(data.coerce(&serde_json::json!("2020-02-30")).is_err());
        assert!(data.coerce(&serde_json::json!("2020-02-29")).is_ok());
        assert!(data.coerce(&serde_json::json!("+262142-12-15")).is_err());
        assert!(data.coerce(&serde_json::json!("0000-01-01")).is_err());

        let fk = ARRECADACAO.field("subclasse").unwrap();
        assert_eq!(fk.coerce(&serde_json::json!(3)), Ok(SqlValue::Integer(3)));
        assert_eq!(fk.coerce(&serde_json::json!("4")), Ok(SqlValue::Integer(4)));
        assert!(fk.coerce(&serde_json::json!("x")).is_err());
        assert!(fk.coerce(&serde_json::json!(true)).is_err());
    }

    #[test]
    fn test_collection_read_query_projects_ancestor_codes() {
        let query = ARRECADACAO.read_query();
        let names: Vec<&str> = query.columns.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec![
                "id", "valor", "data", "secao", "divisao", "grupo", "classe", "subclasse",
                "setor", "comercio"
            ]
        );
        assert!(query.from.contains("JOIN secao se"));
    }
}
