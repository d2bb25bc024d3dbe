// 🗄️ Storage Layer - SQLite store for the taxonomy and collection records
// One generic CRUD implementation driven by the entity schemas in `schema.rs`.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StoreError, ValidationErrors};
use crate::schema::{self, EntitySchema, FieldDef, FieldKind, ReadColumn, ReadKind, ENTITIES};

/// A row as returned by the API: field name → JSON value.
pub type Record = Map<String, Value>;

/// Open (or create) the database file and make sure every table exists.
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // SQLite ignores REFERENCES clauses unless this is set per connection
    conn.pragma_update(None, "foreign_keys", "ON")?;

    for entity in ENTITIES.iter() {
        conn.execute(&entity.create_table_sql(), [])?;

        for field in entity.fields {
            if matches!(field.kind, FieldKind::ForeignKey { .. } | FieldKind::Date) {
                conn.execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                        table = entity.table,
                        column = field.column
                    ),
                    [],
                )?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// READS
// ============================================================================

/// List rows, keeping only those matching every recognised query parameter
/// exactly. Parameters that name no declared field are ignored.
pub fn list(
    conn: &Connection,
    entity: &EntitySchema,
    filters: &HashMap<String, String>,
) -> Result<Vec<Record>, StoreError> {
    let mut keys: Vec<&String> = filters.keys().collect();
    keys.sort();

    let mut clauses = Vec::new();
    let mut values = Vec::new();
    let mut errors = ValidationErrors::new();

    for key in keys {
        let raw = &filters[key];
        let column = if key == "id" {
            match raw.trim().parse::<i64>() {
                Ok(id) => {
                    values.push(SqlValue::Integer(id));
                    "id"
                }
                Err(_) => {
                    errors.add(key, "Enter a number.");
                    continue;
                }
            }
        } else if let Some(field) = entity.field(key) {
            let value = match field.coerce_str(raw) {
                Ok(value) => value,
                Err(message) => {
                    errors.add(key, message);
                    continue;
                }
            };
            // Filters take a pk; a code or a deleted id is not a choice
            if let (FieldKind::ForeignKey { target }, SqlValue::Integer(fk)) = (field.kind, &value) {
                if !row_exists(conn, target_table(target), *fk)? {
                    errors.add(
                        key,
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    continue;
                }
            }
            values.push(value);
            field.column
        } else {
            continue;
        };
        clauses.push(format!("t.{} = ?{}", column, values.len()));
    }

    errors.into_result()?;

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let query = entity.read_query();
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY t.id",
        select_list(&query.columns),
        query.from,
        where_sql
    );
    debug!(entity = entity.name, %sql, "listing rows");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            row_to_record(row, &query.columns)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn retrieve(conn: &Connection, entity: &EntitySchema, id: i64) -> Result<Record, StoreError> {
    let query = entity.read_query();
    let sql = format!(
        "SELECT {} FROM {} WHERE t.id = ?1",
        select_list(&query.columns),
        query.from
    );

    conn.query_row(&sql, params![id], |row| row_to_record(row, &query.columns))
        .optional()?
        .ok_or_else(|| not_found(entity, id))
}

pub fn count(conn: &Connection, entity: &EntitySchema) -> Result<i64, StoreError> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", entity.table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

fn select_list(columns: &[ReadColumn]) -> String {
    columns
        .iter()
        .map(|c| c.expr.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_record(row: &Row<'_>, columns: &[ReadColumn]) -> rusqlite::Result<Record> {
    let mut record = Map::new();
    for (index, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ReadKind::Integer => Value::from(row.get::<_, i64>(index)?),
            ReadKind::Text => Value::from(row.get::<_, String>(index)?),
        };
        record.insert(column.name.to_string(), value);
    }
    Ok(record)
}

// ============================================================================
// WRITES
// ============================================================================

pub fn create(conn: &Connection, entity: &EntitySchema, payload: &Value) -> Result<Record, StoreError> {
    let values = validate_payload(conn, entity, payload, false, None)?;

    let columns: Vec<&str> = values.iter().map(|(field, _)| field.column).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        entity.table,
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))
        .map_err(|e| write_conflict(entity, e))?;

    let id = conn.last_insert_rowid();
    debug!(entity = entity.name, id, "row created");
    retrieve(conn, entity, id)
}

/// Full (`partial = false`) or partial update of an existing row.
pub fn update(
    conn: &Connection,
    entity: &EntitySchema,
    id: i64,
    payload: &Value,
    partial: bool,
) -> Result<Record, StoreError> {
    ensure_exists(conn, entity, id)?;
    let values = validate_payload(conn, entity, payload, partial, Some(id))?;

    if !values.is_empty() {
        let assignments: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            entity.table,
            assignments.join(", "),
            values.len() + 1
        );

        let mut bound: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();
        bound.push(SqlValue::Integer(id));
        conn.execute(&sql, params_from_iter(bound.iter()))
            .map_err(|e| write_conflict(entity, e))?;
        debug!(entity = entity.name, id, partial, "row updated");
    }

    retrieve(conn, entity, id)
}

/// Delete a row unless another row still references it.
pub fn delete(conn: &Connection, entity: &EntitySchema, id: i64) -> Result<(), StoreError> {
    ensure_exists(conn, entity, id)?;

    let mut references = Vec::new();
    for (child, field) in schema::referencing(entity.name) {
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", child.table, field.column),
            params![id],
            |row| row.get(0),
        )?;
        if n > 0 {
            references.push(format!("{} {}", n, child.name));
        }
    }

    if !references.is_empty() {
        return Err(StoreError::Protected {
            entity: entity.name.to_string(),
            id,
            references: references.join(", "),
        });
    }

    match conn.execute(&format!("DELETE FROM {} WHERE id = ?1", entity.table), params![id]) {
        Ok(_) => {
            debug!(entity = entity.name, id, "row deleted");
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::Protected {
                entity: entity.name.to_string(),
                id,
                references: "existing rows".to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_exists(conn: &Connection, entity: &EntitySchema, id: i64) -> Result<(), StoreError> {
    if row_exists(conn, entity.table, id)? {
        Ok(())
    } else {
        Err(not_found(entity, id))
    }
}

fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn target_table(target: &str) -> &str {
    schema::find(target).map(|s| s.table).unwrap_or(target)
}

fn not_found(entity: &EntitySchema, id: i64) -> StoreError {
    StoreError::NotFound {
        entity: entity.name.to_string(),
        id,
    }
}

/// Constraint failures that slipped past validation (e.g. a concurrent insert)
/// are reported as validation errors rather than database failures.
fn write_conflict(entity: &EntitySchema, err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, ref message)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let mut errors = ValidationErrors::new();
            errors.add(
                "non_field_errors",
                format!(
                    "{} violates a constraint: {}",
                    entity.name,
                    message.clone().unwrap_or_default()
                ),
            );
            StoreError::Validation(errors)
        }
        other => other.into(),
    }
}

/// Check every declared field of a payload and convert it to column values.
///
/// With `partial`, absent fields are skipped instead of reported as missing.
/// `current_id` excludes the row being updated from uniqueness checks.
fn validate_payload(
    conn: &Connection,
    entity: &EntitySchema,
    payload: &Value,
    partial: bool,
    current_id: Option<i64>,
) -> Result<Vec<(&'static FieldDef, SqlValue)>, StoreError> {
    let mut errors = ValidationErrors::new();

    let Some(object) = payload.as_object() else {
        errors.add(
            "non_field_errors",
            "Invalid data. Expected a dictionary.",
        );
        return Err(StoreError::Validation(errors));
    };

    let mut values = Vec::new();

    for field in entity.fields {
        let Some(raw) = object.get(field.name) else {
            if !partial {
                errors.add(field.name, "This field is required.");
            }
            continue;
        };

        let value = match field.coerce(raw) {
            Ok(value) => value,
            Err(message) => {
                errors.add(field.name, message);
                continue;
            }
        };

        if let (FieldKind::ForeignKey { target }, SqlValue::Integer(fk)) = (field.kind, &value) {
            if !row_exists(conn, target_table(target), *fk)? {
                errors.add(
                    field.name,
                    format!("Invalid pk \"{}\" - object does not exist.", fk),
                );
                continue;
            }
        }

        if field.unique {
            let taken: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND id != ?2",
                    entity.table, field.column
                ),
                params![value, current_id.unwrap_or(-1)],
                |row| row.get(0),
            )?;
            if taken > 0 {
                errors.add(
                    field.name,
                    format!("{} with this {} already exists.", entity.name, field.name),
                );
                continue;
            }
        }

        values.push((field, value));
    }

    errors.into_result()?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ARRECADACAO, CLASSE, COMERCIO, DIVISAO, GRUPO, SECAO, SETOR, SUBCLASSE};
    use serde_json::json;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    /// Seed one full branch of the tree plus one collection record.
    /// Returns the ids (secao, subclasse, arrecadacao).
    fn seed_branch(conn: &Connection) -> (i64, i64, i64) {
        let secao = create(conn, &SECAO, &json!({"codigo": "A", "descricao": "AGRICULTURA"})).unwrap();
        let secao_id = secao["id"].as_i64().unwrap();
        let divisao = create(
            conn,
            &DIVISAO,
            &json!({"codigo": "01", "descricao": "PRODUCAO LAVOURAS", "secao": secao_id}),
        )
        .unwrap();
        let grupo = create(
            conn,
            &GRUPO,
            &json!({"codigo": "011", "descricao": "LAVOURAS TEMPORARIAS", "divisao": divisao["id"]}),
        )
        .unwrap();
        let classe = create(
            conn,
            &CLASSE,
            &json!({"codigo": "01113", "descricao": "CEREAIS", "grupo": grupo["id"]}),
        )
        .unwrap();
        let subclasse = create(
            conn,
            &SUBCLASSE,
            &json!({"codigo": "0111301", "descricao": "ARROZ", "classe": classe["id"]}),
        )
        .unwrap();
        let setor = create(conn, &SETOR, &json!({"descricao": "Primario"})).unwrap();
        let comercio = create(conn, &COMERCIO, &json!({"descricao": "Agropecuária e Pesca"})).unwrap();

        let fato = create(
            conn,
            &ARRECADACAO,
            &json!({
                "valor": "1500.5",
                "data": "2020-01-15",
                "subclasse": subclasse["id"],
                "setor": setor["id"],
                "comercio": comercio["id"],
            }),
        )
        .unwrap();

        (
            secao_id,
            subclasse["id"].as_i64().unwrap(),
            fato["id"].as_i64().unwrap(),
        )
    }

    #[test]
    fn test_collection_read_is_denormalized() {
        let conn = test_db();
        let (_, _, fato_id) = seed_branch(&conn);

        let record = retrieve(&conn, &ARRECADACAO, fato_id).unwrap();

        assert_eq!(record["valor"], json!("1500.50"));
        assert_eq!(record["data"], json!("2020-01-15"));
        assert_eq!(record["secao"], json!("A"));
        assert_eq!(record["divisao"], json!("01"));
        assert_eq!(record["grupo"], json!("011"));
        assert_eq!(record["classe"], json!("01113"));
        assert_eq!(record["subclasse"], json!("0111301"));
        assert_eq!(record["setor"], json!("Primario"));
        assert_eq!(record["comercio"], json!("Agropecuária e Pesca"));
    }

    #[test]
    fn test_list_exact_match_filter() {
        let conn = test_db();
        seed_branch(&conn);
        create(&conn, &SECAO, &json!({"codigo": "C", "descricao": "INDUSTRIAS"})).unwrap();

        let mut filters = HashMap::new();
        filters.insert("codigo".to_string(), "C".to_string());
        let rows = list(&conn, &SECAO, &filters).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["descricao"], json!("INDUSTRIAS"));

        // Unknown parameters are ignored
        let mut filters = HashMap::new();
        filters.insert("format".to_string(), "json".to_string());
        assert_eq!(list(&conn, &SECAO, &filters).unwrap().len(), 2);
    }

    #[test]
    fn test_list_filter_normalizes_values() {
        let conn = test_db();
        seed_branch(&conn);

        let mut filters = HashMap::new();
        filters.insert("valor".to_string(), "1500.5".to_string());
        assert_eq!(list(&conn, &ARRECADACAO, &filters).unwrap().len(), 1);

        let mut filters = HashMap::new();
        filters.insert("data".to_string(), "2020-01-16".to_string());
        assert!(list(&conn, &ARRECADACAO, &filters).unwrap().is_empty());

        let mut filters = HashMap::new();
        filters.insert("data".to_string(), "15/01/2020".to_string());
        assert!(matches!(
            list(&conn, &ARRECADACAO, &filters),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_list_foreign_key_filter_requires_existing_pk() {
        let conn = test_db();
        let (_, subclasse_id, fato_id) = seed_branch(&conn);

        let mut filters = HashMap::new();
        filters.insert("subclasse".to_string(), subclasse_id.to_string());
        let rows = list(&conn, &ARRECADACAO, &filters).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(fato_id));

        // A subclass code parses as an integer but names no row
        let mut filters = HashMap::new();
        filters.insert("subclasse".to_string(), "0111301".to_string());
        match list(&conn, &ARRECADACAO, &filters) {
            Err(StoreError::Validation(errors)) => assert_eq!(
                errors.messages("subclasse"),
                ["Select a valid choice. That choice is not one of the available choices."]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_wrong_width_and_duplicates() {
        let conn = test_db();
        seed_branch(&conn);

        let err = create(&conn, &SECAO, &json!({"codigo": "AB", "descricao": "X"})).unwrap_err();
        match err {
            StoreError::Validation(errors) => assert!(errors.has("codigo")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = create(&conn, &SECAO, &json!({"codigo": "A", "descricao": "OUTRA"})).unwrap_err();
        match err {
            StoreError::Validation(errors) => {
                assert_eq!(errors.messages("codigo"), ["secao with this codigo already exists."]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_missing_parent() {
        let conn = test_db();

        let err = create(
            &conn,
            &DIVISAO,
            &json!({"codigo": "01", "descricao": "X", "secao": 42}),
        )
        .unwrap_err();

        match err {
            StoreError::Validation(errors) => {
                assert_eq!(
                    errors.messages("secao"),
                    ["Invalid pk \"42\" - object does not exist."]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_referenced_row_is_protected() {
        let conn = test_db();
        let (secao_id, subclasse_id, fato_id) = seed_branch(&conn);

        assert!(matches!(
            delete(&conn, &SUBCLASSE, subclasse_id),
            Err(StoreError::Protected { .. })
        ));
        assert!(matches!(
            delete(&conn, &SECAO, secao_id),
            Err(StoreError::Protected { .. })
        ));

        // Facts are leaves and can go, after which the subclass is free
        delete(&conn, &ARRECADACAO, fato_id).unwrap();
        delete(&conn, &SUBCLASSE, subclasse_id).unwrap();
        assert_eq!(count(&conn, &SUBCLASSE).unwrap(), 0);
    }

    #[test]
    fn test_partial_and_full_update() {
        let conn = test_db();
        let (secao_id, _, _) = seed_branch(&conn);

        let updated = update(&conn, &SECAO, secao_id, &json!({"descricao": "AGRO"}), true).unwrap();
        assert_eq!(updated["descricao"], json!("AGRO"));
        assert_eq!(updated["codigo"], json!("A"));

        // A full update needs every field
        let err = update(&conn, &SECAO, secao_id, &json!({"descricao": "AGRO 2"}), false).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Re-using its own code is not a uniqueness violation
        let updated = update(
            &conn,
            &SECAO,
            secao_id,
            &json!({"codigo": "A", "descricao": "AGRO 2"}),
            false,
        )
        .unwrap();
        assert_eq!(updated["descricao"], json!("AGRO 2"));
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let conn = test_db();
        assert!(matches!(
            retrieve(&conn, &SETOR, 7),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            delete(&conn, &SETOR, 7),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            update(&conn, &SETOR, 7, &json!({}), true),
            Err(StoreError::NotFound { .. })
        ));
    }
}
