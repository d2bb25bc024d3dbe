// 📦 CSV Import - seed the store from a denormalized collection export
// Each row carries every hierarchy level's code and description plus the
// sector, commerce type, amount and date of one collection record.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::db;
use crate::error::StoreError;
use crate::schema::{self, EntitySchema};

#[derive(Debug, Deserialize)]
pub struct ImportRow {
    pub secao_codigo: String,
    pub secao_descricao: String,
    pub divisao_codigo: String,
    pub divisao_descricao: String,
    pub grupo_codigo: String,
    pub grupo_descricao: String,
    pub classe_codigo: String,
    pub classe_descricao: String,
    pub subclasse_codigo: String,
    pub subclasse_descricao: String,
    pub setor: String,
    pub comercio: String,
    pub valor: String,
    pub data: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: usize,
    /// New dimension rows per entity
    pub created: BTreeMap<&'static str, usize>,
    pub collections: usize,
}

/// Resolves dimension rows to ids, creating the ones that do not exist yet.
struct Resolver<'a> {
    conn: &'a Connection,
    known: HashMap<(&'static str, String), i64>,
    created: BTreeMap<&'static str, usize>,
}

impl<'a> Resolver<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            known: HashMap::new(),
            created: BTreeMap::new(),
        }
    }

    /// Find a row by `key_field = key`, or create it from `payload`.
    fn get_or_create(
        &mut self,
        entity: &'static EntitySchema,
        key_field: &str,
        key: &str,
        payload: Value,
    ) -> Result<i64, StoreError> {
        let cache_key = (entity.name, key.to_string());
        if let Some(id) = self.known.get(&cache_key) {
            return Ok(*id);
        }

        let filters = HashMap::from([(key_field.to_string(), key.to_string())]);
        let existing = db::list(self.conn, entity, &filters)?;
        let record = match existing.into_iter().next() {
            Some(record) => record,
            None => {
                let record = db::create(self.conn, entity, &payload)?;
                *self.created.entry(entity.name).or_default() += 1;
                debug!(entity = entity.name, key, "dimension row created");
                record
            }
        };

        let id = record_id(&record);
        self.known.insert(cache_key, id);
        Ok(id)
    }
}

fn record_id(record: &db::Record) -> i64 {
    record.get("id").and_then(Value::as_i64).unwrap_or_default()
}

/// Import every row of a CSV file in one transaction.
pub fn import_csv(conn: &mut Connection, path: &Path) -> Result<ImportSummary, StoreError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let rows = reader
        .deserialize::<ImportRow>()
        .collect::<Result<Vec<_>, _>>()?;
    import_rows(conn, &rows)
}

/// Import rows in one transaction; any failing row rolls back the batch.
pub fn import_rows(conn: &mut Connection, rows: &[ImportRow]) -> Result<ImportSummary, StoreError> {
    let tx = conn.transaction()?;
    let mut resolver = Resolver::new(&tx);
    let mut collections = 0;

    for row in rows {
        let secao = resolver.get_or_create(
            &schema::SECAO,
            "codigo",
            &row.secao_codigo,
            json!({"codigo": row.secao_codigo, "descricao": row.secao_descricao}),
        )?;
        let divisao = resolver.get_or_create(
            &schema::DIVISAO,
            "codigo",
            &row.divisao_codigo,
            json!({"codigo": row.divisao_codigo, "descricao": row.divisao_descricao, "secao": secao}),
        )?;
        let grupo = resolver.get_or_create(
            &schema::GRUPO,
            "codigo",
            &row.grupo_codigo,
            json!({"codigo": row.grupo_codigo, "descricao": row.grupo_descricao, "divisao": divisao}),
        )?;
        let classe = resolver.get_or_create(
            &schema::CLASSE,
            "codigo",
            &row.classe_codigo,
            json!({"codigo": row.classe_codigo, "descricao": row.classe_descricao, "grupo": grupo}),
        )?;
        let subclasse = resolver.get_or_create(
            &schema::SUBCLASSE,
            "codigo",
            &row.subclasse_codigo,
            json!({"codigo": row.subclasse_codigo, "descricao": row.subclasse_descricao, "classe": classe}),
        )?;
        let setor = resolver.get_or_create(
            &schema::SETOR,
            "descricao",
            &row.setor,
            json!({"descricao": row.setor}),
        )?;
        let comercio = resolver.get_or_create(
            &schema::COMERCIO,
            "descricao",
            &row.comercio,
            json!({"descricao": row.comercio}),
        )?;

        db::create(
            &tx,
            &schema::ARRECADACAO,
            &json!({
                "valor": row.valor,
                "data": row.data,
                "subclasse": subclasse,
                "setor": setor,
                "comercio": comercio,
            }),
        )?;
        collections += 1;
    }

    let created = resolver.created;
    tx.commit()?;

    info!(rows = rows.len(), collections, "csv import finished");
    Ok(ImportSummary {
        rows: rows.len(),
        created,
        collections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use std::io::Write;

    const HEADER: &str = "secao_codigo,secao_descricao,divisao_codigo,divisao_descricao,\
grupo_codigo,grupo_descricao,classe_codigo,classe_descricao,subclasse_codigo,\
subclasse_descricao,setor,comercio,valor,data";

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    const ROW_A: &str = "A,AGRICULTURA,01,PRODUCAO LAVOURAS,011,TEMPORARIAS,01113,CEREAIS,0111301,ARROZ,Primario,Comércio,1234.5,2020-01-15";
    const ROW_B: &str = "A,AGRICULTURA,01,PRODUCAO LAVOURAS,011,TEMPORARIAS,01113,CEREAIS,0111302,MILHO,Primario,Indústria,10,2020-02-01";

    #[test]
    fn test_import_creates_dimensions_once() {
        let file = write_csv(&[ROW_A, ROW_B]);
        let mut conn = memory_db();

        let summary = import_csv(&mut conn, file.path()).unwrap();

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.collections, 2);
        assert_eq!(summary.created["secao"], 1);
        assert_eq!(summary.created["subclasse"], 2);
        assert_eq!(summary.created["comercio"], 2);
        assert_eq!(db::count(&conn, &schema::ARRECADACAO).unwrap(), 2);

        let records = db::list(&conn, &schema::ARRECADACAO, &HashMap::new()).unwrap();
        assert_eq!(records[0]["valor"], json!("1234.50"));
        assert_eq!(records[0]["subclasse"], json!("0111301"));
    }

    #[test]
    fn test_reimport_reuses_existing_rows() {
        let file = write_csv(&[ROW_A]);
        let mut conn = memory_db();

        import_csv(&mut conn, file.path()).unwrap();
        let second = import_csv(&mut conn, file.path()).unwrap();

        assert!(second.created.is_empty());
        assert_eq!(db::count(&conn, &schema::SECAO).unwrap(), 1);
        assert_eq!(db::count(&conn, &schema::ARRECADACAO).unwrap(), 2);
    }

    #[test]
    fn test_invalid_row_rolls_back_batch() {
        let bad = "A,AGRICULTURA,01,PRODUCAO LAVOURAS,011,TEMPORARIAS,01113,CEREAIS,0111303,SOJA,Primario,Serviço,abc,2020-03-01";
        let file = write_csv(&[ROW_A, bad]);
        let mut conn = memory_db();

        let err = import_csv(&mut conn, file.path()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref e) if e.has("valor")));
        assert_eq!(db::count(&conn, &schema::SECAO).unwrap(), 0);
        assert_eq!(db::count(&conn, &schema::ARRECADACAO).unwrap(), 0);
    }
}
