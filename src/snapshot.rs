// 📥 Fact snapshot loader
// One bulk fetch of denormalized collection records, coerced into typed rows.
//
// Coercion policy:
// - amount not numeric → row dropped, load continues
// - date not YYYY-MM-DD (years 1..=9999) → whole load fails

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::hierarchy::Level;
use crate::schema::parse_date;

/// Category used when a record carries no commerce type.
pub const UNKNOWN_COMMERCE: &str = "Unknown";

/// Collection record exactly as the API serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCollection {
    pub id: i64,
    /// Decimal string ("1234.50") or number; anything else is dropped
    #[serde(default)]
    pub valor: Value,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub secao: String,
    #[serde(default)]
    pub divisao: String,
    #[serde(default)]
    pub grupo: String,
    #[serde(default)]
    pub classe: String,
    #[serde(default)]
    pub subclasse: String,
    #[serde(default)]
    pub setor: Option<String>,
    #[serde(default)]
    pub comercio: Option<String>,
}

/// Typed collection record used by every dashboard computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: i64,
    pub amount: f64,
    pub date: NaiveDate,
    pub section: String,
    pub division: String,
    pub group: String,
    pub class: String,
    pub subclass: String,
    pub sector: String,
    pub commerce: String,
}

impl Collection {
    /// Code of this record at a hierarchy level.
    pub fn code(&self, level: Level) -> &str {
        match level {
            Level::Section => &self.section,
            Level::Division => &self.division,
            Level::Group => &self.group,
            Level::Class => &self.class,
            Level::Subclass => &self.subclass,
        }
    }
}

/// Source of raw collection records (the HTTP API in production).
pub trait FactSource {
    fn fetch_collections(&self) -> Result<Vec<RawCollection>, LoadError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub fetched: usize,
    /// Ids of rows dropped because their amount was not numeric
    pub dropped: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Collection>,
    pub report: LoadReport,
}

/// Fetch once from `source` and coerce.
pub fn load_snapshot<S: FactSource + ?Sized>(source: &S) -> Result<Snapshot, LoadError> {
    let raw = source.fetch_collections()?;
    let snapshot = build_snapshot(raw)?;
    info!(
        fetched = snapshot.report.fetched,
        kept = snapshot.records.len(),
        dropped = snapshot.report.dropped.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

/// Coerce raw rows. Amount coercion runs first, so a row with a bad amount
/// is dropped before its date is looked at.
pub fn build_snapshot(raw: Vec<RawCollection>) -> Result<Snapshot, LoadError> {
    let mut report = LoadReport {
        fetched: raw.len(),
        dropped: Vec::new(),
    };
    let mut records = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(amount) = coerce_amount(&row.valor) else {
            debug!(id = row.id, valor = %row.valor, "dropping row with non-numeric amount");
            report.dropped.push(row.id);
            continue;
        };

        let date = match row.data.as_deref().and_then(parse_date) {
            Some(date) => date,
            None => {
                return Err(LoadError::InvalidDate {
                    id: row.id,
                    value: row.data.unwrap_or_default(),
                })
            }
        };

        records.push(Collection {
            id: row.id,
            amount,
            date,
            section: row.secao,
            division: row.divisao,
            group: row.grupo,
            class: row.classe,
            subclass: row.subclasse,
            sector: row.setor.unwrap_or_default(),
            commerce: row
                .comercio
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_COMMERCE.to_string()),
        });
    }

    Ok(Snapshot { records, report })
}

fn coerce_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: i64, valor: Value, data: &str, comercio: Option<&str>) -> RawCollection {
        RawCollection {
            id,
            valor,
            data: Some(data.to_string()),
            secao: "A".to_string(),
            divisao: "01".to_string(),
            grupo: "011".to_string(),
            classe: "01113".to_string(),
            subclasse: "0111301".to_string(),
            setor: Some("Primario".to_string()),
            comercio: comercio.map(str::to_string),
        }
    }

    struct Fixed(Vec<RawCollection>);

    impl FactSource for Fixed {
        fn fetch_collections(&self) -> Result<Vec<RawCollection>, LoadError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_amounts_coerced_from_strings_and_numbers() {
        let snapshot = build_snapshot(vec![
            raw(1, json!("1234.50"), "2020-01-15", Some("Comércio")),
            raw(2, json!(99), "2020-01-16", Some("Comércio")),
        ])
        .unwrap();

        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].amount, 1234.5);
        assert_eq!(snapshot.records[1].amount, 99.0);
        assert_eq!(
            snapshot.records[0].date,
            NaiveDate::from_ymd_opt(2020, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_non_numeric_amount_is_dropped_not_fatal() {
        let snapshot = build_snapshot(vec![
            raw(1, json!("abc"), "2020-01-15", Some("Comércio")),
            raw(2, Value::Null, "2020-01-15", Some("Comércio")),
            raw(3, json!("NaN"), "2020-01-15", Some("Comércio")),
            raw(4, json!("10.00"), "2020-01-15", Some("Comércio")),
        ])
        .unwrap();

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].id, 4);
        assert_eq!(snapshot.report.fetched, 4);
        assert_eq!(snapshot.report.dropped, vec![1, 2, 3]);
    }

    #[test]
    fn test_bad_date_fails_whole_load() {
        let result = build_snapshot(vec![
            raw(1, json!("10.00"), "2020-01-15", Some("Comércio")),
            raw(2, json!("10.00"), "15/01/2020", Some("Comércio")),
        ]);

        match result {
            Err(LoadError::InvalidDate { id, value }) => {
                assert_eq!(id, 2);
                assert_eq!(value, "15/01/2020");
            }
            other => panic!("expected InvalidDate, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_year_fails_load() {
        let result = build_snapshot(vec![raw(9, json!("1.00"), "+262142-12-15", Some("Comércio"))]);
        assert!(matches!(result, Err(LoadError::InvalidDate { id: 9, .. })));
    }

    #[test]
    fn test_bad_date_on_dropped_row_is_ignored() {
        let snapshot = build_snapshot(vec![raw(1, json!("oops"), "not-a-date", None)]).unwrap();
        assert!(snapshot.records.is_empty());
    }

    #[test]
    fn test_missing_commerce_becomes_unknown() {
        let snapshot = build_snapshot(vec![
            raw(1, json!("1"), "2020-01-15", None),
            raw(2, json!("1"), "2020-01-15", Some("")),
        ])
        .unwrap();

        assert!(snapshot
            .records
            .iter()
            .all(|r| r.commerce == UNKNOWN_COMMERCE));
    }

    #[test]
    fn test_load_snapshot_uses_source() {
        let source = Fixed(vec![raw(7, json!("5.5"), "2021-03-01", Some("Serviço"))]);
        let snapshot = load_snapshot(&source).unwrap();

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].code(Level::Subclass), "0111301");
        assert_eq!(snapshot.records[0].commerce, "Serviço");
    }

    #[test]
    fn test_raw_collection_deserializes_api_shape() {
        let rows: Vec<RawCollection> = serde_json::from_value(json!([{
            "id": 1,
            "valor": "10.00",
            "data": "2020-01-15",
            "secao": "A",
            "divisao": "01",
            "grupo": "011",
            "classe": "01113",
            "subclasse": "0111301",
            "setor": "Primario",
            "comercio": "Comércio"
        }]))
        .unwrap();

        assert_eq!(rows[0].valor, json!("10.00"));
        assert_eq!(rows[0].comercio.as_deref(), Some("Comércio"));
    }
}
