//! SQL value handling shared by table reads, writes, and backup payloads.

use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;

/// SQL value enum for type-safe row handling.
///
/// Serializable so that exported table data can be carried through an
/// encrypted backup payload and reloaded without losing type information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
}

/// Type hint for NULL values to ensure correct PostgreSQL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    DateTime,
    Date,
}

/// SQL cast suffix for a value, so string-encoded parameters land with the
/// right PostgreSQL type.
pub(crate) fn sql_cast_for_value(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Bool(_) => "::boolean",
        SqlValue::I16(_) => "::smallint",
        SqlValue::I32(_) => "::integer",
        SqlValue::I64(_) => "::bigint",
        SqlValue::F32(_) => "::real",
        SqlValue::F64(_) => "::double precision",
        SqlValue::String(_) => "::text",
        SqlValue::Bytes(_) => "::bytea",
        SqlValue::Uuid(_) => "::uuid",
        SqlValue::DateTime(_) => "::timestamp",
        SqlValue::Date(_) => "::date",
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Bool => "::boolean",
            SqlNullType::I16 => "::smallint",
            SqlNullType::I32 => "::integer",
            SqlNullType::I64 => "::bigint",
            SqlNullType::F32 => "::real",
            SqlNullType::F64 => "::double precision",
            SqlNullType::String => "::text",
            SqlNullType::Bytes => "::bytea",
            SqlNullType::Uuid => "::uuid",
            SqlNullType::DateTime => "::timestamp",
            SqlNullType::Date => "::date",
        },
    }
}

/// Convert SqlValue to a boxed ToSql parameter.
/// Converts ALL values to strings - PostgreSQL will cast them using SQL cast syntax.
pub(crate) fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null(_) => Box::new(None::<String>),
        SqlValue::Bool(b) => Box::new(if *b { "t".to_string() } else { "f".to_string() }),
        SqlValue::I16(n) => Box::new(n.to_string()),
        SqlValue::I32(n) => Box::new(n.to_string()),
        SqlValue::I64(n) => Box::new(n.to_string()),
        SqlValue::F32(n) => Box::new(n.to_string()),
        SqlValue::F64(n) => Box::new(n.to_string()),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(format!("\\x{}", hex::encode(b))),
        SqlValue::Uuid(u) => Box::new(u.to_string()),
        SqlValue::DateTime(dt) => Box::new(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        SqlValue::Date(d) => Box::new(d.to_string()),
    }
}

/// Build INSERT SQL with parameters for a batch of rows.
pub(crate) fn build_insert_sql(
    schema: &str,
    table: &str,
    cols: &[String],
    rows: &[Vec<SqlValue>],
) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let col_list: String = cols
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::new();
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::new();
    let mut idx = 1;

    // Determine column casts from first row (all rows have same structure)
    let col_casts: Vec<&'static str> = if let Some(first_row) = rows.first() {
        first_row.iter().map(sql_cast_for_value).collect()
    } else {
        vec![]
    };

    for row in rows {
        let row_placeholders: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(col_idx, value)| {
                let p = format!("${}", idx);
                idx += 1;
                let cast = col_casts
                    .get(col_idx)
                    .copied()
                    .unwrap_or_else(|| sql_cast_for_value(value));
                format!("{}{}", p, cast)
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));

        for value in row {
            params.push(sql_value_to_param(value));
        }
    }

    let sql = format!(
        "INSERT INTO \"{}\".\"{}\" ({}) VALUES {}",
        schema,
        table,
        col_list,
        placeholders.join(", ")
    );

    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_numbers_placeholders_across_rows() {
        let cols = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![SqlValue::I64(1), SqlValue::String("a".into())],
            vec![SqlValue::I64(2), SqlValue::String("b".into())],
        ];
        let (sql, params) = build_insert_sql("public", "users", &cols, &rows);
        assert!(sql.starts_with("INSERT INTO \"public\".\"users\" (\"id\", \"name\") VALUES"));
        assert!(sql.contains("($1::bigint, $2::text)"));
        assert!(sql.contains("($3::bigint, $4::text)"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn null_cast_comes_from_hint() {
        let v = SqlValue::Null(SqlNullType::Uuid);
        assert_eq!(sql_cast_for_value(&v), "::uuid");
    }

    #[test]
    fn bytes_encode_as_hex_escape() {
        let cols = vec!["blob".to_string()];
        let rows = vec![vec![SqlValue::Bytes(vec![0xde, 0xad])]];
        let (sql, _) = build_insert_sql("public", "t", &cols, &rows);
        assert!(sql.contains("$1::bytea"));
    }

    #[test]
    fn sql_value_round_trips_through_json() {
        let row = vec![
            SqlValue::Null(SqlNullType::DateTime),
            SqlValue::Bool(true),
            SqlValue::Bytes(vec![1, 2, 3]),
            SqlValue::Uuid(uuid::Uuid::nil()),
        ];
        let encoded = serde_json::to_vec(&row).unwrap();
        let decoded: Vec<SqlValue> = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, row);
    }
}
