//! Generic record CRUD over any table.
//!
//! Every user-supplied value is bound as a parameter. Column names coming from
//! request payloads are validated as identifiers and backtick-escaped.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::{Row, SqlClient, SqlValue};
use crate::error::{PanelError, PanelResult};
use crate::parser::validate_identifier;
use crate::schema::{describe_table, table_status, TableStatus};
use crate::transpiler::escape_identifier;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Records per multi-row `INSERT`.
pub const INSERT_BATCH_SIZE: usize = 50;

/// A requested page, already clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(number: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number as u64 - 1) * self.limit as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_rows: u64,
    pub per_page: u32,
    pub showing_from: u64,
    pub showing_to: u64,
}

impl Pagination {
    pub fn new(page: Page, total_rows: u64) -> Self {
        let offset = page.offset();
        Self {
            current_page: page.number,
            total_pages: total_rows.div_ceil(page.limit as u64),
            total_rows,
            per_page: page.limit,
            showing_from: if total_rows == 0 { 0 } else { offset + 1 },
            showing_to: (offset + page.limit as u64).min(total_rows),
        }
    }
}

/// One page of a table plus its column and storage metadata.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub table_name: String,
    pub columns: Vec<Row>,
    pub data: Vec<Row>,
    pub pagination: Pagination,
    pub table_info: TableStatus,
}

/// One page of search hits.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub columns: Vec<Row>,
    pub data: Vec<Row>,
    pub pagination: Pagination,
    pub search_term: String,
}

fn count_from(rows: &[Row]) -> u64 {
    match rows.first().and_then(|row| row.get("total")) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn page_params(page: Page) -> [SqlValue; 2] {
    [SqlValue::Int(page.limit as i64), SqlValue::Int(page.offset() as i64)]
}

fn checked_columns(record: &Map<String, Value>) -> PanelResult<Vec<String>> {
    if record.is_empty() {
        return Err(PanelError::invalid("Invalid record data"));
    }
    record
        .keys()
        .map(|key| validate_identifier(key, "column").map(|_| escape_identifier(key)))
        .collect()
}

/// Rows `[offset, offset + limit)` of `table`.
pub async fn fetch_page<C: SqlClient>(client: &mut C, table: &str, page: Page) -> PanelResult<TablePage> {
    let escaped = escape_identifier(table);

    let total = client
        .query(&format!("SELECT COUNT(*) AS total FROM {}", escaped), &[])
        .await?;
    let total_rows = count_from(&total);

    let columns = describe_table(client, table).await?;
    let data = client
        .query(&format!("SELECT * FROM {} LIMIT ? OFFSET ?", escaped), &page_params(page))
        .await?;
    let table_info = table_status(client, table).await?;

    Ok(TablePage {
        table_name: table.to_string(),
        columns,
        data,
        pagination: Pagination::new(page, total_rows),
        table_info,
    })
}

/// Insert one record; returns the generated id (0 when the table has none).
pub async fn insert_record<C: SqlClient>(
    client: &mut C,
    table: &str,
    record: &Map<String, Value>,
) -> PanelResult<u64> {
    let columns = checked_columns(record)?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        escape_identifier(table),
        columns.join(", "),
        placeholders
    );
    let params: Vec<SqlValue> = record.values().map(SqlValue::from_json).collect();
    let outcome = client.execute(&sql, &params).await?;
    Ok(outcome.last_insert_id)
}

/// Update the rows where `key_column = key_value`; returns affected rows.
pub async fn update_record<C: SqlClient>(
    client: &mut C,
    table: &str,
    record: &Map<String, Value>,
    key_column: &str,
    key_value: &Value,
) -> PanelResult<u64> {
    validate_identifier(key_column, "column")?;
    let assignments: Vec<String> = checked_columns(record)?
        .into_iter()
        .map(|column| format!("{} = ?", column))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        escape_identifier(table),
        assignments.join(", "),
        escape_identifier(key_column)
    );
    let mut params: Vec<SqlValue> = record.values().map(SqlValue::from_json).collect();
    params.push(SqlValue::from_json(key_value));
    Ok(client.execute(&sql, &params).await?.rows_affected)
}

/// Delete the rows where `key_column = key_value`; returns affected rows.
pub async fn delete_record<C: SqlClient>(
    client: &mut C,
    table: &str,
    key_column: &str,
    key_value: &Value,
) -> PanelResult<u64> {
    validate_identifier(key_column, "column")?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        escape_identifier(table),
        escape_identifier(key_column)
    );
    Ok(client.execute(&sql, &[SqlValue::from_json(key_value)]).await?.rows_affected)
}

/// Bulk insert in batches. Columns come from the first record; keys missing
/// from later records, and the string `"NULL"`, bind as NULL.
pub async fn insert_records<C: SqlClient>(
    client: &mut C,
    table: &str,
    records: &[Map<String, Value>],
) -> PanelResult<u64> {
    let first = records
        .first()
        .ok_or_else(|| PanelError::invalid("Invalid records data"))?;
    let keys: Vec<&String> = first.keys().collect();
    let columns = checked_columns(first)?;
    let tuple = format!("({})", vec!["?"; keys.len()].join(", "));

    let mut inserted = 0;
    for batch in records.chunks(INSERT_BATCH_SIZE) {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            escape_identifier(table),
            columns.join(", "),
            vec![tuple.as_str(); batch.len()].join(", ")
        );
        let params: Vec<SqlValue> = batch
            .iter()
            .flat_map(|record| {
                keys.iter().map(move |key| match record.get(key.as_str()) {
                    None | Some(Value::Null) => SqlValue::Null,
                    Some(Value::String(s)) if s == "NULL" => SqlValue::Null,
                    Some(value) => SqlValue::from_json(value),
                })
            })
            .collect();
        client.execute(&sql, &params).await?;
        inserted += batch.len() as u64;
    }

    tracing::info!(table, inserted, "Inserted records");
    Ok(inserted)
}

fn is_text_type(column_type: &str) -> bool {
    let upper = column_type.to_ascii_uppercase();
    upper.contains("CHAR") || upper.contains("TEXT")
}

/// `LIKE %term%` across every CHAR/VARCHAR/TEXT column. An empty term pages
/// through the whole table.
pub async fn search_records<C: SqlClient>(
    client: &mut C,
    table: &str,
    term: &str,
    page: Page,
) -> PanelResult<SearchPage> {
    let escaped = escape_identifier(table);
    let columns = describe_table(client, table).await?;

    let (filter, mut params) = if term.is_empty() {
        (String::new(), Vec::new())
    } else {
        let searchable: Vec<String> = columns
            .iter()
            .filter(|col| col.get("Type").and_then(Value::as_str).is_some_and(is_text_type))
            .filter_map(|col| col.get("Field").and_then(Value::as_str))
            .map(|field| format!("{} LIKE ?", escape_identifier(field)))
            .collect();
        if searchable.is_empty() {
            return Err(PanelError::invalid("No searchable text columns found in table"));
        }
        let pattern = SqlValue::String(format!("%{}%", term));
        let params = vec![pattern; searchable.len()];
        (format!(" WHERE ({})", searchable.join(" OR ")), params)
    };

    let total = client
        .query(&format!("SELECT COUNT(*) AS total FROM {}{}", escaped, filter), &params)
        .await?;
    let total_rows = count_from(&total);

    params.extend(page_params(page));
    let data = client
        .query(&format!("SELECT * FROM {}{} LIMIT ? OFFSET ?", escaped, filter), &params)
        .await?;

    Ok(SearchPage {
        columns,
        data,
        pagination: Pagination::new(page, total_rows),
        search_term: term.to_string(),
    })
}
