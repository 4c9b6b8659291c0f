//! Catalog introspection and SQL dump generation.

use serde::Serialize;
use serde_json::Value;

use crate::engine::{Row, SqlClient, SqlValue};
use crate::error::{PanelError, PanelResult};
use crate::transpiler::{escape_identifier, render_literal, Quote};

/// Databases hidden from listings.
pub const SYSTEM_DATABASES: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Rows per `INSERT` in generated dumps.
pub const DUMP_BATCH_SIZE: usize = 100;

const RULE: &str = "-- =====================================================\n";

/// First column of every row, as text.
fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next())
        .map(|(_, value)| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

/// User databases on the server, system schemas excluded.
pub async fn list_databases<C: SqlClient>(client: &mut C) -> PanelResult<Vec<String>> {
    let rows = client.query("SHOW DATABASES", &[]).await?;
    Ok(first_column(rows)
        .into_iter()
        .filter(|db| !SYSTEM_DATABASES.contains(&db.as_str()))
        .collect())
}

pub async fn database_exists<C: SqlClient>(client: &mut C, name: &str) -> PanelResult<bool> {
    let rows = client
        .query(
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
            &[SqlValue::from(name)],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Tables in the connection's current database.
pub async fn list_tables<C: SqlClient>(client: &mut C) -> PanelResult<Vec<String>> {
    let rows = client.query("SHOW TABLES", &[]).await?;
    Ok(first_column(rows))
}

pub async fn list_tables_in<C: SqlClient>(client: &mut C, database: &str) -> PanelResult<Vec<String>> {
    let sql = format!("SHOW TABLES FROM {}", escape_identifier(database));
    let rows = client.query(&sql, &[]).await?;
    Ok(first_column(rows))
}

pub async fn table_exists<C: SqlClient>(client: &mut C, table: &str) -> PanelResult<bool> {
    let rows = client
        .query(
            "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            &[SqlValue::from(table)],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// `SHOW COLUMNS` rows: `Field`, `Type`, `Null`, `Key`, `Default`, `Extra`.
pub async fn describe_table<C: SqlClient>(client: &mut C, table: &str) -> PanelResult<Vec<Row>> {
    let sql = format!("SHOW COLUMNS FROM {}", escape_identifier(table));
    client.query(&sql, &[]).await
}

/// Storage details shown next to table data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStatus {
    pub engine: String,
    pub collation: String,
    pub rows: u64,
    pub avg_row_length: u64,
    pub data_length: u64,
    pub created: Option<String>,
    pub updated: Option<String>,
}

impl TableStatus {
    fn from_row(row: &Row) -> Self {
        let text = |key: &str| match row.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let number = |key: &str| match row.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => 0,
        };
        Self {
            engine: text("engine").unwrap_or_else(|| "Unknown".to_string()),
            collation: text("collation").unwrap_or_else(|| "Unknown".to_string()),
            rows: number("table_rows"),
            avg_row_length: number("avg_row_length"),
            data_length: number("data_length"),
            created: text("create_time"),
            updated: text("update_time"),
        }
    }
}

pub async fn table_status<C: SqlClient>(client: &mut C, table: &str) -> PanelResult<TableStatus> {
    let rows = client
        .query(
            "SELECT ENGINE AS engine, TABLE_COLLATION AS collation, TABLE_ROWS AS table_rows, \
             AVG_ROW_LENGTH AS avg_row_length, DATA_LENGTH AS data_length, \
             CREATE_TIME AS create_time, UPDATE_TIME AS update_time \
             FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            &[SqlValue::from(table)],
        )
        .await?;
    Ok(rows.first().map(TableStatus::from_row).unwrap_or_else(|| TableStatus {
        engine: "Unknown".to_string(),
        collation: "Unknown".to_string(),
        ..TableStatus::default()
    }))
}

/// The server's own `CREATE TABLE` text for `table`.
pub async fn show_create_table<C: SqlClient>(client: &mut C, table: &str) -> PanelResult<String> {
    let sql = format!("SHOW CREATE TABLE {}", escape_identifier(table));
    let rows = client.query(&sql, &[]).await?;
    rows.first()
        .and_then(|row| row.get("Create Table"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PanelError::not_found(format!("Table '{}' not found", table)))
}

/// A generated dump and its statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dump {
    pub sql: String,
    pub table_count: usize,
    pub row_count: usize,
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `INSERT` batches for `rows`, columns in the order of the first row.
fn insert_batches(quoter: &dyn Quote, table: &str, rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();
    let column_list = columns
        .iter()
        .map(|c| escape_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = String::new();
    for batch in rows.chunks(DUMP_BATCH_SIZE) {
        sql.push_str(&format!("INSERT INTO {} ({}) VALUES\n", escape_identifier(table), column_list));
        let values: Vec<String> = batch
            .iter()
            .map(|row| {
                let literals: Vec<String> = columns
                    .iter()
                    .map(|c| render_literal(row.get(c.as_str()).unwrap_or(&Value::Null), quoter))
                    .collect();
                format!("({})", literals.join(", "))
            })
            .collect();
        sql.push_str(&values.join(",\n"));
        sql.push_str(";\n\n");
    }
    sql
}

async fn select_all<C: SqlClient>(client: &mut C, table: &str) -> PanelResult<Vec<Row>> {
    let sql = format!("SELECT * FROM {}", escape_identifier(table));
    client.query(&sql, &[]).await
}

/// Structure (and optionally data) of one table.
pub async fn dump_table<C: SqlClient>(client: &mut C, table: &str, include_data: bool) -> PanelResult<Dump> {
    let create = show_create_table(client, table).await?;

    let mut sql = format!("-- Table structure for `{}`\n", table);
    sql.push_str(&format!("-- Generated on: {}\n\n", timestamp()));
    sql.push_str(&format!("DROP TABLE IF EXISTS {};\n\n", escape_identifier(table)));
    sql.push_str(&create);
    sql.push_str(";\n\n");

    let mut row_count = 0;
    if include_data {
        let rows = select_all(client, table).await?;
        row_count = rows.len();
        if row_count > 0 {
            sql.push_str(&format!("-- Dumping data for table `{}`\n", table));
            sql.push_str(&format!("-- {} rows\n\n", row_count));
            sql.push_str(&insert_batches(&*client, table, &rows));
        }
    }

    Ok(Dump { sql, table_count: 1, row_count })
}

/// Every table of the current database.
pub async fn dump_database<C: SqlClient>(
    client: &mut C,
    database: &str,
    host: &str,
    include_create_db: bool,
    include_data: bool,
) -> PanelResult<Dump> {
    let mut sql = String::from(RULE);
    sql.push_str("-- Full Database SQL Dump\n");
    sql.push_str(&format!("-- Database: `{}`\n", database));
    sql.push_str(&format!("-- Generated on: {}\n", timestamp()));
    sql.push_str(&format!("-- Host: {}\n", host));
    sql.push_str(RULE);
    sql.push('\n');

    if include_create_db {
        sql.push_str("-- Create database\n");
        sql.push_str(&format!(
            "CREATE DATABASE IF NOT EXISTS {} DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n",
            escape_identifier(database)
        ));
        sql.push_str(&format!("USE {};\n\n", escape_identifier(database)));
    } else {
        sql.push_str("-- Make sure you're using the correct database\n");
        sql.push_str(&format!("-- USE {};\n\n", escape_identifier(database)));
    }

    sql.push_str("SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";\n");
    sql.push_str("SET time_zone = \"+00:00\";\n\n");

    let tables = list_tables(client).await?;
    if tables.is_empty() {
        sql.push_str("-- No tables found in database\n");
        return Ok(Dump { sql, table_count: 0, row_count: 0 });
    }

    let mut row_count = 0;
    for (index, table) in tables.iter().enumerate() {
        sql.push_str(RULE);
        sql.push_str(&format!("-- Table structure for `{}`\n", table));
        sql.push_str(RULE);
        sql.push('\n');
        sql.push_str(&format!("DROP TABLE IF EXISTS {};\n\n", escape_identifier(table)));
        sql.push_str(&show_create_table(client, table).await?);
        sql.push_str(";\n\n");

        if include_data {
            let rows = select_all(client, table).await?;
            row_count += rows.len();
            if rows.is_empty() {
                sql.push_str("-- Table is empty\n\n");
            } else {
                sql.push_str(&format!("-- Dumping data for table `{}`\n", table));
                sql.push_str(&format!("-- {} rows\n\n", rows.len()));
                sql.push_str(&insert_batches(&*client, table, &rows));
            }
        }

        if index + 1 < tables.len() {
            sql.push('\n');
        }
    }

    sql.push_str(RULE);
    sql.push_str("-- End of dump\n");
    sql.push_str(RULE);

    Ok(Dump { sql, table_count: tables.len(), row_count })
}
