//! # sqlpanel - MySQL administration toolkit
//!
//! > **Describe columns. Get DDL.**
//!
//! sqlpanel turns loosely-typed column descriptors (as sent by a web form)
//! into validated, escaped MySQL DDL, and runs a small set of administrative
//! actions (databases, tables, records, dumps, ad-hoc SQL) over one connection.
//!
//! ## Quick Example
//!
//! ```rust
//! use sqlpanel::prelude::*;
//!
//! let columns = serde_json::json!([
//!     { "name": "id", "type": "INT", "auto_increment": true, "primary_key": true },
//!     { "name": "age", "type": "INT", "default": "18" }
//! ]);
//! let spec = parse_table(&columns).unwrap();
//! let sql = render_create_table("t", &spec, &MySqlQuoter);
//! assert!(sql.starts_with("CREATE TABLE `t` (`id` INT AUTO_INCREMENT, `age` INT NULL DEFAULT 18"));
//! ```
//!
//! ## Pipeline
//!
//! | Stage        | Module         | Output                      |
//! |--------------|----------------|-----------------------------|
//! | Validate     | [`parser`]     | [`ast::ColumnSpec`]         |
//! | Assemble     | [`transpiler`] | DDL strings                 |
//! | Execute      | [`engine`]     | rows / affected counts      |
//! | Dispatch     | [`actions`]    | `{ success, message, ... }` |

pub mod actions;
pub mod ast;
pub mod de;
pub mod engine;
pub mod error;
pub mod parser;
pub mod records;
pub mod schema;
pub mod transpiler;

pub mod prelude {
    pub use crate::actions::{handle, run, Command, ConnectionParams, Reply, Target};
    pub use crate::ast::*;
    pub use crate::engine::{ConnectionProfile, MySqlClient, MySqlQuoter, ProfileDefaults, SqlClient, SqlValue};
    pub use crate::error::*;
    pub use crate::parser::{parse_alter, parse_column, parse_table};
    pub use crate::transpiler::{
        render_alter, render_column_definition, render_create_table, render_index_statements, Quote,
    };
}

/// Validate a JSON column array and render every statement needed to create
/// the table: the `CREATE TABLE` first, then one `ADD INDEX` per indexed column.
///
/// # Example
///
/// ```
/// let sql = sqlpanel::create_table_sql("files", r#"[{"name":"path","type":"VARCHAR","length":255,"index":true}]"#)
///     .unwrap();
/// assert_eq!(sql[1], "ALTER TABLE `files` ADD INDEX `idx_path` (`path`)");
/// ```
pub fn create_table_sql(table: &str, columns_json: &str) -> error::PanelResult<Vec<String>> {
    parser::validate_table_name(table)?;
    let columns: serde_json::Value = serde_json::from_str(columns_json)
        .map_err(|e| error::PanelError::invalid(format!("Invalid columns data: {}", e)))?;
    let spec = parser::parse_table(&columns)?;

    let mut statements = vec![transpiler::render_create_table(table, &spec, &engine::MySqlQuoter)];
    statements.extend(transpiler::render_index_statements(table, &spec));
    Ok(statements)
}
