//! The administrative action layer.
//!
//! A request is a flat mapping with an `action` discriminator plus connection
//! fields. [`Command::from_request`] validates everything it can before a
//! connection is opened; [`run`] then executes the command over one
//! [`SqlClient`] and produces a [`Reply`].
//!
//! ```text
//! { "action": "create_table", "db_host": "localhost", "db_user": "app",
//!   "db_name": "shop", "table_name": "users", "columns": [...] }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::{AlterAction, TableSpec};
use crate::de;
use crate::engine::{ConnectionProfile, MySqlClient, ProfileDefaults, SqlClient, SqlValue};
use crate::error::{PanelError, PanelResult};
use crate::parser::{parse_alter, parse_table, validate_database_name, validate_table_name};
use crate::records::{self, Page};
use crate::schema;
use crate::transpiler::{self, escape_identifier};

/// Every action name the dispatcher understands.
pub const ACTIONS: &[&str] = &[
    "check_connection",
    "list_databases",
    "connect_database",
    "create_database",
    "delete_database",
    "rename_database",
    "set_database_credentials",
    "list_tables",
    "create_table",
    "delete_table",
    "rename_table",
    "alter_table",
    "get_table_structure",
    "get_table_data",
    "generate_table_sql",
    "generate_database_sql",
    "insert_random_data",
    "insert_records",
    "insert_record",
    "update_record",
    "delete_record",
    "search_records",
    "execute_sql",
];

/// Host part used for accounts created through the panel.
pub const USER_HOST: &str = "localhost";

/// Whether a command runs against the server or inside one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Server,
    Database,
}

/// Connection fields carried by every request.
#[derive(Default, Deserialize)]
pub struct ConnectionParams {
    #[serde(default, alias = "server_host", deserialize_with = "de::scalar_string")]
    pub db_host: Option<String>,
    #[serde(default, alias = "server_port", deserialize_with = "de::number")]
    pub db_port: Option<u16>,
    #[serde(default, alias = "server_user", deserialize_with = "de::scalar_string")]
    pub db_user: Option<String>,
    #[serde(default, alias = "server_pass", deserialize_with = "de::scalar_string")]
    pub db_pass: Option<String>,
    #[serde(default, deserialize_with = "de::scalar_string")]
    pub db_name: Option<String>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_pass", &self.db_pass.as_ref().map(|_| "***"))
            .field("db_name", &self.db_name)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ConnectionParams {
    pub fn from_request(request: &Value) -> PanelResult<Self> {
        serde_json::from_value(request.clone())
            .map_err(|e| PanelError::invalid(format!("Invalid connection parameters: {}", e)))
    }

    /// Merge with server defaults into a profile for `target`.
    pub fn into_profile(self, defaults: &ProfileDefaults, target: Target) -> PanelResult<ConnectionProfile> {
        let host = non_empty(self.db_host).or_else(|| defaults.host.clone());
        let user = non_empty(self.db_user).or_else(|| defaults.user.clone());
        let database = non_empty(self.db_name);

        let (Some(host), Some(user)) = (host, user) else {
            return Err(PanelError::invalid(match target {
                Target::Server => "Missing required connection parameters (host, username)",
                Target::Database => "Missing required connection parameters (host, database name, username)",
            }));
        };

        let password = self.db_pass.or_else(|| defaults.password.clone()).unwrap_or_default();
        let port = self.db_port.or(defaults.port).unwrap_or(ConnectionProfile::DEFAULT_PORT);
        let profile = ConnectionProfile::new(host, user, password).with_port(port);

        match target {
            Target::Server => Ok(profile),
            Target::Database => {
                let database = database.ok_or_else(|| {
                    PanelError::invalid("Missing required connection parameters (host, database name, username)")
                })?;
                validate_database_name(&database)?;
                Ok(profile.with_database(database))
            }
        }
    }
}

/// Account credentials for a database user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (non_empty(username), password.filter(|p| !p.is_empty())) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        }
    }
}

/// Wire shape of a request, one variant per action.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RawCommand {
    CheckConnection,
    ListDatabases,
    ConnectDatabase {
        #[serde(default, deserialize_with = "de::scalar_string")]
        db_name: Option<String>,
    },
    CreateDatabase {
        #[serde(default, deserialize_with = "de::scalar_string")]
        db_name: Option<String>,
        #[serde(default, alias = "username", deserialize_with = "de::scalar_string")]
        db_username: Option<String>,
        #[serde(default, alias = "password", deserialize_with = "de::scalar_string")]
        db_password: Option<String>,
    },
    DeleteDatabase {
        #[serde(default, deserialize_with = "de::scalar_string")]
        db_name: Option<String>,
    },
    RenameDatabase {
        #[serde(default, alias = "old_db_name", deserialize_with = "de::scalar_string")]
        old_name: Option<String>,
        #[serde(default, alias = "new_db_name", deserialize_with = "de::scalar_string")]
        new_name: Option<String>,
    },
    SetDatabaseCredentials {
        #[serde(default, deserialize_with = "de::scalar_string")]
        db_name: Option<String>,
        #[serde(default, alias = "username", deserialize_with = "de::scalar_string")]
        db_username: Option<String>,
        #[serde(default, alias = "password", deserialize_with = "de::scalar_string")]
        db_password: Option<String>,
    },
    ListTables,
    CreateTable {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::json_text")]
        columns: Option<Value>,
    },
    DeleteTable {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
    },
    RenameTable {
        #[serde(default, deserialize_with = "de::scalar_string")]
        old_table_name: Option<String>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        new_table_name: Option<String>,
    },
    AlterTable {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        alter_action: Option<String>,
        #[serde(default, alias = "column", deserialize_with = "de::json_text")]
        column_data: Option<Value>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        old_column_name: Option<String>,
    },
    GetTableStructure {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
    },
    GetTableData {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::number")]
        page: Option<u32>,
        #[serde(default, deserialize_with = "de::number")]
        limit: Option<u32>,
    },
    GenerateTableSql {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::flag")]
        include_data: Option<bool>,
    },
    GenerateDatabaseSql {
        #[serde(default, deserialize_with = "de::flag")]
        include_create_db: Option<bool>,
        #[serde(default, deserialize_with = "de::flag")]
        include_data: Option<bool>,
    },
    #[serde(alias = "insert_records")]
    InsertRandomData {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, alias = "records", deserialize_with = "de::json_text")]
        records_data: Option<Vec<Map<String, Value>>>,
    },
    InsertRecord {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, alias = "record", deserialize_with = "de::json_text")]
        record_data: Option<Map<String, Value>>,
    },
    UpdateRecord {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, alias = "record", deserialize_with = "de::json_text")]
        record_data: Option<Map<String, Value>>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        primary_key: Option<String>,
        #[serde(default)]
        primary_value: Option<Value>,
    },
    DeleteRecord {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        primary_key: Option<String>,
        #[serde(default)]
        primary_value: Option<Value>,
    },
    SearchRecords {
        #[serde(default, deserialize_with = "de::scalar_string")]
        table_name: Option<String>,
        #[serde(default, deserialize_with = "de::scalar_string")]
        search_term: Option<String>,
        #[serde(default, deserialize_with = "de::number")]
        page: Option<u32>,
        #[serde(default, deserialize_with = "de::number")]
        limit: Option<u32>,
    },
    ExecuteSql {
        #[serde(default, alias = "sql", deserialize_with = "de::scalar_string")]
        sql_query: Option<String>,
    },
}

/// A fully validated administrative command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CheckConnection,
    ListDatabases,
    ConnectDatabase { database: String },
    CreateDatabase { database: String, credentials: Option<Credentials> },
    DeleteDatabase { database: String },
    RenameDatabase { from: String, to: String },
    SetDatabaseCredentials { database: String, credentials: Credentials },
    ListTables,
    CreateTable { table: String, spec: TableSpec },
    DeleteTable { table: String },
    RenameTable { from: String, to: String },
    AlterTable { table: String, action: AlterAction },
    GetTableStructure { table: String },
    GetTableData { table: String, page: Page },
    GenerateTableSql { table: String, include_data: bool },
    GenerateDatabaseSql { include_create_db: bool, include_data: bool },
    InsertRecords { table: String, records: Vec<Map<String, Value>> },
    InsertRecord { table: String, record: Map<String, Value> },
    UpdateRecord { table: String, record: Map<String, Value>, key: String, value: Value },
    DeleteRecord { table: String, key: String, value: Value },
    SearchRecords { table: String, term: String, page: Page },
    ExecuteSql { sql: String },
}

fn required(value: Option<String>, field: &str) -> PanelResult<String> {
    non_empty(value).ok_or_else(|| PanelError::invalid(format!("Missing required parameter: {}", field)))
}

fn table_param(value: Option<String>) -> PanelResult<String> {
    let table = required(value, "table_name")?;
    validate_table_name(&table)?;
    Ok(table)
}

fn database_param(value: Option<String>, field: &str) -> PanelResult<String> {
    let database = required(value, field)?;
    validate_database_name(&database)?;
    Ok(database)
}

fn key_value(value: Option<Value>) -> PanelResult<Value> {
    match value {
        None | Some(Value::Null) => Err(PanelError::invalid("Missing required parameter: primary_value")),
        Some(Value::String(s)) if s.is_empty() => {
            Err(PanelError::invalid("Missing required parameter: primary_value"))
        }
        Some(value) => Ok(value),
    }
}

impl Command {
    /// Parse and validate a request mapping.
    pub fn from_request(request: &Value) -> PanelResult<Self> {
        let action = request
            .get("action")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| PanelError::invalid("Invalid or missing action parameter"))?;

        if !ACTIONS.contains(&action) {
            return Err(PanelError::invalid(format!(
                "Invalid action specified. Supported actions: {}",
                ACTIONS.join(", ")
            )));
        }

        let mut request = request.clone();
        request["action"] = Value::from(action);
        let raw: RawCommand = serde_json::from_value(request)
            .map_err(|e| PanelError::invalid(format!("Invalid request: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawCommand) -> PanelResult<Self> {
        Ok(match raw {
            RawCommand::CheckConnection => Self::CheckConnection,
            RawCommand::ListDatabases => Self::ListDatabases,
            RawCommand::ConnectDatabase { db_name } => Self::ConnectDatabase {
                database: database_param(db_name, "db_name")?,
            },
            RawCommand::CreateDatabase { db_name, db_username, db_password } => Self::CreateDatabase {
                database: database_param(db_name, "db_name")?,
                credentials: Credentials::from_parts(db_username, db_password),
            },
            RawCommand::DeleteDatabase { db_name } => Self::DeleteDatabase {
                database: database_param(db_name, "db_name")?,
            },
            RawCommand::RenameDatabase { old_name, new_name } => {
                let from = database_param(old_name, "old_name")?;
                let to = database_param(new_name, "new_name")?;
                if from == to {
                    return Err(PanelError::invalid("New name must be different from old name"));
                }
                Self::RenameDatabase { from, to }
            }
            RawCommand::SetDatabaseCredentials { db_name, db_username, db_password } => {
                let database = database_param(db_name, "db_name")?;
                let credentials = Credentials::from_parts(db_username, db_password)
                    .ok_or_else(|| PanelError::invalid("Username and password are required"))?;
                Self::SetDatabaseCredentials { database, credentials }
            }
            RawCommand::ListTables => Self::ListTables,
            RawCommand::CreateTable { table_name, columns } => Self::CreateTable {
                table: table_param(table_name)?,
                spec: parse_table(&columns.unwrap_or(Value::Null))?,
            },
            RawCommand::DeleteTable { table_name } => Self::DeleteTable {
                table: table_param(table_name)?,
            },
            RawCommand::RenameTable { old_table_name, new_table_name } => {
                let from = required(old_table_name, "old_table_name")?;
                let to = required(new_table_name, "new_table_name")?;
                if validate_table_name(&from).is_err() || validate_table_name(&to).is_err() {
                    return Err(PanelError::invalid("Invalid table name(s)"));
                }
                if from == to {
                    return Err(PanelError::invalid("New name must be different from old name"));
                }
                Self::RenameTable { from, to }
            }
            RawCommand::AlterTable { table_name, alter_action, column_data, old_column_name } => {
                let table = table_param(table_name)?;
                let verb = required(alter_action, "alter_action")?;
                let column = column_data.ok_or_else(|| PanelError::invalid("Invalid column data"))?;
                Self::AlterTable {
                    table,
                    action: parse_alter(&verb, &column, old_column_name.as_deref())?,
                }
            }
            RawCommand::GetTableStructure { table_name } => Self::GetTableStructure {
                table: table_param(table_name)?,
            },
            RawCommand::GetTableData { table_name, page, limit } => Self::GetTableData {
                table: table_param(table_name)?,
                page: Page::new(page, limit),
            },
            RawCommand::GenerateTableSql { table_name, include_data } => Self::GenerateTableSql {
                table: table_param(table_name)?,
                include_data: include_data.unwrap_or(false),
            },
            RawCommand::GenerateDatabaseSql { include_create_db, include_data } => Self::GenerateDatabaseSql {
                include_create_db: include_create_db.unwrap_or(false),
                include_data: include_data.unwrap_or(false),
            },
            RawCommand::InsertRandomData { table_name, records_data } => {
                let table = table_param(table_name)?;
                let records = records_data
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| PanelError::invalid("Invalid records data"))?;
                Self::InsertRecords { table, records }
            }
            RawCommand::InsertRecord { table_name, record_data } => Self::InsertRecord {
                table: table_param(table_name)?,
                record: record_data
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| PanelError::invalid("Invalid record data"))?,
            },
            RawCommand::UpdateRecord { table_name, record_data, primary_key, primary_value } => {
                Self::UpdateRecord {
                    table: table_param(table_name)?,
                    record: record_data
                        .filter(|r| !r.is_empty())
                        .ok_or_else(|| PanelError::invalid("Invalid record data"))?,
                    key: required(primary_key, "primary_key")?,
                    value: key_value(primary_value)?,
                }
            }
            RawCommand::DeleteRecord { table_name, primary_key, primary_value } => Self::DeleteRecord {
                table: table_param(table_name)?,
                key: required(primary_key, "primary_key")?,
                value: key_value(primary_value)?,
            },
            RawCommand::SearchRecords { table_name, search_term, page, limit } => Self::SearchRecords {
                table: table_param(table_name)?,
                term: search_term.map(|t| t.trim().to_string()).unwrap_or_default(),
                page: Page::new(page, limit),
            },
            RawCommand::ExecuteSql { sql_query } => Self::ExecuteSql {
                sql: required(sql_query, "sql_query")?,
            },
        })
    }

    /// Action name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckConnection => "check_connection",
            Self::ListDatabases => "list_databases",
            Self::ConnectDatabase { .. } => "connect_database",
            Self::CreateDatabase { .. } => "create_database",
            Self::DeleteDatabase { .. } => "delete_database",
            Self::RenameDatabase { .. } => "rename_database",
            Self::SetDatabaseCredentials { .. } => "set_database_credentials",
            Self::ListTables => "list_tables",
            Self::CreateTable { .. } => "create_table",
            Self::DeleteTable { .. } => "delete_table",
            Self::RenameTable { .. } => "rename_table",
            Self::AlterTable { .. } => "alter_table",
            Self::GetTableStructure { .. } => "get_table_structure",
            Self::GetTableData { .. } => "get_table_data",
            Self::GenerateTableSql { .. } => "generate_table_sql",
            Self::GenerateDatabaseSql { .. } => "generate_database_sql",
            Self::InsertRecords { .. } => "insert_random_data",
            Self::InsertRecord { .. } => "insert_record",
            Self::UpdateRecord { .. } => "update_record",
            Self::DeleteRecord { .. } => "delete_record",
            Self::SearchRecords { .. } => "search_records",
            Self::ExecuteSql { .. } => "execute_sql",
        }
    }

    pub fn target(&self) -> Target {
        match self {
            Self::ListDatabases
            | Self::ConnectDatabase { .. }
            | Self::CreateDatabase { .. }
            | Self::DeleteDatabase { .. }
            | Self::RenameDatabase { .. }
            | Self::SetDatabaseCredentials { .. } => Target::Server,
            _ => Target::Database,
        }
    }
}

/// Successful outcome: a message plus fields merged into the top-level reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message: String,
    pub data: Map<String, Value>,
}

impl Reply {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: Map::new() }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> PanelResult<Self> {
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// `{ "success": true, "message": ..., ...data }`
    pub fn into_json(self) -> Value {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        body.insert("message".to_string(), Value::String(self.message));
        body.extend(self.data);
        Value::Object(body)
    }
}

/// How `execute_sql` treats a statement's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Returns a result set.
    Rows,
    /// Reports affected rows and the insert id.
    Insert,
    /// Reports affected rows.
    Modify,
    /// DDL and everything else.
    Other,
}

/// Classify a statement by its leading keyword. Returns the reported type name.
pub fn classify_query(sql: &str) -> (String, QueryKind) {
    let keyword: String = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();

    let kind = match keyword.as_str() {
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH" => QueryKind::Rows,
        "INSERT" => QueryKind::Insert,
        "UPDATE" | "DELETE" | "REPLACE" => QueryKind::Modify,
        _ => QueryKind::Other,
    };
    let name = match keyword.as_str() {
        "DESC" => "DESCRIBE".to_string(),
        "" => "UNKNOWN".to_string(),
        _ => keyword,
    };
    (name, kind)
}

async fn grant_access<C: SqlClient>(client: &mut C, database: &str, username: &str) -> PanelResult<()> {
    let grant = format!(
        "GRANT ALL PRIVILEGES ON {}.* TO {}@{}",
        escape_identifier(database),
        client.quote(username),
        client.quote(USER_HOST)
    );
    client.execute(&grant, &[]).await?;
    client.execute("FLUSH PRIVILEGES", &[]).await?;
    Ok(())
}

/// `CREATE USER` / `ALTER USER` take the account and password as literals
/// only, so they are quoted and sent over the text protocol.
fn account_statement<C: SqlClient>(client: &C, verb: &str, credentials: &Credentials) -> String {
    format!(
        "{} {}@{} IDENTIFIED BY {}",
        verb,
        client.quote(&credentials.username),
        client.quote(USER_HOST),
        client.quote(&credentials.password)
    )
}

async fn create_user<C: SqlClient>(client: &mut C, database: &str, credentials: &Credentials) -> PanelResult<()> {
    let statement = account_statement(client, "CREATE USER IF NOT EXISTS", credentials);
    client.execute(&statement, &[]).await?;
    grant_access(client, database, &credentials.username).await
}

/// Execute a validated command.
///
/// `profile` is the profile `client` was opened with; it is only read for
/// reporting (dump headers, messages).
pub async fn run<C: SqlClient>(command: Command, client: &mut C, profile: &ConnectionProfile) -> PanelResult<Reply> {
    let action = command.name();
    tracing::info!(action, host = %profile.host, database = ?profile.database, "Running action");

    let current_db = profile.database.clone().unwrap_or_default();

    match command {
        Command::CheckConnection => {
            client.query("SELECT 1", &[]).await.map_err(|e| e.context("Connected but query failed"))?;
            Ok(Reply::new(format!("Successfully connected to database: {}", current_db)))
        }

        Command::ListDatabases => {
            let databases = schema::list_databases(client)
                .await
                .map_err(|e| e.context("Error retrieving databases"))?;
            let count = databases.len();
            Reply::new("Databases retrieved successfully")
                .with("databases", databases)?
                .with("count", count)
        }

        Command::ConnectDatabase { database } => {
            if !schema::database_exists(client, &database).await? {
                return Err(PanelError::not_found("Database not found"));
            }
            let tables = schema::list_tables_in(client, &database).await?;
            let count = tables.len();
            Reply::new(format!("Successfully connected to database: {}", database))
                .with("database_info", serde_json::json!({ "name": database }))?
                .with("tables", tables)?
                .with("count", count)
        }

        Command::CreateDatabase { database, credentials } => {
            if schema::database_exists(client, &database).await? {
                return Err(PanelError::conflict("Database already exists"));
            }
            client
                .execute(&transpiler::render_create_database(&database), &[])
                .await
                .map_err(|e| e.context("Error creating database"))?;

            match credentials {
                None => Ok(Reply::new(format!("Database '{}' created successfully", database))),
                Some(credentials) => match create_user(client, &database, &credentials).await {
                    Ok(()) => Ok(Reply::new(format!(
                        "Database '{}' created successfully with user credentials",
                        database
                    ))),
                    Err(e) => {
                        tracing::warn!(database = %database, error = %e, "Database created without credentials");
                        Ok(Reply::new(format!(
                            "Database '{}' created but failed to set credentials: {}",
                            database, e
                        )))
                    }
                },
            }
        }

        Command::DeleteDatabase { database } => {
            if !schema::database_exists(client, &database).await? {
                return Err(PanelError::not_found("Database not found"));
            }
            client
                .execute(&transpiler::render_drop_database(&database), &[])
                .await
                .map_err(|e| e.context("Error deleting database"))?;
            Ok(Reply::new(format!("Database '{}' deleted successfully", database)))
        }

        Command::RenameDatabase { from, to } => {
            if !schema::database_exists(client, &from).await? {
                return Err(PanelError::not_found("Source database not found"));
            }
            if schema::database_exists(client, &to).await? {
                return Err(PanelError::conflict("Target database already exists"));
            }
            let step = |e: PanelError| e.context("Error renaming database");
            client.execute(&transpiler::render_create_database(&to), &[]).await.map_err(step)?;
            let tables = schema::list_tables_in(client, &from).await.map_err(step)?;
            for table in &tables {
                client
                    .execute(&transpiler::render_move_table(table, &from, &to), &[])
                    .await
                    .map_err(step)?;
            }
            client.execute(&transpiler::render_drop_database(&from), &[]).await.map_err(step)?;
            Reply::new(format!("Database renamed from '{}' to '{}' successfully", from, to))
                .with("tables_moved", tables.len())
        }

        Command::SetDatabaseCredentials { database, credentials } => {
            if !schema::database_exists(client, &database).await? {
                return Err(PanelError::not_found("Database not found"));
            }
            let step = |e: PanelError| e.context("Error setting credentials");
            let account = [
                SqlValue::from(credentials.username.as_str()),
                SqlValue::from(USER_HOST),
            ];
            let existing = client
                .query("SELECT User FROM mysql.user WHERE User = ? AND Host = ?", &account)
                .await
                .map_err(step)?;
            let verb = if existing.is_empty() { "CREATE USER" } else { "ALTER USER" };
            let statement = account_statement(client, verb, &credentials);
            client.execute(&statement, &[]).await.map_err(step)?;
            grant_access(client, &database, &credentials.username).await.map_err(step)?;
            Ok(Reply::new(format!("Credentials set successfully for database '{}'", database)))
        }

        Command::ListTables => {
            let tables = schema::list_tables(client)
                .await
                .map_err(|e| e.context("Error listing tables"))?;
            let count = tables.len();
            Reply::new("Tables retrieved successfully")
                .with("tables", tables)?
                .with("count", count)
        }

        Command::CreateTable { table, spec } => {
            if schema::table_exists(client, &table).await? {
                return Err(PanelError::conflict(format!("Table '{}' already exists", table)));
            }
            let sql = transpiler::render_create_table(&table, &spec, &*client);
            let indexes = transpiler::render_index_statements(&table, &spec);
            let step = |e: PanelError| e.context("Error creating table");
            client.execute(&sql, &[]).await.map_err(step)?;
            for statement in &indexes {
                client.execute(statement, &[]).await.map_err(step)?;
            }
            Reply::new(format!("Table '{}' created successfully", table))
                .with("sql", sql)?
                .with("index_sql", indexes)
        }

        Command::DeleteTable { table } => {
            client
                .execute(&transpiler::render_drop_table(&table), &[])
                .await
                .map_err(|e| e.context("Error deleting table"))?;
            Ok(Reply::new(format!("Table '{}' deleted successfully", table)))
        }

        Command::RenameTable { from, to } => {
            client
                .execute(&transpiler::render_rename_table(&from, &to), &[])
                .await
                .map_err(|e| e.context("Error renaming table"))?;
            Ok(Reply::new(format!("Table renamed from '{}' to '{}' successfully", from, to)))
        }

        Command::AlterTable { table, action } => {
            let statements = transpiler::render_alter(&table, &action, &*client);
            for statement in &statements {
                client
                    .execute(statement, &[])
                    .await
                    .map_err(|e| e.context("Error altering table"))?;
            }
            let message = match action {
                AlterAction::Add(_) => "Column added successfully",
                AlterAction::Modify { .. } => "Column modified successfully",
                AlterAction::Drop(_) => "Column dropped successfully",
            };
            Reply::new(message).with("sql", statements)
        }

        Command::GetTableStructure { table } => {
            let columns = schema::describe_table(client, &table)
                .await
                .map_err(|e| e.context("Error retrieving table structure"))?;
            Reply::new("Table structure retrieved successfully")
                .with("table_name", table)?
                .with("columns", columns)
        }

        Command::GetTableData { table, page } => {
            let page = records::fetch_page(client, &table, page)
                .await
                .map_err(|e| e.context("Error retrieving table data"))?;
            let mut reply = Reply::new("Table data retrieved successfully");
            if let Value::Object(fields) = serde_json::to_value(page)? {
                reply.data = fields;
            }
            Ok(reply)
        }

        Command::GenerateTableSql { table, include_data } => {
            let dump = schema::dump_table(client, &table, include_data)
                .await
                .map_err(|e| e.context("Error generating SQL"))?;
            let length = dump.sql.len();
            Reply::new("SQL generated successfully")
                .with("sql", dump.sql)?
                .with("table_name", table)?
                .with("has_data", include_data)?
                .with("row_count", dump.row_count)?
                .with("sql_length", length)
        }

        Command::GenerateDatabaseSql { include_create_db, include_data } => {
            let dump = schema::dump_database(client, &current_db, &profile.host, include_create_db, include_data)
                .await
                .map_err(|e| e.context("Error generating database SQL"))?;
            let message = if dump.table_count == 0 {
                "SQL generated successfully (empty database)"
            } else {
                "Database SQL generated successfully"
            };
            let length = dump.sql.len();
            Reply::new(message)
                .with("sql", dump.sql)?
                .with("database_name", current_db)?
                .with("total_tables", dump.table_count)?
                .with("total_rows", dump.row_count)?
                .with("sql_length", length)?
                .with("has_create_db", include_create_db)?
                .with("has_data", include_data && dump.table_count > 0)
        }

        Command::InsertRecords { table, records } => {
            let inserted = records::insert_records(client, &table, &records)
                .await
                .map_err(|e| e.context("Error inserting random data"))?;
            Reply::new(format!(
                "Successfully inserted {} random records into table '{}'",
                inserted, table
            ))
            .with("inserted_count", inserted)
        }

        Command::InsertRecord { table, record } => {
            let id = records::insert_record(client, &table, &record)
                .await
                .map_err(|e| e.context("Error inserting record"))?;
            Reply::new("Record inserted successfully").with("insert_id", id)
        }

        Command::UpdateRecord { table, record, key, value } => {
            let affected = records::update_record(client, &table, &record, &key, &value)
                .await
                .map_err(|e| e.context("Error updating record"))?;
            Reply::new("Record updated successfully").with("affected_rows", affected)
        }

        Command::DeleteRecord { table, key, value } => {
            let affected = records::delete_record(client, &table, &key, &value)
                .await
                .map_err(|e| e.context("Error deleting record"))?;
            Reply::new("Record deleted successfully").with("affected_rows", affected)
        }

        Command::SearchRecords { table, term, page } => {
            let page = records::search_records(client, &table, &term, page)
                .await
                .map_err(|e| e.context("Error searching records"))?;
            let mut reply = Reply::new("Records retrieved successfully");
            if let Value::Object(fields) = serde_json::to_value(page)? {
                reply.data = fields;
            }
            Ok(reply)
        }

        Command::ExecuteSql { sql } => execute_sql(client, sql.trim()).await,
    }
}

/// Validate a request, open a connection for it, run it, and close.
///
/// All validation happens before the connection is attempted.
pub async fn handle(request: &Value, defaults: &ProfileDefaults) -> PanelResult<Value> {
    let command = Command::from_request(request)?;
    let profile = ConnectionParams::from_request(request)?.into_profile(defaults, command.target())?;

    let mut client = MySqlClient::connect(&profile).await?;
    let result = run(command, &mut client, &profile).await;
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "Error closing connection");
    }
    Ok(result?.into_json())
}

async fn execute_sql<C: SqlClient>(client: &mut C, sql: &str) -> PanelResult<Reply> {
    let (query_type, kind) = classify_query(sql);
    let step = |e: PanelError| e.context("SQL Error");

    let reply = match kind {
        QueryKind::Rows => {
            let rows = client.query(sql, &[]).await.map_err(step)?;
            let columns: Vec<String> = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
            let count = rows.len();
            Reply::new(format!("Query executed successfully. {} row(s) returned.", count))
                .with("results", rows)?
                .with("columns", columns)?
                .with("row_count", count)?
        }
        QueryKind::Insert => {
            let outcome = client.execute(sql, &[]).await.map_err(step)?;
            let id = client.last_insert_id().unwrap_or(outcome.last_insert_id);
            Reply::new(format!(
                "Query executed successfully. {} row(s) inserted. Last insert ID: {}",
                outcome.rows_affected, id
            ))
            .with("affected_rows", outcome.rows_affected)?
            .with("insert_id", id)?
        }
        QueryKind::Modify => {
            let outcome = client.execute(sql, &[]).await.map_err(step)?;
            Reply::new(format!(
                "Query executed successfully. {} row(s) affected.",
                outcome.rows_affected
            ))
            .with("affected_rows", outcome.rows_affected)?
        }
        QueryKind::Other => {
            client.execute(sql, &[]).await.map_err(step)?;
            Reply::new("Query executed successfully.")
        }
    };

    reply.with("query_type", query_type)?.with("executed_query", sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::MockClient;
    use serde_json::json;

    fn command(value: Value) -> PanelResult<Command> {
        Command::from_request(&value)
    }

    fn db_profile() -> ConnectionProfile {
        ConnectionProfile::new("db.local", "app", "secret").with_database("shop")
    }

    #[test]
    fn test_missing_and_unknown_action() {
        assert_eq!(
            command(json!({"table_name": "x"})).unwrap_err().to_string(),
            "Invalid or missing action parameter"
        );
        let err = command(json!({"action": "export_connections"})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid action specified"));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_action_whitespace_is_ignored() {
        assert_eq!(command(json!({"action": " list_tables"})).unwrap(), Command::ListTables);
        let cmd = command(json!({"action": "delete_table\n", "table_name": "users"})).unwrap();
        assert_eq!(cmd.name(), "delete_table");
    }

    #[test]
    fn test_create_table_validates_before_connecting() {
        let err = command(json!({
            "action": "create_table",
            "table_name": "files",
            "columns": [{"name": "data", "type": "BLOB", "default": "x"}]
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "BLOB columns cannot have default values in MySQL");

        let err = command(json!({"action": "create_table", "table_name": "bad name", "columns": []})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid table name"));
    }

    #[test]
    fn test_form_encoded_fields() {
        let cmd = command(json!({
            "action": "create_table",
            "table_name": "users",
            "columns": "[{\"name\":\"id\",\"type\":\"INT\",\"autoIncrement\":\"yes\",\"primaryKey\":\"yes\"}]"
        }))
        .unwrap();
        assert!(matches!(cmd, Command::CreateTable { ref spec, .. } if spec.columns()[0].auto_increment));

        let cmd = command(json!({"action": "get_table_data", "table_name": "users", "page": "2", "limit": "9999"})).unwrap();
        assert_eq!(cmd, Command::GetTableData { table: "users".into(), page: Page { number: 2, limit: 1000 } });
    }

    #[test]
    fn test_insert_records_alias() {
        let cmd = command(json!({
            "action": "insert_records",
            "table_name": "users",
            "records": [{"name": "a"}]
        }))
        .unwrap();
        assert_eq!(cmd.name(), "insert_random_data");
        assert!(command(json!({"action": "insert_random_data", "table_name": "users", "records_data": "[]"})).is_err());
    }

    #[test]
    fn test_rename_rules() {
        let err = command(json!({"action": "rename_database", "old_name": "a", "new_name": "a"})).unwrap_err();
        assert_eq!(err.to_string(), "New name must be different from old name");
        let err = command(json!({"action": "rename_table", "old_table_name": "a", "new_table_name": "b-c"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid table name(s)");
    }

    #[test]
    fn test_credentials_required() {
        let err = command(json!({"action": "set_database_credentials", "db_name": "shop", "db_username": "u"})).unwrap_err();
        assert_eq!(err.to_string(), "Username and password are required");

        let cmd = command(json!({"action": "create_database", "db_name": "shop", "db_username": "u"})).unwrap();
        assert_eq!(cmd, Command::CreateDatabase { database: "shop".into(), credentials: None });
    }

    #[test]
    fn test_targets() {
        assert_eq!(command(json!({"action": "list_databases"})).unwrap().target(), Target::Server);
        assert_eq!(command(json!({"action": "list_tables"})).unwrap().target(), Target::Database);
    }

    #[test]
    fn test_connection_profile_merge() {
        let defaults = ProfileDefaults {
            host: Some("localhost".into()),
            port: Some(3307),
            user: Some("root".into()),
            password: None,
        };
        let params = ConnectionParams::from_request(&json!({"server_user": "admin", "db_name": "shop"})).unwrap();
        let profile = params.into_profile(&defaults, Target::Database).unwrap();
        assert_eq!(profile.host, "localhost");
        assert_eq!(profile.port, 3307);
        assert_eq!(profile.username, "admin");
        assert_eq!(profile.database.as_deref(), Some("shop"));

        let params = ConnectionParams::from_request(&json!({"db_host": "h", "db_user": "u"})).unwrap();
        let err = params.into_profile(&ProfileDefaults::default(), Target::Database).unwrap_err();
        assert_eq!(err.to_string(), "Missing required connection parameters (host, database name, username)");

        let params = ConnectionParams::from_request(&json!({"db_port": "3310"})).unwrap();
        assert!(params.into_profile(&ProfileDefaults::default(), Target::Server).is_err());
    }

    #[test]
    fn test_classify_query() {
        assert_eq!(classify_query("  select 1"), ("SELECT".to_string(), QueryKind::Rows));
        assert_eq!(classify_query("desc users"), ("DESCRIBE".to_string(), QueryKind::Rows));
        assert_eq!(classify_query("(SELECT 1)"), ("SELECT".to_string(), QueryKind::Rows));
        assert_eq!(classify_query("INSERT INTO t VALUES (1)").1, QueryKind::Insert);
        assert_eq!(classify_query("replace into t values (1)").1, QueryKind::Modify);
        assert_eq!(classify_query("CREATE TABLE t (id INT)"), ("CREATE".to_string(), QueryKind::Other));
        assert_eq!(classify_query("").0, "UNKNOWN");
    }

    #[test]
    fn test_reply_json_shape() {
        let body = Reply::new("ok").with("count", 2).unwrap().into_json();
        assert_eq!(body, json!({"success": true, "message": "ok", "count": 2}));
    }

    #[tokio::test]
    async fn test_create_table_runs_create_then_indexes() {
        let cmd = command(json!({
            "action": "create_table",
            "table_name": "users",
            "columns": [
                {"name": "id", "type": "INT", "auto_increment": true, "primary_key": true},
                {"name": "city", "type": "VARCHAR", "length": 80, "index": true}
            ]
        }))
        .unwrap();
        let mut client = MockClient::new();
        let reply = run(cmd, &mut client, &db_profile()).await.unwrap();

        assert_eq!(reply.message, "Table 'users' created successfully");
        let statements = client.statements();
        assert!(statements[0].contains("information_schema.TABLES"));
        assert!(statements[1].starts_with("CREATE TABLE `users` (`id` INT AUTO_INCREMENT, `city` VARCHAR(80) NULL"));
        assert_eq!(statements[2], "ALTER TABLE `users` ADD INDEX `idx_city` (`city`)");
        assert_eq!(reply.data["sql"], json!(statements[1]));
    }

    #[tokio::test]
    async fn test_create_table_conflict() {
        let cmd = command(json!({"action": "create_table", "table_name": "users", "columns": [{"name": "id", "type": "INT"}]})).unwrap();
        let mut client = MockClient::new().on("information_schema.TABLES", vec![json!({"TABLE_NAME": "users"})]);
        let err = run(cmd, &mut client, &db_profile()).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(client.log.len(), 1);
    }

    #[tokio::test]
    async fn test_engine_errors_pass_through() {
        let cmd = command(json!({
            "action": "alter_table",
            "table_name": "users",
            "alter_action": "add",
            "column_data": "{\"name\":\"age\",\"type\":\"INT\"}"
        }))
        .unwrap();
        let mut client = MockClient::new().fail_on("ADD COLUMN", "Duplicate column name 'age'");
        let err = run(cmd, &mut client, &db_profile()).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Error altering table: Duplicate column name 'age'");
    }

    #[tokio::test]
    async fn test_rename_database_moves_tables() {
        let cmd = command(json!({"action": "rename_database", "old_name": "old", "new_name": "new"})).unwrap();
        let mut client = MockClient::new()
            .on_bound("SCHEMATA", "old", vec![json!({"SCHEMA_NAME": "old"})])
            .on("SHOW TABLES FROM `old`", vec![json!({"Tables_in_old": "a"}), json!({"Tables_in_old": "b"})]);
        let profile = ConnectionProfile::new("localhost", "root", "");
        let reply = run(cmd, &mut client, &profile).await.unwrap();
        assert_eq!(reply.message, "Database renamed from 'old' to 'new' successfully");
        let statements = client.statements();
        assert!(statements.contains(&"CREATE DATABASE `new` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"));
        assert!(statements.contains(&"RENAME TABLE `old`.`a` TO `new`.`a`"));
        assert!(statements.contains(&"RENAME TABLE `old`.`b` TO `new`.`b`"));
        assert_eq!(statements.last(), Some(&"DROP DATABASE `old`"));
    }

    #[tokio::test]
    async fn test_database_not_found() {
        let cmd = command(json!({"action": "delete_database", "db_name": "ghost"})).unwrap();
        let mut client = MockClient::new();
        let err = run(cmd, &mut client, &ConnectionProfile::new("localhost", "root", "")).await.unwrap_err();
        assert_eq!(err.to_string(), "Database not found");
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_set_credentials_creates_missing_user() {
        let cmd = command(json!({
            "action": "set_database_credentials",
            "db_name": "shop",
            "db_username": "shop_app",
            "db_password": "pw"
        }))
        .unwrap();
        let mut client = MockClient::new().on("SCHEMATA", vec![json!({"SCHEMA_NAME": "shop"})]);
        run(cmd, &mut client, &ConnectionProfile::new("localhost", "root", "")).await.unwrap();

        let (sql, params) = &client.log[2];
        assert_eq!(sql, "CREATE USER 'shop_app'@'localhost' IDENTIFIED BY 'pw'");
        assert!(params.is_empty());
        assert_eq!(client.log[3].0, "GRANT ALL PRIVILEGES ON `shop`.* TO 'shop_app'@'localhost'");
        assert_eq!(client.log[4].0, "FLUSH PRIVILEGES");
    }

    #[tokio::test]
    async fn test_set_credentials_alters_existing_user() {
        let cmd = command(json!({
            "action": "set_database_credentials",
            "db_name": "shop",
            "db_username": "shop_app",
            "db_password": "it's"
        }))
        .unwrap();
        let mut client = MockClient::new()
            .on("SCHEMATA", vec![json!({"SCHEMA_NAME": "shop"})])
            .on("mysql.user", vec![json!({"User": "shop_app"})]);
        run(cmd, &mut client, &ConnectionProfile::new("localhost", "root", "")).await.unwrap();

        let (sql, params) = &client.log[2];
        assert_eq!(sql, r"ALTER USER 'shop_app'@'localhost' IDENTIFIED BY 'it\'s'");
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_create_database_quotes_new_account() {
        let cmd = command(json!({
            "action": "create_database",
            "db_name": "shop",
            "db_username": "o'neil",
            "db_password": "p'w"
        }))
        .unwrap();
        let mut client = MockClient::new();
        let reply = run(cmd, &mut client, &ConnectionProfile::new("localhost", "root", "")).await.unwrap();

        assert!(!reply.message.contains("failed"));
        let statements = client.statements();
        let create = statements
            .iter()
            .find(|sql| sql.starts_with("CREATE USER"))
            .unwrap();
        assert_eq!(*create, r"CREATE USER IF NOT EXISTS 'o\'neil'@'localhost' IDENTIFIED BY 'p\'w'");
        assert!(statements.contains(&r"GRANT ALL PRIVILEGES ON `shop`.* TO 'o\'neil'@'localhost'"));
    }

    #[tokio::test]
    async fn test_execute_sql_reports_rows() {
        let cmd = command(json!({"action": "execute_sql", "sql_query": " SELECT id FROM users "})).unwrap();
        let mut client = MockClient::new().on("SELECT id", vec![json!({"id": 1}), json!({"id": 2})]);
        let reply = run(cmd, &mut client, &db_profile()).await.unwrap();
        assert_eq!(reply.message, "Query executed successfully. 2 row(s) returned.");
        assert_eq!(reply.data["columns"], json!(["id"]));
        assert_eq!(reply.data["query_type"], json!("SELECT"));
        assert_eq!(reply.data["executed_query"], json!("SELECT id FROM users"));
    }

    #[tokio::test]
    async fn test_execute_sql_insert() {
        let cmd = command(json!({"action": "execute_sql", "sql_query": "INSERT INTO t VALUES (1)"})).unwrap();
        let mut client = MockClient::new();
        let reply = run(cmd, &mut client, &db_profile()).await.unwrap();
        assert_eq!(reply.data["insert_id"], json!(1));
        assert_eq!(reply.data["affected_rows"], json!(1));
    }

    #[tokio::test]
    async fn test_generate_database_sql_uses_profile() {
        let cmd = command(json!({"action": "generate_database_sql", "include_create_db": "true"})).unwrap();
        let mut client = MockClient::new();
        let reply = run(cmd, &mut client, &db_profile()).await.unwrap();
        assert_eq!(reply.message, "SQL generated successfully (empty database)");
        assert_eq!(reply.data["database_name"], json!("shop"));
        assert!(reply.data["sql"].as_str().unwrap().contains("-- Host: db.local"));
    }
}
