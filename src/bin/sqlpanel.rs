//! sqlpanel - column descriptors in, MySQL DDL out
//!
//! # Usage
//!
//! ```bash
//! # Render CREATE TABLE from a descriptor file
//! sqlpanel render columns.json --table users
//!
//! # Render an ALTER
//! sqlpanel alter column.json --table users --action modify --old-name mail
//!
//! # Create the table for real
//! sqlpanel apply columns.json --table users --database-url mysql://root@localhost/shop
//!
//! # Run arbitrary SQL
//! sqlpanel exec "SELECT * FROM users" --format json
//! ```

use std::collections::HashMap;
use std::io::Read;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlpanel::actions::{classify_query, QueryKind};
use sqlpanel::engine::Row;
use sqlpanel::prelude::*;

#[derive(Parser)]
#[command(name = "sqlpanel")]
#[command(version)]
#[command(about = "MySQL DDL from column descriptors", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlpanel render columns.json --table users
    sqlpanel alter column.json --table users --action add
    echo '[{\"name\":\"id\",\"type\":\"INT\"}]' | sqlpanel render - --table t
    sqlpanel exec 'SHOW TABLES' --database-url mysql://root@localhost/shop")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true, env = "SQLPANEL_DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlterVerb {
    Add,
    Modify,
    Drop,
}

impl AlterVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Drop => "drop",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CREATE TABLE and index statements for a column array
    Render {
        /// JSON file with the column array (`-` for stdin)
        columns: String,
        /// Table name
        #[arg(short, long)]
        table: String,
    },
    /// Print the ALTER statements for one column
    Alter {
        /// JSON file with the column object (`-` for stdin)
        column: String,
        #[arg(short, long)]
        table: String,
        #[arg(short, long, value_enum)]
        action: AlterVerb,
        /// Current name when renaming through `modify`
        #[arg(long)]
        old_name: Option<String>,
    },
    /// Create a table from a column array
    Apply {
        columns: String,
        #[arg(short, long)]
        table: String,
        /// Show the statements without executing them
        #[arg(short, long)]
        dry_run: bool,
    },
    /// Execute one SQL statement
    Exec {
        sql: String,
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the accepted default-value grammar per type family
    Types,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(&cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Render { columns, table } => {
            let statements = sqlpanel::create_table_sql(table, &read_input(columns)?)?;
            print_statements(&statements);
        }
        Commands::Alter { column, table, action, old_name } => {
            sqlpanel::parser::validate_table_name(table)?;
            let column: serde_json::Value = serde_json::from_str(&read_input(column)?)?;
            let action = parse_alter(action.as_str(), &column, old_name.as_deref())?;
            print_statements(&render_alter(table, &action, &MySqlQuoter));
        }
        Commands::Apply { columns, table, dry_run } => {
            let statements = sqlpanel::create_table_sql(table, &read_input(columns)?)?;
            if *dry_run {
                print_statements(&statements);
                return Ok(());
            }
            let mut client = connect(cli).await?;
            for sql in &statements {
                if cli.verbose {
                    println!("{} {}", "Executing:".dimmed(), sql.white());
                }
                client.execute(sql, &[]).await?;
            }
            println!("{} Table '{}' created successfully", "✓".green(), table.cyan());
            client.close().await?;
        }
        Commands::Exec { sql, format } => {
            let mut client = connect(cli).await?;
            let (query_type, kind) = classify_query(sql);
            if cli.verbose {
                println!("{} {}", "Query type:".dimmed(), query_type.yellow());
            }
            match kind {
                QueryKind::Rows => {
                    let rows = client.query(sql, &[]).await?;
                    format_output(&rows, *format);
                }
                QueryKind::Insert => {
                    let outcome = client.execute(sql, &[]).await?;
                    println!(
                        "{} {} row(s) inserted. Last insert ID: {}",
                        "✓".green(),
                        outcome.rows_affected,
                        outcome.last_insert_id
                    );
                }
                QueryKind::Modify | QueryKind::Other => {
                    let outcome = client.execute(sql, &[]).await?;
                    println!("{} {} row(s) affected", "✓".green(), outcome.rows_affected);
                }
            }
            client.close().await?;
        }
        Commands::Types => show_types(),
    }
    Ok(())
}

fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

async fn connect(cli: &Cli) -> anyhow::Result<MySqlClient> {
    let Some(url) = cli.database_url.as_deref() else {
        anyhow::bail!("No database URL. Use --database-url or set SQLPANEL_DATABASE_URL");
    };
    if cli.verbose {
        println!("{}", "Connecting...".dimmed());
    }
    Ok(MySqlClient::connect_url(url).await?)
}

fn print_statements(statements: &[String]) {
    println!("{}", "Generated SQL:".green().bold());
    for sql in statements {
        println!("{};", sql.white());
    }
}

fn format_output(results: &[Row], format: OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns: Vec<&String> = results[0].keys().collect();

            let mut widths: HashMap<&String, usize> = columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).len();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn show_types() {
    println!("{}", "sqlpanel default values".cyan().bold());
    println!();

    let families = [
        ("Integer", "TINYINT … BIGINT", "-?[0-9]+ (no sign when UNSIGNED)"),
        ("Decimal", "DECIMAL FLOAT DOUBLE", "[+-]?(N | N. | N.N | .N)([eE][+-]?N)?"),
        ("Boolean", "BOOLEAN BOOL", "0 1 true false"),
        ("Date", "DATE", "YYYY-MM-DD | CURRENT_TIMESTAMP"),
        ("DateTime", "DATETIME TIMESTAMP", "YYYY-MM-DD HH:MM:SS | CURRENT_TIMESTAMP"),
        ("Time", "TIME", "HH:MM:SS"),
        ("Year", "YEAR", "YYYY"),
        ("Enumerated", "ENUM SET", "any text (quoted); members not checked"),
        ("Text", "CHAR … LONGTEXT", "any text (quoted)"),
        ("Binary", "BLOB BINARY VARBINARY", "none"),
        ("Other", "JSON GEOMETRY …", "any text (quoted)"),
    ];

    println!(
        "{:12} {:24} {}",
        "Family".white().bold(),
        "Types".white().bold(),
        "Default".white().bold()
    );
    println!("{}", "─".repeat(72).dimmed());

    for (family, types, grammar) in families {
        println!("{:12} {:24} {}", family.cyan().bold(), types.yellow(), grammar.dimmed());
    }

    println!();
    println!("{}", "N is one or more digits.".dimmed());
    println!("{}", "NULL is accepted for nullable columns of any type.".dimmed());
}
