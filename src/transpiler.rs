//! DDL assembly from validated descriptors.
//!
//! Every function here is pure string generation. Inputs must come out of
//! [`crate::parser`]; identifiers are escaped but not re-validated.

use serde_json::Value;

use crate::ast::*;

/// Driver-native quoting of a literal, including the surrounding quotes.
pub trait Quote {
    fn quote(&self, value: &str) -> String;
}

/// Options appended to every generated `CREATE TABLE`.
pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// Wrap an identifier in backticks, doubling any embedded backtick.
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `<name> <TYPE>[(length)] [NOT NULL|NULL] [AUTO_INCREMENT] [DEFAULT x] [UNIQUE]`
pub fn render_column_definition(spec: &ColumnSpec, quoter: &dyn Quote) -> String {
    let mut sql = escape_identifier(&spec.name);
    sql.push(' ');
    sql.push_str(&render_type(spec, quoter));

    if !spec.nullable {
        sql.push_str(" NOT NULL");
    } else if !spec.primary_key && !spec.auto_increment {
        sql.push_str(" NULL");
    }

    if spec.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    } else if let Some(default) = &spec.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(default, quoter));
    }

    if spec.unique && !spec.primary_key {
        sql.push_str(" UNIQUE");
    }

    sql
}

fn render_type(spec: &ColumnSpec, quoter: &dyn Quote) -> String {
    if spec.sql_type.family() == TypeFamily::Enumerated {
        let members: Vec<String> = spec.values.iter().map(|v| quoter.quote(v)).collect();
        return format!("{}({})", spec.sql_type, members.join(","));
    }
    match spec.length {
        Some(length) => format!("{}({}){}", spec.sql_type, length, spec.modifiers),
        None => format!("{}{}", spec.sql_type, spec.modifiers),
    }
}

fn render_default(default: &DefaultValue, quoter: &dyn Quote) -> String {
    match default {
        DefaultValue::Null => "NULL".to_string(),
        DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        DefaultValue::Number(n) => n.clone(),
        DefaultValue::Text(s) => quoter.quote(s),
    }
}

/// Full `CREATE TABLE` statement with a composite primary key when present.
pub fn render_create_table(table: &str, spec: &TableSpec, quoter: &dyn Quote) -> String {
    let mut parts: Vec<String> = spec
        .columns()
        .iter()
        .map(|c| render_column_definition(c, quoter))
        .collect();

    let keys: Vec<String> = spec.primary_keys().map(|c| escape_identifier(&c.name)).collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE {} ({}) {}",
        escape_identifier(table),
        parts.join(", "),
        TABLE_OPTIONS
    )
}

/// Secondary index statements run after `CREATE TABLE`.
pub fn render_index_statements(table: &str, spec: &TableSpec) -> Vec<String> {
    spec.columns()
        .iter()
        .filter(|c| c.needs_plain_index())
        .map(|c| render_add_index(table, &c.name))
        .collect()
}

fn render_add_index(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD INDEX {} ({})",
        escape_identifier(table),
        escape_identifier(&format!("idx_{}", column)),
        escape_identifier(column)
    )
}

pub fn render_alter_add(table: &str, column: &ColumnSpec, quoter: &dyn Quote) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {}",
        escape_identifier(table),
        render_column_definition(column, quoter)
    );
    if column.primary_key {
        sql.push_str(&format!(", ADD PRIMARY KEY ({})", escape_identifier(&column.name)));
    }
    sql
}

/// `MODIFY COLUMN`, or `CHANGE COLUMN old` when the column is being renamed.
pub fn render_alter_modify(
    table: &str,
    column: &ColumnSpec,
    old_name: Option<&str>,
    quoter: &dyn Quote,
) -> String {
    match old_name {
        Some(old) => format!(
            "ALTER TABLE {} CHANGE COLUMN {} {}",
            escape_identifier(table),
            escape_identifier(old),
            render_column_definition(column, quoter)
        ),
        None => format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            escape_identifier(table),
            render_column_definition(column, quoter)
        ),
    }
}

pub fn render_alter_drop(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        escape_identifier(table),
        escape_identifier(column)
    )
}

/// The `ALTER TABLE` statement for one action, plus an `ADD INDEX` for
/// indexed columns being added.
pub fn render_alter(table: &str, action: &AlterAction, quoter: &dyn Quote) -> Vec<String> {
    match action {
        AlterAction::Add(column) => {
            let mut statements = vec![render_alter_add(table, column, quoter)];
            if column.needs_plain_index() {
                statements.push(render_add_index(table, &column.name));
            }
            statements
        }
        AlterAction::Modify { column, old_name } => {
            vec![render_alter_modify(table, column, old_name.as_deref(), quoter)]
        }
        AlterAction::Drop(name) => vec![render_alter_drop(table, name)],
    }
}

pub fn render_create_database(name: &str) -> String {
    format!(
        "CREATE DATABASE {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        escape_identifier(name)
    )
}

pub fn render_drop_database(name: &str) -> String {
    format!("DROP DATABASE {}", escape_identifier(name))
}

pub fn render_drop_table(name: &str) -> String {
    format!("DROP TABLE {}", escape_identifier(name))
}

pub fn render_rename_table(from: &str, to: &str) -> String {
    format!("RENAME TABLE {} TO {}", escape_identifier(from), escape_identifier(to))
}

/// Move a table between databases, keeping its name.
pub fn render_move_table(table: &str, from_db: &str, to_db: &str) -> String {
    format!(
        "RENAME TABLE {}.{} TO {}.{}",
        escape_identifier(from_db),
        escape_identifier(table),
        escape_identifier(to_db),
        escape_identifier(table)
    )
}

/// SQL literal for a decoded row value, as used in dump `INSERT`s.
pub fn render_literal(value: &Value, quoter: &dyn Quote) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quoter.quote(s),
        other => quoter.quote(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MySqlQuoter;
    use crate::parser::{parse_alter, parse_column, parse_table};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn column_sql(value: Value) -> String {
        render_column_definition(&parse_column(&value).unwrap(), &MySqlQuoter)
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("users"), "`users`");
        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_create_table_with_auto_increment_key() {
        let spec = parse_table(&json!([
            {"name": "id", "type": "INT", "auto_increment": true, "primary_key": true},
            {"name": "age", "type": "INT", "default": 18}
        ]))
        .unwrap();
        assert_eq!(
            render_create_table("t", &spec, &MySqlQuoter),
            "CREATE TABLE `t` (`id` INT AUTO_INCREMENT, `age` INT NULL DEFAULT 18, PRIMARY KEY (`id`)) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let spec = parse_table(&json!([
            {"name": "order_id", "type": "BIGINT", "nullable": false, "primary_key": true},
            {"name": "line", "type": "SMALLINT", "nullable": false, "primary_key": true}
        ]))
        .unwrap();
        let sql = render_create_table("order_lines", &spec, &MySqlQuoter);
        assert!(sql.contains("PRIMARY KEY (`order_id`, `line`)"));
        assert!(sql.contains("`order_id` BIGINT NOT NULL, "));
    }

    #[test]
    fn test_auto_increment_never_emits_default() {
        let sql = column_sql(json!({"name": "id", "type": "INT", "auto_increment": true, "default": "5"}));
        assert_eq!(sql, "`id` INT AUTO_INCREMENT");
    }

    #[test]
    fn test_column_variants() {
        assert_eq!(
            column_sql(json!({"name": "price", "type": "decimal", "length": "10,2", "nullable": false, "default": "0.00"})),
            "`price` DECIMAL(10,2) NOT NULL DEFAULT 0.00"
        );
        assert_eq!(
            column_sql(json!({"name": "email", "type": "VARCHAR", "length": 255, "unique": true})),
            "`email` VARCHAR(255) NULL UNIQUE"
        );
        assert_eq!(
            column_sql(json!({"name": "bio", "type": "TEXT", "default": "it's"})),
            "`bio` TEXT NULL DEFAULT 'it\\'s'"
        );
        assert_eq!(
            column_sql(json!({"name": "created", "type": "TIMESTAMP", "default": "CURRENT_TIMESTAMP"})),
            "`created` TIMESTAMP NULL DEFAULT CURRENT_TIMESTAMP"
        );
        assert_eq!(
            column_sql(json!({"name": "state", "type": "ENUM", "values": ["on", "off"], "default": "on"})),
            "`state` ENUM('on','off') NULL DEFAULT 'on'"
        );
        assert_eq!(
            column_sql(json!({"name": "active", "type": "BOOLEAN", "default": "TRUE"})),
            "`active` BOOLEAN NULL DEFAULT 1"
        );
    }

    #[test]
    fn test_modifiers_and_quoted_members() {
        assert_eq!(
            column_sql(json!({"name": "id", "type": "int(10) unsigned", "auto_increment": true})),
            "`id` INT(10) UNSIGNED AUTO_INCREMENT"
        );
        assert_eq!(
            column_sql(json!({"name": "code", "type": "SMALLINT ZEROFILL", "default": "7"})),
            "`code` SMALLINT ZEROFILL NULL DEFAULT 7"
        );
        assert_eq!(
            column_sql(json!({"name": "s", "type": "ENUM('a,b','c')"})),
            "`s` ENUM('a,b','c') NULL"
        );
    }

    /// Every type family across the flag combinations must come out as DDL a
    /// MySQL grammar accepts.
    #[test]
    fn test_rendered_ddl_parses_as_mysql() {
        use sqlparser::dialect::MySqlDialect;
        use sqlparser::parser::Parser;

        let types: &[(&str, Option<&str>)] = &[
            ("TINYINT", Some("1")),
            ("INT", Some("-5")),
            ("BIGINT UNSIGNED", Some("10")),
            ("DECIMAL(10,2)", Some("1.50")),
            ("DOUBLE", Some("2.5e3")),
            ("BOOLEAN", Some("true")),
            ("DATE", Some("2024-01-01")),
            ("DATETIME", Some("CURRENT_TIMESTAMP")),
            ("TIMESTAMP", Some("2024-01-01 12:00:00")),
            ("TIME", Some("12:30:00")),
            ("YEAR", Some("2024")),
            ("CHAR(3)", Some("abc")),
            ("VARCHAR(255)", Some("it's \\ \"quoted\"")),
            ("TEXT", Some("NULL")),
            ("ENUM('a','b''c')", Some("a")),
            ("SET('x','y,z')", Some("x")),
            ("BLOB", None),
            ("VARBINARY(16)", None),
            ("JSON", None),
        ];

        let parses = |sql: &str| {
            if let Err(e) = Parser::parse_sql(&MySqlDialect {}, sql) {
                panic!("{}\n  rejected: {}", sql, e);
            }
        };

        let mut checked = 0;
        for (ty, default) in types {
            for flags in 0u8..32 {
                let mut descriptor = json!({
                    "name": "c",
                    "type": ty,
                    "nullable": flags & 1 == 0,
                    "primary_key": flags & 2 != 0,
                    "unique": flags & 4 != 0,
                    "index": flags & 8 != 0,
                    "auto_increment": flags & 16 != 0,
                });
                if let Some(default) = default {
                    descriptor["default"] = json!(default);
                }
                // Combinations the validator refuses never reach rendering.
                let Ok(column) = parse_column(&descriptor) else {
                    continue;
                };

                parses(&format!("CREATE TABLE `t` ({})", render_column_definition(&column, &MySqlQuoter)));

                let spec = TableSpec::new(vec![column.clone()]).unwrap();
                parses(&render_create_table("t", &spec, &MySqlQuoter));
                for sql in render_index_statements("t", &spec) {
                    parses(&sql);
                }

                for action in [
                    AlterAction::Add(column.clone()),
                    AlterAction::Modify { column: column.clone(), old_name: None },
                    AlterAction::Modify { column: column.clone(), old_name: Some("old".to_string()) },
                    AlterAction::Drop(column.name.clone()),
                ] {
                    for sql in render_alter("t", &action, &MySqlQuoter) {
                        parses(&sql);
                    }
                }
                checked += 1;
            }
        }
        assert!(checked > 200, "only {} combinations were valid", checked);
    }

    #[test]
    fn test_index_statements() {
        let spec = parse_table(&json!([
            {"name": "id", "type": "INT", "primary_key": true, "index": true},
            {"name": "email", "type": "VARCHAR", "length": 100, "unique": true, "index": true},
            {"name": "city", "type": "VARCHAR", "length": 100, "index": true}
        ]))
        .unwrap();
        assert_eq!(
            render_index_statements("users", &spec),
            vec!["ALTER TABLE `users` ADD INDEX `idx_city` (`city`)".to_string()]
        );
    }

    #[test]
    fn test_alter_statements() {
        let add = parse_alter("add", &json!({"name": "sku", "type": "CHAR", "length": 8, "primary_key": true}), None).unwrap();
        assert_eq!(
            render_alter("items", &add, &MySqlQuoter),
            vec!["ALTER TABLE `items` ADD COLUMN `sku` CHAR(8), ADD PRIMARY KEY (`sku`)".to_string()]
        );

        let add = parse_alter("add", &json!({"name": "city", "type": "TEXT", "index": true}), None).unwrap();
        assert_eq!(render_alter("items", &add, &MySqlQuoter).len(), 2);

        let modify = parse_alter("modify", &json!({"name": "title", "type": "VARCHAR", "length": 80}), None).unwrap();
        assert_eq!(
            render_alter("items", &modify, &MySqlQuoter),
            vec!["ALTER TABLE `items` MODIFY COLUMN `title` VARCHAR(80) NULL".to_string()]
        );

        let rename = parse_alter("modify", &json!({"name": "title", "type": "VARCHAR", "length": 80}), Some("name")).unwrap();
        assert_eq!(
            render_alter("items", &rename, &MySqlQuoter),
            vec!["ALTER TABLE `items` CHANGE COLUMN `name` `title` VARCHAR(80) NULL".to_string()]
        );

        assert_eq!(render_alter_drop("items", "title"), "ALTER TABLE `items` DROP COLUMN `title`");
    }

    #[test]
    fn test_database_statements() {
        assert_eq!(
            render_create_database("shop"),
            "CREATE DATABASE `shop` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
        );
        assert_eq!(render_drop_database("shop"), "DROP DATABASE `shop`");
        assert_eq!(render_rename_table("a", "b"), "RENAME TABLE `a` TO `b`");
        assert_eq!(render_move_table("users", "old", "new"), "RENAME TABLE `old`.`users` TO `new`.`users`");
    }

    #[test]
    fn test_render_literal() {
        assert_eq!(render_literal(&json!(null), &MySqlQuoter), "NULL");
        assert_eq!(render_literal(&json!(42), &MySqlQuoter), "42");
        assert_eq!(render_literal(&json!(true), &MySqlQuoter), "1");
        assert_eq!(render_literal(&json!("a\nb"), &MySqlQuoter), "'a\\nb'");
        assert_eq!(render_literal(&json!({"k": 1}), &MySqlQuoter), "'{\\\"k\\\":1}'");
    }
}
