//! Column descriptor validation using nom.
//!
//! Turns untrusted JSON descriptors into [`ColumnSpec`] / [`TableSpec`] values.
//! Nothing that leaves this module can produce malformed DDL.
//!
//! # Descriptor shape
//!
//! ```text
//! { "name": "price", "type": "DECIMAL", "length": "10,2",
//!   "nullable": false, "default": "0.00", "index": true }
//! ```
//!
//! Numeric types may carry `UNSIGNED` and `ZEROFILL`; other column
//! attributes in the type string are rejected.
//!
//! Default values are checked against a per-family grammar:
//!
//! | Family             | Accepted                         | Emitted     |
//! |--------------------|----------------------------------|-------------|
//! | INT family         | `-?\d+`                          | bare        |
//! | DECIMAL family     | generic numeric                  | bare        |
//! | BOOLEAN            | `0 1 true false`                 | `0` / `1`   |
//! | DATE               | `YYYY-MM-DD`                     | quoted      |
//! | DATETIME/TIMESTAMP | `YYYY-MM-DD HH:MM:SS`            | quoted      |
//! | TIME               | `HH:MM:SS`                       | quoted      |
//! | YEAR               | four digits                      | bare        |
//! | text, ENUM, SET    | anything                         | quoted      |
//! | JSON and other     | anything                         | quoted      |
//! | BLOB, BINARY       | rejected                         |             |

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while_m_n},
    character::complete::{char, digit0, digit1, multispace0, none_of, one_of, satisfy, space1},
    combinator::{all_consuming, map, opt, recognize, value},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};
use serde::Deserialize;
use serde_json::Value;

use crate::ast::*;
use crate::de;
use crate::error::{PanelError, PanelResult};

/// Column attributes that can never name a type.
const ATTRIBUTE_KEYWORDS: &[&str] = &[
    "AS", "AUTO_INCREMENT", "CHARACTER", "CHARSET", "CHECK", "COLLATE", "COMMENT", "CONSTRAINT",
    "DEFAULT", "FOREIGN", "GENERATED", "INDEX", "INVISIBLE", "KEY", "NOT", "NULL", "ON", "PRIMARY",
    "REFERENCES", "SIGNED", "STORED", "UNIQUE", "UNSIGNED", "VIRTUAL", "VISIBLE", "ZEROFILL",
];

/// Wire shape of a column descriptor, before any rule is applied.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawColumn {
    #[serde(default, deserialize_with = "de::scalar_string")]
    name: Option<String>,
    #[serde(default, rename = "type", alias = "sqlType", alias = "sql_type", deserialize_with = "de::scalar_string")]
    sql_type: Option<String>,
    #[serde(default, deserialize_with = "de::scalar_string")]
    length: Option<String>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "de::flag")]
    nullable: Option<bool>,
    #[serde(default, alias = "autoIncrement", deserialize_with = "de::flag")]
    auto_increment: Option<bool>,
    #[serde(default, alias = "defaultValue", deserialize_with = "de::scalar_string")]
    default: Option<String>,
    #[serde(default, alias = "primaryKey", deserialize_with = "de::flag")]
    primary_key: Option<bool>,
    #[serde(default, deserialize_with = "de::flag")]
    unique: Option<bool>,
    #[serde(default, deserialize_with = "de::flag")]
    index: Option<bool>,
}

/// Parse and validate one column descriptor.
pub fn parse_column(input: &Value) -> PanelResult<ColumnSpec> {
    if !input.is_object() {
        return Err(PanelError::invalid("Invalid column data"));
    }
    let raw: RawColumn = serde_json::from_value(input.clone())
        .map_err(|e| PanelError::invalid(format!("Invalid column data: {}", e)))?;
    build_column(raw)
}

/// Parse and validate an ordered list of column descriptors.
pub fn parse_table(input: &Value) -> PanelResult<TableSpec> {
    let items = match input {
        Value::Array(items) if !items.is_empty() => items,
        _ => return Err(PanelError::invalid("Invalid or empty columns definition")),
    };
    let columns = items.iter().map(parse_column).collect::<PanelResult<Vec<_>>>()?;
    TableSpec::new(columns)
}

/// Build an [`AlterAction`] from the `alter_action` verb and its column payload.
///
/// `drop` accepts either a descriptor with a `name` or a bare column name.
pub fn parse_alter(action: &str, column: &Value, old_name: Option<&str>) -> PanelResult<AlterAction> {
    match action.trim().to_ascii_lowercase().as_str() {
        "add" => Ok(AlterAction::Add(parse_column(column)?)),
        "modify" => {
            let column = parse_column(column)?;
            let old_name = match old_name.map(str::trim).filter(|s| !s.is_empty()) {
                Some(old) if old != column.name => {
                    validate_identifier(old, "column")?;
                    Some(old.to_string())
                }
                _ => None,
            };
            Ok(AlterAction::Modify { column, old_name })
        }
        "drop" => {
            let name = match column {
                Value::String(s) => s.as_str(),
                Value::Object(map) => map.get("name").and_then(Value::as_str).unwrap_or_default(),
                _ => "",
            };
            validate_identifier(name, "column")?;
            Ok(AlterAction::Drop(name.to_string()))
        }
        _ => Err(PanelError::invalid("Invalid alter action. Use: add, modify, or drop")),
    }
}

/// Table names: `[a-zA-Z0-9_]`, at most 64 characters.
pub fn validate_table_name(name: &str) -> PanelResult<()> {
    if is_identifier(name, false) {
        Ok(())
    } else {
        Err(PanelError::invalid(
            "Invalid table name. Use only alphanumeric characters and underscores.",
        ))
    }
}

/// Database names additionally allow `-`.
pub fn validate_database_name(name: &str) -> PanelResult<()> {
    if is_identifier(name, true) {
        Ok(())
    } else {
        Err(PanelError::invalid(
            "Invalid database name. Use only alphanumeric characters, underscores, and hyphens.",
        ))
    }
}

/// Generic identifier check; `kind` names the thing in the error message.
pub fn validate_identifier(name: &str, kind: &str) -> PanelResult<()> {
    if is_identifier(name, false) {
        Ok(())
    } else {
        Err(PanelError::invalid(format!("Invalid {} name: '{}'", kind, name)))
    }
}

fn is_identifier(name: &str, allow_hyphen: bool) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_hyphen && c == '-'))
}

fn build_column(raw: RawColumn) -> PanelResult<ColumnSpec> {
    let name = raw.name.as_deref().map(str::trim).unwrap_or_default();
    let type_expr = raw.sql_type.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || type_expr.is_empty() {
        return Err(PanelError::invalid("Each column must have a name and type"));
    }
    validate_identifier(name, "column")?;

    let invalid_type = || {
        PanelError::invalid(format!(
            "Invalid column type '{}' for column '{}'",
            type_expr, name
        ))
    };
    let upper = type_expr.to_ascii_uppercase();
    let (keyword, inline_length, modifiers) = match all_consuming(type_expression)(upper.as_str()) {
        Ok((_, parsed)) => parsed,
        Err(_) => return Err(invalid_type()),
    };
    let sql_type = SqlType::from_keyword(&keyword);
    if matches!(&sql_type, SqlType::Other(k) if ATTRIBUTE_KEYWORDS.contains(&k.as_str())) {
        return Err(invalid_type());
    }
    if !modifiers.is_empty() && !matches!(sql_type.family(), TypeFamily::Integer | TypeFamily::Decimal) {
        return Err(PanelError::invalid(format!(
            "UNSIGNED and ZEROFILL are only valid for numeric types, not {}",
            sql_type
        )));
    }

    let explicit_length = raw.length.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let length_text = match (inline_length, explicit_length) {
        (Some(_), Some(_)) => {
            return Err(PanelError::invalid(format!("Length given twice for column '{}'", name)));
        }
        (Some(inline), None) => {
            // Recover original case for ENUM members written inline.
            let start = type_expr.find('(').map(|i| i + 1).unwrap_or(0);
            let end = type_expr.rfind(')').unwrap_or(type_expr.len());
            Some(type_expr[start..end].trim().to_string()).filter(|_| !inline.is_empty())
        }
        (None, explicit) => explicit.map(str::to_string),
    };

    let mut column = ColumnSpec::new(name, sql_type.clone());
    column.modifiers = modifiers;

    if sql_type.family() == TypeFamily::Enumerated {
        column.values = enum_members(&raw.values, length_text.as_deref()).ok_or_else(|| {
            PanelError::invalid(format!("Invalid values for {} column '{}'", sql_type, name))
        })?;
        if column.values.is_empty() {
            return Err(PanelError::invalid(format!(
                "{} column '{}' requires at least one value",
                sql_type, name
            )));
        }
    } else {
        if raw.values.as_ref().is_some_and(|v| !v.is_empty()) {
            return Err(PanelError::invalid(format!(
                "Values are only allowed for ENUM or SET columns, not {}",
                sql_type
            )));
        }
        column.length = match length_text {
            Some(text) => Some(parse_length(&sql_type, name, &text)?),
            None if sql_type.requires_length() => {
                return Err(PanelError::invalid(format!(
                    "{} column '{}' requires a length",
                    sql_type, name
                )));
            }
            None => None,
        };
    }

    column.nullable = raw.nullable.unwrap_or(true);
    column.auto_increment = raw.auto_increment.unwrap_or(false);
    column.primary_key = raw.primary_key.unwrap_or(false);
    column.unique = raw.unique.unwrap_or(false);
    column.index = raw.index.unwrap_or(false);

    if column.auto_increment && sql_type.family() != TypeFamily::Integer {
        return Err(PanelError::invalid(format!(
            "AUTO_INCREMENT is only valid for integer types, not {}",
            sql_type
        )));
    }

    let default = raw.default.as_deref().map(str::trim).filter(|s| !s.is_empty());
    column.default = match default {
        Some(value) if column.auto_increment => {
            tracing::debug!(column = name, value, "Ignoring default on AUTO_INCREMENT column");
            None
        }
        Some(value) => Some(parse_default(&sql_type, value)?),
        None => None,
    };

    if modifiers.unsigned
        && matches!(&column.default, Some(DefaultValue::Number(n)) if n.starts_with('-'))
    {
        return Err(PanelError::invalid(format!(
            "Default value for UNSIGNED column '{}' cannot be negative",
            name
        )));
    }

    if column.default == Some(DefaultValue::Null) && !column.nullable {
        return Err(PanelError::invalid(format!(
            "Column '{}' is NOT NULL and cannot default to NULL",
            name
        )));
    }

    Ok(column)
}

/// Members from the `values` array, else from a `'a','b'` list. `None` when
/// the list does not parse.
fn enum_members(values: &Option<Vec<Value>>, length: Option<&str>) -> Option<Vec<String>> {
    if let Some(values) = values.as_ref().filter(|v| !v.is_empty()) {
        return Some(
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    let Some(list) = length else {
        return Some(Vec::new());
    };
    let (_, members) = all_consuming(member_list)(list).ok()?;
    Some(members.into_iter().filter(|member| !member.is_empty()).collect())
}

fn parse_length(sql_type: &SqlType, column: &str, text: &str) -> PanelResult<Length> {
    let invalid = || {
        PanelError::invalid(format!(
            "Invalid length '{}' for {} column '{}'",
            text, sql_type, column
        ))
    };

    if !sql_type.accepts_length() {
        return Err(PanelError::invalid(format!(
            "{} columns do not take a length",
            sql_type
        )));
    }

    let pairs_allowed = sql_type.accepts_precision() || sql_type.family() == TypeFamily::Other;
    let length = match all_consuming(length_expression)(text) {
        Ok((_, (size, None))) => Length::Size(size.parse().map_err(|_| invalid())?),
        Ok((_, (precision, Some(scale)))) if pairs_allowed => Length::Precision {
            precision: precision.parse().map_err(|_| invalid())?,
            scale: scale.parse().map_err(|_| invalid())?,
        },
        _ => return Err(invalid()),
    };

    match length {
        Length::Size(0) | Length::Precision { precision: 0, .. } => Err(invalid()),
        Length::Precision { precision, scale } if scale > precision => Err(invalid()),
        other => Ok(other),
    }
}

/// Validate a trimmed, non-empty default against the column's type family.
fn parse_default(sql_type: &SqlType, value: &str) -> PanelResult<DefaultValue> {
    if value.eq_ignore_ascii_case("NULL") {
        return Ok(DefaultValue::Null);
    }
    if value.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
        return if sql_type.accepts_current_timestamp() {
            Ok(DefaultValue::CurrentTimestamp)
        } else {
            Err(PanelError::invalid(format!(
                "CURRENT_TIMESTAMP is only valid for TIMESTAMP, DATETIME, or DATE types, not {}",
                sql_type
            )))
        };
    }

    let matches = |parser: fn(&str) -> IResult<&str, &str>| all_consuming(parser)(value).is_ok();

    match sql_type.family() {
        TypeFamily::Integer => {
            if matches(integer_literal) {
                Ok(DefaultValue::Number(value.to_string()))
            } else {
                Err(PanelError::invalid(format!(
                    "Default value for {} must be an integer number",
                    sql_type
                )))
            }
        }
        TypeFamily::Decimal => {
            if matches(numeric_literal) {
                Ok(DefaultValue::Number(value.to_string()))
            } else {
                Err(PanelError::invalid(format!(
                    "Default value for {} must be a numeric value",
                    sql_type
                )))
            }
        }
        TypeFamily::Boolean => match value.to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(DefaultValue::Number("1".to_string())),
            "0" | "false" => Ok(DefaultValue::Number("0".to_string())),
            _ => Err(PanelError::invalid(
                "Default value for BOOLEAN must be 0, 1, true, or false",
            )),
        },
        TypeFamily::Date => {
            if !matches(date_literal) {
                return Err(PanelError::invalid(
                    "Default value for DATE must be in format YYYY-MM-DD (e.g., 2024-01-01)",
                ));
            }
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|_| DefaultValue::Text(value.to_string()))
                .map_err(|_| PanelError::invalid(format!("'{}' is not a valid calendar date", value)))
        }
        TypeFamily::DateTime | TypeFamily::Timestamp => {
            if !matches(datetime_literal) {
                return Err(PanelError::invalid(format!(
                    "Default value for {} must be in format YYYY-MM-DD HH:MM:SS (e.g., 2024-01-01 12:00:00)",
                    sql_type
                )));
            }
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|_| DefaultValue::Text(value.to_string()))
                .map_err(|_| PanelError::invalid(format!("'{}' is not a valid date and time", value)))
        }
        TypeFamily::Time => {
            if !matches(time_literal) {
                return Err(PanelError::invalid(
                    "Default value for TIME must be in format HH:MM:SS (e.g., 12:30:00)",
                ));
            }
            chrono::NaiveTime::parse_from_str(value, "%H:%M:%S")
                .map(|_| DefaultValue::Text(value.to_string()))
                .map_err(|_| PanelError::invalid(format!("'{}' is not a valid time of day", value)))
        }
        TypeFamily::Year => {
            if matches(year_literal) {
                Ok(DefaultValue::Number(value.to_string()))
            } else {
                Err(PanelError::invalid(
                    "Default value for YEAR must be a 4-digit year (e.g., 2024)",
                ))
            }
        }
        TypeFamily::Binary => Err(PanelError::invalid(format!(
            "{} columns cannot have default values in MySQL",
            sql_type
        ))),
        TypeFamily::Text | TypeFamily::Enumerated | TypeFamily::Other => {
            Ok(DefaultValue::Text(value.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Grammars
// ---------------------------------------------------------------------------

/// `[A-Z][A-Z0-9_]*`
fn keyword_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_uppercase()),
        take_while_m_n(0, 63, |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'),
    ))(input)
}

/// A single keyword, or `DOUBLE PRECISION`.
fn type_keyword(input: &str) -> IResult<&str, &str> {
    alt((recognize(tuple((tag("DOUBLE"), space1, tag("PRECISION")))), keyword_word))(input)
}

fn numeric_modifiers(input: &str) -> IResult<&str, NumericModifiers> {
    let modifier = alt((value(true, tag("UNSIGNED")), value(false, tag("ZEROFILL"))));
    fold_many0(
        preceded(space1, modifier),
        NumericModifiers::default,
        |mut acc, unsigned| {
            if unsigned {
                acc.unsigned = true;
            } else {
                acc.zerofill = true;
            }
            acc
        },
    )(input)
}

/// `KEYWORD[(args)] [UNSIGNED] [ZEROFILL]`; the argument text is returned unparsed.
fn type_expression(input: &str) -> IResult<&str, (String, Option<String>, NumericModifiers)> {
    map(
        tuple((
            type_keyword,
            opt(preceded(multispace0, delimited(char('('), opt(is_not(")")), char(')')))),
            numeric_modifiers,
        )),
        |(keyword, args, modifiers)| {
            let keyword = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
            (keyword, args.map(|a| a.unwrap_or_default().trim().to_string()), modifiers)
        },
    )(input)
}

/// `'it''s'` or `'it\'s'`.
fn quoted_member(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        fold_many0(
            alt((
                value('\'', tag("''")),
                preceded(char('\\'), one_of("'\\")),
                none_of("'"),
            )),
            String::new,
            |mut acc, c| {
                acc.push(c);
                acc
            },
        ),
        char('\''),
    )(input)
}

fn bare_member(input: &str) -> IResult<&str, String> {
    map(is_not(",'"), |s: &str| s.trim().to_string())(input)
}

/// Comma-separated ENUM/SET members; commas inside quotes belong to the member.
fn member_list(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        multispace0,
        separated_list1(
            delimited(multispace0, char(','), multispace0),
            alt((quoted_member, bare_member)),
        ),
        multispace0,
    )(input)
}

/// `n` or `p,s`.
fn length_expression(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(
        digit1,
        opt(preceded(delimited(multispace0, char(','), multispace0), digit1)),
    )(input)
}

fn integer_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(input)
}

/// Sign, digits, optional fraction, optional exponent. `.5` and `5.` are numeric.
fn numeric_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn two_digits(input: &str) -> IResult<&str, &str> {
    take_while_m_n(2, 2, |c: char| c.is_ascii_digit())(input)
}

fn four_digits(input: &str) -> IResult<&str, &str> {
    take_while_m_n(4, 4, |c: char| c.is_ascii_digit())(input)
}

fn date_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((four_digits, char('-'), two_digits, char('-'), two_digits)))(input)
}

fn time_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((two_digits, char(':'), two_digits, char(':'), two_digits)))(input)
}

fn datetime_literal(input: &str) -> IResult<&str, &str> {
    recognize(separated_pair(date_literal, char(' '), time_literal))(input)
}

fn year_literal(input: &str) -> IResult<&str, &str> {
    four_digits(input)
}
