//! Typed column and table descriptors.
//!
//! Values in this module are only ever built by [`crate::parser`], which
//! enforces every rule the DDL renderer relies on.

use std::fmt;

/// MySQL's identifier length limit.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Groups of column types that share default-value grammar and length rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Timestamp,
    Time,
    Year,
    Text,
    Enumerated,
    Binary,
    Other,
}

/// A MySQL column type keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Float,
    Double,
    Real,
    Boolean,
    Bool,
    Date,
    DateTime,
    Timestamp,
    Time,
    Year,
    Char,
    Varchar,
    TinyText,
    Text,
    MediumText,
    LongText,
    Enum,
    Set,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    Binary,
    VarBinary,
    /// Any other single keyword (`JSON`, `GEOMETRY`, ...).
    Other(String),
}

impl SqlType {
    /// Map an upper-case keyword to a type. Unknown keywords become `Other`.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "TINYINT" => Self::TinyInt,
            "SMALLINT" => Self::SmallInt,
            "MEDIUMINT" => Self::MediumInt,
            "INT" => Self::Int,
            "INTEGER" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "DECIMAL" => Self::Decimal,
            "NUMERIC" => Self::Numeric,
            "FLOAT" => Self::Float,
            "DOUBLE" | "DOUBLE PRECISION" => Self::Double,
            "REAL" => Self::Real,
            "BOOLEAN" => Self::Boolean,
            "BOOL" => Self::Bool,
            "DATE" => Self::Date,
            "DATETIME" => Self::DateTime,
            "TIMESTAMP" => Self::Timestamp,
            "TIME" => Self::Time,
            "YEAR" => Self::Year,
            "CHAR" => Self::Char,
            "VARCHAR" => Self::Varchar,
            "TINYTEXT" => Self::TinyText,
            "TEXT" => Self::Text,
            "MEDIUMTEXT" => Self::MediumText,
            "LONGTEXT" => Self::LongText,
            "ENUM" => Self::Enum,
            "SET" => Self::Set,
            "TINYBLOB" => Self::TinyBlob,
            "BLOB" => Self::Blob,
            "MEDIUMBLOB" => Self::MediumBlob,
            "LONGBLOB" => Self::LongBlob,
            "BINARY" => Self::Binary,
            "VARBINARY" => Self::VarBinary,
            other => Self::Other(other.to_string()),
        }
    }

    /// The keyword as emitted in DDL.
    pub fn keyword(&self) -> &str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::MediumInt => "MEDIUMINT",
            Self::Int => "INT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Decimal => "DECIMAL",
            Self::Numeric => "NUMERIC",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Real => "REAL",
            Self::Boolean => "BOOLEAN",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Time => "TIME",
            Self::Year => "YEAR",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::TinyText => "TINYTEXT",
            Self::Text => "TEXT",
            Self::MediumText => "MEDIUMTEXT",
            Self::LongText => "LONGTEXT",
            Self::Enum => "ENUM",
            Self::Set => "SET",
            Self::TinyBlob => "TINYBLOB",
            Self::Blob => "BLOB",
            Self::MediumBlob => "MEDIUMBLOB",
            Self::LongBlob => "LONGBLOB",
            Self::Binary => "BINARY",
            Self::VarBinary => "VARBINARY",
            Self::Other(keyword) => keyword,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Self::TinyInt | Self::SmallInt | Self::MediumInt | Self::Int | Self::Integer | Self::BigInt => {
                TypeFamily::Integer
            }
            Self::Decimal | Self::Numeric | Self::Float | Self::Double | Self::Real => TypeFamily::Decimal,
            Self::Boolean | Self::Bool => TypeFamily::Boolean,
            Self::Date => TypeFamily::Date,
            Self::DateTime => TypeFamily::DateTime,
            Self::Timestamp => TypeFamily::Timestamp,
            Self::Time => TypeFamily::Time,
            Self::Year => TypeFamily::Year,
            Self::Char | Self::Varchar | Self::TinyText | Self::Text | Self::MediumText | Self::LongText => {
                TypeFamily::Text
            }
            Self::Enum | Self::Set => TypeFamily::Enumerated,
            Self::TinyBlob | Self::Blob | Self::MediumBlob | Self::LongBlob | Self::Binary | Self::VarBinary => {
                TypeFamily::Binary
            }
            Self::Other(_) => TypeFamily::Other,
        }
    }

    /// Whether a `(length)` suffix is meaningful for this type.
    pub fn accepts_length(&self) -> bool {
        match self.family() {
            TypeFamily::Integer | TypeFamily::Decimal | TypeFamily::Other => true,
            _ => matches!(
                self,
                Self::Char | Self::Varchar | Self::Text | Self::Blob | Self::Binary | Self::VarBinary
            ),
        }
    }

    /// MySQL refuses these without an explicit length.
    pub fn requires_length(&self) -> bool {
        matches!(self, Self::Varchar | Self::VarBinary)
    }

    /// Only the decimal family takes a `precision,scale` pair.
    pub fn accepts_precision(&self) -> bool {
        self.family() == TypeFamily::Decimal
    }

    /// Types that may carry `DEFAULT CURRENT_TIMESTAMP`.
    pub fn accepts_current_timestamp(&self) -> bool {
        matches!(
            self.family(),
            TypeFamily::Date | TypeFamily::DateTime | TypeFamily::Timestamp
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// `UNSIGNED` and `ZEROFILL` after a numeric type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumericModifiers {
    pub unsigned: bool,
    pub zerofill: bool,
}

impl NumericModifiers {
    pub fn is_empty(&self) -> bool {
        !self.unsigned && !self.zerofill
    }
}

impl fmt::Display for NumericModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsigned {
            f.write_str(" UNSIGNED")?;
        }
        if self.zerofill {
            f.write_str(" ZEROFILL")?;
        }
        Ok(())
    }
}

/// Column length: `VARCHAR(255)` or `DECIMAL(10,2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Size(u32),
    Precision { precision: u32, scale: u32 },
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size(n) => write!(f, "{}", n),
            Self::Precision { precision, scale } => write!(f, "{},{}", precision, scale),
        }
    }
}

/// A validated column default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// `DEFAULT NULL`
    Null,
    /// `DEFAULT CURRENT_TIMESTAMP`
    CurrentTimestamp,
    /// Numeric literal, emitted bare.
    Number(String),
    /// String literal, emitted through the driver's quoting.
    Text(String),
}

/// One validated column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub length: Option<Length>,
    pub modifiers: NumericModifiers,
    /// Members of an `ENUM` or `SET`.
    pub values: Vec<String>,
    pub nullable: bool,
    pub auto_increment: bool,
    pub default: Option<DefaultValue>,
    pub primary_key: bool,
    pub unique: bool,
    pub index: bool,
}

impl ColumnSpec {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            length: None,
            modifiers: NumericModifiers::default(),
            values: Vec::new(),
            nullable: true,
            auto_increment: false,
            default: None,
            primary_key: false,
            unique: false,
            index: false,
        }
    }

    /// Needs its own `ADD INDEX` statement after creation.
    pub fn needs_plain_index(&self) -> bool {
        self.index && !self.unique && !self.primary_key
    }
}

/// An ordered, non-empty list of columns.
///
/// Construct with [`crate::parser::parse_table`] or [`TableSpec::new`]; both
/// enforce: at least one column, unique names, at most one auto-increment column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(columns: Vec<ColumnSpec>) -> crate::error::PanelResult<Self> {
        use crate::error::PanelError;

        if columns.is_empty() {
            return Err(PanelError::invalid("Invalid columns data: must be a non-empty array"));
        }

        let auto_columns = columns.iter().filter(|c| c.auto_increment).count();
        if auto_columns > 1 {
            return Err(PanelError::invalid(
                "Only one AUTO_INCREMENT column is allowed per table",
            ));
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name.eq_ignore_ascii_case(&col.name)) {
                return Err(PanelError::invalid(format!("Duplicate column name '{}'", col.name)));
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Primary-key columns in declaration order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// A single-column `ALTER TABLE` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlterAction {
    Add(ColumnSpec),
    /// `old_name` switches from `MODIFY` to `CHANGE` (rename in place).
    Modify {
        column: ColumnSpec,
        old_name: Option<String>,
    },
    Drop(String),
}

impl AlterAction {
    /// Name of the column the action ends up affecting.
    pub fn column_name(&self) -> &str {
        match self {
            Self::Add(col) => &col.name,
            Self::Modify { column, .. } => &column.name,
            Self::Drop(name) => name,
        }
    }
}

impl fmt::Display for AlterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(_) => write!(f, "add"),
            Self::Modify { .. } => write!(f, "modify"),
            Self::Drop(_) => write!(f, "drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip_for_known_types() {
        for kw in ["INT", "BIGINT", "DECIMAL", "BOOLEAN", "DATETIME", "VARCHAR", "ENUM", "LONGBLOB"] {
            assert_eq!(SqlType::from_keyword(kw).keyword(), kw);
        }
        assert_eq!(SqlType::from_keyword("JSON"), SqlType::Other("JSON".to_string()));
    }

    #[test]
    fn test_families() {
        assert_eq!(SqlType::MediumInt.family(), TypeFamily::Integer);
        assert_eq!(SqlType::Real.family(), TypeFamily::Decimal);
        assert_eq!(SqlType::Set.family(), TypeFamily::Enumerated);
        assert_eq!(SqlType::VarBinary.family(), TypeFamily::Binary);
        assert!(SqlType::Timestamp.accepts_current_timestamp());
        assert!(!SqlType::Time.accepts_current_timestamp());
    }

    #[test]
    fn test_modifiers_display() {
        assert_eq!(NumericModifiers::default().to_string(), "");
        assert!(NumericModifiers::default().is_empty());
        let both = NumericModifiers { unsigned: true, zerofill: true };
        assert_eq!(both.to_string(), " UNSIGNED ZEROFILL");
        assert_eq!(SqlType::from_keyword("DOUBLE PRECISION"), SqlType::Double);
    }

    #[test]
    fn test_length_display() {
        assert_eq!(Length::Size(255).to_string(), "255");
        assert_eq!(Length::Precision { precision: 10, scale: 2 }.to_string(), "10,2");
    }

    #[test]
    fn test_table_spec_invariants() {
        assert!(TableSpec::new(vec![]).is_err());

        let mut a = ColumnSpec::new("a", SqlType::Int);
        a.auto_increment = true;
        let mut b = ColumnSpec::new("b", SqlType::BigInt);
        b.auto_increment = true;
        let err = TableSpec::new(vec![a.clone(), b]).unwrap_err();
        assert!(err.to_string().contains("AUTO_INCREMENT"));

        let dup = ColumnSpec::new("A", SqlType::Text);
        let err = TableSpec::new(vec![a.clone(), dup]).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate column name 'A'");

        let ok = TableSpec::new(vec![a]).unwrap();
        assert_eq!(ok.columns().len(), 1);
    }
}
