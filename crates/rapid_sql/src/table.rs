//! `CREATE TABLE` generation.

use crate::error::{SqlError, SqlResult};

/// Column attributes whose spelling differs between back-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    AutoIncrement,
    NotNull,
    PrimaryKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn render(self, attribute: Attribute) -> &'static str {
        match (self, attribute) {
            (Dialect::Sqlite, Attribute::AutoIncrement) => "AUTOINCREMENT",
            (Dialect::MySql, Attribute::AutoIncrement) => "AUTO_INCREMENT",
            (_, Attribute::NotNull) => "NOT NULL",
            (_, Attribute::PrimaryKey) => "PRIMARY KEY",
        }
    }
}

/// Collects the columns of one table created when a session is built.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    dialect: Dialect,
    if_not_exists: bool,
    fields: Vec<String>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
            if_not_exists: false,
            fields: Vec::new(),
        }
    }

    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    pub fn field(&mut self, name: &str, sql_type: &str, attributes: &[Attribute]) -> &mut Self {
        let mut column = format!("{} {}", name, sql_type);
        for attribute in attributes {
            column.push(' ');
            column.push_str(self.dialect.render(*attribute));
        }
        self.fields.push(column);
        self
    }

    /// Adds a column definition or table constraint verbatim.
    pub fn raw_field(&mut self, definition: &str) -> &mut Self {
        self.fields.push(definition.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_sql(&self) -> SqlResult<String> {
        if self.fields.is_empty() {
            return Err(SqlError::NoFields(self.name.clone()));
        }

        let mut sql = String::from("CREATE TABLE");
        if self.if_not_exists {
            sql.push_str(" IF NOT EXISTS");
        }
        sql.push_str(&format!(" {}({});", self.name, self.fields.join(",")));
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_table() {
        let mut table = TableBuilder::new("homes", Dialect::Sqlite);
        table
            .if_not_exists()
            .field("id", "INTEGER", &[Attribute::PrimaryKey, Attribute::AutoIncrement])
            .field("owner", "TEXT", &[Attribute::NotNull])
            .raw_field("UNIQUE(owner)");

        assert_eq!(
            table.to_sql().unwrap(),
            "CREATE TABLE IF NOT EXISTS homes(id INTEGER PRIMARY KEY AUTOINCREMENT,owner TEXT NOT NULL,UNIQUE(owner));"
        );
    }

    #[test]
    fn test_mysql_spelling() {
        let mut table = TableBuilder::new("homes", Dialect::MySql);
        table.field("id", "BIGINT", &[Attribute::AutoIncrement, Attribute::PrimaryKey]);
        assert_eq!(
            table.to_sql().unwrap(),
            "CREATE TABLE homes(id BIGINT AUTO_INCREMENT PRIMARY KEY);"
        );
    }

    #[test]
    fn test_table_requires_fields() {
        let table = TableBuilder::new("empty", Dialect::Sqlite);
        assert!(matches!(table.to_sql(), Err(SqlError::NoFields(name)) if name == "empty"));
    }
}
