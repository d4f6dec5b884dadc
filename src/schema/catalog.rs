use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::accessor::config::AccessorConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::schema::schema::TableSchema;

/// Accessor configs of every column of a table at one version.
/// Background runs take one of these at start and keep it for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnAccessors {
    pub version: u64,
    pub configs: BTreeMap<String, AccessorConfig>,
}

impl ColumnAccessors {
    pub fn get(&self, column: &str) -> &AccessorConfig {
        static PLAIN: AccessorConfig = AccessorConfig::Plain;
        self.configs.get(column).unwrap_or(&PLAIN)
    }
}

/// A defined table plus its current accessor configuration
pub struct TableEntry {
    pub schema: TableSchema,
    accessors: RwLock<Arc<ColumnAccessors>>,
}

impl TableEntry {
    fn new(schema: TableSchema) -> Self {
        let configs = schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), AccessorConfig::Plain))
            .collect();
        TableEntry {
            schema,
            accessors: RwLock::new(Arc::new(ColumnAccessors { version: 0, configs })),
        }
    }

    pub fn accessors(&self) -> Arc<ColumnAccessors> {
        self.accessors.read().clone()
    }

    /// O(1) metadata update; existing chunks are untouched.
    /// Returns the new accessor version.
    pub fn alter_column_accessor(&self, column: &str, config: AccessorConfig) -> Result<u64> {
        self.check_alter(column, &config)?;
        Ok(self.install(column, config))
    }

    fn check_alter(&self, column: &str, config: &AccessorConfig) -> Result<()> {
        let def = self.schema.column(column).ok_or_else(|| {
            Error::new(
                ErrorKind::Config,
                format!("unknown column '{}' in table '{}'", column, self.schema.name),
            )
        })?;
        config.validate(column, def.column_type)
    }

    fn install(&self, column: &str, config: AccessorConfig) -> u64 {
        let mut current = self.accessors.write();
        let mut next = (**current).clone();
        next.version += 1;
        next.configs.insert(column.to_string(), config.clone());
        let version = next.version;
        *current = Arc::new(next);

        tracing::info!(
            table = %self.schema.name,
            column,
            accessor = %config,
            version,
            "column accessor altered"
        );
        version
    }
}

/// Registry of tables by name
pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<TableEntry>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<Arc<TableEntry>> {
        schema.validate()?;
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("table '{}' already exists", schema.name),
            ));
        }
        let entry = Arc::new(TableEntry::new(schema));
        tables.insert(entry.schema.name.clone(), entry.clone());
        Ok(entry)
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableEntry>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("table '{}'", name)))
    }

    pub fn drop_table(&self, name: &str) -> Result<Arc<TableEntry>> {
        self.tables
            .write()
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("table '{}'", name)))
    }

    /// `target` names a table, or a store whose `store/...` tables all get
    /// the change. Returns the highest resulting accessor version.
    pub fn alter_column_accessor(&self, target: &str, column: &str, config: AccessorConfig) -> Result<u64> {
        self.alter_each(target, column, |_| Ok(config.clone()))
    }

    /// Option form; `DEFAULT_VALUE` is parsed per table against its column type
    pub fn alter_with_request(&self, target: &str, request: &AlterColumnRequest) -> Result<u64> {
        self.alter_each(target, &request.column, |schema| request.resolve(schema))
    }

    /// Every config is resolved and validated before any table is touched
    fn alter_each<F>(&self, target: &str, column: &str, resolve: F) -> Result<u64>
    where
        F: Fn(&TableSchema) -> Result<AccessorConfig>,
    {
        let tables = self.tables.read();
        let entries: Vec<Arc<TableEntry>> = match tables.get(target) {
            Some(entry) => vec![entry.clone()],
            None => {
                let prefix = format!("{}/", target);
                let mut members: Vec<Arc<TableEntry>> = tables
                    .iter()
                    .filter(|(name, _)| name.starts_with(&prefix))
                    .map(|(_, entry)| entry.clone())
                    .collect();
                if members.is_empty() {
                    return Err(Error::config(format!("unknown table or store '{}'", target)));
                }
                members.retain(|entry| entry.schema.column(column).is_some());
                if members.is_empty() {
                    return Err(Error::config(format!(
                        "no table of store '{}' has column '{}'",
                        target, column
                    )));
                }
                members.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
                members
            }
        };

        let mut planned = Vec::with_capacity(entries.len());
        for entry in entries {
            let config = resolve(&entry.schema)?;
            entry.check_alter(column, &config)?;
            planned.push((entry, config));
        }
        Ok(planned
            .into_iter()
            .map(|(entry, config)| entry.install(column, config))
            .max()
            .unwrap_or(0))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Column alteration in option form:
/// `ACTION=ALTER_COLUMN, NAME=field, DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME=SPARSED, DEFAULT_VALUE=abcde`
#[derive(Debug, Clone, PartialEq)]
pub struct AlterColumnRequest {
    pub column: String,
    pub class_name: String,
    pub default_literal: Option<String>,
}

impl AlterColumnRequest {
    pub const ACTION: &'static str = "ACTION";
    pub const ALTER_COLUMN: &'static str = "ALTER_COLUMN";
    pub const NAME: &'static str = "NAME";
    pub const CLASS_NAME: &'static str = "DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME";
    pub const DEFAULT_VALUE: &'static str = "DEFAULT_VALUE";

    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            options
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.trim().to_string())
        };

        match get(Self::ACTION) {
            Some(action) if action.eq_ignore_ascii_case(Self::ALTER_COLUMN) => {}
            Some(action) => return Err(Error::config(format!("unsupported action '{}'", action))),
            None => return Err(Error::config("missing ACTION")),
        }
        let column = get(Self::NAME).filter(|n| !n.is_empty()).ok_or_else(|| Error::config("missing NAME"))?;
        let class_name = get(Self::CLASS_NAME)
            .ok_or_else(|| Error::config(format!("missing {}", Self::CLASS_NAME)))?;

        Ok(AlterColumnRequest {
            column,
            class_name,
            default_literal: get(Self::DEFAULT_VALUE),
        })
    }

    /// Resolve into a typed config; `DEFAULT_VALUE` is parsed as the column's type
    pub fn resolve(&self, schema: &TableSchema) -> Result<AccessorConfig> {
        let def = schema.column(&self.column).ok_or_else(|| {
            Error::config(format!("unknown column '{}' in table '{}'", self.column, schema.name))
        })?;
        let default = match &self.default_literal {
            Some(literal) => Some(
                Value::parse(def.column_type, literal).map_err(|e| Error::config(e.context))?,
            ),
            None => None,
        };
        AccessorConfig::from_class_name(&self.class_name, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ColumnType;

    fn schema() -> TableSchema {
        TableSchema::new("olapStore/olapTable")
            .add_column("pk_int", ColumnType::Int64, false)
            .add_column("field", ColumnType::Utf8, true)
            .with_primary_key(&["pk_int"])
    }

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_new_columns_start_plain() {
        let catalog = Catalog::new();
        let entry = catalog.create_table(schema()).unwrap();
        let accessors = entry.accessors();
        assert_eq!(accessors.version, 0);
        assert_eq!(accessors.get("field"), &AccessorConfig::Plain);
    }

    #[test]
    fn test_duplicate_table() {
        let catalog = Catalog::new();
        catalog.create_table(schema()).unwrap();
        let err = catalog.create_table(schema()).err().unwrap();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_alter_bumps_version_and_keeps_old_snapshot() {
        let catalog = Catalog::new();
        let entry = catalog.create_table(schema()).unwrap();
        let before = entry.accessors();

        let config = AccessorConfig::sparsed(Value::utf8("abcde"));
        let version = catalog
            .alter_column_accessor("olapStore/olapTable", "field", config.clone())
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(entry.accessors().get("field"), &config);
        assert_eq!(before.get("field"), &AccessorConfig::Plain);
    }

    #[test]
    fn test_alter_rejects_unknown_targets_and_bad_configs() {
        let catalog = Catalog::new();
        catalog.create_table(schema()).unwrap();

        let err = catalog.alter_column_accessor("nope", "field", AccessorConfig::Plain).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        let err = catalog
            .alter_column_accessor("olapStore/olapTable", "nope", AccessorConfig::Plain)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        let err = catalog
            .alter_column_accessor("olapStore/olapTable", "field", AccessorConfig::sparsed(Value::Int64(1)))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(catalog.table("olapStore/olapTable").unwrap().accessors().version, 0);
    }

    fn table(name: &str, field_type: ColumnType) -> TableSchema {
        TableSchema::new(name)
            .add_column("pk_int", ColumnType::Int64, false)
            .add_column("field", field_type, true)
            .with_primary_key(&["pk_int"])
    }

    #[test]
    fn test_store_alter_reaches_every_member_table() {
        let catalog = Catalog::new();
        let first = catalog.create_table(schema()).unwrap();
        let second = catalog.create_table(table("olapStore/other", ColumnType::Utf8)).unwrap();
        let outside = catalog.create_table(table("olapStoreX/t", ColumnType::Utf8)).unwrap();

        let config = AccessorConfig::sparsed(Value::utf8("abcde"));
        assert_eq!(catalog.alter_column_accessor("olapStore", "field", config.clone()).unwrap(), 1);
        assert_eq!(first.accessors().get("field"), &config);
        assert_eq!(second.accessors().get("field"), &config);
        assert_eq!(outside.accessors().version, 0);
    }

    #[test]
    fn test_store_alter_is_all_or_nothing() {
        let catalog = Catalog::new();
        let text = catalog.create_table(schema()).unwrap();
        let numeric = catalog.create_table(table("olapStore/numbers", ColumnType::Int64)).unwrap();

        // A Utf8 default does not fit the Int64 column, so neither table changes
        let err = catalog
            .alter_column_accessor("olapStore", "field", AccessorConfig::sparsed(Value::utf8("abcde")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(text.accessors().version, 0);
        assert_eq!(numeric.accessors().version, 0);

        let err = catalog.alter_column_accessor("olapStore", "nope", AccessorConfig::Plain).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[test]
    fn test_store_option_form_parses_default_per_table() {
        let catalog = Catalog::new();
        let text = catalog.create_table(schema()).unwrap();
        let numeric = catalog.create_table(table("olapStore/numbers", ColumnType::Int64)).unwrap();

        let request = AlterColumnRequest::from_options(&options(&[
            ("ACTION", "ALTER_COLUMN"),
            ("NAME", "field"),
            ("DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME", "SPARSED"),
            ("DEFAULT_VALUE", "7"),
        ]))
        .unwrap();
        catalog.alter_with_request("olapStore", &request).unwrap();
        assert_eq!(text.accessors().get("field"), &AccessorConfig::sparsed(Value::utf8("7")));
        assert_eq!(numeric.accessors().get("field"), &AccessorConfig::sparsed(Value::Int64(7)));
    }

    #[test]
    fn test_option_form_resolves_typed_default() {
        let request = AlterColumnRequest::from_options(&options(&[
            ("ACTION", "ALTER_COLUMN"),
            ("NAME", "field"),
            ("DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME", "SPARSED"),
            ("DEFAULT_VALUE", "abcde"),
        ]))
        .unwrap();
        assert_eq!(
            request.resolve(&schema()).unwrap(),
            AccessorConfig::sparsed(Value::utf8("abcde"))
        );
    }

    #[test]
    fn test_option_form_rejects_sparsed_without_default() {
        let request = AlterColumnRequest::from_options(&options(&[
            ("ACTION", "ALTER_COLUMN"),
            ("NAME", "field"),
            ("DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME", "SPARSED"),
        ]))
        .unwrap();
        assert_eq!(request.resolve(&schema()).unwrap_err().kind, ErrorKind::Config);
    }

    #[test]
    fn test_option_form_requires_action_and_name() {
        let err = AlterColumnRequest::from_options(&options(&[("NAME", "field")])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        let err = AlterColumnRequest::from_options(&options(&[
            ("ACTION", "ALTER_COLUMN"),
            ("DATA_ACCESSOR_CONSTRUCTOR.CLASS_NAME", "PLAIN"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }
}
