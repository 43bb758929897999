//! The `osm2pgsql_properties` key/value store: persisted run metadata
//! (import mode, bucket shift, attached flat node file path, ...) read back
//! on every append run (spec.md §6).
//!
//! Grounded on `original_source/src/properties.hpp` (`properties_t`):
//! values are strings in storage; `get_int`/`get_bool` parse on read,
//! `set_int`/`set_bool` format on write. Only the dirty subset is written
//! back by [`PropertiesStore::store`].

use std::collections::HashMap;

use postgres::Client;

/// Errors from loading or storing properties.
#[derive(Debug, thiserror::Error)]
pub enum PropertiesError {
    #[error("querying the properties table")]
    Query(#[source] postgres::Error),
    #[error("creating the properties table")]
    CreateTable(#[source] postgres::Error),
}

/// The properties table's unqualified name.
const TABLE_NAME: &str = "osm2pgsql_properties";

/// A schema-qualified key/value store backed by a single Postgres table.
///
/// Mirrors `properties_t`: `m_properties` holds every loaded value,
/// `m_to_update` holds only the subset changed since the last [`Self::store`]
/// (spec.md §6 supplement — avoids rewriting unchanged rows on every run).
#[derive(Debug, Clone, Default)]
pub struct PropertiesStore {
    schema: String,
    properties: HashMap<String, String>,
    to_update: HashMap<String, String>,
}

impl PropertiesStore {
    /// Builds an empty store scoped to `schema`. Call [`Self::load`] to
    /// populate it from an existing database, or [`Self::init_table`] on a
    /// fresh one.
    #[must_use]
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_owned(),
            properties: HashMap::new(),
            to_update: HashMap::new(),
        }
    }

    /// The number of properties currently held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn table_name(&self) -> String {
        format!("{}.{TABLE_NAME}", self.schema)
    }

    /// Returns `property`'s value, or `default` if unset.
    #[must_use]
    pub fn get_string(&self, property: &str, default: &str) -> String {
        self.properties
            .get(property)
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }

    /// Returns `property`'s value parsed as an integer, or `default` if
    /// unset or unparsable.
    #[must_use]
    pub fn get_int(&self, property: &str, default: i64) -> i64 {
        self.properties
            .get(property)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Returns `property`'s value parsed as a boolean (`"true"`/`"false"`),
    /// or `default` if unset or unrecognized.
    #[must_use]
    pub fn get_bool(&self, property: &str, default: bool) -> bool {
        match self.properties.get(property).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    /// Sets `property` to `value`, marking it dirty for the next
    /// [`Self::store`].
    pub fn set_string(&mut self, property: &str, value: &str) {
        self.properties
            .insert(property.to_owned(), value.to_owned());
        self.to_update
            .insert(property.to_owned(), value.to_owned());
    }

    pub fn set_int(&mut self, property: &str, value: i64) {
        self.set_string(property, &value.to_string());
    }

    pub fn set_bool(&mut self, property: &str, value: bool) {
        self.set_string(property, if value { "true" } else { "false" });
    }

    /// Creates the properties table if it does not already exist, and
    /// truncates it (spec.md §6 supplement: a fresh import starts with no
    /// carried-over properties).
    pub fn init_table(&self, client: &mut Client) -> Result<(), PropertiesError> {
        let table = self.table_name();
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                     property text PRIMARY KEY, \
                     value text NOT NULL\
                 ); \
                 TRUNCATE {table};"
            ))
            .map_err(PropertiesError::CreateTable)
    }

    /// Writes only the properties changed since the last call, upserting
    /// each by primary key, then clears the dirty set.
    pub fn store(&mut self, client: &mut Client) -> Result<(), PropertiesError> {
        if self.to_update.is_empty() {
            return Ok(());
        }
        let table = self.table_name();
        let mut transaction = client.transaction().map_err(PropertiesError::Query)?;
        for (property, value) in &self.to_update {
            transaction
                .execute(
                    &format!(
                        "INSERT INTO {table} (property, value) VALUES ($1, $2) \
                         ON CONFLICT (property) DO UPDATE SET value = excluded.value"
                    ),
                    &[property, value],
                )
                .map_err(PropertiesError::Query)?;
        }
        transaction.commit().map_err(PropertiesError::Query)?;
        self.to_update.clear();
        Ok(())
    }

    /// Replaces all in-memory properties with the contents of the table.
    /// Returns `false` (leaving the store empty) if the table does not
    /// exist, mirroring `properties_t::load`'s "nothing to resume from" case
    /// on a first-ever import.
    pub fn load(&mut self, client: &mut Client) -> Result<bool, PropertiesError> {
        self.properties.clear();
        self.to_update.clear();

        let table = self.table_name();
        let exists: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[&self.schema, &TABLE_NAME],
            )
            .map_err(PropertiesError::Query)?
            .get(0);
        if !exists {
            return Ok(false);
        }

        for row in client
            .query(&format!("SELECT property, value FROM {table}"), &[])
            .map_err(PropertiesError::Query)?
        {
            let property: String = row.get(0);
            let value: String = row.get(1);
            self.properties.insert(property, value);
        }
        Ok(true)
    }

    /// Iterates over every currently loaded property.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn unset_string_falls_back_to_default() {
        let store = PropertiesStore::new("public");
        assert_eq!(store.get_string("mode", "import"), "import");
    }

    #[rstest]
    fn set_then_get_round_trips() {
        let mut store = PropertiesStore::new("public");
        store.set_string("mode", "append");
        assert_eq!(store.get_string("mode", "import"), "append");
    }

    #[rstest]
    fn int_round_trips_through_string_storage() {
        let mut store = PropertiesStore::new("public");
        store.set_int("bucket_shift", 5);
        assert_eq!(store.get_int("bucket_shift", 0), 5);
    }

    #[rstest]
    fn bool_round_trips_through_literal_strings() {
        let mut store = PropertiesStore::new("public");
        store.set_bool("flat_nodes", true);
        assert_eq!(store.get_bool("flat_nodes", false), true);
    }

    #[rstest]
    fn unrecognized_bool_value_falls_back_to_default() {
        let mut store = PropertiesStore::new("public");
        store.set_string("flat_nodes", "maybe");
        assert_eq!(store.get_bool("flat_nodes", false), false);
    }

    #[rstest]
    fn set_marks_dirty_until_store_clears_it() {
        let mut store = PropertiesStore::new("public");
        assert!(store.to_update.is_empty());
        store.set_string("mode", "append");
        assert_eq!(store.to_update.len(), 1);
    }
}
