//! Field metadata lookup against the host's static catalog.

use crate::error::{Error, Result};
use crate::host::DatabaseHost;
use crate::types::{FieldDescriptor, FieldTypeMap};
use std::collections::{BTreeMap, HashSet};

/// Field name to descriptor, ordered by name.
pub type FieldMap = BTreeMap<String, FieldDescriptor>;

/// Looks up field layouts of record types.
///
/// Each lookup opens one catalog cursor, walks the record type's field list
/// once and releases the cursor before returning.
pub struct FieldCatalog<'a> {
    host: &'a dyn DatabaseHost,
    types: &'a FieldTypeMap,
}

impl<'a> FieldCatalog<'a> {
    /// Creates a catalog over `host`, decoding type codes with `types`.
    pub fn new(host: &'a dyn DatabaseHost, types: &'a FieldTypeMap) -> Self {
        Self { host, types }
    }

    /// Returns the requested fields that exist on `record_type`.
    ///
    /// Matching is exact and case-sensitive. Requested names the type does
    /// not define are simply absent from the result.
    pub fn try_lookup<S: AsRef<str>>(&self, record_type: &str, names: &[S]) -> Result<FieldMap> {
        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        self.scan(record_type, |name| wanted.contains(name))
    }

    /// Like [`try_lookup`](Self::try_lookup), but an unknown record type is
    /// logged at warn level and yields an empty map. The warning goes
    /// through the `log` facade, see [`init_logging`](crate::init_logging).
    pub fn lookup<S: AsRef<str>>(&self, record_type: &str, names: &[S]) -> FieldMap {
        match self.try_lookup(record_type, names) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("{}", e);
                FieldMap::new()
            }
        }
    }

    /// Like [`try_lookup`](Self::try_lookup), but fails unless every
    /// requested field exists.
    pub fn require<S: AsRef<str>>(&self, record_type: &str, names: &[S]) -> Result<FieldMap> {
        let found = self.try_lookup(record_type, names)?;
        let mut missing: Vec<String> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !found.contains_key(*name))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            return Ok(found);
        }
        missing.sort();
        missing.dedup();
        Err(Error::MissingFields { record_type: record_type.to_string(), missing })
    }

    /// Every field of `record_type`.
    pub fn dump(&self, record_type: &str) -> Result<FieldMap> {
        self.scan(record_type, |_| true)
    }

    fn scan(&self, record_type: &str, mut wanted: impl FnMut(&str) -> bool) -> Result<FieldMap> {
        let mut cursor = self.host.open_catalog();
        cursor.find_record_type(record_type).map_err(|status| Error::UnknownRecordType {
            record_type: record_type.to_string(),
            status: status.code,
        })?;

        let mut found = FieldMap::new();
        while let Some(field) = cursor.next_field() {
            if !wanted(&field.name) {
                continue;
            }
            let Some(declared_type) = self.types.field_type(field.type_code) else {
                log::warn!(
                    "Skipping {}.{}: unknown field type code {}",
                    record_type,
                    field.name,
                    field.type_code
                );
                continue;
            };
            found.insert(
                field.name.clone(),
                FieldDescriptor {
                    name: field.name,
                    byte_offset: field.offset,
                    byte_size: field.size,
                    declared_type,
                },
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::types::FieldType;

    fn setup() -> (MemoryHost, FieldTypeMap) {
        let host = MemoryHost::builder().standard_record_types().build().unwrap();
        let types = FieldTypeMap::from_codes(host.field_type_codes());
        (host, types)
    }

    #[test]
    fn test_lookup_subset() {
        let (host, types) = setup();
        let catalog = FieldCatalog::new(&host, &types);
        let found = catalog.lookup("ao", &["VAL", "PREC", "NOPE"]);
        assert_eq!(found.len(), 2);
        assert_eq!(found["VAL"].declared_type, FieldType::Double);
        assert_eq!(found["VAL"].byte_size, 8);
        assert_eq!(found["PREC"].declared_type, FieldType::Short);
        assert_eq!(host.open_catalog_cursors(), 0);
    }

    #[test]
    fn test_case_sensitive() {
        let (host, types) = setup();
        let catalog = FieldCatalog::new(&host, &types);
        assert!(catalog.lookup("ao", &["val"]).is_empty());
    }

    #[test]
    fn test_unknown_record_type() {
        let (host, types) = setup();
        let catalog = FieldCatalog::new(&host, &types);
        assert!(catalog.lookup("nosuch", &["VAL"]).is_empty());
        assert!(matches!(
            catalog.try_lookup("nosuch", &["VAL"]),
            Err(Error::UnknownRecordType { .. })
        ));
        assert_eq!(host.open_catalog_cursors(), 0);
    }

    #[test]
    fn test_require_reports_sorted_missing() {
        let (host, types) = setup();
        let catalog = FieldCatalog::new(&host, &types);
        match catalog.require("ai", &["VAL", "ZZZ", "AAA"]) {
            Err(Error::MissingFields { record_type, missing }) => {
                assert_eq!(record_type, "ai");
                assert_eq!(missing, vec!["AAA", "ZZZ"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(catalog.require("ai", &["VAL", "INP"]).unwrap().len(), 2);
    }

    #[test]
    fn test_dump() {
        let (host, types) = setup();
        let catalog = FieldCatalog::new(&host, &types);
        let all = catalog.dump("waveform").unwrap();
        assert_eq!(all["VAL"].byte_size, 16);
        assert!(all.contains_key("NAME"));
    }

    #[test]
    fn test_unknown_type_code_is_skipped() {
        let (host, _) = setup();
        let partial = FieldTypeMap::from_codes(
            host.field_type_codes().into_iter().filter(|(t, _)| *t != FieldType::Short),
        );
        let catalog = FieldCatalog::new(&host, &partial);
        let found = catalog.lookup("ao", &["VAL", "PREC"]);
        assert!(found.contains_key("VAL"));
        assert!(!found.contains_key("PREC"));
    }
}
