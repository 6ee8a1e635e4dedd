//! Message catalog extraction from a decoded build.
//!
//! For each `(name, hash)` pair in the reference data for a direction, the
//! hash is resolved to an identifier through the build's id table. Names the
//! build does not know resolve to [`ABSENT_ID`] and are skipped. Resolved
//! messages are then looked up among the build's definitions by hash to pick up
//! their structure.

use tracing::trace;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{Build, Catalog, CatalogEntry, Direction, ABSENT_ID};
use crate::reference::ReferenceData;
use crate::traits::CatalogExtractor;

/// Default extractor driven entirely by the reference hash definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceCatalogExtractor;

impl CatalogExtractor for ReferenceCatalogExtractor {
    fn extract(
        &self,
        build: &Build,
        direction: Direction,
        reference: &ReferenceData,
    ) -> MonitorResult<Catalog> {
        let ids = build.identifiers(direction);
        let mut catalog = Catalog::new();

        for (name, hash) in reference.entries(direction) {
            let id = ids.get(hash).copied().unwrap_or(ABSENT_ID);
            if id == ABSENT_ID {
                trace!(%direction, name = %name, "message absent from build");
                continue;
            }

            let definition = build.definition(hash).ok_or_else(|| {
                MonitorError::Extraction(format!(
                    "{} message {} ({}) has id {} but no definition in the build",
                    direction, name, hash, id
                ))
            })?;

            let structure =
                (!definition.structure.is_empty()).then(|| definition.structure.clone());

            if let Some(existing) = catalog.insert(
                id,
                CatalogEntry {
                    name: name.clone(),
                    hash: hash.clone(),
                    structure,
                },
            ) {
                return Err(MonitorError::Extraction(format!(
                    "{} id {} claimed by both {} and {}",
                    direction, id, existing.name, name
                )));
            }
        }

        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageDefinition;

    fn reference() -> ReferenceData {
        ReferenceData::parse(
            r#"
[incoming]
Handshake = "h-in-1"
Ping = "h-in-2"
Retired = "h-in-gone"

[outgoing]
ClientHello = "h-out-1"
"#,
        )
        .unwrap()
    }

    fn build() -> Build {
        let mut build = Build {
            file_length: 4096,
            ..Default::default()
        };
        build.incoming.insert("h-in-1".to_string(), 10);
        build.incoming.insert("h-in-2".to_string(), 11);
        build.outgoing.insert("h-out-1".to_string(), 4000);
        build.messages.insert(
            "h-in-1".to_string(),
            vec![MessageDefinition {
                structure: vec!["int".to_string(), "string".to_string()],
            }],
        );
        build
            .messages
            .insert("h-in-2".to_string(), vec![MessageDefinition::default()]);
        build
            .messages
            .insert("h-out-1".to_string(), vec![MessageDefinition::default()]);
        build
    }

    #[test]
    fn extracts_entries_with_optional_structure() {
        let catalog = ReferenceCatalogExtractor
            .extract(&build(), Direction::Incoming, &reference())
            .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[&10].name, "Handshake");
        assert_eq!(
            catalog[&10].structure,
            Some(vec!["int".to_string(), "string".to_string()])
        );
        assert_eq!(catalog[&11].name, "Ping");
        assert_eq!(catalog[&11].structure, None);
    }

    #[test]
    fn absent_sentinel_never_produces_entry() {
        let mut build = build();
        build.incoming.insert("h-in-2".to_string(), ABSENT_ID);

        let catalog = ReferenceCatalogExtractor
            .extract(&build, Direction::Incoming, &reference())
            .unwrap();

        assert!(!catalog.contains_key(&ABSENT_ID));
        assert_eq!(catalog.keys().copied().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn directions_are_independent() {
        let catalog = ReferenceCatalogExtractor
            .extract(&build(), Direction::Outgoing, &reference())
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[&4000].name, "ClientHello");
    }

    #[test]
    fn missing_definition_is_extraction_failure() {
        let mut build = build();
        build.messages.remove("h-in-2");

        let err = ReferenceCatalogExtractor
            .extract(&build, Direction::Incoming, &reference())
            .unwrap_err();
        assert!(matches!(err, MonitorError::Extraction(_)));
    }

    #[test]
    fn duplicate_identifier_is_extraction_failure() {
        let mut build = build();
        build.incoming.insert("h-in-2".to_string(), 10);

        let err = ReferenceCatalogExtractor
            .extract(&build, Direction::Incoming, &reference())
            .unwrap_err();
        assert!(err.to_string().contains("claimed by both"));
    }
}
