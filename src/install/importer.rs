use anyhow::{Context, Result};
use log::{debug, warn};

use crate::ledger::{InstalledPackage, LedgerStore};
use crate::manifest::PackageManifest;
use crate::services::{Entity, Services};

/// Content imported from a package is placed at the root of the tree.
const ROOT_PARENT_ID: i64 = -1;

/// Import every artifact section the manifest has, recording created ids in the ledger.
///
/// Sections are imported in a fixed order and each one is optional. The
/// ledger is saved after every section that recorded something. A service
/// error stops the import; the ledger is saved as it stands and the error is
/// returned, so ids recorded before the failure are kept.
#[tracing::instrument(skip_all, fields(package = %manifest.name))]
pub fn import_artifacts(
    manifest: &PackageManifest,
    services: Services<'_>,
    store: &dyn LedgerStore,
    user_id: i64,
    ledger: &mut InstalledPackage,
) -> Result<()> {
    let result = import_sections(manifest, services, store, user_id, ledger);
    if result.is_err()
        && let Err(e) = store.save(ledger)
    {
        warn!("Failed to save partial ledger {}: {:#}", ledger.id, e);
    }
    result
}

fn import_sections(
    manifest: &PackageManifest,
    services: Services<'_>,
    store: &dyn LedgerStore,
    user_id: i64,
    ledger: &mut InstalledPackage,
) -> Result<()> {
    let packaging = services.packaging;

    if let Some(section) = manifest.data_types() {
        let created = packaging
            .import_data_types(section, user_id)
            .context("Failed to import data types")?;
        record(store, ledger, created, |l| &mut l.data_types)?;
    }

    if let Some(section) = manifest.languages() {
        let created = packaging
            .import_languages(section, user_id)
            .context("Failed to import languages")?;
        record(store, ledger, created, |l| &mut l.languages)?;
    }

    if let Some(section) = manifest.dictionary_items() {
        let created = packaging
            .import_dictionary_items(section, user_id)
            .context("Failed to import dictionary items")?;
        record(store, ledger, created, |l| &mut l.dictionary_items)?;
    }

    let mut macros = Vec::new();
    for m in &manifest.macros {
        let imported = services
            .macros
            .import_macro(&m.element, user_id)
            .with_context(|| format!("Failed to import macro '{}'", m.alias))?;
        match imported {
            Some(entity) => macros.push(entity),
            None => debug!("Macro '{}' already exists, not recorded", m.alias),
        }
    }
    record(store, ledger, macros, |l| &mut l.macros)?;

    if let Some(section) = manifest.templates_section() {
        let created = packaging
            .import_templates(section, user_id)
            .context("Failed to import templates")?;
        record(store, ledger, created, |l| &mut l.templates)?;
    }

    if let Some(section) = manifest.document_types() {
        let created = packaging
            .import_content_types(section, user_id)
            .context("Failed to import document types")?;
        record(store, ledger, created, |l| &mut l.document_types)?;
    }

    let mut stylesheets = Vec::new();
    for s in &manifest.stylesheets {
        let entity = services
            .stylesheets
            .import_stylesheet(&s.element, user_id)
            .with_context(|| format!("Failed to import stylesheet '{}'", s.name))?;
        stylesheets.push(entity);
    }
    record(store, ledger, stylesheets, |l| &mut l.stylesheets)?;

    if let Some(section) = manifest.document_set() {
        let created = packaging
            .import_content(section, ROOT_PARENT_ID, user_id)
            .context("Failed to import content")?;
        if let Some(root) = created.first() {
            ledger.content_node_id = root.id.to_string();
            store.save(ledger)?;
        }
    }

    Ok(())
}

/// Append the ids of `created` to one of the ledger's lists and save.
fn record(
    store: &dyn LedgerStore,
    ledger: &mut InstalledPackage,
    created: Vec<Entity>,
    list: impl FnOnce(&mut InstalledPackage) -> &mut Vec<String>,
) -> Result<()> {
    if created.is_empty() {
        return Ok(());
    }
    list(ledger).extend(created.iter().map(|e| e.id.to_string()));
    store.save(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedgerStore;
    use crate::manifest::fixtures::{macro_node, manifest_xml};
    use crate::services::MockServices;
    use anyhow::anyhow;

    fn manifest(body: &str) -> PackageManifest {
        PackageManifest::parse(&manifest_xml(body)).unwrap()
    }

    fn saving_store() -> MockLedgerStore {
        let mut store = MockLedgerStore::new();
        store.expect_save().returning(|_| Ok(()));
        store
    }

    #[test]
    fn test_empty_manifest_imports_nothing() {
        let services = MockServices::new();
        let mut store = MockLedgerStore::new();
        store.expect_save().never();
        let mut ledger = InstalledPackage::default();

        import_artifacts(&manifest(""), services.services(), &store, 0, &mut ledger).unwrap();
        assert_eq!(ledger, InstalledPackage::default());
    }

    #[test]
    fn test_sections_are_recorded_in_ledger() {
        let manifest = manifest(&format!(
            r#"<DataTypes><DataType Name="Picker" /></DataTypes>
            <Languages><Language CultureAlias="da-DK" /></Languages>
            <macros>{}{}</macros>
            <Templates><Template><Alias>home</Alias></Template></Templates>
            <DocumentTypes><DocumentType /></DocumentTypes>
            <Stylesheets><Stylesheet><Name>site</Name></Stylesheet></Stylesheets>
            <DocumentSet><Home nodeName="Home" /></DocumentSet>"#,
            macro_node("sample", "Sample"),
            macro_node("existing", "Existing")
        ));

        let mut services = MockServices::new();
        services
            .packaging
            .expect_import_data_types()
            .returning(|_, _| Ok(vec![Entity::new(10, "picker", "Picker")]));
        services
            .packaging
            .expect_import_languages()
            .returning(|_, _| Ok(vec![Entity::new(11, "da-DK", "Danish")]));
        services
            .packaging
            .expect_import_templates()
            .returning(|_, _| Ok(vec![Entity::new(12, "home", "Home")]));
        services
            .packaging
            .expect_import_content_types()
            .returning(|_, _| Ok(vec![Entity::new(13, "homePage", "Home Page")]));
        services
            .packaging
            .expect_import_content()
            .withf(|_, parent, _| *parent == ROOT_PARENT_ID)
            .returning(|_, _, _| {
                Ok(vec![
                    Entity::new(20, "homePage", "Home"),
                    Entity::new(21, "textPage", "About"),
                ])
            });
        services
            .macros
            .expect_import_macro()
            .returning(|element, _| {
                Ok(match element.child_value("alias").as_str() {
                    "sample" => Some(Entity::new(14, "sample", "Sample")),
                    _ => None,
                })
            });
        services
            .stylesheets
            .expect_import_stylesheet()
            .returning(|_, _| Ok(Entity::new(15, "site.css", "site")));

        let store = saving_store();
        let mut ledger = InstalledPackage::default();
        import_artifacts(&manifest, services.services(), &store, 0, &mut ledger).unwrap();

        assert_eq!(ledger.data_types, vec!["10"]);
        assert_eq!(ledger.languages, vec!["11"]);
        assert!(ledger.dictionary_items.is_empty());
        assert_eq!(ledger.macros, vec!["14"]);
        assert_eq!(ledger.templates, vec!["12"]);
        assert_eq!(ledger.document_types, vec!["13"]);
        assert_eq!(ledger.stylesheets, vec!["15"]);
        assert_eq!(ledger.content_node_id, "20");
    }

    #[test]
    fn test_failure_keeps_earlier_ids_and_saves() {
        let manifest = manifest(
            r#"<DataTypes><DataType Name="Picker" /></DataTypes>
            <Templates><Template><Alias>home</Alias></Template></Templates>"#,
        );

        let mut services = MockServices::new();
        services
            .packaging
            .expect_import_data_types()
            .returning(|_, _| Ok(vec![Entity::new(10, "picker", "Picker")]));
        services
            .packaging
            .expect_import_templates()
            .returning(|_, _| Err(anyhow!("template store offline")));

        let mut store = MockLedgerStore::new();
        store
            .expect_save()
            .withf(|l| l.data_types == vec!["10"])
            .times(2)
            .returning(|_| Ok(()));

        let mut ledger = InstalledPackage::default();
        let err = import_artifacts(&manifest, services.services(), &store, 0, &mut ledger)
            .unwrap_err();

        assert!(err.to_string().contains("Failed to import templates"));
        assert_eq!(ledger.data_types, vec!["10"]);
        assert!(ledger.templates.is_empty());
    }
}
