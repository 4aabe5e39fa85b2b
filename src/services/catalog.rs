//! A file-backed artifact catalog.
//!
//! Stands in for the CMS database when packages are installed from the
//! command line: every imported artifact is recorded in
//! `<data_dir>/catalog.json` with a freshly allocated id. Artifacts whose
//! alias is already present are skipped, like the CMS importers do.

use anyhow::{Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::manifest::XmlElement;
use crate::runtime::Runtime;
use crate::store::JsonDocument;

use super::{
    Entity, EntityId, MacroService, PackagingService, StylesheetService, TemplateInfo,
    TemplateService,
};

pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub next_id: EntityId,
    pub data_types: Vec<Entity>,
    pub languages: Vec<Entity>,
    pub dictionary_items: Vec<Entity>,
    pub templates: Vec<TemplateInfo>,
    pub content_types: Vec<Entity>,
    pub macros: Vec<Entity>,
    pub stylesheets: Vec<StoredStylesheet>,
    pub content: Vec<ContentNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStylesheet {
    pub id: EntityId,
    pub name: String,
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: EntityId,
    pub parent_id: EntityId,
    pub name: String,
    pub content_type: String,
}

impl Catalog {
    fn allocate(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }

    fn add_entity(
        &mut self,
        kind: EntityKind,
        alias: &str,
        name: &str,
    ) -> Option<Entity> {
        if alias.is_empty() || self.entities(kind).iter().any(|e| e.alias == alias) {
            debug!("Skipping existing or unnamed {:?} '{}'", kind, alias);
            return None;
        }
        let entity = Entity::new(self.allocate(), alias, name);
        self.entities_mut(kind).push(entity.clone());
        Some(entity)
    }

    fn entities(&self, kind: EntityKind) -> &Vec<Entity> {
        match kind {
            EntityKind::DataType => &self.data_types,
            EntityKind::Language => &self.languages,
            EntityKind::DictionaryItem => &self.dictionary_items,
            EntityKind::ContentType => &self.content_types,
            EntityKind::Macro => &self.macros,
        }
    }

    fn entities_mut(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        match kind {
            EntityKind::DataType => &mut self.data_types,
            EntityKind::Language => &mut self.languages,
            EntityKind::DictionaryItem => &mut self.dictionary_items,
            EntityKind::ContentType => &mut self.content_types,
            EntityKind::Macro => &mut self.macros,
        }
    }

    fn add_content(
        &mut self,
        node: &XmlElement,
        parent_id: EntityId,
        created: &mut Vec<Entity>,
    ) {
        let id = self.allocate();
        let name = node.attr("nodeName").unwrap_or_default().to_string();
        let content_type = node
            .attr("nodeTypeAlias")
            .unwrap_or(node.name.as_str())
            .to_string();
        self.content.push(ContentNode {
            id,
            parent_id,
            name: name.clone(),
            content_type: content_type.clone(),
        });
        created.push(Entity::new(id, content_type, name));

        for child in node.elements().filter(|e| is_content_node(e)) {
            self.add_content(child, id, created);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EntityKind {
    DataType,
    Language,
    DictionaryItem,
    ContentType,
    Macro,
}

fn is_content_node(element: &XmlElement) -> bool {
    element.attr("nodeName").is_some()
}

/// Elements named `name`: the section itself when it already is one, otherwise its descendants.
fn items<'e>(section: &'e XmlElement, name: &str) -> Vec<&'e XmlElement> {
    if section.name == name {
        vec![section]
    } else {
        section.descendants(name)
    }
}

pub struct LocalCatalog<'a, R: Runtime> {
    document: JsonDocument<'a, R, Catalog>,
}

impl<'a, R: Runtime> LocalCatalog<'a, R> {
    pub fn new(runtime: &'a R, data_dir: &Path) -> Self {
        Self {
            document: JsonDocument::new(runtime, data_dir.join(CATALOG_FILE)),
        }
    }

    pub fn snapshot(&self) -> Result<Catalog> {
        self.document.read()
    }

    fn import_entities(
        &self,
        kind: EntityKind,
        elements: Vec<&XmlElement>,
        describe: impl Fn(&XmlElement) -> (String, String),
    ) -> Result<Vec<Entity>> {
        self.document.update(|catalog| {
            Ok(elements
                .into_iter()
                .filter_map(|element| {
                    let (alias, name) = describe(element);
                    catalog.add_entity(kind, &alias, &name)
                })
                .collect())
        })
    }
}

impl<R: Runtime> PackagingService for LocalCatalog<'_, R> {
    fn import_data_types(&self, section: &XmlElement, _user_id: i64) -> Result<Vec<Entity>> {
        self.import_entities(EntityKind::DataType, items(section, "DataType"), |e| {
            let name = e.attr("Name").unwrap_or_default().to_string();
            let alias = e
                .attr("Definition")
                .map(str::to_string)
                .unwrap_or_else(|| name.clone());
            (alias, name)
        })
    }

    fn import_languages(&self, section: &XmlElement, _user_id: i64) -> Result<Vec<Entity>> {
        self.import_entities(EntityKind::Language, items(section, "Language"), |e| {
            (
                e.attr("CultureAlias").unwrap_or_default().to_string(),
                e.attr("FriendlyName").unwrap_or_default().to_string(),
            )
        })
    }

    fn import_dictionary_items(&self, section: &XmlElement, _user_id: i64) -> Result<Vec<Entity>> {
        self.import_entities(
            EntityKind::DictionaryItem,
            items(section, "DictionaryItem"),
            |e| {
                let key = e.attr("Key").unwrap_or_default().to_string();
                (key.clone(), key)
            },
        )
    }

    fn import_templates(&self, section: &XmlElement, _user_id: i64) -> Result<Vec<Entity>> {
        let templates = items(section, "Template");
        self.document.update(|catalog| {
            let mut created = Vec::new();
            for element in templates {
                let alias = element.child_value("Alias");
                if alias.is_empty() || catalog.templates.iter().any(|t| t.alias == alias) {
                    debug!("Skipping existing or unnamed template '{}'", alias);
                    continue;
                }
                let template = TemplateInfo {
                    id: catalog.allocate(),
                    alias,
                    name: element.child_value("Name"),
                    design: element
                        .child("Design")
                        .map(|d| d.text())
                        .unwrap_or_default(),
                };
                created.push(Entity::new(template.id, &template.alias, &template.name));
                catalog.templates.push(template);
            }
            Ok(created)
        })
    }

    fn import_content_types(&self, section: &XmlElement, _user_id: i64) -> Result<Vec<Entity>> {
        self.import_entities(
            EntityKind::ContentType,
            items(section, "DocumentType"),
            |e| {
                (
                    e.path("Info/Alias").map(|a| a.text()).unwrap_or_default(),
                    e.path("Info/Name").map(|n| n.text()).unwrap_or_default(),
                )
            },
        )
    }

    fn import_content(
        &self,
        section: &XmlElement,
        parent_id: EntityId,
        _user_id: i64,
    ) -> Result<Vec<Entity>> {
        self.document.update(|catalog| {
            let mut created = Vec::new();
            for node in section.elements().filter(|e| is_content_node(e)) {
                catalog.add_content(node, parent_id, &mut created);
            }
            Ok(created)
        })
    }
}

impl<R: Runtime> MacroService for LocalCatalog<'_, R> {
    fn get_by_alias(&self, alias: &str) -> Result<Option<Entity>> {
        Ok(self
            .document
            .read()?
            .macros
            .into_iter()
            .find(|m| m.alias == alias))
    }

    fn import_macro(&self, element: &XmlElement, _user_id: i64) -> Result<Option<Entity>> {
        let alias = element.child_value("alias");
        let name = element.child_value("name");
        self.document
            .update(|catalog| Ok(catalog.add_entity(EntityKind::Macro, &alias, &name)))
    }
}

impl<R: Runtime> TemplateService for LocalCatalog<'_, R> {
    fn get_by_alias(&self, alias: &str) -> Result<Option<TemplateInfo>> {
        Ok(self
            .document
            .read()?
            .templates
            .into_iter()
            .find(|t| t.alias == alias))
    }

    fn save_design(&self, alias: &str, design: &str) -> Result<()> {
        self.document.update(|catalog| {
            match catalog.templates.iter_mut().find(|t| t.alias == alias) {
                Some(template) => {
                    template.design = design.to_string();
                    Ok(())
                }
                None => bail!("Template '{}' does not exist", alias),
            }
        })
    }
}

impl<R: Runtime> StylesheetService for LocalCatalog<'_, R> {
    fn get_by_name(&self, name: &str) -> Result<Option<Entity>> {
        Ok(self
            .document
            .read()?
            .stylesheets
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| Entity::new(s.id, s.file_name, s.name)))
    }

    fn import_stylesheet(&self, element: &XmlElement, _user_id: i64) -> Result<Entity> {
        let name = element.child_value("Name");
        if name.is_empty() {
            bail!("Stylesheet element has no Name");
        }
        let file_name = match element.child_value("FileName") {
            f if f.is_empty() => name.clone(),
            f => f,
        };
        let content = element
            .child("Content")
            .map(|c| c.text())
            .unwrap_or_default();

        self.document.update(|catalog| {
            if let Some(existing) = catalog.stylesheets.iter().find(|s| s.name == name) {
                return Ok(Entity::new(
                    existing.id,
                    &existing.file_name,
                    &existing.name,
                ));
            }
            let stylesheet = StoredStylesheet {
                id: catalog.allocate(),
                name,
                file_name,
                content,
            };
            let entity = Entity::new(stylesheet.id, &stylesheet.file_name, &stylesheet.name);
            catalog.stylesheets.push(stylesheet);
            Ok(entity)
        })
    }
}
