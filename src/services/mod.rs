//! Services that materialize package artifacts in the CMS.
//!
//! The installer only sees these traits. [`LocalCatalog`] is the
//! implementation the CLI uses; tests use the generated mocks.

mod catalog;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::manifest::XmlElement;

pub use catalog::{CATALOG_FILE, Catalog, LocalCatalog};

pub type EntityId = i64;

/// An artifact known to the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub alias: String,
    pub name: String,
}

impl Entity {
    pub fn new(id: EntityId, alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            alias: alias.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: EntityId,
    pub alias: String,
    pub name: String,
    pub design: String,
}

/// Batch importers. Each call receives a whole manifest section and returns
/// the entities it created, in document order.
#[cfg_attr(test, mockall::automock)]
pub trait PackagingService: Send + Sync {
    fn import_data_types(&self, section: &XmlElement, user_id: i64) -> Result<Vec<Entity>>;
    fn import_languages(&self, section: &XmlElement, user_id: i64) -> Result<Vec<Entity>>;
    fn import_dictionary_items(&self, section: &XmlElement, user_id: i64) -> Result<Vec<Entity>>;
    fn import_templates(&self, section: &XmlElement, user_id: i64) -> Result<Vec<Entity>>;
    fn import_content_types(&self, section: &XmlElement, user_id: i64) -> Result<Vec<Entity>>;
    fn import_content(
        &self,
        section: &XmlElement,
        parent_id: EntityId,
        user_id: i64,
    ) -> Result<Vec<Entity>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait MacroService: Send + Sync {
    fn get_by_alias(&self, alias: &str) -> Result<Option<Entity>>;

    /// Import one `macro` element. `None` when a macro with that alias already exists.
    fn import_macro(&self, element: &XmlElement, user_id: i64) -> Result<Option<Entity>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait TemplateService: Send + Sync {
    fn get_by_alias(&self, alias: &str) -> Result<Option<TemplateInfo>>;
    fn save_design(&self, alias: &str, design: &str) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
pub trait StylesheetService: Send + Sync {
    fn get_by_name(&self, name: &str) -> Result<Option<Entity>>;

    /// Import one `Stylesheet` element, returning the existing stylesheet when the name is taken.
    fn import_stylesheet(&self, element: &XmlElement, user_id: i64) -> Result<Entity>;
}

/// The set of services an install talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub packaging: &'a dyn PackagingService,
    pub macros: &'a dyn MacroService,
    pub templates: &'a dyn TemplateService,
    pub stylesheets: &'a dyn StylesheetService,
}

impl<'a> Services<'a> {
    /// Use one implementation for every service.
    pub fn uniform<S>(services: &'a S) -> Self
    where
        S: PackagingService + MacroService + TemplateService + StylesheetService,
    {
        Self {
            packaging: services,
            macros: services,
            templates: services,
            stylesheets: services,
        }
    }
}

/// Mocks bundled so a test can build a [`Services`] from them.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockServices {
    pub packaging: MockPackagingService,
    pub macros: MockMacroService,
    pub templates: MockTemplateService,
    pub stylesheets: MockStylesheetService,
}

#[cfg(test)]
impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            packaging: &self.packaging,
            macros: &self.macros,
            templates: &self.templates,
            stylesheets: &self.stylesheets,
        }
    }
}
