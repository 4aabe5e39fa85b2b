//! Package manifest (`package.xml`) model and reader.
//!
//! The manifest is parsed once per install and never mutated afterwards.
//! Artifact descriptors keep a copy of their source element so importers can
//! hand the original XML to the services that materialize them.

mod error;
pub mod xml;

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use crate::runtime::Runtime;

pub use error::ManifestError;
pub use xml::{XmlElement, XmlNode};

/// File name of the manifest inside an extracted package.
pub const MANIFEST_FILE: &str = "package.xml";

const ROOT: &str = "umbPackage";

/// Minimum CMS version the package declares it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirements {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// A payload file: stored in the archive as `guid`, installed as `org_path/org_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub guid: String,
    pub org_path: String,
    pub org_name: String,
}

impl FileDescriptor {
    /// The path recorded in the ledger, exactly as the manifest spells it.
    pub fn ledger_path(&self) -> String {
        format!("{}/{}", self.org_path, self.org_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDescriptor {
    pub alias: String,
    pub name: String,
    pub element: XmlElement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDescriptor {
    pub alias: String,
    pub name: String,
    pub element: XmlElement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StylesheetDescriptor {
    pub name: String,
    pub element: XmlElement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    pub alias: String,
    pub run_at: Option<String>,
    pub undo: Option<String>,
    pub element: XmlElement,
}

impl ActionDescriptor {
    /// Actions without an `undo` attribute are undoable.
    pub fn is_undoable(&self) -> bool {
        matches!(self.undo.as_deref(), None | Some("true"))
    }

    pub fn runs_at_install(&self) -> bool {
        self.run_at.as_deref() == Some("install")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub url: String,
    pub license: String,
    pub license_url: String,
    pub author: String,
    pub author_url: String,
    pub requirements: Requirements,
    pub readme: Option<String>,
    pub control: Option<String>,
    pub enable_skins: bool,
    pub skin_repository: Option<String>,
    pub files: Vec<FileDescriptor>,
    pub macros: Vec<MacroDescriptor>,
    pub templates: Vec<TemplateDescriptor>,
    pub stylesheets: Vec<StylesheetDescriptor>,
    pub actions: Vec<ActionDescriptor>,
    root: XmlElement,
}

impl PackageManifest {
    /// Read `package.xml` from an extracted package directory.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, temp_dir: &Path) -> Result<Self> {
        let path = temp_dir.join(MANIFEST_FILE);
        if !runtime.exists(&path) {
            return Err(ManifestError::NotFound(path).into());
        }

        let content = runtime
            .read_to_string(&path)
            .with_context(|| format!("Failed to read package manifest {:?}", path))?;
        let manifest = Self::parse(&content)?;

        debug!(
            "Loaded manifest for {} {}: {} file(s), {} macro(s), {} action(s)",
            manifest.name,
            manifest.version,
            manifest.files.len(),
            manifest.macros.len(),
            manifest.actions.len()
        );
        Ok(manifest)
    }

    pub fn parse(xml: &str) -> Result<Self, ManifestError> {
        let root = XmlElement::parse(xml)?;
        if root.name != ROOT {
            return Err(ManifestError::MissingNode(format!("/{}", ROOT)));
        }

        let license = required(&root, "info/package/license")?;
        let license_url = license
            .attr("url")
            .ok_or_else(|| ManifestError::MissingNode(absolute("info/package/license/@url")))?
            .to_string();

        let requirements = Requirements {
            major: required_number(&root, "info/package/requirements/major")?,
            minor: required_number(&root, "info/package/requirements/minor")?,
            patch: required_number(&root, "info/package/requirements/patch")?,
        };

        let (enable_skins, skin_repository) = match root.child("enableSkins") {
            Some(node) => {
                let value = node.text().trim().to_string();
                let enabled = match value.to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(ManifestError::InvalidValue {
                            path: absolute("enableSkins"),
                            value,
                        });
                    }
                };
                let repository = node
                    .attr("repository")
                    .filter(|r| !r.is_empty())
                    .map(str::to_string);
                (enabled, repository)
            }
            None => (false, None),
        };

        Ok(Self {
            name: required_value(&root, "info/package/name")?,
            version: required_value(&root, "info/package/version")?,
            url: required_value(&root, "info/package/url")?,
            license: license.text().trim().to_string(),
            license_url,
            author: required_value(&root, "info/author/name")?,
            author_url: required_value(&root, "info/author/website")?,
            requirements,
            readme: optional_value(&root, "info/readme"),
            control: optional_value(&root, "control"),
            enable_skins,
            skin_repository,
            files: parse_files(&root),
            macros: parse_macros(&root),
            templates: parse_templates(&root),
            stylesheets: parse_stylesheets(&root),
            actions: parse_actions(&root),
            root,
        })
    }

    /// The whole document, for callers that need sections not modelled here.
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn data_types(&self) -> Option<&XmlElement> {
        self.first_descendant("DataTypes")
    }

    pub fn languages(&self) -> Option<&XmlElement> {
        self.first_descendant("Languages")
    }

    pub fn dictionary_items(&self) -> Option<&XmlElement> {
        self.first_descendant("DictionaryItems")
    }

    pub fn templates_section(&self) -> Option<&XmlElement> {
        self.first_descendant("Templates")
    }

    pub fn document_types(&self) -> Option<&XmlElement> {
        self.first_descendant("DocumentTypes")
    }

    pub fn document_set(&self) -> Option<&XmlElement> {
        self.first_descendant("DocumentSet")
    }

    fn first_descendant(&self, name: &str) -> Option<&XmlElement> {
        self.root.descendants(name).into_iter().next()
    }
}

fn absolute(path: &str) -> String {
    format!("/{}/{}", ROOT, path)
}

fn required<'a>(root: &'a XmlElement, path: &str) -> Result<&'a XmlElement, ManifestError> {
    root.path(path)
        .ok_or_else(|| ManifestError::MissingNode(absolute(path)))
}

fn required_value(root: &XmlElement, path: &str) -> Result<String, ManifestError> {
    Ok(required(root, path)?.text().trim().to_string())
}

fn required_number(root: &XmlElement, path: &str) -> Result<u32, ManifestError> {
    let value = required_value(root, path)?;
    value.parse().map_err(|_| ManifestError::InvalidValue {
        path: absolute(path),
        value,
    })
}

fn optional_value(root: &XmlElement, path: &str) -> Option<String> {
    root.path(path)
        .map(|e| e.text().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_files(root: &XmlElement) -> Vec<FileDescriptor> {
    root.descendants("file")
        .into_iter()
        .map(|n| FileDescriptor {
            guid: n.child_value("guid"),
            org_path: n.child_value("orgPath"),
            org_name: n.child_value("orgName"),
        })
        .collect()
}

fn parse_macros(root: &XmlElement) -> Vec<MacroDescriptor> {
    root.descendants("macro")
        .into_iter()
        .map(|n| MacroDescriptor {
            alias: n.child_value("alias"),
            name: n.child_value("name"),
            element: n.clone(),
        })
        .collect()
}

fn parse_templates(root: &XmlElement) -> Vec<TemplateDescriptor> {
    root.select("Templates/Template")
        .into_iter()
        .map(|n| TemplateDescriptor {
            alias: n.child_value("Alias"),
            name: n.child_value("Name"),
            element: n.clone(),
        })
        .collect()
}

fn parse_stylesheets(root: &XmlElement) -> Vec<StylesheetDescriptor> {
    root.select("Stylesheets/Stylesheet")
        .into_iter()
        .map(|n| StylesheetDescriptor {
            name: n.child_value("Name"),
            element: n.clone(),
        })
        .collect()
}

fn parse_actions(root: &XmlElement) -> Vec<ActionDescriptor> {
    root.select("Actions/Action")
        .into_iter()
        .map(|n| ActionDescriptor {
            alias: n.attr("alias").unwrap_or_default().to_string(),
            run_at: n.attr("runat").map(str::to_string),
            undo: n.attr("undo").map(str::to_string),
            element: n.clone(),
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::{file_node, macro_node, manifest_xml};
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    #[test]
    fn test_parse_metadata() {
        let manifest = PackageManifest::parse(&manifest_xml("")).unwrap();
        assert_eq!(manifest.name, "Sample Package");
        assert_eq!(manifest.version, "1.2.3");
        assert_eq!(manifest.url, "http://example.com/sample");
        assert_eq!(manifest.license, "MIT");
        assert_eq!(manifest.license_url, "http://opensource.org/licenses/MIT");
        assert_eq!(manifest.author, "Jane Doe");
        assert_eq!(manifest.author_url, "http://example.com");
        assert_eq!(
            manifest.requirements,
            Requirements {
                major: 7,
                minor: 1,
                patch: 0
            }
        );
        assert_eq!(manifest.readme.as_deref(), Some("Read me first"));
        assert_eq!(manifest.control, None);
        assert!(!manifest.enable_skins);
    }

    #[test]
    fn test_parse_artifact_descriptors() {
        let body = format!(
            r#"<files>{}{}</files>
            <macros>{}</macros>
            <Templates><Template><Name>Home</Name><Alias>home</Alias></Template></Templates>
            <Stylesheets><Stylesheet><Name>site</Name></Stylesheet></Stylesheets>
            <Actions><Action runat="install" alias="a" undo="false" /><Action alias="b" /></Actions>
            <control>/usercontrols/setup.ascx</control>"#,
            file_node("abc123", "/media", "test.txt"),
            file_node("def456", "/bin", "Sample.dll"),
            macro_node("sample", "Sample")
        );
        let manifest = PackageManifest::parse(&manifest_xml(&body)).unwrap();

        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].guid, "abc123");
        assert_eq!(manifest.files[0].ledger_path(), "/media/test.txt");
        assert_eq!(manifest.macros[0].alias, "sample");
        assert_eq!(manifest.macros[0].name, "Sample");
        assert_eq!(manifest.templates[0].alias, "home");
        assert_eq!(manifest.stylesheets[0].name, "site");
        assert_eq!(manifest.control.as_deref(), Some("/usercontrols/setup.ascx"));

        assert_eq!(manifest.actions.len(), 2);
        assert!(manifest.actions[0].runs_at_install());
        assert!(!manifest.actions[0].is_undoable());
        assert!(!manifest.actions[1].runs_at_install());
        assert!(manifest.actions[1].is_undoable());
    }

    #[test]
    fn test_parse_sections() {
        let body = r#"<DataTypes><DataType Name="Picker" /></DataTypes>
            <DocumentTypes><DocumentType /></DocumentTypes>
            <DocumentSet><Home id="1" nodeName="Home" /></DocumentSet>"#;
        let manifest = PackageManifest::parse(&manifest_xml(body)).unwrap();
        assert!(manifest.data_types().is_some());
        assert!(manifest.document_types().is_some());
        assert!(manifest.document_set().is_some());
        assert!(manifest.languages().is_none());
        assert!(manifest.dictionary_items().is_none());
        assert!(manifest.templates_section().is_none());
    }

    #[test]
    fn test_parse_skins() {
        let body = r#"<enableSkins repository="65194810-1f85-11dd-bd0b-0800200c9a66">True</enableSkins>"#;
        let manifest = PackageManifest::parse(&manifest_xml(body)).unwrap();
        assert!(manifest.enable_skins);
        assert_eq!(
            manifest.skin_repository.as_deref(),
            Some("65194810-1f85-11dd-bd0b-0800200c9a66")
        );

        let body = r#"<enableSkins>maybe</enableSkins>"#;
        let err = PackageManifest::parse(&manifest_xml(body)).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_missing_required_node() {
        let xml = manifest_xml("").replace("<website>http://example.com</website>", "");
        let err = PackageManifest::parse(&xml).unwrap_err();
        match err {
            ManifestError::MissingNode(path) => assert_eq!(path, "/umbPackage/info/author/website"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_missing_license_url() {
        let xml = manifest_xml("").replace(r#" url="http://opensource.org/licenses/MIT""#, "");
        let err = PackageManifest::parse(&xml).unwrap_err();
        assert!(matches!(err, ManifestError::MissingNode(_)));
    }

    #[test]
    fn test_parse_invalid_requirement() {
        let xml = manifest_xml("").replace("<minor>1</minor>", "<minor>one</minor>");
        let err = PackageManifest::parse(&xml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidValue { ref value, .. } if value == "one"));
    }

    #[test]
    fn test_parse_wrong_root() {
        let err = PackageManifest::parse("<package />").unwrap_err();
        assert!(matches!(err, ManifestError::MissingNode(_)));
    }

    #[test]
    fn test_load_missing_manifest_fails() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/tmp/pkg/package.xml")))
            .returning(|_| false);

        let err = PackageManifest::load(&runtime, Path::new("/tmp/pkg")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManifestError>(),
            Some(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_reads_manifest_file() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/tmp/pkg/package.xml")))
            .returning(|_| Ok(manifest_xml("")));

        let manifest = PackageManifest::load(&runtime, Path::new("/tmp/pkg")).unwrap();
        assert_eq!(manifest.name, "Sample Package");
    }

    #[test]
    fn test_load_malformed_manifest_fails() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("<umbPackage><info>".into()));

        let err = PackageManifest::load(&runtime, Path::new("/tmp/pkg")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ManifestError>(),
            Some(ManifestError::Malformed(_))
        ));
    }
}
