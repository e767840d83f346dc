//! Zone manifest loading.
//!
//! A manifest names the namespaces to create for an identity and the
//! ordered list of mounts to perform inside them:
//!
//! ```xml
//! <bundle-manifest>
//!   <namespaces>
//!     <mount/>
//!     <uts/>
//!   </namespaces>
//!   <mounts>
//!     <mount>
//!       <source>/srv/zones/%USER%</source>
//!       <destination create="dir">%HOME%</destination>
//!       <type>none</type>
//!       <option>bind</option>
//!       <optional/>
//!     </mount>
//!   </mounts>
//! </bundle-manifest>
//! ```
//!
//! `<identity>.xml` is looked up in the manifest directory first, then
//! `owner.xml`.

use std::path::{Path, PathBuf};

use krate_common::constants::{FALLBACK_MANIFEST, MANIFEST_EXTENSION};
use krate_common::error::{KrateError, Result};
use krate_common::types::{NamespaceKind, NamespaceSet};
use roxmltree::{Document, Node};

use crate::filesystem::mount::CreatePolicy;

const ROOT_ELEMENT: &str = "bundle-manifest";

/// One mount from the `mounts` section, with unexpanded path templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Source path template.
    pub source: String,
    /// How a missing source is created.
    pub source_create: CreatePolicy,
    /// Destination path template.
    pub destination: String,
    /// How a missing destination is created.
    pub destination_create: CreatePolicy,
    /// Filesystem type; empty when the manifest omits it.
    pub fstype: String,
    /// Raw mount option string.
    pub options: String,
    /// Whether a failed mount is tolerated.
    pub optional: bool,
}

/// Namespaces and mounts provisioned for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// File the manifest was read from.
    pub path: PathBuf,
    /// Namespaces to create.
    pub namespaces: NamespaceSet,
    /// Mounts to perform, in order.
    pub mounts: Vec<MountEntry>,
}

/// Returns the manifest file used for `identity`.
#[must_use]
pub fn manifest_path(manifest_dir: &Path, identity: &str) -> PathBuf {
    let own = manifest_dir.join(format!("{identity}.{MANIFEST_EXTENSION}"));
    if own.exists() {
        own
    } else {
        manifest_dir.join(FALLBACK_MANIFEST)
    }
}

/// Loads the manifest for `identity` from `manifest_dir`.
///
/// # Errors
///
/// Returns a resource error if neither the identity manifest nor the
/// fallback can be read, or a manifest error if the document is invalid.
pub fn load(manifest_dir: &Path, identity: &str) -> Result<Manifest> {
    let path = manifest_path(manifest_dir, identity);
    let text = std::fs::read_to_string(&path).map_err(|e| KrateError::Resource {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(identity, path = %path.display(), "loading manifest");
    Manifest::parse(&text, path)
}

impl Manifest {
    /// Parses manifest XML read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KrateError::Manifest`] if the text is not well-formed XML
    /// or does not follow the manifest schema.
    pub fn parse(text: &str, path: PathBuf) -> Result<Self> {
        let document = Document::parse(text).map_err(|e| KrateError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::from_document(&document, path)
    }

    /// Extracts the manifest from an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`KrateError::Manifest`] if the root element is wrong or a
    /// mount entry lacks its source or destination.
    pub fn from_document(document: &Document<'_>, path: PathBuf) -> Result<Self> {
        let invalid = |message: String| KrateError::Manifest {
            path: path.clone(),
            message,
        };

        let root = document.root_element();
        if root.tag_name().name() != ROOT_ELEMENT {
            return Err(invalid(format!(
                "root element is <{}>, expected <{ROOT_ELEMENT}>",
                root.tag_name().name()
            )));
        }

        let mut namespaces = NamespaceSet::new();
        for section in children(root, "namespaces") {
            for node in section.children().filter(Node::is_element) {
                let name = node.tag_name().name();
                match NamespaceKind::from_manifest_name(name) {
                    Some(kind) => {
                        let _ = namespaces.insert(kind);
                    }
                    None => tracing::warn!(
                        path = %path.display(),
                        namespace = name,
                        "ignoring unknown namespace"
                    ),
                }
            }
        }

        let mut mounts = Vec::new();
        for section in children(root, "mounts") {
            for (index, node) in children(section, "mount").enumerate() {
                let entry =
                    parse_mount(node).map_err(|m| invalid(format!("mount #{index}: {m}")))?;
                mounts.push(entry);
            }
        }

        Ok(Self {
            path,
            namespaces,
            mounts,
        })
    }
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn text_of(node: Node<'_, '_>, name: &'static str) -> Option<String> {
    children(node, name)
        .next()
        .map(|n| n.text().unwrap_or_default().trim().to_string())
}

fn create_of(node: Node<'_, '_>, name: &'static str) -> std::result::Result<CreatePolicy, String> {
    let Some(value) = children(node, name).next().and_then(|n| n.attribute("create")) else {
        return Ok(CreatePolicy::None);
    };
    CreatePolicy::from_attribute(value)
        .ok_or_else(|| format!("<{name}> has invalid create=\"{value}\""))
}

fn parse_mount(node: Node<'_, '_>) -> std::result::Result<MountEntry, String> {
    let source = text_of(node, "source")
        .filter(|s| !s.is_empty())
        .ok_or("missing <source>")?;
    let destination = text_of(node, "destination")
        .filter(|s| !s.is_empty())
        .ok_or("missing <destination>")?;

    Ok(MountEntry {
        source,
        source_create: create_of(node, "source")?,
        destination,
        destination_create: create_of(node, "destination")?,
        fstype: text_of(node, "type").unwrap_or_default(),
        options: text_of(node, "option").unwrap_or_default(),
        optional: children(node, "optional").next().is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = r#"
<bundle-manifest>
  <namespaces>
    <mount/>
    <uts/>
    <bogus/>
  </namespaces>
  <mounts>
    <mount>
      <source>/srv/zoneA</source>
      <destination create="dir">/home/%USER%</destination>
      <type>none</type>
      <option>bind</option>
    </mount>
    <mount>
      <source>tmpfs</source>
      <destination>%RUN%</destination>
      <type>tmpfs</type>
      <option>nosuid,mode=0700</option>
      <optional/>
    </mount>
  </mounts>
</bundle-manifest>
"#;

    fn parse(text: &str) -> Result<Manifest> {
        Manifest::parse(text, PathBuf::from("test.xml"))
    }

    #[test]
    fn parses_namespaces_and_ignores_unknown() {
        let manifest = parse(ALICE).expect("parse");
        let kinds: Vec<_> = manifest.namespaces.iter().collect();
        assert_eq!(kinds, vec![NamespaceKind::Uts, NamespaceKind::Mount]);
    }

    #[test]
    fn parses_mounts_in_order() {
        let manifest = parse(ALICE).expect("parse");
        assert_eq!(manifest.mounts.len(), 2);

        let first = &manifest.mounts[0];
        assert_eq!(first.source, "/srv/zoneA");
        assert_eq!(first.destination, "/home/%USER%");
        assert_eq!(first.destination_create, CreatePolicy::Dir);
        assert_eq!(first.source_create, CreatePolicy::None);
        assert_eq!(first.fstype, "none");
        assert_eq!(first.options, "bind");
        assert!(!first.optional);

        let second = &manifest.mounts[1];
        assert_eq!(second.fstype, "tmpfs");
        assert_eq!(second.options, "nosuid,mode=0700");
        assert!(second.optional);
    }

    #[test]
    fn empty_manifest_has_no_work() {
        let manifest = parse("<bundle-manifest/>").expect("parse");
        assert!(manifest.namespaces.is_empty());
        assert!(manifest.mounts.is_empty());
    }

    #[test]
    fn wrong_root_is_rejected() {
        assert!(matches!(
            parse("<manifest/>"),
            Err(KrateError::Manifest { .. })
        ));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(matches!(
            parse("<bundle-manifest>"),
            Err(KrateError::Manifest { .. })
        ));
    }

    #[test]
    fn mount_without_destination_is_rejected() {
        let text = "<bundle-manifest><mounts><mount><source>/a</source></mount></mounts></bundle-manifest>";
        let err = parse(text).expect_err("should fail");
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn invalid_create_attribute_is_rejected() {
        let text = r#"<bundle-manifest><mounts><mount>
            <source>/a</source><destination create="fifo">/b</destination>
        </mount></mounts></bundle-manifest>"#;
        assert!(parse(text).is_err());
    }

    #[test]
    fn identity_manifest_wins_over_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("owner.xml"), "<bundle-manifest/>").expect("owner");
        std::fs::write(dir.path().join("alice.xml"), ALICE).expect("alice");

        let manifest = load(dir.path(), "alice").expect("load");
        assert_eq!(manifest.path, dir.path().join("alice.xml"));
        assert_eq!(manifest.mounts.len(), 2);
    }

    #[test]
    fn missing_identity_manifest_falls_back_to_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("owner.xml"), "<bundle-manifest/>").expect("owner");

        let manifest = load(dir.path(), "bob").expect("load");
        assert_eq!(manifest.path, dir.path().join("owner.xml"));
    }

    #[test]
    fn no_manifest_at_all_is_a_resource_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load(dir.path(), "bob"),
            Err(KrateError::Resource { .. })
        ));
    }
}
