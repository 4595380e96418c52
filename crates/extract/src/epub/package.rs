//! OPF package document model.
//!
//! Only the subset of the package the catalog cares about is retained:
//! Dublin Core metadata, `<meta>` elements in both their EPUB 2
//! (`name`/`content`) and EPUB 3 (`property`/`refines`/element text) forms,
//! the manifest, and the spine reading order.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use roxmltree::{Document, Node};

#[derive(Debug, Default)]
pub(crate) struct Package {
    pub(crate) titles: Vec<String>,
    pub(crate) creators: Vec<String>,
    pub(crate) subjects: Vec<String>,
    pub(crate) description: String,
    pub(crate) language: String,
    pub(crate) publisher: String,
    pub(crate) date: String,
    pub(crate) metas: Vec<Meta>,
    pub(crate) manifest: Vec<Item>,
    /// Manifest item ids in reading order.
    pub(crate) spine: Vec<String>,
}

/// A `<meta>` element. EPUB 2 fills `name`/`content`; EPUB 3 fills
/// `property` (plus `refines`/`id` where applicable) with the value in the
/// element text.
#[derive(Debug, Default, Clone)]
pub(crate) struct Meta {
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) property: String,
    pub(crate) refines: String,
    pub(crate) id: String,
    pub(crate) value: String,
}

/// A manifest `<item>` entry.
#[derive(Debug, Default, Clone)]
pub(crate) struct Item {
    pub(crate) id: String,
    pub(crate) href: String,
    pub(crate) media_type: String,
    pub(crate) properties: String,
}

impl Package {
    pub(crate) fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml).or_raise(|| ErrorKind::Package("package document is not well-formed XML"))?;
        let mut package = Self::default();
        for node in doc.root_element().children().filter(Node::is_element) {
            match node.tag_name().name() {
                "metadata" => package.read_metadata(node),
                "manifest" => package.read_manifest(node),
                "spine" => package.read_spine(node),
                _ => {}
            }
        }
        Ok(package)
    }

    fn read_metadata(&mut self, metadata: Node) {
        for node in metadata.children().filter(Node::is_element) {
            let text = || node.text().unwrap_or_default().trim().to_string();
            let attr = |name: &str| node.attribute(name).unwrap_or_default().to_string();
            // Tag names are matched without their namespace prefix, so both
            // `dc:title` and a default-namespaced `title` land here.
            match node.tag_name().name() {
                "title" => self.titles.push(text()),
                "creator" => self.creators.push(text()),
                "subject" => {
                    let subject = text();
                    if !subject.is_empty() {
                        self.subjects.push(subject);
                    }
                }
                "description" => {
                    if self.description.is_empty() {
                        self.description = text();
                    }
                }
                "language" => {
                    if self.language.is_empty() {
                        self.language = text();
                    }
                }
                "publisher" => {
                    if self.publisher.is_empty() {
                        self.publisher = text();
                    }
                }
                "date" => {
                    if self.date.is_empty() {
                        self.date = text();
                    }
                }
                "meta" => self.metas.push(Meta {
                    name: attr("name"),
                    content: attr("content"),
                    property: attr("property"),
                    refines: attr("refines"),
                    id: attr("id"),
                    value: text(),
                }),
                _ => {}
            }
        }
    }

    fn read_manifest(&mut self, manifest: Node) {
        for node in manifest.children().filter(|n| n.is_element() && n.tag_name().name() == "item") {
            let attr = |name: &str| node.attribute(name).unwrap_or_default().to_string();
            self.manifest.push(Item {
                id: attr("id"),
                href: attr("href"),
                media_type: attr("media-type"),
                properties: attr("properties"),
            });
        }
    }

    fn read_spine(&mut self, spine: Node) {
        for node in spine.children().filter(|n| n.is_element() && n.tag_name().name() == "itemref") {
            if let Some(idref) = node.attribute("idref") {
                self.spine.push(idref.to_string());
            }
        }
    }

    /// First declared title, if any and non-empty.
    pub(crate) fn title(&self) -> Option<&str> {
        self.titles.first().map(String::as_str).filter(|t| !t.is_empty())
    }

    /// Series name and index derived from the package metadata.
    ///
    /// Calibre's legacy meta tags take precedence over an EPUB 3
    /// collection; either source may leave the index empty.
    pub(crate) fn series(&self) -> Option<(String, String)> {
        if let Some(name) = self.meta_content("calibre:series") {
            let index = self.meta_content("calibre:series_index").unwrap_or_default();
            return Some((name, index));
        }
        self.collection_series()
    }

    /// Content of the first EPUB 2 style `<meta name=… content=…>` with the
    /// given name (case-insensitive) and a non-empty content attribute.
    pub(crate) fn meta_content(&self, name: &str) -> Option<String> {
        self.metas
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name) && !m.content.is_empty())
            .map(|m| m.content.clone())
    }

    fn collection_series(&self) -> Option<(String, String)> {
        for meta in &self.metas {
            if meta.property != "belongs-to-collection" || meta.id.is_empty() || meta.value.is_empty() {
                continue;
            }
            let refines = format!("#{}", meta.id);
            // A collection explicitly typed as `set` is an anthology, not a
            // series; any other type (or none) counts as a series.
            let is_set = self
                .metas
                .iter()
                .any(|m| m.property == "collection-type" && m.refines == refines && m.value.trim() == "set");
            if is_set {
                continue;
            }
            let index = self
                .metas
                .iter()
                .find(|m| m.property == "group-position" && m.refines == refines)
                .map(|m| m.value.clone())
                .unwrap_or_default();
            return Some((meta.value.clone(), index));
        }
        None
    }

    /// The manifest item holding the cover image: an item with a
    /// `cover-image` property wins; otherwise the EPUB 2
    /// `<meta name="cover">` item reference is honored.
    pub(crate) fn cover_item(&self) -> Option<&Item> {
        if let Some(item) = self.manifest.iter().find(|i| i.properties.contains("cover-image")) {
            return Some(item);
        }
        let id = self.meta_content("cover")?;
        self.item_by_id(&id)
    }

    pub(crate) fn item_by_id(&self, id: &str) -> Option<&Item> {
        self.manifest.iter().find(|i| i.id == id)
    }
}
