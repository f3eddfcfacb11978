//! Bidirectional mapping between collections and the sitemap XML dialect.

use std::path::PathBuf;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use digests::{encode_hash_attr, parse_hash_attr};
use model::w3c::{format_w3c, parse_w3c};
use model::{Capability, Link, Resource, ResourceContainer};

use crate::error::SitemapError;

/// Default XML namespace of the sitemap protocol.
pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
/// Namespace of the ResourceSync extension elements, conventionally bound to
/// the `rs` prefix.
pub const RS_NS: &str = "http://www.openarchives.org/rs/terms/";

/// Root form of a sitemap document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentKind {
    /// `<urlset>`: a plain sitemap listing resources.
    Sitemap,
    /// `<sitemapindex>`: an index listing component sitemap locations.
    SitemapIndex,
}

impl DocumentKind {
    const fn root_tag(self) -> &'static str {
        match self {
            DocumentKind::Sitemap => "urlset",
            DocumentKind::SitemapIndex => "sitemapindex",
        }
    }

    const fn item_tag(self) -> &'static str {
        match self {
            DocumentKind::Sitemap => "url",
            DocumentKind::SitemapIndex => "sitemap",
        }
    }
}

/// Result of parsing one document: the collection plus the root form it
/// arrived in.
#[derive(Debug)]
pub struct Parsed {
    /// The parsed collection.
    pub container: ResourceContainer,
    /// Root form of the document.
    pub kind: DocumentKind,
}

/// Serializer/parser for the sitemap dialect.
///
/// The codec is the loose tier of the two-tier strictness contract: it
/// enforces every structural rule (element counts, required attributes,
/// numeric ranges) but only warns when capability declarations disagree
/// with a caller hint. [`Codec::parse_typed`] adds the strict per-kind
/// capability requirement on top.
#[derive(Clone, Copy, Debug, Default)]
pub struct Codec {
    pretty: bool,
}

impl Codec {
    /// Creates a codec with compact output.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Toggles pretty-printed (indented) output. Formatting only: parse
    /// results are identical either way.
    #[must_use]
    pub const fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Serializes a collection as a sitemap or sitemapindex document.
    ///
    /// # Errors
    ///
    /// Returns [`SitemapError::Xml`] when the underlying writer fails.
    pub fn write(
        &self,
        collection: &ResourceContainer,
        kind: DocumentKind,
    ) -> Result<String, SitemapError> {
        let mut writer = if self.pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(quick_xml::Error::from)?;

        let mut root = BytesStart::new(kind.root_tag());
        root.push_attribute(("xmlns", SITEMAP_NS));
        root.push_attribute(("xmlns:rs", RS_NS));
        if collection.capability().records_changes() {
            root.push_attribute(("rs:type", collection.capability().as_str()));
        }
        writer
            .write_event(Event::Start(root))
            .map_err(quick_xml::Error::from)?;

        if !collection.md().is_empty() {
            let md = collection.md();
            let mut element = BytesStart::new("rs:md");
            if let Some(capability) = &md.capability {
                element.push_attribute(("capability", capability.as_str()));
            }
            for (name, value) in [
                ("from", md.from),
                ("until", md.until),
                ("at", md.at),
                ("completed", md.completed),
            ] {
                if let Some(timestamp) = value {
                    element.push_attribute((name, format_w3c(timestamp).as_str()));
                }
            }
            writer
                .write_event(Event::Empty(element))
                .map_err(quick_xml::Error::from)?;
        }
        for link in collection.ln() {
            write_ln(&mut writer, link)?;
        }
        for resource in collection.iter() {
            write_resource(&mut writer, resource, kind.item_tag())?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(kind.root_tag())))
            .map_err(quick_xml::Error::from)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Parses a document, accepting either root form.
    ///
    /// `hint` pre-selects the document kind (and thereby the storage
    /// discipline); without it the root `rs:type` attribute and then the
    /// declared `capability` decide, defaulting to a resource list. A hint
    /// that contradicts the document's own declaration is logged, not
    /// fatal — the strict check belongs to [`Codec::parse_typed`].
    ///
    /// # Errors
    ///
    /// Returns [`SitemapError`] on malformed XML or any structural rule
    /// violation.
    pub fn parse(&self, xml: &str, hint: Option<Capability>) -> Result<Parsed, SitemapError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut root_type: Option<String> = None;
        let (kind, root_open) = loop {
            match reader.read_event().map_err(quick_xml::Error::from)? {
                Event::Start(element) => {
                    let kind = root_kind(&element)?;
                    root_type = root_type_attr(&element)?;
                    break (kind, true);
                }
                Event::Empty(element) => {
                    let kind = root_kind(&element)?;
                    root_type = root_type_attr(&element)?;
                    break (kind, false);
                }
                Event::Eof => return Err(SitemapError::UnexpectedRoot(String::new())),
                _ => {}
            }
        };

        let mut doc_md: Option<MdAttrs> = None;
        let mut doc_ln: Vec<Link> = Vec::new();
        let mut items: Vec<ItemRecord> = Vec::new();

        if root_open {
            let item_tag = kind.item_tag().as_bytes();
            loop {
                match reader.read_event().map_err(quick_xml::Error::from)? {
                    Event::Start(element) => match element.local_name().as_ref() {
                        tag if tag == item_tag => {
                            items.push(parse_item(&mut reader, item_tag)?);
                        }
                        b"md" => {
                            if doc_md.is_some() {
                                return Err(SitemapError::DuplicateMd);
                            }
                            doc_md = Some(parse_md_attrs(&element)?);
                            reader
                                .read_to_end(element.name())
                                .map_err(quick_xml::Error::from)?;
                        }
                        b"ln" => {
                            doc_ln.push(parse_ln(&element)?);
                            reader
                                .read_to_end(element.name())
                                .map_err(quick_xml::Error::from)?;
                        }
                        other => {
                            debug!(
                                element = %String::from_utf8_lossy(other),
                                "skipping unknown element"
                            );
                            reader
                                .read_to_end(element.name())
                                .map_err(quick_xml::Error::from)?;
                        }
                    },
                    Event::Empty(element) => match element.local_name().as_ref() {
                        tag if tag == item_tag => return Err(SitemapError::LocCount(0)),
                        b"md" => {
                            if doc_md.is_some() {
                                return Err(SitemapError::DuplicateMd);
                            }
                            doc_md = Some(parse_md_attrs(&element)?);
                        }
                        b"ln" => doc_ln.push(parse_ln(&element)?),
                        other => {
                            debug!(
                                element = %String::from_utf8_lossy(other),
                                "skipping unknown element"
                            );
                        }
                    },
                    Event::End(_) | Event::Eof => break,
                    _ => {}
                }
            }
        }

        let declared = doc_md
            .as_ref()
            .and_then(|md| md.capability.as_deref())
            .and_then(|name| match name.parse::<Capability>() {
                Ok(capability) => Some(capability),
                Err(_) => {
                    debug!(capability = name, "unrecognized capability declaration");
                    None
                }
            });
        let from_type = root_type
            .as_deref()
            .and_then(|name| name.parse::<Capability>().ok());
        if let (Some(hinted), Some(declared)) = (hint, declared)
            && hinted != declared
        {
            warn!(
                hint = hinted.as_str(),
                declared = declared.as_str(),
                "caller hint disagrees with document capability"
            );
        }
        if let (Some(from_type), Some(declared)) = (from_type, declared)
            && from_type != declared
        {
            warn!(
                root_type = from_type.as_str(),
                declared = declared.as_str(),
                "root rs:type disagrees with document capability"
            );
        }
        let capability = hint
            .or(from_type)
            .or(declared)
            .unwrap_or(Capability::ResourceList);

        let mut container = ResourceContainer::new_unstamped(capability);
        if let Some(md) = doc_md {
            let metadata = container.md_mut();
            metadata.capability = md.capability;
            metadata.from = md.from.as_deref().map(parse_w3c).transpose()?;
            metadata.until = md.until.as_deref().map(parse_w3c).transpose()?;
            metadata.at = md.at.as_deref().map(parse_w3c).transpose()?;
            metadata.completed = md.completed.as_deref().map(parse_w3c).transpose()?;
        }
        for link in doc_ln {
            container.add_ln(link);
        }
        for item in items {
            container.add(build_resource(item)?)?;
        }
        Ok(Parsed { container, kind })
    }

    /// Parses a document that must arrive in the given root form.
    ///
    /// # Errors
    ///
    /// On the wrong root form, returns
    /// [`SitemapError::IndexWhenExpectingSitemap`] or
    /// [`SitemapError::SitemapWhenExpectingIndex`] carrying the parsed
    /// document, so the caller can recover by switching modes.
    pub fn parse_expecting(
        &self,
        xml: &str,
        hint: Option<Capability>,
        expect: DocumentKind,
    ) -> Result<ResourceContainer, SitemapError> {
        let parsed = self.parse(xml, hint)?;
        match (expect, parsed.kind) {
            (DocumentKind::Sitemap, DocumentKind::SitemapIndex) => {
                Err(SitemapError::IndexWhenExpectingSitemap {
                    document: Box::new(parsed.container),
                })
            }
            (DocumentKind::SitemapIndex, DocumentKind::Sitemap) => {
                Err(SitemapError::SitemapWhenExpectingIndex {
                    document: Box::new(parsed.container),
                })
            }
            _ => Ok(parsed.container),
        }
    }

    /// Strict-tier parse for one document kind.
    ///
    /// # Errors
    ///
    /// In addition to the structural rules, kinds for which
    /// [`Capability::requires_capability_md`] holds reject documents whose
    /// `rs:md` lacks a matching `capability` attribute.
    pub fn parse_typed(
        &self,
        xml: &str,
        capability: Capability,
    ) -> Result<ResourceContainer, SitemapError> {
        let container = self.parse_expecting(xml, Some(capability), DocumentKind::Sitemap)?;
        if capability.requires_capability_md() {
            match container.md().capability.as_deref() {
                None => {
                    return Err(SitemapError::MissingCapability {
                        expected: capability.as_str(),
                    });
                }
                Some(found) if found != capability.as_str() => {
                    return Err(SitemapError::CapabilityMismatch {
                        found: found.to_string(),
                        expected: capability.as_str(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(container)
    }
}

/// Raw `rs:md` attributes before conversion into model fields.
#[derive(Default)]
struct MdAttrs {
    capability: Option<String>,
    from: Option<String>,
    until: Option<String>,
    at: Option<String>,
    completed: Option<String>,
    change: Option<String>,
    hash: Option<String>,
    length: Option<String>,
    path: Option<String>,
}

struct ItemRecord {
    loc: Option<String>,
    lastmod: Option<String>,
    md: Option<MdAttrs>,
    ln: Vec<Link>,
}

fn parse_item(reader: &mut Reader<&[u8]>, item_tag: &[u8]) -> Result<ItemRecord, SitemapError> {
    let mut loc_count = 0usize;
    let mut lastmod_count = 0usize;
    let mut record = ItemRecord {
        loc: None,
        lastmod: None,
        md: None,
        ln: Vec::new(),
    };
    loop {
        match reader.read_event().map_err(quick_xml::Error::from)? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"loc" => {
                    loc_count += 1;
                    let text = read_element_text(reader)?;
                    if !text.is_empty() {
                        record.loc = Some(text);
                    }
                }
                b"lastmod" | b"expires" => {
                    lastmod_count += 1;
                    let text = read_element_text(reader)?;
                    if !text.is_empty() {
                        record.lastmod = Some(text);
                    }
                }
                b"md" => {
                    if record.md.is_some() {
                        return Err(SitemapError::DuplicateMd);
                    }
                    record.md = Some(parse_md_attrs(&element)?);
                    reader
                        .read_to_end(element.name())
                        .map_err(quick_xml::Error::from)?;
                }
                b"ln" => {
                    record.ln.push(parse_ln(&element)?);
                    reader
                        .read_to_end(element.name())
                        .map_err(quick_xml::Error::from)?;
                }
                other => {
                    debug!(
                        element = %String::from_utf8_lossy(other),
                        "skipping unknown entry element"
                    );
                    reader
                        .read_to_end(element.name())
                        .map_err(quick_xml::Error::from)?;
                }
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"loc" => loc_count += 1,
                b"lastmod" | b"expires" => lastmod_count += 1,
                b"md" => {
                    if record.md.is_some() {
                        return Err(SitemapError::DuplicateMd);
                    }
                    record.md = Some(parse_md_attrs(&element)?);
                }
                b"ln" => record.ln.push(parse_ln(&element)?),
                other => {
                    debug!(
                        element = %String::from_utf8_lossy(other),
                        "skipping unknown entry element"
                    );
                }
            },
            Event::End(element) if element.local_name().as_ref() == item_tag => break,
            Event::Eof => break,
            _ => {}
        }
    }
    if loc_count != 1 {
        return Err(SitemapError::LocCount(loc_count));
    }
    if record.loc.is_none() {
        return Err(SitemapError::EmptyLoc);
    }
    if lastmod_count > 1 {
        return Err(SitemapError::DuplicateLastmod);
    }
    Ok(record)
}

fn build_resource(item: ItemRecord) -> Result<Resource, SitemapError> {
    let loc = item.loc.ok_or(SitemapError::EmptyLoc)?;
    let mut resource = Resource::new(loc)?;
    if let Some(lastmod) = item.lastmod {
        resource = resource.with_lastmod(&lastmod)?;
    }
    if let Some(md) = item.md {
        if let Some(capability) = md.capability {
            resource.set_capability(Some(capability));
        }
        if let Some(change) = md.change {
            resource.set_change(Some(change.parse()?));
        }
        if let Some(hash) = md.hash {
            let values = parse_hash_attr(&hash)?;
            resource.set_md5(values.md5);
            resource.set_sha1(values.sha1);
            resource.set_sha256(values.sha256);
        }
        if let Some(length) = md.length {
            let parsed = length
                .parse::<u64>()
                .map_err(|_| SitemapError::InvalidLength(length.clone()))?;
            resource.set_length(Some(parsed));
        }
        if let Some(path) = md.path {
            resource.set_path(Some(PathBuf::from(path)));
        }
    }
    for link in item.ln {
        resource.add_link(link);
    }
    Ok(resource)
}

fn parse_md_attrs(element: &BytesStart<'_>) -> Result<MdAttrs, SitemapError> {
    let mut md = MdAttrs::default();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let value = attr_value(&attribute)?;
        match attribute.key.local_name().as_ref() {
            b"capability" => md.capability = Some(value),
            b"from" => md.from = Some(value),
            b"until" => md.until = Some(value),
            b"at" => md.at = Some(value),
            b"completed" => md.completed = Some(value),
            b"change" => md.change = Some(value),
            b"hash" => md.hash = Some(value),
            b"length" => md.length = Some(value),
            b"path" => md.path = Some(value),
            other => {
                debug!(
                    attribute = %String::from_utf8_lossy(other),
                    "ignoring unknown rs:md attribute"
                );
            }
        }
    }
    Ok(md)
}

fn parse_ln(element: &BytesStart<'_>) -> Result<Link, SitemapError> {
    let mut rel: Option<String> = None;
    let mut href: Option<String> = None;
    let mut extra: Vec<(String, String)> = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let value = attr_value(&attribute)?;
        match attribute.key.local_name().as_ref() {
            b"rel" => rel = Some(value),
            b"href" => href = Some(value),
            b"pri" => {
                let valid = value
                    .parse::<u32>()
                    .is_ok_and(|pri| (1..=999_999).contains(&pri));
                if !valid {
                    return Err(SitemapError::InvalidPri(value));
                }
                extra.push(("pri".to_string(), value));
            }
            b"length" => {
                if value.parse::<u64>().is_err() {
                    return Err(SitemapError::InvalidLength(value));
                }
                extra.push(("length".to_string(), value));
            }
            other => extra.push((String::from_utf8_lossy(other).into_owned(), value)),
        }
    }
    let rel = rel.ok_or(SitemapError::LnMissingAttr("rel"))?;
    let href = href.ok_or(SitemapError::LnMissingAttr("href"))?;
    let mut link = Link::new(rel, href);
    for (key, value) in extra {
        link = link.with_attribute(key, value);
    }
    Ok(link)
}

fn write_resource<W: std::io::Write>(
    writer: &mut Writer<W>,
    resource: &Resource,
    item_tag: &str,
) -> Result<(), SitemapError> {
    writer
        .write_event(Event::Start(BytesStart::new(item_tag)))
        .map_err(quick_xml::Error::from)?;
    write_text_element(writer, "loc", resource.uri())?;
    if let Some(lastmod) = resource.lastmod() {
        write_text_element(writer, "lastmod", &lastmod)?;
    }

    let hash = encode_hash_attr(resource.md5(), resource.sha1(), resource.sha256());
    let has_md = resource.capability().is_some()
        || resource.change().is_some()
        || hash.is_some()
        || resource.length().is_some()
        || resource.path().is_some();
    if has_md {
        let mut element = BytesStart::new("rs:md");
        if let Some(capability) = resource.capability() {
            element.push_attribute(("capability", capability));
        }
        if let Some(change) = resource.change() {
            element.push_attribute(("change", change.as_str()));
        }
        if let Some(hash) = &hash {
            element.push_attribute(("hash", hash.as_str()));
        }
        if let Some(length) = resource.length() {
            element.push_attribute(("length", length.to_string().as_str()));
        }
        if let Some(path) = resource.path() {
            element.push_attribute(("path", path.to_string_lossy().as_ref()));
        }
        writer
            .write_event(Event::Empty(element))
            .map_err(quick_xml::Error::from)?;
    }
    for link in resource.links() {
        write_ln(writer, link)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(item_tag)))
        .map_err(quick_xml::Error::from)?;
    Ok(())
}

fn write_ln<W: std::io::Write>(writer: &mut Writer<W>, link: &Link) -> Result<(), SitemapError> {
    let mut element = BytesStart::new("rs:ln");
    element.push_attribute(("rel", link.rel()));
    element.push_attribute(("href", link.href()));
    for (key, value) in link.extra() {
        element.push_attribute((key.as_str(), value.as_str()));
    }
    writer
        .write_event(Event::Empty(element))
        .map_err(quick_xml::Error::from)?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<(), SitemapError> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(quick_xml::Error::from)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(quick_xml::Error::from)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(quick_xml::Error::from)?;
    Ok(())
}

/// Concatenated, trimmed text content of the element whose `Start` event
/// was just consumed; the reader is left past the matching `End`.
fn read_element_text(reader: &mut Reader<&[u8]>) -> Result<String, SitemapError> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(quick_xml::Error::from)? {
            Event::Text(chunk) => {
                text.push_str(&chunk.unescape().map_err(quick_xml::Error::from)?);
            }
            Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text.trim().to_string())
}

fn attr_value(attribute: &Attribute<'_>) -> Result<String, SitemapError> {
    let value = attribute
        .unescape_value()
        .map_err(quick_xml::Error::from)?;
    Ok(value.into_owned())
}

fn root_kind(element: &BytesStart<'_>) -> Result<DocumentKind, SitemapError> {
    match element.local_name().as_ref() {
        b"urlset" => Ok(DocumentKind::Sitemap),
        b"sitemapindex" => Ok(DocumentKind::SitemapIndex),
        other => Err(SitemapError::UnexpectedRoot(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

fn root_type_attr(element: &BytesStart<'_>) -> Result<Option<String>, SitemapError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        if attribute.key.as_ref() == b"rs:type" {
            return Ok(Some(attr_value(&attribute)?));
        }
    }
    Ok(None)
}
