use model::ResourceContainer;
use thiserror::Error;

/// Errors produced by the sitemap codec.
///
/// Structural failures are never silently recovered; the two mode-mismatch
/// variants carry the fully parsed document so a caller expecting the other
/// root form can switch modes without reparsing.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The root element is neither `urlset` nor `sitemapindex`.
    #[error("unexpected root element '{0}': expected urlset or sitemapindex")]
    UnexpectedRoot(String),
    /// A sitemapindex arrived where a plain sitemap was required.
    #[error("got sitemapindex when expecting sitemap")]
    IndexWhenExpectingSitemap {
        /// The parsed index document, for callers that recover by switching
        /// modes.
        document: Box<ResourceContainer>,
    },
    /// A plain sitemap arrived where a sitemapindex was required.
    #[error("got sitemap when expecting sitemapindex")]
    SitemapWhenExpectingIndex {
        /// The parsed sitemap document.
        document: Box<ResourceContainer>,
    },
    /// An entry did not contain exactly one `<loc>`.
    #[error("entry has {0} <loc> elements: exactly one required")]
    LocCount(usize),
    /// An entry's `<loc>` had no text content.
    #[error("entry <loc> is empty")]
    EmptyLoc,
    /// An entry contained more than one `<lastmod>`/`<expires>`.
    #[error("entry has more than one <lastmod> element")]
    DuplicateLastmod,
    /// More than one `<rs:md>` appeared at the same level.
    #[error("more than one <rs:md> element at the same level")]
    DuplicateMd,
    /// An `<rs:ln>` lacked a required attribute.
    #[error("<rs:ln> missing required '{0}' attribute")]
    LnMissingAttr(&'static str),
    /// A `length` attribute was not a non-negative integer.
    #[error("non-numeric length attribute '{0}'")]
    InvalidLength(String),
    /// An `<rs:ln>` `pri` attribute was outside `1..=999999`.
    #[error("<rs:ln> pri '{0}' outside 1..=999999")]
    InvalidPri(String),
    /// A typed parse required a capability the document does not declare.
    #[error("document declares no capability; expected '{expected}'")]
    MissingCapability {
        /// Capability the caller required.
        expected: &'static str,
    },
    /// A typed parse found a contradicting capability declaration.
    #[error("document capability '{found}' does not match expected '{expected}'")]
    CapabilityMismatch {
        /// Capability declared by the document.
        found: String,
        /// Capability the caller required.
        expected: &'static str,
    },
    /// A `hash` attribute failed to decode.
    #[error("invalid hash attribute: {0}")]
    Hash(#[from] digests::DigestError),
    /// A model-level failure while building the collection (invalid
    /// datetime, duplicate URI in a unique-keyed document, unknown change
    /// token).
    #[error(transparent)]
    Model(#[from] model::ModelError),
}
