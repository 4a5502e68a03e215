use scraper::{ElementRef, Html};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionScope {
    /// No locator was configured.
    WholeDocument,
    /// The locator matched an element.
    Located,
    /// The locator matched nothing; the whole document is monitored instead.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub content: String,
    pub scope: ExtractionScope,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, locator: &str) -> ExtractedContent;
}

/// Parsed form of a locator expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    Class(&'a str),
    Id(&'a str),
    Tag(&'a str),
}

impl<'a> Locator<'a> {
    /// `.name` selects by class, `#name` by id, anything else by tag name.
    /// Returns `None` for an empty expression.
    pub fn parse(expression: &'a str) -> Option<Self> {
        let expression = expression.trim();
        if let Some(class) = expression.strip_prefix('.') {
            return (!class.is_empty()).then_some(Locator::Class(class));
        }
        if let Some(id) = expression.strip_prefix('#') {
            return (!id.is_empty()).then_some(Locator::Id(id));
        }
        (!expression.is_empty()).then_some(Locator::Tag(expression))
    }

    fn matches(&self, element: &ElementRef) -> bool {
        let value = element.value();
        match self {
            Locator::Class(class) => value.classes().any(|c| c == *class),
            Locator::Id(id) => value.id() == Some(*id),
            Locator::Tag(tag) => value.name().eq_ignore_ascii_case(tag),
        }
    }
}

/// Structural extractor backed by an HTML5 tree, so nested elements with the
/// same tag name resolve to the right closing tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocatorExtractor;

impl Extractor for LocatorExtractor {
    fn extract(&self, html: &str, locator: &str) -> ExtractedContent {
        let Some(locator) = Locator::parse(locator) else {
            return ExtractedContent {
                content: html.to_string(),
                scope: ExtractionScope::WholeDocument,
            };
        };

        let doc = Html::parse_document(html);
        let found = doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|element| locator.matches(element));

        match found {
            Some(element) => ExtractedContent {
                content: element.inner_html(),
                scope: ExtractionScope::Located,
            },
            None => ExtractedContent {
                content: html.to_string(),
                scope: ExtractionScope::Fallback,
            },
        }
    }
}
