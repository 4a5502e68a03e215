use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Class or id tokens that mark advertising blocks.
const AD_MARKERS: &[&str] = &[
    "ad",
    "ads",
    "advert",
    "advertisement",
    "adsbygoogle",
    "banner",
    "sponsored",
    "promo",
];

/// Splits an HTML fragment into visible text lines.
///
/// Block-level elements start a new line, inline runs of whitespace collapse to
/// one space, and scripts, styles and advertising blocks are dropped.
pub fn visible_lines(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut ctx = LineContext::default();
    for child in document.root_element().children() {
        visit_node(child, &mut ctx);
    }
    ctx.into_lines()
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut LineContext) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef, ctx: &mut LineContext) {
    if is_advertising(&element) {
        return;
    }
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "iframe" | "template" | "svg" | "head" => {}
        "br" | "hr" => ctx.break_line(),
        "p" | "div" | "section" | "article" | "header" | "footer" | "nav" | "aside" | "main"
        | "figure" | "figcaption" | "table" | "thead" | "tbody" | "tr" | "td" | "th" | "li"
        | "ul" | "ol" | "dl" | "dt" | "dd" | "blockquote" | "address" | "pre" | "form" | "h1"
        | "h2" | "h3" | "h4" | "h5" | "h6" => {
            ctx.break_line();
            for child in element.children() {
                visit_node(child, ctx);
            }
            ctx.break_line();
        }
        _ => {
            for child in element.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn is_advertising(element: &ElementRef) -> bool {
    let value = element.value();
    let is_marker = |token: &str| {
        let token = token.to_ascii_lowercase();
        AD_MARKERS.contains(&token.as_str())
            || token.starts_with("ad-")
            || token.starts_with("ads-")
            || token.starts_with("ad_")
    };
    value.classes().any(is_marker) || value.id().is_some_and(is_marker)
}

#[derive(Default)]
struct LineContext {
    lines: Vec<String>,
    current: String,
}

impl LineContext {
    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.current.is_empty() || self.current.ends_with(' ') {
                    continue;
                }
                self.current.push(' ');
            } else {
                self.current.push(ch);
            }
        }
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }

    fn into_lines(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}
