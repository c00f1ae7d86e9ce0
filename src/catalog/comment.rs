use scraper::{Html, Node};

/// Convert post HTML into plain text.
///
/// `<br>` becomes a newline, entities are decoded, and all other markup is
/// dropped.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if element.name() == "br" => out.push('\n'),
            _ => {}
        }
    }

    out.trim().to_string()
}
