//! Markup collaborator. Parsing and templating live outside this
//! crate; the engine only needs a cursor it can skip regions on and a
//! way to emit an inert placeholder tag.

use crate::request::Response;

/// One component-bearing region of a page's markup.
#[derive(Clone, Debug)]
pub struct MarkupRegion {
    pub component: String,
    pub tag: String,
}

/// Cursor over the component regions of a markup document.
#[derive(Default)]
pub struct MarkupStream {
    regions: Vec<MarkupRegion>,
    index: usize,
}

impl MarkupStream {
    pub fn empty() -> Self {
        MarkupStream::default()
    }

    pub fn new(regions: Vec<MarkupRegion>) -> Self {
        MarkupStream { regions, index: 0 }
    }

    pub fn current(&self) -> Option<&MarkupRegion> {
        self.regions.get(self.index)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Whether the named component is referenced by this markup. An
    /// empty stream means "no markup document": every component in the
    /// tree renders.
    pub fn references(&self, component: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r.component == component)
    }

    /// Region for the named component, if it is the one under the
    /// cursor.
    pub fn region_for(&self, component: &str) -> Option<&MarkupRegion> {
        self.current().filter(|r| r.component == component)
    }

    /// Skips the markup region of the current component entirely.
    pub fn skip_component(&mut self) {
        if self.index < self.regions.len() {
            self.index += 1;
        }
    }

    pub fn advance(&mut self) {
        self.skip_component();
    }

    /// Writes a minimal disabled stand-in for an invisible component
    /// that asked to keep a placeholder in the output.
    pub fn write_placeholder(&mut self, component: &str, markup_id: &str, response: &mut Response) {
        let tag = self
            .region_for(component)
            .map(|r| r.tag.clone())
            .unwrap_or_else(|| "div".to_string());
        response.write(&format!(
            "<{tag} id=\"{markup_id}\" style=\"display:none\"></{tag}>"
        ));
        self.skip_component();
    }
}

/// "Find markup for this page" collaborator.
pub trait MarkupSource {
    fn markup_for_page(&self, page_key: Option<&str>) -> MarkupStream;
}

/// Default source: no markup, components render bodies only.
pub struct NoMarkup;

impl MarkupSource for NoMarkup {
    fn markup_for_page(&self, _page_key: Option<&str>) -> MarkupStream {
        MarkupStream::empty()
    }
}

/// Escapes text for inclusion in markup body or attribute positions.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_metacharacters() {
        assert_eq!(escape_html("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn placeholder_uses_region_tag() {
        let mut response = Response::new();
        let mut stream = MarkupStream::new(vec![MarkupRegion {
            component: "label".into(),
            tag: "span".into(),
        }]);
        stream.write_placeholder("label", "label7", &mut response);
        assert_eq!(
            response.body(),
            "<span id=\"label7\" style=\"display:none\"></span>"
        );
        assert!(stream.current().is_none());
    }
}
