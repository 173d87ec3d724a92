//! Page structure model
//!
//! The value a driver extracts from a rendered page: interactive elements
//! in document order plus a selector map preferring `data-testid` over
//! `id` over class selectors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One button on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonElement {
    /// Visible text
    pub text: String,
    /// CSS selector
    pub selector: String,
    /// Whether the element was visible at extraction time
    pub visible: bool,
}

/// One input on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputElement {
    /// `name` attribute
    pub name: String,
    /// `type` attribute (`text`, `password`, ...)
    pub input_type: String,
    /// CSS selector
    pub selector: String,
    /// Whether the element was visible at extraction time
    pub visible: bool,
}

/// One link on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkElement {
    /// Visible text
    pub text: String,
    /// `href` attribute
    pub href: String,
    /// Whether the element was visible at extraction time
    pub visible: bool,
}

/// Structure extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStructure {
    /// Document title
    pub title: String,
    /// Final URL after redirects
    pub url: String,
    /// Buttons in document order
    pub buttons: Vec<ButtonElement>,
    /// Inputs in document order
    pub inputs: Vec<InputElement>,
    /// Links in document order
    pub links: Vec<LinkElement>,
    /// Logical name -> preferred selector
    pub selectors: IndexMap<String, String>,
}

impl PageStructure {
    /// Empty structure for a URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Total interactive elements extracted
    #[inline]
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.buttons.len() + self.inputs.len() + self.links.len()
    }

    /// Pick the preferred selector among the candidates a driver found
    ///
    /// Preference order: `data-testid` attribute, then `#id`, then class.
    /// Falls back to the first candidate when none matches a preferred form.
    #[must_use]
    pub fn preferred_selector(candidates: &[String]) -> Option<String> {
        candidates
            .iter()
            .find(|s| s.contains("data-testid"))
            .or_else(|| candidates.iter().find(|s| s.starts_with('#')))
            .or_else(|| candidates.iter().find(|s| s.starts_with('.')))
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Compact text summary used in generation prompts
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Page: {} ({})\n", self.title, self.url));
        if !self.buttons.is_empty() {
            out.push_str("Buttons:\n");
            for b in &self.buttons {
                out.push_str(&format!(
                    "  - \"{}\" selector={} visible={}\n",
                    b.text, b.selector, b.visible
                ));
            }
        }
        if !self.inputs.is_empty() {
            out.push_str("Inputs:\n");
            for i in &self.inputs {
                out.push_str(&format!(
                    "  - name={} type={} selector={} visible={}\n",
                    i.name, i.input_type, i.selector, i.visible
                ));
            }
        }
        if !self.links.is_empty() {
            out.push_str("Links:\n");
            for l in &self.links {
                out.push_str(&format!(
                    "  - \"{}\" href={} visible={}\n",
                    l.text, l.href, l.visible
                ));
            }
        }
        out
    }
}
