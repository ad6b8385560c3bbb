//! HTML helpers for Compass's ASP.NET pages.
//!
//! Compass pages wrap everything in a single server-side form, so most data is
//! read from form controls. [`Form`] captures the first form of a page as
//! owned data: the action, every named control's current value, and the
//! attributes and options of each control.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{CompassError, Result};

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

/// Parses a static CSS selector.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid CSS selector")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    pub selected: bool,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormControl {
    pub name: String,
    /// `input`, `select` or `textarea`
    pub tag: String,
    /// `type` attribute of inputs, lower-cased
    pub kind: String,
    pub value: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub options: Vec<SelectOption>,
}

impl FormControl {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pub action: String,
    pub controls: Vec<FormControl>,
}

impl Form {
    /// Reads the first `<form>` of a document.
    ///
    /// # Errors
    /// Returns [`CompassError::Parse`] if the page has no form, which usually
    /// means Compass returned an error page instead.
    pub fn first(document: &Html) -> Result<Self> {
        let form = document
            .select(&selector("form"))
            .next()
            .ok_or_else(|| CompassError::Parse("No form found in Compass page".to_string()))?;
        Ok(Form::from_element(form))
    }

    pub fn from_element(form: ElementRef<'_>) -> Self {
        let controls = form
            .select(&selector("input, select, textarea"))
            .filter_map(read_control)
            .collect();
        Form {
            action: form.value().attr("action").unwrap_or_default().to_string(),
            controls,
        }
    }

    pub fn control(&self, name: &str) -> Option<&FormControl> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Current value of a named control, as a browser would submit it.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.control(name).and_then(|c| c.value.as_deref())
    }

    /// Values of every named control that would be submitted.
    pub fn fields(&self) -> BTreeMap<String, String> {
        self.controls
            .iter()
            .filter_map(|c| c.value.clone().map(|v| (c.name.clone(), v)))
            .collect()
    }
}

fn attributes(element: ElementRef<'_>) -> BTreeMap<String, String> {
    element
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn read_control(element: ElementRef<'_>) -> Option<FormControl> {
    let tag = element.value().name().to_string();
    let name = element.value().attr("name")?.to_string();
    let attrs = attributes(element);
    let kind = attrs
        .get("type")
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string());

    let (value, options) = match tag.as_str() {
        "select" => {
            let options: Vec<SelectOption> = element
                .select(&selector("option"))
                .map(|option| {
                    let text = text_content(option).trim().to_string();
                    SelectOption {
                        value: option
                            .value()
                            .attr("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| text.clone()),
                        selected: option.value().attr("selected").is_some(),
                        attrs: attributes(option),
                        text,
                    }
                })
                .collect();
            // Single selects fall back to their first option, like a browser
            let value = options
                .iter()
                .find(|o| o.selected)
                .or_else(|| options.first())
                .map(|o| o.value.clone());
            (value, options)
        }
        "textarea" => (Some(text_content(element)), Vec::new()),
        _ => {
            let value = match kind.as_str() {
                "checkbox" | "radio" => element.value().attr("checked").map(|_| {
                    element.value().attr("value").unwrap_or("on").to_string()
                }),
                "submit" | "button" | "image" | "reset" | "file" => None,
                _ => Some(element.value().attr("value").unwrap_or_default().to_string()),
            };
            (value, Vec::new())
        }
    };

    Some(FormControl {
        name,
        tag,
        kind,
        value,
        attrs,
        options,
    })
}

/// All text below an element, concatenated.
pub fn text_content(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Text content with runs of whitespace collapsed, like XPath `normalize-space`.
pub fn normalize_space(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

pub fn child_elements(element: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap).collect()
}

/// Rows belonging directly to a table, looking through `thead`/`tbody`/`tfoot`.
///
/// HTML parsers insert an implicit `tbody`, so `table > tr` never matches;
/// nested tables' rows are not included.
pub fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child_elements(child)
                    .into_iter()
                    .filter(|row| row.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// Cells (`td`/`th`) of a row.
pub fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(row)
        .into_iter()
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Nearest enclosing table row.
pub fn ancestor_row(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "tr")
}

/// Finds the row holding a label and returns the text of one of its cells.
///
/// Compass lays profile details out as `<tr><td><label>Gender:</label></td>
/// <td>value</td></tr>`; the label's position in the table varies between
/// roles, so rows are found by label text rather than by index.
pub fn labelled_cell(scope: ElementRef<'_>, label: &str, cell_index: usize) -> Option<String> {
    scope
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| {
            el.children()
                .filter_map(|child| child.value().as_text())
                .any(|text| text.trim() == label)
        })
        .filter_map(ancestor_row)
        .find_map(|row| row_cells(row).get(cell_index).map(|cell| text_content(*cell)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <form action="./ScoutsPortal.aspx?Invalid=AccessCN">
          <input type="hidden" name="hidden_one" value="1">
          <input type="text" name="blank">
          <input type="checkbox" name="ticked" checked>
          <input type="checkbox" name="unticked" value="x">
          <input type="submit" name="go" value="Go">
          <select name="roles" title="Roles">
            <option value="1">First</option>
            <option value="2" selected="selected">Second</option>
          </select>
          <select name="plain"><option>Only</option></select>
          <textarea name="notes">Some notes</textarea>
        </form>
        <table id="t">
          <tr><td><label>Gender:</label></td><td>Female</td></tr>
          <tr><td><table><tr><td>nested</td></tr></table></td></tr>
        </table>
        </body></html>"#;

    #[test]
    fn form_fields_follow_browser_rules() {
        let document = Html::parse_document(PAGE);
        let form = Form::first(&document).unwrap();

        assert_eq!(form.action, "./ScoutsPortal.aspx?Invalid=AccessCN");
        assert_eq!(form.field("hidden_one"), Some("1"));
        assert_eq!(form.field("blank"), Some(""));
        assert_eq!(form.field("ticked"), Some("on"));
        assert_eq!(form.field("unticked"), None);
        assert_eq!(form.field("go"), None);
        assert_eq!(form.field("roles"), Some("2"));
        assert_eq!(form.field("plain"), Some("Only"));
        assert_eq!(form.field("notes"), Some("Some notes"));
        assert_eq!(form.control("roles").unwrap().attr("title"), Some("Roles"));
        assert_eq!(form.control("roles").unwrap().options.len(), 2);
    }

    #[test]
    fn page_without_form_is_a_parse_error() {
        let document = Html::parse_document("<html><body><p>Oops</p></body></html>");
        assert!(matches!(Form::first(&document), Err(CompassError::Parse(_))));
    }

    #[test]
    fn table_rows_skip_nested_tables() {
        let document = Html::parse_document(PAGE);
        let table = document.select(&selector("table#t")).next().unwrap();
        assert_eq!(table_rows(table).len(), 2);
    }

    #[test]
    fn labelled_cells_are_found_by_text() {
        let document = Html::parse_document(PAGE);
        let table = document.select(&selector("table#t")).next().unwrap();
        assert_eq!(labelled_cell(table, "Gender:", 1).as_deref(), Some("Female"));
        assert_eq!(labelled_cell(table, "Religion:", 1), None);
    }

    #[test]
    fn whitespace_is_normalised() {
        assert_eq!(normalize_space("  White \n\t British "), "White British");
    }
}
