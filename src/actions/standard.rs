//! Built-in package actions.
//!
//! Both actions edit a template design in place. Designs are not required
//! to be well-formed XML, so the target element is located textually by its
//! `id` attribute and its closing tag is matched by counting nested tags of
//! the same name.
//!
//! ```xml
//! <Action runat="install" alias="addStringToHtmlElement" templateAlias="news"
//!         htmlElementId="newsSection" position="beginning"><![CDATA[hello world!]]></Action>
//! ```

use anyhow::{Context, Result};
use log::{debug, warn};
use std::ops::Range;

use crate::manifest::XmlElement;

use super::{ActionContext, PackageAction};

/// Insert the action's text into an element of a template, at its beginning or end.
pub struct AddStringToHtmlElement;

/// Remove the action's text from an element of a template.
pub struct RemoveStringFromHtmlElement;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Beginning,
    End,
}

struct TemplateEdit {
    template_alias: String,
    element_id: String,
    value: String,
}

impl TemplateEdit {
    fn from_xml(data: &XmlElement) -> Result<Self> {
        Ok(Self {
            template_alias: required_attr(data, "templateAlias")?,
            element_id: required_attr(data, "htmlElementId")?,
            value: data.text(),
        })
    }

    /// Apply `edit` to the element's inner range and save the design.
    ///
    /// Returns `false` when the template or the element does not exist.
    fn apply(
        &self,
        ctx: &ActionContext<'_>,
        edit: impl FnOnce(&str, Range<usize>) -> String,
    ) -> Result<bool> {
        let Some(template) = ctx.services.templates.get_by_alias(&self.template_alias)? else {
            warn!(
                "{}: template '{}' not found",
                ctx.package_name, self.template_alias
            );
            return Ok(false);
        };

        let Some(inner) = find_element(&template.design, &self.element_id) else {
            warn!(
                "{}: no element with id '{}' in template '{}'",
                ctx.package_name, self.element_id, self.template_alias
            );
            return Ok(false);
        };

        let design = edit(&template.design, inner);
        ctx.services
            .templates
            .save_design(&self.template_alias, &design)
            .with_context(|| format!("Failed to save template '{}'", self.template_alias))?;
        debug!("Updated template '{}'", self.template_alias);
        Ok(true)
    }

    fn insert(&self, ctx: &ActionContext<'_>, position: Position) -> Result<bool> {
        let snippet = format!("\n{}\n", self.value);
        self.apply(ctx, |design, inner| {
            let at = match position {
                Position::Beginning => inner.start,
                Position::End => inner.end,
            };
            let mut updated = String::with_capacity(design.len() + snippet.len());
            updated.push_str(&design[..at]);
            updated.push_str(&snippet);
            updated.push_str(&design[at..]);
            updated
        })
    }

    fn remove(&self, ctx: &ActionContext<'_>) -> Result<bool> {
        self.apply(ctx, |design, inner| {
            format!(
                "{}{}{}",
                &design[..inner.start],
                design[inner.clone()].replace(&self.value, ""),
                &design[inner.end..]
            )
        })
    }
}

impl PackageAction for AddStringToHtmlElement {
    fn alias(&self) -> &str {
        "addStringToHtmlElement"
    }

    fn execute(&self, ctx: &ActionContext<'_>, data: &XmlElement) -> Result<bool> {
        let position = match data.attr("position") {
            Some("beginning") => Position::Beginning,
            _ => Position::End,
        };
        TemplateEdit::from_xml(data)?.insert(ctx, position)
    }

    fn undo(&self, ctx: &ActionContext<'_>, data: &XmlElement) -> Result<bool> {
        TemplateEdit::from_xml(data)?.remove(ctx)
    }
}

impl PackageAction for RemoveStringFromHtmlElement {
    fn alias(&self) -> &str {
        "removeStringFromHtmlElement"
    }

    fn execute(&self, ctx: &ActionContext<'_>, data: &XmlElement) -> Result<bool> {
        TemplateEdit::from_xml(data)?.remove(ctx)
    }

    fn undo(&self, _ctx: &ActionContext<'_>, _data: &XmlElement) -> Result<bool> {
        Ok(true)
    }
}

fn required_attr(data: &XmlElement, name: &str) -> Result<String> {
    data.attr(name)
        .map(str::to_string)
        .with_context(|| format!("action is missing the '{}' attribute", name))
}

/// Whether the end of `before` is inside a tag rather than in text.
fn inside_open_tag(before: &str) -> bool {
    match (before.rfind('<'), before.rfind('>')) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Byte range of the inner content of the element whose `id` is `element_id`.
fn find_element(design: &str, element_id: &str) -> Option<Range<usize>> {
    let attr_pos = [
        format!("id=\"{}\"", element_id),
        format!("id='{}'", element_id),
    ]
    .iter()
    .find_map(|needle| {
        design
            .match_indices(needle.as_str())
            .map(|(i, _)| i)
            .find(|&i| {
                design[..i].ends_with(char::is_whitespace) && inside_open_tag(&design[..i])
            })
    })?;

    let tag_start = design[..attr_pos].rfind('<')?;
    let name: String = design[tag_start + 1..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
        .collect();
    if name.is_empty() {
        return None;
    }

    let open_end = attr_pos + design[attr_pos..].find('>')?;
    if design[..open_end].ends_with('/') {
        return None;
    }
    let inner_start = open_end + 1;

    let open_tag = format!("<{}", name);
    let close_tag = format!("</{}", name);
    let mut depth = 1;
    let mut cursor = inner_start;
    loop {
        let rest = &design[cursor..];
        let next_close = find_tag(rest, &close_tag)?;
        match find_tag(rest, &open_tag) {
            Some(open) if open < next_close => {
                let nested_start = cursor + open;
                let nested_end = nested_start + design[nested_start..].find('>')?;
                if !design[..nested_end].ends_with('/') {
                    depth += 1;
                }
                cursor = nested_end + 1;
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(inner_start..cursor + next_close);
                }
                cursor += next_close + close_tag.len();
            }
        }
    }
}

/// First occurrence of `tag` that is a whole tag name (`<div` but not `<divider`).
fn find_tag(haystack: &str, tag: &str) -> Option<usize> {
    haystack.match_indices(tag).map(|(i, _)| i).find(|&i| {
        haystack[i + tag.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
    })
}
