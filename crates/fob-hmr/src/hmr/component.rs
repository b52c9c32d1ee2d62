//! Framework single-file components.
//!
//! The engine never compiles components. It only needs each file split into
//! comparable blocks so a change can be classified as a script change, a
//! template change or a style change.

use dashmap::DashMap;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use super::HmrMessage;
use crate::paths;

/// One top-level block: its raw content and attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfcBlock {
    pub content: String,
    pub attrs: BTreeMap<String, String>,
}

impl SfcBlock {
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub script: Option<SfcBlock>,
    pub template: Option<SfcBlock>,
    pub styles: Vec<SfcBlock>,
}

impl ComponentDescriptor {
    fn any_scoped(&self) -> bool {
        self.styles.iter().any(|s| s.has_attr("scoped"))
    }

    fn any_module(&self) -> bool {
        self.styles.iter().any(|s| s.has_attr("module"))
    }
}

/// Splits a component source into blocks.
pub trait ComponentParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, public_path: &str, source: &str) -> crate::Result<ComponentDescriptor>;
}

static ATTR_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"([^\s=/>]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#).ok()
});

const BLOCK_TAGS: &[&str] = &["script", "template", "style"];

/// Block splitter for `<script>`, `<template>` and `<style>` at the top
/// level of a component file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfcBlockParser;

impl ComponentParser for SfcBlockParser {
    fn parse(&self, public_path: &str, source: &str) -> crate::Result<ComponentDescriptor> {
        let mut descriptor = ComponentDescriptor::default();
        let mut pos = 0;

        while let Some(rel) = source[pos..].find('<') {
            let start = pos + rel;
            let rest = &source[start..];

            if rest.starts_with("<!--") {
                pos = match rest.find("-->") {
                    Some(end) => start + end + 3,
                    None => source.len(),
                };
                continue;
            }

            let Some(tag) = BLOCK_TAGS.iter().copied().find(|tag| opens(rest, tag)) else {
                pos = start + 1;
                continue;
            };

            let Some(open_end) = rest.find('>') else {
                return Err(unclosed(public_path, tag));
            };
            let attrs = parse_attrs(&rest[1 + tag.len()..open_end]);
            let body_start = start + open_end + 1;
            let Some((body_end, close_end)) = find_close(source, body_start, tag) else {
                return Err(unclosed(public_path, tag));
            };

            let block = SfcBlock {
                content: source[body_start..body_end].to_string(),
                attrs,
            };
            match tag {
                "script" => descriptor.script = Some(block),
                "template" => descriptor.template = Some(block),
                _ => descriptor.styles.push(block),
            }
            pos = close_end;
        }

        Ok(descriptor)
    }
}

fn unclosed(path: &str, tag: &str) -> crate::Error {
    crate::Error::Transform {
        path: path.to_string(),
        message: format!("unclosed <{tag}> block"),
    }
}

/// Whether `rest` starts with an opening `<tag` followed by a delimiter.
fn opens(rest: &str, tag: &str) -> bool {
    rest.len() > tag.len() + 1
        && rest[1..].starts_with(tag)
        && rest[1 + tag.len()..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_whitespace())
}

/// Find the matching `</tag>`, counting nested openings of the same tag.
/// Returns the offsets of the closing tag's start and end.
fn find_close(source: &str, from: usize, tag: &str) -> Option<(usize, usize)> {
    let close = format!("</{tag}");
    let mut depth = 0usize;
    let mut pos = from;
    while let Some(rel) = source[pos..].find('<') {
        let at = pos + rel;
        let rest = &source[at..];
        if rest.starts_with(&close) {
            if depth == 0 {
                let end = at + rest.find('>')? + 1;
                return Some((at, end));
            }
            depth -= 1;
        } else if tag == "template" && opens(rest, tag) {
            depth += 1;
        }
        pos = at + 1;
    }
    None
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    let Some(re) = ATTR_RE.as_ref() else {
        return BTreeMap::new();
    };
    re.captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Last parsed descriptor per component, filled when a component is served.
#[derive(Debug)]
pub struct ComponentCache {
    parser: Arc<dyn ComponentParser>,
    descriptors: DashMap<String, ComponentDescriptor>,
}

impl ComponentCache {
    pub fn new(parser: Arc<dyn ComponentParser>) -> Self {
        Self {
            parser,
            descriptors: DashMap::new(),
        }
    }

    /// Parse and remember a served component.
    pub fn record(&self, public_path: &str, source: &str) -> crate::Result<()> {
        let descriptor = self.parser.parse(public_path, source)?;
        self.descriptors.insert(public_path.to_string(), descriptor);
        Ok(())
    }

    pub fn get(&self, public_path: &str) -> Option<ComponentDescriptor> {
        self.descriptors.get(public_path).map(|d| d.clone())
    }

    pub fn remove(&self, public_path: &str) -> Option<ComponentDescriptor> {
        self.descriptors.remove(public_path).map(|(_, d)| d)
    }

    /// Messages for a changed component, diffed against its last descriptor.
    ///
    /// A component never served has no descriptor and yields nothing.
    pub fn update(
        &self,
        public_path: &str,
        source: &str,
        timestamp: u64,
    ) -> crate::Result<Vec<HmrMessage>> {
        let next = self.parser.parse(public_path, source)?;
        let Some(prev) = self.descriptors.insert(public_path.to_string(), next.clone()) else {
            tracing::debug!(path = public_path, "no previous descriptor, skipping update");
            return Ok(Vec::new());
        };
        Ok(diff(public_path, &prev, &next, timestamp))
    }
}

/// Classify the change between two descriptors of one component.
pub fn diff(
    public_path: &str,
    prev: &ComponentDescriptor,
    next: &ComponentDescriptor,
    timestamp: u64,
) -> Vec<HmrMessage> {
    let mut needs_reload = prev.script != next.script;
    let needs_rerender = prev.template != next.template;
    if !needs_reload && prev.any_scoped() != next.any_scoped() {
        needs_reload = true;
    }
    // style modules feed `$style` into the script
    let module_reload = prev.any_module() || next.any_module();

    let style_id = paths::hash_id(public_path);
    let mut messages = Vec::new();

    if !needs_reload {
        for (index, style) in next.styles.iter().enumerate() {
            if prev.styles.get(index) != Some(style) {
                messages.push(HmrMessage::ComponentStyleUpdate {
                    path: public_path.to_string(),
                    index,
                    id: format!("{style_id}-{index}"),
                    timestamp,
                });
            }
        }
    }

    for index in next.styles.len()..prev.styles.len() {
        messages.push(HmrMessage::StyleRemove {
            path: public_path.to_string(),
            id: format!("{style_id}-{index}"),
            timestamp,
        });
    }

    if needs_reload || module_reload {
        messages.push(HmrMessage::ComponentReload {
            path: public_path.to_string(),
            change_src_path: None,
            timestamp,
        });
    } else if needs_rerender {
        messages.push(HmrMessage::ComponentTemplateUpdate {
            path: public_path.to_string(),
            timestamp,
        });
    }

    messages
}
