//! Link discovery inside opaque representations.
//!
//! Aggregators need to know which further resources a composite view depends
//! on. [`LinkResolver`] answers exactly that and nothing more; everything
//! else about a representation stays opaque to the core.

use serde_json::Value;

/// Finds dependent resource links in response bodies.
pub trait LinkResolver: Send + Sync {
    /// Layout document of an object representation.
    fn layout_link(&self, object_body: &str) -> Option<String>;

    /// Every collection referenced anywhere in a layout tree.
    fn layout_collections(&self, layout_body: &str) -> Vec<String>;

    /// Member object links of a list/collection representation.
    fn list_members(&self, list_body: &str) -> Vec<String>;

    /// Per-property sub-resources (details and descriptions) of an object.
    fn property_resources(&self, object_body: &str) -> Vec<String>;
}

/// Resolver for JSON representations that carry `links: [{rel, href}]`.
#[derive(Debug, Default, Clone)]
pub struct JsonLinkResolver;

const LAYOUT_RELS: &[&str] = &["object-layout", "/layout"];
const DETAILS_REL: &str = "/details";
const DESCRIBEDBY_REL: &str = "describedby";

fn parse(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

fn href(link: &Value) -> Option<String> {
    link.get("href").and_then(Value::as_str).map(str::to_string)
}

fn rel_hrefs<'a>(links: Option<&'a Value>, matches: impl Fn(&str) -> bool + 'a) -> Vec<String> {
    links
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|link| {
            link.get("rel")
                .and_then(Value::as_str)
                .map(|rel| matches(rel))
                .unwrap_or(false)
        })
        .filter_map(href)
        .collect()
}

fn push_unique(out: &mut Vec<String>, url: String) {
    if !out.contains(&url) {
        out.push(url);
    }
}

impl LinkResolver for JsonLinkResolver {
    fn layout_link(&self, object_body: &str) -> Option<String> {
        let root = parse(object_body)?;
        rel_hrefs(root.get("links"), |rel| {
            LAYOUT_RELS.iter().any(|suffix| rel.ends_with(suffix))
        })
        .into_iter()
        .next()
    }

    /// Layout trees nest rows, columns, tab groups and tabs to arbitrary
    /// depth; the walk uses an explicit stack.
    fn layout_collections(&self, layout_body: &str) -> Vec<String> {
        let Some(root) = parse(layout_body) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut stack = vec![&root];
        while let Some(node) = stack.pop() {
            match node {
                Value::Object(map) => {
                    for key in ["collection", "collections"] {
                        let Some(collections) = map.get(key) else {
                            continue;
                        };
                        let items: Vec<&Value> = match collections {
                            Value::Array(items) => items.iter().collect(),
                            other => vec![other],
                        };
                        for item in items {
                            if let Some(url) = item.get("link").and_then(href) {
                                push_unique(&mut found, url);
                            }
                        }
                    }
                    // Reverse keeps document order when popping.
                    stack.extend(map.values().rev());
                }
                Value::Array(items) => stack.extend(items.iter().rev()),
                _ => {}
            }
        }
        found
    }

    fn list_members(&self, list_body: &str) -> Vec<String> {
        let Some(root) = parse(list_body) else {
            return Vec::new();
        };
        let items = match &root {
            Value::Array(items) => Some(items),
            Value::Object(map) => map.get("value").and_then(Value::as_array),
            _ => None,
        };
        let mut members = Vec::new();
        for url in items.into_iter().flatten().filter_map(href) {
            push_unique(&mut members, url);
        }
        members
    }

    fn property_resources(&self, object_body: &str) -> Vec<String> {
        let Some(root) = parse(object_body) else {
            return Vec::new();
        };
        let mut resources = Vec::new();
        let Some(members) = root.get("members").and_then(Value::as_object) else {
            return resources;
        };
        for member in members.values() {
            if member.get("memberType").and_then(Value::as_str) != Some("property") {
                continue;
            }
            let hrefs = rel_hrefs(member.get("links"), |rel| {
                rel.ends_with(DETAILS_REL) || rel.ends_with(DESCRIBEDBY_REL)
            });
            for url in hrefs {
                push_unique(&mut resources, url);
            }
        }
        resources
    }
}
