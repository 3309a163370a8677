//! Representative response bodies.
//!
//! Links are absolute on `BASE` so base-url stripping is exercised.

pub const BASE: &str = "http://localhost:8080";
pub const OTHER: &str = "http://other:9090";

pub const OBJECT_PATH: &str = "/objects/simple.Foo/AAA";
pub const LAYOUT_PATH: &str = "/objects/simple.Foo/AAA/object-layout";
pub const ITEMS_PATH: &str = "/objects/simple.Foo/AAA/collections/items";
pub const NOTES_PATH: &str = "/objects/simple.Foo/AAA/collections/notes";

pub const LIST_PATH: &str = "/services/simple.Foos/actions/listAll/invoke";
pub const MEMBER_PATH: &str = "/objects/simple.Foo/M1";
pub const MEMBER_LAYOUT_PATH: &str = "/objects/simple.Foo/M1/object-layout";
pub const MEMBER_NAME_PATH: &str = "/objects/simple.Foo/M1/properties/name";

pub fn url(path: &str) -> String {
    format!("{}{}", BASE, path)
}

pub fn object() -> String {
    format!(
        r#"{{
  "title": "Foo AAA",
  "domainType": "simple.Foo",
  "links": [
    {{"rel": "self", "href": "{base}{object}"}},
    {{"rel": "urn:org.restfulobjects:rels/object-layout", "href": "{base}{layout}"}}
  ],
  "members": {{
    "name": {{"memberType": "property", "value": "Foo"}}
  }}
}}"#,
        base = BASE,
        object = OBJECT_PATH,
        layout = LAYOUT_PATH
    )
}

/// Two collections, one nested inside a tab group.
pub fn layout() -> String {
    format!(
        r#"{{
  "row": [{{"cols": [{{"col": {{
    "tabGroup": [{{"tab": [{{"row": [{{"cols": [{{"col": {{
      "collection": [{{"id": "items", "link": {{"href": "{base}{items}"}}}}]
    }}}}]}}]}}]}}],
    "collection": [{{"id": "notes", "link": {{"href": "{base}{notes}"}}}}]
  }}}}]}}]
}}"#,
        base = BASE,
        items = ITEMS_PATH,
        notes = NOTES_PATH
    )
}

pub fn collection(name: &str) -> String {
    format!(r#"{{"id": "{}", "value": []}}"#, name)
}

pub fn list() -> String {
    format!(
        r#"{{"value": [{{"href": "{base}{member}"}}, {{"href": "{base}/objects/simple.Foo/M2"}}]}}"#,
        base = BASE,
        member = MEMBER_PATH
    )
}

pub fn member() -> String {
    format!(
        r#"{{
  "links": [{{"rel": "urn:org.restfulobjects:rels/object-layout", "href": "{base}{layout}"}}],
  "members": {{
    "name": {{"memberType": "property", "links": [
      {{"rel": "urn:org.restfulobjects:rels/details", "href": "{base}{name}"}}
    ]}}
  }}
}}"#,
        base = BASE,
        layout = MEMBER_LAYOUT_PATH,
        name = MEMBER_NAME_PATH
    )
}
