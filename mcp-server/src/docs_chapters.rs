//! Navigation over the core documentation bundle (`main.json`): a tree of
//! chapters, each with a `route` and optional `children`.

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::Result;
use crate::error::ServerError;

/// Stands in for `/` in routes passed through tool arguments and URIs.
pub const ROUTE_SEPARATOR: &str = "____";

/// Chapters with children above this size are returned as child routes only.
const LARGE_CHAPTER_BYTES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterInfo {
    pub route: String,
    pub content_length: usize,
}

fn content_length(chapter: &Value) -> usize {
    serde_json::to_string(chapter).map_or(0, |s| s.len())
}

fn route_of(chapter: &Value) -> Option<&str> {
    chapter.get("route").and_then(Value::as_str)
}

fn children_of(chapter: &Value) -> &[Value] {
    chapter
        .get("children")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn collect_children(chapter: &Value, out: &mut Vec<ChapterInfo>) {
    for child in children_of(chapter) {
        if let Some(route) = route_of(child) {
            out.push(ChapterInfo {
                route: route.to_string(),
                content_length: content_length(child),
            });
        }
        collect_children(child, out);
    }
}

/// Every chapter in the bundle, depth first.
pub fn list_chapters(docs: &[Value]) -> Vec<ChapterInfo> {
    let mut chapters = Vec::new();
    for chapter in docs {
        chapters.push(ChapterInfo {
            route: route_of(chapter).unwrap_or_default().to_string(),
            content_length: content_length(chapter),
        });
        collect_children(chapter, &mut chapters);
    }
    chapters
}

fn normalize(route: &str) -> String {
    route.replace(ROUTE_SEPARATOR, "/").trim_matches('/').to_string()
}

fn find_in<'a>(chapters: &'a [Value], wanted: &str) -> Option<&'a Value> {
    for chapter in chapters {
        if route_of(chapter).is_some_and(|route| route.trim_matches('/') == wanted) {
            return Some(chapter);
        }
        if let Some(found) = find_in(children_of(chapter), wanted) {
            return Some(found);
        }
    }
    None
}

pub fn find_chapter<'a>(docs: &'a [Value], route: &str) -> Option<&'a Value> {
    find_in(docs, &normalize(route))
}

/// The chapter itself, or for large chapters with children an outline
/// listing the direct child routes.
pub fn chapter_response(chapter: &Value) -> Value {
    let size = content_length(chapter);
    let children = children_of(chapter);
    if children.is_empty() || size <= LARGE_CHAPTER_BYTES {
        return chapter.clone();
    }
    let child_routes: Vec<ChapterInfo> = children
        .iter()
        .filter_map(|child| {
            route_of(child).map(|route| ChapterInfo {
                route: route.to_string(),
                content_length: content_length(child),
            })
        })
        .collect();
    json!({
        "route": route_of(chapter).unwrap_or_default(),
        "title": chapter.get("title").and_then(Value::as_str).unwrap_or_default(),
        "content_length": size,
        "note": "This chapter is large. Only child routes are shown. Request specific child routes for detailed content.",
        "child_routes": child_routes,
    })
}

pub fn get_chapter(docs: &[Value], route: &str) -> Result<Value> {
    find_chapter(docs, route)
        .map(chapter_response)
        .ok_or_else(|| ServerError::NotFound(format!("Chapter not found: {}", normalize(route))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bundle() -> Vec<Value> {
        vec![
            json!({"route": "/reference/", "title": "Reference", "children": [
                {"route": "/reference/layout/", "title": "Layout", "children": [
                    {"route": "/reference/layout/colbreak/", "title": "Column Break", "body": "x".repeat(1200)},
                    {"route": "/reference/layout/page/", "title": "Page", "body": "short"},
                ]},
            ]}),
            json!({"route": "/tutorial/", "title": "Tutorial", "body": "hello"}),
        ]
    }

    #[test]
    fn listing_walks_the_whole_tree() {
        let routes: Vec<String> = list_chapters(&bundle())
            .into_iter()
            .map(|chapter| chapter.route)
            .collect();
        assert_eq!(
            routes,
            vec![
                "/reference/",
                "/reference/layout/",
                "/reference/layout/colbreak/",
                "/reference/layout/page/",
                "/tutorial/",
            ]
        );
    }

    #[test]
    fn separator_routes_resolve_nested_chapters() {
        let docs = bundle();
        let page = get_chapter(&docs, "____reference____layout____page").expect("page");
        assert_eq!(page["title"], "Page");
        assert_eq!(page["body"], "short");
    }

    #[test]
    fn large_chapters_with_children_return_outline() {
        let docs = bundle();
        let layout = get_chapter(&docs, "reference____layout").expect("layout");
        assert_eq!(layout["title"], "Layout");
        let child_routes = layout["child_routes"].as_array().expect("outline");
        assert_eq!(child_routes.len(), 2);
        assert_eq!(child_routes[0]["route"], "/reference/layout/colbreak/");
        assert!(layout.get("children").is_none());
    }

    #[test]
    fn large_leaf_chapters_are_returned_whole() {
        let docs = bundle();
        let colbreak = get_chapter(&docs, "reference/layout/colbreak").expect("leaf");
        assert_eq!(colbreak["body"].as_str().map(str::len), Some(1200));
    }

    #[test]
    fn unknown_route_is_not_found() {
        let err = get_chapter(&bundle(), "____nope").expect_err("missing");
        assert!(matches!(err, ServerError::NotFound(ref msg) if msg.contains("nope")));
    }
}
