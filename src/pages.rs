use std::fmt::Write;

use htmlescape::encode_minimal;

use crate::config::SiteConfig;
use crate::models::{parse_post_date, PostHtml, PostMeta};

const HOT_RELOAD_SCRIPT: &str = r#"
<script>
    const socket = new WebSocket("ws://" + window.location.host + "/ws");
    socket.onmessage = (event) => {
        if (event.data === "reload") {
            window.location.reload();
        }
    };
</script>
"#;

/// A page body plus what goes into the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub meta: Vec<(String, String)>,
    pub content: String,
}

pub fn render_with_layout(layout: &str, site: &SiteConfig, page: &Page, is_development: bool) -> String {
    let lang = encode_minimal(&site.lang);
    let title = encode_minimal(&page.title);
    let site_title = encode_minimal(&site.title);
    let head_meta = meta_tags(&page.meta);
    let mut html = fill(
        layout,
        &[
            ("lang", lang.as_str()),
            ("title", title.as_str()),
            ("meta", head_meta.as_str()),
            ("site_title", site_title.as_str()),
            ("content", page.content.as_str()),
        ],
    );

    if is_development {
        if let Some(at) = html.rfind("</body>") {
            html.insert_str(at, HOT_RELOAD_SCRIPT);
        }
    }
    html
}

pub fn post_list_page(site: &SiteConfig, posts: &[PostMeta]) -> Page {
    let mut list_items = String::new();
    for post in posts {
        let _ = write!(
            list_items,
            "<li class=\"post-list__item\"><a href=\"/post/{}\" class=\"post-list__item-link\">\
             <span class=\"post-list__item-link-title\">{}</span>\
             <time class=\"post-list__item-link-date\" datetime=\"{}\">{}</time></a></li>",
            encode_minimal(&post.slug),
            encode_minimal(&post.title),
            encode_minimal(&post.created_at),
            encode_minimal(&format_date(&post.created_at, &site.date_format)),
        );
    }

    let mut meta = vec![
        ("description".to_string(), site.description.clone()),
        ("twitter:card".to_string(), "summary".to_string()),
        ("twitter:title".to_string(), site.title.clone()),
        ("twitter:description".to_string(), site.description.clone()),
        ("og:title".to_string(), site.title.clone()),
        ("og:description".to_string(), site.description.clone()),
        ("og:type".to_string(), "website".to_string()),
        ("og:url".to_string(), format!("{}/", site.base_url.trim_end_matches('/'))),
    ];
    if !site.author.is_empty() {
        meta.push(("twitter:creator".to_string(), site.author.clone()));
    }

    Page {
        title: site.title.clone(),
        meta,
        content: format!("<main><ul class=\"post-list\">{list_items}</ul></main>"),
    }
}

/// The rendered body is trusted and injected as-is; everything else is escaped.
pub fn post_page(site: &SiteConfig, post: &PostHtml) -> Page {
    let meta_info = &post.meta;
    let description = if meta_info.description.is_empty() {
        meta_info.title.clone()
    } else {
        meta_info.description.clone()
    };

    let mut meta = vec![
        ("description".to_string(), description.clone()),
        ("twitter:card".to_string(), "summary".to_string()),
        ("twitter:title".to_string(), meta_info.title.clone()),
        ("twitter:description".to_string(), description.clone()),
        ("og:title".to_string(), meta_info.title.clone()),
        ("og:description".to_string(), description),
        ("og:type".to_string(), "article".to_string()),
        (
            "og:url".to_string(),
            format!("{}/post/{}", site.base_url.trim_end_matches('/'), meta_info.slug),
        ),
        ("article:published_time".to_string(), meta_info.created_at.clone()),
    ];
    if let Some(updated_at) = &meta_info.updated_at {
        meta.push(("article:modified_time".to_string(), updated_at.clone()));
    }
    if !site.author.is_empty() {
        meta.push(("twitter:creator".to_string(), site.author.clone()));
        meta.push(("article:author".to_string(), site.author.clone()));
    }

    let content = format!(
        "<main class=\"post\"><article><div class=\"post__info\">\
         <h1 class=\"post__info-title\">{}</h1>\
         <time class=\"post__info-date\" datetime=\"{}\">{}</time></div>\
         <div class=\"post__body\">{}</div></article></main>",
        encode_minimal(&meta_info.title),
        encode_minimal(&meta_info.created_at),
        encode_minimal(&format_date(&meta_info.created_at, &site.date_format)),
        post.html,
    );

    Page {
        title: format!("{} | {}", site.title, meta_info.title),
        meta,
        content,
    }
}

pub fn not_found_page(template: &str, requested: &str) -> Page {
    Page {
        title: "404 Not Found".to_string(),
        meta: Vec::new(),
        content: fill(template, &[("slug", encode_minimal(requested).as_str())]),
    }
}

pub fn error_page(template: &str, title: &str, message: &str) -> Page {
    Page {
        title: title.to_string(),
        meta: Vec::new(),
        content: fill(template, &[("message", encode_minimal(message).as_str())]),
    }
}

/// Formats a `createdAt` value for display, falling back to the raw text
/// when it is not a recognised date or the format string is invalid.
pub fn format_date(created_at: &str, format: &str) -> String {
    let Some(date) = parse_post_date(created_at) else {
        return created_at.to_string();
    };
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        return created_at.to_string();
    }
    out
}

fn meta_tags(meta: &[(String, String)]) -> String {
    let mut tags = String::new();
    for (key, value) in meta {
        let attribute = if key.starts_with("og:") || key.starts_with("article:") {
            "property"
        } else {
            "name"
        };
        let _ = write!(
            tags,
            "<meta {}=\"{}\" content=\"{}\" />",
            attribute,
            encode_minimal(key),
            encode_minimal(value)
        );
    }
    tags
}

/// Single-pass `{{ key }}` substitution. Unknown keys are left in place and
/// substituted values are never re-scanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}
