//! Template rendering
//!
//! HTML pages are Tera templates compiled into the binary with rust-embed
//! and parsed once at start-up. Template names are their paths under
//! `templates/`, e.g. `news/user.html`.

use anyhow::{anyhow, Context, Result};
use rust_embed::RustEmbed;
use tera::{Context as TeraContext, Tera};

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Parse every embedded template
    pub fn new() -> Result<Self> {
        let mut templates = Vec::new();
        for name in TemplateAssets::iter() {
            let file = TemplateAssets::get(&name)
                .ok_or_else(|| anyhow!("Embedded template disappeared: {}", name))?;
            let source = std::str::from_utf8(&file.data)
                .with_context(|| format!("Template is not UTF-8: {}", name))?
                .to_string();
            templates.push((name.to_string(), source));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .context("Failed to parse templates")?;

        tracing::info!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera
            .render(template, context)
            .with_context(|| format!("Failed to render template '{}'", template))
    }

    pub fn has_template(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGES: &[&str] = &[
        "news/user.html",
        "news/user_base_info.html",
        "news/user_pic_info.html",
        "news/user_news_release.html",
        "news/user_pass_info.html",
        "news/user_collection.html",
        "news/user_news_list.html",
        "news/user_follow.html",
        "news/other.html",
    ];

    fn user_data() -> serde_json::Value {
        json!({
            "id": 1,
            "nick_name": "13800001111",
            "avatar_url": "",
            "mobile": "13800001111",
            "gender": "MAN",
            "signature": "",
            "followers_count": 0,
            "news_count": 0
        })
    }

    #[test]
    fn test_all_pages_embedded() {
        let engine = TemplateEngine::new().unwrap();
        for page in PAGES {
            assert!(engine.has_template(page), "missing {}", page);
        }
    }

    #[test]
    fn test_render_user_page() {
        let engine = TemplateEngine::new().unwrap();
        let mut context = TeraContext::new();
        context.insert("data", &json!({ "user": user_data() }));

        let html = engine.render("news/user.html", &context).unwrap();
        assert!(html.contains("13800001111"));
    }

    #[test]
    fn test_render_empty_collection() {
        let engine = TemplateEngine::new().unwrap();
        let mut context = TeraContext::new();
        context.insert(
            "data",
            &json!({ "collections": [], "total_page": 1, "current_page": 1 }),
        );

        let html = engine.render("news/user_collection.html", &context).unwrap();
        assert!(html.contains("1/1"));
    }

    #[test]
    fn test_render_other_page_anonymous_viewer() {
        let engine = TemplateEngine::new().unwrap();
        let mut context = TeraContext::new();
        context.insert(
            "data",
            &json!({ "is_followed": false, "user": null, "other_info": user_data() }),
        );

        let html = engine.render("news/other.html", &context).unwrap();
        assert!(html.contains("关注"));
    }

    #[test]
    fn test_missing_template() {
        let engine = TemplateEngine::new().unwrap();
        assert!(engine.render("news/missing.html", &TeraContext::new()).is_err());
    }
}
