use crate::chat::ChatMessage;
use crate::error::DashboardResult;
use crate::view::{NodeDetail, TableView};
use pod_types::Theme;
use tera::{Context, Tera};

const TABLE: &str = include_str!("../templates/table.html");
const PAGE: &str = include_str!("../templates/page.html");
const NODE: &str = include_str!("../templates/node.html");
const CHAT: &str = include_str!("../templates/chat.html");

/// HTML renderer over the view models.
///
/// Templates end in `.html`, so Tera escapes every interpolated value.
pub struct HtmlRenderer {
    tera: Tera,
}

impl HtmlRenderer {
    pub fn new() -> DashboardResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("table.html", TABLE),
            ("page.html", PAGE),
            ("node.html", NODE),
            ("chat.html", CHAT),
        ])?;
        Ok(Self { tera })
    }

    /// Table fragment only
    pub fn render_table(&self, view: &TableView) -> DashboardResult<String> {
        let mut context = Context::new();
        context.insert("view", view);
        Ok(self.tera.render("table.html", &context)?)
    }

    /// Standalone page with the table and the theme class on `<html>`
    pub fn render_page(&self, view: &TableView, theme: Theme) -> DashboardResult<String> {
        let mut context = Context::new();
        context.insert("view", view);
        context.insert("theme", &theme);
        Ok(self.tera.render("page.html", &context)?)
    }

    pub fn render_node(&self, detail: &NodeDetail, theme: Theme) -> DashboardResult<String> {
        let mut context = Context::new();
        context.insert("detail", detail);
        context.insert("theme", &theme);
        Ok(self.tera.render("node.html", &context)?)
    }

    pub fn render_chat(&self, messages: &[ChatMessage], pending: bool, theme: Theme) -> DashboardResult<String> {
        let mut context = Context::new();
        context.insert("messages", messages);
        context.insert("pending", &pending);
        context.insert("theme", &theme);
        Ok(self.tera.render("chat.html", &context)?)
    }
}
