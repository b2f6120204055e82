use colored::{Color, Colorize};
use pod_dashboard::chat::{ChatMessage, MessageKind};
use pod_dashboard::view::{CellState, FieldView, NodeDetail, RowView, TableView};
use pod_dashboard::Freshness;
use pod_types::Theme;
use prettytable::{format, row, Cell, Row, Table};

/// Terminal colours for one theme
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    fresh: Color,
    recent: Color,
    stale: Color,
    very_stale: Color,
    muted: Color,
    error: Color,
    accent: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Palette {
                fresh: Color::BrightGreen,
                recent: Color::BrightCyan,
                stale: Color::BrightYellow,
                very_stale: Color::BrightRed,
                muted: Color::BrightBlack,
                error: Color::BrightRed,
                accent: Color::BrightMagenta,
            },
            Theme::Light => Palette {
                fresh: Color::Green,
                recent: Color::Blue,
                stale: Color::Yellow,
                very_stale: Color::Red,
                muted: Color::BrightBlack,
                error: Color::Red,
                accent: Color::Magenta,
            },
        }
    }

    fn freshness(&self, freshness: Freshness) -> Color {
        match freshness {
            Freshness::Fresh => self.fresh,
            Freshness::Recent => self.recent,
            Freshness::Stale => self.stale,
            Freshness::VeryStale => self.very_stale,
        }
    }

    fn field(&self, field: &FieldView) -> String {
        match field.state {
            CellState::Value => field.text.clone(),
            CellState::Loading | CellState::Missing => field.text.color(self.muted).to_string(),
            CellState::Error => field.text.color(self.error).to_string(),
        }
    }
}

fn pubkey_cell(row: &RowView, palette: &Palette) -> String {
    if row.duplicate_ips.is_empty() {
        row.pubkey_short.clone()
    } else {
        format!(
            "{} {}",
            row.pubkey_short,
            format!("DUP {}", row.duplicate_ips.len()).color(palette.accent)
        )
    }
}

/// Pod table for the terminal
pub fn render_table(view: &TableView, theme: Theme) -> Table {
    let palette = Palette::for_theme(theme);
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

    let mut header = vec![Cell::new("IP")];
    header.extend(
        view.headers
            .iter()
            .map(|h| Cell::new(&format!("{} {}", h.label, h.symbol)).style_spec("b")),
    );
    table.set_titles(Row::new(header));

    for row in &view.rows {
        let name = if row.known {
            row.name.text.bold().to_string()
        } else {
            palette.field(&row.name)
        };
        let country = match row.provider.state {
            CellState::Value => format!("{} / {}", palette.field(&row.country), row.provider.text),
            _ => palette.field(&row.country),
        };

        table.add_row(Row::new(vec![
            Cell::new(&row.ip),
            Cell::new(&name),
            Cell::new(&pubkey_cell(row, &palette)),
            Cell::new(&palette.field(&row.public)),
            Cell::new(&country),
            Cell::new(&palette.field(&row.storage)),
            Cell::new(&palette.field(&row.usage)),
            Cell::new(&palette.field(&row.uptime)),
            Cell::new(&palette.field(&row.ping)),
            Cell::new(&palette.field(&row.credits)),
            Cell::new(&palette.field(&row.stake)),
            Cell::new(
                &row.last_seen
                    .text
                    .color(palette.freshness(row.last_seen.freshness))
                    .to_string(),
            ),
            Cell::new(&row.version),
        ]));
    }

    table
}

/// Lines printed above the table
pub fn summary(view: &TableView, theme: Theme) -> Vec<String> {
    let palette = Palette::for_theme(theme);
    let mut lines = vec![format!(
        "{} [{}] showing {} of {} pods",
        view.rpc_endpoint, view.reload_label, view.rows.len(), view.total
    )];

    if view.duplicated_keys > 0 {
        lines.push(
            format!("{} pubkeys announced from more than one IP", view.duplicated_keys)
                .color(palette.accent)
                .to_string(),
        );
    }
    if view.pending_lookups > 0 {
        lines.push(
            format!("{} lookups pending", view.pending_lookups)
                .color(palette.muted)
                .to_string(),
        );
    }
    if view.failed_lookups > 0 {
        lines.push(
            format!("{} lookups failed, retrying on next refresh", view.failed_lookups)
                .color(palette.error)
                .to_string(),
        );
    }
    if let Some(error) = &view.status.error {
        lines.push(error.color(palette.error).to_string());
    }
    lines
}

/// Print the summary, then the table or the empty-state message
pub fn print_view(view: &TableView, theme: Theme) {
    for line in summary(view, theme) {
        println!("{}", line);
    }
    match view.empty_message {
        Some(message) => println!("{}", message),
        None => {
            render_table(view, theme).printstd();
        }
    }
}

/// Key/value table for one node
pub fn render_detail(detail: &NodeDetail, theme: Theme) -> Table {
    let palette = Palette::for_theme(theme);
    let row = &detail.row;
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);

    table.add_row(row!["Address", row.address]);
    table.add_row(row!["Name", palette.field(&row.name)]);
    table.add_row(row!["Pubkey", row.pubkey]);
    if !row.duplicate_ips.is_empty() {
        table.add_row(row![
            "Shared with",
            row.duplicate_ips.join(", ").color(palette.accent)
        ]);
    }
    table.add_row(row!["Version", row.version]);
    table.add_row(row![
        "Last seen",
        format!(
            "{} ({})",
            row.last_seen.text.color(palette.freshness(row.last_seen.freshness)),
            detail.last_seen_utc.as_deref().unwrap_or("-")
        )
    ]);
    table.add_row(row!["Public", palette.field(&row.public)]);
    table.add_row(row!["Storage", palette.field(&row.storage)]);
    table.add_row(row!["Usage", palette.field(&row.usage)]);
    table.add_row(row!["Uptime", palette.field(&row.uptime)]);
    table.add_row(row!["Country", palette.field(&row.country)]);
    table.add_row(row!["Provider", palette.field(&row.provider)]);
    table.add_row(row!["Ping", palette.field(&row.ping)]);
    table.add_row(row!["Credits", palette.field(&row.credits)]);
    table.add_row(row!["Stake", palette.field(&row.stake)]);
    if let Some(enrichment) = &detail.enrichment {
        table.add_row(row!["NFTs", enrichment.nfts.len()]);
    }
    if let Some(error) = &detail.lookup_error {
        table.add_row(row!["Lookup error", error.color(palette.error)]);
    }
    for (key, value) in &detail.extra {
        table.add_row(row![key, value]);
    }

    table
}

/// One chat message as terminal text
pub fn render_message(message: &ChatMessage, theme: Theme) -> String {
    let palette = Palette::for_theme(theme);
    let mut out = match message.kind {
        MessageKind::User => format!("{} {}", "you>".bold(), message.text),
        MessageKind::Assistant => message.text.clone(),
        MessageKind::System => message.text.color(palette.muted).to_string(),
        MessageKind::Error => message.text.color(palette.error).to_string(),
    };

    if !message.sources.is_empty() {
        out.push_str("\n\nSOURCES:");
        for (i, source) in message.sources.iter().enumerate() {
            out.push_str(&format!("\n  [{}] {}", i + 1, source.display));
        }
    }
    if let Some(request_id) = &message.request_id {
        out.push_str(
            &format!("\n(request {}; rate with `podctl feedback {} up|down`)", request_id, request_id)
                .color(palette.muted)
                .to_string(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_dashboard::{Action, Dashboard};
    use pod_types::Pod;
    use serde_json::json;

    fn loaded(records: &[(&str, &str)]) -> Dashboard {
        let pods: Vec<Pod> = records
            .iter()
            .map(|(address, pubkey)| {
                serde_json::from_value(json!({
                    "address": address,
                    "pubkey": pubkey,
                    "version": "0.7.1-trynet",
                    "last_seen_timestamp": 0,
                }))
                .unwrap()
            })
            .collect();
        let mut dashboard = Dashboard::new("https://rpc.example.org/rpc", "https://rpc.example.org/geo");
        dashboard.reduce(Action::BeginCycle);
        dashboard.reduce(Action::PodsLoaded {
            generation: 1,
            pods,
            fetched_at: 0,
        });
        dashboard
    }

    #[test]
    fn test_table_rows_and_placeholders() {
        colored::control::set_override(false);
        let mut dashboard = loaded(&[("1.1.1.1:1", "abcdefghijklmnop"), ("2.2.2.2:1", "abcdefghijklmnop")]);
        dashboard.plan_lookups();

        let view = dashboard.view(7200);
        let text = render_table(&view, Theme::Dark).to_string();
        assert!(text.contains("1.1.1.1"));
        assert!(text.contains("abcd...mnop DUP 1"));
        assert!(text.contains("Loading..."));
        assert!(text.contains("2 hours ago"));
        assert!(text.contains("0.7.1"));
        assert!(!text.contains("trynet"));

        let lines = summary(&view, Theme::Dark);
        assert!(lines[0].contains("showing 2 of 2 pods"));
        assert!(lines.iter().any(|l| l == "2 lookups pending"));
    }

    #[test]
    fn test_detail_table() {
        colored::control::set_override(false);
        let dashboard = loaded(&[("1.1.1.1:1", "key")]);
        let detail = dashboard.detail("1.1.1.1", 0).unwrap();

        let text = render_detail(&detail, Theme::Light).to_string();
        assert!(text.contains("1.1.1.1:1"));
        assert!(text.contains("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_message_with_sources() {
        colored::control::set_override(false);
        let mut message = ChatMessage::new(MessageKind::Assistant, "Answer");
        message.sources = vec![pod_dashboard::chat::SourceView::new("https://docs.example.org")];
        message.request_id = Some("r1".to_string());

        let text = render_message(&message, Theme::Light);
        assert!(text.starts_with("Answer\n\nSOURCES:\n  [1] https://docs.example.org"));
        assert!(text.contains("podctl feedback r1 up|down"));
    }
}
