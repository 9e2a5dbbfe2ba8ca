use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::{
    action::{resolve_title, Action, ReportAction},
    directory::Actor,
    formatting::{escape_html, split_text_chunks, truncate_chars},
    messaging::types::{ChatAction, InlineButton, InlineKeyboard},
    pagination::paginate,
    permissions::Capability,
    report::{self, ReportPeriod},
    texts,
    Result,
};

use super::{reply::Surface, views, Engine, REPORT_FETCH_LIMIT};

impl Engine {
    pub(crate) async fn on_report(&self, actor: &Actor, at: Surface, r: ReportAction) -> Result<()> {
        if !actor.can(Capability::RequestReports) {
            return self.show(at, texts::ACCESS_DENIED, InlineKeyboard::new()).await;
        }
        match r {
            ReportAction::Groups { period, page } => self.report_groups(actor, at, period, page).await,
            ReportAction::Generate { period, title } => {
                self.generate_report(actor, at, period, &title).await
            }
        }
    }

    async fn report_groups(
        &self,
        actor: &Actor,
        at: Surface,
        period: ReportPeriod,
        page: usize,
    ) -> Result<()> {
        let groups = self.directory.accessible_groups(actor).await?;
        if groups.is_empty() {
            return self.show(at, texts::NO_GROUPS, views::cancel_only()).await;
        }

        let p = paginate(&groups, page, self.settings.page_size);
        let mut kb = InlineKeyboard::new();
        for title in p.items {
            kb.push_row(vec![InlineButton::callback(
                format!("💬 {}", truncate_chars(title, self.settings.label_max_chars)),
                Action::from(ReportAction::Generate {
                    period,
                    title: title.clone(),
                })
                .encode(),
            )]);
        }
        if let Some(nav) = p.nav_row(|page| ReportAction::Groups { period, page }.into()) {
            kb.push_row(nav);
        }
        let kb = kb.row(vec![InlineButton::callback(
            texts::BACK,
            Action::Cancel.encode(),
        )]);
        let body = format!(
            "📊 <b>{} report</b>\n\nChoose a group:",
            period.label()
        );
        self.show(at, &body, kb).await
    }

    async fn generate_report(
        &self,
        actor: &Actor,
        at: Surface,
        period: ReportPeriod,
        token: &str,
    ) -> Result<()> {
        // Access is checked again here: grants may have changed since the
        // picker was drawn.
        let groups = self.directory.accessible_groups(actor).await?;
        let Some(title) = resolve_title(token, &groups) else {
            return self.show(at, texts::ACCESS_DENIED, views::cancel_only()).await;
        };

        self.show(at, texts::GENERATING, InlineKeyboard::new()).await?;
        let chat = at.chat_id();
        if let Err(e) = self.messenger.send_chat_action(chat, ChatAction::Typing).await {
            debug!(error = %e, "typing indicator failed");
        }

        let since = Utc::now() - Duration::days(period.days());
        let messages = self
            .store
            .group_messages(&title, since, REPORT_FETCH_LIMIT)
            .await?;
        let language = self.user_settings(actor.user_id).await?.language;

        let body = if messages.is_empty() {
            report::no_messages_notice(period, language)
        } else {
            info!(group = %title, period = period.as_str(), messages = messages.len(), "generating report");
            let generation = self.reporter.generate(&title, &messages, period, language);
            match tokio::time::timeout(self.settings.report_timeout, generation).await {
                Ok(text) => text,
                Err(_) => {
                    warn!(group = %title, timeout = ?self.settings.report_timeout, "report generation timed out");
                    report::timeout_notice(language)
                }
            }
        };

        self.deliver_report(at, period, &title, &body).await
    }

    /// First chunk replaces the progress message; the last one carries the
    /// follow-up buttons.
    async fn deliver_report(
        &self,
        at: Surface,
        period: ReportPeriod,
        title: &str,
        body: &str,
    ) -> Result<()> {
        let header = format!(
            "📊 <b>{} report: {}</b>\n\n",
            period.label(),
            escape_html(title)
        );
        let room = self
            .settings
            .safe_limit
            .saturating_sub(header.chars().count())
            .max(1);
        let chunks = split_text_chunks(body, room);
        let last = chunks.len().saturating_sub(1);

        let follow_up = InlineKeyboard::new()
            .button(
                texts::ANOTHER_REPORT,
                Action::from(ReportAction::Groups { period, page: 0 }).encode(),
            )
            .button(texts::HOME, Action::Cancel.encode());

        for (i, chunk) in chunks.iter().enumerate() {
            let mut html = escape_html(chunk);
            if i == 0 {
                html.insert_str(0, &header);
            }
            let kb = if i == last {
                follow_up.clone()
            } else {
                InlineKeyboard::new()
            };
            let target = if i == 0 { at } else { Surface::Send(at.chat_id()) };
            self.show(target, &html, kb).await?;
        }
        Ok(())
    }
}
