//! Command menu responder.

use async_trait::async_trait;
use kestrel::prelude::*;
use tracing::info;

/// Text that requests the menu.
pub const HELP_TRIGGER: &str = "帮助";

/// Replies with a numbered command list to a group message reading `帮助`.
pub struct HelpMenu {
    title: String,
    entries: Vec<(String, String)>,
}

impl HelpMenu {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    /// Appends a command and its description.
    pub fn entry(mut self, command: impl Into<String>, description: impl Into<String>) -> Self {
        self.entries.push((command.into(), description.into()));
        self
    }

    /// Renders the menu text.
    pub fn render(&self) -> String {
        let mut text = format!("{}\n\n可用命令：\n", self.title);
        for (i, (command, description)) in self.entries.iter().enumerate() {
            text.push_str(&format!("\n{}. {command}：{description}", i + 1));
        }
        text.push_str(&format!("\n{}. {HELP_TRIGGER}：显示此帮助菜单", self.entries.len() + 1));
        text
    }
}

#[async_trait]
impl Handler for HelpMenu {
    fn name(&self) -> &str {
        "help"
    }

    fn matches(&self, event: &Event) -> bool {
        matches!(event, Event::GroupMessage(msg) if msg.text.trim() == HELP_TRIGGER)
    }

    async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
        ctx.reply(event, &self.render()).await?;
        info!(reply_to = ?event.reply_target(), "Help menu sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::group_text;

    #[test]
    fn test_render_numbers_entries() {
        let menu = HelpMenu::new("kestrel帮助菜单")
            .entry("oi", "基础回复（回复io）")
            .entry("@机器人 （问题）", "和机器人聊天");

        assert_eq!(
            menu.render(),
            "kestrel帮助菜单\n\n可用命令：\n\n1. oi：基础回复（回复io）\n2. @机器人 （问题）：和机器人聊天\n3. 帮助：显示此帮助菜单"
        );
    }

    #[test]
    fn test_matches_trimmed_trigger() {
        let menu = HelpMenu::new("menu");
        assert!(menu.matches(&group_text(1, "帮助 ")));
        assert!(!menu.matches(&group_text(2, "帮助我")));
    }
}
