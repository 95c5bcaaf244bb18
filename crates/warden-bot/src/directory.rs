//! Public group directory: category buttons and per-category link lists.

use tracing::warn;
use warden_shared::{ChatRecord, InlineButton, OutgoingMessage, ParseMode};
use warden_store::{Bucket, CategoryTree};

use crate::callback::{CallbackData, CategoryRef};
use crate::context::BotContext;
use crate::error::{BotError, Result};

const EMPTY_CATEGORY: &str = "No groups in this category";

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Top-level menu: one button per bucket, uncategorized first.
pub async fn groups_menu(ctx: &BotContext) -> Result<OutgoingMessage> {
    let tree = ctx.registry.category_tree(&ctx.assignments).await?;

    let keyboard: Vec<Vec<InlineButton>> = tree
        .buckets()
        .into_iter()
        .scan(0usize, |index, bucket| {
            let button = match bucket {
                Bucket::Uncategorized(_) => InlineButton::new(
                    "Uncategorized",
                    CallbackData::Category(CategoryRef::Uncategorized).to_string(),
                ),
                Bucket::Category { name, .. } => {
                    let data = CallbackData::Category(CategoryRef::Index(*index)).to_string();
                    *index += 1;
                    InlineButton::new(name, data)
                }
            };
            Some(vec![button])
        })
        .collect();

    if keyboard.is_empty() {
        return Ok(OutgoingMessage::text("No groups yet"));
    }
    Ok(OutgoingMessage::text("Select a category").with_keyboard(keyboard))
}

/// Append `title: link` for every visible chat. Chats whose link can't be
/// produced are left out.
async fn write_links(ctx: &BotContext, out: &mut String, chats: &[ChatRecord]) {
    for chat in chats.iter().filter(|c| !c.hidden) {
        match ctx
            .registry
            .resolve_invite_link(ctx.platform.as_ref(), chat.clone())
            .await
        {
            Ok((link, record)) => {
                out.push_str(&escape_html(&record.title));
                out.push_str(": ");
                out.push_str(&link);
                out.push('\n');
            }
            Err(e) => warn!(chat = %chat.id, error = %e, "can't get invite link"),
        }
    }
}

async fn render_node(ctx: &BotContext, node: &CategoryTree, with_sub_categories: bool) -> String {
    let mut out = String::new();

    if !node.chats.is_empty() {
        write_links(ctx, &mut out, &node.chats).await;
        if !out.is_empty() {
            out.push('\n');
        }
    }

    if with_sub_categories {
        for (name, sub) in &node.sub_categories {
            let mut section = String::new();
            write_links(ctx, &mut section, &sub.chats).await;
            if section.is_empty() {
                continue;
            }
            out.push_str(&format!("<b>{}</b>\n", escape_html(name)));
            out.push_str(&section);
            out.push('\n');
        }
    }

    if out.is_empty() {
        out.push_str(EMPTY_CATEGORY);
    }
    out
}

/// Link list of one directory entry. The tree is rebuilt for every request.
pub async fn category_view(ctx: &BotContext, which: CategoryRef) -> Result<OutgoingMessage> {
    let tree = ctx.registry.category_tree(&ctx.assignments).await?;

    let text = match which {
        CategoryRef::Uncategorized => render_node(ctx, &tree, false).await,
        CategoryRef::Index(i) => {
            let (_, node) = tree
                .category_at(i)
                .ok_or_else(|| BotError::NotFound(format!("category #{i}")))?;
            render_node(ctx, node, true).await
        }
    };

    Ok(OutgoingMessage::text(text.trim_end()).with_mode(ParseMode::Html))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_shared::mock::Call;
    use warden_store::CategoryAssignments;

    use super::*;
    use crate::blacklist::NoBlacklist;
    use crate::context::testing::*;

    fn assignments() -> CategoryAssignments {
        let mut a = CategoryAssignments::default();
        a.assign(warden_shared::ChatId(-1), "Physics", None);
        a.assign(warden_shared::ChatId(-2), "Physics", Some("Second year"));
        a.assign(warden_shared::ChatId(-3), "Art", None);
        a.assign(warden_shared::ChatId(-4), "Physics", None);
        a
    }

    #[tokio::test]
    async fn menu_lists_uncategorized_first() {
        let (platform, ctx) = context_with(assignments(), Arc::new(NoBlacklist)).await;
        for chat in [group(-1, "Mechanics"), group(-3, "Baroque"), group(-9, "Chit chat")] {
            platform.add_chat(chat.clone());
            ctx.registry.upsert(&chat).await.unwrap();
        }

        let menu = groups_menu(&ctx).await.unwrap();
        let buttons: Vec<(String, String)> = menu
            .keyboard
            .unwrap()
            .into_iter()
            .flatten()
            .map(|b| (b.text, b.data))
            .collect();
        assert_eq!(
            buttons,
            vec![
                ("Uncategorized".into(), "cat:-".into()),
                ("Art".into(), "cat:0".into()),
                ("Physics".into(), "cat:1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn category_view_skips_hidden_and_shows_sub_categories() {
        let (platform, ctx) = context_with(assignments(), Arc::new(NoBlacklist)).await;
        let mut hidden = group(-4, "Secret physics");
        hidden.hidden = true;

        for chat in [group(-1, "Mechanics"), group(-2, "Thermodynamics"), hidden.clone()] {
            platform.add_chat(chat.clone());
            ctx.registry.upsert(&chat).await.unwrap();
        }

        let view = category_view(&ctx, CategoryRef::Index(0)).await.unwrap();
        assert_eq!(view.parse_mode, ParseMode::Html);
        assert!(view.text.starts_with("Mechanics: https://t.me/+1-"));
        assert!(view.text.contains("<b>Second year</b>\nThermodynamics: "));
        assert!(!view.text.contains("Secret"));
        assert_eq!(platform.count(|c| matches!(c, Call::ExportLink(id) if *id == hidden.id)), 0);
    }

    #[tokio::test]
    async fn empty_category_and_bad_index() {
        let (platform, ctx) = context().await;
        let mut hidden = group(-1, "Hidden");
        hidden.hidden = true;
        platform.add_chat(hidden.clone());
        ctx.registry.upsert(&hidden).await.unwrap();

        let view = category_view(&ctx, CategoryRef::Uncategorized).await.unwrap();
        assert_eq!(view.text, EMPTY_CATEGORY);

        assert!(matches!(
            category_view(&ctx, CategoryRef::Index(5)).await,
            Err(BotError::NotFound(_))
        ));
    }
}
