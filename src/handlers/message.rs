use poise::serenity_prelude::{ChannelId, GuildId, RoleId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::custom_commands::filter::{Diagnosis, diagnose, filter_candidates, resolve};
use crate::custom_commands::matcher::{content_for, match_text};
use crate::custom_commands::{
    CcEngine, CommandStore, MemberInfo, MessageSnapshot, TemplateContext,
    TriggerCategory, TriggerData, TriggeredCc,
};
use crate::error::CcError;

/// A message posted or edited in a guild channel
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author: MemberInfo,
    pub message: MessageSnapshot,
    pub is_edit: bool,
}

/// Find the message commands this message fires, in run order
async fn message_candidates(engine: &CcEngine, event: &MessageEvent) -> Result<Vec<TriggeredCc>, CcError> {
    if event.author.bot {
        return Ok(Vec::new());
    }
    if event.is_edit && !engine.limits().is_premium(event.guild_id) {
        return Ok(Vec::new());
    }

    let channel = engine
        .state()
        .channel(event.guild_id, event.channel_id)
        .ok_or(CcError::UnknownChannel)?;

    let mut commands = engine
        .store()
        .commands_by_category(event.guild_id, TriggerCategory::Message)
        .await?;
    if event.is_edit {
        commands.retain(|cc| cc.trigger_on_edit);
    }
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let prefix = engine.command_prefix(event.guild_id).await;
    let matched = filter_candidates(&commands, &channel, Some(&event.author.roles), |cc| {
        let input = content_for(&cc.trigger, &event.message);
        match_text(&cc.trigger, &input, &prefix, engine.bot_id(), engine.regexes())
    });

    Ok(resolve(matched, engine.limits().exec_limit(event.guild_id)))
}

/// Explain what a member's message with `text` would do in a channel.
///
/// Every message command whose trigger matches is listed, including disabled ones.
pub async fn diagnose_message(
    engine: &CcEngine,
    guild_id: GuildId,
    channel_id: ChannelId,
    roles: &[RoleId],
    text: &str,
) -> Result<Vec<Diagnosis>, CcError> {
    let channel = engine
        .state()
        .channel(guild_id, channel_id)
        .ok_or(CcError::UnknownChannel)?;
    let commands = engine
        .store()
        .commands_by_category(guild_id, TriggerCategory::Message)
        .await?;
    let prefix = engine.command_prefix(guild_id).await;

    let matched = commands
        .iter()
        .filter_map(|cc| {
            match_text(&cc.trigger, text, &prefix, engine.bot_id(), engine.regexes()).map(|outcome| TriggeredCc {
                cc: Arc::clone(cc),
                stripped: outcome.stripped,
                args: outcome.args,
            })
        })
        .collect();

    Ok(diagnose(matched, &channel, roles, engine.limits().exec_limit(guild_id)))
}

/// Run every command a message fires; returns how many ran
pub async fn handle_message(engine: &Arc<CcEngine>, event: MessageEvent) -> Result<usize, CcError> {
    let candidates = message_candidates(engine, &event).await?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let channel = engine
        .state()
        .channel(event.guild_id, event.channel_id)
        .ok_or(CcError::UnknownChannel)?;

    debug!(
        "Message {} in guild {} fired {} custom command(s)",
        event.message.id,
        event.guild_id,
        candidates.len()
    );

    let ran = candidates.len();
    for triggered in candidates {
        let cmd_args = triggered.args.iter().skip(1).cloned().collect();
        let data = TriggerData::Message {
            cmd: triggered.args.first().cloned().unwrap_or_default(),
            cmd_args,
            args: triggered.args,
            stripped: triggered.stripped,
            is_edit: event.is_edit,
        };
        let ctx = TemplateContext::new(&triggered.cc, channel.clone(), data)
            .with_member(Some(event.author.clone()))
            .with_message(Some(event.message.clone()));

        if let Err(e) = engine.execute_command(&triggered.cc, ctx).await {
            error!(
                "Failed to run custom command #{} in guild {}: {}",
                triggered.cc.local_id, event.guild_id, e
            );
        }
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_commands::testing::{Harness, SinkCall, member, text_command};
    use crate::custom_commands::{TextTrigger, Trigger};
    use poise::serenity_prelude::{MessageId, RoleId, UserId};

    fn message(h: &Harness, content: &str) -> MessageEvent {
        MessageEvent {
            guild_id: h.guild,
            channel_id: h.channel,
            author: member(10, &[]),
            message: MessageSnapshot::new(MessageId::new(1), h.channel, UserId::new(10), content),
            is_edit: false,
        }
    }

    fn add(h: &Harness, id: i64, trigger: Trigger, response: &str) {
        let mut cc = text_command(h.guild, id, trigger);
        cc.response = response.to_string();
        h.store.insert(cc);
    }

    #[tokio::test]
    async fn test_prefixed_command_runs() {
        let h = Harness::new();
        h.store.set_prefix(h.guild, "!!!");
        add(&h, 1, Trigger::Command(TextTrigger::new("freezeit", false)), "frozen");

        let ran = handle_message(&h.engine, message(&h, "!!!freezeit then cut it")).await.unwrap();
        assert_eq!(ran, 1);
        assert_eq!(h.sink.calls(), vec![SinkCall::Message(h.channel, "frozen".into())]);

        let ran = handle_message(&h.engine, message(&h, "freezeit then cut it")).await.unwrap();
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn test_run_order_and_limit() {
        let h = Harness::new();
        add(&h, 1, Trigger::Regex(TextTrigger::new("cut", false)), "regex");
        add(&h, 2, Trigger::Contains(TextTrigger::new("freezeit", false)), "contains 2");
        add(&h, 3, Trigger::StartsWith(TextTrigger::new("i want", false)), "starts 3");
        add(&h, 4, Trigger::Contains(TextTrigger::new("then", false)), "contains 4");

        let ran = handle_message(&h.engine, message(&h, "I want you to freezeit then cut it"))
            .await
            .unwrap();
        assert_eq!(ran, 3);
        assert_eq!(h.sink.messages(), vec!["contains 2", "starts 3", "contains 4"]);
    }

    #[tokio::test]
    async fn test_failing_command_does_not_block_others() {
        let h = Harness::new();
        add(&h, 1, Trigger::Contains(TextTrigger::new("go", false)), "error: nope");
        add(&h, 2, Trigger::Contains(TextTrigger::new("go", false)), "went");

        let mut cc = h.store.get(h.guild, 1).unwrap();
        cc.show_errors = false;
        h.store.insert(cc);

        assert_eq!(handle_message(&h.engine, message(&h, "go")).await.unwrap(), 2);
        assert_eq!(h.sink.messages(), vec!["went"]);
        assert_eq!(h.store.run_errors(), vec![Some("nope".to_string()), None]);
    }

    #[tokio::test]
    async fn test_bots_and_role_scope() {
        let h = Harness::new();
        let mut cc = text_command(h.guild, 1, Trigger::Exact(TextTrigger::new("hi", false)));
        cc.response = "hello".into();
        cc.roles.ids = vec![RoleId::new(5)];
        cc.roles.whitelist = true;
        h.store.insert(cc);

        let mut event = message(&h, "hi");
        assert_eq!(handle_message(&h.engine, event.clone()).await.unwrap(), 0);

        event.author = member(10, &[5]);
        assert_eq!(handle_message(&h.engine, event.clone()).await.unwrap(), 1);

        event.author.bot = true;
        assert_eq!(handle_message(&h.engine, event).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edits_need_premium_and_flag() {
        let h = Harness::premium();
        add(&h, 1, Trigger::Exact(TextTrigger::new("hi", false)), "plain");
        let mut cc = text_command(h.guild, 2, Trigger::Exact(TextTrigger::new("hi", false)));
        cc.response = "edited".into();
        cc.trigger_on_edit = true;
        h.store.insert(cc);

        let mut event = message(&h, "hi");
        event.is_edit = true;
        assert_eq!(handle_message(&h.engine, event.clone()).await.unwrap(), 1);
        assert_eq!(h.sink.messages(), vec!["edited"]);

        let free = Harness::new();
        let mut cc = text_command(free.guild, 2, Trigger::Exact(TextTrigger::new("hi", false)));
        cc.trigger_on_edit = true;
        free.store.insert(cc);
        event.guild_id = free.guild;
        event.channel_id = free.channel;
        assert_eq!(handle_message(&free.engine, event).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forwarded_text_fires_contains() {
        let h = Harness::new();
        add(&h, 1, Trigger::Contains(TextTrigger::new("freezeit", false)), "contains");
        add(&h, 2, Trigger::Exact(TextTrigger::new("freezeit", false)), "exact");

        let mut event = message(&h, "");
        event.message.forwarded = vec!["freezeit".into()];
        assert_eq!(handle_message(&h.engine, event).await.unwrap(), 1);
        assert_eq!(h.sink.messages(), vec!["contains"]);
    }

    #[tokio::test]
    async fn test_disabled_group_is_skipped() {
        use crate::custom_commands::CommandGroup;

        let h = Harness::new();
        let mut group = CommandGroup::new(7, h.guild);
        group.disabled = true;
        let mut cc = text_command(h.guild, 1, Trigger::Contains(TextTrigger::new("go", false)));
        cc.response = "grouped".into();
        cc.group = Some(Arc::new(group));
        h.store.insert(cc);
        add(&h, 2, Trigger::Contains(TextTrigger::new("go", false)), "loose");

        assert_eq!(handle_message(&h.engine, message(&h, "go")).await.unwrap(), 1);
        assert_eq!(h.sink.messages(), vec!["loose"]);
    }

    #[tokio::test]
    async fn test_diagnose_lists_every_match() {
        use crate::custom_commands::filter::Verdict;

        let h = Harness::new();
        for id in 1..=5 {
            add(&h, id, Trigger::Contains(TextTrigger::new("x", false)), "x");
        }
        let mut disabled = h.store.get(h.guild, 2).unwrap();
        disabled.disabled = true;
        h.store.insert(disabled);
        add(&h, 6, Trigger::Exact(TextTrigger::new("other", false)), "no");

        let report = diagnose_message(&h.engine, h.guild, h.channel, &[], "x").await.unwrap();
        let verdicts: Vec<_> = report.iter().map(|d| (d.local_id, d.verdict)).collect();
        assert_eq!(
            verdicts,
            vec![
                (1, Verdict::Runs),
                (2, Verdict::Disabled),
                (3, Verdict::Runs),
                (4, Verdict::Runs),
                (5, Verdict::OverLimit),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_channel_aborts() {
        let h = Harness::new();
        add(&h, 1, Trigger::Contains(TextTrigger::new("x", false)), "x");
        h.state.remove_channel(h.channel);
        assert!(matches!(
            handle_message(&h.engine, message(&h, "x")).await,
            Err(CcError::UnknownChannel)
        ));
    }
}
