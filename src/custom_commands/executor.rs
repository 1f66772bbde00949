use async_trait::async_trait;
use chrono::Duration;
use poise::serenity_prelude::{ChannelId, GuildId, InteractionId, MessageId, RoleId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, error, warn};

use super::CcEngine;
use super::state::ChannelInfo;
use super::store::CommandStore;
use super::types::{CustomCommand, DelayedRunCcData, InteractionDeferMode, MemberInfo, MessageSnapshot};
use crate::constants::{MAX_MESSAGE_LENGTH, MAX_NESTED_DEPTH};
use crate::error::CcError;
use crate::utils::string_utils::exceeds_chars;

/// Position of a run in a chain of zero-delay nested runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionFrame {
    stack_depth: u8,
}

impl ExecutionFrame {
    pub const fn root() -> Self {
        Self { stack_depth: 0 }
    }

    pub fn stack_depth(self) -> u8 {
        self.stack_depth
    }

    /// Frame for an immediate nested run, refused past the depth limit
    pub fn nested(self) -> Result<Self, CcError> {
        if self.stack_depth >= MAX_NESTED_DEPTH {
            return Err(CcError::MaxNestedCalls(MAX_NESTED_DEPTH));
        }
        Ok(Self {
            stack_depth: self.stack_depth + 1,
        })
    }
}

/// An interaction that may be answered exactly once
#[derive(Debug)]
pub struct InteractionHandle {
    pub id: InteractionId,
    pub token: String,
    responded: AtomicBool,
}

impl InteractionHandle {
    pub fn new(id: InteractionId, token: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
            responded: AtomicBool::new(false),
        }
    }

    /// Take the single initial response; false if it was already used
    pub fn claim_response(&self) -> bool {
        !self.responded.swap(true, Ordering::SeqCst)
    }

    pub fn is_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Button,
    StringSelect,
    UserSelect,
    RoleSelect,
    MentionableSelect,
    ChannelSelect,
}

/// Trigger specific variables exposed to the script
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerData {
    Message {
        args: Vec<String>,
        stripped: String,
        cmd: String,
        cmd_args: Vec<String>,
        is_edit: bool,
    },
    Component {
        custom_id: String,
        stripped_id: String,
        kind: ComponentKind,
        values: Vec<String>,
        args: Vec<String>,
    },
    Modal {
        custom_id: String,
        stripped_id: String,
        values: Vec<String>,
        args: Vec<String>,
    },
    Reaction {
        message_id: MessageId,
        emoji: String,
        added: bool,
    },
    RoleChange {
        role_id: RoleId,
        added: bool,
        moderator: Option<MemberInfo>,
    },
    Delayed {
        exec_data: Option<serde_json::Value>,
    },
    Nested {
        exec_data: Option<serde_json::Value>,
    },
    Timed,
    RunNow,
}

/// Everything a script run can see
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub guild_id: GuildId,
    pub channel: ChannelInfo,
    pub member: Option<MemberInfo>,
    pub message: Option<MessageSnapshot>,
    pub cc_id: i64,
    pub cc_trigger: String,
    pub run_count: i64,
    pub frame: ExecutionFrame,
    pub interaction: Option<Arc<InteractionHandle>>,
    pub data: TriggerData,
}

impl TemplateContext {
    pub fn new(cmd: &CustomCommand, channel: ChannelInfo, data: TriggerData) -> Self {
        Self {
            guild_id: cmd.guild_id,
            channel,
            member: None,
            message: None,
            cc_id: cmd.local_id,
            cc_trigger: cmd.trigger.describe(),
            run_count: cmd.run_count,
            frame: ExecutionFrame::root(),
            interaction: None,
            data,
        }
    }

    pub fn with_member(mut self, member: Option<MemberInfo>) -> Self {
        self.member = member;
        self
    }

    pub fn with_message(mut self, message: Option<MessageSnapshot>) -> Self {
        self.message = message;
        self
    }

    pub fn with_frame(mut self, frame: ExecutionFrame) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_interaction(mut self, interaction: Option<Arc<InteractionHandle>>) -> Self {
        self.interaction = interaction;
        self
    }
}

/// Script runtime
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn execute(&self, script: &str, ctx: &TemplateContext, host: &CcHost) -> Result<String, CcError>;
}

/// Where command output goes
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), CcError>;

    async fn respond_interaction(
        &self,
        interaction: &InteractionHandle,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), CcError>;

    async fn followup_interaction(
        &self,
        interaction: &InteractionHandle,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), CcError>;

    async fn defer_interaction(
        &self,
        interaction: &InteractionHandle,
        mode: InteractionDeferMode,
    ) -> Result<(), CcError>;
}

/// Engine functions a running script may call back into
pub struct CcHost {
    engine: Arc<CcEngine>,
    guild_id: GuildId,
    member: Option<MemberInfo>,
    message: Option<MessageSnapshot>,
    frame: ExecutionFrame,
    interaction: Option<Arc<InteractionHandle>>,
    run_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

impl CcHost {
    fn for_context(engine: Arc<CcEngine>, ctx: &TemplateContext) -> Self {
        Self {
            engine,
            guild_id: ctx.guild_id,
            member: ctx.member.clone(),
            message: ctx.message.clone(),
            frame: ctx.frame,
            interaction: ctx.interaction.clone(),
            run_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    pub fn frame(&self) -> ExecutionFrame {
        self.frame
    }

    fn count_call(counter: &AtomicU32, limit: u32, name: &'static str) -> Result<(), CcError> {
        if counter.fetch_add(1, Ordering::SeqCst) >= limit {
            return Err(CcError::TooManyCalls(name));
        }
        Ok(())
    }

    fn delayed_payload(
        &self,
        cc_id: i64,
        channel_id: ChannelId,
        data: Option<&serde_json::Value>,
        user_key: Option<String>,
    ) -> Result<DelayedRunCcData, CcError> {
        let user_data = data.map(serde_json::to_vec).transpose()?;
        Ok(DelayedRunCcData {
            channel_id,
            cmd_id: cc_id,
            user_data,
            member: self.member.clone(),
            message: self.message.clone(),
            user_key,
        })
    }

    /// Run another command now (`delay_secs <= 0`) or later
    pub async fn exec_cc(
        &self,
        cc_id: i64,
        channel_id: ChannelId,
        delay_secs: i64,
        data: Option<serde_json::Value>,
    ) -> Result<(), CcError> {
        let engine = &self.engine;
        Self::count_call(&self.run_calls, engine.limits.run_calls(self.guild_id), "execCC")?;

        let cmd = engine
            .store
            .command(self.guild_id, cc_id)
            .await?
            .ok_or(CcError::UnknownCommand(cc_id))?;
        let channel = engine
            .state
            .channel(self.guild_id, channel_id)
            .ok_or(CcError::UnknownChannel)?;

        if delay_secs > 0 {
            let payload = self.delayed_payload(cc_id, channel.id, data.as_ref(), None)?;
            return engine
                .schedule_delayed_run(self.guild_id, payload, Duration::seconds(delay_secs))
                .await;
        }

        let frame = self.frame.nested()?;
        let ctx = TemplateContext::new(&cmd, channel, TriggerData::Nested { exec_data: data })
            .with_member(self.member.clone())
            .with_message(self.message.clone())
            .with_frame(frame);

        // nested runs report their own failures; they never fail the caller
        if let Err(e) = Box::pin(engine.execute_command(&cmd, ctx)).await {
            warn!(
                "Nested custom command #{} in guild {} failed: {}",
                cc_id, self.guild_id, e
            );
        }
        Ok(())
    }

    /// Schedule a run that replaces any pending one with the same key
    pub async fn schedule_unique_cc(
        &self,
        cc_id: i64,
        channel_id: ChannelId,
        delay_secs: i64,
        key: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Result<(), CcError> {
        let engine = &self.engine;
        Self::count_call(&self.run_calls, engine.limits.run_calls(self.guild_id), "scheduleUniqueCC")?;

        if engine.store.command(self.guild_id, cc_id).await?.is_none() {
            return Err(CcError::UnknownCommand(cc_id));
        }
        let channel = engine
            .state
            .channel(self.guild_id, channel_id)
            .ok_or(CcError::UnknownChannel)?;

        let payload = self.delayed_payload(cc_id, channel.id, data.as_ref(), Some(key.into()))?;
        engine
            .schedule_unique_run(self.guild_id, payload, Duration::seconds(delay_secs.max(0)))
            .await
    }

    pub async fn cancel_scheduled_unique_cc(&self, cc_id: i64, key: &str) -> Result<u64, CcError> {
        let engine = &self.engine;
        Self::count_call(
            &self.cancel_calls,
            engine.limits.cancel_calls(self.guild_id),
            "cancelScheduledUniqueCC",
        )?;
        engine.cancel_unique_run(self.guild_id, cc_id, key).await
    }

    /// Send the initial interaction response; allowed once per interaction
    pub async fn respond_interaction(&self, content: &str, ephemeral: bool) -> Result<(), CcError> {
        let interaction = self.interaction.as_ref().ok_or(CcError::Script(
            "no interaction to respond to".to_string(),
        ))?;
        if !interaction.claim_response() {
            return Err(CcError::AlreadyResponded);
        }
        self.engine
            .sink
            .respond_interaction(interaction, content, ephemeral)
            .await
    }
}

impl CcEngine {
    /// Run one command's script and route what it produced
    pub async fn execute_command(self: &Arc<Self>, cmd: &CustomCommand, ctx: TemplateContext) -> Result<(), CcError> {
        debug!(
            "Running custom command #{} in guild {} (depth {})",
            cmd.local_id,
            cmd.guild_id,
            ctx.frame.stack_depth()
        );

        let host = CcHost::for_context(Arc::clone(self), &ctx);
        let result = self.templates.execute(&cmd.response, &ctx, &host).await;

        let (output, failure) = match result {
            Ok(output) => (output, None),
            Err(e) => (String::new(), Some(e)),
        };

        let failure_text = failure.as_ref().map(|e| e.to_string());
        if let Err(e) = self
            .store
            .record_run(cmd.guild_id, cmd.local_id, failure_text.as_deref())
            .await
        {
            error!("Failed to record run of custom command #{}: {}", cmd.local_id, e);
        }

        let mut output = output.trim().to_string();
        if let Some(err) = &failure {
            warn!(
                "Custom command #{} in guild {} failed: {}",
                cmd.local_id, cmd.guild_id, err
            );
            if cmd.show_errors {
                let shown = if err.is_user_visible() {
                    err.to_string()
                } else {
                    "internal error".to_string()
                };
                let notice = format!(
                    "An error caused the execution of the custom command template to stop:\n`{}`",
                    shown
                );
                match cmd.redirect_errors_channel {
                    Some(redirect) => {
                        if let Err(e) = self.sink.send_message(redirect, &notice).await {
                            error!("Failed to send custom command error to {}: {}", redirect, e);
                        }
                    }
                    None if output.is_empty() => output = notice,
                    None => output = format!("{}\n\n{}", output, notice),
                }
            }
        }

        if exceeds_chars(&output, MAX_MESSAGE_LENGTH) {
            output = format!(
                "Custom command (#{}) response was longer than 2k (contact an admin on the server...)",
                cmd.local_id
            );
        }

        if output.is_empty() {
            return Ok(());
        }
        self.deliver(&ctx, &output).await
    }

    async fn deliver(&self, ctx: &TemplateContext, output: &str) -> Result<(), CcError> {
        match &ctx.interaction {
            Some(interaction) if interaction.claim_response() => {
                self.sink.respond_interaction(interaction, output, false).await
            }
            Some(interaction) => self.sink.followup_interaction(interaction, output, false).await,
            None => self.sink.send_message(ctx.channel.id, output).await,
        }
    }
}
