//! In-memory stand-ins for every collaborator of the engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::executor::{CcHost, InteractionHandle, ResponseSink, TemplateContext, TemplateEngine};
use super::guards::KvStore;
use super::limits::Limits;
use super::state::{ChannelInfo, GuildPresence, GuildStateSource};
use super::store::CommandStore;
use super::types::{CustomCommand, InteractionDeferMode, MemberInfo, Trigger, TriggerCategory};
use super::{CcEngine, EngineParts};
use crate::error::CcError;
use crate::schedule::{EventScheduler, NewScheduledEvent, PendingFilter};

pub const BOT_ID: u64 = 204255221017214977;

pub fn text_command(guild_id: GuildId, local_id: i64, trigger: Trigger) -> CustomCommand {
    CustomCommand::new(guild_id, local_id, trigger)
}

pub fn member(user_id: u64, roles: &[u64]) -> MemberInfo {
    MemberInfo {
        user_id: UserId::new(user_id),
        display_name: format!("user{}", user_id),
        roles: roles.iter().map(|r| RoleId::new(*r)).collect(),
        bot: false,
    }
}

#[derive(Default)]
pub struct MemoryKv {
    keys: Mutex<HashMap<String, Instant>>,
    buckets: Mutex<HashMap<String, (f64, Instant)>>,
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, CcError> {
        let keys = self.keys.lock().unwrap();
        Ok(keys
            .get(&format!("{}:{}", bucket, key))
            .is_some_and(|expires| *expires > Instant::now()))
    }

    async fn set_if_absent(&self, bucket: &str, key: &str, ttl: Duration) -> Result<bool, CcError> {
        let mut keys = self.keys.lock().unwrap();
        let full = format!("{}:{}", bucket, key);
        let now = Instant::now();
        if keys.get(&full).is_some_and(|expires| *expires > now) {
            return Ok(false);
        }
        keys.insert(full, now + ttl);
        Ok(true)
    }

    async fn take_token(&self, key: &str, rate: f64, burst: u32) -> Result<bool, CcError> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let (tokens, updated) = buckets
            .entry(key.to_string())
            .or_insert((f64::from(burst), now));

        let refilled = *tokens + now.duration_since(*updated).as_secs_f64() * rate;
        *tokens = refilled.min(f64::from(burst));
        *updated = now;

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    commands: Mutex<HashMap<(GuildId, i64), CustomCommand>>,
    prefixes: Mutex<HashMap<GuildId, String>>,
    runs: Mutex<Vec<(i64, Option<String>)>>,
    list_fetches: AtomicUsize,
}

impl FakeStore {
    pub fn insert(&self, cc: CustomCommand) {
        self.commands
            .lock()
            .unwrap()
            .insert((cc.guild_id, cc.local_id), cc);
    }

    pub fn get(&self, guild_id: GuildId, local_id: i64) -> Option<CustomCommand> {
        self.commands.lock().unwrap().get(&(guild_id, local_id)).cloned()
    }

    pub fn set_prefix(&self, guild_id: GuildId, prefix: &str) {
        self.prefixes
            .lock()
            .unwrap()
            .insert(guild_id, prefix.to_string());
    }

    /// Errors recorded per run, in completion order
    pub fn run_errors(&self) -> Vec<Option<String>> {
        self.runs.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn runs_of(&self, local_id: i64) -> usize {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == local_id)
            .count()
    }

    pub fn list_fetches(&self) -> usize {
        self.list_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandStore for FakeStore {
    async fn commands_by_category(
        &self,
        guild_id: GuildId,
        category: TriggerCategory,
    ) -> Result<Vec<Arc<CustomCommand>>, CcError> {
        self.list_fetches.fetch_add(1, Ordering::SeqCst);
        let mut found: Vec<_> = self
            .commands
            .lock()
            .unwrap()
            .values()
            .filter(|cc| cc.guild_id == guild_id && category.kinds().contains(&cc.trigger.kind()))
            .cloned()
            .map(Arc::new)
            .collect();
        found.sort_by_key(|cc| cc.local_id);
        Ok(found)
    }

    async fn command(&self, guild_id: GuildId, local_id: i64) -> Result<Option<CustomCommand>, CcError> {
        Ok(self.get(guild_id, local_id))
    }

    async fn command_prefix(&self, guild_id: GuildId) -> Result<Option<String>, CcError> {
        Ok(self.prefixes.lock().unwrap().get(&guild_id).cloned())
    }

    async fn update_run_times(
        &self,
        guild_id: GuildId,
        local_id: i64,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), CcError> {
        if let Some(cc) = self.commands.lock().unwrap().get_mut(&(guild_id, local_id)) {
            if last_run.is_some() {
                cc.last_run = last_run;
            }
            cc.next_run = next_run;
        }
        Ok(())
    }

    async fn record_run(&self, guild_id: GuildId, local_id: i64, error: Option<&str>) -> Result<(), CcError> {
        self.runs
            .lock()
            .unwrap()
            .push((local_id, error.map(str::to_string)));
        if let Some(cc) = self.commands.lock().unwrap().get_mut(&(guild_id, local_id)) {
            cc.run_count += 1;
        }
        Ok(())
    }

    async fn overdue_timed_commands(&self, before: DateTime<Utc>) -> Result<Vec<CustomCommand>, CcError> {
        Ok(self
            .commands
            .lock()
            .unwrap()
            .values()
            .filter(|cc| cc.is_enabled() && cc.trigger.is_timed())
            .filter(|cc| cc.next_run.is_none_or(|next| next < before))
            .cloned()
            .collect())
    }
}

pub struct FakeState {
    presence: Mutex<GuildPresence>,
    channels: Mutex<HashMap<ChannelId, ChannelInfo>>,
    roles: Mutex<HashSet<RoleId>>,
    members: Mutex<HashMap<UserId, MemberInfo>>,
    bot_on_guild: AtomicBool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            presence: Mutex::new(GuildPresence::Available),
            channels: Mutex::new(HashMap::new()),
            roles: Mutex::new(HashSet::new()),
            members: Mutex::new(HashMap::new()),
            bot_on_guild: AtomicBool::new(true),
        }
    }
}

impl FakeState {
    pub fn set_presence(&self, presence: GuildPresence) {
        *self.presence.lock().unwrap() = presence;
    }

    pub fn set_bot_on_guild(&self, on_guild: bool) {
        self.bot_on_guild.store(on_guild, Ordering::SeqCst);
    }

    pub fn add_channel(&self, channel: ChannelInfo) {
        self.channels.lock().unwrap().insert(channel.id, channel);
    }

    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.channels.lock().unwrap().remove(&channel_id);
    }

    pub fn add_role(&self, role_id: RoleId) {
        self.roles.lock().unwrap().insert(role_id);
    }

    pub fn add_member(&self, member: MemberInfo) {
        self.members.lock().unwrap().insert(member.user_id, member);
    }
}

#[async_trait]
impl GuildStateSource for FakeState {
    fn guild_presence(&self, _guild_id: GuildId) -> GuildPresence {
        *self.presence.lock().unwrap()
    }

    fn channel(&self, _guild_id: GuildId, channel_id: ChannelId) -> Option<ChannelInfo> {
        self.channels.lock().unwrap().get(&channel_id).cloned()
    }

    fn role_exists(&self, _guild_id: GuildId, role_id: RoleId) -> bool {
        self.roles.lock().unwrap().contains(&role_id)
    }

    async fn member(&self, _guild_id: GuildId, user_id: UserId) -> Result<MemberInfo, CcError> {
        self.members
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or(CcError::UnknownMember)
    }

    async fn bot_on_guild(&self, _guild_id: GuildId) -> Result<bool, CcError> {
        Ok(self.bot_on_guild.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Message(ChannelId, String),
    Respond(String),
    Followup(String),
    Defer(InteractionDeferMode),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Message(_, text) | SinkCall::Respond(text) | SinkCall::Followup(text) => Some(text),
                SinkCall::Defer(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), CcError> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Message(channel_id, content.to_string()));
        Ok(())
    }

    async fn respond_interaction(
        &self,
        _interaction: &InteractionHandle,
        content: &str,
        _ephemeral: bool,
    ) -> Result<(), CcError> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Respond(content.to_string()));
        Ok(())
    }

    async fn followup_interaction(
        &self,
        _interaction: &InteractionHandle,
        content: &str,
        _ephemeral: bool,
    ) -> Result<(), CcError> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Followup(content.to_string()));
        Ok(())
    }

    async fn defer_interaction(
        &self,
        _interaction: &InteractionHandle,
        mode: InteractionDeferMode,
    ) -> Result<(), CcError> {
        self.calls.lock().unwrap().push(SinkCall::Defer(mode));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    events: Mutex<Vec<NewScheduledEvent>>,
}

impl FakeScheduler {
    pub fn pending(&self) -> Vec<NewScheduledEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventScheduler for FakeScheduler {
    async fn schedule(&self, event: NewScheduledEvent) -> Result<(), CcError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn schedule_replacing(&self, event: NewScheduledEvent) -> Result<(), CcError> {
        let mut events = self.events.lock().unwrap();
        events.retain(|e| {
            !(e.name == event.name
                && e.guild_id == event.guild_id
                && e.cmd_id == event.cmd_id
                && e.unique_key == event.unique_key)
        });
        events.push(event);
        Ok(())
    }

    async fn delete_pending(&self, filter: &PendingFilter) -> Result<u64, CcError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| !filter.matches(e));
        Ok((before - events.len()) as u64)
    }
}

/// Returns the script as output; `error: <msg>` fails with `<msg>`
pub struct EchoEngine;

#[async_trait]
impl TemplateEngine for EchoEngine {
    async fn execute(&self, script: &str, _ctx: &TemplateContext, _host: &CcHost) -> Result<String, CcError> {
        match script.strip_prefix("error: ") {
            Some(message) => Err(CcError::Script(message.to_string())),
            None => Ok(script.to_string()),
        }
    }
}

/// An engine wired to fakes, with one available guild and channel
pub struct Harness {
    pub engine: Arc<CcEngine>,
    pub store: Arc<FakeStore>,
    pub state: Arc<FakeState>,
    pub sink: Arc<RecordingSink>,
    pub scheduler: Arc<FakeScheduler>,
    pub kv: Arc<MemoryKv>,
    pub guild: GuildId,
    pub channel: ChannelId,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(EchoEngine), Limits::default())
    }

    pub fn with_engine(templates: Arc<dyn TemplateEngine>) -> Self {
        Self::build(templates, Limits::default())
    }

    pub fn premium() -> Self {
        let guild = GuildId::new(100);
        Self::build(Arc::new(EchoEngine), Limits::new([guild].into_iter().collect()))
    }

    fn build(templates: Arc<dyn TemplateEngine>, limits: Limits) -> Self {
        let guild = GuildId::new(100);
        let channel = ChannelId::new(200);

        let store = Arc::new(FakeStore::default());
        let state = Arc::new(FakeState::default());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(FakeScheduler::default());
        let kv = Arc::new(MemoryKv::default());

        state.add_channel(ChannelInfo::new(channel, guild));

        let engine = CcEngine::new(EngineParts {
            store: store.clone(),
            cache_ttl: Duration::ZERO,
            state: state.clone(),
            templates,
            sink: sink.clone(),
            scheduler: scheduler.clone(),
            kv: kv.clone(),
            limits,
            bot_id: UserId::new(BOT_ID),
            default_prefix: "-".to_string(),
        });

        Self {
            engine,
            store,
            state,
            sink,
            scheduler,
            kv,
            guild,
            channel,
        }
    }

    pub fn channel_info(&self) -> ChannelInfo {
        ChannelInfo::new(self.channel, self.guild)
    }
}
