use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CcError;
use crate::utils::permissions::{ScopeList, passes_group_lists};

/// Stored trigger type numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Command = 0,
    StartsWith = 1,
    Contains = 2,
    Regex = 3,
    Exact = 4,
    Interval = 5,
    Reaction = 6,
    Component = 7,
    Modal = 8,
    Cron = 9,
    None = 10,
    RoleChange = 11,
}

impl TriggerKind {
    pub fn from_i32(value: i32) -> Result<Self, CcError> {
        let kind = match value {
            0 => Self::Command,
            1 => Self::StartsWith,
            2 => Self::Contains,
            3 => Self::Regex,
            4 => Self::Exact,
            5 => Self::Interval,
            6 => Self::Reaction,
            7 => Self::Component,
            8 => Self::Modal,
            9 => Self::Cron,
            10 => Self::None,
            11 => Self::RoleChange,
            other => return Err(CcError::UnknownTriggerType(other)),
        };
        Ok(kind)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Which event family a kind belongs to, if any
    pub fn category(self) -> Option<TriggerCategory> {
        match self {
            Self::Command | Self::StartsWith | Self::Contains | Self::Regex | Self::Exact => {
                Some(TriggerCategory::Message)
            }
            Self::Component | Self::Modal => Some(TriggerCategory::Interaction),
            Self::Reaction => Some(TriggerCategory::Reaction),
            Self::RoleChange => Some(TriggerCategory::RoleChange),
            Self::Interval | Self::Cron => Some(TriggerCategory::Timed),
            Self::None => None,
        }
    }
}

/// Groups of trigger kinds fetched together for one event family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCategory {
    Message,
    Interaction,
    Reaction,
    RoleChange,
    Timed,
}

impl TriggerCategory {
    pub fn kinds(self) -> &'static [TriggerKind] {
        match self {
            Self::Message => &[
                TriggerKind::Command,
                TriggerKind::StartsWith,
                TriggerKind::Contains,
                TriggerKind::Regex,
                TriggerKind::Exact,
            ],
            Self::Interaction => &[TriggerKind::Component, TriggerKind::Modal],
            Self::Reaction => &[TriggerKind::Reaction],
            Self::RoleChange => &[TriggerKind::RoleChange],
            Self::Timed => &[TriggerKind::Interval, TriggerKind::Cron],
        }
    }
}

/// Pattern text shared by the text-like trigger kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTrigger {
    pub text: String,
    pub case_sensitive: bool,
}

impl TextTrigger {
    pub fn new(text: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            text: text.into(),
            case_sensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionMode {
    #[default]
    Both = 0,
    AddOnly = 1,
    RemoveOnly = 2,
}

impl ReactionMode {
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => Self::AddOnly,
            2 => Self::RemoveOnly,
            _ => Self::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleTriggerMode {
    #[default]
    Both = 0,
    AddOnly = 1,
    RemoveOnly = 2,
}

impl RoleTriggerMode {
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => Self::AddOnly,
            2 => Self::RemoveOnly,
            _ => Self::Both,
        }
    }
}

/// How a component or modal interaction is acknowledged before the script runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionDeferMode {
    #[default]
    None = 0,
    Message = 1,
    EphemeralMessage = 2,
    Update = 3,
}

impl InteractionDeferMode {
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => Self::Message,
            2 => Self::EphemeralMessage,
            3 => Self::Update,
            _ => Self::None,
        }
    }
}

/// Weekdays (Sunday = 0) and UTC hours a timed command must not run in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeExclusions {
    pub weekdays: Vec<u8>,
    pub hours: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSchedule {
    pub minutes: i32,
    pub exclusions: TimeExclusions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pub expression: String,
    pub exclusions: TimeExclusions,
}

/// A command's trigger, carrying only the fields its kind reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Command(TextTrigger),
    StartsWith(TextTrigger),
    Contains(TextTrigger),
    Regex(TextTrigger),
    Exact(TextTrigger),
    Component(TextTrigger),
    Modal(TextTrigger),
    Reaction(ReactionMode),
    Interval(IntervalSchedule),
    Cron(CronSchedule),
    RoleChange(RoleTriggerMode),
    None,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Command(_) => TriggerKind::Command,
            Trigger::StartsWith(_) => TriggerKind::StartsWith,
            Trigger::Contains(_) => TriggerKind::Contains,
            Trigger::Regex(_) => TriggerKind::Regex,
            Trigger::Exact(_) => TriggerKind::Exact,
            Trigger::Component(_) => TriggerKind::Component,
            Trigger::Modal(_) => TriggerKind::Modal,
            Trigger::Reaction(_) => TriggerKind::Reaction,
            Trigger::Interval(_) => TriggerKind::Interval,
            Trigger::Cron(_) => TriggerKind::Cron,
            Trigger::RoleChange(_) => TriggerKind::RoleChange,
            Trigger::None => TriggerKind::None,
        }
    }

    /// Regex-triggered commands yield to every other kind
    pub fn is_regex(&self) -> bool {
        matches!(self, Trigger::Regex(_))
    }

    pub fn is_timed(&self) -> bool {
        matches!(self, Trigger::Interval(_) | Trigger::Cron(_))
    }

    /// Human readable trigger text
    pub fn describe(&self) -> String {
        match self {
            Trigger::Command(t)
            | Trigger::StartsWith(t)
            | Trigger::Contains(t)
            | Trigger::Regex(t)
            | Trigger::Exact(t)
            | Trigger::Component(t)
            | Trigger::Modal(t) => t.text.clone(),
            Trigger::Interval(i) => format!("every {} minutes", i.minutes),
            Trigger::Cron(c) => c.expression.clone(),
            Trigger::Reaction(_) | Trigger::RoleChange(_) | Trigger::None => String::new(),
        }
    }
}

/// Scoping policy shared by several commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    pub id: i64,
    pub guild_id: GuildId,
    pub name: String,
    pub ignore_roles: Vec<RoleId>,
    pub whitelist_roles: Vec<RoleId>,
    pub ignore_channels: Vec<ChannelId>,
    pub whitelist_channels: Vec<ChannelId>,
    pub disabled: bool,
}

impl CommandGroup {
    pub fn new(id: i64, guild_id: GuildId) -> Self {
        Self {
            id,
            guild_id,
            name: String::new(),
            ignore_roles: Vec::new(),
            whitelist_roles: Vec::new(),
            ignore_channels: Vec::new(),
            whitelist_channels: Vec::new(),
            disabled: false,
        }
    }

    pub fn allows_channel(&self, channel: ChannelId) -> bool {
        passes_group_lists(&[channel], &self.ignore_channels, &self.whitelist_channels)
    }

    pub fn allows_roles(&self, roles: &[RoleId]) -> bool {
        passes_group_lists(roles, &self.ignore_roles, &self.whitelist_roles)
    }
}

/// A guild-authored command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    pub guild_id: GuildId,
    pub local_id: i64,
    pub group: Option<Arc<CommandGroup>>,
    pub trigger: Trigger,
    pub channels: ScopeList<ChannelId>,
    pub roles: ScopeList<RoleId>,
    pub disabled: bool,
    pub response: String,
    pub context_channel: Option<ChannelId>,
    pub trigger_on_edit: bool,
    pub show_errors: bool,
    pub redirect_errors_channel: Option<ChannelId>,
    pub defer_mode: InteractionDeferMode,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: i64,
}

impl CustomCommand {
    pub fn new(guild_id: GuildId, local_id: i64, trigger: Trigger) -> Self {
        Self {
            guild_id,
            local_id,
            group: None,
            trigger,
            channels: ScopeList::default(),
            roles: ScopeList::default(),
            disabled: false,
            response: String::new(),
            context_channel: None,
            trigger_on_edit: false,
            show_errors: true,
            redirect_errors_channel: None,
            defer_mode: InteractionDeferMode::None,
            last_run: None,
            next_run: None,
            run_count: 0,
        }
    }

    /// Fails with the reason a command (or its group) may not run
    pub fn ensure_enabled(&self) -> Result<(), CcError> {
        if self.disabled {
            return Err(CcError::CommandDisabled(self.local_id));
        }
        if self.group.as_ref().is_some_and(|g| g.disabled) {
            return Err(CcError::GroupDisabled(self.local_id));
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.ensure_enabled().is_ok()
    }
}

/// A forwarded or original message as seen by triggers and scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub forwarded: Vec<String>,
}

impl MessageSnapshot {
    pub fn new(id: MessageId, channel_id: ChannelId, author_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id,
            channel_id,
            author_id,
            content: content.into(),
            forwarded: Vec::new(),
        }
    }

    /// Primary content followed by every forwarded block
    pub fn all_contents(&self) -> String {
        std::iter::once(self.content.as_str())
            .chain(self.forwarded.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Guild member as seen by scope checks and scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub bot: bool,
}

/// A command that matched an event, with what its trigger consumed
#[derive(Debug, Clone)]
pub struct TriggeredCc {
    pub cc: Arc<CustomCommand>,
    pub stripped: String,
    pub args: Vec<String>,
}

impl TriggeredCc {
    pub fn new(cc: Arc<CustomCommand>) -> Self {
        Self {
            cc,
            stripped: String::new(),
            args: Vec::new(),
        }
    }
}

/// Payload of a `cc_delayed_run` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedRunCcData {
    pub channel_id: ChannelId,
    pub cmd_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Vec<u8>>,
    #[serde(default)]
    pub member: Option<MemberInfo>,
    #[serde(default)]
    pub message: Option<MessageSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
}

/// Payload of a `cc_next_run` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRunScheduledEvent {
    pub cmd_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_numbers() {
        for n in 0..=11 {
            assert_eq!(TriggerKind::from_i32(n).unwrap().as_i32(), n);
        }
        assert!(matches!(
            TriggerKind::from_i32(42),
            Err(CcError::UnknownTriggerType(42))
        ));
    }

    #[test]
    fn test_categories() {
        assert_eq!(TriggerKind::Exact.category(), Some(TriggerCategory::Message));
        assert_eq!(TriggerKind::Modal.category(), Some(TriggerCategory::Interaction));
        assert_eq!(TriggerKind::Cron.category(), Some(TriggerCategory::Timed));
        assert_eq!(TriggerKind::None.category(), None);
        for category in [
            TriggerCategory::Message,
            TriggerCategory::Interaction,
            TriggerCategory::Reaction,
            TriggerCategory::RoleChange,
            TriggerCategory::Timed,
        ] {
            assert!(category.kinds().iter().all(|k| k.category() == Some(category)));
        }
    }

    #[test]
    fn test_group_disables_command() {
        let mut cc = CustomCommand::new(GuildId::new(1), 4, Trigger::None);
        assert!(cc.is_enabled());

        let mut group = CommandGroup::new(1, GuildId::new(1));
        group.disabled = true;
        cc.group = Some(Arc::new(group));
        assert!(matches!(cc.ensure_enabled(), Err(CcError::GroupDisabled(4))));

        cc.disabled = true;
        assert!(matches!(cc.ensure_enabled(), Err(CcError::CommandDisabled(4))));
    }

    #[test]
    fn test_all_contents() {
        let mut msg = MessageSnapshot::new(MessageId::new(1), ChannelId::new(2), UserId::new(3), "");
        msg.forwarded = vec!["first".into(), "second".into()];
        assert_eq!(msg.all_contents(), "first second");
    }

    #[test]
    fn test_delayed_payload_json() {
        let data = DelayedRunCcData {
            channel_id: ChannelId::new(5),
            cmd_id: 3,
            user_data: None,
            member: None,
            message: None,
            user_key: Some("unmute-7".into()),
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["cmd_id"], 3);
        assert_eq!(value["user_key"], "unmute-7");
        assert!(value.get("user_data").is_none());

        let parsed: DelayedRunCcData = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, data);
    }
}
