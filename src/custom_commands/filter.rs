use poise::serenity_prelude::RoleId;
use std::sync::Arc;

use super::matcher::MatchOutcome;
use super::state::ChannelInfo;
use super::types::{CustomCommand, TriggeredCc};

/// Channel scope: group lists first, then the command's own list.
/// Threads are checked through their parent.
pub fn runs_in_channel(cc: &CustomCommand, channel: &ChannelInfo) -> bool {
    let scope = channel.scope_id();
    if let Some(group) = &cc.group {
        if !group.allows_channel(scope) {
            return false;
        }
    }
    cc.channels.allows(&scope)
}

/// Role scope for the acting member
pub fn runs_for_member(cc: &CustomCommand, roles: &[RoleId]) -> bool {
    if let Some(group) = &cc.group {
        if !group.allows_roles(roles) {
            return false;
        }
    }
    cc.roles.allows_any(roles)
}

/// Role scope for role-change triggers, evaluated against the changed role
pub fn runs_for_role(cc: &CustomCommand, role: RoleId) -> bool {
    runs_for_member(cc, &[role])
}

/// Run the matcher over every enabled, in-channel command.
///
/// `roles` is checked when given; callers that only learn the member later pass `None`
/// and apply [`retain_for_member`] afterwards.
pub fn filter_candidates<F>(
    commands: &[Arc<CustomCommand>],
    channel: &ChannelInfo,
    roles: Option<&[RoleId]>,
    mut matcher: F,
) -> Vec<TriggeredCc>
where
    F: FnMut(&CustomCommand) -> Option<MatchOutcome>,
{
    commands
        .iter()
        .filter(|cc| cc.is_enabled())
        .filter(|cc| runs_in_channel(cc, channel))
        .filter(|cc| roles.is_none_or(|roles| runs_for_member(cc, roles)))
        .filter_map(|cc| {
            matcher(cc).map(|outcome| TriggeredCc {
                cc: Arc::clone(cc),
                stripped: outcome.stripped,
                args: outcome.args,
            })
        })
        .collect()
}

pub fn retain_for_member(candidates: &mut Vec<TriggeredCc>, roles: &[RoleId]) {
    candidates.retain(|t| runs_for_member(&t.cc, roles));
}

/// Non-regex triggers first, then ascending local id
pub fn sort_by_priority(candidates: &mut [TriggeredCc]) {
    candidates.sort_by_key(|t| (t.cc.trigger.is_regex(), t.cc.local_id));
}

/// Sort and keep at most `limit` candidates
pub fn resolve(mut candidates: Vec<TriggeredCc>, limit: usize) -> Vec<TriggeredCc> {
    sort_by_priority(&mut candidates);
    candidates.truncate(limit);
    candidates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Runs,
    Disabled,
    WrongChannel,
    MissingRoles,
    OverLimit,
}

#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub local_id: i64,
    pub trigger: String,
    pub verdict: Verdict,
}

/// Explain what happens to every command whose trigger matched, in priority order
pub fn diagnose(mut matched: Vec<TriggeredCc>, channel: &ChannelInfo, roles: &[RoleId], limit: usize) -> Vec<Diagnosis> {
    sort_by_priority(&mut matched);

    let mut running = 0;
    matched
        .into_iter()
        .map(|t| {
            let verdict = if !t.cc.is_enabled() {
                Verdict::Disabled
            } else if !runs_in_channel(&t.cc, channel) {
                Verdict::WrongChannel
            } else if !runs_for_member(&t.cc, roles) {
                Verdict::MissingRoles
            } else if running >= limit {
                Verdict::OverLimit
            } else {
                running += 1;
                Verdict::Runs
            };
            Diagnosis {
                local_id: t.cc.local_id,
                trigger: t.cc.trigger.describe(),
                verdict,
            }
        })
        .collect()
}
