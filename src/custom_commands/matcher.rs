use poise::serenity_prelude::UserId;
use std::borrow::Cow;
use tracing::warn;

use super::regex_cache::RegexCache;
use super::types::{MessageSnapshot, ReactionMode, RoleTriggerMode, Trigger};
use crate::utils::string_utils::split_args;

/// What a text trigger consumed from its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Everything after the consumed prefix, with surrounding whitespace trimmed
    pub stripped: String,
    /// Consumed prefix first, then the split remainder
    pub args: Vec<String>,
}

/// Build the full regex for a text-like trigger, flags included.
///
/// Returns `None` for trigger kinds that are not matched against text.
pub fn build_pattern(trigger: &Trigger, prefix: &str, bot_id: UserId) -> Option<String> {
    let (body, text) = match trigger {
        Trigger::Command(t) => (
            format!(
                r"\A(<@!?{}> ?|{}){}(\z|[[:space:]])",
                bot_id,
                regex::escape(prefix),
                regex::escape(&t.text)
            ),
            t,
        ),
        Trigger::StartsWith(t) => (format!(r"\A{}", regex::escape(&t.text)), t),
        Trigger::Contains(t) => (regex::escape(&t.text), t),
        Trigger::Exact(t) => (format!(r"\A{}\z", regex::escape(&t.text)), t),
        Trigger::Regex(t) | Trigger::Component(t) | Trigger::Modal(t) => (t.text.clone(), t),
        Trigger::Reaction(_)
        | Trigger::Interval(_)
        | Trigger::Cron(_)
        | Trigger::RoleChange(_)
        | Trigger::None => return None,
    };

    let flags = if text.case_sensitive { "(?m)" } else { "(?m)(?i)" };
    Some(format!("{}{}", flags, body))
}

/// The text a message trigger is evaluated against.
///
/// Contains and Regex triggers also see forwarded blocks; the rest read the primary content only.
pub fn content_for<'a>(trigger: &Trigger, message: &'a MessageSnapshot) -> Cow<'a, str> {
    match trigger {
        Trigger::Contains(_) | Trigger::Regex(_) if !message.forwarded.is_empty() => {
            Cow::Owned(message.all_contents())
        }
        _ => Cow::Borrowed(message.content.as_str()),
    }
}

/// Match a text-like trigger against `input`.
///
/// An invalid pattern is logged and treated as no match.
pub fn match_text(
    trigger: &Trigger,
    input: &str,
    prefix: &str,
    bot_id: UserId,
    cache: &RegexCache,
) -> Option<MatchOutcome> {
    let pattern = build_pattern(trigger, prefix, bot_id)?;
    let regex = match cache.get(&pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Skipping custom command with bad trigger: {}", e);
            return None;
        }
    };

    let found = regex.find(input)?;
    let consumed = &input[..found.end()];
    let rest = &input[found.end()..];

    let mut args = vec![consumed.trim().to_string()];
    args.extend(split_args(rest));

    // Templates see the remainder without the separator left behind by the trigger
    Some(MatchOutcome {
        stripped: rest.trim().to_string(),
        args,
    })
}

/// Whether a reaction add/remove fires a reaction trigger
pub fn match_reaction(mode: ReactionMode, added: bool) -> bool {
    match mode {
        ReactionMode::Both => true,
        ReactionMode::AddOnly => added,
        ReactionMode::RemoveOnly => !added,
    }
}

/// Whether a role add/remove fires a role-change trigger
pub fn match_role_change(mode: RoleTriggerMode, added: bool) -> bool {
    match mode {
        RoleTriggerMode::Both => true,
        RoleTriggerMode::AddOnly => added,
        RoleTriggerMode::RemoveOnly => !added,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_commands::types::TextTrigger;
    use poise::serenity_prelude::{ChannelId, MessageId};
    use std::time::Duration;

    const BOT: u64 = 204255221017214977;

    fn cache() -> RegexCache {
        RegexCache::new(Duration::from_secs(600), 64)
    }

    fn run(trigger: Trigger, input: &str) -> Option<MatchOutcome> {
        match_text(&trigger, input, "!!!", UserId::new(BOT), &cache())
    }

    #[test]
    fn test_command_with_prefix() {
        let outcome = run(
            Trigger::Command(TextTrigger::new("freezeit", false)),
            "!!!freezeit then cut it",
        )
        .unwrap();
        assert_eq!(outcome.stripped, "then cut it");
        assert_eq!(outcome.args, vec!["!!!freezeit", "then", "cut", "it"]);
    }

    #[test]
    fn test_command_without_prefix() {
        assert!(run(
            Trigger::Command(TextTrigger::new("freezeit", false)),
            "freezeit then cut it"
        )
        .is_none());
    }

    #[test]
    fn test_command_needs_word_boundary() {
        let trigger = Trigger::Command(TextTrigger::new("freezeit", false));
        assert!(run(trigger.clone(), "!!!freezeitnow").is_none());
        assert!(run(trigger.clone(), "!!!freezeit").is_some());
        assert!(run(trigger, "!!!FREEZEIT now").is_some());
    }

    #[test]
    fn test_command_with_mention() {
        let trigger = Trigger::Command(TextTrigger::new("ping", false));
        let outcome = run(trigger.clone(), &format!("<@{}> ping a b", BOT)).unwrap();
        assert_eq!(outcome.stripped, "a b");
        assert!(run(trigger.clone(), &format!("<@!{}>ping", BOT)).is_some());
        assert!(run(trigger, "<@1> ping").is_none());
    }

    #[test]
    fn test_prefix_is_literal() {
        let trigger = Trigger::Command(TextTrigger::new("roll", false));
        let out = match_text(&trigger, "?roll 2d6", "?", UserId::new(BOT), &cache());
        assert!(out.is_some());
        let out = match_text(&trigger, ".roll", "?", UserId::new(BOT), &cache());
        assert!(out.is_none());
    }

    #[test]
    fn test_contains() {
        let outcome = run(
            Trigger::Contains(TextTrigger::new("freezeit", false)),
            "I want you to freezeit then cut it",
        )
        .unwrap();
        assert_eq!(outcome.stripped, "then cut it");
        assert_eq!(outcome.args[0], "I want you to freezeit");
    }

    #[test]
    fn test_stripped_remainder_is_trimmed() {
        let outcome = run(Trigger::Contains(TextTrigger::new("x", false)), "ax   b  ").unwrap();
        assert_eq!(outcome.stripped, "b");
        assert_eq!(outcome.args, vec!["ax", "b"]);

        let outcome = run(Trigger::Exact(TextTrigger::new("gm", false)), "gm").unwrap();
        assert_eq!(outcome.stripped, "");
        assert_eq!(outcome.args, vec!["gm"]);
    }

    #[test]
    fn test_starts_with_case_sensitivity() {
        let insensitive = Trigger::StartsWith(TextTrigger::new("Hello", false));
        let sensitive = Trigger::StartsWith(TextTrigger::new("Hello", true));

        assert!(run(insensitive, "hello there").is_some());
        assert!(run(sensitive.clone(), "hello there").is_none());
        assert!(run(sensitive, "Hello there").is_some());
    }

    #[test]
    fn test_exact() {
        let trigger = Trigger::Exact(TextTrigger::new("gm", false));
        assert!(run(trigger.clone(), "GM").is_some());
        assert!(run(trigger.clone(), "gm all").is_none());
        assert!(run(trigger, "say gm").is_none());
    }

    #[test]
    fn test_regex_args() {
        let trigger = Trigger::Regex(TextTrigger::new(r"^count (\d+)", false));
        let outcome = run(trigger, r#"COUNT 12 "to the moon" now"#).unwrap();
        assert_eq!(outcome.args, vec!["COUNT 12", "to the moon", "now"]);
    }

    #[test]
    fn test_regex_is_multiline() {
        let trigger = Trigger::Regex(TextTrigger::new(r"^second$", true));
        assert!(run(trigger, "first\nsecond").is_some());
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let trigger = Trigger::Regex(TextTrigger::new("(broken", false));
        assert!(run(trigger, "(broken").is_none());
    }

    #[test]
    fn test_non_text_kinds() {
        assert!(build_pattern(&Trigger::None, "!", UserId::new(BOT)).is_none());
        assert!(
            build_pattern(&Trigger::Reaction(ReactionMode::Both), "!", UserId::new(BOT)).is_none()
        );
    }

    #[test]
    fn test_component_pattern() {
        let trigger = Trigger::Component(TextTrigger::new(r"^vote-(yes|no)$", false));
        let outcome = match_text(&trigger, "vote-YES", "", UserId::new(BOT), &cache()).unwrap();
        assert_eq!(outcome.args, vec!["vote-YES"]);
        assert!(match_text(&trigger, "vote-maybe", "", UserId::new(BOT), &cache()).is_none());
    }

    #[test]
    fn test_forwarded_content() {
        let mut msg = MessageSnapshot::new(
            MessageId::new(1),
            ChannelId::new(2),
            UserId::new(3),
            "look",
        );
        msg.forwarded = vec!["freezeit".into()];

        let contains = Trigger::Contains(TextTrigger::new("freezeit", false));
        let exact = Trigger::Exact(TextTrigger::new("look", false));

        assert_eq!(content_for(&contains, &msg), "look freezeit");
        assert_eq!(content_for(&exact, &msg), "look");
    }

    #[test]
    fn test_deterministic() {
        let trigger = Trigger::Regex(TextTrigger::new(r"(\w+)!", false));
        let first = run(trigger.clone(), "wow! such args");
        let second = run(trigger, "wow! such args");
        assert_eq!(first, second);
    }

    #[test]
    fn test_reaction_modes() {
        assert!(match_reaction(ReactionMode::Both, true));
        assert!(match_reaction(ReactionMode::Both, false));
        assert!(match_reaction(ReactionMode::AddOnly, true));
        assert!(!match_reaction(ReactionMode::AddOnly, false));
        assert!(!match_reaction(ReactionMode::RemoveOnly, true));
        assert!(match_reaction(ReactionMode::RemoveOnly, false));
    }

    #[test]
    fn test_role_modes() {
        assert!(match_role_change(RoleTriggerMode::Both, false));
        assert!(match_role_change(RoleTriggerMode::AddOnly, true));
        assert!(!match_role_change(RoleTriggerMode::AddOnly, false));
        assert!(match_role_change(RoleTriggerMode::RemoveOnly, false));
    }
}
