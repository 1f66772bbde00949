use tracing::error;

use crate::{
    constants::MAX_MESSAGE_LENGTH,
    custom_commands::filter::{Diagnosis, Verdict},
    handlers::diagnose_message,
    models::{Context, Error},
    utils::messages::{format_error, format_info, truncate_message},
    utils::validation::require_guild,
};

fn verdict_text(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Runs => "runs",
        Verdict::Disabled => "disabled",
        Verdict::WrongChannel => "not allowed in this channel",
        Verdict::MissingRoles => "your roles do not allow it",
        Verdict::OverLimit => "skipped, too many commands already matched",
    }
}

/// Render a diagnosis report, one line per matched command
pub fn format_diagnosis(report: &[Diagnosis]) -> String {
    if report.is_empty() {
        return format_info("No custom command would trigger on that message.");
    }

    let lines: Vec<String> = report
        .iter()
        .map(|d| format!("`#{}` {}: {}", d.local_id, d.trigger, verdict_text(d.verdict)))
        .collect();
    let running = report.iter().filter(|d| d.verdict == Verdict::Runs).count();

    truncate_message(
        &format!(
            "{}\n{}",
            format_info(&format!("{} of {} matching command(s) would run:", running, report.len())),
            lines.join("\n")
        ),
        MAX_MESSAGE_LENGTH,
    )
}

/// Show which custom commands a message would trigger in this channel
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD")]
pub async fn cc_diagnose(
    ctx: Context<'_>,
    #[description = "Message text to test against the triggers"] text: String,
) -> Result<(), Error> {
    let guild_id = require_guild(ctx.guild_id())?;
    let roles = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();

    let engine = &ctx.data().engine;
    match diagnose_message(engine, guild_id, ctx.channel_id(), &roles, &text).await {
        Ok(report) => {
            ctx.send(poise::CreateReply::default().content(format_diagnosis(&report)).ephemeral(true))
                .await?;
        }
        Err(e) => {
            error!("Failed to diagnose custom commands in guild {}: {}", guild_id, e);
            ctx.say(format_error(&format!("Could not check the triggers: {}", e)))
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        assert!(format_diagnosis(&[]).contains("No custom command"));
    }

    #[test]
    fn test_report_lines() {
        let report = vec![
            Diagnosis {
                local_id: 1,
                trigger: "contains: x".into(),
                verdict: Verdict::Runs,
            },
            Diagnosis {
                local_id: 4,
                trigger: "contains: x".into(),
                verdict: Verdict::Disabled,
            },
        ];
        let text = format_diagnosis(&report);
        assert!(text.contains("1 of 2"));
        assert!(text.contains("`#1` contains: x: runs"));
        assert!(text.contains("`#4` contains: x: disabled"));
    }
}
