use async_trait::async_trait;

use crate::custom_commands::{CcHost, TemplateContext, TemplateEngine, TriggerData};
use crate::error::CcError;

/// Treats a response as plain text with a few `{{name}}` placeholders.
///
/// Stands in where no script runtime is wired up.
#[derive(Debug, Default)]
pub struct PlainTextEngine;

fn placeholder(name: &str, ctx: &TemplateContext) -> Option<String> {
    let value = match name {
        "user" => ctx.member.as_ref()?.display_name.clone(),
        "mention" => format!("<@{}>", ctx.member.as_ref()?.user_id),
        "channel" => ctx.channel.name.clone(),
        "cc_id" => ctx.cc_id.to_string(),
        "run_count" => ctx.run_count.to_string(),
        "stripped" => match &ctx.data {
            TriggerData::Message { stripped, .. } => stripped.clone(),
            _ => String::new(),
        },
        "args" => match &ctx.data {
            TriggerData::Message { cmd_args, .. } => cmd_args.join(" "),
            TriggerData::Component { args, .. } | TriggerData::Modal { args, .. } => args.join(" "),
            _ => String::new(),
        },
        _ => return None,
    };
    Some(value)
}

/// Replace known placeholders; unknown ones are left as written
pub fn render(script: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(script.len());
    let mut rest = script;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match placeholder(name, ctx) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl TemplateEngine for PlainTextEngine {
    async fn execute(&self, script: &str, ctx: &TemplateContext, _host: &CcHost) -> Result<String, CcError> {
        Ok(render(script, ctx))
    }
}
