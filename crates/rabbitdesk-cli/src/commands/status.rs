use anyhow::Result;
use rabbitdesk_client::ApiRequest;
use serde_json::Value;

use super::CommandContext;
use crate::cli::StatusArgs;
use crate::output::print_statuses;

pub async fn status(ctx: &CommandContext, args: &StatusArgs) -> Result<()> {
    ctx.ensure_logged_in().await?;

    let targets = if args.targets.is_empty() {
        known_targets(ctx).await?
    } else {
        args.targets.clone()
    };
    let statuses = ctx.session.probe().check_all(&targets).await;
    print_statuses(&statuses, ctx.format);
    Ok(())
}

/// Cluster IDs registered on the server.
async fn known_targets(ctx: &CommandContext) -> Result<Vec<String>> {
    let response = ctx
        .session
        .gateway()
        .execute(ApiRequest::get("/api/targets"))
        .await?;
    Ok(target_ids(&response.body))
}

/// Accepts either a list of IDs or a list of objects with an `id` (or
/// `name`) field.
fn target_ids(body: &Value) -> Vec<String> {
    body.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(id.clone()),
                    Value::Object(fields) => fields
                        .get("id")
                        .or_else(|| fields.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_ids_accepts_strings_and_objects() {
        assert_eq!(
            target_ids(&json!(["c1", {"id": "c2", "name": "Staging"}, {"name": "c3"}, 4])),
            vec!["c1", "c2", "c3"]
        );
        assert!(target_ids(&json!({"error": "nope"})).is_empty());
    }
}
