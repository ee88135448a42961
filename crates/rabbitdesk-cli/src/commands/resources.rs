use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use colored::Colorize;
use rabbitdesk_client::ResourceKind;
use serde_json::Value;

use super::CommandContext;
use crate::cli::{CreateArgs, DeleteArgs, ListArgs};
use crate::output::{print_resources, print_success};

pub async fn list(ctx: &CommandContext, args: &ListArgs) -> Result<()> {
    ctx.ensure_logged_in().await?;

    let loader = ctx.session.loader();
    let value = if args.refresh {
        loader.reload(&args.target, args.kind, &args.params).await?
    } else {
        loader.load(&args.target, args.kind, &args.params).await?
    };
    print_resources(args.kind, &value, ctx.format);
    Ok(())
}

pub async fn create(ctx: &CommandContext, args: &CreateArgs) -> Result<()> {
    let body = read_body(args.file.as_deref(), args.body.as_deref())?;
    ctx.ensure_logged_in().await?;

    let kind = ResourceKind::from(args.kind);
    ctx.session
        .loader()
        .create(&args.target, kind, &args.name, body)
        .await?;
    print_success(&format!(
        "Created {} {} on {}",
        singular(kind),
        args.name.cyan(),
        args.target.cyan()
    ));
    Ok(())
}

pub async fn delete(ctx: &CommandContext, args: &DeleteArgs) -> Result<()> {
    ctx.ensure_logged_in().await?;

    let kind = ResourceKind::from(args.kind);
    ctx.session
        .loader()
        .delete(&args.target, kind, &args.name)
        .await?;
    print_success(&format!(
        "Deleted {} {} on {}",
        singular(kind),
        args.name.cyan(),
        args.target.cyan()
    ));
    Ok(())
}

fn singular(kind: ResourceKind) -> &'static str {
    kind.as_str().trim_end_matches('s')
}

fn read_body(file: Option<&str>, inline: Option<&str>) -> Result<Value> {
    let content = match (file, inline) {
        (_, Some(inline)) => inline.to_string(),
        (Some(path), None) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        (None, None) => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    if content.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(&content).context("Invalid JSON")?;
    if !value.is_object() {
        anyhow::bail!("Definition must be a JSON object");
    }
    Ok(value)
}
