//! 서브커맨드 실행

use crate::Command;
use anyhow::{bail, Context};
use quill_core::{ActionResult, PluginDescriptor, PluginRuntime};
use quill_foundation::{JsonStore, RuntimeConfig};
use serde_json::Value;
use std::io::{self, BufRead, Write};

pub async fn run(runtime: &PluginRuntime, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List { json } => list_cmd(runtime, json),
        Command::Info { id } => info_cmd(runtime, &id).await,
        Command::Install { id, yes } => install_cmd(runtime, &id, yes).await,
        Command::Uninstall { id } => {
            let result = runtime.controller().uninstall(&id).await?;
            report_action(runtime, &id, "Uninstalled", result)
        }
        Command::Enable { id } => {
            let result = runtime.controller().enable(&id).await?;
            report_action(runtime, &id, "Enabled", result)
        }
        Command::Disable { id } => {
            let result = runtime.controller().disable(&id).await?;
            report_action(runtime, &id, "Disabled", result)
        }
        Command::Commands { surface } => {
            commands_cmd(runtime, surface.as_deref());
            Ok(())
        }
        Command::Exec {
            plugin,
            command,
            payload,
        } => exec_cmd(runtime, &plugin, &command, payload.as_deref()).await,
        Command::Render { plugin, url } => {
            let document = runtime.windows().render(&plugin, &url).await?;
            println!("{}", document);
            Ok(())
        }
        Command::Folder { id } => {
            let path = match id {
                Some(id) => runtime.controller().open_plugin_folder(&id).await?,
                None => runtime.controller().open_plugins_directory().await?,
            };
            println!("{}", path.display());
            Ok(())
        }
        Command::Config { save } => config_cmd(runtime.config(), save),
    }
}

fn config_cmd(config: &RuntimeConfig, save: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        let store = JsonStore::current_project()?;
        config.save(&store)?;
        println!("Saved to {}", store.base_dir().display());
    }
    Ok(())
}

// ============================================================================
// 목록 / 상세
// ============================================================================

fn list_cmd(runtime: &PluginRuntime, json: bool) -> anyhow::Result<()> {
    let descriptors = runtime.controller().descriptors();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    if descriptors.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<12} {:<11} NAME",
        "ID", "VERSION", "SOURCE", "STATUS"
    );
    println!("{}", "-".repeat(72));
    for descriptor in &descriptors {
        println!(
            "{:<24} {:<10} {:<12} {:<11} {}",
            truncate(&descriptor.id, 24),
            version_column(descriptor),
            descriptor.source_type.as_str(),
            descriptor.status_label(),
            display_name(descriptor)
        );
    }
    println!();
    println!("Total: {} plugin(s)", descriptors.len());
    Ok(())
}

async fn info_cmd(runtime: &PluginRuntime, id: &str) -> anyhow::Result<()> {
    let descriptor = match runtime.controller().details(id).await {
        Some(descriptor) => descriptor,
        None => runtime
            .controller()
            .get(id)
            .with_context(|| format!("Plugin not found: {}", id))?,
    };

    println!("{} ({})", display_name(&descriptor), descriptor.id);
    println!("  Version:  {}", version_column(&descriptor));
    println!("  Source:   {}", descriptor.source_type.as_str());
    println!("  Status:   {}", descriptor.status_label());
    if !descriptor.author.is_empty() {
        println!("  Author:   {}", descriptor.author);
    }
    if let Some(homepage) = &descriptor.homepage {
        println!("  Homepage: {}", homepage);
    }
    if let Some(error) = &descriptor.last_error {
        println!("  Error:    {}", error);
    }
    if !descriptor.description.is_empty() {
        println!();
        println!("  {}", descriptor.description);
    }

    print_permissions(&descriptor);

    if !descriptor.commands.is_empty() {
        println!();
        println!("Commands:");
        for command in &descriptor.commands {
            let title = if command.title.is_empty() {
                &command.id
            } else {
                &command.title
            };
            match &command.shortcut {
                Some(shortcut) => println!("  {:<20} {} ({})", command.id, title, shortcut),
                None => println!("  {:<20} {}", command.id, title),
            }
        }
    }
    Ok(())
}

fn print_permissions(descriptor: &PluginDescriptor) {
    println!();
    if descriptor.permissions.is_empty() {
        println!("Permissions: none");
        return;
    }
    println!("Permissions:");
    for permission in quill_core::plugin::permissions::describe_all(&descriptor.permissions) {
        println!("  - {}", permission.render());
    }
}

// ============================================================================
// 생명주기
// ============================================================================

async fn install_cmd(runtime: &PluginRuntime, id: &str, yes: bool) -> anyhow::Result<()> {
    let permissions = runtime
        .controller()
        .permissions_for(id)
        .await
        .with_context(|| format!("Plugin not found: {}", id))?;

    if !permissions.is_empty() {
        println!("{} requests the following permissions:", id);
        for permission in &permissions {
            println!("  - {}", permission.render());
        }
        if !yes && !confirm("Install?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let result = runtime.controller().install(id).await?;
    report_action(runtime, id, "Installed", result)
}

fn report_action(
    runtime: &PluginRuntime,
    id: &str,
    done: &str,
    result: ActionResult,
) -> anyhow::Result<()> {
    let notifications = runtime.controller().take_notifications();
    for notification in &notifications {
        eprintln!(
            "[{}] {} failed: {}",
            notification.plugin_id, notification.action, notification.message
        );
    }

    if !result.success {
        bail!(
            "{}",
            result
                .error
                .unwrap_or_else(|| format!("Action failed for {}", id))
        );
    }
    println!("{} {}", done, id);
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// ============================================================================
// 명령
// ============================================================================

fn commands_cmd(runtime: &PluginRuntime, surface: Option<&str>) {
    let entries = match surface {
        Some(surface) => runtime.commands().list_for_surface(surface),
        None => runtime.commands().list(),
    };

    if entries.is_empty() {
        println!("No commands registered.");
        return;
    }

    println!("{:<20} {:<20} {:<14} TITLE", "PLUGIN", "COMMAND", "SHORTCUT");
    println!("{}", "-".repeat(72));
    for entry in &entries {
        println!(
            "{:<20} {:<20} {:<14} {}",
            truncate(&entry.plugin_id, 20),
            truncate(entry.command_id(), 20),
            entry.command.shortcut.as_deref().unwrap_or("-"),
            entry.label()
        );
    }
}

async fn exec_cmd(
    runtime: &PluginRuntime,
    plugin: &str,
    command: &str,
    payload: Option<&str>,
) -> anyhow::Result<()> {
    let payload = parse_payload(payload)?;
    let result = runtime
        .controller()
        .execute_command(plugin, command, payload)
        .await?;

    if !result.success {
        bail!(
            "Command {}/{} failed: {}",
            plugin,
            command,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(data) = result.data {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}

fn parse_payload(payload: Option<&str>) -> anyhow::Result<Value> {
    match payload {
        Some(raw) => serde_json::from_str(raw).context("Payload must be valid JSON"),
        None => Ok(Value::Null),
    }
}

// ============================================================================
// 표시 헬퍼
// ============================================================================

fn display_name(descriptor: &PluginDescriptor) -> &str {
    if descriptor.name.is_empty() {
        &descriptor.id
    } else {
        &descriptor.name
    }
}

fn version_column(descriptor: &PluginDescriptor) -> String {
    match &descriptor.latest_version {
        Some(latest) if descriptor.has_update() => format!("{} -> {}", descriptor.version, latest),
        _ => descriptor.version.clone(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
