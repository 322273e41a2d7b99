//! The `/holo` command.
//!
//! Subcommands live in one table. The registry resolves names and aliases,
//! enforces player-only and permission rules, and turns handler errors into
//! messages. Anything that changes a hologram runs on the edit queue under
//! the hologram's key, so two edits to the same hologram never interleave.

pub mod edit;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hologram::{Hologram, Line};
use crate::plugin::Plugin;
use crate::store::key;
use crate::types::{Location, Sender, V3};

use self::edit::EditError;

pub type Handler = fn(&Arc<Plugin>, Sender, &[&str]) -> Result<()>;

pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub permission: &'static str,
    pub usage: &'static str,
    /// Message key of the help text.
    pub description: &'static str,
    pub player_only: bool,
    pub handler: Handler,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "create",
        aliases: &["c", "new"],
        permission: "holo.create",
        usage: "holo create <name> <text...>",
        description: "descriptions.create",
        player_only: true,
        handler: create,
    },
    CommandSpec {
        name: "list",
        aliases: &["l", "ls"],
        permission: "holo.list",
        usage: "holo list [page]",
        description: "descriptions.list",
        player_only: false,
        handler: list,
    },
    CommandSpec {
        name: "remove",
        aliases: &["rm", "delete", "del"],
        permission: "holo.remove",
        usage: "holo remove <name>",
        description: "descriptions.remove",
        player_only: false,
        handler: remove,
    },
    CommandSpec {
        name: "reload",
        aliases: &["r", "rl"],
        permission: "holo.reload",
        usage: "holo reload [name]",
        description: "descriptions.reload",
        player_only: false,
        handler: reload,
    },
    CommandSpec {
        name: "edit",
        aliases: &["e"],
        permission: "holo.edit",
        usage: "holo edit <name> <action> [args]",
        description: "descriptions.edit",
        player_only: false,
        handler: edit,
    },
    CommandSpec {
        name: "tp",
        aliases: &["teleport"],
        permission: "holo.tp",
        usage: "holo tp <name>",
        description: "descriptions.tp",
        player_only: true,
        handler: tp,
    },
    CommandSpec {
        name: "summon",
        aliases: &["s"],
        permission: "holo.summon",
        usage: "holo summon <name>",
        description: "descriptions.summon",
        player_only: true,
        handler: summon,
    },
    CommandSpec {
        name: "settings",
        aliases: &["config", "info"],
        permission: "holo.settings",
        usage: "holo settings <name> [line]",
        description: "descriptions.settings",
        player_only: false,
        handler: settings,
    },
];

pub const LIST_PAGE_SIZE: usize = 5;
pub const MAX_TEXT_LENGTH: usize = 255;
/// How far above the player's feet create and summon place a hologram.
pub const PLACE_HEIGHT: f64 = 1.5;

pub struct CommandRegistry {
    commands: &'static [CommandSpec],
    by_label: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    pub fn new(commands: &'static [CommandSpec]) -> Self {
        let mut by_label = HashMap::new();
        for (i, command) in commands.iter().enumerate() {
            by_label.insert(command.name, i);
            for alias in command.aliases {
                by_label.insert(*alias, i);
            }
        }
        Self { commands, by_label }
    }

    pub fn find(&self, label: &str) -> Option<&'static CommandSpec> {
        let commands = self.commands;
        self.by_label.get(label.to_ascii_lowercase().as_str()).map(|&i| &commands[i])
    }

    pub fn dispatch(&self, plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) {
        let Some((label, rest)) = args.split_first() else {
            return self.help(plugin, sender);
        };
        let Some(command) = self.find(label) else {
            plugin.reply(sender, "general.unknown_command", &[("command", label)]);
            return self.help(plugin, sender);
        };
        if command.player_only && sender.player().is_none() {
            return plugin.reply(sender, "general.player_only", &[]);
        }
        if !plugin.may(sender, command.permission) {
            return plugin.reply(sender, "general.no_permission", &[]);
        }
        match (command.handler)(plugin, sender, rest) {
            Ok(()) => {}
            Err(Error::Usage) => plugin.reply(sender, "general.usage", &[("usage", command.usage)]),
            Err(e) => report(plugin, sender, &e),
        }
    }

    /// Lists the subcommands `sender` may use.
    pub fn help(&self, plugin: &Plugin, sender: Sender) {
        plugin.reply_raw(sender, "help.header", &[]);
        for command in self.commands.iter().filter(|c| plugin.may(sender, c.permission)) {
            let description = plugin.messages().read().raw(command.description, &[]);
            plugin.reply_raw(sender, "help.entry", &[("usage", command.usage), ("description", &description)]);
        }
    }
}

/// Tells `sender` what went wrong. Unexpected failures are also logged.
fn report(plugin: &Plugin, sender: Sender, error: &Error) {
    match error {
        Error::NotFound(name) => plugin.reply(sender, "general.not_found", &[("name", name)]),
        Error::NotActive(name) => plugin.reply(sender, "general.not_active", &[("name", name)]),
        Error::AlreadyExists(name) => plugin.reply(sender, "create.exists", &[("name", name)]),
        e => {
            plugin.log().error(format_args!("command from {sender:?} failed: {e}"));
            plugin.reply(sender, "general.error", &[("error", &e.to_string())]);
        }
    }
}

/// Runs `operation` on the edit queue of hologram `name`.
fn queued(plugin: &Arc<Plugin>, sender: Sender, name: &str, operation: impl FnOnce(&Plugin) -> Result<()> + Send + 'static) {
    let this = Arc::clone(plugin);
    plugin.displays().edits().submit(&key(name), move || match operation(&this) {
        Ok(()) => true,
        Err(e) => {
            report(&this, sender, &e);
            false
        }
    });
}

fn player_location(plugin: &Plugin, sender: Sender) -> Result<Location> {
    let pid = sender.player().ok_or(Error::Usage)?;
    plugin.host().player_location(pid).ok_or(Error::PlayerOffline(pid))
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn create(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let [name, words @ ..] = args else {
        return Err(Error::Usage);
    };
    if words.is_empty() {
        return Err(Error::Usage);
    }
    if !valid_name(name) {
        plugin.reply(sender, "create.invalid_name", &[]);
        return Ok(());
    }
    let text = words.join(" ");
    if text.trim().is_empty() || text.chars().count() > MAX_TEXT_LENGTH {
        plugin.reply(sender, "create.invalid_text", &[]);
        return Ok(());
    }
    if plugin.store().read().contains(name) {
        return Err(Error::AlreadyExists(name.to_string()));
    }
    let at = player_location(plugin, sender)?.raised(PLACE_HEIGHT);
    let hologram = Hologram::new(*name, at, vec![Line::new(text, V3(0.0, 0.0, 0.0))]);
    queued(plugin, sender, name, move |plugin| {
        let name = hologram.name.clone();
        plugin.store().write().create(hologram.clone())?;
        plugin.reply(sender, "create.success", &[("name", &name)]);
        if let Err(e) = plugin.displays().spawn(hologram) {
            plugin.reply(sender, "create.spawn_failed", &[("name", &name), ("error", &e.to_string())]);
        }
        Ok(())
    });
    Ok(())
}

fn list(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let holograms: Vec<Hologram> = plugin.store().read().all().into_iter().cloned().collect();
    if holograms.is_empty() {
        plugin.reply(sender, "list.empty", &[]);
        return Ok(());
    }
    let pages = (holograms.len() + LIST_PAGE_SIZE - 1) / LIST_PAGE_SIZE;
    let page = match args.first() {
        None => 1,
        Some(arg) => match arg.parse::<usize>() {
            Ok(page) if (1..=pages).contains(&page) => page,
            _ => {
                plugin.reply(sender, "list.invalid_page", &[("pages", &pages.to_string())]);
                return Ok(());
            }
        },
    };
    plugin.reply(
        sender,
        "list.header",
        &[
            ("page", &page.to_string()),
            ("pages", &pages.to_string()),
            ("total", &holograms.len().to_string()),
        ],
    );
    for hologram in holograms.iter().skip((page - 1) * LIST_PAGE_SIZE).take(LIST_PAGE_SIZE) {
        let state = status(plugin, &hologram.name);
        let V3 { x, y, z } = hologram.location.pos;
        plugin.reply_raw(
            sender,
            "list.entry",
            &[
                ("name", &hologram.name),
                ("world", hologram.world()),
                ("x", &format!("{x:.1}")),
                ("y", &format!("{y:.1}")),
                ("z", &format!("{z:.1}")),
                ("status", &state),
            ],
        );
    }
    Ok(())
}

fn status(plugin: &Plugin, name: &str) -> String {
    let key = if plugin.displays().is_active(name) { "list.active" } else { "list.inactive" };
    plugin.messages().read().raw(key, &[])
}

fn remove(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let [name] = args else {
        return Err(Error::Usage);
    };
    let name = name.to_string();
    queued(plugin, sender, &name.clone(), move |plugin| {
        let removed = plugin.store().write().delete(&name)?;
        plugin.displays().despawn(&removed.name);
        plugin.reply(sender, "remove.success", &[("name", &removed.name)]);
        Ok(())
    });
    Ok(())
}

fn reload(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    match args {
        [] => reload_all(plugin, sender),
        [name] => {
            let name = name.to_string();
            queued(plugin, sender, &name.clone(), move |plugin| reload_one(plugin, sender, &name));
            Ok(())
        }
        _ => Err(Error::Usage),
    }
}

fn reload_all(plugin: &Arc<Plugin>, sender: Sender) -> Result<()> {
    if let Some(progress) = plugin.loader().progress() {
        plugin.reply(sender, "reload.busy", &[("progress", &progress.to_string())]);
        return Ok(());
    }
    plugin.loader().cancel();
    plugin.displays().despawn_all();
    plugin.messages().write().reload();
    let count = plugin.store().write().reload()?;
    let this = Arc::downgrade(plugin);
    plugin.host().run_later(
        plugin.config().reload_delay_ticks,
        Box::new(move || {
            if let Some(plugin) = this.upgrade() {
                plugin.spawn_stored();
            }
        }),
    );
    plugin.reply(sender, "reload.all", &[("count", &count.to_string())]);
    Ok(())
}

fn reload_one(plugin: &Plugin, sender: Sender, name: &str) -> Result<()> {
    if !plugin.store().read().contains(name) {
        return Err(Error::NotFound(name.to_owned()));
    }
    plugin.displays().unload(name);
    plugin.store().write().reload()?;
    let hologram = plugin
        .store()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::NotFound(name.to_owned()))?;
    if hologram.enabled {
        plugin.displays().spawn(hologram.clone())?;
    }
    plugin.reply(sender, "reload.one", &[("name", &hologram.name)]);
    Ok(())
}

fn edit(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let actions = edit::action_names().join(", ");
    let [name, action, rest @ ..] = args else {
        plugin.reply(sender, "edit.usage", &[]);
        plugin.reply_raw(sender, "edit.actions", &[("actions", &actions)]);
        return Ok(());
    };
    let Some(spec) = edit::find(action) else {
        plugin.reply(sender, "edit.invalid_action", &[("action", action)]);
        plugin.reply_raw(sender, "edit.actions", &[("actions", &actions)]);
        return Ok(());
    };
    let change = match spec.parse(rest) {
        Ok(change) => change,
        Err(e) => {
            edit_failed(plugin, sender, spec.usage, &e);
            return Ok(());
        }
    };
    let name = name.to_string();
    queued(plugin, sender, &name.clone(), move |plugin| {
        let current = plugin.displays().get(&name).ok_or_else(|| Error::NotActive(name.clone()))?;
        let edited = match edit::apply(&current, &change) {
            Ok(edited) => edited,
            Err(e) => {
                edit_failed(plugin, sender, spec.usage, &e);
                return Ok(());
            }
        };
        let name = current.name.clone();
        if let Err(e) = plugin.displays().respawn(&name, edited.clone()) {
            if let Err(restore) = plugin.displays().spawn(current) {
                plugin.log().warn(format_args!("could not restore '{name}' after a failed edit: {restore}"));
            }
            plugin.reply(sender, "edit.failed", &[("name", &name), ("error", &e.to_string())]);
            return Ok(());
        }
        plugin.store().write().save_lines(&name, edited.lines)?;
        plugin.reply(sender, "edit.success", &[("name", &name), ("action", spec.name)]);
        Ok(())
    });
    Ok(())
}

fn edit_failed(plugin: &Plugin, sender: Sender, usage: &str, error: &EditError) {
    match error {
        EditError::Usage => plugin.reply(sender, "edit.action_usage", &[("usage", usage)]),
        EditError::UnknownAction(action) => plugin.reply(sender, "edit.invalid_action", &[("action", action)]),
        EditError::InvalidValue(value) => plugin.reply(sender, "edit.invalid_value", &[("value", value)]),
        EditError::InvalidLine { lines } => {
            plugin.reply(sender, "edit.invalid_line", &[("lines", &lines.to_string())])
        }
        EditError::SameText(line) => plugin.reply(sender, "edit.same_text", &[("line", &line.to_string())]),
        EditError::LastLine => plugin.reply(sender, "edit.last_line", &[]),
    }
}

fn tp(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let [name] = args else {
        return Err(Error::Usage);
    };
    let pid = sender.player().ok_or(Error::Usage)?;
    let target = match plugin.displays().base_location(name) {
        Some(at) => at,
        None => {
            let store = plugin.store().read();
            let hologram = store.get(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
            hologram.location.clone()
        }
    };
    plugin.host().teleport_player(pid, &target)?;
    plugin.reply(sender, "tp.success", &[("name", name)]);
    Ok(())
}

fn summon(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let [name] = args else {
        return Err(Error::Usage);
    };
    let to = player_location(plugin, sender)?.raised(PLACE_HEIGHT);
    let name = name.to_string();
    queued(plugin, sender, &name.clone(), move |plugin| {
        if !plugin.store().read().contains(&name) {
            return Err(Error::NotFound(name));
        }
        plugin.displays().move_to(&name, to.clone())?;
        plugin.store().write().save_location(&name, to)?;
        plugin.reply(sender, "summon.success", &[("name", &name)]);
        Ok(())
    });
    Ok(())
}

fn settings(plugin: &Arc<Plugin>, sender: Sender, args: &[&str]) -> Result<()> {
    let (name, line) = match args {
        [name] => (*name, None),
        [name, line] => (*name, Some(*line)),
        _ => return Err(Error::Usage),
    };
    let hologram = match plugin.displays().get(name) {
        Some(hologram) => hologram,
        None => plugin
            .store()
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_owned()))?,
    };
    let count = hologram.lines.len();
    let shown = match line {
        None => 0..count,
        Some(line) => match line.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => n - 1..n,
            _ => {
                plugin.reply(sender, "settings.invalid_line", &[("lines", &count.to_string())]);
                return Ok(());
            }
        },
    };
    let V3 { x, y, z } = hologram.location.pos;
    plugin.reply(
        sender,
        "settings.header",
        &[
            ("name", &hologram.name),
            ("world", hologram.world()),
            ("x", &format!("{x:.2}")),
            ("y", &format!("{y:.2}")),
            ("z", &format!("{z:.2}")),
            ("lines", &count.to_string()),
            ("status", &status(plugin, &hologram.name)),
        ],
    );
    for i in shown {
        let line = &hologram.lines[i];
        plugin.reply_raw(sender, "settings.line", &[("line", &(i + 1).to_string()), ("text", &line.text)]);
        match serde_json::to_string(&line.settings) {
            Ok(detail) if detail != "{}" => plugin.reply_raw(sender, "settings.detail", &[("settings", &detail)]),
            Ok(_) => {}
            Err(e) => plugin.log().warn(format_args!("could not describe line {} of '{}': {e}", i + 1, hologram.name)),
        }
    }
    Ok(())
}
