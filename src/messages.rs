//! Player-facing message templates.
//!
//! Built-in defaults, overridden per key by `messages.yml` in the data folder.
//! Nested YAML maps are flattened to dotted keys. Colour codes are passed
//! through untouched.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::logging::Logger;

pub const DEFAULT_PREFIX: &str = "&b&lHolo&f&lFX &8&l| &r";

const DEFAULTS: &[(&str, &str)] = &[
    ("general.no_permission", "&cYou don't have permission to do that."),
    ("general.player_only", "&cOnly players can use this command."),
    ("general.unknown_command", "&cUnknown subcommand '{command}'."),
    ("general.usage", "&eUsage: /{usage}"),
    ("general.error", "&cSomething went wrong: {error}"),
    ("general.not_found", "&cHologram '{name}' does not exist."),
    ("general.not_active", "&cHologram '{name}' is not active."),
    ("help.header", "&b&m-----&r &bHoloFX commands &b&m-----"),
    ("help.entry", "&e/{usage} &7- {description}"),
    ("descriptions.create", "Create a hologram where you stand"),
    ("descriptions.list", "List holograms"),
    ("descriptions.remove", "Delete a hologram"),
    ("descriptions.reload", "Reload one or all holograms from disk"),
    ("descriptions.edit", "Edit a hologram's lines and style"),
    ("descriptions.tp", "Teleport to a hologram"),
    ("descriptions.summon", "Move a hologram to you"),
    ("descriptions.settings", "Show a hologram's settings"),
    ("create.invalid_name", "&cNames may only contain letters, digits, '_' and '-'."),
    ("create.invalid_text", "&cText must be between 1 and 255 characters."),
    ("create.exists", "&cHologram '{name}' already exists."),
    ("create.success", "&aCreated hologram '{name}'."),
    ("create.spawn_failed", "&eHologram '{name}' was saved but could not be spawned: {error}"),
    ("list.empty", "&7There are no holograms."),
    ("list.header", "&bHolograms &7(page {page}/{pages}, {total} total)"),
    ("list.entry", "&e{name} &7{world} {x}, {y}, {z} {status}"),
    ("list.active", "&a[active]"),
    ("list.inactive", "&c[inactive]"),
    ("list.invalid_page", "&cPage must be between 1 and {pages}."),
    ("remove.success", "&aRemoved hologram '{name}'."),
    ("reload.all", "&aReloaded {count} holograms, respawning shortly."),
    ("reload.one", "&aReloaded hologram '{name}'."),
    ("reload.busy", "&cHolograms are still being spawned ({progress}), try again later."),
    ("tp.success", "&aTeleported to '{name}'."),
    ("summon.success", "&aMoved '{name}' to you."),
    ("settings.header", "&b'{name}' &7in {world} at {x}, {y}, {z}, {lines} lines, {status}"),
    ("settings.line", "&e#{line} &f{text}"),
    ("settings.detail", "&7  {settings}"),
    ("settings.invalid_line", "&cLine must be between 1 and {lines}."),
    ("edit.usage", "&eUsage: /holo edit <name> <action> [args]"),
    ("edit.invalid_action", "&cUnknown edit action '{action}'."),
    ("edit.actions", "&7Actions: {actions}"),
    ("edit.action_usage", "&eUsage: /holo edit <name> {usage}"),
    ("edit.invalid_line", "&cLine must be between 1 and {lines}."),
    ("edit.invalid_value", "&cInvalid value '{value}'."),
    ("edit.same_text", "&eLine {line} already says that."),
    ("edit.last_line", "&cA hologram needs at least one line."),
    ("edit.success", "&aUpdated '{name}' ({action})."),
    ("edit.failed", "&cCould not edit '{name}': {error}"),
];

pub struct Messages {
    path: PathBuf,
    prefix: String,
    templates: HashMap<String, String>,
    log: Logger,
}

impl Messages {
    /// Loads `messages.yml` from `data_folder`. A missing or broken file
    /// leaves the defaults in place.
    pub fn load(data_folder: &Path, log: &Logger) -> Self {
        let mut messages = Self {
            path: data_folder.join("messages.yml"),
            prefix: DEFAULT_PREFIX.to_owned(),
            templates: HashMap::new(),
            log: log.scoped("mcholo::messages"),
        };
        messages.reload();
        messages
    }

    pub fn reload(&mut self) {
        self.templates = DEFAULTS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.prefix = DEFAULT_PREFIX.to_owned();
        match self.read_overrides() {
            Ok(0) => {}
            Ok(n) => self.log.info(format_args!("loaded {n} message overrides")),
            Err(e) => self.log.warn(format_args!("using default messages: {e}")),
        }
    }

    fn read_overrides(&mut self) -> Result<usize> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(&self.path)(e)),
        };
        let root: Value = serde_yaml::from_str(&text)?;
        let mut flat = HashMap::new();
        flatten("", &root, &mut flat);
        if let Some(prefix) = flat.remove("prefix") {
            self.prefix = prefix;
        }
        let count = flat.len();
        self.templates.extend(flat);
        Ok(count)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The template for `key`, or the key itself when there is none.
    pub fn template<'a>(&'a self, key: &'a str) -> &'a str {
        self.templates.get(key).map_or(key, String::as_str)
    }

    pub fn raw(&self, key: &str, args: &[(&str, &str)]) -> String {
        substitute(self.template(key), args)
    }

    /// Prefixed and filled in.
    pub fn format(&self, key: &str, args: &[(&str, &str)]) -> String {
        format!("{}{}", self.prefix, self.raw(key, args))
    }
}

fn flatten(path: &str, value: &Value, out: &mut HashMap<String, String>) {
    let scalar = match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let Some(k) = scalar_text(k) else { continue };
                let key = if path.is_empty() { k } else { format!("{path}.{k}") };
                flatten(&key, v, out);
            }
            return;
        }
        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect::<Vec<_>>().join("\n"),
        other => match scalar_text(other) {
            Some(text) => text,
            None => return,
        },
    };
    out.insert(path.to_owned(), scalar);
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn substitute(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = template.to_owned();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
