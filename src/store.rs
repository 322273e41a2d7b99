//! Hologram files on disk.
//!
//! One YAML file per hologram under `<data_folder>/holograms/`. Lookups are
//! case-insensitive; the map is keyed by the lower-cased name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hologram::{DisplaySettings, Hologram, Line, LINE_SPACING};
use crate::logging::Logger;
use crate::types::{Location, V3};

#[derive(Deserialize)]
struct RawHologram {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    location: Option<RawLocation>,
    #[serde(default)]
    lines: Option<Vec<serde_yaml::Value>>,
}
fn enabled_by_default() -> bool {
    true
}

#[derive(Deserialize)]
struct RawLocation {
    world: String,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    z: f64,
    #[serde(default)]
    yaw: f32,
}

#[derive(Deserialize)]
struct RawLine {
    text: RawText,
    #[serde(default)]
    offset: RawOffset,
    #[serde(default)]
    display_settings: DisplaySettings,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawOffset {
    x: f64,
    y: f64,
    z: f64,
}

struct Entry {
    hologram: Hologram,
    path: PathBuf,
}

pub struct HologramStore {
    dir: PathBuf,
    entries: BTreeMap<String, Entry>,
    log: Logger,
}

pub fn key(name: &str) -> String {
    name.to_lowercase()
}

impl HologramStore {
    /// Opens (creating if needed) the directory and loads every file in it.
    pub fn open(dir: impl Into<PathBuf>, log: &Logger) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
        let mut store = Self {
            dir,
            entries: BTreeMap::new(),
            log: log.scoped("mcholo::store"),
        };
        store.load_all()?;
        Ok(store)
    }

    /// Loads every `.yml` file, skipping (and logging) files that fail to parse.
    /// A directory that has gone missing is recreated and counts as empty.
    pub fn load_all(&mut self) -> Result<usize> {
        if !self.dir.is_dir() {
            self.log.warn(format_args!("{} is missing, starting with no holograms", self.dir.display()));
            fs::create_dir_all(&self.dir).map_err(Error::io(&self.dir))?;
        }
        let mut files = vec![];
        for entry in fs::read_dir(&self.dir).map_err(Error::io(&self.dir))? {
            let path = entry.map_err(Error::io(&self.dir))?.path();
            let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yml" | "yaml"));
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut loaded = 0;
        for path in files {
            let hologram = match parse_file(&path, &self.log) {
                Ok(hologram) => hologram,
                Err(e) => {
                    self.log.warn(format_args!("skipping {}: {e}", path.display()));
                    continue;
                }
            };
            let key = key(&hologram.name);
            if let Some(existing) = self.entries.get(&key) {
                self.log.warn(format_args!(
                    "duplicate hologram name '{}' in {}, already defined in {}",
                    hologram.name,
                    path.display(),
                    existing.path.display()
                ));
                continue;
            }
            self.entries.insert(key, Entry { hologram, path });
            loaded += 1;
        }
        self.log.info(format_args!("loaded {loaded} holograms from {}", self.dir.display()));
        Ok(loaded)
    }

    pub fn reload(&mut self) -> Result<usize> {
        self.entries.clear();
        self.load_all()
    }

    pub fn get(&self, name: &str) -> Option<&Hologram> {
        self.entries.get(&key(name)).map(|e| &e.hologram)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&key(name))
    }
    /// Sorted by name.
    pub fn all(&self) -> Vec<&Hologram> {
        self.entries.values().map(|e| &e.hologram).collect()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn create(&mut self, hologram: Hologram) -> Result<()> {
        let key = key(&hologram.name);
        let path = self.dir.join(format!("{}.yml", hologram.name));
        if self.entries.contains_key(&key) || path.exists() {
            return Err(Error::AlreadyExists(hologram.name));
        }
        write_file(&path, &hologram)?;
        self.log.info(format_args!("created hologram '{}'", hologram.name));
        self.entries.insert(key, Entry { hologram, path });
        Ok(())
    }

    pub fn save_lines(&mut self, name: &str, lines: Vec<Line>) -> Result<()> {
        self.update(name, |h| h.with_lines(lines))
    }

    pub fn save_location(&mut self, name: &str, location: Location) -> Result<()> {
        self.update(name, |h| h.with_location(location))
    }

    fn update(&mut self, name: &str, f: impl FnOnce(Hologram) -> Hologram) -> Result<()> {
        let entry = self.entries.get_mut(&key(name)).ok_or_else(|| Error::NotFound(name.to_owned()))?;
        let updated = f(entry.hologram.clone());
        write_file(&entry.path, &updated)?;
        entry.hologram = updated;
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<Hologram> {
        let entry = self.entries.remove(&key(name)).ok_or_else(|| Error::NotFound(name.to_owned()))?;
        match fs::remove_file(&entry.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                let err = Error::io(&entry.path)(e);
                self.entries.insert(key(name), entry);
                return Err(err);
            }
        }
        self.log.info(format_args!("deleted hologram '{}'", entry.hologram.name));
        Ok(entry.hologram)
    }

    /// Names of holograms whose world is not loaded.
    pub fn validate_worlds(&self, is_loaded: impl Fn(&str) -> bool) -> Vec<String> {
        let invalid: Vec<String> = self
            .entries
            .values()
            .filter(|e| !is_loaded(e.hologram.world()))
            .map(|e| e.hologram.name.clone())
            .collect();
        let valid = self.entries.len() - invalid.len();
        if invalid.is_empty() {
            self.log.info(format_args!("all {valid} holograms have loaded worlds"));
        } else {
            self.log.info(format_args!(
                "{valid} holograms ready, {} waiting for their world: {}",
                invalid.len(),
                invalid.join(", ")
            ));
        }
        invalid
    }
}

fn write_file(path: &Path, hologram: &Hologram) -> Result<()> {
    let yaml = serde_yaml::to_string(hologram)?;
    fs::write(path, yaml).map_err(Error::io(path))
}

fn parse_file(path: &Path, log: &Logger) -> Result<Hologram> {
    let invalid = |reason: &str| Error::InvalidHologram {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    let raw: RawHologram = serde_yaml::from_str(&text)?;

    let name = match raw.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .ok_or_else(|| invalid("no name"))?,
    };
    let location = raw.location.ok_or_else(|| invalid("missing location"))?;
    let raw_lines = raw.lines.ok_or_else(|| invalid("missing lines"))?;

    let mut lines = vec![];
    for (i, value) in raw_lines.into_iter().enumerate() {
        let line: RawLine = match serde_yaml::from_value(value) {
            Ok(line) => line,
            Err(e) => {
                log.warn(format_args!("skipping line {} of '{name}': {e}", i + 1));
                continue;
            }
        };
        let offset = V3(line.offset.x, line.offset.y, line.offset.z);
        match line.text {
            RawText::One(text) => lines.push(Line {
                text,
                offset,
                settings: line.display_settings,
            }),
            RawText::Many(texts) => {
                if texts.is_empty() {
                    log.warn(format_args!("skipping line {} of '{name}': empty text list", i + 1));
                }
                for (j, text) in texts.into_iter().enumerate() {
                    lines.push(Line {
                        text,
                        offset: V3(offset.x, offset.y - j as f64 * LINE_SPACING, offset.z),
                        settings: line.display_settings.clone(),
                    });
                }
            }
        }
    }
    if lines.is_empty() {
        return Err(invalid("no usable lines"));
    }

    Ok(Hologram {
        name,
        enabled: raw.enabled,
        location: Location {
            world: location.world,
            pos: V3(location.x, location.y, location.z),
            yaw: location.yaw,
        },
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hologram::Billboard;
    use crate::logging::testing::Recorder;
    use log::Level;

    fn write(dir: &Path, file: &str, yaml: &str) {
        fs::write(dir.join(file), yaml).unwrap();
    }

    const SPAWN: &str = "\
name: Spawn_Info
location: {world: world, x: 0.5, y: 65, z: 0.5}
lines:
  - text: Welcome
    display_settings: {billboard: center, shadow: false}
  - text: [first, second, third]
    offset: {y: -0.25}
";

    #[test]
    fn loads_and_expands_lists() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "spawn.yml", SPAWN);
        let (_, log) = Recorder::logger();
        let store = HologramStore::open(dir.path(), &log).unwrap();
        assert_eq!(store.len(), 1);

        let holo = store.get("spawn_info").unwrap();
        assert_eq!(holo.name, "Spawn_Info");
        assert!(holo.enabled);
        assert_eq!(holo.location, Location::new("world", 0.5, 65.0, 0.5));
        let texts: Vec<_> = holo.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["Welcome", "first", "second", "third"]);
        let ys: Vec<_> = holo.lines.iter().map(|l| l.offset.y).collect();
        assert_eq!(ys, [0.0, -0.25, -0.5, -0.75]);
        assert_eq!(holo.lines[0].settings.billboard, Billboard::Center);
        assert!(!holo.lines[0].settings.shadow);
        assert!(holo.lines[1].settings.shadow);
    }

    #[test]
    fn bad_files_and_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", SPAWN);
        write(dir.path(), "b.yml", "name: spawn_info\nlocation: {world: world}\nlines: [{text: dup}]\n");
        write(dir.path(), "nolocation.yml", "lines: [{text: hi}]\n");
        write(dir.path(), "nolines.yml", "location: {world: world}\n");
        write(dir.path(), "broken.yml", "location: [oops\n");
        write(dir.path(), "partial.yml", "location: {world: nether}\nlines:\n  - {text: ok}\n  - {offset: {x: 1}}\n  - 42\n");
        write(dir.path(), "notes.txt", "not a hologram");

        let (recorder, log) = Recorder::logger();
        let store = HologramStore::open(dir.path(), &log).unwrap();
        let names: Vec<_> = store.all().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["partial", "Spawn_Info"]);
        assert_eq!(store.get("SPAWN_INFO").unwrap().lines[0].text, "Welcome");
        assert_eq!(store.get("partial").unwrap().lines.len(), 1);
        assert!(recorder.contains("duplicate hologram name 'spawn_info'"));
        assert!(recorder.contains("missing location"));
        assert!(recorder.contains("missing lines"));
        assert!(recorder.count(Level::Warn) >= 6);
    }

    #[test]
    fn create_save_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (_, log) = Recorder::logger();
        let mut store = HologramStore::open(dir.path().join("holograms"), &log).unwrap();
        let holo = Hologram::new(
            "shop",
            Location::new("world", 10.0, 70.0, -4.0),
            vec![Line::new("Buy here", V3(0.0, 0.0, 0.0))],
        );
        store.create(holo.clone()).unwrap();
        assert!(matches!(store.create(holo.clone().with_enabled(false)), Err(Error::AlreadyExists(_))));

        let lines = vec![
            Line::new("Buy here", V3(0.0, 0.0, 0.0)).with_settings(|s| s.with_see_through(true)),
            Line::new("Sell there", V3(0.0, -0.25, 0.0)),
        ];
        store.save_lines("SHOP", lines.clone()).unwrap();
        store.save_location("shop", Location::new("world", 1.0, 2.0, 3.0)).unwrap();

        let written = fs::read_to_string(dir.path().join("holograms/shop.yml")).unwrap();
        assert!(written.contains("see_through: true"));
        assert!(!written.contains("line_width"));

        let reopened = HologramStore::open(dir.path().join("holograms"), &log).unwrap();
        let loaded = reopened.get("shop").unwrap();
        assert_eq!(loaded.lines, lines);
        assert_eq!(loaded.location, Location::new("world", 1.0, 2.0, 3.0));

        assert!(matches!(store.save_lines("nope", vec![]), Err(Error::NotFound(_))));
        store.delete("Shop").unwrap();
        assert!(!dir.path().join("holograms/shop.yml").exists());
        assert!(store.is_empty());
        assert!(matches!(store.delete("shop"), Err(Error::NotFound(_))));
    }

    #[test]
    fn reload_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_, log) = Recorder::logger();
        let mut store = HologramStore::open(dir.path(), &log).unwrap();
        assert!(store.is_empty());
        write(dir.path(), "spawn.yml", SPAWN);
        assert_eq!(store.reload().unwrap(), 1);
        assert!(store.contains("spawn_info"));
    }

    #[test]
    fn missing_directory_reloads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let holograms = dir.path().join("holograms");
        let (recorder, log) = Recorder::logger();
        let mut store = HologramStore::open(&holograms, &log).unwrap();
        write(&holograms, "spawn.yml", SPAWN);
        assert_eq!(store.reload().unwrap(), 1);

        fs::remove_dir_all(&holograms).unwrap();
        assert_eq!(store.reload().unwrap(), 0);
        assert!(store.is_empty());
        assert!(holograms.is_dir());
        assert!(recorder.contains("is missing"));
    }

    #[test]
    fn worlds_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "spawn.yml", SPAWN);
        write(dir.path(), "far.yml", "location: {world: the_end}\nlines: [{text: far}]\n");
        let (recorder, log) = Recorder::logger();
        let store = HologramStore::open(dir.path(), &log).unwrap();
        let invalid = store.validate_worlds(|w| w == "world");
        assert_eq!(invalid, ["far"]);
        assert!(recorder.contains("1 holograms ready, 1 waiting"));
    }
}
