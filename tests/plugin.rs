use std::fs;
use std::sync::Arc;

use mcholo::host::Entities;
use mcholo::logging::Logger;
use mcholo::tags::TAG_KEY;
use mcholo::types::{Location, Sender};
use mcholo::{Config, Plugin, Server};

const LOBBY: &str = "\
name: lobby
location: {world: world, x: 0.5, y: 70.0, z: 0.5}
lines:
  - text: [Welcome, to the server]
  - text: Staff only
    offset: {y: -0.5}
    display_settings: {permission: staff.see, billboard: CENTER}
";

const CAVE: &str = "\
name: cave
location: {world: mines, x: 10.0, y: 20.0, z: 10.0}
lines:
  - text: Mind the gap
";

struct Setup {
    server: Arc<Server>,
    plugin: Arc<Plugin>,
    dir: tempfile::TempDir,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let holograms = dir.path().join("holograms");
    fs::create_dir_all(&holograms).unwrap();
    fs::write(holograms.join("lobby.yml"), LOBBY).unwrap();
    fs::write(holograms.join("cave.yml"), CAVE).unwrap();
    fs::write(holograms.join("broken.yml"), "name: [").unwrap();
    fs::write(dir.path().join("messages.yml"), "prefix: '[holo] '\n").unwrap();

    let config: Config = Config::parse(&format!(
        "data_folder: {}\nstartup_delay_ticks: 5\nbatch: {{size: 1, interval_ticks: 2}}\nserver: {{operators: [admin]}}\n",
        dir.path().display()
    ))
    .unwrap();
    let server = Arc::new(Server::from_config(&config.server, Logger::default()));
    let plugin = Plugin::enable(server.clone(), config, Logger::default()).unwrap();
    server.register(plugin.clone());
    Setup { server, plugin, dir }
}

#[test]
fn startup_spawns_loaded_worlds_and_waits_for_the_rest() {
    let s = setup();
    s.server.run_ticks(5);
    assert_eq!(s.server.entity_count(), 0);
    s.server.tick();
    assert_eq!(s.plugin.displays().active_names(), ["lobby"]);
    assert_eq!(s.server.texts_in("world"), ["Welcome", "to the server", "Staff only"]);
    assert_eq!(s.server.entities_with_data(TAG_KEY).len(), 3);

    s.server.load_world("mines");
    s.server.tick();
    assert_eq!(s.plugin.displays().active_names(), ["cave", "lobby"]);

    s.server.unload_world("mines");
    s.plugin.disable();
    assert_eq!(s.server.entity_count(), 0);
}

#[test]
fn permission_gated_lines_follow_the_player() {
    let s = setup();
    s.server.run_ticks(10);
    let guest = s.server.login("guest", Location::new("world", 0.0, 64.0, 0.0));
    let admin = s.server.login("admin", Location::new("world", 0.0, 64.0, 0.0));
    s.server.tick();

    let staff_line = s.plugin.displays().with_display("lobby", |d| d.entity(2)).flatten().unwrap();
    let welcome = s.plugin.displays().with_display("lobby", |d| d.entity(0)).flatten().unwrap();
    assert!(s.server.is_hidden_from(guest, staff_line));
    assert!(!s.server.is_hidden_from(guest, welcome));
    assert!(!s.server.is_hidden_from(admin, staff_line));
    assert!(s.plugin.visibility().is_line_visible(admin, "lobby", 2));

    s.server.logout(guest);
    assert!(s.plugin.visibility().visible_lines(guest, "lobby").is_empty());
}

#[test]
fn commands_edit_and_persist() {
    let s = setup();
    s.server.run_ticks(10);
    let admin = s.server.login("admin", Location::new("world", 3.0, 64.0, 3.0));
    let me = Sender::Player(admin);

    s.server.player_command(admin, "/holo create shop Buy here");
    s.server.player_command(admin, "/hologram e shop addline Sell there");
    s.server.player_command(admin, "/holofx edit shop set_alignment 2 left");
    let replies = s.server.take_messages(me);
    assert_eq!(replies[0], "[holo] &aCreated hologram 'shop'.");
    assert!(replies.iter().all(|r| r.starts_with("[holo] ")));
    assert_eq!(replies.len(), 3);

    let saved = fs::read_to_string(s.dir.path().join("holograms/shop.yml")).unwrap();
    assert!(saved.contains("Sell there"));
    assert!(saved.contains("text_alignment: LEFT"));
    let texts = s.server.texts_in("world");
    assert_eq!(texts[texts.len() - 2..], ["Buy here", "Sell there"]);
    let second = s.plugin.displays().with_display("shop", |d| d.entity(1)).flatten().unwrap();
    assert_eq!(s.server.entity_component(second).unwrap()["text"], "Sell there");

    s.server.console_command("holo remove shop");
    assert!(!s.dir.path().join("holograms/shop.yml").exists());
    assert!(!s.plugin.displays().is_active("shop"));
}

#[test]
fn reload_picks_up_file_changes() {
    let s = setup();
    s.server.run_ticks(10);
    let lobby = s.dir.path().join("holograms/lobby.yml");
    fs::write(&lobby, LOBBY.replace("Staff only", "Members only")).unwrap();

    s.server.console_command("holo reload lobby");
    assert!(s.server.texts_in("world").contains(&"Members only".to_owned()));

    fs::remove_file(&lobby).unwrap();
    s.server.console_command("holo reload");
    let console = s.server.take_messages(Sender::Console);
    assert!(console.iter().any(|m| m.contains("Reloaded 1 holograms")));
    s.server.run_ticks(30);
    assert!(s.plugin.displays().active_names().is_empty());
    assert_eq!(s.server.entity_count(), 0);
}
