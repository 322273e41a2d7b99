use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use crate::collections::Arena;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::hologram::Line;
use crate::host::{DelayedTask, Entities, Listener, Players, Scheduler, TimerTask, Worlds};
use crate::logging::Logger;
use crate::types::{EntityId, Location, PlayerId, Sender, TaskId};

// Headless stand-in for the game engine: just enough world, entity and
// player state for the plugin to run against. Time only moves when `tick`
// is called, so tests drive it deterministically and the binary drives it
// off the wall clock.

struct Entity {
    location: Location,
    component: Value,
    data: HashMap<String, Vec<u8>>,
}

struct Player {
    name: String,
    location: Location,
    operator: bool,
    permissions: HashSet<String>,
    hidden: HashSet<EntityId>,
    inbox: Vec<String>,
}

enum Job {
    Timer(TimerTask),
    Once(DelayedTask),
}
struct Task {
    id: TaskId,
    due: u64,
    period: u64,
    job: Job,
}
#[derive(Default)]
struct Tasks {
    next_id: u64,
    queue: Vec<Task>,
    // taken out of `queue` for the current tick
    running: HashSet<TaskId>,
    cancelled: HashSet<TaskId>,
}

#[derive(Default)]
struct State {
    tick: u64,
    worlds: BTreeSet<String>,
    entities: Arena<Entity>,
    players: HashMap<PlayerId, Player>,
    next_player: u32,
    operators: HashSet<String>,
    console: Vec<String>,
    refuse_spawns: Vec<String>,
}

pub struct Server {
    state: Mutex<State>,
    tasks: Mutex<Tasks>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    log: Logger,
}

impl Server {
    pub fn new(log: Logger) -> Self {
        Self {
            state: Default::default(),
            tasks: Default::default(),
            listeners: Default::default(),
            log: log.scoped("mcholo::server"),
        }
    }
    pub fn with_worlds(log: Logger, worlds: &[&str]) -> Self {
        let server = Self::new(log);
        for world in worlds {
            server.add_world(world);
        }
        server
    }
    pub fn from_config(config: &ServerConfig, log: Logger) -> Self {
        let server = Self::new(log);
        {
            let mut state = server.state.lock();
            state.worlds.extend(config.worlds.iter().cloned());
            state.operators.extend(config.operators.iter().cloned());
        }
        server
    }

    pub fn register(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }
    fn listeners(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners.read().clone()
    }
}

// time
impl Server {
    /// Advances one tick and runs everything due by then.
    pub fn tick(&self) {
        let now = {
            let mut state = self.state.lock();
            state.tick += 1;
            state.tick
        };
        let mut due: Vec<Task> = {
            let mut tasks = self.tasks.lock();
            let (due, rest): (Vec<Task>, Vec<Task>) = mem::take(&mut tasks.queue).into_iter().partition(|t| t.due <= now);
            tasks.queue = rest;
            tasks.running.extend(due.iter().map(|t| t.id));
            due
        };
        due.sort_by_key(|t| (t.due, t.id));

        for Task { id, period, job, .. } in due {
            {
                let mut tasks = self.tasks.lock();
                if tasks.cancelled.remove(&id) {
                    tasks.running.remove(&id);
                    continue;
                }
            }
            let again = match job {
                Job::Once(job) => {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        self.log.error(format_args!("task {} panicked", id.0));
                    }
                    None
                }
                Job::Timer(mut job) => match catch_unwind(AssertUnwindSafe(|| job())) {
                    Ok(ControlFlow::Continue(())) => Some(job),
                    Ok(ControlFlow::Break(())) => None,
                    Err(_) => {
                        self.log.error(format_args!("repeating task {} panicked, unscheduling it", id.0));
                        None
                    }
                },
            };
            let mut tasks = self.tasks.lock();
            tasks.running.remove(&id);
            let cancelled = tasks.cancelled.remove(&id);
            if let (Some(job), false) = (again, cancelled) {
                tasks.queue.push(Task { id, due: now + period, period, job: Job::Timer(job) });
            }
        }
    }

    pub fn run_ticks(&self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn tick_until(&self, tick: u64) {
        while self.current_tick() < tick {
            self.tick();
        }
    }

    pub fn next_tick(&self) -> u64 {
        self.current_tick() + 1
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.tasks.lock().queue.len()
    }

    fn schedule(&self, delay: u32, period: u32, job: Job) -> TaskId {
        let due = self.current_tick() + u64::from(delay.max(1));
        let mut tasks = self.tasks.lock();
        tasks.next_id += 1;
        let id = TaskId(tasks.next_id);
        tasks.queue.push(Task { id, due, period: u64::from(period.max(1)), job });
        id
    }
}

impl Scheduler for Server {
    fn run_timer(&self, delay: u32, period: u32, task: TimerTask) -> TaskId {
        self.schedule(delay, period, Job::Timer(task))
    }
    fn run_later(&self, delay: u32, task: DelayedTask) -> TaskId {
        self.schedule(delay, 1, Job::Once(task))
    }
    fn cancel(&self, task: TaskId) {
        let mut tasks = self.tasks.lock();
        let before = tasks.queue.len();
        tasks.queue.retain(|t| t.id != task);
        if tasks.queue.len() == before && tasks.running.contains(&task) {
            tasks.cancelled.insert(task);
        }
    }
    fn current_tick(&self) -> u64 {
        self.state.lock().tick
    }
}

// worlds
impl Server {
    /// Adds a world without telling listeners.
    pub fn add_world(&self, world: &str) {
        self.state.lock().worlds.insert(world.to_owned());
    }

    pub fn load_world(&self, world: &str) {
        if !self.state.lock().worlds.insert(world.to_owned()) {
            return;
        }
        self.log.info(format_args!("loaded world '{world}'"));
        for listener in self.listeners() {
            listener.on_world_load(world);
        }
    }

    /// Drops the world and everything in it.
    pub fn unload_world(&self, world: &str) {
        let mut state = self.state.lock();
        if state.worlds.remove(world) {
            state.entities.retain(|_, e| e.location.world != world);
            self.log.info(format_args!("unloaded world '{world}'"));
        }
    }
}

impl Worlds for Server {
    fn is_world_loaded(&self, world: &str) -> bool {
        self.state.lock().worlds.contains(world)
    }
    fn loaded_worlds(&self) -> Vec<String> {
        self.state.lock().worlds.iter().cloned().collect()
    }
}

/// The JSON text component a display would be sent with.
fn component(line: &Line) -> Value {
    let s = &line.settings;
    json!({
        "text": line.text,
        "opacity": s.text_opacity,
        "line_width": s.line_width,
        "alignment": s.text_alignment.to_string(),
        "billboard": s.billboard.to_string(),
        "shadowed": s.shadow,
        "see_through": s.see_through,
        "background": if s.default_background { Value::Null } else { json!(s.background_argb()) },
        "brightness": s.brightness.map(|b| b.packed()),
        "view_range": s.view_range,
        "shadow_radius": s.shadow_radius,
        "shadow_strength": s.shadow_strength,
        "transformation": {
            "translation": s.translation,
            "left_rotation": s.left_rotation,
            "scale": s.scale,
            "right_rotation": s.right_rotation,
        },
    })
}

impl Entities for Server {
    fn spawn_text_display(&self, at: &Location, line: &Line) -> Result<EntityId> {
        let mut state = self.state.lock();
        if !state.worlds.contains(&at.world) {
            return Err(Error::WorldNotLoaded(at.world.clone()));
        }
        if state.refuse_spawns.iter().any(|s| line.text.contains(s.as_str())) {
            return Err(Error::Host(format!("cannot spawn '{}'", line.text)));
        }
        Ok(state.entities.insert(Entity {
            location: at.clone(),
            component: component(line),
            data: HashMap::new(),
        }))
    }
    fn update_text_display(&self, entity: EntityId, line: &Line) -> Result<()> {
        let mut state = self.state.lock();
        let e = state.entities.get_mut(entity).ok_or(Error::StaleEntity(entity))?;
        e.component = component(line);
        Ok(())
    }
    fn teleport_entity(&self, entity: EntityId, to: &Location) -> Result<()> {
        let mut state = self.state.lock();
        if !state.worlds.contains(&to.world) {
            return Err(Error::WorldNotLoaded(to.world.clone()));
        }
        let e = state.entities.get_mut(entity).ok_or(Error::StaleEntity(entity))?;
        e.location = to.clone();
        Ok(())
    }
    fn remove_entity(&self, entity: EntityId) {
        let mut state = self.state.lock();
        if state.entities.remove(entity).is_some() {
            for player in state.players.values_mut() {
                player.hidden.remove(&entity);
            }
        }
    }
    fn is_entity_valid(&self, entity: EntityId) -> bool {
        self.state.lock().entities.contains(entity)
    }
    fn set_persistent_data(&self, entity: EntityId, key: &str, data: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock();
        let e = state.entities.get_mut(entity).ok_or(Error::StaleEntity(entity))?;
        e.data.insert(key.to_owned(), data);
        Ok(())
    }
    fn persistent_data(&self, entity: EntityId, key: &str) -> Option<Vec<u8>> {
        self.state.lock().entities.get(entity)?.data.get(key).cloned()
    }
    fn entities_with_data(&self, key: &str) -> Vec<(EntityId, Vec<u8>)> {
        let state = self.state.lock();
        state
            .entities
            .iter()
            .filter_map(|(id, e)| Some((id, e.data.get(key)?.clone())))
            .collect()
    }
}

// players and commands
impl Server {
    pub fn login(&self, name: &str, at: Location) -> PlayerId {
        let pid = {
            let mut state = self.state.lock();
            let pid = PlayerId(state.next_player);
            state.next_player += 1;
            let operator = state.operators.contains(name);
            state.players.insert(pid, Player {
                name: name.to_owned(),
                location: at,
                operator,
                permissions: HashSet::new(),
                hidden: HashSet::new(),
                inbox: vec![],
            });
            pid
        };
        self.log.info(format_args!("{name} joined as {pid:?}"));
        for listener in self.listeners() {
            listener.on_player_join(pid);
        }
        pid
    }

    pub fn logout(&self, pid: PlayerId) {
        let Some(player) = self.state.lock().players.remove(&pid) else {
            return;
        };
        self.log.info(format_args!("{} left", player.name));
        for listener in self.listeners() {
            listener.on_player_quit(pid);
        }
    }

    pub fn player_command(&self, pid: PlayerId, line: &str) -> bool {
        self.dispatch(Sender::Player(pid), line)
    }

    pub fn console_command(&self, line: &str) -> bool {
        self.dispatch(Sender::Console, line)
    }

    fn dispatch(&self, sender: Sender, line: &str) -> bool {
        let mut words = line.trim().trim_start_matches('/').split_whitespace();
        let Some(label) = words.next() else {
            return false;
        };
        let args: Vec<&str> = words.collect();
        for listener in self.listeners() {
            if listener.on_command(sender, label, &args) {
                return true;
            }
        }
        self.send_message(sender, &format!("Unknown command '{label}'."));
        false
    }

    pub fn grant(&self, pid: PlayerId, permission: &str) {
        if let Some(player) = self.state.lock().players.get_mut(&pid) {
            player.permissions.insert(permission.to_owned());
        }
    }
    pub fn revoke(&self, pid: PlayerId, permission: &str) {
        if let Some(player) = self.state.lock().players.get_mut(&pid) {
            player.permissions.remove(permission);
        }
    }
    pub fn set_operator(&self, pid: PlayerId, operator: bool) {
        if let Some(player) = self.state.lock().players.get_mut(&pid) {
            player.operator = operator;
        }
    }

    /// Drains what `to` has been sent so far.
    pub fn take_messages(&self, to: Sender) -> Vec<String> {
        let mut state = self.state.lock();
        match to {
            Sender::Console => mem::take(&mut state.console),
            Sender::Player(pid) => state.players.get_mut(&pid).map(|p| mem::take(&mut p.inbox)).unwrap_or_default(),
        }
    }
}

impl Players for Server {
    fn online_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<_> = self.state.lock().players.keys().copied().collect();
        players.sort();
        players
    }
    fn has_permission(&self, pid: PlayerId, permission: &str) -> bool {
        self.state
            .lock()
            .players
            .get(&pid)
            .map_or(false, |p| p.operator || p.permissions.contains(permission))
    }
    fn player_location(&self, pid: PlayerId) -> Option<Location> {
        self.state.lock().players.get(&pid).map(|p| p.location.clone())
    }
    fn teleport_player(&self, pid: PlayerId, to: &Location) -> Result<()> {
        let mut state = self.state.lock();
        if !state.worlds.contains(&to.world) {
            return Err(Error::WorldNotLoaded(to.world.clone()));
        }
        let player = state.players.get_mut(&pid).ok_or(Error::PlayerOffline(pid))?;
        player.location = to.clone();
        Ok(())
    }
    fn show_entity(&self, pid: PlayerId, entity: EntityId) {
        if let Some(player) = self.state.lock().players.get_mut(&pid) {
            player.hidden.remove(&entity);
        }
    }
    fn hide_entity(&self, pid: PlayerId, entity: EntityId) {
        let mut state = self.state.lock();
        if !state.entities.contains(entity) {
            return;
        }
        if let Some(player) = state.players.get_mut(&pid) {
            player.hidden.insert(entity);
        }
    }
    fn send_message(&self, to: Sender, message: &str) {
        let mut state = self.state.lock();
        match to {
            Sender::Console => {
                self.log.info(format_args!("{message}"));
                state.console.push(message.to_owned());
            }
            Sender::Player(pid) => {
                if let Some(player) = state.players.get_mut(&pid) {
                    player.inbox.push(message.to_owned());
                }
            }
        }
    }
}

// inspection
impl Server {
    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }
    pub fn entity_location(&self, entity: EntityId) -> Option<Location> {
        self.state.lock().entities.get(entity).map(|e| e.location.clone())
    }
    pub fn entity_component(&self, entity: EntityId) -> Option<Value> {
        self.state.lock().entities.get(entity).map(|e| e.component.clone())
    }
    pub fn entity_text(&self, entity: EntityId) -> Option<String> {
        let component = self.entity_component(entity)?;
        component["text"].as_str().map(str::to_owned)
    }
    /// Text of every display in `world`, ordered top to bottom.
    pub fn texts_in(&self, world: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut found: Vec<(f64, String)> = state
            .entities
            .iter()
            .filter(|(_, e)| e.location.world == world)
            .filter_map(|(_, e)| Some((e.location.pos.y, e.component["text"].as_str()?.to_owned())))
            .collect();
        found.sort_by(|a, b| b.0.total_cmp(&a.0));
        found.into_iter().map(|(_, text)| text).collect()
    }
    pub fn is_hidden_from(&self, pid: PlayerId, entity: EntityId) -> bool {
        self.state.lock().players.get(&pid).map_or(false, |p| p.hidden.contains(&entity))
    }
    /// Makes spawning fail for any line whose text contains `needle`.
    pub fn refuse_spawns_containing(&self, needle: &str) {
        self.state.lock().refuse_spawns.push(needle.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::V3;

    fn server() -> Server {
        Server::with_worlds(Logger::default(), &["world"])
    }

    #[test]
    fn timers_follow_delay_and_period() {
        let server = server();
        let hits = Arc::new(Mutex::new(vec![]));
        let h = Arc::clone(&hits);
        let s = Arc::new(server);
        let clock = Arc::clone(&s);
        let mut left = 3;
        s.run_timer(0, 4, Box::new(move || {
            h.lock().push(clock.current_tick());
            left -= 1;
            if left == 0 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        }));
        let h = Arc::clone(&hits);
        s.run_later(2, Box::new(move || h.lock().push(100)));
        s.tick_until(20);
        assert_eq!(*hits.lock(), [1, 100, 5, 9]);
        assert_eq!(s.scheduled_tasks(), 0);
        assert_eq!(s.next_tick(), 21);
    }

    #[test]
    fn cancelling_from_inside_a_tick() {
        let s = Arc::new(server());
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = s.run_timer(0, 1, Box::new(move || {
            *c.lock() += 1;
            ControlFlow::Continue(())
        }));
        let canceller = Arc::clone(&s);
        s.run_later(3, Box::new(move || canceller.cancel(id)));
        s.run_ticks(10);
        // the timer ran before the canceller on tick 3
        assert_eq!(*count.lock(), 3);
        assert_eq!(s.scheduled_tasks(), 0);
    }

    #[test]
    fn entities_and_data() {
        let s = server();
        let line = Line::new("hello", V3(0.0, 0.0, 0.0));
        let at = Location::new("world", 1.0, 2.0, 3.0);
        let id = s.spawn_text_display(&at, &line).unwrap();
        assert_eq!(s.entity_text(id).as_deref(), Some("hello"));
        assert_eq!(s.entity_component(id).unwrap()["billboard"], "fixed");
        s.set_persistent_data(id, "k", vec![7]).unwrap();
        assert_eq!(s.persistent_data(id, "k"), Some(vec![7]));
        assert_eq!(s.entities_with_data("k"), [(id, vec![7])]);

        assert!(matches!(s.spawn_text_display(&Location::new("nether", 0.0, 0.0, 0.0), &line), Err(Error::WorldNotLoaded(_))));
        s.unload_world("world");
        assert!(!s.is_entity_valid(id));
        assert!(matches!(s.update_text_display(id, &line), Err(Error::StaleEntity(_))));
    }

    #[test]
    fn permissions_and_messages() {
        let config = ServerConfig { operators: vec!["op".into()], ..ServerConfig::default() };
        let s = Server::from_config(&config, Logger::default());
        let op = s.login("op", Location::new("world", 0.0, 64.0, 0.0));
        let guest = s.login("guest", Location::new("world", 0.0, 64.0, 0.0));
        assert!(s.has_permission(op, "anything"));
        assert!(!s.has_permission(guest, "holo.list"));
        s.grant(guest, "holo.list");
        assert!(s.has_permission(guest, "holo.list"));

        assert!(!s.player_command(guest, "/nothing here"));
        assert_eq!(s.take_messages(Sender::Player(guest)), ["Unknown command 'nothing'."]);
        assert!(s.take_messages(Sender::Player(guest)).is_empty());

        s.logout(guest);
        assert_eq!(s.online_players(), [op]);
        assert!(matches!(s.teleport_player(guest, &Location::new("world", 0.0, 0.0, 0.0)), Err(Error::PlayerOffline(_))));
    }
}
