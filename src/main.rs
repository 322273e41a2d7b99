use std::path::PathBuf;
use std::sync::Arc;
use std::time::*;

use mcholo::console::Console;
use mcholo::logging::Logger;
use mcholo::{Config, Plugin, Server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config_path = std::env::args_os().nth(1).map_or_else(|| PathBuf::from("config.yml"), PathBuf::from);
    let config = Config::load(&config_path)?;
    let tick_millis = config.server.tick_millis.max(1);

    let log = Logger::default();
    let server = Arc::new(Server::from_config(&config.server, log.clone()));
    let plugin = Plugin::enable(server.clone(), config, log.clone())?;
    server.register(plugin.clone());
    let mut console = Console::new(&log)?;
    log::info!("running with {}, type 'stop' to shut down", config_path.display());

    let starttime = Instant::now();
    loop {
        let next_tick_due = starttime + Duration::from_millis(server.next_tick() * tick_millis);
        if !console.process_until(next_tick_due, &server)? {
            break;
        }

        let time_passed_in_ticks = (Instant::now() - starttime).as_millis() / u128::from(tick_millis);
        server.tick_until(time_passed_in_ticks as u64);
    }
    plugin.disable();
    log::info!("stopped");
    Ok(())
}
