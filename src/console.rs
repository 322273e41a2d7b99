use std::io::{self, Read};
use std::mem;
use std::os::unix::io::AsRawFd;
use std::time::Instant;

use polling::{Event, Poller};

use crate::logging::Logger;
use crate::server::Server;

const INPUT: usize = 0;

/// Operator commands typed on stdin, read between ticks.
pub struct Console<R = io::Stdin> {
    poller: Poller,
    events: Vec<Event>,
    source: R,
    input: LineBuffer,
    open: bool,
    log: Logger,
}

impl Console {
    pub fn new(log: &Logger) -> io::Result<Self> {
        Self::with_input(io::stdin(), log)
    }
}

impl<R: Read + AsRawFd> Console<R> {
    pub fn with_input(source: R, log: &Logger) -> io::Result<Self> {
        let poller = Poller::new()?;
        poller.add(&source, Event::readable(INPUT))?;
        Ok(Self {
            poller,
            events: vec![],
            source,
            input: LineBuffer::default(),
            open: true,
            log: log.scoped("mcholo::console"),
        })
    }

    /// Runs console commands as they arrive until `deadline`.
    /// Returns false once `stop` has been entered.
    pub fn process_until(&mut self, deadline: Instant, server: &Server) -> io::Result<bool> {
        loop {
            let Some(timeout) = deadline.checked_duration_since(Instant::now()) else {
                return Ok(true);
            };
            self.events.clear();
            match self.poller.wait(&mut self.events, Some(timeout)) {
                Ok(0) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if self.open {
                self.read_available()?;
            }
            for line in self.input.take_lines() {
                match line.trim() {
                    "" => {}
                    "stop" => return Ok(false),
                    command => {
                        server.console_command(command);
                    }
                }
            }
        }
    }

    fn read_available(&mut self) -> io::Result<()> {
        let mut buf = [0; 4096];
        match self.source.read(&mut buf) {
            Ok(0) => {
                // with the input gone the poller only paces ticks
                self.poller.delete(&self.source)?;
                self.open = false;
                self.log.info(format_args!("console input closed"));
                return Ok(());
            }
            Ok(n) => self.input.push(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        self.poller.modify(&self.source, Event::readable(INPUT))
    }
}

/// Bytes read so far, handed out one complete line at a time.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }
    fn take_lines(&mut self) -> Vec<String> {
        let Some(end) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return vec![];
        };
        let rest = self.pending.split_off(end + 1);
        let complete = mem::replace(&mut self.pending, rest);
        String::from_utf8_lossy(&complete).lines().map(str::to_owned).collect()
    }
}
