//! Registry aller Konsolen eines Server-Prozesses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use netplay_shared::{ConsoleId, IdGenerator};
use tracing::{debug, info};

use crate::console::{Console, ConsoleStatus};

pub type SharedConsole = Arc<Mutex<Console>>;

#[derive(Debug)]
pub struct ConsoleRegistry {
    consoles: RwLock<HashMap<ConsoleId, SharedConsole>>,
    console_ids: IdGenerator,
    client_ids: IdGenerator,
    max_consoles: Option<usize>,
}

impl ConsoleRegistry {
    pub fn new(max_consoles: Option<usize>) -> Self {
        Self {
            consoles: RwLock::new(HashMap::new()),
            console_ids: IdGenerator::default(),
            client_ids: IdGenerator::default(),
            max_consoles,
        }
    }

    /// Creates a console, or returns `None` when the console limit is reached.
    ///
    /// Finished consoles are dropped first and do not count against the limit.
    pub fn create_console(
        &self,
        title: &str,
        rom_name: &str,
        rom_file_md5: &str,
    ) -> Option<ConsoleId> {
        let mut consoles = self.consoles.write().unwrap_or_else(|e| e.into_inner());
        prune(&mut consoles);
        if self
            .max_consoles
            .is_some_and(|max| consoles.len() >= max)
        {
            return None;
        }
        let id = ConsoleId::new(self.console_ids.next());
        let console = Console::new(id, title, rom_name, rom_file_md5, self.client_ids.clone());
        consoles.insert(id, Arc::new(Mutex::new(console)));
        info!(console = %id, title, rom_name, "console created");
        Some(id)
    }

    pub fn get(&self, id: ConsoleId) -> Option<SharedConsole> {
        let consoles = self.consoles.read().unwrap_or_else(|e| e.into_inner());
        consoles.get(&id).cloned()
    }

    /// Drops consoles in state `Done`, returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut consoles = self.consoles.write().unwrap_or_else(|e| e.into_inner());
        prune(&mut consoles)
    }

    pub fn len(&self) -> usize {
        self.consoles.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every console; clients receive `StopConsolePB`.
    pub fn stop_all(&self, reason: &str) {
        let consoles: Vec<SharedConsole> = {
            let consoles = self.consoles.read().unwrap_or_else(|e| e.into_inner());
            consoles.values().cloned().collect()
        };
        for console in consoles {
            lock(&console).stop(reason);
        }
    }
}

fn prune(consoles: &mut HashMap<ConsoleId, SharedConsole>) -> usize {
    let before = consoles.len();
    consoles.retain(|id, console| {
        let done = lock(console).status() == ConsoleStatus::Done;
        if done {
            debug!(console = %id, "removing finished console");
        }
        !done
    });
    before - consoles.len()
}

/// Locks a console, recovering from a poisoned mutex.
pub fn lock(console: &SharedConsole) -> MutexGuard<'_, Console> {
    console.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
