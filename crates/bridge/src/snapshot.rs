//! Slot da leitura atual: um escritor (pipeline), vários leitores.

use factory_core::Reading;
use std::sync::Arc;
use tokio::sync::watch;

pub struct CurrentReading {
    tx: watch::Sender<Option<Arc<Reading>>>,
}

impl Default for CurrentReading {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentReading {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Troca atomicamente a leitura atual e retorna a nova.
    pub fn replace(&self, reading: Reading) -> Arc<Reading> {
        let reading = Arc::new(reading);
        self.tx.send_replace(Some(Arc::clone(&reading)));
        reading
    }

    pub fn latest(&self) -> Option<Arc<Reading>> {
        self.tx.borrow().clone()
    }
}
