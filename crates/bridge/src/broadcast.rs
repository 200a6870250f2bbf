//! Fan-out de leituras para assinantes em tempo real, agrupados por tópico.
//!
//! Cada assinante tem uma fila limitada. `publish` nunca espera: fila cheia
//! descarta a mensagem só para aquele assinante.

use factory_core::Reading;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Tópico em que todo assinante entra ao conectar.
pub const DEFAULT_TOPIC: &str = "telemetry";

pub type SubscriberId = u64;

/// Enquanto a fila segue cheia, avisa de novo a cada tantos descartes.
const DROP_WARN_EVERY: u64 = 100;

/// Mensagem entregue aos assinantes.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastMessage {
    pub topic: String,
    pub reading: Reading,
}

/// Handle de um assinante recém-registrado.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Arc<BroadcastMessage>>,
}

/// Resultado de um `publish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

struct Subscriber {
    topics: HashSet<String>,
    tx: mpsc::Sender<Arc<BroadcastMessage>>,
    /// Descartes seguidos desde a última entrega
    dropped: Arc<AtomicU64>,
}

/// O primeiro descarte de uma sequência e depois um a cada `DROP_WARN_EVERY`.
fn should_warn(streak: u64) -> bool {
    streak == 1 || streak % DROP_WARN_EVERY == 0
}

pub struct Broadcaster {
    buffer: usize,
    next_id: AtomicU64,
    registry: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            registry: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registra um assinante no tópico padrão.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.buffer);
        let topics = HashSet::from([DEFAULT_TOPIC.to_string()]);
        let dropped = Arc::new(AtomicU64::new(0));
        self.registry().insert(id, Subscriber { topics, tx, dropped });
        info!("Assinante #{id} conectado");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry().remove(&id).is_some() {
            info!("Assinante #{id} desconectado");
        }
    }

    /// Adiciona o assinante a um tópico. `false` se o id não existe.
    pub fn join(&self, id: SubscriberId, topic: &str) -> bool {
        match self.registry().get_mut(&id) {
            Some(sub) => {
                sub.topics.insert(topic.to_string());
                debug!("Assinante #{id} entrou em {topic:?}");
                true
            }
            None => false,
        }
    }

    pub fn leave(&self, id: SubscriberId, topic: &str) -> bool {
        match self.registry().get_mut(&id) {
            Some(sub) => {
                let removed = sub.topics.remove(topic);
                debug!("Assinante #{id} saiu de {topic:?}");
                removed
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    pub fn topic_count(&self, topic: &str) -> usize {
        self.registry()
            .values()
            .filter(|s| s.topics.contains(topic))
            .count()
    }

    /// Envia a leitura a todos os assinantes do tópico sem bloquear.
    pub fn publish(&self, topic: &str, reading: Reading) -> PublishReport {
        // Snapshot dos senders; o lock não fica preso durante o envio
        let targets: Vec<_> = self
            .registry()
            .iter()
            .filter(|(_, s)| s.topics.contains(topic))
            .map(|(id, s)| (*id, s.tx.clone(), Arc::clone(&s.dropped)))
            .collect();

        let mut report = PublishReport::default();
        if targets.is_empty() {
            return report;
        }

        let message = Arc::new(BroadcastMessage {
            topic: topic.to_string(),
            reading,
        });

        for (id, tx, dropped) in targets {
            match tx.try_send(Arc::clone(&message)) {
                Ok(()) => {
                    report.delivered += 1;
                    let streak = dropped.swap(0, Ordering::Relaxed);
                    if streak > 0 {
                        info!("Assinante #{id} voltou a consumir após {streak} descarte(s)");
                    }
                }
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    let streak = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if should_warn(streak) {
                        warn!("Fila do assinante #{id} cheia, {streak} mensagem(ns) descartada(s)");
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    warn!("Assinante #{id} com canal fechado, aguardando desconexão");
                }
            }
        }

        report
    }
}
