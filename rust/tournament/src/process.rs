use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use shortdeck_engine::player::{PlayerAction, PlayerId};
use shortdeck_engine::{GameEvent, GameState, PublicState};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::errors::TournamentError;
use crate::event_log::EventRecord;
use crate::events::EventBus;
use crate::persister::{PersistCommand, PersisterHandle};
use crate::TournamentId;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, TournamentError>>;

pub(crate) enum Command {
    StartHand {
        reply: Reply<Vec<EventRecord>>,
    },
    Action {
        player_id: PlayerId,
        action: PlayerAction,
        reply: Reply<Vec<EventRecord>>,
    },
    PublicState {
        viewer: Option<PlayerId>,
        reply: Reply<PublicState>,
    },
}

/// What a process needs besides its state.
pub(crate) struct ProcessContext {
    pub bus: EventBus,
    pub persister: PersisterHandle,
    pub shuffle_seed: Option<u64>,
    pub inbox_capacity: usize,
}

/// Handle the directory keeps for a running tournament.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pub tx: mpsc::Sender<Command>,
    pub task: JoinHandle<()>,
    pub persister: PersisterHandle,
}

impl ProcessHandle {
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed() && !self.task.is_finished()
    }
}

/// Sole owner of one tournament's state.
///
/// Commands are taken from the inbox one at a time; each one runs to
/// completion, including handing its events to the persister and the bus,
/// before the next is looked at.
pub(crate) struct TournamentProcess {
    id: TournamentId,
    state: GameState,
    next_sequence: u64,
    shuffle_seed: Option<u64>,
    bus: EventBus,
    persister: PersisterHandle,
}

impl TournamentProcess {
    /// Starts the task. `pending` events were already applied to `state` and
    /// are published before the first command is read.
    pub fn spawn(
        id: TournamentId,
        state: GameState,
        last_sequence: u64,
        pending: Vec<GameEvent>,
        ctx: ProcessContext,
    ) -> ProcessHandle {
        let (tx, rx) = mpsc::channel(ctx.inbox_capacity.max(1));
        let persister = ctx.persister.clone();
        let mut process = Self {
            id,
            state,
            next_sequence: last_sequence + 1,
            shuffle_seed: ctx.shuffle_seed,
            bus: ctx.bus,
            persister: ctx.persister,
        };
        let task = tokio::spawn(async move {
            if !pending.is_empty() {
                process.publish(pending);
            }
            process.run(rx).await;
        });
        ProcessHandle {
            tx,
            task,
            persister,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::StartHand { reply } => {
                    let _ = reply.send(self.start_hand());
                }
                Command::Action {
                    player_id,
                    action,
                    reply,
                } => {
                    let _ = reply.send(self.act(&player_id, action));
                }
                Command::PublicState { viewer, reply } => {
                    let _ = reply.send(Ok(self.state.public_view(viewer.as_ref())));
                }
            }
        }
        tracing::info!(tournament_id = %self.id, "tournament process stopped");
    }

    fn start_hand(&mut self) -> Result<Vec<EventRecord>, TournamentError> {
        let mut rng = match self.shuffle_seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed.wrapping_add(self.state.hand_number() + 1)),
            None => ChaCha20Rng::from_os_rng(),
        };
        let events = self.state.start_hand(&mut rng)?;

        // a hand that ran to completion inside start_hand has nothing left to hide
        if let Some(private) = self.state.private_state() {
            self.persister.send(PersistCommand::Shards {
                hand_number: private.hand_number,
                private,
            });
        }
        tracing::info!(
            tournament_id = %self.id,
            hand_number = self.state.hand_number(),
            button_seat = ?self.state.button_seat(),
            "hand started"
        );
        Ok(self.publish(events))
    }

    fn act(
        &mut self,
        player_id: &PlayerId,
        action: PlayerAction,
    ) -> Result<Vec<EventRecord>, TournamentError> {
        match self.state.act(player_id, action) {
            Ok(events) => {
                tracing::debug!(
                    tournament_id = %self.id,
                    hand_number = self.state.hand_number(),
                    player_id = %player_id,
                    action = ?action,
                    "action applied"
                );
                Ok(self.publish(events))
            }
            Err(err) => {
                tracing::debug!(
                    tournament_id = %self.id,
                    player_id = %player_id,
                    action = ?action,
                    error = %err,
                    "action rejected"
                );
                Err(err.into())
            }
        }
    }

    /// Numbers applied events, queues them for persistence and broadcasts them.
    fn publish(&mut self, events: Vec<GameEvent>) -> Vec<EventRecord> {
        let timestamp = Utc::now();
        let records: Vec<EventRecord> = events
            .into_iter()
            .map(|event| {
                let record = EventRecord {
                    tournament_id: self.id.clone(),
                    sequence: self.next_sequence,
                    timestamp,
                    event,
                };
                self.next_sequence += 1;
                record
            })
            .collect();

        self.persister.send(PersistCommand::Events {
            records: records.clone(),
            state: Box::new(self.state.clone()),
        });
        for record in &records {
            if let GameEvent::TournamentCompleted { winner } = &record.event {
                tracing::info!(
                    tournament_id = %self.id,
                    winner = %winner,
                    "tournament completed"
                );
            }
            self.bus.broadcast(record);
        }
        records
    }
}
