use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use tickwire::prelude::*;
use tickwire::protocol::stable_hash;

// ---------------------------------------------------------------------------
// Game types
// ---------------------------------------------------------------------------

const STEP: u32 = 1;
const BOUND: i32 = 8;
const HASH_EVERY: u32 = 5;
const WAIT: Duration = Duration::from_secs(2);

/// One walker moving one cell. Sent by clients, relayed by the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Step {
    pub walker: u32,
    pub dx: i32,
    pub dy: i32,
}

impl Step {
    /// The move a bot makes in `round`. Deterministic so runs can be replayed.
    fn for_round(walker: u32, round: u32) -> Self {
        Self {
            walker,
            dx: ((round + walker) % 3) as i32 - 1,
            dy: ((round * 7 + walker) % 3) as i32 - 1,
        }
    }
}

/// The simulation every client runs locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct World {
    walkers: BTreeMap<u32, (i32, i32)>,
    applied: u32,
    last_time: u64,
}

impl World {
    fn apply(&mut self, game_time: u64, step: Step) {
        let pos = self.walkers.entry(step.walker).or_insert((0, 0));
        pos.0 = (pos.0 + step.dx).clamp(-BOUND, BOUND);
        pos.1 = (pos.1 + step.dy).clamp(-BOUND, BOUND);
        self.applied += 1;
        self.last_time = game_time;
    }

    fn fingerprint(&self) -> u32 {
        let mut bytes = Vec::with_capacity(self.walkers.len() * 12);
        for (walker, (x, y)) in &self.walkers {
            bytes.extend_from_slice(&walker.to_le_bytes());
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
        }
        stable_hash(&bytes)
    }
}

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

async fn bot(addr: SocketAddr) -> Result<Client<World>, TickwireError> {
    let mut client = Client::builder(addr)
        .on_value(STEP, |world: &mut World, origin: &Origin, step: Step| {
            // Steps only count once the room has stamped them.
            if let Some(game_time) = origin.game_time {
                world.apply(game_time, step);
            }
        })
        .connect(World::default())
        .await?;
    if !client.poll_until(WAIT, |c| c.session().is_connected()).await {
        tracing::warn!(local = %client.local_addr(), "no reply to handshake");
    }
    Ok(client)
}

/// Runs `bots` clients through `rounds` rounds of steps in one room and
/// returns them for inspection.
async fn run_session(addr: SocketAddr, bots: usize, rounds: u32) -> Result<Vec<Client<World>>, TickwireError> {
    let mut clients = Vec::with_capacity(bots);
    for _ in 0..bots {
        clients.push(bot(addr).await?);
    }

    let host = &mut clients[0];
    host.host_room().await?;
    host.poll_until(WAIT, |c| c.session().room_id().is_some()).await;
    let Some(room_id) = host.session().room_id() else {
        tracing::error!("room was not created");
        return Ok(clients);
    };
    for guest in clients.iter_mut().skip(1) {
        guest.join_room(room_id).await?;
        guest.poll_until(WAIT, |c| c.session().room_id().is_some()).await;
    }
    clients[0]
        .poll_until(WAIT, |c| c.session().room.as_ref().is_some_and(|r| r.users.len() == bots))
        .await;
    tracing::info!(%room_id, bots, "room ready");

    for round in 0..rounds {
        for client in &mut clients {
            let walker = client.session().user_id.map_or(0, |id| id.0);
            client.send_value(STEP, &Step::for_round(walker, round)).await?;
        }

        let expected = (round + 1) * bots as u32;
        for client in &mut clients {
            if !client.poll_until(WAIT, |c| c.app().applied >= expected).await {
                tracing::warn!(round, applied = client.app().applied, expected, "steps missing");
            }
        }

        if (round + 1) % HASH_EVERY == 0 {
            for client in &mut clients {
                let hash = client.app().fingerprint();
                client.send_state_hash(hash).await?;
            }
        }
    }

    // Give the room a tick to verify the last hashes.
    for client in &mut clients {
        client
            .poll_until(Duration::from_millis(100), |c| c.session().desync.is_some())
            .await;
    }
    Ok(clients)
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tickwire::init_tracing();

    let server = Server::builder()
        .bind("127.0.0.1:0".parse()?)
        .build()
        .await?;
    let addr = server.local_addr();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    let clients = run_session(addr, 3, 20).await?;
    for client in &clients {
        let world = client.app();
        tracing::info!(
            user_id = ?client.session().user_id,
            applied = world.applied,
            game_time = world.last_time,
            fingerprint = format_args!("{:#010x}", world.fingerprint()),
            desync = client.session().desync.is_some(),
            "final state"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walkers_stay_in_bounds() {
        let mut world = World::default();
        for t in 0..20 {
            world.apply(t, Step { walker: 1, dx: 1, dy: -1 });
        }
        assert_eq!(world.walkers[&1], (BOUND, -BOUND));
        assert_eq!(world.applied, 20);
        assert_eq!(world.last_time, 19);
    }

    #[test]
    fn test_fingerprint_tracks_positions() {
        let mut a = World::default();
        let mut b = World::default();
        a.apply(0, Step { walker: 1, dx: 1, dy: 0 });
        a.apply(0, Step { walker: 2, dx: 0, dy: 1 });
        b.apply(0, Step { walker: 2, dx: 0, dy: 1 });
        b.apply(0, Step { walker: 1, dx: 1, dy: 0 });
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.apply(50, Step { walker: 1, dx: 1, dy: 0 });
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_round_steps_are_single_cells() {
        for round in 0..10 {
            let step = Step::for_round(3, round);
            assert!((-1..=1).contains(&step.dx));
            assert!((-1..=1).contains(&step.dy));
        }
    }

    #[tokio::test]
    async fn test_bots_stay_in_lockstep() {
        let mut config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        config.room.tick = TickConfig::with_period_ms(20);
        let server = Server::builder().config(config).build().await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let clients = run_session(addr, 3, 10).await.unwrap();

        let first = clients[0].app();
        assert_eq!(first.applied, 30);
        for client in &clients {
            assert_eq!(client.app(), first);
            assert!(client.session().desync.is_none());
        }
    }
}
