//! Lossy network relay for deterministic testing.
//!
//! Real networks drop, duplicate and mangle datagrams.  The transport has no
//! recovery for any of that; a [`Simulator`] sits between a sender and a
//! receiver so tests can show exactly how such faults degrade the receiver's
//! statistics:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.        |
//! | Duplication  | Deliver a datagram twice.                            |
//! | Corruption   | Cut a datagram below the header size.                |
//!
//! Close frames always pass through untouched so the receiver's loop still
//! terminates.  The RNG is seeded, so a given config replays the same faults
//! for the same traffic order.

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::{Frame, HEADER_LEN};
use crate::socket::{RecvWait, Socket, SocketError};

/// Configuration for the fault-injection model.
///
/// All probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is truncated into an undecodable stub.
    pub corrupt_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default; the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// What the relay did with the traffic it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulatorStats {
    /// Datagrams received from the sender side.
    pub seen: u64,
    /// Datagrams written towards the target, duplicates included.
    pub forwarded: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub corrupted: u64,
}

/// A fault-injecting UDP relay.
#[derive(Debug)]
pub struct Simulator {
    socket: Socket,
    target: SocketAddr,
    config: SimulatorConfig,
    rng: StdRng,
}

impl Simulator {
    /// Bind the relay on `local` and forward everything to `target`.
    pub async fn bind(
        local: SocketAddr,
        target: SocketAddr,
        config: SimulatorConfig,
    ) -> Result<Self, SocketError> {
        let socket = Socket::bind(local).await?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            socket,
            target,
            config,
            rng,
        })
    }

    /// Address senders should target.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Relay datagrams until a close frame has been forwarded.
    pub async fn run(mut self, wait: RecvWait) -> Result<SimulatorStats, SocketError> {
        let mut stats = SimulatorStats::default();
        let mut buf = vec![0u8; 65_535];

        loop {
            let (n, _) = self.socket.recv_datagram(&mut buf, wait, None).await?;
            let datagram = &buf[..n];
            stats.seen += 1;

            if Frame::decode(datagram).is_ok_and(|f| f.is_close()) {
                self.socket.send_raw(datagram, self.target).await?;
                stats.forwarded += 1;
                log::debug!("[sim] close forwarded; {stats:?}");
                return Ok(stats);
            }

            if self.roll(self.config.loss_rate) {
                stats.dropped += 1;
                continue;
            }

            let out = if self.roll(self.config.corrupt_rate) {
                stats.corrupted += 1;
                let cut = self.rng.random_range(0..HEADER_LEN.min(n.max(1)));
                datagram[..cut.min(n)].to_vec()
            } else {
                datagram.to_vec()
            };

            let copies = if self.roll(self.config.duplicate_rate) {
                stats.duplicated += 1;
                2
            } else {
                1
            };
            for _ in 0..copies {
                self.socket.send_raw(&out, self.target).await?;
                stats.forwarded += 1;
            }
        }
    }

    fn roll(&mut self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        p > 0.0 && self.rng.random_bool(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: RecvWait = RecvWait::Timeout(Duration::from_secs(5));

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn pass_through_by_default() {
        let target = loopback().await;
        let sim = Simulator::bind(
            "127.0.0.1:0".parse().unwrap(),
            target.local_addr,
            SimulatorConfig::default(),
        )
        .await
        .unwrap();
        let relay = sim.local_addr();
        let task = tokio::spawn(sim.run(WAIT));

        let client = loopback().await;
        client
            .send_frame(&Frame::data(1, 0, b"abc", 100), relay)
            .await
            .unwrap();
        client.send_frame(&Frame::Close, relay).await.unwrap();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.seen, 2);
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.dropped, 0);

        let mut buf = [0u8; 64];
        let (n, _) = target.recv_datagram(&mut buf, WAIT, None).await.unwrap();
        assert_eq!(
            Frame::decode(&buf[..n]).unwrap(),
            Frame::data(1, 0, b"abc", 100)
        );
    }

    #[tokio::test]
    async fn total_loss_still_forwards_close() {
        let target = loopback().await;
        let config = SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::bind("127.0.0.1:0".parse().unwrap(), target.local_addr, config)
            .await
            .unwrap();
        let relay = sim.local_addr();
        let task = tokio::spawn(sim.run(WAIT));

        let client = loopback().await;
        for i in 0..5u32 {
            client
                .send_frame(&Frame::data(1, i * 10, b"0123456789", 10), relay)
                .await
                .unwrap();
        }
        client.send_frame(&Frame::Close, relay).await.unwrap();

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.dropped, 5);
        assert_eq!(stats.forwarded, 1);

        let mut buf = [0u8; 64];
        let (n, _) = target.recv_datagram(&mut buf, WAIT, None).await.unwrap();
        assert_eq!(Frame::decode(&buf[..n]).unwrap(), Frame::Close);
    }
}
