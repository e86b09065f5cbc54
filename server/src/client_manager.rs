//! Per-address challenge bookkeeping for the mock game server.
//!
//! A2S_PLAYER and A2S_RULES (and A2S_INFO when the server is configured to
//! demand it) are only answered when the request carries the challenge the
//! server last issued to that address. Challenges expire after a period of
//! inactivity, and the number of tracked addresses is capped.

use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A querying address and the challenge it was issued.
#[derive(Debug)]
pub struct Client {
    pub addr: SocketAddr,
    pub challenge: i32,
    /// Last time this address sent anything
    pub last_seen: Instant,
}

impl Client {
    pub fn new(addr: SocketAddr, challenge: i32) -> Self {
        Self {
            addr,
            challenge,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    clients: HashMap<SocketAddr, Client>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Returns the challenge for `addr`, issuing a fresh one if the address
    /// has none or its old one expired.
    ///
    /// When the table is full the stalest entry is evicted first.
    pub fn challenge_for(&mut self, addr: SocketAddr) -> i32 {
        if let Some(client) = self.clients.get_mut(&addr) {
            if !client.is_timed_out(self.timeout) {
                client.last_seen = Instant::now();
                return client.challenge;
            }
        }

        if self.clients.len() >= self.max_clients && !self.clients.contains_key(&addr) {
            self.check_timeouts();
            if self.clients.len() >= self.max_clients {
                let stalest = self
                    .clients
                    .values()
                    .min_by_key(|c| c.last_seen)
                    .map(|c| c.addr);
                if let Some(stalest) = stalest {
                    debug!("Evicting challenge for {}", stalest);
                    self.clients.remove(&stalest);
                }
            }
        }

        let challenge = new_challenge();
        debug!("Issued challenge {:#x} to {}", challenge, addr);
        self.clients.insert(addr, Client::new(addr, challenge));
        challenge
    }

    /// True when `challenge` is the live challenge issued to `addr`.
    pub fn verify(&mut self, addr: SocketAddr, challenge: i32) -> bool {
        match self.clients.get_mut(&addr) {
            Some(client) if !client.is_timed_out(self.timeout) && client.challenge == challenge => {
                client.last_seen = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Drops expired entries and returns their addresses.
    pub fn check_timeouts(&mut self) -> Vec<SocketAddr> {
        let expired: Vec<SocketAddr> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(self.timeout))
            .map(|c| c.addr)
            .collect();

        for addr in &expired {
            self.clients.remove(addr);
        }
        if !expired.is_empty() {
            info!("Expired {} challenges", expired.len());
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Random challenge that never collides with the "no challenge" marker.
fn new_challenge() -> i32 {
    let mut rng = rand::thread_rng();
    loop {
        let value: i32 = rng.gen();
        if value != shared::packet::NO_CHALLENGE && value != 0 {
            return value;
        }
    }
}
