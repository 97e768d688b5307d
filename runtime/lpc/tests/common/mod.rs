//! Shared fixtures for the LPC integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lpc::*;

/// Message buffer mapped in every test thread
pub const BUF: UserAddr = UserAddr::new(0x1000);

/// Sender-identity slot mapped in every test thread
pub const SLOT: UserAddr = UserAddr::new(0x1800);

/// A thread table, an LPC service and its message pool
pub struct System {
    pub table: Arc<ThreadTable>,
    pub lpc: Lpc,
    pub pool: Arc<MessagePool>,
}

impl System {
    pub fn new() -> Self {
        let table = Arc::new(ThreadTable::new());
        let (lpc, pool) = Lpc::with_config(table.clone(), &LpcConfig::unlimited());
        Self { table, lpc, pool }
    }

    /// Spawn a thread with `BUF` and `SLOT` mapped
    pub fn spawn(&self) -> (Thread, Arc<UserMemory>) {
        let mem = Arc::new(UserMemory::new());
        mem.map(BUF, 0x1000).unwrap();
        (self.table.spawn(mem.clone()), mem)
    }

    /// Spawn a thread in a custom address space
    pub fn spawn_in(&self, space: Arc<dyn AddressSpace>) -> Thread {
        self.table.spawn(space)
    }
}

/// Poll `cond` until it holds; panics after five seconds
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Write a one-word body into `mem` at `BUF`
pub fn write_word(mem: &UserMemory, word: u64) {
    mem.write(BUF, MessageBody::with_words(&[word]).as_bytes()).unwrap();
}

/// Read the first body word at `BUF`
pub fn read_word(mem: &UserMemory) -> u64 {
    let bytes = mem.read(BUF, MSG_BODY_SIZE).unwrap();
    MessageBody::from_bytes(&bytes).word(0).unwrap()
}

/// Read the sender identity stored at `SLOT`
pub fn read_slot(mem: &UserMemory) -> Endpoint {
    let bytes = mem.read(SLOT, 4).unwrap();
    Endpoint::new(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
