//! Send-and-Reply
//!
//! Request/response on top of `send` and `recv`:
//!
//! ```text
//! Client                              Server
//!   |                                   |
//!   | send_and_reply(server, buf)       |
//!   |---------------------------------->| recv(Any) -> client
//!   |  (waits for a reply from server)  |
//!   |                                   | ... process request ...
//!   |<----------------------------------| send(client, reply)
//!   | buf now holds the reply           |
//!   v                                   v
//! ```
//!
//! The reply is only accepted from the peer the request went to. Both legs
//! block without a time limit; a failure of either leg is returned as is.

use super::Lpc;
use crate::thread::{Endpoint, SourceFilter, Thread};
use crate::timer::Timeout;
use crate::vm::UserAddr;
use crate::Result;

impl Lpc {
    /// Send the body at `buffer` to `dest`, then receive `dest`'s reply into
    /// the same buffer
    ///
    /// # Returns
    ///
    /// * `Ok(())` - `buffer` holds the reply
    /// * `Err(_)` - The error of whichever leg failed first
    pub fn send_and_reply(&self, current: &Thread, dest: Endpoint, buffer: UserAddr) -> Result<()> {
        self.send(current, dest, Timeout::Infinite, buffer)?;
        self.recv(
            current,
            SourceFilter::Endpoint(dest),
            Timeout::Infinite,
            buffer,
            None,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LpcConfig;
    use crate::error::LpcError;
    use crate::ipc::MessageBody;
    use crate::thread::ThreadTable;
    use crate::vm::{AddressSpace, UserMemory};
    use std::sync::Arc;
    use std::thread;

    const BUF: UserAddr = UserAddr::new(0x4000);

    #[test]
    fn test_reply_replaces_request_in_place() {
        let table = Arc::new(ThreadTable::new());
        let (lpc, pool) = Lpc::with_config(table.clone(), &LpcConfig::unlimited());

        let client_mem = Arc::new(UserMemory::new());
        client_mem.map(BUF, 0x100).unwrap();
        let server_mem = Arc::new(UserMemory::new());
        server_mem.map(BUF, 0x100).unwrap();

        let client = table.spawn(client_mem.clone());
        let server = table.spawn(server_mem.clone());
        let server_ep = server.endpoint();

        let lpc_server = lpc.clone();
        let server_thread = thread::spawn(move || {
            let from = lpc_server
                .recv(&server, SourceFilter::Any, Timeout::Infinite, BUF, None)
                .unwrap();
            let request = MessageBody::from_bytes(&server_mem.read(BUF, 64).unwrap());
            let reply = MessageBody::with_words(&[request.word(0).unwrap() * 2]);
            server_mem.copy_out(BUF, reply.as_bytes()).unwrap();
            lpc_server.send(&server, from, Timeout::Infinite, BUF)
        });

        client_mem
            .write(BUF, MessageBody::with_words(&[21]).as_bytes())
            .unwrap();
        lpc.send_and_reply(&client, server_ep, BUF).unwrap();

        assert_eq!(server_thread.join().unwrap(), Ok(()));
        let reply = MessageBody::from_bytes(&client_mem.read(BUF, 64).unwrap());
        assert_eq!(reply.word(0), Some(42));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_first_leg_failure_is_returned() {
        let table = Arc::new(ThreadTable::new());
        let (lpc, _pool) = Lpc::with_config(table.clone(), &LpcConfig::unlimited());
        let client = table.spawn(Arc::new(UserMemory::new()));

        let missing = Endpoint::new(1234);
        assert_eq!(
            lpc.send_and_reply(&client, missing, BUF),
            Err(LpcError::NotFound { endpoint: missing })
        );
    }
}
