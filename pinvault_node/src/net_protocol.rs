//! Blob exchange between nodes over iroh.
//!
//! Every request is one bidirectional stream. The client writes a postcard
//! encoded [`Request`] and finishes its side. The server answers with a
//! postcard encoded [`Response`], followed by the blob bytes when it has
//! them, and finishes.

use anyhow::bail;
use bytes::Bytes;
use futures::StreamExt;
use iroh::{
    Endpoint, EndpointAddr,
    endpoint::Connection,
    protocol::{AcceptError, ProtocolHandler},
};
use pinvault_core::{BlobStore, ContentId, Hash, StoreError, store::ByteStream};
use serde::{Deserialize, Serialize};

/// The ALPN string for this protocol
pub const ALPN: &[u8] = b"pinvault/blobs/0";

const MAX_REQUEST_SIZE: usize = 64;

/// Largest reply accepted from a peer.
pub const MAX_REPLY_SIZE: usize = 1 << 30;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    Get { hash: [u8; 32] },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Response {
    /// `size` blob bytes follow the header.
    Found { size: u64 },
    NotFound,
    Failed(String),
}

/// Serves blobs from a node's store to any peer that asks by hash.
#[derive(Debug, Clone)]
pub struct BlobsProvider {
    store: BlobStore,
}

impl BlobsProvider {
    pub fn new(store: BlobStore) -> Self {
        Self { store }
    }

    async fn lookup(&self, hash: Hash) -> (Response, Option<ByteStream>) {
        let found = async {
            let size = self.store.size(hash).await?;
            let body = self.store.read_stream(hash).await?;
            anyhow::Ok((size, body))
        };
        match found.await {
            Ok((size, body)) => (Response::Found { size }, Some(body)),
            Err(err) if StoreError::is_not_found(&err) => (Response::NotFound, None),
            Err(err) => {
                tracing::warn!("provider: reading {} failed: {err:#}", hash.fmt_short());
                (Response::Failed(err.to_string()), None)
            }
        }
    }
}

impl ProtocolHandler for BlobsProvider {
    async fn accept(&self, connection: Connection) -> Result<(), AcceptError> {
        loop {
            let (mut send, mut recv) = match connection.accept_bi().await {
                Ok(streams) => streams,
                // The peer closes the connection once it has its replies.
                Err(_) => return Ok(()),
            };

            let req_bytes = recv
                .read_to_end(MAX_REQUEST_SIZE)
                .await
                .map_err(AcceptError::from_err)?;
            let req: Request = postcard::from_bytes(&req_bytes).map_err(AcceptError::from_err)?;

            match req {
                Request::Get { hash } => {
                    let hash = Hash::from_bytes(hash);
                    let (response, body) = self.lookup(hash).await;
                    tracing::debug!("provider: get {} -> {response:?}", hash.fmt_short());

                    let header = postcard::to_allocvec(&response).map_err(AcceptError::from_err)?;
                    send.write_all(&header).await.map_err(AcceptError::from_err)?;
                    if let Some(mut body) = body {
                        while let Some(chunk) = body.next().await {
                            let chunk = chunk.map_err(AcceptError::from_err)?;
                            send.write_all(&chunk).await.map_err(AcceptError::from_err)?;
                        }
                    }
                    send.finish().map_err(AcceptError::from_err)?;
                }
            }
        }
    }
}

/// Asks the peer at `addr` for `cid`. `Ok(None)` means the peer doesn't
/// hold it.
///
/// The bytes are returned as sent. Callers verify them against the hash.
pub async fn fetch_from_peer(
    endpoint: &Endpoint,
    addr: EndpointAddr,
    cid: ContentId,
) -> anyhow::Result<Option<Bytes>> {
    let conn = endpoint.connect(addr, ALPN).await?;
    let (mut send, mut recv) = conn.open_bi().await?;

    let request = postcard::to_allocvec(&Request::Get {
        hash: *cid.hash().as_bytes(),
    })?;
    send.write_all(&request).await?;
    send.finish()?;

    let reply = recv.read_to_end(MAX_REPLY_SIZE).await?;
    conn.close(0u32.into(), b"done");

    let (response, body) = postcard::take_from_bytes::<Response>(&reply)?;
    match response {
        Response::NotFound => Ok(None),
        Response::Failed(reason) => bail!("peer could not read {cid}: {reason}"),
        Response::Found { size } => {
            if body.len() as u64 != size {
                bail!("peer announced {size} bytes for {cid} but sent {}", body.len());
            }
            Ok(Some(Bytes::copy_from_slice(body)))
        }
    }
}
