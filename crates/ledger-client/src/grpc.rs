//! gRPC transport. Requests and responses are already-encoded protobuf bytes,
//! so the codec only frames them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use http::uri::PathAndQuery;
use ledger_proto::ServiceMethod;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::debug;

use crate::network::Node;
use crate::transport::{Transport, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default)]
struct RawCodec;

impl Codec for RawCodec {
    type Encode = Vec<u8>;
    type Decode = Vec<u8>;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Vec<u8>;
    type Error = tonic::Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Vec<u8>;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut item = vec![0; src.remaining()];
        src.copy_to_slice(&mut item);
        Ok(Some(item))
    }
}

/// Plaintext gRPC to node addresses, one lazily connected channel per address.
#[derive(Debug, Default)]
pub struct GrpcTransport {
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, address: &str) -> Result<Channel, TransportError> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.get(address) {
            return Ok(channel.clone());
        }
        let channel = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|err| TransportError::Internal(err.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT)
            .connect_lazy();
        channels.insert(address.to_string(), channel.clone());
        Ok(channel)
    }

    async fn unary(
        &self,
        address: &str,
        path: PathAndQuery,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut grpc = tonic::client::Grpc::new(self.channel(address)?);
        grpc.ready()
            .await
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        let mut request = tonic::Request::new(request);
        request.set_timeout(timeout);
        let response = grpc
            .unary(request, path, RawCodec)
            .await
            .map_err(status_to_error)?;
        Ok(response.into_inner())
    }
}

fn status_to_error(status: tonic::Status) -> TransportError {
    match status.code() {
        Code::Unavailable | Code::ResourceExhausted => {
            TransportError::Unavailable(status.message().to_string())
        }
        Code::DeadlineExceeded => TransportError::Timeout,
        code => TransportError::Rejected {
            code: code as i32,
            message: status.message().to_string(),
        },
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn call(
        &self,
        node: &Node,
        method: ServiceMethod,
        request: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let path = PathAndQuery::try_from(method.path())
            .map_err(|err| TransportError::Internal(err.to_string()))?;
        let mut last_error =
            TransportError::Unavailable(format!("{} has no address", node.account_id()));

        for address in node.addresses() {
            let call = self.unary(address, path.clone(), request.clone(), timeout);
            match tokio::time::timeout(timeout, call).await {
                Ok(Err(TransportError::Unavailable(message))) => {
                    debug!(node = %node.account_id(), %address, %message, "address unavailable");
                    last_error = TransportError::Unavailable(message);
                }
                Ok(result) => return result,
                Err(_) => return Err(TransportError::Timeout),
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_grpc_codes() {
        assert!(status_to_error(tonic::Status::unavailable("down")).is_retryable());
        assert!(status_to_error(tonic::Status::resource_exhausted("throttled")).is_retryable());
        assert_eq!(
            status_to_error(tonic::Status::deadline_exceeded("slow")),
            TransportError::Timeout
        );
        assert_eq!(
            status_to_error(tonic::Status::invalid_argument("bad")),
            TransportError::Rejected {
                code: Code::InvalidArgument as i32,
                message: "bad".to_string()
            }
        );
    }

    #[tokio::test]
    async fn channels_are_cached_per_address() {
        let transport = GrpcTransport::new();
        transport.channel("127.0.0.1:50211").expect("channel");
        transport.channel("127.0.0.1:50211").expect("channel");
        transport.channel("127.0.0.1:50212").expect("channel");
        assert_eq!(transport.channels.lock().expect("lock").len(), 2);
    }
}
