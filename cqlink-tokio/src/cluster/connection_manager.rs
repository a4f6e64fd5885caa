use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::frame::message_response::ResponseBody;
use crate::frame::{Frame, Opcode, Version};
use crate::future::BoxFuture;
use crate::transport::CqlTransport;

/// Manages establishing connections to nodes.
pub trait ConnectionManager<T: CqlTransport>: Send + Sync {
    /// Tries to establish a new, ready to use connection to given node. Only a single attempt is
    /// made - reconnecting is driven by node state.
    fn connection(&self, addr: SocketAddr) -> BoxFuture<'_, Result<T>>;
}

/// Makes a fresh connection ready for queries.
pub async fn startup<T: CqlTransport>(transport: &T, version: Version) -> Result<()> {
    let startup_frame = Frame::new_req_startup(version);
    let start_response = transport.write_frame(&startup_frame).await?;

    match start_response.opcode {
        Opcode::Ready => Ok(()),
        Opcode::Authenticate => {
            let authenticator = match start_response.response_body()? {
                ResponseBody::Authenticate(authenticator) => authenticator,
                _ => String::new(),
            };

            Err(Error::General(format!(
                "Node {} requires authentication ({authenticator}), which is not supported",
                transport.address()
            )))
        }
        opcode => Err(Error::UnexpectedStartupResponse(opcode)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Direction, Flags};
    use futures::FutureExt;

    struct FixedResponse(Frame);

    impl CqlTransport for FixedResponse {
        fn write_frame<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, Result<Frame>> {
            assert_eq!(frame.opcode, Opcode::Startup);
            let response = self.0.clone();
            async move { Ok(response) }.boxed()
        }

        fn is_broken(&self) -> bool {
            false
        }

        fn address(&self) -> SocketAddr {
            "127.0.0.1:9042".parse().unwrap()
        }
    }

    fn respond_with(opcode: Opcode, body: Vec<u8>) -> FixedResponse {
        FixedResponse(Frame::new(
            Version::V4,
            Direction::Response,
            Flags::empty(),
            opcode,
            0,
            body,
        ))
    }

    #[tokio::test]
    async fn should_accept_ready() {
        let transport = respond_with(Opcode::Ready, vec![]);
        assert!(startup(&transport, Version::V4).await.is_ok());
    }

    #[tokio::test]
    async fn should_reject_authentication_request() {
        let transport = respond_with(Opcode::Authenticate, vec![0, 3, b'P', b'w', b'd']);
        match startup(&transport, Version::V4).await {
            Err(Error::General(message)) => assert!(message.contains("Pwd")),
            result => panic!("Unexpected result: {result:?}"),
        }
    }

    #[tokio::test]
    async fn should_reject_unexpected_response() {
        let transport = respond_with(Opcode::Supported, vec![0, 0]);
        assert!(matches!(
            startup(&transport, Version::V4).await,
            Err(Error::UnexpectedStartupResponse(Opcode::Supported))
        ));
    }
}
