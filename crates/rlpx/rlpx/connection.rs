use crate::{rlpx::handshake::encode_ack_message, MAX_DISC_PACKET_SIZE};

use super::{
    capability::{Capability, NegotiatedCapabilities},
    disconnect::DisconnectReason,
    error::RLPxError,
    eth::status::StatusMessage,
    frame,
    handshake::{decode_ack_message, decode_auth_message, encode_auth_message},
    message::Message,
    p2p::{self, DisconnectMessage, PingMessage, PongMessage},
    utils::{ecdh_xchng, id2pubkey, pubkey2id},
};
use aes::cipher::KeyIvInit;
use ethereum_types::{H256, H512};
use p2pkit_core::completion::{completion_pair, Completion, Completor};
use p2pkit_rlp::decode::RLPDecode;
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    PublicKey, SecretKey,
};
use sha3::{Digest, Keccak256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

pub(crate) type Aes256Ctr64BE = ctr::Ctr64BE<aes::Aes256>;

/// How long `handle_peer` waits for wire activity before sending a ping. A
/// ping already in flight when this fires again means the peer never
/// answered the previous one, which triggers the ping-timeout disconnect.
const PING_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1500);

/// A live RLPx connection: the encrypted transport established by the
/// ECIES handshake, plus the negotiated sub-protocol id-range table once
/// Hello messages have been exchanged.
pub struct RLPxConnection<S> {
    signer: SigningKey,
    state: RLPxConnectionState,
    stream: S,
    client_id: String,
    listen_port: u16,
    local_capabilities: Vec<(Capability, u8)>,
    remote_capabilities: Vec<(Capability, u8)>,
    negotiated: NegotiatedCapabilities,
    /// Completor for the ping currently awaiting a Pong, if any. Holding
    /// onto it rather than completing it immediately lets `send_ping`'s
    /// caller observe exactly when the matching Pong arrives.
    pending_pong: Option<Completor<(), RLPxError>>,
}

impl<S: AsyncWrite + AsyncRead + std::marker::Unpin> RLPxConnection<S> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        signer: SigningKey,
        stream: S,
        state: RLPxConnectionState,
        client_id: String,
        listen_port: u16,
        local_capabilities: Vec<(Capability, u8)>,
    ) -> Self {
        Self {
            signer,
            state,
            stream,
            client_id,
            listen_port,
            local_capabilities,
            remote_capabilities: vec![],
            negotiated: NegotiatedCapabilities::default(),
            pending_pong: None,
        }
    }

    pub fn receiver(
        signer: SigningKey,
        stream: S,
        client_id: String,
        listen_port: u16,
        local_capabilities: Vec<(Capability, u8)>,
    ) -> Self {
        let mut rng = rand::thread_rng();
        Self::new(
            signer,
            stream,
            RLPxConnectionState::Receiver(Receiver::new(
                H256::random_using(&mut rng),
                SecretKey::random(&mut rng),
            )),
            client_id,
            listen_port,
            local_capabilities,
        )
    }

    pub async fn initiator(
        signer: SigningKey,
        msg: &[u8],
        stream: S,
        client_id: String,
        listen_port: u16,
        local_capabilities: Vec<(Capability, u8)>,
    ) -> Result<Self, RLPxError> {
        let mut rng = rand::thread_rng();
        let digest = Keccak256::digest(msg.get(65..).ok_or(RLPxError::InvalidMessageLength())?);
        let signature = &Signature::from_bytes(
            msg.get(..64)
                .ok_or(RLPxError::InvalidMessageLength())?
                .into(),
        )?;
        let rid = RecoveryId::from_byte(*msg.get(64).ok_or(RLPxError::InvalidMessageLength())?)
            .ok_or(RLPxError::InvalidRecoveryId())?;
        let peer_pk = VerifyingKey::recover_from_prehash(&digest, signature, rid)?;
        let state = RLPxConnectionState::Initiator(Initiator::new(
            H256::random_using(&mut rng),
            SecretKey::random(&mut rng),
            pubkey2id(&peer_pk.into()),
        ));
        Ok(RLPxConnection::new(
            signer,
            stream,
            state,
            client_id,
            listen_port,
            local_capabilities,
        ))
    }

    /// Like [`Self::initiator`], but for a peer whose node id is already
    /// known out-of-band (e.g. a static peer list) rather than recovered
    /// from a signed discovery packet.
    pub fn initiator_with_node_id(
        signer: SigningKey,
        remote_node_id: H512,
        stream: S,
        client_id: String,
        listen_port: u16,
        local_capabilities: Vec<(Capability, u8)>,
    ) -> Self {
        let mut rng = rand::thread_rng();
        let state = RLPxConnectionState::Initiator(Initiator::new(
            H256::random_using(&mut rng),
            SecretKey::random(&mut rng),
            remote_node_id,
        ));
        RLPxConnection::new(
            signer,
            stream,
            state,
            client_id,
            listen_port,
            local_capabilities,
        )
    }

    pub async fn handshake(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Initiator(_) => {
                self.send_auth().await?;
                self.receive_ack().await?;
            }
            RLPxConnectionState::Receiver(_) => {
                self.receive_auth().await?;
                self.send_ack().await?;
            }
            _ => {
                return Err(RLPxError::HandshakeError(
                    "Invalid connection state for handshake".to_string(),
                ))
            }
        };
        info!("Completed ECIES handshake");

        self.exchange_hello_messages().await?;
        Ok(())
    }

    pub async fn exchange_hello_messages(&mut self) -> Result<(), RLPxError> {
        let hello_msg = Message::Hello(p2p::HelloMessage::new(
            self.client_id.clone(),
            self.local_capabilities.clone(),
            self.listen_port,
            PublicKey::from(self.signer.verifying_key()),
        ));

        self.send(hello_msg).await?;

        match self.receive().await? {
            Message::Hello(hello_message) => {
                self.remote_capabilities = hello_message.capabilities;
                self.negotiated = NegotiatedCapabilities::negotiate(
                    &self.local_capabilities,
                    &self.remote_capabilities,
                );

                if self.negotiated.is_empty() {
                    return Err(RLPxError::HandshakeError(
                        "No matching capabilities".to_string(),
                    ));
                }
                info!(ranges = ?self.negotiated, "Negotiated sub-protocol capabilities");
                Ok(())
            }
            other => Err(RLPxError::UnexpectedMessage(other)),
        }
    }

    pub async fn handle_peer(&mut self) -> Result<(), RLPxError> {
        self.start_capabilities().await?;
        match &self.state {
            RLPxConnectionState::Established(_) => {
                info!("Started peer main loop");
                loop {
                    match tokio::time::timeout(PING_INTERVAL, self.receive()).await {
                        Err(_elapsed) => {
                            if let Some(completor) = self.pending_pong.take() {
                                warn!("Ping timed out waiting for Pong, disconnecting");
                                let _ = completor
                                    .complete_err(RLPxError::Disconnected(DisconnectReason::PingTimeout));
                                let _ = self
                                    .send(Message::Disconnect(DisconnectMessage::new(Some(
                                        DisconnectReason::PingTimeout,
                                    ))))
                                    .await;
                                return Err(RLPxError::Disconnected(DisconnectReason::PingTimeout));
                            }
                            self.send_ping().await?;
                            info!("Ping sent");
                        }
                        Ok(message) => match message? {
                            Message::Disconnect(msg) => {
                                info!(reason = ?msg.reason, "Peer requested disconnect");
                                return Ok(());
                            }
                            Message::Ping(_) => {
                                info!("Received Ping");
                                self.send(Message::Pong(PongMessage::new())).await?;
                            }
                            Message::Pong(_) => {
                                info!("Received Pong");
                                if let Some(completor) = self.pending_pong.take() {
                                    let _ = completor.complete(());
                                }
                            }
                            Message::Hello(_) => {
                                return Err(RLPxError::UnexpectedMessage(Message::Hello(
                                    p2p::HelloMessage::new(
                                        self.client_id.clone(),
                                        vec![],
                                        self.listen_port,
                                        PublicKey::from(self.signer.verifying_key()),
                                    ),
                                )))
                            }
                            Message::SubProtocol { msg_id, payload } => {
                                self.handle_subprotocol_message(msg_id, &payload)?
                            }
                        },
                    }
                }
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    pub fn get_remote_node_id(&self) -> Result<H512, RLPxError> {
        match &self.state {
            RLPxConnectionState::Established(state) => Ok(state.remote_node_id),
            _ => Err(RLPxError::InvalidState()),
        }
    }

    /// Sends a Ping and returns a completion that resolves once the
    /// matching Pong arrives. Only one outstanding ping is tracked: calling
    /// this again before the previous Pong arrives drops the earlier
    /// completion, resolving it as cancelled, rather than queuing it.
    pub async fn send_ping(&mut self) -> Result<Completion<(), RLPxError>, RLPxError> {
        self.send(Message::Ping(PingMessage::new())).await?;
        let (completor, completion) = completion_pair();
        self.pending_pong = Some(completor);
        Ok(completion)
    }

    fn handle_subprotocol_message(&self, msg_id: u8, payload: &[u8]) -> Result<(), RLPxError> {
        match self.negotiated.resolve(msg_id) {
            Some(("eth", 0)) => {
                let status = StatusMessage::decode(payload)?;
                info!(network_id = status.network_id, "Received eth Status");
                Ok(())
            }
            Some((name, relative_id)) => {
                info!(name, relative_id, "Received unhandled sub-protocol message");
                Ok(())
            }
            None => Err(RLPxError::MessageNotHandled()),
        }
    }

    async fn start_capabilities(&mut self) -> Result<(), RLPxError> {
        if self.negotiated.range_for("eth").is_some() {
            let status = StatusMessage {
                eth_version: super::eth::status::ETH_VERSION,
                network_id: 1,
                total_difficulty: ethereum_types::U256::zero(),
                block_hash: H256::zero(),
                genesis: H256::zero(),
                fork_id: super::eth::status::ForkId {
                    hash: [0; 4],
                    next: 0,
                },
            };
            self.send_subprotocol("eth", 0, &status).await?;
        }
        Ok(())
    }

    async fn send_subprotocol(
        &mut self,
        capability_name: &str,
        relative_id: u8,
        message: &impl super::message::RLPxMessage,
    ) -> Result<(), RLPxError> {
        let range = self
            .negotiated
            .range_for(capability_name)
            .ok_or_else(|| RLPxError::NotFound(capability_name.to_string()))?;
        let msg_id = range
            .start
            .checked_add(relative_id)
            .filter(|id| range.contains(id))
            .ok_or(RLPxError::InvalidMessageLength())?;
        let mut payload = vec![];
        message.encode(&mut payload)?;
        self.send(Message::SubProtocol {
            msg_id,
            payload: payload.into(),
        })
        .await
    }

    async fn send_auth(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Initiator(initiator_state) => {
                let secret_key: SecretKey = self.signer.clone().into();
                let peer_pk =
                    id2pubkey(initiator_state.remote_node_id).ok_or(RLPxError::InvalidPeerId())?;

                let previous_state = initiator_state.clone();

                let msg = encode_auth_message(
                    &secret_key,
                    previous_state.nonce,
                    &peer_pk,
                    &previous_state.ephemeral_key,
                )?;

                self.send_handshake_msg(&msg).await?;

                self.state =
                    RLPxConnectionState::InitiatedAuth(InitiatedAuth::new(previous_state, msg));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    async fn send_ack(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::ReceivedAuth(received_auth_state) => {
                let peer_pk = id2pubkey(received_auth_state.remote_node_id)
                    .ok_or(RLPxError::InvalidPeerId())?;

                let previous_state = received_auth_state.clone();

                let msg = encode_ack_message(
                    &previous_state.local_ephemeral_key,
                    previous_state.local_nonce,
                    &peer_pk,
                )?;

                self.send_handshake_msg(&msg).await?;

                self.state = RLPxConnectionState::Established(Box::new(Established::for_receiver(
                    previous_state,
                    msg,
                )));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    async fn receive_auth(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::Receiver(receiver_state) => {
                let secret_key: SecretKey = self.signer.clone().into();
                let previous_state = receiver_state.clone();
                let msg_bytes = self.receive_handshake_msg().await?;
                let size_data = &msg_bytes
                    .get(..2)
                    .ok_or(RLPxError::InvalidMessageLength())?;
                let msg = &msg_bytes
                    .get(2..)
                    .ok_or(RLPxError::InvalidMessageLength())?;
                let (auth, remote_ephemeral_key) =
                    decode_auth_message(&secret_key, msg, size_data)?;

                self.state = RLPxConnectionState::ReceivedAuth(ReceivedAuth::new(
                    previous_state,
                    auth.node_id,
                    msg_bytes.to_owned(),
                    auth.nonce,
                    remote_ephemeral_key,
                ));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    async fn receive_ack(&mut self) -> Result<(), RLPxError> {
        match &self.state {
            RLPxConnectionState::InitiatedAuth(initiated_auth_state) => {
                let secret_key: SecretKey = self.signer.clone().into();
                let previous_state = initiated_auth_state.clone();
                let msg_bytes = self.receive_handshake_msg().await?;
                let size_data = &msg_bytes
                    .get(..2)
                    .ok_or(RLPxError::InvalidMessageLength())?;
                let msg = &msg_bytes
                    .get(2..)
                    .ok_or(RLPxError::InvalidMessageLength())?;
                let ack = decode_ack_message(&secret_key, msg, size_data)?;
                let remote_ephemeral_key = ack
                    .get_ephemeral_pubkey()
                    .ok_or(RLPxError::NotFound("Remote ephemeral key".to_string()))?;
                self.state =
                    RLPxConnectionState::Established(Box::new(Established::for_initiator(
                        previous_state,
                        msg_bytes.to_owned(),
                        ack.nonce,
                        remote_ephemeral_key,
                    )));
                Ok(())
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    async fn send_handshake_msg(&mut self, msg: &[u8]) -> Result<(), RLPxError> {
        self.stream
            .write_all(msg)
            .await
            .map_err(|_| RLPxError::ConnectionError("Could not send message".to_string()))?;
        Ok(())
    }

    async fn receive_handshake_msg(&mut self) -> Result<Vec<u8>, RLPxError> {
        let mut buf = vec![0; MAX_DISC_PACKET_SIZE];

        self.stream
            .read_exact(&mut buf[..2])
            .await
            .map_err(|_| RLPxError::ConnectionError("Connection dropped".to_string()))?;
        let ack_data = [buf[0], buf[1]];
        let msg_size = u16::from_be_bytes(ack_data) as usize;

        self.stream
            .read_exact(&mut buf[2..msg_size + 2])
            .await
            .map_err(|_| RLPxError::ConnectionError("Connection dropped".to_string()))?;
        let ack_bytes = &buf[..msg_size + 2];
        Ok(ack_bytes.to_vec())
    }

    async fn send(&mut self, message: Message) -> Result<(), RLPxError> {
        match &mut self.state {
            RLPxConnectionState::Established(state) => {
                let mut frame_buffer = vec![];
                message.encode(&mut frame_buffer)?;
                frame::write(frame_buffer, state, &mut self.stream).await?;
                Ok(())
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }

    async fn receive(&mut self) -> Result<Message, RLPxError> {
        match &mut self.state {
            RLPxConnectionState::Established(state) => {
                let frame_data = frame::read(state, &mut self.stream).await?;
                let (msg_id, msg_data): (u8, _) = RLPDecode::decode_unfinished(&frame_data)?;
                Ok(Message::decode(msg_id, msg_data)?)
            }
            _ => Err(RLPxError::InvalidState()),
        }
    }
}

enum RLPxConnectionState {
    Initiator(Initiator),
    Receiver(Receiver),
    ReceivedAuth(ReceivedAuth),
    InitiatedAuth(InitiatedAuth),
    Established(Box<Established>),
}

#[derive(Clone)]
struct Receiver {
    pub(crate) nonce: H256,
    pub(crate) ephemeral_key: SecretKey,
}

impl Receiver {
    pub fn new(nonce: H256, ephemeral_key: SecretKey) -> Self {
        Self {
            nonce,
            ephemeral_key,
        }
    }
}

#[derive(Clone)]
struct Initiator {
    pub(crate) nonce: H256,
    pub(crate) ephemeral_key: SecretKey,
    pub(crate) remote_node_id: H512,
}

impl Initiator {
    pub fn new(nonce: H256, ephemeral_key: SecretKey, remote_node_id: H512) -> Self {
        Self {
            nonce,
            ephemeral_key,
            remote_node_id,
        }
    }
}

#[derive(Clone)]
struct ReceivedAuth {
    pub(crate) local_nonce: H256,
    pub(crate) local_ephemeral_key: SecretKey,
    pub(crate) remote_node_id: H512,
    pub(crate) remote_nonce: H256,
    pub(crate) remote_ephemeral_key: PublicKey,
    pub(crate) remote_init_message: Vec<u8>,
}

impl ReceivedAuth {
    pub fn new(
        previous_state: Receiver,
        remote_node_id: H512,
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        Self {
            local_nonce: previous_state.nonce,
            local_ephemeral_key: previous_state.ephemeral_key,
            remote_node_id,
            remote_nonce,
            remote_ephemeral_key,
            remote_init_message,
        }
    }
}

#[derive(Clone)]
struct InitiatedAuth {
    pub(crate) remote_node_id: H512,
    pub(crate) local_nonce: H256,
    pub(crate) local_ephemeral_key: SecretKey,
    pub(crate) local_init_message: Vec<u8>,
}

impl InitiatedAuth {
    pub fn new(previous_state: Initiator, local_init_message: Vec<u8>) -> Self {
        Self {
            remote_node_id: previous_state.remote_node_id,
            local_nonce: previous_state.nonce,
            local_ephemeral_key: previous_state.ephemeral_key,
            local_init_message,
        }
    }
}

pub struct Established {
    pub remote_node_id: H512,
    pub(crate) mac_key: H256,
    pub ingress_mac: Keccak256,
    pub egress_mac: Keccak256,
    pub ingress_aes: Aes256Ctr64BE,
    pub egress_aes: Aes256Ctr64BE,
}

impl Established {
    fn for_receiver(previous_state: ReceivedAuth, init_message: Vec<u8>) -> Self {
        // keccak256(nonce || initiator-nonce); remote node is the initiator
        let hashed_nonces = Keccak256::digest(
            [previous_state.local_nonce.0, previous_state.remote_nonce.0].concat(),
        )
        .into();

        Self::new(
            previous_state.remote_node_id,
            init_message,
            previous_state.local_nonce,
            previous_state.local_ephemeral_key,
            hashed_nonces,
            previous_state.remote_init_message,
            previous_state.remote_nonce,
            previous_state.remote_ephemeral_key,
        )
    }

    fn for_initiator(
        previous_state: InitiatedAuth,
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        // keccak256(nonce || initiator-nonce); local node is the initiator
        let hashed_nonces =
            Keccak256::digest([remote_nonce.0, previous_state.local_nonce.0].concat()).into();

        Self::new(
            previous_state.remote_node_id,
            previous_state.local_init_message,
            previous_state.local_nonce,
            previous_state.local_ephemeral_key,
            hashed_nonces,
            remote_init_message,
            remote_nonce,
            remote_ephemeral_key,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        remote_node_id: H512,
        local_init_message: Vec<u8>,
        local_nonce: H256,
        local_ephemeral_key: SecretKey,
        hashed_nonces: [u8; 32],
        remote_init_message: Vec<u8>,
        remote_nonce: H256,
        remote_ephemeral_key: PublicKey,
    ) -> Self {
        let ephemeral_key_secret = ecdh_xchng(&local_ephemeral_key, &remote_ephemeral_key);

        // shared-secret = keccak256(ephemeral-key || keccak256(nonce || initiator-nonce))
        let shared_secret =
            Keccak256::digest([ephemeral_key_secret, hashed_nonces].concat()).into();
        // aes-secret = keccak256(ephemeral-key || shared-secret)
        let aes_key =
            H256(Keccak256::digest([ephemeral_key_secret, shared_secret].concat()).into());
        // mac-secret = keccak256(ephemeral-key || aes-secret)
        let mac_key = H256(Keccak256::digest([ephemeral_key_secret, aes_key.0].concat()).into());

        // egress-mac = keccak256.init((mac-secret ^ remote-nonce) || auth)
        let egress_mac = Keccak256::default()
            .chain_update(mac_key ^ remote_nonce)
            .chain_update(&local_init_message);

        // ingress-mac = keccak256.init((mac-secret ^ initiator-nonce) || ack)
        let ingress_mac = Keccak256::default()
            .chain_update(mac_key ^ local_nonce)
            .chain_update(&remote_init_message);

        let ingress_aes = <Aes256Ctr64BE as KeyIvInit>::new(&aes_key.0.into(), &[0; 16].into());
        let egress_aes = ingress_aes.clone();
        Self {
            remote_node_id,
            mac_key,
            ingress_mac,
            egress_mac,
            ingress_aes,
            egress_aes,
        }
    }
}
