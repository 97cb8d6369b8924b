//! End-to-end coverage driving two `RLPxConnection`s against each other
//! over an in-memory duplex stream, the way a loopback integration test
//! would exercise a real TCP pair.

use k256::ecdsa::SigningKey;
use k256::{PublicKey, SecretKey};
use p2pkit_rlpx::capability::Capability;
use p2pkit_rlpx::utils::pubkey2id;
use p2pkit_rlpx::RLPxConnection;
use rand::rngs::OsRng;

fn random_signer() -> SigningKey {
    SigningKey::from(SecretKey::random(&mut OsRng))
}

/// E1: after a complete handshake, a Ping sent via `send_ping()` is
/// answered with a Pong, and the returned completion resolves.
#[tokio::test]
async fn ping_is_answered_with_pong_and_completes_send_ping() {
    let client_signer = random_signer();
    let server_signer = random_signer();
    let server_node_id = pubkey2id(&PublicKey::from(server_signer.verifying_key()));

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let capabilities = vec![(Capability::new("eth", 68), 1)];

    let mut client = RLPxConnection::initiator_with_node_id(
        client_signer,
        server_node_id,
        client_stream,
        "client/0.1.0".to_string(),
        30303,
        capabilities.clone(),
    );
    let mut server = RLPxConnection::receiver(
        server_signer,
        server_stream,
        "server/0.1.0".to_string(),
        30303,
        capabilities,
    );

    let server_task = tokio::spawn(async move {
        server.handshake().await.unwrap();
        server.handle_peer().await
    });

    client.handshake().await.unwrap();
    let completion = client
        .send_ping()
        .await
        .expect("sending a ping right after handshake should succeed");

    // Drive the client's own receive loop concurrently so the inbound
    // Pong gets routed back to the completion above.
    let client_task = tokio::spawn(async move { client.handle_peer().await });

    tokio::time::timeout(std::time::Duration::from_secs(2), completion.wait())
        .await
        .expect("pong should arrive well before the test timeout")
        .expect("ping completion should resolve successfully");

    client_task.abort();
    server_task.abort();
}

/// A second `send_ping()` before the first Pong arrives drops the earlier
/// completion rather than queuing it, per the "implementation freedom"
/// clause around outstanding pings.
#[tokio::test]
async fn overwriting_an_outstanding_ping_cancels_the_previous_completion() {
    let client_signer = random_signer();
    let server_signer = random_signer();
    let server_node_id = pubkey2id(&PublicKey::from(server_signer.verifying_key()));

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let capabilities = vec![(Capability::new("eth", 68), 1)];

    let mut client = RLPxConnection::initiator_with_node_id(
        client_signer,
        server_node_id,
        client_stream,
        "client/0.1.0".to_string(),
        30303,
        capabilities.clone(),
    );
    let mut server = RLPxConnection::receiver(
        server_signer,
        server_stream,
        "server/0.1.0".to_string(),
        30303,
        capabilities,
    );

    let server_task = tokio::spawn(async move {
        server.handshake().await.unwrap();
        server.handle_peer().await
    });

    client.handshake().await.unwrap();
    let stale_completion = client.send_ping().await.unwrap();
    let fresh_completion = client.send_ping().await.unwrap();

    assert!(stale_completion.wait().await.is_err());

    let client_task = tokio::spawn(async move { client.handle_peer().await });
    tokio::time::timeout(std::time::Duration::from_secs(2), fresh_completion.wait())
        .await
        .expect("pong should arrive well before the test timeout")
        .expect("the most recent ping should still resolve");

    client_task.abort();
    server_task.abort();
}
