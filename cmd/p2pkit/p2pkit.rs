use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use directories::ProjectDirs;
use ethereum_types::H512;
use p2pkit_core::identity::{Ed25519Identity, Secp256k1Identity};
use p2pkit_rlpx::capability::Capability;
use p2pkit_rlpx::RLPxConnection;
use p2pkit_ssb::{server_handshake, BoxStreamReader, BoxStreamWriter};
use p2pkit_store::config::Config;
use p2pkit_store::peerbook::{NodeRecord, PeerBook, PeerEndpoint};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;

const DEFAULT_DATADIR: &str = "p2pkit";

#[tokio::main]
async fn main() {
    let args = cli::cli();
    init_logging(&args.log_level);

    let data_dir = args
        .datadir
        .clone()
        .unwrap_or_else(|| set_datadir(DEFAULT_DATADIR));
    std::fs::create_dir_all(&data_dir).expect("failed to create data directory");

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load config file {}: {err}", args.config);
            return;
        }
    };

    match args.command {
        cli::Command::RlpxListen => run_rlpx_listen(&data_dir, &config).await,
        cli::Command::RlpxDial {
            addr,
            remote_node_id,
        } => run_rlpx_dial(&data_dir, &config, &addr, &remote_node_id).await,
        cli::Command::SsbListen => run_ssb_listen(&data_dir, &config).await,
    }
}

fn init_logging(log_level: &str) {
    let log_filter = EnvFilter::builder()
        .with_default_directive(Directive::from_str(log_level).expect("invalid --log-level value"))
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_env_filter(log_filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn set_datadir(datadir: &str) -> String {
    let project_dir = ProjectDirs::from("", "", datadir).expect("couldn't find home directory");
    project_dir
        .data_local_dir()
        .to_str()
        .expect("invalid data directory")
        .to_owned()
}

fn identity_path(data_dir: &str, file_name: &str) -> PathBuf {
    Path::new(data_dir).join(file_name)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn local_capabilities(config: &Config) -> Vec<(Capability, u8)> {
    let Some(rlpx) = &config.rlpx else {
        return vec![];
    };
    rlpx.sub_protocols
        .iter()
        .filter_map(|proto| match proto.name.as_str() {
            "eth" => Some((Capability::new("eth", proto.version), 1)),
            other => {
                warn!(name = other, "unsupported sub-protocol in config, skipping");
                None
            }
        })
        .collect()
}

async fn run_rlpx_listen(data_dir: &str, config: &Config) {
    let Some(rlpx) = &config.rlpx else {
        error!("no [rlpx] section in config, nothing to listen on");
        return;
    };
    let identity = Secp256k1Identity::load_or_generate(&identity_path(data_dir, &rlpx.identity_key_file))
        .expect("failed to load or generate RLPx identity");
    info!(node_id = %identity.node_id(), "RLPx node identity loaded");

    let peer_book = Arc::new(PeerBook::new());
    let bind_addr = format!("{}:{}", rlpx.bind_address, rlpx.listen_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));
    info!(addr = %bind_addr, "listening for RLPx connections");

    let offered_capabilities: Vec<String> = rlpx
        .sub_protocols
        .iter()
        .map(|proto| proto.name.clone())
        .collect();

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept RLPx connection: {e}");
                continue;
            }
        };
        info!(%peer_addr, "accepted RLPx connection");

        let signer = identity.signing_key();
        let client_id = rlpx.client_id.clone();
        let listen_port = rlpx.listen_port;
        let capabilities = local_capabilities(config);
        let peer_book = peer_book.clone();
        let offered_capabilities = offered_capabilities.clone();

        tokio::spawn(async move {
            let mut connection =
                RLPxConnection::receiver(signer, stream, client_id, listen_port, capabilities);
            if let Err(e) = connection.handshake().await {
                warn!(%peer_addr, "RLPx handshake failed: {e}");
                return;
            }
            if let Ok(node_id) = connection.get_remote_node_id() {
                info!(%peer_addr, %node_id, "RLPx peer established");
                peer_book.upsert(NodeRecord {
                    node_id: node_id.as_bytes().to_vec(),
                    last_seen: now_unix(),
                    endpoint: PeerEndpoint {
                        ip: peer_addr.ip(),
                        tcp_port: peer_addr.port(),
                    },
                    capabilities: offered_capabilities,
                });
            }
            if let Err(e) = connection.handle_peer().await {
                warn!(%peer_addr, "RLPx peer loop ended: {e}");
            }
        });
    }
}

async fn run_rlpx_dial(data_dir: &str, config: &Config, addr: &str, remote_node_id: &str) {
    let Some(rlpx) = &config.rlpx else {
        error!("no [rlpx] section in config, cannot dial");
        return;
    };
    let identity = Secp256k1Identity::load_or_generate(&identity_path(data_dir, &rlpx.identity_key_file))
        .expect("failed to load or generate RLPx identity");

    let remote_node_id = match hex::decode(remote_node_id.trim_start_matches("0x")) {
        Ok(bytes) if bytes.len() == 64 => H512::from_slice(&bytes),
        _ => {
            error!("remote node id must be 128 hex characters");
            return;
        }
    };

    let stream = match tokio::net::TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to connect to {addr}: {e}");
            return;
        }
    };

    let mut connection = RLPxConnection::initiator_with_node_id(
        identity.signing_key(),
        remote_node_id,
        stream,
        rlpx.client_id.clone(),
        rlpx.listen_port,
        local_capabilities(config),
    );
    if let Err(e) = connection.handshake().await {
        error!("RLPx handshake with {addr} failed: {e}");
        return;
    }
    info!(%addr, "RLPx handshake complete, entering peer loop");
    if let Err(e) = connection.handle_peer().await {
        warn!("RLPx peer loop with {addr} ended: {e}");
    }
}

async fn run_ssb_listen(data_dir: &str, config: &Config) {
    let Some(ssb) = &config.ssb else {
        error!("no [ssb] section in config, nothing to listen on");
        return;
    };
    let identity = Ed25519Identity::load_or_generate(&identity_path(data_dir, &ssb.identity_key_file))
        .expect("failed to load or generate SSB identity");
    let network_id = ssb
        .network_identifier_bytes()
        .expect("network_identifier was already validated at config load time");

    let listener = TcpListener::bind(&ssb.bind_address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", ssb.bind_address));
    info!(addr = %ssb.bind_address, "listening for SSB connections");

    let peer_book = Arc::new(PeerBook::new());

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("failed to accept SSB connection: {e}");
                continue;
            }
        };
        info!(%peer_addr, "accepted SSB connection");

        let local = identity.clone();
        let peer_book = peer_book.clone();

        tokio::spawn(async move {
            let mut stream = stream;
            let (session, client_pub) = match server_handshake(&mut stream, network_id, &local).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(%peer_addr, "SSB handshake failed: {e}");
                    return;
                }
            };
            info!(%peer_addr, client = %hex::encode(client_pub.as_bytes()), "SSB peer established");
            peer_book.upsert(NodeRecord {
                node_id: client_pub.as_bytes().to_vec(),
                last_seen: now_unix(),
                endpoint: PeerEndpoint {
                    ip: peer_addr.ip(),
                    tcp_port: peer_addr.port(),
                },
                capabilities: vec!["ssb".to_string()],
            });

            let (read_half, write_half) = tokio::io::split(stream);
            let reader = BoxStreamReader::from_session_c2s(read_half, &session);
            let writer = BoxStreamWriter::from_session_s2c(write_half, &session);
            let mut multiplexer = p2pkit_ssb::RpcMultiplexer::new(reader, writer);

            loop {
                match multiplexer.drive_once().await {
                    Ok(true) => continue,
                    Ok(false) => {
                        info!(%peer_addr, "SSB peer sent goodbye");
                        break;
                    }
                    Err(e) => {
                        warn!(%peer_addr, "SSB peer loop ended: {e}");
                        break;
                    }
                }
            }
        });
    }
}
