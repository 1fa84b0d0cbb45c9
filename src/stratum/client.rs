use crate::config::Config;
use crate::error::CoordinatorError;
use crate::stratum::codec::{
    decode_message, encode_authorize, encode_subscribe, encode_submit, StratumMessage,
    MINING_NOTIFY, MINING_SET_TARGET,
};
use crate::stratum::session::{SessionState, StratumSession};
use crate::work::{parse_nonce_left, parse_wire_target, NotifyParams};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Events the Stratum client actor emits to the Coordinator. These
/// correspond 1:1 to the Coordinator's four dispatch-triggering intents
/// plus the bookkeeping events it needs for stats and logging.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Subscribed { nonce_left: Vec<u8> },
    Authorized,
    TargetSet { target: [u8; 32] },
    JobSet { job_id: String, header_prefix: Vec<u8> },
    ShareAccepted,
    Disconnected,
}

/// Commands the Coordinator sends to the Stratum client actor.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Submit {
        job_id: String,
        ntime: String,
        nonce_rightpart: String,
        sol: String,
    },
}

/// Runs the Stratum client actor forever: connect, subscribe, authorize,
/// read notifications, submit shares, and reconnect with backoff on any
/// disconnect. Never returns under normal operation; a fatal protocol
/// violation (e.g. the pool fixing too many nonce bytes) terminates the
/// whole process per the spec's error-handling policy.
pub async fn run(
    config: Config,
    mut commands: UnboundedReceiver<ClientCommand>,
    events: UnboundedSender<ClientEvent>,
) -> ! {
    let mut session = StratumSession::new();
    loop {
        match connect_and_serve(&config, &mut session, &mut commands, &events).await {
            Ok(()) => {
                log::info!(target: "stratum", "connection closed");
            }
            Err(err) if err.is_fatal() => {
                log::error!(target: "stratum", "fatal error: {err}");
                std::process::exit(1);
            }
            Err(err) => {
                log::warn!(target: "stratum", "connection error: {err}");
            }
        }

        let _ = events.send(ClientEvent::Disconnected);
        session.reset_for_reconnect();

        let delay = if session.attempt == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1)
        };
        log::warn!(target: "stratum", "reconnecting (attempt {})", session.attempt + 1);
        session.attempt += 1;
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_serve(
    config: &Config,
    session: &mut StratumSession,
    commands: &mut UnboundedReceiver<ClientCommand>,
    events: &UnboundedSender<ClientEvent>,
) -> Result<(), CoordinatorError> {
    session.state = SessionState::Connecting;
    let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
    stream.set_nodelay(true)?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let id = session.next_request_id();
    writer
        .write_all(encode_subscribe(id, &config.host, config.port).as_bytes())
        .await?;
    session.state = SessionState::SentSubscribe;

    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            result = reader.read_line(&mut line) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                if let Err(err) = handle_line(&line, config, session, &mut writer, events).await {
                    if err.closes_connection() {
                        log::warn!(target: "stratum", "closing connection: {err}");
                        return Err(err);
                    }
                    log::warn!(target: "stratum", "dropping malformed or rejected message: {err}");
                }
            }
            Some(cmd) = commands.recv() => {
                submit_share(&mut writer, session, config, cmd).await?;
            }
        }
    }
}

async fn submit_share(
    writer: &mut OwnedWriteHalf,
    session: &mut StratumSession,
    config: &Config,
    cmd: ClientCommand,
) -> Result<(), CoordinatorError> {
    let ClientCommand::Submit {
        job_id,
        ntime,
        nonce_rightpart,
        sol,
    } = cmd;
    let id = session.next_request_id();
    let req = encode_submit(id, &config.user, &job_id, &ntime, &nonce_rightpart, &sol);
    writer.write_all(req.as_bytes()).await?;
    Ok(())
}

async fn handle_line(
    line: &str,
    config: &Config,
    session: &mut StratumSession,
    writer: &mut OwnedWriteHalf,
    events: &UnboundedSender<ClientEvent>,
) -> Result<(), CoordinatorError> {
    let msg = decode_message(line)?;
    match msg {
        StratumMessage::Response { id, result, error } => {
            if let Some(error) = error {
                log::warn!(target: "stratum", "pool error for id {id}: {error}");
                return Ok(());
            }
            if session.expected_id != Some(id) {
                log::warn!(
                    target: "stratum",
                    "response id {id} does not match expected {:?}; proceeding anyway",
                    session.expected_id
                );
            }
            handle_response(session, config, result, writer, events).await
        }
        StratumMessage::Notification { method, params } => {
            handle_notification(&method, &params, events)
        }
    }
}

async fn handle_response(
    session: &mut StratumSession,
    config: &Config,
    result: Option<Value>,
    writer: &mut OwnedWriteHalf,
    events: &UnboundedSender<ClientEvent>,
) -> Result<(), CoordinatorError> {
    match session.state {
        SessionState::SentSubscribe => {
            let array = result
                .as_ref()
                .and_then(Value::as_array)
                .ok_or_else(|| CoordinatorError::Protocol("subscribe result not an array".into()))?;
            let nonce_hex = array
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| CoordinatorError::Protocol("missing nonce_left in subscribe result".into()))?;
            let nonce_left = parse_nonce_left(nonce_hex)?;

            let _ = events.send(ClientEvent::Subscribed {
                nonce_left: nonce_left.clone(),
            });

            let auth_id = session.next_request_id();
            let req = encode_authorize(auth_id, &config.user, config.pwd.as_deref());
            writer.write_all(req.as_bytes()).await?;
            session.state = SessionState::SentAuthorize;
            Ok(())
        }
        SessionState::SentAuthorize => {
            let truthy = result.as_ref().map(is_truthy).unwrap_or(false);
            if truthy {
                session.state = SessionState::Authorized;
                // A session that reaches Authorized is fully re-established;
                // the next disconnect's reconnect should be immediate again,
                // not delayed by backoff accumulated from earlier attempts.
                session.attempt = 0;
                let _ = events.send(ClientEvent::Authorized);
                Ok(())
            } else {
                Err(CoordinatorError::AuthorizationRejected)
            }
        }
        SessionState::Authorized => {
            let truthy = result.as_ref().map(is_truthy).unwrap_or(false);
            if truthy {
                session.accepted_shares += 1;
                let _ = events.send(ClientEvent::ShareAccepted);
            }
            Ok(())
        }
        SessionState::Disconnected | SessionState::Connecting => {
            log::warn!(target: "stratum", "response received in unexpected state {:?}", session.state);
            Ok(())
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        _ => true,
    }
}

fn handle_notification(
    method: &str,
    params: &[Value],
    events: &UnboundedSender<ClientEvent>,
) -> Result<(), CoordinatorError> {
    match method {
        MINING_SET_TARGET => {
            let target_hex = params
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| CoordinatorError::Protocol("set_target missing target".into()))?;
            let target = parse_wire_target(target_hex)?;
            let _ = events.send(ClientEvent::TargetSet { target });
            Ok(())
        }
        MINING_NOTIFY => {
            let notify = parse_notify_params(params)?;
            if notify.clean_jobs {
                let header_prefix = notify.assemble_header_prefix()?;
                let _ = events.send(ClientEvent::JobSet {
                    job_id: notify.job_id,
                    header_prefix,
                });
            } else {
                log::debug!(target: "stratum", "ignoring mining.notify with clean_jobs=false");
            }
            Ok(())
        }
        other => {
            log::warn!(target: "stratum", "unknown notification method {other}");
            Ok(())
        }
    }
}

fn parse_notify_params(params: &[Value]) -> Result<NotifyParams, CoordinatorError> {
    let field = |i: usize, name: &str| -> Result<String, CoordinatorError> {
        params
            .get(i)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CoordinatorError::Protocol(format!("notify missing {name}")))
    };

    Ok(NotifyParams {
        job_id: field(0, "job_id")?,
        n_version: field(1, "nVersion")?,
        hash_prev_block: field(2, "hashPrevBlock")?,
        hash_merkle_root: field(3, "hashMerkleRoot")?,
        hash_reserved: field(4, "hashReserved")?,
        n_time: field(5, "nTime")?,
        n_bits: field(6, "nBits")?,
        clean_jobs: params.get(7).and_then(Value::as_bool).unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_write_half() -> OwnedWriteHalf {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_server_side, client_result) =
            tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (_read, writer) = client_result.unwrap().into_split();
        writer
    }

    fn test_config() -> Config {
        Config {
            host: "pool.example.com".into(),
            port: 3333,
            user: "user".into(),
            pwd: None,
            gpus: vec![],
            instances: 0,
            verbosity: 0,
        }
    }

    #[tokio::test]
    async fn falsy_authorize_response_closes_connection_but_is_not_fatal() {
        let mut writer = connected_write_half().await;
        let mut session = StratumSession::new();
        session.state = SessionState::SentAuthorize;
        let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();

        let err = handle_response(&mut session, &test_config(), Some(json!(false)), &mut writer, &events_tx)
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::AuthorizationRejected));
        assert!(err.closes_connection());
        assert!(!err.is_fatal());
        assert_eq!(session.state, SessionState::SentAuthorize);
    }

    #[tokio::test]
    async fn truthy_authorize_response_resets_reconnect_attempt_counter() {
        let mut writer = connected_write_half().await;
        let mut session = StratumSession::new();
        session.state = SessionState::SentAuthorize;
        session.attempt = 3;
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

        handle_response(&mut session, &test_config(), Some(json!(true)), &mut writer, &events_tx)
            .await
            .unwrap();

        assert_eq!(session.state, SessionState::Authorized);
        assert_eq!(session.attempt, 0);
        assert!(matches!(events_rx.recv().await, Some(ClientEvent::Authorized)));
    }

    #[test]
    fn truthy_treats_non_null_non_bool_as_true() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("ok")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn parse_notify_params_reads_all_eight_fields() {
        let params = vec![
            json!("job1"),
            json!("04000000"),
            json!("a".repeat(64)),
            json!("b".repeat(64)),
            json!("0".repeat(64)),
            json!("5a000000"),
            json!("1d00ffff"),
            json!(true),
        ];
        let notify = parse_notify_params(&params).unwrap();
        assert_eq!(notify.job_id, "job1");
        assert!(notify.clean_jobs);
    }

    #[test]
    fn parse_notify_params_defaults_clean_jobs_false_when_absent() {
        let params = vec![
            json!("job1"),
            json!("04000000"),
            json!("a".repeat(64)),
            json!("b".repeat(64)),
            json!("0".repeat(64)),
            json!("5a000000"),
            json!("1d00ffff"),
        ];
        let notify = parse_notify_params(&params).unwrap();
        assert!(!notify.clean_jobs);
    }
}
