use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use rmpv::Value;
use tarantool_client::{
    errors::Error, Connection, ExecutorExt, InstanceInfo, IteratorType, ReconnectInterval,
};

use crate::common::{init_logging, MockServer, ServerOptions};

mod common;

const SPACE: u32 = 512;
const PRIMARY: u32 = 0;

async fn start_server() -> MockServer {
    init_logging();
    MockServer::start(ServerOptions::default()).await
}

async fn connect(server: &MockServer) -> Connection {
    Connection::builder()
        .reconnect_interval(ReconnectInterval::fixed(Duration::from_millis(50)))
        .build(server.addr())
        .await
        .expect("connection established")
}

#[tokio::test]
async fn ping() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;
    conn.ping().await?;
    Ok(())
}

#[tokio::test]
async fn insert_select_round_trip() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    conn.insert(SPACE, (12, "Hello World", "Olga")).await?;
    let rows: Vec<(u32, String, String)> = conn
        .select(
            SPACE,
            PRIMARY,
            Some(10),
            Some(0),
            Some(IteratorType::All),
            (12,),
        )
        .await?;
    assert_eq!(rows, vec![(12, "Hello World".into(), "Olga".into())]);
    Ok(())
}

#[tokio::test]
async fn insert_duplicate_key() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    conn.insert(SPACE, (1, "a")).await?;
    let err = conn.insert(SPACE, (1, "b")).await.unwrap_err();
    assert_matches!(err, Error::Response(ref resp) if resp.code == 3);
    Ok(())
}

#[tokio::test]
async fn update_ops() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    conn.insert(SPACE, (12, "Hello World", "Olga")).await?;
    let updated: (u32, String) = conn
        .update(
            SPACE,
            PRIMARY,
            (12,),
            (("=", 1, "Hello Moon"), ("#", 2, 1)),
        )
        .await?
        .decode()?;
    assert_eq!(updated, (12, "Hello Moon".into()));

    let rows: Vec<Value> = conn
        .select(SPACE, PRIMARY, None, None, Some(IteratorType::All), (12,))
        .await?;
    assert_eq!(
        rows,
        vec![Value::Array(vec![12.into(), "Hello Moon".into()])]
    );
    Ok(())
}

#[tokio::test]
async fn replace_delete_upsert() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    conn.replace(SPACE, (5, "first")).await?;
    conn.replace(SPACE, (5, "second")).await?;
    let row: (u32, String) = conn.delete(SPACE, PRIMARY, (5,)).await?.decode()?;
    assert_eq!(row, (5, "second".into()));

    conn.upsert(SPACE, (7, "base", 1), (("+", 2, 1),)).await?;
    conn.upsert(SPACE, (7, "base", 1), (("+", 2, 1),)).await?;
    let rows: Vec<(u32, String, i64)> = conn
        .select(SPACE, PRIMARY, None, None, None, (7,))
        .await?;
    assert_eq!(rows, vec![(7, "base".into(), 2)]);
    Ok(())
}

#[tokio::test]
async fn call_and_eval() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    let info: InstanceInfo = conn.call("box.info", ()).await?.decode_first()?;
    assert!(!info.ro);

    let echoed: (u32, String) = conn.eval("return ...", (9, "nine")).await?.decode_two()?;
    assert_eq!(echoed, (9, "nine".into()));

    let err = conn.call("no.such.proc", ()).await.unwrap_err();
    assert_matches!(err, Error::Response(ref resp) if resp.code == 33);
    Ok(())
}

#[tokio::test]
async fn auth_ok() -> Result<(), anyhow::Error> {
    init_logging();
    let server = MockServer::start(ServerOptions {
        credentials: Some(("Sisko".into(), "A-4-7-1".into())),
        ..Default::default()
    })
    .await;

    let conn = Connection::builder()
        .auth("Sisko", Some("A-4-7-1"))
        .build(server.addr())
        .await?;
    conn.ping().await?;
    Ok(())
}

#[tokio::test]
async fn auth_err() -> Result<(), anyhow::Error> {
    init_logging();
    let server = MockServer::start(ServerOptions {
        credentials: Some(("test".into(), "test".into())),
        ..Default::default()
    })
    .await;

    assert_matches!(
        Connection::builder()
            .auth("test", Some("wrong"))
            .reconnect_interval(None)
            .build(server.addr())
            .await
            .map(drop),
        Err(Error::Auth(_))
    );
    Ok(())
}

#[tokio::test]
async fn request_timeout_leaves_connection_usable() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = Connection::builder()
        .timeout(Duration::from_millis(100))
        .build(server.addr())
        .await?;

    assert_matches!(
        conn.eval("fiber.sleep", (1.0,)).await,
        Err(Error::Timeout)
    );
    // The late response for the timed out sync is discarded and the
    // connection keeps serving requests
    conn.ping().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_submissions_complete_independently() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    let results = join_all((0..64u32).map(|i| {
        let conn = conn.clone();
        async move {
            let value: u32 = conn.eval("return ...", (i,)).await?.decode_first()?;
            Ok::<_, Error>((i, value))
        }
    }))
    .await;

    for result in results {
        let (sent, received) = result?;
        assert_eq!(sent, received);
    }
    Ok(())
}

#[tokio::test]
async fn disconnect_fails_in_flight_requests() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    let slow = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.eval("fiber.sleep", (10.0,)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.stop();
    let err = slow.await?.unwrap_err();
    assert_matches!(err, Error::ConnectionClosed | Error::Io(_));
    Ok(())
}

#[tokio::test]
async fn requests_park_until_reconnect() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;
    conn.ping().await?;

    server.stop();
    // Wait for the client to notice the disconnect
    let parked = {
        let conn = conn.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            conn.ping().await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    server.restart().await;

    parked.await??;
    conn.ping().await?;
    Ok(())
}

#[tokio::test]
async fn lazy_connection_waits_for_server() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    server.stop();

    let conn = Connection::builder()
        .reconnect_interval(ReconnectInterval::fixed(Duration::from_millis(50)))
        .build_lazy(server.addr());
    let parked = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.ping().await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    server.restart().await;

    parked.await??;
    Ok(())
}

#[tokio::test]
async fn fail_fast_without_reconnect() {
    init_logging();
    // Nothing listens on this address
    let res = Connection::builder()
        .reconnect_interval(None)
        .connect_timeout(Duration::from_millis(500))
        .build("127.0.0.1:1".to_string())
        .await;
    assert_matches!(res, Err(Error::Io(_) | Error::ConnectTimeout));
}

#[tokio::test]
async fn submit_after_close_fails_immediately() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;
    conn.ping().await?;

    conn.close();
    assert!(conn.is_closed());
    assert_matches!(conn.ping().await, Err(Error::ClientClosed));

    // Idempotent
    conn.close();
    assert_matches!(conn.ping().await, Err(Error::ClientClosed));
    Ok(())
}

#[tokio::test]
async fn close_fails_in_flight_requests() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;

    let slow = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.eval("fiber.sleep", (10.0,)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    conn.close();
    assert_matches!(slow.await?, Err(Error::ClientClosed));
    Ok(())
}

#[tokio::test]
async fn connection_state_is_observable() -> Result<(), anyhow::Error> {
    let server = start_server().await;
    let conn = connect(&server).await;
    assert!(conn.is_connected());

    server.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!conn.is_connected());

    server.restart().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(conn.is_connected());
    Ok(())
}
