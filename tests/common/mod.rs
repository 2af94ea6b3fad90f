//! In-process mock of a Tarantool instance, speaking the binary
//! protocol over a real TCP socket: greeting with salt, chap-sha1
//! verification, data operations over one in-memory space, `box.info`
//! with a switchable read-only flag, and stop/restart for reconnect
//! scenarios.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    io::Cursor,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use rmpv::Value;
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use tarantool_client::codec::consts::keys;

const SALT: [u8; 32] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x20,
];

const ER_READONLY: u32 = 7;
const ER_TUPLE_FOUND: u32 = 3;
const ER_NO_SUCH_PROC: u32 = 33;
const ER_PROC_LUA: u32 = 32;
const ER_CREDS: u32 = 47;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub struct ServerOptions {
    pub server_id: u32,
    /// Expected user/password; `None` accepts only guest sessions.
    pub credentials: Option<(String, String)>,
    pub ro: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            server_id: 0,
            credentials: None,
            ro: false,
        }
    }
}

struct ServerState {
    server_id: u32,
    credentials: Option<(String, String)>,
    ro: AtomicBool,
    space: Mutex<BTreeMap<i64, Vec<Value>>>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MockServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState {
            server_id: options.server_id,
            credentials: options.credentials,
            ro: AtomicBool::new(options.ro),
            space: Mutex::new(BTreeMap::new()),
        });
        let server = Self {
            addr,
            state,
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        server.spawn_accept_loop(listener);
        server
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn set_ro(&self, ro: bool) {
        self.state.ro.store(ro, Ordering::SeqCst);
    }

    pub fn space_len(&self) -> usize {
        self.state.space.lock().len()
    }

    pub fn tuples(&self) -> Vec<Vec<Value>> {
        self.state.space.lock().values().cloned().collect()
    }

    /// Drop the listener and kill every open connection.
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Start accepting connections again on the same address.
    pub async fn restart(&self) {
        let listener = loop {
            match TcpListener::bind(self.addr).await {
                Ok(x) => break x,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        };
        self.spawn_accept_loop(listener);
    }

    fn spawn_accept_loop(&self, listener: TcpListener) {
        let state = self.state.clone();
        let tasks = self.tasks.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = state.clone();
                tasks.lock().push(tokio::spawn(async move {
                    let _ = serve_conn(stream, state).await;
                }));
            }
        });
        self.tasks.lock().push(accept_task);
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve_conn(mut stream: TcpStream, state: Arc<ServerState>) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;

    let mut greeting = Vec::with_capacity(128);
    greeting.extend_from_slice(
        format!(
            "{:<63}\n",
            format!("Tarantool 2.10.5 (Binary) mock-{}", state.server_id)
        )
        .as_bytes(),
    );
    greeting.extend_from_slice(format!("{:<63}\n", STANDARD.encode(SALT)).as_bytes());
    stream.write_all(&greeting).await?;

    let (mut read_half, write_half) = stream.into_split();
    let write_half = Arc::new(tokio::sync::Mutex::new(write_half));
    // Dropping the set (connection task killed or read error) aborts
    // pending handlers, releasing their write half references
    let mut handlers = tokio::task::JoinSet::new();

    loop {
        let mut prefix = [0u8; 5];
        read_half.read_exact(&mut prefix).await?;
        anyhow::ensure!(prefix[0] == 0xce, "bad length marker");
        let frame_len = u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
        let mut frame = vec![0u8; frame_len];
        read_half.read_exact(&mut frame).await?;

        let mut cursor = Cursor::new(&frame[..]);
        let header = rmpv::decode::read_value(&mut cursor)?;
        let body = if (cursor.position() as usize) < frame_len {
            rmpv::decode::read_value(&mut cursor)?
        } else {
            Value::Map(Vec::new())
        };

        let request_type = map_get_u64(&header, keys::REQUEST_TYPE).unwrap_or(0);
        let sync = map_get_u64(&header, keys::SYNC).unwrap_or(0) as u32;

        // Handle each request in its own task so slow requests don't
        // delay the rest: responses may arrive out of order, like with
        // a real server
        let state = state.clone();
        let write_half = write_half.clone();
        handlers.spawn(async move {
            let reply = dispatch(&state, request_type, &body).await;
            let frame = encode_reply(sync, reply);
            let _ = write_half.lock().await.write_all(&frame).await;
        });
    }
}

enum Reply {
    Data(Value),
    Error(u32, String),
}

async fn dispatch(state: &ServerState, request_type: u64, body: &Value) -> Reply {
    match request_type {
        // AUTH
        7 => auth(state, body),
        // SELECT
        1 => select(state, body),
        // INSERT
        2 => {
            if state.ro.load(Ordering::SeqCst) {
                return readonly_error();
            }
            insert(state, body)
        }
        // REPLACE
        3 => {
            if state.ro.load(Ordering::SeqCst) {
                return readonly_error();
            }
            replace(state, body)
        }
        // UPDATE
        4 => {
            if state.ro.load(Ordering::SeqCst) {
                return readonly_error();
            }
            update(state, body)
        }
        // DELETE
        5 => {
            if state.ro.load(Ordering::SeqCst) {
                return readonly_error();
            }
            delete(state, body)
        }
        // UPSERT
        9 => {
            if state.ro.load(Ordering::SeqCst) {
                return readonly_error();
            }
            upsert(state, body)
        }
        // CALL16 / CALL
        6 | 10 => call(state, body),
        // EVAL
        8 => eval(state, body).await,
        // PING
        64 => Reply::Data(Value::Array(Vec::new())),
        other => Reply::Error(ER_NO_SUCH_PROC, format!("Unknown request type {other}")),
    }
}

fn auth(state: &ServerState, body: &Value) -> Reply {
    let failure = || {
        Reply::Error(
            ER_CREDS,
            "User not found or supplied credentials are invalid".into(),
        )
    };
    let Some((expected_user, expected_pass)) = state.credentials.as_ref() else {
        return failure();
    };
    let user = map_get(body, keys::USER_NAME).and_then(Value::as_str);
    if user != Some(expected_user.as_str()) {
        return failure();
    }
    let scramble = map_get(body, keys::TUPLE)
        .and_then(Value::as_array)
        .and_then(|x| x.get(1))
        .and_then(|x| match x {
            Value::Binary(b) => Some(b.clone()),
            _ => None,
        });
    match scramble {
        Some(x) if x == expected_scramble(expected_pass) => {
            Reply::Data(Value::Array(Vec::new()))
        }
        _ => failure(),
    }
}

fn expected_scramble(password: &str) -> Vec<u8> {
    fn sha1(parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().to_vec()
    }
    let step_1 = sha1(&[password.as_bytes()]);
    let step_2 = sha1(&[&step_1]);
    let step_3 = sha1(&[&SALT[0..20], &step_2]);
    step_1
        .iter()
        .zip(step_3)
        .map(|(l, r)| l ^ r)
        .collect()
}

fn key_of(tuple: &[Value]) -> Option<i64> {
    tuple.first().and_then(Value::as_i64)
}

fn select(state: &ServerState, body: &Value) -> Reply {
    let keys_arr = map_get(body, keys::KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let limit = map_get_u64(body, keys::LIMIT).unwrap_or(u32::MAX as u64) as usize;
    let offset = map_get_u64(body, keys::OFFSET).unwrap_or(0) as usize;

    let space = state.space.lock();
    let rows: Vec<Value> = if keys_arr.is_empty() {
        space.values().cloned().map(Value::Array).collect()
    } else {
        match keys_arr.first().and_then(Value::as_i64) {
            Some(pk) => space
                .get(&pk)
                .cloned()
                .map(Value::Array)
                .into_iter()
                .collect(),
            None => Vec::new(),
        }
    };
    let rows = rows.into_iter().skip(offset).take(limit).collect();
    Reply::Data(Value::Array(rows))
}

fn insert(state: &ServerState, body: &Value) -> Reply {
    let Some(tuple) = map_get(body, keys::TUPLE).and_then(Value::as_array).cloned() else {
        return Reply::Error(ER_PROC_LUA, "Tuple is missing".into());
    };
    let Some(pk) = key_of(&tuple) else {
        return Reply::Error(ER_PROC_LUA, "Primary key must be an integer".into());
    };
    let mut space = state.space.lock();
    if space.contains_key(&pk) {
        return Reply::Error(
            ER_TUPLE_FOUND,
            "Duplicate key exists in unique index 'primary' in space 'mock'".into(),
        );
    }
    space.insert(pk, tuple.clone());
    Reply::Data(Value::Array(vec![Value::Array(tuple)]))
}

fn replace(state: &ServerState, body: &Value) -> Reply {
    let Some(tuple) = map_get(body, keys::TUPLE).and_then(Value::as_array).cloned() else {
        return Reply::Error(ER_PROC_LUA, "Tuple is missing".into());
    };
    let Some(pk) = key_of(&tuple) else {
        return Reply::Error(ER_PROC_LUA, "Primary key must be an integer".into());
    };
    state.space.lock().insert(pk, tuple.clone());
    Reply::Data(Value::Array(vec![Value::Array(tuple)]))
}

fn update(state: &ServerState, body: &Value) -> Reply {
    let pk = map_get(body, keys::KEY)
        .and_then(Value::as_array)
        .and_then(|x| x.first().and_then(Value::as_i64));
    let ops = map_get(body, keys::OPS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let Some(pk) = pk else {
        return Reply::Error(ER_PROC_LUA, "Key must be an integer".into());
    };
    let mut space = state.space.lock();
    match space.get_mut(&pk) {
        Some(tuple) => {
            if let Err(err) = apply_ops(tuple, &ops) {
                return Reply::Error(ER_PROC_LUA, err);
            }
            Reply::Data(Value::Array(vec![Value::Array(tuple.clone())]))
        }
        None => Reply::Data(Value::Array(Vec::new())),
    }
}

fn delete(state: &ServerState, body: &Value) -> Reply {
    let pk = map_get(body, keys::KEY)
        .and_then(Value::as_array)
        .and_then(|x| x.first().and_then(Value::as_i64));
    let Some(pk) = pk else {
        return Reply::Error(ER_PROC_LUA, "Key must be an integer".into());
    };
    match state.space.lock().remove(&pk) {
        Some(tuple) => Reply::Data(Value::Array(vec![Value::Array(tuple)])),
        None => Reply::Data(Value::Array(Vec::new())),
    }
}

fn upsert(state: &ServerState, body: &Value) -> Reply {
    let Some(tuple) = map_get(body, keys::TUPLE).and_then(Value::as_array).cloned() else {
        return Reply::Error(ER_PROC_LUA, "Tuple is missing".into());
    };
    let ops = map_get(body, keys::OPS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let Some(pk) = key_of(&tuple) else {
        return Reply::Error(ER_PROC_LUA, "Primary key must be an integer".into());
    };
    let mut space = state.space.lock();
    match space.get_mut(&pk) {
        Some(existing) => {
            if let Err(err) = apply_ops(existing, &ops) {
                return Reply::Error(ER_PROC_LUA, err);
            }
        }
        None => {
            space.insert(pk, tuple);
        }
    }
    Reply::Data(Value::Array(Vec::new()))
}

fn apply_ops(tuple: &mut Vec<Value>, ops: &[Value]) -> Result<(), String> {
    for op in ops {
        let op = op.as_array().ok_or("Operation must be a tuple")?;
        let name = op.first().and_then(Value::as_str).ok_or("Bad operator")?;
        let field = op
            .get(1)
            .and_then(Value::as_u64)
            .ok_or("Bad field number")? as usize;
        match name {
            "=" => {
                let value = op.get(2).ok_or("Missing operand")?.clone();
                if field < tuple.len() {
                    tuple[field] = value;
                } else if field == tuple.len() {
                    tuple.push(value);
                } else {
                    return Err("Field out of range".into());
                }
            }
            "#" => {
                let count = op.get(2).and_then(Value::as_u64).ok_or("Missing operand")? as usize;
                if field >= tuple.len() {
                    return Err("Field out of range".into());
                }
                let end = (field + count).min(tuple.len());
                tuple.drain(field..end);
            }
            "+" => {
                let delta = op.get(2).and_then(Value::as_i64).ok_or("Missing operand")?;
                let current = tuple
                    .get(field)
                    .and_then(Value::as_i64)
                    .ok_or("Field is not a number")?;
                tuple[field] = Value::from(current + delta);
            }
            other => return Err(format!("Unknown operator '{other}'")),
        }
    }
    Ok(())
}

fn box_info(state: &ServerState) -> Value {
    Value::Map(vec![
        ("version".into(), "2.10.5-mock".into()),
        ("id".into(), Value::from(state.server_id)),
        ("ro".into(), Value::from(state.ro.load(Ordering::SeqCst))),
        (
            "uuid".into(),
            format!("00000000-0000-0000-0000-{:012}", state.server_id).into(),
        ),
        ("pid".into(), Value::from(1000 + state.server_id)),
        ("status".into(), "running".into()),
        ("lsn".into(), Value::from(0)),
    ])
}

fn call(state: &ServerState, body: &Value) -> Reply {
    let function = map_get(body, keys::FUNCTION_NAME)
        .and_then(Value::as_str)
        .unwrap_or("");
    match function {
        "box.info" => Reply::Data(Value::Array(vec![box_info(state)])),
        "mock.id" => Reply::Data(Value::Array(vec![Value::from(state.server_id)])),
        other => Reply::Error(
            ER_NO_SUCH_PROC,
            format!("Procedure '{other}' is not defined"),
        ),
    }
}

async fn eval(state: &ServerState, body: &Value) -> Reply {
    let expr = map_get(body, keys::EXPR).and_then(Value::as_str).unwrap_or("");
    let args = map_get(body, keys::ARGS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    match expr {
        "return box.info().ro" => Reply::Data(Value::Array(vec![Value::from(
            state.ro.load(Ordering::SeqCst),
        )])),
        "return server.id" => Reply::Data(Value::Array(vec![Value::from(state.server_id)])),
        "return ..." => Reply::Data(Value::Array(args)),
        "fiber.sleep" => {
            let secs = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            Reply::Data(Value::Array(Vec::new()))
        }
        other => Reply::Error(ER_PROC_LUA, format!("Unsupported expression '{other}'")),
    }
}

fn readonly_error() -> Reply {
    Reply::Error(
        ER_READONLY,
        "Can't modify data on a read-only instance".into(),
    )
}

fn encode_reply(sync: u32, reply: Reply) -> Vec<u8> {
    let (code, body) = match reply {
        Reply::Data(data) => (0u32, Value::Map(vec![(keys::DATA.into(), data)])),
        Reply::Error(class, message) => (
            0x8000 | class,
            Value::Map(vec![(keys::ERROR_24.into(), message.into())]),
        ),
    };
    let header = Value::Map(vec![
        (keys::RESPONSE_CODE.into(), Value::from(code)),
        (keys::SYNC.into(), Value::from(sync)),
        (keys::SCHEMA_VERSION.into(), Value::from(1)),
    ]);
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, &header).unwrap();
    rmpv::encode::write_value(&mut payload, &body).unwrap();

    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(0xce);
    frame.extend((payload.len() as u32).to_be_bytes());
    frame.extend(payload);
    frame
}

fn map_get<'a>(map: &'a Value, key: u8) -> Option<&'a Value> {
    map.as_map()?.iter().find_map(|(k, v)| {
        (k.as_u64() == Some(key as u64)).then_some(v)
    })
}

fn map_get_u64(map: &Value, key: u8) -> Option<u64> {
    map_get(map, key).and_then(Value::as_u64)
}
