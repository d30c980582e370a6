//! Tiny RESP server that answers the handful of commands the service sends.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

pub(crate) struct FakeRedis {
    password: Option<String>,
    store: Mutex<HashMap<String, String>>,
    accepted_auths: AtomicUsize,
}

impl FakeRedis {
    /// Listen on an ephemeral localhost port. With `password` set, `AUTH`
    /// only succeeds for that password; every other command is served
    /// regardless.
    pub(crate) async fn start(password: Option<&str>) -> (SocketAddr, Arc<FakeRedis>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake redis");
        let addr = listener.local_addr().expect("local addr");
        let server = Arc::new(FakeRedis {
            password: password.map(str::to_string),
            store: Mutex::new(HashMap::new()),
            accepted_auths: AtomicUsize::new(0),
        });

        let shared = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(shared.clone().serve(stream));
            }
        });

        (addr, server)
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.store.lock().get(key).cloned()
    }

    pub(crate) fn accepted_auths(&self) -> usize {
        self.accepted_auths.load(Ordering::SeqCst)
    }

    async fn serve(self: Arc<Self>, stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        while let Some(args) = read_command(&mut reader).await {
            let reply = self.reply(&args);
            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    fn reply(&self, args: &[String]) -> String {
        let Some((name, rest)) = args.split_first() else {
            return "-ERR empty command\r\n".to_string();
        };

        match name.to_ascii_uppercase().as_str() {
            "AUTH" => {
                if self.password.is_some() && self.password.as_ref() == rest.last() {
                    self.accepted_auths.fetch_add(1, Ordering::SeqCst);
                    "+OK\r\n".to_string()
                } else {
                    "-ERR invalid password\r\n".to_string()
                }
            }
            "PING" => "+PONG\r\n".to_string(),
            "GET" => match rest.first().and_then(|key| self.value(key)) {
                Some(value) => format!("${}\r\n{}\r\n", value.len(), value),
                None => "$-1\r\n".to_string(),
            },
            "SET" => match rest {
                [key, value, ..] => {
                    self.store.lock().insert(key.clone(), value.clone());
                    "+OK\r\n".to_string()
                }
                _ => "-ERR wrong number of arguments for 'set' command\r\n".to_string(),
            },
            "DEL" => {
                let mut store = self.store.lock();
                let removed = rest.iter().filter(|key| store.remove(*key).is_some()).count();
                format!(":{}\r\n", removed)
            }
            _ => "+OK\r\n".to_string(),
        }
    }
}

/// Read one command sent as an array of bulk strings.
async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let count: usize = read_line(reader).await?.strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len: usize = read_line(reader).await?.strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(String::from_utf8(buf).ok()?);
    }
    Some(args)
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end().to_string()),
    }
}
