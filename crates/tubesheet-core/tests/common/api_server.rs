//! Minimal HTTP/1.1 server standing in for the YouTube Data API and the
//! Sheets `values.append` endpoint in integration tests.
//!
//! Serves one channel (`@testchan`) with `video_count` uploads in pages of
//! `maxResults`, honours `If-None-Match` on channel and playlist requests,
//! rejects the API key `dead` with `quotaExceeded`, and records every
//! appended row.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};

pub const CHANNEL_ID: &str = "UCtesttesttesttesttest01";
pub const HANDLE: &str = "testchan";

#[derive(Debug, Default)]
pub struct ServerState {
    /// Requests per resource (`channels`, `playlistItems`, `videos`, `append`).
    pub hits: HashMap<String, usize>,
    /// Requests answered with 304.
    pub not_modified: usize,
    /// Rows received by the append endpoint, per tab.
    pub rows: HashMap<String, Vec<Vec<String>>>,
}

impl ServerState {
    fn record_hit(&mut self, resource: &str) {
        *self.hits.entry(resource.to_string()).or_default() += 1;
    }

    fn record_rows(&mut self, tab: String, rows: Vec<Vec<String>>) {
        self.rows.entry(tab).or_default().extend(rows);
    }
}

pub struct ApiServer {
    /// Base URL of the YouTube API root (`http://127.0.0.1:port/youtube/v3`).
    pub youtube_url: String,
    /// Base URL of the Sheets API root (`http://127.0.0.1:port/v4`).
    pub sheets_url: String,
    pub state: Arc<Mutex<ServerState>>,
}

impl ApiServer {
    pub fn hits(&self, resource: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .hits
            .get(resource)
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self, tab: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .rows
            .get(tab)
            .cloned()
            .unwrap_or_default()
    }

    pub fn not_modified(&self) -> usize {
        self.state.lock().unwrap().not_modified
    }
}

/// Starts the server in a background thread; it runs until the process exits.
pub fn start(video_count: usize) -> ApiServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(Mutex::new(ServerState::default()));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, video_count, &state));
        }
    });
    ApiServer {
        youtube_url: format!("http://127.0.0.1:{port}/youtube/v3"),
        sheets_url: format!("http://127.0.0.1:{port}/v4"),
        state,
    }
}

struct Request {
    method: String,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut h = String::new();
        if reader.read_line(&mut h).ok()? == 0 {
            break;
        }
        let h = h.trim_end();
        if h.is_empty() {
            break;
        }
        if let Some((k, v)) = h.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    if headers
        .get("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").ok()?;
    }
    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).ok()?;

    let url = url::Url::parse(&format!("http://localhost{target}")).ok()?;
    Some(Request {
        method,
        url,
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: &str, etag: Option<&str>, body: &Value) {
    let body = if status.starts_with("304") {
        String::new()
    } else {
        body.to_string()
    };
    let etag = etag.map(|e| format!("ETag: {e}\r\n")).unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\n{etag}Connection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}

fn handle(mut stream: TcpStream, video_count: usize, state: &Mutex<ServerState>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let query: HashMap<String, String> = req.url.query_pairs().into_owned().collect();
    let path = req.url.path().to_string();
    let resource = if path.ends_with(":append") {
        "append".to_string()
    } else {
        path.rsplit('/').next().unwrap_or_default().to_string()
    };
    state.lock().unwrap().record_hit(&resource);

    if resource != "append" && query.get("key").map(String::as_str) == Some("dead") {
        let body = json!({
            "error": {
                "code": 403,
                "message": "quota",
                "errors": [{ "reason": "quotaExceeded" }]
            }
        });
        return respond(&mut stream, "403 Forbidden", None, &body);
    }
    let if_none_match = req.headers.get("if-none-match").cloned();
    let conditional = |stream: &mut TcpStream, etag: &str, body: Value| {
        if if_none_match.as_deref() == Some(etag) {
            state.lock().unwrap().not_modified += 1;
            respond(stream, "304 Not Modified", Some(etag), &Value::Null);
        } else {
            respond(stream, "200 OK", Some(etag), &body);
        }
    };

    match (req.method.as_str(), resource.as_str()) {
        ("GET", "channels") => {
            let wanted = format!("@{HANDLE}");
            let items = if query.get("forHandle") == Some(&wanted) {
                json!([{ "id": CHANNEL_ID }])
            } else {
                json!([])
            };
            conditional(&mut stream, "\"chan-1\"", json!({ "items": items }));
        }
        ("GET", "playlistItems") => {
            let size: usize = query
                .get("maxResults")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            let start: usize = query
                .get("pageToken")
                .and_then(|t| t.strip_prefix("tok"))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let end = (start + size).min(video_count);
            let items: Vec<Value> = (start..end)
                .map(|i| json!({ "contentDetails": { "videoId": format!("vid{i:03}") } }))
                .collect();
            let mut body = json!({ "items": items });
            if end < video_count {
                body["nextPageToken"] = json!(format!("tok{end}"));
            }
            conditional(&mut stream, &format!("\"page-{start}\""), body);
        }
        ("GET", "videos") => {
            let ids = query.get("id").cloned().unwrap_or_default();
            let items: Vec<Value> = ids
                .split(',')
                .filter(|id| !id.is_empty())
                .map(|id| {
                    let n: u64 = id.trim_start_matches("vid").parse().unwrap_or(0);
                    json!({
                        "id": id,
                        "snippet": {
                            "title": format!("Video {n}"),
                            "description": if n % 2 == 0 { "rust talk" } else { "cooking" },
                            "publishedAt": format!("2024-03-{:02}T10:00:00Z", 28 - (n % 28)),
                            "channelId": CHANNEL_ID,
                            "channelTitle": "Test Channel"
                        },
                        "contentDetails": { "duration": format!("PT{}M", n % 10 + 1) },
                        "statistics": { "viewCount": (n * 100).to_string(), "likeCount": "7" }
                    })
                })
                .collect();
            respond(&mut stream, "200 OK", None, &json!({ "items": items }));
        }
        ("POST", "append") => {
            let auth = req.headers.get("authorization").map(String::as_str);
            if auth != Some("Bearer sheet-token") {
                return respond(&mut stream, "401 Unauthorized", None, &json!({}));
            }
            // .../values/'Tab'!A1:append
            let last = req
                .url
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
                .unwrap_or_default();
            let decoded = percent_decode(&last);
            let tab = decoded
                .trim_end_matches("!A1:append")
                .trim_matches('\'')
                .to_string();
            let parsed: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
            let rows: Vec<Vec<String>> = parsed["values"]
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .map(|r| {
                            r.as_array()
                                .map(|cells| {
                                    cells
                                        .iter()
                                        .map(|c| c.as_str().unwrap_or_default().to_string())
                                        .collect()
                                })
                                .unwrap_or_default()
                        })
                        .collect()
                })
                .unwrap_or_default();
            let n = rows.len();
            state.lock().unwrap().record_rows(tab, rows);
            respond(
                &mut stream,
                "200 OK",
                None,
                &json!({ "updates": { "updatedRows": n } }),
            );
        }
        _ => respond(&mut stream, "404 Not Found", None, &json!({})),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
