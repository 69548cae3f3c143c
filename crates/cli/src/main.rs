//! Reference command-line tool for the durable streams protocol.
//!
//! Thin wrapper over the HTTP surface: `create` PUTs a stream, `write` POSTs
//! a payload, `read` drains the stream to stdout until it is up to date, and
//! `delete` removes it. Exit codes: 0 success, 1 error, 2 argument error.

use std::io::Write as _;
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

const HEADER_STREAM_NEXT_OFFSET: &str = "stream-next-offset";
const HEADER_STREAM_UP_TO_DATE: &str = "stream-up-to-date";
const HEADER_STREAM_TTL: &str = "Stream-TTL";
const HEADER_STREAM_EXPIRES_AT: &str = "Stream-Expires-At";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Durable streams reference tool", long_about = None)]
struct Opts {
    /// Base server URL
    #[arg(
        long = "url",
        global = true,
        default_value = "http://127.0.0.1:4437",
        env = "DURABLE_STREAMS_URL"
    )]
    url: String,

    /// Authorization header value, e.g. "Bearer <token>"
    #[arg(long = "auth", global = true)]
    auth: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a stream
    Create(CreateCommand),
    /// Append a payload to a stream
    Write(WriteCommand),
    /// Read a stream to stdout until up to date
    Read(ReadCommand),
    /// Delete a stream
    Delete(DeleteCommand),
}

#[derive(Args, Debug)]
struct CreateCommand {
    /// Stream identifier (path below the server namespace)
    stream_id: String,

    /// Content type of the stream
    #[arg(long, default_value = "application/octet-stream")]
    content_type: String,

    /// Relative time-to-live in seconds
    #[arg(long)]
    ttl: Option<u64>,

    /// Absolute expiry as an RFC 3339 timestamp
    #[arg(long, conflicts_with = "ttl")]
    expires_at: Option<String>,
}

#[derive(Args, Debug)]
struct WriteCommand {
    /// Stream identifier
    stream_id: String,

    /// Payload; multiple arguments are joined with spaces
    #[arg(required = true)]
    payload: Vec<String>,

    /// Content type of the append
    #[arg(long, default_value = "text/plain")]
    content_type: String,

    /// Treat the payload as a single JSON value
    #[arg(long, conflicts_with = "batch_json")]
    json: bool,

    /// Treat a top-level JSON array as many appends
    #[arg(long)]
    batch_json: bool,
}

#[derive(Args, Debug)]
struct ReadCommand {
    /// Stream identifier
    stream_id: String,
}

#[derive(Args, Debug)]
struct DeleteCommand {
    /// Stream identifier
    stream_id: String,
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    let client = Client::new(&opts.url, opts.auth.as_deref());
    let result = match &opts.command {
        Command::Create(cmd) => run_create(&client, cmd).await,
        Command::Write(cmd) => run_write(&client, cmd).await,
        Command::Read(cmd) => run_read(&client, cmd).await,
        Command::Delete(cmd) => run_delete(&client, cmd).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

struct Client {
    inner: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl Client {
    fn new(base_url: &str, auth: Option<&str>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: auth.map(String::from),
        }
    }

    fn stream_url(&self, stream_id: &str) -> String {
        format!("{}/{}", self.base_url, stream_id.trim_start_matches('/'))
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &self.auth {
            if let Ok(value) = HeaderValue::from_str(auth) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }
}

async fn run_create(client: &Client, cmd: &CreateCommand) -> Result<()> {
    let mut request = client
        .inner
        .put(client.stream_url(&cmd.stream_id))
        .headers(client.headers())
        .header(CONTENT_TYPE, &cmd.content_type);
    if let Some(ttl) = cmd.ttl {
        request = request.header(HEADER_STREAM_TTL, ttl.to_string());
    }
    if let Some(expires_at) = &cmd.expires_at {
        request = request.header(HEADER_STREAM_EXPIRES_AT, expires_at);
    }

    let response = request.send().await.context("request failed")?;
    match response.status() {
        StatusCode::CREATED => {
            eprintln!("created {}", cmd.stream_id);
            Ok(())
        }
        StatusCode::OK => {
            eprintln!("{} already exists", cmd.stream_id);
            Ok(())
        }
        status => Err(status_error(status, response).await),
    }
}

async fn run_write(client: &Client, cmd: &WriteCommand) -> Result<()> {
    let payload = cmd.payload.join(" ");

    let (content_type, body) = if cmd.json {
        let value: serde_json::Value =
            serde_json::from_str(&payload).context("payload is not valid JSON")?;
        // Wrap in an outer array so the server appends exactly one message
        // even when the value itself is an array
        (
            "application/json".to_string(),
            format!("[{}]", serde_json::to_string(&value)?),
        )
    } else if cmd.batch_json {
        let value: serde_json::Value =
            serde_json::from_str(&payload).context("payload is not valid JSON")?;
        // Sent as-is; the server unwraps a top-level array into one append
        // per element
        (
            "application/json".to_string(),
            serde_json::to_string(&value)?,
        )
    } else {
        (cmd.content_type.clone(), payload)
    };

    let response = client
        .inner
        .post(client.stream_url(&cmd.stream_id))
        .headers(client.headers())
        .header(CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await
        .context("request failed")?;

    match response.status() {
        StatusCode::OK | StatusCode::NO_CONTENT => {
            if let Some(offset) = header_str(&response, HEADER_STREAM_NEXT_OFFSET) {
                eprintln!("appended, next offset {offset}");
            }
            Ok(())
        }
        status => Err(status_error(status, response).await),
    }
}

async fn run_read(client: &Client, cmd: &ReadCommand) -> Result<()> {
    let url = client.stream_url(&cmd.stream_id);
    let mut offset = "-1".to_string();
    let mut stdout = std::io::stdout();

    loop {
        let response = client
            .inner
            .get(&url)
            .headers(client.headers())
            .query(&[("offset", offset.as_str())])
            .send()
            .await
            .context("request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let next_offset = header_str(&response, HEADER_STREAM_NEXT_OFFSET)
            .ok_or_else(|| anyhow!("server response is missing {HEADER_STREAM_NEXT_OFFSET}"))?;
        let up_to_date =
            header_str(&response, HEADER_STREAM_UP_TO_DATE).as_deref() == Some("true");

        offset = next_offset;
        let body = response.bytes().await.context("failed to read body")?;
        stdout.write_all(&body)?;
        stdout.flush()?;

        if up_to_date {
            return Ok(());
        }
    }
}

async fn run_delete(client: &Client, cmd: &DeleteCommand) -> Result<()> {
    let response = client
        .inner
        .delete(client.stream_url(&cmd.stream_id))
        .headers(client.headers())
        .send()
        .await
        .context("request failed")?;

    match response.status() {
        StatusCode::NO_CONTENT => {
            eprintln!("deleted {}", cmd.stream_id);
            Ok(())
        }
        status => Err(status_error(status, response).await),
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> anyhow::Error {
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        anyhow!("server returned {status}")
    } else {
        anyhow!("server returned {status}: {body}")
    }
}
