//! `kecho repl` — drive a single session from stdin, one command per line.
//!
//! ```text
//! write <text>   replace the payload (rest of the line, may be empty)
//! read <n>       read up to n bytes
//! stat           show state, payload length and cursor
//! info           describe the endpoint
//! close          release the session and exit
//! ```

use super::Target;
use anyhow::Result;
use kecho_core::{Request, Response};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Request>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (cmd, rest) = match trimmed.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest),
        None => (trimmed, ""),
    };

    let request = match cmd {
        "write" => Request::Write {
            data: rest.as_bytes().to_vec(),
        },
        "read" => {
            let max_len = rest
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("read needs a byte count, got {:?}", rest.trim()))?;
            Request::Read { max_len }
        }
        "stat" => Request::Stat,
        "info" => Request::Info,
        "close" | "quit" | "exit" => Request::Close,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(request))
}

/// Render a response as one line of text.
pub fn render(response: &Response) -> String {
    match response {
        Response::Written { count } => format!("wrote {count} bytes"),
        Response::Data { data } if data.is_empty() => "(no data)".to_string(),
        Response::Data { data } => String::from_utf8_lossy(data).into_owned(),
        Response::Stat {
            state,
            payload_len,
            cursor,
        } => format!("state={state:?} len={payload_len} cursor={cursor}").to_lowercase(),
        Response::Info {
            name,
            class,
            version,
            handle,
            ..
        } => format!("{class}/{name} v{version}, handle {handle}"),
        Response::Error { kind, message } => format!("error ({kind:?}): {message}"),
        Response::Closed => "closed".to_string(),
    }
}

pub async fn run(target: &Target) -> Result<()> {
    let mut client = target.connect().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let request = match parse_line(&line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("kecho: {e}");
                continue;
            }
        };

        let closing = request == Request::Close;
        let response = client.call(&request).await?;
        println!("{}", render(&response));
        if closing {
            return Ok(());
        }
    }

    client.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kecho_core::{ErrorKind, SessionState};

    #[test]
    fn write_keeps_inner_spaces() {
        assert_eq!(
            parse_line("write hello  world").unwrap(),
            Some(Request::Write {
                data: b"hello  world".to_vec()
            })
        );
    }

    #[test]
    fn bare_write_is_empty_payload() {
        assert_eq!(
            parse_line("write").unwrap(),
            Some(Request::Write { data: Vec::new() })
        );
    }

    #[test]
    fn read_requires_number() {
        assert_eq!(
            parse_line("read 3").unwrap(),
            Some(Request::Read { max_len: 3 })
        );
        assert!(parse_line("read").is_err());
        assert!(parse_line("read lots").is_err());
    }

    #[test]
    fn blanks_and_comments_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   # note").unwrap(), None);
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(parse_line("append x").is_err());
    }

    #[test]
    fn renders_stat_and_errors() {
        let stat = Response::Stat {
            state: SessionState::Holding,
            payload_len: 5,
            cursor: 3,
        };
        assert_eq!(render(&stat), "state=holding len=5 cursor=3");
        assert_eq!(render(&Response::Data { data: Vec::new() }), "(no data)");
        assert_eq!(
            render(&Response::error(ErrorKind::NoSpace, "full")),
            "error (NoSpace): full"
        );
    }
}
