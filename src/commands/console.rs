use std::sync::Arc;

use log::{debug, error};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::commands::Status;
use crate::handshake::connect;
use crate::identity::Identity;
use crate::transport::{broadcast, direct_message};

/// One parsed operator line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/all`
    ListPeers,
    /// `/exit`
    Exit,
    /// `/connect <addr> [addr...]`
    Connect(Vec<String>),
    /// `/me <addr> <text>`
    Direct { addr: String, text: String },
    /// Any other non-empty line
    Broadcast(String),
    /// Blank line
    Empty,
    /// A known command with missing arguments
    Usage(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Command::Empty;
        }

        let (head, rest) = match line.split_once(' ') {
            Some((head, rest)) => (head, rest),
            None => (line, ""),
        };

        match head {
            "/all" => Command::ListPeers,
            "/exit" => Command::Exit,
            "/connect" => {
                let addrs: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
                if addrs.is_empty() {
                    Command::Usage("/connect <addr> [addr...]")
                } else {
                    Command::Connect(addrs)
                }
            }
            "/me" => match rest.trim_start().split_once(' ') {
                Some((addr, text)) if !text.trim().is_empty() => Command::Direct {
                    addr: addr.to_string(),
                    text: text.trim_start().to_string(),
                },
                _ => Command::Usage("/me <addr> <text>"),
            },
            _ => Command::Broadcast(line.to_string()),
        }
    }
}

/// Whether the command loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Carry out one command and collect the status lines it produces.
pub async fn execute(identity: &Identity, command: Command) -> (Flow, Vec<Status>) {
    let mut report = Vec::new();

    match command {
        Command::Empty => {}
        Command::Exit => return (Flow::Exit, report),
        Command::Usage(usage) => report.push(Status::System(format!("usage: {}", usage))),
        Command::ListPeers => {
            let peers = identity.list_peers();
            if peers.is_empty() {
                report.push(Status::System("no peers".to_string()));
            }
            report.extend(peers.into_iter().map(Status::Peer));
        }
        Command::Connect(addrs) => {
            for (addr, result) in connect(identity, &addrs).await {
                report.push(match result {
                    Ok(_) => Status::Success(format!("connected to {}", addr)),
                    Err(e) => Status::Failure(format!("could not connect to {}: {}", addr, e)),
                });
            }
        }
        Command::Direct { addr, text } => match direct_message(identity, &addr, &text).await {
            Ok(()) => debug!("Direct message delivered to {}", addr),
            Err(e) => report.push(Status::Failure(format!("could not send to {}: {}", addr, e))),
        },
        Command::Broadcast(text) => {
            let delivery = broadcast(identity, &text).await;
            if delivery.is_empty() {
                report.push(Status::System("no peers".to_string()));
            }
            for (addr, e) in &delivery.failed {
                report.push(Status::Failure(format!("could not send to {}: {}", addr, e)));
            }
        }
    }

    (Flow::Continue, report)
}

/// Read operator lines from `input` until `/exit` or end of input.
pub async fn run<R>(identity: Arc<Identity>, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Operator input closed");
                break;
            }
            Err(e) => {
                error!("Failed to read operator input: {}", e);
                break;
            }
        };

        let (flow, report) = execute(&identity, Command::parse(&line)).await;
        for status in &report {
            status.print();
        }
        if flow == Flow::Exit {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(Command::parse("/all"), Command::ListPeers);
        assert_eq!(Command::parse("/exit\r\n"), Command::Exit);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            Command::parse("/connect 127.0.0.1:9001  127.0.0.1:9002"),
            Command::Connect(vec!["127.0.0.1:9001".to_string(), "127.0.0.1:9002".to_string()])
        );
        assert!(matches!(Command::parse("/connect"), Command::Usage(_)));
        assert!(matches!(Command::parse("/connect   "), Command::Usage(_)));
    }

    #[test]
    fn test_parse_direct_message_keeps_spaces_in_text() {
        assert_eq!(
            Command::parse("/me 127.0.0.1:9001 hello there  friend"),
            Command::Direct {
                addr: "127.0.0.1:9001".to_string(),
                text: "hello there  friend".to_string(),
            }
        );
        assert_eq!(
            Command::parse("/me 127.0.0.1:9001   hi"),
            Command::Direct {
                addr: "127.0.0.1:9001".to_string(),
                text: "hi".to_string(),
            }
        );
        assert!(matches!(Command::parse("/me 127.0.0.1:9001"), Command::Usage(_)));
        assert!(matches!(Command::parse("/me"), Command::Usage(_)));
    }

    #[test]
    fn test_parse_broadcast() {
        assert_eq!(Command::parse("hello world"), Command::Broadcast("hello world".to_string()));
        assert_eq!(Command::parse("/unknown x"), Command::Broadcast("/unknown x".to_string()));
    }

    fn texts(report: &[Status]) -> Vec<&str> {
        report.iter().map(Status::text).collect()
    }

    #[tokio::test]
    async fn test_empty_registry_reports_no_peers() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        let (flow, report) = execute(&identity, Command::ListPeers).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(report, vec![Status::System("no peers".to_string())]);

        let (_, report) = execute(&identity, Command::parse("hello")).await;
        assert_eq!(texts(&report), vec!["no peers"]);
    }

    #[tokio::test]
    async fn test_list_peers_prints_each_address() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();
        identity.add_peers(&["127.0.0.1:9001", "127.0.0.1:9002"]);

        let (_, report) = execute(&identity, Command::ListPeers).await;

        assert_eq!(
            report,
            vec![
                Status::Peer("127.0.0.1:9001".to_string()),
                Status::Peer("127.0.0.1:9002".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_arguments_print_usage() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        let (_, report) = execute(&identity, Command::parse("/connect")).await;
        assert_eq!(texts(&report), vec!["usage: /connect <addr> [addr...]"]);

        let (_, report) = execute(&identity, Command::parse("/me 127.0.0.1:9001")).await;
        assert_eq!(texts(&report), vec!["usage: /me <addr> <text>"]);
    }

    #[tokio::test]
    async fn test_exit_and_blank_lines_print_nothing() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        assert_eq!(execute(&identity, Command::Exit).await, (Flow::Exit, Vec::new()));
        assert_eq!(execute(&identity, Command::Empty).await, (Flow::Continue, Vec::new()));
    }

    #[tokio::test]
    async fn test_failed_connect_is_reported() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        let (_, report) = execute(&identity, Command::parse("/connect 127.0.0.1:9000")).await;

        assert_eq!(report.len(), 1);
        assert!(matches!(
            &report[0],
            Status::Failure(text) if text.starts_with("could not connect to 127.0.0.1:9000")
        ));
    }

    #[tokio::test]
    async fn test_run_stops_at_exit() {
        let identity = Arc::new(Identity::generate("127.0.0.1:9000", 1024).unwrap());
        let input = std::io::Cursor::new(b"/connect 127.0.0.1:9000\n/exit\n/connect 127.0.0.1:1\n".to_vec());

        run(Arc::clone(&identity), input).await;

        assert!(identity.list_peers().is_empty());
    }
}
