//! Transport: the remote application process and its framed stdio channel.
//!
//! The bridge launches the application in background mode with a small
//! server script injected on the command line. The script reads requests
//! from stdin and writes responses and callback invocations to stdout.
//!
//! # Architecture
//!
//! ```text
//! libbridge                            application + server.py
//! ┌──────────────┐                    ┌─────────────────────┐
//! │ FrameWriter  │──stdin (frames)───▶│ request loop        │
//! │ FrameReader  │◀─stdout (frames)───│ (+ app output)      │
//! │ stderr drain │◀─stderr (logs)─────│                     │
//! └──────────────┘                    └─────────────────────┘
//! ```
//!
//! # Framing
//!
//! One JSON message per line. Protocol lines start with [`FRAME_PREFIX`]
//! (ASCII record separator); any other line on stdout is output of the
//! application itself and is only logged.

mod io;
mod process;

pub use io::{FrameReader, FrameWriter};
pub use process::RemoteProcess;

use crate::protocol::{Message, PROTOCOL_VERSION};
use crate::{Error, Result};

/// Marker at the start of every protocol line.
pub const FRAME_PREFIX: &str = "\u{1e}";

/// Oldest application version the server script is tested against.
pub const MIN_APP_VERSION: &str = "2.80.0";

/// Server script bundled with the crate.
pub const SERVER_SCRIPT: &str = include_str!("server.py");

/// What the server script reported in its ready message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyInfo {
    pub protocol: u32,
    pub app_version: Option<String>,
}

/// Read until the ready message arrives.
///
/// Returns `Ok(None)` if the stream ends first.
pub async fn wait_ready<R>(reader: &mut FrameReader<R>) -> Result<Option<ReadyInfo>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader.read_message().await? {
        None => Ok(None),
        Some(Message::Ready {
            protocol,
            app_version,
        }) => {
            if protocol != PROTOCOL_VERSION {
                return Err(Error::ProtocolMismatch {
                    expected: PROTOCOL_VERSION,
                    actual: protocol,
                });
            }
            check_app_version(app_version.as_deref());
            Ok(Some(ReadyInfo {
                protocol,
                app_version,
            }))
        }
        Some(other) => Err(Error::ProtocolFraming(format!(
            "expected ready message, got {}",
            other.kind()
        ))),
    }
}

/// Warn if the application is older than [`MIN_APP_VERSION`].
fn check_app_version(version: Option<&str>) {
    let Some(version_str) = version else {
        tracing::debug!("remote did not report an application version");
        return;
    };

    match parse_version(version_str) {
        Some(version) if version_below_min(&version) => {
            tracing::warn!(
                "application version {} is below minimum recommended version {}. \
                 Some features may not work correctly.",
                version_str,
                MIN_APP_VERSION
            );
        }
        Some(_) => tracing::debug!("application version: {}", version_str),
        None => tracing::debug!("could not parse application version from: {}", version_str),
    }
}

/// Parse a version string like "Blender 4.1.0" into (major, minor, patch).
///
/// A missing patch component is read as 0, so "3.6" parses as (3, 6, 0).
fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    fn leading_number(part: &str) -> Option<u32> {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    for word in s.split_whitespace() {
        let word = word.strip_prefix('v').unwrap_or(word);
        let parts: Vec<&str> = word.split('.').collect();
        if parts.len() < 2 {
            continue;
        }
        let major = leading_number(parts[0]);
        let minor = leading_number(parts[1]);
        let patch = parts.get(2).map_or(Some(0), |p| leading_number(p));
        if let (Some(maj), Some(min), Some(pat)) = (major, minor, patch) {
            return Some((maj, min, pat));
        }
    }
    None
}

/// Check if a version is below [`MIN_APP_VERSION`].
fn version_below_min(version: &(u32, u32, u32)) -> bool {
    let min = parse_version(MIN_APP_VERSION).unwrap_or((2, 80, 0));
    *version < min
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn parse_version_formats() {
        assert_eq!(parse_version("4.1.0"), Some((4, 1, 0)));
        assert_eq!(parse_version("Blender 3.6.5"), Some((3, 6, 5)));
        assert_eq!(parse_version("v2.93.18-lts"), Some((2, 93, 18)));
        assert_eq!(parse_version("3.6"), Some((3, 6, 0)));
        assert_eq!(parse_version("4.2.0 and 5.0.0"), Some((4, 2, 0)));
        assert_eq!(parse_version("no version"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn version_comparison() {
        assert!(!version_below_min(&(2, 80, 0)));
        assert!(!version_below_min(&(2, 93, 0)));
        assert!(!version_below_min(&(4, 0, 0)));
        assert!(version_below_min(&(2, 79, 9)));
        assert!(version_below_min(&(1, 99, 99)));
    }

    #[test]
    fn bundled_script_speaks_the_protocol() {
        assert!(SERVER_SCRIPT.contains("PROTOCOL_VERSION = 1"));
        assert!(SERVER_SCRIPT.contains("\\x1e"));
    }

    #[tokio::test]
    async fn wait_ready_accepts_matching_protocol() {
        let (mut remote, host) = tokio::io::duplex(1024);
        remote
            .write_all(b"booting\n\x1e{\"kind\":\"ready\",\"protocol\":1,\"app_version\":\"4.1.0\"}\n")
            .await
            .unwrap();

        let mut reader = FrameReader::new(host);
        let info = wait_ready(&mut reader).await.unwrap().unwrap();
        assert_eq!(info.app_version.as_deref(), Some("4.1.0"));
    }

    #[tokio::test]
    async fn wait_ready_rejects_other_protocol() {
        let (mut remote, host) = tokio::io::duplex(1024);
        remote
            .write_all(b"\x1e{\"kind\":\"ready\",\"protocol\":99}\n")
            .await
            .unwrap();

        let mut reader = FrameReader::new(host);
        assert!(matches!(
            wait_ready(&mut reader).await,
            Err(Error::ProtocolMismatch {
                expected: 1,
                actual: 99
            })
        ));
    }

    #[tokio::test]
    async fn wait_ready_reports_eof() {
        let (remote, host) = tokio::io::duplex(1024);
        drop(remote);
        let mut reader = FrameReader::new(host);
        assert_eq!(wait_ready(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wait_ready_rejects_other_messages() {
        let (mut remote, host) = tokio::io::duplex(1024);
        remote.write_all(b"\x1e{\"kind\":\"shutdown\"}\n").await.unwrap();
        let mut reader = FrameReader::new(host);
        assert!(matches!(
            wait_ready(&mut reader).await,
            Err(Error::ProtocolFraming(_))
        ));
    }
}
