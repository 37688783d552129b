// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! AHA-HTTP client for Fritz!DECT smart switches.
//!
//! Talks the AVM Home Automation HTTP interface of a Fritz!Box: one
//! `Connection: close` GET per exchange over [`tokio::net::TcpStream`],
//! wrapped in a per-request timeout. Sessions are established against
//! `login_sid.lua` with the box's MD5 challenge-response scheme; switch
//! commands and power statistics go through
//! `webservices/homeautoswitch.lua`.
//!
//! Responses are validated step by step and rejected with typed errors;
//! nothing is retried here. An HTTP 403 means the session ID has expired;
//! that surfaces as an auth error and the caller decides whether to log in
//! again.

use log::debug;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::device::SmartPlug;
use crate::error::{AhaError, AuthError, ParseError, TimeoutError};
use crate::md5;
use crate::record::{PowerRecord, unix_now};

/// The SID the box hands out when no session is established.
const BLANK_SID: &str = "0000000000000000";

/// Default HTTP port of the box.
const DEFAULT_PORT: u16 = 80;

/// Default per-request time budget (connect + send + receive).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated session with one Fritz!Box, bound to one smart switch
/// by its actor identification number (AIN).
///
/// All methods perform exactly one HTTP exchange. The session holds no
/// connection state between calls.
#[derive(Clone, Debug)]
pub struct AhaSession {
    host: String,
    port: u16,
    ain: String,
    sid: String,
    timeout: Duration,
}

impl AhaSession {
    /// Establish a session with the box at `host` (optionally `host:port`)
    /// and bind it to the switch identified by `ain`.
    ///
    /// Performs the `login_sid.lua` challenge-response handshake. If the
    /// box hands out a valid SID without a challenge (open access from the
    /// local network), that SID is used directly.
    pub async fn login(
        host: &str,
        user: &str,
        password: &str,
        ain: &str,
    ) -> Result<AhaSession, AhaError> {
        let (host, port) = split_host_port(host);
        let mut session = AhaSession {
            host,
            port,
            ain: ain.to_string(),
            sid: String::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        };

        let body = session.http_get("/login_sid.lua").await?;
        let info = parse_session_info(&body)?;
        if info.sid != BLANK_SID {
            debug!("box granted SID without challenge");
            session.sid = info.sid;
            return Ok(session);
        }

        let challenge = info
            .challenge
            .filter(|c| !c.is_empty())
            .ok_or(AhaError::Auth(AuthError::MissingChallenge))?;
        let response = challenge_response(&challenge, password);
        let path = format!("/login_sid.lua?username={user}&response={response}");
        let body = session.http_get(&path).await?;
        let info = parse_session_info(&body)?;
        if info.sid == BLANK_SID {
            return Err(AhaError::Auth(AuthError::LoginRejected));
        }
        debug!("logged in, SID {}", info.sid);
        session.sid = info.sid;
        Ok(session)
    }

    /// Replace the per-request timeout (default: 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> AhaSession {
        self.timeout = timeout;
        self
    }

    /// The session ID granted by the box.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// The AIN of the switch this session is bound to.
    pub fn ain(&self) -> &str {
        &self.ain
    }

    /// Issue one `homeautoswitch.lua` command and return the response body.
    async fn command(&self, switchcmd: &str) -> Result<String, AhaError> {
        let path = format!(
            "/webservices/homeautoswitch.lua?ain={}&switchcmd={}&sid={}",
            encode_ain(&self.ain),
            switchcmd,
            self.sid
        );
        self.http_get(&path).await
    }

    /// One GET exchange: connect, send, read to EOF, validate the status.
    async fn http_get(&self, path: &str) -> Result<String, AhaError> {
        let exchange = async {
            let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
            let request = format!(
                "GET {path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n",
                host = self.host,
            );
            stream.write_all(request.as_bytes()).await?;
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).await?;
            Ok::<_, std::io::Error>(raw)
        };
        let raw = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| AhaError::Timeout(TimeoutError::Request))??;
        debug!("recv: {} bytes from {}:{}", raw.len(), self.host, self.port);

        let (status, body) = parse_http_response(&raw)?;
        match status {
            200 => Ok(body),
            403 => Err(AhaError::Auth(AuthError::SessionExpired)),
            code => Err(AhaError::Parse(ParseError::HttpStatus { code })),
        }
    }
}

impl SmartPlug for AhaSession {
    /// Fetch the power statistics and build a record from the newest value,
    /// bracketing the exchange with local timestamps.
    async fn latest_power_record(&self) -> Result<PowerRecord, AhaError> {
        let request_time = unix_now();
        let body = self.command("getbasicdevicestats").await?;
        let response_time = unix_now();
        let (watts, sample_time) = parse_device_stats(&body)?;
        Ok(PowerRecord {
            watts,
            sample_time,
            request_time,
            response_time,
        })
    }

    async fn set_switch(&self, on: bool) -> Result<(), AhaError> {
        let cmd = if on { "setswitchon" } else { "setswitchoff" };
        let body = self.command(cmd).await?;
        // The box echoes the new state; a mismatch means the command did
        // not take effect.
        let reported = parse_switch_state(&body)?;
        if reported != on {
            return Err(AhaError::Parse(ParseError::InvalidSwitchState {
                body: body.trim().to_string(),
            }));
        }
        Ok(())
    }

    async fn switch_state(&self) -> Result<bool, AhaError> {
        let body = self.command("getswitchstate").await?;
        Ok(parse_switch_state(&body)?)
    }
}

/// Parsed `login_sid.lua` response.
struct SessionInfo {
    sid: String,
    challenge: Option<String>,
}

/// Split an optional `:port` suffix off a host string.
fn split_host_port(host: &str) -> (String, u16) {
    if let Some((h, p)) = host.rsplit_once(':')
        && let Ok(port) = p.parse()
    {
        return (h.to_string(), port);
    }
    (host.to_string(), DEFAULT_PORT)
}

/// Percent-encode the one character AINs actually contain besides digits.
fn encode_ain(ain: &str) -> String {
    ain.replace(' ', "%20")
}

/// The response to a login challenge:
/// `<challenge>-MD5(UTF-16LE("<challenge>-<password>"))`.
fn challenge_response(challenge: &str, password: &str) -> String {
    let secret = md5::utf16le(&format!("{challenge}-{password}"));
    format!("{challenge}-{}", md5::hex_digest(&secret))
}

/// Split a raw HTTP response into status code and body.
fn parse_http_response(raw: &[u8]) -> Result<(u16, String), ParseError> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or(ParseError::MalformedHttp)?;
    let status_line = head.lines().next().ok_or(ParseError::MalformedHttp)?;
    let mut parts = status_line.split_whitespace();
    let version = parts.next().ok_or(ParseError::MalformedHttp)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::MalformedHttp);
    }
    let code = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or(ParseError::MalformedHttp)?;
    Ok((code, body.to_string()))
}

/// Content of the first `<name ...>...</name>` element, if present.
///
/// This is not a general XML parser; the box's responses are flat and
/// predictable enough that scanning for the tag pair is sufficient.
fn element<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut search = xml;
    loop {
        let start = search.find(&open)?;
        let after = &search[start + open.len()..];
        // Require a real tag boundary so "power" does not match "powermax".
        match after.chars().next()? {
            '>' | ' ' | '\t' | '\r' | '\n' => {
                let gt = after.find('>')?;
                let content = &after[gt + 1..];
                let end = content.find(&close)?;
                return Some(&content[..end]);
            }
            _ => search = after,
        }
    }
}

/// Value of `name="..."` inside an already-isolated open tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Parse SID and challenge out of a `login_sid.lua` response.
fn parse_session_info(xml: &str) -> Result<SessionInfo, ParseError> {
    let sid = element(xml, "SID").ok_or(ParseError::MissingElement { element: "SID" })?;
    Ok(SessionInfo {
        sid: sid.trim().to_string(),
        challenge: element(xml, "Challenge").map(|c| c.trim().to_string()),
    })
}

/// Extract the newest power value and its device timestamp from a
/// `getbasicdevicestats` response.
///
/// The `<power>` block holds newest-first samples in hundredths of a watt;
/// the `datatime` attribute is the Unix timestamp of the newest sample,
/// quantized to whole seconds by the device.
fn parse_device_stats(xml: &str) -> Result<(f64, f64), ParseError> {
    let power = element(xml, "power").ok_or(ParseError::MissingElement { element: "power" })?;

    let tag_start = power
        .find("<stats")
        .ok_or(ParseError::MissingElement { element: "stats" })?;
    let tag = &power[tag_start..];
    let gt = tag
        .find('>')
        .ok_or(ParseError::MissingElement { element: "stats" })?;
    let datatime: f64 = attribute(&tag[..gt], "datatime")
        .ok_or(ParseError::MissingAttribute {
            attribute: "datatime",
        })?
        .parse()
        .map_err(|_| ParseError::InvalidNumber { field: "datatime" })?;

    let values = element(power, "stats").ok_or(ParseError::MissingElement { element: "stats" })?;
    let newest = values
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "-")
        .ok_or(ParseError::EmptyStats)?;
    let centiwatts: f64 = newest
        .parse()
        .map_err(|_| ParseError::InvalidNumber { field: "power" })?;

    Ok((centiwatts / 100.0, datatime))
}

/// Parse a switch state body: `"1"` on, `"0"` off, anything else (notably
/// `"inval"` while the device is busy) is unusable.
fn parse_switch_state(body: &str) -> Result<bool, ParseError> {
    match body.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ParseError::InvalidSwitchState {
            body: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
        <SessionInfo><SID>0000000000000000</SID>\
        <Challenge>1234567z</Challenge><BlockTime>0</BlockTime>\
        </SessionInfo>";

    const STATS_XML: &str = "<?xml version=\"1.0\"?><devicestats>\
        <temperature><stats count=\"96\" grid=\"900\">255,250,245</stats></temperature>\
        <voltage><stats count=\"360\" grid=\"10\" datatime=\"1693238410\">231470,231020</stats></voltage>\
        <power><stats count=\"360\" grid=\"10\" datatime=\"1693238410\">42736,42800,43100</stats></power>\
        <energy><stats count=\"12\" grid=\"2678400\">1000,900</stats></energy>\
        </devicestats>";

    #[test]
    fn test_parse_http_response_ok() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n1";
        let (status, body) = parse_http_response(raw).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "1");
    }

    #[test]
    fn test_parse_http_response_status_codes() {
        let raw = b"HTTP/1.1 403 Forbidden\r\n\r\n";
        let (status, body) = parse_http_response(raw).unwrap();
        assert_eq!(status, 403);
        assert!(body.is_empty());
    }

    #[test]
    fn test_parse_http_response_rejects_garbage() {
        assert!(matches!(
            parse_http_response(b"not http at all"),
            Err(ParseError::MalformedHttp)
        ));
        assert!(matches!(
            parse_http_response(b"GARBAGE 200\r\n\r\nbody"),
            Err(ParseError::MalformedHttp)
        ));
    }

    #[test]
    fn test_element_extraction() {
        assert_eq!(element(LOGIN_XML, "SID"), Some("0000000000000000"));
        assert_eq!(element(LOGIN_XML, "Challenge"), Some("1234567z"));
        assert_eq!(element(LOGIN_XML, "NoSuchTag"), None);
    }

    #[test]
    fn test_element_requires_tag_boundary() {
        let xml = "<powermax>9</powermax><power>7</power>";
        assert_eq!(element(xml, "power"), Some("7"));
    }

    #[test]
    fn test_parse_session_info() {
        let info = parse_session_info(LOGIN_XML).unwrap();
        assert_eq!(info.sid, BLANK_SID);
        assert_eq!(info.challenge.as_deref(), Some("1234567z"));
    }

    #[test]
    fn test_challenge_response_matches_vendor_example() {
        // The example from AVM's session ID documentation.
        assert_eq!(
            challenge_response("1234567z", "äbc"),
            "1234567z-9e224a41eeefa284df7bb0f26c2913e2"
        );
    }

    #[test]
    fn test_parse_device_stats() {
        let (watts, sample_time) = parse_device_stats(STATS_XML).unwrap();
        assert!((watts - 427.36).abs() < 1e-9);
        assert_eq!(sample_time, 1_693_238_410.0);
    }

    #[test]
    fn test_parse_device_stats_missing_power() {
        let xml = "<devicestats><temperature><stats count=\"1\" grid=\"900\">255</stats>\
            </temperature></devicestats>";
        assert!(matches!(
            parse_device_stats(xml),
            Err(ParseError::MissingElement { element: "power" })
        ));
    }

    #[test]
    fn test_parse_device_stats_empty_grid() {
        let xml = "<devicestats><power>\
            <stats count=\"3\" grid=\"10\" datatime=\"1693238410\">-,-,-</stats>\
            </power></devicestats>";
        assert!(matches!(
            parse_device_stats(xml),
            Err(ParseError::EmptyStats)
        ));
    }

    #[test]
    fn test_parse_device_stats_missing_datatime() {
        let xml = "<devicestats><power><stats count=\"1\" grid=\"10\">100</stats>\
            </power></devicestats>";
        assert!(matches!(
            parse_device_stats(xml),
            Err(ParseError::MissingAttribute {
                attribute: "datatime"
            })
        ));
    }

    #[test]
    fn test_parse_switch_state() {
        assert_eq!(parse_switch_state("1\n").unwrap(), true);
        assert_eq!(parse_switch_state("0").unwrap(), false);
        assert!(matches!(
            parse_switch_state("inval"),
            Err(ParseError::InvalidSwitchState { .. })
        ));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("fritz.box"), ("fritz.box".into(), 80));
        assert_eq!(
            split_host_port("192.168.178.1:8080"),
            ("192.168.178.1".into(), 8080)
        );
    }

    #[test]
    fn test_encode_ain() {
        assert_eq!(encode_ain("11657 0272633"), "11657%200272633");
        assert_eq!(encode_ain("116570272633"), "116570272633");
    }
}
