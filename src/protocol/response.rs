//! Daemon response grammar.
//!
//! After the terminator clamd answers with one or more records, each ended
//! by NUL (z-prefixed commands) or newline:
//!
//! ```text
//! record   = [id ": "] "stream:" SP result
//! result   = "OK"                      ; clean, case-insensitive
//!          / name SP "FOUND"           ; infected
//!          / anything else             ; inconclusive
//! ```
//!
//! With all-match scanning enabled the daemon may send several `FOUND`
//! records before closing the connection; every name is kept in order.

use crate::core::error::ScanError;
use crate::core::types::Verdict;

/// Upper bound on a response; longer replies are a protocol error.
pub const MAX_RESPONSE_LEN: usize = 8 * 1024;

/// One classified response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    /// `stream: OK`
    Ok,
    /// `stream: <name> FOUND`
    Found(&'a str),
    /// Any other non-empty text.
    Other(&'a str),
}

fn is_record_end(byte: u8) -> bool {
    byte == 0 || byte == b'\n'
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn strip_suffix_ci<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let tail = text.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &text[..split])
}

/// Classifies a single trimmed record.
pub fn parse_record(record: &str) -> Record<'_> {
    let trimmed = record.trim();

    // IDSESSION replies carry a numeric request id in front.
    let body = match trimmed.split_once(": ") {
        Some((id, rest)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => trimmed,
    };

    let Some(result) = strip_prefix_ci(body, "stream:").map(str::trim) else {
        return Record::Other(trimmed);
    };

    if result.eq_ignore_ascii_case("OK") {
        return Record::Ok;
    }
    match strip_suffix_ci(result, " FOUND").map(str::trim) {
        Some(name) if !name.is_empty() => Record::Found(name),
        _ => Record::Other(trimmed),
    }
}

/// Parses a complete scan response into a verdict.
///
/// Invalid UTF-8 is a `Protocol` error; a response with no records is
/// `EmptyResponse`.
pub fn parse_response(raw: &[u8]) -> Result<Verdict, ScanError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ScanError::protocol(format!("response is not valid UTF-8: {e}")))?;

    let records: Vec<&str> = text
        .split(|c: char| c == '\0' || c == '\n')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect();
    if records.is_empty() {
        return Err(ScanError::EmptyResponse);
    }

    let mut names = Vec::new();
    let mut clean = false;
    for record in &records {
        match parse_record(record) {
            Record::Found(name) => names.push(name.to_string()),
            Record::Ok => clean = true,
            Record::Other(_) => {}
        }
    }

    Ok(if !names.is_empty() {
        Verdict::Infected { names }
    } else if clean {
        Verdict::Clean
    } else {
        Verdict::Inconclusive {
            response: records.join("\n"),
        }
    })
}

/// Returns `true` once `buf` holds a reply that cannot be extended.
///
/// A complete non-`FOUND` record ends the reply. After `FOUND` records the
/// daemon may still report further detections, so the reader keeps going
/// until the connection closes. A complete record that is not UTF-8 also
/// ends the reply, since nothing after it can make it parse.
pub fn is_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.iter().rposition(|b| is_record_end(*b)) else {
        return false;
    };
    buf[..end]
        .split(|b| is_record_end(*b))
        .any(|record| match std::str::from_utf8(record) {
            Ok(text) => {
                let text = text.trim();
                !text.is_empty() && !matches!(parse_record(text), Record::Found(_))
            }
            Err(_) => true,
        })
}

/// Parses the reply to a plain command such as `PING` or `VERSION`.
pub fn parse_reply(raw: &[u8]) -> Result<String, ScanError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ScanError::protocol(format!("reply is not valid UTF-8: {e}")))?;
    let reply = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if reply.is_empty() {
        return Err(ScanError::EmptyResponse);
    }
    Ok(reply.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn test_clean_response() {
        assert_eq!(parse_response(b"stream: OK\0").unwrap(), Verdict::Clean);
        assert_eq!(parse_response(b"stream: OK\n").unwrap(), Verdict::Clean);
        assert_eq!(parse_response(b"  STREAM: ok  ").unwrap(), Verdict::Clean);
    }

    #[test]
    fn test_infected_response() {
        assert_eq!(
            parse_response(b"stream: Eicar-Test-Signature FOUND\0").unwrap(),
            Verdict::Infected {
                names: vec!["Eicar-Test-Signature".into()]
            }
        );
    }

    #[test]
    fn test_infected_with_extended_detection_info() {
        let verdict =
            parse_response(b"stream: Eicar-Signature(44d88612fea8a8f36de82e1278abb02f:68) FOUND\0")
                .unwrap();
        assert_eq!(
            verdict.names().unwrap(),
            ["Eicar-Signature(44d88612fea8a8f36de82e1278abb02f:68)"]
        );
    }

    #[test]
    fn test_multiple_detections_keep_order() {
        let verdict = parse_response(
            b"stream: Win.Test.First FOUND\0stream: Win.Test.Second FOUND\0stream: Win.Test.Third FOUND\0",
        )
        .unwrap();
        assert_eq!(
            verdict.names().unwrap(),
            ["Win.Test.First", "Win.Test.Second", "Win.Test.Third"]
        );
    }

    #[test]
    fn test_session_id_prefix() {
        assert_eq!(parse_response(b"1: stream: OK\0").unwrap(), Verdict::Clean);
        assert_eq!(
            parse_response(b"12: stream: Win.X FOUND\0").unwrap().names().unwrap(),
            ["Win.X"]
        );
    }

    #[test]
    fn test_error_reply_is_inconclusive() {
        let verdict = parse_response(b"INSTREAM size limit exceeded. ERROR\0").unwrap();
        assert_eq!(
            verdict,
            Verdict::Inconclusive {
                response: "INSTREAM size limit exceeded. ERROR".into()
            }
        );
    }

    #[test]
    fn test_unrecognized_shapes_are_inconclusive() {
        for raw in [
            &b"stream: FOUND\0"[..],
            b"stream: something odd\0",
            b"UNKNOWN COMMAND\n",
            b"OK\0",
        ] {
            assert!(parse_response(raw).unwrap().is_inconclusive(), "{raw:?}");
        }
    }

    #[test]
    fn test_empty_response() {
        for raw in [&b""[..], b"\0", b"  \n\0"] {
            let err = parse_response(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EmptyResponse);
        }
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let err = parse_response(b"stream: \xff\xfe FOUND\0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record("stream: OK"), Record::Ok);
        assert_eq!(parse_record("stream: X FOUND"), Record::Found("X"));
        assert_eq!(parse_record("stream: x found"), Record::Found("x"));
        assert_eq!(parse_record("PONG"), Record::Other("PONG"));
    }

    #[test]
    fn test_is_complete() {
        assert!(!is_complete(b""));
        assert!(!is_complete(b"stream: O"));
        assert!(is_complete(b"stream: OK\0"));
        assert!(is_complete(b"INSTREAM size limit exceeded. ERROR\n"));
        assert!(!is_complete(b"stream: Win.X FOUND\0"));
        assert!(!is_complete(b"stream: Win.X FOUND\0stream: Win.Y FO"));
        assert!(is_complete(b"stream: \xff\xfe OK\0"));
        assert!(is_complete(b"stream: Win.X FOUND\0\xc3\0"));
        assert!(!is_complete(b"stream: \xff\xfe OK"));
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(b"PONG\0").unwrap(), "PONG");
        assert_eq!(
            parse_reply(b"ClamAV 1.3.1/27311/Mon Jun 10 08:21:41 2024\n").unwrap(),
            "ClamAV 1.3.1/27311/Mon Jun 10 08:21:41 2024"
        );
        assert_eq!(parse_reply(b"\0").unwrap_err().kind(), ErrorKind::EmptyResponse);
    }
}
