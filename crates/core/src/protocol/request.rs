use crate::error::{ParseErrorKind, Result, RtspError};

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. A body is read
/// when `Content-Length` is present (SET_PARAMETER, and ANNOUNCE/RECORD
/// in the parts of RFC 2326 this server does not implement).
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/stream/trackID=0`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Request body, present when `Content-Length` was set (e.g. SET_PARAMETER).
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Parse an RTSP request from its complete text representation (head
    /// plus exactly as many body bytes as `Content-Length` declares).
    pub fn parse(raw: &str) -> Result<Self> {
        match Self::try_parse_from_buffer(raw.as_bytes())? {
            Some((request, _consumed)) => Ok(request),
            None => Err(RtspError::Parse {
                kind: ParseErrorKind::EmptyRequest,
            }),
        }
    }

    /// Attempt to pop one complete request off the front of a connection's
    /// read buffer.
    ///
    /// Returns `Ok(None)` when the buffer does not yet contain a full
    /// header block (terminated by a blank line) or, once it does, not yet
    /// enough body bytes to satisfy `Content-Length`. The caller should keep
    /// reading from the socket and retry. Returns `Ok(Some((request,
    /// consumed)))` on success, where `consumed` is the number of bytes to
    /// drain from the front of the buffer.
    pub fn try_parse_from_buffer(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let header_end = match find_header_terminator(buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let head = std::str::from_utf8(&buf[..header_end]).map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidHeader,
        })?;

        let mut lines = head.split("\r\n").flat_map(|l| l.split('\n'));

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;
        if request_line.is_empty() {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::EmptyRequest,
            });
        }

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = header_end + terminator_len(buf, header_end);
        if buf.len() < body_start + content_length {
            return Ok(None);
        }

        let body = buf[body_start..body_start + content_length].to_vec();
        let consumed = body_start + content_length;

        Ok(Some((
            RtspRequest {
                method,
                uri,
                version,
                headers,
                body,
            },
            consumed,
        )))
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    ///
    /// Every RTSP request must include a CSeq, and the response must echo it.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }
}

/// Locate the start of the blank line terminating the header block
/// (`\r\n\r\n` or bare `\n\n`), returning the index where headers end.
fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos);
    }
    buf.windows(2).position(|w| w == b"\n\n")
}

fn terminator_len(buf: &[u8], header_end: usize) -> usize {
    if buf[header_end..].starts_with(b"\r\n\r\n") {
        4
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = "OPTIONS rtsp://localhost:8554/test RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "rtsp://localhost:8554/test");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), Some("1"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parse_setup_with_transport() {
        let raw = "SETUP rtsp://localhost:8554/test/trackID=0 RTSP/1.0\r\n\
                   CSeq: 3\r\n\
                   Transport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(req.cseq(), Some("3"));
        assert_eq!(
            req.get_header("Transport"),
            Some("RTP/AVP;unicast;client_port=8000-8001")
        );
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\n\r\n").is_err());
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "OPTIONS rtsp://localhost RTSP/1.0\r\ncseq: 42\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.get_header("CSeq"), Some("42"));
        assert_eq!(req.get_header("cseq"), Some("42"));
        assert_eq!(req.get_header("CSEQ"), Some("42"));
    }

    #[test]
    fn parse_with_content_length_body() {
        let raw = "SET_PARAMETER rtsp://localhost/test RTSP/1.0\r\n\
                   CSeq: 9\r\n\
                   Content-Length: 11\r\n\
                   \r\n\
                   hello world";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.body, b"hello world");
    }

    #[test]
    fn buffer_popping_waits_for_full_headers() {
        let partial = b"OPTIONS rtsp://localhost RTSP/1.0\r\nCSeq: 1\r\n";
        assert!(RtspRequest::try_parse_from_buffer(partial).unwrap().is_none());
    }

    #[test]
    fn buffer_popping_waits_for_body() {
        let partial = b"SET_PARAMETER rtsp://localhost RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 5\r\n\r\nhel";
        assert!(RtspRequest::try_parse_from_buffer(partial).unwrap().is_none());
    }

    #[test]
    fn buffer_popping_returns_consumed_length_and_leaves_remainder() {
        let buf = b"OPTIONS rtsp://localhost RTSP/1.0\r\nCSeq: 1\r\n\r\nOPTIONS rtsp://localhost RTSP/1.0\r\nCSeq: 2\r\n\r\n";
        let (first, consumed) = RtspRequest::try_parse_from_buffer(buf).unwrap().unwrap();
        assert_eq!(first.cseq(), Some("1"));
        let (second, _) = RtspRequest::try_parse_from_buffer(&buf[consumed..])
            .unwrap()
            .unwrap();
        assert_eq!(second.cseq(), Some("2"));
    }
}
