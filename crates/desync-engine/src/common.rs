//! Shared helpers for the HTTP/1 class engines (cl_te, te_cl): both share a
//! fixed header skeleton and differ only in which Content-Length value and
//! body bytes they send (spec §4.5 framing recipes).

use desync_core::{HeaderPair, Mutation, ScanOptions, Target};

pub fn assemble_headers(
    target: &Target,
    content_length: usize,
    mutation: &Mutation,
    options: &ScanOptions,
) -> Vec<HeaderPair> {
    let mut headers = vec![
        HeaderPair::new(b"Host".to_vec(), target.host.clone().into_bytes()),
        HeaderPair::new(
            b"Content-Type".to_vec(),
            b"application/x-www-form-urlencoded".to_vec(),
        ),
        HeaderPair::new(b"Content-Length".to_vec(), content_length.to_string().into_bytes()),
        mutation.header(),
    ];
    headers.extend(mutation.extra_headers.iter().cloned());
    headers.extend(options.custom_headers.iter().cloned());
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_order_is_host_then_content_type_then_length_then_mutation() {
        let target = Target::new("example.com", 80, false);
        let mutation = Mutation::new("Standard chunked encoding", "Transfer-Encoding", "chunked");
        let options = ScanOptions::default();
        let headers = assemble_headers(&target, 4, &mutation, &options);
        assert_eq!(headers[0].name, b"Host");
        assert_eq!(headers[1].name, b"Content-Type");
        assert_eq!(headers[2].name, b"Content-Length");
        assert_eq!(headers[2].value, b"4");
        assert_eq!(headers[3].name, b"Transfer-Encoding");
    }

    #[test]
    fn custom_headers_and_extras_appended_in_order() {
        let target = Target::new("example.com", 80, false);
        let mutation = Mutation::new("m", "Transfer-Encoding", "chunked")
            .with_extra_headers(vec![HeaderPair::new(b"X-Extra".to_vec(), b"1".to_vec())]);
        let mut options = ScanOptions::default();
        options.custom_headers.push(HeaderPair::new(b"X-Op".to_vec(), b"2".to_vec()));
        let headers = assemble_headers(&target, 4, &mutation, &options);
        assert_eq!(headers[4].name, b"X-Extra");
        assert_eq!(headers[5].name, b"X-Op");
    }
}
