// patch.rs — The full-replacement patch envelope.
//
// `patch_file` payloads are not line diffs. The whole new file body travels
// between a fixed header and footer:
//
//   <<<<QG_NEW_CONTENT
//   ...new body...
//   QG_NEW_CONTENT

pub const PATCH_HEADER: &str = "<<<<QG_NEW_CONTENT\n";
pub const PATCH_FOOTER: &str = "\nQG_NEW_CONTENT";

/// Extract the new body, or `None` if either marker is missing.
pub fn decode_envelope(raw: &str) -> Option<&str> {
    raw.strip_prefix(PATCH_HEADER)?.strip_suffix(PATCH_FOOTER)
}

/// Wrap a body in the envelope.
pub fn encode_envelope(body: &str) -> String {
    format!("{}{}{}", PATCH_HEADER, body, PATCH_FOOTER)
}
